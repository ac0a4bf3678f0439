pub mod health;
pub mod idp;
pub mod redirect;

use axum::{
    Router,
    routing::get,
};

use crate::AppState;

/// Callback endpoints, to be nested under `/idps`.
pub fn idp_routes() -> Router<AppState> {
    Router::new()
        .route("/callback", get(idp::callback).post(idp::callback))
        .route("/jwt", get(idp::jwt).post(idp::jwt))
        .route("/{idp_id}/saml/metadata", get(idp::saml_metadata))
        .route("/{idp_id}/saml/certificate", get(idp::saml_certificate))
        .route("/{idp_id}/saml/acs", get(idp::saml_acs).post(idp::saml_acs))
        .route("/{idp_id}/saml/slo", get(idp::saml_slo).post(idp::saml_slo))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health/live", get(health::liveness))
}

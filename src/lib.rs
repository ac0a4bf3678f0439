//! Completion of federated login intents.
//!
//! External identity providers call back into this service after the user
//! authenticated. Each callback is matched to a pending intent, the external
//! user is fetched through the provider's session, linked to a local user
//! where possible, and the browser is sent back to the application.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod idp;
pub mod intent;
pub mod links;
pub mod logout;
pub mod observability;
pub mod routes;
pub mod urls;

#[cfg(test)]
pub(crate) mod tests;

use axum::{Router, http::StatusCode};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    config::ServerConfig,
    crypto::SharedEncryption,
    idp::SharedProviderStore,
    intent::IntentLifecycle,
    links::UserLinkResolver,
    logout::FederatedLogoutCorrelator,
    urls::CallbackUrls,
};

/// Collaborators shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub providers: SharedProviderStore,
    pub intents: IntentLifecycle,
    pub links: UserLinkResolver,
    pub logout: FederatedLogoutCorrelator,
    pub encryption: SharedEncryption,
    pub urls: CallbackUrls,
}

pub fn build_app(config: &ServerConfig, state: AppState) -> Router {
    Router::new()
        .nest("/idps", routes::idp_routes())
        .merge(routes::health_routes())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.timeout(),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .with_state(state)
}

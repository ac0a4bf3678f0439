//! Liveness probe.

use axum::{Json, response::IntoResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LivenessStatus {
    pub status: &'static str,
    pub version: &'static str,
}

/// Returns 200 as long as the process serves requests.
pub async fn liveness() -> impl IntoResponse {
    Json(LivenessStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

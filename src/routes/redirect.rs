//! Terminal redirects back to the application that started an intent.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::{error::CallbackError, intent::Intent};

/// `success_url` with `id`, `token` and, if resolved, `user`.
pub fn success_url(intent: &Intent, token: &str, user_id: Option<&str>) -> Url {
    let mut params = vec![("id", intent.id.as_str()), ("token", token)];
    if let Some(user_id) = user_id.filter(|id| !id.is_empty()) {
        params.push(("user", user_id));
    }
    with_params(&intent.success_url, &params)
}

/// `failure_url` with `id`, `error` and `error_description`, the latter possibly empty.
pub fn failure_url(intent: &Intent, error: &str, description: &str) -> Url {
    with_params(
        &intent.failure_url,
        &[
            ("id", intent.id.as_str()),
            ("error", error),
            ("error_description", description),
        ],
    )
}

pub fn failure_url_for(intent: &Intent, err: &CallbackError) -> Url {
    let (error, description) = err.failure_params();
    failure_url(intent, &error, &description)
}

/// Set `params` on `base`, replacing same-named and keeping every other query parameter.
fn with_params(base: &Url, params: &[(&str, &str)]) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(name, _)| !params.iter().any(|(param, _)| *param == &**name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(params);
    url
}

/// 302 Found to `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::try_from(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(e) => {
            tracing::error!(location, error = %e, "Redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

//! Callback endpoints of external identity providers.
//!
//! - `/idps/callback` - authorization code callback of OAuth2 and OIDC providers
//! - `/idps/jwt` - legacy JWT endpoint
//! - `/idps/{idp_id}/saml/metadata` - SP metadata
//! - `/idps/{idp_id}/saml/certificate` - SP certificate download
//! - `/idps/{idp_id}/saml/acs` - assertion consumer
//! - `/idps/{idp_id}/saml/slo` - single logout responses
//!
//! Errors raised before an intent is loaded are answered directly with a bare
//! status. Once an intent exists, the browser always goes back to the
//! application through the intent's success or failure URL.

use axum::{
    Form,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

use super::redirect;
use crate::{
    AppState,
    error::{CallbackError, DomainError},
    idp::{IdpSession, IdpUser, JwtSession, Provider, SamlProvider, SamlSession, fetch_user_from_code},
    intent::Intent,
};

/// Parameters of the authorization code callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackForm {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
    /// First-registration payload, only sent by Apple.
    #[serde(default)]
    pub user: String,
}

/// Parameters posted to the SAML ACS and SLO endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SamlForm {
    #[serde(rename = "SAMLResponse", default)]
    pub saml_response: String,
    #[serde(rename = "RelayState", default)]
    pub relay_state: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetadataQuery {
    #[serde(rename = "internalUI", default)]
    pub internal_ui: String,
}

/// Parameters of the legacy JWT endpoint. `userAgentID` carries the encrypted
/// copy of `authRequestID`.
#[derive(Debug, Default, Deserialize)]
pub struct JwtForm {
    #[serde(rename = "authRequestID", default)]
    pub auth_request_id: String,
    #[serde(rename = "userAgentID", default)]
    pub user_agent_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(name = "idp.callback", skip_all, fields(intent = %form.state))]
pub async fn callback(
    State(state): State<AppState>,
    Form(form): Form<CallbackForm>,
) -> Result<Response, CallbackError> {
    if form.state.is_empty() {
        return Err(DomainError::invalid_argument("IDP-Hk38e", "State missing").into());
    }
    let intent = state.intents.load_active(&form.state).await?;

    if !form.error.is_empty() {
        state
            .intents
            .fail(&intent, &reason(&form.error, &form.error_description))
            .await;
        return Ok(redirect::found(
            redirect::failure_url(&intent, &form.error, &form.error_description).as_str(),
        ));
    }

    let provider = match state.provider_for(&intent.idp_id).await {
        Ok(provider) => provider,
        Err(e) => return Ok(state.fail_and_redirect(&intent, e).await),
    };
    let (user, session) =
        match fetch_user_from_code(&provider, &form.code, &form.user, &intent.idp_arguments).await
        {
            Ok(fetched) => fetched,
            Err(e) => return Ok(state.fail_and_redirect(&intent, e).await),
        };

    Ok(state.complete(&intent, &user, session.as_ref()).await)
}

#[tracing::instrument(name = "idp.saml.metadata", skip(state, query))]
pub async fn saml_metadata(
    State(state): State<AppState>,
    Path(idp_id): Path<String>,
    Query(query): Query<MetadataQuery>,
) -> Result<Response, CallbackError> {
    let provider = state.saml_provider(&idp_id, "SAML-lrud8s9coi").await?;

    let mut descriptor = provider.service_provider(&state.urls.saml_root_url(&idp_id));
    descriptor.inject_login_acs(
        &state.urls.login_saml_acs_url(),
        parse_bool(&query.internal_ui),
    );

    Ok((
        [(header::CONTENT_TYPE, "application/samlmetadata+xml")],
        descriptor.to_xml(),
    )
        .into_response())
}

#[tracing::instrument(name = "idp.saml.certificate", skip(state, headers))]
pub async fn saml_certificate(
    State(state): State<AppState>,
    Path(idp_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, CallbackError> {
    let provider = state.saml_provider(&idp_id, "SAML-lrud8s9coi").await?;

    let mut response = (
        [(header::CONTENT_DISPOSITION, "attachment; filename=idp.crt")],
        provider.certificate().to_vec(),
    )
        .into_response();
    match headers.get(header::CONTENT_TYPE) {
        Some(content_type) => {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type.clone());
        }
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    Ok(response)
}

#[tracing::instrument(name = "idp.saml.acs", skip(state, form), fields(intent = %form.relay_state))]
pub async fn saml_acs(
    State(state): State<AppState>,
    Path(idp_id): Path<String>,
    Form(form): Form<SamlForm>,
) -> Result<Response, CallbackError> {
    let provider = state.saml_provider(&idp_id, "SAML-ui9wyux0hp").await?;
    let intent = state.intents.load_active(&form.relay_state).await?;

    let session = SamlSession::new(
        provider,
        intent.request_id.clone().unwrap_or_default(),
        form.saml_response,
    )?;
    let user = match session.fetch_user().await {
        Ok(user) => user,
        Err(e) => return Ok(state.fail_and_redirect(&intent, e.into()).await),
    };

    let user_id = state
        .links
        .resolve_or_migrate(&intent.id, &intent.idp_id, &user, &session)
        .await;
    let response = match state
        .intents
        .succeed_saml(&intent, &user, &session, user_id.as_deref())
        .await
    {
        Ok(token) => redirect::success_url(&intent, &token, user_id.as_deref()),
        Err(e) => redirect::failure_url_for(&intent, &e),
    };
    Ok(redirect::found(response.as_str()))
}

/// Logout responses are not signature-validated; only the provider family is checked.
#[tracing::instrument(name = "idp.saml.slo", skip(state, form))]
pub async fn saml_slo(
    State(state): State<AppState>,
    Path(idp_id): Path<String>,
    Form(form): Form<SamlForm>,
) -> Result<Response, CallbackError> {
    let pending = state.logout.lookup(&form.relay_state).await?;
    state.saml_provider(&idp_id, "SAML-ui9wyux0hp").await?;

    match state.logout.consume(&pending).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(DomainError::not_found("SAML-3uor2", "Logout request not found").into());
        }
        Err(e) => {
            tracing::error!(
                instance_id = %pending.logout.instance_id,
                session_id = %pending.logout.session_id,
                error = %e,
                "Could not delete federated logout"
            );
        }
    }

    Ok(redirect::found(&pending.logout.post_logout_redirect_uri))
}

#[tracing::instrument(name = "idp.jwt", skip_all, fields(intent = %form.auth_request_id))]
pub async fn jwt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<JwtForm>,
) -> Result<Response, CallbackError> {
    state.verify_jwt_params(&form)?;
    let intent = state.intents.load_active(&form.auth_request_id).await?;

    let provider = match state.provider_for(&intent.idp_id).await {
        Ok(provider) => provider,
        Err(e) => return Ok(state.fail_and_redirect(&intent, e).await),
    };
    let Some(provider) = provider.as_jwt() else {
        let err = DomainError::unimplemented("IDP-JK23ed", "Provider is not a JWT provider");
        return Ok(state.fail_and_redirect(&intent, err.into()).await);
    };

    let session = JwtSession::from_headers(provider.clone(), &headers);
    let user = match session.fetch_user().await {
        Ok(user) => user,
        Err(e) => return Ok(state.fail_and_redirect(&intent, e.into()).await),
    };

    Ok(state.complete(&intent, &user, &session).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared steps
// ─────────────────────────────────────────────────────────────────────────────

impl AppState {
    async fn provider_for(&self, idp_id: &str) -> Result<Provider, CallbackError> {
        self.providers
            .provider(idp_id, &self.urls.provider_context(idp_id))
            .await
    }

    /// The provider at `idp_id`, which must be of the SAML family.
    async fn saml_provider(
        &self,
        idp_id: &str,
        error_id: &'static str,
    ) -> Result<SamlProvider, CallbackError> {
        let provider = self.provider_for(idp_id).await?;
        provider.as_saml().cloned().ok_or_else(|| {
            DomainError::invalid_argument(error_id, "Provider is not a SAML provider").into()
        })
    }

    /// Both compat parameters must be present and the encrypted one must decrypt
    /// to the plain one.
    fn verify_jwt_params(&self, form: &JwtForm) -> Result<(), CallbackError> {
        let invalid = || DomainError::invalid_argument("LOGIN-adfzz", "Invalid request parameters");
        if form.auth_request_id.is_empty() || form.user_agent_id.is_empty() {
            return Err(invalid().into());
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(&form.user_agent_id)
            .map_err(|e| invalid().with_source(e))?;
        let decrypted = self
            .encryption
            .decrypt_string(&ciphertext, self.encryption.encryption_key_id())
            .map_err(|e| invalid().with_source(e))?;
        if decrypted != form.auth_request_id {
            return Err(invalid().into());
        }
        Ok(())
    }

    async fn fail_and_redirect(&self, intent: &Intent, err: CallbackError) -> Response {
        tracing::info!(intent = %intent.id, error = %err, "Federated login failed");
        self.intents.fail(intent, &err.to_string()).await;
        redirect::found(redirect::failure_url_for(intent, &err).as_str())
    }

    /// Link or migrate the external user, finish the intent and redirect.
    async fn complete(&self, intent: &Intent, user: &IdpUser, session: &dyn IdpSession) -> Response {
        let user_id = self
            .links
            .resolve_or_migrate(&intent.id, &intent.idp_id, user, session)
            .await;
        let url = match self
            .intents
            .succeed(intent, user, session, user_id.as_deref())
            .await
        {
            Ok(token) => redirect::success_url(intent, &token, user_id.as_deref()),
            Err(e) => redirect::failure_url_for(intent, &e),
        };
        redirect::found(url.as_str())
    }
}

/// `error: description`, or only `error` without a description.
fn reason(error: &str, description: &str) -> String {
    if description.is_empty() {
        error.to_string()
    } else {
        format!("{error}: {description}")
    }
}

/// Boolean query flag. Unparseable values count as false.
fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn reason_with_and_without_description() {
        assert_eq!(
            reason("access_denied", "user cancelled"),
            "access_denied: user cancelled"
        );
        assert_eq!(reason("access_denied", ""), "access_denied");
    }

    #[rstest]
    #[case("1", true)]
    #[case("true", true)]
    #[case("TRUE", true)]
    #[case("t", true)]
    #[case("", false)]
    #[case("0", false)]
    #[case("yes", false)]
    #[case("tRuE", false)]
    fn internal_ui_flag(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(parse_bool(value), expected);
    }
}

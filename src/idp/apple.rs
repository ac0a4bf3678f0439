use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    ClaimNames, IdpArguments, IdpError, IdpSession, IdpTokens, IdpUser, OidcClient,
    oidc::exchange_and_verify, user_from_claims,
};

/// Sign in with Apple.
///
/// Apple only reveals the user's name once, as a JSON form field posted next to
/// the code on first consent. Later logins carry the ID token claims alone.
#[derive(Clone)]
pub struct AppleProvider {
    client: Arc<dyn OidcClient>,
}

impl AppleProvider {
    pub fn new(client: Arc<dyn OidcClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppleUserName {
    first_name: Option<String>,
    last_name: Option<String>,
}

/// The `user` form field Apple posts on first registration.
#[derive(Debug, Default, Deserialize)]
struct AppleUserPayload {
    #[serde(default)]
    name: Option<AppleUserName>,
    #[serde(default)]
    email: Option<String>,
}

pub struct AppleSession {
    provider: AppleProvider,
    code: String,
    payload: Option<AppleUserPayload>,
    tokens: OnceLock<IdpTokens>,
}

impl AppleSession {
    pub fn new(provider: AppleProvider, code: impl Into<String>, user: &str) -> Self {
        let payload = if user.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<AppleUserPayload>(user) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unparseable Apple user payload");
                    None
                }
            }
        };
        Self {
            provider,
            code: code.into(),
            payload,
            tokens: OnceLock::new(),
        }
    }
}

#[async_trait]
impl IdpSession for AppleSession {
    async fn fetch_user(&self) -> Result<IdpUser, IdpError> {
        let (tokens, claims) = exchange_and_verify(
            self.provider.client.as_ref(),
            &self.code,
            &IdpArguments::new(),
        )
        .await?;
        let mut user = user_from_claims(claims, &ClaimNames::default())?;

        if let Some(payload) = &self.payload {
            if let Some(name) = &payload.name {
                user.first_name = user.first_name.take().or_else(|| name.first_name.clone());
                user.last_name = user.last_name.take().or_else(|| name.last_name.clone());
            }
            if user.email.is_none() {
                user.email = payload.email.clone();
            }
        }
        if user.display_name.is_none() {
            let parts: Vec<&str> = [user.first_name.as_deref(), user.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if !parts.is_empty() {
                user.display_name = Some(parts.join(" "));
            }
        }

        let _ = self.tokens.set(tokens);
        Ok(user)
    }

    fn tokens(&self) -> Option<IdpTokens> {
        self.tokens.get().cloned()
    }
}

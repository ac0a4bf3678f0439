use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{ClaimNames, IdpArguments, IdpError, IdpSession, IdpTokens, IdpUser, user_from_claims};

/// Protocol client for a plain OAuth2 authorization server.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Exchange an authorization code, forwarding the arguments stored on the intent
    /// (e.g. the PKCE verifier).
    async fn exchange_code(
        &self,
        code: &str,
        arguments: &IdpArguments,
    ) -> Result<IdpTokens, IdpError>;

    /// Fetch the user resource with the obtained access token.
    async fn user_info(&self, tokens: &IdpTokens) -> Result<Value, IdpError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthFlavor {
    Generic,
    GitHub,
}

#[derive(Clone)]
pub struct OAuthProvider {
    client: Arc<dyn OAuthClient>,
    id_attribute: String,
    flavor: OAuthFlavor,
}

impl OAuthProvider {
    /// Generic OAuth2 provider; `id_attribute` names the user resource field holding the subject.
    pub fn new(client: Arc<dyn OAuthClient>, id_attribute: impl Into<String>) -> Self {
        Self {
            client,
            id_attribute: id_attribute.into(),
            flavor: OAuthFlavor::Generic,
        }
    }

    pub fn github(client: Arc<dyn OAuthClient>) -> Self {
        Self {
            client,
            id_attribute: "id".into(),
            flavor: OAuthFlavor::GitHub,
        }
    }

    pub fn flavor(&self) -> OAuthFlavor {
        self.flavor
    }

    fn claim_names(&self) -> ClaimNames<'_> {
        ClaimNames {
            id: &self.id_attribute,
            username: match self.flavor {
                OAuthFlavor::Generic => "preferred_username",
                OAuthFlavor::GitHub => "login",
            },
        }
    }
}

pub struct OAuthSession {
    provider: OAuthProvider,
    code: String,
    arguments: IdpArguments,
    tokens: OnceLock<IdpTokens>,
}

impl OAuthSession {
    pub fn new(provider: OAuthProvider, code: impl Into<String>, arguments: IdpArguments) -> Self {
        Self {
            provider,
            code: code.into(),
            arguments,
            tokens: OnceLock::new(),
        }
    }
}

#[async_trait]
impl IdpSession for OAuthSession {
    async fn fetch_user(&self) -> Result<IdpUser, IdpError> {
        if self.code.is_empty() {
            return Err(IdpError::MissingCode);
        }
        let tokens = self
            .provider
            .client
            .exchange_code(&self.code, &self.arguments)
            .await?;
        let info = self.provider.client.user_info(&tokens).await?;
        let mut user = user_from_claims(info, &self.provider.claim_names())?;
        if self.provider.flavor == OAuthFlavor::GitHub && user.display_name.is_none() {
            user.display_name = user.preferred_username.clone();
        }
        let _ = self.tokens.set(tokens);
        Ok(user)
    }

    fn tokens(&self) -> Option<IdpTokens> {
        self.tokens.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tests::ScriptedOAuthClient;

    #[tokio::test]
    async fn github_maps_numeric_id_and_login() {
        let client = ScriptedOAuthClient::new(json!({"id": 1, "login": "octocat"}));
        let session = OAuthSession::new(
            OAuthProvider::github(Arc::new(client.clone())),
            "code-1",
            IdpArguments::new(),
        );

        let user = session.fetch_user().await.unwrap();
        assert_eq!(user.id, "1");
        assert_eq!(user.preferred_username.as_deref(), Some("octocat"));
        assert_eq!(user.display_name.as_deref(), Some("octocat"));
        assert_eq!(session.tokens().unwrap().access_token, "access-code-1");
        assert_eq!(client.exchanged_codes(), vec!["code-1".to_string()]);
    }

    #[tokio::test]
    async fn forwards_intent_arguments() {
        let client = ScriptedOAuthClient::new(json!({"user_id": "u-9"}));
        let mut arguments = IdpArguments::new();
        arguments.insert("code_verifier".into(), json!("verifier"));
        let session = OAuthSession::new(
            OAuthProvider::new(Arc::new(client.clone()), "user_id"),
            "c",
            arguments,
        );

        assert_eq!(session.fetch_user().await.unwrap().id, "u-9");
        assert_eq!(client.last_arguments().unwrap()["code_verifier"], "verifier");
    }

    #[tokio::test]
    async fn empty_code_is_rejected_before_exchange() {
        let client = ScriptedOAuthClient::new(json!({"id": 1}));
        let session = OAuthSession::new(
            OAuthProvider::github(Arc::new(client.clone())),
            "",
            IdpArguments::new(),
        );

        assert!(matches!(session.fetch_user().await, Err(IdpError::MissingCode)));
        assert!(client.exchanged_codes().is_empty());
        assert!(session.tokens().is_none());
    }
}

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    ClaimNames, IdpArguments, IdpError, IdpSession, IdpTokens, IdpUser, claim_str,
    user_from_claims,
};

/// Protocol client for an OpenID Connect provider.
#[async_trait]
pub trait OidcClient: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        arguments: &IdpArguments,
    ) -> Result<IdpTokens, IdpError>;

    /// Validate signature, issuer, audience and nonce of an ID token and return its claims.
    async fn verify_id_token(&self, id_token: &str) -> Result<Value, IdpError>;

    async fn user_info(&self, tokens: &IdpTokens) -> Result<Value, IdpError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidcFlavor {
    Generic,
    GitLab,
    Google,
}

#[derive(Clone)]
pub struct OidcProvider {
    client: Arc<dyn OidcClient>,
    id_token_mapping: bool,
    flavor: OidcFlavor,
}

impl OidcProvider {
    pub fn new(client: Arc<dyn OidcClient>) -> Self {
        Self {
            client,
            id_token_mapping: false,
            flavor: OidcFlavor::Generic,
        }
    }

    pub fn gitlab(client: Arc<dyn OidcClient>) -> Self {
        Self {
            flavor: OidcFlavor::GitLab,
            ..Self::new(client)
        }
    }

    pub fn google(client: Arc<dyn OidcClient>) -> Self {
        Self {
            flavor: OidcFlavor::Google,
            ..Self::new(client)
        }
    }

    /// Map the user from ID token claims only, skipping the userinfo endpoint.
    pub fn with_id_token_mapping(mut self, enabled: bool) -> Self {
        self.id_token_mapping = enabled;
        self
    }

    pub fn flavor(&self) -> OidcFlavor {
        self.flavor
    }

    fn claim_names(&self) -> ClaimNames<'static> {
        ClaimNames {
            id: "sub",
            username: match self.flavor {
                OidcFlavor::GitLab => "nickname",
                OidcFlavor::Generic | OidcFlavor::Google => "preferred_username",
            },
        }
    }
}

/// Exchange the code and validate the returned ID token.
pub(super) async fn exchange_and_verify(
    client: &dyn OidcClient,
    code: &str,
    arguments: &IdpArguments,
) -> Result<(IdpTokens, Value), IdpError> {
    if code.is_empty() {
        return Err(IdpError::MissingCode);
    }
    let tokens = client.exchange_code(code, arguments).await?;
    let id_token = tokens
        .id_token
        .as_deref()
        .ok_or_else(|| IdpError::Validation("id_token missing from token response".into()))?;
    let claims = client.verify_id_token(id_token).await?;
    Ok((tokens, claims))
}

pub struct OidcSession {
    provider: OidcProvider,
    code: String,
    arguments: IdpArguments,
    tokens: OnceLock<IdpTokens>,
}

impl OidcSession {
    pub fn new(provider: OidcProvider, code: impl Into<String>, arguments: IdpArguments) -> Self {
        Self {
            provider,
            code: code.into(),
            arguments,
            tokens: OnceLock::new(),
        }
    }
}

#[async_trait]
impl IdpSession for OidcSession {
    async fn fetch_user(&self) -> Result<IdpUser, IdpError> {
        let client = self.provider.client.as_ref();
        let (tokens, id_claims) = exchange_and_verify(client, &self.code, &self.arguments).await?;

        let claims = if self.provider.id_token_mapping {
            id_claims
        } else {
            let info = client.user_info(&tokens).await?;
            if claim_str(&info, "sub") != claim_str(&id_claims, "sub") {
                return Err(IdpError::SubjectMismatch);
            }
            info
        };

        let user = user_from_claims(claims, &self.provider.claim_names())?;
        let _ = self.tokens.set(tokens);
        Ok(user)
    }

    fn tokens(&self) -> Option<IdpTokens> {
        self.tokens.get().cloned()
    }
}

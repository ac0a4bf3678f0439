use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    ClaimNames, IdpArguments, IdpError, IdpSession, IdpTokens, IdpUser, OidcClient,
    SupportsMigration, claim_str, oidc::exchange_and_verify, user_from_claims,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AzureTenant {
    Common,
    Organizations,
    Consumers,
    /// A single directory; tokens from other tenants are rejected.
    Id(String),
}

/// Microsoft Entra ID (Azure AD) on top of OIDC.
///
/// Users are identified by their directory object id (`oid`). Links created
/// before that switch were keyed by the pairwise `sub`, which the session offers
/// as the previous id for migration.
#[derive(Clone)]
pub struct AzureAdProvider {
    client: Arc<dyn OidcClient>,
    tenant: AzureTenant,
    email_verified: bool,
}

impl AzureAdProvider {
    pub fn new(client: Arc<dyn OidcClient>, tenant: AzureTenant) -> Self {
        Self {
            client,
            tenant,
            email_verified: false,
        }
    }

    /// Treat the directory's email addresses as verified.
    pub fn with_email_verified(mut self, verified: bool) -> Self {
        self.email_verified = verified;
        self
    }
}

pub struct AzureAdSession {
    provider: AzureAdProvider,
    code: String,
    tokens: OnceLock<IdpTokens>,
    claims: OnceLock<Value>,
}

impl AzureAdSession {
    pub fn new(provider: AzureAdProvider, code: impl Into<String>) -> Self {
        Self {
            provider,
            code: code.into(),
            tokens: OnceLock::new(),
            claims: OnceLock::new(),
        }
    }
}

#[async_trait]
impl IdpSession for AzureAdSession {
    async fn fetch_user(&self) -> Result<IdpUser, IdpError> {
        let (tokens, claims) = exchange_and_verify(
            self.provider.client.as_ref(),
            &self.code,
            &IdpArguments::new(),
        )
        .await?;

        if let AzureTenant::Id(tenant) = &self.provider.tenant
            && claim_str(&claims, "tid").as_deref() != Some(tenant.as_str())
        {
            return Err(IdpError::Validation(format!(
                "token was not issued by tenant {tenant}"
            )));
        }

        let mut user = user_from_claims(
            claims.clone(),
            &ClaimNames {
                id: "oid",
                username: "preferred_username",
            },
        )?;
        user.email_verified = self.provider.email_verified;
        if user.email.is_none() {
            user.email = user.preferred_username.clone();
        }

        let _ = self.tokens.set(tokens);
        let _ = self.claims.set(claims);
        Ok(user)
    }

    fn tokens(&self) -> Option<IdpTokens> {
        self.tokens.get().cloned()
    }

    fn migration(&self) -> Option<&dyn SupportsMigration> {
        Some(self)
    }
}

impl SupportsMigration for AzureAdSession {
    fn retrieve_previous_id(&self) -> Result<Option<String>, IdpError> {
        let claims = self.claims.get().ok_or(IdpError::UserNotFetched)?;
        Ok(claim_str(claims, "sub"))
    }
}

//! Identity provider families and the per-request sessions they produce.
//!
//! A [`Provider`] is the read-only configuration of one external identity source.
//! The OAuth2 and OIDC families (and their vendor flavors) turn an authorization
//! code into an [`IdpSession`]; SAML and JWT build their sessions from the
//! payload delivered to their dedicated endpoints. Concrete protocol clients
//! (token exchange, ID token and assertion validation) are injected through the
//! client traits of each family.

mod apple;
mod azuread;
pub mod dispatch;
mod jwt;
mod ldap;
pub mod metadata;
mod oauth;
mod oidc;
mod registry;
mod saml;

use std::fmt;

pub use apple::{AppleProvider, AppleSession};
use async_trait::async_trait;
pub use azuread::{AzureAdProvider, AzureAdSession, AzureTenant};
pub use dispatch::{fetch_user_from_code, session_for_code};
pub use jwt::{JwtProvider, JwtSession, JwtVerifier};
pub use ldap::LdapProvider;
pub use oauth::{OAuthClient, OAuthFlavor, OAuthProvider, OAuthSession};
pub use oidc::{OidcClient, OidcFlavor, OidcProvider, OidcSession};
pub use registry::{ProviderContext, ProviderStore, SharedProviderStore, StaticProviderStore};
pub use saml::{SamlAssertion, SamlProvider, SamlResponseValidator, SamlSession};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Provider-specific arguments stored on an intent when the flow was started.
pub type IdpArguments = serde_json::Map<String, Value>;

/// Errors raised while talking to an external identity provider.
#[derive(Debug, Error)]
pub enum IdpError {
    #[error("Authorization code missing")]
    MissingCode,

    #[error("No bearer token in header {0}")]
    MissingToken(String),

    #[error("SAMLResponse missing")]
    MissingSamlResponse,

    #[error("{0} is not configured for this provider")]
    NotConfigured(&'static str),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Token validation failed: {0}")]
    Validation(String),

    #[error("User info request failed: {0}")]
    UserInfo(String),

    #[error("Subject of user info does not match the ID token")]
    SubjectMismatch,

    #[error("Claim '{0}' missing from provider response")]
    MissingClaim(String),

    #[error("User has not been fetched yet")]
    UserNotFetched,
}

/// External identity as reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdpUser {
    pub id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub preferred_username: Option<String>,
    /// Claims or attributes as received.
    pub raw: Value,
}

/// Tokens obtained from an authorization code exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdpTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Per-request capability exchanging a protocol payload for an external user.
#[async_trait]
pub trait IdpSession: Send + Sync {
    async fn fetch_user(&self) -> Result<IdpUser, IdpError>;

    /// Tokens obtained during [`fetch_user`](Self::fetch_user), if the protocol issues any.
    fn tokens(&self) -> Option<IdpTokens> {
        None
    }

    /// Sessions of providers that changed their subject identifier expose the old one here.
    fn migration(&self) -> Option<&dyn SupportsMigration> {
        None
    }
}

pub trait SupportsMigration: Send + Sync {
    /// The external id this user had before the provider switched identifiers.
    fn retrieve_previous_id(&self) -> Result<Option<String>, IdpError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration of one external identity source.
#[derive(Clone)]
pub enum Provider {
    /// OAuth2, including the GitHub flavor.
    OAuth(OAuthProvider),
    /// OpenID Connect, including the GitLab and Google flavors.
    Oidc(OidcProvider),
    AzureAd(AzureAdProvider),
    Apple(AppleProvider),
    Jwt(JwtProvider),
    Ldap(LdapProvider),
    Saml(SamlProvider),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OAuth,
    GitHub,
    Oidc,
    GitLab,
    Google,
    AzureAd,
    Apple,
    Jwt,
    Ldap,
    Saml,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::OAuth => "oauth",
            ProviderKind::GitHub => "github",
            ProviderKind::Oidc => "oidc",
            ProviderKind::GitLab => "gitlab",
            ProviderKind::Google => "google",
            ProviderKind::AzureAd => "azuread",
            ProviderKind::Apple => "apple",
            ProviderKind::Jwt => "jwt",
            ProviderKind::Ldap => "ldap",
            ProviderKind::Saml => "saml",
        };
        f.write_str(s)
    }
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::OAuth(p) => match p.flavor() {
                OAuthFlavor::Generic => ProviderKind::OAuth,
                OAuthFlavor::GitHub => ProviderKind::GitHub,
            },
            Provider::Oidc(p) => match p.flavor() {
                OidcFlavor::Generic => ProviderKind::Oidc,
                OidcFlavor::GitLab => ProviderKind::GitLab,
                OidcFlavor::Google => ProviderKind::Google,
            },
            Provider::AzureAd(_) => ProviderKind::AzureAd,
            Provider::Apple(_) => ProviderKind::Apple,
            Provider::Jwt(_) => ProviderKind::Jwt,
            Provider::Ldap(_) => ProviderKind::Ldap,
            Provider::Saml(_) => ProviderKind::Saml,
        }
    }

    pub fn as_saml(&self) -> Option<&SamlProvider> {
        match self {
            Provider::Saml(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_jwt(&self) -> Option<&JwtProvider> {
        match self {
            Provider::Jwt(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Provider").field(&self.kind()).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Claim mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Claim names used to build an [`IdpUser`] from a JSON claim set.
pub(crate) struct ClaimNames<'a> {
    pub id: &'a str,
    pub username: &'a str,
}

impl Default for ClaimNames<'_> {
    fn default() -> Self {
        Self {
            id: "sub",
            username: "preferred_username",
        }
    }
}

/// String value of a claim; numeric ids (GitHub) are rendered in decimal.
pub(crate) fn claim_str(claims: &Value, name: &str) -> Option<String> {
    match claims.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn user_from_claims(claims: Value, names: &ClaimNames<'_>) -> Result<IdpUser, IdpError> {
    let id = claim_str(&claims, names.id).ok_or_else(|| IdpError::MissingClaim(names.id.into()))?;
    let email_verified = match claims.get("email_verified") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    Ok(IdpUser {
        id,
        email: claim_str(&claims, "email"),
        email_verified,
        first_name: claim_str(&claims, "given_name"),
        last_name: claim_str(&claims, "family_name"),
        display_name: claim_str(&claims, "name"),
        preferred_username: claim_str(&claims, names.username),
        raw: claims,
    })
}

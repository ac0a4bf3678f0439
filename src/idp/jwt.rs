use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;

use super::{ClaimNames, IdpError, IdpSession, IdpUser, claim_str, user_from_claims};
use crate::config::JwtProviderConfig;

/// Verifies a bearer JWT (signature, expiry) and returns its claims.
#[async_trait]
pub trait JwtVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Value, IdpError>;
}

/// Identity asserted by a JWT that a trusted proxy or application forwards in a
/// request header.
#[derive(Clone)]
pub struct JwtProvider {
    header_name: String,
    issuer: Option<String>,
    verifier: Option<Arc<dyn JwtVerifier>>,
}

impl JwtProvider {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
            issuer: None,
            verifier: None,
        }
    }

    pub fn from_config(config: &JwtProviderConfig) -> Self {
        Self {
            header_name: config.header_name.clone(),
            issuer: config.issuer.clone(),
            verifier: None,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn JwtVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

pub struct JwtSession {
    provider: JwtProvider,
    token: Option<String>,
}

impl JwtSession {
    /// Take the token from the provider's header, stripping a `Bearer ` prefix.
    pub fn from_headers(provider: JwtProvider, headers: &HeaderMap) -> Self {
        let token = headers
            .get(provider.header_name())
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                let value = value.trim();
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
                    .unwrap_or(value)
                    .trim()
                    .to_string()
            })
            .filter(|token| !token.is_empty());
        Self { provider, token }
    }
}

#[async_trait]
impl IdpSession for JwtSession {
    async fn fetch_user(&self) -> Result<IdpUser, IdpError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| IdpError::MissingToken(self.provider.header_name.clone()))?;
        let verifier = self
            .provider
            .verifier
            .as_ref()
            .ok_or(IdpError::NotConfigured("JWT verification"))?;

        let claims = verifier.verify(token).await?;
        if let Some(issuer) = &self.provider.issuer
            && claim_str(&claims, "iss").as_deref() != Some(issuer.as_str())
        {
            return Err(IdpError::Validation(format!(
                "unexpected issuer, expected {issuer}"
            )));
        }
        user_from_claims(claims, &ClaimNames::default())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;
    use crate::tests::StaticJwtVerifier;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    fn provider() -> JwtProvider {
        JwtProvider::new("Authorization")
            .with_issuer("https://issuer.example.com")
            .with_verifier(Arc::new(StaticJwtVerifier::new(
                "token-1",
                json!({"iss": "https://issuer.example.com", "sub": "jwt-user"}),
            )))
    }

    #[tokio::test]
    async fn reads_bearer_token() {
        let session = JwtSession::from_headers(provider(), &headers("authorization", "Bearer token-1"));
        assert_eq!(session.fetch_user().await.unwrap().id, "jwt-user");
    }

    #[tokio::test]
    async fn custom_header_without_prefix() {
        let provider = JwtProvider::new("x-identity-token").with_verifier(Arc::new(
            StaticJwtVerifier::new("token-1", json!({"sub": "u"})),
        ));
        let session = JwtSession::from_headers(provider, &headers("x-identity-token", "token-1"));
        assert_eq!(session.fetch_user().await.unwrap().id, "u");
    }

    #[tokio::test]
    async fn missing_header() {
        let session = JwtSession::from_headers(provider(), &HeaderMap::new());
        assert!(matches!(
            session.fetch_user().await,
            Err(IdpError::MissingToken(h)) if h == "Authorization"
        ));
    }

    #[tokio::test]
    async fn issuer_mismatch() {
        let provider = JwtProvider::new("Authorization")
            .with_issuer("https://expected.example.com")
            .with_verifier(Arc::new(StaticJwtVerifier::new(
                "token-1",
                json!({"iss": "https://other.example.com", "sub": "u"}),
            )));
        let session = JwtSession::from_headers(provider, &headers("authorization", "Bearer token-1"));
        assert!(matches!(
            session.fetch_user().await,
            Err(IdpError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn verifier_required() {
        let session = JwtSession::from_headers(
            JwtProvider::new("Authorization"),
            &headers("authorization", "Bearer token-1"),
        );
        assert!(matches!(
            session.fetch_user().await,
            Err(IdpError::NotConfigured(_))
        ));
    }
}

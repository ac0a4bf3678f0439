//! Session construction for the generic authorization-code callback.
//!
//! Only the OAuth2 and OIDC families (with their vendor flavors) complete an
//! intent through `/idps/callback`. JWT, LDAP and SAML providers have dedicated
//! endpoints and are rejected here.

use super::{
    AppleSession, AzureAdSession, IdpArguments, IdpSession, IdpUser, OAuthSession, OidcSession,
    Provider,
};
use crate::error::{CallbackError, DomainError};

/// Build the session that redeems `code` for `provider`.
///
/// `apple_user` is the first-registration payload Apple posts next to the code;
/// other providers ignore it.
pub fn session_for_code(
    provider: &Provider,
    code: &str,
    arguments: &IdpArguments,
    apple_user: &str,
) -> Result<Box<dyn IdpSession>, DomainError> {
    let session: Box<dyn IdpSession> = match provider {
        Provider::OAuth(p) => Box::new(OAuthSession::new(p.clone(), code, arguments.clone())),
        Provider::Oidc(p) => Box::new(OidcSession::new(p.clone(), code, arguments.clone())),
        Provider::AzureAd(p) => Box::new(AzureAdSession::new(p.clone(), code)),
        Provider::Apple(p) => Box::new(AppleSession::new(p.clone(), code, apple_user)),
        Provider::Jwt(_) | Provider::Ldap(_) | Provider::Saml(_) => {
            return Err(DomainError::invalid_argument(
                "IDP-52jmn",
                "Identity provider type not supported on this endpoint",
            ));
        }
    };
    Ok(session)
}

/// Build the session and fetch the external user in one step.
#[tracing::instrument(name = "idp.fetch_user", skip_all, fields(provider = %provider.kind()))]
pub async fn fetch_user_from_code(
    provider: &Provider,
    code: &str,
    apple_user: &str,
    arguments: &IdpArguments,
) -> Result<(IdpUser, Box<dyn IdpSession>), CallbackError> {
    let session = session_for_code(provider, code, arguments, apple_user)?;
    let user = session.fetch_user().await?;
    Ok((user, session))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{
        error::ErrorKind,
        idp::{
            AppleProvider, AzureAdProvider, AzureTenant, JwtProvider, LdapProvider, OAuthProvider,
            OidcProvider, SamlProvider,
        },
        tests::{ScriptedOAuthClient, ScriptedOidcClient},
    };

    fn oidc_client() -> Arc<ScriptedOidcClient> {
        Arc::new(ScriptedOidcClient::new(
            json!({"sub": "s", "oid": "o"}),
            json!({"sub": "s"}),
        ))
    }

    #[rstest]
    #[case::jwt(Provider::Jwt(JwtProvider::new("Authorization")))]
    #[case::ldap(Provider::Ldap(LdapProvider::new(vec!["ldap://dir".into()], "dc=example")))]
    #[case::saml(Provider::Saml(SamlProvider::new("cert")))]
    fn dedicated_endpoint_families_are_rejected(#[case] provider: Provider) {
        let err = session_for_code(&provider, "code", &IdpArguments::new(), "")
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(err.id, "IDP-52jmn");
    }

    #[rstest]
    #[case::oauth(Provider::OAuth(OAuthProvider::new(Arc::new(ScriptedOAuthClient::new(json!({"id": "x"}))), "id")))]
    #[case::github(Provider::OAuth(OAuthProvider::github(Arc::new(ScriptedOAuthClient::new(json!({"id": 1}))))))]
    #[case::oidc(Provider::Oidc(OidcProvider::new(oidc_client())))]
    #[case::gitlab(Provider::Oidc(OidcProvider::gitlab(oidc_client())))]
    #[case::google(Provider::Oidc(OidcProvider::google(oidc_client())))]
    #[case::azuread(Provider::AzureAd(AzureAdProvider::new(oidc_client(), AzureTenant::Common)))]
    #[case::apple(Provider::Apple(AppleProvider::new(oidc_client())))]
    #[tokio::test]
    async fn code_families_fetch_a_user(#[case] provider: Provider) {
        let (user, session) = fetch_user_from_code(&provider, "code", "", &IdpArguments::new())
            .await
            .unwrap();
        assert!(!user.id.is_empty());
        assert!(session.tokens().is_some());
    }

    #[tokio::test]
    async fn only_azuread_supports_migration() {
        let azure = Provider::AzureAd(AzureAdProvider::new(oidc_client(), AzureTenant::Common));
        let oidc = Provider::Oidc(OidcProvider::new(oidc_client()));
        let args = IdpArguments::new();

        assert!(
            session_for_code(&azure, "c", &args, "")
                .unwrap()
                .migration()
                .is_some()
        );
        assert!(
            session_for_code(&oidc, "c", &args, "")
                .unwrap()
                .migration()
                .is_none()
        );
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let provider = Provider::OAuth(OAuthProvider::github(Arc::new(
            ScriptedOAuthClient::failing_exchange("invalid_grant"),
        )));
        let err = fetch_user_from_code(&provider, "code", "", &IdpArguments::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err.failure_params().0, "Token exchange failed: invalid_grant");
    }
}

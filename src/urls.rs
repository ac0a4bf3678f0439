//! Externally visible URLs of the callback endpoints.

use crate::{config::ServerConfig, idp::ProviderContext};

#[derive(Debug, Clone)]
pub struct CallbackUrls {
    origin: String,
    login_saml_acs_path: String,
}

impl CallbackUrls {
    pub fn new(public_url: &str, login_saml_acs_path: &str) -> Self {
        Self {
            origin: public_url.trim_end_matches('/').to_string(),
            login_saml_acs_path: format!("/{}", login_saml_acs_path.trim_start_matches('/')),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.public_url, &config.login_saml_acs_path)
    }

    /// Redirect URI registered with OAuth2 and OIDC providers.
    pub fn callback_url(&self) -> String {
        format!("{}/idps/callback", self.origin)
    }

    /// Root of a provider's SAML endpoints, with trailing slash.
    pub fn saml_root_url(&self, idp_id: &str) -> String {
        format!("{}/idps/{}/saml/", self.origin, idp_id)
    }

    /// Assertion consumer operated by the login UI.
    pub fn login_saml_acs_url(&self) -> String {
        format!("{}{}", self.origin, self.login_saml_acs_path)
    }

    pub fn provider_context(&self, idp_id: &str) -> ProviderContext {
        ProviderContext {
            callback_url: self.callback_url(),
            saml_root_url: self.saml_root_url(idp_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_urls_from_origin() {
        let urls = CallbackUrls::new("https://login.example.com/", "ui/login/saml/acs");
        assert_eq!(urls.callback_url(), "https://login.example.com/idps/callback");
        assert_eq!(
            urls.saml_root_url("42"),
            "https://login.example.com/idps/42/saml/"
        );
        assert_eq!(
            urls.login_saml_acs_url(),
            "https://login.example.com/ui/login/saml/acs"
        );
    }

    #[test]
    fn default_server_config() {
        let urls = CallbackUrls::from_config(&ServerConfig::default());
        let context = urls.provider_context("7");
        assert_eq!(context.callback_url, "http://localhost:8080/idps/callback");
        assert_eq!(context.saml_root_url, "http://localhost:8080/idps/7/saml/");
        assert_eq!(
            urls.login_saml_acs_url(),
            "http://localhost:8080/ui/login/login/externalidp/saml/acs"
        );
    }
}

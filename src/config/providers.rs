use serde::{Deserialize, Serialize};

use super::ConfigError;

/// A statically configured identity provider.
///
/// OAuth2 and OIDC families need live protocol clients and are registered
/// programmatically by the embedding application; the families below are fully
/// described by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Saml(SamlProviderConfig),
    Ldap(LdapProviderConfig),
    Jwt(JwtProviderConfig),
}

impl ProviderConfig {
    pub fn id(&self) -> &str {
        match self {
            ProviderConfig::Saml(c) => &c.id,
            ProviderConfig::Ldap(c) => &c.id,
            ProviderConfig::Jwt(c) => &c.id,
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.id().is_empty() {
            return Err(ConfigError::Validation("Provider id cannot be empty".into()));
        }
        match self {
            ProviderConfig::Saml(c) if c.certificate.trim().is_empty() => {
                Err(ConfigError::Validation(format!(
                    "SAML provider '{}' requires a certificate",
                    c.id
                )))
            }
            ProviderConfig::Ldap(c) if c.servers.is_empty() => Err(ConfigError::Validation(
                format!("LDAP provider '{}' requires at least one server", c.id),
            )),
            _ => Ok(()),
        }
    }
}

/// SAML 2.0 service provider settings for one external IdP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamlProviderConfig {
    pub id: String,

    /// PEM certificate used for signing and encryption, also served for download.
    pub certificate: String,

    /// NameID format requested from the IdP.
    #[serde(default)]
    pub name_id_format: Option<String>,

    /// Whether AuthnRequests are signed.
    #[serde(default)]
    pub sign_requests: bool,

    /// Whether assertions must be signed by the IdP.
    #[serde(default = "default_true")]
    pub want_assertions_signed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LdapProviderConfig {
    pub id: String,
    pub servers: Vec<String>,
    pub base_dn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JwtProviderConfig {
    pub id: String,

    /// Expected `iss` claim.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Request header carrying the token.
    #[serde(default = "default_jwt_header")]
    pub header_name: String,
}

fn default_true() -> bool {
    true
}

fn default_jwt_header() -> String {
    "Authorization".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_defaults() {
        let config: ProviderConfig = toml::from_str(
            r#"
            type = "jwt"
            id = "7"
        "#,
        )
        .unwrap();
        match config {
            ProviderConfig::Jwt(jwt) => {
                assert_eq!(jwt.header_name, "Authorization");
                assert!(jwt.issuer.is_none());
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }

    #[test]
    fn test_saml_requires_certificate() {
        let config = ProviderConfig::Saml(SamlProviderConfig {
            id: "1".into(),
            certificate: " ".into(),
            name_id_format: None,
            sign_requests: false,
            want_assertions_signed: true,
        });
        assert!(config.validate().is_err());
    }
}

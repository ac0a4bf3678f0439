use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible origin of this service, e.g. `https://login.example.com`.
    /// Callback, SAML and login UI URLs are derived from it.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Path of the login UI's SAML assertion consumer, appended to `public_url`
    /// when advertising platform ACS endpoints in SP metadata.
    #[serde(default = "default_login_saml_acs_path")]
    pub login_saml_acs_path: String,

    /// Instance the federated logout entries are scoped to.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Request body size limit in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Request timeout in seconds. Outstanding calls to identity providers and
    /// stores are dropped when it elapses.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            login_saml_acs_path: default_login_saml_acs_path(),
            instance_id: default_instance_id(),
            body_limit_bytes: default_body_limit(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.public_url).map_err(|e| {
            ConfigError::Validation(format!(
                "server.public_url '{}' is not a valid URL: {}",
                self.public_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "server.public_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if !self.login_saml_acs_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "server.login_saml_acs_path must start with '/'".into(),
            ));
        }
        if self.instance_id.is_empty() {
            return Err(ConfigError::Validation(
                "server.instance_id cannot be empty".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_login_saml_acs_path() -> String {
    "/ui/login/login/externalidp/saml/acs".to_string()
}

fn default_instance_id() -> String {
    "default".to_string()
}

fn default_body_limit() -> usize {
    1024 * 1024 // 1 MB, SAML responses included
}

fn default_timeout() -> u64 {
    30
}

mod cache;
mod encryption;
mod observability;
mod providers;
mod server;

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::LazyLock,
};

pub use cache::*;
pub use encryption::*;
pub use observability::*;
pub use providers::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root of `idp-callback.toml`. Every table is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallbackConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    /// Keys used to decrypt tokens on the JWT endpoint.
    pub encryption: EncryptionConfig,
    pub observability: ObservabilityConfig,
    pub providers: Vec<ProviderConfig>,
}

impl CallbackConfig {
    /// Read and parse a TOML file. See [`CallbackConfig::from_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e, path.into()))?;
        Self::from_str(&raw)
    }

    /// Parse and validate a TOML document after expanding `${VAR}` references.
    ///
    /// References inside `#` comments are left alone; an unset variable anywhere
    /// else is an error.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(&expand_env_vars(raw)?)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.cache.validate()?;
        self.encryption.validate()?;

        let mut ids = HashSet::with_capacity(self.providers.len());
        for provider in &self.providers {
            provider.validate()?;
            if !ids.insert(provider.id()) {
                return Err(ConfigError::Validation(format!(
                    "provider id '{}' is configured more than once",
                    provider.id()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid"));

fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        let (code, comment) = line.split_at(line.find('#').unwrap_or(line.len()));
        let mut copied = 0;
        for reference in ENV_REF.captures_iter(code) {
            let (Some(whole), Some(name)) = (reference.get(0), reference.get(1)) else {
                continue;
            };
            let value = std::env::var(name.as_str())
                .map_err(|_| ConfigError::EnvVarNotFound(name.as_str().into()))?;
            expanded.push_str(&code[copied..whole.start()]);
            expanded.push_str(&value);
            copied = whole.end();
        }
        expanded.push_str(&code[copied..]);
        expanded.push_str(comment);
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CallbackConfig::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.instance_id, "default");
        assert!(matches!(config.cache, CacheConfig::Memory(_)));
        assert!(config.providers.is_empty());
    }

    #[test]
    fn full_document() {
        let config = CallbackConfig::from_str(
            r#"
            [server]
            port = 9000
            public_url = "https://login.example.com"
            instance_id = "tenant-a"

            [cache]
            type = "memory"
            max_entries = 500

            [encryption]
            active_key_id = "k1"
            keys = { k1 = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=" }

            [observability.logging]
            level = "debug"
            format = "json"

            [[providers]]
            type = "saml"
            id = "100"
            certificate = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----"

            [[providers]]
            type = "ldap"
            id = "200"
            servers = ["ldaps://ldap.example.com"]
            base_dn = "dc=example,dc=com"
        "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.instance_id, "tenant-a");
        assert_eq!(config.observability.logging.format, LogFormat::Json);
        assert_eq!(config.providers.len(), 2);
        match &config.cache {
            CacheConfig::Memory(memory) => assert_eq!(memory.max_entries, 500),
            other => panic!("unexpected cache config: {other:?}"),
        }
    }

    #[test]
    fn misspelled_field_is_rejected() {
        let err = CallbackConfig::from_str(
            r#"
            [server]
            prot = 1
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn duplicate_provider_ids_are_rejected() {
        let err = CallbackConfig::from_str(
            r#"
            [[providers]]
            type = "ldap"
            id = "1"
            servers = ["ldap://a"]
            base_dn = "dc=a"

            [[providers]]
            type = "ldap"
            id = "1"
            servers = ["ldap://b"]
            base_dn = "dc=b"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("more than once")));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 7070").unwrap();
        let config = CallbackConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 7070);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CallbackConfig::from_file("/nonexistent/idp-callback.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }

    #[test]
    fn expands_env_references() {
        temp_env::with_var("TEST_PUBLIC_URL", Some("https://sso.example.org"), || {
            let config = CallbackConfig::from_str(
                r#"
                [server]
                public_url = "${TEST_PUBLIC_URL}"
            "#,
            )
            .unwrap();
            assert_eq!(config.server.public_url, "https://sso.example.org");
        });
    }

    #[test]
    fn unset_env_reference_is_an_error() {
        temp_env::with_var_unset("TEST_MISSING_IDP_VAR", || {
            let err = expand_env_vars("key = \"${TEST_MISSING_IDP_VAR}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(v) if v == "TEST_MISSING_IDP_VAR"));
        });
    }

    #[test]
    fn references_in_comments_are_kept() {
        let result = expand_env_vars("# key = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# key = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn only_code_before_comment_is_expanded() {
        temp_env::with_var("TEST_BEFORE_COMMENT", Some("expanded"), || {
            let result =
                expand_env_vars("key = \"${TEST_BEFORE_COMMENT}\" # ${NOT_EXPANDED}").unwrap();
            assert_eq!(result, "key = \"expanded\" # ${NOT_EXPANDED}");
        });
    }
}

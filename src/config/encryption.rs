use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Symmetric keys used to verify encrypted identifiers.
///
/// ```toml
/// [encryption]
/// active_key_id = "2024-01"
/// keys = { "2024-01" = "${IDP_ENCRYPTION_KEY}" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Key used for new values and for verifying the JWT endpoint's encrypted intent id.
    #[serde(default)]
    pub active_key_id: String,

    /// Key id to base64-encoded 32-byte AES key.
    #[serde(default)]
    pub keys: HashMap<String, String>,
}

impl EncryptionConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.keys.is_empty() {
            return Ok(());
        }
        if !self.keys.contains_key(&self.active_key_id) {
            return Err(ConfigError::Validation(format!(
                "encryption.active_key_id '{}' does not name a configured key",
                self.active_key_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_valid() {
        EncryptionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_active_key_must_exist() {
        let config = EncryptionConfig {
            active_key_id: "missing".into(),
            keys: [("present".to_string(), "AAAA".to_string())]
                .into_iter()
                .collect(),
        };
        assert!(config.validate().is_err());
    }
}

use crate::config::LdapProviderConfig;

/// LDAP directory. Users authenticate against it with a username/password form in
/// the login UI, so it never completes an intent through a callback endpoint.
#[derive(Debug, Clone)]
pub struct LdapProvider {
    servers: Vec<String>,
    base_dn: String,
}

impl LdapProvider {
    pub fn new(servers: Vec<String>, base_dn: impl Into<String>) -> Self {
        Self {
            servers,
            base_dn: base_dn.into(),
        }
    }

    pub fn from_config(config: &LdapProviderConfig) -> Self {
        Self::new(config.servers.clone(), config.base_dn.clone())
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }
}

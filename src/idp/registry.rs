use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use super::{JwtProvider, LdapProvider, Provider, SamlProvider};
use crate::{
    config::ProviderConfig,
    error::{CallbackError, DomainError},
};

/// URLs a provider needs to build redirect URIs and SP metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    /// `…/idps/callback`, the redirect URI registered with OAuth2/OIDC providers.
    pub callback_url: String,
    /// `…/idps/{id}/saml/`, root of the provider's SAML endpoints.
    pub saml_root_url: String,
}

/// Lookup of provider configuration by id.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn provider(&self, idp_id: &str, context: &ProviderContext)
    -> Result<Provider, CallbackError>;
}

pub type SharedProviderStore = Arc<dyn ProviderStore>;

/// In-process provider table.
#[derive(Default)]
pub struct StaticProviderStore {
    providers: RwLock<HashMap<String, Provider>>,
}

impl StaticProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[ProviderConfig]) -> Self {
        let store = Self::new();
        for config in configs {
            let provider = match config {
                ProviderConfig::Saml(c) => Provider::Saml(SamlProvider::from_config(c)),
                ProviderConfig::Ldap(c) => {
                    let ldap = LdapProvider::from_config(c);
                    tracing::debug!(
                        idp_id = %c.id,
                        servers = ?ldap.servers(),
                        base_dn = ldap.base_dn(),
                        "LDAP provider registered for the login UI only"
                    );
                    Provider::Ldap(ldap)
                }
                ProviderConfig::Jwt(c) => Provider::Jwt(JwtProvider::from_config(c)),
            };
            store.insert(config.id(), provider);
        }
        store
    }

    pub fn insert(&self, idp_id: impl Into<String>, provider: Provider) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.insert(idp_id.into(), provider);
    }

    pub fn len(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProviderStore for StaticProviderStore {
    async fn provider(
        &self,
        idp_id: &str,
        _context: &ProviderContext,
    ) -> Result<Provider, CallbackError> {
        self.providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(idp_id)
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found("IDP-Ag2nt", "Identity provider not found").into()
            })
    }
}

//! Single-use correlation of SAML logout responses.
//!
//! The logout initiator stores a [`FederatedLogout`] before redirecting the
//! browser to the IdP. When the IdP answers on the SLO endpoint, the entry is
//! read by RelayState and consumed with a compare-and-delete, so a response
//! delivered twice redirects at most once.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    cache::{Cache, CacheError},
    error::{CallbackError, DomainError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederatedLogoutState {
    Created,
    Redirected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedLogout {
    pub instance_id: String,
    pub session_id: String,
    #[serde(default)]
    pub idp_id: Option<String>,
    pub state: FederatedLogoutState,
    pub post_logout_redirect_uri: String,
}

/// A pending logout as read from the cache.
#[derive(Debug, Clone)]
pub struct PendingLogout {
    pub logout: FederatedLogout,
    raw: Vec<u8>,
}

#[derive(Clone)]
pub struct FederatedLogoutCorrelator {
    cache: Arc<dyn Cache>,
    instance_id: String,
}

impl FederatedLogoutCorrelator {
    pub fn new(cache: Arc<dyn Cache>, instance_id: impl Into<String>) -> Self {
        Self {
            cache,
            instance_id: instance_id.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn key(instance_id: &str, key: &str) -> String {
        format!("federated_logout:request_id:{instance_id}:{key}")
    }

    /// Store a logout under its session id. Used by the logout initiator.
    pub async fn register(&self, logout: &FederatedLogout, ttl: Duration) -> Result<(), CacheError> {
        let key = Self::key(&logout.instance_id, &logout.session_id);
        let value = serde_json::to_vec(logout).map_err(|e| CacheError::Encode(e.to_string()))?;
        self.cache.put(&key, &value, Some(ttl)).await
    }

    /// Find the logout awaiting the IdP response correlated by `relay_state`.
    ///
    /// Absent entries and entries not in [`FederatedLogoutState::Redirected`] are
    /// both reported as not found.
    pub async fn lookup(&self, relay_state: &str) -> Result<PendingLogout, CallbackError> {
        let not_found = || DomainError::not_found("SAML-3uor2", "Logout request not found");
        let raw = self
            .cache
            .get(&Self::key(&self.instance_id, relay_state))
            .await?
            .ok_or_else(not_found)?;
        let logout: FederatedLogout = serde_json::from_slice(&raw)
            .map_err(|e| CacheError::Decode(e.to_string()))?;
        if logout.state != FederatedLogoutState::Redirected {
            return Err(not_found().into());
        }
        Ok(PendingLogout { logout, raw })
    }

    /// Remove the entry if it still holds what [`lookup`](Self::lookup) read.
    ///
    /// Returns false when another delivery consumed it first.
    pub async fn consume(&self, pending: &PendingLogout) -> Result<bool, CacheError> {
        let key = Self::key(&pending.logout.instance_id, &pending.logout.session_id);
        self.cache.take_if_eq(&key, &pending.raw).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Barrier;

    use super::*;
    use crate::{cache::MemoryCache, config::MemoryCacheConfig};

    fn correlator() -> FederatedLogoutCorrelator {
        let cache = Arc::new(MemoryCache::new(&MemoryCacheConfig::default()));
        FederatedLogoutCorrelator::new(cache, "instance-1")
    }

    fn logout(state: FederatedLogoutState) -> FederatedLogout {
        FederatedLogout {
            instance_id: "instance-1".into(),
            session_id: "session-1".into(),
            idp_id: Some("idp-1".into()),
            state,
            post_logout_redirect_uri: "https://app.example.com/logged-out".into(),
        }
    }

    #[test]
    fn key_layout() {
        assert_eq!(
            FederatedLogoutCorrelator::key("inst", "sess"),
            "federated_logout:request_id:inst:sess"
        );
    }

    #[tokio::test]
    async fn lookup_and_consume_once() {
        let correlator = correlator();
        correlator
            .register(&logout(FederatedLogoutState::Redirected), Duration::from_secs(60))
            .await
            .unwrap();

        let pending = correlator.lookup("session-1").await.unwrap();
        assert_eq!(
            pending.logout.post_logout_redirect_uri,
            "https://app.example.com/logged-out"
        );
        assert!(correlator.consume(&pending).await.unwrap());
        assert!(!correlator.consume(&pending).await.unwrap());
        assert!(correlator.lookup("session-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn only_redirected_state_is_accepted() {
        let correlator = correlator();
        correlator
            .register(&logout(FederatedLogoutState::Created), Duration::from_secs(60))
            .await
            .unwrap();

        let err = correlator.lookup("session-1").await.unwrap_err();
        assert_eq!(err.failure_params().0, "SAML-3uor2");
    }

    #[tokio::test]
    async fn other_instance_is_not_visible() {
        let correlator = correlator();
        let mut foreign = logout(FederatedLogoutState::Redirected);
        foreign.instance_id = "instance-2".into();
        correlator
            .register(&foreign, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(correlator.lookup("session-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn two_reads_of_one_entry_consume_once() {
        let correlator = correlator();
        correlator
            .register(&logout(FederatedLogoutState::Redirected), Duration::from_secs(60))
            .await
            .unwrap();

        let first = correlator.lookup("session-1").await.unwrap();
        let second = correlator.lookup("session-1").await.unwrap();

        let consumed = [
            correlator.consume(&first).await.unwrap(),
            correlator.consume(&second).await.unwrap(),
        ];
        assert_eq!(consumed.iter().filter(|c| **c).count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deliveries_consume_once() {
        const DELIVERIES: usize = 8;
        let correlator = correlator();

        for round in 0..100 {
            correlator
                .register(&logout(FederatedLogoutState::Redirected), Duration::from_secs(60))
                .await
                .unwrap();
            let start = Arc::new(Barrier::new(DELIVERIES));

            let handles: Vec<_> = (0..DELIVERIES)
                .map(|_| {
                    let correlator = correlator.clone();
                    let start = start.clone();
                    tokio::spawn(async move {
                        // Every delivery reads the entry before any of them consumes it
                        let pending = correlator.lookup("session-1").await.unwrap();
                        start.wait().await;
                        correlator.consume(&pending).await.unwrap()
                    })
                })
                .collect();

            let mut consumed = 0;
            for handle in handles {
                consumed += usize::from(handle.await.unwrap());
            }
            assert_eq!(consumed, 1, "round {round}");
        }
    }
}

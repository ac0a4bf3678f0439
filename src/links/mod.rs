//! Resolution of external identities to local users.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
pub use memory::MemoryUserLinkStore;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CallbackError, DomainError, StoreError},
    idp::{IdpSession, IdpUser},
};

/// Persisted association of an external identity with a local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLink {
    pub user_id: String,
    pub idp_id: String,
    pub external_user_id: String,
    #[serde(default)]
    pub external_user_name: Option<String>,
}

impl UserLink {
    pub fn new(
        user_id: impl Into<String>,
        idp_id: impl Into<String>,
        external_user_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            idp_id: idp_id.into(),
            external_user_id: external_user_id.into(),
            external_user_name: None,
        }
    }
}

#[async_trait]
pub trait UserLinkStore: Send + Sync {
    /// All links matching `(idp_id, external_user_id)` exactly.
    async fn search_links(
        &self,
        idp_id: &str,
        external_user_id: &str,
    ) -> Result<Vec<UserLink>, StoreError>;

    /// Rewrite the link of `user_id` from `previous_id` to `current_id` in one step.
    async fn migrate_link(
        &self,
        user_id: &str,
        idp_id: &str,
        previous_id: &str,
        current_id: &str,
    ) -> Result<(), StoreError>;
}

pub type SharedUserLinkStore = Arc<dyn UserLinkStore>;

#[derive(Clone)]
pub struct UserLinkResolver {
    store: SharedUserLinkStore,
}

impl UserLinkResolver {
    pub fn new(store: SharedUserLinkStore) -> Self {
        Self { store }
    }

    /// Local user linked to the external identity.
    ///
    /// Returns `None` for zero or several matches. Only query and backend
    /// failures are errors.
    pub async fn resolve(
        &self,
        idp_id: &str,
        external_user_id: &str,
    ) -> Result<Option<String>, CallbackError> {
        if idp_id.is_empty() || external_user_id.is_empty() {
            return Err(
                DomainError::invalid_argument("LINK-x8Rq2", "Identity link query is incomplete")
                    .into(),
            );
        }
        let mut links = self.store.search_links(idp_id, external_user_id).await?;
        if links.len() != 1 {
            return Ok(None);
        }
        Ok(links.pop().map(|link| link.user_id))
    }

    /// Move a user's link to the current external id if the session reports the
    /// id the provider used before.
    ///
    /// The user found under the previous id is returned even when rewriting the
    /// link fails; that failure is only logged.
    pub async fn try_migrate(
        &self,
        intent_id: &str,
        idp_id: &str,
        user: &IdpUser,
        session: &dyn IdpSession,
    ) -> Result<Option<String>, CallbackError> {
        let Some(migration) = session.migration() else {
            return Ok(None);
        };
        let previous_id = match migration.retrieve_previous_id()? {
            Some(id) if !id.is_empty() => id,
            _ => return Ok(None),
        };
        let Some(user_id) = self.resolve(idp_id, &previous_id).await? else {
            return Ok(None);
        };
        match self
            .store
            .migrate_link(&user_id, idp_id, &previous_id, &user.id)
            .await
        {
            Ok(()) => tracing::info!(
                intent = intent_id,
                idp_id,
                user_id = %user_id,
                previous_id = %previous_id,
                "Migrated external user link"
            ),
            Err(e) => tracing::error!(
                intent = intent_id,
                idp_id,
                user_id = %user_id,
                previous_id = %previous_id,
                error = %e,
                "Migration of external user failed"
            ),
        }
        Ok(Some(user_id))
    }

    /// Lookup followed by migration when nothing is linked. Failures of either
    /// step are logged and treated as "no local user".
    pub async fn resolve_or_migrate(
        &self,
        intent_id: &str,
        idp_id: &str,
        user: &IdpUser,
        session: &dyn IdpSession,
    ) -> Option<String> {
        let user_id = self
            .resolve(idp_id, &user.id)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(
                    intent = intent_id,
                    idp_id,
                    external_user = %user.id,
                    error = %e,
                    "Could not check if idp user already exists"
                );
                None
            });
        if user_id.is_some() {
            return user_id;
        }

        self.try_migrate(intent_id, idp_id, user, session)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(
                    intent = intent_id,
                    idp_id,
                    external_user = %user.id,
                    error = %e,
                    "Migration of external user failed"
                );
                None
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tests::StaticSession;

    /// Finds links but refuses to rewrite them.
    struct ReadOnlyLinks(Vec<UserLink>);

    #[async_trait]
    impl UserLinkStore for ReadOnlyLinks {
        async fn search_links(
            &self,
            idp_id: &str,
            external_user_id: &str,
        ) -> Result<Vec<UserLink>, StoreError> {
            Ok(self
                .0
                .iter()
                .filter(|l| l.idp_id == idp_id && l.external_user_id == external_user_id)
                .cloned()
                .collect())
        }

        async fn migrate_link(
            &self,
            _user_id: &str,
            _idp_id: &str,
            _previous_id: &str,
            _current_id: &str,
        ) -> Result<(), StoreError> {
            Err(StoreError::Backend("read-only replica".into()))
        }
    }

    async fn resolver(links: Vec<UserLink>) -> (UserLinkResolver, Arc<MemoryUserLinkStore>) {
        let store = Arc::new(MemoryUserLinkStore::new());
        for link in links {
            store.add(link).await;
        }
        (UserLinkResolver::new(store.clone()), store)
    }

    #[tokio::test]
    async fn exactly_one_link_resolves() {
        let (resolver, _) = resolver(vec![UserLink::new("user-1", "idp", "ext-1")]).await;
        assert_eq!(
            resolver.resolve("idp", "ext-1").await.unwrap().as_deref(),
            Some("user-1")
        );
    }

    #[tokio::test]
    async fn zero_or_ambiguous_links_resolve_to_none() {
        let (resolver, _) = resolver(vec![
            UserLink::new("user-1", "idp", "shared"),
            UserLink::new("user-2", "idp", "shared"),
        ])
        .await;
        assert_eq!(resolver.resolve("idp", "shared").await.unwrap(), None);
        assert_eq!(resolver.resolve("idp", "unknown").await.unwrap(), None);
        assert_eq!(resolver.resolve("other-idp", "shared").await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_and_backend_failures_are_errors() {
        let (resolver, store) = resolver(Vec::new()).await;
        assert!(resolver.resolve("idp", "").await.is_err());

        store.set_unavailable(true);
        assert!(matches!(
            resolver.resolve("idp", "ext").await,
            Err(CallbackError::Store(StoreError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn migration_rewrites_resolved_previous_id() {
        let (resolver, store) = resolver(vec![UserLink::new("user-1", "idp", "old-sub")]).await;
        let session = StaticSession::new("new-oid").with_previous_id("old-sub");
        let user = session.user();

        let user_id = resolver.resolve_or_migrate("intent", "idp", &user, &session).await;
        assert_eq!(user_id.as_deref(), Some("user-1"));
        assert_eq!(
            resolver.resolve("idp", "new-oid").await.unwrap().as_deref(),
            Some("user-1")
        );
        assert!(store.search_links("idp", "old-sub").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn migration_needs_a_resolvable_previous_id() {
        let (resolver, store) = resolver(vec![
            UserLink::new("user-1", "idp", "old-sub"),
            UserLink::new("user-2", "idp", "old-sub"),
        ])
        .await;

        // Ambiguous previous id
        let session = StaticSession::new("new-oid").with_previous_id("old-sub");
        let user = session.user();
        assert_eq!(resolver.try_migrate("intent", "idp", &user, &session).await.unwrap(), None);

        // Empty previous id
        let session = StaticSession::new("new-oid").with_previous_id("");
        assert_eq!(resolver.try_migrate("intent", "idp", &user, &session).await.unwrap(), None);

        // No migration capability
        let session = StaticSession::new("new-oid");
        assert_eq!(resolver.try_migrate("intent", "idp", &user, &session).await.unwrap(), None);

        assert_eq!(store.search_links("idp", "old-sub").await.unwrap().len(), 2);
        assert!(store.search_links("idp", "new-oid").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn direct_link_skips_migration() {
        let (resolver, store) = resolver(vec![
            UserLink::new("user-1", "idp", "new-oid"),
            UserLink::new("user-2", "idp", "old-sub"),
        ])
        .await;
        let session = StaticSession::new("new-oid").with_previous_id("old-sub");
        let user = session.user();

        let user_id = resolver.resolve_or_migrate("intent", "idp", &user, &session).await;
        assert_eq!(user_id.as_deref(), Some("user-1"));
        assert_eq!(store.search_links("idp", "old-sub").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn advisory_failures_yield_no_user() {
        let (resolver, store) = resolver(vec![UserLink::new("user-1", "idp", "ext")]).await;
        store.set_unavailable(true);
        let session = StaticSession::new("ext").with_previous_id("old");
        let user = session.user();

        assert_eq!(
            resolver.resolve_or_migrate("intent", "idp", &user, &session).await,
            None
        );
    }

    #[tokio::test]
    async fn failed_link_rewrite_keeps_previous_user() {
        let store = ReadOnlyLinks(vec![UserLink::new("user-1", "idp", "old-sub")]);
        let resolver = UserLinkResolver::new(Arc::new(store));
        let session = StaticSession::new("new-oid").with_previous_id("old-sub");
        let user = session.user();

        let user_id = resolver.resolve_or_migrate("intent", "idp", &user, &session).await;
        assert_eq!(user_id.as_deref(), Some("user-1"));
    }
}

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{UserLink, UserLinkStore};
use crate::error::StoreError;

/// In-memory identity link table.
#[derive(Default)]
pub struct MemoryUserLinkStore {
    links: RwLock<Vec<UserLink>>,
    unavailable: AtomicBool,
}

impl MemoryUserLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, link: UserLink) {
        self.links.write().await.push(link);
    }

    /// Make every operation fail with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Backend("link store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserLinkStore for MemoryUserLinkStore {
    async fn search_links(
        &self,
        idp_id: &str,
        external_user_id: &str,
    ) -> Result<Vec<UserLink>, StoreError> {
        self.check_available()?;
        let links = self.links.read().await;
        Ok(links
            .iter()
            .filter(|link| link.idp_id == idp_id && link.external_user_id == external_user_id)
            .cloned()
            .collect())
    }

    async fn migrate_link(
        &self,
        user_id: &str,
        idp_id: &str,
        previous_id: &str,
        current_id: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut links = self.links.write().await;
        let link = links
            .iter_mut()
            .find(|link| {
                link.user_id == user_id
                    && link.idp_id == idp_id
                    && link.external_user_id == previous_id
            })
            .ok_or_else(|| StoreError::NotFound(format!("link {idp_id}/{previous_id}")))?;
        link.external_user_id = current_id.to_string();
        Ok(())
    }
}

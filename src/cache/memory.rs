use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Cache, CacheResult};
use crate::config::MemoryCacheConfig;

struct Slot {
    value: Vec<u8>,
    deadline: Option<Instant>,
    read_at: Instant,
}

impl Slot {
    fn live(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|deadline| now <= deadline)
    }
}

/// Process-local cache on a [`DashMap`].
///
/// Entries are scoped to one node: a logout started on one instance can only be
/// completed by a callback that reaches the same instance. Use Redis when
/// running more than one.
pub struct MemoryCache {
    slots: DashMap<String, Slot>,
    capacity: usize,
    eviction_batch: usize,
}

impl MemoryCache {
    pub fn new(config: &MemoryCacheConfig) -> Self {
        Self {
            slots: DashMap::new(),
            capacity: config.max_entries,
            eviction_batch: config.eviction_batch_size.max(1),
        }
    }

    /// Drop expired slots, then the least recently read ones until a batch is free.
    fn make_room(&self) {
        if self.slots.len() < self.capacity {
            return;
        }
        let now = Instant::now();
        self.slots.retain(|_, slot| slot.live(now));

        let keep = self.capacity.saturating_sub(self.eviction_batch);
        let excess = self.slots.len().saturating_sub(keep);
        if self.slots.len() < self.capacity || excess == 0 {
            return;
        }

        let mut by_age: Vec<(Instant, String)> = self
            .slots
            .iter()
            .map(|slot| (slot.read_at, slot.key().clone()))
            .collect();
        by_age.sort_unstable();
        for (_, key) in by_age.into_iter().take(excess) {
            self.slots.remove(&key);
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let Some(mut slot) = self.slots.get_mut(key) else {
            return Ok(None);
        };
        if !slot.live(now) {
            drop(slot);
            self.slots.remove_if(key, |_, slot| !slot.live(now));
            return Ok(None);
        }
        slot.read_at = now;
        Ok(Some(slot.value.clone()))
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.make_room();
        let now = Instant::now();
        self.slots.insert(
            key.to_string(),
            Slot {
                value: value.to_vec(),
                deadline: ttl.map(|ttl| now + ttl),
                read_at: now,
            },
        );
        Ok(())
    }

    async fn take_if_eq(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        let now = Instant::now();
        // The shard lock is held across the comparison
        let taken = self
            .slots
            .remove_if(key, |_, slot| slot.live(now) && slot.value == expected);
        Ok(taken.is_some())
    }
}

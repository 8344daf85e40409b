// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Persist, PersistStrategy};
use crate::error::{Error, ErrorKind};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Vec<u8>>,

    /// Keys in insertion order, used to pick the eviction victim.
    order: Vec<String>,
}

/// In-memory persistence backed by a map guarded by a mutex.
///
/// Survives reconnects but not process restarts.
#[derive(Debug, Default)]
pub struct MemoryPersist {
    inner: Mutex<Inner>,
    strategy: PersistStrategy,
}

impl MemoryPersist {
    #[must_use]
    pub fn new(strategy: PersistStrategy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            strategy,
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().entries.is_empty()
    }
}

impl Persist for MemoryPersist {
    fn name(&self) -> &str {
        "MemoryPersist"
    }

    fn store(&self, key: &str, packet: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();

        if inner.entries.contains_key(key) {
            if self.strategy.duplicate_replace() {
                inner.entries.insert(key.to_string(), packet.to_vec());
            }
            return Ok(());
        }

        let max_count = self.strategy.max_count() as usize;
        if max_count > 0 && inner.entries.len() >= max_count {
            if self.strategy.drop_on_exceed() {
                return Err(Error::from_string(
                    ErrorKind::PacketDropped,
                    format!("memory persist full, dropped key {key}"),
                ));
            }
            // Evict the oldest entry to make room.
            let victim = inner.order.remove(0);
            inner.entries.remove(&victim);
        }

        inner.entries.insert(key.to_string(), packet.to_vec());
        inner.order.push(key.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().entries.get(key).cloned()
    }

    fn range(&self, visitor: &mut dyn FnMut(&str, &[u8]) -> bool) {
        let inner = self.inner.lock().unwrap();
        for key in &inner.order {
            if let Some(packet) = inner.entries.get(key) {
                if !visitor(key, packet) {
                    break;
                }
            }
        }
    }

    fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(key);
        inner.order.retain(|k| k != key);
    }

    fn destroy(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.order.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_store_load_delete() {
        let persist = MemoryPersist::new(PersistStrategy::default());
        persist.store("S1", b"one").unwrap();
        persist.store("S2", b"two").unwrap();
        assert_eq!(persist.load("S1"), Some(b"one".to_vec()));
        assert_eq!(persist.len(), 2);

        persist.delete("S1");
        assert!(persist.load("S1").is_none());
        assert_eq!(persist.len(), 1);
    }

    #[test]
    fn test_duplicate_replace() {
        let persist = MemoryPersist::new(PersistStrategy::default());
        persist.store("S1", b"old").unwrap();
        persist.store("S1", b"new").unwrap();
        assert_eq!(persist.load("S1"), Some(b"new".to_vec()));
        assert_eq!(persist.len(), 1);
    }

    #[test]
    fn test_duplicate_keep() {
        let strategy = PersistStrategy::new(Duration::ZERO, 0, false, false);
        let persist = MemoryPersist::new(strategy);
        persist.store("S1", b"old").unwrap();
        persist.store("S1", b"new").unwrap();
        assert_eq!(persist.load("S1"), Some(b"old".to_vec()));
    }

    #[test]
    fn test_drop_on_exceed() {
        let strategy = PersistStrategy::new(Duration::ZERO, 2, true, true);
        let persist = MemoryPersist::new(strategy);
        persist.store("S1", b"one").unwrap();
        persist.store("S2", b"two").unwrap();
        let err = persist.store("S3", b"three").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PacketDropped);
        assert!(persist.load("S3").is_none());
    }

    #[test]
    fn test_evict_oldest_on_exceed() {
        let strategy = PersistStrategy::new(Duration::ZERO, 2, false, true);
        let persist = MemoryPersist::new(strategy);
        persist.store("S1", b"one").unwrap();
        persist.store("S2", b"two").unwrap();
        persist.store("S3", b"three").unwrap();
        assert!(persist.load("S1").is_none());
        assert_eq!(persist.load("S3"), Some(b"three".to_vec()));
        assert_eq!(persist.len(), 2);
    }

    #[test]
    fn test_range_in_insertion_order() {
        let persist = MemoryPersist::new(PersistStrategy::default());
        persist.store("S2", b"two").unwrap();
        persist.store("S1", b"one").unwrap();

        let mut keys = Vec::new();
        persist.range(&mut |key, _packet| {
            keys.push(key.to_string());
            true
        });
        assert_eq!(keys, ["S2", "S1"]);
    }

    #[test]
    fn test_destroy() {
        let persist = MemoryPersist::new(PersistStrategy::default());
        persist.store("S1", b"one").unwrap();
        persist.destroy().unwrap();
        assert!(persist.is_empty());
    }
}

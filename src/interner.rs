//! String interner.
//!
//! Maps recurring strings to the integer ids the store assigns them. Known
//! strings are answered from an in-process cache. An unknown string is
//! inserted (a duplicate-key conflict is ignored), then the whole table is
//! reread into the cache, so an id minted by another writer or by an earlier
//! run is picked up as well. The insert-then-reread cycle is bounded by a
//! retry limit.

use ahash::AHashMap;
use log::debug;

use crate::error::{Result, TagstoreError};
use crate::store::{StringKind, StringTable};

/// Default number of insert-then-reread attempts.
pub const DEFAULT_RETRY_LIMIT: usize = 4;

#[derive(Debug, Clone)]
pub struct Interner {
    caches: AHashMap<StringKind, AHashMap<String, i64>>,
    retry_limit: usize,
}

impl Default for Interner {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_LIMIT)
    }
}

impl Interner {
    pub fn new(retry_limit: usize) -> Self {
        Interner {
            caches: AHashMap::new(),
            retry_limit: retry_limit.max(1),
        }
    }

    /// Load every table into the cache.
    pub fn preload<T: StringTable + ?Sized>(&mut self, store: &T) -> Result<()> {
        for kind in StringKind::ALL {
            self.reload(store, kind)?;
        }
        Ok(())
    }

    /// Cached id of `value`, without touching the store.
    pub fn cached(&self, kind: StringKind, value: &str) -> Option<i64> {
        self.caches.get(&kind).and_then(|cache| cache.get(value)).copied()
    }

    /// Number of cached strings of `kind`.
    pub fn len(&self, kind: StringKind) -> usize {
        self.caches.get(&kind).map_or(0, |cache| cache.len())
    }

    /// Id of `value`, minting one when the store has never seen it.
    pub fn resolve_id<T: StringTable + ?Sized>(
        &mut self,
        store: &mut T,
        kind: StringKind,
        value: &str,
    ) -> Result<i64> {
        if let Some(id) = self.cached(kind, value) {
            return Ok(id);
        }

        for attempt in 1..=self.retry_limit {
            if store.insert_string(kind, value)? {
                debug!("interned new {kind} '{value}'");
            }
            self.reload(store, kind)?;
            if let Some(id) = self.cached(kind, value) {
                return Ok(id);
            }
            debug!("{kind} '{value}' missing after insert, attempt {attempt}");
        }

        Err(TagstoreError::identity(kind.to_string(), value))
    }

    fn reload<T: StringTable + ?Sized>(&mut self, store: &T, kind: StringKind) -> Result<()> {
        let cache = self.caches.entry(kind).or_default();
        cache.clear();
        cache.extend(store.strings(kind)?);
        Ok(())
    }
}

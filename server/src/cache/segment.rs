//! A single bounded LRU map with transactional access.

use crate::error::ServerError;
use log::debug;
use lru::LruCache;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use tokio::sync::{Mutex, MutexGuard};

/// Fixed-capacity LRU map guarded by its own lock.
///
/// The convenience methods each take the lock for one operation. Callers that
/// need a read-modify-write sequence open a [`Transaction`] with [`begin`].
///
/// [`begin`]: Segment::begin
pub struct Segment<K, V> {
    name: &'static str,
    capacity: NonZeroUsize,
    entries: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> Segment<K, V> {
    pub fn new(name: &'static str, capacity: usize) -> Result<Self, ServerError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(ServerError::CacheCapacity(name))?;
        Ok(Self {
            name,
            capacity,
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Acquires the segment lock until the transaction is committed or dropped.
    pub async fn begin(&self) -> Transaction<'_, K, V> {
        Transaction {
            name: self.name,
            entries: self.entries.lock().await,
        }
    }

    pub async fn add(&self, key: K, value: V) {
        self.begin().await.add(key, value);
    }

    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.begin().await.get(key)
    }

    pub async fn evict<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.begin().await.evict(key)
    }

    pub async fn mappings(&self) -> Vec<(K, V)> {
        self.begin().await.mappings()
    }

    pub async fn len(&self) -> usize {
        self.begin().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Exclusive access to one segment.
pub struct Transaction<'a, K, V> {
    name: &'static str,
    entries: MutexGuard<'a, LruCache<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> Transaction<'_, K, V> {
    /// Inserts or replaces `key`, dropping the least recently used entry when full.
    pub fn add(&mut self, key: K, value: V) {
        self.entries.put(key, value);
    }

    /// Returns a copy of the value and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).cloned()
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    /// Membership test that leaves recency untouched.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains(key)
    }

    pub fn evict<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let evicted = self.entries.pop(key).is_some();
        if evicted {
            debug!("Evicted entry from {} segment", self.name);
        }
        evicted
    }

    /// All pairs, most recently used first.
    pub fn mappings(&self) -> Vec<(K, V)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Visits every value without changing recency and evicts the entries for
    /// which `keep` returns `false`. Returns the number of evicted entries.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let dropped: Vec<K> = self
            .entries
            .iter_mut()
            .filter_map(|(key, value)| (!keep(key, value)).then(|| key.clone()))
            .collect();

        for key in &dropped {
            self.entries.pop(key);
        }
        if !dropped.is_empty() {
            debug!("Evicted {} entries from {} segment", dropped.len(), self.name);
        }
        dropped.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn commit(self) {}
}

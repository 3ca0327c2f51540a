use std::hash::Hash;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub type CacheKey = String;

/// Derives the cache key for one set of arguments. Arguments that cannot be
/// keyed are an error, never a shared fallback key.
pub type KeyFn<A> = fn(&A) -> Result<CacheKey>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Session-lifetime memo table. Entries are kept in insertion order and are
/// never evicted; failed computations are not stored.
#[derive(Debug, Clone)]
pub struct MemoCache<K, V> {
    entries: IndexMap<K, V>,
    stats: CacheStats,
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            stats: CacheStats::default(),
        }
    }
}

impl<K, V> MemoCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl<K: Hash + Eq, V: Clone> MemoCache<K, V> {
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.entries.get(&key) {
            self.stats.hits += 1;
            return Ok(value.clone());
        }
        let value = compute()?;
        self.stats.misses += 1;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}

/// An operation wrapped in a [`MemoCache`], keyed by `key_of(args)`.
///
/// The wrapped operation is passed per call, so one wrapper type serves pure
/// computations, network calls and disk writes alike.
pub struct Memoized<A: ?Sized, V> {
    label: &'static str,
    key_of: KeyFn<A>,
    cache: MemoCache<CacheKey, V>,
}

impl<A: ?Sized, V> std::fmt::Debug for Memoized<A, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoized")
            .field("label", &self.label)
            .field("entries", &self.cache.len())
            .field("stats", &self.cache.stats())
            .finish()
    }
}

impl<A: ?Sized, V: Clone> Memoized<A, V> {
    pub fn new(label: &'static str, key_of: KeyFn<A>) -> Self {
        Self {
            label,
            key_of,
            cache: MemoCache::new(),
        }
    }

    pub fn call(&mut self, args: &A, op: impl FnOnce(&A) -> Result<V>) -> Result<V> {
        let key = (self.key_of)(args)
            .with_context(|| format!("failed to key {} arguments", self.label))?;
        if self.cache.peek(&key).is_some() {
            log::debug!("{} cache hit ({})", self.label, short(&key));
        }
        self.cache.get_or_try_insert_with(key, || op(args))
    }

    /// Whether `args` already has a cached value. Unkeyable arguments never do.
    pub fn contains(&self, args: &A) -> bool {
        (self.key_of)(args)
            .map(|key| self.cache.peek(&key).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// sha256 of the compact JSON form of `value`.
pub fn stable_key<T: Serialize + ?Sized>(value: &T) -> Result<CacheKey> {
    let bytes = serde_json::to_vec(value).context("value has no JSON form")?;
    Ok(bytes_key(&bytes))
}

pub fn bytes_key(bytes: &[u8]) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

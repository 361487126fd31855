//! Named prepared statements and their reuse cache.
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::{protocol::Oid, result::FieldDescriptor, types::Decoder};

pub(crate) const DEFAULT_PREPARE_THRESHOLD: u32 = 5;
pub(crate) const DEFAULT_CACHE_SIZE: usize = 100;

/// A server side statement name, formatted from a cache slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct StatementName {
    buf: [u8; 8],
    len: u8,
}

impl StatementName {
    /// The unnamed statement.
    pub(crate) const UNNAMED: Self = Self { buf: [0u8; 8], len: 0 };

    pub(crate) fn from_slot(slot: u16) -> Self {
        let mut buf = *b"_pw_0000";
        let mut itoa_buf = itoa::Buffer::new();
        let digits = itoa_buf.format(slot).as_bytes();
        buf[8 - digits.len()..].copy_from_slice(digits);
        Self { buf, len: 8 }
    }

    pub(crate) fn is_unnamed(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn as_str(&self) -> &str {
        // only written from ascii literals and digits
        unsafe { std::str::from_utf8_unchecked(&self.buf[..self.len as usize]) }
    }
}

impl std::fmt::Display for StatementName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key of a statement, the oid fingerprint disambiguates the same
/// sql bound with different parameter types.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct CacheKey {
    pub(crate) sql: Box<str>,
    pub(crate) param_oids: Box<[Oid]>,
}

/// Per format decoders resolved from a cached row description.
#[derive(Clone, Default)]
pub(crate) struct CachedDecoders {
    pub(crate) text: Option<Arc<[Decoder]>>,
    pub(crate) binary: Option<Arc<[Decoder]>>,
}

/// Cache state of a single statement.
pub(crate) struct CachedStatement {
    pub(crate) slot: u16,
    pub(crate) name: StatementName,
    /// Whether the server holds this statement in its prepared form.
    pub(crate) prepared: bool,
    pub(crate) num_executed: u32,
    pub(crate) fields: Option<Arc<[FieldDescriptor]>>,
    pub(crate) decoders: CachedDecoders,
}

impl CachedStatement {
    pub(crate) fn new(slot: u16) -> Self {
        Self {
            slot,
            name: StatementName::from_slot(slot),
            prepared: false,
            num_executed: 1,
            fields: None,
            decoders: CachedDecoders::default(),
        }
    }

    /// Forget the server side state, keeps the slot and its name.
    pub(crate) fn reset(&mut self) {
        self.prepared = false;
        self.num_executed = 0;
        self.fields = None;
        self.decoders = CachedDecoders::default();
    }
}

/// LRU cache of executed statements.
pub(crate) struct StatementCache {
    entries: LruCache<CacheKey, CachedStatement>,
}

impl StatementCache {
    pub(crate) fn new(cache_size: usize) -> Self {
        // slots are numbered by a u16
        let cap = NonZeroUsize::new(cache_size.min(u16::MAX as usize + 1))
            .unwrap_or(NonZeroUsize::MIN);
        Self { entries: LruCache::new(cap) }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.entries.len() == self.entries.cap().get()
    }

    /// Look up without disturbing the recency order.
    pub(crate) fn peek_mut(&mut self, key: &CacheKey) -> Option<&mut CachedStatement> {
        self.entries.peek_mut(key)
    }

    /// Mark as most recently used.
    pub(crate) fn touch(&mut self, key: &CacheKey) -> Option<&mut CachedStatement> {
        self.entries.get_mut(key)
    }

    /// Evict the least recently used entry to make room.
    pub(crate) fn pop_lru(&mut self) -> Option<CachedStatement> {
        self.entries.pop_lru().map(|(_, entry)| entry)
    }

    pub(crate) fn insert(&mut self, key: CacheKey, entry: CachedStatement) {
        debug_assert!(!self.is_full());
        self.entries.put(key, entry);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(sql: &str) -> CacheKey {
        CacheKey { sql: sql.into(), param_oids: Box::new([]) }
    }

    #[test]
    fn statement_names_are_fixed_width() {
        assert_eq!(StatementName::from_slot(0).as_str(), "_pw_0000");
        assert_eq!(StatementName::from_slot(42).as_str(), "_pw_0042");
        assert_eq!(StatementName::from_slot(9999).as_str(), "_pw_9999");
        assert!(StatementName::UNNAMED.is_unnamed());
        assert_eq!(StatementName::UNNAMED.as_str(), "");
    }

    #[test]
    fn key_includes_param_oids() {
        let text = CacheKey { sql: "SELECT $1".into(), param_oids: Box::new([25]) };
        let int = CacheKey { sql: "SELECT $1".into(), param_oids: Box::new([23]) };
        assert_ne!(text, int);
    }

    #[test]
    fn lru_eviction_order() {
        let mut cache = StatementCache::new(2);
        cache.insert(key("a"), CachedStatement::new(0));
        cache.insert(key("b"), CachedStatement::new(1));
        assert!(cache.is_full());
        // touching `a` makes `b` the eviction candidate
        cache.touch(&key("a"));
        let evicted = cache.pop_lru().unwrap();
        assert_eq!(evicted.slot, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn peek_keeps_recency() {
        let mut cache = StatementCache::new(2);
        cache.insert(key("a"), CachedStatement::new(0));
        cache.insert(key("b"), CachedStatement::new(1));
        cache.peek_mut(&key("a"));
        let evicted = cache.pop_lru().unwrap();
        assert_eq!(evicted.slot, 0);
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Bounded per-chat language cache.
///
/// Entries expire after `ttl_secs` and the oldest entry is evicted once
/// `capacity` is reached. `invalidate` is called on every append for the
/// chat, so a cached value is never staler than the entry TTL and usually
/// much fresher. Keys are chat IDs — a value can never leak across chats.
pub struct LanguageCache {
    capacity: usize,
    ttl_secs: i64,
    entries: HashMap<String, CachedLanguage>,
}

struct CachedLanguage {
    language: String,
    cached_at: DateTime<Utc>,
}

impl LanguageCache {
    pub fn new(capacity: usize, ttl_secs: i64) -> Self {
        Self {
            capacity,
            ttl_secs,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, chat_id: &str) -> Option<String> {
        let entry = self.entries.get(chat_id)?;
        let age = Utc::now()
            .signed_duration_since(entry.cached_at)
            .num_seconds();
        if age < self.ttl_secs {
            Some(entry.language.clone())
        } else {
            None
        }
    }

    pub fn insert(&mut self, chat_id: &str, language: &str) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(chat_id) {
            let oldest_key = self
                .entries
                .iter()
                .min_by_key(|(_, v)| v.cached_at)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest_key {
                self.entries.remove(&k);
            }
        }
        self.entries.insert(
            chat_id.to_string(),
            CachedLanguage {
                language: language.to_string(),
                cached_at: Utc::now(),
            },
        );
    }

    pub fn invalidate(&mut self, chat_id: &str) {
        self.entries.remove(chat_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let mut cache = LanguageCache::new(10, 300);
        cache.insert("42", "de");
        assert_eq!(cache.get("42").as_deref(), Some("de"));
    }

    #[test]
    fn miss_after_ttl() {
        let mut cache = LanguageCache::new(10, 0);
        cache.insert("42", "de");
        // ttl_secs = 0 means every entry is immediately stale
        assert_eq!(cache.get("42"), None);
    }

    #[test]
    fn invalidate_removes_entry() {
        let mut cache = LanguageCache::new(10, 300);
        cache.insert("42", "de");
        cache.invalidate("42");
        assert_eq!(cache.get("42"), None);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut cache = LanguageCache::new(2, 300);
        cache.insert("a", "en");
        cache.insert("b", "fr");
        cache.insert("c", "de");
        assert_eq!(cache.len(), 2);
        // "a" was oldest and should have been evicted
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c").as_deref(), Some("de"));
    }

    #[test]
    fn entries_never_cross_chats() {
        let mut cache = LanguageCache::new(10, 300);
        cache.insert("42", "de");
        assert_eq!(cache.get("43"), None);
    }
}

//! In-memory cache of decrypted list views.
//!
//! Listing endpoints are hit constantly by the browser extension (every
//! popup open, every autofill probe) and each miss costs a full-table decrypt
//! pass. The cache holds the last decrypted result per table; any mutation
//! invalidates the affected table and locking drops everything at once.

use std::time::Instant;

use crate::storage::types::{Credential, CreditCard, Folder, SecureNote};

/// Cached decrypted view for one table.
struct Entry<T> {
    rows: Vec<T>,
    cached_at: Instant,
}

impl<T: Clone> Entry<T> {
    fn fresh(rows: Vec<T>) -> Self {
        Self {
            rows,
            cached_at: Instant::now(),
        }
    }
}

/// Per-session cache of decrypted lists. Lives only while unlocked.
#[derive(Default)]
pub struct ListCache {
    credentials: Option<Entry<Credential>>,
    cards: Option<Entry<CreditCard>>,
    notes: Option<Entry<SecureNote>>,
    folders: Option<Entry<Folder>>,
}

macro_rules! cache_accessors {
    ($get:ident, $put:ident, $invalidate:ident, $field:ident, $ty:ty) => {
        pub fn $get(&self) -> Option<Vec<$ty>> {
            self.$field.as_ref().map(|entry| entry.rows.clone())
        }

        pub fn $put(&mut self, rows: Vec<$ty>) {
            self.$field = Some(Entry::fresh(rows));
        }

        pub fn $invalidate(&mut self) {
            self.$field = None;
        }
    };
}

impl ListCache {
    pub fn new() -> Self {
        Self::default()
    }

    cache_accessors!(
        credentials,
        put_credentials,
        invalidate_credentials,
        credentials,
        Credential
    );
    cache_accessors!(cards, put_cards, invalidate_cards, cards, CreditCard);
    cache_accessors!(notes, put_notes, invalidate_notes, notes, SecureNote);
    cache_accessors!(folders, put_folders, invalidate_folders, folders, Folder);

    /// Drop every cached list. Called on lock and on master password change.
    pub fn clear(&mut self) {
        self.credentials = None;
        self.cards = None;
        self.notes = None;
        self.folders = None;
    }

    /// Age of the oldest cached entry, if any. Exposed for diagnostics.
    pub fn oldest_entry_age(&self) -> Option<std::time::Duration> {
        [
            self.credentials.as_ref().map(|e| e.cached_at),
            self.cards.as_ref().map(|e| e.cached_at),
            self.notes.as_ref().map(|e| e.cached_at),
            self.folders.as_ref().map(|e| e.cached_at),
        ]
        .into_iter()
        .flatten()
        .min()
        .map(|earliest| earliest.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: i64) -> Folder {
        Folder {
            id,
            name: format!("folder-{}", id),
            icon: "folder".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let mut cache = ListCache::new();
        assert!(cache.folders().is_none());

        cache.put_folders(vec![folder(1), folder(2)]);
        let rows = cache.folders().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 1);
    }

    #[test]
    fn test_invalidate_is_per_table() {
        let mut cache = ListCache::new();
        cache.put_folders(vec![folder(1)]);
        cache.put_credentials(Vec::new());

        cache.invalidate_credentials();
        assert!(cache.credentials().is_none());
        assert!(cache.folders().is_some());
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut cache = ListCache::new();
        cache.put_folders(vec![folder(1)]);
        cache.put_notes(Vec::new());
        cache.put_cards(Vec::new());

        cache.clear();
        assert!(cache.folders().is_none());
        assert!(cache.notes().is_none());
        assert!(cache.cards().is_none());
        assert!(cache.oldest_entry_age().is_none());
    }
}

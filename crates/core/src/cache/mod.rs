//! Bounded per-version verse cache with LRU eviction.
//!
//! Two layers:
//!
//! - Raw store operations on [`StoreDb`] (in [`verses`]) return `Result` and
//!   fail closed.
//! - [`VerseCache`] wraps them with the fail-open policy the text-fetch path
//!   requires: a read failure degrades to a miss, a write failure to a no-op,
//!   both logged. Serving some text outranks cache freshness, so a broken
//!   cache must never fail a text request.
//!
//! Quota and lock stores deliberately have no such wrapper.

pub mod verses;

use crate::store::StoreDb;
use std::collections::BTreeMap;

/// Default per-version row cap, sized for licensing terms that cap the
/// number of retained verses per edition.
pub const DEFAULT_VERSE_CAPACITY: usize = 500;

/// Fail-open facade over the verse cache tables.
#[derive(Clone, Debug)]
pub struct VerseCache {
    db: StoreDb,
    capacity: usize,
}

impl VerseCache {
    pub fn new(db: StoreDb, capacity: usize) -> Self {
        Self { db, capacity }
    }

    /// Look up one verse; storage failure is a miss.
    pub async fn verse(&self, book: &str, chapter: u32, verse: u32, version: &str) -> Option<String> {
        match self.db.get_verse(book, chapter, verse, version).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("verse cache read failed, treating as miss: {e}");
                None
            }
        }
    }

    /// Look up an inclusive verse range; partial ranges and storage failures
    /// are misses.
    pub async fn verse_range(
        &self, book: &str, chapter: u32, verse_start: u32, verse_end: u32, version: &str,
    ) -> Option<String> {
        match self.db.get_verse_range(book, chapter, verse_start, verse_end, version).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("verse cache read failed, treating as miss: {e}");
                None
            }
        }
    }

    /// Look up a whole chapter validated against `expected_verse_count`.
    pub async fn chapter(
        &self, book: &str, chapter: u32, version: &str, expected_verse_count: u32,
    ) -> Option<BTreeMap<u32, String>> {
        match self.db.get_chapter(book, chapter, version, expected_verse_count).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("verse cache read failed, treating as miss: {e}");
                None
            }
        }
    }

    /// Known verse count for a chapter, if a provider fetch recorded one.
    pub async fn chapter_verse_count(&self, book: &str, chapter: u32, version: &str) -> Option<u32> {
        match self.db.chapter_verse_count(book, chapter, version).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("chapter meta read failed, treating as unknown: {e}");
                None
            }
        }
    }

    /// Store a batch of fetched verses; storage failure is a no-op.
    pub async fn store_verses(&self, book: &str, chapter: u32, verses: Vec<(u32, String)>, version: &str) {
        if let Err(e) = self.db.put_verses(book, chapter, verses, version, self.capacity).await {
            tracing::warn!("failed to cache verses for {book} {chapter} ({version}): {e}");
        }
    }

    /// Store a whole fetched chapter plus its verse-count bookkeeping.
    pub async fn store_chapter(&self, book: &str, chapter: u32, verses: Vec<(u32, String)>, version: &str) {
        let verse_count = verses.len() as u32;
        self.store_verses(book, chapter, verses, version).await;
        if let Err(e) = self.db.put_chapter_meta(book, chapter, version, verse_count).await {
            tracing::warn!("failed to record verse count for {book} {chapter} ({version}): {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wrapper_roundtrip() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let cache = VerseCache::new(db, DEFAULT_VERSE_CAPACITY);

        assert!(cache.verse("John", 3, 16, "ESV").await.is_none());

        cache
            .store_verses("John", 3, vec![(16, "text".to_string())], "ESV")
            .await;
        assert_eq!(cache.verse("John", 3, 16, "ESV").await.as_deref(), Some("text"));
    }

    #[tokio::test]
    async fn test_store_chapter_records_meta() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let cache = VerseCache::new(db, DEFAULT_VERSE_CAPACITY);

        let verses = (1..=31).map(|n| (n, format!("verse {n}"))).collect();
        cache.store_chapter("Genesis", 1, verses, "ESV").await;

        assert_eq!(cache.chapter_verse_count("Genesis", 1, "ESV").await, Some(31));
        let chapter = cache.chapter("Genesis", 1, "ESV", 31).await.unwrap();
        assert_eq!(chapter.len(), 31);
        assert!(cache.chapter("Genesis", 1, "ESV", 32).await.is_none());
    }
}

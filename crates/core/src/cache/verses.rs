//! Verse cache CRUD operations with per-version LRU eviction.
//!
//! The unit of truth is the verse: one row per (book, chapter, verse,
//! version). Reads are complete-or-miss: a range or chapter is served only
//! when every verse is present, and every hit bumps `last_used_at`. Writes
//! are UPSERTs that evict the least-recently-used rows of the same version
//! first, never rows belonging to the batch being written.

use crate::Error;
use crate::store::StoreDb;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Delete LRU rows of `version` so that `incoming_new` new rows fit under
/// `capacity`. Rows of the (book, chapter, vmin..=vmax) span being written
/// are never eviction candidates.
fn make_room(
    tx: &rusqlite::Transaction<'_>, version: &str, incoming_new: i64, capacity: i64, book: &str, chapter: u32,
    vmin: u32, vmax: u32,
) -> Result<usize, rusqlite::Error> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM verse_cache WHERE version = ?1",
        params![version],
        |row| row.get(0),
    )?;

    let excess = count + incoming_new - capacity;
    if excess <= 0 {
        return Ok(0);
    }

    tx.execute(
        "DELETE FROM verse_cache WHERE rowid IN (
            SELECT rowid FROM verse_cache
            WHERE version = ?1
              AND NOT (book = ?2 AND chapter = ?3 AND verse BETWEEN ?4 AND ?5)
            ORDER BY last_used_at ASC
            LIMIT ?6
        )",
        params![version, book, chapter, vmin, vmax, excess],
    )
}

impl StoreDb {
    /// Get one verse's text.
    ///
    /// Returns None on a miss. A hit bumps the row's `last_used_at`.
    pub async fn get_verse(
        &self, book: &str, chapter: u32, verse: u32, version: &str,
    ) -> Result<Option<String>, Error> {
        let book = book.to_string();
        let version = version.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT text FROM verse_cache
                     WHERE book = ?1 AND chapter = ?2 AND verse = ?3 AND version = ?4",
                    params![book, chapter, verse, version],
                    |row| row.get::<_, String>(0),
                );

                match result {
                    Ok(text) => {
                        conn.execute(
                            "UPDATE verse_cache SET last_used_at = ?1
                             WHERE book = ?2 AND chapter = ?3 AND verse = ?4 AND version = ?5",
                            params![now, book, chapter, verse, version],
                        )?;
                        Ok(Some(text))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Get the concatenated text of an inclusive verse range.
    ///
    /// Misses unless every verse in the range is present; a hit joins the
    /// texts in verse order with single spaces and bumps every row.
    pub async fn get_verse_range(
        &self, book: &str, chapter: u32, verse_start: u32, verse_end: u32, version: &str,
    ) -> Result<Option<String>, Error> {
        let book = book.to_string();
        let version = version.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT text FROM verse_cache
                     WHERE book = ?1 AND chapter = ?2 AND version = ?3 AND verse BETWEEN ?4 AND ?5
                     ORDER BY verse ASC",
                )?;

                let texts = stmt
                    .query_map(params![book, chapter, version, verse_start, verse_end], |row| {
                        row.get::<_, String>(0)
                    })?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;

                let wanted = (verse_end - verse_start + 1) as usize;
                if texts.len() != wanted {
                    return Ok(None);
                }

                conn.execute(
                    "UPDATE verse_cache SET last_used_at = ?1
                     WHERE book = ?2 AND chapter = ?3 AND version = ?4 AND verse BETWEEN ?5 AND ?6",
                    params![now, book, chapter, version, verse_start, verse_end],
                )?;

                Ok(Some(texts.join(" ")))
            })
            .await
            .map_err(Error::from)
    }

    /// Get a whole chapter as a verse-number-to-text map.
    ///
    /// `expected_verse_count` of 0 means the chapter cannot be validated and
    /// is always a miss; fewer stored verses than expected is a miss too.
    pub async fn get_chapter(
        &self, book: &str, chapter: u32, version: &str, expected_verse_count: u32,
    ) -> Result<Option<BTreeMap<u32, String>>, Error> {
        if expected_verse_count == 0 {
            return Ok(None);
        }

        let book = book.to_string();
        let version = version.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Option<BTreeMap<u32, String>>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT verse, text FROM verse_cache
                     WHERE book = ?1 AND chapter = ?2 AND version = ?3
                     ORDER BY verse ASC",
                )?;

                let verses = stmt
                    .query_map(params![book, chapter, version], |row| {
                        Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<BTreeMap<u32, String>, rusqlite::Error>>()?;

                if (verses.len() as u32) < expected_verse_count {
                    return Ok(None);
                }

                conn.execute(
                    "UPDATE verse_cache SET last_used_at = ?1
                     WHERE book = ?2 AND chapter = ?3 AND version = ?4",
                    params![now, book, chapter, version],
                )?;

                Ok(Some(verses))
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or update one verse.
    ///
    /// Uses UPSERT semantics: last writer wins on `text`, `last_used_at`
    /// always advances. If the verse is new for its version and the version
    /// is at `capacity`, the least-recently-used rows are evicted first.
    pub async fn put_verse(
        &self, book: &str, chapter: u32, verse: u32, version: &str, text: &str, capacity: usize,
    ) -> Result<(), Error> {
        let book = book.to_string();
        let version = version.to_string();
        let text = text.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;

                let exists: bool = tx.query_row(
                    "SELECT EXISTS(
                        SELECT 1 FROM verse_cache
                        WHERE book = ?1 AND chapter = ?2 AND verse = ?3 AND version = ?4
                    )",
                    params![book, chapter, verse, version],
                    |row| row.get(0),
                )?;

                if !exists {
                    make_room(&tx, &version, 1, capacity as i64, &book, chapter, verse, verse)?;
                }

                tx.execute(
                    "INSERT INTO verse_cache (book, chapter, verse, version, text, last_used_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(book, chapter, verse, version) DO UPDATE SET
                        text = excluded.text,
                        last_used_at = excluded.last_used_at",
                    params![book, chapter, verse, version, text, now],
                )?;

                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or update a batch of verses from one chapter.
    ///
    /// Eviction runs once for the whole batch and never removes rows the
    /// batch itself is writing. A batch larger than `capacity` is truncated
    /// to the first `capacity` verses so the per-version cap holds even for
    /// oversized chapter writes.
    pub async fn put_verses(
        &self, book: &str, chapter: u32, verses: Vec<(u32, String)>, version: &str, capacity: usize,
    ) -> Result<(), Error> {
        if verses.is_empty() {
            return Ok(());
        }

        let mut verses = verses;
        verses.sort_by_key(|(number, _)| *number);
        verses.truncate(capacity);
        if verses.is_empty() {
            return Ok(());
        }

        let book = book.to_string();
        let version = version.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;

                let vmin = verses[0].0;
                let vmax = verses[verses.len() - 1].0;

                let mut incoming_new = 0i64;
                {
                    let mut stmt = tx.prepare(
                        "SELECT EXISTS(
                            SELECT 1 FROM verse_cache
                            WHERE book = ?1 AND chapter = ?2 AND verse = ?3 AND version = ?4
                        )",
                    )?;
                    for (number, _) in &verses {
                        let exists: bool =
                            stmt.query_row(params![book, chapter, number, version], |row| row.get(0))?;
                        if !exists {
                            incoming_new += 1;
                        }
                    }
                }

                make_room(&tx, &version, incoming_new, capacity as i64, &book, chapter, vmin, vmax)?;

                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO verse_cache (book, chapter, verse, version, text, last_used_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(book, chapter, verse, version) DO UPDATE SET
                            text = excluded.text,
                            last_used_at = excluded.last_used_at",
                    )?;
                    for (number, text) in &verses {
                        stmt.execute(params![book, chapter, number, version, text, now])?;
                    }
                }

                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of cached rows for a version.
    pub async fn version_row_count(&self, version: &str) -> Result<u64, Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM verse_cache WHERE version = ?1",
                    params![version],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Known verse count of a chapter, learned from a prior provider fetch.
    pub async fn chapter_verse_count(
        &self, book: &str, chapter: u32, version: &str,
    ) -> Result<Option<u32>, Error> {
        let book = book.to_string();
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<Option<u32>, Error> {
                let result = conn.query_row(
                    "SELECT verse_count FROM chapter_meta
                     WHERE book = ?1 AND chapter = ?2 AND version = ?3",
                    params![book, chapter, version],
                    |row| row.get::<_, u32>(0),
                );

                match result {
                    Ok(count) => Ok(Some(count)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Record a chapter's verse count. Not subject to the cache cap.
    pub async fn put_chapter_meta(
        &self, book: &str, chapter: u32, version: &str, verse_count: u32,
    ) -> Result<(), Error> {
        let book = book.to_string();
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO chapter_meta (book, chapter, version, verse_count)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(book, chapter, version) DO UPDATE SET
                        verse_count = excluded.verse_count",
                    params![book, chapter, version, verse_count],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

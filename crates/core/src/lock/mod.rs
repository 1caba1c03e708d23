//! Per-user mutual exclusion over the transcription pipeline.
//!
//! The lock is a row with a uniqueness constraint on user_id: insertion
//! success is ownership, insertion conflict means some other request holds
//! it. There is no token; release is keyed by user alone. Every `acquire`
//! first sweeps rows older than the staleness threshold (from any user),
//! so a crashed holder blocks its user for at most that window.

use crate::Error;
use crate::store::StoreDb;
use chrono::{Duration, Utc};
use tokio_rusqlite::params;

/// Default staleness threshold for abandoned locks.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 300;

/// Per-user transcription lock over the durable store.
#[derive(Clone, Debug)]
pub struct TranscriptionLock {
    db: StoreDb,
    stale_after_secs: u64,
}

impl TranscriptionLock {
    pub fn new(db: StoreDb, stale_after_secs: u64) -> Self {
        Self { db, stale_after_secs }
    }

    /// Try to take the lock for `user_id`.
    ///
    /// Sweeps stale rows globally first, then attempts the insert. Returns
    /// true iff this call created the row.
    pub async fn acquire(&self, user_id: &str) -> Result<bool, Error> {
        let user_id = user_id.to_string();
        let now = Utc::now();
        let cutoff = (now - Duration::seconds(self.stale_after_secs as i64)).to_rfc3339();
        let started_at = now.to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let swept = conn.execute(
                    "DELETE FROM transcription_locks WHERE started_at < ?1",
                    params![cutoff],
                )?;
                if swept > 0 {
                    tracing::warn!("reclaimed {swept} stale transcription lock(s)");
                }

                let created = conn.execute(
                    "INSERT INTO transcription_locks (user_id, started_at) VALUES (?1, ?2)
                     ON CONFLICT(user_id) DO NOTHING",
                    params![user_id, started_at],
                )?;
                Ok(created == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop the user's lock row. Idempotent; releasing an unheld lock is a
    /// no-op.
    pub async fn release(&self, user_id: &str) -> Result<(), Error> {
        let user_id = user_id.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM transcription_locks WHERE user_id = ?1", params![user_id])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a live lock row exists for the user. No side effects; a stale
    /// row still counts as held until some acquire sweeps it.
    pub async fn is_held(&self, user_id: &str) -> Result<bool, Error> {
        let user_id = user_id.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let held: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM transcription_locks WHERE user_id = ?1)",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(held)
            })
            .await
            .map_err(Error::from)
    }
}

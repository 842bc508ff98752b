//! Checkpoint tracking: the last-settlement timestamp per mandate identity.
//!
//! This is the only persisted state in the engine. A checkpoint row is
//! created on the first settlement of a mandate identity and never deleted;
//! `last_settled_at` only ever moves forward, and only through
//! [`CheckpointStore::mark_settled`]. Everything else the engine reports
//! (active balances, totals, grace windows) is derived from this table and
//! the caller-supplied clock at query time.
//!
//! The window re-check inside `mark_settled` runs in the same `BEGIN
//! IMMEDIATE` transaction as the write, so two connections racing the same
//! mandate resolve deterministically: one settles, the other observes the
//! closed window.

use crate::mandate::{Address, Mandate, MandateDigest, MandateError, TokenId};
use crate::schema::CHECKPOINT_SCHEMA;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Checkpoint storage errors.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The mandate's current window has not elapsed; settlement refused.
    #[error("mandate is still inside its active window until {eligible_at}")]
    StillActive { eligible_at: DateTime<Utc> },

    /// The mandate fails structural validation and cannot be snapshotted.
    #[error("mandate failed validation: {0}")]
    InvalidMandate(#[from] MandateError),

    /// A stored row no longer parses back into a record.
    #[error("checkpoint row {mandate_id} is corrupt: {reason}")]
    Corrupt { mandate_id: String, reason: String },

    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for CheckpointError {
    fn from(e: rusqlite::Error) -> Self {
        CheckpointError::Database(e.to_string())
    }
}

/// One settled mandate's persisted state: the terms snapshot plus the
/// settlement timestamps. All window arithmetic is in whole unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    /// `sha256:<hex>` mandate digest, the store key.
    pub mandate_id: String,
    pub subscriber: Address,
    pub recipient: Address,
    pub token: TokenId,
    pub amount: u64,
    pub period_seconds: i64,
    pub execution_fee_price: u64,
    pub nonce: u64,
    pub first_settled_at: DateTime<Utc>,
    pub last_settled_at: DateTime<Utc>,
    pub settlement_count: u32,
}

impl CheckpointRecord {
    /// Earliest instant the next settlement becomes due.
    pub fn eligible_at(&self) -> DateTime<Utc> {
        self.last_settled_at
            .timestamp()
            .checked_add(self.period_seconds)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True while the paid-for window is still running.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() < self.eligible_at().timestamp()
    }
}

/// Raw row tuple as read from SQLite, before identity parsing.
type RawRow = (
    String,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    i64,
    i64,
    i64,
    i64,
);

const RECORD_COLUMNS: &str = "mandate_id, subscriber, recipient, token, amount, \
     period_seconds, execution_fee_price, nonce, first_settled_at, \
     last_settled_at, settlement_count";

/// SQLite-backed checkpoint store. Cloning shares the underlying
/// connection; a clone is how read-only views reference the same state.
#[derive(Clone)]
pub struct CheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl CheckpointStore {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> Result<Self, CheckpointError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing and simulation).
    pub fn memory() -> Result<Self, CheckpointError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), CheckpointError> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(CHECKPOINT_SCHEMA)?;
        Ok(())
    }

    /// Read the checkpoint for a mandate identity, if it has ever settled.
    pub fn record_of(
        &self,
        id: &MandateDigest,
    ) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let conn = self.conn.lock().unwrap();
        Self::record_of_inner(&conn, id)
    }

    fn record_of_inner(
        conn: &Connection,
        id: &MandateDigest,
    ) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let raw: Option<RawRow> = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM checkpoints WHERE mandate_id = ?1"),
                [id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                    ))
                },
            )
            .optional()?;

        raw.map(parse_record).transpose()
    }

    /// True when a settlement is due: never settled, or the period has
    /// fully elapsed. The grace period never gates eligibility, and a
    /// backward clock jump reads as not-yet-eligible.
    pub fn is_eligible(
        &self,
        id: &MandateDigest,
        now: DateTime<Utc>,
    ) -> Result<bool, CheckpointError> {
        match self.record_of(id)? {
            None => Ok(true),
            Some(record) => Ok(now.timestamp() >= record.eligible_at().timestamp()),
        }
    }

    /// Record a successful settlement, advancing `last_settled_at` to `now`.
    ///
    /// The eligibility window is re-checked inside the write transaction;
    /// a mandate still inside its window fails with
    /// [`CheckpointError::StillActive`] and the row is untouched.
    pub fn mark_settled(
        &self,
        mandate: &Mandate,
        now: DateTime<Utc>,
    ) -> Result<CheckpointRecord, CheckpointError> {
        mandate.validate()?;

        let conn = self.conn.lock().unwrap();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = Self::mark_settled_inner(&conn, mandate, now);

        match &result {
            Ok(_) => {
                conn.execute("COMMIT", [])?;
            }
            Err(_) => {
                let _ = conn.execute("ROLLBACK", []);
            }
        }

        result
    }

    fn mark_settled_inner(
        conn: &Connection,
        mandate: &Mandate,
        now: DateTime<Utc>,
    ) -> Result<CheckpointRecord, CheckpointError> {
        let mandate_id = mandate.digest().to_string();
        let now_ts = now.timestamp();

        let existing: Option<(i64, i64, i64, i64)> = conn
            .query_row(
                "SELECT last_settled_at, period_seconds, settlement_count, first_settled_at \
                 FROM checkpoints WHERE mandate_id = ?1",
                [&mandate_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (first_ts, new_count) = match existing {
            Some((last, period, count, first)) => {
                let eligible_ts = last.saturating_add(period);
                if now_ts < eligible_ts {
                    return Err(CheckpointError::StillActive {
                        eligible_at: DateTime::from_timestamp(eligible_ts, 0)
                            .unwrap_or(DateTime::<Utc>::MAX_UTC),
                    });
                }
                conn.execute(
                    "UPDATE checkpoints SET last_settled_at = ?1, settlement_count = ?2 \
                     WHERE mandate_id = ?3",
                    params![now_ts, count + 1, mandate_id],
                )?;
                (first, count + 1)
            }
            None => {
                conn.execute(
                    "INSERT INTO checkpoints (\
                         mandate_id, subscriber, recipient, token, amount, \
                         period_seconds, execution_fee_price, nonce, \
                         first_settled_at, last_settled_at, settlement_count\
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)",
                    params![
                        mandate_id,
                        mandate.subscriber.to_string(),
                        mandate.recipient.to_string(),
                        mandate.token.to_string(),
                        mandate.amount as i64,
                        mandate.period_seconds,
                        mandate.execution_fee_price as i64,
                        mandate.nonce as i64,
                        now_ts,
                        now_ts,
                    ],
                )?;
                (now_ts, 1)
            }
        };

        let count = u32::try_from(new_count).map_err(|_| CheckpointError::Corrupt {
            mandate_id: mandate_id.clone(),
            reason: "settlement_count out of range".to_string(),
        })?;

        let first_settled_at = timestamp_or_corrupt(&mandate_id, first_ts)?;
        let last_settled_at = timestamp_or_corrupt(&mandate_id, now_ts)?;

        Ok(CheckpointRecord {
            mandate_id,
            subscriber: mandate.subscriber,
            recipient: mandate.recipient,
            token: mandate.token,
            amount: mandate.amount,
            period_seconds: mandate.period_seconds,
            execution_fee_price: mandate.execution_fee_price,
            nonce: mandate.nonce,
            first_settled_at,
            last_settled_at,
            settlement_count: count,
        })
    }

    /// Sum of `amount` over a subscriber's currently active mandates.
    pub(crate) fn sum_active_for_subscriber(
        &self,
        subscriber: &Address,
        now: DateTime<Utc>,
    ) -> Result<u64, CheckpointError> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM checkpoints \
             WHERE subscriber = ?1 AND last_settled_at + period_seconds > ?2",
            params![subscriber.to_string(), now.timestamp()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Sum of `amount` over all currently active mandates.
    pub(crate) fn sum_active_total(&self, now: DateTime<Utc>) -> Result<u64, CheckpointError> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM checkpoints \
             WHERE last_settled_at + period_seconds > ?1",
            params![now.timestamp()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}

fn timestamp_or_corrupt(mandate_id: &str, ts: i64) -> Result<DateTime<Utc>, CheckpointError> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| CheckpointError::Corrupt {
        mandate_id: mandate_id.to_string(),
        reason: format!("timestamp {ts} out of range"),
    })
}

fn parse_record(raw: RawRow) -> Result<CheckpointRecord, CheckpointError> {
    let (
        mandate_id,
        subscriber,
        recipient,
        token,
        amount,
        period_seconds,
        execution_fee_price,
        nonce,
        first_settled_at,
        last_settled_at,
        settlement_count,
    ) = raw;

    let corrupt = |reason: &str| CheckpointError::Corrupt {
        mandate_id: mandate_id.clone(),
        reason: reason.to_string(),
    };

    Ok(CheckpointRecord {
        subscriber: subscriber.parse().map_err(|_| corrupt("bad subscriber"))?,
        recipient: recipient.parse().map_err(|_| corrupt("bad recipient"))?,
        token: token.parse().map_err(|_| corrupt("bad token"))?,
        amount: u64::try_from(amount).map_err(|_| corrupt("negative amount"))?,
        period_seconds,
        execution_fee_price: u64::try_from(execution_fee_price)
            .map_err(|_| corrupt("negative fee price"))?,
        nonce: u64::try_from(nonce).map_err(|_| corrupt("negative nonce"))?,
        first_settled_at: timestamp_or_corrupt(&mandate_id, first_settled_at)?,
        last_settled_at: timestamp_or_corrupt(&mandate_id, last_settled_at)?,
        settlement_count: u32::try_from(settlement_count)
            .map_err(|_| corrupt("settlement_count out of range"))?,
        mandate_id,
    })
}

//! SQLite schema for settlement checkpoint tracking.
//!
//! One row per mandate identity, created on first settlement and never
//! deleted. The terms snapshot makes every commitment of a settled mandate
//! independently inspectable, and keeps the window arithmetic for balance
//! queries entirely inside SQL.

/// DDL for the checkpoint table.
///
/// Schema version: 1
pub const CHECKPOINT_SCHEMA: &str = r#"
-- One checkpoint per mandate identity (immutable terms snapshot plus the
-- last-settlement timestamp, which only ever moves forward).
CREATE TABLE IF NOT EXISTS checkpoints (
    mandate_id          TEXT PRIMARY KEY,
    subscriber          TEXT NOT NULL,
    recipient           TEXT NOT NULL,
    token               TEXT NOT NULL,
    amount              INTEGER NOT NULL,
    period_seconds      INTEGER NOT NULL,
    execution_fee_price INTEGER NOT NULL,
    nonce               INTEGER NOT NULL,
    first_settled_at    INTEGER NOT NULL,
    last_settled_at     INTEGER NOT NULL,
    settlement_count    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_subscriber
    ON checkpoints(subscriber);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_valid_sql() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CHECKPOINT_SCHEMA).unwrap();
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CHECKPOINT_SCHEMA).unwrap();
        conn.execute_batch(CHECKPOINT_SCHEMA).unwrap();
    }
}

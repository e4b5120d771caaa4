use rusqlite::Connection;

use crate::error::Result;

/// Initialise the history schema in `conn`.
///
/// One immutable row per (school, date, column, hour). Entity references are
/// stored as names so rows stay readable after renames or deletions.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS history (
            school_id         TEXT    NOT NULL,
            date              TEXT    NOT NULL,   -- YYYY-MM-DD
            day               INTEGER NOT NULL,   -- 1 = Sunday … 7 = Saturday
            hour              INTEGER NOT NULL,
            column_id         TEXT    NOT NULL,
            column_position   INTEGER NOT NULL,
            column_type       TEXT    NOT NULL,
            original_teacher  TEXT,
            classes           TEXT,               -- comma-joined class names
            subject           TEXT,
            sub_teacher       TEXT,
            instructions      TEXT,
            event_title       TEXT,
            event_text        TEXT,
            PRIMARY KEY (school_id, date, column_id, hour)
        );

        -- Recommendation scans: WHERE school_id = ? AND day = ?
        CREATE INDEX IF NOT EXISTS idx_history_school_day ON history (school_id, day);
        ",
    )?;
    Ok(())
}

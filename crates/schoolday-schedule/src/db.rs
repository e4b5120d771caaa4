use rusqlite::Connection;

use crate::error::Result;

/// Initialise the live schedule schema and the directory tables it reads.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_directory_tables(conn)?;
    create_schedule_tables(conn)?;
    Ok(())
}

/// Schools, their staff and classes. Owned by the CRUD side of the product;
/// the engine only reads them, except for the publish-date set.
fn create_directory_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schools (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL,
            from_hour   INTEGER NOT NULL DEFAULT 1,
            to_hour     INTEGER NOT NULL DEFAULT 10
        );
        CREATE TABLE IF NOT EXISTS school_publish_dates (
            school_id   TEXT NOT NULL,
            date        TEXT NOT NULL,   -- YYYY-MM-DD
            PRIMARY KEY (school_id, date)
        );
        CREATE TABLE IF NOT EXISTS teachers (
            id          TEXT NOT NULL PRIMARY KEY,
            school_id   TEXT NOT NULL,
            name        TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS classes (
            id          TEXT NOT NULL PRIMARY KEY,
            school_id   TEXT NOT NULL,
            name        TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS subjects (
            id          TEXT NOT NULL PRIMARY KEY,
            school_id   TEXT NOT NULL,
            name        TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// One row per live column and one row per (column, hour) cell.
///
/// The UNIQUE position constraint backs the "no two live columns share a
/// position" rule; compaction goes through negative positions to satisfy it.
fn create_schedule_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schedule_columns (
            school_id       TEXT    NOT NULL,
            date            TEXT    NOT NULL,
            column_id       TEXT    NOT NULL,
            column_type     TEXT    NOT NULL,
            position        INTEGER NOT NULL,
            header_teacher  TEXT,
            header_event    TEXT,
            updated_at      TEXT    NOT NULL,
            PRIMARY KEY (school_id, date, column_id),
            UNIQUE (school_id, date, position)
        );
        CREATE TABLE IF NOT EXISTS schedule_cells (
            school_id       TEXT    NOT NULL,
            date            TEXT    NOT NULL,
            column_id       TEXT    NOT NULL,
            hour            INTEGER NOT NULL,
            issue_teacher   TEXT,
            sub_teacher     TEXT,
            class_ids       TEXT    NOT NULL DEFAULT '[]',   -- JSON array of class ids
            subject         TEXT,
            event_title     TEXT,
            event_text      TEXT,
            instructions    TEXT,
            updated_at      TEXT    NOT NULL,
            PRIMARY KEY (school_id, date, column_id, hour)
        );
        CREATE INDEX IF NOT EXISTS idx_schedule_cells_date
            ON schedule_cells(date, school_id);",
    )?;
    Ok(())
}

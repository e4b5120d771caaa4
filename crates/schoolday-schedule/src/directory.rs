//! Read access to the school directory tables (schools, teachers, classes,
//! subjects) plus the per-school publish-date set.
//!
//! These tables belong to the CRUD side of the product; the seeding helpers
//! exist for operator tooling and tests.

use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

/// Entity tables whose ids appear in schedule cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Teacher,
    Class,
    Subject,
}

impl EntityKind {
    fn table(&self) -> &'static str {
        match self {
            EntityKind::Teacher => "teachers",
            EntityKind::Class => "classes",
            EntityKind::Subject => "subjects",
        }
    }
}

/// Configured `[from_hour, to_hour]` for a school, or `None` if the school
/// does not exist.
pub fn school_hours(conn: &Connection, school_id: &str) -> Result<Option<(u32, u32)>> {
    let hours = conn
        .query_row(
            "SELECT from_hour, to_hour FROM schools WHERE id = ?1",
            [school_id],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?)),
        )
        .optional()?;
    Ok(hours)
}

pub fn all_school_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM schools ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Schools whose publish-date set contains `date`.
pub fn schools_published_on(conn: &Connection, date: NaiveDate) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT s.id FROM schools s
         JOIN school_publish_dates p ON p.school_id = s.id
         WHERE p.date = ?1
         ORDER BY s.id",
    )?;
    let ids = stmt
        .query_map([date.to_string()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Add or remove `date` from a school's publish set. Returns whether the set
/// changed.
pub fn set_published(
    conn: &Connection,
    school_id: &str,
    date: NaiveDate,
    published: bool,
) -> Result<bool> {
    let n = if published {
        conn.execute(
            "INSERT OR IGNORE INTO school_publish_dates (school_id, date) VALUES (?1, ?2)",
            rusqlite::params![school_id, date.to_string()],
        )?
    } else {
        conn.execute(
            "DELETE FROM school_publish_dates WHERE school_id = ?1 AND date = ?2",
            rusqlite::params![school_id, date.to_string()],
        )?
    };
    Ok(n > 0)
}

/// `id -> name` for a whole entity table in one read.
pub fn name_map(conn: &Connection, kind: EntityKind) -> Result<HashMap<String, String>> {
    let sql = format!("SELECT id, name FROM {}", kind.table());
    let mut stmt = conn.prepare(&sql)?;
    let map = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(map)
}

/// Oldest date that has any live schedule row.
pub fn earliest_schedule_date(conn: &Connection) -> Result<Option<NaiveDate>> {
    let min: Option<String> =
        conn.query_row("SELECT MIN(date) FROM schedule_cells", [], |row| row.get(0))?;
    Ok(min.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()))
}

pub fn upsert_school(
    conn: &Connection,
    id: &str,
    name: &str,
    from_hour: u32,
    to_hour: u32,
) -> Result<()> {
    conn.execute(
        "INSERT INTO schools (id, name, from_hour, to_hour) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name,
             from_hour = excluded.from_hour, to_hour = excluded.to_hour",
        rusqlite::params![id, name, from_hour, to_hour],
    )?;
    Ok(())
}

pub fn upsert_entity(
    conn: &Connection,
    kind: EntityKind,
    id: &str,
    school_id: &str,
    name: &str,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {} (id, school_id, name) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        kind.table()
    );
    conn.execute(&sql, rusqlite::params![id, school_id, name])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn hours_for_unknown_school_is_none() {
        let conn = conn();
        upsert_school(&conn, "s1", "North", 1, 8).unwrap();
        assert_eq!(school_hours(&conn, "s1").unwrap(), Some((1, 8)));
        assert_eq!(school_hours(&conn, "nope").unwrap(), None);
    }

    #[test]
    fn publish_set_toggles() {
        let conn = conn();
        upsert_school(&conn, "s1", "North", 1, 8).unwrap();
        upsert_school(&conn, "s2", "South", 1, 8).unwrap();
        let d = day("2024-09-01");

        assert!(set_published(&conn, "s1", d, true).unwrap());
        assert!(!set_published(&conn, "s1", d, true).unwrap());
        assert_eq!(schools_published_on(&conn, d).unwrap(), vec!["s1"]);

        assert!(set_published(&conn, "s1", d, false).unwrap());
        assert!(schools_published_on(&conn, d).unwrap().is_empty());
        assert_eq!(all_school_ids(&conn).unwrap(), vec!["s1", "s2"]);
    }

    #[test]
    fn name_map_reads_whole_table() {
        let conn = conn();
        upsert_entity(&conn, EntityKind::Teacher, "t1", "s1", "Dana").unwrap();
        upsert_entity(&conn, EntityKind::Teacher, "t2", "s1", "Eli").unwrap();
        upsert_entity(&conn, EntityKind::Teacher, "t1", "s1", "Dana R.").unwrap();
        let names = name_map(&conn, EntityKind::Teacher).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names["t1"], "Dana R.");
        assert!(name_map(&conn, EntityKind::Subject).unwrap().is_empty());
    }

    #[test]
    fn earliest_date_of_empty_store_is_none() {
        let conn = conn();
        assert_eq!(earliest_schedule_date(&conn).unwrap(), None);
    }
}

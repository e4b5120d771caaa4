use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use dashmap::DashMap;
use rusqlite::Connection;
use schoolday_core::types::school_day_of_week;
use schoolday_schedule::directory::{self, EntityKind};
use schoolday_schedule::{CellPayload, DaySchedule, ScheduleStore};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::db::init_db;
use crate::error::{HistoryError, Result};
use crate::recommend::Recommender;
use crate::types::{ArchiveOutcome, ArchiveStats, HistoryRecord};

/// Which schools an archival run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Schools that published the target date.
    Nightly,
    /// Every school, published or not. Used for corrections and backfill.
    Force,
}

impl fmt::Display for ArchiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveMode::Nightly => f.write_str("nightly"),
            ArchiveMode::Force => f.write_str("force"),
        }
    }
}

/// `id -> name` lookups, each loaded with one bulk read.
#[derive(Debug, Default)]
pub struct NameMaps {
    pub teachers: HashMap<String, String>,
    pub classes: HashMap<String, String>,
    pub subjects: HashMap<String, String>,
}

impl NameMaps {
    pub fn load(conn: &Connection) -> Result<Self> {
        Ok(Self {
            teachers: directory::name_map(conn, EntityKind::Teacher)?,
            classes: directory::name_map(conn, EntityKind::Class)?,
            subjects: directory::name_map(conn, EntityKind::Subject)?,
        })
    }

    fn teacher(&self, id: Option<&str>) -> Option<String> {
        id.and_then(|id| self.teachers.get(id).cloned())
    }

    fn subject(&self, id: Option<&str>) -> Option<String> {
        id.and_then(|id| self.subjects.get(id).cloned())
    }

    /// Resolvable class names joined with `,`; `None` when nothing resolves.
    fn classes(&self, ids: &[String]) -> Option<String> {
        let names: Vec<&str> = ids
            .iter()
            .filter_map(|id| self.classes.get(id).map(String::as_str))
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join(","))
        }
    }
}

/// Moves live daily schedules into immutable, name-resolved history.
///
/// Re-running a date rewrites that date's history for every covered school,
/// so runs are idempotent. Each school is replaced in its own transaction:
/// a failure leaves that school's previous history untouched and the run
/// moves on to the next school.
pub struct ArchivalJob {
    db: Arc<Mutex<Connection>>,
    store: Arc<ScheduleStore>,
    recommender: Option<Arc<Recommender>>,
    /// One lock per date, held from candidate selection through the last
    /// write, so overlapping runs for a date never interleave.
    locks: DashMap<NaiveDate, Arc<tokio::sync::Mutex<()>>>,
}

impl ArchivalJob {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        store: Arc<ScheduleStore>,
        recommender: Option<Arc<Recommender>>,
    ) -> Result<Self> {
        init_db(&db.lock().unwrap())?;
        Ok(Self {
            db,
            store,
            recommender,
            locks: DashMap::new(),
        })
    }

    /// Archive one date. Waits for any other run on the same date first.
    #[instrument(skip(self))]
    pub async fn archive_date(&self, date: NaiveDate, mode: ArchiveMode) -> ArchiveOutcome {
        let lock = self.date_lock(date);
        let outcome = {
            let _guard = lock.lock().await;
            self.archive_locked(date, mode).await
        };
        drop(lock);
        self.locks.remove_if(&date, |_, m| Arc::strong_count(m) == 1);
        outcome
    }

    fn date_lock(&self, date: NaiveDate) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(date).or_default().clone()
    }

    async fn archive_locked(&self, date: NaiveDate, mode: ArchiveMode) -> ArchiveOutcome {
        let mut logs = vec![format!("Archiving {date} in {mode} mode")];
        let mut stats = ArchiveStats::default();

        let prepared = match self.prepare(date, mode, &mut logs).await {
            Ok(p) => p,
            Err(e) => {
                error!(%date, %mode, error = %e, "archival aborted before writing");
                logs.push(format!("Aborted: {e}"));
                return ArchiveOutcome {
                    success: false,
                    message: format!("Archival of {date} failed: {e}"),
                    logs,
                    stats,
                };
            }
        };
        if prepared.is_empty() {
            logs.push("No schools to archive".to_string());
            return ArchiveOutcome {
                success: true,
                message: format!("Nothing to archive for {date}"),
                logs,
                stats,
            };
        }

        let mut failed: Vec<String> = Vec::new();
        for (school_id, records) in prepared {
            let count = records.len();
            match self.replace_school(date, &school_id, records).await {
                Ok(replaced) => {
                    stats.schools_updated += 1;
                    stats.records_count += count;
                    logs.push(format!(
                        "School {school_id}: replaced {replaced} history rows with {count}"
                    ));
                    self.invalidate(&school_id, date);
                }
                Err(e) => {
                    error!(school_id = %school_id, %date, error = %e, "school archival failed; previous history kept");
                    logs.push(format!("School {school_id}: FAILED ({e}); previous history kept"));
                    failed.push(school_id);
                }
            }
        }

        let success = failed.is_empty();
        let message = if success {
            format!(
                "Archived {date}: {} schools, {} records",
                stats.schools_updated, stats.records_count
            )
        } else {
            format!(
                "Archived {date} with {} failed schools ({}): {} schools, {} records written",
                failed.len(),
                failed.join(", "),
                stats.schools_updated,
                stats.records_count
            )
        };
        info!(%date, %mode, success, schools = stats.schools_updated, records = stats.records_count, "archival finished");
        logs.push(message.clone());
        ArchiveOutcome {
            success,
            message,
            logs,
            stats,
        }
    }

    /// Archive every date from the earliest live schedule row through
    /// `until`, one date at a time and in force mode.
    ///
    /// A failed date is logged and skipped. When `shutdown` flips to `true`
    /// the loop stops before the next date; finished dates stay archived.
    #[instrument(skip(self, shutdown))]
    pub async fn backfill(
        &self,
        until: NaiveDate,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> ArchiveOutcome {
        let mut logs = vec![format!("Backfilling history through {until}")];
        let mut stats = ArchiveStats::default();

        let db = self.db.clone();
        let earliest = tokio::task::spawn_blocking(move || {
            let conn = db.lock().unwrap();
            directory::earliest_schedule_date(&conn)
        })
        .await
        .map_err(HistoryError::from)
        .and_then(|r| r.map_err(HistoryError::from));

        let start = match earliest {
            Ok(Some(start)) if start <= until => start,
            Ok(_) => {
                logs.push("No live schedule rows in range".to_string());
                return ArchiveOutcome {
                    success: true,
                    message: "Nothing to backfill".to_string(),
                    logs,
                    stats,
                };
            }
            Err(e) => {
                error!(error = %e, "backfill could not find its start date");
                return ArchiveOutcome {
                    success: false,
                    message: format!("Backfill failed: {e}"),
                    logs,
                    stats,
                };
            }
        };
        logs.push(format!("Earliest schedule date: {start}"));

        let mut failed_dates: Vec<NaiveDate> = Vec::new();
        let mut processed = 0usize;
        let mut interrupted = false;
        let mut date = start;
        loop {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                warn!(%date, processed, "backfill interrupted");
                logs.push(format!("Interrupted before {date}"));
                interrupted = true;
                break;
            }

            let outcome = self.archive_date(date, ArchiveMode::Force).await;
            stats.add(outcome.stats);
            processed += 1;
            if outcome.success {
                logs.push(format!(
                    "{date}: {} schools, {} records",
                    outcome.stats.schools_updated, outcome.stats.records_count
                ));
            } else {
                logs.push(format!("{date}: FAILED ({})", outcome.message));
                logs.extend(outcome.logs.into_iter().filter(|l| l.contains("FAILED")));
                failed_dates.push(date);
            }

            match date.succ_opt() {
                Some(next) if next <= until => date = next,
                _ => break,
            }
        }

        let success = failed_dates.is_empty();
        let mut message = format!(
            "Backfilled {processed} dates: {} school-days, {} records",
            stats.schools_updated, stats.records_count
        );
        if !success {
            let dates: Vec<String> = failed_dates.iter().map(NaiveDate::to_string).collect();
            message.push_str(&format!("; failed dates: {}", dates.join(", ")));
        }
        if interrupted {
            message.push_str("; interrupted");
        }
        info!(processed, success, interrupted, records = stats.records_count, "backfill finished");
        logs.push(message.clone());
        ArchiveOutcome {
            success,
            message,
            logs,
            stats,
        }
    }

    /// Steps 1–4: pick schools, snapshot their live rows, resolve names.
    async fn prepare(
        &self,
        date: NaiveDate,
        mode: ArchiveMode,
        logs: &mut Vec<String>,
    ) -> Result<Vec<(String, Vec<HistoryRecord>)>> {
        let db = self.db.clone();
        let store = self.store.clone();
        let (candidates, days, names) = tokio::task::spawn_blocking(move || -> Result<_> {
            let candidates = {
                let conn = db.lock().unwrap();
                match mode {
                    ArchiveMode::Nightly => directory::schools_published_on(&conn, date)?,
                    ArchiveMode::Force => directory::all_school_ids(&conn)?,
                }
            };
            if candidates.is_empty() {
                return Ok((candidates, Vec::new(), NameMaps::default()));
            }
            let days = store.snapshot_days(date, &candidates)?;
            let names = {
                let conn = db.lock().unwrap();
                NameMaps::load(&conn)?
            };
            Ok((candidates, days, names))
        })
        .await??;

        logs.push(format!(
            "Found {} candidate schools: {}",
            candidates.len(),
            candidates.join(", ")
        ));
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let live_rows: usize = days
            .iter()
            .flat_map(|d| d.columns.iter())
            .map(|c| c.cells.len())
            .sum();
        logs.push(format!("Loaded {live_rows} live schedule rows"));
        logs.push(format!(
            "Resolved names: {} teachers, {} classes, {} subjects",
            names.teachers.len(),
            names.classes.len(),
            names.subjects.len()
        ));

        Ok(days
            .iter()
            .map(|day| (day.school_id.clone(), build_records(day, &names)))
            .collect())
    }

    /// Step 5 for one school. The caller holds the date lock.
    async fn replace_school(
        &self,
        date: NaiveDate,
        school_id: &str,
        records: Vec<HistoryRecord>,
    ) -> Result<usize> {
        let db = self.db.clone();
        let school = school_id.to_string();
        tokio::task::spawn_blocking(move || replace_history(&db, &school, date, &records)).await?
    }

    fn invalidate(&self, school_id: &str, date: NaiveDate) {
        self.store.invalidate(school_id, date);
        if let Some(r) = &self.recommender {
            r.invalidate_school(school_id);
        }
    }
}

/// Map one live day to history rows, resolving ids through `names`.
///
/// Unresolvable ids become `None`: history keeps names only.
pub fn build_records(day: &DaySchedule, names: &NameMaps) -> Vec<HistoryRecord> {
    let weekday = school_day_of_week(day.date);
    let mut records = Vec::new();
    for column in &day.columns {
        for cell in column.cells.values() {
            let mut record = HistoryRecord {
                school_id: day.school_id.clone(),
                date: day.date,
                day: weekday,
                hour: cell.hour,
                column_id: column.column_id.clone(),
                column_position: column.position,
                column_type: column.column_type,
                original_teacher: None,
                classes: names.classes(cell.payload.class_ids()),
                subject: None,
                sub_teacher: names.teacher(cell.payload.sub_teacher()),
                instructions: None,
                event_title: None,
                event_text: None,
            };
            match &cell.payload {
                CellPayload::MissingTeacher(s) | CellPayload::ExistingTeacher(s) => {
                    let original = s
                        .issue_teacher
                        .as_deref()
                        .or(column.header.teacher.as_deref());
                    record.original_teacher = names.teacher(original);
                    record.subject = names.subject(s.subject.as_deref());
                    record.instructions = s.instructions.clone();
                    record.event_text = s.event.clone();
                }
                CellPayload::Event(s) => {
                    record.event_title = s
                        .event_title
                        .clone()
                        .or_else(|| column.header.event_title.clone());
                    record.event_text = s.event.clone();
                    record.instructions = s.instructions.clone();
                }
            }
            records.push(record);
        }
    }
    records
}

/// Delete then insert one school's rows for `date` in a single transaction.
/// Returns how many previous rows were replaced.
pub fn replace_history(
    db: &Mutex<Connection>,
    school_id: &str,
    date: NaiveDate,
    records: &[HistoryRecord],
) -> Result<usize> {
    let mut conn = db.lock().unwrap();
    let tx = conn.transaction()?;
    let replaced = tx.execute(
        "DELETE FROM history WHERE school_id = ?1 AND date = ?2",
        rusqlite::params![school_id, date.to_string()],
    )?;
    insert_records(&tx, records)?;
    tx.commit()?;
    Ok(replaced)
}

pub fn insert_records(conn: &Connection, records: &[HistoryRecord]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO history
         (school_id, date, day, hour, column_id, column_position, column_type,
          original_teacher, classes, subject, sub_teacher, instructions,
          event_title, event_text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?;
    for r in records {
        stmt.execute(rusqlite::params![
            r.school_id,
            r.date.to_string(),
            r.day,
            r.hour,
            r.column_id,
            r.column_position,
            r.column_type.as_str(),
            r.original_teacher,
            r.classes,
            r.subject,
            r.sub_teacher,
            r.instructions,
            r.event_title,
            r.event_text,
        ])?;
    }
    Ok(())
}

/// All history rows of one school and date, in display order.
pub fn read_history(conn: &Connection, school_id: &str, date: NaiveDate) -> Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT school_id, date, day, hour, column_id, column_position, column_type,
                original_teacher, classes, subject, sub_teacher, instructions,
                event_title, event_text
         FROM history WHERE school_id = ?1 AND date = ?2
         ORDER BY column_position, hour",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![school_id, date.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u8>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                [
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, Option<String>>(11)?,
                    row.get::<_, Option<String>>(12)?,
                    row.get::<_, Option<String>>(13)?,
                ],
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(school_id, date_str, day, hour, column_id, column_position, type_str, texts)| {
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .map_err(|e| HistoryError::Corrupt(format!("date {date_str:?}: {e}")))?;
            let column_type = type_str
                .parse::<schoolday_core::ColumnType>()
                .map_err(HistoryError::Corrupt)?;
            let [original_teacher, classes, subject, sub_teacher, instructions, event_title, event_text] =
                texts;
            Ok(HistoryRecord {
                school_id,
                date,
                day,
                hour,
                column_id,
                column_position,
                column_type,
                original_teacher,
                classes,
                subject,
                sub_teacher,
                instructions,
                event_title,
                event_text,
            })
        })
        .collect()
}

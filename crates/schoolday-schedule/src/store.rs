use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use schoolday_core::config::PositionConfig;
use schoolday_core::{ChangeNotifier, Channel, ColumnType};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::DayCache;
use crate::db::init_db;
use crate::directory;
use crate::error::{Result, ScheduleError};
use crate::positions;
use crate::types::{
    CellPayload, ColumnHeader, DaySchedule, EventSlot, ScheduleCell, ScheduleColumn, TeacherSlot,
};

/// Sole writer of the live daily schedule.
///
/// Every mutation runs in one SQLite transaction while holding the connection
/// mutex, which linearizes concurrent edits to the same column. The change
/// notification is published only after the commit; a failed publish is
/// logged and the write is kept.
pub struct ScheduleStore {
    db: Arc<Mutex<Connection>>,
    notifier: Arc<dyn ChangeNotifier>,
    positions: PositionConfig,
    cache: DayCache,
}

/// Stored column attributes, without its cells.
#[derive(Debug, Clone)]
struct ColumnMeta {
    column_type: ColumnType,
    position: i64,
    header: ColumnHeader,
}

impl ScheduleStore {
    /// Wrap a shared connection, creating the schema if needed.
    pub fn new(
        db: Arc<Mutex<Connection>>,
        notifier: Arc<dyn ChangeNotifier>,
        positions: PositionConfig,
    ) -> Result<Self> {
        init_db(&db.lock().unwrap())?;
        Ok(Self {
            db,
            notifier,
            positions,
            cache: DayCache::new(),
        })
    }

    /// Fresh opaque column id (UUIDv7, time-sortable).
    pub fn new_column_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// Create or patch one hour of a column. See [`ScheduleStore::upsert_cells`].
    #[instrument(skip(self, payload))]
    pub fn upsert_cell(
        &self,
        school_id: &str,
        date: NaiveDate,
        column_id: &str,
        hour: u32,
        payload: CellPayload,
    ) -> Result<ScheduleCell> {
        self.upsert_cells(school_id, date, column_id, vec![(hour, payload)])?
            .pop()
            .ok_or_else(|| ScheduleError::Validation("no cell written".to_string()))
    }

    /// Create or patch several hours of one column in a single write.
    ///
    /// The column is created on first write, typed by the payload and
    /// appended after the current last column. Later writes must carry the
    /// same type. Exactly one notification is published for the whole batch.
    #[instrument(skip(self, writes), fields(cells = writes.len()))]
    pub fn upsert_cells(
        &self,
        school_id: &str,
        date: NaiveDate,
        column_id: &str,
        writes: Vec<(u32, CellPayload)>,
    ) -> Result<Vec<ScheduleCell>> {
        let column_type = match writes.first() {
            Some((_, payload)) => payload.column_type(),
            None => return Err(ScheduleError::Validation("no cells to write".to_string())),
        };
        if writes.iter().any(|(_, p)| p.column_type() != column_type) {
            return Err(ScheduleError::Validation(
                "all cells of one write must share a column type".to_string(),
            ));
        }

        let written = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let (from_hour, to_hour) = directory::school_hours(&tx, school_id)?
                .ok_or_else(|| ScheduleError::Validation(format!("unknown school {school_id}")))?;
            if let Some((hour, _)) = writes
                .iter()
                .find(|(hour, _)| *hour < from_hour || *hour > to_hour)
            {
                return Err(ScheduleError::Validation(format!(
                    "hour {hour} outside school range {from_hour}..={to_hour}"
                )));
            }

            let now = Utc::now().to_rfc3339();
            let mut header = match load_column_meta(&tx, school_id, date, column_id)? {
                Some(meta) if meta.column_type != column_type => {
                    return Err(ScheduleError::Validation(format!(
                        "column {column_id} is {} and cannot hold {column_type} cells",
                        meta.column_type
                    )));
                }
                Some(meta) => meta.header,
                None => {
                    let position = positions::append(max_position(&tx, school_id, date)?, self.positions);
                    tx.execute(
                        "INSERT INTO schedule_columns
                         (school_id, date, column_id, column_type, position, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            school_id,
                            date.to_string(),
                            column_id,
                            column_type.as_str(),
                            position,
                            now
                        ],
                    )?;
                    info!(school_id, column_id, position, %column_type, "column created");
                    ColumnHeader::default()
                }
            };

            let mut out = Vec::with_capacity(writes.len());
            for (hour, patch) in writes {
                let mut payload = load_cell(&tx, school_id, date, column_id, hour, column_type)?
                    .unwrap_or_else(|| CellPayload::empty(column_type));
                payload.merge(patch);
                header.absorb(payload.header());
                write_cell(&tx, school_id, date, column_id, hour, &payload, &now)?;
                out.push(ScheduleCell {
                    hour,
                    column_id: column_id.to_string(),
                    payload,
                });
            }
            tx.execute(
                "UPDATE schedule_columns SET header_teacher = ?1, header_event = ?2, updated_at = ?3
                 WHERE school_id = ?4 AND date = ?5 AND column_id = ?6",
                rusqlite::params![
                    header.teacher,
                    header.event_title,
                    now,
                    school_id,
                    date.to_string(),
                    column_id
                ],
            )?;
            tx.commit()?;
            out
        };

        self.after_write(column_type.channel(), school_id, date);
        Ok(written)
    }

    /// Clear one hour of a column.
    ///
    /// While the column has other hours the row stays as an empty shell so
    /// the column header stays visible. Clearing the column's last hour removes
    /// the column and frees its position. Returns whether anything changed;
    /// clearing an hour that is already a shell is a no-op.
    #[instrument(skip(self))]
    pub fn delete_cell(
        &self,
        school_id: &str,
        date: NaiveDate,
        column_id: &str,
        hour: u32,
    ) -> Result<bool> {
        let column_type = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let Some(meta) = load_column_meta(&tx, school_id, date, column_id)? else {
                return Ok(false);
            };
            let Some(stored) = load_cell(&tx, school_id, date, column_id, hour, meta.column_type)? else {
                return Ok(false);
            };

            let others: i64 = tx.query_row(
                "SELECT COUNT(*) FROM schedule_cells
                 WHERE school_id = ?1 AND date = ?2 AND column_id = ?3 AND hour != ?4",
                rusqlite::params![school_id, date.to_string(), column_id, hour],
                |row| row.get(0),
            )?;
            if others > 0 && stored.is_empty() {
                debug!(school_id, column_id, hour, "cell already a header shell");
                return Ok(false);
            }
            if others > 0 {
                let now = Utc::now().to_rfc3339();
                write_cell(
                    &tx,
                    school_id,
                    date,
                    column_id,
                    hour,
                    &CellPayload::empty(meta.column_type),
                    &now,
                )?;
                debug!(school_id, column_id, hour, "cell cleared to header shell");
            } else {
                delete_cells(&tx, school_id, date, column_id)?;
                delete_column_row(&tx, school_id, date, column_id)?;
                info!(school_id, column_id, position = meta.position, "last hour cleared; column removed");
            }
            tx.commit()?;
            meta.column_type
        };

        self.after_write(column_type.channel(), school_id, date);
        Ok(true)
    }

    /// Remove a column with all its hours and free its position. Returns the
    /// number of cells removed; `0` with no notification if nothing existed.
    #[instrument(skip(self))]
    pub fn delete_column(&self, school_id: &str, date: NaiveDate, column_id: &str) -> Result<usize> {
        let (removed, column_type) = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let Some(meta) = load_column_meta(&tx, school_id, date, column_id)? else {
                return Ok(0);
            };
            let removed = delete_cells(&tx, school_id, date, column_id)?;
            delete_column_row(&tx, school_id, date, column_id)?;
            tx.commit()?;
            info!(school_id, column_id, removed, "column deleted");
            (removed, meta.column_type)
        };

        self.after_write(column_type.channel(), school_id, date);
        Ok(removed)
    }

    /// Full day read. Returns an owned snapshot, served from the read-through
    /// cache when possible.
    #[instrument(skip(self))]
    pub fn get_day(&self, school_id: &str, date: NaiveDate) -> Result<DaySchedule> {
        if let Some(day) = self.cache.get(school_id, date) {
            debug!("day cache hit");
            return Ok(day);
        }
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let day = read_day(&tx, school_id, date)?;
        tx.commit()?;
        // Fill while the connection is held: a writer commits only after we
        // release it, so its invalidation always lands after this put.
        self.cache.put(&day);
        Ok(day)
    }

    /// Uncached reads of several schools for one date, taken in a single
    /// transaction. Used by archival.
    pub fn snapshot_days(&self, date: NaiveDate, school_ids: &[String]) -> Result<Vec<DaySchedule>> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let days = school_ids
            .iter()
            .map(|school_id| read_day(&tx, school_id, date))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(days)
    }

    /// Move a column directly after `after` (or to the front when `None`).
    ///
    /// Takes the midpoint of the new neighbours; when they are too close the
    /// whole day is renumbered to `n * stride` first, in the same
    /// transaction. Returns the column's new position.
    #[instrument(skip(self))]
    pub fn move_column(
        &self,
        school_id: &str,
        date: NaiveDate,
        column_id: &str,
        after: Option<&str>,
    ) -> Result<i64> {
        let (position, column_type) = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let Some(meta) = load_column_meta(&tx, school_id, date, column_id)? else {
                return Err(ScheduleError::Validation(format!("unknown column {column_id}")));
            };
            let others: Vec<(String, i64)> = ordered_positions(&tx, school_id, date)?
                .into_iter()
                .filter(|(id, _)| id != column_id)
                .collect();
            let idx = match after {
                None => 0,
                Some(after_id) => {
                    others
                        .iter()
                        .position(|(id, _)| id == after_id)
                        .ok_or_else(|| {
                            ScheduleError::Validation(format!("unknown neighbour column {after_id}"))
                        })?
                        + 1
                }
            };

            let neighbours = |cols: &[(String, i64)]| {
                let before = idx.checked_sub(1).map(|i| cols[i].1);
                let next = cols.get(idx).map(|(_, p)| *p);
                (before, next)
            };
            let (before, next) = neighbours(&others);
            let position = match positions::between(before, next, self.positions) {
                Some(p) => p,
                None => {
                    let ids: Vec<&str> = others.iter().map(|(id, _)| id.as_str()).collect();
                    let compacted = positions::reindex(&ids, self.positions);
                    apply_positions(&tx, school_id, date, &compacted)?;
                    info!(school_id, columns = compacted.len(), "positions compacted");
                    let (before, next) = neighbours(&compacted);
                    positions::between(before, next, self.positions).ok_or_else(|| {
                        ScheduleError::Validation(
                            "position stride is smaller than the minimum gap".to_string(),
                        )
                    })?
                }
            };
            set_position(&tx, school_id, date, column_id, position)?;
            tx.commit()?;
            debug!(school_id, column_id, from = meta.position, to = position, "column moved");
            (position, meta.column_type)
        };

        self.after_write(column_type.channel(), school_id, date);
        Ok(position)
    }

    /// Put a column at a client-computed position.
    ///
    /// If another column already holds that position the request wins and
    /// the other column steps up by one, staying ahead of its successor.
    /// Without room for that step the day is compacted with the requested
    /// column just before the one it displaced. Returns the column's final
    /// position, which differs from `position` only after a compaction.
    #[instrument(skip(self))]
    pub fn place_column(
        &self,
        school_id: &str,
        date: NaiveDate,
        column_id: &str,
        position: i64,
    ) -> Result<i64> {
        let (placed, column_type) = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            if position <= 0 {
                return Err(ScheduleError::Validation(format!(
                    "position must be positive, got {position}"
                )));
            }
            let Some(meta) = load_column_meta(&tx, school_id, date, column_id)? else {
                return Err(ScheduleError::Validation(format!("unknown column {column_id}")));
            };
            let others: Vec<(String, i64)> = ordered_positions(&tx, school_id, date)?
                .into_iter()
                .filter(|(id, _)| id != column_id)
                .collect();

            let placed = match others.iter().position(|(_, p)| *p == position) {
                None => {
                    set_position(&tx, school_id, date, column_id, position)?;
                    position
                }
                Some(idx) => {
                    let holder = others[idx].0.as_str();
                    let next = others.get(idx + 1).map(|(_, p)| *p);
                    match positions::displace(position, next) {
                        Some(bumped) => {
                            // park the mover so the bump cannot hit its old slot
                            let parking = others[0].1.min(meta.position) - 1;
                            set_position(&tx, school_id, date, column_id, parking)?;
                            set_position(&tx, school_id, date, holder, bumped)?;
                            set_position(&tx, school_id, date, column_id, position)?;
                            warn!(school_id, column_id, holder, position, bumped, "position collision; earlier column bumped");
                            position
                        }
                        None => {
                            let mut order: Vec<&str> = others.iter().map(|(id, _)| id.as_str()).collect();
                            order.insert(idx, column_id);
                            let compacted = positions::reindex(&order, self.positions);
                            apply_positions(&tx, school_id, date, &compacted)?;
                            warn!(school_id, column_id, holder, position, "position collision without room; positions compacted");
                            compacted[idx].1
                        }
                    }
                }
            };
            tx.commit()?;
            (placed, meta.column_type)
        };

        self.after_write(column_type.channel(), school_id, date);
        Ok(placed)
    }

    /// Add or remove `date` from the school's published dates. Notifies the
    /// `publish` channel when the set changed.
    #[instrument(skip(self))]
    pub fn set_published(&self, school_id: &str, date: NaiveDate, published: bool) -> Result<bool> {
        let changed = {
            let db = self.db.lock().unwrap();
            if directory::school_hours(&db, school_id)?.is_none() {
                return Err(ScheduleError::Validation(format!("unknown school {school_id}")));
            }
            directory::set_published(&db, school_id, date, published)?
        };
        if changed {
            self.publish(Channel::Publish, school_id, Some(date));
        }
        Ok(changed)
    }

    /// Drop the cached copy of a day; used by writers outside the store.
    pub fn invalidate(&self, school_id: &str, date: NaiveDate) {
        self.cache.invalidate(school_id, date);
    }

    fn after_write(&self, channel: Channel, school_id: &str, date: NaiveDate) {
        self.cache.invalidate(school_id, date);
        self.publish(channel, school_id, Some(date));
    }

    fn publish(&self, channel: Channel, school_id: &str, date: Option<NaiveDate>) {
        match self.notifier.publish(channel, school_id, date) {
            Ok(ts) => debug!(%channel, school_id, ts, "change published"),
            Err(e) => warn!(%channel, school_id, error = %e, "change notification failed; write kept"),
        }
    }
}

// ── row helpers ─────────────────────────────────────────────────────────────

fn load_column_meta(
    tx: &Transaction<'_>,
    school_id: &str,
    date: NaiveDate,
    column_id: &str,
) -> Result<Option<ColumnMeta>> {
    let row = tx
        .query_row(
            "SELECT column_type, position, header_teacher, header_event FROM schedule_columns
             WHERE school_id = ?1 AND date = ?2 AND column_id = ?3",
            rusqlite::params![school_id, date.to_string(), column_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;
    row.map(|(type_str, position, teacher, event_title)| -> Result<ColumnMeta> {
        let column_type: ColumnType = type_str.parse().map_err(ScheduleError::Validation)?;
        Ok(ColumnMeta {
            column_type,
            position,
            header: ColumnHeader {
                teacher,
                event_title,
            },
        })
    })
    .transpose()
}

fn max_position(tx: &Transaction<'_>, school_id: &str, date: NaiveDate) -> Result<Option<i64>> {
    let max = tx.query_row(
        "SELECT MAX(position) FROM schedule_columns WHERE school_id = ?1 AND date = ?2",
        rusqlite::params![school_id, date.to_string()],
        |row| row.get(0),
    )?;
    Ok(max)
}

fn ordered_positions(
    tx: &Transaction<'_>,
    school_id: &str,
    date: NaiveDate,
) -> Result<Vec<(String, i64)>> {
    let mut stmt = tx.prepare(
        "SELECT column_id, position FROM schedule_columns
         WHERE school_id = ?1 AND date = ?2 ORDER BY position",
    )?;
    let cols = stmt
        .query_map(rusqlite::params![school_id, date.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cols)
}

fn set_position(
    tx: &Transaction<'_>,
    school_id: &str,
    date: NaiveDate,
    column_id: &str,
    position: i64,
) -> Result<()> {
    tx.execute(
        "UPDATE schedule_columns SET position = ?1
         WHERE school_id = ?2 AND date = ?3 AND column_id = ?4",
        rusqlite::params![position, school_id, date.to_string(), column_id],
    )?;
    Ok(())
}

/// Renumber columns without tripping the UNIQUE(position) constraint: every
/// column of the day is first flipped to a distinct negative value.
fn apply_positions(
    tx: &Transaction<'_>,
    school_id: &str,
    date: NaiveDate,
    positions: &[(String, i64)],
) -> Result<()> {
    tx.execute(
        "UPDATE schedule_columns SET position = -position - 1
         WHERE school_id = ?1 AND date = ?2 AND position > 0",
        rusqlite::params![school_id, date.to_string()],
    )?;
    for (column_id, position) in positions {
        set_position(tx, school_id, date, column_id, *position)?;
    }
    Ok(())
}

fn delete_cells(tx: &Transaction<'_>, school_id: &str, date: NaiveDate, column_id: &str) -> Result<usize> {
    let n = tx.execute(
        "DELETE FROM schedule_cells WHERE school_id = ?1 AND date = ?2 AND column_id = ?3",
        rusqlite::params![school_id, date.to_string(), column_id],
    )?;
    Ok(n)
}

fn delete_column_row(tx: &Transaction<'_>, school_id: &str, date: NaiveDate, column_id: &str) -> Result<()> {
    tx.execute(
        "DELETE FROM schedule_columns WHERE school_id = ?1 AND date = ?2 AND column_id = ?3",
        rusqlite::params![school_id, date.to_string(), column_id],
    )?;
    Ok(())
}

/// Flat storage form of a cell, shared by every column type.
#[derive(Debug, Default)]
struct CellRow {
    issue_teacher: Option<String>,
    sub_teacher: Option<String>,
    class_ids: String,
    subject: Option<String>,
    event_title: Option<String>,
    event_text: Option<String>,
    instructions: Option<String>,
}

impl CellRow {
    fn from_payload(payload: &CellPayload) -> Result<Self> {
        let row = match payload {
            CellPayload::MissingTeacher(s) | CellPayload::ExistingTeacher(s) => CellRow {
                issue_teacher: s.issue_teacher.clone(),
                sub_teacher: s.sub_teacher.clone(),
                class_ids: serde_json::to_string(&s.class_ids)?,
                subject: s.subject.clone(),
                event_title: None,
                event_text: s.event.clone(),
                instructions: s.instructions.clone(),
            },
            CellPayload::Event(s) => CellRow {
                issue_teacher: None,
                sub_teacher: s.sub_teacher.clone(),
                class_ids: serde_json::to_string(&s.class_ids)?,
                subject: None,
                event_title: s.event_title.clone(),
                event_text: s.event.clone(),
                instructions: s.instructions.clone(),
            },
        };
        Ok(row)
    }

    fn into_payload(self, column_type: ColumnType) -> Result<CellPayload> {
        let class_ids: Vec<String> = if self.class_ids.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.class_ids)?
        };
        let teacher_slot = |row: CellRow, class_ids| TeacherSlot {
            issue_teacher: row.issue_teacher,
            sub_teacher: row.sub_teacher,
            class_ids,
            subject: row.subject,
            event: row.event_text,
            instructions: row.instructions,
        };
        Ok(match column_type {
            ColumnType::MissingTeacher => CellPayload::MissingTeacher(teacher_slot(self, class_ids)),
            ColumnType::ExistingTeacher => CellPayload::ExistingTeacher(teacher_slot(self, class_ids)),
            ColumnType::Event => CellPayload::Event(EventSlot {
                event_title: self.event_title,
                event: self.event_text,
                sub_teacher: self.sub_teacher,
                class_ids,
                instructions: self.instructions,
            }),
        })
    }

    fn read(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(CellRow {
            issue_teacher: row.get(offset)?,
            sub_teacher: row.get(offset + 1)?,
            class_ids: row.get(offset + 2)?,
            subject: row.get(offset + 3)?,
            event_title: row.get(offset + 4)?,
            event_text: row.get(offset + 5)?,
            instructions: row.get(offset + 6)?,
        })
    }
}

const CELL_COLUMNS: &str =
    "issue_teacher, sub_teacher, class_ids, subject, event_title, event_text, instructions";

fn load_cell(
    tx: &Transaction<'_>,
    school_id: &str,
    date: NaiveDate,
    column_id: &str,
    hour: u32,
    column_type: ColumnType,
) -> Result<Option<CellPayload>> {
    let sql = format!(
        "SELECT {CELL_COLUMNS} FROM schedule_cells
         WHERE school_id = ?1 AND date = ?2 AND column_id = ?3 AND hour = ?4"
    );
    let row = tx
        .query_row(
            &sql,
            rusqlite::params![school_id, date.to_string(), column_id, hour],
            |row| CellRow::read(row, 0),
        )
        .optional()?;
    row.map(|r| r.into_payload(column_type)).transpose()
}

fn write_cell(
    tx: &Transaction<'_>,
    school_id: &str,
    date: NaiveDate,
    column_id: &str,
    hour: u32,
    payload: &CellPayload,
    now: &str,
) -> Result<()> {
    let row = CellRow::from_payload(payload)?;
    tx.execute(
        "INSERT INTO schedule_cells
         (school_id, date, column_id, hour, issue_teacher, sub_teacher, class_ids,
          subject, event_title, event_text, instructions, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(school_id, date, column_id, hour) DO UPDATE SET
            issue_teacher = excluded.issue_teacher,
            sub_teacher   = excluded.sub_teacher,
            class_ids     = excluded.class_ids,
            subject       = excluded.subject,
            event_title   = excluded.event_title,
            event_text    = excluded.event_text,
            instructions  = excluded.instructions,
            updated_at    = excluded.updated_at",
        rusqlite::params![
            school_id,
            date.to_string(),
            column_id,
            hour,
            row.issue_teacher,
            row.sub_teacher,
            row.class_ids,
            row.subject,
            row.event_title,
            row.event_text,
            row.instructions,
            now
        ],
    )?;
    Ok(())
}

fn read_day(tx: &Transaction<'_>, school_id: &str, date: NaiveDate) -> Result<DaySchedule> {
    let date_str = date.to_string();
    let mut columns: Vec<ScheduleColumn> = {
        let mut stmt = tx.prepare(
            "SELECT column_id, column_type, position, header_teacher, header_event
             FROM schedule_columns WHERE school_id = ?1 AND date = ?2 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![school_id, date_str], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(column_id, type_str, position, teacher, event_title)| -> Result<ScheduleColumn> {
                Ok(ScheduleColumn {
                    column_id,
                    column_type: type_str
                        .parse::<ColumnType>()
                        .map_err(ScheduleError::Validation)?,
                    position,
                    header: ColumnHeader {
                        teacher,
                        event_title,
                    },
                    cells: BTreeMap::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    let sql = format!(
        "SELECT column_id, hour, {CELL_COLUMNS} FROM schedule_cells
         WHERE school_id = ?1 AND date = ?2 ORDER BY column_id, hour"
    );
    let mut stmt = tx.prepare(&sql)?;
    let cells = stmt
        .query_map(rusqlite::params![school_id, date_str], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                CellRow::read(row, 2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (column_id, hour, cell_row) in cells {
        let Some(column) = columns.iter_mut().find(|c| c.column_id == column_id) else {
            warn!(school_id, column_id = %column_id, hour, "cell without column row skipped");
            continue;
        };
        let payload = cell_row.into_payload(column.column_type)?;
        column.cells.insert(
            hour,
            ScheduleCell {
                hour,
                column_id,
                payload,
            },
        );
    }

    Ok(DaySchedule {
        school_id: school_id.to_string(),
        date,
        columns,
    })
}

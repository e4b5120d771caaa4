use chrono::NaiveDate;
use schoolday_core::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-hour content of a missing- or existing-teacher column.
///
/// Ids reference the `teachers`, `classes` and `subjects` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_teacher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_teacher: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Per-hour content of an event column (trip, exam, assembly …).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_teacher: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Cell content, tagged by the type of column it belongs to.
///
/// As a write request this is a patch: `None` fields keep their stored
/// value, empty strings clear it, a non-empty `classIds` replaces the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CellPayload {
    MissingTeacher(TeacherSlot),
    ExistingTeacher(TeacherSlot),
    Event(EventSlot),
}

impl CellPayload {
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellPayload::MissingTeacher(_) => ColumnType::MissingTeacher,
            CellPayload::ExistingTeacher(_) => ColumnType::ExistingTeacher,
            CellPayload::Event(_) => ColumnType::Event,
        }
    }

    /// A payload with nothing set, used for header-only placeholder cells.
    pub fn empty(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::MissingTeacher => CellPayload::MissingTeacher(TeacherSlot::default()),
            ColumnType::ExistingTeacher => CellPayload::ExistingTeacher(TeacherSlot::default()),
            ColumnType::Event => CellPayload::Event(EventSlot::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellPayload::MissingTeacher(s) | CellPayload::ExistingTeacher(s) => {
                *s == TeacherSlot::default()
            }
            CellPayload::Event(s) => *s == EventSlot::default(),
        }
    }

    /// Apply `patch` on top of `self`. Both must be of the same column type;
    /// the caller checks that before merging.
    pub fn merge(&mut self, patch: CellPayload) {
        match (self, patch) {
            (CellPayload::MissingTeacher(cur), CellPayload::MissingTeacher(p))
            | (CellPayload::ExistingTeacher(cur), CellPayload::ExistingTeacher(p)) => {
                patch_field(&mut cur.issue_teacher, p.issue_teacher);
                patch_field(&mut cur.sub_teacher, p.sub_teacher);
                patch_list(&mut cur.class_ids, p.class_ids);
                patch_field(&mut cur.subject, p.subject);
                patch_field(&mut cur.event, p.event);
                patch_field(&mut cur.instructions, p.instructions);
            }
            (CellPayload::Event(cur), CellPayload::Event(p)) => {
                patch_field(&mut cur.event_title, p.event_title);
                patch_field(&mut cur.event, p.event);
                patch_field(&mut cur.sub_teacher, p.sub_teacher);
                patch_list(&mut cur.class_ids, p.class_ids);
                patch_field(&mut cur.instructions, p.instructions);
            }
            _ => {}
        }
    }

    /// The teacher or event title shown at the top of the column.
    pub fn header(&self) -> ColumnHeader {
        match self {
            CellPayload::MissingTeacher(s) | CellPayload::ExistingTeacher(s) => ColumnHeader {
                teacher: s.issue_teacher.clone(),
                event_title: None,
            },
            CellPayload::Event(s) => ColumnHeader {
                teacher: None,
                event_title: s.event_title.clone(),
            },
        }
    }

    pub fn sub_teacher(&self) -> Option<&str> {
        match self {
            CellPayload::MissingTeacher(s) | CellPayload::ExistingTeacher(s) => {
                s.sub_teacher.as_deref()
            }
            CellPayload::Event(s) => s.sub_teacher.as_deref(),
        }
    }

    pub fn class_ids(&self) -> &[String] {
        match self {
            CellPayload::MissingTeacher(s) | CellPayload::ExistingTeacher(s) => &s.class_ids,
            CellPayload::Event(s) => &s.class_ids,
        }
    }
}

fn patch_field(cur: &mut Option<String>, patch: Option<String>) {
    match patch {
        Some(v) if v.is_empty() => *cur = None,
        Some(v) => *cur = Some(v),
        None => {}
    }
}

fn patch_list(cur: &mut Vec<String>, patch: Vec<String>) {
    if !patch.is_empty() {
        *cur = patch;
    }
}

/// Descriptor kept on the column so the header survives cleared hours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
}

impl ColumnHeader {
    /// Overwrite with whatever `other` sets; unset fields are kept.
    pub fn absorb(&mut self, other: ColumnHeader) {
        if other.teacher.is_some() {
            self.teacher = other.teacher;
        }
        if other.event_title.is_some() {
            self.event_title = other.event_title;
        }
    }
}

/// One hour of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleCell {
    pub hour: u32,
    pub column_id: String,
    pub payload: CellPayload,
}

impl ScheduleCell {
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A column with its cells keyed by hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleColumn {
    pub column_id: String,
    pub column_type: ColumnType,
    pub position: i64,
    pub header: ColumnHeader,
    pub cells: BTreeMap<u32, ScheduleCell>,
}

/// Full schedule of one school for one date, columns in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    pub school_id: String,
    pub date: NaiveDate,
    pub columns: Vec<ScheduleColumn>,
}

impl DaySchedule {
    pub fn column(&self, column_id: &str) -> Option<&ScheduleColumn> {
        self.columns.iter().find(|c| c.column_id == column_id)
    }

    pub fn cell(&self, column_id: &str, hour: u32) -> Option<&ScheduleCell> {
        self.column(column_id)?.cells.get(&hour)
    }

    /// Column ids in left-to-right order.
    pub fn column_order(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column_id.as_str()).collect()
    }
}

use chrono::NaiveDate;
use schoolday_core::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable, name-resolved snapshot of one hour of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub school_id: String,
    pub date: NaiveDate,
    /// 1 = Sunday … 7 = Saturday.
    pub day: u8,
    pub hour: u32,
    pub column_id: String,
    pub column_position: i64,
    pub column_type: ColumnType,
    pub original_teacher: Option<String>,
    /// Class names joined with `,`.
    pub classes: Option<String>,
    pub subject: Option<String>,
    pub sub_teacher: Option<String>,
    pub instructions: Option<String>,
    pub event_title: Option<String>,
    pub event_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStats {
    pub schools_updated: usize,
    pub records_count: usize,
}

impl ArchiveStats {
    pub fn add(&mut self, other: ArchiveStats) {
        self.schools_updated += other.schools_updated;
        self.records_count += other.records_count;
    }
}

/// Result of an archival or backfill run.
///
/// `logs` is a narrated trace for operators; it is not meant to be parsed.
/// `stats` are filled in even when `success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutcome {
    pub success: bool,
    pub message: String,
    pub logs: Vec<String>,
    pub stats: ArchiveStats,
}

/// hour → original teacher name → ranked substitute names.
pub type Recommendations = BTreeMap<u32, BTreeMap<String, Vec<String>>>;

/// Flattened view of one (hour, original teacher) group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSlot {
    pub hour: u32,
    pub original_teacher_name: String,
    pub candidates: Vec<String>,
}

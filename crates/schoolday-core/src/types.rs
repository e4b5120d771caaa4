use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, SchooldayError};

/// Category of a change notification. Clients subscribe to a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Event-column changes.
    Event,
    /// Missing- and existing-teacher column changes.
    Teacher,
    /// Publish-state changes.
    Publish,
    /// Teacher/class/subject list changes.
    Entities,
    /// Teacher-submitted instructional material.
    Material,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Event,
        Channel::Teacher,
        Channel::Publish,
        Channel::Entities,
        Channel::Material,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Event => "event",
            Channel::Teacher => "teacher",
            Channel::Publish => "publish",
            Channel::Entities => "entities",
            Channel::Material => "material",
        }
    }

    /// Parse a comma-separated channel list (`"event,teacher"`).
    ///
    /// Blank entries are ignored; an empty list means every channel.
    pub fn parse_list(s: &str) -> Result<BTreeSet<Channel>> {
        let set = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse::<Channel>)
            .collect::<Result<BTreeSet<_>>>()?;
        if set.is_empty() {
            return Ok(Channel::ALL.into_iter().collect());
        }
        Ok(set)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = SchooldayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "event" => Ok(Channel::Event),
            "teacher" => Ok(Channel::Teacher),
            "publish" => Ok(Channel::Publish),
            "entities" => Ok(Channel::Entities),
            "material" => Ok(Channel::Material),
            other => Err(SchooldayError::UnknownChannel(other.to_string())),
        }
    }
}

/// What a schedule column represents. Fixed for the column's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    MissingTeacher,
    ExistingTeacher,
    Event,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::MissingTeacher => "missingTeacher",
            ColumnType::ExistingTeacher => "existingTeacher",
            ColumnType::Event => "event",
        }
    }

    /// Notification channel for changes to a column of this type.
    pub fn channel(&self) -> Channel {
        match self {
            ColumnType::Event => Channel::Event,
            ColumnType::MissingTeacher | ColumnType::ExistingTeacher => Channel::Teacher,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "missingTeacher" => Ok(ColumnType::MissingTeacher),
            "existingTeacher" => Ok(ColumnType::ExistingTeacher),
            "event" => Ok(ColumnType::Event),
            other => Err(format!("unknown column type: {other}")),
        }
    }
}

/// School weekday of `date`: 1 = Sunday … 7 = Saturday.
pub fn school_day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8 + 1
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| SchooldayError::InvalidDate(format!("{s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_list_parses_and_dedupes() {
        let set = Channel::parse_list("teacher, event,teacher").unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Channel::Teacher));
        assert!(set.contains(&Channel::Event));
    }

    #[test]
    fn empty_channel_list_means_all() {
        assert_eq!(Channel::parse_list("").unwrap().len(), Channel::ALL.len());
        assert_eq!(Channel::parse_list(" , ").unwrap().len(), Channel::ALL.len());
    }

    #[test]
    fn unknown_channel_is_rejected() {
        assert!(matches!(
            Channel::parse_list("event,bogus"),
            Err(SchooldayError::UnknownChannel(c)) if c == "bogus"
        ));
    }

    #[test]
    fn column_type_maps_to_channel() {
        assert_eq!(ColumnType::Event.channel(), Channel::Event);
        assert_eq!(ColumnType::MissingTeacher.channel(), Channel::Teacher);
        assert_eq!(ColumnType::ExistingTeacher.channel(), Channel::Teacher);
    }

    #[test]
    fn weekday_starts_on_sunday() {
        // 2024-09-01 was a Sunday.
        assert_eq!(school_day_of_week(parse_date("2024-09-01").unwrap()), 1);
        assert_eq!(school_day_of_week(parse_date("2024-09-07").unwrap()), 7);
    }

    #[test]
    fn column_type_serde_is_camel_case() {
        let json = serde_json::to_string(&ColumnType::MissingTeacher).unwrap();
        assert_eq!(json, r#""missingTeacher""#);
        let back: ColumnType = "existingTeacher".parse().unwrap();
        assert_eq!(back, ColumnType::ExistingTeacher);
    }
}

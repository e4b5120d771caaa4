use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::DaySchedule;

/// Cache entries expire after 5 minutes even without an invalidation.
const CACHE_TTL_SECS: i64 = 300;
/// Maximum cached days before the oldest entry is evicted.
const MAX_CACHE_ENTRIES: usize = 512;

type DayKey = (String, NaiveDate);

struct Entry {
    day: DaySchedule,
    built_at: DateTime<Utc>,
}

/// Read-through cache of full day reads.
///
/// Only the schedule store fills or invalidates it; readers always receive a
/// clone, never a reference into the cache.
pub struct DayCache {
    entries: Mutex<HashMap<DayKey, Entry>>,
}

impl DayCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, school_id: &str, date: NaiveDate) -> Option<DaySchedule> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&(school_id.to_string(), date))?;
        let age = Utc::now().signed_duration_since(entry.built_at).num_seconds();
        if age < CACHE_TTL_SECS {
            Some(entry.day.clone())
        } else {
            None
        }
    }

    pub fn put(&self, day: &DaySchedule) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= MAX_CACHE_ENTRIES {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.built_at)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                entries.remove(&k);
            }
        }
        entries.insert(
            (day.school_id.clone(), day.date),
            Entry {
                day: day.clone(),
                built_at: Utc::now(),
            },
        );
    }

    pub fn invalidate(&self, school_id: &str, date: NaiveDate) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&(school_id.to_string(), date));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DayCache {
    fn default() -> Self {
        Self::new()
    }
}

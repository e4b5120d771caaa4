use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use schoolday_core::config::RecommendConfig;
use tracing::{debug, instrument};

use crate::db::init_db;
use crate::error::{HistoryError, Result};
use crate::types::{RecommendationSlot, Recommendations};

/// One substitution seen in history: who was missing at which hour, and
/// who covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub hour: u32,
    pub original_teacher: String,
    pub sub_teacher: String,
}

struct CachedEntry {
    value: Recommendations,
    built_at: DateTime<Utc>,
}

/// Substitute-teacher suggestions mined from archived history.
///
/// Read-only over the `history` table. Results are cached per
/// (school, weekday) and dropped by the archival job whenever it rewrites
/// that school.
pub struct Recommender {
    db: Arc<Mutex<Connection>>,
    cfg: RecommendConfig,
    cache: Mutex<HashMap<(String, u8), CachedEntry>>,
}

impl Recommender {
    pub fn new(db: Arc<Mutex<Connection>>, cfg: RecommendConfig) -> Result<Self> {
        init_db(&db.lock().unwrap())?;
        Ok(Self {
            db,
            cfg,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// hour -> original teacher name -> up to `max_candidates` substitutes,
    /// most frequent first. `day` is 1 (Sunday) through 7 (Saturday).
    #[instrument(skip(self))]
    pub fn recommend(&self, school_id: &str, day: u8) -> Result<Recommendations> {
        if !(1..=7).contains(&day) {
            return Err(HistoryError::Validation(format!(
                "day of week must be 1..=7, got {day}"
            )));
        }

        let key = (school_id.to_string(), day);
        if let Some(entry) = self.cache.lock().unwrap().get(&key) {
            let age = Utc::now().signed_duration_since(entry.built_at).num_seconds();
            if age < self.cfg.cache_ttl_secs {
                debug!("recommendation cache hit");
                return Ok(entry.value.clone());
            }
        }

        // Cache under the connection lock: archival rewrites history while
        // holding it and invalidates afterwards, so no stale fill survives.
        let conn = self.db.lock().unwrap();
        let rows = load_substitutions(&conn, school_id, day)?;
        let value = rank_substitutes(&rows, &self.cfg);
        debug!(rows = rows.len(), groups = value.len(), "recommendations computed");
        self.cache.lock().unwrap().insert(
            key,
            CachedEntry {
                value: value.clone(),
                built_at: Utc::now(),
            },
        );
        Ok(value)
    }

    /// Same data as [`Recommender::recommend`], flattened to one slot per
    /// (hour, original teacher).
    pub fn slots(&self, school_id: &str, day: u8) -> Result<Vec<RecommendationSlot>> {
        Ok(self
            .recommend(school_id, day)?
            .into_iter()
            .flat_map(|(hour, by_teacher)| {
                by_teacher
                    .into_iter()
                    .map(move |(original_teacher_name, candidates)| RecommendationSlot {
                        hour,
                        original_teacher_name,
                        candidates,
                    })
            })
            .collect())
    }

    pub fn invalidate_school(&self, school_id: &str) {
        self.cache
            .lock()
            .unwrap()
            .retain(|(school, _), _| school != school_id);
    }
}

/// History rows with both teachers known, in archival order (date, column
/// position, hour). That order decides ties in [`rank_substitutes`].
fn load_substitutions(conn: &Connection, school_id: &str, day: u8) -> Result<Vec<Substitution>> {
    let mut stmt = conn.prepare(
        "SELECT hour, original_teacher, sub_teacher FROM history
         WHERE school_id = ?1 AND day = ?2
           AND original_teacher IS NOT NULL AND sub_teacher IS NOT NULL
         ORDER BY date, column_position, hour",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![school_id, day], |row| {
            Ok(Substitution {
                hour: row.get(0)?,
                original_teacher: row.get(1)?,
                sub_teacher: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Group by (hour, original teacher), count each substitute, drop those
/// under `min_substitutions`, keep the `max_candidates` most frequent.
///
/// Equal counts keep first-seen order.
pub fn rank_substitutes(rows: &[Substitution], cfg: &RecommendConfig) -> Recommendations {
    let mut counts: BTreeMap<u32, BTreeMap<String, Vec<(String, u32)>>> = BTreeMap::new();
    for row in rows {
        let seen = counts
            .entry(row.hour)
            .or_default()
            .entry(row.original_teacher.clone())
            .or_default();
        match seen.iter_mut().find(|(name, _)| *name == row.sub_teacher) {
            Some((_, n)) => *n += 1,
            None => seen.push((row.sub_teacher.clone(), 1)),
        }
    }

    let mut out = Recommendations::new();
    for (hour, by_teacher) in counts {
        for (teacher, mut candidates) in by_teacher {
            candidates.retain(|(_, n)| *n >= cfg.min_substitutions);
            if candidates.is_empty() {
                continue;
            }
            candidates.sort_by(|a, b| b.1.cmp(&a.1));
            let names = candidates
                .into_iter()
                .take(cfg.max_candidates)
                .map(|(name, _)| name)
                .collect();
            out.entry(hour).or_default().insert(teacher, names);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(hour: u32, original: &str, substitute: &str) -> Substitution {
        Substitution {
            hour,
            original_teacher: original.to_string(),
            sub_teacher: substitute.to_string(),
        }
    }

    fn repeat(n: usize, s: Substitution) -> Vec<Substitution> {
        vec![s; n]
    }

    #[test]
    fn most_frequent_substitute_first() {
        let mut rows = repeat(2, sub(3, "A", "C"));
        rows.extend(repeat(4, sub(3, "A", "B")));
        let recs = rank_substitutes(&rows, &RecommendConfig::default());
        assert_eq!(recs[&3]["A"], vec!["B", "C"]);
    }

    #[test]
    fn keeps_at_most_three_candidates() {
        let mut rows = Vec::new();
        for (name, n) in [("B", 5), ("C", 4), ("D", 3), ("E", 2), ("F", 1)] {
            rows.extend(repeat(n, sub(1, "A", name)));
        }
        let recs = rank_substitutes(&rows, &RecommendConfig::default());
        assert_eq!(recs[&1]["A"], vec!["B", "C", "D"]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let rows = vec![sub(2, "A", "Z"), sub(2, "A", "Y"), sub(2, "A", "X"), sub(2, "A", "X")];
        let recs = rank_substitutes(&rows, &RecommendConfig::default());
        assert_eq!(recs[&2]["A"], vec!["X", "Z", "Y"]);
    }

    #[test]
    fn groups_by_hour_and_original_teacher() {
        let rows = vec![sub(1, "A", "B"), sub(2, "A", "C"), sub(1, "D", "C")];
        let recs = rank_substitutes(&rows, &RecommendConfig::default());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[&1]["A"], vec!["B"]);
        assert_eq!(recs[&1]["D"], vec!["C"]);
        assert_eq!(recs[&2]["A"], vec!["C"]);
    }

    #[test]
    fn threshold_drops_rare_substitutes() {
        let mut rows = repeat(3, sub(4, "A", "B"));
        rows.push(sub(4, "A", "C"));
        rows.push(sub(5, "E", "F"));
        let cfg = RecommendConfig {
            min_substitutions: 2,
            ..RecommendConfig::default()
        };
        let recs = rank_substitutes(&rows, &cfg);
        assert_eq!(recs[&4]["A"], vec!["B"]);
        assert!(!recs.contains_key(&5));
    }

    fn recommender() -> (Arc<Mutex<Connection>>, Recommender) {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let r = Recommender::new(conn.clone(), RecommendConfig::default()).unwrap();
        (conn, r)
    }

    fn insert(conn: &Mutex<Connection>, date: &str, day: u8, col: &str, hour: u32, orig: Option<&str>, subst: Option<&str>) {
        conn.lock()
            .unwrap()
            .execute(
                "INSERT INTO history (school_id, date, day, hour, column_id, column_position,
                                      column_type, original_teacher, sub_teacher)
                 VALUES ('S1', ?1, ?2, ?3, ?4, 1000, 'missingTeacher', ?5, ?6)",
                rusqlite::params![date, day, hour, col, orig, subst],
            )
            .unwrap();
    }

    #[test]
    fn reads_only_the_requested_weekday() {
        let (conn, r) = recommender();
        insert(&conn, "2024-09-01", 1, "a", 3, Some("A"), Some("B"));
        insert(&conn, "2024-09-08", 1, "a", 3, Some("A"), Some("B"));
        insert(&conn, "2024-09-02", 2, "a", 3, Some("A"), Some("C"));
        insert(&conn, "2024-09-15", 1, "a", 3, Some("A"), None);

        let recs = r.recommend("S1", 1).unwrap();
        assert_eq!(recs[&3]["A"], vec!["B"]);
        assert!(r.recommend("S2", 1).unwrap().is_empty());
    }

    #[test]
    fn cached_until_invalidated() {
        let (conn, r) = recommender();
        insert(&conn, "2024-09-01", 1, "a", 3, Some("A"), Some("B"));
        assert_eq!(r.recommend("S1", 1).unwrap()[&3]["A"], vec!["B"]);

        insert(&conn, "2024-09-08", 1, "a", 3, Some("A"), Some("C"));
        insert(&conn, "2024-09-15", 1, "a", 3, Some("A"), Some("C"));
        assert_eq!(r.recommend("S1", 1).unwrap()[&3]["A"], vec!["B"]);

        r.invalidate_school("S1");
        assert_eq!(r.recommend("S1", 1).unwrap()[&3]["A"], vec!["C", "B"]);
    }

    #[test]
    fn concurrent_reads_never_cache_superseded_history() {
        let (conn, r) = recommender();
        let r = Arc::new(r);
        insert(&conn, "2024-09-01", 1, "a", 3, Some("A"), Some("B"));

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let reader = {
            let r = r.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                while !done.load(std::sync::atomic::Ordering::Acquire) {
                    r.recommend("S1", 1).unwrap();
                }
            })
        };
        for week in 0..20 {
            let date = format!("2024-10-{:02}", week + 1);
            insert(&conn, &date, 1, "a", 3, Some("A"), Some("C"));
            r.invalidate_school("S1");
            std::thread::yield_now();
        }
        done.store(true, std::sync::atomic::Ordering::Release);
        reader.join().unwrap();

        let fresh = {
            let c = conn.lock().unwrap();
            rank_substitutes(&load_substitutions(&c, "S1", 1).unwrap(), &RecommendConfig::default())
        };
        assert_eq!(r.recommend("S1", 1).unwrap(), fresh);
        assert_eq!(fresh[&3]["A"], vec!["C", "B"]);
    }

    #[test]
    fn rejects_out_of_range_weekday() {
        let (_conn, r) = recommender();
        assert!(matches!(r.recommend("S1", 0), Err(HistoryError::Validation(_))));
        assert!(matches!(r.recommend("S1", 8), Err(HistoryError::Validation(_))));
    }

    #[test]
    fn slots_flatten_the_map() {
        let (conn, r) = recommender();
        insert(&conn, "2024-09-01", 1, "a", 2, Some("A"), Some("B"));
        insert(&conn, "2024-09-01", 1, "b", 4, Some("D"), Some("E"));
        let slots = r.slots("S1", 1).unwrap();
        assert_eq!(
            slots,
            vec![
                RecommendationSlot {
                    hour: 2,
                    original_teacher_name: "A".into(),
                    candidates: vec!["B".into()],
                },
                RecommendationSlot {
                    hour: 4,
                    original_teacher_name: "D".into(),
                    candidates: vec!["E".into()],
                },
            ]
        );
    }
}

//! Column sort keys.
//!
//! Positions are spaced by a stride so a column can be dropped between two
//! neighbours by taking their midpoint. Only when neighbours are too close
//! does the whole day get renumbered ("compaction"). Everything here is pure;
//! the store applies the results inside a transaction.

use schoolday_core::config::PositionConfig;

/// Position for a column appended after `last`.
pub fn append(last: Option<i64>, cfg: PositionConfig) -> i64 {
    match last {
        Some(last) => last.saturating_add(cfg.stride),
        None => cfg.stride,
    }
}

/// Position strictly between `before` and `after`, or `None` when the gap is
/// below `cfg.min_gap` and the day must be compacted first.
///
/// A missing `before` means "first column" (lower bound 0); a missing
/// `after` means "last column".
pub fn between(before: Option<i64>, after: Option<i64>, cfg: PositionConfig) -> Option<i64> {
    match (before, after) {
        (before, None) => Some(append(before, cfg)),
        (before, Some(after)) => {
            let lo = before.unwrap_or(0);
            let gap = after.checked_sub(lo)?;
            if gap < cfg.min_gap.max(2) {
                return None;
            }
            Some(lo + gap / 2)
        }
    }
}

/// Canonical positions for `ordered` ids: the n-th column (1-based) gets
/// `n * stride`.
pub fn reindex<S: AsRef<str>>(ordered: &[S], cfg: PositionConfig) -> Vec<(String, i64)> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_ref().to_string(), (i as i64 + 1) * cfg.stride))
        .collect()
}

/// Where the column holding `taken` goes when a later request claims that
/// position: one step up, as long as that stays below `next`, the position
/// of the column after it. `None` means there is no room and the day must be
/// compacted.
pub fn displace(taken: i64, next: Option<i64>) -> Option<i64> {
    let up = taken.checked_add(1)?;
    match next {
        Some(next) if up >= next => None,
        _ => Some(up),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PositionConfig {
        PositionConfig::default()
    }

    #[test]
    fn first_column_gets_one_stride() {
        assert_eq!(append(None, cfg()), 1000);
        assert_eq!(append(Some(3000), cfg()), 4000);
    }

    #[test]
    fn midpoint_between_neighbours() {
        assert_eq!(between(Some(1000), Some(2000), cfg()), Some(1500));
        assert_eq!(between(Some(1000), Some(1002), cfg()), Some(1001));
    }

    #[test]
    fn adjacent_neighbours_need_compaction() {
        assert_eq!(between(Some(1000), Some(1001), cfg()), None);
        assert_eq!(between(None, Some(1), cfg()), None);
    }

    #[test]
    fn placing_first_uses_zero_as_lower_bound() {
        assert_eq!(between(None, Some(1000), cfg()), Some(500));
    }

    #[test]
    fn placing_last_appends() {
        assert_eq!(between(Some(7000), None, cfg()), Some(8000));
        assert_eq!(between(None, None, cfg()), Some(1000));
    }

    #[test]
    fn larger_min_gap_compacts_sooner() {
        let wide = PositionConfig {
            stride: 1000,
            min_gap: 10,
        };
        assert_eq!(between(Some(100), Some(105), wide), None);
        assert_eq!(between(Some(100), Some(110), wide), Some(105));
    }

    #[test]
    fn reindex_spaces_by_stride_in_given_order() {
        let out = reindex(&["c", "a", "b"], cfg());
        assert_eq!(
            out,
            vec![
                ("c".to_string(), 1000),
                ("a".to_string(), 2000),
                ("b".to_string(), 3000)
            ]
        );
    }

    #[test]
    fn reindex_then_midpoint_fits_between_adjacent_pair() {
        // a=1000, b=1001 leave no room; after compaction there is.
        let positions = reindex(&["a", "b"], cfg());
        let mid = between(Some(positions[0].1), Some(positions[1].1), cfg()).unwrap();
        assert!(positions[0].1 < mid && mid < positions[1].1);
    }

    #[test]
    fn reindex_handles_very_wide_days_in_64_bits() {
        let ids: Vec<String> = (0..40_000).map(|i| format!("c{i}")).collect();
        let out = reindex(&ids, cfg());
        assert_eq!(out.last().map(|(_, p)| *p), Some(40_000 * 1000));
        assert!(out.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn displaced_column_steps_up_within_its_gap() {
        assert_eq!(displace(1000, Some(2000)), Some(1001));
        assert_eq!(displace(2000, None), Some(2001));
    }

    #[test]
    fn displaced_column_never_passes_its_neighbour() {
        assert_eq!(displace(1000, Some(1001)), None);
        assert_eq!(displace(i64::MAX, None), None);
    }
}

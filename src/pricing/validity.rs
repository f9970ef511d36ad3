//! Validity windows of stored price versions.
//!
//! Every stored version covers the half-open interval `[valid_from, valid_to)`;
//! an absent `valid_to` means the version is still current.

use chrono::{DateTime, Utc};

const SECONDS_PER_HOUR: i64 = 3600;

/// Truncate a timestamp to the start of its UTC hour.
///
/// Scraper runs within the same hour collapse onto one observation instant.
pub fn floor_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(SECONDS_PER_HOUR);
    DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(ts)
}

/// Check whether `[valid_from, valid_to)` contains `check_time`.
pub fn contains(
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
    check_time: DateTime<Utc>,
) -> bool {
    if valid_from > check_time {
        return false;
    }
    match valid_to {
        Some(end) => check_time < end,
        None => true,
    }
}

/// Check that a version-ordered sequence of windows tiles time without gaps
/// or overlaps and that only the last window is open-ended.
///
/// Windows may be empty (`valid_from == valid_to`) when a price changed twice
/// within the same hour.
pub fn is_contiguous<I>(windows: I) -> bool
where
    I: IntoIterator<Item = (DateTime<Utc>, Option<DateTime<Utc>>)>,
{
    let mut prev_end: Option<Option<DateTime<Utc>>> = None;
    for (from, to) in windows {
        if let Some(end) = prev_end {
            match end {
                Some(end) if end == from => {}
                _ => return false,
            }
        }
        if matches!(to, Some(to) if to < from) {
            return false;
        }
        prev_end = Some(to);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_floor_to_hour() {
        assert_eq!(floor_to_hour(at(10, 5, 0)), at(10, 0, 0));
        assert_eq!(floor_to_hour(at(10, 47, 59)), at(10, 0, 0));
        assert_eq!(floor_to_hour(at(10, 0, 0)), at(10, 0, 0));
    }

    #[test]
    fn test_floor_to_hour_drops_subseconds() {
        let ts = at(23, 59, 59) + chrono::Duration::milliseconds(999);
        assert_eq!(floor_to_hour(ts), at(23, 0, 0));
    }

    #[test]
    fn test_floor_before_epoch() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(
            floor_to_hour(ts),
            Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_contains_half_open() {
        assert!(contains(at(10, 0, 0), Some(at(12, 0, 0)), at(10, 0, 0)));
        assert!(contains(at(10, 0, 0), Some(at(12, 0, 0)), at(11, 59, 59)));
        assert!(!contains(at(10, 0, 0), Some(at(12, 0, 0)), at(12, 0, 0)));
        assert!(!contains(at(10, 0, 0), None, at(9, 0, 0)));
        assert!(contains(at(10, 0, 0), None, at(23, 0, 0)));
    }

    #[test]
    fn test_is_contiguous() {
        assert!(is_contiguous(vec![]));
        assert!(is_contiguous(vec![(at(1, 0, 0), None)]));
        assert!(is_contiguous(vec![
            (at(1, 0, 0), Some(at(2, 0, 0))),
            (at(2, 0, 0), Some(at(2, 0, 0))),
            (at(2, 0, 0), None),
        ]));
        // gap
        assert!(!is_contiguous(vec![
            (at(1, 0, 0), Some(at(2, 0, 0))),
            (at(3, 0, 0), None),
        ]));
        // open window before the last one
        assert!(!is_contiguous(vec![(at(1, 0, 0), None), (at(2, 0, 0), None)]));
        // inverted window
        assert!(!is_contiguous(vec![(at(3, 0, 0), Some(at(2, 0, 0)))]));
    }
}

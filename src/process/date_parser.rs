use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Snapshot-name date patterns, tried in order and anchored at the start of
/// the name. Each entry is (pattern, chrono format for the captured text).
///
/// The trailing `(?:\D|$)` keeps `DD-MM-YY` from matching the first eight
/// characters of a `DD-MM-YYYY` name whose date turned out to be invalid.
static SNAPSHOT_DATE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"^(\d{2}-\d{2}-\d{4})(?:\D|$)", "%d-%m-%Y"),
        (r"^(\d{2}-\d{2}-\d{2})(?:\D|$)", "%d-%m-%y"),
        (r"^(\d{4}-\d{2}-\d{2})(?:\D|$)", "%Y-%m-%d"),
    ]
    .into_iter()
    .map(|(re, fmt)| (Regex::new(re).expect("snapshot date pattern"), fmt))
    .collect()
});

/// Execution-date formats after `/` has been folded into `-`.
const EXECUTION_DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%d-%m-%y", "%Y-%m-%d"];

/// Extract the date embedded at the start of a snapshot name, e.g.
/// `05-01-2024_AO_GENERAL.txt`, `05-01-24_AO_GENERAL.txt` or
/// `2024-01-05_AO_GENERAL.txt`. The first pattern yielding a valid calendar
/// date wins.
pub fn parse_snapshot_date(name: &str) -> Option<NaiveDate> {
    let name = name.trim();
    SNAPSHOT_DATE_PATTERNS.iter().find_map(|(re, fmt)| {
        let caps = re.captures(name)?;
        NaiveDate::parse_from_str(caps.get(1)?.as_str(), fmt).ok()
    })
}

/// Parse a day-first execution date cell (`03/02/2024`, `03-02-24`, or ISO
/// `2024-02-03`). A trailing time part is ignored.
pub fn parse_execution_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().trim_matches('"');
    let date_part = cleaned.split_whitespace().next()?.replace('/', "-");
    let parts: Vec<&str> = date_part.split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    // chrono's %Y happily reads two digits as year 24 AD, so pick the format
    // from the width of the year field.
    let fmt = match (parts[0].len(), parts[2].len()) {
        (4, _) => EXECUTION_DATE_FORMATS[2],
        (_, 4) => EXECUTION_DATE_FORMATS[0],
        (_, 2) => EXECUTION_DATE_FORMATS[1],
        _ => return None,
    };
    NaiveDate::parse_from_str(&date_part, fmt).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn snapshot_dates_in_all_three_formats() {
        assert_eq!(parse_snapshot_date("05-01-2024_AO_GENERAL.txt"), Some(d(2024, 1, 5)));
        assert_eq!(parse_snapshot_date("05-01-24_AO_GENERAL.txt"), Some(d(2024, 1, 5)));
        assert_eq!(parse_snapshot_date("2024-01-05_AO_GENERAL.txt"), Some(d(2024, 1, 5)));
    }

    #[test]
    fn snapshot_date_must_be_at_start() {
        assert_eq!(parse_snapshot_date("AO_05-01-2024_GENERAL.txt"), None);
        assert_eq!(parse_snapshot_date("bad.txt"), None);
        assert_eq!(parse_snapshot_date(""), None);
    }

    #[test]
    fn invalid_calendar_dates_are_rejected() {
        assert_eq!(parse_snapshot_date("31-02-2024_AO_GENERAL.txt"), None);
        // must not fall back to reading "29-02-20" out of the four-digit year
        assert_eq!(parse_snapshot_date("29-02-2023_AO_GENERAL.txt"), None);
        assert_eq!(parse_snapshot_date("2024-13-01_AO_GENERAL.txt"), None);
    }

    #[test]
    fn execution_dates_are_day_first() {
        assert_eq!(parse_execution_date("03/02/2024"), Some(d(2024, 2, 3)));
        assert_eq!(parse_execution_date("03-02-2024 08:30:00"), Some(d(2024, 2, 3)));
        assert_eq!(parse_execution_date("\"03/02/24\""), Some(d(2024, 2, 3)));
        assert_eq!(parse_execution_date("2024-02-03"), Some(d(2024, 2, 3)));
        assert_eq!(parse_execution_date("pendiente"), None);
        assert_eq!(parse_execution_date(""), None);
    }
}

//! Recognizing and parsing the loose time strings feeds render next to posts.
//!
//! Nothing here carries timezone information, so every parsed instant is taken as UTC
//! relative to the run's reference time.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

const MAX_TIME_LEN: usize = 64;

struct TimePatterns {
    relative: Regex,
    day: Regex,
    dmy: Regex,
    mdy: Regex,
    weekday: Regex,
    iso: Regex,
    unix: Regex,
}

fn patterns() -> &'static TimePatterns {
    static P: OnceLock<TimePatterns> = OnceLock::new();
    P.get_or_init(|| {
        let at = r"(?:,?\s+(?:at\s+)?(\d{1,2})[:.](\d{2})\s*([ap]m)?)?";
        TimePatterns {
            relative: Regex::new(
                r"^(\d{1,3})\s*(s|secs?|seconds?|m|mins?|minutes?|h|hrs?|hours?|d|days?|w|wks?|weeks?|y|yrs?|years?)(?:\s+ago)?$",
            )
            .expect("valid relative pattern"),
            day: Regex::new(&format!(r"^(yesterday|today){at}$")).expect("valid day pattern"),
            dmy: Regex::new(&format!(r"^(\d{{1,2}})\s+([a-z]+)\.?(?:,?\s+(\d{{4}}))?{at}$"))
                .expect("valid dmy pattern"),
            mdy: Regex::new(&format!(r"^([a-z]+)\.?\s+(\d{{1,2}})(?:,?\s+(\d{{4}}))?{at}$"))
                .expect("valid mdy pattern"),
            weekday: Regex::new(&format!(
                r"^(monday|tuesday|wednesday|thursday|friday|saturday|sunday){at}$"
            ))
            .expect("valid weekday pattern"),
            iso: Regex::new(r"^\d{4}-\d{2}-\d{2}(?:[t ]\d{2}:\d{2}(?::\d{2})?(?:\.\d+)?(?:z|[+-]\d{2}:?\d{2})?)?$")
                .expect("valid iso pattern"),
            unix: Regex::new(r"^\d{9,11}$").expect("valid unix pattern"),
        }
    })
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Month number from a full or abbreviated (≥ 3 letters) English month name.
fn month_from_name(word: &str) -> Option<u32> {
    if word.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(word))
        .map(|i| i as u32 + 1)
}

fn hour_minute(h: Option<&str>, m: Option<&str>, meridiem: Option<&str>) -> Option<(u32, u32)> {
    let (Some(h), Some(m)) = (h, m) else {
        return Some((0, 0));
    };
    let mut hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    match meridiem {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// True for a bare unix-seconds value. Only trusted when it comes from a machine
/// attribute (`data-utime`); in visible text the same digits are usually a phone
/// number or an id.
pub fn is_unix_stamp(s: &str) -> bool {
    patterns().unix.is_match(s.trim())
}

/// True when a short visible string reads like a post time ("2 h", "Yesterday at 10:05",
/// "14 November at 10:23", an ISO date).
pub fn is_time_like(s: &str) -> bool {
    let s = s.trim().to_lowercase();
    if s.is_empty() || s.chars().count() > MAX_TIME_LEN {
        return false;
    }
    let p = patterns();
    if s == "just now" || s == "now" {
        return true;
    }
    if p.relative.is_match(&s)
        || p.day.is_match(&s)
        || p.weekday.is_match(&s)
        || p.iso.is_match(&s)
    {
        return true;
    }
    if let Some(c) = p.dmy.captures(&s) {
        if month_from_name(&c[2]).is_some() {
            return true;
        }
    }
    if let Some(c) = p.mdy.captures(&s) {
        if month_from_name(&c[1]).is_some() {
            return true;
        }
    }
    false
}

/// True for strings whose meaning drifts while the run is in progress
/// ("2 h" becomes "3 h", "Just now" becomes "1 m").
pub fn is_relative(s: &str) -> bool {
    let s = s.trim().to_lowercase();
    let p = patterns();
    s == "just now"
        || s == "now"
        || p.relative.is_match(&s)
        || p.day.is_match(&s)
        || p.weekday.is_match(&s)
}

/// Best-effort instant for a raw time string, relative to `reference` where needed.
pub fn parse_timestamp(raw: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw.trim(), fmt) {
            return Some(ndt.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }

    let p = patterns();
    if p.unix.is_match(&s) {
        let secs: i64 = s.parse().ok()?;
        return DateTime::from_timestamp(secs, 0);
    }
    if s == "just now" || s == "now" {
        return Some(reference);
    }

    if let Some(c) = p.relative.captures(&s) {
        let n: i64 = c[1].parse().ok()?;
        let unit = &c[2];
        let delta = match unit.chars().next()? {
            's' => Duration::seconds(n),
            'm' => Duration::minutes(n),
            'h' => Duration::hours(n),
            'd' => Duration::days(n),
            'w' => Duration::weeks(n),
            'y' => Duration::days(365 * n),
            _ => return None,
        };
        return reference.checked_sub_signed(delta);
    }

    if let Some(c) = p.day.captures(&s) {
        let date = if &c[1] == "yesterday" {
            reference.date_naive().pred_opt()?
        } else {
            reference.date_naive()
        };
        let (h, m) = hour_minute(
            c.get(2).map(|m| m.as_str()),
            c.get(3).map(|m| m.as_str()),
            c.get(4).map(|m| m.as_str()),
        )?;
        return date.and_hms_opt(h, m, 0).map(|n| n.and_utc());
    }

    let (day, month, year, time) = if let Some(c) = p.dmy.captures(&s) {
        let month = month_from_name(&c[2])?;
        (c[1].to_string(), month, c.get(3), (c.get(4), c.get(5), c.get(6)))
    } else if let Some(c) = p.mdy.captures(&s) {
        let month = month_from_name(&c[1])?;
        (c[2].to_string(), month, c.get(3), (c.get(4), c.get(5), c.get(6)))
    } else {
        return None;
    };

    let day: u32 = day.parse().ok()?;
    let (h, m) = hour_minute(
        time.0.map(|m| m.as_str()),
        time.1.map(|m| m.as_str()),
        time.2.map(|m| m.as_str()),
    )?;
    let explicit_year = year.and_then(|y| y.as_str().parse::<i32>().ok());
    let build = |y: i32| {
        NaiveDate::from_ymd_opt(y, month, day)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .map(|n| n.and_utc())
    };
    match explicit_year {
        Some(y) => build(y),
        // Year-less dates are in the past. Walk back far enough to reach a leap year
        // for "29 February".
        None => (0..=4)
            .filter_map(|back| build(reference.year() - back))
            .find(|candidate| *candidate <= reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_time_like_accepts_feed_formats() {
        for s in [
            "2 h",
            "3d",
            "15 mins",
            "5 minutes ago",
            "Just now",
            "Yesterday at 10:23",
            "14 November at 10:23",
            "November 14, 2023",
            "Nov 3",
            "Monday at 9:00 PM",
            "2024-11-14T10:23:00+00:00",
        ] {
            assert!(is_time_like(s), "expected time-like: {s}");
        }
    }

    #[test]
    fn test_time_like_rejects_names_and_labels() {
        for s in [
            "Alice Smith",
            "Comment",
            "Share",
            "3 comments",
            "12 Foo",
            "",
            "h",
            "0412345678",
            "1731580980",
        ] {
            assert!(!is_time_like(s), "expected not time-like: {s}");
        }
    }

    #[test]
    fn test_unix_stamp_only_for_bare_digits() {
        assert!(is_unix_stamp("1731580980"));
        assert!(is_unix_stamp(" 1731580980 "));
        assert!(!is_unix_stamp("+61 412 345 678"));
        assert!(!is_unix_stamp("12345"));
    }

    #[test]
    fn test_is_relative() {
        assert!(is_relative("2 h"));
        assert!(is_relative("Yesterday at 10:23"));
        assert!(!is_relative("14 November at 10:23"));
        assert!(!is_relative("1731580980"));
    }

    #[test]
    fn test_parse_relative() {
        let r = reference();
        assert_eq!(parse_timestamp("2 h", r), Some(r - Duration::hours(2)));
        assert_eq!(parse_timestamp("3d", r), Some(r - Duration::days(3)));
        assert_eq!(parse_timestamp("Just now", r), Some(r));
    }

    #[test]
    fn test_parse_absolute_without_year_rolls_back() {
        let r = reference();
        assert_eq!(
            parse_timestamp("14 November at 10:23", r),
            Some(Utc.with_ymd_and_hms(2024, 11, 14, 10, 23, 0).unwrap())
        );
        // December has not happened yet relative to the reference
        assert_eq!(
            parse_timestamp("December 24", r),
            Some(Utc.with_ymd_and_hms(2023, 12, 24, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_leap_day_without_year_finds_a_leap_year() {
        let r = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp("29 February", r),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap())
        );
        let r = Utc.with_ymd_and_hms(2027, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp("February 29 at 8:15", r),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 8, 15, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_yesterday_with_meridiem() {
        assert_eq!(
            parse_timestamp("Yesterday at 9:05 PM", reference()),
            Some(Utc.with_ymd_and_hms(2024, 11, 19, 21, 5, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_machine_formats() {
        assert_eq!(
            parse_timestamp("2024-11-14T10:23:00Z", reference()),
            Some(Utc.with_ymd_and_hms(2024, 11, 14, 10, 23, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("1731580980", reference()),
            DateTime::from_timestamp(1_731_580_980, 0)
        );
    }

    #[test]
    fn test_unparseable_keeps_none() {
        assert!(parse_timestamp("Monday at 9:00", reference()).is_none());
        assert!(parse_timestamp("sometime", reference()).is_none());
    }
}

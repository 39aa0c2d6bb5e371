//! Publish-date normalization for feed items.
//!
//! Feeds in the wild mix RFC 822, RFC 1123, RFC 3339 and a handful of bare
//! date formats. [`parse_pub_date`] tries a fixed list of layouts, most
//! specific first, and returns the first match as a UTC instant.
use chrono::{Datelike, DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PubDateError {
    #[error("Publish date is empty")]
    Empty,
    #[error("Unrecognized publish date format: {0:?}")]
    Unrecognized(String),
}

/// Layouts tried in order. Zoned layouts come before bare ones so that a
/// date-time with an offset is never read as a plain date.
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// `2006-01-02T15:04:05Z07:00`
    Rfc3339,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123,
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Z,
    /// `02 Jan 06 15:04 MST`
    Rfc822,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Z,
    /// Anything else chrono accepts as RFC 2822
    Rfc2822,
    /// Date-time without zone, read as UTC
    NaiveDateTime(&'static str),
    /// Date only, UTC midnight
    NaiveDate(&'static str),
}

const LAYOUTS: &[Layout] = &[
    Layout::Rfc3339,
    Layout::Rfc1123,
    Layout::Rfc1123Z,
    Layout::Rfc822,
    Layout::Rfc822Z,
    Layout::Rfc2822,
    Layout::NaiveDateTime("%Y-%m-%d %H:%M:%S"),
    Layout::NaiveDate("%Y-%m-%d"),
    Layout::NaiveDate("%m/%d/%Y"),
    Layout::NaiveDate("%m-%d-%Y"),
    Layout::NaiveDate("%Y/%m/%d"),
];

const RFC1123_BODY: &str = "%d %b %Y %H:%M:%S";
const RFC822_BODY: &str = "%d %b %y %H:%M";

/// Parse a raw `<pubDate>` value into a UTC timestamp.
///
/// # Errors
///
/// [`PubDateError::Empty`] for blank input and [`PubDateError::Unrecognized`]
/// when no layout matches. Callers skip the item in both cases.
pub fn parse_pub_date(raw: &str) -> Result<DateTime<Utc>, PubDateError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(PubDateError::Empty);
    }

    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(s))
        .ok_or_else(|| PubDateError::Unrecognized(s.to_string()))
}

impl Layout {
    fn parse(self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            Layout::Rfc3339 => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
            Layout::Rfc1123 => parse_zoned(strip_weekday(s)?, RFC1123_BODY, named_zone, false),
            Layout::Rfc1123Z => parse_zoned(strip_weekday(s)?, RFC1123_BODY, numeric_zone, false),
            Layout::Rfc822 => parse_zoned(s, RFC822_BODY, named_zone, true),
            Layout::Rfc822Z => parse_zoned(s, RFC822_BODY, numeric_zone, true),
            Layout::Rfc2822 => DateTime::parse_from_rfc2822(s).ok().map(|d| d.with_timezone(&Utc)),
            Layout::NaiveDateTime(fmt) => NaiveDateTime::parse_from_str(s, fmt)
                .ok()
                .map(|n| n.and_utc()),
            Layout::NaiveDate(fmt) => NaiveDate::parse_from_str(s, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|n| n.and_utc()),
        }
    }
}

/// Drop a leading `Mon, `. The weekday is not checked against the date;
/// feeds get it wrong often enough that rejecting them loses real posts.
fn strip_weekday(s: &str) -> Option<&str> {
    let (day, rest) = s.split_once(',')?;
    if day.len() == 3 && day.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn parse_zoned(
    s: &str,
    body_format: &str,
    zone: fn(&str) -> Option<FixedOffset>,
    two_digit_year: bool,
) -> Option<DateTime<Utc>> {
    let (body, zone_str) = s.rsplit_once(' ')?;
    let offset = zone(zone_str)?;
    let mut naive = NaiveDateTime::parse_from_str(body.trim_end(), body_format).ok()?;
    if two_digit_year {
        naive = pivot_two_digit_year(naive)?;
    }
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|d| d.with_timezone(&Utc))
}

/// Two-digit years 00-68 are 20xx and 69-99 are 19xx. chrono's `%y` puts
/// 69 in 2069, so only that year needs moving.
fn pivot_two_digit_year(date: NaiveDateTime) -> Option<NaiveDateTime> {
    if date.year() == 2069 {
        date.with_year(1969)
    } else {
        Some(date)
    }
}

/// RFC 822 zone names. Unknown names fail the layout rather than guessing UTC.
fn named_zone(zone: &str) -> Option<FixedOffset> {
    let hours = match zone.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

/// `+hhmm` / `-hhmm`
fn numeric_zone(zone: &str) -> Option<FixedOffset> {
    let bytes = zone.as_bytes();
    if bytes.len() != 5 || !bytes[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = zone[1..3].parse().ok()?;
    let minutes: i32 = zone[3..5].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_rfc1123_named_zone() {
        // MST is UTC-7
        assert_eq!(
            parse_pub_date("Mon, 02 Jan 2006 15:04:05 MST").unwrap(),
            utc(2006, 1, 2, 22, 4, 5)
        );
        assert_eq!(
            parse_pub_date("Tue, 10 Jun 2003 04:00:00 GMT").unwrap(),
            utc(2003, 6, 10, 4, 0, 0)
        );
    }

    #[test]
    fn test_rfc1123_numeric_zone() {
        assert_eq!(
            parse_pub_date("Mon, 02 Jan 2006 15:04:05 -0700").unwrap(),
            utc(2006, 1, 2, 22, 4, 5)
        );
        assert_eq!(
            parse_pub_date("Mon, 02 Jan 2006 15:04:05 +0530").unwrap(),
            utc(2006, 1, 2, 9, 34, 5)
        );
    }

    #[test]
    fn test_rfc822() {
        assert_eq!(
            parse_pub_date("02 Jan 06 15:04 MST").unwrap(),
            utc(2006, 1, 2, 22, 4, 0)
        );
        assert_eq!(
            parse_pub_date("02 Jan 06 15:04 +0000").unwrap(),
            utc(2006, 1, 2, 15, 4, 0)
        );
    }

    #[test]
    fn test_rfc822_two_digit_year_pivot() {
        assert_eq!(
            parse_pub_date("02 Jan 68 15:04 GMT").unwrap(),
            utc(2068, 1, 2, 15, 4, 0)
        );
        assert_eq!(
            parse_pub_date("02 Jan 69 15:04 GMT").unwrap(),
            utc(1969, 1, 2, 15, 4, 0)
        );
        assert_eq!(
            parse_pub_date("02 Jan 69 15:04 +0000").unwrap(),
            utc(1969, 1, 2, 15, 4, 0)
        );
        assert_eq!(
            parse_pub_date("02 Jan 99 15:04 GMT").unwrap(),
            utc(1999, 1, 2, 15, 4, 0)
        );
        // The pivot applies to the year as written, before the offset
        assert_eq!(
            parse_pub_date("01 Jan 69 00:30 +0100").unwrap(),
            utc(1968, 12, 31, 23, 30, 0)
        );
        // Four-digit years are taken as written
        assert_eq!(
            parse_pub_date("Wed, 02 Jan 2069 15:04:05 GMT").unwrap(),
            utc(2069, 1, 2, 15, 4, 5)
        );
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(
            parse_pub_date("2006-01-02T15:04:05Z").unwrap(),
            utc(2006, 1, 2, 15, 4, 5)
        );
        assert_eq!(
            parse_pub_date("2006-01-02T15:04:05+07:00").unwrap(),
            utc(2006, 1, 2, 8, 4, 5)
        );
    }

    #[test]
    fn test_bare_formats() {
        assert_eq!(
            parse_pub_date("2006-01-02 15:04:05").unwrap(),
            utc(2006, 1, 2, 15, 4, 5)
        );
        assert_eq!(parse_pub_date("2006-01-02").unwrap(), utc(2006, 1, 2, 0, 0, 0));
        assert_eq!(parse_pub_date("01/02/2006").unwrap(), utc(2006, 1, 2, 0, 0, 0));
        assert_eq!(parse_pub_date("01-02-2006").unwrap(), utc(2006, 1, 2, 0, 0, 0));
        assert_eq!(parse_pub_date("2006/01/02").unwrap(), utc(2006, 1, 2, 0, 0, 0));
    }

    #[test]
    fn test_wrong_weekday_is_tolerated() {
        assert_eq!(
            parse_pub_date("Fri, 02 Jan 2006 15:04:05 GMT").unwrap(),
            utc(2006, 1, 2, 15, 4, 5)
        );
    }

    #[test]
    fn test_rfc2822_fallback_without_weekday() {
        assert_eq!(
            parse_pub_date("2 Jan 2006 15:04:05 GMT").unwrap(),
            utc(2006, 1, 2, 15, 4, 5)
        );
    }

    #[test]
    fn test_surrounding_whitespace() {
        assert_eq!(
            parse_pub_date("\n  2006-01-02T15:04:05Z \t").unwrap(),
            utc(2006, 1, 2, 15, 4, 5)
        );
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(
            parse_pub_date("not-a-date"),
            Err(PubDateError::Unrecognized("not-a-date".to_string()))
        );
        assert_eq!(parse_pub_date("   "), Err(PubDateError::Empty));
        // Invalid calendar dates
        assert!(parse_pub_date("2006-02-30").is_err());
        assert!(parse_pub_date("13/01/2006").is_err());
    }

    proptest! {
        #[test]
        fn prop_never_panics(s in "\\PC{0,40}") {
            let _ = parse_pub_date(&s);
        }

        #[test]
        fn prop_rfc1123_gmt_matches_instant(secs in 0i64..4_102_444_800i64) {
            let instant = DateTime::from_timestamp(secs, 0).unwrap();
            let raw = instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            prop_assert_eq!(parse_pub_date(&raw).unwrap(), instant);
        }
    }
}

//! Free-text event date recognition.
//!
//! Operators type dates the way they would on a poster ("Dec 31", "31st December 2025",
//! "2025-12-31 at the library"). The extractor only needs a canonical `YYYY-MM-DD`
//! for file names, so it recognises a small fixed set of shapes and reports `None`
//! for everything else.

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// A calendar date as written by the operator. Month and day are taken lexically
/// and are not checked against the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParsedDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl ParsedDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }
}

impl fmt::Display for ParsedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Month names in lookup order: abbreviations first, then full names.
const MONTH_NAMES: &[(&str, u32)] = &[
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{4})-([0-9]{1,2})-([0-9]{1,2})").expect("valid ISO date pattern"));

static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})").expect("valid slash date pattern"));

struct MonthPatterns {
    month: u32,
    /// "Dec 31, 2025"
    month_day_year: Regex,
    /// "31 Dec 2025"
    day_month_year: Regex,
    /// "Dec 31"
    month_day: Regex,
    /// "31 Dec"
    day_month: Regex,
}

static MONTH_PATTERNS: LazyLock<Vec<MonthPatterns>> = LazyLock::new(|| {
    let compile = |pattern: String| Regex::new(&pattern).expect("valid month name pattern");
    MONTH_NAMES
        .iter()
        .map(|&(name, month)| MonthPatterns {
            month,
            month_day_year: compile(format!(
                r"(?i)\b{name}\.?\s+([0-9]{{1,2}})(?:st|nd|rd|th)?,?\s+([0-9]{{4}})\b"
            )),
            day_month_year: compile(format!(
                r"(?i)\b([0-9]{{1,2}})(?:st|nd|rd|th)?\s+{name}\.?\s+([0-9]{{4}})\b"
            )),
            month_day: compile(format!(r"(?i)\b{name}\.?\s+([0-9]{{1,2}})(?:st|nd|rd|th)?\b")),
            day_month: compile(format!(r"(?i)\b([0-9]{{1,2}})(?:st|nd|rd|th)?\s+{name}\.?\b")),
        })
        .collect()
});

/// Extracts a date from `text`, guessing a missing year relative to today.
pub fn parse_date_from_text(text: &str) -> Option<ParsedDate> {
    parse_date_relative_to(text, Local::now().date_naive())
}

/// Same as [`parse_date_from_text`] with an explicit "today" for the year guess.
pub fn parse_date_relative_to(text: &str, today: NaiveDate) -> Option<ParsedDate> {
    if text.is_empty() {
        return None;
    }

    let parsed = parse_iso(text)
        .or_else(|| parse_slash(text))
        .or_else(|| parse_named_with_year(text))
        .or_else(|| parse_named_without_year(text, today));

    match &parsed {
        Some(date) => debug!(input = %text, date = %date, "Parsed event date"),
        None => debug!(input = %text, "No date recognised"),
    }
    parsed
}

/// Picks the year for a month/day written without one, assuming the event is upcoming.
///
/// A month/day that does not exist in the current year (Feb 30, Nov 31) keeps the
/// current year.
pub fn guess_year(month: u32, day: u32, today: NaiveDate) -> i32 {
    let current_year = today.year();
    match NaiveDate::from_ymd_opt(current_year, month, day) {
        Some(candidate) if candidate < today => current_year + 1,
        _ => current_year,
    }
}

fn parse_iso(text: &str) -> Option<ParsedDate> {
    let caps = ISO_DATE.captures(text)?;
    Some(ParsedDate::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

// Month first, always. See DESIGN.md for the day-first locale question.
fn parse_slash(text: &str) -> Option<ParsedDate> {
    let caps = SLASH_DATE.captures(text)?;
    Some(ParsedDate::new(
        caps[3].parse().ok()?,
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
    ))
}

fn parse_named_with_year(text: &str) -> Option<ParsedDate> {
    MONTH_PATTERNS.iter().find_map(|entry| {
        if let Some(caps) = entry.month_day_year.captures(text) {
            return Some(ParsedDate::new(
                caps[2].parse().ok()?,
                entry.month,
                caps[1].parse().ok()?,
            ));
        }
        let caps = entry.day_month_year.captures(text)?;
        Some(ParsedDate::new(
            caps[2].parse().ok()?,
            entry.month,
            caps[1].parse().ok()?,
        ))
    })
}

fn parse_named_without_year(text: &str, today: NaiveDate) -> Option<ParsedDate> {
    MONTH_PATTERNS.iter().find_map(|entry| {
        let caps = entry
            .month_day
            .captures(text)
            .or_else(|| entry.day_month.captures(text))?;
        let day: u32 = caps[1].parse().ok()?;
        Some(ParsedDate::new(
            guess_year(entry.month, day, today),
            entry.month,
            day,
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse_on(text: &str, today: NaiveDate) -> Option<String> {
        parse_date_relative_to(text, today).map(|d| d.to_string())
    }

    fn parse(text: &str) -> Option<String> {
        parse_on(text, day(2025, 6, 1))
    }

    #[test]
    fn test_iso_dates_anywhere_in_text() {
        assert_eq!(parse("2025-12-31").as_deref(), Some("2025-12-31"));
        assert_eq!(parse("2025-1-5").as_deref(), Some("2025-01-05"));
        assert_eq!(parse("Meetup on 2026-3-7 downtown").as_deref(), Some("2026-03-07"));
    }

    #[test]
    fn test_iso_is_lexical_only() {
        assert_eq!(parse("2025-13-45").as_deref(), Some("2025-13-45"));
    }

    #[test]
    fn test_only_ascii_digits_count() {
        // Arabic-Indic digits
        assert_eq!(parse("٢٠٢٥-1-5 or 2025-02-03").as_deref(), Some("2025-02-03"));
        assert_eq!(parse("٥/١/٢٠٢٥"), None);
        assert_eq!(parse("Feb ٣"), None);
    }

    #[test]
    fn test_slash_dates_are_month_first() {
        assert_eq!(parse("12/31/2025").as_deref(), Some("2025-12-31"));
        assert_eq!(parse("1/5/2025").as_deref(), Some("2025-01-05"));
        assert_eq!(parse("5/1/2025").as_deref(), Some("2025-05-01"));
    }

    #[test]
    fn test_iso_wins_over_slash() {
        assert_eq!(
            parse("1/2/2024 moved to 2025-03-04").as_deref(),
            Some("2025-03-04")
        );
    }

    #[test]
    fn test_named_month_with_year() {
        assert_eq!(parse("Dec 31, 2025").as_deref(), Some("2025-12-31"));
        assert_eq!(parse("31 December 2025").as_deref(), Some("2025-12-31"));
        assert_eq!(parse("December 31st, 2025").as_deref(), Some("2025-12-31"));
        assert_eq!(parse("Talk on Dec. 3 2025 at the library").as_deref(), Some("2025-12-03"));
        assert_eq!(parse("2nd FEB 2026").as_deref(), Some("2026-02-02"));
        assert_eq!(parse("may 9, 2027").as_deref(), Some("2027-05-09"));
    }

    #[test]
    fn test_named_month_with_year_beats_yearless() {
        // The year-less "Jan 5" shape must not shadow a later full date.
        assert_eq!(parse("Jan 5 or Mar 3, 2027").as_deref(), Some("2027-03-03"));
    }

    #[test]
    fn test_table_order_decides_between_two_full_dates() {
        assert_eq!(parse("Mar 3, 2027 or Jan 5, 2028").as_deref(), Some("2028-01-05"));
    }

    #[test]
    fn test_abbreviation_does_not_match_inside_full_name() {
        assert_eq!(parse("September 9, 2025").as_deref(), Some("2025-09-09"));
        // "Sept" is neither the abbreviation nor the full name.
        assert_eq!(parse("9 Sept 2025"), None);
    }

    #[test]
    fn test_yearless_date_in_future_keeps_current_year() {
        assert_eq!(parse_on("Dec 31", day(2025, 6, 1)).as_deref(), Some("2025-12-31"));
        assert_eq!(parse_on("31st Dec", day(2025, 6, 1)).as_deref(), Some("2025-12-31"));
    }

    #[test]
    fn test_yearless_date_in_past_rolls_to_next_year() {
        assert_eq!(parse_on("Dec 31", day(2026, 1, 15)).as_deref(), Some("2026-12-31"));
        assert_eq!(parse_on("Jan 10", day(2026, 1, 15)).as_deref(), Some("2027-01-10"));
    }

    #[test]
    fn test_yearless_today_is_not_past() {
        assert_eq!(parse_on("June 1", day(2025, 6, 1)).as_deref(), Some("2025-06-01"));
    }

    #[test]
    fn test_guess_year_invalid_day_keeps_current_year() {
        assert_eq!(guess_year(2, 30, day(2025, 6, 1)), 2025);
        assert_eq!(guess_year(11, 31, day(2025, 12, 1)), 2025);
        assert_eq!(parse_on("Feb 30", day(2025, 6, 1)).as_deref(), Some("2025-02-30"));
    }

    #[test]
    fn test_guess_year_leap_day() {
        assert_eq!(guess_year(2, 29, day(2028, 1, 1)), 2028);
        assert_eq!(guess_year(2, 29, day(2028, 3, 1)), 2029);
        assert_eq!(guess_year(2, 29, day(2027, 1, 1)), 2027);
    }

    #[test]
    fn test_no_date_found() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("hello world"), None);
        assert_eq!(parse("6-8PM"), None);
        assert_eq!(parse("Decimal 12"), None);
    }

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(ParsedDate::new(2025, 1, 5).to_string(), "2025-01-05");
    }
}

// Review date parsing and the inclusive date-window filter.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use harvest_common::DateWindow;

const MONTH: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

static ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})").unwrap());

static SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

/// "January 5, 2024", "Jan. 5th 2024"
static MONTH_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b{MONTH}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
    ))
    .unwrap()
});

/// "5 January 2024", "5th Jan, 2024"
static DAY_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+{MONTH}\.?,?\s+(\d{{4}})\b"
    ))
    .unwrap()
});

/// Find and parse the first calendar date in `text`. Handles ISO dates and
/// datetimes, US `MM/DD/YYYY`, and month-name forms, with or without
/// surrounding prose ("Reviewed on ...", "Posted ...").
pub fn parse_review_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut found: Vec<(usize, NaiveDate)> = Vec::new();

    for caps in ISO_RE.captures_iter(text) {
        if let Some(d) = ymd(num(&caps, 1), num(&caps, 2), num(&caps, 3)) {
            found.push((start_of(&caps), d));
        }
    }
    for caps in MONTH_FIRST_RE.captures_iter(text) {
        if let Some(d) = ymd(num(&caps, 3), month_number(&caps[1]), num(&caps, 2)) {
            found.push((start_of(&caps), d));
        }
    }
    for caps in DAY_FIRST_RE.captures_iter(text) {
        if let Some(d) = ymd(num(&caps, 3), month_number(&caps[2]), num(&caps, 1)) {
            found.push((start_of(&caps), d));
        }
    }
    for caps in SLASH_RE.captures_iter(text) {
        if let Some(d) = ymd(num(&caps, 3), num(&caps, 1), num(&caps, 2)) {
            found.push((start_of(&caps), d));
        }
    }

    found.into_iter().min_by_key(|(pos, _)| *pos).map(|(_, d)| d)
}

fn start_of(caps: &Captures) -> usize {
    caps.get(0).map_or(usize::MAX, |m| m.start())
}

fn num(caps: &Captures, i: usize) -> Option<u32> {
    caps.get(i)?.as_str().parse().ok()
}

fn ymd(year: Option<u32>, month: Option<u32>, day: Option<u32>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(i32::try_from(year?).ok()?, month?, day?)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let n = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

// ---------------------------------------------------------------------------
// DateRangeFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateVerdict {
    Accepted(NaiveDate),
    Unparseable,
    OutOfRange(NaiveDate),
}

#[derive(Debug, Clone, Copy)]
pub struct DateRangeFilter {
    window: DateWindow,
}

impl DateRangeFilter {
    pub fn new(window: DateWindow) -> Self {
        Self { window }
    }

    pub fn check(&self, raw_date: Option<&str>) -> DateVerdict {
        match raw_date.and_then(parse_review_date) {
            None => DateVerdict::Unparseable,
            Some(d) if self.window.contains(d) => DateVerdict::Accepted(d),
            Some(d) => DateVerdict::OutOfRange(d),
        }
    }

    pub fn accept(&self, raw_date: &str) -> bool {
        matches!(self.check(Some(raw_date)), DateVerdict::Accepted(_))
    }
}

/// Whether `raw_date` parses to a date within `[start, end]`.
pub fn accept(raw_date: &str, start: NaiveDate, end: NaiveDate) -> bool {
    parse_review_date(raw_date).is_some_and(|d| d >= start && d <= end)
}

use crate::records::Record;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static YEAR_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*[-/.年]\s*(\d{1,2})\s*[-/.月]\s*(\d{1,2})")
        .expect("YEAR_FIRST: hardcoded regex is valid")
});

static MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("MONTH_FIRST: hardcoded regex is valid")
});

static DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[.-](\d{1,2})[.-](\d{4})\b")
        .expect("DAY_FIRST: hardcoded regex is valid")
});

static NAMED_MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\p{L}+)\.?\s+(\d{1,2}),?\s+(\d{4})")
        .expect("NAMED_MONTH_FIRST: hardcoded regex is valid")
});

static NAMED_DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\.?\s+(?:de\s+)?(\p{L}+)\.?,?\s+(?:de\s+)?(\d{4})")
        .expect("NAMED_DAY_FIRST: hardcoded regex is valid")
});

/// Month names by number, English first, then German, French and Spanish
const MONTH_NAMES: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
    ("januar", 1),
    ("februar", 2),
    ("märz", 3),
    ("mai", 5),
    ("juni", 6),
    ("juli", 7),
    ("oktober", 10),
    ("dezember", 12),
    ("janvier", 1),
    ("février", 2),
    ("mars", 3),
    ("avril", 4),
    ("juin", 6),
    ("juillet", 7),
    ("août", 8),
    ("septembre", 9),
    ("octobre", 10),
    ("novembre", 11),
    ("décembre", 12),
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
    ("jänner", 1),
    ("sept", 9),
    ("janv", 1),
    ("févr", 2),
];

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    if let Some((_, number)) = MONTH_NAMES.iter().find(|(month, _)| *month == name) {
        return Some(*number);
    }

    // Three-letter abbreviations of the English names ("Jun", "Sep")
    if name.chars().count() == 3 {
        return MONTH_NAMES[..12]
            .iter()
            .find(|(month, _)| month.starts_with(name.as_str()))
            .map(|(_, number)| *number);
    }

    None
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

/// Normalizes a date as shown on a review page to a calendar date
///
/// The date may be embedded in surrounding text, as in
/// "Reviewed in the United States on June 1, 2024". Returns None when no date can be
/// recognized; normalization never fails loudly.
///
/// ```
/// use chrono::NaiveDate;
/// use review_sweep::records::normalize_date;
///
/// let expected = NaiveDate::from_ymd_opt(2024, 6, 1);
/// assert_eq!(normalize_date("Reviewed on June 1, 2024"), expected);
/// assert_eq!(normalize_date("2024年6月1日"), expected);
/// assert_eq!(normalize_date("01.06.2024"), expected);
/// assert_eq!(normalize_date("recently"), None);
/// ```
pub fn normalize_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(c) = YEAR_FIRST.captures(text) {
        return ymd(&c[1], c[2].parse().ok()?, &c[3]);
    }

    if let Some(c) = MONTH_FIRST.captures(text) {
        return ymd(&c[3], c[1].parse().ok()?, &c[2]);
    }

    if let Some(c) = DAY_FIRST.captures(text) {
        return ymd(&c[3], c[2].parse().ok()?, &c[1]);
    }

    if let Some(c) = NAMED_MONTH_FIRST.captures(text) {
        if let Some(month) = month_number(&c[1]) {
            return ymd(&c[3], month, &c[2]);
        }
    }

    if let Some(c) = NAMED_DAY_FIRST.captures(text) {
        if let Some(month) = month_number(&c[2]) {
            return ymd(&c[3], month, &c[1]);
        }
    }

    None
}

/// Splits records into those on or after a watermark date and those before it
#[derive(Debug, Clone, Copy)]
pub struct IncrementalFilter {
    watermark: NaiveDate,
}

impl IncrementalFilter {
    pub fn new(watermark: NaiveDate) -> Self {
        Self { watermark }
    }

    pub fn watermark(&self) -> NaiveDate {
        self.watermark
    }

    /// Returns true if the record belongs in an incremental sync
    ///
    /// A record whose date is missing or unreadable is always kept.
    pub fn is_new(&self, record: &Record) -> bool {
        match record.date.as_deref().and_then(normalize_date) {
            Some(date) => date >= self.watermark,
            None => true,
        }
    }

    /// Keeps the new records in page order and counts the stale ones
    ///
    /// A non-zero count means the crawl has reached the watermark.
    pub fn apply<R: AsRef<Record>>(&self, records: Vec<R>) -> (Vec<R>, usize) {
        let total = records.len();
        let fresh: Vec<R> = records
            .into_iter()
            .filter(|record| self.is_new(record.as_ref()))
            .collect();
        let dropped = total - fresh.len();
        (fresh, dropped)
    }
}

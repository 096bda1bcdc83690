use std::cmp::Ordering;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::types::ParsedDate;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed date '{text}': {reason}")]
pub struct MalformedDateError {
    pub text: String,
    pub reason: String,
}

impl MalformedDateError {
    fn new(text: &str, reason: impl Into<String>) -> Self {
        Self {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

static RE_VI_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s+(\S+)\s+(.+?)\s+(\d{4})(?:\s+(.+))?$")
        .expect("invalid regex: vietnamese date")
});

const MONTH_KEYWORD: &str = "thang";
const OPEN_ENDED_SUFFIX: &str = "trovesau";

// Keys are already folded through `normalize_label`.
const MONTHS: [(&str, u32); 14] = [
    ("mot", 1),
    ("gieng", 1),
    ("hai", 2),
    ("ba", 3),
    ("tu", 4),
    ("bon", 4),
    ("nam", 5),
    ("sau", 6),
    ("bay", 7),
    ("tam", 8),
    ("chin", 9),
    ("muoi", 10),
    ("muoimot", 11),
    ("muoihai", 12),
];

fn month_number(name: &str) -> Option<u32> {
    let key = normalize_label(name);
    MONTHS
        .iter()
        .find(|(month, _)| *month == key)
        .map(|(_, number)| *number)
}

pub fn deaccent(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' => 'd', // no decomposition
            'Đ' => 'D',
            other => other,
        })
        .collect()
}

pub fn normalize_label(text: &str) -> String {
    deaccent(&text.to_lowercase())
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect()
}

pub fn normalize_date(text: &str) -> Result<ParsedDate, MalformedDateError> {
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let caps = RE_VI_DATE
        .captures(&trimmed)
        .ok_or_else(|| MalformedDateError::new(text, "does not match '<day> Tháng <month> <year>'"))?;

    if normalize_label(&caps[2]) != MONTH_KEYWORD {
        return Err(MalformedDateError::new(
            text,
            format!("expected 'Tháng', found '{}'", &caps[2]),
        ));
    }

    let open_ended = match caps.get(5) {
        None => false,
        Some(suffix) if normalize_label(suffix.as_str()) == OPEN_ENDED_SUFFIX => true,
        Some(suffix) => {
            return Err(MalformedDateError::new(
                text,
                format!("unknown suffix '{}'", suffix.as_str()),
            ));
        }
    };

    let day_text = &caps[1];
    let month = month_number(&caps[3])
        .ok_or_else(|| MalformedDateError::new(text, format!("unknown month '{}'", &caps[3])))?;
    let year: i32 = caps[4]
        .parse()
        .map_err(|_| MalformedDateError::new(text, format!("invalid year '{}'", &caps[4])))?;
    let day: u32 = day_text
        .parse()
        .map_err(|_| MalformedDateError::new(text, format!("invalid day '{}'", day_text)))?;

    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return Err(MalformedDateError::new(
            text,
            format!("no such day: {}-{}-{}", year, month, day),
        ));
    }

    // Day text is kept as written on the page; only the month is padded.
    Ok(ParsedDate::new(
        format!("{}-{:02}-{}", year, month, day_text),
        open_ended,
    ))
}

pub fn date_sort_key(iso: &str) -> Option<NaiveDate> {
    let mut parts = iso.trim().splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn compare_dates(a: &str, b: &str) -> Ordering {
    match (date_sort_key(a), date_sort_key(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

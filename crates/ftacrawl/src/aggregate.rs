use indexmap::IndexSet;
use serde::Serialize;

use crate::dates::compare_dates;
use crate::types::{ParsedRecord, TimelineEntry};

pub const MISSING_VALUE: &str = "N/A";
pub const CODE_HEADER: &str = "Mã";

impl ParsedRecord {
    /// Value in force on `date`: an exact entry, else the latest earlier entry
    /// while a later one bounds its period, else the latest earlier open-ended
    /// entry.
    pub fn resolve_value(&self, date: &str) -> &str {
        if let Some(entry) = self.timeline.iter().find(|e| e.date.date == date) {
            return &entry.value;
        }

        let Some(entry) = latest_before(self.timeline.iter(), date) else {
            return MISSING_VALUE;
        };

        let bounded = self
            .timeline
            .iter()
            .any(|e| compare_dates(&e.date.date, date).is_gt());

        if entry.date.open_ended || bounded {
            return &entry.value;
        }

        latest_before(self.timeline.iter().filter(|e| e.date.open_ended), date)
            .map(|e| e.value.as_str())
            .unwrap_or(MISSING_VALUE)
    }
}

fn latest_before<'a>(
    entries: impl Iterator<Item = &'a TimelineEntry>,
    date: &str,
) -> Option<&'a TimelineEntry> {
    entries
        .filter(|e| compare_dates(&e.date.date, date).is_lt())
        .fold(None, |latest: Option<&TimelineEntry>, e| match latest {
            Some(l) if compare_dates(&l.date.date, &e.date.date).is_ge() => Some(l),
            _ => Some(e),
        })
}

#[derive(Debug, Default)]
pub struct Aggregator {
    labels: IndexSet<String>,
    dates: IndexSet<String>,
    records: Vec<ParsedRecord>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ParsedRecord) {
        self.labels.extend(record.attributes.keys().cloned());
        self.dates
            .extend(record.timeline.iter().map(|e| e.date.date.clone()));
        self.records.push(record);
    }

    pub fn labels(&self) -> &IndexSet<String> {
        &self.labels
    }

    pub fn dates(&self) -> &IndexSet<String> {
        &self.dates
    }

    pub fn finish(self) -> CrawlResult {
        let mut date_columns: Vec<String> = self.dates.into_iter().collect();
        date_columns.sort_by(|a, b| compare_dates(a, b));

        CrawlResult {
            attribute_labels: self.labels.into_iter().collect(),
            date_columns,
            records: self.records,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlResult {
    pub attribute_labels: Vec<String>,
    pub date_columns: Vec<String>,
    pub records: Vec<ParsedRecord>,
}

impl CrawlResult {
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(CODE_HEADER)
            .chain(self.attribute_labels.iter().map(String::as_str))
            .chain(self.date_columns.iter().map(String::as_str))
            .collect()
    }

    pub fn row<'a>(&'a self, record: &'a ParsedRecord) -> Vec<&'a str> {
        let attributes = self.attribute_labels.iter().map(|label| {
            record
                .attributes
                .get(label)
                .map(String::as_str)
                .unwrap_or(MISSING_VALUE)
        });
        let values = self
            .date_columns
            .iter()
            .map(|date| record.resolve_value(date));

        std::iter::once(record.code.as_str())
            .chain(attributes)
            .chain(values)
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> {
        self.records.iter().map(|record| self.row(record))
    }
}

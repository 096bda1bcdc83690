use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::Value;

use crate::dates::{MalformedDateError, normalize_date};
use crate::types::{Jurisdiction, ParsedDate, ParsedRecord, TimelineEntry};

/// Milestones of the tariff reduction roadmap, in the order chart labels use.
pub const CANONICAL_DATES: [&str; 16] = [
    "2019-01-14",
    "2020-01-01",
    "2021-01-01",
    "2022-01-01",
    "2023-01-01",
    "2024-01-01",
    "2025-01-01",
    "2026-01-01",
    "2027-01-01",
    "2028-01-01",
    "2029-01-01",
    "2030-01-01",
    "2031-01-01",
    "2032-01-01",
    "2033-01-01",
    "2034-01-01",
];

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Missing element: {0}")]
    MissingElement(String),
    #[error("Mismatched column count: {headers} header cell(s), {cells} data cell(s)")]
    MismatchedColumnCount { headers: usize, cells: usize },
    #[error("Unexpected chart labels: {labels:?}")]
    UnexpectedLabels { labels: Vec<String> },
    #[error("Chart has {labels} label(s) but {values} value(s)")]
    ChartDataLength { labels: usize, values: usize },
    #[error("Invalid chart value: {0}")]
    InvalidChartValue(String),
    #[error(transparent)]
    MalformedDate(#[from] MalformedDateError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedPage {
    pub attributes: IndexMap<String, String>,
    pub timeline: Vec<TimelineEntry>,
}

impl ExtractedPage {
    pub fn into_record(self, code: impl Into<String>) -> ParsedRecord {
        ParsedRecord {
            code: code.into(),
            attributes: self.attributes,
            timeline: self.timeline,
        }
    }
}

static SEL_PANEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#home").expect("invalid selector: panel"));
static SEL_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("invalid selector: table"));
static SEL_TH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").expect("invalid selector: th"));
static SEL_TD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("invalid selector: td"));
static SEL_CARD_ROWS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".card-deck tbody tr").expect("invalid selector: card rows")
});

static SEL_COUNTRY_OPTIONS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("select[name='country'] option, select#country option")
        .expect("invalid selector: country options")
});

static RE_LABELS_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""labels"\s*:\s*(\[[^\]]*\])"#).expect("invalid regex: labels array")
});
static RE_DATA_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""data"\s*:\s*(\[[^\]]*\])"#).expect("invalid regex: data array")
});

static RE_GRAPH0_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"new\s+Chart\(\s*\$\(\s*['"]#graph0['"]\s*\)\s*,"##)
        .expect("invalid regex: graph0 chart call")
});

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn extract(html: &str) -> Result<ExtractedPage, ExtractionError> {
    let document = Html::parse_document(html);

    let panel = document
        .select(&SEL_PANEL)
        .next()
        .ok_or_else(|| ExtractionError::MissingElement("#home panel".to_string()))?;

    let attributes = parse_attributes(panel)?;

    let timeline = match find_chart_series(html)? {
        Some(series) => chart_timeline(series)?,
        None => table_timeline(panel)?,
    };

    Ok(ExtractedPage {
        attributes,
        timeline,
    })
}

fn parse_attributes(panel: ElementRef) -> Result<IndexMap<String, String>, ExtractionError> {
    let table = panel
        .select(&SEL_TABLE)
        .next()
        .ok_or_else(|| ExtractionError::MissingElement("#home table".to_string()))?;

    let headers: Vec<String> = table
        .select(&SEL_TH)
        .map(|e| normalize_whitespace(&elem_text(e)))
        .collect();
    let cells: Vec<String> = table
        .select(&SEL_TD)
        .map(|e| normalize_whitespace(&elem_text(e)))
        .collect();

    if headers.len() != cells.len() {
        return Err(ExtractionError::MismatchedColumnCount {
            headers: headers.len(),
            cells: cells.len(),
        });
    }

    let mut attributes = IndexMap::with_capacity(headers.len());
    for (header, cell) in headers.into_iter().zip(cells) {
        if attributes.contains_key(&header) {
            log::debug!("Duplicate header '{}' on page, keeping first value", header);
            continue;
        }
        attributes.insert(header, cell);
    }
    Ok(attributes)
}

#[derive(Debug, Default, PartialEq)]
struct ChartSeries {
    labels: Vec<String>,
    values: Vec<String>,
}

/// Returns a series only when it has at least two labels; a lone label is
/// still checked against the milestones but otherwise treated as no chart.
fn find_chart_series(html: &str) -> Result<Option<ChartSeries>, ExtractionError> {
    let Some(window) = chart_window(html) else {
        return Ok(None);
    };

    let series = match serde_json::from_str::<Value>(window) {
        Ok(config) => series_from_config(&config)?,
        Err(e) => {
            log::debug!("Chart config is not plain JSON ({}), scanning arrays", e);
            series_from_literals(window)?
        }
    };

    check_labels(&series.labels)?;

    if series.labels.len() < 2 {
        return Ok(None);
    }
    Ok(Some(series))
}

/// The balanced `{...}` config argument of the `#graph0` chart call.
fn chart_window(html: &str) -> Option<&str> {
    let call = RE_GRAPH0_CALL.find(html)?;
    let after_call = &html[call.end()..];
    let open = after_call.find('{')?;
    balanced_object(&after_call[open..])
}

/// Slices `text` (which starts with `{`) up to its matching `}`, skipping
/// braces inside string literals.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn series_from_config(config: &Value) -> Result<ChartSeries, ExtractionError> {
    let labels = find_array(config, "labels")
        .map(|items| items.iter().map(label_text).collect())
        .unwrap_or_default();
    let values = match find_array(config, "data") {
        Some(items) => items.iter().map(value_text).collect::<Result<_, _>>()?,
        None => Vec::new(),
    };
    Ok(ChartSeries { labels, values })
}

fn series_from_literals(window: &str) -> Result<ChartSeries, ExtractionError> {
    let labels = array_literal(&RE_LABELS_ARRAY, window)
        .map(|items| items.iter().map(label_text).collect())
        .unwrap_or_default();
    let values = match array_literal(&RE_DATA_ARRAY, window) {
        Some(items) => items.iter().map(value_text).collect::<Result<_, _>>()?,
        None => Vec::new(),
    };
    Ok(ChartSeries { labels, values })
}

fn array_literal(re: &Regex, window: &str) -> Option<Vec<Value>> {
    re.captures_iter(window)
        .find_map(|caps| serde_json::from_str::<Vec<Value>>(&caps[1]).ok())
}

fn find_array<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get(key) {
                return Some(items);
            }
            map.values().find_map(|v| find_array(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| find_array(v, key)),
        _ => None,
    }
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn value_text(value: &Value) -> Result<String, ExtractionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ExtractionError::InvalidChartValue(other.to_string())),
    }
}

fn check_labels(labels: &[String]) -> Result<(), ExtractionError> {
    let matches = labels.len() <= CANONICAL_DATES.len()
        && labels
            .iter()
            .zip(CANONICAL_DATES)
            .all(|(label, expected)| label == expected);

    if matches {
        Ok(())
    } else {
        Err(ExtractionError::UnexpectedLabels {
            labels: labels.to_vec(),
        })
    }
}

fn render_percent(raw: &str) -> Result<String, ExtractionError> {
    let rate = raw
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .filter(|rate| rate.is_finite())
        .ok_or_else(|| ExtractionError::InvalidChartValue(raw.to_string()))?;
    Ok(format!("{}%", rate))
}

fn chart_timeline(series: ChartSeries) -> Result<Vec<TimelineEntry>, ExtractionError> {
    if series.values.len() != series.labels.len() {
        return Err(ExtractionError::ChartDataLength {
            labels: series.labels.len(),
            values: series.values.len(),
        });
    }

    series
        .labels
        .into_iter()
        .zip(series.values)
        .map(|(label, raw)| {
            Ok(TimelineEntry {
                date: ParsedDate::new(label, false),
                value: render_percent(&raw)?,
            })
        })
        .collect()
}

fn table_timeline(panel: ElementRef) -> Result<Vec<TimelineEntry>, ExtractionError> {
    let mut timeline = Vec::new();

    for row in panel.select(&SEL_CARD_ROWS) {
        let cells: Vec<String> = row
            .select(&SEL_TD)
            .map(|e| normalize_whitespace(&elem_text(e)))
            .collect();

        let [date_text, value, ..] = cells.as_slice() else {
            log::trace!("Skipping timeline row with {} cell(s)", cells.len());
            continue;
        };

        timeline.push(TimelineEntry {
            date: normalize_date(date_text)?,
            value: value.clone(),
        });
    }

    Ok(timeline)
}

pub fn parse_jurisdictions(html: &str) -> Vec<Jurisdiction> {
    let document = Html::parse_document(html);
    let mut jurisdictions: Vec<Jurisdiction> = Vec::new();

    for option in document.select(&SEL_COUNTRY_OPTIONS) {
        let Some(id) = option
            .value()
            .attr("value")
            .and_then(|v| v.trim().parse::<u32>().ok())
        else {
            continue;
        };
        if jurisdictions.iter().any(|j| j.id == id) {
            continue;
        }
        jurisdictions.push(Jurisdiction {
            id,
            name: normalize_whitespace(&elem_text(option)),
        });
    }

    jurisdictions
}

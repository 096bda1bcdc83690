use std::{fmt::Display, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dates::normalize_label;

#[derive(Debug, thiserror::Error)]
#[error("Invalid direction '{0}'. Accepted values: 'import', 'in', 'export', 'out'")]
pub struct DirectionParseError(String);

/// Tariff direction of a schedule: goods entering or leaving Vietnam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Import,
    Export,
}

impl Direction {
    pub fn slug(&self) -> &'static str {
        match self {
            Direction::Import => "in",
            Direction::Export => "out",
        }
    }
}

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "import" | "in" | "i" => Ok(Direction::Import),
            "export" | "out" | "e" => Ok(Direction::Export),
            _ => Err(DirectionParseError(s.to_string())),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Import => write!(f, "Import"),
            Direction::Export => write!(f, "Export"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyNode {
    #[serde(default)]
    pub folder: bool,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub hscode: String,
    pub key: u64,
    #[serde(default)]
    pub lvl: u32,
    #[serde(default)]
    pub sortkey: String,
    #[serde(default)]
    pub title: String,
}

impl TaxonomyNode {
    pub fn is_leaf(&self) -> bool {
        !self.folder
    }

    /// Relative URL of the detail page, `None` when the listing left it blank.
    pub fn detail_path(&self) -> Option<&str> {
        self.href
            .as_deref()
            .map(str::trim)
            .filter(|href| !href.is_empty())
    }
}

impl Display for TaxonomyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.key, self.hscode)?;
        if !self.title.is_empty() {
            write!(f, " ({})", self.title.trim())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDate {
    pub date: String,
    /// The value applies to this date and every later, unlisted date.
    pub open_ended: bool,
}

impl ParsedDate {
    pub fn new(date: impl Into<String>, open_ended: bool) -> Self {
        Self {
            date: date.into(),
            open_ended,
        }
    }
}

impl Display for ParsedDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.date)?;
        if self.open_ended {
            write!(f, "+")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub date: ParsedDate,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub code: String,
    pub attributes: IndexMap<String, String>,
    pub timeline: Vec<TimelineEntry>,
}

impl Display for ParsedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌─ {}", self.code)?;
        for (label, value) in &self.attributes {
            writeln!(f, "│  {}: {}", label, value)?;
        }
        writeln!(f, "└─ {} timeline entr(ies)", self.timeline.len())?;
        for entry in &self.timeline {
            writeln!(f, "   {:<16} {}", entry.date.to_string(), entry.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub id: u32,
    pub name: String,
}

impl Display for Jurisdiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>4}  {}", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JurisdictionQuery {
    Id(u32),
    Name(String),
}

impl JurisdictionQuery {
    pub fn resolve<'a>(&self, known: &'a [Jurisdiction]) -> Option<&'a Jurisdiction> {
        match self {
            JurisdictionQuery::Id(id) => known.iter().find(|j| j.id == *id),
            JurisdictionQuery::Name(name) => {
                let wanted = normalize_label(name);
                known.iter().find(|j| normalize_label(&j.name) == wanted)
            }
        }
    }
}

impl FromStr for JurisdictionQuery {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<u32>() {
            Ok(id) => JurisdictionQuery::Id(id),
            Err(_) => JurisdictionQuery::Name(s.to_string()),
        })
    }
}

impl Display for JurisdictionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JurisdictionQuery::Id(id) => write!(f, "#{}", id),
            JurisdictionQuery::Name(name) => write!(f, "'{}'", name),
        }
    }
}

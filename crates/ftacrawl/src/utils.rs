use std::path::PathBuf;

use crate::fetcher::FetchError;
use crate::scraper::WebScraper;
use crate::types::{Direction, Jurisdiction, JurisdictionQuery};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Nodes visited as leaves, including ones later reclassified.
    pub found: usize,
    pub parsed: usize,
    pub reclassified: usize,
    pub skipped: usize,
    pub failed_subtrees: usize,
}

impl std::fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nStatistics:")?;
        writeln!(f, "  Leaves found:          {}", self.found)?;
        writeln!(f, "  Parsed:                {}", self.parsed)?;
        writeln!(f, "  Reclassified folders:  {}", self.reclassified)?;
        writeln!(f, "  Skipped:               {}", self.skipped)?;
        writeln!(f, "  Unlisted subtrees:     {}", self.failed_subtrees)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Could not load jurisdiction list: {0}")]
    Fetch(#[from] FetchError),
    #[error("Unknown jurisdiction {0}")]
    Unknown(JurisdictionQuery),
}

#[derive(Debug, Default)]
pub struct JurisdictionDirectory {
    known: Option<Vec<Jurisdiction>>,
}

impl JurisdictionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known(known: Vec<Jurisdiction>) -> Self {
        Self { known: Some(known) }
    }

    pub async fn list(&mut self, scraper: &WebScraper) -> Result<&[Jurisdiction], FetchError> {
        if self.known.is_none() {
            self.known = Some(scraper.fetch_jurisdictions().await?);
        }
        Ok(self.known.as_deref().unwrap_or_default())
    }

    /// Numeric ids resolve without a lookup unless the list is already loaded.
    pub async fn resolve(
        &mut self,
        scraper: &WebScraper,
        query: &JurisdictionQuery,
    ) -> Result<Jurisdiction, ResolveError> {
        if let JurisdictionQuery::Id(id) = query
            && self.known.is_none()
        {
            return Ok(Jurisdiction {
                id: *id,
                name: id.to_string(),
            });
        }

        let known = self.list(scraper).await?;
        query
            .resolve(known)
            .cloned()
            .ok_or_else(|| ResolveError::Unknown(query.clone()))
    }
}

pub fn default_output_path(direction: Direction, jurisdiction: &Jurisdiction) -> PathBuf {
    PathBuf::from(format!("{}-{}.csv", direction.slug(), jurisdiction.id))
}

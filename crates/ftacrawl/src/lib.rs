pub mod aggregate;
mod cache;
pub mod crawl;
pub mod dates;
pub mod fetcher;
pub mod parser;
pub mod scraper;
pub mod types;
pub mod utils;
pub mod writer;

pub use aggregate::{Aggregator, CrawlResult};
pub use cache::PageCache;
pub use crawl::{CrawlError, CrawlOutcome, Crawler};
pub use fetcher::{ContentFetcher, FetchError};
pub use scraper::{FetchConfig, WebScraper};

pub(crate) const BASE_URL: &str = "https://fta.moit.gov.vn";

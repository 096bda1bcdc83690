use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::cache::PageCache;
use crate::fetcher::{ContentFetcher, FetchError};
use crate::parser::parse_jurisdictions;
use crate::types::{Jurisdiction, TaxonomyNode};

const JURISDICTIONS_CACHE: &str = "jurisdictions.json";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.212 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub cache_dir: PathBuf,
    /// Pause before every network request; cache hits are not paced.
    pub request_delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,
    /// Raw `Cookie` header sent with every request, for sessions opened in a browser.
    pub cookie: Option<String>,
    /// Page whose country `<select>` lists the partner jurisdictions.
    pub jurisdictions_path: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: crate::BASE_URL.to_string(),
            cache_dir: PathBuf::from(".data"),
            request_delay: Duration::ZERO,
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookie: None,
            jurisdictions_path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    base_url: String,
    cache: PageCache,
    request_delay: Duration,
    jurisdictions_path: String,
}

impl WebScraper {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(FetchConfig::default())
    }

    pub fn with_config(config: FetchConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = config.cookie.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| FetchError::Config(format!("invalid cookie header: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache: PageCache::new(config.cache_dir),
            request_delay: config.request_delay,
            jurisdictions_path: config.jurisdictions_path,
        })
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn children_url(&self, node: &TaxonomyNode) -> String {
        format!(
            "{}/index.php?r=site/get-children2&id={key}&sortkey={}&lvl={}&mode=children&parent={key}",
            self.base_url,
            node.sortkey,
            node.lvl,
            key = node.key
        )
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }

    /// Partner jurisdictions listed on the site, cached on disk after the
    /// first successful fetch.
    pub async fn fetch_jurisdictions(&self) -> Result<Vec<Jurisdiction>, FetchError> {
        if let Some(cached) = self
            .cache
            .read_json::<Vec<Jurisdiction>>(JURISDICTIONS_CACHE)
            .await?
            .filter(|list| !list.is_empty())
        {
            log::debug!("Using {} cached jurisdictions", cached.len());
            return Ok(cached);
        }

        let url = self.absolute_url(&self.jurisdictions_path);
        log::info!("Fetching jurisdiction list: {}", url);
        let html = self.get_text(&url).await?;
        let jurisdictions = parse_jurisdictions(&html);

        if !jurisdictions.is_empty()
            && let Err(e) = self.cache.write_json(JURISDICTIONS_CACHE, &jurisdictions).await
        {
            log::warn!("Could not cache jurisdiction list: {}", e);
        }
        Ok(jurisdictions)
    }
}

fn nodes_from_values(items: Vec<Value>) -> Vec<TaxonomyNode> {
    items
        .into_iter()
        .filter_map(|item| {
            serde_json::from_value::<TaxonomyNode>(item)
                .inspect_err(|e| log::warn!("Skipping malformed listing entry: {}", e))
                .ok()
        })
        .collect()
}

impl ContentFetcher for WebScraper {
    async fn fetch_detail_html(&self, node: &TaxonomyNode) -> Result<String, FetchError> {
        if let Some(html) = self.cache.read_html(node.key).await? {
            log::trace!("Cache hit for detail page of #{}", node.key);
            return Ok(html);
        }

        let path = node
            .detail_path()
            .ok_or(FetchError::MissingDetailPath { key: node.key })?;
        let url = self.absolute_url(path);
        log::debug!("Fetching detail page of #{}: {}", node.key, url);

        let html = self.get_text(&url).await?;
        if let Err(e) = self.cache.write_html(node.key, &html).await {
            log::warn!("Could not cache detail page of #{}: {}", node.key, e);
        }
        Ok(html)
    }

    async fn fetch_children(
        &self,
        node: &TaxonomyNode,
    ) -> Result<Option<Vec<TaxonomyNode>>, FetchError> {
        if let Some(items) = self.cache.read_children(node.key).await? {
            log::trace!("Cache hit for children of #{}", node.key);
            return Ok(Some(nodes_from_values(items)));
        }

        let url = self.children_url(node);
        log::debug!("Fetching children of #{}: {}", node.key, url);
        let text = self.get_text(&url).await?;

        let items = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => items,
            Ok(_) => return Ok(None),
            Err(e) => {
                log::warn!("Listing for #{} is not JSON: {}", node.key, e);
                return Ok(None);
            }
        };

        if let Err(e) = self.cache.write_children(node.key, &items).await {
            log::warn!("Could not cache children of #{}: {}", node.key, e);
        }
        Ok(Some(nodes_from_values(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper_in(dir: &std::path::Path) -> WebScraper {
        WebScraper::with_config(FetchConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            cache_dir: dir.to_path_buf(),
            ..FetchConfig::default()
        })
        .unwrap()
    }

    fn node(key: u64, folder: bool, href: Option<&str>) -> TaxonomyNode {
        TaxonomyNode {
            folder,
            href: href.map(str::to_string),
            hscode: "0101".to_string(),
            key,
            lvl: 2,
            sortkey: "0101".to_string(),
            title: String::new(),
        }
    }

    #[test]
    fn test_default_user_agent_is_a_browser() {
        let config = FetchConfig::default();
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert!(config.user_agent.contains("Chrome/"));
    }

    #[test]
    fn test_children_url() {
        let temp = tempfile::tempdir().unwrap();
        let scraper = scraper_in(temp.path());
        assert_eq!(
            scraper.children_url(&node(42, true, None)),
            "http://127.0.0.1:9/index.php?r=site/get-children2&id=42&sortkey=0101&lvl=2&mode=children&parent=42"
        );
        assert_eq!(
            scraper.absolute_url("/index.php?r=site/detail&id=1"),
            "http://127.0.0.1:9/index.php?r=site/detail&id=1"
        );
    }

    #[test]
    fn test_invalid_cookie_is_a_config_error() {
        let err = WebScraper::with_config(FetchConfig {
            cookie: Some("bad\nvalue".to_string()),
            ..FetchConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, FetchError::Config(_)));
    }

    #[tokio::test]
    async fn test_cached_pages_are_served_without_network() {
        let temp = tempfile::tempdir().unwrap();
        let scraper = scraper_in(temp.path());
        std::fs::write(temp.path().join("8-download.html"), "<p>cached</p>").unwrap();
        std::fs::write(
            temp.path().join("8-getChildren.json"),
            r#"[{"folder":false,"href":"/d/9","hscode":"010121","key":9,"lvl":3,"sortkey":"a","title":"t"},{"bogus":true}]"#,
        )
        .unwrap();

        let leaf = node(8, false, Some("/d/8"));
        assert_eq!(scraper.fetch_detail_html(&leaf).await.unwrap(), "<p>cached</p>");

        let children = scraper.fetch_children(&leaf).await.unwrap().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].key, 9);
    }

    #[tokio::test]
    async fn test_missing_detail_path() {
        let temp = tempfile::tempdir().unwrap();
        let scraper = scraper_in(temp.path());
        let err = scraper
            .fetch_detail_html(&node(11, false, Some("")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MissingDetailPath { key: 11 }));
    }
}

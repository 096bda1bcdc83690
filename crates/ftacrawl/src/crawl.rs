use std::collections::HashSet;

use crate::aggregate::{Aggregator, CrawlResult};
use crate::fetcher::{ContentFetcher, FetchError};
use crate::parser;
use crate::types::TaxonomyNode;
use crate::utils::CrawlStats;

/// Keys of nodes listed as leaves that are known to have children.
pub const KNOWN_PARENT_LEAVES: &[u64] = &[
    9697, // 03061701
];

const PROGRESS_EVERY: usize = 25;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Could not list children of root #{key}: {source}")]
    RootListing {
        key: u64,
        #[source]
        source: FetchError,
    },
    #[error("Root #{key} has no child listing")]
    RootListingAbsent { key: u64 },
}

#[derive(Debug, Clone)]
pub struct ChildOverrides {
    keys: HashSet<u64>,
}

impl ChildOverrides {
    pub fn empty() -> Self {
        Self {
            keys: HashSet::new(),
        }
    }

    pub fn insert(&mut self, key: u64) {
        self.keys.insert(key);
    }

    pub fn contains(&self, key: u64) -> bool {
        self.keys.contains(&key)
    }
}

impl Default for ChildOverrides {
    fn default() -> Self {
        let mut overrides = Self::empty();
        for key in KNOWN_PARENT_LEAVES {
            overrides.insert(*key);
        }
        overrides
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub result: CrawlResult,
    pub stats: CrawlStats,
}

pub struct Crawler<'a, F> {
    fetcher: &'a F,
    overrides: ChildOverrides,
    aggregator: Aggregator,
    stats: CrawlStats,
    expanded: HashSet<u64>,
}

impl<'a, F: ContentFetcher> Crawler<'a, F> {
    pub fn new(fetcher: &'a F) -> Self {
        Self {
            fetcher,
            overrides: ChildOverrides::default(),
            aggregator: Aggregator::new(),
            stats: CrawlStats::default(),
            expanded: HashSet::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: ChildOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Lists `root`'s children and crawls them. Failing to list the root is
    /// the only fatal condition.
    pub async fn run_from(mut self, root: &TaxonomyNode) -> Result<CrawlOutcome, CrawlError> {
        log::info!("Listing root {}", root);
        let children = self
            .fetcher
            .fetch_children(root)
            .await
            .map_err(|source| CrawlError::RootListing {
                key: root.key,
                source,
            })?
            .ok_or(CrawlError::RootListingAbsent { key: root.key })?;

        self.expanded.insert(root.key);
        Ok(self.run(children).await)
    }

    pub async fn run(mut self, roots: Vec<TaxonomyNode>) -> CrawlOutcome {
        let mut stack: Vec<TaxonomyNode> = roots.into_iter().rev().collect();

        while let Some(node) = stack.pop() {
            if node.folder || self.overrides.contains(node.key) {
                self.expand_folder(&node, &mut stack).await;
            } else {
                self.visit_leaf(node, &mut stack).await;
            }
        }

        log::info!(
            "Crawl finished: {} parsed / {} found, {} skipped",
            self.stats.parsed,
            self.stats.found,
            self.stats.skipped
        );

        CrawlOutcome {
            result: self.aggregator.finish(),
            stats: self.stats,
        }
    }

    fn push_children(
        &mut self,
        node: &TaxonomyNode,
        children: Vec<TaxonomyNode>,
        stack: &mut Vec<TaxonomyNode>,
    ) -> bool {
        if !self.expanded.insert(node.key) {
            log::warn!("#{} was already expanded, not descending again", node.key);
            return false;
        }
        stack.extend(children.into_iter().rev());
        true
    }

    async fn expand_folder(&mut self, node: &TaxonomyNode, stack: &mut Vec<TaxonomyNode>) {
        match self.fetcher.fetch_children(node).await {
            Ok(Some(children)) => {
                log::trace!("{} has {} child(ren)", node, children.len());
                self.push_children(node, children, stack);
            }
            Ok(None) => log::debug!("{} has no child listing", node),
            Err(e) => {
                self.stats.failed_subtrees += 1;
                log::error!("#{} {}: could not list children: {}", node.key, node.hscode, e);
            }
        }
    }

    async fn visit_leaf(&mut self, node: TaxonomyNode, stack: &mut Vec<TaxonomyNode>) {
        self.stats.found += 1;
        self.report_progress();

        let reason = match self.fetcher.fetch_detail_html(&node).await {
            Ok(html) => match parser::extract(&html) {
                Ok(page) => {
                    self.aggregator.push(page.into_record(node.hscode.clone()));
                    self.stats.parsed += 1;
                    return;
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        match self.fetcher.fetch_children(&node).await {
            Ok(Some(children)) if !children.is_empty() => {
                log::debug!("{} is not a leaf ({}), descending", node, reason);
                if self.push_children(&node, children, stack) {
                    self.stats.reclassified += 1;
                } else {
                    self.stats.skipped += 1;
                }
            }
            Ok(_) => {
                self.stats.skipped += 1;
                log::warn!("#{} {} skipped: {}", node.key, node.hscode, reason);
            }
            Err(e) => {
                self.stats.skipped += 1;
                log::warn!(
                    "#{} {} skipped: {} (listing children failed: {})",
                    node.key,
                    node.hscode,
                    reason,
                    e
                );
            }
        }
    }

    fn report_progress(&self) {
        if self.stats.found % PROGRESS_EVERY == 0 {
            log::info!(
                "Progress: {} parsed / {} found",
                self.stats.parsed,
                self.stats.found
            );
        } else {
            log::trace!("Leaf {} of crawl", self.stats.found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<u64, String>,
        children: HashMap<u64, Vec<TaxonomyNode>>,
        broken_listings: HashSet<u64>,
        detail_requests: RefCell<Vec<u64>>,
    }

    impl FakeFetcher {
        fn page(mut self, key: u64, html: String) -> Self {
            self.pages.insert(key, html);
            self
        }

        fn children(mut self, key: u64, children: Vec<TaxonomyNode>) -> Self {
            self.children.insert(key, children);
            self
        }
    }

    impl ContentFetcher for FakeFetcher {
        async fn fetch_detail_html(&self, node: &TaxonomyNode) -> Result<String, FetchError> {
            self.detail_requests.borrow_mut().push(node.key);
            self.pages
                .get(&node.key)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: format!("/detail/{}", node.key),
                    status: 404,
                })
        }

        async fn fetch_children(
            &self,
            node: &TaxonomyNode,
        ) -> Result<Option<Vec<TaxonomyNode>>, FetchError> {
            if self.broken_listings.contains(&node.key) {
                return Err(FetchError::Status {
                    url: format!("/children/{}", node.key),
                    status: 500,
                });
            }
            Ok(self.children.get(&node.key).cloned())
        }
    }

    fn folder(key: u64) -> TaxonomyNode {
        TaxonomyNode {
            folder: true,
            href: None,
            hscode: format!("{:02}", key),
            key,
            lvl: 1,
            sortkey: key.to_string(),
            title: String::new(),
        }
    }

    fn leaf(key: u64) -> TaxonomyNode {
        TaxonomyNode {
            folder: false,
            href: Some(format!("/detail/{}", key)),
            ..folder(key)
        }
    }

    fn page(headers: &[(&str, &str)], chart: Option<(&[&str], &[&str])>) -> String {
        let ths: String = headers.iter().map(|(h, _)| format!("<th>{}</th>", h)).collect();
        let tds: String = headers.iter().map(|(_, v)| format!("<td>{}</td>", v)).collect();
        let script = chart
            .map(|(labels, data)| {
                format!(
                    r#"new Chart($('#graph0'),{{"data":{{"labels":{},"datasets":[{{"data":{}}}]}}}});"#,
                    serde_json::to_string(labels).unwrap(),
                    serde_json::to_string(data).unwrap()
                )
            })
            .unwrap_or_default();
        format!(
            r#"<div id="home"><table><tr>{ths}</tr><tr>{tds}</tr></table></div><script>{script}</script>"#
        )
    }

    fn broken_page() -> String {
        r#"<div id="home"><table><tr><th>A</th><th>B</th></tr><tr><td>1</td></tr></table></div>"#
            .to_string()
    }

    #[tokio::test]
    async fn test_preorder_traversal_and_column_union() {
        let fetcher = FakeFetcher::default()
            .children(1, vec![leaf(11), folder(12)])
            .children(12, vec![leaf(121)])
            .page(
                11,
                page(
                    &[("Hiệp định", "ATIGA")],
                    Some((&["2019-01-14", "2020-01-01"], &["5", "4"])),
                ),
            )
            .page(
                121,
                page(
                    &[("Lộ trình", "B"), ("Hiệp định", "CPTPP")],
                    Some((&["2019-01-14", "2020-01-01", "2021-01-01"], &["3", "2", "1"])),
                ),
            )
            .page(2, page(&[("Hiệp định", "EVFTA")], None));

        let outcome = Crawler::new(&fetcher).run(vec![folder(1), leaf(2)]).await;

        let codes: Vec<&str> = outcome.result.records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["11", "121", "02"]);
        assert_eq!(outcome.result.attribute_labels, vec!["Hiệp định", "Lộ trình"]);
        assert_eq!(
            outcome.result.date_columns,
            vec!["2019-01-14", "2020-01-01", "2021-01-01"]
        );
        assert_eq!(outcome.stats.found, 3);
        assert_eq!(outcome.stats.parsed, 3);
        assert_eq!(outcome.stats.skipped, 0);
    }

    #[tokio::test]
    async fn test_unparseable_leaf_with_children_is_reclassified() {
        let fetcher = FakeFetcher::default()
            .page(5, broken_page())
            .children(5, vec![leaf(51), leaf(52)])
            .page(51, page(&[("A", "x")], None))
            .page(52, page(&[("A", "y")], None));

        let outcome = Crawler::new(&fetcher).run(vec![leaf(5)]).await;

        let codes: Vec<&str> = outcome.result.records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["51", "52"]);
        assert_eq!(outcome.stats.reclassified, 1);
        assert_eq!(outcome.stats.skipped, 0);
    }

    #[tokio::test]
    async fn test_failed_leaf_without_children_is_skipped() {
        let fetcher = FakeFetcher::default()
            .page(6, broken_page())
            .children(6, Vec::new())
            .page(8, page(&[("A", "ok")], None));

        // 7 has no page at all (404) and no listing.
        let outcome = Crawler::new(&fetcher)
            .run(vec![leaf(6), leaf(7), leaf(8)])
            .await;

        assert_eq!(outcome.stats.found, 3);
        assert_eq!(outcome.stats.parsed, 1);
        assert_eq!(outcome.stats.skipped, 2);
        assert_eq!(outcome.result.records.len(), 1);
        assert_eq!(outcome.result.records[0].code, "08");
    }

    #[tokio::test]
    async fn test_override_expands_flagged_leaf() {
        let fetcher = FakeFetcher::default()
            .children(9697, vec![leaf(96971), leaf(96972)])
            .page(96971, page(&[("A", "1")], None))
            .page(96972, page(&[("A", "2")], None));

        let outcome = Crawler::new(&fetcher).run(vec![leaf(9697)]).await;

        assert_eq!(outcome.result.records.len(), 2);
        assert!(!fetcher.detail_requests.borrow().contains(&9697));
    }

    #[tokio::test]
    async fn test_override_table_is_configurable() {
        let fetcher = FakeFetcher::default()
            .children(40, vec![leaf(41)])
            .page(41, page(&[("A", "1")], None));

        let mut overrides = ChildOverrides::empty();
        overrides.insert(40);
        let outcome = Crawler::new(&fetcher)
            .with_overrides(overrides)
            .run(vec![leaf(40)])
            .await;

        assert_eq!(outcome.result.records.len(), 1);
        assert_eq!(*fetcher.detail_requests.borrow(), vec![41]);
    }

    #[tokio::test]
    async fn test_broken_folder_listing_only_loses_its_subtree() {
        let mut fetcher = FakeFetcher::default().page(2, page(&[("A", "1")], None));
        fetcher.broken_listings.insert(1);

        let outcome = Crawler::new(&fetcher).run(vec![folder(1), leaf(2)]).await;

        assert_eq!(outcome.stats.failed_subtrees, 1);
        assert_eq!(outcome.result.records.len(), 1);
    }

    #[tokio::test]
    async fn test_cyclic_listing_terminates() {
        let fetcher = FakeFetcher::default()
            .children(1, vec![folder(2)])
            .children(2, vec![folder(1), leaf(3)])
            .page(3, page(&[("A", "1")], None));

        let outcome = Crawler::new(&fetcher).run(vec![folder(1)]).await;
        assert_eq!(outcome.result.records.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_leaf_under_expanded_key_counts_as_skipped() {
        let fetcher = FakeFetcher::default()
            .children(5, vec![leaf(6)])
            .page(6, page(&[("A", "1")], None));

        let outcome = Crawler::new(&fetcher).run(vec![folder(5), leaf(5)]).await;

        assert_eq!(outcome.result.records.len(), 1);
        assert_eq!(outcome.stats.found, 2);
        assert_eq!(outcome.stats.parsed, 1);
        assert_eq!(outcome.stats.reclassified, 0);
        assert_eq!(outcome.stats.skipped, 1);
    }

    #[test]
    fn test_default_overrides_hold_known_parent_leaves() {
        let overrides = ChildOverrides::default();
        assert!(overrides.contains(9697));
        assert!(!overrides.contains(9698));
    }

    #[tokio::test]
    async fn test_run_from_root() {
        let fetcher = FakeFetcher::default()
            .children(0, vec![leaf(1)])
            .page(1, page(&[("A", "1")], None));

        let outcome = Crawler::new(&fetcher).run_from(&folder(0)).await.unwrap();
        assert_eq!(outcome.result.records.len(), 1);

        let empty = FakeFetcher::default();
        let err = Crawler::new(&empty).run_from(&folder(0)).await.unwrap_err();
        assert!(matches!(err, CrawlError::RootListingAbsent { key: 0 }));

        let mut broken = FakeFetcher::default();
        broken.broken_listings.insert(0);
        let err = Crawler::new(&broken).run_from(&folder(0)).await.unwrap_err();
        assert!(matches!(err, CrawlError::RootListing { key: 0, .. }));
    }
}

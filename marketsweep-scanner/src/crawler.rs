use crate::error::{Result, ScanError};
use crate::extract::ProductExtractor;
use crate::fetch::PageFetcher;
use crate::listing::RawListing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_MAX_PAGES: u32 = 10;

pub type PageCallback = Arc<dyn Fn(u32, String) + Send + Sync>;

/// Why a crawl stopped requesting pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    PageLimitReached,
    EmptyPage,
    StaleThresholdHit,
    FetchFailed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::PageLimitReached => "page_limit_reached",
            StopReason::EmptyPage => "empty_page",
            StopReason::StaleThresholdHit => "stale_threshold_hit",
            StopReason::FetchFailed => "fetch_failed",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub recency_threshold: DateTime<Utc>,
    pub max_pages: u32,
    /// Stop after a page on which any listing is older than the threshold.
    /// A page with no recent listing at all always ends the crawl.
    pub stop_on_stale_page: bool,
}

impl CrawlOptions {
    pub fn new(recency_threshold: DateTime<Utc>) -> Self {
        Self {
            recency_threshold,
            max_pages: DEFAULT_MAX_PAGES,
            stop_on_stale_page: false,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_stop_on_stale_page(mut self, stop: bool) -> Self {
        self.stop_on_stale_page = stop;
        self
    }
}

/// One fetched results page. Carries every extracted listing, including ones
/// older than the recency threshold.
#[derive(Debug, Clone)]
pub struct CrawlPage {
    pub number: u32,
    pub url: String,
    pub listings: Vec<RawListing>,
    /// At least one listing on the page is older than the threshold.
    pub has_stale: bool,
    pub recent_count: usize,
}

#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub listings: Vec<RawListing>,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
}

/// Builds the URL of results page `page` by setting the `page` query
/// parameter, keeping any other query pairs of the base URL.
pub fn page_url(base: &Url, page: u32) -> Url {
    let retained: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = base.clone();
    url.set_fragment(None);
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("page", &page.to_string());
    }
    url
}

/// Walks numbered results pages one at a time and decides when to stop.
///
/// Recency is only used to decide whether the next page is worth fetching;
/// listings on a fetched page are never filtered here.
pub struct ListingCrawler<'a, F: PageFetcher> {
    fetcher: &'a F,
    extractor: &'a ProductExtractor,
    base_url: Url,
    options: CrawlOptions,
    next_page: u32,
    pages_fetched: u32,
    stop_reason: Option<StopReason>,
    page_callback: Option<PageCallback>,
}

impl<'a, F: PageFetcher> ListingCrawler<'a, F> {
    pub fn new(
        fetcher: &'a F,
        extractor: &'a ProductExtractor,
        base_url: &str,
        options: CrawlOptions,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            fetcher,
            extractor,
            base_url,
            options,
            next_page: 1,
            pages_fetched: 0,
            stop_reason: None,
            page_callback: None,
        })
    }

    pub fn with_page_callback(mut self, callback: PageCallback) -> Self {
        self.page_callback = Some(callback);
        self
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    fn stop(&mut self, reason: StopReason) {
        info!(
            reason = %reason,
            pages_fetched = self.pages_fetched,
            "Stopping listing crawl"
        );
        self.stop_reason = Some(reason);
    }

    /// Fetches the next results page. Returns `None` once the crawl has
    /// stopped; fetch failures end the crawl rather than erroring.
    pub async fn next_page(&mut self) -> Option<CrawlPage> {
        if self.stop_reason.is_some() {
            return None;
        }
        if self.next_page > self.options.max_pages {
            self.stop(StopReason::PageLimitReached);
            return None;
        }

        let number = self.next_page;
        let url = page_url(&self.base_url, number);
        self.next_page += 1;

        if let Some(ref callback) = self.page_callback {
            callback(number, url.to_string());
        }

        let page = match self.fetcher.fetch(url.as_str()).await {
            Ok(page) if page.is_success() => page,
            Ok(page) => {
                warn!(url = %url, status = page.status, "Results page returned an error status");
                self.stop(StopReason::FetchFailed);
                return None;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch results page");
                self.stop(StopReason::FetchFailed);
                return None;
            }
        };
        self.pages_fetched += 1;

        let extraction = self.extractor.extract_page(&page.body, &url, Utc::now());
        if extraction.node_count == 0 {
            debug!(url = %url, "Results page has no listing nodes");
            self.stop(StopReason::EmptyPage);
            return None;
        }

        let threshold = self.options.recency_threshold;
        let recent_count = extraction
            .listings
            .iter()
            .filter(|listing| listing.is_recent(threshold))
            .count();
        let has_stale = recent_count < extraction.listings.len();

        if recent_count == 0 || (has_stale && self.options.stop_on_stale_page) {
            self.stop(StopReason::StaleThresholdHit);
        }

        Some(CrawlPage {
            number,
            url: url.to_string(),
            listings: extraction.listings,
            has_stale,
            recent_count,
        })
    }

    /// Drives the crawl to completion and collects every listing.
    pub async fn crawl(mut self) -> CrawlOutcome {
        let mut listings = Vec::new();
        while let Some(page) = self.next_page().await {
            listings.extend(page.listings);
        }

        CrawlOutcome {
            listings,
            pages_fetched: self.pages_fetched,
            // next_page only returns None after recording a reason
            stop_reason: self.stop_reason.unwrap_or(StopReason::PageLimitReached),
        }
    }
}

//! The two import runs: marketplace taxonomy and recent listings.
//!
//! Requests are awaited one at a time with fixed politeness delays between
//! them. Errors scoped to a single category or listing are logged and the
//! run moves on; store failures abort the run and are returned to the caller
//! so the job runner can retry it.

use crate::dedup::{Decision, DedupFilter};
use crate::error::{ImportError, Result};
use crate::model::{ImportSettings, NewListing, RunKind, RunResult};
use crate::repository::{CategoryRepository, ImageRepository, ListingRepository};
use crate::resolve::{CategoryResolver, MergePolicy, Resolution};
use crate::storage::BlobStore;
use chrono::{DateTime, TimeDelta, Utc};
use marketsweep_scanner::extract::{parse_selector, resolve_url};
use marketsweep_scanner::fetch::DEFAULT_USER_AGENT;
use marketsweep_scanner::{
    CategoryGuesser, CrawlOptions, ListingCrawler, PageFetcher, ProductExtractor, RawListing,
};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_EXTERNAL_SOURCE: &str = "jiji.ng";
pub const FARM_LANDING_PATH: &str = "agriculture";
pub const DESCRIPTION_FALLBACK: &str = "Description not available";
pub const IMAGE_DIR: &str = "imported_products";
const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

pub const CATEGORY_ANCHOR_SELECTOR: &str =
    r#"a[href*="/category/"], a[href*="/c/"], .category-item a, .main-category a"#;
pub const SUBCATEGORY_ANCHOR_SELECTOR: &str = ".subcategory a, .sub-category a, .category-list a";
pub const FARM_ANCHOR_SELECTOR: &str = r#"a[href*="farm"], a[href*="agriculture"], a[href*="livestock"], a[href*="poultry"], a[href*="vegetables"], a[href*="fruits"], a[href*="crops"], a[href*="garden"]"#;

/// Callback for human-readable progress messages
pub type ProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub request_timeout: Duration,
    /// Sleep after each created or merged category.
    pub category_delay: Duration,
    /// Sleep after each imported listing.
    pub listing_delay: Duration,
    pub max_pages: u32,
    /// How many levels below a top-level category are visited.
    pub max_taxonomy_depth: usize,
    pub stop_on_stale_page: bool,
    pub external_source: String,
    pub user_agent: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            category_delay: Duration::from_secs(1),
            listing_delay: Duration::from_millis(500),
            max_pages: 10,
            max_taxonomy_depth: 1,
            stop_on_stale_page: false,
            external_source: DEFAULT_EXTERNAL_SOURCE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ImportConfig {
    pub fn without_delays(mut self) -> Self {
        self.category_delay = Duration::ZERO;
        self.listing_delay = Duration::ZERO;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxonomyScope {
    /// Every category linked from the landing page.
    General,
    /// Farm and agriculture categories only; subcategories found under them
    /// absorb matching top-level categories.
    Farm,
}

impl TaxonomyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyScope::General => "general",
            TaxonomyScope::Farm => "farm",
        }
    }

    fn merge_policy(&self) -> MergePolicy {
        match self {
            TaxonomyScope::General => MergePolicy::KeepSeparate,
            TaxonomyScope::Farm => MergePolicy::ReparentTopLevel,
        }
    }
}

/// A category anchor found on a taxonomy page.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryLink {
    pub name: String,
    pub url: Option<String>,
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Display name of a category anchor: its text, then `title`, `data-title`,
/// then the `alt` of an image inside it.
fn link_name(anchor: ElementRef<'_>, image_selector: &Selector) -> String {
    let text = element_text(anchor);
    if !text.is_empty() {
        return text;
    }

    ["title", "data-title"]
        .iter()
        .filter_map(|attr| anchor.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            anchor
                .select(image_selector)
                .filter_map(|img| img.value().attr("alt"))
                .map(str::trim)
                .find(|alt| !alt.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

pub fn extract_category_links(html: &str, page_url: &Url, selector: &Selector) -> Vec<CategoryLink> {
    let document = Html::parse_document(html);
    let image_selector = Selector::parse("img[alt]").ok();

    document
        .select(selector)
        .map(|anchor| CategoryLink {
            name: image_selector
                .as_ref()
                .map(|images| link_name(anchor, images))
                .unwrap_or_else(|| element_text(anchor)),
            url: anchor
                .value()
                .attr("href")
                .and_then(|href| resolve_url(page_url, href)),
        })
        .collect()
}

/// File extension of an image URL, defaulting to `jpg`.
pub fn image_extension(image_url: &str) -> String {
    Url::parse(image_url)
        .ok()
        .and_then(|url| {
            let file = url.path_segments()?.next_back()?.to_string();
            let (_, ext) = file.rsplit_once('.')?;
            let ext = ext.to_lowercase();
            (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .then_some(ext)
        })
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
}

pub struct Importer<'a, F, R, B> {
    fetcher: F,
    repo: &'a R,
    blobs: B,
    extractor: ProductExtractor,
    config: ImportConfig,
    progress: Option<ProgressCallback>,
}

impl<'a, F, R, B> Importer<'a, F, R, B>
where
    F: PageFetcher,
    R: CategoryRepository + ListingRepository + ImageRepository,
    B: BlobStore,
{
    pub fn new(fetcher: F, repo: &'a R, blobs: B, config: ImportConfig) -> Self {
        Self {
            fetcher,
            repo,
            blobs,
            extractor: ProductExtractor::default(),
            config,
            progress: None,
        }
    }

    pub fn with_extractor(mut self, extractor: ProductExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    fn report(&self, message: String) {
        if let Some(ref callback) = self.progress {
            callback(message);
        }
    }

    fn guesser(&self) -> &CategoryGuesser {
        self.extractor.guesser()
    }

    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Imports the marketplace category tree reachable from `base_url`.
    pub async fn import_taxonomy(&self, base_url: &str, scope: TaxonomyScope) -> Result<RunResult> {
        info!(base_url, scope = scope.as_str(), "Starting category import");

        match self.run_taxonomy(base_url, scope).await {
            Ok(result) => {
                info!(
                    base_url,
                    scope = scope.as_str(),
                    imported = result.items_imported,
                    seen = result.items_seen,
                    skipped = result.items_skipped,
                    "Category import finished"
                );
                Ok(result)
            }
            Err(e) => {
                error!(base_url, scope = scope.as_str(), error = %e, "Category import failed");
                Err(e)
            }
        }
    }

    /// Imports listings posted within the last `window_days` days.
    pub async fn import_recent_listings(
        &self,
        base_url: &str,
        window_days: u32,
        settings: &ImportSettings,
    ) -> Result<RunResult> {
        info!(
            base_url,
            window_days,
            duplicate_check = settings.duplicate_check_enabled,
            images = settings.import_images,
            "Starting listing import"
        );

        match self.run_recent_listings(base_url, window_days, settings).await {
            Ok(result) => {
                info!(
                    base_url,
                    imported = result.items_imported,
                    seen = result.items_seen,
                    skipped = result.items_skipped,
                    pages = result.pages_fetched,
                    stop_reason = ?result.stop_reason,
                    "Listing import finished"
                );
                Ok(result)
            }
            Err(e) => {
                error!(base_url, error = %e, "Listing import failed");
                Err(e)
            }
        }
    }

    // Taxonomy

    async fn fetch_html(&self, url: &str) -> Option<String> {
        match self.fetcher.fetch(url).await {
            Ok(page) if page.is_success() => Some(page.body),
            Ok(page) => {
                warn!(url, status = page.status, "Page returned an error status");
                None
            }
            Err(e) => {
                warn!(url, error = %e, "Failed to fetch page");
                None
            }
        }
    }

    async fn fetch_landing(&self, base: &Url, scope: TaxonomyScope) -> Option<(Url, String)> {
        if scope == TaxonomyScope::Farm {
            let farm_url = format!("{}/{}", base.as_str().trim_end_matches('/'), FARM_LANDING_PATH);
            if let Ok(farm_url) = Url::parse(&farm_url) {
                if let Some(body) = self.fetch_html(farm_url.as_str()).await {
                    return Some((farm_url, body));
                }
                info!(url = %farm_url, "Farm landing page unavailable, falling back to base URL");
            }
        }

        let body = self.fetch_html(base.as_str()).await?;
        Some((base.clone(), body))
    }

    fn landing_links(&self, html: &str, page_url: &Url, scope: TaxonomyScope) -> Result<Vec<CategoryLink>> {
        let general = parse_selector(CATEGORY_ANCHOR_SELECTOR)?;
        if scope == TaxonomyScope::General {
            return Ok(extract_category_links(html, page_url, &general));
        }

        let farm = parse_selector(FARM_ANCHOR_SELECTOR)?;
        let links = extract_category_links(html, page_url, &farm);
        if !links.is_empty() {
            return Ok(links);
        }

        debug!(url = %page_url, "No farm anchors, filtering general category anchors");
        Ok(extract_category_links(html, page_url, &general)
            .into_iter()
            .filter(|link| self.guesser().is_domain_related(&link.name))
            .collect())
    }

    async fn run_taxonomy(&self, base_url: &str, scope: TaxonomyScope) -> Result<RunResult> {
        let base = Url::parse(base_url)
            .map_err(|e| ImportError::InvalidInput(format!("{}: {}", base_url, e)))?;
        let mut result = RunResult::default();

        let Some((landing_url, body)) = self.fetch_landing(&base, scope).await else {
            warn!(base_url, "Landing page unavailable, nothing imported");
            return Ok(result);
        };
        result.pages_fetched += 1;

        let links = self.landing_links(&body, &landing_url, scope)?;
        debug!(url = %landing_url, count = links.len(), "Found category anchors");

        let resolver = CategoryResolver::new(self.repo);
        let mut visited = HashSet::from([landing_url.to_string()]);

        for link in links {
            result.items_seen += 1;

            let Some(resolution) = self.track(resolver.resolve(&link.name), &link, &mut result)? else {
                continue;
            };
            if resolution.is_change() {
                result.items_imported += 1;
                self.report(format!("Category: {}", resolution.category.name));
                self.pause(self.config.category_delay).await;
            }

            if let Some(url) = link.url
                && self.config.max_taxonomy_depth > 0
            {
                self.import_subcategories(resolution, url, scope, &mut visited, &mut result)
                    .await?;
            }
        }

        Ok(result)
    }

    /// Visits category pages below `root` breadth-first, down to the
    /// configured depth.
    async fn import_subcategories(
        &self,
        root: Resolution,
        root_url: String,
        scope: TaxonomyScope,
        visited: &mut HashSet<String>,
        result: &mut RunResult,
    ) -> Result<()> {
        let selector = parse_selector(SUBCATEGORY_ANCHOR_SELECTOR)?;
        let resolver = CategoryResolver::new(self.repo);
        let mut queue = VecDeque::from([(root.category, root_url, 1usize)]);

        while let Some((parent, url, depth)) = queue.pop_front() {
            if depth > self.config.max_taxonomy_depth || !visited.insert(url.clone()) {
                continue;
            }

            let Some(body) = self.fetch_html(&url).await else {
                continue;
            };
            result.pages_fetched += 1;

            let page_url = match Url::parse(&url) {
                Ok(page_url) => page_url,
                Err(e) => {
                    warn!(url, error = %e, "Skipping category page with invalid URL");
                    continue;
                }
            };

            let links: Vec<CategoryLink> = extract_category_links(&body, &page_url, &selector)
                .into_iter()
                .filter(|link| {
                    scope == TaxonomyScope::General || self.guesser().is_domain_related(&link.name)
                })
                .collect();
            debug!(url, parent = %parent.name, count = links.len(), "Found subcategory anchors");

            for link in links {
                result.items_seen += 1;

                let resolved = resolver.resolve_child(&parent, &link.name, scope.merge_policy());
                let Some(resolution) = self.track(resolved, &link, result)? else {
                    continue;
                };
                if resolution.is_change() {
                    result.items_imported += 1;
                    self.report(format!(
                        "Subcategory: {} > {}",
                        parent.name, resolution.category.name
                    ));
                    self.pause(self.config.category_delay).await;
                }

                if let Some(child_url) = link.url {
                    queue.push_back((resolution.category, child_url, depth + 1));
                }
            }
        }

        Ok(())
    }

    /// Counts skipped categories; only fatal errors escape.
    fn track(
        &self,
        resolved: Result<Option<Resolution>>,
        link: &CategoryLink,
        result: &mut RunResult,
    ) -> Result<Option<Resolution>> {
        match resolved {
            Ok(Some(resolution)) => Ok(Some(resolution)),
            Ok(None) => {
                warn!(url = ?link.url, "Skipping category anchor without a usable name");
                result.items_skipped += 1;
                Ok(None)
            }
            Err(e) if !e.is_fatal() => {
                warn!(name = %link.name, error = %e, "Failed to resolve category");
                result.items_skipped += 1;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // Listings

    async fn run_recent_listings(
        &self,
        base_url: &str,
        window_days: u32,
        settings: &ImportSettings,
    ) -> Result<RunResult> {
        if window_days == 0 {
            return Err(ImportError::InvalidInput(
                "the recency window must be at least one day".to_string(),
            ));
        }

        let threshold = TimeDelta::try_days(i64::from(window_days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                ImportError::InvalidInput(format!(
                    "a recency window of {} days is out of range",
                    window_days
                ))
            })?;
        let options = CrawlOptions::new(threshold)
            .with_max_pages(self.config.max_pages)
            .with_stop_on_stale_page(self.config.stop_on_stale_page);

        let mut crawler = ListingCrawler::new(&self.fetcher, &self.extractor, base_url, options)?;
        if let Some(ref progress) = self.progress {
            let progress = progress.clone();
            crawler = crawler.with_page_callback(Arc::new(move |page: u32, _url: String| {
                progress(format!("Fetching page {}", page));
            }));
        }

        let resolver = CategoryResolver::new(self.repo);
        let dedup = DedupFilter::new(self.repo);
        let mut result = RunResult::default();

        while let Some(page) = crawler.next_page().await {
            debug!(
                page = page.number,
                listings = page.listings.len(),
                recent = page.recent_count,
                "Processing results page"
            );

            for listing in &page.listings {
                result.items_seen += 1;

                match self
                    .import_listing(listing, threshold, settings, &resolver, &dedup)
                    .await
                {
                    Ok(true) => result.items_imported += 1,
                    Ok(false) => result.items_skipped += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(title = %listing.title, url = %listing.external_url, error = %e, "Failed to import listing");
                        result.items_skipped += 1;
                    }
                }
            }
        }

        result.pages_fetched = crawler.pages_fetched();
        result.stop_reason = crawler.stop_reason();
        Ok(result)
    }

    /// Returns whether the listing was persisted.
    async fn import_listing(
        &self,
        listing: &RawListing,
        threshold: DateTime<Utc>,
        settings: &ImportSettings,
        resolver: &CategoryResolver<'_, R>,
        dedup: &DedupFilter<'_, R>,
    ) -> Result<bool> {
        match dedup.should_import(listing, threshold, settings)? {
            Decision::Import => {}
            decision => {
                debug!(title = %listing.title, ?decision, "Skipping listing");
                return Ok(false);
            }
        }

        let category = resolver
            .resolve(&listing.category_guess)?
            .ok_or_else(|| {
                ImportError::InvalidInput(format!("listing '{}' has no category", listing.title))
            })?
            .category;

        let description = if listing.description.is_empty() {
            self.fetch_description(&listing.external_url).await
        } else {
            listing.description.clone()
        };

        let new_listing = NewListing {
            title: listing.title.clone(),
            price: listing.price,
            location: listing.location.clone(),
            description,
            category_id: category.id,
            external_source: self.config.external_source.clone(),
            external_url: listing.external_url.clone(),
        };

        let created = match self.repo.create_listing(&new_listing) {
            Ok(created) => created,
            Err(ImportError::Duplicate(what)) => {
                info!(duplicate = %what, "Listing already imported by another run");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        info!(
            id = created.id,
            title = %created.title,
            category = %category.name,
            "Imported listing"
        );
        self.report(format!("Listing: {}", created.title));

        if settings.import_images
            && let Some(ref image_url) = listing.image_url
        {
            match self.store_image(created.id, image_url).await {
                Ok(image_id) => debug!(listing_id = created.id, image_id, "Stored primary image"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(listing_id = created.id, url = %image_url, error = %e, "Failed to store image"),
            }
        }

        self.pause(self.config.listing_delay).await;
        Ok(true)
    }

    async fn fetch_description(&self, url: &str) -> String {
        if url.is_empty() {
            return DESCRIPTION_FALLBACK.to_string();
        }

        self.fetch_html(url)
            .await
            .and_then(|body| self.extractor.extract_description(&body))
            .unwrap_or_else(|| DESCRIPTION_FALLBACK.to_string())
    }

    async fn store_image(&self, listing_id: i64, image_url: &str) -> Result<i64> {
        let bytes = self.fetcher.fetch_bytes(image_url).await?;
        let path = format!(
            "{}/imported_{}_{}.{}",
            IMAGE_DIR,
            listing_id,
            Utc::now().timestamp(),
            image_extension(image_url)
        );

        let stored = self.blobs.put(&path, &bytes)?;
        self.repo.create_image(listing_id, &stored, true)
    }
}

/// A unit of work handed to the job runner. Re-running a job after a partial
/// failure is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportJob {
    Taxonomy {
        base_url: String,
        scope: TaxonomyScope,
    },
    RecentListings {
        base_url: String,
        window_days: u32,
        settings: ImportSettings,
    },
}

impl ImportJob {
    pub fn kind(&self) -> RunKind {
        match self {
            ImportJob::Taxonomy { .. } => RunKind::Taxonomy,
            ImportJob::RecentListings { .. } => RunKind::Listings,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            ImportJob::Taxonomy { base_url, .. } => base_url,
            ImportJob::RecentListings { base_url, .. } => base_url,
        }
    }

    pub async fn run<F, R, B>(&self, importer: &Importer<'_, F, R, B>) -> Result<RunResult>
    where
        F: PageFetcher,
        R: CategoryRepository + ListingRepository + ImageRepository,
        B: BlobStore,
    {
        match self {
            ImportJob::Taxonomy { base_url, scope } => importer.import_taxonomy(base_url, *scope).await,
            ImportJob::RecentListings {
                base_url,
                window_days,
                settings,
            } => {
                importer
                    .import_recent_listings(base_url, *window_days, settings)
                    .await
            }
        }
    }
}

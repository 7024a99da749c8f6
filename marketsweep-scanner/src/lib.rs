pub mod classify;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod listing;

pub use classify::CategoryGuesser;
pub use crawler::{CrawlOptions, CrawlOutcome, CrawlPage, ListingCrawler, StopReason};
pub use error::ScanError;
pub use extract::{ListingSelectors, ProductExtractor};
pub use fetch::{FetchedPage, HttpFetcher, PageFetcher};
pub use listing::RawListing;

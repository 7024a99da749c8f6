use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One listing as scraped from a results page, before dedup and category
/// resolution. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub title: String,
    /// Normalized price; currency is fixed by the source marketplace.
    pub price: f64,
    pub location: String,
    /// Empty when the results page carried no description; the importer then
    /// fills it from the detail page.
    pub description: String,
    pub image_url: Option<String>,
    /// Absolute URL of the listing's detail page.
    pub external_url: String,
    pub estimated_posted_at: DateTime<Utc>,
    pub category_guess: String,
}

impl RawListing {
    pub fn is_recent(&self, threshold: DateTime<Utc>) -> bool {
        self.estimated_posted_at >= threshold
    }
}

use crate::error::Result;
use crate::model::ImportSettings;
use crate::repository::ListingRepository;
use chrono::{DateTime, Utc};
use marketsweep_scanner::RawListing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Import,
    /// Already in the catalog.
    Duplicate,
    /// Older than the recency threshold.
    Stale,
}

impl Decision {
    pub fn is_import(&self) -> bool {
        *self == Decision::Import
    }
}

/// Decides whether a scraped listing should be persisted. Stateless apart
/// from the catalog reads, so re-running an import makes the same decisions.
pub struct DedupFilter<'a, R: ListingRepository> {
    repo: &'a R,
}

impl<'a, R: ListingRepository> DedupFilter<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    pub fn should_import(
        &self,
        listing: &RawListing,
        threshold: DateTime<Utc>,
        settings: &ImportSettings,
    ) -> Result<Decision> {
        if settings.duplicate_check_enabled && self.is_duplicate(listing)? {
            return Ok(Decision::Duplicate);
        }

        if listing.is_recent(threshold) {
            Ok(Decision::Import)
        } else {
            Ok(Decision::Stale)
        }
    }

    fn is_duplicate(&self, listing: &RawListing) -> Result<bool> {
        if !listing.external_url.is_empty() {
            return Ok(self
                .repo
                .find_listing_by_external_url(&listing.external_url)?
                .is_some());
        }

        Ok(self
            .repo
            .find_listing_by_title_price_location(&listing.title, listing.price, &listing.location)?
            .is_some())
    }
}

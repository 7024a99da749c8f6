//! Persistence seams used by the import pipeline.
//!
//! The pipeline only talks to these traits. `Database` implements all three
//! repositories over SQLite; tests may substitute in-memory versions.

use crate::error::Result;
use crate::model::{Category, Listing, NewCategory, NewListing};

pub trait CategoryRepository {
    /// Exact-name lookup over the whole taxonomy, regardless of parent.
    /// When several categories share the name, top-level ones come first.
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// Exact-name lookup among the children of `parent_id` (`None` = top level).
    fn find_child_by_name(&self, parent_id: Option<i64>, name: &str) -> Result<Option<Category>>;

    fn find_category_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Fails with `ImportError::Duplicate` when the name or slug is already
    /// taken among the new category's siblings.
    fn create_category(&self, category: &NewCategory) -> Result<Category>;

    fn reparent_category(&self, id: i64, parent_id: Option<i64>) -> Result<()>;

    fn slug_taken(&self, parent_id: Option<i64>, slug: &str) -> Result<bool>;
}

pub trait ListingRepository {
    fn find_listing_by_external_url(&self, external_url: &str) -> Result<Option<Listing>>;

    fn find_listing_by_title_price_location(
        &self,
        title: &str,
        price: f64,
        location: &str,
    ) -> Result<Option<Listing>>;

    /// Fails with `ImportError::Duplicate` when the listing's identity is
    /// already in the catalog.
    fn create_listing(&self, listing: &NewListing) -> Result<Listing>;
}

pub trait ImageRepository {
    /// Records an image for a listing. A primary image also becomes the
    /// listing's `primary_image_id`.
    fn create_image(&self, listing_id: i64, path: &str, is_primary: bool) -> Result<i64>;
}

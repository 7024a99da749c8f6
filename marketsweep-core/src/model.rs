use marketsweep_scanner::StopReason;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryStatus {
    Active,
    Inactive,
}

impl CategoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryStatus::Active => "active",
            CategoryStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CategoryStatus::Active),
            "inactive" => Some(CategoryStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Unique among siblings.
    pub slug: String,
    pub parent_id: Option<i64>,
    pub status: CategoryStatus,
    pub description: String,
}

impl Category {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i64>,
    pub status: CategoryStatus,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub location: String,
    pub description: String,
    pub category_id: i64,
    pub external_source: String,
    /// Empty when the source page had no link; the (title, price, location)
    /// triple is the identity then.
    pub external_url: String,
    pub primary_image_id: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub title: String,
    pub price: f64,
    pub location: String,
    pub description: String,
    pub category_id: i64,
    pub external_source: String,
    pub external_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingImage {
    pub id: i64,
    pub listing_id: i64,
    pub path: String,
    pub is_primary: bool,
}

pub const MIN_IMPORT_DAYS: u32 = 1;
pub const MAX_IMPORT_DAYS: u32 = 30;

/// Operator-controlled switches, read once at the start of a listings run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub duplicate_check_enabled: bool,
    /// Recency window in days.
    pub import_days: u32,
    pub import_images: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            duplicate_check_enabled: true,
            import_days: 3,
            import_images: true,
        }
    }
}

/// Counters of one import run. Logged and recorded on the run row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub items_imported: usize,
    pub items_seen: usize,
    pub items_skipped: usize,
    pub pages_fetched: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    Taxonomy,
    Listings,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Taxonomy => "taxonomy",
            RunKind::Listings => "listings",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Persisted record of an import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: String,
    pub kind: String,
    pub base_url: String,
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    pub status: String,
    pub items_imported: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

use crate::error::{ImportError, Result};
use crate::model::{
    Category, CategoryStatus, ImportRun, ImportSettings, Listing, ListingImage, NewCategory,
    NewListing, RunKind, RunResult, RunStatus, MAX_IMPORT_DAYS, MIN_IMPORT_DAYS,
};
use crate::repository::{CategoryRepository, ImageRepository, ListingRepository};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fs;
use std::path::Path;

pub struct Database {
    conn: Connection,
}

fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Maps a unique-index violation to `ImportError::Duplicate`; everything else
/// stays a store error.
fn insert_error(err: rusqlite::Error, what: impl FnOnce() -> String) -> ImportError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            ImportError::Duplicate(what())
        }
        other => ImportError::Store(other),
    }
}

const CATEGORY_COLUMNS: &str = "id, name, slug, parent_id, status, description";

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let status: String = row.get(4)?;
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        parent_id: row.get(3)?,
        status: CategoryStatus::from_str(&status).unwrap_or(CategoryStatus::Active),
        description: row.get(5)?,
    })
}

const LISTING_COLUMNS: &str = "id, title, price, location, description, category_id, \
     external_source, external_url, primary_image_id, created_at";

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get(0)?,
        title: row.get(1)?,
        price: row.get(2)?,
        location: row.get(3)?,
        description: row.get(4)?,
        category_id: row.get(5)?,
        external_source: row.get(6)?,
        external_url: row.get(7)?,
        primary_image_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl Database {
    /// Removes the database file along with its WAL sidecars.
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)?;
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = Path::new(&sidecar);
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
        Ok(())
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Overlapping runs may write to the same catalog
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- Marketplace taxonomy
            CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    parent_id INTEGER,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'inactive')),
    description TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY(parent_id) REFERENCES categories(id)
);

-- Sibling scope: top-level categories share parent 0
CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_sibling_name ON categories(IFNULL(parent_id, 0), name);
CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_sibling_slug ON categories(IFNULL(parent_id, 0), slug);
CREATE INDEX IF NOT EXISTS idx_categories_name ON categories(name);
CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);

-- Imported ads
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    price REAL NOT NULL DEFAULT 0,
    location TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    category_id INTEGER NOT NULL,
    external_source TEXT NOT NULL,
    external_url TEXT NOT NULL DEFAULT '',
    primary_image_id INTEGER,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(category_id) REFERENCES categories(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_listings_external_url ON listings(external_url) WHERE external_url <> '';
CREATE UNIQUE INDEX IF NOT EXISTS idx_listings_identity ON listings(title, price, location) WHERE external_url = '';
CREATE INDEX IF NOT EXISTS idx_listings_category ON listings(category_id);

CREATE TABLE IF NOT EXISTS listing_images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    is_primary BOOLEAN NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(listing_id) REFERENCES listings(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_listing_images_listing ON listing_images(listing_id);

-- Single-row operator settings
CREATE TABLE IF NOT EXISTS import_settings (
    id INTEGER PRIMARY KEY CHECK(id = 1),
    duplicate_check_enabled BOOLEAN NOT NULL,
    import_days INTEGER NOT NULL,
    import_images BOOLEAN NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Import runs
CREATE TABLE IF NOT EXISTS import_runs (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK(kind IN ('taxonomy', 'listings')),
    base_url TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    items_imported INTEGER NOT NULL DEFAULT 0,
    result TEXT,              -- JSON RunResult
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_import_runs_start ON import_runs(start_time);
            ",
        )?;
        Ok(())
    }

    // Settings
    pub fn load_settings(&self) -> Result<ImportSettings> {
        let settings = self
            .conn
            .query_row(
                "SELECT duplicate_check_enabled, import_days, import_images FROM import_settings WHERE id = 1",
                [],
                |row| {
                    Ok(ImportSettings {
                        duplicate_check_enabled: row.get(0)?,
                        import_days: row.get(1)?,
                        import_images: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(settings.unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &ImportSettings) -> Result<()> {
        if !(MIN_IMPORT_DAYS..=MAX_IMPORT_DAYS).contains(&settings.import_days) {
            return Err(ImportError::InvalidInput(format!(
                "import days must be between {} and {}, got {}",
                MIN_IMPORT_DAYS, MAX_IMPORT_DAYS, settings.import_days
            )));
        }

        self.conn.execute(
            "INSERT INTO import_settings (id, duplicate_check_enabled, import_days, import_images, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                duplicate_check_enabled = excluded.duplicate_check_enabled,
                import_days = excluded.import_days,
                import_images = excluded.import_images,
                updated_at = excluded.updated_at",
            params![
                settings.duplicate_check_enabled,
                settings.import_days,
                settings.import_images,
                current_timestamp(),
            ],
        )?;
        Ok(())
    }

    // Run management
    pub fn begin_run(&self, kind: RunKind, base_url: &str) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();

        self.conn.execute(
            "INSERT INTO import_runs (id, kind, base_url, start_time, status) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &run_id,
                kind.as_str(),
                base_url,
                current_timestamp(),
                RunStatus::Running.as_str()
            ],
        )?;

        Ok(run_id)
    }

    pub fn complete_run(&self, run_id: &str, result: &RunResult) -> Result<()> {
        let summary = serde_json::to_string(result)?;
        self.conn.execute(
            "UPDATE import_runs SET status = ?1, end_time = ?2, items_imported = ?3, result = ?4 WHERE id = ?5",
            params![
                RunStatus::Completed.as_str(),
                current_timestamp(),
                result.items_imported as i64,
                summary,
                run_id
            ],
        )?;
        Ok(())
    }

    pub fn fail_run(&self, run_id: &str, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE import_runs SET status = ?1, end_time = ?2, error = ?3 WHERE id = ?4",
            params![RunStatus::Failed.as_str(), current_timestamp(), error, run_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<ImportRun>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, kind, base_url, start_time, end_time, status, items_imported, error
                 FROM import_runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<ImportRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, base_url, start_time, end_time, status, items_imported, error
             FROM import_runs ORDER BY start_time DESC, rowid DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(runs)
    }

    // Query methods
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM categories ORDER BY id",
            CATEGORY_COLUMNS
        ))?;

        let categories = stmt
            .query_map([], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(categories)
    }

    pub fn list_listings(&self) -> Result<Vec<Listing>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM listings ORDER BY id",
            LISTING_COLUMNS
        ))?;

        let listings = stmt
            .query_map([], listing_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(listings)
    }

    pub fn images_for_listing(&self, listing_id: i64) -> Result<Vec<ListingImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, listing_id, path, is_primary FROM listing_images WHERE listing_id = ?1 ORDER BY id",
        )?;

        let images = stmt
            .query_map(params![listing_id], |row| {
                Ok(ListingImage {
                    id: row.get(0)?,
                    listing_id: row.get(1)?,
                    path: row.get(2)?,
                    is_primary: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(images)
    }

    pub fn count_categories(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?)
    }

    pub fn count_top_level_categories(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM categories WHERE parent_id IS NULL",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn count_listings(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?)
    }

    /// Listing counts per category, busiest first.
    pub fn listings_per_category(&self, limit: usize) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.name, COUNT(l.id) AS total
             FROM listings l
             JOIN categories c ON l.category_id = c.id
             GROUP BY c.id
             ORDER BY total DESC, c.name
             LIMIT ?1",
        )?;

        let counts = stmt
            .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(counts)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<ImportRun> {
    Ok(ImportRun {
        id: row.get(0)?,
        kind: row.get(1)?,
        base_url: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        status: row.get(5)?,
        items_imported: row.get(6)?,
        error: row.get(7)?,
    })
}

impl CategoryRepository for Database {
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM categories WHERE name = ?1 ORDER BY parent_id IS NOT NULL, id LIMIT 1",
                    CATEGORY_COLUMNS
                ),
                params![name],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn find_child_by_name(&self, parent_id: Option<i64>, name: &str) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM categories WHERE parent_id IS ?1 AND name = ?2",
                    CATEGORY_COLUMNS
                ),
                params![parent_id, name],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn find_category_by_id(&self, id: i64) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                params![id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn create_category(&self, category: &NewCategory) -> Result<Category> {
        let timestamp = current_timestamp();

        self.conn
            .execute(
                "INSERT INTO categories (name, slug, parent_id, status, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &category.name,
                    &category.slug,
                    category.parent_id,
                    category.status.as_str(),
                    &category.description,
                    timestamp,
                    timestamp,
                ],
            )
            .map_err(|e| insert_error(e, || format!("category '{}'", category.name)))?;

        Ok(Category {
            id: self.conn.last_insert_rowid(),
            name: category.name.clone(),
            slug: category.slug.clone(),
            parent_id: category.parent_id,
            status: category.status,
            description: category.description.clone(),
        })
    }

    fn reparent_category(&self, id: i64, parent_id: Option<i64>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE categories SET parent_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![parent_id, current_timestamp(), id],
            )
            .map_err(|e| insert_error(e, || format!("category {} under {:?}", id, parent_id)))?;
        Ok(())
    }

    fn slug_taken(&self, parent_id: Option<i64>, slug: &str) -> Result<bool> {
        let taken: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE parent_id IS ?1 AND slug = ?2)",
            params![parent_id, slug],
            |row| row.get(0),
        )?;
        Ok(taken)
    }
}

impl ListingRepository for Database {
    fn find_listing_by_external_url(&self, external_url: &str) -> Result<Option<Listing>> {
        let listing = self
            .conn
            .query_row(
                &format!("SELECT {} FROM listings WHERE external_url = ?1", LISTING_COLUMNS),
                params![external_url],
                listing_from_row,
            )
            .optional()?;
        Ok(listing)
    }

    fn find_listing_by_title_price_location(
        &self,
        title: &str,
        price: f64,
        location: &str,
    ) -> Result<Option<Listing>> {
        let listing = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM listings WHERE title = ?1 AND price = ?2 AND location = ?3 ORDER BY id LIMIT 1",
                    LISTING_COLUMNS
                ),
                params![title, price, location],
                listing_from_row,
            )
            .optional()?;
        Ok(listing)
    }

    fn create_listing(&self, listing: &NewListing) -> Result<Listing> {
        let timestamp = current_timestamp();

        self.conn
            .execute(
                "INSERT INTO listings (
                    title, price, location, description, category_id,
                    external_source, external_url, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    &listing.title,
                    listing.price,
                    &listing.location,
                    &listing.description,
                    listing.category_id,
                    &listing.external_source,
                    &listing.external_url,
                    timestamp,
                ],
            )
            .map_err(|e| insert_error(e, || format!("listing '{}'", listing.title)))?;

        Ok(Listing {
            id: self.conn.last_insert_rowid(),
            title: listing.title.clone(),
            price: listing.price,
            location: listing.location.clone(),
            description: listing.description.clone(),
            category_id: listing.category_id,
            external_source: listing.external_source.clone(),
            external_url: listing.external_url.clone(),
            primary_image_id: None,
            created_at: timestamp,
        })
    }
}

impl ImageRepository for Database {
    fn create_image(&self, listing_id: i64, path: &str, is_primary: bool) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO listing_images (listing_id, path, is_primary, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![listing_id, path, is_primary, current_timestamp()],
        )?;
        let image_id = tx.last_insert_rowid();

        if is_primary {
            tx.execute(
                "UPDATE listing_images SET is_primary = 0 WHERE listing_id = ?1 AND id <> ?2",
                params![listing_id, image_id],
            )?;
            tx.execute(
                "UPDATE listings SET primary_image_id = ?1 WHERE id = ?2",
                params![image_id, listing_id],
            )?;
        }

        tx.commit()?;
        Ok(image_id)
    }
}

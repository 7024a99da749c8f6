// Tests for category resolution and merging

use marketsweep_core::data::Database;
use marketsweep_core::error::{ImportError, Result};
use marketsweep_core::model::{Category, NewCategory};
use marketsweep_core::repository::CategoryRepository;
use marketsweep_core::resolve::{
    CategoryResolver, MergePolicy, ResolutionOutcome, normalize_name, slugify,
};
use std::cell::RefCell;
use tempfile::TempDir;

/// Category store held in memory, mirroring the sibling uniqueness rules of
/// the SQLite schema.
#[derive(Default)]
struct MemoryCategories {
    categories: RefCell<Vec<Category>>,
    fail_creates: bool,
}

impl MemoryCategories {
    fn all(&self) -> Vec<Category> {
        self.categories.borrow().clone()
    }

    fn seed(&self, name: &str, slug: &str, parent_id: Option<i64>) -> Category {
        self.create_category(&NewCategory {
            name: name.to_string(),
            slug: slug.to_string(),
            parent_id,
            status: marketsweep_core::model::CategoryStatus::Active,
            description: String::new(),
        })
        .unwrap()
    }
}

impl CategoryRepository for MemoryCategories {
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let categories = self.categories.borrow();
        Ok(categories
            .iter()
            .filter(|c| c.name == name)
            .min_by_key(|c| (c.parent_id.is_some(), c.id))
            .cloned())
    }

    fn find_child_by_name(&self, parent_id: Option<i64>, name: &str) -> Result<Option<Category>> {
        Ok(self
            .categories
            .borrow()
            .iter()
            .find(|c| c.parent_id == parent_id && c.name == name)
            .cloned())
    }

    fn find_category_by_id(&self, id: i64) -> Result<Option<Category>> {
        Ok(self.categories.borrow().iter().find(|c| c.id == id).cloned())
    }

    fn create_category(&self, category: &NewCategory) -> Result<Category> {
        if self.fail_creates {
            return Err(ImportError::Store(rusqlite_unavailable()));
        }

        let mut categories = self.categories.borrow_mut();
        if categories.iter().any(|c| {
            c.parent_id == category.parent_id && (c.name == category.name || c.slug == category.slug)
        }) {
            return Err(ImportError::Duplicate(category.name.clone()));
        }

        let created = Category {
            id: categories.len() as i64 + 1,
            name: category.name.clone(),
            slug: category.slug.clone(),
            parent_id: category.parent_id,
            status: category.status,
            description: category.description.clone(),
        };
        categories.push(created.clone());
        Ok(created)
    }

    fn reparent_category(&self, id: i64, parent_id: Option<i64>) -> Result<()> {
        let mut categories = self.categories.borrow_mut();
        if let Some(category) = categories.iter_mut().find(|c| c.id == id) {
            category.parent_id = parent_id;
        }
        Ok(())
    }

    fn slug_taken(&self, parent_id: Option<i64>, slug: &str) -> Result<bool> {
        Ok(self
            .categories
            .borrow()
            .iter()
            .any(|c| c.parent_id == parent_id && c.slug == slug))
    }
}

fn rusqlite_unavailable() -> rusqlite::Error {
    rusqlite::Error::InvalidQuery
}

// ============================================================================
// Normalization Tests
// ============================================================================

#[test]
fn test_normalize_name() {
    assert_eq!(normalize_name("  Phones  "), Some("Phones".to_string()));
    assert_eq!(
        normalize_name("<span>Mobile</span>   <b>Phones</b>"),
        Some("Mobile Phones".to_string())
    );
    assert_eq!(
        normalize_name("Electronics > Phones"),
        Some("Electronics > Phones".to_string())
    );
    assert_eq!(normalize_name("   "), None);
    assert_eq!(normalize_name("<img src=\"x.png\">"), None);
}

#[test]
fn test_normalize_name_keeps_literal_angle_brackets() {
    assert_eq!(
        normalize_name("Kids < 5 years"),
        Some("Kids < 5 years".to_string())
    );
    assert_eq!(normalize_name("Toys <3"), Some("Toys <3".to_string()));
    assert_eq!(
        normalize_name("Baby <b>Gear</b> < 2kg"),
        Some("Baby Gear < 2kg".to_string())
    );
}

#[test]
fn test_resolve_name_with_literal_angle_bracket() {
    let repo = MemoryCategories::default();
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver.resolve("Kids < 5 years").unwrap().unwrap();
    assert_eq!(resolution.category.name, "Kids < 5 years");
    assert_eq!(resolution.category.slug, "kids-5-years");
}

#[test]
fn test_slugify() {
    assert_eq!(slugify("Mobile Phones"), "mobile-phones");
    assert_eq!(slugify("Cars & Trucks!"), "cars-trucks");
    assert_eq!(slugify("  --Farm--  "), "farm");
    assert_eq!(slugify("!!!"), "category");
}

// ============================================================================
// resolve() Tests
// ============================================================================

#[test]
fn test_resolve_creates_top_level() {
    let repo = MemoryCategories::default();
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver.resolve("Mobile Phones").unwrap().unwrap();
    assert_eq!(resolution.outcome, ResolutionOutcome::Created);
    assert_eq!(resolution.category.slug, "mobile-phones");
    assert!(resolution.category.is_top_level());

    let again = resolver.resolve("Mobile Phones").unwrap().unwrap();
    assert_eq!(again.outcome, ResolutionOutcome::Existing);
    assert_eq!(again.category.id, resolution.category.id);
    assert_eq!(repo.all().len(), 1);
}

#[test]
fn test_resolve_nested_name() {
    let repo = MemoryCategories::default();
    let resolver = CategoryResolver::new(&repo);

    let phones = resolver.resolve("Electronics > Phones").unwrap().unwrap();
    assert_eq!(phones.outcome, ResolutionOutcome::Created);
    assert_eq!(phones.category.name, "Phones");

    let electronics = repo.find_child_by_name(None, "Electronics").unwrap().unwrap();
    assert_eq!(phones.category.parent_id, Some(electronics.id));

    // Repeating creates no new rows
    let repeat = resolver.resolve("Electronics > Phones").unwrap().unwrap();
    assert_eq!(repeat.category.id, phones.category.id);
    assert!(!repeat.is_change());
    assert_eq!(repo.all().len(), 2);
}

#[test]
fn test_resolve_deep_nesting() {
    let repo = MemoryCategories::default();
    let resolver = CategoryResolver::new(&repo);

    let leaf = resolver.resolve("Farm > Livestock > Goats").unwrap().unwrap();

    let farm = repo.find_child_by_name(None, "Farm").unwrap().unwrap();
    let livestock = repo.find_child_by_name(Some(farm.id), "Livestock").unwrap().unwrap();
    assert_eq!(leaf.category.parent_id, Some(livestock.id));
    assert_eq!(repo.all().len(), 3);
}

#[test]
fn test_resolve_exact_match_anywhere_wins() {
    let repo = MemoryCategories::default();
    let farm = repo.seed("Farm", "farm", None);
    let poultry = repo.seed("Poultry", "poultry", Some(farm.id));
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver.resolve("Poultry").unwrap().unwrap();
    assert_eq!(resolution.outcome, ResolutionOutcome::Existing);
    assert_eq!(resolution.category.id, poultry.id);
    assert_eq!(repo.all().len(), 2);
}

#[test]
fn test_resolve_empty_names() {
    let repo = MemoryCategories::default();
    let resolver = CategoryResolver::new(&repo);

    assert!(resolver.resolve("").unwrap().is_none());
    assert!(resolver.resolve("  <br/>  ").unwrap().is_none());
    assert!(resolver.resolve(" > ").unwrap().is_none());
    assert!(repo.all().is_empty());
}

#[test]
fn test_resolve_half_empty_nested_names() {
    let repo = MemoryCategories::default();
    let resolver = CategoryResolver::new(&repo);

    let child_only = resolver.resolve(" > Phones").unwrap().unwrap();
    assert_eq!(child_only.category.name, "Phones");
    assert!(child_only.category.is_top_level());

    let parent_only = resolver.resolve("Cars > ").unwrap().unwrap();
    assert_eq!(parent_only.category.name, "Cars");
    assert!(parent_only.category.is_top_level());
}

#[test]
fn test_slug_collision_gets_suffix() {
    let repo = MemoryCategories::default();
    repo.seed("Mobile-Phones", "mobile-phones", None);
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver.resolve("Mobile Phones").unwrap().unwrap();
    assert_eq!(resolution.category.slug, "mobile-phones-2");

    let third = resolver.resolve("Mobile  Phones!").unwrap().unwrap();
    assert_eq!(third.category.slug, "mobile-phones-3");
}

#[test]
fn test_store_errors_propagate() {
    let repo = MemoryCategories {
        fail_creates: true,
        ..Default::default()
    };
    let resolver = CategoryResolver::new(&repo);

    let err = resolver.resolve("Phones").unwrap_err();
    assert!(err.is_fatal());
}

// ============================================================================
// resolve_child() Merge Tests
// ============================================================================

#[test]
fn test_reparent_top_level_on_farm_path() {
    let repo = MemoryCategories::default();
    let farm = repo.seed("Agriculture & Food", "agriculture-food", None);
    let poultry = repo.seed("Poultry", "poultry", None);
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver
        .resolve_child(&farm, "Poultry", MergePolicy::ReparentTopLevel)
        .unwrap()
        .unwrap();

    assert_eq!(resolution.outcome, ResolutionOutcome::Reparented);
    assert_eq!(resolution.category.id, poultry.id);
    assert_eq!(resolution.category.parent_id, Some(farm.id));
    assert_eq!(
        repo.find_category_by_id(poultry.id).unwrap().unwrap().parent_id,
        Some(farm.id)
    );
    assert_eq!(repo.all().len(), 2);
}

#[test]
fn test_keep_separate_creates_new_child() {
    let repo = MemoryCategories::default();
    let vehicles = repo.seed("Vehicles", "vehicles", None);
    let parts = repo.seed("Parts", "parts", None);
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver
        .resolve_child(&vehicles, "Parts", MergePolicy::KeepSeparate)
        .unwrap()
        .unwrap();

    assert_eq!(resolution.outcome, ResolutionOutcome::Created);
    assert_ne!(resolution.category.id, parts.id);
    assert_eq!(resolution.category.parent_id, Some(vehicles.id));
    assert!(repo.find_category_by_id(parts.id).unwrap().unwrap().is_top_level());
}

#[test]
fn test_existing_child_is_returned() {
    let repo = MemoryCategories::default();
    let farm = repo.seed("Farm", "farm", None);
    let goats = repo.seed("Goats", "goats", Some(farm.id));
    repo.seed("Goats", "goats", None);
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver
        .resolve_child(&farm, "Goats", MergePolicy::ReparentTopLevel)
        .unwrap()
        .unwrap();

    assert_eq!(resolution.outcome, ResolutionOutcome::Existing);
    assert_eq!(resolution.category.id, goats.id);
}

#[test]
fn test_merge_refuses_cycle() {
    let repo = MemoryCategories::default();
    let farm = repo.seed("Farm", "farm", None);
    let livestock = repo.seed("Livestock", "livestock", Some(farm.id));
    let resolver = CategoryResolver::new(&repo);

    // "Farm" is top level and an ancestor of "Livestock"
    let resolution = resolver
        .resolve_child(&livestock, "Farm", MergePolicy::ReparentTopLevel)
        .unwrap()
        .unwrap();

    assert_eq!(resolution.outcome, ResolutionOutcome::Existing);
    assert_eq!(resolution.category.id, farm.id);
    assert!(repo.find_category_by_id(farm.id).unwrap().unwrap().is_top_level());
}

#[test]
fn test_merge_into_self_is_not_a_merge() {
    let repo = MemoryCategories::default();
    let farm = repo.seed("Farm", "farm", None);
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver
        .resolve_child(&farm, "Farm", MergePolicy::ReparentTopLevel)
        .unwrap()
        .unwrap();

    assert_eq!(resolution.outcome, ResolutionOutcome::Created);
    assert_eq!(resolution.category.parent_id, Some(farm.id));
}

#[test]
fn test_merge_skipped_on_slug_conflict() {
    let repo = MemoryCategories::default();
    let farm = repo.seed("Farm", "farm", None);
    repo.seed("Fresh Fruit", "fruit", Some(farm.id));
    let top_fruit = repo.seed("Fruit", "fruit", None);
    let resolver = CategoryResolver::new(&repo);

    let resolution = resolver
        .resolve_child(&farm, "Fruit", MergePolicy::ReparentTopLevel)
        .unwrap()
        .unwrap();

    assert_eq!(resolution.outcome, ResolutionOutcome::Created);
    assert_eq!(resolution.category.slug, "fruit-2");
    assert!(repo.find_category_by_id(top_fruit.id).unwrap().unwrap().is_top_level());
}

// ============================================================================
// SQLite-backed Tests
// ============================================================================

#[test]
fn test_resolver_over_database() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("catalog.db")).unwrap();
    let resolver = CategoryResolver::new(&db);

    resolver.resolve("Electronics > Phones").unwrap().unwrap();
    resolver.resolve("Electronics > Phones").unwrap().unwrap();
    resolver.resolve("Electronics > Laptops").unwrap().unwrap();

    let names: Vec<String> = db.list_categories().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Electronics", "Phones", "Laptops"]);
}

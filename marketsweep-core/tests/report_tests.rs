// Tests for catalog status reports

use marketsweep_core::data::Database;
use marketsweep_core::model::{
    CategoryStatus, ImportSettings, NewCategory, NewListing, RunKind, RunResult,
};
use marketsweep_core::report::{
    ReportFormat, gather_catalog_summary, generate_json_report, generate_markdown_report,
    generate_text_report, render_report, save_report,
};
use marketsweep_core::repository::{CategoryRepository, ListingRepository};
use tempfile::TempDir;

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("catalog.db")).unwrap();
    (temp_dir, db)
}

fn populate(db: &Database) {
    let electronics = db
        .create_category(&NewCategory {
            name: "Electronics".to_string(),
            slug: "electronics".to_string(),
            parent_id: None,
            status: CategoryStatus::Active,
            description: String::new(),
        })
        .unwrap();
    let phones = db
        .create_category(&NewCategory {
            name: "Phones | Tablets".to_string(),
            slug: "phones-tablets".to_string(),
            parent_id: Some(electronics.id),
            status: CategoryStatus::Active,
            description: String::new(),
        })
        .unwrap();

    for n in 0..3 {
        db.create_listing(&NewListing {
            title: format!("Phone {}", n),
            price: 1000.0,
            location: "Lagos".to_string(),
            description: String::new(),
            category_id: phones.id,
            external_source: "jiji.ng".to_string(),
            external_url: format!("https://jiji.ng/ads/{}", n),
        })
        .unwrap();
    }

    let run_id = db.begin_run(RunKind::Listings, "https://jiji.ng").unwrap();
    db.complete_run(
        &run_id,
        &RunResult {
            items_imported: 3,
            ..RunResult::default()
        },
    )
    .unwrap();
    let failed = db.begin_run(RunKind::Taxonomy, "https://jiji.ng").unwrap();
    db.fail_run(&failed, "landing page timed out").unwrap();
}

// ============================================================================
// Format Parsing Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert_eq!(ReportFormat::from_str("text"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("JSON"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("md"), Some(ReportFormat::Markdown));
    assert_eq!(ReportFormat::from_str("markdown"), Some(ReportFormat::Markdown));
    assert_eq!(ReportFormat::from_str("csv"), None);
}

// ============================================================================
// Summary Tests
// ============================================================================

#[test]
fn test_summary_of_empty_catalog() {
    let (_temp_dir, db) = create_test_db();

    let summary = gather_catalog_summary(&db).unwrap();
    assert_eq!(summary.total_categories, 0);
    assert_eq!(summary.total_listings, 0);
    assert!(summary.top_categories.is_empty());
    assert!(summary.recent_runs.is_empty());
    assert_eq!(summary.settings, ImportSettings::default());

    let text = generate_text_report(&summary);
    assert!(text.contains("(no runs yet)"));
    assert!(generate_markdown_report(&summary).contains("_No runs yet._"));
}

#[test]
fn test_summary_counts() {
    let (_temp_dir, db) = create_test_db();
    populate(&db);

    let summary = gather_catalog_summary(&db).unwrap();
    assert_eq!(summary.total_categories, 2);
    assert_eq!(summary.top_level_categories, 1);
    assert_eq!(summary.total_listings, 3);
    assert_eq!(summary.top_categories.len(), 1);
    assert_eq!(summary.top_categories[0].name, "Phones | Tablets");
    assert_eq!(summary.top_categories[0].listings, 3);
    assert_eq!(summary.recent_runs.len(), 2);
}

// ============================================================================
// Rendering Tests
// ============================================================================

#[test]
fn test_text_report() {
    let (_temp_dir, db) = create_test_db();
    populate(&db);
    let summary = gather_catalog_summary(&db).unwrap();

    let text = generate_text_report(&summary);
    assert!(text.contains("MARKETSWEEP CATALOG STATUS"));
    assert!(text.contains("Categories:     2"));
    assert!(text.contains("Listings:       3"));
    assert!(text.contains("LISTINGS BY CATEGORY"));
    assert!(text.contains("error: landing page timed out"));
    assert!(text.contains("duplicate check on, window 3 day(s), images on"));
}

#[test]
fn test_json_report_is_valid() {
    let (_temp_dir, db) = create_test_db();
    populate(&db);
    let summary = gather_catalog_summary(&db).unwrap();

    let json = generate_json_report(&summary).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["report"]["metadata"]["generator"], "Marketsweep");
    assert_eq!(value["report"]["catalog"]["total_listings"], 3);
    assert_eq!(
        value["report"]["catalog"]["recent_runs"].as_array().unwrap().len(),
        2
    );
}

#[test]
fn test_markdown_report_escapes_cells() {
    let (_temp_dir, db) = create_test_db();
    populate(&db);
    let summary = gather_catalog_summary(&db).unwrap();

    let markdown = render_report(&summary, ReportFormat::Markdown).unwrap();
    assert!(markdown.starts_with("# Marketsweep Catalog Status"));
    assert!(markdown.contains("| Phones \\| Tablets | 3 |"));
    assert!(markdown.contains("| Listings | 3 |"));
}

#[test]
fn test_save_report() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("status.md");

    save_report("# hello\n", &path).unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "# hello\n");
}

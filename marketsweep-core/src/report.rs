// Catalog status report from database

use crate::data::Database;
use crate::error::Result;
use crate::model::{ImportRun, ImportSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const TOP_CATEGORIES: usize = 10;
pub const RECENT_RUNS: usize = 5;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub listings: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub total_categories: i64,
    pub top_level_categories: i64,
    pub total_listings: i64,
    pub top_categories: Vec<CategoryCount>,
    pub recent_runs: Vec<ImportRun>,
    pub settings: ImportSettings,
}

pub fn gather_catalog_summary(db: &Database) -> Result<CatalogSummary> {
    let top_categories = db
        .listings_per_category(TOP_CATEGORIES)?
        .into_iter()
        .map(|(name, listings)| CategoryCount { name, listings })
        .collect();

    Ok(CatalogSummary {
        total_categories: db.count_categories()?,
        top_level_categories: db.count_top_level_categories()?,
        total_listings: db.count_listings()?,
        top_categories,
        recent_runs: db.recent_runs(RECENT_RUNS)?,
        settings: db.load_settings()?,
    })
}

pub fn render_report(summary: &CatalogSummary, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(summary)),
        ReportFormat::Json => generate_json_report(summary),
        ReportFormat::Markdown => Ok(generate_markdown_report(summary)),
    }
}

pub fn generate_text_report(summary: &CatalogSummary) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                          MARKETSWEEP CATALOG STATUS\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Categories:     {}\n", summary.total_categories));
    report.push_str(&format!("  Top level:    {}\n", summary.top_level_categories));
    report.push_str(&format!("Listings:       {}\n", summary.total_listings));
    report.push('\n');

    report.push_str(&format!(
        "Settings:       duplicate check {}, window {} day(s), images {}\n\n",
        on_off(summary.settings.duplicate_check_enabled),
        summary.settings.import_days,
        on_off(summary.settings.import_images)
    ));

    if !summary.top_categories.is_empty() {
        report.push_str(RULE);
        report.push_str("LISTINGS BY CATEGORY\n");
        report.push_str(RULE);
        report.push('\n');

        let width = summary
            .top_categories
            .iter()
            .map(|c| c.name.chars().count())
            .max()
            .unwrap_or(0);
        for category in &summary.top_categories {
            report.push_str(&format!(
                "  {:<width$}  {}\n",
                category.name,
                category.listings,
                width = width
            ));
        }
        report.push('\n');
    }

    report.push_str(RULE);
    report.push_str("RECENT RUNS\n");
    report.push_str(RULE);
    report.push('\n');

    if summary.recent_runs.is_empty() {
        report.push_str("  (no runs yet)\n");
    }
    for run in &summary.recent_runs {
        report.push_str(&format!(
            "  {}  {:<8}  {:<9}  {:>5} imported  {}\n",
            format_timestamp(run.start_time),
            run.kind,
            run.status,
            run.items_imported,
            run.base_url
        ));
        if let Some(ref error) = run.error {
            report.push_str(&format!("      error: {}\n", error));
        }
    }
    report.push('\n');

    report
}

pub fn generate_json_report(summary: &CatalogSummary) -> Result<String> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Marketsweep",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": Utc::now().to_rfc3339(),
                "format": "json"
            },
            "catalog": summary,
        }
    });

    Ok(serde_json::to_string_pretty(&json_report)?)
}

pub fn generate_markdown_report(summary: &CatalogSummary) -> String {
    let mut report = String::new();

    report.push_str("# Marketsweep Catalog Status\n\n");
    report.push_str("| Metric | Value |\n|---|---|\n");
    report.push_str(&format!("| Categories | {} |\n", summary.total_categories));
    report.push_str(&format!("| Top-level categories | {} |\n", summary.top_level_categories));
    report.push_str(&format!("| Listings | {} |\n", summary.total_listings));
    report.push_str(&format!(
        "| Duplicate check | {} |\n",
        on_off(summary.settings.duplicate_check_enabled)
    ));
    report.push_str(&format!("| Import window | {} day(s) |\n", summary.settings.import_days));
    report.push_str(&format!("| Images | {} |\n\n", on_off(summary.settings.import_images)));

    if !summary.top_categories.is_empty() {
        report.push_str("## Listings by category\n\n| Category | Listings |\n|---|---|\n");
        for category in &summary.top_categories {
            report.push_str(&format!(
                "| {} | {} |\n",
                escape_markdown_cell(&category.name),
                category.listings
            ));
        }
        report.push('\n');
    }

    report.push_str("## Recent runs\n\n");
    if summary.recent_runs.is_empty() {
        report.push_str("_No runs yet._\n");
        return report;
    }

    report.push_str("| Started | Kind | Status | Imported | Source |\n|---|---|---|---|---|\n");
    for run in &summary.recent_runs {
        report.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            format_timestamp(run.start_time),
            run.kind,
            run.status,
            run.items_imported,
            escape_markdown_cell(&run.base_url)
        ));
    }

    report
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn escape_markdown_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

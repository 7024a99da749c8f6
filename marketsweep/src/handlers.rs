use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use marketsweep_core::data::Database;
use marketsweep_core::import::{
    ImportConfig, ImportJob, Importer, ProgressCallback, TaxonomyScope,
};
use marketsweep_core::model::{ImportSettings, RunResult};
use marketsweep_core::report::{ReportFormat, gather_catalog_summary, render_report, save_report};
use marketsweep_core::storage::FsBlobStore;
use marketsweep_scanner::HttpFetcher;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use url::Url;

pub const DEFAULT_DATA_DIR: &str = "~/.config/marketsweep/";
pub const DEFAULT_BASE_URL: &str = "https://jiji.ng";
pub const DATABASE_FILE: &str = "catalog.db";
pub const MEDIA_DIR: &str = "media";

/// Layout of the marketsweep data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Builds the layout from a user-supplied path, expanding `~`.
    pub fn from_arg(raw: &str) -> Self {
        Self::new(shellexpand::tilde(raw).into_owned())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn media_path(&self) -> PathBuf {
        self.root.join(MEDIA_DIR)
    }

    pub fn open_database(&self) -> Result<Database> {
        let path = self.database_path();
        if !Database::exists(&path) {
            bail!(
                "No catalog database at {}. Run `marketsweep init` first.",
                path.display()
            );
        }
        Database::new(&path).with_context(|| format!("Failed to open database at {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub database_path: PathBuf,
    pub media_path: PathBuf,
    /// A database was created by this call.
    pub created: bool,
    /// An existing database was dropped first.
    pub replaced: bool,
}

/// Creates the data directory, media directory and catalog database. An
/// existing database is kept unless `force` is set.
pub fn initialize_data_dir(dir: &DataDir, force: bool) -> Result<InitOutcome> {
    fs::create_dir_all(dir.root())
        .with_context(|| format!("Failed to create {}", dir.root().display()))?;

    let media_path = dir.media_path();
    fs::create_dir_all(&media_path)
        .with_context(|| format!("Failed to create {}", media_path.display()))?;

    let database_path = dir.database_path();
    let existed = Database::exists(&database_path);
    let replaced = existed && force;
    if replaced {
        Database::drop(&database_path)
            .with_context(|| format!("Failed to remove {}", database_path.display()))?;
    }

    let created = !existed || replaced;
    if created {
        Database::new(&database_path)
            .with_context(|| format!("Failed to create database at {}", database_path.display()))?;
    }

    Ok(InitOutcome {
        database_path,
        media_path,
        created,
        replaced,
    })
}

/// Overlays the given changes on `current`.
pub fn apply_settings_changes(
    current: ImportSettings,
    duplicate_check: Option<bool>,
    import_days: Option<u32>,
    import_images: Option<bool>,
) -> ImportSettings {
    ImportSettings {
        duplicate_check_enabled: duplicate_check.unwrap_or(current.duplicate_check_enabled),
        import_days: import_days.unwrap_or(current.import_days),
        import_images: import_images.unwrap_or(current.import_images),
    }
}

/// Runs one import job over HTTP and records it in `import_runs`.
pub async fn run_import(
    db: &Database,
    media_root: &Path,
    job: &ImportJob,
    config: ImportConfig,
    progress: Option<ProgressCallback>,
) -> Result<RunResult> {
    let fetcher = HttpFetcher::with_options(config.request_timeout.as_secs(), &config.user_agent)?;
    let run_id = db.begin_run(job.kind(), job.base_url())?;

    let mut importer = Importer::new(fetcher, db, FsBlobStore::new(media_root), config);
    if let Some(callback) = progress {
        importer = importer.with_progress_callback(callback);
    }

    match job.run(&importer).await {
        Ok(result) => {
            db.complete_run(&run_id, &result)?;
            Ok(result)
        }
        Err(e) => {
            if let Err(record_error) = db.fail_run(&run_id, &e.to_string()) {
                error!(run_id, error = %record_error, "Failed to record run failure");
            }
            Err(e.into())
        }
    }
}

// Helpers for the command handlers

fn data_dir_from(args: &ArgMatches) -> DataDir {
    let raw = args
        .get_one::<String>("data-dir")
        .map(String::as_str)
        .unwrap_or(DEFAULT_DATA_DIR);
    DataDir::from_arg(raw)
}

fn base_url_from(args: &ArgMatches) -> String {
    args.get_one::<Url>("url")
        .map(|url| url.to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

fn on_off(flag: bool) -> colored::ColoredString {
    if flag { "on".green() } else { "off".yellow() }
}

fn print_settings(settings: &ImportSettings) {
    println!("{}", "IMPORT SETTINGS".bright_blue().bold());
    println!("  Duplicate check:  {}", on_off(settings.duplicate_check_enabled));
    println!("  Import window:    {} day(s)", settings.import_days);
    println!("  Import images:    {}", on_off(settings.import_images));
}

fn start_spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.to_string());
    Ok(spinner)
}

fn spinner_callback(spinner: &ProgressBar) -> ProgressCallback {
    let spinner = spinner.clone();
    Arc::new(move |message: String| spinner.set_message(message))
}

fn print_run_result(result: &RunResult) {
    println!();
    println!("📊 Summary:");
    println!("  Imported:       {}", result.items_imported.to_string().green().bold());
    println!("  Seen:           {}", result.items_seen);
    println!("  Skipped:        {}", result.items_skipped);
    println!("  Pages fetched:  {}", result.pages_fetched);
    if let Some(reason) = result.stop_reason {
        println!("  Stopped:        {}", reason.to_string().cyan());
    }
    println!();
}

async fn run_with_spinner(dir: &DataDir, db: &Database, job: ImportJob, config: ImportConfig) -> Result<()> {
    let spinner = start_spinner("Fetching...")?;
    let outcome = run_import(
        db,
        &dir.media_path(),
        &job,
        config,
        Some(spinner_callback(&spinner)),
    )
    .await;
    spinner.finish_and_clear();

    let result = outcome?;
    println!("{} Import complete!", "✓".green().bold());
    print_run_result(&result);
    Ok(())
}

// Command handlers

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  MARKETSWEEP INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let dir = match args.get_one::<String>("PATH") {
        Some(path) => DataDir::from_arg(path),
        None => data_dir_from(args),
    };
    let mut force = args.get_flag("force");

    println!(
        "{} Target: {}",
        "→".blue(),
        dir.root().display().to_string().bright_white()
    );
    println!();

    let database_path = dir.database_path();
    if Database::exists(&database_path) && !force {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!("Catalog database already exists at:");
        println!(
            "  {} {}",
            "•".yellow(),
            database_path.display().to_string().bright_white()
        );
        println!();

        let response = print_prompt("Would you like to overwrite it? [y/N]:")?;
        println!();

        if response == "y" || response == "yes" {
            force = true;
        } else {
            println!("{} Keeping existing database", "→".blue());
            println!();
        }
    }

    let outcome = initialize_data_dir(&dir, force)?;
    if outcome.replaced {
        println!("{} Existing database removed", "✓".green().bold());
    }

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Data directory: {}",
        "✓".green().bold(),
        dir.root().display().to_string().bright_white()
    );
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        outcome.database_path.display().to_string().bright_white()
    );
    println!(
        "{} Media: {}",
        "✓".green().bold(),
        outcome.media_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

pub async fn handle_import_categories(args: &ArgMatches) -> Result<()> {
    let dir = data_dir_from(args);
    let db = dir.open_database()?;
    let scope = if args.get_flag("farm") {
        TaxonomyScope::Farm
    } else {
        TaxonomyScope::General
    };
    let job = ImportJob::Taxonomy {
        base_url: base_url_from(args),
        scope,
    };

    println!(
        "\n🗂  Importing {} categories from {}\n",
        scope.as_str(),
        job.base_url().bright_white()
    );

    run_with_spinner(&dir, &db, job, ImportConfig::default()).await
}

pub async fn handle_import_listings(args: &ArgMatches) -> Result<()> {
    let dir = data_dir_from(args);
    let db = dir.open_database()?;
    let settings = db.load_settings()?;

    let window_days = args
        .get_one::<u32>("days")
        .copied()
        .unwrap_or(settings.import_days);
    let mut config = ImportConfig::default();
    if let Some(max_pages) = args.get_one::<u32>("max-pages") {
        config.max_pages = *max_pages;
    }

    println!(
        "\n🛒 Importing listings from the last {} day(s) of {}",
        window_days,
        base_url_from(args).bright_white()
    );
    println!("Max pages: {}", config.max_pages);
    println!(
        "Duplicate check: {}, images: {}\n",
        on_off(settings.duplicate_check_enabled),
        on_off(settings.import_images)
    );

    let job = ImportJob::RecentListings {
        base_url: base_url_from(args),
        window_days,
        settings,
    };
    run_with_spinner(&dir, &db, job, config).await
}

pub fn handle_settings_show(args: &ArgMatches) -> Result<()> {
    let db = data_dir_from(args).open_database()?;
    let settings = db.load_settings()?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    print_settings(&settings);
    Ok(())
}

pub fn handle_settings_set(args: &ArgMatches) -> Result<()> {
    let duplicate_check = args.get_one::<bool>("duplicate-check").copied();
    let import_days = args.get_one::<u32>("days").copied();
    let import_images = args.get_one::<bool>("images").copied();
    if duplicate_check.is_none() && import_days.is_none() && import_images.is_none() {
        bail!("Nothing to change. Pass --duplicate-check, --days or --images.");
    }

    let db = data_dir_from(args).open_database()?;
    let updated = apply_settings_changes(db.load_settings()?, duplicate_check, import_days, import_images);
    db.save_settings(&updated)?;

    println!("{} Settings saved", "✓".green().bold());
    println!();
    print_settings(&updated);
    Ok(())
}

pub fn handle_status(args: &ArgMatches) -> Result<()> {
    let db = data_dir_from(args).open_database()?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);

    let summary = gather_catalog_summary(&db)?;
    let report = render_report(&summary, format)?;

    match args.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&report, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", report),
    }
    Ok(())
}

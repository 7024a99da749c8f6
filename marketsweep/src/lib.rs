// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export the pieces tests and schedulers drive directly
pub use handlers::{
    DataDir, InitOutcome, apply_settings_changes, initialize_data_dir, run_import,
};

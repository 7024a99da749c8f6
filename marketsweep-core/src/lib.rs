use colored::Colorize;

pub mod data;
pub mod dedup;
pub mod error;
pub mod import;
pub mod model;
pub mod report;
pub mod repository;
pub mod resolve;
pub mod storage;

pub use error::{ImportError, Result};

const BANNER: &str = r#"
  __  __            _        _
 |  \/  | __ _ _ __| | _____| |_ _____      _____  ___ _ __
 | |\/| |/ _` | '__| |/ / _ \ __/ __\ \ /\ / / _ \/ _ \ '_ \
 | |  | | (_| | |  |   <  __/ |_\__ \\ V  V /  __/  __/ |_) |
 |_|  |_|\__,_|_|  |_|\_\___|\__|___/ \_/\_/ \___|\___| .__/
                                                      |_|
"#;

pub fn print_banner() {
    println!("{}", BANNER.bright_cyan());
    println!(
        "  {} {}\n",
        "marketplace catalog importer".dimmed(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

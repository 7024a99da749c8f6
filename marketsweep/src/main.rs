use colored::Colorize;
use commands::command_argument_builder;
use marketsweep::handlers::{
    handle_import_categories, handle_import_listings, handle_init, handle_settings_set,
    handle_settings_show, handle_status,
};
use marketsweep_core::print_banner;
use tracing::Level;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_flag("verbose");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let outcome = match chosen_command.subcommand() {
        // No subcommand provided, just show the banner
        None => return,
        Some(("init", primary_command)) => handle_init(primary_command),
        Some(("import-categories", primary_command)) => {
            handle_import_categories(primary_command).await
        }
        Some(("import-listings", primary_command)) => handle_import_listings(primary_command).await,
        Some(("settings", primary_command)) => match primary_command.subcommand() {
            Some(("show", secondary_command)) => handle_settings_show(secondary_command),
            Some(("set", secondary_command)) => handle_settings_set(secondary_command),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("status", primary_command)) => handle_status(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    // Non-zero exit lets an external scheduler retry the run
    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

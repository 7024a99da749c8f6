use crate::CLAP_STYLING;
use clap::{arg, command};
use marketsweep::handlers::{DEFAULT_BASE_URL, DEFAULT_DATA_DIR};
use marketsweep_core::model::{MAX_IMPORT_DAYS, MIN_IMPORT_DAYS};
use url::Url;

fn url_arg() -> clap::Arg {
    arg!(-u --"url" <URL>)
        .required(false)
        .help("Base URL of the marketplace")
        .value_parser(clap::value_parser!(Url))
        .default_value(DEFAULT_BASE_URL)
}

fn days_arg() -> clap::Arg {
    arg!(-d --"days" <DAYS>)
        .required(false)
        .value_parser(clap::value_parser!(u32).range((MIN_IMPORT_DAYS as i64)..=(MAX_IMPORT_DAYS as i64)))
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("marketsweep")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("marketsweep")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log per-request detail to stderr")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(--"data-dir" <PATH>)
                .required(false)
                .help("Directory holding the catalog database and media")
                .default_value(DEFAULT_DATA_DIR)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the marketsweep data directory and catalog database")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location of the data directory (default: --data-dir)"),
                )
                .arg(
                    arg!(-f - -"force")
                        .help("Overwrites any existing catalog database without asking.")
                        .required(false),
                ),
        )
        .subcommand(
            command!("import-categories")
                .about("Imports the marketplace category tree into the catalog")
                .arg(url_arg())
                .arg(
                    arg!(--"farm")
                        .required(false)
                        .help(
                            "Only import farm and agriculture categories, nesting matching \
                        top-level categories under them",
                        )
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("import-listings")
                .about("Imports recently posted listings into the catalog")
                .arg(url_arg())
                .arg(days_arg().help("Recency window in days (default: from settings)"))
                .arg(
                    arg!(-p --"max-pages" <PAGES>)
                        .required(false)
                        .help("Maximum number of result pages to fetch")
                        .value_parser(clap::value_parser!(u32).range(1..)),
                ),
        )
        .subcommand(
            command!("settings")
                .about("Show or change import settings")
                .subcommand_required(true)
                .subcommand(
                    command!("show").about("Show the current import settings").arg(
                        arg!(--"json")
                            .required(false)
                            .help("Print the settings as JSON")
                            .action(clap::ArgAction::SetTrue),
                    ),
                )
                .subcommand(
                    command!("set")
                        .about("Change one or more import settings")
                        .arg(
                            arg!(--"duplicate-check" <BOOL>)
                                .required(false)
                                .help("Skip listings already in the catalog (true/false)")
                                .value_parser(clap::builder::BoolishValueParser::new()),
                        )
                        .arg(days_arg().help("Default recency window in days"))
                        .arg(
                            arg!(--"images" <BOOL>)
                                .required(false)
                                .help("Download the primary image of each listing (true/false)")
                                .value_parser(clap::builder::BoolishValueParser::new()),
                        ),
                ),
        )
        .subcommand(
            command!("status")
                .about("Summarizes the catalog and the most recent import runs")
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown")
                        .value_parser(["text", "json", "markdown"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}

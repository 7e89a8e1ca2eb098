mod api;
mod builder;
mod categories;
mod classifier;
mod cli;
mod db;
mod error;
mod extractor;
mod fmt;
mod importer;
mod models;
mod overlay;
mod session;
mod session_store;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{AccountsCommands, Cli, Commands};
use settings::{load_settings, Settings};

/// Diagnostics go to stderr so JSON on stdout stays machine-readable.
fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_env("TALLY_LOG")
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&load_settings());

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                account_type,
                institution,
                number,
                balance,
            } => cli::accounts::add(
                &name,
                &account_type,
                institution.as_deref(),
                number.as_deref(),
                &balance,
            ),
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::UploadStatement {
            file,
            account_id,
            json,
        } => cli::upload::run(&file, account_id, json),
        Commands::ImportTransactions { payload } => cli::import_transactions::run(payload.as_deref()),
        Commands::Review(args) => cli::review::run(&args),
        Commands::Categories => cli::categories::run(),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

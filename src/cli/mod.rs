pub mod accounts;
pub mod categories;
pub mod import_transactions;
pub mod init;
pub mod review;
pub mod status;
pub mod upload;

use clap::{Args, Parser, Subcommand};

use crate::db::{ensure_user, Ledger};
use crate::error::{Result, TallyError};
use crate::settings::{load_settings, Settings};

#[derive(Parser)]
#[command(name = "tally", about = "Turn bank statement PDFs into reviewed ledger transactions.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write settings and create the ledger.
    Init {
        /// Path for tally data (default: ~/Documents/tally)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Parse a statement PDF into transaction candidates for review.
    UploadStatement {
        /// Path to the statement PDF
        file: String,
        /// Account the statement belongs to (echoed back for the import step)
        #[arg(long = "account-id")]
        account_id: Option<i64>,
        /// Print the JSON response instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Commit a reviewed selection: `{ transactions, updateBalance }` JSON.
    ImportTransactions {
        /// Payload file, or `-` / omitted for stdin
        payload: Option<String>,
    },
    /// Select and edit candidates of an uploaded statement.
    Review(ReviewArgs),
    /// Show the category vocabulary and inference keywords.
    Categories,
    /// Show settings, ledger location and counts.
    Status,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'Everyday Checking'
        name: String,
        /// Account type: checking, savings, credit_card
        #[arg(long = "type", default_value = "checking")]
        account_type: String,
        /// Institution name
        #[arg(long)]
        institution: Option<String>,
        /// Account number (stored masked to the last four digits)
        #[arg(long)]
        number: Option<String>,
        /// Current balance
        #[arg(long, default_value = "0")]
        balance: String,
    },
    /// List accounts.
    List,
}

#[derive(Args)]
pub struct ReviewArgs {
    /// Session token printed by upload-statement
    pub token: String,
    /// Candidate indices to leave out, e.g. 1,3
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<usize>,
    /// Import only these candidate indices
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<usize>,
    /// Flip the selection of these candidate indices, applied after --only and --exclude
    #[arg(long, value_delimiter = ',')]
    pub toggle: Vec<usize>,
    /// Field override, INDEX:FIELD=VALUE (repeatable), e.g. 2:category=Dining
    #[arg(long = "set")]
    pub sets: Vec<String>,
    /// Account to import into
    #[arg(long = "account-id")]
    pub account_id: Option<i64>,
    /// Record transactions without adjusting the account balance
    #[arg(long = "no-balance")]
    pub no_balance: bool,
    /// Show the selection as a table on stderr
    #[arg(long)]
    pub preview: bool,
    /// Import the selection now instead of printing the payload
    #[arg(long)]
    pub commit: bool,
}

/// Settings plus the ledger and the acting user, for commands that write.
pub(crate) struct Context {
    pub settings: Settings,
    pub ledger: Ledger,
    pub user_id: i64,
}

pub(crate) fn context() -> Result<Context> {
    let settings = load_settings();
    let ledger = Ledger::in_data_dir(&settings.data_path());
    if !ledger.exists() {
        return Err(TallyError::NotInitialized(ledger.path().to_path_buf()));
    }
    let conn = ledger.connect()?;
    let user_id = ensure_user(&conn, &settings.user_name)?;
    Ok(Context {
        settings,
        ledger,
        user_id,
    })
}

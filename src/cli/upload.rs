use std::path::Path;

use chrono::Local;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::api::UploadResponse;
use crate::builder::signed_amount;
use crate::cli::context;
use crate::db::get_account;
use crate::error::{Result, TallyError};
use crate::extractor::validate_upload;
use crate::fmt::money;
use crate::models::{Confidence, Direction};
use crate::session::{parse_statement, ParseOptions};
use crate::session_store::SessionStore;
use crate::settings::load_settings;

pub fn run(file: &str, account_id: Option<i64>, json: bool) -> Result<()> {
    let settings = load_settings();
    let path = Path::new(file);
    let bytes = std::fs::read(path)?;
    let filename = path.file_name().and_then(|n| n.to_str());
    validate_upload(filename, &bytes)?;

    if let Some(id) = account_id {
        let ctx = context()?;
        let conn = ctx.ledger.connect()?;
        let owned = get_account(&conn, id)?.is_some_and(|a| a.user_id == ctx.user_id);
        if !owned {
            return Err(TallyError::ForbiddenAccount(id));
        }
    }

    let opts = ParseOptions {
        reference_date: Local::now().date_naive(),
        budget: settings.parse_budget(),
    };
    let session = parse_statement(&bytes, &opts)?;
    let store = SessionStore::new(&settings.data_path(), settings.session_ttl());
    let token = store.put(&session)?;
    let response = UploadResponse::new(&session, Some(token), account_id);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_summary(&response);
    }
    Ok(())
}

fn print_summary(response: &UploadResponse) {
    let meta = &response.metadata;
    if let Some(name) = &meta.account_name {
        println!("Account:   {name}");
    }
    if let Some(number) = &meta.account_number {
        println!("Number:    {number}");
    }
    if let (Some(start), Some(end)) = (meta.period_start, meta.period_end) {
        println!("Period:    {start} to {end}");
    }
    if let Some(opening) = meta.opening_balance {
        println!("Opening:   {}", money(opening));
    }
    if let Some(closing) = meta.closing_balance {
        println!("Closing:   {}", money(closing));
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Date", "Merchant", "Category", "Amount", ""]);
    for c in &response.transactions {
        let amount = match c.direction {
            Direction::In => money(signed_amount(c)).green().to_string(),
            Direction::Out => money(signed_amount(c)).red().to_string(),
        };
        let flag = match c.confidence {
            Confidence::Low => "?",
            Confidence::High => "",
        };
        table.add_row(vec![
            Cell::new(c.index),
            Cell::new(c.transaction_date),
            Cell::new(c.merchant.as_deref().unwrap_or("")),
            Cell::new(c.category),
            Cell::new(amount),
            Cell::new(flag),
        ]);
    }
    println!("\n{table}");
    println!(
        "{} of {} lines parsed into {} transactions",
        response.lines_parsed, response.lines_seen, response.transaction_count
    );
    if let Some(warning) = &response.warning {
        println!("{}", warning.yellow());
    }
    println!("{}", response.disclaimer.dimmed());
    if let Some(token) = &response.session_token {
        println!("\nReview with: tally review {}", token.bold());
    }
}

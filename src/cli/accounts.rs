use std::str::FromStr;

use comfy_table::{Cell, Table};
use rust_decimal::Decimal;

use crate::cli::context;
use crate::db::{add_account, list_accounts, NewAccount};
use crate::error::{Result, TallyError};
use crate::fmt::money;

/// Keep only the last four digits of whatever the user typed.
fn mask_number(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    Some(format!("****{tail}"))
}

pub fn add(
    name: &str,
    account_type: &str,
    institution: Option<&str>,
    number: Option<&str>,
    balance: &str,
) -> Result<()> {
    let ctx = context()?;
    let balance = Decimal::from_str(&balance.replace(['$', ','], ""))
        .map_err(|_| TallyError::invalid_field("balance", format!("not a number: {balance}")))?;
    let masked = number.and_then(mask_number);
    let conn = ctx.ledger.connect()?;
    let id = add_account(
        &conn,
        ctx.user_id,
        &NewAccount {
            name,
            account_type,
            institution,
            account_number: masked.as_deref(),
            balance,
        },
    )?;
    println!("Added account {id}: {name}");
    Ok(())
}

pub fn list() -> Result<()> {
    let ctx = context()?;
    let conn = ctx.ledger.connect()?;
    let accounts = list_accounts(&conn, ctx.user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Institution", "Number", "Balance"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.account_type),
            Cell::new(account.institution.unwrap_or_default()),
            Cell::new(account.account_number.unwrap_or_default()),
            Cell::new(money(account.balance)),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}

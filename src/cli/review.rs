use comfy_table::{Cell, Table};

use crate::builder::signed_amount;
use crate::cli::{context, import_transactions::print_result, ReviewArgs};
use crate::error::{Result, TallyError};
use crate::fmt::money;
use crate::importer::{ImportRequest, Importer};
use crate::overlay::{CandidateEdit, ReviewOverlay};
use crate::session_store::SessionStore;
use crate::settings::load_settings;

/// `INDEX:FIELD=VALUE`
pub(crate) fn parse_set(raw: &str) -> Result<(usize, &str, &str)> {
    let bad = || TallyError::invalid_field("set", format!("expected INDEX:FIELD=VALUE, got {raw:?}"));
    let (index, rest) = raw.split_once(':').ok_or_else(bad)?;
    let (field, value) = rest.split_once('=').ok_or_else(bad)?;
    let index = index.trim().parse().map_err(|_| bad())?;
    Ok((index, field.trim(), value))
}

pub fn run(args: &ReviewArgs) -> Result<()> {
    let settings = load_settings();
    let store = SessionStore::new(&settings.data_path(), settings.session_ttl());
    let session = store.get(&args.token)?;

    let mut overlay = ReviewOverlay::new(&session);
    if overlay.is_empty() {
        return Err(TallyError::EmptySelection);
    }
    if !args.only.is_empty() {
        overlay.select_none();
        for &index in &args.only {
            overlay.select(index)?;
        }
    }
    for &index in &args.exclude {
        overlay.deselect(index)?;
    }
    for &index in &args.toggle {
        overlay.toggle(index)?;
    }
    for raw in &args.sets {
        let (index, field, value) = parse_set(raw)?;
        let mut edit = CandidateEdit::default();
        edit.set(field, value)?;
        overlay.edit(index, edit)?;
    }

    if args.preview {
        print_preview(&overlay)?;
    }

    let update_balance = !args.no_balance;
    let request = ImportRequest {
        transactions: overlay.into_import_items(args.account_id, update_balance)?,
        update_balance,
    };

    if !args.commit {
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }

    let ctx = context()?;
    let result = Importer::new(&ctx.ledger, ctx.user_id)
        .with_workers(ctx.settings.workers())
        .import_transactions(&request)?;
    // A committed session cannot be imported a second time. A batch-level
    // failure above leaves it in place for another try.
    store.discard(&args.token)?;
    print_result(&result)
}

fn print_preview(overlay: &ReviewOverlay<'_>) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["#", "", "Date", "Merchant", "Category", "Amount"]);
    for index in 0..overlay.len() {
        let c = overlay.effective(index)?;
        let mark = match (overlay.is_selected(index)?, overlay.is_edited(index)) {
            (true, true) => "x*",
            (true, false) => "x",
            (false, true) => "*",
            (false, false) => "",
        };
        let amount = money(signed_amount(&c));
        table.add_row(vec![
            Cell::new(index),
            Cell::new(mark),
            Cell::new(c.transaction_date),
            Cell::new(c.merchant.unwrap_or_default()),
            Cell::new(c.category),
            Cell::new(amount),
        ]);
    }
    eprintln!("{table}");
    eprintln!("{} of {} selected", overlay.selected_count(), overlay.len());
    Ok(())
}

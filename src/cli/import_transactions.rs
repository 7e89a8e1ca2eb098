use std::io::Read;

use crate::cli::context;
use crate::error::Result;
use crate::importer::{ImportRequest, ImportResult, Importer};

fn read_payload(source: Option<&str>) -> Result<String> {
    match source {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

pub fn run(payload: Option<&str>) -> Result<()> {
    let request: ImportRequest = serde_json::from_str(&read_payload(payload)?)?;
    let ctx = context()?;
    let result = Importer::new(&ctx.ledger, ctx.user_id)
        .with_workers(ctx.settings.workers())
        .import_transactions(&request)?;
    print_result(&result)
}

pub(crate) fn print_result(result: &ImportResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::categories::Category;
use crate::db::{schema_ready, Ledger};
use crate::error::{Result, TallyError};
use crate::fmt::to_cents;
use crate::models::{Direction, TransactionCandidate};

pub const DEFAULT_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 8;
pub const MERCHANT_MAX_CHARS: usize = 100;
pub const NOTE_MAX_CHARS: usize = 255;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub transactions: Vec<ImportItem>,
    #[serde(default = "default_true")]
    pub update_balance: bool,
}

/// One transaction as the client sends it. Every field is kept as raw JSON so
/// a wrong-typed field fails only its own item; `validate` decides what is
/// acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportItem {
    #[serde(default, alias = "date")]
    pub transaction_date: Option<Value>,
    /// Number or string; strings may carry `$` and thousands commas.
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default, alias = "type")]
    pub direction: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Value>,
    /// Overrides the request-level flag for this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_balance: Option<Value>,
}

impl ImportItem {
    pub fn from_candidate(
        candidate: &TransactionCandidate,
        account_id: Option<i64>,
        update_balance: Option<bool>,
    ) -> Self {
        Self {
            transaction_date: Some(Value::from(candidate.transaction_date.format("%Y-%m-%d").to_string())),
            amount: Some(Value::from(candidate.amount.to_string())),
            direction: Some(Value::from(candidate.direction.as_str())),
            category: Some(Value::from(candidate.category.as_str())),
            merchant: candidate.merchant.clone().map(Value::from),
            note: candidate.note.clone().map(Value::from),
            account_id: account_id.map(Value::from),
            update_balance: update_balance.map(Value::from),
        }
    }
}

/// An item that passed validation and can be written as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidItem {
    pub transaction_date: NaiveDate,
    pub amount_cents: i64,
    pub direction: Direction,
    pub category: Category,
    pub merchant: Option<String>,
    pub note: Option<String>,
    pub account_id: Option<i64>,
    pub update_balance: bool,
}

impl ImportItem {
    pub fn validate(&self, default_update_balance: bool) -> Result<ValidItem> {
        let transaction_date = parse_item_date(text_field("transactionDate", &self.transaction_date)?)?;
        let amount = parse_item_amount(self.amount.as_ref())?;
        let amount_cents =
            to_cents(amount).ok_or_else(|| TallyError::invalid_field("amount", "out of range"))?;
        let direction = match text_field("direction", &self.direction)? {
            Some(raw) => Direction::parse(raw).ok_or_else(|| {
                TallyError::invalid_field("direction", format!("expected \"in\" or \"out\", got {raw:?}"))
            })?,
            None => return Err(TallyError::invalid_field("direction", "missing")),
        };
        // Anything that is not a known category name, strings or not, is `Other`.
        let category = match &self.category {
            Some(Value::String(raw)) => Category::coerce(raw),
            _ => Category::Other,
        };
        Ok(ValidItem {
            transaction_date,
            amount_cents,
            direction,
            category,
            merchant: clip(text_field("merchant", &self.merchant)?, MERCHANT_MAX_CHARS),
            note: clip(text_field("note", &self.note)?, NOTE_MAX_CHARS),
            account_id: parse_item_account(self.account_id.as_ref())?,
            update_balance: match &self.update_balance {
                None | Some(Value::Null) => default_update_balance,
                Some(Value::Bool(flag)) => *flag,
                Some(other) => {
                    return Err(TallyError::invalid_field(
                        "updateBalance",
                        format!("expected true or false, got {other}"),
                    ));
                }
            },
        })
    }
}

/// A field that must be a string when present. `null` counts as absent.
fn text_field<'v>(field: &'static str, value: &'v Option<Value>) -> Result<Option<&'v str>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(TallyError::invalid_field(field, format!("expected a string, got {other}"))),
    }
}

/// `YYYY-MM-DD`, optionally followed by a `T…` time part that is ignored.
fn parse_item_date(raw: Option<&str>) -> Result<NaiveDate> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TallyError::invalid_field("transactionDate", "missing"))?;
    let day = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| TallyError::invalid_field("transactionDate", format!("not a calendar date: {raw}")))
}

fn parse_item_amount(raw: Option<&Value>) -> Result<Decimal> {
    let text = match raw {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().replace(['$', ','], ""),
        None | Some(Value::Null) => return Err(TallyError::invalid_field("amount", "missing")),
        Some(other) => {
            return Err(TallyError::invalid_field("amount", format!("not a number: {other}")));
        }
    };
    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| TallyError::invalid_field("amount", format!("not a number: {text}")))?;
    if amount <= Decimal::ZERO {
        return Err(TallyError::invalid_field("amount", "must be greater than zero"));
    }
    if amount.normalize().scale() > 2 {
        return Err(TallyError::invalid_field("amount", "at most two decimal places"));
    }
    Ok(amount)
}

/// An integer id, or a string of digits.
fn parse_item_account(raw: Option<&Value>) -> Result<Option<i64>> {
    let id = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    match id {
        Some(id) => Ok(Some(id)),
        None => Err(TallyError::invalid_field(
            "accountId",
            format!("not an account id: {}", raw.map(Value::to_string).unwrap_or_default()),
        )),
    }
}

fn clip(value: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    InvalidTransactionField,
    ForbiddenAccount,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<TallyError> for ImportFailure {
    fn from(err: TallyError) -> Self {
        let kind = match err {
            TallyError::InvalidTransactionField { .. } => FailureKind::InvalidTransactionField,
            TallyError::ForbiddenAccount(_) => FailureKind::ForbiddenAccount,
            _ => FailureKind::Storage,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ItemStatus {
    Imported {
        #[serde(rename = "transactionId")]
        transaction_id: i64,
    },
    Failed {
        error: ImportFailure,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Position in the request's `transactions` array.
    pub index: usize,
    #[serde(flatten)]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported_count: usize,
    pub failed_count: usize,
    /// One entry per submitted item, in submission order.
    pub results: Vec<ItemOutcome>,
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

pub struct Importer<'a> {
    ledger: &'a Ledger,
    user_id: i64,
    workers: usize,
}

impl<'a> Importer<'a> {
    pub fn new(ledger: &'a Ledger, user_id: i64) -> Self {
        Self {
            ledger,
            user_id,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    /// Commit each item in its own transaction. Item failures are reported in
    /// the result; `Err` means the ledger itself was unusable and nothing was
    /// attempted.
    pub fn import_transactions(&self, request: &ImportRequest) -> Result<ImportResult> {
        let items = &request.transactions;
        if !self.ledger.exists() {
            return Err(TallyError::NotInitialized(self.ledger.path().to_path_buf()));
        }
        if items.is_empty() {
            return Ok(ImportResult::default());
        }

        let workers = self.workers.min(items.len());
        let connections = (0..workers)
            .map(|_| self.ledger.connect())
            .collect::<Result<Vec<_>>>()?;
        if let Some(first) = connections.first() {
            if !schema_ready(first)? {
                return Err(TallyError::NotInitialized(self.ledger.path().to_path_buf()));
            }
        }

        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, ItemStatus)>();
        thread::scope(|scope| {
            for mut conn in connections {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(item) = items.get(index) else { break };
                    let status = self.import_one(&mut conn, index, item, request.update_balance);
                    if tx.send((index, status)).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<ItemStatus>> = vec![None; items.len()];
        for (index, status) in rx {
            slots[index] = Some(status);
        }

        let mut result = ImportResult::default();
        for (index, slot) in slots.into_iter().enumerate() {
            let status = slot.unwrap_or_else(|| ItemStatus::Failed {
                error: ImportFailure {
                    kind: FailureKind::Storage,
                    message: "item was not processed".into(),
                },
            });
            match status {
                ItemStatus::Imported { .. } => result.imported_count += 1,
                ItemStatus::Failed { .. } => result.failed_count += 1,
            }
            result.results.push(ItemOutcome { index, status });
        }
        info!(
            imported = result.imported_count,
            failed = result.failed_count,
            "import finished"
        );
        Ok(result)
    }

    fn import_one(
        &self,
        conn: &mut Connection,
        index: usize,
        item: &ImportItem,
        default_update_balance: bool,
    ) -> ItemStatus {
        let outcome = item
            .validate(default_update_balance)
            .and_then(|valid| commit_item(conn, self.user_id, &valid));
        match outcome {
            Ok(transaction_id) => ItemStatus::Imported { transaction_id },
            Err(err) => {
                warn!(index, error = %err, "import item failed");
                ItemStatus::Failed { error: err.into() }
            }
        }
    }
}

/// Ownership check, insert, and balance adjustment under one write lock.
/// Any error rolls the item back.
pub fn commit_item(conn: &mut Connection, user_id: i64, item: &ValidItem) -> Result<i64> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(account_id) = item.account_id {
        let owner: Option<i64> = tx
            .query_row(
                "SELECT user_id FROM accounts WHERE id = ?1 AND is_active = 1",
                [account_id],
                |r| r.get(0),
            )
            .optional()?;
        if owner != Some(user_id) {
            return Err(TallyError::ForbiddenAccount(account_id));
        }
    }

    tx.execute(
        "INSERT INTO transactions (user_id, account_id, transaction_date, amount_cents, direction, category, merchant, note) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            user_id,
            item.account_id,
            item.transaction_date.format("%Y-%m-%d").to_string(),
            item.amount_cents,
            item.direction.as_str(),
            item.category.as_str(),
            item.merchant,
            item.note,
        ],
    )?;
    let transaction_id = tx.last_insert_rowid();

    if let (true, Some(account_id)) = (item.update_balance, item.account_id) {
        let delta = match item.direction {
            Direction::In => item.amount_cents,
            Direction::Out => -item.amount_cents,
        };
        tx.execute(
            "UPDATE accounts SET balance_cents = balance_cents + ?1 WHERE id = ?2",
            rusqlite::params![delta, account_id],
        )?;
    }

    tx.commit()?;
    Ok(transaction_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::checking;
    use crate::db::{add_account, ensure_user, get_account, get_connection, init_db};
    use crate::fmt::from_cents;
    use rstest::rstest;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        ledger: Ledger,
        user: i64,
        account: i64,
        foreign_account: i64,
    }

    fn fixture(balance: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.db");
        let conn = get_connection(&path).unwrap();
        init_db(&conn).unwrap();
        let user = ensure_user(&conn, "me").unwrap();
        let other = ensure_user(&conn, "other").unwrap();
        let account = add_account(&conn, user, &checking(balance)).unwrap();
        let foreign_account = add_account(&conn, other, &checking("0")).unwrap();
        Fixture {
            _dir: dir,
            ledger: Ledger::new(path),
            user,
            account,
            foreign_account,
        }
    }

    impl Fixture {
        fn balance(&self) -> Decimal {
            let conn = self.ledger.connect().unwrap();
            get_account(&conn, self.account).unwrap().unwrap().balance
        }

        fn row_count(&self) -> i64 {
            let conn = self.ledger.connect().unwrap();
            conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
                .unwrap()
        }
    }

    fn item(account_id: Option<i64>, amount: Value, direction: &str) -> ImportItem {
        ImportItem {
            transaction_date: Some("2025-01-15".into()),
            amount: Some(amount),
            direction: Some(direction.into()),
            category: Some("Groceries".into()),
            merchant: Some("WALMART #1234".into()),
            note: Some("WALMART #1234".into()),
            account_id: account_id.map(Value::from),
            update_balance: None,
        }
    }

    fn request(items: Vec<ImportItem>) -> ImportRequest {
        ImportRequest {
            transactions: items,
            update_balance: true,
        }
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_imports_and_adjusts_balance() {
        let f = fixture("1000.00");
        let importer = Importer::new(&f.ledger, f.user);
        let result = importer
            .import_transactions(&request(vec![
                item(Some(f.account), json!(45.67), "out"),
                item(Some(f.account), json!("$1,200.00"), "in"),
            ]))
            .unwrap();
        assert_eq!(result.imported_count, 2);
        assert_eq!(result.failed_count, 0);
        assert_eq!(f.balance(), d("2154.33"));
    }

    #[test]
    fn test_same_item_twice_debits_twice() {
        let f = fixture("500.00");
        let importer = Importer::new(&f.ledger, f.user);
        let req = request(vec![item(Some(f.account), json!(45.67), "out")]);
        importer.import_transactions(&req).unwrap();
        importer.import_transactions(&req).unwrap();
        assert_eq!(f.balance(), d("500.00") - d("45.67") * Decimal::TWO);
        assert_eq!(f.row_count(), 2);
    }

    #[test]
    fn test_partial_failure_keeps_other_items() {
        let f = fixture("100.00");
        let importer = Importer::new(&f.ledger, f.user).with_workers(3);
        let result = importer
            .import_transactions(&request(vec![
                item(Some(f.account), json!(10), "out"),
                item(Some(f.foreign_account), json!(20), "out"),
                item(Some(f.account), json!(30), "in"),
            ]))
            .unwrap();
        assert_eq!(result.imported_count, 2);
        assert_eq!(result.failed_count, 1);
        let indices: Vec<_> = result.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(matches!(result.results[0].status, ItemStatus::Imported { .. }));
        assert!(matches!(
            &result.results[1].status,
            ItemStatus::Failed { error } if error.kind == FailureKind::ForbiddenAccount
        ));
        assert!(matches!(result.results[2].status, ItemStatus::Imported { .. }));
        assert_eq!(f.row_count(), 2);
        assert_eq!(f.balance(), d("120.00"));

        let conn = f.ledger.connect().unwrap();
        let foreign = get_account(&conn, f.foreign_account).unwrap().unwrap();
        assert_eq!(foreign.balance, Decimal::ZERO);
    }

    #[test]
    fn test_unknown_account_is_forbidden() {
        let f = fixture("0");
        let result = Importer::new(&f.ledger, f.user)
            .import_transactions(&request(vec![item(Some(9999), json!(1), "out")]))
            .unwrap();
        assert!(matches!(
            &result.results[0].status,
            ItemStatus::Failed { error } if error.kind == FailureKind::ForbiddenAccount
        ));
        assert_eq!(f.row_count(), 0);
    }

    #[test]
    fn test_update_balance_flags() {
        let f = fixture("100.00");
        let importer = Importer::new(&f.ledger, f.user);
        let mut req = request(vec![item(Some(f.account), json!(10), "out")]);
        req.update_balance = false;
        importer.import_transactions(&req).unwrap();
        assert_eq!(f.balance(), d("100.00"));

        let mut override_item = item(Some(f.account), json!(10), "out");
        override_item.update_balance = Some(json!(true));
        req.transactions = vec![override_item];
        importer.import_transactions(&req).unwrap();
        assert_eq!(f.balance(), d("90.00"));
        assert_eq!(f.row_count(), 2);
    }

    #[test]
    fn test_item_without_account_is_recorded_without_balance() {
        let f = fixture("100.00");
        let result = Importer::new(&f.ledger, f.user)
            .import_transactions(&request(vec![item(None, json!(5), "out")]))
            .unwrap();
        assert_eq!(result.imported_count, 1);
        assert_eq!(f.balance(), d("100.00"));
    }

    #[rstest]
    #[case(json!(0), "amount")]
    #[case(json!(-5), "amount")]
    #[case(json!("12.345"), "amount")]
    #[case(json!("abc"), "amount")]
    #[case(json!(true), "amount")]
    fn test_invalid_amount(#[case] amount: Value, #[case] field: &str) {
        let err = item(None, amount, "out").validate(true).unwrap_err();
        assert!(matches!(err, TallyError::InvalidTransactionField { field: f, .. } if f == field));
    }

    #[rstest]
    #[case(Some("2025-02-30"))]
    #[case(Some("01/15/2025"))]
    #[case(Some(""))]
    #[case(None)]
    fn test_invalid_date(#[case] date: Option<&str>) {
        let mut it = item(None, json!(1), "out");
        it.transaction_date = date.map(Value::from);
        let err = it.validate(true).unwrap_err();
        assert!(matches!(
            err,
            TallyError::InvalidTransactionField { field: "transactionDate", .. }
        ));
    }

    #[test]
    fn test_time_component_is_ignored() {
        let mut it = item(None, json!(1), "out");
        it.transaction_date = Some("2025-01-15T00:00:00.000Z".into());
        let valid = it.validate(true).unwrap();
        assert_eq!(valid.transaction_date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
    }

    #[test]
    fn test_direction_must_be_in_or_out() {
        let err = item(None, json!(1), "sideways").validate(true).unwrap_err();
        assert!(matches!(err, TallyError::InvalidTransactionField { field: "direction", .. }));
        let mut missing = item(None, json!(1), "out");
        missing.direction = None;
        assert!(missing.validate(true).is_err());
    }

    #[test]
    fn test_lenient_fields() {
        let mut it = item(None, json!("1,234.50"), "OUT");
        it.category = Some("Crypto".into());
        it.merchant = Some("M".repeat(150).into());
        it.note = Some("   ".into());
        let valid = it.validate(false).unwrap();
        assert_eq!(valid.amount_cents, 123450);
        assert_eq!(valid.direction, Direction::Out);
        assert_eq!(valid.category, Category::Other);
        assert_eq!(valid.merchant.map(|m| m.chars().count()), Some(MERCHANT_MAX_CHARS));
        assert_eq!(valid.note, None);
        assert!(!valid.update_balance);
    }

    #[test]
    fn test_wire_format() {
        let raw = json!({
            "transactions": [
                {"transactionDate": "2025-01-15", "amount": 45.67, "type": "out",
                 "category": "Groceries", "merchant": "WALMART #1234"}
            ]
        });
        let req: ImportRequest = serde_json::from_value(raw).unwrap();
        assert!(req.update_balance);
        assert_eq!(req.transactions[0].direction, Some(json!("out")));
        let valid = req.transactions[0].validate(req.update_balance).unwrap();
        assert_eq!(from_cents(valid.amount_cents), d("45.67"));

        let result = ImportResult {
            imported_count: 1,
            failed_count: 1,
            results: vec![
                ItemOutcome { index: 0, status: ItemStatus::Imported { transaction_id: 7 } },
                ItemOutcome {
                    index: 1,
                    status: ItemStatus::Failed {
                        error: TallyError::ForbiddenAccount(3).into(),
                    },
                },
            ],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["importedCount"], 1);
        assert_eq!(json["results"][0], json!({"index": 0, "status": "imported", "transactionId": 7}));
        assert_eq!(json["results"][1]["status"], "failed");
        assert_eq!(json["results"][1]["error"]["kind"], "ForbiddenAccount");
    }

    #[test]
    fn test_wrong_typed_item_fails_alone() {
        let f = fixture("100.00");
        let raw = json!({
            "transactions": [
                {"transactionDate": "2025-01-15", "amount": 10, "direction": "out", "accountId": f.account},
                {"transactionDate": 20250116, "amount": 20, "direction": "out", "accountId": f.account},
                {"transactionDate": "2025-01-17", "amount": 30, "direction": "in", "accountId": f.account}
            ]
        });
        let req: ImportRequest = serde_json::from_value(raw).unwrap();
        let result = Importer::new(&f.ledger, f.user).import_transactions(&req).unwrap();
        assert_eq!(result.imported_count, 2);
        assert!(matches!(
            &result.results[1].status,
            ItemStatus::Failed { error } if error.kind == FailureKind::InvalidTransactionField
        ));
        assert_eq!(f.balance(), d("120.00"));
    }

    #[rstest]
    #[case(json!({"direction": 1}), "direction")]
    #[case(json!({"merchant": ["WALMART"]}), "merchant")]
    #[case(json!({"accountId": "checking"}), "accountId")]
    #[case(json!({"accountId": 1.5}), "accountId")]
    #[case(json!({"updateBalance": "yes"}), "updateBalance")]
    fn test_wrong_typed_field(#[case] patch: Value, #[case] field: &str) {
        let mut raw = json!({"transactionDate": "2025-01-15", "amount": 1, "direction": "out"});
        for (key, value) in patch.as_object().unwrap() {
            raw[key] = value.clone();
        }
        let it: ImportItem = serde_json::from_value(raw).unwrap();
        let err = it.validate(true).unwrap_err();
        assert!(matches!(err, TallyError::InvalidTransactionField { field: f, .. } if f == field));
    }

    #[test]
    fn test_lenient_wire_types() {
        let raw = json!({"transactionDate": "2025-01-15", "amount": 1, "direction": "in",
                         "category": 7, "accountId": "12", "note": null});
        let it: ImportItem = serde_json::from_value(raw).unwrap();
        let valid = it.validate(true).unwrap();
        assert_eq!(valid.category, Category::Other);
        assert_eq!(valid.account_id, Some(12));
        assert_eq!(valid.note, None);
    }

    #[test]
    fn test_many_items_across_workers_keep_order_and_total() {
        let f = fixture("0");
        let items: Vec<ImportItem> = (1..=40)
            .map(|i| item(Some(f.account), json!(i), if i % 2 == 0 { "in" } else { "out" }))
            .collect();
        let result = Importer::new(&f.ledger, f.user)
            .with_workers(8)
            .import_transactions(&request(items))
            .unwrap();
        assert_eq!(result.imported_count, 40);
        let indices: Vec<_> = result.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..40).collect::<Vec<_>>());
        // Evens in, odds out: sum over 1..=40 of (+i for even, -i for odd) = 20.
        assert_eq!(f.balance(), d("20"));
    }

    #[test]
    fn test_uninitialized_ledger_is_a_batch_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("missing.db"));
        let err = Importer::new(&ledger, 1)
            .import_transactions(&request(vec![item(None, json!(1), "out")]))
            .unwrap_err();
        assert!(matches!(err, TallyError::NotInitialized(_)));

        let empty = dir.path().join("empty.db");
        get_connection(&empty).unwrap();
        let err = Importer::new(&Ledger::new(empty), 1)
            .import_transactions(&request(vec![item(None, json!(1), "out")]))
            .unwrap_err();
        assert!(matches!(err, TallyError::NotInitialized(_)));
    }

    #[test]
    fn test_from_candidate_roundtrips_through_validation() {
        let candidate = TransactionCandidate {
            index: 0,
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            amount: d("45.67"),
            direction: Direction::Out,
            category: Category::PersonalCare,
            merchant: Some("SALON".into()),
            note: None,
            confidence: crate::models::Confidence::High,
            running_balance: None,
        };
        let valid = ImportItem::from_candidate(&candidate, Some(3), None)
            .validate(true)
            .unwrap();
        assert_eq!(valid.amount_cents, 4567);
        assert_eq!(valid.category, Category::PersonalCare);
        assert_eq!(valid.account_id, Some(3));
    }
}

//! Turns a classified row into a `TransactionCandidate`.

use rust_decimal::Decimal;
use tracing::debug;

use crate::categories::{contains_word, infer_category};
use crate::classifier::{parse_amount, AmountSign, RowShape, YearResolver};
use crate::models::{Confidence, Direction, TransactionCandidate};

// Bare "PAYMENT" stays out of DEBIT_KEYWORDS so "PAYMENT RECEIVED" reads as a credit.
const DEBIT_KEYWORDS: &[&str] = &[
    "DEBIT",
    "WITHDRAWAL",
    "PURCHASE",
    "PAYMENT TO",
    "AUTOPAY",
    "CARD PAYMENT",
    "BILL PAY",
    "TRANSFER TO",
    "CHECK #",
    "ATM",
    "FEE",
];

const CREDIT_KEYWORDS: &[&str] = &[
    "PAYMENT RECEIVED",
    "PAYMENT - THANK YOU",
    "DEPOSIT",
    "CREDIT",
    "REFUND",
    "DIRECT DEP",
    "INTEREST PAID",
    "INTEREST EARNED",
    "PAYROLL",
    "TRANSFER FROM",
    "REVERSAL",
];

// Longest first so "DEBIT CARD PURCHASE" is stripped whole.
const MERCHANT_PREFIXES: &[&str] = &[
    "PURCHASE AUTHORIZED ON",
    "DEBIT CARD PURCHASE",
    "RECURRING PAYMENT",
    "POS PURCHASE",
    "DEPOSIT FROM",
    "TRANSFER FROM",
    "TRANSFER TO",
    "PAYMENT TO",
    "CHECKCARD",
    "ACH DEBIT",
    "ACH CREDIT",
    "POS DEBIT",
    "WITHDRAWAL",
    "PURCHASE",
    "DEBIT",
    "POS",
    "FROM",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    /// No amount token passed the strict currency parse.
    InvalidAmount(String),
    /// The date token names no real calendar day.
    InvalidDate,
}

/// Build one candidate. `continuation` holds description lines that followed
/// the row; they are appended to the description in order.
pub fn build_candidate(
    index: usize,
    row: &RowShape,
    continuation: &[&str],
    years: &YearResolver,
) -> Result<TransactionCandidate, RowRejection> {
    let (amount_token, balance_token) = split_amount_columns(&row.amounts);
    let amount = parse_amount(amount_token)
        .filter(|a| !a.magnitude.is_zero())
        .ok_or_else(|| RowRejection::InvalidAmount(amount_token.to_string()))?;
    let running_balance = balance_token.and_then(parse_amount).map(|b| b.signed());

    let transaction_date = years.resolve(&row.date).ok_or(RowRejection::InvalidDate)?;
    if row.date.year.is_none() {
        debug!(%transaction_date, "resolved yearless row date");
    }

    let description = join_description(&row.description, continuation);
    let (direction, confidence) = infer_direction(amount.sign, &description);
    let merchant = merchant_name(&row.description);

    Ok(TransactionCandidate {
        index,
        transaction_date,
        amount: amount.magnitude,
        direction,
        category: infer_category(&description),
        merchant,
        note: (!description.is_empty()).then_some(description),
        confidence,
        running_balance,
    })
}

/// With a single amount column that column is the amount. With more, the last
/// one is the running balance and the one before it the amount.
fn split_amount_columns(amounts: &[String]) -> (&str, Option<&str>) {
    match amounts {
        [] => ("", None),
        [only] => (only.as_str(), None),
        [.., amount, balance] => (amount.as_str(), Some(balance.as_str())),
    }
}

fn join_description(first: &str, continuation: &[&str]) -> String {
    std::iter::once(first)
        .chain(continuation.iter().copied())
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn infer_direction(sign: AmountSign, description: &str) -> (Direction, Confidence) {
    match sign {
        AmountSign::Negative => return (Direction::Out, Confidence::High),
        AmountSign::Positive => return (Direction::In, Confidence::High),
        AmountSign::Unsigned => {}
    }
    let upper = description.to_uppercase();
    if DEBIT_KEYWORDS.iter().any(|k| contains_word(&upper, k)) {
        (Direction::Out, Confidence::High)
    } else if CREDIT_KEYWORDS.iter().any(|k| contains_word(&upper, k)) {
        (Direction::In, Confidence::High)
    } else {
        (Direction::Out, Confidence::Low)
    }
}

/// Description with transaction-type boilerplate removed.
pub fn merchant_name(description: &str) -> Option<String> {
    let mut rest = description.trim();
    loop {
        let upper = rest.to_uppercase();
        let stripped = MERCHANT_PREFIXES.iter().find_map(|prefix| {
            let tail = upper.strip_prefix(prefix)?;
            // Whole words only: "POSTMATES" keeps its "POS".
            if tail.is_empty() || tail.starts_with(|c: char| !c.is_alphanumeric()) {
                Some(prefix.len())
            } else {
                None
            }
        });
        match stripped {
            Some(len) if rest.is_char_boundary(len) => {
                rest = rest[len..].trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == ':');
            }
            _ => break,
        }
    }
    let merchant = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    if merchant.is_empty() {
        let fallback = description.split_whitespace().collect::<Vec<_>>().join(" ");
        return (!fallback.is_empty()).then_some(fallback);
    }
    Some(merchant)
}

/// Signed amount as it affects the account: `out` is negative.
pub fn signed_amount(candidate: &TransactionCandidate) -> Decimal {
    match candidate.direction {
        Direction::In => candidate.amount,
        Direction::Out => -candidate.amount,
    }
}

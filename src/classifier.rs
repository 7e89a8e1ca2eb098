//! Line tagging for extracted statement text.
//!
//! Each non-blank line becomes one of three tags, checked in priority order:
//! account labels near the top of the document, balance/period lines anywhere,
//! date-anchored rows that carry an amount, and everything else.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::{Match, Regex};
use rust_decimal::Decimal;

/// Account labels only count within this many non-blank lines of the start.
pub const HEADER_WINDOW_LINES: usize = 40;
/// Lines after a row that may be folded into its description.
pub const MAX_CONTINUATION_LINES: usize = 2;
const MAX_CONTINUATION_LEN: usize = 60;

const NOISE_WORDS: &[&str] = &[
    "MEMBER FDIC",
    "CONTINUED",
    "STATEMENT",
    "BALANCE",
    "TOTAL",
    "PAGE ",
    "DATE",
    "DESCRIPTION",
    "AMOUNT",
    "THANK YOU",
    "CUSTOMER SERVICE",
];

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataField {
    AccountNumber(String),
    AccountName(String),
    OpeningBalance { amount: Decimal, as_of: Option<NaiveDate> },
    ClosingBalance { amount: Decimal, as_of: Option<NaiveDate> },
    StatementDate(NaiveDate),
    Period { start: NaiveDate, end: NaiveDate },
}

/// A date found at the start of a row. `year` is `None` for `MM/DD` and
/// `Mon DD` forms; those are resolved later against the statement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateToken {
    pub year: Option<i32>,
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowShape {
    pub date: DateToken,
    /// Non-amount words after the date, single-spaced.
    pub description: String,
    /// Amount-shaped tokens in line order, not yet validated.
    pub amounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineTag {
    HeaderMetadata(Vec<MetadataField>),
    TransactionRow(RowShape),
    Ignorable,
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

const MONTHS: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

fn iso_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:\s+|$)").expect("iso date regex"))
}

fn mdy_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4}|\d{2})(?:\s+|$)").expect("mdy date regex")
    })
}

fn md_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})(?:\s+|$)").expect("md date regex"))
}

fn month_name_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)^{MONTHS}\.?\s+(\d{{1,2}})(?:,?\s+(\d{{4}}))?(?:\s+|$)"))
            .expect("month name date regex")
    })
}

fn any_numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:(\d{4})-(\d{2})-(\d{2})|(\d{1,2})[/-](\d{1,2})[/-](\d{4}|\d{2}))\b")
            .expect("numeric date regex")
    })
}

fn any_month_name_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b{MONTHS}\.?\s+(\d{{1,2}}),?\s+(\d{{4}})\b"))
            .expect("month name regex")
    })
}

fn loose_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[-+]?\(?[-+]?\$?[-+]?\d[\d,.]*\.\d+\)?-?(?:CR|DR)?$").expect("loose amount regex")
    })
}

fn strict_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}$").expect("strict amount regex"))
}

fn account_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:account|acct)\.?\s*(?:number|no\.?|#)?\s*[:#]?\s*([x*\d][x*\d\s-]*\d)")
            .expect("account number regex")
    })
}

fn account_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:account\s+(?:name|holder)|customer\s+name)\s*[:\-]\s*(.{2,60})$")
            .expect("account name regex")
    })
}

fn opening_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:opening|beginning|starting|previous)\s+balance\b").expect("opening regex")
    })
}

fn closing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:closing|ending|new)\s+balance\b").expect("closing regex")
    })
}

fn statement_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bstatement\s+date\b").expect("statement date regex"))
}

fn period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:statement\s+period|for\s+the\s+period|period\s+covered|period)\b")
            .expect("period regex")
    })
}

fn through_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:from\s+.+\s+)?through\s+").expect("through regex"))
}

fn page_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:page\s+\d+(?:\s+of\s+\d+)?|\d+\s*(?:/|of)\s*\d+|\d+)$").expect("page regex")
    })
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Two-digit years pivot at 70, as `%y` does.
fn normalize_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(match raw.len() {
        2 if year < 70 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

/// Date token at the start of `line` and the remainder after it.
pub fn leading_date(line: &str) -> Option<(DateToken, &str)> {
    if let Some(c) = iso_start_re().captures(line) {
        let token = DateToken {
            year: normalize_year(&c[1]),
            month: c[2].parse().ok()?,
            day: c[3].parse().ok()?,
        };
        return Some((token, &line[c.get(0)?.end()..]));
    }
    if let Some(c) = mdy_start_re().captures(line) {
        let token = DateToken {
            year: normalize_year(&c[3]),
            month: c[1].parse().ok()?,
            day: c[2].parse().ok()?,
        };
        return Some((token, &line[c.get(0)?.end()..]));
    }
    if let Some(c) = md_start_re().captures(line) {
        let token = DateToken {
            year: None,
            month: c[1].parse().ok()?,
            day: c[2].parse().ok()?,
        };
        return Some((token, &line[c.get(0)?.end()..]));
    }
    if let Some(c) = month_name_start_re().captures(line) {
        let token = DateToken {
            year: c.get(3).and_then(|y| normalize_year(y.as_str())),
            month: month_number(&c[1])?,
            day: c[2].parse().ok()?,
        };
        return Some((token, &line[c.get(0)?.end()..]));
    }
    None
}

/// Every complete (year-bearing) calendar date in `text`, in order of appearance.
pub fn find_dates(text: &str) -> Vec<NaiveDate> {
    let mut found: Vec<(usize, NaiveDate)> = Vec::new();
    for c in any_numeric_date_re().captures_iter(text) {
        let start = c.get(0).map(|m| m.start()).unwrap_or_default();
        let date = if let Some(y) = c.get(1) {
            normalize_year(y.as_str()).and_then(|y| {
                NaiveDate::from_ymd_opt(y, c[2].parse().ok()?, c[3].parse().ok()?)
            })
        } else {
            normalize_year(&c[6]).and_then(|y| {
                NaiveDate::from_ymd_opt(y, c[4].parse().ok()?, c[5].parse().ok()?)
            })
        };
        if let Some(date) = date {
            found.push((start, date));
        }
    }
    for c in any_month_name_date_re().captures_iter(text) {
        let start = c.get(0).map(|m| m.start()).unwrap_or_default();
        let date = month_number(&c[1]).and_then(|m| {
            NaiveDate::from_ymd_opt(c[3].parse().ok()?, m, c[2].parse().ok()?)
        });
        if let Some(date) = date {
            found.push((start, date));
        }
    }
    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, date)| date).collect()
}

/// Picks a year for yearless row dates. With a known statement period the
/// year that lands closest to the period wins; otherwise the most recent
/// occurrence on or before the upload date.
#[derive(Debug, Clone, Copy)]
pub struct YearResolver {
    period: Option<(NaiveDate, NaiveDate)>,
    reference: NaiveDate,
}

impl YearResolver {
    pub fn new(period: Option<(NaiveDate, NaiveDate)>, reference: NaiveDate) -> Self {
        let period = period.map(|(a, b)| if a <= b { (a, b) } else { (b, a) });
        Self { period, reference }
    }

    pub fn resolve(&self, token: &DateToken) -> Option<NaiveDate> {
        if let Some(year) = token.year {
            return NaiveDate::from_ymd_opt(year, token.month, token.day);
        }
        match self.period {
            Some((start, end)) => (start.year() - 1..=end.year() + 1)
                .filter_map(|y| NaiveDate::from_ymd_opt(y, token.month, token.day))
                .min_by_key(|date| distance_to_period(*date, start, end)),
            None => (0..8)
                .map(|back| self.reference.year() - back)
                .filter_map(|y| NaiveDate::from_ymd_opt(y, token.month, token.day))
                .find(|date| *date <= self.reference),
        }
    }
}

fn distance_to_period(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> i64 {
    if date < start {
        (start - date).num_days()
    } else if date > end {
        (date - end).num_days()
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSign {
    /// Leading/trailing minus, parentheses, or a `DR` suffix.
    Negative,
    /// Leading plus or a `CR` suffix.
    Positive,
    Unsigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAmount {
    pub magnitude: Decimal,
    pub sign: AmountSign,
}

impl ParsedAmount {
    pub fn signed(&self) -> Decimal {
        match self.sign {
            AmountSign::Negative => -self.magnitude,
            _ => self.magnitude,
        }
    }
}

pub fn is_amount_shaped(token: &str) -> bool {
    loose_amount_re().is_match(token)
}

/// Strict currency parse: optional `$`, thousands separators in groups of
/// three, exactly two fractional digits.
pub fn parse_amount(raw: &str) -> Option<ParsedAmount> {
    let mut s: String = raw.trim().to_ascii_uppercase().replace(' ', "");
    let mut negative = false;
    let mut positive = false;

    if let Some(rest) = s.strip_suffix("CR") {
        positive = true;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_suffix("DR") {
        negative = true;
        s = rest.to_string();
    }
    if let Some(rest) = s.strip_suffix('-') {
        negative = true;
        s = rest.to_string();
    }

    let mut body = s.as_str();
    loop {
        if let Some(rest) = body.strip_prefix('-') {
            negative = true;
            body = rest;
        } else if let Some(rest) = body.strip_prefix('+') {
            positive = true;
            body = rest;
        } else if let Some(rest) = body.strip_prefix('$') {
            body = rest;
        } else if let Some(rest) = body.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
            negative = true;
            body = rest;
        } else {
            break;
        }
    }

    if (negative && positive) || !strict_amount_re().is_match(body) {
        return None;
    }
    let magnitude = Decimal::from_str(&body.replace(',', "")).ok()?;
    let sign = if negative {
        AmountSign::Negative
    } else if positive {
        AmountSign::Positive
    } else {
        AmountSign::Unsigned
    };
    Some(ParsedAmount { magnitude, sign })
}

/// Whitespace tokens with a detached `$` and `CR`/`DR` suffix glued back on.
fn tokens(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut pending_currency: Option<&str> = None;
    for word in text.split_whitespace() {
        if matches!(word, "$" | "-$" | "+$") {
            pending_currency = Some(word);
            continue;
        }
        let word = match pending_currency.take() {
            Some(prefix) => format!("{prefix}{word}"),
            None => word.to_string(),
        };
        let is_suffix = word.eq_ignore_ascii_case("CR") || word.eq_ignore_ascii_case("DR");
        if is_suffix {
            if let Some(last) = out.last_mut() {
                if is_amount_shaped(last) {
                    last.push_str(&word.to_ascii_uppercase());
                    continue;
                }
            }
        }
        out.push(word);
    }
    if let Some(prefix) = pending_currency {
        out.push(prefix.to_string());
    }
    out
}

fn first_amount(text: &str) -> Option<Decimal> {
    tokens(text)
        .iter()
        .filter(|t| is_amount_shaped(t))
        .find_map(|t| parse_amount(t))
        .map(|a| a.signed())
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn mask_account_number(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }
    Some(format!("****{}", &digits[digits.len() - 4..]))
}

fn account_label(line: &str) -> Option<MetadataField> {
    if let Some(c) = account_name_re().captures(line) {
        let name = c[1].trim().to_string();
        if !name.is_empty() {
            return Some(MetadataField::AccountName(name));
        }
    }
    let c = account_number_re().captures(line)?;
    mask_account_number(&c[1]).map(MetadataField::AccountNumber)
}

/// Text between a balance label and the next label (or end of line).
fn balance_segment<'a>(line: &'a str, label: Match<'a>, other: Option<Match<'a>>) -> &'a str {
    let end = match other {
        Some(o) if o.start() > label.end() => o.start(),
        _ => line.len(),
    };
    &line[label.end()..end]
}

fn balance_fields(line: &str) -> Vec<MetadataField> {
    let opening = opening_re().find(line);
    let closing = closing_re().find(line);

    let mut fields = Vec::new();
    if let Some(label) = opening {
        let text = balance_segment(line, label, closing);
        if let Some(amount) = first_amount(text) {
            let as_of = find_dates(text).into_iter().next();
            fields.push(MetadataField::OpeningBalance { amount, as_of });
        }
    }
    if let Some(label) = closing {
        let text = balance_segment(line, label, opening);
        if let Some(amount) = first_amount(text) {
            let as_of = find_dates(text).into_iter().next();
            fields.push(MetadataField::ClosingBalance { amount, as_of });
        }
    }
    fields
}

fn period_fields(line: &str) -> Vec<MetadataField> {
    if let Some(m) = period_re().find(line) {
        let dates = find_dates(&line[m.end()..]);
        if dates.len() >= 2 {
            return vec![MetadataField::Period {
                start: dates[0],
                end: dates[1],
            }];
        }
    }
    if through_re().is_match(line) {
        let dates = find_dates(line);
        if dates.len() >= 2 {
            return vec![MetadataField::Period {
                start: dates[0],
                end: dates[1],
            }];
        }
    }
    if let Some(m) = statement_date_re().find(line) {
        if let Some(date) = find_dates(&line[m.end()..]).into_iter().next() {
            return vec![MetadataField::StatementDate(date)];
        }
    }
    Vec::new()
}

fn row_shape(date: DateToken, rest: &str) -> Option<RowShape> {
    let mut description = Vec::new();
    let mut amounts = Vec::new();
    for token in tokens(rest) {
        if is_amount_shaped(&token) {
            amounts.push(token);
        } else {
            description.push(token);
        }
    }
    if amounts.is_empty() {
        return None;
    }
    Some(RowShape {
        date,
        description: description.join(" "),
        amounts,
    })
}

/// Tag one trimmed line. `in_header_window` is true while the line is among
/// the first `HEADER_WINDOW_LINES` non-blank lines of the document.
pub fn classify(line: &str, in_header_window: bool) -> LineTag {
    if line.is_empty() {
        return LineTag::Ignorable;
    }
    let date = leading_date(line);

    if in_header_window && date.is_none() {
        if let Some(field) = account_label(line) {
            return LineTag::HeaderMetadata(vec![field]);
        }
    }

    let balances = balance_fields(line);
    if !balances.is_empty() {
        return LineTag::HeaderMetadata(balances);
    }

    if date.is_none() {
        let period = period_fields(line);
        if !period.is_empty() {
            return LineTag::HeaderMetadata(period);
        }
    }

    if let Some((token, rest)) = date {
        if let Some(shape) = row_shape(token, rest) {
            return LineTag::TransactionRow(shape);
        }
    }
    LineTag::Ignorable
}

/// Whether an `Ignorable` line right after a row reads like the rest of that
/// row's description rather than page furniture.
pub fn looks_like_continuation(line: &str) -> bool {
    if line.is_empty() || line.chars().count() > MAX_CONTINUATION_LEN {
        return false;
    }
    if page_marker_re().is_match(line) || leading_date(line).is_some() {
        return false;
    }
    if tokens(line).iter().any(|t| is_amount_shaped(t)) {
        return false;
    }
    let upper = line.to_uppercase();
    if NOISE_WORDS.iter().any(|w| upper.contains(w)) {
        return false;
    }
    line.chars().next().is_some_and(|c| c.is_alphanumeric())
}

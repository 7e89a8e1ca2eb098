//! Review state over a parse session: which candidates are selected and which
//! fields the user changed. The session itself is never modified; the overlay
//! produces the `ImportItem` list that crosses into the importer.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::categories::Category;
use crate::error::{Result, TallyError};
use crate::importer::ImportItem;
use crate::models::{Direction, TransactionCandidate};
use crate::session::ParseSession;

/// Field overrides for one candidate. `None` keeps the parsed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateEdit {
    pub transaction_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub direction: Option<Direction>,
    pub category: Option<Category>,
    pub merchant: Option<String>,
    pub note: Option<String>,
}

impl CandidateEdit {
    /// Set one field from its textual form, as typed on the command line.
    pub fn set(&mut self, field: &str, value: &str) -> Result<()> {
        match field {
            "date" | "transactionDate" => {
                let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                    .map_err(|_| TallyError::invalid_field("transactionDate", format!("not a calendar date: {value}")))?;
                self.transaction_date = Some(date);
            }
            "amount" => {
                let amount: Decimal = value
                    .trim()
                    .replace(['$', ','], "")
                    .parse()
                    .map_err(|_| TallyError::invalid_field("amount", format!("not a number: {value}")))?;
                if amount <= Decimal::ZERO {
                    return Err(TallyError::invalid_field("amount", "must be greater than zero"));
                }
                self.amount = Some(amount);
            }
            "direction" | "type" => {
                let direction = Direction::parse(value).ok_or_else(|| {
                    TallyError::invalid_field("direction", format!("expected \"in\" or \"out\", got {value:?}"))
                })?;
                self.direction = Some(direction);
            }
            "category" => self.category = Some(Category::coerce(value)),
            "merchant" => self.merchant = Some(value.to_string()),
            "note" => self.note = Some(value.to_string()),
            other => {
                return Err(TallyError::invalid_field("field", format!("unknown field {other:?}")));
            }
        }
        Ok(())
    }

    fn merge(&mut self, later: CandidateEdit) {
        if later.transaction_date.is_some() {
            self.transaction_date = later.transaction_date;
        }
        if later.amount.is_some() {
            self.amount = later.amount;
        }
        if later.direction.is_some() {
            self.direction = later.direction;
        }
        if later.category.is_some() {
            self.category = later.category;
        }
        if later.merchant.is_some() {
            self.merchant = later.merchant;
        }
        if later.note.is_some() {
            self.note = later.note;
        }
    }

    fn apply(&self, candidate: &mut TransactionCandidate) {
        if let Some(date) = self.transaction_date {
            candidate.transaction_date = date;
        }
        if let Some(amount) = self.amount {
            candidate.amount = amount;
        }
        if let Some(direction) = self.direction {
            candidate.direction = direction;
        }
        if let Some(category) = self.category {
            candidate.category = category;
        }
        if let Some(merchant) = &self.merchant {
            candidate.merchant = Some(merchant.clone()).filter(|m| !m.trim().is_empty());
        }
        if let Some(note) = &self.note {
            candidate.note = Some(note.clone()).filter(|n| !n.trim().is_empty());
        }
    }
}

pub struct ReviewOverlay<'a> {
    session: &'a ParseSession,
    selected: Vec<bool>,
    edits: BTreeMap<usize, CandidateEdit>,
}

impl<'a> ReviewOverlay<'a> {
    /// Every candidate starts selected.
    pub fn new(session: &'a ParseSession) -> Self {
        Self {
            session,
            selected: vec![true; session.candidates.len()],
            edits: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    fn check(&self, index: usize) -> Result<()> {
        if index >= self.selected.len() {
            return Err(TallyError::CandidateIndex {
                index,
                len: self.selected.len(),
            });
        }
        Ok(())
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        self.check(index)?;
        self.selected[index] = true;
        Ok(())
    }

    pub fn deselect(&mut self, index: usize) -> Result<()> {
        self.check(index)?;
        self.selected[index] = false;
        Ok(())
    }

    /// Flip one candidate; returns whether it is now selected.
    pub fn toggle(&mut self, index: usize) -> Result<bool> {
        self.check(index)?;
        self.selected[index] = !self.selected[index];
        Ok(self.selected[index])
    }

    pub fn select_none(&mut self) {
        self.selected.iter_mut().for_each(|s| *s = false);
    }

    pub fn is_selected(&self, index: usize) -> Result<bool> {
        self.check(index)?;
        Ok(self.selected[index])
    }

    pub fn selected_count(&self) -> usize {
        self.selected.iter().filter(|s| **s).count()
    }

    pub fn edit(&mut self, index: usize, edit: CandidateEdit) -> Result<()> {
        self.check(index)?;
        self.edits.entry(index).or_default().merge(edit);
        Ok(())
    }

    pub fn is_edited(&self, index: usize) -> bool {
        self.edits.contains_key(&index)
    }

    /// The candidate as the user currently sees it.
    pub fn effective(&self, index: usize) -> Result<TransactionCandidate> {
        self.check(index)?;
        let mut candidate = self.session.candidates[index].clone();
        if let Some(edit) = self.edits.get(&index) {
            edit.apply(&mut candidate);
        }
        Ok(candidate)
    }

    /// Selected candidates, edits applied, in document order.
    pub fn into_import_items(
        self,
        account_id: Option<i64>,
        update_balance: bool,
    ) -> Result<Vec<ImportItem>> {
        if self.selected_count() == 0 {
            return Err(TallyError::EmptySelection);
        }
        (0..self.len())
            .filter(|i| self.selected[*i])
            .map(|i| {
                self.effective(i)
                    .map(|c| ImportItem::from_candidate(&c, account_id, Some(update_balance)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{parse_statement_text, ParseOptions};
    use serde_json::json;
    use std::str::FromStr;

    const TEXT: &str = "\
01/15/2025 WALMART #1234 -$45.67
01/16/2025 PAYROLL ACME 2,000.00
01/17/2025 MYSTERY SHOP 9.99";

    fn session() -> ParseSession {
        parse_statement_text(TEXT, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_all_selected_by_default() {
        let s = session();
        let overlay = ReviewOverlay::new(&s);
        assert_eq!(overlay.selected_count(), 3);
        let items = overlay.into_import_items(Some(1), true).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].account_id, Some(json!(1)));
        assert_eq!(items[0].update_balance, Some(json!(true)));
    }

    #[test]
    fn test_selection_controls() {
        let s = session();
        let mut overlay = ReviewOverlay::new(&s);
        overlay.deselect(1).unwrap();
        assert!(!overlay.is_selected(1).unwrap());
        assert!(overlay.toggle(1).unwrap());
        overlay.select_none();
        assert_eq!(overlay.selected_count(), 0);
        overlay.select(2).unwrap();
        let items = overlay.into_import_items(None, true).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].merchant, Some(json!("MYSTERY SHOP")));
    }

    #[test]
    fn test_empty_selection_is_rejected() {
        let s = session();
        let mut overlay = ReviewOverlay::new(&s);
        overlay.select_none();
        assert!(matches!(
            overlay.into_import_items(None, true),
            Err(TallyError::EmptySelection)
        ));
    }

    #[test]
    fn test_out_of_range_index() {
        let s = session();
        let mut overlay = ReviewOverlay::new(&s);
        assert!(matches!(
            overlay.select(3),
            Err(TallyError::CandidateIndex { index: 3, len: 3 })
        ));
        assert!(overlay.edit(7, CandidateEdit::default()).is_err());
    }

    #[test]
    fn test_edits_apply_without_touching_session() {
        let s = session();
        let mut overlay = ReviewOverlay::new(&s);
        let mut edit = CandidateEdit::default();
        edit.set("category", "dining").unwrap();
        edit.set("amount", "$50.00").unwrap();
        overlay.edit(2, edit).unwrap();

        let mut later = CandidateEdit::default();
        later.set("category", "Shopping").unwrap();
        later.set("type", "in").unwrap();
        overlay.edit(2, later).unwrap();

        let c = overlay.effective(2).unwrap();
        assert_eq!(c.category, Category::Shopping);
        assert_eq!(c.amount, Decimal::from_str("50.00").unwrap());
        assert_eq!(c.direction, Direction::In);
        assert!(overlay.is_edited(2));
        assert!(!overlay.is_edited(0));

        assert_eq!(s.candidates[2].category, Category::Other);
        assert_eq!(s.candidates[2].amount, Decimal::from_str("9.99").unwrap());

        let items = overlay.into_import_items(None, false).unwrap();
        assert_eq!(items[2].category, Some(json!("Shopping")));
        assert_eq!(items[2].direction, Some(json!("in")));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut edit = CandidateEdit::default();
        assert!(edit.set("amount", "-3.00").is_err());
        assert!(edit.set("date", "02/30/2025").is_err());
        assert!(edit.set("direction", "up").is_err());
        assert!(edit.set("colour", "red").is_err());
        assert_eq!(edit, CandidateEdit::default());
    }

    #[test]
    fn test_blank_merchant_edit_clears_it() {
        let s = session();
        let mut overlay = ReviewOverlay::new(&s);
        let mut edit = CandidateEdit::default();
        edit.set("merchant", "  ").unwrap();
        overlay.edit(0, edit).unwrap();
        assert_eq!(overlay.effective(0).unwrap().merchant, None);
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The ledger's category vocabulary. The import path is the only enforcer;
/// anything outside it is coerced to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Income,
    Salary,
    Groceries,
    Dining,
    Gas,
    Shopping,
    Utilities,
    Housing,
    Insurance,
    Healthcare,
    Entertainment,
    Transfer,
    Other,
    Transportation,
    Education,
    #[serde(rename = "Personal Care")]
    PersonalCare,
    Savings,
}

pub const ALL_CATEGORIES: &[Category] = &[
    Category::Income,
    Category::Salary,
    Category::Groceries,
    Category::Dining,
    Category::Gas,
    Category::Shopping,
    Category::Utilities,
    Category::Housing,
    Category::Insurance,
    Category::Healthcare,
    Category::Entertainment,
    Category::Transfer,
    Category::Other,
    Category::Transportation,
    Category::Education,
    Category::PersonalCare,
    Category::Savings,
];

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::Salary => "Salary",
            Self::Groceries => "Groceries",
            Self::Dining => "Dining",
            Self::Gas => "Gas",
            Self::Shopping => "Shopping",
            Self::Utilities => "Utilities",
            Self::Housing => "Housing",
            Self::Insurance => "Insurance",
            Self::Healthcare => "Healthcare",
            Self::Entertainment => "Entertainment",
            Self::Transfer => "Transfer",
            Self::Other => "Other",
            Self::Transportation => "Transportation",
            Self::Education => "Education",
            Self::PersonalCare => "Personal Care",
            Self::Savings => "Savings",
        }
    }

    /// Lenient mapping for client-supplied strings. Unknown names become `Other`
    /// so vocabulary growth on the client never breaks an import.
    pub fn coerce(raw: &str) -> Category {
        raw.parse().unwrap_or(Category::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ALL_CATEGORIES
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| format!("unknown category: {wanted}"))
    }
}

// Ordered: the first keyword found in the description wins, so multi-word
// keywords sit above the shorter keywords they contain (UBER EATS above UBER,
// TRANSFER TO SAVINGS above TRANSFER). Keywords match whole words only.
pub const KEYWORD_TABLE: &[(&str, Category)] = &[
    // Income
    ("PAYROLL", Category::Salary),
    ("SALARY", Category::Salary),
    ("DIRECT DEPOSIT", Category::Salary),
    ("DIRECT DEP", Category::Salary),
    ("PAYCHECK", Category::Salary),
    ("INTEREST PAID", Category::Income),
    ("INTEREST EARNED", Category::Income),
    ("DIVIDEND", Category::Income),
    ("DIVIDENDS", Category::Income),
    ("REFUND", Category::Income),
    // Money movement
    ("TRANSFER TO SAVINGS", Category::Savings),
    ("SAVINGS", Category::Savings),
    ("TRANSFER", Category::Transfer),
    ("ZELLE", Category::Transfer),
    ("VENMO", Category::Transfer),
    // Groceries
    ("WALMART", Category::Groceries),
    ("KROGER", Category::Groceries),
    ("SAFEWAY", Category::Groceries),
    ("WHOLE FOODS", Category::Groceries),
    ("TRADER JOE", Category::Groceries),
    ("ALDI", Category::Groceries),
    ("PUBLIX", Category::Groceries),
    ("COSTCO", Category::Groceries),
    ("GROCERY", Category::Groceries),
    ("GROCERIES", Category::Groceries),
    ("SUPERMARKET", Category::Groceries),
    // Dining
    ("UBER EATS", Category::Dining),
    ("DOORDASH", Category::Dining),
    ("GRUBHUB", Category::Dining),
    ("STARBUCKS", Category::Dining),
    ("MCDONALDS", Category::Dining),
    ("MCDONALD", Category::Dining),
    ("CHIPOTLE", Category::Dining),
    ("RESTAURANT", Category::Dining),
    ("COFFEE", Category::Dining),
    ("CAFE", Category::Dining),
    ("PIZZA", Category::Dining),
    // Utilities
    ("T-MOBILE", Category::Utilities),
    ("VERIZON", Category::Utilities),
    ("AT&T", Category::Utilities),
    ("COMCAST", Category::Utilities),
    ("XFINITY", Category::Utilities),
    ("ELECTRIC", Category::Utilities),
    ("WATER", Category::Utilities),
    ("INTERNET", Category::Utilities),
    ("UTILITY", Category::Utilities),
    // Gas
    ("SHELL", Category::Gas),
    ("CHEVRON", Category::Gas),
    ("EXXON", Category::Gas),
    ("MOBIL", Category::Gas),
    ("SUNOCO", Category::Gas),
    ("GAS STATION", Category::Gas),
    ("FUEL", Category::Gas),
    // Shopping
    ("AMAZON", Category::Shopping),
    ("TARGET", Category::Shopping),
    ("BEST BUY", Category::Shopping),
    ("EBAY", Category::Shopping),
    ("ETSY", Category::Shopping),
    ("HOME DEPOT", Category::Shopping),
    ("IKEA", Category::Shopping),
    // Housing
    ("MORTGAGE", Category::Housing),
    ("RENT PAYMENT", Category::Housing),
    ("APARTMENTS", Category::Housing),
    ("HOA DUES", Category::Housing),
    // Insurance
    ("INSURANCE", Category::Insurance),
    ("GEICO", Category::Insurance),
    ("STATE FARM", Category::Insurance),
    ("ALLSTATE", Category::Insurance),
    ("PROGRESSIVE", Category::Insurance),
    // Healthcare
    ("PHARMACY", Category::Healthcare),
    ("WALGREENS", Category::Healthcare),
    ("CVS", Category::Healthcare),
    ("HOSPITAL", Category::Healthcare),
    ("MEDICAL", Category::Healthcare),
    ("DENTAL", Category::Healthcare),
    ("CLINIC", Category::Healthcare),
    // Entertainment
    ("NETFLIX", Category::Entertainment),
    ("SPOTIFY", Category::Entertainment),
    ("HULU", Category::Entertainment),
    ("DISNEY PLUS", Category::Entertainment),
    ("HBO MAX", Category::Entertainment),
    ("STEAM GAMES", Category::Entertainment),
    ("CINEMA", Category::Entertainment),
    ("THEATRE", Category::Entertainment),
    // Transportation
    ("UBER", Category::Transportation),
    ("LYFT", Category::Transportation),
    ("PARKING", Category::Transportation),
    ("TRANSIT", Category::Transportation),
    ("AIRLINES", Category::Transportation),
    ("TOLL", Category::Transportation),
    // Education
    ("TUITION", Category::Education),
    ("UNIVERSITY", Category::Education),
    ("COLLEGE", Category::Education),
    ("COURSERA", Category::Education),
    ("UDEMY", Category::Education),
    // Personal care
    ("SALON", Category::PersonalCare),
    ("BARBER", Category::PersonalCare),
    ("SEPHORA", Category::PersonalCare),
];

/// Best-effort category guess; callers must present it as editable.
pub fn infer_category(description: &str) -> Category {
    let upper = description.to_uppercase();
    KEYWORD_TABLE
        .iter()
        .find(|(keyword, _)| contains_word(&upper, keyword))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Other)
}

/// `word` occurs in `haystack` with no letter or digit directly against it.
/// Edges of `word` that are punctuation (`CHECK #`) need no boundary.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    let open = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
    let check_start = word.starts_with(char::is_alphanumeric);
    let check_end = word.ends_with(char::is_alphanumeric);
    haystack.match_indices(word).any(|(at, _)| {
        (!check_start || open(haystack[..at].chars().next_back()))
            && (!check_end || open(haystack[at + word.len()..].chars().next()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_every_keyword_maps_to_its_category() {
        for (keyword, expected) in KEYWORD_TABLE {
            let description = format!("POS {} 123", keyword.to_lowercase());
            assert_eq!(
                infer_category(&description),
                *expected,
                "keyword {keyword} shadowed by an earlier entry"
            );
        }
    }

    #[test]
    fn test_keywords_are_uppercase_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for (keyword, _) in KEYWORD_TABLE {
            assert_eq!(*keyword, keyword.to_uppercase());
            assert!(seen.insert(*keyword), "duplicate keyword {keyword}");
        }
    }

    #[rstest]
    #[case("WALMART #1234", Category::Groceries)]
    #[case("Kroger Store 55", Category::Groceries)]
    #[case("SHELL OIL 5744", Category::Gas)]
    #[case("CHEVRON 0099", Category::Gas)]
    #[case("NETFLIX.COM", Category::Entertainment)]
    #[case("Spotify USA", Category::Entertainment)]
    #[case("UBER EATS ORDER", Category::Dining)]
    #[case("UBER TRIP", Category::Transportation)]
    #[case("T-MOBILE AUTOPAY", Category::Utilities)]
    #[case("ONLINE TRANSFER TO SAVINGS 8812", Category::Savings)]
    #[case("ACME CORP PAYROLL", Category::Salary)]
    #[case("MYSTERY VENDOR", Category::Other)]
    #[case("MOBILE DEPOSIT", Category::Other)]
    #[case("AUTOMOBILE CLUB", Category::Other)]
    #[case("MOBIL 4471 HOUSTON", Category::Gas)]
    #[case("DIRECT DEPOSIT ACME", Category::Salary)]
    #[case("MCDONALD'S F1234", Category::Dining)]
    #[case("COFFEE HOUSE", Category::Dining)]
    fn test_infer_category(#[case] description: &str, #[case] expected: Category) {
        assert_eq!(infer_category(description), expected);
    }

    #[rstest]
    #[case("ATM WITHDRAWAL", "ATM", true)]
    #[case("BATMAN TOYS", "ATM", false)]
    #[case("MONTHLY FEE", "FEE", true)]
    #[case("COFFEE", "FEE", false)]
    #[case("CHECK #1042", "CHECK #", true)]
    #[case("NETFLIX.COM", "NETFLIX", true)]
    #[case("", "FEE", false)]
    fn test_contains_word(#[case] haystack: &str, #[case] word: &str, #[case] expected: bool) {
        assert_eq!(contains_word(haystack, word), expected);
    }

    #[rstest]
    #[case("Groceries", Category::Groceries)]
    #[case("groceries", Category::Groceries)]
    #[case("  Personal Care ", Category::PersonalCare)]
    #[case("personal care", Category::PersonalCare)]
    #[case("Crypto", Category::Other)]
    #[case("", Category::Other)]
    fn test_coerce(#[case] raw: &str, #[case] expected: Category) {
        assert_eq!(Category::coerce(raw), expected);
    }

    #[test]
    fn test_display_matches_vocabulary() {
        for category in ALL_CATEGORIES {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), *category);
        }
        assert_eq!(ALL_CATEGORIES.len(), 17);
    }

    #[test]
    fn test_serializes_as_display_name() {
        let json = serde_json::to_string(&Category::PersonalCare).unwrap();
        assert_eq!(json, "\"Personal Care\"");
        let back: Category = serde_json::from_str("\"Gas\"").unwrap();
        assert_eq!(back, Category::Gas);
    }
}

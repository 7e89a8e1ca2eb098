use comfy_table::{Cell, Table};

use crate::categories::{ALL_CATEGORIES, KEYWORD_TABLE};
use crate::error::Result;

pub fn run() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Category", "Keywords"]);
    for category in ALL_CATEGORIES {
        let keywords: Vec<&str> = KEYWORD_TABLE
            .iter()
            .filter(|(_, c)| c == category)
            .map(|(k, _)| *k)
            .collect();
        table.add_row(vec![Cell::new(category.as_str()), Cell::new(keywords.join(", "))]);
    }
    println!("Categories\n{table}");
    println!("Descriptions matching no keyword are filed under Other.");
    Ok(())
}

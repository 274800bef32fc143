use comfy_table::{Cell, Table};

use ledger_triage::error::Result;
use ledger_triage::fmt::{amount, confidence, truncate};
use ledger_triage::reviewer::{confirm as confirm_transaction, review_queue};
use ledger_triage::settings::load_settings;

use super::open_store;

pub fn list(company: Option<String>) -> Result<()> {
    let settings = load_settings();
    let company = settings.resolve_company(company)?;
    let store = open_store(&settings)?;
    let queue = review_queue(&store, &company)?;

    if queue.is_empty() {
        println!("Nothing to review.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Description", "Amount", "Suggested", "Confidence", "Reason"]);
    for item in queue {
        table.add_row(vec![
            Cell::new(item.id),
            Cell::new(truncate(&item.description, 40)),
            Cell::new(amount(item.amount)),
            Cell::new(item.category_name.unwrap_or_default()),
            Cell::new(item.confidence.map(confidence).unwrap_or_default()),
            Cell::new(item.reason_code.unwrap_or_default()),
        ]);
    }
    println!("Needs review\n{table}");
    Ok(())
}

pub fn confirm(id: i64, category: &str, rule: Option<&str>, company: Option<String>) -> Result<()> {
    let settings = load_settings();
    let company = settings.resolve_company(company)?;
    let store = open_store(&settings)?;

    match confirm_transaction(&store, &company, id, category, rule)? {
        Some(rule_id) => println!("Confirmed transaction {id} as {category}; added rule {rule_id}"),
        None => println!("Confirmed transaction {id} as {category}"),
    }
    Ok(())
}

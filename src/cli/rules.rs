use comfy_table::{Cell, Table};

use ledger_triage::error::{CategorizeError, Result};
use ledger_triage::models::PatternKind;
use ledger_triage::scoring::breakdown;
use ledger_triage::settings::load_settings;

use super::open_store;

pub fn add(pattern: &str, category: &str, kind: &str, confidence: f64, company: Option<String>) -> Result<()> {
    let settings = load_settings();
    let company = settings.resolve_company(company)?;
    let kind: PatternKind = kind.parse()?;
    let store = open_store(&settings)?;

    let cat = store.category_by_name(&company, category)?;
    let id = store.add_rule(&company, cat.id, pattern, kind, confidence)?;
    println!("Added rule {id}: '{pattern}' ({kind}) \u{2192} {}", cat.name);
    Ok(())
}

pub fn list(company: Option<String>) -> Result<()> {
    let settings = load_settings();
    let company = settings.resolve_company(company)?;
    let store = open_store(&settings)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Kind", "Category", "Confidence", "Uses", "Base Score"]);
    for listing in store.list_rules(&company)? {
        let base = breakdown(&listing.rule).score;
        let rule = listing.rule;
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(rule.pattern),
            Cell::new(rule.kind),
            Cell::new(listing.category_name),
            Cell::new(format!("{:.2}", rule.confidence_score)),
            Cell::new(rule.usage_count),
            Cell::new(format!("{base:.1}")),
        ]);
    }
    println!("Rules for {company}\n{table}");
    Ok(())
}

pub fn delete(id: i64, company: Option<String>) -> Result<()> {
    let settings = load_settings();
    let company = settings.resolve_company(company)?;
    let store = open_store(&settings)?;

    let Some(rule) = store.rule(id)? else {
        return Err(CategorizeError::Other(format!("No rule with ID {id}")));
    };
    if !store.deactivate_rule(&company, id)? {
        return Err(CategorizeError::Other(format!(
            "Rule {id} is already inactive or belongs to another company"
        )));
    }
    println!("Deleted rule {id}: '{}'", rule.pattern);
    Ok(())
}

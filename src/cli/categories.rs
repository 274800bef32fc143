use colored::Colorize;
use comfy_table::{Cell, Table};

use ledger_triage::error::{CategorizeError, Result};
use ledger_triage::models::{AccountingType, ReportingGroup};
use ledger_triage::settings::load_settings;
use ledger_triage::store::CategoryStore;

use super::open_store;

pub fn add(name: &str, accounting_type: &str, group: &str, company: Option<String>) -> Result<()> {
    let settings = load_settings();
    let company = settings.resolve_company(company)?;
    let accounting_type: AccountingType = accounting_type.parse()?;
    let group: ReportingGroup = group.parse()?;

    let store = open_store(&settings)?;
    if !store.tenant_exists(&company)? {
        return Err(CategorizeError::TenantNotFound(company));
    }
    store.add_category(&company, name, accounting_type, group)?;
    println!("Added category: {name} ({accounting_type}, {group})");
    Ok(())
}

pub fn list(company: Option<String>) -> Result<()> {
    let settings = load_settings();
    let company = settings.resolve_company(company)?;
    let store = open_store(&settings)?;
    if !store.tenant_exists(&company)? {
        return Err(CategorizeError::TenantNotFound(company));
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Group", "Status"]);
    for cat in store.categories(&company)? {
        let status = if cat.is_active {
            "active".green().to_string()
        } else {
            "inactive".dimmed().to_string()
        };
        table.add_row(vec![
            Cell::new(cat.id),
            Cell::new(cat.name),
            Cell::new(cat.accounting_type),
            Cell::new(cat.reporting_group),
            Cell::new(status),
        ]);
    }
    println!("Categories for {company}\n{table}");
    Ok(())
}

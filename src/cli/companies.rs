use comfy_table::{Cell, Table};

use ledger_triage::db::add_company;
use ledger_triage::error::{CategorizeError, Result};
use ledger_triage::settings::load_settings;

use super::open_store;

pub fn add(id: &str, name: &str) -> Result<()> {
    let store = open_store(&load_settings())?;
    let created = add_company(&*store.conn()?, id, name)?;
    if !created {
        return Err(CategorizeError::Other(format!("Company '{id}' already exists")));
    }
    println!("Added company: {id} ({name})");
    Ok(())
}

pub fn list() -> Result<()> {
    let store = open_store(&load_settings())?;
    let conn = store.conn()?;
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, \
         (SELECT count(*) FROM categories WHERE company_id = c.id AND is_active = 1), \
         (SELECT count(*) FROM rules WHERE company_id = c.id AND is_active = 1) \
         FROM companies c ORDER BY c.id",
    )?;
    let rows: Vec<(String, String, i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Categories", "Rules"]);
    for (id, name, categories, rules) in rows {
        table.add_row(vec![Cell::new(id), Cell::new(name), Cell::new(categories), Cell::new(rules)]);
    }
    println!("Companies\n{table}");
    Ok(())
}

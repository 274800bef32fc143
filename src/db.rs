use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::{AccountingType, ReportingGroup};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS companies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    company_id TEXT NOT NULL,
    name TEXT NOT NULL,
    accounting_type TEXT NOT NULL,
    reporting_group TEXT NOT NULL DEFAULT 'other',
    is_active INTEGER DEFAULT 1,
    FOREIGN KEY (company_id) REFERENCES companies(id),
    UNIQUE (company_id, name)
);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY,
    company_id TEXT NOT NULL,
    category_id INTEGER NOT NULL,
    pattern TEXT NOT NULL,
    pattern_kind TEXT NOT NULL DEFAULT 'contains',
    confidence_score REAL NOT NULL DEFAULT 0.8,
    usage_count INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (company_id) REFERENCES companies(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    company_id TEXT NOT NULL,
    description TEXT NOT NULL,
    amount REAL NOT NULL,
    memo TEXT,
    balance REAL,
    category_id INTEGER,
    confidence REAL,
    source TEXT,
    needs_review INTEGER DEFAULT 0,
    reason_code TEXT,
    reason_message TEXT,
    is_confirmed INTEGER DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (company_id) REFERENCES companies(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS category_cache (
    company_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    candidate TEXT NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (company_id, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_rules_company ON rules(company_id, is_active);
CREATE INDEX IF NOT EXISTS idx_transactions_confirmed ON transactions(company_id, is_confirmed);
";

/// Default chart of accounts seeded for every new company.
const DEFAULT_CATEGORIES: &[(&str, AccountingType, ReportingGroup)] = &[
    // Revenue
    ("Product Sales", AccountingType::Revenue, ReportingGroup::GrossRevenue),
    ("Service Revenue", AccountingType::Revenue, ReportingGroup::GrossRevenue),
    ("Sales Taxes", AccountingType::VariableCost, ReportingGroup::RevenueDeductions),
    // Direct and variable costs
    ("Raw Materials", AccountingType::VariableCost, ReportingGroup::CostOfGoods),
    ("Subcontracted Services", AccountingType::VariableCost, ReportingGroup::CostOfGoods),
    ("Freight & Packaging", AccountingType::VariableCost, ReportingGroup::VariableCost),
    ("Sales Commissions", AccountingType::VariableCost, ReportingGroup::VariableCost),
    // Fixed costs
    ("Payroll", AccountingType::FixedCost, ReportingGroup::FixedCost),
    ("Rent", AccountingType::FixedCost, ReportingGroup::FixedCost),
    ("Utilities", AccountingType::FixedCost, ReportingGroup::FixedCost),
    ("Software & Subscriptions", AccountingType::FixedCost, ReportingGroup::FixedCost),
    ("Professional Services", AccountingType::FixedCost, ReportingGroup::FixedCost),
    // Outside operations
    ("Interest Income", AccountingType::NonOperating, ReportingGroup::NonOperatingRevenue),
    ("Asset Sales", AccountingType::NonOperating, ReportingGroup::NonOperatingRevenue),
    ("Bank Fees & Interest", AccountingType::NonOperating, ReportingGroup::FinancialResult),
    ("Income Taxes", AccountingType::NonOperating, ReportingGroup::IncomeTaxes),
    // Balance-sheet movements
    ("Loan Proceeds", AccountingType::FinancialMovement, ReportingGroup::Loans),
    ("Loan Repayments", AccountingType::FinancialMovement, ReportingGroup::Loans),
    ("Investments", AccountingType::FinancialMovement, ReportingGroup::FinancialResult),
    ("Internal Transfer", AccountingType::Transfer, ReportingGroup::Transfers),
    ("Owner Contributions", AccountingType::Equity, ReportingGroup::ProfitDistribution),
    ("Profit Distribution", AccountingType::Equity, ReportingGroup::ProfitDistribution),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Create a tenant and seed its default categories. Idempotent.
pub fn add_company(conn: &Connection, id: &str, name: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO companies (id, name) VALUES (?1, ?2)",
        rusqlite::params![id, name],
    )?;
    if inserted == 0 {
        return Ok(false);
    }
    for (cat_name, accounting_type, group) in DEFAULT_CATEGORIES {
        conn.execute(
            "INSERT OR IGNORE INTO categories (company_id, name, accounting_type, reporting_group) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, cat_name, accounting_type.as_str(), group.code()],
        )?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &["companies", "categories", "rules", "transactions", "category_cache"] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_add_company_seeds_categories_once() {
        let (_dir, conn) = test_db();
        assert!(add_company(&conn, "acme", "Acme Ltda").unwrap());
        assert!(!add_company(&conn, "acme", "Acme Ltda").unwrap());
        let count: i64 = conn
            .query_row("SELECT count(*) FROM categories WHERE company_id = 'acme'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, DEFAULT_CATEGORIES.len());
    }

    #[test]
    fn test_seed_covers_every_accounting_type() {
        let (_dir, conn) = test_db();
        add_company(&conn, "acme", "Acme").unwrap();
        for t in AccountingType::ALL {
            let n: i64 = conn
                .query_row(
                    "SELECT count(*) FROM categories WHERE accounting_type = ?1",
                    [t.as_str()],
                    |r| r.get(0),
                )
                .unwrap();
            assert!(n > 0, "no seeded category of type {t}");
        }
    }

    #[test]
    fn test_companies_are_isolated() {
        let (_dir, conn) = test_db();
        add_company(&conn, "a", "A").unwrap();
        add_company(&conn, "b", "B").unwrap();
        let rent_ids: Vec<i64> = conn
            .prepare("SELECT id FROM categories WHERE name = 'Rent' ORDER BY company_id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rent_ids.len(), 2);
        assert_ne!(rent_ids[0], rent_ids[1]);
    }
}

use rusqlite::OptionalExtension;

use crate::error::{CategorizeError, Result};
use crate::models::PatternKind;
use crate::store::SqliteStore;

/// Reliability given to rules authored while confirming a transaction.
pub const CONFIRMED_RULE_CONFIDENCE: f64 = 0.8;

pub struct ReviewItem {
    pub id: i64,
    pub description: String,
    pub amount: f64,
    pub memo: Option<String>,
    pub category_name: Option<String>,
    pub confidence: Option<f64>,
    pub source: Option<String>,
    pub reason_code: Option<String>,
    pub reason_message: Option<String>,
}

/// Stored results awaiting human confirmation, oldest first.
pub fn review_queue(store: &SqliteStore, company_id: &str) -> Result<Vec<ReviewItem>> {
    let conn = store.conn()?;
    let mut stmt = conn.prepare(
        "SELECT t.id, t.description, t.amount, t.memo, c.name, t.confidence, t.source, \
         t.reason_code, t.reason_message \
         FROM transactions t LEFT JOIN categories c ON t.category_id = c.id \
         WHERE t.company_id = ?1 AND t.needs_review = 1 AND t.is_confirmed = 0 ORDER BY t.id",
    )?;
    let rows = stmt
        .query_map([company_id], |row| {
            Ok(ReviewItem {
                id: row.get(0)?,
                description: row.get(1)?,
                amount: row.get(2)?,
                memo: row.get(3)?,
                category_name: row.get(4)?,
                confidence: row.get(5)?,
                source: row.get(6)?,
                reason_code: row.get(7)?,
                reason_message: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Confirm a stored transaction under `category_name`, making it precedent for
/// later lookups. With a `rule_pattern`, also author a `contains` rule.
/// Returns the new rule id, if one was created.
pub fn confirm(
    store: &SqliteStore,
    company_id: &str,
    transaction_id: i64,
    category_name: &str,
    rule_pattern: Option<&str>,
) -> Result<Option<i64>> {
    let category = store.category_by_name(company_id, category_name)?;
    if !category.is_active {
        return Err(CategorizeError::InvalidInput(format!(
            "category '{}' is inactive",
            category.name
        )));
    }

    {
        let conn = store.conn()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM transactions WHERE id = ?1 AND company_id = ?2",
                rusqlite::params![transaction_id, company_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(CategorizeError::InvalidInput(format!(
                "transaction {transaction_id} not found for company '{company_id}'"
            )));
        }
        conn.execute(
            "UPDATE transactions SET category_id = ?1, confidence = 100.0, is_confirmed = 1, \
             needs_review = 0, reason_code = NULL, reason_message = NULL WHERE id = ?2",
            rusqlite::params![category.id, transaction_id],
        )?;
    }

    match rule_pattern.map(str::trim).filter(|p| !p.is_empty()) {
        Some(pattern) => Ok(Some(store.add_rule(
            company_id,
            category.id,
            pattern,
            PatternKind::Contains,
            CONFIRMED_RULE_CONFIDENCE,
        )?)),
        None => Ok(None),
    }
}

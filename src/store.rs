use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};

use crate::db::{get_connection, init_db};
use crate::error::{CategorizeError, Result};
use crate::models::{
    AccountingType, CategorizationResult, Category, CategoryRule, ConfirmedTransaction, PatternKind,
    ReportingGroup, TransactionContext,
};

/// Read access to a tenant's categories and rules. Failures here are fatal to a categorization.
pub trait CategoryStore: Send + Sync {
    fn tenant_exists(&self, company_id: &str) -> Result<bool>;

    fn categories(&self, company_id: &str) -> Result<Vec<Category>>;

    /// Active rules whose owning category is also active.
    fn active_rules(&self, company_id: &str) -> Result<Vec<CategoryRule>>;

    /// Increment the usage counter of a rule whose candidate was accepted.
    fn record_rule_use(&self, rule_id: i64) -> Result<()>;
}

/// Manually confirmed prior transactions, most recent first.
pub trait HistoryStore: Send + Sync {
    fn confirmed_transactions(&self, company_id: &str, limit: usize) -> Result<Vec<ConfirmedTransaction>>;
}

/// One row of `rules` joined with its category name, for listings.
#[derive(Debug, Clone)]
pub struct RuleListing {
    pub rule: CategoryRule,
    pub category_name: String,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CategorizeError::Other("database connection lock poisoned".to_string()))
    }

    pub fn category_by_name(&self, company_id: &str, name: &str) -> Result<Category> {
        self.categories(company_id)?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CategorizeError::UnknownCategory(name.to_string()))
    }

    pub fn add_category(
        &self,
        company_id: &str,
        name: &str,
        accounting_type: AccountingType,
        reporting_group: ReportingGroup,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (company_id, name, accounting_type, reporting_group) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![company_id, name, accounting_type.as_str(), reporting_group.code()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_category_active(&self, category_id: i64, active: bool) -> Result<()> {
        self.conn()?.execute(
            "UPDATE categories SET is_active = ?1 WHERE id = ?2",
            rusqlite::params![active as i32, category_id],
        )?;
        Ok(())
    }

    pub fn add_rule(
        &self,
        company_id: &str,
        category_id: i64,
        pattern: &str,
        kind: PatternKind,
        confidence_score: f64,
    ) -> Result<i64> {
        if !(0.0..=1.0).contains(&confidence_score) {
            return Err(CategorizeError::InvalidInput(format!(
                "rule confidence must be within 0..=1, got {confidence_score}"
            )));
        }
        if kind == PatternKind::Regex {
            regex::Regex::new(pattern)
                .map_err(|e| CategorizeError::InvalidInput(format!("invalid regex '{pattern}': {e}")))?;
        }
        let conn = self.conn()?;
        let owned = conn
            .query_row(
                "SELECT 1 FROM categories WHERE id = ?1 AND company_id = ?2",
                rusqlite::params![category_id, company_id],
                |_| Ok(()),
            )
            .optional()?;
        if owned.is_none() {
            return Err(CategorizeError::UnknownCategory(format!(
                "category {category_id} does not belong to company '{company_id}'"
            )));
        }
        conn.execute(
            "INSERT INTO rules (company_id, category_id, pattern, pattern_kind, confidence_score) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![company_id, category_id, pattern, kind.as_str(), confidence_score],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns false when the rule does not exist or was already inactive.
    pub fn deactivate_rule(&self, company_id: &str, rule_id: i64) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE rules SET is_active = 0 WHERE id = ?1 AND company_id = ?2 AND is_active = 1",
            rusqlite::params![rule_id, company_id],
        )?;
        Ok(changed > 0)
    }

    pub fn rule(&self, rule_id: i64) -> Result<Option<CategoryRule>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, category_id, pattern, pattern_kind, confidence_score, usage_count, is_active \
                 FROM rules WHERE id = ?1",
                [rule_id],
                rule_row,
            )
            .optional()?;
        row.map(into_rule).transpose()
    }

    pub fn list_rules(&self, company_id: &str) -> Result<Vec<RuleListing>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.category_id, r.pattern, r.pattern_kind, r.confidence_score, r.usage_count, \
             r.is_active, c.name FROM rules r JOIN categories c ON r.category_id = c.id \
             WHERE r.company_id = ?1 AND r.is_active = 1 ORDER BY r.id",
        )?;
        let rows = stmt
            .query_map([company_id], |row| Ok((rule_row(row)?, row.get::<_, String>(7)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(raw, category_name)| {
                Ok(RuleListing {
                    rule: into_rule(raw)?,
                    category_name,
                })
            })
            .collect()
    }

    /// Persist a categorization outcome and return the new transaction id.
    pub fn save_result(
        &self,
        company_id: &str,
        context: &TransactionContext,
        result: &CategorizationResult,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transactions (company_id, description, amount, memo, balance, category_id, \
             confidence, source, needs_review, reason_code, reason_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                company_id,
                context.description,
                context.amount,
                context.memo,
                context.balance,
                result.category_id,
                result.confidence,
                result.source.as_str(),
                result.needs_review as i32,
                result.reason.as_ref().map(|r| r.code.as_str()),
                result.reason.as_ref().map(|r| r.message.as_str()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

type RawRule = (i64, i64, String, String, f64, i64, bool);

fn rule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRule> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_rule((id, category_id, pattern, kind, confidence_score, usage_count, is_active): RawRule) -> Result<CategoryRule> {
    Ok(CategoryRule {
        id,
        category_id,
        pattern,
        kind: kind.parse()?,
        confidence_score,
        usage_count,
        is_active,
    })
}

impl CategoryStore for SqliteStore {
    fn tenant_exists(&self, company_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row("SELECT 1 FROM companies WHERE id = ?1", [company_id], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn categories(&self, company_id: &str) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, accounting_type, reporting_group, is_active FROM categories \
             WHERE company_id = ?1 ORDER BY id",
        )?;
        let rows: Vec<(i64, String, String, String, bool)> = stmt
            .query_map([company_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, name, accounting_type, group, is_active)| {
                Ok(Category {
                    id,
                    name,
                    accounting_type: accounting_type.parse()?,
                    reporting_group: group.parse()?,
                    is_active,
                })
            })
            .collect()
    }

    fn active_rules(&self, company_id: &str) -> Result<Vec<CategoryRule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.category_id, r.pattern, r.pattern_kind, r.confidence_score, r.usage_count, \
             r.is_active FROM rules r JOIN categories c ON r.category_id = c.id AND c.company_id = r.company_id \
             WHERE r.company_id = ?1 AND r.is_active = 1 AND c.is_active = 1 ORDER BY r.id",
        )?;
        let rows = stmt
            .query_map([company_id], rule_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_rule).collect()
    }

    fn record_rule_use(&self, rule_id: i64) -> Result<()> {
        self.conn()?.execute(
            "UPDATE rules SET usage_count = usage_count + 1 WHERE id = ?1",
            [rule_id],
        )?;
        Ok(())
    }
}

impl HistoryStore for SqliteStore {
    fn confirmed_transactions(&self, company_id: &str, limit: usize) -> Result<Vec<ConfirmedTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, description, amount, category_id, confidence FROM transactions \
             WHERE company_id = ?1 AND is_confirmed = 1 AND category_id IS NOT NULL \
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![company_id, limit as i64], |row| {
                Ok(ConfirmedTransaction {
                    id: row.get(0)?,
                    description: row.get(1)?,
                    amount: row.get(2)?,
                    category_id: row.get(3)?,
                    confidence: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

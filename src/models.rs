use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CategorizeError;
use crate::scoring::ScoreBreakdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountingType {
    Revenue,
    VariableCost,
    FixedCost,
    NonOperating,
    FinancialMovement,
    Transfer,
    Equity,
}

impl AccountingType {
    pub const ALL: [AccountingType; 7] = [
        AccountingType::Revenue,
        AccountingType::VariableCost,
        AccountingType::FixedCost,
        AccountingType::NonOperating,
        AccountingType::FinancialMovement,
        AccountingType::Transfer,
        AccountingType::Equity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccountingType::Revenue => "revenue",
            AccountingType::VariableCost => "variable_cost",
            AccountingType::FixedCost => "fixed_cost",
            AccountingType::NonOperating => "non_operating",
            AccountingType::FinancialMovement => "financial_movement",
            AccountingType::Transfer => "transfer",
            AccountingType::Equity => "equity",
        }
    }

    pub fn is_expense(self) -> bool {
        matches!(self, AccountingType::VariableCost | AccountingType::FixedCost)
    }

    pub fn is_revenue(self) -> bool {
        matches!(self, AccountingType::Revenue)
    }
}

impl FromStr for AccountingType {
    type Err = CategorizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountingType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CategorizeError::InvalidInput(format!("unknown accounting type '{s}'")))
    }
}

impl fmt::Display for AccountingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Financial-statement line a category is presented under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingGroup {
    GrossRevenue,
    RevenueDeductions,
    CostOfGoods,
    VariableCost,
    FixedCost,
    NonOperatingRevenue,
    NonOperatingExpense,
    FinancialResult,
    IncomeTaxes,
    ProfitDistribution,
    Loans,
    Transfers,
    Other,
}

impl ReportingGroup {
    pub const ALL: [ReportingGroup; 13] = [
        ReportingGroup::GrossRevenue,
        ReportingGroup::RevenueDeductions,
        ReportingGroup::CostOfGoods,
        ReportingGroup::VariableCost,
        ReportingGroup::FixedCost,
        ReportingGroup::NonOperatingRevenue,
        ReportingGroup::NonOperatingExpense,
        ReportingGroup::FinancialResult,
        ReportingGroup::IncomeTaxes,
        ReportingGroup::ProfitDistribution,
        ReportingGroup::Loans,
        ReportingGroup::Transfers,
        ReportingGroup::Other,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ReportingGroup::GrossRevenue => "gross_revenue",
            ReportingGroup::RevenueDeductions => "revenue_deductions",
            ReportingGroup::CostOfGoods => "cost_of_goods",
            ReportingGroup::VariableCost => "variable_cost",
            ReportingGroup::FixedCost => "fixed_cost",
            ReportingGroup::NonOperatingRevenue => "non_operating_revenue",
            ReportingGroup::NonOperatingExpense => "non_operating_expense",
            ReportingGroup::FinancialResult => "financial_result",
            ReportingGroup::IncomeTaxes => "income_taxes",
            ReportingGroup::ProfitDistribution => "profit_distribution",
            ReportingGroup::Loans => "loans",
            ReportingGroup::Transfers => "transfers",
            ReportingGroup::Other => "other",
        }
    }
}

impl FromStr for ReportingGroup {
    type Err = CategorizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportingGroup::ALL
            .into_iter()
            .find(|g| g.code() == s)
            .ok_or_else(|| CategorizeError::InvalidInput(format!("unknown reporting group '{s}'")))
    }
}

impl fmt::Display for ReportingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Exact,
    Contains,
    Regex,
}

impl PatternKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Exact => "exact",
            PatternKind::Contains => "contains",
            PatternKind::Regex => "regex",
        }
    }

    /// Regex is the most permissive matcher, so it carries the least weight.
    pub fn weight(self) -> f64 {
        match self {
            PatternKind::Exact => 1.0,
            PatternKind::Contains => 0.85,
            PatternKind::Regex => 0.7,
        }
    }
}

impl FromStr for PatternKind {
    type Err = CategorizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(PatternKind::Exact),
            "contains" => Ok(PatternKind::Contains),
            "regex" => Ok(PatternKind::Regex),
            other => Err(CategorizeError::InvalidInput(format!("unknown pattern kind '{other}'"))),
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub accounting_type: AccountingType,
    pub reporting_group: ReportingGroup,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRule {
    pub id: i64,
    pub category_id: i64,
    pub pattern: String,
    pub kind: PatternKind,
    /// Stored reliability in [0, 1].
    pub confidence_score: f64,
    pub usage_count: i64,
    pub is_active: bool,
}

/// A manually confirmed prior transaction, used as precedent.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedTransaction {
    pub id: i64,
    pub description: String,
    pub amount: f64,
    pub category_id: i64,
    pub confidence: Option<f64>,
}

/// One raw statement line. Never persisted by the pipeline itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionContext {
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub balance: Option<f64>,
}

impl TransactionContext {
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            description: description.into(),
            amount,
            memo: None,
            balance: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = Some(balance);
        self
    }

    /// Description and memo joined for keyword searches.
    pub fn full_text(&self) -> String {
        match &self.memo {
            Some(memo) if !memo.trim().is_empty() => format!("{} {}", self.description, memo),
            _ => self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Rule,
    History,
    Ai,
    None,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Rule => "rule",
            Source::History => "history",
            Source::Ai => "ai",
            Source::None => "none",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cache,
    Rules,
    History,
    Ai,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [Stage::Cache, Stage::Rules, Stage::History, Stage::Ai];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Cache => "cache",
            Stage::Rules => "rules",
            Stage::History => "history",
            Stage::Ai => "ai",
        }
    }
}

/// Why a source proposed its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Cached {
        original_source: Source,
    },
    Rule {
        rule_id: i64,
        pattern: String,
        pattern_kind: PatternKind,
        matched_text: String,
        breakdown: ScoreBreakdown,
    },
    History {
        transaction_id: i64,
        similarity: f64,
    },
    Classifier {
        model: Option<String>,
        reasoning: Option<String>,
    },
    None,
}

/// A source's proposal. Owned by one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub category_id: i64,
    /// Raw confidence in [0, 100].
    pub confidence: f64,
    pub source: Source,
    pub evidence: Evidence,
}

impl CandidateMatch {
    pub fn rule_id(&self) -> Option<i64> {
        match &self.evidence {
            Evidence::Rule { rule_id, .. } => Some(*rule_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    AccountingConsistencyViolation,
    LowConfidence,
    ManualFallback,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::AccountingConsistencyViolation => "ACCOUNTING_CONSISTENCY_VIOLATION",
            ReasonCode::LowConfidence => "LOW_CONFIDENCE",
            ReasonCode::ManualFallback => "MANUAL_FALLBACK",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub message: String,
}

impl Reason {
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// The only externally visible artifact of a categorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationResult {
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    /// Final confidence in [0, 100].
    pub confidence: f64,
    pub source: Source,
    pub needs_review: bool,
    pub reason: Option<Reason>,
    pub evidence: Evidence,
    pub attempted: Vec<Stage>,
}

impl CategorizationResult {
    pub fn rule_id(&self) -> Option<i64> {
        match &self.evidence {
            Evidence::Rule { rule_id, .. } => Some(*rule_id),
            _ => None,
        }
    }
}

/// NaN collapses to zero.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

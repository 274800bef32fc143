//! Description enrichment ahead of the external classifier.

use crate::models::TransactionContext;

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedContext {
    pub context: TransactionContext,
    /// Description with banking jargon expanded.
    pub description: String,
    pub hint: Option<String>,
}

pub trait Enricher: Send + Sync {
    fn enrich(&self, context: &TransactionContext) -> EnrichedContext;
}

pub struct PassthroughEnricher;

impl Enricher for PassthroughEnricher {
    fn enrich(&self, context: &TransactionContext) -> EnrichedContext {
        EnrichedContext {
            context: context.clone(),
            description: context.description.clone(),
            hint: None,
        }
    }
}

// (token, meaning, category hint)
const BANKING_TERMS: &[(&str, &str, &str)] = &[
    ("SISPAG", "batch payment system (suppliers, payroll or taxes)", "batch payment"),
    ("PAGFOR", "supplier payment", "supplier payment"),
    ("FIDC", "receivables investment fund (advance)", "receivables advance"),
    ("TED", "electronic funds transfer", "transfer"),
    ("TEV", "same-bank transfer", "possible internal transfer"),
    ("DOC", "interbank transfer document", "transfer"),
    ("PIX", "instant payment", "transfer"),
    ("IOF", "financial operations tax", "bank taxes"),
    ("DARF", "federal tax payment slip", "taxes"),
    ("GPS", "social security payment slip", "payroll taxes"),
    ("FGTS", "employee severance fund deposit", "payroll taxes"),
    ("ACH", "automated clearing house transfer", "transfer"),
];

/// Expands a fixed table of banking abbreviations, token by token.
pub struct GlossaryEnricher;

impl Enricher for GlossaryEnricher {
    fn enrich(&self, context: &TransactionContext) -> EnrichedContext {
        let mut hint = None;
        let description = context
            .description
            .split_whitespace()
            .map(|token| {
                let upper = token.to_uppercase();
                match BANKING_TERMS.iter().find(|(term, _, _)| *term == upper) {
                    Some((_, meaning, category_hint)) => {
                        hint.get_or_insert_with(|| category_hint.to_string());
                        format!("{token} ({meaning})")
                    }
                    None => token.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        EnrichedContext {
            context: context.clone(),
            description,
            hint,
        }
    }
}

use std::sync::Arc;

use crate::cache::normalize_description;
use crate::error::Result;
use crate::models::{CandidateMatch, ConfirmedTransaction, Evidence, Source, TransactionContext};
use crate::store::HistoryStore;

/// Precedent never outranks a cache hit.
const MAX_HISTORY_CONFIDENCE: f64 = 95.0;
const SIMILARITY_WEIGHT: f64 = 0.8;
const PRIOR_WEIGHT: f64 = 0.2;
/// Floor for a containment match; grows toward 1.0 as lengths converge.
const CONTAINMENT_BASE: f64 = 0.85;
const MIN_CONTAINED_LEN: usize = 4;

/// Letters only: digits and punctuation vary between otherwise identical lines.
pub fn letters_only(description: &str) -> String {
    description
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Similarity in [0, 1] between two descriptions.
pub fn similarity(a: &str, b: &str) -> f64 {
    if normalize_description(a) == normalize_description(b) {
        return 1.0;
    }
    let a = letters_only(a);
    let b = letters_only(b);
    // Without letters only the exact normalized form can match.
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let (longer, shorter) = if a.chars().count() >= b.chars().count() {
        (a.chars().collect::<Vec<_>>(), b.chars().collect::<Vec<_>>())
    } else {
        (b.chars().collect::<Vec<_>>(), a.chars().collect::<Vec<_>>())
    };

    let ratio = (longer.len() - levenshtein(&longer, &shorter)) as f64 / longer.len() as f64;

    let longer_str: String = longer.iter().collect();
    let shorter_str: String = shorter.iter().collect();
    let contained = shorter.len() >= MIN_CONTAINED_LEN && longer_str.contains(&shorter_str);
    if contained {
        let containment = CONTAINMENT_BASE
            + (1.0 - CONTAINMENT_BASE) * (shorter.len() as f64 / longer.len() as f64);
        ratio.max(containment)
    } else {
        ratio
    }
}

pub struct HistoricalMatcher {
    store: Arc<dyn HistoryStore>,
    limit: usize,
    min_similarity: f64,
}

impl HistoricalMatcher {
    pub fn new(store: Arc<dyn HistoryStore>, limit: usize, min_similarity: f64) -> Self {
        Self {
            store,
            limit,
            min_similarity,
        }
    }

    /// Most similar confirmed transaction at or above the similarity bar.
    /// Ties go to the most recent confirmation.
    pub fn find(&self, company_id: &str, context: &TransactionContext) -> Result<Option<CandidateMatch>> {
        let history = self.store.confirmed_transactions(company_id, self.limit)?;

        let mut best: Option<(f64, &ConfirmedTransaction)> = None;
        for txn in &history {
            let sim = similarity(&context.description, &txn.description);
            if sim < self.min_similarity {
                continue;
            }
            if best.map_or(true, |(current, _)| sim > current) {
                best = Some((sim, txn));
            }
        }

        Ok(best.map(|(sim, txn)| {
            let prior = txn.confidence.unwrap_or(100.0).clamp(0.0, 100.0);
            let confidence =
                (sim * 100.0 * SIMILARITY_WEIGHT + prior * PRIOR_WEIGHT).min(MAX_HISTORY_CONFIDENCE);
            CandidateMatch {
                category_id: txn.category_id,
                confidence,
                source: Source::History,
                evidence: Evidence::History {
                    transaction_id: txn.id,
                    similarity: sim,
                },
            }
        }))
    }
}

use std::cmp::Ordering;
use std::collections::HashMap;

use log::warn;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::models::{CandidateMatch, CategoryRule, Evidence, PatternKind, Source, TransactionContext};

const PATTERN_WEIGHT: f64 = 0.4;
const CONFIDENCE_WEIGHT: f64 = 0.5;
const USAGE_WEIGHT: f64 = 0.1;

/// Decades of usage until the bonus saturates at 1.0 (999 accepted uses).
const USAGE_SATURATION_DECADES: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub pattern_weight: f64,
    pub confidence_score: f64,
    pub usage_bonus: f64,
    /// Combined score in [0, 100].
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRule {
    pub rule_id: i64,
    pub category_id: i64,
    pub pattern: String,
    pub kind: PatternKind,
    pub matched_text: String,
    pub breakdown: ScoreBreakdown,
}

impl ScoredRule {
    pub fn into_candidate(self) -> CandidateMatch {
        CandidateMatch {
            category_id: self.category_id,
            confidence: self.breakdown.score,
            source: Source::Rule,
            evidence: Evidence::Rule {
                rule_id: self.rule_id,
                pattern: self.pattern,
                pattern_kind: self.kind,
                matched_text: self.matched_text,
                breakdown: self.breakdown,
            },
        }
    }
}

fn matches(text: &str, pattern: &str, kind: PatternKind, rule_id: i64) -> bool {
    let text_lower = text.trim().to_lowercase();
    let pat_lower = pattern.trim().to_lowercase();
    match kind {
        PatternKind::Exact => text_lower == pat_lower,
        PatternKind::Contains => text_lower.contains(&pat_lower),
        PatternKind::Regex => match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(text),
            Err(e) => {
                warn!("rule {rule_id}: invalid regex '{pattern}': {e}");
                false
            }
        },
    }
}

/// Zero for a brand-new rule, rising logarithmically and saturating at 1.0.
pub fn usage_bonus(usage_count: i64) -> f64 {
    if usage_count <= 0 {
        return 0.0;
    }
    ((usage_count as f64 + 1.0).log10() / USAGE_SATURATION_DECADES).min(1.0)
}

pub fn breakdown(rule: &CategoryRule) -> ScoreBreakdown {
    let pattern_weight = rule.kind.weight();
    let confidence_score = if rule.confidence_score.is_nan() {
        0.0
    } else {
        rule.confidence_score.clamp(0.0, 1.0)
    };
    let usage_bonus = usage_bonus(rule.usage_count);
    let raw = pattern_weight * PATTERN_WEIGHT
        + confidence_score * CONFIDENCE_WEIGHT
        + usage_bonus * USAGE_WEIGHT;
    ScoreBreakdown {
        pattern_weight,
        confidence_score,
        usage_bonus,
        score: (raw * 100.0).clamp(0.0, 100.0),
    }
}

/// Tests the description first, then the memo.
pub fn score_rule(rule: &CategoryRule, context: &TransactionContext) -> Option<ScoredRule> {
    if !rule.is_active || rule.pattern.trim().is_empty() {
        return None;
    }
    let fields = [Some(context.description.as_str()), context.memo.as_deref()];
    let matched_text = fields
        .into_iter()
        .flatten()
        .find(|text| matches(text, &rule.pattern, rule.kind, rule.id))?;

    Some(ScoredRule {
        rule_id: rule.id,
        category_id: rule.category_id,
        pattern: rule.pattern.clone(),
        kind: rule.kind,
        matched_text: matched_text.to_string(),
        breakdown: breakdown(rule),
    })
}

/// Higher score, then higher stored confidence, then lower rule id.
fn precedence(a: &ScoredRule, b: &ScoredRule) -> Ordering {
    b.breakdown
        .score
        .total_cmp(&a.breakdown.score)
        .then_with(|| b.breakdown.confidence_score.total_cmp(&a.breakdown.confidence_score))
        .then_with(|| a.rule_id.cmp(&b.rule_id))
}

/// Best matching rule per category, best first.
pub fn rank(context: &TransactionContext, rules: &[CategoryRule]) -> Vec<ScoredRule> {
    let mut best: HashMap<i64, ScoredRule> = HashMap::new();
    for scored in rules.iter().filter_map(|rule| score_rule(rule, context)) {
        match best.get(&scored.category_id) {
            Some(current) if precedence(current, &scored) != Ordering::Greater => {}
            _ => {
                best.insert(scored.category_id, scored);
            }
        }
    }
    let mut ranked: Vec<ScoredRule> = best.into_values().collect();
    ranked.sort_by(precedence);
    ranked
}

pub fn score(context: &TransactionContext, rules: &[CategoryRule]) -> Vec<CandidateMatch> {
    rank(context, rules)
        .into_iter()
        .map(ScoredRule::into_candidate)
        .collect()
}

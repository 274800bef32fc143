//! The categorization pipeline.
//!
//! Sources are consulted in [`Stage::ORDER`]. The first candidate that clears
//! its stage's strong-match bar ends the search; otherwise the most confident
//! candidate seen is kept. The survivor is validated, gated against the
//! caller's threshold, and only an accepted result produces side effects.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::cache::{CategoryCache, Fingerprint};
use crate::classifier::ClassifierAdapter;
use crate::enrich::{Enricher, PassthroughEnricher};
use crate::error::{CategorizeError, Result};
use crate::history::HistoricalMatcher;
use crate::models::{
    clamp_confidence, CandidateMatch, CategorizationResult, Category, Evidence, Reason, ReasonCode, Source,
    Stage, TransactionContext,
};
use crate::movement::infer_movement;
use crate::scoring;
use crate::store::{CategoryStore, HistoryStore};
use crate::validators::{validate_with_movement, VIOLATION_CONFIDENCE_CAP};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Strong-match bars in [0, 100]. The classifier stage has none: it is last.
    pub strong_cache: f64,
    pub strong_rules: f64,
    pub strong_history: f64,
    /// Accepted results at or above this are written back to the cache.
    pub cache_min_confidence: f64,
    pub history_limit: usize,
    pub history_min_similarity: f64,
    pub batch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strong_cache: 90.0,
            strong_rules: 75.0,
            strong_history: 80.0,
            cache_min_confidence: 80.0,
            history_limit: 100,
            history_min_similarity: 0.85,
            batch_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    pub fn strong_bar(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Cache => self.strong_cache,
            Stage::Rules => self.strong_rules,
            Stage::History => self.strong_history,
            Stage::Ai => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizeOptions {
    pub company_id: String,
    /// Review bar in [0, 100].
    pub confidence_threshold: f64,
    pub skip_cache: bool,
    pub skip_rules: bool,
    pub skip_history: bool,
    pub skip_ai: bool,
}

impl CategorizeOptions {
    pub fn new(company_id: impl Into<String>, confidence_threshold: f64) -> Self {
        Self {
            company_id: company_id.into(),
            confidence_threshold,
            skip_cache: false,
            skip_rules: false,
            skip_history: false,
            skip_ai: false,
        }
    }

    pub fn skip(mut self, stage: Stage) -> Self {
        match stage {
            Stage::Cache => self.skip_cache = true,
            Stage::Rules => self.skip_rules = true,
            Stage::History => self.skip_history = true,
            Stage::Ai => self.skip_ai = true,
        }
        self
    }

    pub fn skip_all(self) -> Self {
        Stage::ORDER.into_iter().fold(self, Self::skip)
    }

    pub fn skips(&self, stage: Stage) -> bool {
        match stage {
            Stage::Cache => self.skip_cache,
            Stage::Rules => self.skip_rules,
            Stage::History => self.skip_history,
            Stage::Ai => self.skip_ai,
        }
    }
}

fn check_input(context: &TransactionContext, options: &CategorizeOptions) -> Result<()> {
    if context.description.trim().is_empty() {
        return Err(CategorizeError::InvalidInput("description must not be empty".to_string()));
    }
    if !context.amount.is_finite() {
        return Err(CategorizeError::InvalidInput(format!(
            "amount must be a finite number, got {}",
            context.amount
        )));
    }
    if context.balance.is_some_and(|b| !b.is_finite()) {
        return Err(CategorizeError::InvalidInput("balance must be a finite number".to_string()));
    }
    if options.company_id.trim().is_empty() {
        return Err(CategorizeError::InvalidInput("company id must not be empty".to_string()));
    }
    let threshold = options.confidence_threshold;
    if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
        return Err(CategorizeError::InvalidInput(format!(
            "confidence threshold must be within 0..=100, got {threshold}"
        )));
    }
    Ok(())
}

fn active_category(categories: &[Category], id: i64) -> Option<&Category> {
    categories.iter().find(|c| c.id == id && c.is_active)
}

fn fallback(attempted: Vec<Stage>) -> CategorizationResult {
    CategorizationResult {
        category_id: None,
        category_name: None,
        confidence: 0.0,
        source: Source::None,
        needs_review: true,
        reason: Some(Reason::new(
            ReasonCode::ManualFallback,
            "no source produced a candidate; manual categorization required",
        )),
        evidence: Evidence::None,
        attempted,
    }
}

pub struct Categorizer {
    store: Arc<dyn CategoryStore>,
    history_store: Arc<dyn HistoryStore>,
    history: HistoricalMatcher,
    cache: Option<Arc<dyn CategoryCache>>,
    classifier: Option<ClassifierAdapter>,
    enricher: Arc<dyn Enricher>,
    config: PipelineConfig,
}

impl Categorizer {
    pub fn new(store: Arc<dyn CategoryStore>, history_store: Arc<dyn HistoryStore>) -> Self {
        let config = PipelineConfig::default();
        Self {
            store,
            history: HistoricalMatcher::new(
                Arc::clone(&history_store),
                config.history_limit,
                config.history_min_similarity,
            ),
            history_store,
            cache: None,
            classifier: None,
            enricher: Arc::new(PassthroughEnricher),
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CategoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_classifier(mut self, classifier: ClassifierAdapter) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.history = HistoricalMatcher::new(
            Arc::clone(&self.history_store),
            config.history_limit,
            config.history_min_similarity,
        );
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn from_cache(&self, company_id: &str, context: &TransactionContext, categories: &[Category]) -> Option<CandidateMatch> {
        let cache = self.cache.as_ref()?;
        let hit = match cache.lookup(company_id, &Fingerprint::of(context)) {
            Ok(hit) => hit?,
            Err(e) => {
                warn!("cache lookup failed, treating as miss: {e}");
                return None;
            }
        };
        if active_category(categories, hit.category_id).is_none() {
            debug!("cache hit for inactive or missing category {}", hit.category_id);
            return None;
        }
        Some(CandidateMatch {
            category_id: hit.category_id,
            confidence: hit.confidence,
            source: Source::Cache,
            evidence: Evidence::Cached {
                original_source: hit.source,
            },
        })
    }

    fn from_rules(&self, company_id: &str, context: &TransactionContext, categories: &[Category]) -> Result<Option<CandidateMatch>> {
        let rules = self.store.active_rules(company_id)?;
        Ok(scoring::score(context, &rules)
            .into_iter()
            .find(|c| active_category(categories, c.category_id).is_some()))
    }

    fn from_history(&self, company_id: &str, context: &TransactionContext, categories: &[Category]) -> Option<CandidateMatch> {
        match self.history.find(company_id, context) {
            Ok(found) => found.filter(|c| active_category(categories, c.category_id).is_some()),
            Err(e) => {
                warn!("history lookup failed, treating as no candidate: {e}");
                None
            }
        }
    }

    async fn from_classifier(
        &self,
        company_id: &str,
        context: &TransactionContext,
        categories: &[Category],
    ) -> Option<CandidateMatch> {
        let classifier = self.classifier.as_ref()?;
        let enriched = self.enricher.enrich(context);
        classifier.classify(company_id, &enriched, categories).await
    }

    async fn run_stage(
        &self,
        stage: Stage,
        company_id: &str,
        context: &TransactionContext,
        categories: &[Category],
    ) -> Result<Option<CandidateMatch>> {
        Ok(match stage {
            Stage::Cache => self.from_cache(company_id, context, categories),
            Stage::Rules => self.from_rules(company_id, context, categories)?,
            Stage::History => self.from_history(company_id, context, categories),
            Stage::Ai => self.from_classifier(company_id, context, categories).await,
        })
    }

    /// Categorize one transaction for one tenant.
    ///
    /// Errors are limited to rejected input and unreadable tenant data;
    /// everything else is encoded in the result's review flag and reason.
    pub async fn categorize(
        &self,
        context: &TransactionContext,
        options: &CategorizeOptions,
    ) -> Result<CategorizationResult> {
        check_input(context, options)?;
        let company_id = options.company_id.as_str();
        if !self.store.tenant_exists(company_id)? {
            return Err(CategorizeError::TenantNotFound(company_id.to_string()));
        }
        let categories = self.store.categories(company_id)?;

        let mut attempted = Vec::new();
        let mut best: Option<CandidateMatch> = None;
        for stage in Stage::ORDER {
            if options.skips(stage) {
                continue;
            }
            attempted.push(stage);
            let Some(candidate) = self.run_stage(stage, company_id, context, &categories).await? else {
                debug!("{}: no candidate", stage.as_str());
                continue;
            };
            debug!(
                "{}: category {} at {:.1}",
                stage.as_str(),
                candidate.category_id,
                candidate.confidence
            );
            if candidate.confidence >= self.config.strong_bar(stage) {
                best = Some(candidate);
                break;
            }
            if best.as_ref().map_or(true, |b| candidate.confidence > b.confidence) {
                best = Some(candidate);
            }
        }

        let Some(candidate) = best else {
            return Ok(fallback(attempted));
        };
        let Some(category) = active_category(&categories, candidate.category_id) else {
            return Ok(fallback(attempted));
        };

        let verdict = validate_with_movement(context, infer_movement(context), category);
        let mut confidence = clamp_confidence(candidate.confidence);
        let mut needs_review = false;
        let mut reason = None;
        if let Some(explanation) = verdict.reason() {
            confidence = confidence.min(VIOLATION_CONFIDENCE_CAP);
            needs_review = true;
            reason = Some(Reason::new(ReasonCode::AccountingConsistencyViolation, explanation));
        }
        if confidence < options.confidence_threshold {
            needs_review = true;
            reason.get_or_insert_with(|| {
                Reason::new(
                    ReasonCode::LowConfidence,
                    format!(
                        "confidence {confidence:.1} is below the review threshold {:.1}",
                        options.confidence_threshold
                    ),
                )
            });
        }

        let result = CategorizationResult {
            category_id: Some(category.id),
            category_name: Some(category.name.clone()),
            confidence,
            source: candidate.source,
            needs_review,
            reason,
            evidence: candidate.evidence.clone(),
            attempted,
        };

        if !result.needs_review {
            self.accept(company_id, context, &candidate, &result)?;
        }
        Ok(result)
    }

    /// Side effects of an accepted result. Nothing here awaits.
    fn accept(
        &self,
        company_id: &str,
        context: &TransactionContext,
        candidate: &CandidateMatch,
        result: &CategorizationResult,
    ) -> Result<()> {
        if let Some(rule_id) = result.rule_id() {
            self.store.record_rule_use(rule_id)?;
            info!("rule {rule_id} accepted for '{}'", context.description);
        }
        if let Some(cache) = &self.cache {
            if candidate.source != Source::Cache && result.confidence >= self.config.cache_min_confidence {
                let entry = CandidateMatch {
                    confidence: result.confidence,
                    ..candidate.clone()
                };
                match cache.store(company_id, &Fingerprint::of(context), &entry) {
                    Ok(()) => info!("cached category {} for '{}'", entry.category_id, context.description),
                    Err(e) => warn!("cache write failed: {e}"),
                }
            }
        }
        Ok(())
    }

    /// Categorize independent transactions concurrently. Results keep input order.
    pub async fn categorize_batch(
        &self,
        contexts: &[TransactionContext],
        options: &CategorizeOptions,
    ) -> Vec<Result<CategorizationResult>> {
        stream::iter(contexts.iter().map(|context| self.categorize(context, options)))
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await
    }
}

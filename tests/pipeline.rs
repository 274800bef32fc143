use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use ledger_triage::cache::{CategoryCache, Fingerprint, SqliteCache};
use ledger_triage::classifier::{Classification, ClassificationRequest, Classifier, ClassifierAdapter, ClassifierError};
use ledger_triage::db::add_company;
use ledger_triage::error::{CategorizeError, Result};
use ledger_triage::models::{
    CategorizationResult, Category, CategoryRule, ConfirmedTransaction, Evidence, PatternKind, ReasonCode, Source,
    Stage, TransactionContext,
};
use ledger_triage::pipeline::{CategorizeOptions, Categorizer, PipelineConfig};
use ledger_triage::reviewer;
use ledger_triage::scoring::usage_bonus;
use ledger_triage::store::{CategoryStore, HistoryStore, SqliteStore};
use ledger_triage::validators::VIOLATION_CONFIDENCE_CAP;

fn setup() -> (TempDir, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("test.db")).unwrap());
    add_company(&store.conn().unwrap(), "acme", "Acme Ltda").unwrap();
    (dir, store)
}

fn categorizer(store: &Arc<SqliteStore>) -> Categorizer {
    Categorizer::new(store.clone(), store.clone())
}

fn add_rule(store: &SqliteStore, pattern: &str, category: &str, kind: PatternKind, confidence: f64) -> i64 {
    let cat = store.category_by_name("acme", category).unwrap();
    store.add_rule("acme", cat.id, pattern, kind, confidence).unwrap()
}

fn usage(store: &SqliteStore, rule_id: i64) -> i64 {
    store.rule(rule_id).unwrap().unwrap().usage_count
}

struct CountingClassifier {
    calls: AtomicUsize,
    answer: Option<(&'static str, f64)>,
}

impl CountingClassifier {
    fn answering(category: &'static str, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer: Some((category, confidence)),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for CountingClassifier {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn classify(&self, _request: &ClassificationRequest) -> std::result::Result<Option<Classification>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.map(|(category, confidence)| Classification {
            category: category.to_string(),
            confidence,
            reasoning: None,
            model: Some("fake".to_string()),
        }))
    }
}

struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn classify(&self, _request: &ClassificationRequest) -> std::result::Result<Option<Classification>, ClassifierError> {
        Err(ClassifierError::Unavailable("connection refused".to_string()))
    }
}

/// Never answers; the caller has to give up first.
struct HangingClassifier;

#[async_trait]
impl Classifier for HangingClassifier {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn classify(&self, _request: &ClassificationRequest) -> std::result::Result<Option<Classification>, ClassifierError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }
}

struct BrokenHistory;

impl HistoryStore for BrokenHistory {
    fn confirmed_transactions(&self, _company_id: &str, _limit: usize) -> Result<Vec<ConfirmedTransaction>> {
        Err(CategorizeError::Other("history table locked".to_string()))
    }
}

/// Delegates to SQLite but cannot read rules.
struct UnreadableRules(Arc<SqliteStore>);

impl CategoryStore for UnreadableRules {
    fn tenant_exists(&self, company_id: &str) -> Result<bool> {
        self.0.tenant_exists(company_id)
    }

    fn categories(&self, company_id: &str) -> Result<Vec<Category>> {
        self.0.categories(company_id)
    }

    fn active_rules(&self, _company_id: &str) -> Result<Vec<CategoryRule>> {
        Err(CategorizeError::Other("rules table unreadable".to_string()))
    }

    fn record_rule_use(&self, rule_id: i64) -> Result<()> {
        self.0.record_rule_use(rule_id)
    }
}

fn assert_review_invariants(result: &CategorizationResult, threshold: f64) {
    assert!((0.0..=100.0).contains(&result.confidence));
    if result.confidence < threshold {
        assert!(result.needs_review, "confidence {} below {threshold}", result.confidence);
    }
    if result.needs_review {
        assert!(result.reason.is_some());
    }
}

#[tokio::test]
async fn test_every_stage_skipped_falls_back_to_manual() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 0.9);
    let options = CategorizeOptions::new("acme", 50.0).skip_all();
    let result = categorizer(&store)
        .categorize(&TransactionContext::new("ALUGUEL", -1000.0), &options)
        .await
        .unwrap();
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.source, Source::None);
    assert!(result.needs_review);
    assert_eq!(result.reason.unwrap().code, ReasonCode::ManualFallback);
    assert!(result.category_id.is_none());
    assert!(result.attempted.is_empty());
}

#[tokio::test]
async fn test_weak_rule_accepted_under_low_threshold() {
    let (_dir, store) = setup();
    let rule_id = add_rule(&store, "padaria", "Raw Materials", PatternKind::Contains, 0.10);
    let options = CategorizeOptions::new("acme", 10.0).skip(Stage::Ai);
    let result = categorizer(&store)
        .categorize(&TransactionContext::new("PADARIA PAO QUENTE", -35.0), &options)
        .await
        .unwrap();
    assert_eq!(result.source, Source::Rule);
    assert!((result.confidence - 39.0).abs() < 1e-9);
    assert!(!result.needs_review);
    assert!(result.reason.is_none());
    assert_eq!(result.rule_id(), Some(rule_id));
    assert_eq!(usage(&store, rule_id), 1);
}

#[tokio::test]
async fn test_low_confidence_needs_review_and_leaves_usage_alone() {
    let (_dir, store) = setup();
    let rule_id = add_rule(&store, "padaria", "Raw Materials", PatternKind::Contains, 0.10);
    let result = categorizer(&store)
        .categorize(&TransactionContext::new("PADARIA", -35.0), &CategorizeOptions::new("acme", 70.0))
        .await
        .unwrap();
    assert!(result.needs_review);
    assert_eq!(result.reason.unwrap().code, ReasonCode::LowConfidence);
    assert_eq!(usage(&store, rule_id), 0);
}

#[tokio::test]
async fn test_review_flag_tracks_every_threshold() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 0.6);
    add_rule(&store, "transferencia", "Rent", PatternKind::Contains, 0.9);
    add_rule(&store, "cemig", "Utilities", PatternKind::Exact, 0.3);
    let contexts = [
        TransactionContext::new("ALUGUEL ESCRITORIO", -2500.0),
        TransactionContext::new("TRANSFERENCIA ENTRE CONTAS", -2000.0),
        TransactionContext::new("ALUGUEL RECEBIDO", 900.0),
        TransactionContext::new("CEMIG", -180.0),
        TransactionContext::new("SEM REGRA", -1.0),
    ];
    let categorizer = categorizer(&store);
    for threshold in (0..=100).step_by(10) {
        let options = CategorizeOptions::new("acme", threshold as f64).skip(Stage::Cache);
        for context in &contexts {
            let result = categorizer.categorize(context, &options).await.unwrap();
            assert_review_invariants(&result, threshold as f64);
        }
    }
}

#[tokio::test]
async fn test_internal_transfer_into_fixed_cost_is_downgraded() {
    let (_dir, store) = setup();
    let rule_id = add_rule(&store, "transferencia", "Rent", PatternKind::Contains, 0.9);
    let result = categorizer(&store)
        .categorize(
            &TransactionContext::new("TRANSFERENCIA ENTRE CONTAS 0001", -2000.0),
            &CategorizeOptions::new("acme", 50.0),
        )
        .await
        .unwrap();
    assert_eq!(result.category_name.as_deref(), Some("Rent"));
    assert!(result.needs_review);
    assert!(result.confidence <= VIOLATION_CONFIDENCE_CAP);
    let reason = result.reason.unwrap();
    assert_eq!(reason.code, ReasonCode::AccountingConsistencyViolation);
    assert!(reason.message.contains("internal transfer"));
    assert_eq!(usage(&store, rule_id), 0);
}

#[tokio::test]
async fn test_fixed_cost_with_inflow_violates_sign() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 1.0);
    let result = categorizer(&store)
        .categorize(&TransactionContext::new("ALUGUEL", 100.0), &CategorizeOptions::new("acme", 0.0))
        .await
        .unwrap();
    assert!(result.needs_review);
    assert!(result.confidence <= 60.0);
    let reason = result.reason.unwrap();
    assert_eq!(reason.code, ReasonCode::AccountingConsistencyViolation);
    assert!(reason.message.contains("inflow"));
}

#[tokio::test]
async fn test_accepted_result_populates_cache_then_hits() {
    let (_dir, store) = setup();
    let rule_id = add_rule(&store, "netflix", "Software & Subscriptions", PatternKind::Contains, 1.0);
    let cache = Arc::new(SqliteCache::new(store.clone(), chrono::Duration::days(30)));
    let categorizer = categorizer(&store)
        .with_cache(cache.clone())
        .with_config(PipelineConfig {
            strong_cache: 80.0,
            ..PipelineConfig::default()
        });
    let context = TransactionContext::new("NETFLIX.COM", -39.9);
    let options = CategorizeOptions::new("acme", 70.0);

    let first = categorizer.categorize(&context, &options).await.unwrap();
    assert_eq!(first.source, Source::Rule);
    assert!(cache.lookup("acme", &Fingerprint::of(&context)).unwrap().is_some());

    let second = categorizer
        .categorize(&TransactionContext::new("netflix.com", -55.9), &options)
        .await
        .unwrap();
    assert_eq!(second.source, Source::Cache);
    assert_eq!(second.category_id, first.category_id);
    assert_eq!(second.attempted, vec![Stage::Cache]);
    assert_eq!(
        second.evidence,
        Evidence::Cached {
            original_source: Source::Rule
        }
    );
    assert_eq!(usage(&store, rule_id), 1);
}

#[tokio::test]
async fn test_cached_category_still_validated() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 1.0);
    let cache = Arc::new(SqliteCache::new(store.clone(), chrono::Duration::days(30)));
    let categorizer = categorizer(&store).with_cache(cache.clone()).with_config(PipelineConfig {
        strong_cache: 80.0,
        ..PipelineConfig::default()
    });
    let options = CategorizeOptions::new("acme", 70.0);
    categorizer
        .categorize(&TransactionContext::new("ALUGUEL", -1000.0), &options)
        .await
        .unwrap();

    // The fingerprint ignores the memo, which now reveals an internal transfer.
    let context = TransactionContext::new("ALUGUEL", -1000.0).with_memo("transferencia entre contas");
    let result = categorizer.categorize(&context, &options).await.unwrap();
    assert_eq!(result.source, Source::Cache);
    assert!(result.needs_review);
    assert_eq!(result.reason.unwrap().code, ReasonCode::AccountingConsistencyViolation);
}

#[tokio::test]
async fn test_unknown_tenant_is_fatal() {
    let (_dir, store) = setup();
    let err = categorizer(&store)
        .categorize(&TransactionContext::new("ALUGUEL", -1.0), &CategorizeOptions::new("globex", 50.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CategorizeError::TenantNotFound(ref id) if id == "globex"));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_blank_description_rejected_as_input_error() {
    let (_dir, store) = setup();
    let classifier = CountingClassifier::answering("Rent", 0.9);
    let categorizer = categorizer(&store)
        .with_classifier(ClassifierAdapter::new(classifier.clone(), Duration::from_secs(1)));
    let err = categorizer
        .categorize(&TransactionContext::new("   ", -1.0), &CategorizeOptions::new("acme", 50.0))
        .await
        .unwrap_err();
    assert!(err.is_input_error());
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_strong_rule_never_reaches_classifier() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 0.9);
    let classifier = CountingClassifier::answering("Utilities", 0.99);
    let categorizer = categorizer(&store)
        .with_classifier(ClassifierAdapter::new(classifier.clone(), Duration::from_secs(1)));
    let result = categorizer
        .categorize(&TransactionContext::new("ALUGUEL SALA 3", -1500.0), &CategorizeOptions::new("acme", 70.0))
        .await
        .unwrap();
    assert_eq!(result.source, Source::Rule);
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_classifier_answers_when_nothing_earlier_is_strong() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Utilities", PatternKind::Contains, 0.1);
    let classifier = CountingClassifier::answering("Rent", 0.9);
    let categorizer = categorizer(&store)
        .with_classifier(ClassifierAdapter::new(classifier.clone(), Duration::from_secs(1)));
    let result = categorizer
        .categorize(&TransactionContext::new("ALUGUEL SALA 3", -1500.0), &CategorizeOptions::new("acme", 70.0))
        .await
        .unwrap();
    assert_eq!(result.source, Source::Ai);
    assert_eq!(result.category_name.as_deref(), Some("Rent"));
    assert!((result.confidence - 90.0).abs() < 1e-9);
    assert_eq!(classifier.calls(), 1);
    assert_eq!(result.attempted, Stage::ORDER.to_vec());
}

#[tokio::test]
async fn test_classifier_failure_keeps_weaker_candidate() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 0.1);
    let categorizer = categorizer(&store)
        .with_classifier(ClassifierAdapter::new(Arc::new(FailingClassifier), Duration::from_secs(1)));
    let result = categorizer
        .categorize(&TransactionContext::new("ALUGUEL", -1500.0), &CategorizeOptions::new("acme", 70.0))
        .await
        .unwrap();
    assert_eq!(result.source, Source::Rule);
    assert!(result.needs_review);
}

#[tokio::test]
async fn test_history_failure_is_absorbed() {
    let (_dir, store) = setup();
    let categorizer = Categorizer::new(store.clone(), Arc::new(BrokenHistory));
    let result = categorizer
        .categorize(&TransactionContext::new("ENERGIA", -300.0), &CategorizeOptions::new("acme", 70.0))
        .await
        .unwrap();
    assert_eq!(result.reason.unwrap().code, ReasonCode::ManualFallback);
    assert!(result.attempted.contains(&Stage::History));
}

#[tokio::test]
async fn test_unreadable_rules_are_fatal_unless_skipped() {
    let (_dir, store) = setup();
    let categorizer = Categorizer::new(Arc::new(UnreadableRules(store.clone())), store.clone());
    let context = TransactionContext::new("ALUGUEL", -1000.0);

    let err = categorizer
        .categorize(&context, &CategorizeOptions::new("acme", 70.0))
        .await
        .unwrap_err();
    assert!(err.is_fatal());

    let options = CategorizeOptions::new("acme", 70.0).skip(Stage::Rules);
    assert!(categorizer.categorize(&context, &options).await.is_ok());
}

#[tokio::test]
async fn test_confirmed_transaction_becomes_precedent() {
    let (_dir, store) = setup();
    let categorizer = categorizer(&store);
    let options = CategorizeOptions::new("acme", 70.0);
    let context = TransactionContext::new("ENERGIA ELETRICA CEMIG 0524", -310.0);

    let first = categorizer.categorize(&context, &options).await.unwrap();
    assert_eq!(first.source, Source::None);
    let id = store.save_result("acme", &context, &first).unwrap();
    reviewer::confirm(&store, "acme", id, "Utilities", None).unwrap();

    let next = categorizer
        .categorize(&TransactionContext::new("ENERGIA ELETRICA CEMIG 0624", -295.0), &options)
        .await
        .unwrap();
    assert_eq!(next.source, Source::History);
    assert_eq!(next.category_name.as_deref(), Some("Utilities"));
    assert!(!next.needs_review);
    assert!(matches!(next.evidence, Evidence::History { transaction_id, .. } if transaction_id == id));
}

/// A 79-point rule that neither short-circuits nor misses the cache bar.
fn acceptable_without_short_circuit() -> PipelineConfig {
    PipelineConfig {
        strong_rules: 100.0,
        cache_min_confidence: 70.0,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_cancelled_categorization_leaves_no_side_effects() {
    let (_dir, store) = setup();
    let rule_id = add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 0.9);
    let cache = Arc::new(SqliteCache::new(store.clone(), chrono::Duration::days(30)));
    let context = TransactionContext::new("ALUGUEL SALA", -1500.0);
    let options = CategorizeOptions::new("acme", 70.0);

    let hanging = categorizer(&store)
        .with_config(acceptable_without_short_circuit())
        .with_cache(cache.clone())
        .with_classifier(ClassifierAdapter::new(Arc::new(HangingClassifier), Duration::from_secs(60)));
    let outcome = tokio::time::timeout(Duration::from_millis(50), hanging.categorize(&context, &options)).await;
    assert!(outcome.is_err());
    assert_eq!(usage(&store, rule_id), 0);
    assert!(cache.lookup("acme", &Fingerprint::of(&context)).unwrap().is_none());

    // Same setup run to completion does accept and cache.
    let silent = Arc::new(CountingClassifier {
        calls: AtomicUsize::new(0),
        answer: None,
    });
    let finishing = categorizer(&store)
        .with_config(acceptable_without_short_circuit())
        .with_cache(cache.clone())
        .with_classifier(ClassifierAdapter::new(silent.clone(), Duration::from_secs(1)));
    let result = finishing.categorize(&context, &options).await.unwrap();
    assert_eq!(result.source, Source::Rule);
    assert!(!result.needs_review);
    assert_eq!(silent.calls(), 1);
    assert_eq!(usage(&store, rule_id), 1);
    assert!(cache.lookup("acme", &Fingerprint::of(&context)).unwrap().is_some());
}

#[tokio::test]
async fn test_repeated_categorization_is_identical() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 0.9);
    let categorizer = categorizer(&store);
    let context = TransactionContext::new("ALUGUEL SALA", -1500.0);
    let options = CategorizeOptions::new("acme", 95.0).skip(Stage::Cache);

    let first = categorizer.categorize(&context, &options).await.unwrap();
    let second = categorizer.categorize(&context, &options).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_repeated_acceptance_counts_usage_once_per_run() {
    let (_dir, store) = setup();
    let rule_id = add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 0.9);
    let categorizer = categorizer(&store);
    let context = TransactionContext::new("ALUGUEL SALA", -1500.0);
    let options = CategorizeOptions::new("acme", 70.0).skip(Stage::Cache);

    let first = categorizer.categorize(&context, &options).await.unwrap();
    assert!(!first.needs_review);
    assert_eq!(usage(&store, rule_id), 1);

    let second = categorizer.categorize(&context, &options).await.unwrap();
    assert_eq!(usage(&store, rule_id), 2);
    assert_eq!(second.category_id, first.category_id);
    assert_eq!(second.source, first.source);
    assert!(!second.needs_review);

    // Only the usage bonus moves: log10(2)/3 of the 10-point usage weight.
    let drift = second.confidence - first.confidence;
    assert!((drift - usage_bonus(1) * 10.0).abs() < 1e-9);
    assert!((first.confidence - 79.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_batch_keeps_input_order() {
    let (_dir, store) = setup();
    add_rule(&store, "aluguel", "Rent", PatternKind::Contains, 0.9);
    add_rule(&store, "cemig", "Utilities", PatternKind::Contains, 0.9);
    let contexts = vec![
        TransactionContext::new("CEMIG", -200.0),
        TransactionContext::new("", -1.0),
        TransactionContext::new("ALUGUEL", -1000.0),
    ];
    let results = categorizer(&store)
        .categorize_batch(&contexts, &CategorizeOptions::new("acme", 70.0))
        .await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().category_name.as_deref(), Some("Utilities"));
    assert!(results[1].as_ref().unwrap_err().is_input_error());
    assert_eq!(results[2].as_ref().unwrap().category_name.as_deref(), Some("Rent"));
}

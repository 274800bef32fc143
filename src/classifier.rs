//! External classification service behind a uniform candidate contract.
//!
//! Whatever goes wrong on the other side (timeout, transport error, an answer
//! naming a category the tenant does not have) the adapter yields `None`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enrich::EnrichedContext;
use crate::models::{CandidateMatch, Category, Evidence, Source};

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("malformed classifier response: {0}")]
    Malformed(String),

    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClassifierError::Malformed(e.to_string())
        } else if e.is_connect() {
            ClassifierError::Unavailable(e.to_string())
        } else {
            ClassifierError::Request(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationRequest {
    pub company_id: String,
    pub description: String,
    pub enriched_description: String,
    pub hint: Option<String>,
    pub amount: f64,
    pub memo: Option<String>,
    pub balance: Option<f64>,
    /// Names of the tenant's active categories.
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    /// Category name or numeric id.
    pub category: String,
    /// In [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default, alias = "model_used")]
    pub model: Option<String>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the service has no answer.
    async fn classify(&self, request: &ClassificationRequest) -> Result<Option<Classification>, ClassifierError>;
}

fn resolve_category<'a>(answer: &str, categories: &'a [Category]) -> Option<&'a Category> {
    let answer = answer.trim();
    let active = || categories.iter().filter(|c| c.is_active);
    if let Ok(id) = answer.parse::<i64>() {
        if let Some(found) = active().find(|c| c.id == id) {
            return Some(found);
        }
    }
    active().find(|c| c.name.eq_ignore_ascii_case(answer))
}

pub struct ClassifierAdapter {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
}

impl ClassifierAdapter {
    pub fn new(classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self { classifier, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call(&self, request: &ClassificationRequest) -> Result<Option<Classification>, ClassifierError> {
        match tokio::time::timeout(self.timeout, self.classifier.classify(request)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(self.timeout)),
        }
    }

    fn into_candidate(answer: Classification, categories: &[Category]) -> Result<CandidateMatch, ClassifierError> {
        if !answer.confidence.is_finite() || !(0.0..=1.0).contains(&answer.confidence) {
            return Err(ClassifierError::Malformed(format!(
                "confidence {} outside [0, 1]",
                answer.confidence
            )));
        }
        let category = resolve_category(&answer.category, categories).ok_or_else(|| {
            ClassifierError::Malformed(format!("unknown category '{}'", answer.category))
        })?;
        Ok(CandidateMatch {
            category_id: category.id,
            confidence: answer.confidence * 100.0,
            source: Source::Ai,
            evidence: Evidence::Classifier {
                model: answer.model,
                reasoning: answer.reasoning,
            },
        })
    }

    /// Never fails: every failure mode collapses into `None`.
    pub async fn classify(
        &self,
        company_id: &str,
        enriched: &EnrichedContext,
        categories: &[Category],
    ) -> Option<CandidateMatch> {
        let request = ClassificationRequest {
            company_id: company_id.to_string(),
            description: enriched.context.description.clone(),
            enriched_description: enriched.description.clone(),
            hint: enriched.hint.clone(),
            amount: enriched.context.amount,
            memo: enriched.context.memo.clone(),
            balance: enriched.context.balance,
            categories: categories
                .iter()
                .filter(|c| c.is_active)
                .map(|c| c.name.clone())
                .collect(),
        };

        let outcome = match self.call(&request).await {
            Ok(Some(answer)) => Self::into_candidate(answer, categories).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(candidate) => {
                debug!(
                    "{}: {}",
                    self.classifier.name(),
                    if candidate.is_some() { "answered" } else { "no answer" }
                );
                candidate
            }
            Err(e) => {
                warn!("{}: {e}", self.classifier.name());
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Classification>,
    #[serde(default)]
    error: Option<String>,
}

/// JSON-over-HTTP classification endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &'static str {
        "http-classifier"
    }

    async fn classify(&self, request: &ClassificationRequest) -> Result<Option<Classification>, ClassifierError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        if !response.status().is_success() {
            return Err(ClassifierError::Request(format!("HTTP {}", response.status())));
        }
        let envelope: Envelope = response.json().await?;
        if !envelope.success {
            return Err(ClassifierError::Request(
                envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(envelope.data)
    }
}

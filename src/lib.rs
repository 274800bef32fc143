//! Transaction categorization for multi-company bookkeeping.
//!
//! [`pipeline::Categorizer`] drives the stages: cache, scored rules,
//! confirmed history and an optional external classifier. Consistency
//! validators and a caller-chosen threshold decide what needs review.

pub mod cache;
pub mod classifier;
pub mod db;
pub mod enrich;
pub mod error;
pub mod fmt;
pub mod history;
pub mod models;
pub mod movement;
pub mod pipeline;
pub mod reviewer;
pub mod scoring;
pub mod settings;
pub mod store;
pub mod validators;

pub use error::{CategorizeError, Result};
pub use models::{CandidateMatch, CategorizationResult, Source, Stage, TransactionContext};
pub use pipeline::{CategorizeOptions, Categorizer, PipelineConfig};

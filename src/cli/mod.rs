pub mod batch;
pub mod cache;
pub mod categories;
pub mod categorize;
pub mod companies;
pub mod init;
pub mod review;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use ledger_triage::cache::SqliteCache;
use ledger_triage::classifier::{ClassifierAdapter, HttpClassifier};
use ledger_triage::enrich::GlossaryEnricher;
use ledger_triage::error::{CategorizeError, Result};
use ledger_triage::models::Stage;
use ledger_triage::pipeline::{CategorizeOptions, Categorizer};
use ledger_triage::settings::{db_path, Settings};
use ledger_triage::store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "ledger-triage",
    about = "Categorize bank transactions against per-company rules, history and an optional classifier."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for ledger-triage data (default: ~/.local/share/ledger-triage)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Company used when --company is omitted
        #[arg(long = "default-company")]
        default_company: Option<String>,
    },
    /// Manage companies (tenants).
    Companies {
        #[command(subcommand)]
        command: CompaniesCommands,
    },
    /// Manage a company's categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Manage categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Categorize a single transaction.
    Categorize {
        /// Transaction description as it appears on the statement
        description: String,
        /// Signed amount: negative for outflows
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,
        #[arg(long)]
        memo: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        balance: Option<f64>,
        #[command(flatten)]
        run: RunArgs,
        /// Store the result so it shows up in the review queue
        #[arg(long)]
        save: bool,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Categorize every row of a CSV file (headers: description,amount[,memo]) and store the results.
    Batch {
        /// Path to the CSV file
        file: String,
        #[command(flatten)]
        run: RunArgs,
        /// Print results as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Work through stored results that need review.
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// Maintain the category cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// Options shared by `categorize` and `batch`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub company: Option<String>,
    /// Review bar, 0-100 (default from settings)
    #[arg(long)]
    pub threshold: Option<f64>,
    #[arg(long = "skip-cache")]
    pub skip_cache: bool,
    #[arg(long = "skip-rules")]
    pub skip_rules: bool,
    #[arg(long = "skip-history")]
    pub skip_history: bool,
    #[arg(long = "skip-ai")]
    pub skip_ai: bool,
}

impl RunArgs {
    pub fn options(&self, settings: &Settings) -> Result<CategorizeOptions> {
        let company = settings.resolve_company(self.company.clone())?;
        let mut options =
            CategorizeOptions::new(company, self.threshold.unwrap_or(settings.confidence_threshold));
        for (skipped, stage) in [
            (self.skip_cache, Stage::Cache),
            (self.skip_rules, Stage::Rules),
            (self.skip_history, Stage::History),
            (self.skip_ai, Stage::Ai),
        ] {
            if skipped {
                options = options.skip(stage);
            }
        }
        Ok(options)
    }
}

#[derive(Subcommand)]
pub enum CompaniesCommands {
    /// Add a company and seed its default categories.
    Add {
        /// Short identifier, e.g. 'acme'
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
    },
    /// List all companies.
    List,
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Add a category.
    Add {
        name: String,
        /// revenue, variable_cost, fixed_cost, non_operating, financial_movement, transfer, equity
        #[arg(long = "type")]
        accounting_type: String,
        /// Reporting group code, e.g. fixed_cost, cost_of_goods, financial_result
        #[arg(long, default_value = "other")]
        group: String,
        #[arg(long)]
        company: Option<String>,
    },
    /// List categories.
    List {
        #[arg(long)]
        company: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a categorization rule.
    Add {
        /// Pattern to match against transaction descriptions
        pattern: String,
        /// Category name to assign
        #[arg(long)]
        category: String,
        /// Pattern kind: exact, contains, regex
        #[arg(long, default_value = "contains")]
        kind: String,
        /// Stored reliability, 0-1
        #[arg(long, default_value = "0.8")]
        confidence: f64,
        #[arg(long)]
        company: Option<String>,
    },
    /// List active rules.
    List {
        #[arg(long)]
        company: Option<String>,
    },
    /// Delete (deactivate) a rule by ID.
    Delete {
        /// Rule ID (shown in `ledger-triage rules list`)
        id: i64,
        #[arg(long)]
        company: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// List stored results that need review.
    List {
        #[arg(long)]
        company: Option<String>,
    },
    /// Confirm a stored transaction under a category.
    Confirm {
        /// Transaction ID (shown in `ledger-triage review list`)
        id: i64,
        #[arg(long)]
        category: String,
        /// Also add a `contains` rule with this pattern
        #[arg(long)]
        rule: Option<String>,
        #[arg(long)]
        company: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Drop expired cache entries.
    Purge,
    /// Drop every cache entry for a company.
    Clear {
        #[arg(long)]
        company: Option<String>,
    },
}

pub(crate) fn open_store(settings: &Settings) -> Result<Arc<SqliteStore>> {
    let path = db_path(settings);
    if !path.exists() {
        return Err(CategorizeError::Settings(format!(
            "No database found at {}\nRun `ledger-triage init` to set up.",
            path.display()
        )));
    }
    Ok(Arc::new(SqliteStore::open(&path)?))
}

pub(crate) fn build_categorizer(settings: &Settings, store: &Arc<SqliteStore>) -> anyhow::Result<Categorizer> {
    let cache = Arc::new(SqliteCache::new(Arc::clone(store), settings.cache_ttl()));
    let mut categorizer = Categorizer::new(store.clone(), store.clone())
        .with_config(settings.pipeline_config())
        .with_cache(cache);
    if let Some(classifier) = &settings.classifier {
        let timeout: Duration = classifier.timeout();
        let http = HttpClassifier::new(classifier.endpoint.clone(), timeout)?;
        categorizer = categorizer
            .with_classifier(ClassifierAdapter::new(Arc::new(http), timeout))
            .with_enricher(Arc::new(GlossaryEnricher));
    }
    Ok(categorizer)
}

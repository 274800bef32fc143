use anyhow::Context;
use colored::Colorize;
use comfy_table::{Cell, Table};
use serde::Deserialize;

use ledger_triage::error::Result;
use ledger_triage::fmt::{amount, confidence, truncate};
use ledger_triage::models::TransactionContext;
use ledger_triage::settings::load_settings;

use super::categorize::status_label;
use super::{build_categorizer, open_store, RunArgs};

#[derive(Debug, Deserialize)]
struct BatchRow {
    description: String,
    amount: f64,
    #[serde(default)]
    memo: Option<String>,
}

impl From<BatchRow> for TransactionContext {
    fn from(row: BatchRow) -> Self {
        TransactionContext {
            description: row.description,
            amount: row.amount,
            memo: row.memo.filter(|m| !m.trim().is_empty()),
            balance: None,
        }
    }
}

fn read_rows(path: &str) -> Result<Vec<TransactionContext>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut contexts = Vec::new();
    for row in reader.deserialize::<BatchRow>() {
        contexts.push(row?.into());
    }
    Ok(contexts)
}

pub async fn run(file: &str, args: &RunArgs, json: bool) -> anyhow::Result<()> {
    let settings = load_settings();
    let options = args.options(&settings)?;
    let contexts = read_rows(file).with_context(|| format!("reading {file}"))?;
    let store = open_store(&settings)?;
    let categorizer = build_categorizer(&settings, &store)?;

    let results = categorizer.categorize_batch(&contexts, &options).await;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Description", "Amount", "Category", "Confidence", "Source", "Status"]);
    let (mut accepted, mut review, mut rejected) = (0usize, 0usize, 0usize);
    for (context, result) in contexts.iter().zip(results) {
        let result = match result {
            Ok(result) => result,
            Err(e) if e.is_input_error() => {
                eprintln!("{} '{}': {e}", "Skipped".yellow(), context.description);
                rejected += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let id = store.save_result(&options.company_id, context, &result)?;
        if result.needs_review {
            review += 1;
        } else {
            accepted += 1;
        }

        if json {
            println!("{}", serde_json::to_string(&serde_json::json!({ "id": id, "result": result }))?);
        } else {
            table.add_row(vec![
                Cell::new(id),
                Cell::new(truncate(&context.description, 40)),
                Cell::new(amount(context.amount)),
                Cell::new(result.category_name.as_deref().unwrap_or("")),
                Cell::new(confidence(result.confidence)),
                Cell::new(result.source),
                Cell::new(status_label(&result)),
            ]);
        }
    }

    if !json {
        println!("{table}");
        println!("{accepted} categorized, {review} need review, {rejected} skipped");
    }
    Ok(())
}

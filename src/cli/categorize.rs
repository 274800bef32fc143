use colored::Colorize;
use comfy_table::{Cell, Table};

use ledger_triage::fmt::{amount, confidence};
use ledger_triage::models::{CategorizationResult, Evidence, TransactionContext};
use ledger_triage::settings::load_settings;

use super::{build_categorizer, open_store, RunArgs};

pub(crate) fn status_label(result: &CategorizationResult) -> String {
    if result.needs_review {
        "REVIEW".yellow().bold().to_string()
    } else {
        "OK".green().bold().to_string()
    }
}

fn describe_evidence(evidence: &Evidence) -> String {
    match evidence {
        Evidence::Cached { original_source } => format!("cached {original_source} result"),
        Evidence::Rule {
            rule_id,
            pattern,
            pattern_kind,
            breakdown,
            ..
        } => format!(
            "rule {rule_id} '{pattern}' ({pattern_kind}): weight {:.2}, confidence {:.2}, usage bonus {:.2}",
            breakdown.pattern_weight, breakdown.confidence_score, breakdown.usage_bonus
        ),
        Evidence::History {
            transaction_id,
            similarity,
        } => format!("similar to confirmed transaction {transaction_id} ({:.0}%)", similarity * 100.0),
        Evidence::Classifier { model, reasoning } => {
            let model = model.as_deref().unwrap_or("classifier");
            match reasoning {
                Some(reasoning) => format!("{model}: {reasoning}"),
                None => model.to_string(),
            }
        }
        Evidence::None => String::new(),
    }
}

fn print_result(context: &TransactionContext, result: &CategorizationResult) {
    let mut table = Table::new();
    table.add_row(vec![Cell::new("Description"), Cell::new(&context.description)]);
    table.add_row(vec![Cell::new("Amount"), Cell::new(amount(context.amount))]);
    table.add_row(vec![
        Cell::new("Category"),
        Cell::new(result.category_name.as_deref().unwrap_or("(none)")),
    ]);
    table.add_row(vec![Cell::new("Confidence"), Cell::new(confidence(result.confidence))]);
    table.add_row(vec![Cell::new("Source"), Cell::new(result.source)]);
    table.add_row(vec![Cell::new("Status"), Cell::new(status_label(result))]);
    if let Some(reason) = &result.reason {
        table.add_row(vec![
            Cell::new("Reason"),
            Cell::new(format!("{}: {}", reason.code, reason.message)),
        ]);
    }
    let evidence = describe_evidence(&result.evidence);
    if !evidence.is_empty() {
        table.add_row(vec![Cell::new("Evidence"), Cell::new(evidence)]);
    }
    let attempted: Vec<&str> = result.attempted.iter().map(|s| s.as_str()).collect();
    table.add_row(vec![Cell::new("Stages"), Cell::new(attempted.join(" \u{2192} "))]);
    println!("{table}");
}

pub async fn run(
    context: TransactionContext,
    args: &RunArgs,
    save: bool,
    json: bool,
) -> anyhow::Result<()> {
    let settings = load_settings();
    let options = args.options(&settings)?;
    let store = open_store(&settings)?;
    let categorizer = build_categorizer(&settings, &store)?;

    let result = categorizer.categorize(&context, &options).await?;
    if save {
        let id = store.save_result(&options.company_id, &context, &result)?;
        log::info!("stored as transaction {id}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&context, &result);
    }
    Ok(())
}

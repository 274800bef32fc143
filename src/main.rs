mod cli;

use clap::Parser;

use cli::{CacheCommands, CategoriesCommands, Cli, Commands, CompaniesCommands, ReviewCommands, RulesCommands};
use ledger_triage::models::TransactionContext;

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init {
            data_dir,
            default_company,
        } => cli::init::run(data_dir, default_company)?,
        Commands::Companies { command } => match command {
            CompaniesCommands::Add { id, name } => cli::companies::add(&id, &name)?,
            CompaniesCommands::List => cli::companies::list()?,
        },
        Commands::Categories { command } => match command {
            CategoriesCommands::Add {
                name,
                accounting_type,
                group,
                company,
            } => cli::categories::add(&name, &accounting_type, &group, company)?,
            CategoriesCommands::List { company } => cli::categories::list(company)?,
        },
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                category,
                kind,
                confidence,
                company,
            } => cli::rules::add(&pattern, &category, &kind, confidence, company)?,
            RulesCommands::List { company } => cli::rules::list(company)?,
            RulesCommands::Delete { id, company } => cli::rules::delete(id, company)?,
        },
        Commands::Categorize {
            description,
            amount,
            memo,
            balance,
            run,
            save,
            json,
        } => {
            let context = TransactionContext {
                description,
                amount,
                memo,
                balance,
            };
            cli::categorize::run(context, &run, save, json).await?
        }
        Commands::Batch { file, run, json } => cli::batch::run(&file, &run, json).await?,
        Commands::Review { command } => match command {
            ReviewCommands::List { company } => cli::review::list(company)?,
            ReviewCommands::Confirm {
                id,
                category,
                rule,
                company,
            } => cli::review::confirm(id, &category, rule.as_deref(), company)?,
        },
        Commands::Cache { command } => match command {
            CacheCommands::Purge => cli::cache::purge()?,
            CacheCommands::Clear { company } => cli::cache::clear(company)?,
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

use std::sync::Arc;

use ledger_triage::cache::{CategoryCache, SqliteCache};
use ledger_triage::error::Result;
use ledger_triage::settings::load_settings;

use super::open_store;

pub fn purge() -> Result<()> {
    let settings = load_settings();
    let store = open_store(&settings)?;
    let removed = SqliteCache::new(Arc::clone(&store), settings.cache_ttl()).purge_expired()?;
    println!("Purged {removed} expired cache entries");
    Ok(())
}

pub fn clear(company: Option<String>) -> Result<()> {
    let settings = load_settings();
    let company = settings.resolve_company(company)?;
    let store = open_store(&settings)?;
    let removed = SqliteCache::new(Arc::clone(&store), settings.cache_ttl()).clear(&company)?;
    println!("Cleared {removed} cache entries for {company}");
    Ok(())
}

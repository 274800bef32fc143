use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};

use crate::error::{CategorizeError, Result};
use crate::models::{CandidateMatch, TransactionContext};
use crate::store::SqliteStore;

/// Case-folded, whitespace-collapsed description.
pub fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cache key: normalized description plus the amount sign.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(context: &TransactionContext) -> Self {
        let sign = if context.amount > 0.0 {
            '+'
        } else if context.amount < 0.0 {
            '-'
        } else {
            '0'
        };
        Fingerprint(format!("{}|{sign}", normalize_description(&context.description)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 hex digest, used as the storage key.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

/// Maps a fingerprint to a previously accepted candidate. Entries are returned
/// exactly as stored; re-validation is the caller's job.
pub trait CategoryCache: Send + Sync {
    fn lookup(&self, company_id: &str, fingerprint: &Fingerprint) -> Result<Option<CandidateMatch>>;

    /// Single atomic upsert keyed by fingerprint.
    fn store(&self, company_id: &str, fingerprint: &Fingerprint, candidate: &CandidateMatch) -> Result<()>;

    /// Drop every expired entry, returning how many were removed.
    fn purge_expired(&self) -> Result<usize>;

    fn clear(&self, company_id: &str) -> Result<usize>;
}

fn lock_poisoned() -> CategorizeError {
    CategorizeError::Other("cache lock poisoned".to_string())
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    candidate: CandidateMatch,
    stored_at: DateTime<Utc>,
}

pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), MemoryEntry>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn store_at(
        &self,
        company_id: &str,
        fingerprint: &Fingerprint,
        candidate: &CandidateMatch,
        stored_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| lock_poisoned())?;
        entries.insert(
            (company_id.to_string(), fingerprint.as_str().to_string()),
            MemoryEntry {
                candidate: candidate.clone(),
                stored_at,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CategoryCache for MemoryCache {
    fn lookup(&self, company_id: &str, fingerprint: &Fingerprint) -> Result<Option<CandidateMatch>> {
        let mut entries = self.entries.lock().map_err(|_| lock_poisoned())?;
        let key = (company_id.to_string(), fingerprint.as_str().to_string());
        match entries.get(&key) {
            Some(entry) if Utc::now() - entry.stored_at > self.ttl => {
                entries.remove(&key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.candidate.clone())),
            None => Ok(None),
        }
    }

    fn store(&self, company_id: &str, fingerprint: &Fingerprint, candidate: &CandidateMatch) -> Result<()> {
        self.store_at(company_id, fingerprint, candidate, Utc::now())
    }

    fn purge_expired(&self) -> Result<usize> {
        let mut entries = self.entries.lock().map_err(|_| lock_poisoned())?;
        let before = entries.len();
        let now = Utc::now();
        entries.retain(|_, e| now - e.stored_at <= self.ttl);
        Ok(before - entries.len())
    }

    fn clear(&self, company_id: &str) -> Result<usize> {
        let mut entries = self.entries.lock().map_err(|_| lock_poisoned())?;
        let before = entries.len();
        entries.retain(|(company, _), _| company != company_id);
        Ok(before - entries.len())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Cache rows in the `category_cache` table, sharing the store's connection.
pub struct SqliteCache {
    store: Arc<SqliteStore>,
    ttl: Duration,
}

impl SqliteCache {
    pub fn new(store: Arc<SqliteStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store_at(
        &self,
        company_id: &str,
        fingerprint: &Fingerprint,
        candidate: &CandidateMatch,
        stored_at: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(candidate)?;
        self.store.conn()?.execute(
            "INSERT INTO category_cache (company_id, fingerprint, candidate, stored_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (company_id, fingerprint) \
             DO UPDATE SET candidate = excluded.candidate, stored_at = excluded.stored_at",
            rusqlite::params![company_id, fingerprint.digest(), payload, timestamp(stored_at)],
        )?;
        Ok(())
    }
}

impl CategoryCache for SqliteCache {
    fn lookup(&self, company_id: &str, fingerprint: &Fingerprint) -> Result<Option<CandidateMatch>> {
        let digest = fingerprint.digest();
        let conn = self.store.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT candidate, stored_at FROM category_cache WHERE company_id = ?1 AND fingerprint = ?2",
                rusqlite::params![company_id, digest],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((payload, stored_at)) = row else {
            return Ok(None);
        };

        let expired = DateTime::parse_from_rfc3339(&stored_at)
            .map(|t| Utc::now() - t.with_timezone(&Utc) > self.ttl)
            .unwrap_or(true);
        if expired {
            conn.execute(
                "DELETE FROM category_cache WHERE company_id = ?1 AND fingerprint = ?2",
                rusqlite::params![company_id, digest],
            )?;
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&payload)?))
    }

    fn store(&self, company_id: &str, fingerprint: &Fingerprint, candidate: &CandidateMatch) -> Result<()> {
        self.store_at(company_id, fingerprint, candidate, Utc::now())
    }

    fn purge_expired(&self) -> Result<usize> {
        let Some(cutoff) = Utc::now().checked_sub_signed(self.ttl) else {
            return Ok(0);
        };
        let cutoff = timestamp(cutoff);
        let removed = self
            .store
            .conn()?
            .execute("DELETE FROM category_cache WHERE stored_at < ?1", [cutoff])?;
        Ok(removed)
    }

    fn clear(&self, company_id: &str) -> Result<usize> {
        let removed = self
            .store
            .conn()?
            .execute("DELETE FROM category_cache WHERE company_id = ?1", [company_id])?;
        Ok(removed)
    }
}

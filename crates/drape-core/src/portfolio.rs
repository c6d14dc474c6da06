//! In-memory portfolio of generated looks.
//!
//! Entries expire after a fixed time-to-live. Expiry is never implicit:
//! callers (or tests) invoke [`PortfolioStore::prune`] with the instant they
//! consider "now", and reads hide entries that have already expired.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::GenerationOutput;
use crate::traits::Clock;

/// Default lifetime of a portfolio entry.
pub const DEFAULT_TTL_DAYS: i64 = 7;
/// Default number of entries kept before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 50;

/// One generated result.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioEntry {
    pub id: Uuid,
    pub source_url: String,
    pub prompt: String,
    /// SHA-256 of the source image
    pub source_hash: String,
    pub output: GenerationOutput,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PortfolioEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Data needed to record a new entry.
#[derive(Debug, Clone)]
pub struct NewPortfolioEntry {
    pub source_url: String,
    pub prompt: String,
    pub source_hash: String,
    pub output: GenerationOutput,
}

/// Thread-safe, clonable handle to the portfolio.
#[derive(Clone)]
pub struct PortfolioStore<C: Clock> {
    entries: Arc<Mutex<Vec<PortfolioEntry>>>,
    clock: C,
    ttl: Duration,
    capacity: usize,
}

impl<C: Clock> PortfolioStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            clock,
            ttl: Duration::days(DEFAULT_TTL_DAYS),
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Capacity of zero is treated as one.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Acquires the entries lock, recovering from poison if necessary.
    fn lock(&self) -> MutexGuard<'_, Vec<PortfolioEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned portfolio mutex");
            poisoned.into_inner()
        })
    }

    /// Record an entry stamped with the store's clock, evicting the oldest
    /// entries beyond capacity.
    pub fn add(&self, new: NewPortfolioEntry) -> PortfolioEntry {
        let created_at = self.clock.now();
        let entry = PortfolioEntry {
            id: Uuid::new_v4(),
            source_url: new.source_url,
            prompt: new.prompt,
            source_hash: new.source_hash,
            output: new.output,
            created_at,
            expires_at: created_at + self.ttl,
        };

        let mut entries = self.lock();
        entries.push(entry.clone());
        if entries.len() > self.capacity {
            let overflow = entries.len() - self.capacity;
            entries.drain(..overflow);
            tracing::debug!(evicted = overflow, "Portfolio over capacity");
        }
        entry
    }

    /// Live entries, newest first.
    pub fn list(&self) -> Vec<PortfolioEntry> {
        let now = self.clock.now();
        self.lock()
            .iter()
            .rev()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<PortfolioEntry> {
        let now = self.clock.now();
        self.lock()
            .iter()
            .find(|e| e.id == id && !e.is_expired(now))
            .cloned()
    }

    /// Returns true if an entry was removed.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Drop every entry expired at `now`. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| !e.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!(removed, "Pruned expired portfolio entries");
        }
        removed
    }

    /// Number of stored entries, expired ones included until pruned.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

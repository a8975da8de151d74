//! Call record store
//!
//! In-memory keyed table of call records. Record identity is a set of known
//! aliases: lookups resolve through any alias to the canonical identifier,
//! which lets a task placeholder be promoted to the real call id without
//! ever mutating a map key out from under a concurrent reader.
//!
//! Every record sits behind its own `tokio::sync::Mutex`, so events for the
//! same call are serialized while unrelated calls proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::geo;
use crate::record::{CallRecord, Direction, Disposition};

/// Filters for the call history query surface.
#[derive(Debug, Default, Clone)]
pub struct CallFilter {
    pub region: Option<String>,
    pub disposition: Option<Disposition>,
    pub direction: Option<Direction>,
    pub counterpart: Option<String>,
    pub limit: usize,
}

pub struct CallStore {
    records: DashMap<String, Arc<Mutex<CallRecord>>>,
    /// alias -> canonical identifier
    aliases: DashMap<String, String>,
    lock_retry_attempts: u32,
    lock_retry_base_ms: u64,
}

impl CallStore {
    pub fn new(lock_retry_attempts: u32, lock_retry_base_ms: u64) -> Self {
        Self {
            records: DashMap::new(),
            aliases: DashMap::new(),
            lock_retry_attempts: lock_retry_attempts.max(1),
            lock_retry_base_ms: lock_retry_base_ms.max(1),
        }
    }

    /// Follow the alias chain to the canonical identifier.
    pub fn canonical(&self, identifier: &str) -> String {
        let mut current = identifier.to_string();
        // Promotions only ever point forward, so a short walk terminates.
        for _ in 0..4 {
            match self.aliases.get(&current) {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        current
    }

    pub fn resolve(&self, identifier: &str) -> Option<Arc<Mutex<CallRecord>>> {
        let canonical = self.canonical(identifier);
        self.records.get(&canonical).map(|e| e.value().clone())
    }

    /// Insert a freshly created record unless another writer beat us to it.
    /// Returns the live entry and whether this call inserted it.
    pub fn insert_or_get(&self, record: CallRecord) -> (Arc<Mutex<CallRecord>>, bool) {
        let canonical = self.canonical(&record.identifier);
        match self.records.entry(canonical) {
            dashmap::mapref::entry::Entry::Occupied(e) => (e.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                (v.insert(Arc::new(Mutex::new(record))).clone(), true)
            }
        }
    }

    /// Register another name for an existing record.
    pub fn add_alias(&self, alias: &str, identifier: &str) {
        let canonical = self.canonical(identifier);
        if alias != canonical {
            self.aliases.insert(alias.to_string(), canonical);
        }
    }

    /// Promote a placeholder identifier to the now-known real one. The entry
    /// is re-keyed under the real identifier and the placeholder becomes an
    /// alias, so lookups through either keep landing on the same record.
    ///
    /// Insert-then-remove ordering: the record is reachable under at least
    /// one key at every point, and a concurrent creator that already owns
    /// the real key keeps its entry instead of being clobbered.
    pub fn promote(&self, placeholder: &str, real: &str) {
        let canonical = self.canonical(placeholder);
        if canonical == real {
            return;
        }
        if let Some(entry) = self.records.get(&canonical).map(|e| e.value().clone()) {
            self.records.entry(real.to_string()).or_insert(entry);
        }
        self.aliases.insert(canonical.clone(), real.to_string());
        if placeholder != canonical {
            self.aliases.insert(placeholder.to_string(), real.to_string());
        }
        self.records.remove(&canonical);
    }

    /// Acquire a record's write lock with bounded, jittered retries.
    /// Exhausting the attempts is the `RaceDetected` failure of the engine.
    pub async fn lock(&self, identifier: &str) -> Result<OwnedMutexGuard<CallRecord>> {
        let entry = self
            .resolve(identifier)
            .ok_or_else(|| Error::CallNotFound(identifier.to_string()))?;
        self.lock_entry(entry, identifier).await
    }

    pub async fn lock_entry(
        &self,
        entry: Arc<Mutex<CallRecord>>,
        identifier: &str,
    ) -> Result<OwnedMutexGuard<CallRecord>> {
        for attempt in 0..self.lock_retry_attempts {
            if let Ok(guard) = entry.clone().try_lock_owned() {
                return Ok(guard);
            }
            let backoff = self.lock_retry_base_ms << attempt.min(6);
            let jitter = rand::thread_rng().gen_range(0..=self.lock_retry_base_ms);
            tokio::time::sleep(std::time::Duration::from_millis(backoff + jitter)).await;
        }
        Err(Error::RaceDetected(identifier.to_string()))
    }

    /// Clone every committed record. Readers tolerate slightly stale data;
    /// this never takes more than one record lock at a time.
    pub async fn snapshot(&self) -> Vec<CallRecord> {
        let entries: Vec<Arc<Mutex<CallRecord>>> =
            self.records.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(entry.lock().await.clone());
        }
        out
    }

    /// Filtered history query, newest first.
    pub async fn query(&self, filter: &CallFilter) -> Vec<CallRecord> {
        let counterpart = filter
            .counterpart
            .as_deref()
            .map(geo::normalize_number);
        let mut records: Vec<CallRecord> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|rec| {
                filter
                    .region
                    .as_deref()
                    .map(|r| rec.region_code.as_deref() == Some(r))
                    .unwrap_or(true)
                    && filter
                        .disposition
                        .map(|d| rec.disposition == d)
                        .unwrap_or(true)
                    && filter
                        .direction
                        .map(|d| rec.direction == d)
                        .unwrap_or(true)
                    && counterpart
                        .as_deref()
                        .map(|c| geo::normalize_number(&rec.counterpart_number) == c)
                        .unwrap_or(true)
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            records.truncate(filter.limit);
        }
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

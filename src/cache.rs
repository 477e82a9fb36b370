//! This module provides a short-lived, in-memory cache of vCard bodies, keyed by contact and validated by entity tags
//!
//! A cached body is only served when the entity tag the server currently reports for the contact is the one the body
//! was fetched at. This avoids downloading contacts that have not changed since the last listing.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::contact::{ContactId, EntityTag};

/// Default lifetime of a cache entry
pub const DEFAULT_TTL_SECS: u64 = 300;


/// A vCard body, as fetched at a given time
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub contact_id: ContactId,
    pub raw_body: String,
    pub entity_tag: EntityTag,
    pub fetched_at: DateTime<Utc>,
}

/// Where a [`FetchResult`] comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
}

/// The content of a contact, either downloaded or served from the cache
#[derive(Clone, Debug, PartialEq)]
pub struct FetchResult {
    pub body: String,
    pub entity_tag: Option<EntityTag>,
    pub source: FetchSource,
}

impl From<CacheEntry> for FetchResult {
    fn from(entry: CacheEntry) -> Self {
        Self {
            body: entry.raw_body,
            entity_tag: Some(entry.entity_tag),
            source: FetchSource::Cache,
        }
    }
}


/// Maps contacts to their last fetched body.
///
/// A single lock guards the whole map. This is meant to be shared between concurrent requests, e.g. in an `Arc`.
#[derive(Debug)]
pub struct EntityTagCache {
    ttl: Duration,
    entries: Mutex<HashMap<ContactId, CacheEntry>>,
}

impl Default for EntityTagCache {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl EntityTagCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(DEFAULT_TTL_SECS as i64));
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ContactId, CacheEntry>> {
        // Entries are replaced whole, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.fetched_at) > self.ttl
    }

    /// Return the entry for this contact, unless it is missing or expired
    pub fn get(&self, contact_id: &ContactId) -> Option<CacheEntry> {
        self.get_at(contact_id, Utc::now())
    }

    /// Same as [`Self::get`], as if it was called at `now`
    pub fn get_at(&self, contact_id: &ContactId, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entries = self.lock();
        match entries.get(contact_id) {
            Some(entry) if self.is_expired(entry, now) == false => Some(entry.clone()),
            _ => None,
        }
    }

    /// Return the cached body, only if it has been fetched at `current_tag`
    pub fn get_if_current(&self, contact_id: &ContactId, current_tag: &EntityTag) -> Option<FetchResult> {
        match self.get(contact_id) {
            Some(entry) if &entry.entity_tag == current_tag => {
                log::debug!("Cache hit for {}", contact_id);
                Some(entry.into())
            },
            Some(_) => {
                log::debug!("Cache entry for {} is stale", contact_id);
                None
            },
            None => {
                log::debug!("Cache miss for {}", contact_id);
                None
            },
        }
    }

    /// Insert or replace the entry for this contact
    pub fn put(&self, contact_id: ContactId, body: String, entity_tag: EntityTag) {
        self.put_at(contact_id, body, entity_tag, Utc::now())
    }

    /// Same as [`Self::put`], as if it was called at `now`
    pub fn put_at(&self, contact_id: ContactId, body: String, entity_tag: EntityTag, now: DateTime<Utc>) {
        let entry = CacheEntry {
            contact_id: contact_id.clone(),
            raw_body: body,
            entity_tag,
            fetched_at: now,
        };
        self.lock().insert(contact_id, entry);
    }

    /// Remove every entry that is older than the TTL. Returns the number of removed entries
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| now.signed_duration_since(entry.fetched_at) <= ttl);
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Swept {} expired cache entries", removed);
        }
        removed
    }

    /// Forget about a contact, e.g. because it has just been modified or deleted
    pub fn invalidate(&self, contact_id: &ContactId) {
        if self.lock().remove(contact_id).is_some() {
            log::debug!("Invalidated cache entry for {}", contact_id);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

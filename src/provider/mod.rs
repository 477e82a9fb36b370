//! This modules exposes an address book as a list of contacts, that can be created, modified and deleted.
//!
//! It is the only place that combines the remote address book, the vCard codec and the entity tag cache.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::{EntityTagCache, FetchResult, FetchSource};
use crate::client::Client;
use crate::config::Settings;
use crate::contact::{ContactForm, ContactId, ContactRecord, EntityTag, EntryInfo};
use crate::error::{Result, SyncError};
use crate::traits::DavAddressBook;
use crate::vcard;

pub mod sync_progress;
use sync_progress::SyncProgress;

/// From how many contacts to download, a single REPORT request is used instead of one GET per contact
#[cfg(not(test))]
const BULK_FETCH_THRESHOLD: usize = 30;
/// From how many contacts to download, a single REPORT request is used instead of one GET per contact
#[cfg(test)]
const BULK_FETCH_THRESHOLD: usize = 3;


/// What [`ContactSyncService::delete_contact`] actually did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The contact did not exist (anymore). This is not an error from the user's point of view
    AlreadyGone,
}

/// Whether the address book can be reached
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub collection_url: String,
    pub message: String,
}


/// Lists and edits the contacts of a single remote address book.
///
/// This is meant to be shared between concurrent requests. The cache is the only mutable state.
#[derive(Debug)]
pub struct ContactSyncService<A: DavAddressBook> {
    address_book: A,
    cache: Arc<EntityTagCache>,
}

impl ContactSyncService<Client> {
    /// Create a service that talks to the CardDAV server described by `settings`.
    ///
    /// This does not start a connection
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::new(settings)?;
        let cache = Arc::new(EntityTagCache::new(settings.cache_ttl()));
        Ok(Self::new(client, cache))
    }
}

impl<A: DavAddressBook> ContactSyncService<A> {
    pub fn new(address_book: A, cache: Arc<EntityTagCache>) -> Self {
        Self { address_book, cache }
    }

    pub fn address_book(&self) -> &A {
        &self.address_book
    }

    pub fn cache(&self) -> &Arc<EntityTagCache> {
        &self.cache
    }

    /// Check the address book is reachable. This never fails, errors are reported in the returned status
    pub async fn health(&self) -> HealthStatus {
        let collection_url = self.address_book.location();
        match self.address_book.discover().await {
            Ok(()) => HealthStatus {
                healthy: true,
                collection_url,
                message: "address book is reachable".to_string(),
            },
            Err(err) => {
                log::error!("Address book {} is not usable: {}", collection_url, err);
                HealthStatus {
                    healthy: false,
                    collection_url,
                    message: err.to_string(),
                }
            },
        }
    }

    /// Returns every valid contact of the address book, sorted by family name then given name.
    ///
    /// Contacts that cannot be downloaded or decoded (or that have no full name) are skipped and logged,
    /// they do not make the whole listing fail.
    pub async fn list_contacts(&self) -> Result<Vec<ContactRecord>> {
        let mut progress = SyncProgress::new();
        self.cache.sweep(Utc::now());

        let entries = self.address_book.list_entries().await?;
        progress.debug(&format!("{} entries in {}", entries.len(), self.address_book.location()));

        let mut fetched: Vec<(ContactId, FetchResult)> = Vec::new();
        let mut misses: Vec<EntryInfo> = Vec::new();
        for entry in entries {
            let hit = entry.entity_tag.as_ref()
                .and_then(|tag| self.cache.get_if_current(&entry.id, tag));
            match hit {
                Some(result) => fetched.push((entry.id, result)),
                None => misses.push(entry),
            }
        }

        if misses.len() >= BULK_FETCH_THRESHOLD {
            match self.fetch_in_bulk(&misses).await {
                Ok(results) => {
                    let returned: HashSet<ContactId> = results.iter().map(|(id, _)| id.clone()).collect();
                    misses.retain(|entry| returned.contains(&entry.id) == false);
                    if misses.is_empty() == false {
                        progress.debug(&format!("{} contacts missing from the bulk download, downloading them one by one", misses.len()));
                    }
                    fetched.extend(results);
                },
                Err(SyncError::Auth{ status }) => return Err(SyncError::Auth{ status }),
                Err(err) => progress.debug(&format!("Bulk download failed ({}), downloading contacts one by one", err)),
            }
        }

        for entry in misses {
            match self.fetch_one(&entry).await {
                Ok(result) => fetched.push((entry.id, result)),
                Err(SyncError::NotFound(_)) => progress.debug(&format!("{} has been removed in the meantime", entry.id)),
                Err(SyncError::Auth{ status }) => return Err(SyncError::Auth{ status }),
                Err(err) => progress.warn(&format!("Unable to download contact {}: {}. Skipping it", entry.id, err)),
            }
        }

        let mut contacts = Vec::with_capacity(fetched.len());
        for (id, result) in fetched {
            progress.increment_counter(1);
            match decode_record(id.clone(), result) {
                Ok(record) => contacts.push(record),
                Err(err) => progress.warn(&format!("Skipping contact {}: {}", id, err)),
            }
        }
        contacts.sort_by_key(|contact| contact.sort_key());

        if progress.is_success() {
            progress.debug(&format!("Listed {} contacts", contacts.len()));
        } else {
            progress.info(&format!("Listed {} of {} contacts, {} skipped", contacts.len(), progress.counter(), progress.n_errors()));
        }
        Ok(contacts)
    }

    /// Download a single contact, and cache it
    async fn fetch_one(&self, entry: &EntryInfo) -> Result<FetchResult> {
        let (body, fetched_tag) = self.address_book.fetch_body(&entry.id).await?;
        let entity_tag = fetched_tag.or_else(|| entry.entity_tag.clone());
        if let Some(tag) = &entity_tag {
            self.cache.put(entry.id.clone(), body.clone(), tag.clone());
        }
        Ok(FetchResult { body, entity_tag, source: FetchSource::Network })
    }

    /// Download the given contacts in a single request, and cache them
    async fn fetch_in_bulk(&self, wanted: &[EntryInfo]) -> Result<Vec<(ContactId, FetchResult)>> {
        let wanted: HashSet<&ContactId> = wanted.iter().map(|entry| &entry.id).collect();

        let mut results = Vec::new();
        for entry in self.address_book.query_entries().await? {
            if wanted.contains(&entry.id) == false {
                continue;
            }
            if let Some(tag) = &entry.entity_tag {
                self.cache.put(entry.id.clone(), entry.body.clone(), tag.clone());
            }
            results.push((entry.id, FetchResult {
                body: entry.body,
                entity_tag: entry.entity_tag,
                source: FetchSource::Network,
            }));
        }
        Ok(results)
    }

    /// Store a new contact. It is given a fresh `UID` and a fresh resource name
    pub async fn create_contact(&self, form: &ContactForm) -> Result<ContactRecord> {
        form.validate()?;

        let uid = Uuid::new_v4().to_hyphenated().to_string();
        let fields = form.to_fields(Some(uid))?;
        let body = vcard::encode(&fields);

        let (id, entity_tag) = self.address_book.create_entry(body.clone()).await?;
        if let Some(tag) = &entity_tag {
            self.cache.put(id.clone(), body.clone(), tag.clone());
        }

        decode_record(id, FetchResult { body, entity_tag, source: FetchSource::Network })
    }

    /// Replace a contact with the content of `form`.
    ///
    /// Its `UID` is kept, and so is its photo unless the form provides a new one.
    /// The write only happens if the contact has not changed since the version the form (or else the cache) was built
    /// from, otherwise this fails with [`SyncError::OptimisticLock`].
    pub async fn update_contact(&self, id: &ContactId, form: &ContactForm) -> Result<ContactRecord> {
        form.validate()?;

        let cached_tag = self.cache.get(id).map(|entry| entry.entity_tag);
        let (current_body, fetched_tag) = self.address_book.fetch_body(id).await?;
        log::trace!("Current version of {}:\n{}", id, current_body);
        let current = vcard::decode(&current_body)?;

        let uid = match current.uid.clone() {
            Some(uid) => uid,
            None => {
                log::info!("Contact {} has no UID, assigning one", id);
                Uuid::new_v4().to_hyphenated().to_string()
            },
        };

        let mut fields = form.to_fields(Some(uid))?;
        if fields.photo.is_none() {
            fields.photo = current.photo_bytes();
        }
        let body = vcard::encode(&fields);

        let expected: Option<EntityTag> = form.expected_entity_tag()
            .or(cached_tag)
            .or(fetched_tag);

        let new_tag = self.address_book.update_entry(id, body.clone(), expected.as_ref()).await?;
        self.cache.invalidate(id);

        decode_record(id.clone(), FetchResult { body, entity_tag: new_tag, source: FetchSource::Network })
    }

    /// Remove a contact. Removing a contact that does not exist is not an error
    pub async fn delete_contact(&self, id: &ContactId) -> Result<DeleteOutcome> {
        let outcome = match self.address_book.delete_entry(id).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(SyncError::NotFound(_)) => {
                log::warn!("Contact {} was already deleted", id);
                DeleteOutcome::AlreadyGone
            },
            Err(err) => return Err(err),
        };
        self.cache.invalidate(id);
        Ok(outcome)
    }
}

fn decode_record(id: ContactId, result: FetchResult) -> Result<ContactRecord> {
    let card = vcard::decode(&result.body)?;
    for warning in &card.warnings {
        log::debug!("{}: ignored {} ({})", id, warning.property, warning.reason);
    }
    ContactRecord::from_card(id, result.entity_tag, card)
}

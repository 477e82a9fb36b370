//! An in-memory address book, that behaves like a CardDAV collection.
//!
//! It is used to test the sync logic without a server.
#![cfg(any(test, feature = "mock_address_book"))]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::contact::{ContactId, EntityTag, EntryInfo, RemoteEntry};
use crate::error::{Result, SyncError};
use crate::mock_behaviour::MockBehaviour;
use crate::traits::DavAddressBook;

/// How many times each operation has been called
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounters {
    pub list_entries: u32,
    pub query_entries: u32,
    pub fetch_body: u32,
    pub create_entry: u32,
    pub update_entry: u32,
    pub delete_entry: u32,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<ContactId, (String, EntityTag)>,
    last_version: u64,
    calls: CallCounters,
}

impl MockState {
    fn next_tag(&mut self) -> EntityTag {
        self.last_version += 1;
        EntityTag::from(format!("\"{}\"", self.last_version))
    }
}

#[derive(Debug)]
pub struct MockAddressBook {
    location: String,
    report_entity_tags: bool,
    /// Entries that bulk queries do not return
    omitted_from_queries: Vec<ContactId>,
    state: Mutex<MockState>,
    mock_behaviour: Option<Arc<Mutex<MockBehaviour>>>,
}

impl Default for MockAddressBook {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAddressBook {
    pub fn new() -> Self {
        Self {
            location: "mock://contacts/".to_string(),
            report_entity_tags: true,
            omitted_from_queries: Vec::new(),
            state: Mutex::new(MockState::default()),
            mock_behaviour: None,
        }
    }

    /// Make some operations fail, as described by `behaviour`
    pub fn with_behaviour(mut self, behaviour: Arc<Mutex<MockBehaviour>>) -> Self {
        self.mock_behaviour = Some(behaviour);
        self
    }

    /// Behave like a server that does not advertise `getetag` in its listings
    pub fn without_entity_tags(mut self) -> Self {
        self.report_entity_tags = false;
        self
    }

    /// Behave like a server whose bulk queries leave out a resource that its listings have
    pub fn omitting_from_queries(mut self, id: &str) -> Self {
        if let Some(id) = ContactId::from_href(id) {
            self.omitted_from_queries.push(id);
        }
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut MockBehaviour) -> Result<()>,
    {
        match &self.mock_behaviour {
            None => Ok(()),
            Some(behaviour) => {
                let mut behaviour = behaviour.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                f(&mut behaviour)
            },
        }
    }

    /// Store a resource, as if another client did it. Returns its new version
    pub fn insert(&self, id: &str, body: &str) -> EntityTag {
        let id = ContactId::from_href(id).unwrap_or_else(ContactId::random);
        let mut state = self.state();
        let tag = state.next_tag();
        state.entries.insert(id, (body.to_string(), tag.clone()));
        tag
    }

    pub fn body_of(&self, id: &ContactId) -> Option<String> {
        self.state().entries.get(id).map(|(body, _)| body.clone())
    }

    pub fn tag_of(&self, id: &ContactId) -> Option<EntityTag> {
        self.state().entries.get(id).map(|(_, tag)| tag.clone())
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self) -> CallCounters {
        self.state().calls
    }
}

#[async_trait]
impl DavAddressBook for MockAddressBook {
    fn location(&self) -> String {
        self.location.clone()
    }

    async fn discover(&self) -> Result<()> {
        self.check(MockBehaviour::can_discover)
    }

    async fn list_entries(&self) -> Result<Vec<EntryInfo>> {
        self.state().calls.list_entries += 1;
        self.check(MockBehaviour::can_list_entries)?;

        let report = self.report_entity_tags;
        Ok(self.state().entries.iter()
            .map(|(id, (_, tag))| EntryInfo {
                id: id.clone(),
                entity_tag: if report { Some(tag.clone()) } else { None },
            })
            .collect())
    }

    async fn query_entries(&self) -> Result<Vec<RemoteEntry>> {
        self.state().calls.query_entries += 1;
        self.check(MockBehaviour::can_query_entries)?;

        Ok(self.state().entries.iter()
            .filter(|(id, _)| self.omitted_from_queries.contains(id) == false)
            .map(|(id, (body, tag))| RemoteEntry {
                id: id.clone(),
                entity_tag: Some(tag.clone()),
                body: body.clone(),
            })
            .collect())
    }

    async fn fetch_body(&self, id: &ContactId) -> Result<(String, Option<EntityTag>)> {
        self.state().calls.fetch_body += 1;
        self.check(MockBehaviour::can_fetch_body)?;

        match self.state().entries.get(id) {
            None => Err(SyncError::NotFound(id.to_string())),
            Some((body, tag)) => Ok((body.clone(), Some(tag.clone()))),
        }
    }

    async fn create_entry(&self, vcard: String) -> Result<(ContactId, Option<EntityTag>)> {
        self.state().calls.create_entry += 1;
        self.check(MockBehaviour::can_create_entry)?;

        let id = ContactId::random();
        let mut state = self.state();
        if state.entries.contains_key(&id) {
            return Err(SyncError::Conflict(id.to_string()));
        }
        let tag = state.next_tag();
        state.entries.insert(id.clone(), (vcard, tag.clone()));
        Ok((id, Some(tag)))
    }

    async fn update_entry(&self, id: &ContactId, vcard: String, expected: Option<&EntityTag>) -> Result<Option<EntityTag>> {
        self.state().calls.update_entry += 1;
        self.check(MockBehaviour::can_update_entry)?;

        let mut state = self.state();
        let current = match state.entries.get(id) {
            None => return Err(SyncError::NotFound(id.to_string())),
            Some((_, tag)) => tag.clone(),
        };
        if let Some(expected) = expected {
            if expected != &current {
                return Err(SyncError::OptimisticLock(id.to_string()));
            }
        }
        let tag = state.next_tag();
        state.entries.insert(id.clone(), (vcard, tag.clone()));
        Ok(Some(tag))
    }

    async fn delete_entry(&self, id: &ContactId) -> Result<()> {
        self.state().calls.delete_entry += 1;
        self.check(MockBehaviour::can_delete_entry)?;

        match self.state().entries.remove(id) {
            None => Err(SyncError::NotFound(id.to_string())),
            Some(_) => Ok(()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn versions_change_on_every_write() {
        let book = MockAddressBook::new();
        let (id, created) = book.create_entry("v1".to_string()).await.unwrap();
        let created = created.unwrap();

        let updated = book.update_entry(&id, "v2".to_string(), Some(&created)).await.unwrap().unwrap();
        assert_ne!(created, updated);

        let err = book.update_entry(&id, "v3".to_string(), Some(&created)).await.unwrap_err();
        assert_eq!(err, SyncError::OptimisticLock(id.to_string()));
        assert_eq!(book.body_of(&id).as_deref(), Some("v2"));

        book.delete_entry(&id).await.unwrap();
        assert_eq!(book.delete_entry(&id).await.unwrap_err(), SyncError::NotFound(id.to_string()));
    }

    #[tokio::test]
    async fn listing_without_tags() {
        let book = MockAddressBook::new().without_entity_tags();
        book.insert("a.vcf", "body");
        let entries = book.list_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].entity_tag.is_none());
        assert_eq!(book.calls().list_entries, 1);
    }
}

//! Traits used by multiple structs in this crate

use async_trait::async_trait;

use crate::contact::{ContactId, EntityTag, EntryInfo, RemoteEntry};
use crate::error::{Result, SyncError};

/// A remote address book: a single collection of vCard resources.
///
/// This is implemented by the HTTP [`Client`](crate::client::Client), and by an in-memory mock for tests.
/// Implementations never retry by themselves: transport errors are returned to the caller, that may retry idempotent
/// operations (listing, fetching) at its discretion.
#[async_trait]
pub trait DavAddressBook: Send + Sync {
    /// A human-readable description of where the address book lives (usually its URL)
    fn location(&self) -> String;

    /// Check the address book is reachable with the configured credentials.
    ///
    /// This fails with [`SyncError::Auth`] in case the credentials are rejected, or [`SyncError::Connectivity`]
    /// in case the server does not answer as a WebDAV collection should
    async fn discover(&self) -> Result<()>;

    /// Returns the name and version of every vCard resource of the collection.
    ///
    /// Every call issues a new request
    async fn list_entries(&self) -> Result<Vec<EntryInfo>>;

    /// Returns the name, version and content of every vCard resource of the collection, in as few requests as possible
    async fn query_entries(&self) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        for info in self.list_entries().await? {
            match self.fetch_body(&info.id).await {
                Ok((body, entity_tag)) => entries.push(RemoteEntry {
                    id: info.id,
                    entity_tag: entity_tag.or(info.entity_tag),
                    body,
                }),
                // Removed in the meantime
                Err(SyncError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(entries)
    }

    /// Returns the current content of a resource and its version (if the server tells it)
    async fn fetch_body(&self, id: &ContactId) -> Result<(String, Option<EntityTag>)>;

    /// Store a new resource under a fresh random name, and returns this name (and the version of the new resource, if known).
    ///
    /// This fails with [`SyncError::Conflict`] in case the name is already taken.
    /// This is not idempotent, and should not be blindly retried.
    async fn create_entry(&self, vcard: String) -> Result<(ContactId, Option<EntityTag>)>;

    /// Replace the content of a resource.
    ///
    /// In case `expected` is given, the write only happens if the resource is still at this version, otherwise this
    /// fails with [`SyncError::OptimisticLock`]. Without `expected`, the last writer wins.
    async fn update_entry(&self, id: &ContactId, vcard: String, expected: Option<&EntityTag>) -> Result<Option<EntityTag>>;

    /// Remove a resource. This fails with [`SyncError::NotFound`] in case it does not exist
    async fn delete_entry(&self, id: &ContactId) -> Result<()>;
}

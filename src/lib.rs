//! This crate provides a way to manage the contacts of a CardDAV address book.
//!
//! It provides a CardDAV client in the [`client`] module, that can be used as a stand-alone module.
//! Contacts are vCard 3.0 files, that are built and parsed by the [`vcard`] module.
//!
//! Because downloading every contact on every listing is slow, this crate also provides a short-lived cache of vCard
//! bodies in the [`cache`] module, that is only used as long as the server reports the same entity tag for a contact.
//!
//! These are combined in a [`ContactSyncService`](provider::ContactSyncService), that lists, creates, updates and deletes
//! contacts, and that is meant to be used by a web front-end.

pub mod traits;

pub mod contact;
pub use contact::{ContactForm, ContactId, ContactRecord, EntityTag};
pub mod vcard;
pub mod provider;
pub use provider::{ContactSyncService, DeleteOutcome, HealthStatus};

pub mod client;
pub mod cache;
pub mod resource;

pub mod error;
pub use error::SyncError;
pub mod config;
pub use config::Settings;
pub mod utils;

pub mod mock_behaviour;
pub mod mock_address_book;

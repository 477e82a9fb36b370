//! Scenarios of a web front-end that lists and edits contacts, against an in-process CardDAV server

mod common;

use carddav_contacts::{ContactForm, ContactId, ContactSyncService, DeleteOutcome, SyncError};

use common::{vcard, FakeServer};

fn form(first_name: &str, last_name: &str, email: &str) -> ContactForm {
    ContactForm {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        ..ContactForm::default()
    }
}

#[tokio::test]
async fn malformed_contacts_do_not_break_the_listing() {
    let server = FakeServer::start().await;
    server.insert("1.vcf", &vcard("1", "Zoe Zimmer", "Zimmer", "Zoe"));
    server.insert("2.vcf", "BEGIN:VCARD\r\nthis is garbage");
    server.insert("3.vcf", &vcard("3", "adam abbott", "abbott", "adam"));
    let service = ContactSyncService::from_settings(&server.settings()).unwrap();

    let contacts = service.list_contacts().await.unwrap();
    let names: Vec<&str> = contacts.iter().map(|c| c.full_name.as_str()).collect();
    assert_eq!(names, vec!["adam abbott", "Zoe Zimmer"]);
}

#[tokio::test]
async fn contacts_without_full_name_are_not_listed() {
    let server = FakeServer::start().await;
    server.insert("1.vcf", &vcard("1", "Jane Doe", "Doe", "Jane"));
    server.insert("2.vcf", "BEGIN:VCARD\r\nVERSION:3.0\r\nEMAIL:ghost@example.com\r\nUID:2\r\nEND:VCARD\r\n");
    let service = ContactSyncService::from_settings(&server.settings()).unwrap();

    let contacts = service.list_contacts().await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].full_name, "Jane Doe");
}

#[tokio::test]
async fn unchanged_contacts_are_not_downloaded_again() {
    let server = FakeServer::start().await;
    server.insert("1.vcf", &vcard("1", "Jane Doe", "Doe", "Jane"));
    server.insert("2.vcf", &vcard("2", "John Doe", "Doe", "John"));
    let service = ContactSyncService::from_settings(&server.settings()).unwrap();

    service.list_contacts().await.unwrap();
    assert_eq!(server.count("GET"), 2);

    let contacts = service.list_contacts().await.unwrap();
    assert_eq!(contacts.len(), 2);
    assert_eq!(server.count("GET"), 2);
    assert_eq!(server.count("PROPFIND"), 2);

    server.insert("2.vcf", &vcard("2", "John Smith", "Smith", "John"));
    let contacts = service.list_contacts().await.unwrap();
    assert_eq!(contacts[1].full_name, "John Smith");
    assert_eq!(server.count("GET"), 3);
}

#[tokio::test]
async fn large_address_books_are_downloaded_in_one_request() {
    let server = FakeServer::start().await;
    for i in 0..40 {
        server.insert(&format!("{:02}.vcf", i), &vcard(&i.to_string(), &format!("Person {:02}", i), &format!("Person {:02}", i), "Some"));
    }
    let service = ContactSyncService::from_settings(&server.settings()).unwrap();

    let contacts = service.list_contacts().await.unwrap();
    assert_eq!(contacts.len(), 40);
    assert_eq!(contacts[0].full_name, "Person 00");
    assert_eq!(server.count("REPORT"), 1);
    assert_eq!(server.count("GET"), 0);
}

#[tokio::test]
async fn create_list_and_delete() {
    let server = FakeServer::start().await;
    let service = ContactSyncService::from_settings(&server.settings()).unwrap();

    let mut new_contact = form("Jane", "Doe", "jane@example.com");
    new_contact.street = "1 Main Street".to_string();
    new_contact.city = "Springfield".to_string();
    new_contact.photo = Some(vec![0xff, 0xd8, 0xff, 0xe0]);
    let created = service.create_contact(&new_contact).await.unwrap();
    assert_eq!(created.full_name, "Jane Doe");
    assert_eq!(server.names(), vec![created.id.to_string()]);

    let contacts = service.list_contacts().await.unwrap();
    assert_eq!(contacts.len(), 1);
    let listed = &contacts[0];
    assert_eq!(listed.id, created.id);
    assert_eq!(listed.uid, created.uid);
    assert_eq!(listed.email.as_deref(), Some("jane@example.com"));
    assert_eq!(listed.photo.as_deref(), Some("/9j/4A=="));
    let address = listed.address.as_ref().unwrap();
    assert_eq!(address.street, "1 Main Street");
    assert_eq!(address.city, "Springfield");

    assert_eq!(service.delete_contact(&created.id).await.unwrap(), DeleteOutcome::Deleted);
    assert!(service.list_contacts().await.unwrap().is_empty());
    assert_eq!(service.delete_contact(&created.id).await.unwrap(), DeleteOutcome::AlreadyGone);
}

#[tokio::test]
async fn concurrent_edits_are_detected() {
    let server = FakeServer::start().await;
    server.insert("1.vcf", &vcard("original-uid", "Jane Doe", "Doe", "Jane"));
    let id: ContactId = "1.vcf".parse().unwrap();

    // Two users open the edit form of the same contact
    let service = ContactSyncService::from_settings(&server.settings()).unwrap();
    let seen_by_a = service.list_contacts().await.unwrap().remove(0);
    let seen_by_b = seen_by_a.clone();

    let mut edit_a = form("Jane", "Smith", "jane@example.com");
    edit_a.entity_tag = seen_by_a.entity_tag.map(|tag| tag.to_string());
    let updated = service.update_contact(&id, &edit_a).await.unwrap();
    assert_eq!(updated.uid.as_deref(), Some("original-uid"));

    let mut edit_b = form("Jane", "Roe", "jane@example.com");
    edit_b.entity_tag = seen_by_b.entity_tag.map(|tag| tag.to_string());
    let err = service.update_contact(&id, &edit_b).await.unwrap_err();
    assert_eq!(err, SyncError::OptimisticLock("1.vcf".to_string()));

    let body = server.body_of("1.vcf").unwrap();
    assert!(body.contains("N:Smith;Jane;;;"));
    assert!(body.contains("UID:original-uid"));

    let contacts = service.list_contacts().await.unwrap();
    assert_eq!(contacts[0].full_name, "Jane Smith");
}

#[tokio::test]
async fn errors_are_readable() {
    let server = FakeServer::start().await;
    let service = ContactSyncService::from_settings(&server.settings()).unwrap();

    let err = service.create_contact(&form("Jane", "Doe", "")).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert!(err.to_string().contains("email"));

    let missing: ContactId = "missing.vcf".parse().unwrap();
    let err = service.update_contact(&missing, &form("Jane", "Doe", "jane@example.com")).await.unwrap_err();
    assert_eq!(err, SyncError::NotFound("missing.vcf".to_string()));
}

#[tokio::test]
async fn health() {
    let server = FakeServer::start().await;
    let service = ContactSyncService::from_settings(&server.settings()).unwrap();

    let status = service.health().await;
    assert!(status.healthy);
    assert_eq!(status.collection_url, server.url());
}

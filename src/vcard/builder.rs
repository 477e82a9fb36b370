//! A module to build vCard files

use base64::Engine;
use uuid::Uuid;

use crate::vcard::{escape_text, fold_line, split_components, VCardFields};

/// Number of components of a structured `N` value
const N_COMPONENTS: usize = 5;

/// Create a vCard 3.0 file from a set of fields.
///
/// Lines are CRLF-separated and folded at 75 octets. A random `UID` is generated in case `fields` has none.
pub fn encode(fields: &VCardFields) -> String {
    let uid = match &fields.uid {
        Some(uid) if uid.trim().is_empty() == false => uid.trim().to_string(),
        _ => Uuid::new_v4().to_hyphenated().to_string(),
    };

    let mut lines = vec![
        "BEGIN:VCARD".to_string(),
        "VERSION:3.0".to_string(),
    ];

    if let Some(full_name) = present(&fields.full_name) {
        lines.push(format!("FN:{}", escape_text(full_name)));
    }
    if let Some(n) = present(&fields.n) {
        lines.push(format!("N:{}", structured_name(n)));
    }
    if let Some(org) = present(&fields.organization) {
        lines.push(format!("ORG:{}", escape_text(org)));
    }
    if let Some(title) = present(&fields.title) {
        lines.push(format!("TITLE:{}", escape_text(title)));
    }
    if let Some(email) = present(&fields.email) {
        lines.push(format!("EMAIL:{}", single_line(email)));
    }
    if let Some(tel) = present(&fields.phone) {
        lines.push(format!("TEL:{}", single_line(tel)));
    }
    if let Some(adr) = fields.address.as_ref().filter(|adr| adr.is_empty() == false) {
        // Post office box and extended address are never used
        lines.push(format!("ADR:;;{};{};;{};{}",
            escape_text(&adr.street), escape_text(&adr.city),
            escape_text(&adr.postal_code), escape_text(&adr.country)));
    }
    if let Some(url) = present(&fields.url) {
        lines.push(format!("URL:{}", single_line(url)));
    }
    if let Some(photo) = fields.photo.as_ref().filter(|p| p.is_empty() == false) {
        let b64 = base64::engine::general_purpose::STANDARD.encode(photo);
        lines.push(format!("PHOTO;ENCODING=b;TYPE=JPEG:{}", b64));
    }
    if let Some(bday) = present(&fields.birthday) {
        lines.push(format!("BDAY:{}", single_line(bday)));
    }
    if let Some(note) = present(&fields.note) {
        lines.push(format!("NOTE:{}", escape_text(note)));
    }
    lines.push(format!("UID:{}", single_line(&uid)));
    lines.push("END:VCARD".to_string());
    lines.push(String::new());

    lines.iter()
        .map(|line| fold_line(line))
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref()
        .map(str::trim)
        .filter(|v| v.is_empty() == false)
}

/// Values that are written verbatim must at least not break the line structure
fn single_line(value: &str) -> String {
    value.replace(|c: char| c == '\r' || c == '\n', " ")
}

/// Format a `N` value as `last;first;;;`.
///
/// Values that are already structured are kept as-is (padded to 5 components if needed).
/// Plain names are split on their first space: the first token is the family name, the remainder is the given name
fn structured_name(n: &str) -> String {
    if n.contains(';') {
        let n = single_line(n);
        let count = split_components(&n).len();
        if count >= N_COMPONENTS {
            return n;
        }
        return format!("{}{}", n, ";".repeat(N_COMPONENTS - count));
    }

    let mut parts = n.splitn(2, ' ');
    let last = parts.next().unwrap_or("");
    let first = parts.next().unwrap_or("").trim();
    format!("{};{};;;", escape_text(last), escape_text(first))
}

//! This module handles conversion between vCard 3.0 files and internal representations
//!
//! Parsing is delegated to the `ical` crate (which also parses vCards). Building is done by hand.

mod parser;
pub use parser::decode;
mod builder;
pub use builder::encode;

use base64::Engine;

pub use crate::contact::{Address, Birthday};

/// Lines longer than this are folded (RFC 2426 section 2.6)
const MAX_LINE_OCTETS: usize = 75;

/// Full name used for display when a card has no `FN`
pub const NO_NAME: &str = "No Name";


/// The fields a vCard is built from.
///
/// Every field is optional. Absent fields are not written, except the `UID`, which is generated if missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VCardFields {
    pub uid: Option<String>,
    pub full_name: Option<String>,
    /// Either an already structured `last;first;;;` value, or a plain `last first` name
    pub n: Option<String>,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub url: Option<String>,
    /// Written as-is, usually an ISO `YYYY-MM-DD` date
    pub birthday: Option<String>,
    pub note: Option<String>,
    pub address: Option<Address>,
    /// Raw JPEG bytes
    pub photo: Option<Vec<u8>>,
}


/// A property that could not be decoded. The rest of the card is still usable.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyWarning {
    pub property: String,
    pub reason: String,
}

/// The fields that have been decoded from a vCard
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedCard {
    pub uid: Option<String>,
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub birthday: Option<Birthday>,
    pub note: Option<String>,
    /// Base64 of the raw JPEG bytes
    pub photo: Option<String>,
    pub address: Option<Address>,

    /// Properties that have been skipped because they were malformed
    pub warnings: Vec<PropertyWarning>,
}

impl ParsedCard {
    /// The full name, or a placeholder for cards that have none
    pub fn display_name(&self) -> &str {
        match &self.full_name {
            Some(name) if name.is_empty() == false => name,
            _ => NO_NAME,
        }
    }

    /// The raw bytes of the photo, if any
    pub fn photo_bytes(&self) -> Option<Vec<u8>> {
        self.photo.as_ref()
            .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64).ok())
    }

    /// Convert back to the fields this card can be re-built from
    pub fn to_fields(&self) -> VCardFields {
        let n = if self.family_name.is_none() && self.given_name.is_none() {
            None
        } else {
            Some(format!("{};{};;;",
                escape_text(self.family_name.as_deref().unwrap_or("")),
                escape_text(self.given_name.as_deref().unwrap_or(""))))
        };

        VCardFields {
            uid: self.uid.clone(),
            full_name: self.full_name.clone(),
            n,
            organization: self.organization.clone(),
            title: self.title.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            url: self.url.clone(),
            birthday: self.birthday.as_ref().map(|b| b.to_vcard_value()),
            note: self.note.clone(),
            address: self.address.clone(),
            photo: self.photo_bytes(),
        }
    }
}


/// Escape a text value (RFC 2426 section 4)
pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ',' => escaped.push_str("\\,"),
            ';' => escaped.push_str("\\;"),
            '\n' => escaped.push_str("\\n"),
            '\r' => (),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Reverse of [`escape_text`]
pub fn unescape_text(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => unescaped.push('\n'),
            Some(',') => unescaped.push(','),
            Some(';') => unescaped.push(';'),
            Some('\\') => unescaped.push('\\'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            },
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Split a structured value (`N`, `ADR`, `ORG`) on its unescaped semicolons, and unescape every component
pub fn split_components(value: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            },
            ';' => components.push(unescape_text(&std::mem::take(&mut current))),
            c => current.push(c),
        }
    }
    components.push(unescape_text(&current));
    components
}

/// Fold a content line so that no physical line is longer than 75 octets
fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }

    let mut folded = String::with_capacity(line.len() + 3 * (line.len() / (MAX_LINE_OCTETS - 1) + 1));
    let mut rest = line;
    let mut limit = MAX_LINE_OCTETS;
    while rest.is_empty() == false {
        let mut cut = limit.min(rest.len());
        while rest.is_char_boundary(cut) == false {
            cut -= 1;
        }
        if limit != MAX_LINE_OCTETS {
            folded.push_str("\r\n ");
        }
        folded.push_str(&rest[..cut]);
        rest = &rest[cut..];
        // Continuation lines start with a space, that counts in the limit
        limit = MAX_LINE_OCTETS - 1;
    }
    folded
}

/// Join folded lines back, and normalize line endings
fn unfold(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in content.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if raw.starts_with(' ') || raw.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push_str(&raw[1..]);
                continue;
            }
        }
        if raw.trim().is_empty() {
            continue;
        }
        lines.push(raw.to_string());
    }
    lines
}

//! Address book entries, as exposed to the rest of an app

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SyncError};
use crate::vcard::{ParsedCard, VCardFields};

/// File extension of the vCard resources in a collection
pub const VCARD_EXTENSION: &str = ".vcf";


/// The name of a contact resource, relative to its collection (e.g. `3f2a...c1.vcf`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId {
    content: String,
}

impl ContactId {
    /// Generate a random id, unrelated to the content of the vCard.
    pub fn random() -> Self {
        Self { content: crate::utils::random_resource_name() }
    }

    /// Build an id from the `href` of a WebDAV response (i.e. keep its last path segment)
    pub fn from_href(href: &str) -> Option<Self> {
        let name = href.trim_end_matches('/').rsplit('/').next()?;
        if name.is_empty() {
            return None;
        }
        Some(Self { content: name.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn is_vcard(&self) -> bool {
        self.content.to_lowercase().ends_with(VCARD_EXTENSION)
    }
}

impl FromStr for ContactId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.contains(|c: char| matches!(c, '/' | '\\' | '?' | '#')) || s == "." || s == ".." {
            return Err(SyncError::Validation(format!("{:?} is not a valid contact id", s)));
        }
        Ok(Self { content: s.to_string() })
    }
}

impl Display for ContactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.content)
    }
}


/// An opaque token that identifies a version of a resource (an HTTP `ETag`)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityTag {
    tag: String,
}

impl From<String> for EntityTag {
    fn from(tag: String) -> Self {
        Self { tag }
    }
}

impl From<&str> for EntityTag {
    fn from(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

impl EntityTag {
    /// The tag, as the server sent it
    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// The tag, formatted for an `If-Match` header (i.e. quoted)
    pub fn as_header_value(&self) -> String {
        let tag = self.tag.trim();
        if tag.starts_with('"') || tag.starts_with("W/\"") {
            tag.to_string()
        } else {
            format!("\"{}\"", tag)
        }
    }

    /// The tag without its quotes and weakness marker.
    /// Servers are not consistent about quoting `getetag` values, so that comparisons should use this
    fn opaque(&self) -> &str {
        let tag = self.tag.trim();
        let tag = tag.strip_prefix("W/").unwrap_or(tag);
        tag.trim_matches('"')
    }
}

impl PartialEq for EntityTag {
    fn eq(&self, other: &Self) -> bool {
        self.opaque() == other.opaque()
    }
}
impl Eq for EntityTag {}

impl Display for EntityTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag)
    }
}


/// A birthday, as found in a `BDAY` property
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Birthday {
    /// A proper calendar date. It is stored as ISO `YYYY-MM-DD` in vCards, and displayed as `DD/MM/YYYY`
    Date(NaiveDate),
    /// Some servers store values we do not understand. They are kept as-is
    Unparsed(String),
}

impl Birthday {
    /// The value to store in a `BDAY` property
    pub fn to_vcard_value(&self) -> String {
        match self {
            Birthday::Date(date) => date.format("%Y-%m-%d").to_string(),
            Birthday::Unparsed(raw) => raw.clone(),
        }
    }

    /// Parse the value a user typed (`DD/MM/YYYY`), or an ISO date
    pub fn from_user_input(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.contains('/') {
            return NaiveDate::parse_from_str(input, "%d/%m/%Y")
                .map(Birthday::Date)
                .map_err(|_| SyncError::Validation(format!("{:?} is not a valid DD/MM/YYYY birthday", input)));
        }
        match NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            Ok(date) => Ok(Birthday::Date(date)),
            Err(_) if input.contains('-') => Err(SyncError::Validation(format!("{:?} is not a valid DD/MM/YYYY birthday", input))),
            Err(_) => Ok(Birthday::Unparsed(input.to_string())),
        }
    }
}

impl Display for Birthday {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Birthday::Date(date) => write!(f, "{}", date.format("%d/%m/%Y")),
            Birthday::Unparsed(raw) => write!(f, "{}", raw),
        }
    }
}

impl Serialize for Birthday {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Birthday {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Birthday::from_user_input(&s).map_err(serde::de::Error::custom)
    }
}


/// A structured postal address (the `ADR` property)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_empty() && self.city.is_empty() && self.postal_code.is_empty() && self.country.is_empty()
    }
}


/// A contact of the address book
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    /// The resource name in the collection. It is chosen at creation time and never derived from the vCard content
    pub id: ContactId,
    /// The vCard `UID`. It is generated once and kept across updates
    pub uid: Option<String>,
    /// The version of the resource this record has been read at
    pub entity_tag: Option<EntityTag>,

    pub full_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "websiteURL")]
    pub website_url: Option<String>,
    pub birthday: Option<Birthday>,
    pub note: Option<String>,
    /// Base64-encoded JPEG
    pub photo: Option<String>,
    pub address: Option<Address>,
}

impl ContactRecord {
    /// Build a record from a decoded vCard.
    ///
    /// Fails in case the card has no full name, since this is not a valid contact
    pub fn from_card(id: ContactId, entity_tag: Option<EntityTag>, card: ParsedCard) -> Result<Self> {
        let full_name = match card.full_name {
            Some(name) if name.trim().is_empty() == false => name,
            _ => return Err(SyncError::Validation(format!("contact {} has no full name", id))),
        };

        Ok(Self {
            id,
            uid: card.uid,
            entity_tag,
            full_name,
            given_name: card.given_name,
            family_name: card.family_name,
            email: card.email,
            phone: card.phone,
            organization: card.organization,
            title: card.title,
            website_url: card.url,
            birthday: card.birthday,
            note: card.note,
            photo: card.photo,
            address: card.address,
        })
    }

    /// The key contacts are sorted by: family name, then given name, case-insensitively (missing names first)
    pub fn sort_key(&self) -> (String, String) {
        let lower = |s: &Option<String>| s.as_deref().unwrap_or("").trim().to_lowercase();
        (lower(&self.family_name), lower(&self.given_name))
    }
}


/// The fields of a contact, as submitted by a web form
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub organization: String,
    pub title: String,
    pub url: String,
    /// Either `DD/MM/YYYY` or `YYYY-MM-DD`
    pub birthday: String,
    pub note: String,
    pub street: String,
    pub city: String,
    pub postal: String,
    pub country: String,
    /// Raw bytes of an uploaded JPEG
    #[serde(skip)]
    pub photo: Option<Vec<u8>>,
    /// The version of the contact the user has been editing
    pub entity_tag: Option<String>,
}

impl ContactForm {
    /// The full name, or the first and last name concatenated
    pub fn resolved_full_name(&self) -> String {
        let full_name = self.full_name.trim();
        if full_name.is_empty() == false {
            return full_name.to_string();
        }
        format!("{} {}", self.first_name.trim(), self.last_name.trim()).trim().to_string()
    }

    /// Make sure the fields that are required to store a contact are present
    pub fn validate(&self) -> Result<()> {
        if self.resolved_full_name().is_empty() {
            return Err(SyncError::Validation("a name is required".to_string()));
        }
        if self.email.trim().is_empty() {
            return Err(SyncError::Validation("an email address is required".to_string()));
        }
        Ok(())
    }

    pub fn expected_entity_tag(&self) -> Option<EntityTag> {
        self.entity_tag.as_deref().and_then(non_empty).map(EntityTag::from)
    }

    /// Convert into the fields a vCard is built from.
    ///
    /// `uid` is the UID to keep (if any); the photo is not set here, see `ContactForm::photo`
    pub fn to_fields(&self, uid: Option<String>) -> Result<VCardFields> {
        let first = self.first_name.trim();
        let last = self.last_name.trim();
        let full_name = self.resolved_full_name();
        let n = if first.is_empty() && last.is_empty() {
            non_empty(&full_name)
        } else {
            Some(format!("{};{};;;", crate::vcard::escape_text(last), crate::vcard::escape_text(first)))
        };

        let birthday = match non_empty(&self.birthday) {
            None => None,
            Some(b) => Some(Birthday::from_user_input(&b)?.to_vcard_value()),
        };

        let address = Address {
            street: self.street.trim().to_string(),
            city: self.city.trim().to_string(),
            postal_code: self.postal.trim().to_string(),
            country: self.country.trim().to_string(),
        };

        Ok(VCardFields {
            uid,
            full_name: non_empty(&full_name),
            n,
            organization: non_empty(&self.organization),
            title: non_empty(&self.title),
            email: non_empty(&self.email),
            phone: non_empty(&self.phone),
            url: non_empty(&self.url),
            birthday,
            note: non_empty(&self.note),
            address: if address.is_empty() { None } else { Some(address) },
            photo: self.photo.clone(),
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}


/// A member of a collection, as listed by a `PROPFIND`
#[derive(Clone, Debug, PartialEq)]
pub struct EntryInfo {
    pub id: ContactId,
    pub entity_tag: Option<EntityTag>,
}

/// A member of a collection, along with its content
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteEntry {
    pub id: ContactId,
    pub entity_tag: Option<EntityTag>,
    pub body: String,
}

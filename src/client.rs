//! This module provides a client to connect to a CardDAV address book

use async_trait::async_trait;
use minidom::Element;
use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::config::Settings;
use crate::contact::{ContactId, EntityTag, EntryInfo, RemoteEntry};
use crate::error::{Result, SyncError};
use crate::resource::Resource;
use crate::traits::DavAddressBook;
use crate::utils::{find_elem, find_elems};


static DISCOVER_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:">
       <d:prop>
           <d:resourcetype />
           <d:displayname />
       </d:prop>
    </d:propfind>
"#;

static ENTRIES_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:">
       <d:prop>
           <d:getetag />
       </d:prop>
    </d:propfind>
"#;

static ADDRESSBOOK_QUERY_BODY: &str = r#"
    <c:addressbook-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:carddav">
        <d:prop>
            <d:getetag />
            <c:address-data />
        </d:prop>
    </c:addressbook-query>
"#;

const VCARD_CONTENT_TYPE: &str = "text/vcard; charset=utf-8";


/// A CardDAV address book, reached over HTTP
#[derive(Debug)]
pub struct Client {
    resource: Resource,
    http: reqwest::Client,
}

impl Client {
    /// Create a client. This does not start a connection
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(crate::config::user_agent())
            .build()
            .map_err(|err| SyncError::Config(format!("unable to create an HTTP client: {}", err)))?;

        let resource = Resource::new(
            settings.collection_url().clone(),
            settings.username().to_string(),
            settings.password().to_string(),
        );
        Ok(Self { resource, http })
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        log::debug!("{} {}", method, url);
        self.http
            .request(method, url.as_str())
            .basic_auth(self.resource.username(), Some(self.resource.password()))
    }

    /// Send a PROPFIND or REPORT request to the collection
    async fn sub_request(&self, method: &[u8], body: &'static str, depth: u32) -> Result<Response> {
        let method = Method::from_bytes(method)
            .expect("cannot create WebDAV method.");

        let response = self.request(method, self.resource.url())
            .header("Depth", depth)
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Send a request that is expected to return a multistatus, and parse it
    async fn sub_request_and_parse(&self, method: &[u8], body: &'static str, operation: &'static str) -> Result<Vec<MultistatusEntry>> {
        let response = self.sub_request(method, body, 1).await?;
        let status = response.status();
        if status != StatusCode::MULTI_STATUS {
            return Err(status_error(status, operation));
        }
        let text = response.text().await?;
        parse_multistatus(&text)
    }
}

/// Convert an unexpected status code into the matching error
fn status_error(status: StatusCode, operation: &'static str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Auth{ status: status.as_u16() },
        _ => SyncError::UnexpectedStatus{ operation, status: status.as_u16() },
    }
}

fn etag_header(response: &Response) -> Option<EntityTag> {
    response.headers()
        .get(ETAG)
        .and_then(|etag| etag.to_str().ok())
        .map(EntityTag::from)
}

#[async_trait]
impl DavAddressBook for Client {
    fn location(&self) -> String {
        self.resource.url().to_string()
    }

    async fn discover(&self) -> Result<()> {
        let response = match self.sub_request(b"PROPFIND", DISCOVER_BODY, 0).await {
            Ok(response) => response,
            Err(SyncError::Transport(err)) => {
                return Err(SyncError::Connectivity(format!("{} is unreachable: {}", self.resource.url(), err)));
            },
            Err(err) => return Err(err),
        };
        let status = response.status();
        match status {
            StatusCode::MULTI_STATUS => {
                log::info!("Successfully connected to address book {}", self.resource.url());
                Ok(())
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Auth{ status: status.as_u16() }),
            _ => Err(SyncError::Connectivity(format!("{} answered HTTP {} to a PROPFIND request", self.resource.url(), status.as_u16()))),
        }
    }

    async fn list_entries(&self) -> Result<Vec<EntryInfo>> {
        let responses = self.sub_request_and_parse(b"PROPFIND", ENTRIES_BODY, "list contacts").await?;

        Ok(responses.into_iter()
            .map(|entry| EntryInfo { id: entry.id, entity_tag: entry.entity_tag })
            .collect())
    }

    async fn query_entries(&self) -> Result<Vec<RemoteEntry>> {
        let responses = self.sub_request_and_parse(b"REPORT", ADDRESSBOOK_QUERY_BODY, "query contacts").await?;

        let mut entries = Vec::new();
        for entry in responses {
            let body = match entry.address_data {
                Some(body) => body,
                None => {
                    log::warn!("No address-data for {}, downloading it separately", entry.id);
                    match self.fetch_body(&entry.id).await {
                        Ok((body, _)) => body,
                        Err(SyncError::NotFound(_)) => continue,
                        Err(err) => return Err(err),
                    }
                },
            };
            entries.push(RemoteEntry { id: entry.id, entity_tag: entry.entity_tag, body });
        }
        Ok(entries)
    }

    async fn fetch_body(&self, id: &ContactId) -> Result<(String, Option<EntityTag>)> {
        let url = self.resource.entry_url(id)?;
        let response = self.request(Method::GET, &url)
            .header(ACCEPT, "text/vcard")
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(SyncError::NotFound(id.to_string())),
            s if s.is_success() => {
                let entity_tag = etag_header(&response);
                let text = response.text().await?;
                Ok((text, entity_tag))
            },
            _ => Err(status_error(status, "fetch a contact")),
        }
    }

    async fn create_entry(&self, vcard: String) -> Result<(ContactId, Option<EntityTag>)> {
        let id = ContactId::random();
        let url = self.resource.entry_url(&id)?;
        log::trace!("Creating {}:\n{}", url, vcard);

        let response = self.request(Method::PUT, &url)
            .header(IF_NONE_MATCH, "*")
            .header(CONTENT_TYPE, VCARD_CONTENT_TYPE)
            .body(vcard)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => Err(SyncError::Conflict(id.to_string())),
            s if s.is_success() => {
                log::info!("Created contact {}", id);
                Ok((id, etag_header(&response)))
            },
            _ => Err(status_error(status, "create a contact")),
        }
    }

    async fn update_entry(&self, id: &ContactId, vcard: String, expected: Option<&EntityTag>) -> Result<Option<EntityTag>> {
        let url = self.resource.entry_url(id)?;
        log::trace!("Updating {}:\n{}", url, vcard);

        let mut request = self.request(Method::PUT, &url)
            .header(CONTENT_TYPE, VCARD_CONTENT_TYPE);
        match expected {
            Some(tag) => request = request.header(IF_MATCH, tag.as_header_value()),
            None => log::warn!("Updating {} without knowing its current version. Concurrent changes may be overwritten", id),
        }

        let response = request.body(vcard).send().await?;
        let status = response.status();
        match status {
            StatusCode::PRECONDITION_FAILED => Err(SyncError::OptimisticLock(id.to_string())),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(SyncError::NotFound(id.to_string())),
            s if s.is_success() => {
                log::info!("Updated contact {}", id);
                Ok(etag_header(&response))
            },
            _ => Err(status_error(status, "update a contact")),
        }
    }

    async fn delete_entry(&self, id: &ContactId) -> Result<()> {
        let url = self.resource.entry_url(id)?;
        let response = self.request(Method::DELETE, &url)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(SyncError::NotFound(id.to_string())),
            s if s.is_success() => {
                log::info!("Deleted contact {}", id);
                Ok(())
            },
            _ => Err(status_error(status, "delete a contact")),
        }
    }
}


/// A `<response>` of a multistatus, that describes a vCard resource
#[derive(Clone, Debug, PartialEq)]
struct MultistatusEntry {
    id: ContactId,
    entity_tag: Option<EntityTag>,
    address_data: Option<String>,
}

/// Extract the vCard resources from a multistatus body.
///
/// The collection itself (and anything that is not a `.vcf` file) is skipped
fn parse_multistatus(text: &str) -> Result<Vec<MultistatusEntry>> {
    let root: Element = text.parse()?;

    let mut entries = Vec::new();
    for response in find_elems(&root, "response") {
        let href = match find_elem(response, "href") {
            None => {
                log::warn!("Unable to extract HREF");
                continue;
            },
            Some(h) => h.text(),
        };
        let id = match ContactId::from_href(href.trim()) {
            Some(id) if id.is_vcard() => id,
            _ => {
                log::trace!("Skipping {}, that is not a vCard", href);
                continue;
            },
        };

        let entity_tag = find_elem(response, "getetag")
            .map(|etag| etag.text().trim().to_string())
            .filter(|etag| etag.is_empty() == false)
            .map(EntityTag::from);
        if entity_tag.is_none() {
            log::debug!("No ETag for {}", id);
        }

        let address_data = find_elem(response, "address-data")
            .map(|data| data.text())
            .filter(|data| data.trim().is_empty() == false);

        entries.push(MultistatusEntry { id, entity_tag, address_data });
    }
    Ok(entries)
}


#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_PROPFIND: &str = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:s="http://sabredav.org/ns">
  <d:response>
    <d:href>/remote.php/dav/addressbooks/users/john/contacts/</d:href>
    <d:propstat>
      <d:prop><d:getetag/></d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/addressbooks/users/john/contacts/abc.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag>"6f6ea3a2"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/addressbooks/users/john/contacts/def.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag></d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    const EXAMPLE_REPORT: &str = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:response>
    <d:href>/contacts/abc.vcf</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"1"</d:getetag>
        <card:address-data>BEGIN:VCARD
VERSION:3.0
FN:Jane &amp; John
UID:1
END:VCARD
</card:address-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn parse_propfind() {
        let entries = parse_multistatus(EXAMPLE_PROPFIND).unwrap();
        assert_eq!(entries, vec![
            MultistatusEntry { id: "abc.vcf".parse().unwrap(), entity_tag: Some(EntityTag::from("\"6f6ea3a2\"")), address_data: None },
            MultistatusEntry { id: "def.vcf".parse().unwrap(), entity_tag: None, address_data: None },
        ]);
    }

    #[test]
    fn parse_report() {
        let entries = parse_multistatus(EXAMPLE_REPORT).unwrap();
        assert_eq!(entries.len(), 1);
        let body = entries[0].address_data.as_ref().unwrap();
        assert!(body.contains("FN:Jane & John"));

        let card = crate::vcard::decode(body).unwrap();
        assert_eq!(card.full_name.as_deref(), Some("Jane & John"));
    }

    #[test]
    fn invalid_xml() {
        assert!(matches!(parse_multistatus("<html>Oops"), Err(SyncError::InvalidResponse(_))));
    }

    #[test]
    fn status_classification() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED, "list contacts"), SyncError::Auth{ status: 401 });
        assert_eq!(status_error(StatusCode::FORBIDDEN, "list contacts"), SyncError::Auth{ status: 403 });
        assert_eq!(status_error(StatusCode::INTERNAL_SERVER_ERROR, "list contacts"), SyncError::UnexpectedStatus{ operation: "list contacts", status: 500 });
    }

    #[test]
    fn client_requires_valid_settings() {
        let settings = Settings::new("https://dav.example.com/contacts", "john", "secret").unwrap();
        let client = Client::new(&settings).unwrap();
        assert_eq!(client.location(), "https://dav.example.com/contacts/");
    }
}

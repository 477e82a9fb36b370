use url::Url;

use crate::contact::ContactId;
use crate::error::{Result, SyncError};

/// Just a wrapper around a collection URL and credentials
#[derive(Clone)]
pub struct Resource {
    url: Url,
    username: String,
    password: String,
}

impl Resource {
    pub fn new(url: Url, username: String, password: String) -> Self {
        Self { url, username, password }
    }

    pub fn url(&self) -> &Url { &self.url }
    pub fn username(&self) -> &String { &self.username }
    pub fn password(&self) -> &String { &self.password }

    /// Build the URL of a member of this collection
    pub fn entry_url(&self, id: &ContactId) -> Result<Url> {
        // Prefixed, so that a name containing a colon is not mistaken for an absolute URL
        self.url.join(&format!("./{}", id.as_str()))
            .map_err(|err| SyncError::Validation(format!("{} cannot be used as a contact name: {}", id, err)))
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("url", &self.url.as_str())
            .field("username", &self.username)
            .finish()
    }
}

//! Support for library configuration options

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Deserialize;
use url::Url;

use crate::error::{Result, SyncError};

/// Product name, sent in the `User-Agent` header of every request.
/// Feel free to override it when initing this library.
pub static PRODUCT_NAME: Lazy<Arc<Mutex<String>>> = Lazy::new(|| Arc::new(Mutex::new("GuiVCard".to_string())));

/// Product version, sent in the `User-Agent` header of every request.
pub static PRODUCT_VERSION: Lazy<String> = Lazy::new(|| env!("CARGO_PKG_VERSION").to_string());

/// Default timeout of every outbound request
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// The `User-Agent` header value, e.g. `GuiVCard/0.1.0`
pub fn user_agent() -> String {
    let name = PRODUCT_NAME.lock().map(|name| name.clone()).unwrap_or_else(|poisoned| poisoned.into_inner().clone());
    format!("{}/{}", name, *PRODUCT_VERSION)
}


/// Where and how to reach the address book
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Settings {
    collection_url: Url,
    username: String,
    password: String,
    #[serde(default = "default_timeout", with = "duration_secs")]
    timeout: Duration,
    #[serde(default = "default_cache_ttl", with = "duration_secs")]
    cache_ttl: Duration,
}

fn default_timeout() -> Duration { Duration::from_secs(DEFAULT_TIMEOUT_SECS) }
fn default_cache_ttl() -> Duration { Duration::from_secs(crate::cache::DEFAULT_TTL_SECS) }

mod duration_secs {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Settings {
    /// Create settings with the default timeout and cache TTL
    pub fn new<S: AsRef<str>, T: ToString, U: ToString>(collection_url: S, username: T, password: U) -> Result<Self> {
        let collection_url = Url::parse(collection_url.as_ref())
            .map_err(|err| SyncError::Config(format!("invalid collection URL {:?}: {}", collection_url.as_ref(), err)))?;

        let settings = Self {
            collection_url: normalize_collection_url(collection_url),
            username: username.to_string(),
            password: password.to_string(),
            timeout: default_timeout(),
            cache_ttl: default_cache_ttl(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Read the settings from the environment.
    ///
    /// * `CARDDAV_URL` (required)
    /// * `CARDDAV_USERNAME` and `CARDDAV_PASSWORD` (or `ADMIN_USERNAME` and `ADMIN_PASSWORD`)
    /// * `CARDDAV_TIMEOUT_SECS` and `CONTACT_CACHE_TTL_SECS` (optional)
    pub fn from_env() -> Result<Self> {
        let url = env_var(&["CARDDAV_URL"])?;
        let username = env_var(&["CARDDAV_USERNAME", "ADMIN_USERNAME"])?;
        let password = env_var(&["CARDDAV_PASSWORD", "ADMIN_PASSWORD"])?;

        let mut settings = Self::new(url, username, password)?;
        if let Some(secs) = env_secs("CARDDAV_TIMEOUT_SECS")? {
            settings = settings.with_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = env_secs("CONTACT_CACHE_TTL_SECS")? {
            settings = settings.with_cache_ttl(Duration::from_secs(secs));
        }
        Ok(settings)
    }

    /// Read the settings from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|err| SyncError::Config(format!("unable to open file {:?}: {}", path, err)))?;
        let mut settings: Self = serde_json::from_reader(file)
            .map_err(|err| SyncError::Config(format!("unable to parse file {:?}: {}", path, err)))?;
        settings.collection_url = normalize_collection_url(settings.collection_url);
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Make sure the collection URL is absolute and the credentials are present
    pub fn validate(&self) -> Result<()> {
        match self.collection_url.scheme() {
            "http" | "https" => (),
            other => return Err(SyncError::Config(format!("unsupported URL scheme {:?} in collection URL", other))),
        }
        if self.collection_url.host_str().map(|h| h.is_empty()).unwrap_or(true) {
            return Err(SyncError::Config("collection URL has no host".to_string()));
        }
        if self.username.is_empty() {
            return Err(SyncError::Config("username is missing".to_string()));
        }
        if self.password.is_empty() {
            return Err(SyncError::Config("password is missing".to_string()));
        }
        Ok(())
    }

    pub fn collection_url(&self) -> &Url { &self.collection_url }
    pub fn username(&self) -> &str { &self.username }
    pub fn password(&self) -> &str { &self.password }
    pub fn timeout(&self) -> Duration { self.timeout }
    pub fn cache_ttl(&self) -> Duration { self.cache_ttl }
}

/// Entry URLs are built by joining a name to the collection URL, which only works if it ends with a slash
fn normalize_collection_url(mut url: Url) -> Url {
    if url.path().ends_with('/') == false {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn env_var(names: &[&str]) -> Result<String> {
    for name in names {
        if let Ok(value) = std::env::var(name) {
            if value.is_empty() == false {
                return Ok(value);
            }
        }
    }
    Err(SyncError::Config(format!("environment variable {} is not set", names.join(" or "))))
}

fn env_secs(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(value) => value.trim().parse()
            .map(Some)
            .map_err(|_| SyncError::Config(format!("{} must be a number of seconds, got {:?}", name, value))),
    }
}

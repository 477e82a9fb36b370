//! Errors that can happen when talking to a CardDAV server or handling vCards

use thiserror::Error;

/// Every failure this crate can report.
///
/// The `Display` implementation of each variant is a complete sentence, so that an app can show it to its users as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The server rejected our credentials
    #[error("The CardDAV server rejected the configured credentials (HTTP {status})")]
    Auth { status: u16 },

    /// The address book could not be reached, or answered in an unexpected way during discovery
    #[error("Unable to reach the address book: {0}")]
    Connectivity(String),

    /// A network-level failure (timeout, DNS, TLS...). Retrying may help.
    #[error("Network error while talking to the CardDAV server: {0}")]
    Transport(String),

    /// The resource does not exist (or does not exist anymore)
    #[error("Contact {0} was not found on the server")]
    NotFound(String),

    /// A resource with the same name already exists
    #[error("Contact {0} already exists on the server")]
    Conflict(String),

    /// The resource has been modified by someone else since we last read it
    #[error("Contact {0} has been modified in the meantime. Reload it and try again")]
    OptimisticLock(String),

    /// The data is not a well-formed vCard
    #[error("Invalid vCard data: {0}")]
    Parse(String),

    /// A required field is missing or invalid
    #[error("Invalid contact: {0}")]
    Validation(String),

    /// The settings are missing or invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The server answered with a status code we do not know how to handle
    #[error("Unexpected HTTP status {status} from the server while trying to {operation}")]
    UnexpectedStatus { operation: &'static str, status: u16 },

    /// The server answered with a body we are unable to understand
    #[error("Invalid response from the server: {0}")]
    InvalidResponse(String),
}

impl SyncError {
    /// Whether the same request may succeed if it is sent again.
    ///
    /// Only network failures qualify. Note that creations are not idempotent, so that even a retryable creation
    /// should not be blindly retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Transport(format!("request timed out ({})", err))
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<minidom::Error> for SyncError {
    fn from(err: minidom::Error) -> Self {
        SyncError::InvalidResponse(format!("unable to parse XML: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

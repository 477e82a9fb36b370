//! Utilities to track the progression of a listing

/// A structure that tracks the progression and the errors that happen while listing an address book
#[derive(Debug, Default)]
pub struct SyncProgress {
    n_errors: u32,
    n_handled: u32,
}

impl SyncProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.n_errors == 0
    }

    /// How many errors and warnings have been logged so far
    pub fn n_errors(&self) -> u32 {
        self.n_errors
    }

    /// Log a warning
    pub fn warn(&mut self, text: &str) {
        log::warn!("{}", text);
        self.n_errors += 1;
    }
    /// Log an info
    pub fn info(&mut self, text: &str) {
        log::info!("{}", text);
    }
    /// Log a debug message
    pub fn debug(&mut self, text: &str) {
        log::debug!("{}", text);
    }

    /// Increment the number of handled entries
    pub fn increment_counter(&mut self, increment: u32) {
        self.n_handled += increment;
    }
    /// Number of handled entries
    pub fn counter(&self) -> u32 {
        self.n_handled
    }
}

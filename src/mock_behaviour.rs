//! This module provides ways to tweak mocked address books, so that they can return errors on some tests
#![cfg(any(test, feature = "mock_address_book"))]

use crate::error::{Result, SyncError};

/// This stores some behaviour tweaks, that describe how a mocked instance will behave during a given test
///
/// So that a functions fails _n_ times after _m_ initial successes, set `(m, n)` for the suited parameter
#[derive(Default, Clone, Debug)]
pub struct MockBehaviour {
    /// If this is true, every action will be allowed
    pub is_suspended: bool,

    pub discover_behaviour: (u32, u32),
    pub list_entries_behaviour: (u32, u32),
    pub query_entries_behaviour: (u32, u32),
    pub fetch_body_behaviour: (u32, u32),
    pub create_entry_behaviour: (u32, u32),
    pub update_entry_behaviour: (u32, u32),
    pub delete_entry_behaviour: (u32, u32),
}

impl MockBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// All operations will fail at once, for `n_fails` times
    pub fn fail_now(n_fails: u32) -> Self {
        Self {
            is_suspended: false,
            discover_behaviour: (0, n_fails),
            list_entries_behaviour: (0, n_fails),
            query_entries_behaviour: (0, n_fails),
            fetch_body_behaviour: (0, n_fails),
            create_entry_behaviour: (0, n_fails),
            update_entry_behaviour: (0, n_fails),
            delete_entry_behaviour: (0, n_fails),
        }
    }

    /// Suspend this mock behaviour until you call `resume`
    pub fn suspend(&mut self) {
        self.is_suspended = true;
    }
    /// Make this behaviour active again
    pub fn resume(&mut self) {
        self.is_suspended = false;
    }

    pub fn can_discover(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.discover_behaviour, "discover")
    }
    pub fn can_list_entries(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.list_entries_behaviour, "list_entries")
    }
    pub fn can_query_entries(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.query_entries_behaviour, "query_entries")
    }
    pub fn can_fetch_body(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.fetch_body_behaviour, "fetch_body")
    }
    pub fn can_create_entry(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.create_entry_behaviour, "create_entry")
    }
    pub fn can_update_entry(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.update_entry_behaviour, "update_entry")
    }
    pub fn can_delete_entry(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.delete_entry_behaviour, "delete_entry")
    }
}


/// Return Ok(()) in case the value is `(1+, _)` or `(_, 0)`, or return Err and decrement otherwise
fn decrement(value: &mut (u32, u32), descr: &str) -> Result<()> {
    let remaining_successes = value.0;
    let remaining_failures = value.1;

    if remaining_successes > 0 {
        value.0 -= 1;
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    } else if remaining_failures > 0 {
        value.1 -= 1;
        log::debug!("Mock behaviour: failing a {} ({:?})", descr, value);
        Err(SyncError::Transport(format!("Mocked behaviour requires this {} to fail this time. ({:?})", descr, value)))
    } else {
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mock_behaviour() {
        let mut ok = MockBehaviour::new();
        for _ in 0..5 {
            assert!(ok.can_list_entries().is_ok());
        }

        let mut now = MockBehaviour::fail_now(2);
        assert!(now.can_list_entries().is_err());
        assert!(now.can_create_entry().is_err());
        assert!(now.can_create_entry().is_err());
        assert!(now.can_list_entries().is_err());
        assert!(now.can_list_entries().is_ok());
        assert!(now.can_list_entries().is_ok());
        assert!(now.can_create_entry().is_ok());

        let mut custom = MockBehaviour{
            fetch_body_behaviour: (0,1),
            update_entry_behaviour: (1,3),
            ..MockBehaviour::default()
        };
        assert!(custom.can_fetch_body().is_err());
        assert!(custom.can_fetch_body().is_ok());
        assert!(custom.can_fetch_body().is_ok());
        assert!(custom.can_update_entry().is_ok());
        assert!(custom.can_update_entry().is_err());
        assert!(custom.can_update_entry().is_err());
        assert!(custom.can_update_entry().is_err());
        assert!(custom.can_update_entry().is_ok());

        let mut suspended = MockBehaviour::fail_now(1);
        suspended.suspend();
        assert!(suspended.can_delete_entry().is_ok());
        suspended.resume();
        assert!(suspended.can_delete_entry().is_err());
    }

    #[test]
    fn mocked_failures_are_retryable() {
        let mut now = MockBehaviour::fail_now(1);
        let err = now.can_discover().unwrap_err();
        assert!(err.is_retryable());
    }
}

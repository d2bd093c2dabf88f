//! Per-account in-flight guard
//!
//! Operations that move stake hold a [`GuardTicket`] for the account until
//! their transaction has fully committed or been discarded. A second
//! acquisition for the same account while a ticket is alive fails with
//! `ReentrantCall`.

use std::sync::Arc;

use dashmap::DashMap;
use relaynet_core::AccountId;

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    in_flight: Arc<DashMap<AccountId, &'static str>>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, account: AccountId, operation: &'static str) -> Result<GuardTicket> {
        use dashmap::mapref::entry::Entry;

        match self.in_flight.entry(account) {
            Entry::Occupied(_) => Err(LedgerError::ReentrantCall(account)),
            Entry::Vacant(slot) => {
                slot.insert(operation);
                Ok(GuardTicket {
                    account,
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }

    /// Operation currently holding the account, if any
    pub fn holder(&self, account: &AccountId) -> Option<&'static str> {
        self.in_flight.get(account).map(|entry| *entry.value())
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Releases the account when dropped
#[derive(Debug)]
pub struct GuardTicket {
    account: AccountId,
    in_flight: Arc<DashMap<AccountId, &'static str>>,
}

impl GuardTicket {
    pub fn account(&self) -> &AccountId {
        &self.account
    }
}

impl Drop for GuardTicket {
    fn drop(&mut self) {
        self.in_flight.remove(&self.account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_entry_rejected_until_release() {
        let guard = ReentrancyGuard::new();
        let account = AccountId::from_label("staker");

        let ticket = guard.enter(account, "register_as_relay").unwrap();
        assert_eq!(guard.holder(&account), Some("register_as_relay"));
        assert!(matches!(
            guard.enter(account, "deactivate_relay"),
            Err(LedgerError::ReentrantCall(_))
        ));

        drop(ticket);
        assert_eq!(guard.in_flight(), 0);
        assert!(guard.enter(account, "deactivate_relay").is_ok());
    }

    #[test]
    fn test_accounts_are_independent() {
        let guard = ReentrancyGuard::new();
        let _a = guard.enter(AccountId::from_label("a"), "op").unwrap();
        assert!(guard.enter(AccountId::from_label("b"), "op").is_ok());
    }
}

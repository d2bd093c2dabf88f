//! Identity registration and key management

use relaynet_core::{AccountId, PublicKey, Timestamp};
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::transaction::Transaction;
use crate::types::Identity;

#[derive(Debug, Clone)]
pub struct IdentityStore {
    max_display_name_len: usize,
}

impl IdentityStore {
    pub fn new(max_display_name_len: usize) -> Self {
        Self {
            max_display_name_len,
        }
    }

    fn validate_display_name(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.len() > self.max_display_name_len {
            return Err(LedgerError::InvalidDisplayName(format!(
                "{} bytes exceeds limit of {}",
                name.len(),
                self.max_display_name_len
            )));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(LedgerError::InvalidDisplayName(
                "control characters are not allowed".into(),
            ));
        }
        Ok(name.to_string())
    }

    fn active_identity(&self, tx: &Transaction<'_>, account: &AccountId) -> Result<Identity> {
        tx.identity(account)?
            .filter(|identity| identity.active)
            .ok_or(LedgerError::NotRegistered(*account))
    }

    /// Register (or re-register after deactivation) an identity
    pub fn register(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        public_key: PublicKey,
        display_name: &str,
        now: Timestamp,
    ) -> Result<Identity> {
        if public_key.is_zero() {
            return Err(LedgerError::InvalidKey);
        }
        let display_name = self.validate_display_name(display_name)?;

        let registered_at = match tx.identity(account)? {
            Some(existing) if existing.active => {
                return Err(LedgerError::AlreadyRegistered(*account))
            }
            Some(existing) => existing.registered_at,
            None => now,
        };

        let identity = Identity {
            account: *account,
            public_key,
            display_name: display_name.clone(),
            registered_at,
            last_updated: now,
            active: true,
        };
        tx.put_identity(&identity)?;

        let mut globals = tx.globals()?;
        globals.total_users += 1;
        tx.put_globals(&globals)?;

        tx.emit(LedgerEvent::IdentityRegistered {
            account: *account,
            display_name,
            at: now,
        });
        info!(account = %account, "Identity registered");
        Ok(identity)
    }

    pub fn rotate_key(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        new_key: PublicKey,
        now: Timestamp,
    ) -> Result<Identity> {
        let mut identity = self.active_identity(tx, account)?;
        if new_key.is_zero() {
            return Err(LedgerError::InvalidKey);
        }
        identity.public_key = new_key;
        identity.last_updated = now;
        tx.put_identity(&identity)?;

        tx.emit(LedgerEvent::IdentityUpdated {
            account: *account,
            field: "public_key".into(),
            at: now,
        });
        info!(account = %account, "Identity key rotated");
        Ok(identity)
    }

    pub fn update_display_name(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        name: &str,
        now: Timestamp,
    ) -> Result<Identity> {
        let mut identity = self.active_identity(tx, account)?;
        identity.display_name = self.validate_display_name(name)?;
        identity.last_updated = now;
        tx.put_identity(&identity)?;

        tx.emit(LedgerEvent::IdentityUpdated {
            account: *account,
            field: "display_name".into(),
            at: now,
        });
        Ok(identity)
    }

    /// Deactivate; the record is kept for audit
    pub fn deactivate(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<()> {
        let mut identity = self.active_identity(tx, account)?;
        if tx.active_relay_node(account)?.is_some() {
            return Err(LedgerError::RelayStillActive(*account));
        }

        identity.active = false;
        identity.last_updated = now;
        tx.put_identity(&identity)?;

        let mut globals = tx.globals()?;
        globals.total_users = globals.total_users.saturating_sub(1);
        tx.put_globals(&globals)?;

        tx.emit(LedgerEvent::IdentityDeactivated {
            account: *account,
            at: now,
        });
        info!(account = %account, "Identity deactivated");
        Ok(())
    }

    pub fn is_registered(&self, tx: &Transaction<'_>, account: &AccountId) -> Result<bool> {
        Ok(tx.identity(account)?.map_or(false, |identity| identity.active))
    }
}

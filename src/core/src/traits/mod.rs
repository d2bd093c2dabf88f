//! Shared traits for the RelayNet ledger

pub mod asset;

// Re-export commonly used traits
pub use asset::{AllowanceEntry, AssetError, AssetLedger, AssetSnapshot, BalanceEntry, InMemoryAssetLedger};

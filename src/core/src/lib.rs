//! # RelayNet Core
//!
//! Shared primitive types, the external asset-ledger interface and error
//! handling for the RelayNet incentive ledger, shared by the ledger crate
//! and the node binary.

pub mod types;
pub mod traits;
pub mod error;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use types::{
    day_index, day_start, format_amount, parse_amount, serde_amount, AccountId, Amount, MessageId, PublicKey, Timestamp, TokenId,
    ONE_TOKEN, SECONDS_PER_DAY,
};
pub use traits::{AssetError, AssetLedger, AssetSnapshot, InMemoryAssetLedger};

//! Error types for the incentive ledger

use relaynet_core::{AccountId, Amount, AssetError, MessageId, Timestamp};
use thiserror::Error;

/// Broad classification of a ledger failure, used for RPC error codes and
/// rejection metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    State,
    Authorization,
    Funds,
    NotFound,
    Storage,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::State => "state",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Funds => "funds",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage",
            ErrorKind::Fatal => "fatal",
        }
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    // Validation
    #[error("Public key must be non-zero")]
    InvalidKey,

    #[error("Invalid display name: {0}")]
    InvalidDisplayName(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account {0} cannot report itself")]
    SelfReport(AccountId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // State
    #[error("Identity already registered: {0}")]
    AlreadyRegistered(AccountId),

    #[error("Identity not registered: {0}")]
    NotRegistered(AccountId),

    #[error("Active identity required for {0}")]
    IdentityRequired(AccountId),

    #[error("Account already operates an active relay node: {0}")]
    AlreadyRelaying(AccountId),

    #[error("Account does not operate an active relay node: {0}")]
    NotRelaying(AccountId),

    #[error("Relay node {0} must be online")]
    MustBeOnline(AccountId),

    #[error("Account is blacklisted: {0}")]
    Blacklisted(AccountId),

    #[error("Relay node of {0} is still active")]
    RelayStillActive(AccountId),

    #[error("Report target is not an active relay node: {0}")]
    TargetNotActive(AccountId),

    #[error("Reporter has no active identity: {0}")]
    ReporterNotRegistered(AccountId),

    #[error("Message already recorded: {0}")]
    DuplicateMessage(MessageId),

    #[error("Nothing to claim for {0}")]
    NothingToClaim(AccountId),

    #[error("Distribution cycle for day {0} already settled")]
    CycleAlreadySettled(u64),

    #[error("Distribution cycle for day {day} cannot be settled on day {today}")]
    CycleNotSettleable { day: u64, today: u64 },

    #[error("Stake still outstanding: {0} base units")]
    StakeOutstanding(Amount),

    #[error("Operation already in progress for {0}")]
    ReentrantCall(AccountId),

    #[error("Rate limit exceeded for {account}, retry after {retry_after}")]
    RateLimited {
        account: AccountId,
        retry_after: Timestamp,
    },

    // Authorization
    #[error("Caller {caller} is not authorized to {operation}")]
    Unauthorized {
        caller: AccountId,
        operation: &'static str,
    },

    // Funds
    #[error("Token transfer rejected: {0}")]
    TransferFailed(AssetError),

    #[error("Reward pool cannot cover payout: available {available}, requested {requested}")]
    InsufficientRewardPool { available: Amount, requested: Amount },

    // Not found
    #[error("Reputation record not found: {0}")]
    ReputationNotFound(AccountId),

    // Storage
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Stored schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Prometheus metric error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Ledger service is not running")]
    ServiceStopped,

    // Fatal
    #[error("Custody cannot return stake of {account}: holds {available}, owes {requested}")]
    CustodyInsolvent {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    #[error("Ledger halted: {0}")]
    LedgerHalted(String),
}

impl LedgerError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            InvalidKey | InvalidDisplayName(_) | InvalidEndpoint(_) | InvalidAmount(_)
            | SelfReport(_) | InvalidConfig(_) => ErrorKind::Validation,
            AlreadyRegistered(_) | NotRegistered(_) | IdentityRequired(_) | AlreadyRelaying(_)
            | NotRelaying(_) | MustBeOnline(_) | Blacklisted(_) | RelayStillActive(_)
            | TargetNotActive(_) | ReporterNotRegistered(_) | DuplicateMessage(_)
            | NothingToClaim(_) | CycleAlreadySettled(_) | CycleNotSettleable { .. }
            | StakeOutstanding(_)
            | ReentrantCall(_) | RateLimited { .. } => ErrorKind::State,
            Unauthorized { .. } => ErrorKind::Authorization,
            TransferFailed(_) | InsufficientRewardPool { .. } => ErrorKind::Funds,
            ReputationNotFound(_) => ErrorKind::NotFound,
            Storage(_) | Serialization(_) | UnsupportedSchema { .. } | Metrics(_)
            | ServiceStopped => ErrorKind::Storage,
            CustodyInsolvent { .. } | LedgerHalted(_) => ErrorKind::Fatal,
        }
    }

    /// Fatal errors halt the ledger for every further mutation
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        LedgerError::Storage(err.to_string())
    }

    pub fn serialization<E: std::fmt::Display>(err: E) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

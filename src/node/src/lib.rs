//! RelayNet Ledger Node Library
//!
//! Runs the incentive ledger as a single-process service: persistent sled
//! storage, a JSON-RPC front end, Prometheus metrics and the automatic
//! daily distribution cycle.

pub mod config;
pub mod node;
pub mod rpc;

pub use config::NodeConfig;
pub use node::{settle_if_due, LedgerNode};
pub use rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcHandler};

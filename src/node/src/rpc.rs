//! JSON-RPC 2.0 front end for the incentive ledger
//!
//! Methods carry the names of the ledger's public operations
//! (`registerAsRelay`, `claimFeeReward`, ...). Mutating methods take the
//! acting account in `params.caller`; queries take the `account` they ask
//! about. Amounts travel as decimal token strings.

use relaynet_core::types::time;
use relaynet_core::{
    format_amount, serde_amount, AccountId, Amount, AssetLedger, InMemoryAssetLedger, MessageId,
    PublicKey, Timestamp, TokenId,
};
use relaynet_incentives::{ErrorKind, IncentiveLedger, LedgerError, LedgerHandle, Tier};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Source of the current time for ledger calls
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
            data: None,
        }
    }

    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "Invalid Request".to_string(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    pub fn invalid_params(detail: String) -> Self {
        Self {
            code: -32602,
            message: "Invalid params".to_string(),
            data: Some(Value::String(detail)),
        }
    }

    pub fn internal_error(message: String) -> Self {
        Self {
            code: -32603,
            message,
            data: None,
        }
    }

    /// Ledger rejections use one application code per error class
    pub fn from_ledger(err: &LedgerError) -> Self {
        let kind = err.kind();
        let mut data = json!({ "kind": kind.as_str() });
        if let LedgerError::RateLimited { retry_after, .. } = err {
            data["retry_after"] = json!(retry_after);
        }
        Self {
            code: ledger_error_code(kind),
            message: err.to_string(),
            data: Some(data),
        }
    }
}

pub fn ledger_error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => -32010,
        ErrorKind::State => -32020,
        ErrorKind::Authorization => -32030,
        ErrorKind::Funds => -32040,
        ErrorKind::NotFound => -32050,
        ErrorKind::Storage => -32060,
        ErrorKind::Fatal => -32099,
    }
}

#[derive(Deserialize)]
struct CallerParams {
    caller: AccountId,
}

#[derive(Deserialize)]
struct SettleParams {
    caller: AccountId,
    /// Defaults to the current day
    #[serde(default)]
    day: Option<u64>,
}

#[derive(Deserialize)]
struct AccountParams {
    account: AccountId,
}

#[derive(Deserialize)]
struct RegisterParams {
    caller: AccountId,
    public_key: PublicKey,
    display_name: String,
}

#[derive(Deserialize)]
struct KeyParams {
    caller: AccountId,
    public_key: PublicKey,
}

#[derive(Deserialize)]
struct DisplayNameParams {
    caller: AccountId,
    display_name: String,
}

#[derive(Deserialize)]
struct RelayParams {
    caller: AccountId,
    endpoint: String,
    /// Omitted by older clients, which get the legacy default
    #[serde(default)]
    storage_capacity_mb: Option<u64>,
}

#[derive(Deserialize)]
struct StorageParams {
    caller: AccountId,
    storage_capacity_mb: u64,
}

#[derive(Deserialize)]
struct EndpointParams {
    caller: AccountId,
    endpoint: String,
}

#[derive(Deserialize)]
struct TargetParams {
    caller: AccountId,
    target: AccountId,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct RelayedMessageParams {
    caller: AccountId,
    relayer: AccountId,
    message_id: MessageId,
    #[serde(default, with = "serde_amount")]
    base_reward: Amount,
}

#[derive(Deserialize)]
struct AmountParams {
    caller: AccountId,
    #[serde(with = "serde_amount")]
    amount: Amount,
}

#[derive(Deserialize)]
struct WithdrawParams {
    caller: AccountId,
    to: AccountId,
    #[serde(with = "serde_amount")]
    amount: Amount,
}

#[derive(Deserialize)]
struct TokenParams {
    caller: AccountId,
    token: TokenId,
}

#[derive(Deserialize)]
struct TierParams {
    tier: String,
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn amount_value(amount: Amount) -> Value {
    Value::String(format_amount(amount))
}

/// Dispatches JSON-RPC requests onto a running ledger service
pub struct RpcHandler<A: AssetLedger + 'static = InMemoryAssetLedger> {
    ledger: LedgerHandle<A>,
    clock: Clock,
}

impl<A: AssetLedger + 'static> Clone for RpcHandler<A> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<A: AssetLedger + 'static> RpcHandler<A> {
    /// Handler stamping calls with wall-clock time
    pub fn new(ledger: LedgerHandle<A>) -> Self {
        Self::with_clock(ledger, Arc::new(time::now))
    }

    pub fn with_clock(ledger: LedgerHandle<A>, clock: Clock) -> Self {
        Self { ledger, clock }
    }

    /// Handle a raw request body and produce the response body
    pub async fn handle_request(&self, request_str: &str) -> String {
        let response = match serde_json::from_str::<JsonRpcRequest>(request_str) {
            Ok(request) => self.handle(request).await,
            Err(_) => JsonRpcResponse::failure(None, JsonRpcError::parse_error()),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(
                r#"{{"jsonrpc":"2.0","error":{{"code":-32603,"message":"{}"}},"id":null}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::failure(request.id, JsonRpcError::invalid_request());
        }

        debug!(method = %request.method, "RPC request");
        match self.dispatch(&request.method, request.params).await {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::failure(request.id, error),
        }
    }

    /// Run a ledger operation on the service and encode its result
    async fn call<R, F>(&self, operation: &'static str, f: F) -> Result<Value, JsonRpcError>
    where
        F: FnOnce(&mut IncentiveLedger<A>) -> relaynet_incentives::Result<R> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let value = self
            .ledger
            .call(operation, f)
            .await
            .map_err(|e| JsonRpcError::from_ledger(&e))?;
        serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let now = (self.clock)();

        match method {
            // Identities
            "register" => {
                let p: RegisterParams = parse(params)?;
                self.call("register", move |l| {
                    l.register(p.caller, p.public_key, &p.display_name, now)
                })
                .await
            }
            "rotateKey" => {
                let p: KeyParams = parse(params)?;
                self.call("rotate_key", move |l| l.rotate_key(p.caller, p.public_key, now))
                    .await
            }
            "updateDisplayName" => {
                let p: DisplayNameParams = parse(params)?;
                self.call("update_display_name", move |l| {
                    l.update_display_name(p.caller, &p.display_name, now)
                })
                .await
            }
            "deactivate" => {
                let p: CallerParams = parse(params)?;
                self.call("deactivate", move |l| l.deactivate(p.caller, now).map(|_| true))
                    .await
            }

            // Relay nodes
            "registerAsRelay" => {
                let p: RelayParams = parse(params)?;
                self.call("register_as_relay", move |l| match p.storage_capacity_mb {
                    Some(storage) => l.register_as_relay(p.caller, &p.endpoint, storage, now),
                    None => l.register_as_relay_legacy(p.caller, &p.endpoint, now),
                })
                .await
            }
            "heartbeat" => {
                let p: CallerParams = parse(params)?;
                self.call("heartbeat", move |l| l.heartbeat(p.caller, now)).await
            }
            "updateStorage" => {
                let p: StorageParams = parse(params)?;
                self.call("update_storage", move |l| {
                    l.update_storage(p.caller, p.storage_capacity_mb, now)
                })
                .await
            }
            "updateEndpoint" => {
                let p: EndpointParams = parse(params)?;
                self.call("update_endpoint", move |l| {
                    l.update_endpoint(p.caller, &p.endpoint, now)
                })
                .await
            }
            "deactivateRelay" => {
                let p: CallerParams = parse(params)?;
                self.call("deactivate_relay", move |l| {
                    l.deactivate_relay(p.caller, now).map(amount_value)
                })
                .await
            }

            // Rewards
            "recordRelayedMessage" => {
                let p: RelayedMessageParams = parse(params)?;
                self.call("record_relayed_message", move |l| {
                    l.record_relayed_message(p.caller, p.relayer, p.message_id, p.base_reward, now)
                })
                .await
            }
            "claimFeeReward" => {
                let p: CallerParams = parse(params)?;
                self.call("claim_fee_reward", move |l| {
                    l.claim_fee_reward(p.caller, now).map(amount_value)
                })
                .await
            }
            "settleCycle" => {
                let p: SettleParams = parse(params)?;
                self.call("settle_cycle", move |l| match p.day {
                    Some(day) => l.settle_day(p.caller, day, now),
                    None => l.settle_cycle(p.caller, now),
                })
                .await
            }
            "fundRewardPool" => {
                let p: AmountParams = parse(params)?;
                self.call("fund_reward_pool", move |l| {
                    l.fund_reward_pool(p.caller, p.amount, now).map(|_| true)
                })
                .await
            }

            // Reputation
            "reportViolation" => {
                let p: TargetParams = parse(params)?;
                self.call("report_violation", move |l| {
                    l.report_violation(p.caller, p.target, &p.reason, now)
                })
                .await
            }
            "slashNode" => {
                let p: TargetParams = parse(params)?;
                self.call("slash_node", move |l| l.slash_node(p.caller, p.target, &p.reason, now))
                    .await
            }
            "blacklistNode" => {
                let p: TargetParams = parse(params)?;
                self.call("blacklist_node", move |l| {
                    l.blacklist_node(p.caller, p.target, &p.reason, now)
                })
                .await
            }
            "increaseReputation" => {
                let p: TargetParams = parse(params)?;
                self.call("increase_reputation", move |l| {
                    l.increase_reputation(p.caller, p.target, now)
                })
                .await
            }

            // Governance
            "setMinRelayStake" => {
                let p: AmountParams = parse(params)?;
                self.call("set_min_relay_stake", move |l| {
                    l.set_min_relay_stake(p.caller, p.amount, now).map(|_| true)
                })
                .await
            }
            "withdrawExcessMCT" => {
                let p: WithdrawParams = parse(params)?;
                self.call("withdraw_excess", move |l| {
                    l.withdraw_excess(p.caller, p.to, p.amount, now).map(|_| true)
                })
                .await
            }
            "setMCTToken" => {
                let p: TokenParams = parse(params)?;
                self.call("set_asset_token", move |l| {
                    l.set_asset_token(p.caller, p.token, now).map(|_| true)
                })
                .await
            }

            // Queries
            "isRegistered" => {
                let p: AccountParams = parse(params)?;
                self.call("is_registered", move |l| l.is_registered(&p.account)).await
            }
            "getIdentity" => {
                let p: AccountParams = parse(params)?;
                self.call("get_identity", move |l| l.get_identity(&p.account)).await
            }
            "getActiveRelayNodes" => {
                self.call("get_active_relay_nodes", |l| l.get_active_relay_nodes())
                    .await
            }
            "getRelayNode" => {
                let p: AccountParams = parse(params)?;
                self.call("get_relay_node", move |l| l.get_relay_node(&p.account)).await
            }
            "getTierRequirements" => {
                let p: TierParams = parse(params)?;
                let tier = Tier::parse(&p.tier).ok_or_else(|| {
                    JsonRpcError::invalid_params(format!("unknown tier {}", p.tier))
                })?;
                self.call("get_tier_requirements", move |l| Ok(l.get_tier_requirements(tier)))
                    .await
            }
            "getRewardMultiplier" => {
                let p: AccountParams = parse(params)?;
                self.call("get_reward_multiplier", move |l| {
                    l.get_reward_multiplier(&p.account)
                })
                .await
            }
            "isNodeOnline" => {
                let p: AccountParams = parse(params)?;
                self.call("is_node_online", move |l| l.is_node_online(&p.account, now))
                    .await
            }
            "getReputation" => {
                let p: AccountParams = parse(params)?;
                self.call("get_reputation", move |l| l.get_reputation(&p.account)).await
            }
            "getNodeSecurityInfo" => {
                let p: AccountParams = parse(params)?;
                self.call("get_node_security_info", move |l| {
                    l.get_node_security_info(&p.account)
                })
                .await
            }
            "checkRateLimit" => {
                let p: AccountParams = parse(params)?;
                self.call("check_rate_limit", move |l| Ok(l.check_rate_limit(&p.account, now)))
                    .await
            }
            "getNetworkStats" => {
                self.call("network_stats", move |l| l.network_stats(now)).await
            }
            "getGlobalState" => self.call("global_state", |l| l.global_state()).await,

            _ => Err(JsonRpcError::method_not_found(method)),
        }
    }
}

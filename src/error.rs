use std::time::Duration;

use alloy::primitives::TxHash;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletError>;

/// Failure taxonomy for the wallet client.
///
/// Connectivity failures degrade reads to a zero/unknown value at the call
/// site; state-changing operations always fail loudly. Nothing here is
/// retried automatically.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("keystore decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("no reachable RPC endpoint ({tried} candidates tried)")]
    NoReachableEndpoint { tried: usize },

    #[error("not connected to any RPC endpoint")]
    NotConnected,

    #[error("RPC {op} failed: {reason}")]
    RpcError { op: &'static str, reason: String },

    #[error("unknown function '{function}' on {contract}. Available functions: {available}")]
    UnknownFunction {
        contract: String,
        function: String,
        available: String,
    },

    #[error("failed to build or sign transaction for '{function}': {reason}")]
    SigningError { function: String, reason: String },

    #[error("node rejected transaction for '{function}': {reason}")]
    SubmissionRejected { function: String, reason: String },

    /// Local waiting stopped; the transaction may still confirm later.
    /// Callers must treat this as "outcome unknown", not as a failure.
    #[error("no receipt for {tx_hash} within {waited:?}; outcome unknown, the transaction may still confirm")]
    ConfirmationTimeout { tx_hash: TxHash, waited: Duration },

    #[error("configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid ABI signature '{0}'")]
    InvalidAbi(String),

    #[error("token amount out of range: {0}")]
    AmountOutOfRange(String),

    /// A multi-step flow stopped partway. The two-step flows are not atomic;
    /// the message names the step that already confirmed so the caller does
    /// not re-run it blindly.
    #[error("{flow}: {completed} succeeded but {failed} failed: {source}")]
    PartialFlow {
        flow: &'static str,
        completed: &'static str,
        failed: &'static str,
        #[source]
        source: Box<WalletError>,
    },
}

impl WalletError {
    pub fn rpc(op: &'static str, err: impl std::fmt::Display) -> Self {
        WalletError::RpcError {
            op,
            reason: interpret_rpc_error(&err.to_string()),
        }
    }
}

/// Maps raw RPC error text onto something an end user can act on.
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "the contract reverted execution; its requirements were not met".to_string()
    } else if error.contains("insufficient funds") {
        "insufficient funds to cover the transaction value plus gas".to_string()
    } else if error.contains("nonce too low") {
        "nonce too low; another transaction was already mined with this nonce".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "gas price too low to replace a pending transaction".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "cannot reach the RPC endpoint; check connectivity and endpoint URL".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "request timed out; the RPC endpoint may be overloaded".to_string()
    } else if error.contains("rate limit") {
        "rate limited by the RPC endpoint; try again shortly".to_string()
    } else {
        error.to_string()
    }
}

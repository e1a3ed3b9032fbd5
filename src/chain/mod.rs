pub mod abi;
pub mod invoker;
pub mod keystore;
pub mod node;
pub mod token;

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

/// An in-flight contract invocation, returned as soon as the raw transaction
/// is accepted by the node. Confirmation is a separate, explicit step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCall {
    pub tx_hash: TxHash,
    pub contract: Address,
    pub function: String,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub value: U256,
}

/// The confirmed outcome of a submitted transaction. `success` is the
/// authoritative signal; a transaction hash alone proves nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u128,
    pub success: bool,
}

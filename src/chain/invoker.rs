use std::sync::Arc;
use std::time::Duration;

use alloy::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt},
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, TxHash, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::abi::ContractAbi;
use super::keystore::KeyStore;
use super::node::NodeConnection;
use super::{PendingCall, Receipt};
use crate::config::GasConfig;
use crate::error::{interpret_rpc_error, Result, WalletError};

/// Builds, signs, and submits contract calls for a single account.
///
/// Nonce assignment is the one piece of shared mutable state: a serialized
/// tracker seeded from the pending transaction count, so back-to-back
/// submissions get strictly increasing nonces before any of them confirm.
pub struct ContractInvoker {
    node: Arc<NodeConnection>,
    keys: KeyStore,
    gas: GasConfig,
    poll_interval: Duration,
    nonces: Mutex<Option<u64>>,
}

impl std::fmt::Debug for ContractInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractInvoker")
            .field("sender", &self.keys.address())
            .finish_non_exhaustive()
    }
}

impl ContractInvoker {
    pub fn new(
        node: Arc<NodeConnection>,
        keys: KeyStore,
        gas: GasConfig,
        poll_interval: Duration,
    ) -> Self {
        Self {
            node,
            keys,
            gas,
            poll_interval,
            nonces: Mutex::new(None),
        }
    }

    pub fn sender(&self) -> Address {
        self.keys.address()
    }

    pub fn node(&self) -> &Arc<NodeConnection> {
        &self.node
    }

    /// Signs and submits a state-changing contract call, returning as soon as
    /// the node accepts the raw transaction. Confirmation is a separate step;
    /// call [`wait_for_receipt`](Self::wait_for_receipt) for the outcome.
    pub async fn build_and_send(
        &self,
        contract: Address,
        abi: &ContractAbi,
        function_name: &str,
        args: &[DynSolValue],
        value: U256,
    ) -> Result<PendingCall> {
        let function = abi.resolve(function_name)?;
        let calldata: Bytes = function
            .abi_encode_input(args)
            .map_err(|e| WalletError::SigningError {
                function: function_name.to_string(),
                reason: format!("argument encoding failed: {}", e),
            })?
            .into();

        self.submit(contract, function_name, calldata, value, self.gas.call_gas_limit)
            .await
    }

    /// Plain value transfer with the base 21000 gas limit.
    pub async fn send_native(&self, to: Address, value: U256) -> Result<PendingCall> {
        self.submit(to, "transfer", Bytes::new(), value, self.gas.transfer_gas_limit)
            .await
    }

    async fn submit(
        &self,
        to: Address,
        function_name: &str,
        calldata: Bytes,
        value: U256,
        gas_limit: u64,
    ) -> Result<PendingCall> {
        let quoted = self.node.gas_price().await?;
        let gas_price = buffered_gas_price(quoted, self.gas.price_buffer_percent);
        let nonce = self.reserve_nonce().await?;

        debug!(
            "Submitting '{}' to {:?} (nonce {}, gas price {} -> {})",
            function_name, to, nonce, quoted, gas_price
        );

        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_value(value)
            .with_nonce(nonce)
            .with_chain_id(self.node.chain_id())
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price);

        let wallet = EthereumWallet::from(self.keys.signer().clone());
        let envelope = request
            .build(&wallet)
            .await
            .map_err(|e| WalletError::SigningError {
                function: function_name.to_string(),
                reason: e.to_string(),
            })?;

        let provider = self.node.provider().await?;
        let pending = match provider.send_raw_transaction(&envelope.encoded_2718()).await {
            Ok(pending) => pending,
            Err(e) => {
                // The local counter no longer matches what the node saw;
                // the next submission re-queries the pending count.
                self.reset_nonce_tracker().await;
                return Err(WalletError::SubmissionRejected {
                    function: function_name.to_string(),
                    reason: interpret_rpc_error(&e.to_string()),
                });
            }
        };

        let tx_hash = *pending.tx_hash();
        info!("Submitted '{}': {:?}", function_name, tx_hash);

        Ok(PendingCall {
            tx_hash,
            contract: to,
            function: function_name.to_string(),
            nonce,
            gas_price,
            gas_limit,
            value,
        })
    }

    /// Read-only eth_call with decoded return values. No signing, nonce, or
    /// gas involved.
    pub async fn call(
        &self,
        contract: Address,
        abi: &ContractAbi,
        function_name: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>> {
        let function = abi.resolve(function_name)?;
        let calldata: Bytes = function
            .abi_encode_input(args)
            .map_err(|e| WalletError::SigningError {
                function: function_name.to_string(),
                reason: format!("argument encoding failed: {}", e),
            })?
            .into();

        let provider = self.node.provider().await?;
        let request = TransactionRequest::default()
            .with_to(contract)
            .with_input(calldata);

        let returned = provider
            .call(&request)
            .await
            .map_err(|e| WalletError::rpc("eth_call", e))?;

        function
            .abi_decode_output(&returned, false)
            .map_err(|e| WalletError::RpcError {
                op: "eth_call",
                reason: format!("failed to decode '{}' return data: {}", function_name, e),
            })
    }

    /// Polls for the receipt until it appears or the bounded wait elapses.
    /// A timeout means "outcome unknown" — the transaction cannot be
    /// recalled and may still confirm later.
    pub async fn wait_for_receipt(&self, tx_hash: TxHash, timeout: Duration) -> Result<Receipt> {
        let provider = self.node.provider().await?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    let success = receipt.status();
                    if success {
                        info!(
                            "Transaction {:?} confirmed in block {:?}",
                            tx_hash, receipt.block_number
                        );
                    } else {
                        warn!("Transaction {:?} reverted on-chain", tx_hash);
                    }
                    return Ok(Receipt {
                        tx_hash,
                        block_number: receipt.block_number,
                        gas_used: receipt.gas_used,
                        success,
                    });
                }
                Ok(None) => {}
                Err(e) => debug!("Receipt poll for {:?} failed: {}", tx_hash, e),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(WalletError::ConfirmationTimeout {
                    tx_hash,
                    waited: timeout,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Hands out the next nonce. The lock is held across the pending-count
    /// query so concurrent flows cannot interleave assignments.
    async fn reserve_nonce(&self) -> Result<u64> {
        let mut tracker = self.nonces.lock().await;
        let next = match *tracker {
            Some(last) => last + 1,
            None => self.node.transaction_count(self.keys.address(), true).await?,
        };
        *tracker = Some(next);
        Ok(next)
    }

    async fn reset_nonce_tracker(&self) {
        *self.nonces.lock().await = None;
    }

    #[cfg(test)]
    pub(crate) async fn seed_nonce(&self, last: u64) {
        *self.nonces.lock().await = Some(last);
    }

    #[cfg(test)]
    pub(crate) async fn next_nonce_for_test(&self) -> Result<u64> {
        self.reserve_nonce().await
    }
}

fn buffered_gas_price(quoted: u128, buffer_percent: u64) -> u128 {
    quoted + quoted * buffer_percent as u128 / 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, NetworkConfig};

    // An offline connection built from an empty endpoint list is enough for
    // nonce-tracker tests; no probe ever leaves the process.
    async fn offline_invoker() -> ContractInvoker {
        let network = NetworkConfig {
            endpoints: vec![],
            chain_id: 11155111,
            explorer_url: None,
            connect_timeout_secs: 1,
        };
        let node = Arc::new(NodeConnection::establish(&network).await);
        ContractInvoker::new(
            node,
            KeyStore::generate(),
            Config::default().gas,
            Duration::from_millis(100),
        )
    }

    #[test]
    fn gas_price_buffer_adds_twenty_percent() {
        assert_eq!(buffered_gas_price(100, 20), 120);
        assert_eq!(buffered_gas_price(1_000_000_000, 20), 1_200_000_000);
        assert_eq!(buffered_gas_price(0, 20), 0);
        // Rounds down on non-multiples, never below the quote.
        assert_eq!(buffered_gas_price(7, 20), 8);
    }

    #[tokio::test]
    async fn seeded_nonces_are_strictly_increasing() {
        let invoker = offline_invoker().await;
        invoker.seed_nonce(41).await;
        let a = invoker.next_nonce_for_test().await.unwrap();
        let b = invoker.next_nonce_for_test().await.unwrap();
        let c = invoker.next_nonce_for_test().await.unwrap();
        assert_eq!((a, b, c), (42, 43, 44));
    }

    #[tokio::test]
    async fn reset_clears_a_seeded_tracker() {
        let invoker = offline_invoker().await;
        invoker.seed_nonce(7).await;
        invoker.reset_nonce_tracker().await;
        // Back to unseeded: the next reservation re-queries the pending
        // count, which fails offline.
        assert!(matches!(
            invoker.next_nonce_for_test().await,
            Err(WalletError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn unseeded_nonce_requires_a_connection() {
        let invoker = offline_invoker().await;
        assert!(matches!(
            invoker.next_nonce_for_test().await,
            Err(WalletError::NotConnected)
        ));
    }
}

use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::{Result, WalletError};

type HttpProvider = RootProvider<Http<Client>>;

/// A link to one of several candidate RPC endpoints.
///
/// Endpoints are tried in order; the first that answers a latest-block probe
/// within the bounded timeout becomes active. When none is reachable the
/// connection still constructs in a degraded offline state so that read
/// paths can report zero/unknown instead of crashing the caller.
pub struct NodeConnection {
    endpoints: Vec<String>,
    chain_id: u64,
    connect_timeout: Duration,
    active: RwLock<Option<ActiveEndpoint>>,
}

struct ActiveEndpoint {
    provider: HttpProvider,
    url: String,
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("endpoints", &self.endpoints)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl NodeConnection {
    /// Connects to the first reachable endpoint. Always returns a usable
    /// value; an all-endpoints-down start is logged and left offline.
    pub async fn establish(config: &NetworkConfig) -> Self {
        let connection = Self {
            endpoints: config.endpoints.clone(),
            chain_id: config.chain_id,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            active: RwLock::new(None),
        };

        if let Err(e) = connection.reconnect().await {
            warn!("Starting in offline mode: {}", e);
        }

        connection
    }

    /// Re-runs endpoint selection from the top of the candidate list.
    pub async fn reconnect(&self) -> Result<()> {
        for url in &self.endpoints {
            debug!("Probing RPC endpoint {}", url);

            let parsed = match url.parse() {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping malformed endpoint {}: {}", url, e);
                    continue;
                }
            };
            let provider = ProviderBuilder::new().on_http(parsed);

            match tokio::time::timeout(self.connect_timeout, provider.get_block_number()).await {
                Ok(Ok(block)) => {
                    info!("Connected to {} (latest block {})", url, block);
                    *self.active.write().await = Some(ActiveEndpoint {
                        provider,
                        url: url.clone(),
                    });
                    return Ok(());
                }
                Ok(Err(e)) => debug!("Endpoint {} rejected probe: {}", url, e),
                Err(_) => debug!("Endpoint {} probe timed out", url),
            }
        }

        *self.active.write().await = None;
        Err(WalletError::NoReachableEndpoint {
            tried: self.endpoints.len(),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn active_endpoint(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|a| a.url.clone())
    }

    /// Live connectivity check: re-probes the active endpoint rather than
    /// trusting a stale flag.
    pub async fn is_connected(&self) -> bool {
        match self.provider().await {
            Ok(provider) => provider.get_block_number().await.is_ok(),
            Err(_) => false,
        }
    }

    /// Handle to the active provider, or `NotConnected` when offline.
    pub async fn provider(&self) -> Result<HttpProvider> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|a| a.provider.clone())
            .ok_or(WalletError::NotConnected)
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        let provider = self.provider().await?;
        provider
            .get_balance(address)
            .await
            .map_err(|e| WalletError::rpc("eth_getBalance", e))
    }

    pub async fn code_at(&self, address: Address) -> Result<Bytes> {
        let provider = self.provider().await?;
        provider
            .get_code_at(address)
            .await
            .map_err(|e| WalletError::rpc("eth_getCode", e))
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let provider = self.provider().await?;
        provider
            .get_gas_price()
            .await
            .map_err(|e| WalletError::rpc("eth_gasPrice", e))
    }

    /// Transaction count for an account. With `include_pending` the count
    /// covers still-unmined transactions, which is what nonce assignment
    /// for back-to-back submissions needs.
    pub async fn transaction_count(&self, address: Address, include_pending: bool) -> Result<u64> {
        let provider = self.provider().await?;
        let request = provider.get_transaction_count(address);
        let count = if include_pending {
            request.pending().await
        } else {
            request.await
        };
        count.map_err(|e| WalletError::rpc("eth_getTransactionCount", e))
    }

    pub async fn block_number(&self) -> Result<u64> {
        let provider = self.provider().await?;
        provider
            .get_block_number()
            .await
            .map_err(|e| WalletError::rpc("eth_blockNumber", e))
    }
}

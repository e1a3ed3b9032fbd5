use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, warn};

use crate::chain::keystore::KeyStore;
use crate::error::{Result, WalletError};

/// Per-device wallet record, one JSON file per derived user id.
///
/// The private key is stored as plaintext hex, matching the demo's
/// on-disk format. That is a real weakness for anything beyond testnet
/// funds; a warning is logged whenever the record is written or loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub user_id: String,
    pub wallet_address: String,
    pub private_key: String,
    pub created_at: String,
    pub device_info: DeviceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub system: String,
    pub node: String,
    pub user: String,
}

impl DeviceInfo {
    fn current() -> Self {
        Self {
            system: std::env::consts::OS.to_string(),
            node: whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string()),
            user: whoami::username(),
        }
    }
}

/// Deterministic per-device user id: first 16 hex characters of
/// SHA-256 over "hostname-system-username".
pub fn derive_user_id(info: &DeviceInfo) -> String {
    let fingerprint = format!("{}-{}-{}", info.node, info.system, info.user);
    let digest = Sha256::digest(fingerprint.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn record_path(dir: &Path, user_id: &str) -> PathBuf {
    dir.join(format!("user_{}.json", user_id))
}

/// Loads this device's identity record, creating a fresh key and record on
/// first run.
pub async fn load_or_create(dir: &Path) -> Result<(DeviceIdentity, KeyStore)> {
    let device_info = DeviceInfo::current();
    let user_id = derive_user_id(&device_info);
    let path = record_path(dir, &user_id);

    if path.exists() {
        let content = fs::read_to_string(&path).await.map_err(|e| {
            WalletError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let identity: DeviceIdentity = serde_json::from_str(&content).map_err(|e| {
            WalletError::InvalidConfig(format!("corrupt identity record {}: {}", path.display(), e))
        })?;

        let keys = KeyStore::import(&identity.private_key)?;
        let derived = keys.address().to_checksum(None);
        if !derived.eq_ignore_ascii_case(&identity.wallet_address) {
            return Err(WalletError::InvalidKeyFormat(format!(
                "identity record address {} does not match key-derived address {}",
                identity.wallet_address, derived
            )));
        }

        warn!("Identity record stores the private key unencrypted at rest");
        info!("Loaded existing wallet for user {}", identity.user_id);
        return Ok((identity, keys));
    }

    let keys = KeyStore::generate();
    let identity = DeviceIdentity {
        user_id: user_id.clone(),
        wallet_address: keys.address().to_checksum(None),
        private_key: keys.secret_hex(),
        created_at: chrono::Utc::now().to_rfc3339(),
        device_info,
    };

    fs::create_dir_all(dir).await.map_err(|e| {
        WalletError::InvalidConfig(format!("cannot create {}: {}", dir.display(), e))
    })?;
    let content = serde_json::to_string_pretty(&identity).map_err(|e| {
        WalletError::InvalidConfig(format!("failed to serialize identity: {}", e))
    })?;
    fs::write(&path, content).await.map_err(|e| {
        WalletError::InvalidConfig(format!("failed to write {}: {}", path.display(), e))
    })?;

    warn!("Identity record stores the private key unencrypted at rest");
    info!(
        "Created new wallet {} for user {}",
        identity.wallet_address, identity.user_id
    );
    Ok((identity, keys))
}

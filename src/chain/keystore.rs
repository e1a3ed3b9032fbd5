use std::path::Path;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;

use crate::error::{Result, WalletError};

/// A single signing identity: one 32-byte secret and its derived,
/// checksum-formatted address. The secret never appears in logs or output.
pub struct KeyStore {
    signer: PrivateKeySigner,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Generates a fresh random key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Imports a raw secret: exactly 64 hex characters, optional `0x` prefix.
    pub fn import(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        let secret = secret
            .strip_prefix("0x")
            .or_else(|| secret.strip_prefix("0X"))
            .unwrap_or(secret);

        if secret.len() != 64 {
            return Err(WalletError::InvalidKeyFormat(format!(
                "expected 64 hex characters, got {}",
                secret.len()
            )));
        }

        let bytes = hex::decode(secret)
            .map_err(|_| WalletError::InvalidKeyFormat("non-hexadecimal characters".to_string()))?;

        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| WalletError::InvalidKeyFormat(e.to_string()))?;

        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Raw secret as lowercase hex, for the device identity record only.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signer.to_bytes())
    }

    /// Writes an encrypted JSON keystore at `path`. The file is the only
    /// side effect.
    pub fn save_encrypted<P: AsRef<Path>>(&self, path: P, passphrase: &str) -> Result<()> {
        let path = path.as_ref();
        let dir = path.parent().ok_or_else(|| {
            WalletError::InvalidConfig(format!("keystore path {} has no parent", path.display()))
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                WalletError::InvalidConfig(format!("keystore path {} has no file name", path.display()))
            })?;

        std::fs::create_dir_all(dir).map_err(|e| {
            WalletError::InvalidConfig(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let mut rng = rand::thread_rng();
        PrivateKeySigner::encrypt_keystore(dir, &mut rng, self.signer.to_bytes(), passphrase, Some(name))
            .map_err(|e| WalletError::DecryptionFailed(format!("encryption failed: {}", e)))?;

        tracing::info!("Saved encrypted keystore to {}", path.display());
        Ok(())
    }

    pub fn load_encrypted<P: AsRef<Path>>(path: P, passphrase: &str) -> Result<Self> {
        let path = path.as_ref();
        let signer = PrivateKeySigner::decrypt_keystore(path, passphrase)
            .map_err(|e| WalletError::DecryptionFailed(e.to_string()))?;

        tracing::info!("Loaded keystore for {:?}", signer.address());
        Ok(Self { signer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // Standard secp256k1 test vectors: privkey 1 and 2 and their addresses.
    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const ADDR_ONE: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";
    const KEY_TWO: &str = "0000000000000000000000000000000000000000000000000000000000000002";
    const ADDR_TWO: &str = "0x2B5AD5c4795c026514f8317c7a215E218DcCD6cF";

    #[test]
    fn derivation_is_deterministic() {
        let a = KeyStore::import(KEY_ONE).unwrap();
        let b = KeyStore::import(&format!("0x{}", KEY_ONE)).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.address(), Address::from_str(ADDR_ONE).unwrap());
        assert_eq!(
            KeyStore::import(KEY_TWO).unwrap().address(),
            Address::from_str(ADDR_TWO).unwrap()
        );
    }

    #[test]
    fn import_validates_format() {
        assert!(matches!(
            KeyStore::import("abc123"),
            Err(WalletError::InvalidKeyFormat(_))
        ));
        assert!(matches!(
            KeyStore::import(&"f".repeat(63)),
            Err(WalletError::InvalidKeyFormat(_))
        ));
        assert!(matches!(
            KeyStore::import(&"g".repeat(64)),
            Err(WalletError::InvalidKeyFormat(_))
        ));
        assert!(KeyStore::import(&"A".repeat(64)).is_ok());
        assert!(KeyStore::import(&format!("0x{}", "a".repeat(64))).is_ok());
    }

    #[test]
    fn generate_produces_distinct_keys() {
        let a = KeyStore::generate();
        let b = KeyStore::generate();
        assert_ne!(a.address(), b.address());
        assert_eq!(a.secret_hex().len(), 64);
    }

    #[test]
    fn encrypted_round_trip_preserves_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");

        let original = KeyStore::generate();
        original.save_encrypted(&path, "p@ss").unwrap();

        let loaded = KeyStore::load_encrypted(&path, "p@ss").unwrap();
        assert_eq!(loaded.address(), original.address());

        assert!(matches!(
            KeyStore::load_encrypted(&path, "wrong"),
            Err(WalletError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn checksum_formatting() {
        let store = KeyStore::import(KEY_ONE).unwrap();
        // Address renders with EIP-55 mixed-case checksum.
        assert_eq!(store.address().to_checksum(None), ADDR_ONE);
    }
}

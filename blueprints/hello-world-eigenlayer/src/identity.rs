use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Signature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),
    #[error("Signing failed: {0}")]
    Signing(String),
}

/// The operator's ECDSA signing key and the address derived from it.
///
/// The key never leaves the process: `Debug` only prints the address.
#[derive(Clone)]
pub struct Identity {
    signer: PrivateKeySigner,
}

impl Identity {
    /// Parses a hex encoded secp256k1 private key, with or without a `0x` prefix.
    ///
    /// # Errors
    /// - [`IdentityError::InvalidKey`] if the string is not a valid private key
    pub fn from_hex(key: &str) -> Result<Self, IdentityError> {
        let signer = PrivateKeySigner::from_str(key.trim())
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signs a 32-byte prehash. Signing is deterministic (RFC 6979).
    ///
    /// # Errors
    /// - [`IdentityError::Signing`] if the signer rejects the hash
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature, IdentityError> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| IdentityError::Signing(e.to_string()))
    }

    /// A wallet that signs transactions with this identity's key
    #[must_use]
    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

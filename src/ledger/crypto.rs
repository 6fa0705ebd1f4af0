use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use log::{debug, warn};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sled::Tree;
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;
use std::str::FromStr;

use super::transaction::Transaction;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to generate address: {0}")]
    KeyGenerationError(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Key store error: {0}")]
    KeyStoreError(String),
}

/// Opaque wallet address, unique per generated key pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Creates an address from an ed25519 public key (base58 of the key bytes)
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Address(bs58::encode(public_key.as_bytes()).into_string())
    }

    /// Converts the address back into the public key it was derived from
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key length".to_string())
        })?;

        VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CryptoError::DecodingError("Address is empty".to_string()));
        }
        Ok(Address(s.to_string()))
    }
}

/// A base58 encoded ed25519 signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(bs58::encode(signature.to_bytes()).into_string())
    }

    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

/// Source of fresh wallet addresses.
///
/// Implementations must never hand out the same address twice within the
/// lifetime of the process.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, currency: &str) -> Result<Address, CryptoError>;

    /// Drops the key behind an address that was generated but never
    /// registered
    fn forget(&self, _address: &Address) {}
}

/// Signs transactions at submission and authorizes them at mining time.
pub trait Signer: Send + Sync {
    /// Returns a signature over `transaction` if this signer holds the sender's key
    fn sign(&self, transaction: &Transaction) -> Option<DigitalSignature>;

    /// Checks that `transaction` carries a valid signature by its sender
    fn is_authorized(&self, transaction: &Transaction) -> bool;
}

/// ed25519 key store acting as both key generator and signer.
///
/// Keys live in memory. A keyring opened with [`Keyring::with_tree`] also
/// writes every key it learns to that sled tree and reloads them on open.
#[derive(Default)]
pub struct Keyring {
    keys: DashMap<Address, SigningKey>,
    store: Option<Tree>,
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("keys", &self.keys.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Keyring {
    pub fn new() -> Self {
        Keyring {
            keys: DashMap::new(),
            store: None,
        }
    }

    /// Opens a keyring backed by `tree`, loading every key already in it
    pub fn with_tree(tree: Tree) -> Result<Self, CryptoError> {
        let keys = DashMap::new();

        for entry in tree.iter() {
            let (_, value) = entry.map_err(|e| CryptoError::KeyStoreError(e.to_string()))?;
            let signing_key = signing_key_from_bytes(&value)?;
            keys.insert(Address::from_public_key(&signing_key.verifying_key()), signing_key);
        }

        Ok(Keyring {
            keys,
            store: Some(tree),
        })
    }

    /// Imports an existing 32 byte secret key and returns its address
    pub fn import_secret_key(&self, secret_key_bytes: &[u8]) -> Result<Address, CryptoError> {
        let signing_key = signing_key_from_bytes(secret_key_bytes)?;
        let address = Address::from_public_key(&signing_key.verifying_key());
        self.insert(&address, signing_key)?;

        Ok(address)
    }

    /// Exports the secret key behind `address`, if this keyring holds it
    pub fn export_secret_key(&self, address: &Address) -> Option<Vec<u8>> {
        self.keys.get(address).map(|key| key.to_bytes().to_vec())
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    // Persists before caching, so a key in memory is always on disk too
    fn insert(&self, address: &Address, signing_key: SigningKey) -> Result<(), CryptoError> {
        if let Some(store) = &self.store {
            store
                .insert(address.0.as_bytes(), signing_key.to_bytes().to_vec())
                .and_then(|_| store.flush())
                .map_err(|e| CryptoError::KeyStoreError(e.to_string()))?;
        }

        self.keys.insert(address.clone(), signing_key);
        Ok(())
    }
}

fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey, CryptoError> {
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
    })?;

    Ok(SigningKey::from_bytes(&bytes))
}

impl KeyGenerator for Keyring {
    fn generate(&self, currency: &str) -> Result<Address, CryptoError> {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let address = Address::from_public_key(&signing_key.verifying_key());

        if self.keys.contains_key(&address) {
            return Err(CryptoError::KeyGenerationError(format!(
                "Generated duplicate address {}",
                address
            )));
        }

        debug!("Generated {} address {}", currency, address);
        self.insert(&address, signing_key)?;

        Ok(address)
    }

    fn forget(&self, address: &Address) {
        self.keys.remove(address);

        if let Some(store) = &self.store {
            if let Err(e) = store.remove(address.0.as_bytes()).and_then(|_| store.flush()) {
                warn!("Failed to remove key for {}: {}", address, e);
            }
        }
    }
}

impl Signer for Keyring {
    fn sign(&self, transaction: &Transaction) -> Option<DigitalSignature> {
        let key = self.keys.get(&transaction.from)?;
        let message = transaction.signing_bytes().ok()?;
        Some(DigitalSignature::from_signature(&key.sign(&message)))
    }

    fn is_authorized(&self, transaction: &Transaction) -> bool {
        let Some(signature) = &transaction.signature else {
            return false;
        };
        let Ok(public_key) = transaction.from.to_public_key() else {
            return false;
        };
        let Ok(message) = transaction.signing_bytes() else {
            return false;
        };

        verify_signature(&message, signature, &public_key).unwrap_or(false)
    }
}

/// Verifies a signature against a message and public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;
    Ok(public_key.verify(message, &signature).is_ok())
}

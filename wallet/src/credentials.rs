use crate::errors::WalletError;
use ed25519_dalek::SigningKey;
use forge_primitives::Address;
use std::fmt;

/// A supplied signing key and the address derived from it.
///
/// The key never leaves this type except for signing; `Debug` prints only
/// the label and address.
#[derive(Clone)]
pub struct Credentials {
    label: String,
    signing_key: SigningKey,
    address: Address,
}

impl Credentials {
    /// Build from a raw 32-byte ed25519 seed
    pub fn from_seed(label: impl Into<String>, seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let address = Address::from_public_key(&signing_key.verifying_key().to_bytes());
        Self {
            label: label.into(),
            signing_key,
            address,
        }
    }

    /// Parse a hex-encoded seed, with or without `0x`
    pub fn from_hex(label: impl Into<String>, key_hex: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(key_hex.trim().trim_start_matches("0x"))?;
        if bytes.len() != 32 {
            return Err(WalletError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        Ok(Self::from_seed(label, seed))
    }

    /// Read a hex seed from an environment variable
    pub fn from_env(label: impl Into<String>, var: &str) -> Result<Self, WalletError> {
        let value =
            std::env::var(var).map_err(|_| WalletError::MissingCredential(var.to_string()))?;
        Self::from_hex(label, &value)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("label", &self.label)
            .field("address", &self.address)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

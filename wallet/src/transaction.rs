use crate::credentials::Credentials;
use crate::errors::WalletError;
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use forge_primitives::{keccak256, Address, Hash};
use serde::{Deserialize, Serialize};

/// Fee-market transaction in the ledger's native wire format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub from: [u8; 32],
    pub to: Option<Address>,
    pub value: u128,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Bytes covered by the signature and the transaction hash
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(160 + self.data.len());
        out.extend_from_slice(&self.chain_id.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.from);
        match &self.to {
            Some(to) => {
                out.push(1);
                out.extend_from_slice(to.as_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.gas_limit.to_le_bytes());
        out.extend_from_slice(&self.max_fee_per_gas.to_le_bytes());
        out.extend_from_slice(&self.max_priority_fee_per_gas.to_le_bytes());
        out
    }

    /// Keccak-256 over the canonical bytes; chain id is included for replay protection
    pub fn hash(&self) -> Hash {
        keccak256(self.canonical_bytes())
    }

    pub fn sender(&self) -> Address {
        Address::from_public_key(&self.from)
    }

    /// Check the ed25519 signature against `from`
    pub fn verify(&self) -> Result<(), WalletError> {
        let key = VerifyingKey::from_bytes(&self.from).map_err(|_| WalletError::InvalidSignature)?;
        let sig_bytes: [u8; 64] = self
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::InvalidSignature)?;
        key.verify(&self.canonical_bytes(), &Signature::from_bytes(&sig_bytes))
            .map_err(|_| WalletError::InvalidSignature)
    }
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub hash: Hash,
    pub raw: Vec<u8>,
}

impl SignedTransaction {
    /// Decode and verify a raw payload as received by a node
    pub fn decode(raw: &[u8]) -> Result<Self, WalletError> {
        let transaction: Transaction = bincode::deserialize(raw)?;
        transaction.verify()?;
        Ok(Self {
            hash: transaction.hash(),
            transaction,
            raw: raw.to_vec(),
        })
    }
}

/// Transaction builder
pub struct TransactionBuilder {
    to: Option<Address>,
    value: u128,
    data: Vec<u8>,
    nonce: u64,
    gas_limit: u64,
    max_fee_per_gas: u128,
    max_priority_fee_per_gas: u128,
    chain_id: u64,
}

impl TransactionBuilder {
    /// Create new transaction builder
    pub fn new() -> Self {
        Self {
            to: None,
            value: 0,
            data: Vec::new(),
            nonce: 0,
            gas_limit: 21_000,
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
            chain_id: 1337,
        }
    }

    pub fn to(mut self, to: Option<Address>) -> Self {
        self.to = to;
        self
    }

    pub fn value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn fees(mut self, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        self.max_fee_per_gas = max_fee_per_gas;
        self.max_priority_fee_per_gas = max_priority_fee_per_gas;
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Build and sign transaction
    pub fn build_and_sign(self, signer: &Credentials) -> Result<SignedTransaction, WalletError> {
        if self.max_priority_fee_per_gas > self.max_fee_per_gas {
            return Err(WalletError::Other(format!(
                "priority fee {} exceeds max fee {}",
                self.max_priority_fee_per_gas, self.max_fee_per_gas
            )));
        }

        let mut tx = Transaction {
            chain_id: self.chain_id,
            nonce: self.nonce,
            from: signer.public_key(),
            to: self.to,
            value: self.value,
            data: self.data,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            signature: Vec::new(),
        };

        let signature = signer.signing_key().sign(&tx.canonical_bytes());
        tx.signature = signature.to_bytes().to_vec();

        let raw = bincode::serialize(&tx)?;

        Ok(SignedTransaction {
            hash: tx.hash(),
            transaction: tx,
            raw,
        })
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Credentials {
        Credentials::from_seed("test", [42u8; 32])
    }

    #[test]
    fn test_transaction_builder() {
        let creds = signer();
        let tx = TransactionBuilder::new()
            .to(Some(Address([0x11; 20])))
            .data(vec![1, 2, 3])
            .nonce(4)
            .gas_limit(50_000)
            .fees(3_000_000_000, 1_000_000_000)
            .chain_id(1337)
            .build_and_sign(&creds)
            .unwrap();

        assert_eq!(tx.transaction.sender(), creds.address());
        assert_eq!(tx.transaction.nonce, 4);
        assert!(tx.transaction.verify().is_ok());

        let decoded = SignedTransaction::decode(&tx.raw).unwrap();
        assert_eq!(decoded.hash, tx.hash);
    }

    #[test]
    fn test_chain_id_changes_hash() {
        let creds = signer();
        let a = TransactionBuilder::new().chain_id(1).build_and_sign(&creds).unwrap();
        let b = TransactionBuilder::new().chain_id(2).build_and_sign(&creds).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let creds = signer();
        let mut tx = TransactionBuilder::new()
            .nonce(1)
            .build_and_sign(&creds)
            .unwrap()
            .transaction;
        tx.nonce = 2;
        assert!(matches!(tx.verify(), Err(WalletError::InvalidSignature)));
    }

    #[test]
    fn test_priority_fee_above_max_fee_rejected() {
        let result = TransactionBuilder::new()
            .fees(1, 2)
            .build_and_sign(&signer());
        assert!(result.is_err());
    }
}

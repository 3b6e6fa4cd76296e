// forge/core/primitives/src/abi.rs

//! Minimal contract ABI codec.
//!
//! Covers the static types `address`, `uint256`, `bytes32`, `bool` and the
//! dynamic type `string`, which is everything the capability and attestation
//! contracts take or return.

use crate::types::{keccak256, Address, Hash};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const WORD: usize = 32;

/// Selector of the standard `Error(string)` revert payload
pub const REVERT_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("calldata too short: need {need} bytes, have {have}")]
    ShortData { need: usize, have: usize },

    #[error("selector mismatch: expected 0x{expected}, got 0x{actual}")]
    SelectorMismatch { expected: String, actual: String },

    #[error("invalid string payload: {0}")]
    InvalidString(String),

    #[error("value out of range for {0}")]
    OutOfRange(&'static str),
}

/// A decoded or to-be-encoded ABI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    FixedBytes(Hash),
    Bool(bool),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_))
    }

    pub fn into_address(self) -> Option<Address> {
        match self {
            Token::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_uint(self) -> Option<U256> {
        match self {
            Token::Uint(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_fixed_bytes(self) -> Option<Hash> {
        match self {
            Token::FixedBytes(h) => Some(h),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Token::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Parameter type used to drive decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint,
    FixedBytes,
    Bool,
    String,
}

/// First four bytes of keccak256 of the canonical function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_bytes()[..4]);
    out
}

fn uint_word(value: U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    word
}

fn static_word(token: &Token) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    match token {
        Token::Address(addr) => word[12..].copy_from_slice(addr.as_bytes()),
        Token::Uint(v) => word = uint_word(*v),
        Token::FixedBytes(h) => word.copy_from_slice(h.as_bytes()),
        Token::Bool(b) => word[31] = u8::from(*b),
        Token::String(_) => unreachable!("dynamic token has no static word"),
    }
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Head/tail encode a sequence of tokens
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            let offset = head_len + tail.len();
            head.extend_from_slice(&uint_word(U256::from(offset)));
            if let Token::String(s) = token {
                let bytes = s.as_bytes();
                tail.extend_from_slice(&uint_word(U256::from(bytes.len())));
                tail.extend_from_slice(bytes);
                tail.resize(tail.len() + padded_len(bytes.len()) - bytes.len(), 0);
            }
        } else {
            head.extend_from_slice(&static_word(token));
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Selector followed by the encoded arguments
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(args));
    data
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset
        .checked_add(WORD)
        .ok_or(AbiError::OutOfRange("offset"))?;
    data.get(offset..end).ok_or(AbiError::ShortData {
        need: end,
        have: data.len(),
    })
}

fn word_as_usize(word: &[u8]) -> Result<usize, AbiError> {
    let value = U256::from_big_endian(word);
    if value > U256::from(usize::MAX) {
        return Err(AbiError::OutOfRange("usize"));
    }
    Ok(value.as_usize())
}

/// Decode an argument block (no selector) against the given parameter types
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    let mut tokens = Vec::with_capacity(types.len());

    for (i, kind) in types.iter().enumerate() {
        let word = word_at(data, i * WORD)?;
        let token = match kind {
            ParamType::Address => {
                let mut addr = [0u8; 20];
                addr.copy_from_slice(&word[12..]);
                Token::Address(Address(addr))
            }
            ParamType::Uint => Token::Uint(U256::from_big_endian(word)),
            ParamType::FixedBytes => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(word);
                Token::FixedBytes(Hash::new(bytes))
            }
            ParamType::Bool => Token::Bool(word[31] != 0),
            ParamType::String => {
                let offset = word_as_usize(word)?;
                let len = word_as_usize(word_at(data, offset)?)?;
                let start = offset + WORD;
                let end = start.checked_add(len).ok_or(AbiError::OutOfRange("length"))?;
                let bytes = data.get(start..end).ok_or(AbiError::ShortData {
                    need: end,
                    have: data.len(),
                })?;
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|e| AbiError::InvalidString(e.to_string()))?;
                Token::String(s)
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

/// Split calldata into its selector and argument block
pub fn split_selector(data: &[u8]) -> Result<([u8; 4], &[u8]), AbiError> {
    if data.len() < 4 {
        return Err(AbiError::ShortData {
            need: 4,
            have: data.len(),
        });
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&data[..4]);
    Ok((sel, &data[4..]))
}

/// Decode calldata for a known function signature
pub fn decode_call(signature: &str, types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    let (sel, args) = split_selector(data)?;
    let expected = selector(signature);
    if sel != expected {
        return Err(AbiError::SelectorMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(sel),
        });
    }
    decode(types, args)
}

/// Encode a standard `Error(string)` revert payload
pub fn encode_revert(reason: &str) -> Vec<u8> {
    let mut data = REVERT_SELECTOR.to_vec();
    data.extend(encode(&[Token::String(reason.to_string())]));
    data
}

/// Extract the message from an `Error(string)` revert payload
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (sel, args) = split_selector(data).ok()?;
    if sel != REVERT_SELECTOR {
        return None;
    }
    decode(&[ParamType::String], args)
        .ok()?
        .pop()
        .and_then(Token::into_string)
}

/// A state-changing or read call against a deployed contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub to: Address,
    /// Canonical function signature, kept for logging
    pub function: String,
    pub data: Vec<u8>,
}

impl ContractCall {
    pub fn new(to: Address, signature: &str, args: &[Token]) -> Self {
        Self {
            to,
            function: signature.to_string(),
            data: encode_call(signature, args),
        }
    }

    pub fn selector(&self) -> Option<[u8; 4]> {
        split_selector(&self.data).ok().map(|(sel, _)| sel)
    }
}

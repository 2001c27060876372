//! Ethereum ABI encoding for the pinned lottery/auction contract interface.
//!
//! Only the value shapes that interface uses are supported: `uint256`,
//! `address`, `bytes32`, and dynamic `string`. Layouts are hardcoded —
//! nothing here is runtime-configurable, and any change to the encoding
//! breaks verification against the deployed contracts.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// ABI word size in bytes.
pub const WORD: usize = 32;

/// Compute keccak-256 of the input.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 4-byte function selector: the leading bytes of the keccak-256 digest of
/// the canonical signature string.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

// ── Address ─────────────────────────────────────────────────────

/// A 20-byte EVM account address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address {0:?}: expected 20 hex-encoded bytes")]
pub struct AddressParseError(String);

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| AddressParseError(s.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AddressParseError(s.to_string()))?;
        Ok(Address(bytes))
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Encoding ────────────────────────────────────────────────────

/// A single ABI value. Strings are dynamic and use the standard head/tail
/// offset scheme; everything else occupies one static word.
#[derive(Debug, Clone)]
pub enum Token {
    Uint(BigUint),
    Address(Address),
    FixedBytes([u8; 32]),
    Str(String),
}

/// Left-pad a uint256 into a 32-byte big-endian word. Values wider than
/// 256 bits cannot come out of the pinned interface.
pub fn uint_word(value: &BigUint) -> [u8; 32] {
    let bytes = value.to_bytes_be();
    debug_assert!(bytes.len() <= WORD, "value does not fit a uint256");
    let mut word = [0u8; 32];
    word[WORD - bytes.len()..].copy_from_slice(&bytes);
    word
}

/// Left-pad an address into a 32-byte word.
pub fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// `abi.encode(...)` over the supported token set.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail: Vec<u8> = Vec::new();
    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&uint_word(value)),
            Token::Address(address) => head.extend_from_slice(&address_word(address)),
            Token::FixedBytes(bytes) => head.extend_from_slice(bytes),
            Token::Str(s) => {
                head.extend_from_slice(&uint_word(&BigUint::from(head_len + tail.len())));
                let bytes = s.as_bytes();
                tail.extend_from_slice(&uint_word(&BigUint::from(bytes.len())));
                tail.extend_from_slice(bytes);
                tail.resize(tail.len() + (WORD - bytes.len() % WORD) % WORD, 0);
            }
        }
    }
    head.extend_from_slice(&tail);
    head
}

/// Selector-prefixed calldata for a contract call.
pub fn call_data(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(args));
    data
}

// ── Decoding ────────────────────────────────────────────────────

/// Read the `index`-th 32-byte word of ABI return data.
pub fn word_at(data: &[u8], index: usize) -> Option<[u8; 32]> {
    let start = index.checked_mul(WORD)?;
    let end = start.checked_add(WORD)?;
    if data.len() < end {
        return None;
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[start..end]);
    Some(word)
}

pub fn uint_at(data: &[u8], index: usize) -> Option<BigUint> {
    word_at(data, index).map(|word| BigUint::from_bytes_be(&word))
}

/// Decode a word that must fit in a u64; None when the high bytes are set.
pub fn u64_at(data: &[u8], index: usize) -> Option<u64> {
    let word = word_at(data, index)?;
    if word[..24].iter().any(|&b| b != 0) {
        return None;
    }
    Some(u64::from_be_bytes(word[24..].try_into().ok()?))
}

/// Decode a word holding a left-padded address.
pub fn address_at(data: &[u8], index: usize) -> Option<Address> {
    let word = word_at(data, index)?;
    if word[..12].iter().any(|&b| b != 0) {
        return None;
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&word[12..]);
    Some(Address(out))
}

/// Decode a single dynamic `address[]` return value.
pub fn address_array(data: &[u8]) -> Option<Vec<Address>> {
    let offset = u64_at(data, 0)? as usize;
    if offset % WORD != 0 {
        return None;
    }
    let base = offset / WORD;
    let len = u64_at(data, base)? as usize;
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(address_at(data, base + 1 + i)?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        // Known keccak-256 vector.
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_selector_known_vector() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_address_roundtrip() {
        let parsed: Address = "0x00112233445566778899aabbccddeeff00112233"
            .parse()
            .unwrap();
        assert_eq!(
            parsed.to_string(),
            "0x00112233445566778899aabbccddeeff00112233"
        );
        // Case-insensitive on input.
        let upper: Address = "0x00112233445566778899AABBCCDDEEFF00112233"
            .parse()
            .unwrap();
        assert_eq!(parsed, upper);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("not hex".parse::<Address>().is_err());
    }

    #[test]
    fn test_encode_static_words() {
        let encoded = encode(&[
            Token::Uint(BigUint::from(1u8)),
            Token::Uint(BigUint::from(2u8)),
        ]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 1);
        assert_eq!(encoded[63], 2);
        assert!(encoded[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_string_head_tail() {
        let winner: Address = "0x00112233445566778899aabbccddeeff00112233"
            .parse()
            .unwrap();
        let encoded = encode(&[
            Token::Uint(BigUint::from(5u8)),
            Token::Address(winner),
            Token::Uint(BigUint::from(7u8)),
            Token::Str("ar://x".to_string()),
        ]);
        // 4 head words + length word + one padded data word.
        assert_eq!(encoded.len(), 4 * WORD + WORD + WORD);
        // Offset of the string tail relative to the start of the encoding.
        assert_eq!(u64_at(&encoded, 3), Some(128));
        // Length word, then the bytes themselves, zero padded.
        assert_eq!(u64_at(&encoded, 4), Some(6));
        assert_eq!(&encoded[160..166], b"ar://x");
        assert!(encoded[166..192].iter().all(|&b| b == 0));
        // Address word is left-padded.
        assert_eq!(address_at(&encoded, 1), Some(winner));
    }

    #[test]
    fn test_decode_address_array() {
        let a: Address = "0x1111111111111111111111111111111111111111"
            .parse()
            .unwrap();
        let b: Address = "0x2222222222222222222222222222222222222222"
            .parse()
            .unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(&BigUint::from(32u8))); // offset
        data.extend_from_slice(&uint_word(&BigUint::from(2u8))); // length
        data.extend_from_slice(&address_word(&a));
        data.extend_from_slice(&address_word(&b));
        assert_eq!(address_array(&data), Some(vec![a, b]));
    }

    #[test]
    fn test_u64_at_rejects_overflow() {
        let encoded = encode(&[Token::Uint(BigUint::from(u128::MAX))]);
        assert_eq!(u64_at(&encoded, 0), None);
        assert_eq!(uint_at(&encoded, 0), Some(BigUint::from(u128::MAX)));
    }

    #[test]
    fn test_word_at_out_of_bounds() {
        assert_eq!(word_at(&[0u8; 32], 1), None);
    }
}

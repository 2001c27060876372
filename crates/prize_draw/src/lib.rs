//! # prize_draw
//!
//! Chain-compatible prize draw primitives: deterministic winner selection,
//! ABI leaf encoding, and sorted-pair Merkle commitments with inclusion
//! proofs. Everything here is pure computation; all hashing is keccak-256
//! so digests match what the claim contract re-derives on-chain.

pub mod abi;
pub mod merkle;
pub mod selection;

pub use abi::Address;

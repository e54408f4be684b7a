//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 / RIPEMD-160 hashing and Base58Check encoding
//! - ECDSA key management (secp256k1) and address derivation
//! - Merkle root calculation

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{
    base58check_decode, base58check_encode, double_sha256, hash160, reversed_hex, sha256,
    EncodingError, NULL_HASH,
};
pub use keys::{KeyError, Network, PrivateKey, PublicKey};
pub use merkle::calculate_merkle_root;

//! Cryptographic hashing and checksummed encoding
//!
//! Provides the SHA-256 based hashing functions used for transaction ids,
//! block hashes and merkle roots, plus the Base58Check encoding used for
//! addresses and wallet-import strings.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The all-zero hash, used as the "no previous transaction" and
/// "no previous block" sentinel.
pub const NULL_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Errors from decoding checksummed strings.
///
/// Unlike the boolean validation results elsewhere in the crate, a checksum
/// mismatch means the input itself is corrupt and aborts the caller.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("invalid checksum")]
    InvalidChecksum,
    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),
    #[error("payload too short: {0} bytes")]
    PayloadTooShort(usize),
}

/// Computes SHA-256 of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 (SHA-256 of SHA-256)
///
/// Every identifier in the ledger is derived with the double hash.
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Computes HASH160 (RIPEMD-160 of SHA-256), the 20-byte public-key
/// fingerprint used only for addresses.
pub fn hash160(data: &[u8]) -> Vec<u8> {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(data));
    ripemd.finalize().to_vec()
}

/// Hex-encodes a digest with the byte order reversed.
///
/// Transaction ids and merkle nodes use this display convention; block
/// header hashes deliberately do not.
pub fn reversed_hex(digest: &[u8]) -> String {
    let reversed: Vec<u8> = digest.iter().rev().copied().collect();
    hex::encode(reversed)
}

/// Encodes `version || payload` with a trailing 4-byte double-SHA-256
/// checksum, Base58-encoded.
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut data = vec![version];
    data.extend_from_slice(payload);

    let checksum = double_sha256(&data);
    data.extend_from_slice(&checksum[..4]);

    bs58::encode(data).into_string()
}

/// Decodes a Base58Check string into its version byte and payload.
///
/// Fails with [`EncodingError::InvalidChecksum`] if the embedded checksum
/// does not match recomputation.
pub fn base58check_decode(encoded: &str) -> Result<(u8, Vec<u8>), EncodingError> {
    let decoded = bs58::decode(encoded).into_vec()?;

    if decoded.len() < 5 {
        return Err(EncodingError::PayloadTooShort(decoded.len()));
    }

    let (data, checksum) = decoded.split_at(decoded.len() - 4);
    let expected = double_sha256(data);

    if checksum != &expected[..4] {
        return Err(EncodingError::InvalidChecksum);
    }

    Ok((data[0], data[1..].to_vec()))
}

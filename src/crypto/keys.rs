//! ECDSA key management
//!
//! Private/public key pairs on the secp256k1 curve, DER signatures over
//! caller-supplied digests, and Base58Check address derivation.

use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::{base58check_decode, base58check_encode, hash160, EncodingError};

/// Marker byte appended to a WIF payload when the public key is compressed
const WIF_COMPRESSION_MARKER: u8 = 0x01;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),
}

/// Network selector for address and wallet-import version bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// Version byte prefixed to the public-key hash in addresses
    pub fn address_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    /// Version byte prefixed to the secret scalar in WIF strings
    pub fn wif_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet => 0xef,
        }
    }
}

/// A secp256k1 private key
#[derive(Clone)]
pub struct PrivateKey {
    secret: SecretKey,
}

impl PrivateKey {
    /// Generate a new private key from OS randomness
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, _) = secp.generate_keypair(&mut OsRng);
        Self { secret }
    }

    /// Create a private key from a hex-encoded 32-byte scalar
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret = SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self { secret })
    }

    /// Create a private key from a wallet-import-format string.
    ///
    /// A 33-byte payload carries a trailing compression marker which is
    /// stripped before the scalar is decoded.
    pub fn from_wif(wif: &str) -> Result<Self, KeyError> {
        let (_, mut payload) = base58check_decode(wif)?;

        if payload.len() == 33 && payload[32] == WIF_COMPRESSION_MARKER {
            payload.truncate(32);
        }

        let secret = SecretKey::from_slice(&payload).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self { secret })
    }

    /// Export the secret scalar as hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    /// Export in wallet import format
    pub fn to_wif(&self, compressed: bool, network: Network) -> String {
        let mut payload = self.secret.secret_bytes().to_vec();
        if compressed {
            payload.push(WIF_COMPRESSION_MARKER);
        }
        base58check_encode(network.wif_version(), &payload)
    }

    /// Sign a 32-byte digest, returning a DER-encoded signature.
    ///
    /// The caller hashes the message first; passing anything but a 32-byte
    /// digest is an error.
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        let message = Message::from_digest_slice(digest)?;
        let secp = Secp256k1::new();
        let signature = secp.sign_ecdsa(&message, &self.secret);
        Ok(signature.serialize_der().to_vec())
    }

    /// Derive the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey {
            point: secp256k1::PublicKey::from_secret_key(&secp, &self.secret),
        }
    }
}

/// A secp256k1 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    point: secp256k1::PublicKey,
}

impl PublicKey {
    /// Parse a public key from hex (33-byte compressed or 65-byte
    /// uncompressed encoding)
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
        let point =
            secp256k1::PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { point })
    }

    /// Serialize the curve point (33 bytes compressed, 65 uncompressed)
    pub fn to_bytes(&self, compressed: bool) -> Vec<u8> {
        if compressed {
            self.point.serialize().to_vec()
        } else {
            self.point.serialize_uncompressed().to_vec()
        }
    }

    /// Serialize the curve point as hex
    pub fn to_hex(&self, compressed: bool) -> String {
        hex::encode(self.to_bytes(compressed))
    }

    /// Derive the Base58Check address: version byte + HASH160 of the
    /// serialized key + checksum
    pub fn to_address(&self, compressed: bool, network: Network) -> String {
        let pubkey_hash = hash160(&self.to_bytes(compressed));
        base58check_encode(network.address_version(), &pubkey_hash)
    }

    /// Verify a DER signature over a 32-byte digest.
    ///
    /// Never raises: malformed signatures or mismatched curve data yield
    /// `false`.
    pub fn verify(&self, digest: &[u8], signature: &[u8]) -> bool {
        let Ok(message) = Message::from_digest_slice(digest) else {
            return false;
        };
        let Ok(signature) = Signature::from_der(signature) else {
            return false;
        };

        let secp = Secp256k1::verification_only();
        secp.verify_ecdsa(&message, &signature, &self.point).is_ok()
    }
}

//! Utility functions and helpers
//!
//! Hashing, base58, ECDSA and bincode helpers shared by the chain, the UTXO
//! index and the wallet code.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, constant_time_eq, current_timestamp, ecdsa_p256_public_key,
    ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, new_key_pair,
    ripemd160_digest, sha256_digest,
};

pub use serialization::{deserialize, serialize};

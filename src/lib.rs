//! # UTXO Chain - A Minimal Proof-of-Work Node Core
//!
//! This is the ledger core of my proof-of-work cryptocurrency. When I come back
//! to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **Hash-linked chain**: blocks persisted in sled, a single tip pointer moved
//!   by compare-and-swap so a stale miner can never fork the chain
//! - **Proof-of-work**: SHA-256 below a 2^(256-d) target, searched in parallel
//!   with rayon, with an extra nonce once the primary range runs out
//! - **UTXO model**: single-signature ECDSA P-256 spends, greedy coin selection
//! - **UTXO index**: derived cache in its own tree, updated per block in the
//!   same transaction as the append, rebuildable from scratch at any time
//! - **Wallets**: base58check addresses over RIPEMD160(SHA256(pubkey))
//!
//! ## How I Organized My Code
//! - `core/`: blocks, transactions, Merkle tree, proof-of-work, the chain
//! - `storage/`: UTXO index and the pending transaction pool
//! - `wallet/`: key management and address handling
//! - `node/`: the node context a networking layer drives
//! - `config/`: settings from defaults, TOML and environment
//! - `utils/`: hashing, signing and serialization helpers
//! - `cli/`: command-line interface
//!
//! ## Key Design Decisions I Made
//! - No process-wide state: everything hangs off an explicit `Node`/`Config`
//! - Every fallible boundary returns `BlockchainError`, nothing panics on bad input
//! - Block append and index update commit in one multi-tree sled transaction
//! - Index entries remember each output's original position in its transaction

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod node;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    Block, Blockchain, BlockchainIterator, MerkleProof, MerkleTree, MiningParams, OutputLookup,
    ProofOfWork, TXInput, TXOutput, Transaction, SUBSIDY,
};
pub use error::{BlockchainError, ErrorKind, Result};
pub use node::Node;
pub use storage::{MemoryPool, UTXOSet, UnspentOutput};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};

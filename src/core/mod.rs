//! Core blockchain functionality
//!
//! This module contains the fundamental blockchain components including
//! blocks, transactions, the hash-linked chain, Merkle commitments and
//! proof-of-work consensus.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator, GENESIS_COINBASE_DATA};
pub use merkle::{MerkleProof, MerkleTree, ProofElement};
pub use proof_of_work::{
    MiningParams, PowSolution, ProofOfWork, DEFAULT_EXTRA_NONCE_LIMIT, DEFAULT_NONCE_LIMIT,
    MAX_DIFFICULTY,
};
pub use transaction::{OutputLookup, TXInput, TXOutput, Transaction, COINBASE_VOUT, SUBSIDY};

//! Data storage and persistence
//!
//! This module manages the UTXO index derived from the chain and the memory
//! pool of pending transactions.

pub mod memory_pool;
pub mod utxo_set;

pub use memory_pool::MemoryPool;
pub use utxo_set::{ChainstateView, UTXOSet, UnspentOutput, UtxoSnapshot, UTXO_TREE};

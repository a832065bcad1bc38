//! Node context
//!
//! `Node` owns the configuration, chain, UTXO index and memory pool of one
//! running node and exposes the calls a networking layer drives: tip and
//! height queries, block lookup, block acceptance, index updates, transaction
//! submission and mining.

pub mod context;

pub use context::Node;

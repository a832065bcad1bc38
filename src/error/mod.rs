//! Error handling for the blockchain
//!
//! Every fallible boundary in the node (store I/O, signature checks, address
//! decoding, mining) returns a `BlockchainError`. `kind()` groups the variants
//! into the categories callers act on: validation and consistency failures are
//! rejected without touching persisted state, persistence failures abort the
//! operation and bubble up to the top-level caller.

use std::fmt;

/// Result type alias for blockchain operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Coarse error category used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller: address, signature, funds, malformed data
    Validation,
    /// Proposed change conflicts with the current chain or index state
    Consistency,
    /// The nonce search ran out of candidates
    MiningExhausted,
    /// Mining was stopped from the outside
    Cancelled,
    /// The underlying store, filesystem or system crypto facility failed
    Persistence,
}

/// Comprehensive error types for blockchain operations
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// Database-related errors
    Database(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Malformed transaction or value mismatch
    Transaction(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Signature or public key does not match the spent output
    InvalidSignature(String),
    /// Insufficient funds for transaction
    InsufficientFunds { required: u64, available: u64 },
    /// Block validation errors
    InvalidBlock(String),
    /// Block does not extend the current tip, or the chain already exists
    Consistency(String),
    /// An input references an output that is not in the UTXO index
    UnknownOutput { txid: String, vout: usize },
    /// Every nonce and extra nonce was tried without meeting the target
    MiningExhausted { height: usize, attempts: u64 },
    /// Mining was cancelled before a nonce was found
    MiningCancelled,
}

impl BlockchainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlockchainError::Database(_)
            | BlockchainError::Serialization(_)
            | BlockchainError::Io(_)
            | BlockchainError::Crypto(_) => ErrorKind::Persistence,
            BlockchainError::Consistency(_) | BlockchainError::UnknownOutput { .. } => {
                ErrorKind::Consistency
            }
            BlockchainError::MiningExhausted { .. } => ErrorKind::MiningExhausted,
            BlockchainError::MiningCancelled => ErrorKind::Cancelled,
            BlockchainError::Transaction(_)
            | BlockchainError::Wallet(_)
            | BlockchainError::Config(_)
            | BlockchainError::InvalidAddress(_)
            | BlockchainError::InvalidSignature(_)
            | BlockchainError::InsufficientFunds { .. }
            | BlockchainError::InvalidBlock(_) => ErrorKind::Validation,
        }
    }

    /// Recoverable errors leave the ledger untouched; the caller may retry or reject.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Persistence
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InvalidSignature(msg) => write!(f, "Invalid signature: {msg}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::Consistency(msg) => write!(f, "Consistency error: {msg}"),
            BlockchainError::UnknownOutput { txid, vout } => {
                write!(f, "Unknown or spent output: {txid}:{vout}")
            }
            BlockchainError::MiningExhausted { height, attempts } => write!(
                f,
                "Nonce space exhausted at height {height} after {attempts} attempts"
            ),
            BlockchainError::MiningCancelled => write!(f, "Mining cancelled"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<BlockchainError>> for BlockchainError {
    fn from(err: sled::transaction::TransactionError<BlockchainError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => {
                BlockchainError::Database(e.to_string())
            }
        }
    }
}

/// Lifts a crate error into a sled transaction abort
pub(crate) fn abort<T>(
    result: Result<T>,
) -> sled::transaction::ConflictableTransactionResult<T, BlockchainError> {
    result.map_err(sled::transaction::ConflictableTransactionError::Abort)
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}

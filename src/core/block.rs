use crate::core::proof_of_work::{MiningParams, ProofOfWork};
use crate::core::{MerkleProof, MerkleTree, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    timestamp: i64,
    pre_block_hash: Vec<u8>, // Empty for genesis
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
    nonce: u64,
    extra_nonce: u64, // Only non-zero once the primary nonce range ran dry
    height: usize,
    difficulty: u32,
    merkle_root: Vec<u8>, // Merkle root of all transactions
}

impl Block {
    pub fn new_block(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: usize,
        params: &MiningParams,
    ) -> Result<Block> {
        let never = AtomicBool::new(false);
        Self::new_block_with_cancel(pre_block_hash, transactions, height, params, &never)
    }

    /// Assemble the header and run proof-of-work over it. Setting `cancel`
    /// from another thread aborts the search with `MiningCancelled`.
    pub fn new_block_with_cancel(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: usize,
        params: &MiningParams,
        cancel: &AtomicBool,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let merkle_root = MerkleTree::new(transactions)?.root_hash().to_vec();
        let mut block = Block {
            timestamp: current_timestamp()?,
            pre_block_hash,
            hash: vec![],
            transactions: transactions.to_vec(),
            nonce: 0,
            extra_nonce: 0,
            height,
            difficulty: params.difficulty,
            merkle_root,
        };

        let pow = ProofOfWork::new_proof_of_work(&block)?;
        let solution = pow.run_with_cancel(params, cancel)?;
        block.nonce = solution.nonce;
        block.extra_nonce = solution.extra_nonce;
        block.hash = solution.hash;
        info!(
            "Proof-of-work completed for block {} at height {height}",
            HEXLOWER.encode(&block.hash)
        );

        Ok(block)
    }

    pub fn generate_genesis_block(transaction: &Transaction, params: &MiningParams) -> Result<Block> {
        Block::new_block(vec![], std::slice::from_ref(transaction), 0, params)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_merkle_root(&self) -> &[u8] {
        &self.merkle_root
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_extra_nonce(&self) -> u64 {
        self.extra_nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    pub fn validate_structure(&self) -> Result<()> {
        check_layout(&self.transactions)
    }

    /// Verify that the block's Merkle root matches its transactions
    pub fn verify_merkle_root(&self) -> Result<bool> {
        let tree = MerkleTree::new(&self.transactions)?;
        Ok(tree.root_hash() == self.merkle_root.as_slice())
    }

    pub fn merkle_proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        MerkleTree::new(&self.transactions)?.proof(transaction_index)
    }

    /// Verify a Merkle proof against this block's Merkle root
    pub fn verify_merkle_proof(&self, proof: &MerkleProof) -> bool {
        proof.verify(&self.merkle_root)
    }
}

/// Shape rules every block must satisfy: at least one transaction, the first
/// one a coinbase, and no coinbase anywhere else.
pub(crate) fn check_layout(transactions: &[Transaction]) -> Result<()> {
    let Some(first) = transactions.first() else {
        return Err(BlockchainError::InvalidBlock(
            "Block must contain at least one transaction".to_string(),
        ));
    };
    if !first.is_coinbase() {
        return Err(BlockchainError::InvalidBlock(
            "First transaction of a block must be the coinbase".to_string(),
        ));
    }
    if transactions[1..].iter().any(Transaction::is_coinbase) {
        return Err(BlockchainError::InvalidBlock(
            "Block carries more than one coinbase".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
impl Block {
    pub(crate) fn with_nonce_for_test(&self, nonce: u64) -> Block {
        Block {
            nonce,
            ..self.clone()
        }
    }

    pub(crate) fn with_height_for_test(&self, height: usize) -> Block {
        Block {
            height,
            ..self.clone()
        }
    }

    pub(crate) fn with_transactions_for_test(&self, transactions: Vec<Transaction>) -> Block {
        Block {
            transactions,
            ..self.clone()
        }
    }
}

use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use serde::{Deserialize, Serialize};

/// Merkle tree over a block's transactions
///
/// Leaves are SHA-256 hashes of each transaction's serialized bytes, in block
/// order. Every level with an odd number of nodes pairs its last node with
/// itself, and each parent is SHA-256(left || right). A single transaction is
/// therefore hashed against itself once before becoming the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    /// levels[0] are the leaves, the last level holds only the root
    levels: Vec<Vec<Vec<u8>>>,
}

/// Inclusion proof for one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf hash being proven
    pub leaf_hash: Vec<u8>,
    /// Index of the transaction in the block
    pub transaction_index: usize,
    /// Sibling hashes from the leaf level upwards
    pub path: Vec<ProofElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofElement {
    /// Sibling hash
    pub hash: Vec<u8>,
    /// Direction: true if sibling is on the right, false if on the left
    pub is_right: bool,
}

impl MerkleTree {
    /// Create a new Merkle tree from a list of transactions
    pub fn new(transactions: &[Transaction]) -> Result<Self> {
        let leaves = transactions
            .iter()
            .map(|tx| tx.serialize().map(|bytes| sha256_digest(&bytes)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_leaves(leaves)
    }

    /// Create a Merkle tree from already hashed leaves
    pub fn from_leaves(leaves: Vec<Vec<u8>>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Cannot create Merkle tree from empty transaction list".to_string(),
            ));
        }

        let mut levels = vec![leaves];
        loop {
            let current = &levels[levels.len() - 1];
            // A lone leaf still gets paired with itself; above that, one node is the root
            if current.len() == 1 && levels.len() > 1 {
                break;
            }
            let next: Vec<Vec<u8>> = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }

        Ok(MerkleTree { levels })
    }

    pub fn root_hash(&self) -> &[u8] {
        // from_leaves guarantees at least two levels, the last holding one node
        &self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Build an inclusion proof for the transaction at `transaction_index`
    pub fn proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        if transaction_index >= self.leaf_count() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Transaction index {} out of bounds (leaves: {})",
                transaction_index,
                self.leaf_count()
            )));
        }

        let mut path = Vec::with_capacity(self.levels.len() - 1);
        let mut index = transaction_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling, is_right) = if index % 2 == 0 {
                // odd tail pairs with itself
                let sibling = level.get(index + 1).unwrap_or(&level[index]);
                (sibling, true)
            } else {
                (&level[index - 1], false)
            };
            path.push(ProofElement {
                hash: sibling.clone(),
                is_right,
            });
            index /= 2;
        }

        Ok(MerkleProof {
            leaf_hash: self.levels[0][transaction_index].clone(),
            transaction_index,
            path,
        })
    }
}

impl MerkleProof {
    /// Recompute the root from the proof path and compare it with `root`
    pub fn verify(&self, root: &[u8]) -> bool {
        let computed = self.path.iter().fold(self.leaf_hash.clone(), |acc, element| {
            if element.is_right {
                hash_pair(&acc, &element.hash)
            } else {
                hash_pair(&element.hash, &acc)
            }
        });
        computed == root
    }
}

fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    sha256_digest(&combined)
}

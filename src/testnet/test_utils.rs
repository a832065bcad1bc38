//! Test utilities for blockchain testing

use crate::config::Config;
use crate::core::{Block, Blockchain, MiningParams, ProofOfWork};
use crate::error::Result;
use crate::storage::UTXOSet;
use crate::wallet::Wallet;
use std::path::Path;
use tempfile::TempDir;

/// Difficulty low enough that a block is found in a handful of hashes
pub const TEST_DIFFICULTY: u32 = 4;

pub fn test_params() -> MiningParams {
    MiningParams {
        workers: 2,
        ..MiningParams::with_difficulty(TEST_DIFFICULTY)
    }
}

pub fn test_config(data_dir: &Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        difficulty: TEST_DIFFICULTY,
        mining_workers: 2,
        ..Config::default()
    }
}

/// Throwaway chain in a temp dir whose genesis reward went to `miner`
pub struct TestChain {
    pub blockchain: Blockchain,
    pub miner: Wallet,
    _dir: TempDir,
}

impl TestChain {
    pub fn new() -> TestChain {
        let dir = tempfile::tempdir().unwrap();
        let miner = Wallet::new().unwrap();
        let blockchain =
            Blockchain::create_blockchain(&miner.get_address(), dir.path(), test_params())
                .unwrap();
        TestChain {
            blockchain,
            miner,
            _dir: dir,
        }
    }

    pub fn utxo_set(&self) -> UTXOSet {
        UTXOSet::new(self.blockchain.clone())
    }

    /// Coinbase-only block paying the miner
    pub fn mine_empty_block(&self) -> Block {
        self.blockchain
            .mine_block_with_reward(&[], &self.miner.get_address())
            .unwrap()
    }
}

/// Validate blockchain integrity the long way: links, heights and proof-of-work
pub fn validate_blockchain_integrity(blockchain: &Blockchain) -> Result<bool> {
    let blocks: Vec<Block> = blockchain.iterator().collect::<Result<_>>()?;
    for pair in blocks.windows(2) {
        let (child, parent) = (&pair[0], &pair[1]);
        if child.get_pre_block_hash() != parent.get_hash()
            || child.get_height() != parent.get_height() + 1
        {
            return Ok(false);
        }
    }
    for block in &blocks {
        if !ProofOfWork::validate(block) || !block.verify_merkle_root()? {
            return Ok(false);
        }
    }
    Ok(blocks.last().is_some_and(Block::is_genesis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_chain_is_intact() {
        let chain = TestChain::new();
        chain.mine_empty_block();
        assert!(validate_blockchain_integrity(&chain.blockchain).unwrap());
    }
}

// The node context ties everything a running node needs into one value:
// settings, the chain, its UTXO index and the pending pool. A networking layer
// gets a handle to this instead of reaching for globals.

use crate::config::Config;
use crate::core::{Block, Blockchain, BlockchainIterator, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::{MemoryPool, UTXOSet};
use crate::wallet::{address_to_pub_key_hash, validate_address};
use log::{info, warn};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub struct Node {
    config: Arc<Config>,
    blockchain: Blockchain,
    utxo_set: Arc<UTXOSet>,
    mempool: Arc<MemoryPool>,
}

impl Node {
    /// Create a fresh chain at `config.db_path()` paying the genesis reward to
    /// `genesis_address`
    pub fn create(config: Config, genesis_address: &str) -> Result<Node> {
        config.validate()?;
        if !validate_address(genesis_address) {
            return Err(BlockchainError::InvalidAddress(genesis_address.to_string()));
        }
        let blockchain = Blockchain::create_blockchain(
            genesis_address,
            config.db_path(),
            config.mining_params(),
        )?;
        Ok(Self::from_parts(config, blockchain))
    }

    pub fn open(config: Config) -> Result<Node> {
        config.validate()?;
        let blockchain = Blockchain::open_blockchain(config.db_path(), config.mining_params())?;
        Ok(Self::from_parts(config, blockchain))
    }

    fn from_parts(config: Config, blockchain: Blockchain) -> Node {
        Node {
            config: Arc::new(config),
            utxo_set: Arc::new(UTXOSet::new(blockchain.clone())),
            blockchain,
            mempool: Arc::new(MemoryPool::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn utxo_set(&self) -> &UTXOSet {
        &self.utxo_set
    }

    pub fn mempool(&self) -> &MemoryPool {
        &self.mempool
    }

    pub fn tip_hash(&self) -> Vec<u8> {
        self.blockchain.get_tip_hash()
    }

    pub fn best_height(&self) -> Result<usize> {
        self.blockchain.get_best_height()
    }

    pub fn block_by_hash(&self, hash: &[u8]) -> Result<Option<Block>> {
        self.blockchain.get_block(hash)
    }

    pub fn block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        self.blockchain.get_block_hashes()
    }

    pub fn iterator(&self) -> BlockchainIterator {
        self.blockchain.iterator()
    }

    /// Accept a block from a peer: append it together with its index changes
    /// and drop whatever it made obsolete from the pool
    pub fn add_block(&self, block: &Block) -> Result<()> {
        self.blockchain.commit_block(block)?;
        let evicted = self.mempool.remove_block_transactions(block);
        if evicted > 0 {
            info!("Evicted {evicted} pending transactions after block {}", block.get_hash_hex());
        }
        Ok(())
    }

    /// Apply a block that was appended with `Blockchain::add_block` to the index
    pub fn update_index(&self, block: &Block) -> Result<()> {
        self.utxo_set.update(block)
    }

    pub fn reindex(&self) -> Result<()> {
        self.utxo_set.reindex()
    }

    /// Verify `tx` against the index and queue it for the next block.
    /// Transactions spending an output another pending one already claims
    /// are turned away.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        if tx.is_coinbase() {
            return Err(BlockchainError::Transaction(
                "Coinbase transactions cannot be submitted".to_string(),
            ));
        }
        tx.verify(self.utxo_set.as_ref())?;
        if self.mempool.spends_conflict(&tx) {
            return Err(BlockchainError::Transaction(format!(
                "Transaction {} conflicts with a pending spend",
                tx.get_id_hex()
            )));
        }
        let txid = tx.get_id_hex();
        if self.mempool.add(tx) {
            info!("Accepted transaction {txid} into the memory pool");
        }
        Ok(())
    }

    /// Mine a block over a snapshot of the pool, paying the reward to
    /// `miner_address` or the configured mining address.
    ///
    /// Pending transactions that no longer verify are dropped from the block
    /// (and the pool) rather than failing the whole attempt.
    pub fn mine_pending(&self, miner_address: Option<&str>, cancel: &AtomicBool) -> Result<Block> {
        let miner_address = miner_address
            .map(str::to_string)
            .or_else(|| self.config.mining_address.clone())
            .ok_or_else(|| BlockchainError::Config("No mining address configured".to_string()))?;
        if !validate_address(&miner_address) {
            return Err(BlockchainError::InvalidAddress(miner_address));
        }

        let mut block_transactions = vec![Transaction::new_coinbase_tx(&miner_address, "")?];
        for tx in self.mempool.snapshot() {
            match tx.verify(self.utxo_set.as_ref()) {
                Ok(()) => block_transactions.push(tx),
                Err(e) => {
                    warn!("Dropping pending transaction {}: {e}", tx.get_id_hex());
                    self.mempool.remove(&tx.get_id_hex());
                }
            }
        }

        let block = self
            .blockchain
            .mine_block_with_cancel(&block_transactions, cancel)?;
        self.mempool.remove_block_transactions(&block);
        Ok(block)
    }

    pub fn balance(&self, address: &str) -> Result<u64> {
        let pub_key_hash = address_to_pub_key_hash(address)?;
        self.utxo_set.get_balance(&pub_key_hash)
    }
}

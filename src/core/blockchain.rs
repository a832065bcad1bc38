// This is the core blockchain implementation - the heart of my cryptocurrency
// I'm using Sled as an embedded database to store blocks and maintain the chain
// Blocks live in one tree, the UTXO index in another, and every append that
// touches both goes through a single multi-tree transaction

use crate::core::block::check_layout;
use crate::core::proof_of_work::{MiningParams, ProofOfWork};
use crate::core::{Block, Transaction};
use crate::error::{abort, BlockchainError, Result};
use crate::storage::utxo_set::{apply_block, ChainstateView, UTXO_TREE};
use data_encoding::HEXLOWER;
use log::{info, warn};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Magic key for the tip pointer. One byte long, so it can never collide with a
// 32-byte block hash stored in the same tree.
const TIP_BLOCK_HASH_KEY: &[u8] = b"l";
const BLOCKS_TREE: &str = "blocks";

pub const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

// Cheap to clone: every clone shares the same database handle and locks
#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>, // Cached copy of the tip pointer on disk
    // Readers of chain-derived state take this for read, appends and reindex
    // take it for write
    state_lock: Arc<RwLock<()>>,
    db: Db,
    blocks: Tree,
    chainstate: Tree,
    db_path: PathBuf,
    mining: MiningParams,
}

impl Blockchain {
    /// Create a brand new chain whose genesis coinbase pays `genesis_address`.
    /// Fails with a consistency error if a chain already exists at `db_path`.
    pub fn create_blockchain(
        genesis_address: &str,
        db_path: impl AsRef<Path>,
        mining: MiningParams,
    ) -> Result<Blockchain> {
        mining.validate()?;
        let (db, blocks, chainstate) = Self::open_trees(db_path.as_ref())?;
        if blocks.get(TIP_BLOCK_HASH_KEY)?.is_some() {
            return Err(BlockchainError::Consistency(format!(
                "Blockchain already exists at {}",
                db_path.as_ref().display()
            )));
        }

        info!("Creating genesis block for address: {genesis_address}");
        let coinbase_tx = Transaction::new_coinbase_tx(genesis_address, GENESIS_COINBASE_DATA)?;
        let genesis = Block::generate_genesis_block(&coinbase_tx, &mining)?;
        let genesis_data = genesis.serialize()?;

        // Genesis and its index entry land together
        (&blocks, &chainstate).transaction(
            |(tx_blocks, tx_chainstate)| -> ConflictableTransactionResult<(), BlockchainError> {
                if tx_blocks.get(TIP_BLOCK_HASH_KEY)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        BlockchainError::Consistency("Blockchain already exists".to_string()),
                    ));
                }
                tx_blocks.insert(genesis.get_hash(), genesis_data.as_slice())?;
                tx_blocks.insert(TIP_BLOCK_HASH_KEY, genesis.get_hash())?;
                apply_block(tx_chainstate, &genesis)
            },
        )?;
        db.flush()?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(genesis.get_hash().to_vec())),
            state_lock: Arc::new(RwLock::new(())),
            db,
            blocks,
            chainstate,
            db_path: db_path.as_ref().to_path_buf(),
            mining,
        })
    }

    /// Open an existing chain
    pub fn open_blockchain(db_path: impl AsRef<Path>, mining: MiningParams) -> Result<Blockchain> {
        mining.validate()?;
        let (db, blocks, chainstate) = Self::open_trees(db_path.as_ref())?;
        let tip_hash = blocks
            .get(TIP_BLOCK_HASH_KEY)?
            .ok_or_else(|| {
                BlockchainError::Consistency(
                    "No existing blockchain found. Create one first.".to_string(),
                )
            })?
            .to_vec();

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            state_lock: Arc::new(RwLock::new(())),
            db,
            blocks,
            chainstate,
            db_path: db_path.as_ref().to_path_buf(),
            mining,
        })
    }

    fn open_trees(path: &Path) -> Result<(Db, Tree, Tree)> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        let chainstate = db
            .open_tree(UTXO_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open UTXO tree: {e}")))?;
        Ok((db, blocks, chainstate))
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn mining_params(&self) -> &MiningParams {
        &self.mining
    }

    pub(crate) fn chainstate_tree(&self) -> &Tree {
        &self.chainstate
    }

    pub(crate) fn read_state(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.state_lock
            .read()
            .map_err(|_| BlockchainError::Database("Chain state lock poisoned".to_string()))
    }

    pub(crate) fn write_state(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.state_lock
            .write()
            .map_err(|_| BlockchainError::Database("Chain state lock poisoned".to_string()))
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self.tip_hash.write().unwrap_or_else(PoisonError::into_inner);
        *tip_hash = new_tip_hash.to_vec();
    }

    pub fn get_best_height(&self) -> Result<usize> {
        let tip = self.get_tip_hash();
        self.get_block(&tip)?
            .map(|block| block.get_height())
            .ok_or_else(|| BlockchainError::Database("Tip block not found".to_string()))
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        match self.blocks.get(block_hash)? {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Hashes from tip back to genesis
    pub fn get_block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        self.iterator()
            .map(|block| block.map(|b| b.get_hash().to_vec()))
            .collect()
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.blocks.clone())
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        for block in self.iterator() {
            if let Some(tx) = block?
                .get_transactions()
                .iter()
                .find(|tx| tx.get_id() == txid)
            {
                return Ok(Some(tx.clone()));
            }
        }
        Ok(None)
    }

    // When I want to mine a block from transactions that already include the coinbase
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        let never = AtomicBool::new(false);
        self.mine_block_with_cancel(transactions, &never)
    }

    // When I want the block to pay a fresh coinbase to a miner
    pub fn mine_block_with_reward(
        &self,
        transactions: &[Transaction],
        miner_address: &str,
    ) -> Result<Block> {
        let coinbase_tx = Transaction::new_coinbase_tx(miner_address, "")?;
        let mut block_transactions = Vec::with_capacity(transactions.len() + 1);
        block_transactions.push(coinbase_tx);
        block_transactions.extend_from_slice(transactions);
        self.mine_block(&block_transactions)
    }

    /// Validate `transactions` against the current index, mine on top of the
    /// current tip and commit.
    ///
    /// The nonce search runs without holding any lock. If another block lands
    /// while it runs, the commit is rejected with a consistency error instead
    /// of forking the chain.
    pub fn mine_block_with_cancel(
        &self,
        transactions: &[Transaction],
        cancel: &AtomicBool,
    ) -> Result<Block> {
        let (tip, next_height) = {
            let _guard = self.read_state()?;
            check_layout(transactions)?;
            self.verify_transactions(transactions)?;
            (self.get_tip_hash(), self.get_best_height()? + 1)
        };

        info!(
            "Mining block at height {} with {} transactions",
            next_height,
            transactions.len()
        );
        let block =
            Block::new_block_with_cancel(tip, transactions, next_height, &self.mining, cancel)?;
        self.commit_block(&block)?;
        info!("Successfully mined block: {}", block.get_hash_hex());
        Ok(block)
    }

    // Everything about a block that can be checked without looking at the chain
    fn check_block(&self, block: &Block) -> Result<()> {
        block.validate_structure()?;
        if block.get_difficulty() < self.mining.difficulty {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block difficulty {} is below the required {}",
                block.get_difficulty(),
                self.mining.difficulty
            )));
        }
        if !ProofOfWork::validate(block) {
            return Err(BlockchainError::InvalidBlock(format!(
                "Proof-of-work check failed for block {}",
                block.get_hash_hex()
            )));
        }
        if !block.verify_merkle_root()? {
            return Err(BlockchainError::InvalidBlock(format!(
                "Merkle root mismatch in block {}",
                block.get_hash_hex()
            )));
        }
        Ok(())
    }

    // Every non-coinbase transaction must verify against the index as it stands
    // now, and no two of them may spend the same output
    pub(crate) fn verify_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<(&[u8], usize)> = HashSet::new();
        let view = ChainstateView(&self.chainstate);

        for transaction in transactions.iter().filter(|tx| !tx.is_coinbase()) {
            for input in transaction.get_vin() {
                if !spent_outputs.insert((input.get_txid(), input.get_vout())) {
                    return Err(BlockchainError::Transaction(format!(
                        "Double-spending detected in transaction {}: output {}:{} already spent in this block",
                        transaction.get_id_hex(),
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
            transaction.verify(&view)?;
        }
        Ok(())
    }

    /// Append a block received from elsewhere without touching the UTXO index.
    ///
    /// The block must carry valid proof-of-work and Merkle root, sit exactly one
    /// above the tip, name the current tip as its parent, and every spend in it
    /// must verify against the index. Nothing is written when any check fails.
    /// The caller is expected to follow up with `UTXOSet::update`;
    /// `commit_block` does both in one step.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        self.check_block(block)?;
        let block_data = block.serialize()?;

        let _guard = self.write_state()?;
        self.verify_transactions(block.get_transactions())?;
        self.blocks
            .transaction(|tx_blocks| extend_tip(tx_blocks, block, &block_data))?;
        self.set_tip_hash(block.get_hash());
        info!(
            "Added block {} at height {}",
            block.get_hash_hex(),
            block.get_height()
        );
        Ok(())
    }

    /// Append a block and apply it to the UTXO index atomically. A reader never
    /// sees the new tip without the index changes that go with it.
    pub fn commit_block(&self, block: &Block) -> Result<()> {
        self.check_block(block)?;
        let block_data = block.serialize()?;

        let _guard = self.write_state()?;
        self.verify_transactions(block.get_transactions())?;
        (&self.blocks, &self.chainstate).transaction(
            |(tx_blocks, tx_chainstate)| -> ConflictableTransactionResult<(), BlockchainError> {
                extend_tip(tx_blocks, block, &block_data)?;
                apply_block(tx_chainstate, block)
            },
        )?;
        self.set_tip_hash(block.get_hash());
        info!(
            "Committed block {} at height {}",
            block.get_hash_hex(),
            block.get_height()
        );
        Ok(())
    }

    /// Walk the whole chain checking proof-of-work, Merkle roots, layout, hash
    /// links and heights. Returns the number of blocks checked.
    pub fn validate_chain(&self) -> Result<usize> {
        let mut count = 0;
        let mut child: Option<Block> = None;
        for block in self.iterator() {
            let block = block?;
            if !ProofOfWork::validate(&block) {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Proof-of-work check failed for block {}",
                    block.get_hash_hex()
                )));
            }
            if !block.verify_merkle_root()? {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Merkle root mismatch in block {}",
                    block.get_hash_hex()
                )));
            }
            block.validate_structure()?;
            if let Some(child) = &child {
                if child.get_pre_block_hash() != block.get_hash()
                    || child.get_height() != block.get_height() + 1
                {
                    return Err(BlockchainError::Consistency(format!(
                        "Block {} does not link to its parent {}",
                        child.get_hash_hex(),
                        block.get_hash_hex()
                    )));
                }
            }
            child = Some(block);
            count += 1;
        }

        match child {
            Some(genesis) if genesis.get_height() == 0 => Ok(count),
            Some(genesis) => {
                warn!("Chain ends at height {}", genesis.get_height());
                Err(BlockchainError::Consistency(format!(
                    "Chain bottoms out at height {} instead of genesis",
                    genesis.get_height()
                )))
            }
            None => Err(BlockchainError::Consistency("Chain is empty".to_string())),
        }
    }
}

// Compare-and-swap on the tip: only a block built on the current tip, one
// height above it, may move the pointer
fn extend_tip(
    blocks: &TransactionalTree,
    block: &Block,
    block_data: &[u8],
) -> ConflictableTransactionResult<(), BlockchainError> {
    let tip = blocks.get(TIP_BLOCK_HASH_KEY)?.ok_or_else(|| {
        ConflictableTransactionError::Abort(BlockchainError::Consistency(
            "No tip to extend".to_string(),
        ))
    })?;
    if tip.as_ref() != block.get_pre_block_hash() {
        return Err(ConflictableTransactionError::Abort(
            BlockchainError::Consistency(format!(
                "Block {} builds on {} but the tip is {}",
                block.get_hash_hex(),
                HEXLOWER.encode(block.get_pre_block_hash()),
                HEXLOWER.encode(tip.as_ref())
            )),
        ));
    }

    let tip_bytes = blocks.get(&tip)?.ok_or_else(|| {
        ConflictableTransactionError::Abort(BlockchainError::Database(
            "Tip block not found".to_string(),
        ))
    })?;
    let tip_block = abort(Block::deserialize(tip_bytes.as_ref()))?;
    if block.get_height() != tip_block.get_height() + 1 {
        return Err(ConflictableTransactionError::Abort(
            BlockchainError::InvalidBlock(format!(
                "Block height {} does not follow tip height {}",
                block.get_height(),
                tip_block.get_height()
            )),
        ));
    }

    blocks.insert(block.get_hash(), block_data)?;
    blocks.insert(TIP_BLOCK_HASH_KEY, block.get_hash())?;
    Ok(())
}

/// Walks from a starting hash back to genesis. Each item is a fresh read from
/// the blocks tree; a missing or corrupt block ends the walk with an error.
pub struct BlockchainIterator {
    blocks: Tree,
    current_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, blocks: Tree) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            blocks,
        }
    }

    fn load_current(&self) -> Result<Block> {
        let data = self.blocks.get(&self.current_hash)?.ok_or_else(|| {
            BlockchainError::Database(format!(
                "Block {} not found",
                HEXLOWER.encode(&self.current_hash)
            ))
        })?;
        Block::deserialize(data.as_ref())
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }
        match self.load_current() {
            Ok(block) => {
                self.current_hash = block.get_pre_block_hash().to_vec();
                Some(Ok(block))
            }
            Err(e) => {
                self.current_hash.clear();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SUBSIDY;
    use crate::storage::UTXOSet;
    use crate::testnet::test_utils::{test_params, TestChain};
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reopen() {
        let dir = tempdir().unwrap();
        let miner = Wallet::new().unwrap();
        let tip = {
            let chain =
                Blockchain::create_blockchain(&miner.get_address(), dir.path(), test_params())
                    .unwrap();
            assert_eq!(chain.get_best_height().unwrap(), 0);
            chain.get_tip_hash()
        };

        let chain = Blockchain::open_blockchain(dir.path(), test_params()).unwrap();
        assert_eq!(chain.get_tip_hash(), tip);
        let genesis = chain.get_block(&tip).unwrap().unwrap();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.get_transactions().len(), 1);
        assert!(genesis.get_transactions()[0].is_coinbase());
    }

    #[test]
    fn test_create_twice_is_consistency_error() {
        let dir = tempdir().unwrap();
        let address = Wallet::new().unwrap().get_address();
        drop(Blockchain::create_blockchain(&address, dir.path(), test_params()).unwrap());
        let again = Blockchain::create_blockchain(&address, dir.path(), test_params());
        assert!(matches!(again, Err(BlockchainError::Consistency(_))));
    }

    #[test]
    fn test_open_missing_chain() {
        let dir = tempdir().unwrap();
        let result = Blockchain::open_blockchain(dir.path(), test_params());
        assert!(matches!(result, Err(BlockchainError::Consistency(_))));
    }

    #[test]
    fn test_iterator_walks_tip_to_genesis() {
        let chain = TestChain::new();
        chain.mine_empty_block();
        chain.mine_empty_block();

        let heights: Vec<usize> = chain
            .blockchain
            .iterator()
            .map(|b| b.unwrap().get_height())
            .collect();
        assert_eq!(heights, vec![2, 1, 0]);
        assert_eq!(chain.blockchain.get_block_hashes().unwrap().len(), 3);
        assert_eq!(chain.blockchain.validate_chain().unwrap(), 3);
    }

    #[test]
    fn test_stale_block_rejected() {
        let chain = TestChain::new();
        let genesis_hash = chain.blockchain.get_tip_hash();

        // two miners race on the same tip; the second one loses
        let coinbase = |data: &str| {
            Transaction::new_coinbase_tx(&chain.miner.get_address(), data).unwrap()
        };
        let params = *chain.blockchain.mining_params();
        let first = Block::new_block(genesis_hash.clone(), &[coinbase("a")], 1, &params).unwrap();
        let second = Block::new_block(genesis_hash, &[coinbase("b")], 1, &params).unwrap();

        chain.blockchain.commit_block(&first).unwrap();
        let result = chain.blockchain.commit_block(&second);
        assert!(matches!(result, Err(BlockchainError::Consistency(_))));
        assert_eq!(chain.blockchain.get_tip_hash(), first.get_hash());
        assert!(chain.blockchain.get_block(second.get_hash()).unwrap().is_none());
    }

    #[test]
    fn test_wrong_height_rejected() {
        let chain = TestChain::new();
        let coinbase = Transaction::new_coinbase_tx(&chain.miner.get_address(), "h").unwrap();
        let params = *chain.blockchain.mining_params();
        let block =
            Block::new_block(chain.blockchain.get_tip_hash(), &[coinbase], 5, &params).unwrap();
        assert!(matches!(
            chain.blockchain.add_block(&block),
            Err(BlockchainError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_tampered_block_rejected() {
        let chain = TestChain::new();
        let coinbase = Transaction::new_coinbase_tx(&chain.miner.get_address(), "t").unwrap();
        let params = *chain.blockchain.mining_params();
        let block =
            Block::new_block(chain.blockchain.get_tip_hash(), &[coinbase], 1, &params).unwrap();

        let bad_nonce = block.with_nonce_for_test(block.get_nonce().wrapping_add(1));
        assert!(matches!(
            chain.blockchain.add_block(&bad_nonce),
            Err(BlockchainError::InvalidBlock(_))
        ));

        let other = Transaction::new_coinbase_tx(&chain.miner.get_address(), "x").unwrap();
        let swapped = block.with_transactions_for_test(vec![other]);
        assert!(matches!(
            chain.blockchain.add_block(&swapped),
            Err(BlockchainError::InvalidBlock(_))
        ));
        assert_eq!(chain.blockchain.get_best_height().unwrap(), 0);
    }

    #[test]
    fn test_add_block_then_update_matches_commit() {
        let chain = TestChain::new();
        let utxo_set = UTXOSet::new(chain.blockchain.clone());
        let coinbase = Transaction::new_coinbase_tx(&chain.miner.get_address(), "").unwrap();
        let params = *chain.blockchain.mining_params();
        let block =
            Block::new_block(chain.blockchain.get_tip_hash(), &[coinbase], 1, &params).unwrap();

        chain.blockchain.add_block(&block).unwrap();
        utxo_set.update(&block).unwrap();

        assert_eq!(chain.blockchain.get_tip_hash(), block.get_hash());
        assert_eq!(
            utxo_set.get_balance(&chain.miner.pub_key_hash()).unwrap(),
            2 * SUBSIDY
        );
    }

    // Coinbase plus one extra transaction, mined on the current tip
    fn block_with_spend(chain: &TestChain, spend: Transaction) -> Block {
        let coinbase = Transaction::new_coinbase_tx(&chain.miner.get_address(), "").unwrap();
        let params = *chain.blockchain.mining_params();
        Block::new_block(chain.blockchain.get_tip_hash(), &[coinbase, spend], 1, &params).unwrap()
    }

    #[test]
    fn test_add_block_rejects_unknown_output_before_writing() {
        let chain = TestChain::new();
        let genesis_hash = chain.blockchain.get_tip_hash();
        let bogus = Transaction::with_parts_for_test(
            vec![crate::core::TXInput::new(&[0xab; 32], 0)],
            vec![crate::core::TXOutput::locked_to(1, chain.miner.pub_key_hash())],
        );
        let block = block_with_spend(&chain, bogus);

        assert!(matches!(
            chain.blockchain.add_block(&block),
            Err(BlockchainError::UnknownOutput { vout: 0, .. })
        ));
        assert_eq!(chain.blockchain.get_tip_hash(), genesis_hash);
        assert_eq!(chain.blockchain.get_best_height().unwrap(), 0);
        assert!(chain.blockchain.get_block(block.get_hash()).unwrap().is_none());
    }

    #[test]
    fn test_unsigned_spend_never_reaches_chain_or_index() {
        let chain = TestChain::new();
        let utxo_set = chain.utxo_set();
        let thief = Wallet::new().unwrap();
        let genesis = chain.blockchain.iterator().next().unwrap().unwrap();
        let genesis_coinbase = genesis.get_transactions()[0].get_id().to_vec();

        let theft = Transaction::with_parts_for_test(
            vec![crate::core::TXInput::new(&genesis_coinbase, 0)],
            vec![crate::core::TXOutput::locked_to(SUBSIDY, thief.pub_key_hash())],
        );
        let block = block_with_spend(&chain, theft);

        assert!(matches!(
            chain.blockchain.add_block(&block),
            Err(BlockchainError::InvalidSignature(_))
        ));
        assert!(matches!(
            utxo_set.update(&block),
            Err(BlockchainError::InvalidSignature(_))
        ));
        assert!(matches!(
            chain.blockchain.commit_block(&block),
            Err(BlockchainError::InvalidSignature(_))
        ));

        assert_eq!(chain.blockchain.get_best_height().unwrap(), 0);
        assert_eq!(utxo_set.get_balance(&thief.pub_key_hash()).unwrap(), 0);
        assert_eq!(
            utxo_set.get_balance(&chain.miner.pub_key_hash()).unwrap(),
            SUBSIDY
        );
    }

    #[test]
    fn test_validate_chain_catches_rewritten_height() {
        let chain = TestChain::new();
        let block = chain.mine_empty_block();
        assert_eq!(chain.blockchain.validate_chain().unwrap(), 2);

        // the header does not cover height, so only the parent link gives it away
        let rewritten = block.with_height_for_test(7);
        assert!(ProofOfWork::validate(&rewritten));
        chain
            .blockchain
            .blocks
            .insert(rewritten.get_hash(), rewritten.serialize().unwrap())
            .unwrap();

        assert!(matches!(
            chain.blockchain.validate_chain(),
            Err(BlockchainError::Consistency(_))
        ));
    }

    #[test]
    fn test_same_block_double_spend_rejected() {
        let chain = TestChain::new();
        let utxo_set = chain.utxo_set();
        let a = Wallet::new().unwrap();
        let b = Wallet::new().unwrap();

        let tx_a = Transaction::new_utxo_transaction(&chain.miner, &a.get_address(), 5, &utxo_set)
            .unwrap();
        let tx_b = Transaction::new_utxo_transaction(&chain.miner, &b.get_address(), 5, &utxo_set)
            .unwrap();

        let result = chain
            .blockchain
            .mine_block_with_reward(&[tx_a, tx_b], &chain.miner.get_address());
        assert!(matches!(result, Err(BlockchainError::Transaction(_))));
        assert_eq!(chain.blockchain.get_best_height().unwrap(), 0);
    }

    #[test]
    fn test_find_transaction() {
        let chain = TestChain::new();
        let block = chain.mine_empty_block();
        let coinbase = &block.get_transactions()[0];

        let found = chain.blockchain.find_transaction(coinbase.get_id()).unwrap();
        assert_eq!(found.as_ref(), Some(coinbase));
        assert!(chain.blockchain.find_transaction(&[0u8; 32]).unwrap().is_none());
    }

    #[test]
    fn test_low_difficulty_block_rejected() {
        let chain = TestChain::new();
        let coinbase = Transaction::new_coinbase_tx(&chain.miner.get_address(), "").unwrap();
        let easy = MiningParams {
            difficulty: 0,
            ..*chain.blockchain.mining_params()
        };
        let block =
            Block::new_block(chain.blockchain.get_tip_hash(), &[coinbase], 1, &easy).unwrap();
        assert!(matches!(
            chain.blockchain.commit_block(&block),
            Err(BlockchainError::InvalidBlock(_))
        ));
    }
}

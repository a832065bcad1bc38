// The UTXO set is my fast lookup for "who owns what right now"
// It is derived state: everything here can be rebuilt from the blocks tree,
// and the per-block update must land in the same place a full rebuild would

use crate::core::{Block, Blockchain, OutputLookup, TXOutput};
use crate::error::{abort, BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::{Batch, Tree};
use std::collections::{BTreeMap, HashSet};

pub const UTXO_TREE: &str = "chainstate";

/// An output that is still unspent, tagged with its position in the
/// transaction that created it. Keeping the original index means spending
/// output 0 never renumbers output 1.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct UnspentOutput {
    pub index: usize,
    pub output: TXOutput,
}

/// Full index contents, txid → unspent outputs
pub type UtxoSnapshot = BTreeMap<Vec<u8>, Vec<UnspentOutput>>;

pub struct UTXOSet {
    blockchain: Blockchain,
}

/// Lock-free view over the chainstate tree. Used by the chain while it already
/// holds the state lock for an append.
pub struct ChainstateView<'a>(pub &'a Tree);

impl OutputLookup for ChainstateView<'_> {
    fn lookup_output(&self, txid: &[u8], vout: usize) -> Result<Option<TXOutput>> {
        let Some(bytes) = self.0.get(txid)? else {
            return Ok(None);
        };
        let outs = decode_entry(bytes.as_ref())?;
        Ok(outs
            .into_iter()
            .find(|unspent| unspent.index == vout)
            .map(|unspent| unspent.output))
    }
}

impl OutputLookup for UTXOSet {
    fn lookup_output(&self, txid: &[u8], vout: usize) -> Result<Option<TXOutput>> {
        let _guard = self.blockchain.read_state()?;
        ChainstateView(self.blockchain.chainstate_tree()).lookup_output(txid, vout)
    }
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    /// Greedy coin selection: walk the index in key order and take every
    /// output locked to `pub_key_hash` until the running total reaches `amount`.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, BTreeMap<Vec<u8>, Vec<usize>>)> {
        let _guard = self.blockchain.read_state()?;
        let mut unspent_outputs: BTreeMap<Vec<u8>, Vec<usize>> = BTreeMap::new();
        let mut accumulated = 0u64;

        'scan: for item in self.blockchain.chainstate_tree().iter() {
            let (txid, v) = item?;
            for unspent in decode_entry(v.as_ref())? {
                if accumulated >= amount {
                    break 'scan;
                }
                if unspent.output.is_locked_with_key(pub_key_hash) {
                    accumulated = accumulated.saturating_add(unspent.output.get_value());
                    unspent_outputs
                        .entry(txid.to_vec())
                        .or_default()
                        .push(unspent.index);
                }
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let _guard = self.blockchain.read_state()?;
        let mut utxos = vec![];
        for item in self.blockchain.chainstate_tree().iter() {
            let (_, v) = item?;
            utxos.extend(
                decode_entry(v.as_ref())?
                    .into_iter()
                    .map(|unspent| unspent.output)
                    .filter(|out| out.is_locked_with_key(pub_key_hash)),
            );
        }
        Ok(utxos)
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .map(TXOutput::get_value)
            .sum())
    }

    /// Number of transactions that still have at least one unspent output
    pub fn count_transactions(&self) -> Result<u64> {
        let _guard = self.blockchain.read_state()?;
        let mut counter = 0;
        for item in self.blockchain.chainstate_tree().iter() {
            item?;
            counter += 1;
        }
        Ok(counter)
    }

    pub fn snapshot(&self) -> Result<UtxoSnapshot> {
        let _guard = self.blockchain.read_state()?;
        let mut snapshot = BTreeMap::new();
        for item in self.blockchain.chainstate_tree().iter() {
            let (k, v) = item?;
            snapshot.insert(k.to_vec(), decode_entry(v.as_ref())?);
        }
        Ok(snapshot)
    }

    /// Rebuild the whole index from the chain.
    ///
    /// Two passes so that spends are known before any output is recorded,
    /// whatever order the blocks are walked in. The old contents are swapped
    /// for the new ones in a single atomic batch.
    pub fn reindex(&self) -> Result<()> {
        let _guard = self.blockchain.write_state()?;

        let mut spent: HashSet<(Vec<u8>, usize)> = HashSet::new();
        for block in self.blockchain.iterator() {
            for tx in block?.get_transactions() {
                if tx.is_coinbase() {
                    continue;
                }
                for vin in tx.get_vin() {
                    spent.insert((vin.get_txid().to_vec(), vin.get_vout()));
                }
            }
        }

        let mut rebuilt: UtxoSnapshot = BTreeMap::new();
        for block in self.blockchain.iterator() {
            for tx in block?.get_transactions() {
                let outs: Vec<UnspentOutput> = tx
                    .get_vout()
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| !spent.contains(&(tx.get_id().to_vec(), *idx)))
                    .map(|(index, out)| UnspentOutput {
                        index,
                        output: out.clone(),
                    })
                    .collect();
                if !outs.is_empty() {
                    rebuilt.insert(tx.get_id().to_vec(), outs);
                }
            }
        }

        let tree = self.blockchain.chainstate_tree();
        let mut batch = Batch::default();
        for key in tree.iter().keys() {
            batch.remove(key?);
        }
        for (txid, outs) in &rebuilt {
            batch.insert(txid.as_slice(), serialize(outs)?);
        }
        tree.apply_batch(batch).map_err(|e| {
            BlockchainError::Database(format!("Failed to write rebuilt UTXO index: {e}"))
        })?;
        tree.flush()?;

        info!("Reindexed UTXO set: {} transactions with unspent outputs", rebuilt.len());
        Ok(())
    }

    /// Apply one newly appended block. Every spend is verified against the
    /// index first, so an unknown output (`UnknownOutput`) or a bad signature
    /// (`InvalidSignature`) leaves the index untouched.
    pub fn update(&self, block: &Block) -> Result<()> {
        let _guard = self.blockchain.write_state()?;
        self.blockchain.verify_transactions(block.get_transactions())?;
        self.blockchain
            .chainstate_tree()
            .transaction(|tx_db| apply_block(tx_db, block))?;
        debug!("Applied block {} to UTXO set", block.get_hash_hex());
        Ok(())
    }
}

pub(crate) fn decode_entry(bytes: &[u8]) -> Result<Vec<UnspentOutput>> {
    deserialize(bytes)
}

/// Incremental index maintenance for one block, in transaction order, inside
/// the caller's sled transaction.
pub(crate) fn apply_block(
    chainstate: &TransactionalTree,
    block: &Block,
) -> ConflictableTransactionResult<(), BlockchainError> {
    for tx in block.get_transactions() {
        if !tx.is_coinbase() {
            for vin in tx.get_vin() {
                let unknown = || {
                    ConflictableTransactionError::Abort(BlockchainError::UnknownOutput {
                        txid: HEXLOWER.encode(vin.get_txid()),
                        vout: vin.get_vout(),
                    })
                };

                let outs_bytes = chainstate.get(vin.get_txid())?.ok_or_else(unknown)?;
                let mut outs = abort(decode_entry(outs_bytes.as_ref()))?;
                let position = outs
                    .iter()
                    .position(|unspent| unspent.index == vin.get_vout())
                    .ok_or_else(unknown)?;
                outs.remove(position);

                if outs.is_empty() {
                    chainstate.remove(vin.get_txid())?;
                } else {
                    chainstate.insert(vin.get_txid(), abort(serialize(&outs))?)?;
                }
            }
        }

        let new_outputs: Vec<UnspentOutput> = tx
            .get_vout()
            .iter()
            .enumerate()
            .map(|(index, out)| UnspentOutput {
                index,
                output: out.clone(),
            })
            .collect();
        if !new_outputs.is_empty() {
            chainstate.insert(tx.get_id(), abort(serialize(&new_outputs))?)?;
        }
    }
    Ok(())
}

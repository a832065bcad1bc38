use crate::core::{Block, Transaction};
use data_encoding::HEXLOWER;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct PoolInner {
    order: Vec<String>,                    // txid hex in arrival order
    txs: HashMap<String, Transaction>,     // txid hex -> transaction
}

/// Pending transactions waiting for a block, kept in arrival order
pub struct MemoryPool {
    inner: RwLock<PoolInner>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(PoolInner::default()),
        }
    }

    // The pool holds no invariants a panicking writer could break halfway
    fn read(&self) -> RwLockReadGuard<'_, PoolInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, txid: &str) -> Option<Transaction> {
        self.read().txs.get(txid).cloned()
    }

    /// Returns false if the transaction was already pending
    pub fn add(&self, tx: Transaction) -> bool {
        let txid = HEXLOWER.encode(tx.get_id());
        let mut pool = self.write();
        if pool.txs.contains_key(&txid) {
            return false;
        }
        pool.order.push(txid.clone());
        pool.txs.insert(txid, tx);
        true
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.read().txs.contains_key(txid)
    }

    pub fn remove(&self, txid: &str) -> Option<Transaction> {
        let mut pool = self.write();
        let removed = pool.txs.remove(txid)?;
        pool.order.retain(|id| id != txid);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.read().txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().txs.is_empty()
    }

    /// Copy of every pending transaction in arrival order. A block being mined
    /// works from this copy; later submissions do not leak into it.
    pub fn snapshot(&self) -> Vec<Transaction> {
        let pool = self.read();
        pool.order
            .iter()
            .filter_map(|txid| pool.txs.get(txid).cloned())
            .collect()
    }

    /// True if `tx` spends an output some pending transaction already spends
    pub fn spends_conflict(&self, tx: &Transaction) -> bool {
        let wanted: HashSet<(&[u8], usize)> = tx
            .get_vin()
            .iter()
            .map(|vin| (vin.get_txid(), vin.get_vout()))
            .collect();
        self.read().txs.values().any(|pending| {
            pending
                .get_vin()
                .iter()
                .any(|vin| wanted.contains(&(vin.get_txid(), vin.get_vout())))
        })
    }

    /// Drop everything a committed block made obsolete: transactions it
    /// included and transactions spending the same outputs it spent.
    /// Returns how many were removed.
    pub fn remove_block_transactions(&self, block: &Block) -> usize {
        let included: HashSet<String> = block
            .get_transactions()
            .iter()
            .map(|tx| HEXLOWER.encode(tx.get_id()))
            .collect();
        let spent: HashSet<(&[u8], usize)> = block
            .get_transactions()
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .flat_map(|tx| tx.get_vin().iter().map(|vin| (vin.get_txid(), vin.get_vout())))
            .collect();

        let mut pool = self.write();
        let before = pool.txs.len();
        pool.txs.retain(|txid, tx| {
            !included.contains(txid)
                && !tx
                    .get_vin()
                    .iter()
                    .any(|vin| spent.contains(&(vin.get_txid(), vin.get_vout())))
        });
        let PoolInner { order, txs } = &mut *pool;
        order.retain(|txid| txs.contains_key(txid));
        before - txs.len()
    }

    pub fn clear(&self) {
        let mut pool = self.write();
        pool.order.clear();
        pool.txs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TXInput, TXOutput};

    fn spend(txid: &[u8], vout: usize, value: u64) -> Transaction {
        Transaction::with_parts_for_test(
            vec![TXInput::new(txid, vout)],
            vec![TXOutput::locked_to(value, vec![1; 20])],
        )
    }

    #[test]
    fn test_snapshot_keeps_arrival_order() {
        let pool = MemoryPool::new();
        let txs: Vec<Transaction> = (0..5u8).map(|i| spend(&[i; 32], 0, 1)).collect();
        for tx in &txs {
            assert!(pool.add(tx.clone()));
        }
        assert!(!pool.add(txs[2].clone()));

        assert_eq!(pool.snapshot(), txs);
        pool.remove(&HEXLOWER.encode(txs[1].get_id())).unwrap();
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.snapshot()[1], txs[2]);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_adds() {
        let pool = MemoryPool::new();
        pool.add(spend(&[1; 32], 0, 1));
        let snapshot = pool.snapshot();
        pool.add(spend(&[2; 32], 0, 1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_conflicting_spend_detected() {
        let pool = MemoryPool::new();
        pool.add(spend(&[1; 32], 0, 1));
        assert!(pool.spends_conflict(&spend(&[1; 32], 0, 2)));
        assert!(!pool.spends_conflict(&spend(&[1; 32], 1, 2)));
    }

    #[test]
    fn test_clear() {
        let pool = MemoryPool::new();
        pool.add(spend(&[1; 32], 0, 1));
        pool.clear();
        assert!(pool.is_empty());
        assert!(pool.snapshot().is_empty());
    }
}

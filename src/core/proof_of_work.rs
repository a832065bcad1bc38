use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use num_bigint::BigUint;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Target is 2^(256 - difficulty), so difficulty must leave at least one bit
pub const MAX_DIFFICULTY: u32 = 255;
/// Primary nonce width: 32 bits worth of candidates
pub const DEFAULT_NONCE_LIMIT: u64 = 1 << 32;
/// How many times the extra nonce may be bumped once the primary range is used up
pub const DEFAULT_EXTRA_NONCE_LIMIT: u64 = 1024;

/// Knobs for one nonce search. `nonce_limit` bounds the primary nonce to
/// `0..nonce_limit`; every extra nonce value in `0..=extra_nonce_limit` gets a
/// full pass over that range before the search reports exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningParams {
    pub difficulty: u32,
    pub nonce_limit: u64,
    pub extra_nonce_limit: u64,
    pub workers: usize,
}

impl Default for MiningParams {
    fn default() -> Self {
        MiningParams {
            difficulty: 16,
            nonce_limit: DEFAULT_NONCE_LIMIT,
            extra_nonce_limit: DEFAULT_EXTRA_NONCE_LIMIT,
            workers: rayon::current_num_threads(),
        }
    }
}

impl MiningParams {
    pub fn with_difficulty(difficulty: u32) -> MiningParams {
        MiningParams {
            difficulty,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "Difficulty {} exceeds maximum {MAX_DIFFICULTY}",
                self.difficulty
            )));
        }
        if self.nonce_limit == 0 {
            return Err(BlockchainError::Config(
                "Nonce limit must be positive".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(BlockchainError::Config(
                "At least one mining worker is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Winning nonce pair and the hash it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowSolution {
    pub nonce: u64,
    pub extra_nonce: u64,
    pub hash: Vec<u8>,
    pub attempts: u64,
}

/// Nonce search and check for one block header.
///
/// The hashed header is prev hash, merkle root, timestamp, difficulty and
/// nonce (plus the extra nonce once it is non-zero). Height is not part of
/// it: a block's height is bound through its parent link, which `add_block`
/// checks on receipt and `Blockchain::validate_chain` rechecks for stored
/// blocks. Rewriting a stored height therefore leaves the hash valid.
pub struct ProofOfWork {
    // prev hash || merkle root || timestamp || difficulty, shared by every attempt
    header_prefix: Vec<u8>,
    target: BigUint,
    difficulty: u32,
    height: usize,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: &Block) -> Result<ProofOfWork> {
        let difficulty = block.get_difficulty();
        if difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::InvalidBlock(format!(
                "Difficulty {difficulty} exceeds maximum {MAX_DIFFICULTY}"
            )));
        }

        let mut header_prefix = vec![];
        header_prefix.extend(block.get_pre_block_hash());
        header_prefix.extend(block.get_merkle_root());
        header_prefix.extend(block.get_timestamp().to_be_bytes());
        header_prefix.extend(difficulty.to_be_bytes());

        Ok(ProofOfWork {
            header_prefix,
            target: Self::target_for(difficulty),
            difficulty,
            height: block.get_height(),
        })
    }

    pub fn target_for(difficulty: u32) -> BigUint {
        BigUint::from(1u8) << (256 - difficulty as usize)
    }

    /// Header bytes hashed for one attempt. The extra nonce is only appended
    /// once the search has moved past the first primary nonce range.
    pub fn prepare_data(&self, nonce: u64, extra_nonce: u64) -> Vec<u8> {
        let mut data_bytes = Vec::with_capacity(self.header_prefix.len() + 16);
        data_bytes.extend(&self.header_prefix);
        data_bytes.extend(nonce.to_be_bytes());
        if extra_nonce > 0 {
            data_bytes.extend(extra_nonce.to_be_bytes());
        }
        data_bytes
    }

    pub fn meets_target(&self, hash: &[u8]) -> bool {
        BigUint::from_bytes_be(hash) < self.target
    }

    pub fn run(&self, params: &MiningParams) -> Result<PowSolution> {
        let never = AtomicBool::new(false);
        self.run_with_cancel(params, &never)
    }

    /// Searches for a nonce, splitting each primary range across `params.workers`
    /// rayon tasks. Setting `cancel` stops every worker at its next attempt.
    pub fn run_with_cancel(&self, params: &MiningParams, cancel: &AtomicBool) -> Result<PowSolution> {
        params.validate()?;
        info!(
            "Mining block at height {} (difficulty {}, {} workers)",
            self.height, self.difficulty, params.workers
        );

        let mut attempts = 0u64;
        for extra_nonce in 0..=params.extra_nonce_limit {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            if extra_nonce > 0 {
                debug!(
                    "Primary nonce range exhausted at height {}, extra nonce now {extra_nonce}",
                    self.height
                );
            }

            let (winner, scanned) = self.scan(extra_nonce, params, cancel);
            attempts = attempts.saturating_add(scanned);
            if let Some((nonce, hash)) = winner {
                info!(
                    "Found nonce {nonce} (extra {extra_nonce}) after {attempts} attempts: {}",
                    HEXLOWER.encode(&hash)
                );
                return Ok(PowSolution {
                    nonce,
                    extra_nonce,
                    hash,
                    attempts,
                });
            }
        }

        if cancel.load(Ordering::Relaxed) {
            warn!("Mining at height {} cancelled", self.height);
            return Err(BlockchainError::MiningCancelled);
        }
        warn!(
            "Nonce space exhausted at height {} after {attempts} attempts",
            self.height
        );
        Err(BlockchainError::MiningExhausted {
            height: self.height,
            attempts,
        })
    }

    // One pass over 0..nonce_limit for a fixed extra nonce. Workers take
    // disjoint slices; the first hit raises `found` and the rest stop.
    fn scan(
        &self,
        extra_nonce: u64,
        params: &MiningParams,
        cancel: &AtomicBool,
    ) -> (Option<(u64, Vec<u8>)>, u64) {
        let workers = params.workers.max(1) as u64;
        let chunk = params.nonce_limit.div_ceil(workers);
        let found = AtomicBool::new(false);
        let attempts = AtomicU64::new(0);
        let winner: Mutex<Option<(u64, Vec<u8>)>> = Mutex::new(None);

        (0..workers).into_par_iter().for_each(|worker| {
            let start = worker.saturating_mul(chunk);
            let end = start.saturating_add(chunk).min(params.nonce_limit);
            let mut scanned = 0u64;

            for nonce in start..end {
                if found.load(Ordering::Relaxed) || cancel.load(Ordering::Relaxed) {
                    break;
                }
                let hash = sha256_digest(&self.prepare_data(nonce, extra_nonce));
                scanned += 1;
                if self.meets_target(&hash) {
                    if let Ok(mut slot) = winner.lock() {
                        if slot.is_none() {
                            *slot = Some((nonce, hash));
                        }
                    }
                    found.store(true, Ordering::SeqCst);
                    break;
                }
            }
            attempts.fetch_add(scanned, Ordering::Relaxed);
        });

        let winner = winner
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (winner, attempts.into_inner())
    }

    /// Recomputes the hash from the block's stored fields and nonce pair, then
    /// checks both that it matches the stored hash and that it meets the target.
    pub fn validate(block: &Block) -> bool {
        let pow = match ProofOfWork::new_proof_of_work(block) {
            Ok(pow) => pow,
            Err(_) => return false,
        };
        let data = pow.prepare_data(block.get_nonce(), block.get_extra_nonce());
        let hash = sha256_digest(data.as_slice());
        hash.as_slice() == block.get_hash() && pow.meets_target(&hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::wallet::Wallet;

    fn params(difficulty: u32) -> MiningParams {
        MiningParams {
            difficulty,
            nonce_limit: DEFAULT_NONCE_LIMIT,
            extra_nonce_limit: 0,
            workers: 2,
        }
    }

    fn create_test_block(difficulty: u32) -> Block {
        let address = Wallet::new().unwrap().get_address();
        let coinbase_tx = Transaction::new_coinbase_tx(&address, "pow test").unwrap();
        Block::new_block(vec![], &[coinbase_tx], 0, &params(difficulty)).unwrap()
    }

    #[test]
    fn test_target_shrinks_with_difficulty() {
        assert!(ProofOfWork::target_for(8) < ProofOfWork::target_for(4));
        assert_eq!(ProofOfWork::target_for(0), BigUint::from(1u8) << 256usize);
        assert_eq!(ProofOfWork::target_for(255), BigUint::from(2u8));
    }

    #[test]
    fn test_mined_block_validates() {
        let block = create_test_block(8);
        assert!(ProofOfWork::validate(&block));

        let hash = BigUint::from_bytes_be(block.get_hash());
        assert!(hash < ProofOfWork::target_for(block.get_difficulty()));
    }

    #[test]
    fn test_validation_detects_wrong_nonce() {
        let block = create_test_block(8);
        let tampered = block.with_nonce_for_test(block.get_nonce() + 1);
        assert!(!ProofOfWork::validate(&tampered));
    }

    #[test]
    fn test_prepare_data_layout() {
        let block = create_test_block(1);
        let pow = ProofOfWork::new_proof_of_work(&block).unwrap();

        let data = pow.prepare_data(12345, 0);
        let expected_len = block.get_pre_block_hash().len()
            + block.get_merkle_root().len()
            + 8 // timestamp
            + 4 // difficulty
            + 8; // nonce
        assert_eq!(data.len(), expected_len);
        assert_eq!(&data[data.len() - 8..], &12345u64.to_be_bytes());

        // extra nonce is only appended when in use
        assert_eq!(pow.prepare_data(12345, 1).len(), expected_len + 8);
        assert_ne!(pow.prepare_data(1, 0), pow.prepare_data(2, 0));
    }

    #[test]
    fn test_single_worker_finds_lowest_nonce() {
        let block = create_test_block(6);
        let pow = ProofOfWork::new_proof_of_work(&block).unwrap();
        let solution = pow
            .run(&MiningParams {
                workers: 1,
                ..params(6)
            })
            .unwrap();

        for nonce in 0..solution.nonce {
            let hash = sha256_digest(&pow.prepare_data(nonce, 0));
            assert!(!pow.meets_target(&hash));
        }
        assert_eq!(solution.attempts, solution.nonce + 1);
    }

    #[test]
    fn test_exhausted_nonce_space_is_reported() {
        let block = create_test_block(1);
        let pow = ProofOfWork {
            difficulty: 250,
            target: ProofOfWork::target_for(250),
            ..ProofOfWork::new_proof_of_work(&block).unwrap()
        };
        let result = pow.run(&MiningParams {
            difficulty: 250,
            nonce_limit: 64,
            extra_nonce_limit: 1,
            workers: 2,
        });
        match result {
            Err(BlockchainError::MiningExhausted { attempts, .. }) => assert_eq!(attempts, 128),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_nonce_extends_search() {
        // one primary nonce per round forces the search into the extra nonce
        let block = create_test_block(1);
        let pow = ProofOfWork {
            difficulty: 8,
            target: ProofOfWork::target_for(8),
            ..ProofOfWork::new_proof_of_work(&block).unwrap()
        };
        let solution = pow
            .run(&MiningParams {
                difficulty: 8,
                nonce_limit: 1,
                extra_nonce_limit: 100_000,
                workers: 1,
            })
            .unwrap();

        assert_eq!(solution.nonce, 0);
        assert_eq!(solution.attempts, solution.extra_nonce + 1);
        assert!(pow.meets_target(&solution.hash));
    }

    #[test]
    fn test_cancelled_search() {
        let block = create_test_block(1);
        let pow = ProofOfWork::new_proof_of_work(&block).unwrap();
        let cancel = AtomicBool::new(true);
        let result = pow.run_with_cancel(&params(200), &cancel);
        assert!(matches!(result, Err(BlockchainError::MiningCancelled)));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let block = create_test_block(1);
        let pow = ProofOfWork::new_proof_of_work(&block).unwrap();
        let result = pow.run(&MiningParams {
            workers: 0,
            ..params(1)
        });
        assert!(matches!(result, Err(BlockchainError::Config(_))));
        assert!(MiningParams::with_difficulty(256).validate().is_err());
    }
}

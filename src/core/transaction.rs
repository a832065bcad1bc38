// This file implements the transaction system - how value moves in my blockchain
// Following Bitcoin's UTXO model: every transaction consumes earlier outputs and
// creates new ones, and each spend is authorised by a single ECDSA signature

use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, serialize,
    sha256_digest,
};
use crate::wallet::{address_to_pub_key_hash, hash_pub_key, validate_address, Wallet};
use data_encoding::HEXLOWER;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Fixed reward paid by every coinbase transaction
pub const SUBSIDY: u64 = 10;

/// Output index carried by the coinbase input, which spends nothing
pub const COINBASE_VOUT: usize = usize::MAX;

/// Resolves the output an input points at. Implementations decide what
/// "exists" means: the UTXO index only answers for outputs that are unspent.
pub trait OutputLookup {
    fn lookup_output(&self, txid: &[u8], vout: usize) -> Result<Option<TXOutput>>;
}

// A transaction input references a previous transaction output
// Think of it as "I want to spend output #2 from transaction ABC123"
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,      // The ID of the transaction containing the output I want to spend
    vout: usize,        // The index of the output in that transaction
    signature: Vec<u8>, // Signature over the trimmed copy of the spending transaction
    pub_key: Vec<u8>,   // Spender's raw public key; arbitrary data for a coinbase
}

impl TXInput {
    // Inputs start unsigned; sign() fills in the signature and public key
    pub fn new(txid: &[u8], vout: usize) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        let locking_hash = hash_pub_key(self.pub_key.as_slice());
        locking_hash.eq(pub_key_hash)
    }
}

// A transaction output is like a "check" that can be cashed later
// "Pay 4 coins to whoever can sign for this public key hash"
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXOutput {
    value: u64,            // How many coins this output is worth
    pub_key_hash: Vec<u8>, // The hash of the public key that can spend this output
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        let pub_key_hash = address_to_pub_key_hash(address)?;
        Ok(TXOutput::locked_to(value, pub_key_hash))
    }

    pub fn locked_to(value: u64, pub_key_hash: Vec<u8>) -> TXOutput {
        TXOutput {
            value,
            pub_key_hash,
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

// The id is the SHA-256 of the transaction serialized with an empty id, so it
// commits to every input (signatures included) and every output
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mint `SUBSIDY` coins to `to`. Empty `data` is replaced with a random
    /// UUID so two coinbases paying the same address still get distinct ids.
    pub fn new_coinbase_tx(to: &str, data: &str) -> Result<Transaction> {
        let data = if data.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            data.to_string()
        };

        let txout = TXOutput::new(SUBSIDY, to)?;
        // Coinbase transactions have a special input with no previous transaction
        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: vec![],
            pub_key: data.into_bytes(),
        };

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Build and sign a spend of `amount` from `wallet` to `to`.
    ///
    /// Inputs are picked greedily in index order until they cover `amount`;
    /// anything above `amount` comes back to the sender as a change output.
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }
        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid to address: {to}"
            )));
        }

        let public_key_hash = wallet.pub_key_hash();
        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(public_key_hash.as_slice(), amount)?;

        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid, outs) in valid_outputs {
            for out in outs {
                inputs.push(TXInput::new(&txid, out));
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::locked_to(change, public_key_hash));
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.sign(wallet, utxo_set)?;
        tx.id = tx.hash()?;
        debug!(
            "Built transaction {} spending {} inputs",
            HEXLOWER.encode(&tx.id),
            tx.vin.len()
        );
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    // Same inputs and outputs, but no signatures or public keys anywhere
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
            .collect();
        Transaction {
            id: vec![],
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    // The message signed for input `idx`: the trimmed copy with only that
    // input's public key slot holding the spent output's locking hash
    fn signing_digest(trimmed: &mut Transaction, idx: usize, locking_hash: &[u8]) -> Result<Vec<u8>> {
        trimmed.vin[idx].pub_key = locking_hash.to_vec();
        let digest = trimmed.hash();
        trimmed.vin[idx].pub_key.clear();
        digest
    }

    pub fn sign<L: OutputLookup>(&mut self, wallet: &Wallet, lookup: &L) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let signer_hash = wallet.pub_key_hash();
        let mut tx_copy = self.trimmed_copy();
        for idx in 0..self.vin.len() {
            let prev_output = resolve(lookup, &self.vin[idx])?;
            if !prev_output.is_locked_with_key(&signer_hash) {
                return Err(BlockchainError::InvalidSignature(format!(
                    "Output {}:{} is not locked to the signing wallet",
                    HEXLOWER.encode(self.vin[idx].get_txid()),
                    self.vin[idx].get_vout()
                )));
            }

            let digest =
                Self::signing_digest(&mut tx_copy, idx, prev_output.get_pub_key_hash())?;
            let signature = ecdsa_p256_sha256_sign_digest(wallet.get_pkcs8(), &digest)?;
            self.vin[idx].signature = signature;
            self.vin[idx].pub_key = wallet.get_public_key().to_vec();
        }
        Ok(())
    }

    /// Checks every input against the output it spends. Coinbase transactions
    /// are accepted as-is.
    ///
    /// Fails with `UnknownOutput` when `lookup` cannot resolve a spent output,
    /// `InvalidSignature` when the key or signature does not match, and
    /// `Transaction` for a stale id, duplicate inputs or unbalanced values.
    pub fn verify<L: OutputLookup>(&self, lookup: &L) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        if self.vin.is_empty() {
            return Err(BlockchainError::Transaction(
                "Transaction has no inputs".to_string(),
            ));
        }
        if self.id != self.hash()? {
            return Err(BlockchainError::Transaction(format!(
                "Transaction id {} does not match its contents",
                HEXLOWER.encode(&self.id)
            )));
        }

        let mut seen = HashSet::new();
        for vin in &self.vin {
            if !seen.insert((vin.get_txid(), vin.get_vout())) {
                return Err(BlockchainError::Transaction(format!(
                    "Output {}:{} spent twice in one transaction",
                    HEXLOWER.encode(vin.get_txid()),
                    vin.get_vout()
                )));
            }
        }

        let mut input_value = 0u64;
        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_output = resolve(lookup, vin)?;

            if !vin.uses_key(prev_output.get_pub_key_hash()) {
                return Err(BlockchainError::InvalidSignature(format!(
                    "Public key does not own output {}:{}",
                    HEXLOWER.encode(vin.get_txid()),
                    vin.get_vout()
                )));
            }

            let digest =
                Self::signing_digest(&mut tx_copy, idx, prev_output.get_pub_key_hash())?;
            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                &digest,
            ) {
                return Err(BlockchainError::InvalidSignature(format!(
                    "Bad signature on input {idx} of {}",
                    HEXLOWER.encode(&self.id)
                )));
            }

            input_value = input_value
                .checked_add(prev_output.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Input value overflow".to_string()))?;
        }

        // No fee market: whatever goes in must come out
        let output_value = self.get_output_value()?;
        if input_value != output_value {
            return Err(BlockchainError::Transaction(format!(
                "Transaction balance violation: inputs={input_value}, outputs={output_value}"
            )));
        }
        Ok(())
    }

    pub fn is_valid<L: OutputLookup>(&self, lookup: &L) -> bool {
        match self.verify(lookup) {
            Ok(()) => true,
            Err(e) => {
                debug!("Transaction {} rejected: {e}", HEXLOWER.encode(&self.id));
                false
            }
        }
    }

    /// SHA-256 of the transaction serialized with an empty id
    pub fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_hex(&self) -> String {
        HEXLOWER.encode(&self.id)
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_output_value(&self) -> Result<u64> {
        self.vout.iter().try_fold(0u64, |total, out| {
            total
                .checked_add(out.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Output value overflow".to_string()))
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}

fn resolve<L: OutputLookup>(lookup: &L, vin: &TXInput) -> Result<TXOutput> {
    lookup
        .lookup_output(vin.get_txid(), vin.get_vout())?
        .ok_or_else(|| BlockchainError::UnknownOutput {
            txid: HEXLOWER.encode(vin.get_txid()),
            vout: vin.get_vout(),
        })
}

#[cfg(test)]
impl Transaction {
    pub(crate) fn with_parts_for_test(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Transaction {
        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
        };
        tx.id = tx.hash().unwrap();
        tx
    }

    pub(crate) fn outputs_mut_for_test(&mut self) -> &mut Vec<TXOutput> {
        &mut self.vout
    }

    pub(crate) fn inputs_mut_for_test(&mut self) -> &mut Vec<TXInput> {
        &mut self.vin
    }

    pub(crate) fn rehash_for_test(&mut self) {
        self.id = self.hash().unwrap();
    }
}

/// Arbitrary values for property tests. Ids, keys and signatures are random
/// bytes, so the values round-trip but do not verify.
#[cfg(test)]
pub(crate) mod strategies {
    use super::*;
    use proptest::prelude::*;

    fn bytes(max: usize) -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..max)
    }

    pub(crate) fn arb_input() -> impl Strategy<Value = TXInput> {
        (bytes(40), any::<usize>(), bytes(80), bytes(80)).prop_map(
            |(txid, vout, signature, pub_key)| TXInput {
                txid,
                vout,
                signature,
                pub_key,
            },
        )
    }

    pub(crate) fn arb_output() -> impl Strategy<Value = TXOutput> {
        (any::<u64>(), bytes(24)).prop_map(|(value, pub_key_hash)| TXOutput {
            value,
            pub_key_hash,
        })
    }

    pub(crate) fn arb_transaction() -> impl Strategy<Value = Transaction> {
        (
            bytes(40),
            prop::collection::vec(arb_input(), 0..5),
            prop::collection::vec(arb_output(), 0..5),
        )
            .prop_map(|(id, vin, vout)| Transaction { id, vin, vout })
    }
}

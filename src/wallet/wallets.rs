use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use log::info;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallet.dat";

/// Address → keypair collection. Where it lives on disk is up to the caller.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    path: Option<PathBuf>,
}

impl Default for Wallets {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallets {
    /// An empty, memory-only collection
    pub fn new() -> Wallets {
        Wallets {
            wallets: HashMap::new(),
            path: None,
        }
    }

    /// Opens the collection stored at `path`, starting empty if the file is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Wallets> {
        let path = path.as_ref().to_path_buf();
        let wallets = if path.exists() {
            let bytes = fs::read(&path)?;
            deserialize(&bytes)?
        } else {
            HashMap::new()
        };
        Ok(Wallets {
            wallets,
            path: Some(path),
        })
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save()?;
        info!("Created wallet {address}");
        Ok(address)
    }

    /// Addresses in lexical order
    pub fn get_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn require_wallet(&self, address: &str) -> Result<&Wallet> {
        self.get_wallet(address).ok_or_else(|| {
            BlockchainError::Wallet(format!("Wallet not found for address: {address}"))
        })
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Writes the collection back to its file. Memory-only collections are a no-op.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wallets_persist_across_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(WALLET_FILE);

        let address = {
            let mut wallets = Wallets::load(&path).unwrap();
            assert!(wallets.is_empty());
            wallets.create_wallet().unwrap()
        };

        let wallets = Wallets::load(&path).unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets.get_addresses(), vec![address.clone()]);
        assert_eq!(wallets.require_wallet(&address).unwrap().get_address(), address);
    }

    #[test]
    fn test_unknown_address_is_wallet_error() {
        let wallets = Wallets::new();
        assert!(matches!(
            wallets.require_wallet("nobody"),
            Err(BlockchainError::Wallet(_))
        ));
    }
}

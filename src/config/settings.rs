use crate::core::{MiningParams, DEFAULT_EXTRA_NONCE_LIMIT, DEFAULT_NONCE_LIMIT, MAX_DIFFICULTY};
use crate::error::{BlockchainError, Result};
use crate::wallet::WALLET_FILE;
use log::debug;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DIFFICULTY: u32 = 16;

const NODE_ID_KEY: &str = "NODE_ID";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";
const DATA_DIR_KEY: &str = "DATA_DIR";
const WALLET_FILE_KEY: &str = "WALLET_FILE";
const POW_DIFFICULTY_KEY: &str = "POW_DIFFICULTY";
const POW_WORKERS_KEY: &str = "POW_WORKERS";

/// Node settings. Built once at startup and handed to whatever needs it;
/// nothing here is global.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Isolates this node's database and wallet file when several nodes share a machine
    pub node_id: Option<String>,
    pub wallet_file: Option<PathBuf>,
    pub mining_address: Option<String>,
    pub difficulty: u32,
    pub nonce_limit: u64,
    pub extra_nonce_limit: u64,
    pub mining_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            node_id: None,
            wallet_file: None,
            mining_address: None,
            difficulty: DEFAULT_DIFFICULTY,
            nonce_limit: DEFAULT_NONCE_LIMIT,
            extra_nonce_limit: DEFAULT_EXTRA_NONCE_LIMIT,
            mining_workers: rayon::current_num_threads(),
        }
    }
}

impl Config {
    /// Defaults (or the TOML file at `path`), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        let config = base.with_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        debug!("Loaded configuration: {config:?}");
        Ok(config)
    }

    pub fn from_env() -> Result<Config> {
        Config::default().with_overrides(|key| env::var(key).ok())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Config> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            BlockchainError::Config(format!(
                "Failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Apply `NODE_ID`, `MINING_ADDRESS`, `DATA_DIR`, `WALLET_FILE`,
    /// `POW_DIFFICULTY` and `POW_WORKERS` from `lookup` on top of `self`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(node_id) = lookup(NODE_ID_KEY) {
            self.node_id = Some(node_id);
        }
        if let Some(address) = lookup(MINING_ADDRESS_KEY) {
            self.mining_address = Some(address);
        }
        if let Some(dir) = lookup(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup(WALLET_FILE_KEY) {
            self.wallet_file = Some(PathBuf::from(file));
        }
        if let Some(value) = lookup(POW_DIFFICULTY_KEY) {
            self.difficulty = parse_var(POW_DIFFICULTY_KEY, &value)?;
        }
        if let Some(value) = lookup(POW_WORKERS_KEY) {
            self.mining_workers = parse_var(POW_WORKERS_KEY, &value)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "difficulty must be at most {MAX_DIFFICULTY}, got {}",
                self.difficulty
            )));
        }
        if self.nonce_limit == 0 {
            return Err(BlockchainError::Config(
                "nonce_limit must be positive".to_string(),
            ));
        }
        if self.mining_workers == 0 {
            return Err(BlockchainError::Config(
                "mining_workers must be positive".to_string(),
            ));
        }
        if matches!(&self.node_id, Some(id) if id.is_empty()) {
            return Err(BlockchainError::Config("node_id must not be empty".to_string()));
        }
        Ok(())
    }

    /// `data_dir`, or `data_dir/node_<id>` when a node id is set
    pub fn db_path(&self) -> PathBuf {
        match &self.node_id {
            Some(node_id) => self.data_dir.join(format!("node_{node_id}")),
            None => self.data_dir.clone(),
        }
    }

    pub fn wallet_path(&self) -> PathBuf {
        if let Some(file) = &self.wallet_file {
            return file.clone();
        }
        match &self.node_id {
            Some(node_id) => PathBuf::from(format!("wallet_{node_id}.dat")),
            None => PathBuf::from(WALLET_FILE),
        }
    }

    pub fn mining_params(&self) -> MiningParams {
        MiningParams {
            difficulty: self.difficulty,
            nonce_limit: self.nonce_limit,
            extra_nonce_limit: self.extra_nonce_limit,
            workers: self.mining_workers,
        }
    }

    pub fn is_miner(&self) -> bool {
        self.mining_address.is_some()
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BlockchainError::Config(format!("Invalid {key} value {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.db_path(), PathBuf::from("data"));
        assert_eq!(config.wallet_path(), PathBuf::from(WALLET_FILE));
        assert_eq!(config.mining_params().difficulty, DEFAULT_DIFFICULTY);
        assert!(!config.is_miner());
    }

    #[test]
    fn test_node_id_isolates_paths() {
        let config = Config::default()
            .with_overrides(vars(&[("NODE_ID", "3000"), ("DATA_DIR", "/tmp/chain")]))
            .unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/chain/node_3000"));
        assert_eq!(config.wallet_path(), PathBuf::from("wallet_3000.dat"));
    }

    #[test]
    fn test_numeric_overrides() {
        let config = Config::default()
            .with_overrides(vars(&[("POW_DIFFICULTY", "12"), ("POW_WORKERS", "3")]))
            .unwrap();
        let params = config.mining_params();
        assert_eq!(params.difficulty, 12);
        assert_eq!(params.workers, 3);

        let bad = Config::default().with_overrides(vars(&[("POW_DIFFICULTY", "hard")]));
        assert!(matches!(bad, Err(BlockchainError::Config(_))));
    }

    #[test]
    fn test_validation_limits() {
        let config = Config {
            difficulty: 256,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            mining_workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(
            &path,
            "data_dir = \"/var/chain\"\nnode_id = \"7\"\ndifficulty = 10\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/chain"));
        assert_eq!(config.node_id.as_deref(), Some("7"));
        assert_eq!(config.difficulty, 10);
        // unspecified fields keep their defaults
        assert_eq!(config.nonce_limit, DEFAULT_NONCE_LIMIT);

        fs::write(&path, "difficulty = \"ten\"\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(BlockchainError::Config(_))
        ));
    }
}

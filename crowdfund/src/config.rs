use crate::error::{Error, Result};
use serde::*;
use serde_json::from_str;
use std::path::Path;

pub const DEFAULT_POLL_INTERVAL: u64 = 10;
pub const DEFAULT_STATE_REFRESH_INTERVAL: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub chain: Chain,
    pub http_listen: String,
    pub secret: String,
    pub storage: Storage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: Chain::default(),
            http_listen: "127.0.0.1:8080".to_string(),
            secret: String::new(),
            storage: Storage::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Chain {
    pub name: String,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    pub endpoint: String,
    pub opts: ChainOpts,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            name: "base".to_string(),
            chain_id: "8453".to_string(),
            endpoint: "https://mainnet.base.org".to_string(),
            opts: ChainOpts::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ChainOpts {
    pub factory: String,
    pub usdc: String,

    #[serde(rename = "gasLimit")]
    pub gas_limit: u64,

    /// leave empty to let the node price the transaction
    #[serde(rename = "gasPrice")]
    pub gas_price: Option<u64>,

    /// seconds between campaign re-reads
    #[serde(rename = "pollInterval")]
    pub poll_interval: u64,

    /// seconds between `updateCampaignState` pokes
    #[serde(rename = "stateRefreshInterval")]
    pub state_refresh_interval: u64,

    pub confirmations: usize,

    /// http request timeout, seconds
    pub timeout: u64,
}

impl Default for ChainOpts {
    fn default() -> Self {
        Self {
            factory: "0x0bD88C32D195DE9De26127704FCeB7458E0094f9".to_string(),
            usdc: "0x6B38Bc61C90F80F77F3A65B0EA470259e682951B".to_string(),
            gas_limit: 500_000,
            gas_price: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state_refresh_interval: DEFAULT_STATE_REFRESH_INTERVAL,
            confirmations: 1,
            timeout: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    File,
    Redis,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Storage {
    pub backend: Backend,
    /// directory for the file backend
    pub path: String,
    /// redis host for the redis backend
    pub redis: String,
    pub port: Option<u32>,
    pub db: Option<u8>,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            path: ".crowdfund".to_string(),
            redis: "127.0.0.1".to_string(),
            port: Some(6379),
            db: Some(0),
        }
    }
}

impl Config {
    pub fn parse_from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        use std::fs::read_to_string;
        let confstr = read_to_string(file)?;
        Self::parse_from_str(&confstr)
    }

    pub fn parse_from_str(confstr: &str) -> Result<Self> {
        let config: Self = from_str(confstr)?;
        if config.chain.opts.poll_interval == 0 {
            return Err(Error::InvalidConfig("pollInterval must be positive".to_string()));
        }
        Ok(config)
    }

    pub fn show() -> Result<String> {
        let de: Self = Default::default();
        Ok(serde_json::to_string_pretty(&de)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_takes_defaults() {
        let config = Config::parse_from_str(
            r#"{"chain": {"chainId": "84532", "opts": {"pollInterval": 30}}, "secret": "ab"}"#,
        )
        .unwrap();
        assert_eq!(config.chain.chain_id, "84532");
        assert_eq!(config.chain.name, "base");
        assert_eq!(config.chain.opts.poll_interval, 30);
        assert_eq!(config.chain.opts.state_refresh_interval, DEFAULT_STATE_REFRESH_INTERVAL);
        assert_eq!(config.storage.backend, Backend::File);
        assert_eq!(config.secret, "ab");
    }

    #[test]
    fn test_storage_backend_names() {
        let config = Config::parse_from_str(r#"{"storage": {"backend": "redis", "db": 3}}"#).unwrap();
        assert_eq!(config.storage.backend, Backend::Redis);
        assert_eq!(config.storage.db, Some(3));
        assert!(Config::parse_from_str(r#"{"storage": {"backend": "cookie"}}"#).is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let res = Config::parse_from_str(r#"{"chain": {"opts": {"pollInterval": 0}}}"#);
        assert!(matches!(res, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_show_round_trips() {
        let shown = Config::show().unwrap();
        let config = Config::parse_from_str(&shown).unwrap();
        assert_eq!(config.http_listen, "127.0.0.1:8080");
    }
}

use crate::backfill::{BackfillOptions, DEFAULT_SAVE_INTERVAL};
use crate::classify::BotRules;
use crate::merge::InvalidAddressPolicy;
use crate::rpc::BlockHeight;
use crate::CensusError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://rpc.ankr.com/eth";
pub const DEFAULT_TRANSCRIPT_URL: &str = "https://seq.ceremony.ethereum.org/info/current_state";
/// The first proof-of-stake block. All account state is read here.
pub const DEFAULT_BLOCK: BlockHeight = BlockHeight(0xED14F1);

/// Runtime settings for ingestion and backfill
#[derive(Debug, Clone)]
pub struct CensusConfig {
    pub dataset_path: PathBuf,
    pub transcript_path: PathBuf,
    pub transcript_url: String,
    pub rpc_url: String,
    pub block: BlockHeight,
    pub save_interval: usize,
    pub request_delay: Duration,
    pub http_timeout: Duration,
    pub invalid_address_policy: InvalidAddressPolicy,
    pub bot_rules: BotRules,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("participants.bin"),
            transcript_path: PathBuf::from("transcript.json"),
            transcript_url: DEFAULT_TRANSCRIPT_URL.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            block: DEFAULT_BLOCK,
            save_interval: DEFAULT_SAVE_INTERVAL,
            request_delay: Duration::ZERO,
            http_timeout: Duration::from_secs(30),
            invalid_address_policy: InvalidAddressPolicy::default(),
            bot_rules: BotRules::default(),
        }
    }
}

impl CensusConfig {
    /// Defaults overlaid with `CENSUS_*` variables (a `.env` file is read first).
    pub fn from_env() -> Result<Self, CensusError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup. Empty values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CensusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("CENSUS_DATASET_PATH") {
            config.dataset_path = PathBuf::from(v);
        }
        if let Some(v) = get("CENSUS_TRANSCRIPT_PATH") {
            config.transcript_path = PathBuf::from(v);
        }
        if let Some(v) = get("CENSUS_TRANSCRIPT_URL") {
            config.transcript_url = v;
        }
        if let Some(v) = get("CENSUS_RPC_URL") {
            config.rpc_url = v;
        }
        if let Some(v) = get("CENSUS_BLOCK") {
            config.block = v.parse()?;
        }
        if let Some(v) = get("CENSUS_SAVE_INTERVAL") {
            config.save_interval = parse_number("CENSUS_SAVE_INTERVAL", &v)?;
        }
        if let Some(v) = get("CENSUS_REQUEST_DELAY_MS") {
            let ms = parse_number("CENSUS_REQUEST_DELAY_MS", &v)?;
            config.request_delay = Duration::from_millis(ms);
        }
        if let Some(v) = get("CENSUS_HTTP_TIMEOUT_SECS") {
            let secs = parse_number("CENSUS_HTTP_TIMEOUT_SECS", &v)?;
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("CENSUS_INVALID_ADDRESS_POLICY") {
            config.invalid_address_policy = v.parse()?;
        }
        if let Some(v) = get("CENSUS_TRIVIAL_PUBKEY") {
            config.bot_rules = BotRules::new(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CensusError> {
        if self.save_interval == 0 {
            return Err(CensusError::Config("save interval must be at least 1".to_string()));
        }
        if self.rpc_url.is_empty() {
            return Err(CensusError::Config("rpc url is empty".to_string()));
        }
        Ok(())
    }

    pub fn backfill_options(&self) -> BackfillOptions {
        BackfillOptions {
            block: self.block,
            save_interval: self.save_interval,
            request_delay: self.request_delay,
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, CensusError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| CensusError::Config(format!("{}={:?}: {}", key, value, e)))
}

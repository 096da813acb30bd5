use alloy::primitives::{address, Address};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Token deployments and bonding status
/// - Router trades
/// - Wallet labels
/// - Scan checkpoints
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_schema_path")]
    pub schema_path: String,
}

fn default_pool_size() -> usize {
    16
}

fn default_schema_path() -> String {
    "schema/postgres.sql".to_string()
}

/// JSON-RPC endpoint and request policy configuration.
///
/// Premium endpoints (Ankr key, Alchemy URL) are tried before the public list.
#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub ankr_api_key: Option<String>,
    #[serde(default)]
    pub alchemy_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Maximum requests per window, 0 disables the budget
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            ankr_api_key: None,
            alchemy_url: None,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
        }
    }
}

impl RpcSettings {
    /// Ordered endpoint list: premium endpoints first, then the configured ones.
    /// Blank entries and duplicates are dropped.
    pub fn endpoint_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::with_capacity(self.endpoints.len() + 2);

        if let Some(key) = self.ankr_api_key.as_deref().map(str::trim) {
            if !key.is_empty() {
                urls.push(format!("https://rpc.ankr.com/avalanche/{}", key));
            }
        }
        if let Some(url) = self.alchemy_url.as_deref().map(str::trim) {
            if !url.is_empty() {
                urls.push(url.to_string());
            }
        }

        for url in &self.endpoints {
            let url = url.trim();
            if !url.is_empty() && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }

        urls
    }
}

fn default_endpoints() -> Vec<String> {
    vec![
        "https://api.avax.network/ext/bc/C/rpc".to_string(),
        "https://avalanche-c-chain.publicnode.com".to_string(),
        "https://ava-mainnet.public.blastapi.io/ext/bc/C/rpc".to_string(),
        "https://rpc.ankr.com/avalanche".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

fn default_requests_per_window() -> u32 {
    1_800 // Stays under the 2048 req/min public endpoint limit
}

fn default_window_secs() -> u64 {
    60
}

/// Router trade scanner configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ScannerSettings {
    /// Router contracts whose transfers count as trade legs (ParaSwap Augustus)
    #[serde(default = "default_routers")]
    pub routers: Vec<Address>,
    /// First block scanned when no checkpoint exists
    #[serde(default = "default_trades_start_block")]
    pub start_block: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_checkpoint_interval_chunks")]
    pub checkpoint_interval_chunks: usize,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    /// Blocks behind head left unscanned
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_backfill_workers")]
    pub backfill_workers: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            routers: default_routers(),
            start_block: default_trades_start_block(),
            chunk_size: default_chunk_size(),
            checkpoint_interval_chunks: default_checkpoint_interval_chunks(),
            chunk_delay_ms: default_chunk_delay_ms(),
            confirmations: 0,
            poll_interval_secs: default_poll_interval_secs(),
            backfill_workers: default_backfill_workers(),
        }
    }
}

fn default_routers() -> Vec<Address> {
    vec![
        address!("0x6a000f20005980200259b80c5102003040001068"), // AugustusV6
        address!("0xdef171fe48cf0115b1d80b88dc8eab59176fee57"), // AugustusSwapper
    ]
}

fn default_trades_start_block() -> u64 {
    61_473_123
}

fn default_chunk_size() -> u64 {
    2_000
}

fn default_checkpoint_interval_chunks() -> usize {
    50
}

fn default_chunk_delay_ms() -> u64 {
    100
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_backfill_workers() -> usize {
    4
}

/// Arena token-manager deployment scanner configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct DeploymentSettings {
    #[serde(default = "default_token_manager")]
    pub token_manager: Address,
    #[serde(default = "default_deployments_start_block")]
    pub start_block: u64,
    #[serde(default = "default_deployment_chunk_size")]
    pub chunk_size: u64,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            token_manager: default_token_manager(),
            start_block: default_deployments_start_block(),
            chunk_size: default_deployment_chunk_size(),
        }
    }
}

fn default_token_manager() -> Address {
    address!("0x8315f1eb449dd4b779495c3a0b05e5d194446c6e")
}

fn default_deployments_start_block() -> u64 {
    63_418_307
}

fn default_deployment_chunk_size() -> u64 {
    1_000
}

/// Bonding (DEX migration) tracker configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct BondingSettings {
    #[serde(default = "default_factory")]
    pub factory: Address,
    #[serde(default = "default_wrapped_native")]
    pub wrapped_native: Address,
    #[serde(default = "default_blocks_back")]
    pub blocks_back: u64,
    #[serde(default = "default_hours_back")]
    pub hours_back: i64,
    #[serde(default = "default_bonding_interval_secs")]
    pub interval_secs: u64,
}

impl Default for BondingSettings {
    fn default() -> Self {
        Self {
            factory: default_factory(),
            wrapped_native: default_wrapped_native(),
            blocks_back: default_blocks_back(),
            hours_back: default_hours_back(),
            interval_secs: default_bonding_interval_secs(),
        }
    }
}

fn default_factory() -> Address {
    address!("0xf16784dcaf838a3e16bef7711a62d12413c39bd1")
}

fn default_wrapped_native() -> Address {
    address!("0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7") // WAVAX
}

fn default_blocks_back() -> u64 {
    2_000
}

fn default_hours_back() -> i64 {
    24
}

fn default_bonding_interval_secs() -> u64 {
    600
}

/// Aggregation job configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StatsSettings {
    #[serde(default = "default_stats_interval_secs")]
    pub interval_secs: u64,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval_secs(),
        }
    }
}

fn default_stats_interval_secs() -> u64 {
    900
}

/// Root application configuration.
///
/// Loaded from `config.yaml` (or the path given on the command line) and
/// overridden by `ARENA__SECTION__KEY` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub rpc: RpcSettings,
    #[serde(default)]
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub deployments: DeploymentSettings,
    #[serde(default)]
    pub bonding: BondingSettings,
    #[serde(default)]
    pub stats: StatsSettings,
}

impl Settings {
    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("ARENA")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rpc.endpoints")
                    .with_list_parse_key("scanner.routers")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.chunk_size == 0 || self.deployments.chunk_size == 0 {
            return Err(ConfigError::Message("chunk_size must be at least 1".into()));
        }
        if self.rpc.max_attempts == 0 {
            return Err(ConfigError::Message("rpc.max_attempts must be at least 1".into()));
        }
        if self.rpc.endpoint_urls().is_empty() {
            return Err(ConfigError::Message("no RPC endpoint configured".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml(yaml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("valid settings")
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let settings = from_yaml(
            r#"
postgres:
  host: localhost
  port: 5432
  user: arena
  password: secret
  database: arena
"#,
        );

        assert_eq!(settings.postgres.pool_size, 16);
        assert_eq!(settings.scanner.chunk_size, 2_000);
        assert_eq!(settings.scanner.checkpoint_interval_chunks, 50);
        assert_eq!(settings.scanner.start_block, 61_473_123);
        assert_eq!(settings.deployments.start_block, 63_418_307);
        assert_eq!(settings.scanner.routers.len(), 2);
        assert_eq!(settings.rpc.requests_per_window, 1_800);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_addresses_parse_from_hex() {
        let settings = from_yaml(
            r#"
postgres: { host: h, port: 1, user: u, password: p, database: d }
scanner:
  routers: ["0x6A000F20005980200259B80c5102003040001068"]
bonding:
  wrapped_native: "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"
"#,
        );

        assert_eq!(
            settings.scanner.routers,
            vec![address!("0x6a000f20005980200259b80c5102003040001068")]
        );
        assert_eq!(
            settings.bonding.wrapped_native,
            address!("0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7")
        );
    }

    #[test]
    fn test_premium_endpoints_come_first() {
        let rpc = RpcSettings {
            endpoints: vec![
                "https://public.example/rpc".to_string(),
                " ".to_string(),
                "https://alchemy.example/v2/key".to_string(),
            ],
            ankr_api_key: Some("abc".to_string()),
            alchemy_url: Some("https://alchemy.example/v2/key".to_string()),
            ..Default::default()
        };

        assert_eq!(
            rpc.endpoint_urls(),
            vec![
                "https://rpc.ankr.com/avalanche/abc".to_string(),
                "https://alchemy.example/v2/key".to_string(),
                "https://public.example/rpc".to_string(),
            ]
        );
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let mut settings = from_yaml(
            r#"
postgres: { host: h, port: 1, user: u, password: p, database: d }
"#,
        );
        settings.scanner.chunk_size = 0;
        assert!(settings.validate().is_err());
    }
}

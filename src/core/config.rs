use crate::core::cache::DEFAULT_HOLDINGS_CACHE_DURATION;
use crate::providers::ServiceOptions;
use crate::providers::eastmoney::EastmoneyUrls;
use crate::providers::tencent::DEFAULT_TENCENT_URL;
use crate::transport::LoaderOptions;
use crate::transport::limiter::DEFAULT_CONCURRENCY;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_BENCHMARK: &str = "000300";

/// A tracked fund position.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FundPosition {
    pub code: String,
    /// Amount currently held, in CNY.
    #[serde(default)]
    pub amount: f64,
    pub cost_price: Option<f64>,
    /// Profit already made on the position; used to derive a cost price when
    /// none is configured.
    pub existing_profit: Option<f64>,
    #[serde(default)]
    pub show_holdings: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TencentProviderConfig {
    pub base_url: String,
}

impl Default for TencentProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TENCENT_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub eastmoney: EastmoneyUrls,
    #[serde(default)]
    pub tencent: TencentProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RequestsConfig {
    pub timeout_ms: u64,
    pub min_interval_ms: u64,
    pub max_concurrent: usize,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 7000,
            min_interval_ms: 200,
            max_concurrent: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub holdings_days: u64,
    pub history_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            holdings_days: DEFAULT_HOLDINGS_CACHE_DURATION.as_secs() / 86_400,
            history_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub funds: Vec<FundPosition>,
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub requests: RequestsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub data_path: Option<String>,
}

fn default_benchmark() -> String {
    DEFAULT_BENCHMARK.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            funds: Vec::new(),
            benchmark: default_benchmark(),
            providers: ProvidersConfig::default(),
            requests: RequestsConfig::default(),
            cache: CacheConfig::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "fundpulse", "fundpulse")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!(funds = config.funds.len(), "Successfully loaded config");
        Ok(config)
    }

    /// Settings for the fetch layer derived from this configuration.
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            eastmoney: self.providers.eastmoney.clone(),
            tencent_url: self.providers.tencent.base_url.clone(),
            loader: LoaderOptions {
                timeout: Duration::from_millis(self.requests.timeout_ms),
                min_interval: Duration::from_millis(self.requests.min_interval_ms),
            },
            holdings_cache_duration: Duration::from_secs(
                self.cache.holdings_days.saturating_mul(86_400),
            ),
            history_lifetime: Duration::from_secs(self.cache.history_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
funds:
  - code: "000001"
    amount: 10000
    cost_price: 1.05
    show_holdings: true
  - code: "161725"
    amount: 5000.5
    existing_profit: -120.3
benchmark: "000905"
requests:
  timeout_ms: 3000
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.funds.len(), 2);
        assert_eq!(config.funds[0].code, "000001");
        assert_eq!(config.funds[0].amount, 10000.0);
        assert_eq!(config.funds[0].cost_price, Some(1.05));
        assert!(config.funds[0].show_holdings);
        assert_eq!(config.funds[1].existing_profit, Some(-120.3));
        assert!(!config.funds[1].show_holdings);
        assert_eq!(config.benchmark, "000905");

        assert_eq!(config.requests.timeout_ms, 3000);
        assert_eq!(config.requests.min_interval_ms, 200);
        assert_eq!(config.requests.max_concurrent, 10);
        assert_eq!(config.cache.holdings_days, 7);
        assert_eq!(config.providers.tencent.base_url, DEFAULT_TENCENT_URL);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.funds.is_empty());
        assert_eq!(config.benchmark, DEFAULT_BENCHMARK);

        let options = config.service_options();
        assert_eq!(options.loader.timeout, Duration::from_millis(7000));
        assert_eq!(options.loader.min_interval, Duration::from_millis(200));
        assert_eq!(options.holdings_cache_duration, DEFAULT_HOLDINGS_CACHE_DURATION);
        assert_eq!(options.history_lifetime, Duration::from_secs(300));
        assert_eq!(options.eastmoney, EastmoneyUrls::default());
    }

    #[test]
    fn test_provider_overrides() {
        let yaml_str = r#"
providers:
  eastmoney:
    realtime_url: "http://localhost:1234"
  tencent:
    base_url: "http://localhost:5678"
data_path: "/tmp/fundpulse"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        let options = config.service_options();
        assert_eq!(options.eastmoney.realtime_url, "http://localhost:1234");
        assert_eq!(
            options.eastmoney.fund_url,
            crate::providers::eastmoney::DEFAULT_FUND_URL
        );
        assert_eq!(options.tencent_url, "http://localhost:5678");
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/fundpulse")
        );
    }

    #[test]
    fn test_huge_holdings_days_saturates() {
        let config: AppConfig = serde_yaml::from_str("cache:\n  holdings_days: 18446744073709551615\n").unwrap();
        let options = config.service_options();
        assert_eq!(options.holdings_cache_duration, Duration::from_secs(u64::MAX));
    }
}

//! Configuration module for txflow
//!
//! This module handles configuration loading from TOML files and
//! environment variables, and provides structured configuration types.

use anyhow::{bail, Context};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::resolver::DerivedState;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gas estimation policy
    #[serde(default)]
    pub estimation: EstimationConfig,

    /// Submission parameters
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// Simulated ledger used by the CLI
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Session event loop sizing
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Multiplicative safety buffer applied to the raw gas estimate
    #[serde(default = "default_gas_buffer_factor")]
    pub gas_buffer_factor: f64,

    /// Node error code meaning "execution would revert due to balance"
    #[serde(default = "default_revert_error_code")]
    pub revert_error_code: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Gas price (gwei) used until the user picks one
    #[serde(default = "default_gas_price_gwei")]
    pub default_gas_price_gwei: Decimal,

    /// Log a "still pending" warning at this interval while waiting for confirmation
    #[serde(default)]
    pub pending_warn_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Base gas per method, keyed as `Contract.method`
    #[serde(default = "default_base_gas")]
    pub base_gas: BTreeMap<String, u64>,

    /// Base gas for methods missing from `base_gas`
    #[serde(default = "default_fallback_gas")]
    pub fallback_gas: u64,

    /// Additional gas per migrated escrow entry
    #[serde(default = "default_gas_per_entry")]
    pub gas_per_entry: u64,

    /// Simulated round-trip latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,

    /// Confirm submitted transactions automatically after this delay
    #[serde(default = "default_auto_confirm_after_ms")]
    pub auto_confirm_after_ms: Option<u64>,

    /// When set, auto-resolution fails transactions with this reason instead
    #[serde(default)]
    pub failure_reason: Option<String>,

    /// Derived on-chain state the simulated session starts from
    #[serde(default)]
    pub derived: DerivedState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the lifecycle event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Capacity of the command channel
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,

    /// Explicit `EnvFilter` directive; `RUST_LOG` still wins
    #[serde(default)]
    pub filter: Option<String>,
}

// Default value functions
fn default_gas_buffer_factor() -> f64 { 1.2 }
fn default_revert_error_code() -> i64 { -32603 }
fn default_gas_price_gwei() -> Decimal { Decimal::ONE }
fn default_fallback_gas() -> u64 { 200_000 }
fn default_gas_per_entry() -> u64 { 25_000 }
fn default_auto_confirm_after_ms() -> Option<u64> { Some(1_500) }
fn default_event_capacity() -> usize { 256 }
fn default_command_buffer() -> usize { 64 }

fn default_base_gas() -> BTreeMap<String, u64> {
    BTreeMap::from([
        ("Synthetix.issueSynths".to_string(), 410_000),
        ("Synthetix.issueMaxSynths".to_string(), 430_000),
        ("SynthetixBridgeToOptimism.deposit".to_string(), 180_000),
        ("SynthetixBridgeToOptimism.initiateEscrowMigration".to_string(), 120_000),
    ])
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            gas_buffer_factor: default_gas_buffer_factor(),
            revert_error_code: default_revert_error_code(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            default_gas_price_gwei: default_gas_price_gwei(),
            pending_warn_after_secs: None,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_gas: default_base_gas(),
            fallback_gas: default_fallback_gas(),
            gas_per_entry: default_gas_per_entry(),
            latency_ms: 0,
            auto_confirm_after_ms: default_auto_confirm_after_ms(),
            failure_reason: None,
            derived: DerivedState::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` and `TXFLOW_*` environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `TXFLOW_*` environment variables on top of the loaded values
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("TXFLOW_GAS_BUFFER_FACTOR") {
            self.estimation.gas_buffer_factor = v
                .parse()
                .with_context(|| format!("TXFLOW_GAS_BUFFER_FACTOR is not a number: {}", v))?;
        }
        if let Ok(v) = std::env::var("TXFLOW_REVERT_ERROR_CODE") {
            self.estimation.revert_error_code = v
                .parse()
                .with_context(|| format!("TXFLOW_REVERT_ERROR_CODE is not an integer: {}", v))?;
        }
        if let Ok(v) = std::env::var("TXFLOW_GAS_PRICE_GWEI") {
            self.submission.default_gas_price_gwei = v
                .parse()
                .with_context(|| format!("TXFLOW_GAS_PRICE_GWEI is not a decimal: {}", v))?;
        }
        if let Ok(v) = std::env::var("TXFLOW_LOG_JSON") {
            self.logging.json = matches!(v.as_str(), "1" | "true" | "yes");
        }
        self.validate()
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        let factor = self.estimation.gas_buffer_factor;
        if !factor.is_finite() || factor < 1.0 {
            bail!("estimation.gas_buffer_factor must be >= 1.0 (got {})", factor);
        }
        if self.submission.default_gas_price_gwei.is_sign_negative() {
            bail!(
                "submission.default_gas_price_gwei must not be negative (got {})",
                self.submission.default_gas_price_gwei
            );
        }
        if self.submission.pending_warn_after_secs == Some(0) {
            bail!("submission.pending_warn_after_secs must be greater than zero when set");
        }
        if self.session.event_capacity == 0 || self.session.command_buffer == 0 {
            bail!("session channel capacities must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.estimation.gas_buffer_factor, 1.2);
        assert_eq!(config.estimation.revert_error_code, -32603);
        assert_eq!(config.submission.default_gas_price_gwei, Decimal::ONE);
        assert!(config.simulation.base_gas.contains_key("Synthetix.issueSynths"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[estimation]
gas_buffer_factor = 1.5

[submission]
default_gas_price_gwei = "30"
pending_warn_after_secs = 60
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.estimation.gas_buffer_factor, 1.5);
        assert_eq!(config.estimation.revert_error_code, -32603);
        assert_eq!(config.submission.default_gas_price_gwei, Decimal::from(30));
        assert_eq!(config.submission.pending_warn_after_secs, Some(60));
        assert_eq!(config.session.event_capacity, 256);
    }

    // Single test so no other test observes the TXFLOW_* variables mid-flight
    #[test]
    fn test_env_overrides_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[estimation]
gas_buffer_factor = 1.5

[submission]
default_gas_price_gwei = "30"
"#
        )
        .unwrap();

        std::env::set_var("TXFLOW_GAS_PRICE_GWEI", "42.5");
        std::env::set_var("TXFLOW_REVERT_ERROR_CODE", "-32000");
        std::env::set_var("TXFLOW_LOG_JSON", "true");
        let config = Config::from_file_with_env(file.path());
        std::env::remove_var("TXFLOW_GAS_PRICE_GWEI");
        std::env::remove_var("TXFLOW_REVERT_ERROR_CODE");
        std::env::remove_var("TXFLOW_LOG_JSON");

        let config = config.unwrap();
        assert_eq!(config.estimation.gas_buffer_factor, 1.5);
        assert_eq!(config.estimation.revert_error_code, -32000);
        assert_eq!(config.submission.default_gas_price_gwei, Decimal::new(425, 1));
        assert!(config.logging.json);

        std::env::set_var("TXFLOW_GAS_BUFFER_FACTOR", "lots");
        let err = Config::from_file_with_env(file.path()).unwrap_err();
        std::env::set_var("TXFLOW_GAS_BUFFER_FACTOR", "0.5");
        let below_one = Config::default().apply_env_overrides();
        std::env::remove_var("TXFLOW_GAS_BUFFER_FACTOR");

        assert!(err.to_string().contains("TXFLOW_GAS_BUFFER_FACTOR is not a number"));
        assert!(below_one.is_err());
    }

    #[test]
    fn test_rejects_shrinking_buffer() {
        let mut config = Config::default();
        config.estimation.gas_buffer_factor = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_state_table() {
        let config: Config = toml::from_str(
            r#"
[simulation.derived]
unstaked_collateral = "100"
target_c_ratio = "0.25"
collateral_rate = "2"

[simulation.derived.escrow]
claimable_entry_ids_in_chunk = [[1, 2], [3]]
"#,
        )
        .unwrap();

        let derived = &config.simulation.derived;
        assert_eq!(derived.unstaked_collateral, Decimal::from(100));
        assert_eq!(derived.transferable_collateral, Decimal::ZERO);
        assert_eq!(derived.escrow.as_ref().unwrap().entry_count(), 3);
        assert_eq!(config.simulation.fallback_gas, 200_000);
    }

    #[test]
    fn test_zero_pending_interval_rejected() {
        let mut config = Config::default();
        config.submission.pending_warn_after_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

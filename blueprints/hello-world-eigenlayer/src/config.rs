//! Command line flags and the operator's TOML configuration.
//!
//! The six flat keys (`provider`, `private_key` and the four contract addresses) may each
//! be overridden by an upper-case environment variable of the same name. The optional
//! `[monitor]`, `[transactions]` and `[responder]` tables tune timing and failure handling.

use crate::constants::{
    DEFAULT_CONFIG_PATH, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_RECEIPT_POLL_INTERVAL,
    DEFAULT_RETRY_BACKOFF, DEFAULT_RPC_TIMEOUT,
};
use crate::context::ContractAddresses;
use crate::identity::{Identity, IdentityError};
use crate::monitor::MonitorConfig;
use crate::queue::Backpressure;
use crate::responder::ResponsePolicy;
use crate::tx::TxPolicy;
use alloy_primitives::Address;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, clap::Parser)]
#[command(
    name = "hello-world-operator",
    about = "Registers an operator with the Hello World AVS and answers its tasks"
)]
pub struct OperatorCli {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', env = "OPERATOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Whether to use pretty logging
    #[arg(long)]
    pub pretty: bool,
    /// Start monitoring right away, for an operator that is already registered
    #[arg(long, env = "SKIP_REGISTRATION")]
    pub skip_registration: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(
        "Missing required setting `{key}` (set it in the config file or as {})",
        .key.to_ascii_uppercase()
    )]
    MissingKey { key: &'static str },
    #[error("Invalid URL for `{key}`: {reason}")]
    InvalidUrl { key: &'static str, reason: String },
    #[error("Invalid address for `{key}`: {reason}")]
    InvalidAddress { key: &'static str, reason: String },
    #[error("Invalid value for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    provider: Option<String>,
    private_key: Option<String>,
    contract_address: Option<String>,
    delegation_manager_address: Option<String>,
    stake_registry_address: Option<String>,
    avs_directory_address: Option<String>,
    #[serde(default)]
    monitor: RawMonitor,
    #[serde(default)]
    transactions: RawTransactions,
    #[serde(default)]
    responder: RawResponder,
}

#[derive(Debug, Default, Deserialize)]
struct RawMonitor {
    poll_interval_ms: Option<u64>,
    queue_capacity: Option<usize>,
    backpressure: Option<Backpressure>,
    start_block: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTransactions {
    rpc_timeout_ms: Option<u64>,
    receipt_poll_interval_ms: Option<u64>,
    confirmation_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResponder {
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

/// Fully validated operator settings.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub provider: Url,
    pub identity: Identity,
    pub addresses: ContractAddresses,
    pub monitor: MonitorConfig,
    pub transactions: TxPolicy,
    pub responder: ResponsePolicy,
}

impl OperatorConfig {
    /// Loads `path`, overlaid with the process environment.
    ///
    /// # Errors
    /// See [`OperatorConfig::load_with_env`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// # Errors
    /// - [`ConfigError::Read`] if the file is missing or cannot be read
    /// - see [`OperatorConfig::from_toml_with_env`]
    pub fn load_with_env<E>(path: &Path, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_with_env(&contents, env)
    }

    /// Parses `contents` and applies overrides returned by `env` for the flat keys.
    ///
    /// # Errors
    /// - [`ConfigError::Parse`] if `contents` is not valid TOML of the expected shape
    /// - [`ConfigError::MissingKey`] if a required key is set nowhere
    /// - [`ConfigError::InvalidUrl`], [`ConfigError::InvalidAddress`] or
    ///   [`ConfigError::Identity`] for malformed values
    /// - [`ConfigError::InvalidValue`] for zero intervals or zero attempts
    pub fn from_toml_with_env<E>(contents: &str, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(contents)?;
        let setting = |key: &'static str, file: Option<String>| {
            env(key.to_ascii_uppercase().as_str())
                .filter(|value| !value.trim().is_empty())
                .or(file)
                .ok_or(ConfigError::MissingKey { key })
        };

        let provider = setting("provider", raw.provider)?;
        let provider = Url::parse(provider.trim()).map_err(|e| ConfigError::InvalidUrl {
            key: "provider",
            reason: e.to_string(),
        })?;
        let identity = Identity::from_hex(&setting("private_key", raw.private_key)?)?;

        let addresses = ContractAddresses {
            service_manager: address(
                "contract_address",
                &setting("contract_address", raw.contract_address)?,
            )?,
            delegation_manager: address(
                "delegation_manager_address",
                &setting("delegation_manager_address", raw.delegation_manager_address)?,
            )?,
            stake_registry: address(
                "stake_registry_address",
                &setting("stake_registry_address", raw.stake_registry_address)?,
            )?,
            avs_directory: address(
                "avs_directory_address",
                &setting("avs_directory_address", raw.avs_directory_address)?,
            )?,
        };

        let transactions = TxPolicy {
            rpc_timeout: millis(
                "transactions.rpc_timeout_ms",
                raw.transactions.rpc_timeout_ms,
                DEFAULT_RPC_TIMEOUT,
            )?,
            receipt_poll_interval: millis(
                "transactions.receipt_poll_interval_ms",
                raw.transactions.receipt_poll_interval_ms,
                DEFAULT_RECEIPT_POLL_INTERVAL,
            )?,
            confirmation_timeout: millis(
                "transactions.confirmation_timeout_ms",
                raw.transactions.confirmation_timeout_ms,
                DEFAULT_CONFIRMATION_TIMEOUT,
            )?,
        };

        let monitor = MonitorConfig {
            poll_interval: millis(
                "monitor.poll_interval_ms",
                raw.monitor.poll_interval_ms,
                DEFAULT_POLL_INTERVAL,
            )?,
            rpc_timeout: transactions.rpc_timeout,
            queue_capacity: match raw.monitor.queue_capacity {
                Some(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "monitor.queue_capacity",
                        reason: "must hold at least one task",
                    })
                }
                capacity => capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            },
            backpressure: raw.monitor.backpressure.unwrap_or_default(),
            start_block: raw.monitor.start_block.unwrap_or(0),
        };

        let responder = ResponsePolicy {
            max_attempts: match raw.responder.max_attempts {
                Some(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "responder.max_attempts",
                        reason: "must allow at least one attempt",
                    })
                }
                attempts => attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            },
            retry_backoff: raw
                .responder
                .retry_backoff_ms
                .map_or(DEFAULT_RETRY_BACKOFF, Duration::from_millis),
        };

        Ok(Self {
            provider,
            identity,
            addresses,
            monitor,
            transactions,
            responder,
        })
    }
}

fn address(key: &'static str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim()).map_err(|e| ConfigError::InvalidAddress {
        key,
        reason: e.to_string(),
    })
}

fn millis(
    key: &'static str,
    value: Option<u64>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::InvalidValue {
            key,
            reason: "must be greater than zero",
        }),
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => Ok(default),
    }
}

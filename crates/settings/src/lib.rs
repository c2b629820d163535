//! Environment-driven configuration.
//!
//! All credentials are supplied externally. A missing required variable is
//! a startup-time fatal condition for the data layer, never a per-request
//! error; `--mock` runs bypass this module entirely.

use std::env;

use thiserror::Error;

use meritdrop_core::Address;

pub const ENV_SOURCE_URL: &str = "MERITDROP_SOURCE_URL";
pub const ENV_SOURCE_API_KEY: &str = "MERITDROP_SOURCE_API_KEY";
pub const ENV_CACHE_REST_URL: &str = "MERITDROP_CACHE_REST_URL";
pub const ENV_CACHE_REST_TOKEN: &str = "MERITDROP_CACHE_REST_TOKEN";
pub const ENV_RPC_URL: &str = "MERITDROP_RPC_URL";
pub const ENV_OPERATOR: &str = "MERITDROP_OPERATOR";
pub const ENV_DISBURSE_CONTRACT: &str = "MERITDROP_DISBURSE_CONTRACT";
pub const ENV_LISTEN_ADDR: &str = "MERITDROP_LISTEN_ADDR";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: SourceSettings,
    pub cache: CacheSettings,
    pub chain: ChainSettings,
    pub listen_addr: String,
}

/// Scoring-provider API access.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: String,
    pub api_key: String,
}

/// REST cache tier access.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub rest_url: String,
    pub rest_token: String,
}

/// Chain access for the disbursement flow.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub operator: Address,
    pub disburse_contract: Address,
}

impl Settings {
    /// Read the full configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            source: SourceSettings {
                base_url: require(ENV_SOURCE_URL)?,
                api_key: require(ENV_SOURCE_API_KEY)?,
            },
            cache: CacheSettings {
                rest_url: require(ENV_CACHE_REST_URL)?,
                rest_token: require(ENV_CACHE_REST_TOKEN)?,
            },
            chain: ChainSettings {
                rpc_url: require(ENV_RPC_URL)?,
                operator: require_address(ENV_OPERATOR)?,
                disburse_contract: require_address(ENV_DISBURSE_CONTRACT)?,
            },
            listen_addr: env::var(ENV_LISTEN_ADDR)
                .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string()),
        })
    }
}

fn require(var: &'static str) -> Result<String> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SettingsError::Missing(var)),
    }
}

fn require_address(var: &'static str) -> Result<Address> {
    require(var)?
        .parse()
        .map_err(|e: meritdrop_core::AddressParseError| SettingsError::Invalid {
            var,
            reason: e.to_string(),
        })
}

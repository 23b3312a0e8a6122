//! Reading protocol parameters from layered configuration

use config::{Config, ConfigError};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::protocol_params::ProtocolParams;

pub const CONFIG_KEY_MIN_FEE_A: &str = "protocol.min-fee-a";
pub const CONFIG_KEY_MIN_FEE_B: &str = "protocol.min-fee-b";
pub const CONFIG_KEY_MIN_UTXO: &str = "protocol.min-utxo";
pub const CONFIG_KEY_MAX_TX_SIZE: &str = "protocol.max-tx-size";
pub const CONFIG_KEY_NETWORK: &str = "protocol.network";

/// Read `key`, falling back to `default` when it is absent or cannot be parsed
pub fn get_or_default<T: DeserializeOwned>(config: &Config, key: &str, default: T) -> T {
    match config.get::<T>(key) {
        Ok(value) => value,
        Err(ConfigError::NotFound(_)) => default,
        Err(e) => {
            warn!("Ignoring unreadable configuration {key}: {e}");
            default
        }
    }
}

impl ProtocolParams {
    /// Missing or unreadable keys fall back to mainnet defaults
    pub fn from_config(config: &Config) -> Self {
        let defaults = ProtocolParams::default();
        Self {
            min_fee_a: get_or_default(config, CONFIG_KEY_MIN_FEE_A, defaults.min_fee_a),
            min_fee_b: get_or_default(config, CONFIG_KEY_MIN_FEE_B, defaults.min_fee_b),
            min_utxo_lovelace: get_or_default(
                config,
                CONFIG_KEY_MIN_UTXO,
                defaults.min_utxo_lovelace,
            ),
            max_tx_size: get_or_default(config, CONFIG_KEY_MAX_TX_SIZE, defaults.max_tx_size),
            network: get_or_default(config, CONFIG_KEY_NETWORK, defaults.network),
        }
    }
}

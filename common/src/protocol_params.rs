//! Ledger parameters the builder needs: the linear fee model, the minimum output value and the
//! size ceiling

use crate::{address::AddressNetwork, Lovelace};

/// Mainnet per-byte fee coefficient
pub const MAINNET_MIN_FEE_A: u64 = 44;

/// Mainnet constant fee term
pub const MAINNET_MIN_FEE_B: u64 = 155_381;

pub const DEFAULT_MIN_UTXO_LOVELACE: Lovelace = 1_000_000;

pub const DEFAULT_MAX_TX_SIZE: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProtocolParams {
    /// Lovelace per encoded byte
    pub min_fee_a: u64,

    /// Lovelace per transaction
    pub min_fee_b: u64,

    /// Smallest lovelace amount a change output may carry
    pub min_utxo_lovelace: Lovelace,

    /// Largest encoded transaction accepted, in bytes
    pub max_tx_size: usize,

    pub network: AddressNetwork,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_fee_a: MAINNET_MIN_FEE_A,
            min_fee_b: MAINNET_MIN_FEE_B,
            min_utxo_lovelace: DEFAULT_MIN_UTXO_LOVELACE,
            max_tx_size: DEFAULT_MAX_TX_SIZE,
            network: AddressNetwork::Main,
        }
    }
}

impl ProtocolParams {
    /// `min_fee_b + min_fee_a * size`, saturating
    pub fn linear_fee(&self, size: usize) -> Lovelace {
        self.min_fee_a.saturating_mul(size as u64).saturating_add(self.min_fee_b)
    }
}

//! Core ledger types shared by the codec and the builder

use crate::{address::Address, asset::Value, hash::TxHash};
use std::{fmt, str::FromStr};

pub type Lovelace = u64;
pub type Slot = u64;

/// Reference to a previously produced output
///
/// Ordered by `(tx_hash, output_index)`, which is the canonical input order of a body.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TxInput {
    pub tx_hash: TxHash,
    pub output_index: u64,
}

impl TxInput {
    pub fn new(tx_hash: TxHash, output_index: u64) -> Self {
        Self {
            tx_hash,
            output_index,
        }
    }
}

impl fmt::Display for TxInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.output_index)
    }
}

impl FromStr for TxInput {
    type Err = anyhow::Error;

    /// Parse `<tx hash hex>#<index>`
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (hash, index) =
            s.split_once('#').ok_or_else(|| anyhow::anyhow!("expected <hash>#<index>: {s}"))?;
        Ok(Self::new(hash.parse()?, index.parse()?))
    }
}

/// Output: an address and the value locked there
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
}

impl TxOutput {
    pub fn new(address: Address, value: Value) -> Self {
        Self { address, value }
    }
}

/// An input resolved to the output it spends
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Utxo {
    pub input: TxInput,
    pub output: TxOutput,
}

impl Utxo {
    pub fn new(input: TxInput, output: TxOutput) -> Self {
        Self { input, output }
    }

    pub fn value(&self) -> &Value {
        &self.output.value
    }
}

/// Slot range in which a transaction may be included
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidityInterval {
    /// First valid slot (body key 8)
    pub invalid_before: Option<Slot>,

    /// First slot at which the transaction is no longer valid (body key 3, the TTL)
    pub invalid_hereafter: Option<Slot>,
}

impl ValidityInterval {
    pub fn is_unbounded(&self) -> bool {
        self.invalid_before.is_none() && self.invalid_hereafter.is_none()
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.invalid_before.map_or(true, |start| slot >= start)
            && self.invalid_hereafter.map_or(true, |end| slot < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_order_by_hash_then_index() {
        let a = TxInput::new(TxHash::new([1; 32]), 5);
        let b = TxInput::new(TxHash::new([1; 32]), 7);
        let c = TxInput::new(TxHash::new([2; 32]), 0);
        let mut inputs = vec![c, b, a];
        inputs.sort();
        assert_eq!(inputs, vec![a, b, c]);
    }

    #[test]
    fn input_text_round_trip() {
        let input = TxInput::new(TxHash::new([0xab; 32]), 3);
        let parsed: TxInput = input.to_string().parse().unwrap();
        assert_eq!(parsed, input);
        assert!("abcd".parse::<TxInput>().is_err());
    }

    #[test]
    fn validity_interval_bounds() {
        let interval = ValidityInterval {
            invalid_before: Some(10),
            invalid_hereafter: Some(20),
        };
        assert!(!interval.contains(9));
        assert!(interval.contains(10));
        assert!(interval.contains(19));
        assert!(!interval.contains(20));
        assert!(ValidityInterval::default().contains(0));
    }
}

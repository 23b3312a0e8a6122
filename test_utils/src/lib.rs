//! Fixtures shared by the Loom test suites: deterministic keys, addresses and UTxO pools

use std::collections::BTreeMap;

use cryptoxide::ed25519;
use loom_common::{
    Address, AddressNetwork, AddrKeyhash, Hash, Signature, TxHash, TxInput, TxOutput, Utxo, VKey,
    Value,
};

/// An ed25519 key pair derived from a one-byte seed
#[derive(Clone)]
pub struct TestKey {
    secret: [u8; 64],
    pub vkey: VKey,
}

impl TestKey {
    pub fn new(seed: u8) -> Self {
        let (secret, public) = ed25519::keypair(&[seed; 32]);
        Self {
            secret,
            vkey: VKey::new(public),
        }
    }

    pub fn key_hash(&self) -> AddrKeyhash {
        self.vkey.key_hash()
    }

    /// Enterprise testnet address paying to this key
    pub fn address(&self) -> Address {
        Address::from_key_hash(AddressNetwork::Test, self.key_hash())
    }

    pub fn sign(&self, tx_id: &TxHash) -> Signature {
        Signature::new(ed25519::signature(tx_id.as_ref(), &self.secret))
    }

    pub fn witness(&self, tx_id: &TxHash) -> (VKey, Signature) {
        (self.vkey, self.sign(tx_id))
    }
}

pub fn tx_hash(n: u8) -> TxHash {
    Hash::new([n; 32])
}

pub fn utxo(hash: u8, index: u64, address: Address, value: Value) -> Utxo {
    Utxo::new(TxInput::new(tx_hash(hash), index), TxOutput::new(address, value))
}

/// Lovelace-only UTxO at `address`
pub fn ada_utxo(hash: u8, index: u64, address: Address, lovelace: u64) -> Utxo {
    utxo(hash, index, address, Value::lovelace(lovelace))
}

#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct UtxoJson {
    pub address: String,
    pub value: Value,
}

/// A spendable pool written as `{"<hash>#<index>": {"address": "...", "value": {...}}}`
pub fn pool_from_json(json: &str) -> Vec<Utxo> {
    let utxos: BTreeMap<String, UtxoJson> =
        serde_json::from_str(json).expect("invalid pool json");
    utxos
        .into_iter()
        .map(|(input, output)| {
            Utxo::new(
                input.parse().expect("invalid input reference"),
                TxOutput::new(
                    output.address.parse().expect("invalid address"),
                    output.value,
                ),
            )
        })
        .collect()
}

#[macro_export]
macro_rules! include_pool {
    ($filepath:expr) => {
        $crate::pool_from_json(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/data/",
            $filepath,
        )))
    };
}

//! The wallet a CLI run spends from: its change address and a file of its unspent outputs

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, Result};
use config::Config;
use loom_common::{Address, TxInput, TxOutput, Utxo, Value};
use serde::Deserialize;

const CONFIG_KEY_CHANGE_ADDRESS: &str = "wallet.change-address";
const CONFIG_KEY_UTXOS: &str = "wallet.utxos";

#[derive(Debug, Deserialize)]
struct OutputEntry {
    address: Address,
    value: Value,
}

pub struct Wallet {
    pub change_address: Address,
    pub utxos: Vec<Utxo>,
}

impl Wallet {
    /// Command-line values win over the `[wallet]` section
    pub fn load(
        config: &Config,
        change_address: Option<Address>,
        utxos: Option<PathBuf>,
    ) -> Result<Self> {
        let change_address = match change_address {
            Some(address) => address,
            None => config
                .get_string(CONFIG_KEY_CHANGE_ADDRESS)
                .with_context(|| {
                    format!("no change address given and no {CONFIG_KEY_CHANGE_ADDRESS}")
                })?
                .parse()?,
        };
        let path = match utxos {
            Some(path) => path,
            None => PathBuf::from(
                config
                    .get_string(CONFIG_KEY_UTXOS)
                    .with_context(|| format!("no UTxO file given and no {CONFIG_KEY_UTXOS}"))?,
            ),
        };

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("reading UTxOs from {}", path.display()))?;
        Ok(Self {
            change_address,
            utxos: parse_utxos(&json)?,
        })
    }
}

/// UTxOs written as `{"<tx hash>#<index>": {"address": "addr...", "value": {"lovelace": n}}}`
pub fn parse_utxos(json: &str) -> Result<Vec<Utxo>> {
    let entries: BTreeMap<String, OutputEntry> = serde_json::from_str(json)?;
    entries
        .into_iter()
        .map(|(input, output)| {
            let input: TxInput =
                input.parse().with_context(|| format!("bad input reference {input}"))?;
            Ok(Utxo::new(input, TxOutput::new(output.address, output.value)))
        })
        .collect()
}

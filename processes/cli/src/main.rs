//! Loom CLI: build send and mint transactions for a wallet, and inspect encoded ones

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{Case, Config, Environment, File};
use loom_cardano::{
    InMemorySpendableSet, SpendableSetProvider, TransactionBuilder, all_of_signature_policy,
    mint_under_policy, send_to_self, signature_policy,
};
use loom_codec::encode_body;
use loom_common::{Address, AssetName, ProtocolParams};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer as _, Registry, filter, fmt, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

mod inspect;
mod wallet;

use wallet::Wallet;

fn default_config_path() -> PathBuf {
    PathBuf::from(option_env!("LOOM_DEFAULT_CONFIG").unwrap_or("loom.toml"))
}

#[derive(Parser)]
#[command(name = "loom-cli")]
#[command(about = "Build and inspect Cardano transactions")]
struct Args {
    /// Path to configuration.
    #[arg(long, default_value = default_config_path().into_os_string())]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct WalletArgs {
    /// Change address, overriding wallet.change-address
    #[arg(long)]
    change_address: Option<Address>,

    /// JSON file of the wallet's unspent outputs, overriding wallet.utxos
    #[arg(long)]
    utxos: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Send lovelace back to the change address
    Send {
        #[arg(long, default_value_t = 2_000_000)]
        lovelace: u64,

        #[command(flatten)]
        wallet: WalletArgs,
    },

    /// Mint a token under the change address's signature policy
    Mint {
        /// Asset name as text, e.g. TEST
        #[arg(long)]
        name: String,

        #[arg(long, default_value_t = 1)]
        quantity: u64,

        /// Wrap the signature policy in an `all` script
        #[arg(long)]
        all_of: bool,

        #[command(flatten)]
        wallet: WalletArgs,
    },

    /// Summarise an encoded transaction or transaction body (hex or raw bytes)
    Inspect { file: PathBuf },
}

/// What a signing wallet needs to finish a built transaction
#[derive(Serialize)]
struct BuiltTransaction {
    tx_id: String,
    body_cbor: String,
    fee: u64,
    required_signers: Vec<String>,
    scripts: Vec<String>,
}

impl BuiltTransaction {
    fn from_builder(builder: &TransactionBuilder) -> Result<Self> {
        let (Some(body), Some(requirements)) = (builder.body(), builder.witness_requirements())
        else {
            anyhow::bail!("transaction was not sealed");
        };
        Ok(Self {
            tx_id: requirements.tx_id.to_string(),
            body_cbor: hex::encode(encode_body(body)?),
            fee: body.fee(),
            required_signers: requirements.signers.iter().map(ToString::to_string).collect(),
            scripts: requirements
                .scripts()
                .iter()
                .map(|script| script.to_hex())
                .collect::<loom_common::Result<_>>()?,
        })
    }
}

async fn load_wallet(config: &Config, args: WalletArgs, params: &ProtocolParams) -> Result<Wallet> {
    let wallet = Wallet::load(config, args.change_address, args.utxos)?;
    if wallet.change_address.network != params.network {
        warn!(
            "Change address {} is not on the configured {:?} network",
            wallet.change_address, params.network
        );
    }

    let provider = InMemorySpendableSet::new(wallet.utxos);
    let utxos = provider.spendable(&wallet.change_address).await?;
    info!("{} spendable outputs at {}", utxos.len(), wallet.change_address);
    Ok(Wallet {
        change_address: wallet.change_address,
        utxos,
    })
}

/// `LOOM_<SECTION>__<KEY>` overrides `<section>.<key>`, with underscores in the key read as
/// hyphens, e.g. `LOOM_PROTOCOL__MIN_FEE_A` sets `protocol.min-fee-a`
fn environment() -> Environment {
    Environment::with_prefix("LOOM")
        .prefix_separator("_")
        .separator("__")
        .convert_case(Case::Kebab)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
pub async fn main() -> Result<()> {
    let args = Args::try_parse()?;

    // Standard logging using RUST_LOG for log levels default to INFO for events only
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env().add_directive(filter::LevelFilter::INFO.into()))
        .with_filter(filter::filter_fn(|meta| meta.is_event()));
    Registry::default().with(fmt_layer).init();

    let config = Config::builder()
        .add_source(File::from(args.config.as_path()).required(false))
        .add_source(environment())
        .build()?;
    let params = ProtocolParams::from_config(&config);

    match args.command {
        Command::Send { lovelace, wallet } => {
            let wallet = load_wallet(&config, wallet, &params).await?;
            let builder = send_to_self(params, wallet.change_address, wallet.utxos, lovelace)?;
            print_json(&BuiltTransaction::from_builder(&builder)?)
        }
        Command::Mint {
            name,
            quantity,
            all_of,
            wallet,
        } => {
            let asset_name = AssetName::new(name.as_bytes())
                .ok_or_else(|| anyhow::anyhow!("asset name {name} is longer than 32 bytes"))?;
            let wallet = load_wallet(&config, wallet, &params).await?;
            let script = if all_of {
                all_of_signature_policy(&wallet.change_address)?
            } else {
                signature_policy(&wallet.change_address)?
            };
            let builder = mint_under_policy(
                params,
                wallet.change_address,
                wallet.utxos,
                script,
                asset_name,
                quantity,
            )?;
            print_json(&BuiltTransaction::from_builder(&builder)?)
        }
        Command::Inspect { file } => {
            let data = tokio::fs::read(&file).await?;
            print_json(&inspect::summarise(&data)?)
        }
    }
}

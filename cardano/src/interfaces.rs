//! Collaborators outside the builder: where spendable outputs come from, who signs and who
//! submits

use async_trait::async_trait;
use loom_codec::{UnsignedTransactionBody, encode_body};
use loom_common::{Address, NativeScript, Result, Signature, TxHash, Utxo, VKey};
use tracing::{info, warn};

use crate::witness::WitnessAssembler;

/// Source of the outputs a wallet may spend
#[async_trait]
pub trait SpendableSetProvider: Send + Sync {
    /// Unspent outputs at `address`, in the order the provider holds them
    async fn spendable(&self, address: &Address) -> Result<Vec<Utxo>>;
}

/// Wallet that signs transaction ids
///
/// Fails `UserRejected` when the user declines and `SigningUnavailable` when no wallet answers.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, tx_id: &TxHash, body_cbor: &[u8]) -> Result<Vec<(VKey, Signature)>>;
}

/// Network endpoint accepting signed transactions
///
/// Fails `Rejected` when the ledger refuses the transaction and `NetworkUnavailable` when it
/// cannot be reached.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, tx_cbor: &[u8]) -> Result<TxHash>;
}

/// A fixed set of outputs, whatever the address
#[derive(Debug, Clone, Default)]
pub struct InMemorySpendableSet {
    utxos: Vec<Utxo>,
}

impl InMemorySpendableSet {
    pub fn new(utxos: Vec<Utxo>) -> Self {
        Self { utxos }
    }
}

#[async_trait]
impl SpendableSetProvider for InMemorySpendableSet {
    async fn spendable(&self, address: &Address) -> Result<Vec<Utxo>> {
        Ok(self.utxos.iter().filter(|u| u.output.address == *address).cloned().collect())
    }
}

/// Sign, assemble and submit a sealed body once
///
/// Errors from either collaborator are returned as they are; retrying is up to the caller,
/// guided by `Error::is_retryable`.
pub async fn sign_and_submit(
    body: &UnsignedTransactionBody,
    assembler: &WitnessAssembler,
    scripts: &[NativeScript],
    signer: &dyn Signer,
    submitter: &dyn Submitter,
) -> Result<TxHash> {
    let tx_id = body.id()?;
    let signatures = signer.sign(&tx_id, &encode_body(body)?).await?;
    let tx = assembler.assemble(body, &signatures, scripts)?;

    let submitted = submitter.submit(&tx.to_bytes()?).await?;
    if submitted != tx_id {
        warn!("Submitter reported {submitted} for transaction {tx_id}");
    }
    info!("Submitted transaction {tx_id}");
    Ok(submitted)
}

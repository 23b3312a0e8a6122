//! Human-readable summaries of encoded transactions

use anyhow::{Result, bail};
use loom_codec::{SignedTransaction, UnsignedTransactionBody, decode_body, decode_transaction};
use loom_common::{MintDelta, TxOutput, ValidityInterval};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TransactionSummary {
    pub id: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint: Option<MintDelta>,
    pub validity: ValidityInterval,

    /// Key hashes of the signers, when witnesses are present
    pub signers: Vec<String>,
    pub scripts: Vec<String>,
}

impl TransactionSummary {
    fn of_body(body: &UnsignedTransactionBody) -> Result<Self> {
        Ok(Self {
            id: body.id()?.to_string(),
            inputs: body.inputs().iter().map(ToString::to_string).collect(),
            outputs: body.outputs().to_vec(),
            fee: body.fee(),
            mint: body.mint().cloned(),
            validity: body.validity(),
            signers: Vec::new(),
            scripts: Vec::new(),
        })
    }

    fn of_transaction(tx: &SignedTransaction) -> Result<Self> {
        let mut summary = Self::of_body(&tx.body)?;
        summary.signers = tx
            .witnesses
            .vkey_witnesses()
            .iter()
            .map(|w| w.vkey.key_hash().to_string())
            .collect();
        summary.scripts = tx
            .witnesses
            .native_scripts()
            .iter()
            .map(|script| script.hash().map(|hash| hash.to_string()))
            .collect::<loom_common::Result<_>>()?;
        Ok(summary)
    }
}

/// Accepts hex text or raw bytes, holding either a whole transaction or a bare body
pub fn summarise(data: &[u8]) -> Result<TransactionSummary> {
    let text = String::from_utf8_lossy(data);
    let bytes = match hex::decode(text.trim()) {
        Ok(bytes) => bytes,
        Err(_) => data.to_vec(),
    };

    if let Ok(tx) = decode_transaction(&bytes) {
        return TransactionSummary::of_transaction(&tx);
    }
    match decode_body(&bytes) {
        Ok(body) => TransactionSummary::of_body(&body),
        Err(e) => bail!("neither a transaction nor a transaction body: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_codec::{WitnessSet, encode_body};
    use loom_common::{TxInput, Value};
    use loom_test_utils::{TestKey, tx_hash};

    fn body() -> UnsignedTransactionBody {
        UnsignedTransactionBody::new(
            vec![TxInput::new(tx_hash(1), 0)],
            vec![TxOutput::new(TestKey::new(1).address(), Value::lovelace(2_000_000))],
            170_000,
        )
    }

    #[test]
    fn summarises_body_hex() {
        let hex_text = hex::encode(encode_body(&body()).unwrap());
        let summary = summarise(hex_text.as_bytes()).unwrap();
        assert_eq!(summary.fee, 170_000);
        assert_eq!(summary.inputs, vec![format!("{}#0", tx_hash(1))]);
        assert!(summary.signers.is_empty());
    }

    #[test]
    fn summarises_raw_transaction() {
        let key = TestKey::new(1);
        let witness = key.witness(&body().id().unwrap());
        let tx = SignedTransaction::new(
            body(),
            WitnessSet::new([loom_codec::VKeyWitness::new(witness.0, witness.1)], []).unwrap(),
        );
        let summary = summarise(&tx.to_bytes().unwrap()).unwrap();
        assert_eq!(summary.id, body().id().unwrap().to_string());
        assert_eq!(summary.signers, vec![key.key_hash().to_string()]);
    }

    #[test]
    fn garbage_is_refused() {
        assert!(summarise(b"not cbor at all").is_err());
    }
}

//! Size and fee estimation for transactions that have not been signed yet

use loom_codec::{SignedTransaction, UnsignedTransactionBody, VKeyWitness, WitnessSet};
use loom_common::{Lovelace, NativeScript, ProtocolParams, Result, Signature, VKey};

/// Witness set of the same encoded size as the real one will have once `signers` distinct keys
/// have signed and `scripts` are attached
pub fn placeholder_witnesses(signers: usize, scripts: &[NativeScript]) -> Result<WitnessSet> {
    let vkey_witnesses = (0..signers as u64).map(|index| {
        let mut vkey = [0u8; 32];
        vkey[..8].copy_from_slice(&index.to_be_bytes());
        VKeyWitness::new(VKey::new(vkey), Signature::new([0u8; 64]))
    });
    WitnessSet::new(vkey_witnesses, scripts.iter().cloned())
}

/// Encoded size of the full transaction once witnessed
pub fn estimated_size(
    body: &UnsignedTransactionBody,
    signers: usize,
    scripts: &[NativeScript],
) -> Result<usize> {
    let tx = SignedTransaction::new(body.clone(), placeholder_witnesses(signers, scripts)?);
    Ok(tx.to_bytes()?.len())
}

/// Linear fee for the witnessed transaction
///
/// The ledger charges for the whole signed transaction, so the size includes placeholder
/// witnesses for `signers` keys and `scripts`, not the body alone.
pub fn minimum_fee(
    params: &ProtocolParams,
    body: &UnsignedTransactionBody,
    signers: usize,
    scripts: &[NativeScript],
) -> Result<Lovelace> {
    Ok(params.linear_fee(estimated_size(body, signers, scripts)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_codec::encode_body;
    use loom_common::{TxInput, TxOutput, Value};
    use loom_test_utils::{TestKey, tx_hash};

    fn body(fee: Lovelace) -> UnsignedTransactionBody {
        UnsignedTransactionBody::new(
            vec![TxInput::new(tx_hash(1), 0)],
            vec![TxOutput::new(TestKey::new(1).address(), Value::lovelace(2_000_000))],
            fee,
        )
    }

    #[test]
    fn placeholder_matches_real_witness_size() {
        let key = TestKey::new(1);
        let tx_id = body(0).id().unwrap();
        let (vkey, signature) = key.witness(&tx_id);
        let real = SignedTransaction::new(
            body(0),
            WitnessSet::new([VKeyWitness::new(vkey, signature)], []).unwrap(),
        );
        assert_eq!(estimated_size(&body(0), 1, &[]).unwrap(), real.to_bytes().unwrap().len());
    }

    #[test]
    fn size_covers_body_and_envelope() {
        let body_len = encode_body(&body(0)).unwrap().len();
        // array header, empty witness map, validity flag, null auxiliary data
        assert_eq!(estimated_size(&body(0), 0, &[]).unwrap(), body_len + 4);
    }

    #[test]
    fn fee_grows_with_integer_width() {
        let params = ProtocolParams::default();
        let small = minimum_fee(&params, &body(0), 1, &[]).unwrap();
        let large = minimum_fee(&params, &body(1_000_000), 1, &[]).unwrap();
        assert_eq!(large - small, 4 * params.min_fee_a);
    }
}

//! Transactions produced here must read back through an independent ledger decoder

use loom_codec::{SignedTransaction, UnsignedTransactionBody, VKeyWitness, WitnessSet};
use loom_common::{AssetName, MintDelta, NativeScript, TxInput, TxOutput, ValidityInterval, Value};
use loom_test_utils::{TestKey, tx_hash};
use pallas::ledger::traverse::{Era, MultiEraTx};

fn signed_mint_transaction() -> (SignedTransaction, TestKey) {
    let key = TestKey::new(11);
    let policy_script = NativeScript::Signature(key.key_hash());
    let policy = policy_script.hash().unwrap();
    let token = AssetName::new(b"TEST").unwrap();

    let mint: MintDelta = [(policy, token, 1)].into_iter().collect();
    let body = UnsignedTransactionBody::new(
        vec![
            TxInput::new(tx_hash(2), 0),
            TxInput::new(tx_hash(1), 3),
        ],
        vec![
            TxOutput::new(key.address(), Value::lovelace(2_000_000).with_asset(policy, token, 1)),
            TxOutput::new(key.address(), Value::lovelace(2_812_000)),
        ],
        188_000,
    )
    .with_mint(&mint)
    .with_validity(ValidityInterval {
        invalid_before: None,
        invalid_hereafter: Some(90_000_000),
    });

    let tx_id = body.id().unwrap();
    let (vkey, signature) = key.witness(&tx_id);
    let witnesses = WitnessSet::new([VKeyWitness::new(vkey, signature)], [policy_script]).unwrap();
    (SignedTransaction::new(body, witnesses), key)
}

#[test]
fn pallas_reads_our_transaction() {
    let (tx, key) = signed_mint_transaction();
    let bytes = tx.to_bytes().unwrap();

    let decoded = MultiEraTx::decode(&bytes).unwrap();
    assert_eq!(decoded.era(), Era::Conway);
    assert_eq!(decoded.hash().as_ref(), tx.id().unwrap().as_ref());
    assert_eq!(decoded.fee(), Some(188_000));
    assert_eq!(decoded.ttl(), Some(90_000_000));
    assert_eq!(decoded.inputs().len(), 2);
    assert_eq!(decoded.mints().len(), 1);

    let outputs = decoded.outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[1].value().coin(), 2_812_000);
    assert_eq!(outputs[0].address().unwrap().to_vec(), key.address().to_bytes());
}

#[test]
fn our_decoder_reads_back_the_same_transaction() {
    let (tx, _) = signed_mint_transaction();
    let bytes = tx.to_bytes().unwrap();
    assert_eq!(loom_codec::decode_transaction(&bytes).unwrap(), tx);
    let body_bytes = loom_codec::encode_body(&tx.body).unwrap();
    assert_eq!(loom_codec::decode_body(&body_bytes).unwrap(), tx.body);
}

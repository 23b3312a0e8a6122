use crate::{
    tx::{UnsignedTransactionBody, decode_body_from, encode_body_into},
    utils::{decode_canonical, definite_array, definite_bytes, definite_map},
};
use loom_common::{NativeScript, Result, ScriptHash, Signature, TxHash, VKey};
use minicbor::{Decoder, Encoder, data::Type, decode, encode};

const KEY_VKEY_WITNESSES: u8 = 0;
const KEY_NATIVE_SCRIPTS: u8 = 1;

/// A verification key and its signature over a transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VKeyWitness {
    pub vkey: VKey,
    pub signature: Signature,
}

impl VKeyWitness {
    pub fn new(vkey: VKey, signature: Signature) -> Self {
        Self { vkey, signature }
    }
}

/// Signatures and scripts attached to a transaction
///
/// Witnesses are held sorted by key hash and scripts by script hash, each without duplicates,
/// so the order they were supplied in never reaches the encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WitnessSet {
    vkey_witnesses: Vec<VKeyWitness>,
    native_scripts: Vec<NativeScript>,
}

impl WitnessSet {
    pub fn new(
        vkey_witnesses: impl IntoIterator<Item = VKeyWitness>,
        native_scripts: impl IntoIterator<Item = NativeScript>,
    ) -> Result<Self> {
        let mut vkey_witnesses: Vec<_> = vkey_witnesses.into_iter().collect();
        vkey_witnesses.sort_by_key(|w| (w.vkey.key_hash(), w.vkey, w.signature));
        vkey_witnesses.dedup();

        let mut keyed_scripts = native_scripts
            .into_iter()
            .map(|script| Ok((script.hash()?, script)))
            .collect::<Result<Vec<(ScriptHash, NativeScript)>>>()?;
        keyed_scripts.sort_by(|a, b| a.0.cmp(&b.0));
        keyed_scripts.dedup_by(|a, b| a.0 == b.0);

        Ok(Self {
            vkey_witnesses,
            native_scripts: keyed_scripts.into_iter().map(|(_, script)| script).collect(),
        })
    }

    pub fn vkey_witnesses(&self) -> &[VKeyWitness] {
        &self.vkey_witnesses
    }

    pub fn native_scripts(&self) -> &[NativeScript] {
        &self.native_scripts
    }

    pub fn is_empty(&self) -> bool {
        self.vkey_witnesses.is_empty() && self.native_scripts.is_empty()
    }
}

/// A body with its witnesses, ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub body: UnsignedTransactionBody,
    pub witnesses: WitnessSet,
}

impl SignedTransaction {
    pub fn new(body: UnsignedTransactionBody, witnesses: WitnessSet) -> Self {
        Self { body, witnesses }
    }

    pub fn id(&self) -> Result<TxHash> {
        self.body.id()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_transaction(self)
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(self.to_bytes()?))
    }
}

pub(crate) fn encode_witness_set_into<W: encode::Write>(
    e: &mut Encoder<W>,
    witnesses: &WitnessSet,
) -> std::result::Result<(), encode::Error<W::Error>> {
    let has_vkeys = !witnesses.vkey_witnesses.is_empty();
    let has_scripts = !witnesses.native_scripts.is_empty();
    e.map(has_vkeys as u64 + has_scripts as u64)?;

    if has_vkeys {
        e.u8(KEY_VKEY_WITNESSES)?.array(witnesses.vkey_witnesses.len() as u64)?;
        for witness in &witnesses.vkey_witnesses {
            e.array(2)?.bytes(witness.vkey.as_ref())?.bytes(witness.signature.as_ref())?;
        }
    }

    if has_scripts {
        e.u8(KEY_NATIVE_SCRIPTS)?.array(witnesses.native_scripts.len() as u64)?;
        for script in &witnesses.native_scripts {
            e.encode(script)?;
        }
    }

    Ok(())
}

fn decode_vkey_witness(d: &mut Decoder<'_>) -> std::result::Result<VKeyWitness, decode::Error> {
    if definite_array(d)? != 2 {
        return Err(decode::Error::message("vkey witness is not a pair"));
    }
    let vkey = VKey::try_from(definite_bytes(d)?)
        .map_err(|_| decode::Error::message("vkey is not 32 bytes"))?;
    let signature = Signature::try_from(definite_bytes(d)?)
        .map_err(|_| decode::Error::message("signature is not 64 bytes"))?;
    Ok(VKeyWitness::new(vkey, signature))
}

pub(crate) fn decode_witness_set_from(
    d: &mut Decoder<'_>,
) -> std::result::Result<WitnessSet, decode::Error> {
    let mut vkey_witnesses = Vec::new();
    let mut native_scripts = Vec::new();

    let mut previous_key = None;
    for _ in 0..definite_map(d)? {
        let key = d.u8()?;
        if previous_key.is_some_and(|previous| previous >= key) {
            return Err(decode::Error::message(format!("witness key {key} out of order")));
        }
        previous_key = Some(key);

        match key {
            KEY_VKEY_WITNESSES => {
                for _ in 0..definite_array(d)? {
                    vkey_witnesses.push(decode_vkey_witness(d)?);
                }
            }
            KEY_NATIVE_SCRIPTS => {
                for _ in 0..definite_array(d)? {
                    native_scripts.push(d.decode::<NativeScript>()?);
                }
            }
            other => {
                return Err(decode::Error::message(format!("unsupported witness key {other}")));
            }
        }
    }

    WitnessSet::new(vkey_witnesses, native_scripts)
        .map_err(|e| decode::Error::message(e.to_string()))
}

pub fn encode_witness_set(witnesses: &WitnessSet) -> Result<Vec<u8>> {
    let mut e = Encoder::new(Vec::new());
    encode_witness_set_into(&mut e, witnesses)?;
    Ok(e.into_writer())
}

pub fn decode_witness_set(bytes: &[u8]) -> Result<WitnessSet> {
    decode_canonical(bytes, "witness set", decode_witness_set_from, encode_witness_set)
}

/// `[body, witness_set, true, null]`
pub fn encode_transaction(tx: &SignedTransaction) -> Result<Vec<u8>> {
    let mut e = Encoder::new(Vec::new());
    e.array(4)?;
    encode_body_into(&mut e, &tx.body)?;
    encode_witness_set_into(&mut e, &tx.witnesses)?;
    e.bool(true)?.null()?;
    Ok(e.into_writer())
}

fn decode_transaction_from(
    d: &mut Decoder<'_>,
) -> std::result::Result<SignedTransaction, decode::Error> {
    if definite_array(d)? != 4 {
        return Err(decode::Error::message("transaction is not a 4-element array"));
    }
    let body = decode_body_from(d)?;
    let witnesses = decode_witness_set_from(d)?;
    if !d.bool()? {
        return Err(decode::Error::message("transactions flagged invalid are not supported"));
    }
    match d.datatype()? {
        Type::Null => d.null()?,
        _ => return Err(decode::Error::message("auxiliary data is not supported")),
    }
    Ok(SignedTransaction::new(body, witnesses))
}

pub fn decode_transaction(bytes: &[u8]) -> Result<SignedTransaction> {
    decode_canonical(bytes, "transaction", decode_transaction_from, encode_transaction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_common::{AddrKeyhash, Error, Hash, TxInput};
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    fn witness(n: u8) -> VKeyWitness {
        VKeyWitness::new(VKey::new([n; 32]), Signature::new([n; 64]))
    }

    fn sig_script(n: u8) -> NativeScript {
        NativeScript::Signature(AddrKeyhash::new([n; 28]))
    }

    fn body() -> UnsignedTransactionBody {
        UnsignedTransactionBody::new(vec![TxInput::new(Hash::new([4; 32]), 1)], vec![], 200_000)
    }

    #[derive(Debug, Clone)]
    struct Shuffle(Vec<u8>);

    impl Arbitrary for Shuffle {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut order: Vec<u8> = (1..=5).collect();
            for i in (1..order.len()).rev() {
                order.swap(i, usize::arbitrary(g) % (i + 1));
            }
            Shuffle(order)
        }
    }

    #[test]
    fn empty_witness_set_is_an_empty_map() {
        assert_eq!(encode_witness_set(&WitnessSet::default()).unwrap(), vec![0xa0]);
    }

    #[test]
    fn scripts_only_set_has_single_key() {
        let set = WitnessSet::new([], [sig_script(1)]).unwrap();
        let bytes = encode_witness_set(&set).unwrap();
        assert_eq!(&bytes[..3], &[0xa1, 0x01, 0x81]);
        assert_eq!(decode_witness_set(&bytes).unwrap(), set);
    }

    #[test]
    fn duplicates_are_removed() {
        let set = WitnessSet::new([witness(1), witness(1)], [sig_script(2), sig_script(2)]).unwrap();
        assert_eq!(set.vkey_witnesses().len(), 1);
        assert_eq!(set.native_scripts().len(), 1);
    }

    #[test]
    fn invalid_scripts_are_refused() {
        let result = WitnessSet::new([], [NativeScript::AnyOf(vec![])]);
        assert!(matches!(result, Err(Error::InvalidScript(_))));
    }

    #[quickcheck]
    fn witness_order_does_not_change_bytes(shuffle: Shuffle) -> bool {
        let sorted = WitnessSet::new((1..=5).map(witness), (1..=5).map(sig_script)).unwrap();
        let shuffled = WitnessSet::new(
            shuffle.0.iter().map(|n| witness(*n)),
            shuffle.0.iter().rev().map(|n| sig_script(*n)),
        )
        .unwrap();
        encode_witness_set(&sorted).unwrap() == encode_witness_set(&shuffled).unwrap()
    }

    #[test]
    fn transaction_shape() {
        let tx = SignedTransaction::new(body(), WitnessSet::new([witness(3)], []).unwrap());
        let bytes = tx.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x84);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xf5, 0xf6]);
        assert_eq!(decode_transaction(&bytes).unwrap(), tx);
    }

    #[test]
    fn transaction_flagged_invalid_is_refused() {
        let tx = SignedTransaction::new(body(), WitnessSet::default());
        let mut bytes = tx.to_bytes().unwrap();
        let flag = bytes.len() - 2;
        bytes[flag] = 0xf4;
        assert!(matches!(decode_transaction(&bytes), Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn transaction_with_trailing_bytes_is_refused() {
        let tx = SignedTransaction::new(body(), WitnessSet::default());
        let mut bytes = tx.to_bytes().unwrap();
        bytes.push(0xf6);
        assert!(matches!(decode_transaction(&bytes), Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn unsorted_witnesses_are_not_canonical() {
        let high = witness(1);
        let low = witness(2);
        let (first, second) = if high.vkey.key_hash() > low.vkey.key_hash() {
            (high, low)
        } else {
            (low, high)
        };
        let mut e = Encoder::new(Vec::new());
        e.map(1).unwrap().u8(0).unwrap().array(2).unwrap();
        for w in [first, second] {
            e.array(2).unwrap().bytes(w.vkey.as_ref()).unwrap().bytes(w.signature.as_ref()).unwrap();
        }
        let result = decode_witness_set(&e.into_writer());
        assert!(matches!(result, Err(Error::MalformedEncoding(m)) if m.contains("canonical")));
    }
}

use crate::{
    utils::{decode_canonical, definite_array, definite_map},
    utxo::{decode_input, decode_mint, decode_output, encode_input, encode_mint, encode_output},
};
use loom_common::{
    Lovelace, MintDelta, Result, TxHash, TxInput, TxOutput, ValidityInterval, crypto::blake2b_256,
};
use minicbor::{Decoder, Encoder, decode, encode};

const KEY_INPUTS: u8 = 0;
const KEY_OUTPUTS: u8 = 1;
const KEY_FEE: u8 = 2;
const KEY_TTL: u8 = 3;
const KEY_VALIDITY_START: u8 = 8;
const KEY_MINT: u8 = 9;

/// The part of a transaction covered by its id and therefore by every signature
///
/// Inputs are kept sorted and unique, outputs keep their insertion order, and a mint with no
/// non-zero entries is dropped entirely, so equal bodies always encode to equal bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransactionBody {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    fee: Lovelace,
    mint: Option<MintDelta>,
    validity: ValidityInterval,
}

impl UnsignedTransactionBody {
    pub fn new(mut inputs: Vec<TxInput>, outputs: Vec<TxOutput>, fee: Lovelace) -> Self {
        inputs.sort();
        inputs.dedup();
        Self {
            inputs,
            outputs,
            fee,
            mint: None,
            validity: ValidityInterval::default(),
        }
    }

    pub fn with_mint(mut self, mint: &MintDelta) -> Self {
        let pruned = mint.pruned();
        self.mint = (!pruned.is_empty()).then_some(pruned);
        self
    }

    pub fn with_validity(mut self, validity: ValidityInterval) -> Self {
        self.validity = validity;
        self
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn fee(&self) -> Lovelace {
        self.fee
    }

    pub fn mint(&self) -> Option<&MintDelta> {
        self.mint.as_ref()
    }

    pub fn validity(&self) -> ValidityInterval {
        self.validity
    }

    /// blake2b-256 of the canonical body encoding
    pub fn id(&self) -> Result<TxHash> {
        transaction_id(self)
    }
}

pub(crate) fn encode_body_into<W: encode::Write>(
    e: &mut Encoder<W>,
    body: &UnsignedTransactionBody,
) -> std::result::Result<(), encode::Error<W::Error>> {
    let optional = [
        body.validity.invalid_hereafter.is_some(),
        body.validity.invalid_before.is_some(),
        body.mint.is_some(),
    ];
    e.map(3 + optional.iter().filter(|present| **present).count() as u64)?;

    e.u8(KEY_INPUTS)?.array(body.inputs.len() as u64)?;
    for input in &body.inputs {
        encode_input(e, input)?;
    }

    e.u8(KEY_OUTPUTS)?.array(body.outputs.len() as u64)?;
    for output in &body.outputs {
        encode_output(e, output)?;
    }

    e.u8(KEY_FEE)?.u64(body.fee)?;

    if let Some(ttl) = body.validity.invalid_hereafter {
        e.u8(KEY_TTL)?.u64(ttl)?;
    }
    if let Some(start) = body.validity.invalid_before {
        e.u8(KEY_VALIDITY_START)?.u64(start)?;
    }
    if let Some(mint) = &body.mint {
        e.u8(KEY_MINT)?;
        encode_mint(e, mint)?;
    }

    Ok(())
}

pub(crate) fn decode_body_from(
    d: &mut Decoder<'_>,
) -> std::result::Result<UnsignedTransactionBody, decode::Error> {
    let mut inputs = None;
    let mut outputs = None;
    let mut fee = None;
    let mut validity = ValidityInterval::default();
    let mut mint = MintDelta::new();

    let mut previous_key = None;
    for _ in 0..definite_map(d)? {
        let key = d.u8()?;
        if previous_key.is_some_and(|previous| previous >= key) {
            return Err(decode::Error::message(format!("body key {key} out of order")));
        }
        previous_key = Some(key);

        match key {
            KEY_INPUTS => {
                let count = definite_array(d)?;
                let inputs_read: std::result::Result<Vec<_>, _> =
                    (0..count).map(|_| decode_input(d)).collect();
                inputs = Some(inputs_read?);
            }
            KEY_OUTPUTS => {
                let count = definite_array(d)?;
                let outputs_read: std::result::Result<Vec<_>, _> =
                    (0..count).map(|_| decode_output(d)).collect();
                outputs = Some(outputs_read?);
            }
            KEY_FEE => fee = Some(d.u64()?),
            KEY_TTL => validity.invalid_hereafter = Some(d.u64()?),
            KEY_VALIDITY_START => validity.invalid_before = Some(d.u64()?),
            KEY_MINT => mint = decode_mint(d)?,
            other => {
                return Err(decode::Error::message(format!("unsupported body key {other}")));
            }
        }
    }

    let missing = |field| decode::Error::message(format!("body has no {field}"));
    Ok(UnsignedTransactionBody::new(
        inputs.ok_or_else(|| missing("inputs"))?,
        outputs.ok_or_else(|| missing("outputs"))?,
        fee.ok_or_else(|| missing("fee"))?,
    )
    .with_mint(&mint)
    .with_validity(validity))
}

/// Canonical CBOR of a transaction body
pub fn encode_body(body: &UnsignedTransactionBody) -> Result<Vec<u8>> {
    let mut e = Encoder::new(Vec::new());
    encode_body_into(&mut e, body)?;
    Ok(e.into_writer())
}

/// Parse a transaction body, refusing anything that is not its own canonical encoding
pub fn decode_body(bytes: &[u8]) -> Result<UnsignedTransactionBody> {
    decode_canonical(bytes, "transaction body", decode_body_from, encode_body)
}

/// Transaction id: blake2b-256 of the body encoding
pub fn transaction_id(body: &UnsignedTransactionBody) -> Result<TxHash> {
    Ok(blake2b_256(&encode_body(body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_common::{Address, AddressNetwork, AssetName, Error, Hash, MultiAsset, Value};
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;
    use test_case::test_case;

    fn small(g: &mut Gen, below: u8) -> u8 {
        u8::arbitrary(g) % below
    }

    fn arbitrary_name(g: &mut Gen) -> AssetName {
        let len = small(g, 4) as usize;
        let bytes: Vec<u8> = (0..len).map(|_| small(g, 3)).collect();
        AssetName::new(&bytes).unwrap()
    }

    /// Quantities are drawn from a narrow range so zeros and repeated assets come up often
    fn arbitrary_value(g: &mut Gen) -> Value {
        let mut assets = MultiAsset::new();
        for _ in 0..small(g, 4) {
            let policy = Hash::new([small(g, 3); 28]);
            let quantity = if bool::arbitrary(g) {
                u64::from(small(g, 3))
            } else {
                u64::arbitrary(g)
            };
            assets.entry(policy).or_default().insert(arbitrary_name(g), quantity);
        }
        Value::new(u64::arbitrary(g), assets)
    }

    impl Arbitrary for UnsignedTransactionBody {
        fn arbitrary(g: &mut Gen) -> Self {
            let inputs = (0..small(g, 5))
                .map(|_| TxInput::new(Hash::new([small(g, 4); 32]), u64::from(small(g, 3))))
                .collect();
            let outputs = (0..small(g, 4))
                .map(|_| {
                    let hash = Hash::new([u8::arbitrary(g); 28]);
                    let address = if bool::arbitrary(g) {
                        Address::from_key_hash(AddressNetwork::Test, hash)
                    } else {
                        Address::from_script_hash(AddressNetwork::Main, hash)
                    };
                    TxOutput::new(address, arbitrary_value(g))
                })
                .collect();
            let mint: MintDelta = (0..small(g, 4))
                .map(|_| {
                    let quantity = i64::from(small(g, 5)) - 2;
                    (Hash::new([small(g, 3); 28]), arbitrary_name(g), quantity)
                })
                .collect();
            UnsignedTransactionBody::new(inputs, outputs, u64::arbitrary(g))
                .with_mint(&mint)
                .with_validity(ValidityInterval {
                    invalid_before: Option::arbitrary(g),
                    invalid_hereafter: Option::arbitrary(g),
                })
        }
    }

    #[quickcheck]
    fn body_round_trips(body: UnsignedTransactionBody) -> bool {
        let bytes = encode_body(&body).unwrap();
        decode_body(&bytes).unwrap() == body
            && transaction_id(&body).unwrap() == blake2b_256(&bytes)
    }

    fn enterprise(n: u8) -> Address {
        Address::from_key_hash(AddressNetwork::Test, Hash::new([n; 28]))
    }

    fn simple_body() -> UnsignedTransactionBody {
        UnsignedTransactionBody::new(
            vec![TxInput::new(Hash::new([0; 32]), 0)],
            vec![TxOutput::new(enterprise(1), Value::lovelace(2_000_000))],
            170_000,
        )
    }

    #[test]
    fn simple_body_layout() {
        let expected = format!(
            "a3008182 5820{} 00 0181 82 581d60{} 1a001e8480 02 1a00029810",
            "00".repeat(32),
            "01".repeat(28)
        )
        .replace(' ', "");
        assert_eq!(hex::encode(encode_body(&simple_body()).unwrap()), expected);
    }

    #[test]
    fn inputs_are_sorted_and_deduplicated() {
        let a = TxInput::new(Hash::new([1; 32]), 1);
        let b = TxInput::new(Hash::new([1; 32]), 0);
        let body = UnsignedTransactionBody::new(vec![a, b, a], vec![], 0);
        assert_eq!(body.inputs(), &[b, a]);
    }

    #[test]
    fn optional_keys_ascend() {
        let mint: MintDelta =
            [(Hash::new([9; 28]), AssetName::new(b"T").unwrap(), 1)].into_iter().collect();
        let body = simple_body()
            .with_mint(&mint)
            .with_validity(ValidityInterval {
                invalid_before: Some(10),
                invalid_hereafter: Some(20),
            });
        let bytes = encode_body(&body).unwrap();
        assert_eq!(bytes[0], 0xa6);
        assert_eq!(decode_body(&bytes).unwrap(), body);
    }

    #[test]
    fn net_zero_mint_is_dropped() {
        let mint: MintDelta =
            [(Hash::new([9; 28]), AssetName::new(b"T").unwrap(), 0)].into_iter().collect();
        assert_eq!(simple_body().with_mint(&mint).mint(), None);
    }

    #[test]
    fn id_is_stable() {
        assert_eq!(simple_body().id().unwrap(), simple_body().id().unwrap());
        let other = UnsignedTransactionBody::new(simple_body().inputs().to_vec(), vec![], 170_000);
        assert_ne!(simple_body().id().unwrap(), other.id().unwrap());
    }

    #[test_case(|bytes: &mut Vec<u8>| bytes.push(0x00) ; "trailing byte")]
    #[test_case(|bytes: &mut Vec<u8>| { bytes.pop(); } ; "truncated")]
    #[test_case(|bytes: &mut Vec<u8>| bytes[0] = 0xbf ; "indefinite map")]
    #[test_case(|bytes: &mut Vec<u8>| bytes[0] = 0x83 ; "wrong major type")]
    fn malformed_bodies(corrupt: fn(&mut Vec<u8>)) {
        let mut bytes = encode_body(&simple_body()).unwrap();
        corrupt(&mut bytes);
        assert!(matches!(decode_body(&bytes), Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn unsorted_inputs_are_not_canonical() {
        let a = TxInput::new(Hash::new([1; 32]), 0);
        let b = TxInput::new(Hash::new([2; 32]), 0);
        let mut e = Encoder::new(Vec::new());
        e.map(3).unwrap().u8(0).unwrap().array(2).unwrap();
        encode_input(&mut e, &b).unwrap();
        encode_input(&mut e, &a).unwrap();
        e.u8(1).unwrap().array(0).unwrap().u8(2).unwrap().u8(0).unwrap();
        let result = decode_body(&e.into_writer());
        assert!(matches!(result, Err(Error::MalformedEncoding(m)) if m.contains("canonical")));
    }

    #[test]
    fn unknown_keys_are_refused() {
        let mut bytes = encode_body(&simple_body()).unwrap();
        bytes[0] = 0xa4;
        bytes.extend([0x07, 0x00]);
        assert!(matches!(decode_body(&bytes), Err(Error::MalformedEncoding(_))));
    }
}

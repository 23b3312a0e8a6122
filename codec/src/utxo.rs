use crate::utils::{definite_array, definite_bytes, definite_map};
use loom_common::{
    Address, AssetName, MintDelta, MultiAsset, PolicyId, TxHash, TxInput, TxOutput, Value,
};
use minicbor::{Decoder, Encoder, data::Type, decode, encode};

type EncodeResult<W> = Result<(), encode::Error<<W as encode::Write>::Error>>;

pub(crate) fn encode_input<W: encode::Write>(e: &mut Encoder<W>, input: &TxInput) -> EncodeResult<W> {
    e.array(2)?;
    e.encode(input.tx_hash)?;
    e.u64(input.output_index)?;
    Ok(())
}

pub(crate) fn decode_input(d: &mut Decoder<'_>) -> Result<TxInput, decode::Error> {
    if definite_array(d)? != 2 {
        return Err(decode::Error::message("transaction input is not a pair"));
    }
    let tx_hash: TxHash = d.decode()?;
    Ok(TxInput::new(tx_hash, d.u64()?))
}

/// Outputs use the legacy `[address, value]` array form
pub(crate) fn encode_output<W: encode::Write>(
    e: &mut Encoder<W>,
    output: &TxOutput,
) -> EncodeResult<W> {
    e.array(2)?;
    e.bytes(&output.address.to_bytes())?;
    encode_value(e, &output.value)
}

pub(crate) fn decode_output(d: &mut Decoder<'_>) -> Result<TxOutput, decode::Error> {
    match d.datatype()? {
        Type::Array => {}
        Type::Map => {
            return Err(decode::Error::message("map-form transaction outputs are not supported"));
        }
        other => return Err(decode::Error::type_mismatch(other)),
    }
    if definite_array(d)? != 2 {
        return Err(decode::Error::message("transaction output is not a pair"));
    }
    let address = Address::from_bytes(definite_bytes(d)?)
        .map_err(|e| decode::Error::message(e.to_string()))?;
    Ok(TxOutput::new(address, decode_value(d)?))
}

/// A plain coin when there are no native assets, `[coin, multiasset]` otherwise
pub(crate) fn encode_value<W: encode::Write>(e: &mut Encoder<W>, value: &Value) -> EncodeResult<W> {
    if value.assets().is_empty() {
        e.u64(value.coin())?;
        return Ok(());
    }

    e.array(2)?;
    e.u64(value.coin())?;
    e.map(value.assets().len() as u64)?;
    for (policy, names) in value.assets() {
        e.encode(policy)?;
        e.map(names.len() as u64)?;
        for (name, quantity) in names {
            e.bytes(name.as_slice())?;
            e.u64(*quantity)?;
        }
    }
    Ok(())
}

pub(crate) fn decode_value(d: &mut Decoder<'_>) -> Result<Value, decode::Error> {
    match d.datatype()? {
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Ok(Value::lovelace(d.u64()?)),
        Type::Array => {
            if definite_array(d)? != 2 {
                return Err(decode::Error::message("multi-asset value is not a pair"));
            }
            let lovelace = d.u64()?;
            let mut assets = MultiAsset::new();
            for _ in 0..definite_map(d)? {
                let policy: PolicyId = d.decode()?;
                let names = assets.entry(policy).or_default();
                for _ in 0..definite_map(d)? {
                    let name = decode_asset_name(d)?;
                    names.insert(name, d.u64()?);
                }
            }
            Ok(Value::new(lovelace, assets))
        }
        other => Err(decode::Error::type_mismatch(other)),
    }
}

pub(crate) fn encode_mint<W: encode::Write>(e: &mut Encoder<W>, mint: &MintDelta) -> EncodeResult<W> {
    e.map(mint.iter().count() as u64)?;
    for (policy, names) in mint.iter() {
        e.encode(policy)?;
        e.map(names.len() as u64)?;
        for (name, quantity) in names {
            e.bytes(name.as_slice())?;
            e.i64(*quantity)?;
        }
    }
    Ok(())
}

pub(crate) fn decode_mint(d: &mut Decoder<'_>) -> Result<MintDelta, decode::Error> {
    let mut entries = Vec::new();
    for _ in 0..definite_map(d)? {
        let policy: PolicyId = d.decode()?;
        for _ in 0..definite_map(d)? {
            let name = decode_asset_name(d)?;
            entries.push((policy, name, d.i64()?));
        }
    }
    Ok(entries.into_iter().collect())
}

fn decode_asset_name(d: &mut Decoder<'_>) -> Result<AssetName, decode::Error> {
    let bytes = definite_bytes(d)?;
    AssetName::new(bytes).ok_or_else(|| {
        decode::Error::message(format!("asset name of {} bytes exceeds 32", bytes.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_common::{AddressNetwork, Hash};
    use test_case::test_case;

    fn encoded(f: impl FnOnce(&mut Encoder<Vec<u8>>) -> EncodeResult<Vec<u8>>) -> String {
        let mut e = Encoder::new(Vec::new());
        f(&mut e).unwrap();
        hex::encode(e.into_writer())
    }

    fn token(name: &str) -> AssetName {
        AssetName::new(name.as_bytes()).unwrap()
    }

    #[test_case(0, "00")]
    #[test_case(23, "17")]
    #[test_case(24, "1818")]
    #[test_case(2_000_000, "1a001e8480")]
    #[test_case(u64::MAX, "1bffffffffffffffff")]
    fn coin_only_values_are_plain_integers(lovelace: u64, expected: &str) {
        assert_eq!(encoded(|e| encode_value(e, &Value::lovelace(lovelace))), expected);
    }

    #[test]
    fn multi_asset_value_layout() {
        let value = Value::lovelace(2).with_asset(Hash::new([0xaa; 28]), token("TEST"), 1);
        assert_eq!(
            encoded(|e| encode_value(e, &value)),
            format!("8202a1581c{}a1445445535401", "aa".repeat(28))
        );
    }

    #[test]
    fn asset_names_sort_shortest_first() {
        let policy = Hash::new([1; 28]);
        let value = Value::lovelace(1)
            .with_asset(policy, token("AB"), 1)
            .with_asset(policy, token("B"), 2);
        let hex = encoded(|e| encode_value(e, &value));
        assert!(hex.ends_with("a2414202424142 01".replace(' ', "").as_str()));
    }

    #[test]
    fn zero_quantities_encode_as_plain_coin() {
        let assets = MultiAsset::from([(Hash::new([1; 28]), [(token("A"), 0)].into())]);
        assert_eq!(encoded(|e| encode_value(e, &Value::new(5, assets))), "05");
    }

    #[test]
    fn mint_keeps_sign() {
        let mint: MintDelta = [(Hash::new([2; 28]), token("A"), -5)].into_iter().collect();
        assert_eq!(
            encoded(|e| encode_mint(e, &mint)),
            format!("a1581c{}a1414124", "02".repeat(28))
        );
    }

    #[test]
    fn output_decodes_back() {
        let output = TxOutput::new(
            Address::from_key_hash(AddressNetwork::Test, Hash::new([7; 28])),
            Value::lovelace(5_000_000).with_asset(Hash::new([3; 28]), token("X"), 10),
        );
        let mut e = Encoder::new(Vec::new());
        encode_output(&mut e, &output).unwrap();
        assert_eq!(decode_output(&mut Decoder::new(&e.into_writer())).unwrap(), output);
    }

    #[test]
    fn map_form_outputs_are_refused() {
        // {0: h'', 1: 0}
        let bytes = hex::decode("a20040 0100".replace(' ', "")).unwrap();
        assert!(decode_output(&mut Decoder::new(&bytes)).is_err());
    }

    #[test]
    fn oversized_asset_name_is_refused() {
        let mut bytes = hex::decode(format!("8201a1581c{}a15821", "00".repeat(28))).unwrap();
        bytes.extend([0u8; 33]);
        bytes.push(0x01);
        assert!(decode_value(&mut Decoder::new(&bytes)).is_err());
    }
}

//! Native scripts: multisig and timelock policies
//!
//! A native script is an immutable tree. Its identity is the blake2b-224 hash of its canonical
//! CBOR form prefixed with the native script namespace byte, and that hash is both the policy id
//! of anything it mints and the payment credential of addresses it locks.

use std::collections::BTreeSet;

use crate::{
    crypto::{blake2b_224, VKey},
    error::{Error, Result},
    hash::{AddrKeyhash, PolicyId, ScriptHash},
    Slot, ValidityInterval,
};

/// Deepest nesting accepted when validating or decoding
pub const MAX_SCRIPT_DEPTH: usize = 64;

/// Namespace byte prepended to native scripts before hashing
const NATIVE_SCRIPT_TAG: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NativeScript {
    /// Requires a signature from the key with this hash
    Signature(AddrKeyhash),

    /// Requires every sub-script
    AllOf(Vec<NativeScript>),

    /// Requires at least one sub-script
    AnyOf(Vec<NativeScript>),

    /// Requires at least `n` sub-scripts
    AtLeast(u32, Vec<NativeScript>),

    /// Holds from this slot onwards (`invalid_before`)
    After(Slot),

    /// Holds strictly before this slot (`invalid_hereafter`)
    Before(Slot),
}

impl NativeScript {
    /// Reject scripts that could never be satisfied or are nested too deeply
    pub fn validate(&self) -> Result<()> {
        self.validate_at(1)
    }

    fn validate_at(&self, depth: usize) -> Result<()> {
        if depth > MAX_SCRIPT_DEPTH {
            return Err(Error::InvalidScript(format!(
                "nesting exceeds {MAX_SCRIPT_DEPTH} levels"
            )));
        }
        match self {
            Self::Signature(_) | Self::After(_) | Self::Before(_) => Ok(()),
            Self::AllOf(scripts) => scripts.iter().try_for_each(|s| s.validate_at(depth + 1)),
            Self::AnyOf(scripts) => {
                if scripts.is_empty() {
                    return Err(Error::InvalidScript("any-of with no sub-scripts".to_string()));
                }
                scripts.iter().try_for_each(|s| s.validate_at(depth + 1))
            }
            Self::AtLeast(n, scripts) => {
                if scripts.is_empty() {
                    return Err(Error::InvalidScript(
                        "at-least with no sub-scripts".to_string(),
                    ));
                }
                if *n as usize > scripts.len() {
                    return Err(Error::InvalidScript(format!(
                        "at-least {n} of only {} sub-scripts",
                        scripts.len()
                    )));
                }
                scripts.iter().try_for_each(|s| s.validate_at(depth + 1))
            }
        }
    }

    /// Canonical CBOR: definite-length arrays, shortest-form integers, children in order
    pub fn canonical_encode(&self) -> Result<Vec<u8>> {
        Ok(minicbor::to_vec(self)?)
    }

    /// Read canonical script bytes; anything else is `MalformedEncoding`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut decoder = minicbor::Decoder::new(bytes);
        let script: NativeScript = decoder.decode()?;
        if decoder.position() != bytes.len() {
            return Err(Error::malformed("trailing bytes after native script"));
        }
        if script.canonical_encode()? != bytes {
            return Err(Error::malformed("native script is not canonically encoded"));
        }
        Ok(script)
    }

    /// Script hash, i.e. the policy id when used for minting
    pub fn hash(&self) -> Result<PolicyId> {
        self.validate()?;
        let encoded = self.canonical_encode()?;
        let mut data = Vec::with_capacity(encoded.len() + 1);
        data.push(NATIVE_SCRIPT_TAG);
        data.extend_from_slice(&encoded);
        Ok(blake2b_224(&data))
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(self.canonical_encode()?))
    }

    /// Would this script pass given these signing keys at this slot?
    pub fn verify<'a>(&self, provided: impl IntoIterator<Item = &'a VKey>, current_slot: Slot) -> bool {
        let key_hashes: BTreeSet<AddrKeyhash> =
            provided.into_iter().map(VKey::key_hash).collect();
        self.eval(&key_hashes, current_slot)
    }

    /// Evaluate against key hashes that have already been resolved
    pub fn eval(&self, key_hashes: &BTreeSet<AddrKeyhash>, current_slot: Slot) -> bool {
        match self {
            Self::Signature(hash) => key_hashes.contains(hash),
            Self::AllOf(scripts) => scripts.iter().all(|s| s.eval(key_hashes, current_slot)),
            Self::AnyOf(scripts) => scripts.iter().any(|s| s.eval(key_hashes, current_slot)),
            Self::AtLeast(n, scripts) => {
                let satisfied =
                    scripts.iter().filter(|s| s.eval(key_hashes, current_slot)).count();
                satisfied >= *n as usize
            }
            Self::After(slot) => current_slot >= *slot,
            Self::Before(slot) => current_slot < *slot,
        }
    }

    /// Evaluate the way the ledger does: time bounds are checked against the transaction's
    /// validity interval rather than a single slot, and an open bound never satisfies them
    pub fn eval_in_interval(
        &self,
        key_hashes: &BTreeSet<AddrKeyhash>,
        validity: &ValidityInterval,
    ) -> bool {
        match self {
            Self::Signature(hash) => key_hashes.contains(hash),
            Self::AllOf(scripts) => scripts.iter().all(|s| s.eval_in_interval(key_hashes, validity)),
            Self::AnyOf(scripts) => scripts.iter().any(|s| s.eval_in_interval(key_hashes, validity)),
            Self::AtLeast(n, scripts) => {
                let satisfied =
                    scripts.iter().filter(|s| s.eval_in_interval(key_hashes, validity)).count();
                satisfied >= *n as usize
            }
            Self::After(slot) => validity.invalid_before.is_some_and(|start| start >= *slot),
            Self::Before(slot) => validity.invalid_hereafter.is_some_and(|end| end <= *slot),
        }
    }

    /// Every key hash mentioned anywhere in the tree
    pub fn key_hashes(&self) -> BTreeSet<AddrKeyhash> {
        let mut hashes = BTreeSet::new();
        self.collect_key_hashes(&mut hashes);
        hashes
    }

    fn collect_key_hashes(&self, hashes: &mut BTreeSet<AddrKeyhash>) {
        match self {
            Self::Signature(hash) => {
                hashes.insert(*hash);
            }
            Self::AllOf(scripts) | Self::AnyOf(scripts) | Self::AtLeast(_, scripts) => {
                scripts.iter().for_each(|s| s.collect_key_hashes(hashes));
            }
            Self::After(_) | Self::Before(_) => {}
        }
    }
}

impl TryFrom<&NativeScript> for ScriptHash {
    type Error = Error;

    fn try_from(script: &NativeScript) -> Result<ScriptHash> {
        script.hash()
    }
}

impl<C> minicbor::encode::Encode<C> for NativeScript {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            NativeScript::Signature(hash) => {
                e.array(2)?.u8(0)?;
                e.encode_with(hash, ctx)?;
            }
            NativeScript::AllOf(scripts) => {
                e.array(2)?.u8(1)?;
                encode_scripts(scripts, e, ctx)?;
            }
            NativeScript::AnyOf(scripts) => {
                e.array(2)?.u8(2)?;
                encode_scripts(scripts, e, ctx)?;
            }
            NativeScript::AtLeast(n, scripts) => {
                e.array(3)?.u8(3)?.u32(*n)?;
                encode_scripts(scripts, e, ctx)?;
            }
            NativeScript::After(slot) => {
                e.array(2)?.u8(4)?.u64(*slot)?;
            }
            NativeScript::Before(slot) => {
                e.array(2)?.u8(5)?.u64(*slot)?;
            }
        }
        Ok(())
    }
}

fn encode_scripts<C, W: minicbor::encode::Write>(
    scripts: &[NativeScript],
    e: &mut minicbor::Encoder<W>,
    ctx: &mut C,
) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
    e.array(scripts.len() as u64)?;
    for script in scripts {
        e.encode_with(script, ctx)?;
    }
    Ok(())
}

impl<'b, C> minicbor::decode::Decode<'b, C> for NativeScript {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        ctx: &mut C,
    ) -> std::result::Result<Self, minicbor::decode::Error> {
        decode_script(d, ctx, 1)
    }
}

fn definite_array(d: &mut minicbor::Decoder<'_>) -> std::result::Result<u64, minicbor::decode::Error> {
    d.array()?.ok_or_else(|| {
        minicbor::decode::Error::message("indefinite-length array in native script")
    })
}

fn decode_script<C>(
    d: &mut minicbor::Decoder<'_>,
    ctx: &mut C,
    depth: usize,
) -> std::result::Result<NativeScript, minicbor::decode::Error> {
    if depth > MAX_SCRIPT_DEPTH {
        return Err(minicbor::decode::Error::message("native script nested too deeply"));
    }

    let size = definite_array(d)?;
    let assert_size = |expected: u64| {
        if size != expected {
            return Err(minicbor::decode::Error::message(format!(
                "native script array of {size} elements, expected {expected}"
            )));
        }
        Ok(())
    };

    match d.u32()? {
        0 => {
            assert_size(2)?;
            Ok(NativeScript::Signature(d.decode_with(ctx)?))
        }
        1 => {
            assert_size(2)?;
            Ok(NativeScript::AllOf(decode_children(d, ctx, depth + 1)?))
        }
        2 => {
            assert_size(2)?;
            Ok(NativeScript::AnyOf(decode_children(d, ctx, depth + 1)?))
        }
        3 => {
            assert_size(3)?;
            let n = d.u32()?;
            Ok(NativeScript::AtLeast(n, decode_children(d, ctx, depth + 1)?))
        }
        4 => {
            assert_size(2)?;
            Ok(NativeScript::After(d.u64()?))
        }
        5 => {
            assert_size(2)?;
            Ok(NativeScript::Before(d.u64()?))
        }
        other => Err(minicbor::decode::Error::message(format!(
            "unknown native script tag {other}"
        ))),
    }
}

fn decode_children<C>(
    d: &mut minicbor::Decoder<'_>,
    ctx: &mut C,
    depth: usize,
) -> std::result::Result<Vec<NativeScript>, minicbor::decode::Error> {
    let len = definite_array(d)?;
    (0..len).map(|_| decode_script(d, ctx, depth)).collect()
}

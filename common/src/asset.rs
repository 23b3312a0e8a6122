use std::{collections::BTreeMap, fmt};

use crate::{
    error::{Error, Result},
    hash::PolicyId,
    Lovelace,
};

pub type MultiAsset = BTreeMap<PolicyId, BTreeMap<AssetName, u64>>;

/// Asset name: 0 to 32 raw bytes
///
/// Ordered by length first and then bytewise, which is the order of their canonical CBOR
/// encodings.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct AssetName {
    len: u8,
    bytes: [u8; 32],
}

impl AssetName {
    pub const MAX_LEN: usize = 32;

    pub fn new(data: &[u8]) -> Option<Self> {
        if data.len() > Self::MAX_LEN {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes[..data.len()].copy_from_slice(data);
        Some(Self {
            len: data.len() as u8,
            bytes,
        })
    }

    /// From the base16 form used by wallets, e.g. `54455354` for "TEST"
    pub fn from_hex(text: &str) -> Result<Self> {
        let data = hex::decode(text).map_err(|e| Error::InvalidValue(e.to_string()))?;
        Self::new(&data).ok_or_else(|| {
            Error::InvalidValue(format!("asset name of {} bytes is too long", data.len()))
        })
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_slice())
    }
}

impl Ord for AssetName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.len.cmp(&other.len).then_with(|| self.as_slice().cmp(other.as_slice()))
    }
}

impl PartialOrd for AssetName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AssetName").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl serde::Serialize for AssetName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for AssetName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text: String = serde::Deserialize::deserialize(deserializer)?;
        AssetName::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Identity of a single asset leg of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetId {
    Lovelace,
    Native(PolicyId, AssetName),
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Lovelace => write!(f, "lovelace"),
            AssetId::Native(policy, name) => write!(f, "{policy}.{name}"),
        }
    }
}

/// Value (lovelace + multiasset)
///
/// Quantities are never zero inside `assets`. The fields are private and every constructor,
/// arithmetic helper and deserializer prunes empty entries, so equal values have equal
/// representations.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "ValueFields")]
pub struct Value {
    lovelace: Lovelace,
    assets: MultiAsset,
}

#[derive(serde::Deserialize)]
struct ValueFields {
    lovelace: Lovelace,

    #[serde(default)]
    assets: MultiAsset,
}

impl From<ValueFields> for Value {
    fn from(fields: ValueFields) -> Self {
        Value::new(fields.lovelace, fields.assets)
    }
}

impl Value {
    pub fn new(lovelace: Lovelace, assets: MultiAsset) -> Self {
        let mut value = Self { lovelace, assets };
        value.prune();
        value
    }

    pub fn lovelace(lovelace: Lovelace) -> Self {
        Self {
            lovelace,
            assets: BTreeMap::new(),
        }
    }

    /// Set the quantity of one asset; zero removes it
    pub fn with_asset(mut self, policy: PolicyId, name: AssetName, quantity: u64) -> Self {
        self.assets.entry(policy).or_default().insert(name, quantity);
        self.prune();
        self
    }

    pub fn coin(&self) -> Lovelace {
        self.lovelace
    }

    pub fn assets(&self) -> &MultiAsset {
        &self.assets
    }

    pub fn is_zero(&self) -> bool {
        self.lovelace == 0 && self.assets.is_empty()
    }

    pub fn quantity_of(&self, asset: &AssetId) -> u64 {
        match asset {
            AssetId::Lovelace => self.lovelace,
            AssetId::Native(policy, name) => self
                .assets
                .get(policy)
                .and_then(|names| names.get(name))
                .copied()
                .unwrap_or(0),
        }
    }

    /// Every asset leg with its quantity, lovelace first then in canonical order
    pub fn legs(&self) -> impl Iterator<Item = (AssetId, u64)> + '_ {
        std::iter::once((AssetId::Lovelace, self.lovelace)).chain(self.assets.iter().flat_map(
            |(policy, names)| {
                names.iter().map(move |(name, quantity)| (AssetId::Native(*policy, *name), *quantity))
            },
        ))
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value> {
        let overflow = || Error::InvalidValue("quantity overflow".to_string());
        let mut result = self.clone();
        result.lovelace = result.lovelace.checked_add(other.lovelace).ok_or_else(overflow)?;
        for (policy, names) in &other.assets {
            let entry = result.assets.entry(*policy).or_default();
            for (name, quantity) in names {
                let current = entry.entry(*name).or_default();
                *current = current.checked_add(*quantity).ok_or_else(overflow)?;
            }
        }
        result.prune();
        Ok(result)
    }

    /// Per-asset `self - other`, clamped at zero: what `self` still lacks after `other`
    pub fn saturating_sub(&self, other: &Value) -> Value {
        let mut result = Value::lovelace(self.lovelace.saturating_sub(other.lovelace));
        for (policy, names) in &self.assets {
            for (name, quantity) in names {
                let held = other.quantity_of(&AssetId::Native(*policy, *name));
                result = result.with_asset(*policy, *name, quantity.saturating_sub(held));
            }
        }
        result
    }

    /// True when `self` holds at least as much of every asset as `other`
    pub fn covers(&self, other: &Value) -> bool {
        other.legs().all(|(asset, quantity)| self.quantity_of(&asset) >= quantity)
    }

    pub fn sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<Value> {
        values.into_iter().try_fold(Value::default(), |acc, v| acc.checked_add(v))
    }

    fn prune(&mut self) {
        for names in self.assets.values_mut() {
            names.retain(|_, quantity| *quantity > 0);
        }
        self.assets.retain(|_, names| !names.is_empty());
    }
}

/// Net mint (positive) and burn (negative) quantities per asset
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MintDelta(BTreeMap<PolicyId, BTreeMap<AssetName, i64>>);

impl MintDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate a signed quantity; the same asset added twice sums
    pub fn add(&mut self, policy: PolicyId, name: AssetName, quantity: i64) -> Result<()> {
        let entry = self.0.entry(policy).or_default().entry(name).or_default();
        *entry = entry
            .checked_add(quantity)
            .ok_or_else(|| Error::InvalidValue(format!("mint quantity overflow for {name}")))?;
        Ok(())
    }

    /// Drop net-zero entries and policies left empty
    pub fn pruned(&self) -> MintDelta {
        let mut inner = self.0.clone();
        for names in inner.values_mut() {
            names.retain(|_, quantity| *quantity != 0);
        }
        inner.retain(|_, names| !names.is_empty());
        MintDelta(inner)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|names| names.values().all(|q| *q == 0))
    }

    pub fn quantity_of(&self, policy: &PolicyId, name: &AssetName) -> i64 {
        self.0.get(policy).and_then(|names| names.get(name)).copied().unwrap_or(0)
    }

    pub fn policies(&self) -> impl Iterator<Item = &PolicyId> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PolicyId, &BTreeMap<AssetName, i64>)> {
        self.0.iter()
    }

    /// Split into the minted (positive) and burnt (negative, as magnitudes) halves
    pub fn split(&self) -> (Value, Value) {
        let mut minted = Value::default();
        let mut burnt = Value::default();
        for (policy, names) in &self.0 {
            for (name, quantity) in names {
                if *quantity > 0 {
                    minted = minted.with_asset(*policy, *name, quantity.unsigned_abs());
                } else if *quantity < 0 {
                    burnt = burnt.with_asset(*policy, *name, quantity.unsigned_abs());
                }
            }
        }
        (minted, burnt)
    }
}

impl FromIterator<(PolicyId, AssetName, i64)> for MintDelta {
    fn from_iter<T: IntoIterator<Item = (PolicyId, AssetName, i64)>>(iter: T) -> Self {
        let mut inner: BTreeMap<PolicyId, BTreeMap<AssetName, i64>> = BTreeMap::new();
        for (policy, name, quantity) in iter {
            inner.entry(policy).or_default().insert(name, quantity);
        }
        MintDelta(inner)
    }
}

impl TryFrom<&MintDelta> for Value {
    type Error = Error;

    /// A mint delta is a valid output value only when nothing in it is burnt
    fn try_from(delta: &MintDelta) -> Result<Value> {
        let (minted, burnt) = delta.split();
        if !burnt.is_zero() {
            return Err(Error::InvalidValue(
                "negative quantities are only allowed in a mint delta".to_string(),
            ));
        }
        Ok(minted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(n: u8) -> PolicyId {
        PolicyId::new([n; 28])
    }

    fn name(s: &str) -> AssetName {
        AssetName::new(s.as_bytes()).unwrap()
    }

    #[test]
    fn asset_name_rejects_long_names() {
        assert!(AssetName::new(&[0u8; 33]).is_none());
        assert!(AssetName::new(&[0u8; 32]).is_some());
    }

    #[test]
    fn asset_name_from_hex() {
        assert_eq!(AssetName::from_hex("54455354").unwrap(), name("TEST"));
    }

    #[test]
    fn asset_names_order_shorter_first() {
        assert!(name("zz") < name("aaa"));
        assert!(name("ab") < name("ac"));
    }

    #[test]
    fn add_merges_and_prunes() {
        let a = Value::lovelace(10).with_asset(policy(1), name("A"), 5);
        let b = Value::lovelace(5).with_asset(policy(1), name("A"), 2);
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.coin(), 15);
        assert_eq!(sum.quantity_of(&AssetId::Native(policy(1), name("A"))), 7);

        let zero_asset =
            Value::new(1, MultiAsset::from([(policy(2), BTreeMap::from([(name("B"), 0)]))]));
        assert!(zero_asset.assets().is_empty());
        assert_eq!(zero_asset, Value::lovelace(1));
    }

    #[test]
    fn zero_quantity_removes_asset() {
        let value = Value::lovelace(1)
            .with_asset(policy(1), name("A"), 4)
            .with_asset(policy(1), name("A"), 0);
        assert_eq!(value, Value::lovelace(1));
    }

    #[test]
    fn deserialized_values_are_pruned() {
        let json = format!(r#"{{"lovelace": 7, "assets": {{"{}": {{"41": 0}}}}}}"#, policy(3));
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, Value::lovelace(7));
        assert_eq!(serde_json::from_str::<Value>(r#"{"lovelace": 7}"#).unwrap(), value);
    }

    #[test]
    fn add_reports_overflow() {
        let a = Value::lovelace(u64::MAX);
        assert!(matches!(a.checked_add(&Value::lovelace(1)), Err(Error::InvalidValue(_))));
    }

    #[test]
    fn saturating_sub_and_covers() {
        let have = Value::lovelace(10).with_asset(policy(1), name("A"), 1);
        let want = Value::lovelace(4).with_asset(policy(1), name("A"), 3);
        let lacking = want.saturating_sub(&have);
        assert_eq!(lacking, Value::lovelace(0).with_asset(policy(1), name("A"), 2));
        assert!(!have.covers(&want));
        assert!(have.covers(&Value::lovelace(10)));
    }

    #[test]
    fn mint_delta_accumulates_and_prunes() {
        let mut delta = MintDelta::new();
        delta.add(policy(1), name("A"), 3).unwrap();
        delta.add(policy(1), name("A"), -3).unwrap();
        delta.add(policy(2), name("B"), -1).unwrap();
        let pruned = delta.pruned();
        assert_eq!(pruned.quantity_of(&policy(1), &name("A")), 0);
        assert_eq!(pruned.policies().count(), 1);

        let (minted, burnt) = pruned.split();
        assert!(minted.is_zero());
        assert_eq!(burnt.quantity_of(&AssetId::Native(policy(2), name("B"))), 1);
    }

    #[test]
    fn negative_delta_is_not_a_value() {
        let delta: MintDelta = [(policy(1), name("A"), -1)].into_iter().collect();
        assert!(matches!(Value::try_from(&delta), Err(Error::InvalidValue(_))));
    }
}

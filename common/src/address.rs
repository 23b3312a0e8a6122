//! Shelley-era payment addresses
//!
//! Only the address forms a payment output can carry are modelled: a payment credential
//! (key or script) with an optional delegation part. Byron bootstrap addresses and reward
//! addresses are rejected.

use crate::{
    error::{Error, Result},
    hash::{AddrKeyhash, Hash, ScriptHash},
};
use std::{fmt, str::FromStr};

/// Address network identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressNetwork {
    /// Mainnet
    #[default]
    Main,

    /// Any testnet
    Test,
}

impl AddressNetwork {
    fn header_bits(&self) -> u8 {
        match self {
            AddressNetwork::Main => 1,
            AddressNetwork::Test => 0,
        }
    }

    fn hrp(&self) -> &'static str {
        match self {
            AddressNetwork::Main => "addr",
            AddressNetwork::Test => "addr_test",
        }
    }
}

/// Payment part: who may spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentPart {
    /// Payment to a key
    KeyHash(AddrKeyhash),

    /// Payment to a script
    ScriptHash(ScriptHash),
}

/// Delegation pointer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub slot: u64,
    pub tx_index: u64,
    pub cert_index: u64,
}

/// Delegation part: who stakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegationPart {
    /// No delegation (enterprise addresses)
    None,

    /// Delegation to stake key
    StakeKeyHash(AddrKeyhash),

    /// Delegation to script
    ScriptHash(ScriptHash),

    /// Delegation to pointer
    Pointer(Pointer),
}

/// A Shelley-era address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub network: AddressNetwork,
    pub payment: PaymentPart,
    pub delegation: DelegationPart,
}

impl Address {
    /// Enterprise address for a payment key
    pub fn from_key_hash(network: AddressNetwork, key_hash: AddrKeyhash) -> Self {
        Self {
            network,
            payment: PaymentPart::KeyHash(key_hash),
            delegation: DelegationPart::None,
        }
    }

    /// Enterprise address locked by a script
    pub fn from_script_hash(network: AddressNetwork, script_hash: ScriptHash) -> Self {
        Self {
            network,
            payment: PaymentPart::ScriptHash(script_hash),
            delegation: DelegationPart::None,
        }
    }

    /// The key that must sign to spend from this address, if it is key-locked
    pub fn payment_key_hash(&self) -> Option<AddrKeyhash> {
        match self.payment {
            PaymentPart::KeyHash(hash) => Some(hash),
            PaymentPart::ScriptHash(_) => None,
        }
    }

    /// The script that must be witnessed to spend from this address, if it is script-locked
    pub fn payment_script_hash(&self) -> Option<ScriptHash> {
        match self.payment {
            PaymentPart::KeyHash(_) => None,
            PaymentPart::ScriptHash(hash) => Some(hash),
        }
    }

    /// Raw header-prefixed form as carried in transaction outputs
    pub fn to_bytes(&self) -> Vec<u8> {
        let (payment_hash, payment_bits) = match &self.payment {
            PaymentPart::KeyHash(hash) => (hash, 0u8),
            PaymentPart::ScriptHash(hash) => (hash, 1u8),
        };

        let (delegation, delegation_bits) = match &self.delegation {
            DelegationPart::None => (Vec::new(), 3u8),
            DelegationPart::StakeKeyHash(hash) => (hash.to_vec(), 0u8),
            DelegationPart::ScriptHash(hash) => (hash.to_vec(), 1u8),
            DelegationPart::Pointer(pointer) => {
                let mut data = Vec::new();
                push_varint(&mut data, pointer.slot);
                push_varint(&mut data, pointer.tx_index);
                push_varint(&mut data, pointer.cert_index);
                (data, 2u8)
            }
        };

        let header = (delegation_bits << 5) | (payment_bits << 4) | self.network.header_bits();
        let mut data = Vec::with_capacity(1 + 28 + delegation.len());
        data.push(header);
        data.extend_from_slice(payment_hash.as_ref());
        data.extend(delegation);
        data
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let Some(header) = data.first().copied() else {
            return Err(Error::InvalidAddress("empty address".to_string()));
        };

        let kind = header >> 4;
        if kind > 7 {
            return Err(Error::InvalidAddress(format!(
                "address type {kind} cannot receive payments"
            )));
        }

        let network = match header & 0x0f {
            0 => AddressNetwork::Test,
            1 => AddressNetwork::Main,
            other => {
                return Err(Error::InvalidAddress(format!("unknown network id {other}")));
            }
        };

        let payment_hash = read_hash(data, 1)?;
        let payment = match kind & 0x01 {
            0 => PaymentPart::KeyHash(payment_hash),
            _ => PaymentPart::ScriptHash(payment_hash),
        };

        let rest = &data[29..];
        let delegation = match kind >> 1 {
            0 => DelegationPart::StakeKeyHash(read_hash(data, 29)?),
            1 => DelegationPart::ScriptHash(read_hash(data, 29)?),
            2 => {
                let mut position = 0;
                let slot = read_varint(rest, &mut position)?;
                let tx_index = read_varint(rest, &mut position)?;
                let cert_index = read_varint(rest, &mut position)?;
                if position != rest.len() {
                    return Err(Error::InvalidAddress("trailing pointer bytes".to_string()));
                }
                DelegationPart::Pointer(Pointer {
                    slot,
                    tx_index,
                    cert_index,
                })
            }
            _ => {
                if !rest.is_empty() {
                    return Err(Error::InvalidAddress(
                        "enterprise address has trailing bytes".to_string(),
                    ));
                }
                DelegationPart::None
            }
        };

        let expected_len = match delegation {
            DelegationPart::StakeKeyHash(_) | DelegationPart::ScriptHash(_) => 57,
            _ => data.len(),
        };
        if data.len() != expected_len {
            return Err(Error::InvalidAddress(format!(
                "expected {expected_len} bytes, got {}",
                data.len()
            )));
        }

        Ok(Self {
            network,
            payment,
            delegation,
        })
    }

    /// Read from bech32 (`addr1...` / `addr_test1...`)
    pub fn from_bech32(text: &str) -> Result<Self> {
        let (hrp, data) =
            bech32::decode(text).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        let address = Self::from_bytes(&data)?;
        if hrp.as_str() != address.network.hrp() {
            return Err(Error::InvalidAddress(format!(
                "prefix {hrp} does not match the address network"
            )));
        }
        Ok(address)
    }

    pub fn to_bech32(&self) -> Result<String> {
        let hrp = bech32::Hrp::parse(self.network.hrp())
            .map_err(|e| Error::InvalidAddress(e.to_string()))?;
        bech32::encode::<bech32::Bech32>(hrp, &self.to_bytes())
            .map_err(|e| Error::InvalidAddress(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_bech32() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str(&hex::encode(self.to_bytes())),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_bech32(s)
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_bech32().map_err(serde::ser::Error::custom)?)
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text: String = serde::Deserialize::deserialize(deserializer)?;
        Address::from_bech32(&text).map_err(serde::de::Error::custom)
    }
}

fn read_hash(data: &[u8], offset: usize) -> Result<Hash<28>> {
    data.get(offset..offset + 28)
        .and_then(|slice| Hash::try_from(slice).ok())
        .ok_or_else(|| Error::InvalidAddress(format!("truncated address of {} bytes", data.len())))
}

// CIP-19 variable-length unsigned integers: big-endian 7-bit groups, high bit set on all but
// the last group.
fn push_varint(data: &mut Vec<u8>, num: u64) {
    let mut shift = 7;
    while shift < 64 && (num >> shift) != 0 {
        shift += 7;
    }
    while shift > 7 {
        shift -= 7;
        data.push(((num >> shift) as u8 & 0x7f) | 0x80);
    }
    data.push((num & 0x7f) as u8);
}

fn read_varint(data: &[u8], position: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    while let Some(byte) = data.get(*position).copied() {
        *position += 1;
        if value >> 57 != 0 {
            return Err(Error::InvalidAddress("pointer component overflows".to_string()));
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::InvalidAddress("pointer ran out of data".to_string()))
}

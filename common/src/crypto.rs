//! Hashing and signature helpers

use crate::hash::{AddrKeyhash, Hash, TxHash};
use blake2::{
    digest::{consts::U28, consts::U32},
    Blake2b, Digest,
};
use cryptoxide::ed25519;
use serde_with::{hex::Hex, serde_as};
use std::{fmt, str::FromStr};

/// Blake2b-224 of arbitrary data
pub fn blake2b_224(data: &[u8]) -> Hash<28> {
    let mut hasher = Blake2b::<U28>::new();
    hasher.update(data);
    let mut out = [0u8; 28];
    out.copy_from_slice(&hasher.finalize());
    Hash::new(out)
}

/// Blake2b-256 of arbitrary data
pub fn blake2b_256(data: &[u8]) -> Hash<32> {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Hash::new(out)
}

macro_rules! declare_key_bytes {
    ($name:ident, $size:expr) => {
        #[serde_as]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(#[serde_as(as = "Hex")] [u8; $size]);

        impl $name {
            pub const SIZE: usize = $size;

            pub const fn new(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }

            pub fn as_inner(&self) -> &[u8; $size] {
                &self.0
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;
            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self(bytes.try_into()?))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&hex::encode(self.0)).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; $size];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }
        }
    };
}

declare_key_bytes!(VKey, 32);
declare_key_bytes!(Signature, 64);

impl VKey {
    /// Key hash as it appears in addresses and `Signature` scripts
    pub fn key_hash(&self) -> AddrKeyhash {
        blake2b_224(&self.0)
    }

    /// Check an ed25519 signature over a transaction id
    pub fn verify(&self, tx_id: &TxHash, signature: &Signature) -> bool {
        ed25519::verify(tx_id.as_ref(), &self.0, &signature.0)
    }
}

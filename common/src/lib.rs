// Loom common library - main library exports

pub mod address;
pub mod asset;
pub mod configuration;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod protocol_params;
pub mod script;
pub mod types;

// Flattened re-exports
pub use self::address::{Address, AddressNetwork, DelegationPart, PaymentPart, Pointer};
pub use self::asset::{AssetId, AssetName, MintDelta, MultiAsset, Value};
pub use self::crypto::{Signature, VKey};
pub use self::error::{Error, Result, WitnessKind};
pub use self::hash::{AddrKeyhash, Hash, PolicyId, ScriptHash, TxHash};
pub use self::protocol_params::ProtocolParams;
pub use self::script::NativeScript;
pub use self::types::*;

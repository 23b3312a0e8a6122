//! Error taxonomy for transaction construction, encoding and the external collaborators

use crate::{
    asset::AssetId,
    hash::{AddrKeyhash, ScriptHash, TxHash},
    types::TxInput,
};
use std::fmt;
use thiserror::Error;

/// Which kind of witness a transaction is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WitnessKind {
    /// A verification key signature
    VKey,

    /// A native script
    Script,
}

impl fmt::Display for WitnessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WitnessKind::VKey => write!(f, "vkey"),
            WitnessKind::Script => write!(f, "script"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ---------------------------------------------------------------- construction
    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Policy mismatch: declared {declared}, script hashes to {computed}")]
    PolicyMismatch {
        declared: ScriptHash,
        computed: ScriptHash,
    },

    #[error("Duplicate input {0}")]
    DuplicateInput(TxInput),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Insufficient funds for {asset}: required {required}, available {available}")]
    InsufficientFunds {
        asset: AssetId,
        required: u64,
        available: u64,
    },

    #[error("Change of {change} lovelace is below the minimum UTxO value of {minimum}")]
    ChangeBelowMinimum { change: u64, minimum: u64 },

    #[error("Imbalanced transaction: {asset} has a residual of {residual}")]
    ImbalancedTransaction { asset: AssetId, residual: i128 },

    #[error("Transaction is already sealed")]
    AlreadySealed,

    #[error("No change address set")]
    MissingChangeAddress,

    #[error("Fee did not converge after {attempts} attempts (last fee {fee}, estimate {estimate})")]
    FeeDidNotConverge {
        attempts: usize,
        fee: u64,
        estimate: u64,
    },

    #[error("Transaction size {size} exceeds the maximum of {maximum} bytes")]
    TransactionTooLarge { size: usize, maximum: usize },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // ---------------------------------------------------------------- encoding
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    // ---------------------------------------------------------------- witnessing
    #[error("Body {actual} is not the sealed transaction {expected}")]
    BodyMismatch { expected: TxHash, actual: TxHash },

    #[error("Missing {kind} witness for {id}")]
    MissingWitness { kind: WitnessKind, id: String },

    #[error("Signature from key {key_hash} does not verify")]
    InvalidWitness { key_hash: AddrKeyhash },

    #[error("Script {script_hash} is not required by the transaction")]
    ExtraneousScript { script_hash: ScriptHash },

    #[error("Script {script_hash} is not satisfied by the supplied signatures")]
    ScriptNotSatisfied { script_hash: ScriptHash },

    // ---------------------------------------------------------------- collaborators
    #[error("Signing rejected by user")]
    UserRejected,

    #[error("Signing unavailable: {0}")]
    SigningUnavailable(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),
}

impl Error {
    /// Only the signing and submission collaborators fail in ways worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::UserRejected
                | Error::SigningUnavailable(_)
                | Error::Rejected(_)
                | Error::NetworkUnavailable(_)
        )
    }

    pub fn malformed(reason: impl fmt::Display) -> Self {
        Error::MalformedEncoding(reason.to_string())
    }
}

impl From<minicbor::decode::Error> for Error {
    fn from(e: minicbor::decode::Error) -> Self {
        Error::MalformedEncoding(e.to_string())
    }
}

impl<E: fmt::Display> From<minicbor::encode::Error<E>> for Error {
    fn from(e: minicbor::encode::Error<E>) -> Self {
        Error::Encoding(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Error::UserRejected, true)]
    #[test_case(Error::SigningUnavailable("locked".into()), true)]
    #[test_case(Error::Rejected("bad".into()), true)]
    #[test_case(Error::NetworkUnavailable("down".into()), true)]
    #[test_case(Error::AlreadySealed, false)]
    #[test_case(Error::MalformedEncoding("short".into()), false)]
    #[test_case(Error::MissingChangeAddress, false)]
    fn retryable_classes(error: Error, expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }

    #[test]
    fn messages_name_the_violation() {
        let error = Error::ChangeBelowMinimum {
            change: 900_000,
            minimum: 1_000_000,
        };
        assert_eq!(
            error.to_string(),
            "Change of 900000 lovelace is below the minimum UTxO value of 1000000"
        );
    }
}

//! Loom transaction construction: coin selection, balancing and witness assembly

pub mod builder;
pub mod interfaces;
pub mod recipes;
pub mod selection;
pub mod transaction;
pub mod witness;

pub use builder::{MAX_FEE_ROUNDS, TransactionBuilder};
pub use interfaces::{
    InMemorySpendableSet, Signer, SpendableSetProvider, Submitter, sign_and_submit,
};
pub use recipes::{
    all_of_signature_policy, mint_to_self, mint_under_policy, send_to_self, signature_policy,
};
pub use witness::{WitnessAssembler, WitnessRequirements};

//! Ready-made transactions for the common wallet flows

use loom_common::{
    Address, AssetName, Error, Lovelace, NativeScript, ProtocolParams, Result, Utxo, Value,
};
use tracing::info;

use crate::builder::TransactionBuilder;

/// Lovelace sent along with freshly minted tokens
pub const MINT_CARRIER_LOVELACE: Lovelace = 2_000_000;

/// Single-signature policy keyed by the payment key of `address`
pub fn signature_policy(address: &Address) -> Result<NativeScript> {
    let key_hash = address.payment_key_hash().ok_or_else(|| {
        Error::InvalidAddress(format!("{address} is not locked by a payment key"))
    })?;
    Ok(NativeScript::Signature(key_hash))
}

/// The signature policy of `address` wrapped in a one-element `all` script
///
/// Mints under a different policy id than `signature_policy`, though the same key satisfies it.
pub fn all_of_signature_policy(address: &Address) -> Result<NativeScript> {
    Ok(NativeScript::AllOf(vec![signature_policy(address)?]))
}

/// Pay `lovelace` back to `change`, funded from `pool`
pub fn send_to_self(
    params: ProtocolParams,
    change: Address,
    pool: Vec<Utxo>,
    lovelace: Lovelace,
) -> Result<TransactionBuilder> {
    let mut builder = TransactionBuilder::new(params);
    builder
        .add_output(change, Value::lovelace(lovelace))?
        .set_change_address(change)?
        .with_spendable(pool)?;
    builder.complete()?;
    info!("Built send of {lovelace} lovelace to {change}");
    Ok(builder)
}

/// Mint `quantity` of `asset_name` under the signature policy of `change` and send it there
/// with 2 ADA
pub fn mint_to_self(
    params: ProtocolParams,
    change: Address,
    pool: Vec<Utxo>,
    asset_name: AssetName,
    quantity: u64,
) -> Result<TransactionBuilder> {
    let script = signature_policy(&change)?;
    mint_under_policy(params, change, pool, script, asset_name, quantity)
}

/// As `mint_to_self`, with the caller choosing the policy script
pub fn mint_under_policy(
    params: ProtocolParams,
    change: Address,
    pool: Vec<Utxo>,
    script: NativeScript,
    asset_name: AssetName,
    quantity: u64,
) -> Result<TransactionBuilder> {
    let policy = script.hash()?;
    let signed = i64::try_from(quantity)
        .map_err(|_| Error::InvalidValue(format!("mint quantity {quantity} is too large")))?;

    let mut builder = TransactionBuilder::new(params);
    builder
        .add_mint(policy, asset_name, signed, script)?
        .add_output(
            change,
            Value::lovelace(MINT_CARRIER_LOVELACE).with_asset(policy, asset_name, quantity),
        )?
        .set_change_address(change)?
        .with_spendable(pool)?;
    builder.complete()?;
    info!("Built mint of {quantity} {asset_name} under {policy}");
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_common::{AddressNetwork, AssetId, Hash};
    use loom_test_utils::{TestKey, ada_utxo};

    fn pool(owner: &TestKey) -> Vec<Utxo> {
        vec![
            ada_utxo(1, 0, owner.address(), 3_000_000),
            ada_utxo(2, 0, owner.address(), 10_000_000),
        ]
    }

    #[test]
    fn policy_follows_payment_key() {
        let owner = TestKey::new(1);
        assert_eq!(
            signature_policy(&owner.address()).unwrap(),
            NativeScript::Signature(owner.key_hash())
        );
    }

    #[test]
    fn script_address_has_no_signature_policy() {
        let address = Address::from_script_hash(AddressNetwork::Test, Hash::new([1; 28]));
        assert!(matches!(signature_policy(&address), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn send_returns_two_ada_and_change() {
        let owner = TestKey::new(1);
        let builder =
            send_to_self(ProtocolParams::default(), owner.address(), pool(&owner), 2_000_000)
                .unwrap();
        let body = builder.body().unwrap();
        assert_eq!(body.outputs()[0].value, Value::lovelace(2_000_000));
        assert!(body.outputs().iter().all(|o| o.address == owner.address()));
        assert_eq!(body.inputs().len(), 1);
    }

    #[test]
    fn mint_carries_token_with_two_ada() {
        let owner = TestKey::new(1);
        let name = AssetName::new(b"TEST").unwrap();
        let builder =
            mint_to_self(ProtocolParams::default(), owner.address(), pool(&owner), name, 1)
                .unwrap();

        let policy = signature_policy(&owner.address()).unwrap().hash().unwrap();
        let body = builder.body().unwrap();
        let carrier = &body.outputs()[0].value;
        assert_eq!(carrier.coin(), MINT_CARRIER_LOVELACE);
        assert_eq!(carrier.quantity_of(&AssetId::Native(policy, name)), 1);
        assert_eq!(body.mint().unwrap().quantity_of(&policy, &name), 1);

        let requirements = builder.witness_requirements().unwrap();
        assert_eq!(requirements.mint_scripts.keys().collect::<Vec<_>>(), vec![&policy]);
    }

    #[test]
    fn all_of_policy_mints_under_its_own_id() {
        let owner = TestKey::new(1);
        let name = AssetName::new(b"TEST").unwrap();
        let script = all_of_signature_policy(&owner.address()).unwrap();
        assert_eq!(
            script,
            NativeScript::AllOf(vec![NativeScript::Signature(owner.key_hash())])
        );
        let policy = script.hash().unwrap();
        assert_ne!(policy, signature_policy(&owner.address()).unwrap().hash().unwrap());

        let builder = mint_under_policy(
            ProtocolParams::default(),
            owner.address(),
            pool(&owner),
            script.clone(),
            name,
            5,
        )
        .unwrap();
        let body = builder.body().unwrap();
        assert_eq!(body.mint().unwrap().quantity_of(&policy, &name), 5);

        let assembler = builder.assembler().unwrap();
        let scripts = assembler.requirements().scripts();
        assert_eq!(scripts, vec![script]);
        let signature = owner.witness(&body.id().unwrap());
        assert!(assembler.assemble(body, &[signature], &scripts).is_ok());
    }

    #[test]
    fn oversized_quantity_is_refused() {
        let owner = TestKey::new(1);
        let name = AssetName::new(b"TEST").unwrap();
        let result =
            mint_to_self(ProtocolParams::default(), owner.address(), pool(&owner), name, u64::MAX);
        assert!(matches!(result, Err(Error::InvalidValue(_))));
    }
}

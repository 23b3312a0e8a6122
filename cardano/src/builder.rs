//! Transaction builder
//!
//! A builder accumulates inputs, outputs and mints while `Open`. `complete()` moves it through
//! `Balancing`, where inputs are selected, the fee is settled and change is computed, and on
//! success leaves it `Sealed` with an immutable body. Every mutation of a sealed builder fails
//! with `AlreadySealed`; a failed `complete()` returns the builder to `Open` untouched.

use std::collections::{BTreeMap, BTreeSet};

use loom_codec::UnsignedTransactionBody;
use loom_common::{
    Address, AssetId, AssetName, Error, Lovelace, MintDelta, NativeScript, PolicyId,
    ProtocolParams, Result, ScriptHash, TxInput, TxOutput, Utxo, ValidityInterval, Value,
    WitnessKind,
};
use tracing::{debug, info, warn};

use crate::{
    selection::select,
    transaction::{estimated_size, minimum_fee},
    witness::{WitnessAssembler, WitnessRequirements},
};

/// Fee corrections after the first estimate before giving up
///
/// The fee only changes the encoded size through the integer widths of the fee and change
/// fields. Each width boundary is crossed at most once, so this bound is never reached.
pub const MAX_FEE_ROUNDS: usize = 3;

#[derive(Debug, Clone, Default)]
struct Draft {
    inputs: BTreeMap<TxInput, Utxo>,
    outputs: Vec<TxOutput>,
    mint: MintDelta,
    mint_scripts: BTreeMap<PolicyId, NativeScript>,
    spend_scripts: BTreeMap<ScriptHash, NativeScript>,
    change_address: Option<Address>,
    spendable: Option<Vec<Utxo>>,
    validity: ValidityInterval,
}

#[derive(Debug, Clone)]
enum BuilderState {
    Open(Box<Draft>),
    Balancing,
    Sealed {
        body: UnsignedTransactionBody,
        requirements: WitnessRequirements,
    },
}

/// A body whose fee has reached its fixed point
struct Settlement {
    body: UnsignedTransactionBody,
    change: Option<Value>,
}

impl Settlement {
    /// Lovelace in the change output, when there is one and it is too small to exist
    fn change_below(&self, minimum: Lovelace) -> Option<Lovelace> {
        self.change.as_ref().map(Value::coin).filter(|coin| *coin < minimum)
    }
}

/// What the balancing pass works from once the draft is fixed
struct Ledger<'a> {
    draft: &'a Draft,
    change_address: Address,

    /// Explicit inputs plus anything minted
    provided: Value,

    /// Outputs plus anything burnt
    needed: Value,
    minted: Value,
    burnt: Value,
}

impl Ledger<'_> {
    /// Scripts the witness set will carry when `inputs` are spent: every mint script plus the
    /// spending script of each script-locked input
    fn scripts(&self, inputs: &[&Utxo]) -> Vec<NativeScript> {
        let spending: BTreeSet<ScriptHash> =
            inputs.iter().filter_map(|u| u.output.address.payment_script_hash()).collect();
        self.draft
            .mint_scripts
            .values()
            .chain(
                spending
                    .iter()
                    .filter(|hash| !self.draft.mint_scripts.contains_key(*hash))
                    .filter_map(|hash| self.draft.spend_scripts.get(hash)),
            )
            .cloned()
            .collect()
    }

    /// Key-locked outputs always can be; script-locked ones only when their script is known
    fn can_witness(&self, utxo: &Utxo) -> bool {
        utxo.output
            .address
            .payment_script_hash()
            .is_none_or(|hash| self.draft.spend_scripts.contains_key(&hash))
    }

    fn check_spend_scripts<'u>(&self, inputs: impl IntoIterator<Item = &'u Utxo>) -> Result<()> {
        for utxo in inputs {
            if let Some(hash) = utxo.output.address.payment_script_hash() {
                if !self.draft.spend_scripts.contains_key(&hash) {
                    return Err(Error::MissingWitness {
                        kind: WitnessKind::Script,
                        id: hash.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    params: ProtocolParams,
    state: BuilderState,
}

impl TransactionBuilder {
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            state: BuilderState::Open(Box::default()),
        }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.state, BuilderState::Sealed { .. })
    }

    fn draft_mut(&mut self) -> Result<&mut Draft> {
        match &mut self.state {
            BuilderState::Open(draft) => Ok(&mut **draft),
            _ => Err(Error::AlreadySealed),
        }
    }

    /// Spend a resolved output
    ///
    /// An output locked by a script also needs that script, through `add_script_input` or
    /// `with_spend_script`.
    pub fn add_input(&mut self, utxo: Utxo) -> Result<&mut Self> {
        let draft = self.draft_mut()?;
        if draft.inputs.contains_key(&utxo.input) {
            return Err(Error::DuplicateInput(utxo.input));
        }
        debug!("Adding input {}", utxo.input);
        draft.inputs.insert(utxo.input, utxo);
        Ok(self)
    }

    /// Spend an output locked by `script`
    pub fn add_script_input(&mut self, utxo: Utxo, script: NativeScript) -> Result<&mut Self> {
        self.draft_mut()?;
        let script_hash = script.hash()?;
        if utxo.output.address.payment_script_hash() != Some(script_hash) {
            return Err(Error::InvalidScript(format!(
                "{} is not locked by script {script_hash}",
                utxo.input
            )));
        }
        self.with_spend_script(script)?.add_input(utxo)
    }

    /// Make outputs locked by `script` spendable, whether added explicitly or drawn from the
    /// spendable pool
    pub fn with_spend_script(&mut self, script: NativeScript) -> Result<&mut Self> {
        let draft = self.draft_mut()?;
        let script_hash = script.hash()?;
        debug!("Adding spending script {script_hash}");
        draft.spend_scripts.insert(script_hash, script);
        Ok(self)
    }

    pub fn add_output(&mut self, address: Address, value: Value) -> Result<&mut Self> {
        let draft = self.draft_mut()?;
        Value::sum(draft.outputs.iter().map(|o| &o.value).chain([&value]))?;
        debug!("Adding output of {} lovelace to {address}", value.coin());
        draft.outputs.push(TxOutput::new(address, value));
        Ok(self)
    }

    /// Add an output from signed quantities, as they arrive from untyped callers
    pub fn add_output_signed(
        &mut self,
        address: Address,
        lovelace: i64,
        assets: impl IntoIterator<Item = (PolicyId, AssetName, i64)>,
    ) -> Result<&mut Self> {
        let lovelace = u64::try_from(lovelace)
            .map_err(|_| Error::InvalidValue(format!("negative lovelace {lovelace}")))?;
        let assets: MintDelta = assets.into_iter().collect();
        let value = Value::lovelace(lovelace).checked_add(&Value::try_from(&assets)?)?;
        self.add_output(address, value)
    }

    /// Mint (positive) or burn (negative) under `script`, whose hash must be `policy`
    pub fn add_mint(
        &mut self,
        policy: PolicyId,
        name: AssetName,
        quantity: i64,
        script: NativeScript,
    ) -> Result<&mut Self> {
        let draft = self.draft_mut()?;
        let computed = script.hash()?;
        if computed != policy {
            return Err(Error::PolicyMismatch {
                declared: policy,
                computed,
            });
        }

        draft.mint.add(policy, name, quantity)?;
        draft.mint_scripts.insert(policy, script);
        debug!("Adding mint of {quantity} {name} under {policy}");
        Ok(self)
    }

    pub fn set_change_address(&mut self, address: Address) -> Result<&mut Self> {
        self.draft_mut()?.change_address = Some(address);
        Ok(self)
    }

    /// Outputs that `complete()` may draw on when the explicit inputs fall short
    pub fn with_spendable(&mut self, pool: Vec<Utxo>) -> Result<&mut Self> {
        self.draft_mut()?.spendable = Some(pool);
        Ok(self)
    }

    pub fn set_validity_interval(&mut self, validity: ValidityInterval) -> Result<&mut Self> {
        self.draft_mut()?.validity = validity;
        Ok(self)
    }

    /// Balance and seal
    pub fn complete(&mut self) -> Result<UnsignedTransactionBody> {
        let draft = match std::mem::replace(&mut self.state, BuilderState::Balancing) {
            BuilderState::Open(draft) => draft,
            other => {
                self.state = other;
                return Err(Error::AlreadySealed);
            }
        };

        match self.balance(&draft) {
            Ok((body, requirements)) => {
                info!(
                    "Sealed transaction {}: {} inputs, {} outputs, fee {}",
                    requirements.tx_id,
                    body.inputs().len(),
                    body.outputs().len(),
                    body.fee()
                );
                self.state = BuilderState::Sealed {
                    body: body.clone(),
                    requirements,
                };
                Ok(body)
            }
            Err(e) => {
                debug!("Balancing failed: {e}");
                self.state = BuilderState::Open(draft);
                Err(e)
            }
        }
    }

    /// The sealed body, once `complete()` has succeeded
    pub fn body(&self) -> Option<&UnsignedTransactionBody> {
        match &self.state {
            BuilderState::Sealed { body, .. } => Some(body),
            _ => None,
        }
    }

    /// What the witnesses must cover, once `complete()` has succeeded
    pub fn witness_requirements(&self) -> Option<&WitnessRequirements> {
        match &self.state {
            BuilderState::Sealed { requirements, .. } => Some(requirements),
            _ => None,
        }
    }

    pub fn assembler(&self) -> Option<WitnessAssembler> {
        self.witness_requirements().cloned().map(WitnessAssembler::new)
    }

    fn balance(&self, draft: &Draft) -> Result<(UnsignedTransactionBody, WitnessRequirements)> {
        let change_address = draft.change_address.ok_or(Error::MissingChangeAddress)?;
        let (minted, burnt) = draft.mint.pruned().split();
        let explicit = Value::sum(draft.inputs.values().map(Utxo::value))?;
        let ledger = Ledger {
            draft,
            change_address,
            provided: explicit.checked_add(&minted)?,
            needed: Value::sum(draft.outputs.iter().map(|o| &o.value))?.checked_add(&burnt)?,
            minted,
            burnt,
        };
        ledger.check_spend_scripts(draft.inputs.values())?;

        let mut selected = self.select_inputs(&ledger, 0)?;
        let mut settlement = self.settle_fee(&ledger, &selected)?;

        let minimum = self.params.min_utxo_lovelace;
        if let (Some(change), Some(_)) = (settlement.change_below(minimum), &draft.spendable) {
            warn!("Change of {change} lovelace is below {minimum}, selecting again with headroom");
            selected = self.select_inputs(&ledger, minimum)?;
            settlement = self.settle_fee(&ledger, &selected)?;
        }

        if let Some(change) = settlement.change_below(minimum) {
            return Err(Error::ChangeBelowMinimum { change, minimum });
        }

        let inputs: Vec<&Utxo> = draft.inputs.values().chain(selected.iter()).collect();
        let body = settlement.body;
        self.verify_balance(&ledger, &inputs, &body)?;

        let scripts = ledger.scripts(&inputs);
        let size = estimated_size(&body, signer_count(&inputs, &scripts), &scripts)?;
        if size > self.params.max_tx_size {
            return Err(Error::TransactionTooLarge {
                size,
                maximum: self.params.max_tx_size,
            });
        }

        let requirements = WitnessRequirements::for_body(
            &body,
            &inputs,
            &draft.mint_scripts,
            &draft.spend_scripts,
        )?;
        Ok((body, requirements))
    }

    /// Draw on the spendable pool for whatever the explicit inputs and mints do not cover,
    /// plus `headroom` extra lovelace
    ///
    /// Without a pool nothing is selected and any shortfall surfaces when the fee is settled.
    fn select_inputs(&self, ledger: &Ledger<'_>, headroom: Lovelace) -> Result<Vec<Utxo>> {
        let Some(spendable) = &ledger.draft.spendable else {
            return Ok(Vec::new());
        };

        let pool: BTreeMap<TxInput, &Utxo> = spendable
            .iter()
            .filter(|utxo| !ledger.draft.inputs.contains_key(&utxo.input))
            .filter(|utxo| ledger.can_witness(utxo))
            .map(|utxo| (utxo.input, utxo))
            .collect();
        let candidates: Vec<(TxInput, Value)> =
            pool.values().map(|utxo| (utxo.input, utxo.output.value.clone())).collect();

        let needed = ledger.needed.checked_add(&Value::lovelace(headroom))?;
        let target = needed.saturating_sub(&ledger.provided);
        let surplus = ledger.provided.coin().saturating_sub(needed.coin());

        // Fee with the fee field at full width and every input flowing to change, so it never
        // undershoots the settled fee
        let conservative_fee = |picked: &[(TxInput, Value)], _output_count: usize| {
            let inputs: Vec<&Utxo> = ledger
                .draft
                .inputs
                .values()
                .chain(picked.iter().filter_map(|(input, _)| pool.get(input).copied()))
                .collect();
            let change = Value::sum(picked.iter().map(|(_, value)| value))?
                .checked_add(&ledger.provided)?;
            let body = self.draft_body(ledger, &inputs, Some(change), Lovelace::MAX);
            let scripts = ledger.scripts(&inputs);
            let fee = minimum_fee(&self.params, &body, signer_count(&inputs, &scripts), &scripts)?;
            Ok(fee.saturating_sub(surplus))
        };

        let output_count = ledger.draft.outputs.len() + 1;
        let picked = select(&candidates, &target, conservative_fee, output_count).map_err(
            |e| match e {
                // Report totals rather than what was missing from the pool alone
                Error::InsufficientFunds {
                    asset,
                    required,
                    available,
                } => {
                    let provided = ledger.provided.quantity_of(&asset);
                    Error::InsufficientFunds {
                        required: required.saturating_add(provided),
                        available: available.saturating_add(provided),
                        asset,
                    }
                }
                other => other,
            },
        )?;

        debug!("Selected {} of {} spendable outputs", picked.len(), pool.len());
        Ok(picked
            .iter()
            .filter_map(|(input, _)| pool.get(input).map(|utxo| (*utxo).clone()))
            .collect())
    }

    /// Iterate the fee to its fixed point for a fixed set of inputs
    fn settle_fee(&self, ledger: &Ledger<'_>, selected: &[Utxo]) -> Result<Settlement> {
        let inputs: Vec<&Utxo> = ledger.draft.inputs.values().chain(selected.iter()).collect();
        let available =
            Value::sum(selected.iter().map(Utxo::value))?.checked_add(&ledger.provided)?;
        let scripts = ledger.scripts(&inputs);
        let signers = signer_count(&inputs, &scripts);

        let mut fee: Lovelace = 0;
        let mut estimate: Lovelace = 0;
        for round in 0..=MAX_FEE_ROUNDS {
            let required = ledger.needed.checked_add(&Value::lovelace(fee))?;
            if let Some((asset, quantity)) =
                required.legs().find(|(asset, quantity)| available.quantity_of(asset) < *quantity)
            {
                return Err(Error::InsufficientFunds {
                    available: available.quantity_of(&asset),
                    required: quantity,
                    asset,
                });
            }

            let remainder = available.saturating_sub(&required);
            let change = (!remainder.is_zero()).then_some(remainder);
            let body = self.draft_body(ledger, &inputs, change.clone(), fee);

            estimate = minimum_fee(&self.params, &body, signers, &scripts)?;
            debug!("Fee round {round}: fee {fee}, estimate {estimate}");
            if fee >= estimate {
                return Ok(Settlement { body, change });
            }
            fee = fee.max(estimate);
        }

        Err(Error::FeeDidNotConverge {
            attempts: MAX_FEE_ROUNDS,
            fee,
            estimate,
        })
    }

    fn draft_body(
        &self,
        ledger: &Ledger<'_>,
        inputs: &[&Utxo],
        change: Option<Value>,
        fee: Lovelace,
    ) -> UnsignedTransactionBody {
        let mut outputs = ledger.draft.outputs.clone();
        if let Some(change) = change {
            outputs.push(TxOutput::new(ledger.change_address, change));
        }
        UnsignedTransactionBody::new(inputs.iter().map(|u| u.input).collect(), outputs, fee)
            .with_mint(&ledger.draft.mint)
            .with_validity(ledger.draft.validity)
    }

    /// inputs + minted == outputs + fee + burnt, for every asset
    fn verify_balance(
        &self,
        ledger: &Ledger<'_>,
        inputs: &[&Utxo],
        body: &UnsignedTransactionBody,
    ) -> Result<()> {
        let consumed = Value::sum(inputs.iter().map(|u| u.value()))?.checked_add(&ledger.minted)?;
        let produced = Value::sum(body.outputs().iter().map(|o| &o.value))?
            .checked_add(&Value::lovelace(body.fee()))?
            .checked_add(&ledger.burnt)?;

        let assets: BTreeSet<AssetId> =
            consumed.legs().chain(produced.legs()).map(|(asset, _)| asset).collect();
        for asset in assets {
            let residual =
                consumed.quantity_of(&asset) as i128 - produced.quantity_of(&asset) as i128;
            if residual != 0 {
                return Err(Error::ImbalancedTransaction { asset, residual });
            }
        }
        Ok(())
    }
}

/// Distinct keys expected to sign: input owners plus every key a witnessing script mentions
fn signer_count(inputs: &[&Utxo], scripts: &[NativeScript]) -> usize {
    inputs
        .iter()
        .filter_map(|u| u.output.address.payment_key_hash())
        .chain(scripts.iter().flat_map(NativeScript::key_hashes))
        .collect::<BTreeSet<_>>()
        .len()
}

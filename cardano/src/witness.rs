//! Witness assembly
//!
//! A sealed builder knows which keys and scripts its transaction needs. The assembler checks
//! what a signer hands back against that before producing a `SignedTransaction`.

use std::collections::{BTreeMap, BTreeSet};

use loom_codec::{SignedTransaction, UnsignedTransactionBody, VKeyWitness, WitnessSet};
use loom_common::{
    AddrKeyhash, Error, NativeScript, PolicyId, Result, ScriptHash, Signature, Slot, TxHash,
    Utxo, VKey, ValidityInterval, WitnessKind,
};
use tracing::debug;

/// What the witness set of a sealed transaction has to cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessRequirements {
    pub tx_id: TxHash,

    /// Payment key hashes of key-locked inputs
    pub signers: BTreeSet<AddrKeyhash>,

    /// Payment script hashes of script-locked inputs
    pub spend_scripts: BTreeSet<ScriptHash>,

    /// Scripts for the policies the body actually mints or burns under
    pub mint_scripts: BTreeMap<PolicyId, NativeScript>,

    /// Spending scripts the builder was given, for the script-locked inputs it spends
    pub known_spend_scripts: BTreeMap<ScriptHash, NativeScript>,

    pub validity: ValidityInterval,
}

impl WitnessRequirements {
    pub fn for_body(
        body: &UnsignedTransactionBody,
        inputs: &[&Utxo],
        mint_scripts: &BTreeMap<PolicyId, NativeScript>,
        spend_scripts: &BTreeMap<ScriptHash, NativeScript>,
    ) -> Result<Self> {
        let signers = inputs.iter().filter_map(|u| u.output.address.payment_key_hash()).collect();
        let spending: BTreeSet<ScriptHash> =
            inputs.iter().filter_map(|u| u.output.address.payment_script_hash()).collect();
        let known_spend_scripts = spend_scripts
            .iter()
            .filter(|(hash, _)| spending.contains(*hash) && !mint_scripts.contains_key(*hash))
            .map(|(hash, script)| (*hash, script.clone()))
            .collect();

        let minted: BTreeSet<&PolicyId> =
            body.mint().map(|mint| mint.policies().collect()).unwrap_or_default();
        let mint_scripts = mint_scripts
            .iter()
            .filter(|(policy, _)| minted.contains(policy))
            .map(|(policy, script)| (*policy, script.clone()))
            .collect();

        Ok(Self {
            tx_id: body.id()?,
            signers,
            spend_scripts: spending,
            mint_scripts,
            known_spend_scripts,
            validity: body.validity(),
        })
    }

    /// Hashes of every script the witness set must carry
    pub fn required_scripts(&self) -> BTreeSet<ScriptHash> {
        self.spend_scripts.iter().chain(self.mint_scripts.keys()).copied().collect()
    }

    /// The scripts the builder already knows, ready to hand to `assemble`
    pub fn scripts(&self) -> Vec<NativeScript> {
        self.mint_scripts.values().chain(self.known_spend_scripts.values()).cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub struct WitnessAssembler {
    requirements: WitnessRequirements,
    slot: Option<Slot>,
}

impl WitnessAssembler {
    pub fn new(requirements: WitnessRequirements) -> Self {
        Self {
            requirements,
            slot: None,
        }
    }

    /// Also check time-locked scripts against the slot the transaction is expected to land in
    pub fn at_slot(mut self, slot: Slot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn requirements(&self) -> &WitnessRequirements {
        &self.requirements
    }

    /// Combine `body` with the supplied signatures and scripts
    ///
    /// Every signature must verify over the transaction id, every script must be one the
    /// transaction needs, and together they must cover each required key and script.
    pub fn assemble(
        &self,
        body: &UnsignedTransactionBody,
        signatures: &[(VKey, Signature)],
        scripts: &[NativeScript],
    ) -> Result<SignedTransaction> {
        let tx_id = body.id()?;
        if tx_id != self.requirements.tx_id {
            return Err(Error::BodyMismatch {
                expected: self.requirements.tx_id,
                actual: tx_id,
            });
        }

        for (vkey, signature) in signatures {
            if !vkey.verify(&tx_id, signature) {
                return Err(Error::InvalidWitness {
                    key_hash: vkey.key_hash(),
                });
            }
        }

        let required = self.requirements.required_scripts();
        let mut supplied: BTreeMap<ScriptHash, &NativeScript> = BTreeMap::new();
        for script in scripts {
            let script_hash = script.hash()?;
            if !required.contains(&script_hash) {
                return Err(Error::ExtraneousScript { script_hash });
            }
            supplied.insert(script_hash, script);
        }

        let signed: BTreeSet<AddrKeyhash> =
            signatures.iter().map(|(vkey, _)| vkey.key_hash()).collect();
        if let Some(missing) = self.requirements.signers.difference(&signed).next() {
            return Err(Error::MissingWitness {
                kind: WitnessKind::VKey,
                id: missing.to_string(),
            });
        }

        if let Some(missing) = required.iter().find(|hash| !supplied.contains_key(hash)) {
            return Err(Error::MissingWitness {
                kind: WitnessKind::Script,
                id: missing.to_string(),
            });
        }

        for (script_hash, script) in &supplied {
            let satisfied = script.eval_in_interval(&signed, &self.requirements.validity)
                && self.slot.map_or(true, |slot| script.eval(&signed, slot));
            if !satisfied {
                return Err(Error::ScriptNotSatisfied {
                    script_hash: *script_hash,
                });
            }
        }

        let witnesses = WitnessSet::new(
            signatures.iter().map(|(vkey, signature)| VKeyWitness::new(*vkey, *signature)),
            supplied.into_values().cloned(),
        )?;
        debug!(
            "Assembled {tx_id} with {} signatures and {} scripts",
            witnesses.vkey_witnesses().len(),
            witnesses.native_scripts().len()
        );
        Ok(SignedTransaction::new(body.clone(), witnesses))
    }
}

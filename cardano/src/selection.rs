//! Largest-first coin selection
//!
//! Each round re-estimates the fee for the inputs chosen so far, finds the asset that is
//! furthest from its target and takes the unspent output holding the most of it. Every round
//! either finishes or consumes one candidate, so selection ends within `available.len()` rounds.

use loom_common::{AssetId, Error, Lovelace, Result, TxInput, Value};
use tracing::debug;

/// Choose inputs from `available` covering `target` plus the fee
///
/// `fee_estimator` is called with the inputs selected so far and `output_count`, and returns
/// the lovelace that must be found on top of `target`. Candidates holding the same amount are
/// taken in ascending input order, so the result depends only on the arguments.
pub fn select<F>(
    available: &[(TxInput, Value)],
    target: &Value,
    fee_estimator: F,
    output_count: usize,
) -> Result<Vec<(TxInput, Value)>>
where
    F: Fn(&[(TxInput, Value)], usize) -> Result<Lovelace>,
{
    let mut candidates: Vec<&(TxInput, Value)> = available.iter().collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    candidates.dedup_by(|a, b| a.0 == b.0);

    let mut selected: Vec<(TxInput, Value)> = Vec::new();
    let mut gathered = Value::default();

    loop {
        let fee = fee_estimator(&selected, output_count)?;
        let required = target.checked_add(&Value::lovelace(fee))?;
        let shortfall = required.saturating_sub(&gathered);

        let Some((asset, missing)) = largest_shortfall(&shortfall) else {
            debug!(
                "Selected {} inputs for {} lovelace with fee {fee}",
                selected.len(),
                gathered.coin()
            );
            return Ok(selected);
        };

        let best = candidates
            .iter()
            .enumerate()
            .map(|(index, (_, value))| (index, value.quantity_of(&asset)))
            .filter(|(_, quantity)| *quantity > 0)
            // Earliest wins ties; candidates are in input order
            .fold(None, |best: Option<(usize, u64)>, (index, quantity)| match best {
                Some((_, held)) if held >= quantity => best,
                _ => Some((index, quantity)),
            });

        let Some((index, quantity)) = best else {
            return Err(Error::InsufficientFunds {
                available: gathered.quantity_of(&asset),
                required: required.quantity_of(&asset),
                asset,
            });
        };

        let (input, value) = candidates.remove(index).clone();
        debug!("Selecting {input} holding {quantity} of {asset} ({missing} short)");
        gathered = gathered.checked_add(&value)?;
        selected.push((input, value));
    }
}

/// The asset furthest below target, lovelace first on ties
fn largest_shortfall(shortfall: &Value) -> Option<(AssetId, u64)> {
    shortfall
        .legs()
        .filter(|(_, quantity)| *quantity > 0)
        .fold(None, |best, (asset, quantity)| match best {
            Some((_, most)) if most >= quantity => best,
            _ => Some((asset, quantity)),
        })
}

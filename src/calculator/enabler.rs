//! Earliest `dt > 0` at which a branching influence or update would take a
//! different branch than it takes now.

use tracing::debug;

use super::error::CalcError;
use super::query::{solve_min, Binding, Query, Solved, TimeFloor};
use super::report::{Candidate, Outcome};
use crate::cache::{CachedModifier, Shape};
use crate::model::{ModifierId, PortId};
use crate::modifier_map::ModifierMap;
use crate::symbolic::Formula;

/// Ports the modifier's branch conditions can observe.
fn seeds(cached: &CachedModifier) -> Vec<PortId> {
    match cached.shape {
        Shape::Influence { source, target } => vec![source, target],
        Shape::Update { target, .. } => cached.facts.reads().chain([target]).collect(),
        Shape::Transition { .. } => Vec::new(),
    }
}

/// Primary constraints of every map modifier except `id`.
pub(crate) fn primaries(
    query: &Query,
    map: &ModifierMap,
    id: ModifierId,
) -> Result<Vec<Formula>, CalcError> {
    let mut out = Vec::new();
    for &other in map.modifiers() {
        if other == id {
            continue;
        }
        let cached = query
            .cache
            .modifier(other)
            .ok_or(CalcError::UnknownModifier(other))?;
        if let Some(primary) = &cached.primary {
            out.push(primary.clone());
        }
    }
    Ok(out)
}

/// One candidate per modifier: the earliest flip over all of its branch
/// conditions, labelled with the condition that flips first.
pub(crate) fn condition_change(query: &Query, id: ModifierId) -> Result<Outcome, CalcError> {
    let cached = query
        .cache
        .modifier(id)
        .ok_or(CalcError::UnknownModifier(id))?;
    if matches!(cached.shape, Shape::Transition { .. }) {
        return Err(CalcError::NotBranching(id));
    }
    let conditions = cached
        .conditions
        .as_ref()
        .ok_or(CalcError::NotBranching(id))?;

    let map = ModifierMap::build(&query.cache, &query.snapshot, seeds(cached))?;
    let mut context = primaries(query, &map, id)?;
    context.extend(conditions.auxiliary.iter().cloned());

    let binding = Binding::new(&query.cache, query.isolation);
    let mut best: Option<Candidate> = None;
    let mut undecidable: Option<String> = None;
    for (label, flip) in &conditions.labelled {
        let mut formulas = context.clone();
        formulas.push(flip.clone());
        let problem = query.problem(&binding, TimeFloor::Positive, &map, formulas)?;
        match solve_min(query.backend.as_ref(), &problem) {
            Solved::At(time, exactness) => {
                let candidate = Candidate {
                    time,
                    modifier: id,
                    label: Some(label.clone()),
                    exactness,
                };
                if best.as_ref().map_or(true, |b| candidate < *b) {
                    best = Some(candidate);
                }
            }
            Solved::Never => debug!(modifier = %id, %label, "condition never flips"),
            Solved::Undecidable(reason) => {
                debug!(modifier = %id, %label, %reason, "condition undecidable");
                undecidable.get_or_insert(reason);
            }
        }
    }

    Ok(match (best, undecidable) {
        (Some(candidate), _) => Outcome::Candidate(candidate),
        (None, Some(reason)) => Outcome::Undecidable(reason),
        (None, None) => Outcome::Never,
    })
}

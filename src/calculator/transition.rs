//! Earliest `dt >= 0` at which a transition's guard holds.

use super::enabler::primaries;
use super::error::CalcError;
use super::query::{solve_min, Binding, Query, Solved, TimeFloor};
use super::report::{Candidate, Outcome};
use crate::cache::Shape;
use crate::model::ModifierId;
use crate::modifier_map::ModifierMap;

pub(crate) fn transition_time(query: &Query, id: ModifierId) -> Result<Outcome, CalcError> {
    let cached = query
        .cache
        .modifier(id)
        .ok_or(CalcError::UnknownModifier(id))?;
    let guard = match (&cached.shape, &cached.guard) {
        (Shape::Transition { .. }, Some(guard)) => guard,
        _ => return Err(CalcError::NotTransition(id)),
    };

    let seeds = cached.facts.reads().collect::<Vec<_>>();
    let map = ModifierMap::build(&query.cache, &query.snapshot, seeds)?;
    let mut formulas = primaries(query, &map, id)?;
    formulas.push(guard.clone());

    let binding = Binding::new(&query.cache, query.isolation);
    let problem = query.problem(&binding, TimeFloor::NonNegative, &map, formulas)?;
    Ok(match solve_min(query.backend.as_ref(), &problem) {
        Solved::At(time, exactness) => Outcome::Candidate(Candidate {
            time,
            modifier: id,
            label: None,
            exactness,
        }),
        Solved::Never => Outcome::Never,
        Solved::Undecidable(reason) => Outcome::Undecidable(reason),
    })
}

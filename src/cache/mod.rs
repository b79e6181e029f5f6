//! Constraint cache: every symbolic variable and translated constraint of an
//! entity tree, built once and read-only afterwards.
//!
//! # Layout
//!
//! - one `dt` variable and a `{ current, pre }` variable pair per port;
//! - per entity, a table of the spellings a body author may use for a port
//!   (`x`, `x_0`, `x.pre`, `tank.x`, `tank.x_0`, `tank.x.pre`);
//! - per modifier, its primary constraint (influences and updates), its
//!   guard (transitions), its condition-changed set when the body branches,
//!   and the read facts the modifier map is built from.
//!
//! Cached formulas live in the cache's own [`Scope`]. Queries that solve in
//! a forked scope rebind them first.

mod build;
mod error;
mod store;

use std::collections::{BTreeSet, HashMap};

use crate::model::{EntityId, ModifierId, PortId, StateId, SystemId};
use crate::symbolic::{Formula, Scope, Var};

pub use error::CacheError;
pub use store::CacheStore;

/// Current-value and pre-value variables of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortVars {
    pub current: Var,
    pub pre: Var,
}

/// What a spelling in a body refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spelling {
    Current(PortId),
    Pre(PortId),
}

/// Formulas describing a branch flip of one modifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSet {
    /// One entry per distinct condition, labelled by its source text: the
    /// condition's truth value at time 0 differs from its value at `dt`.
    pub labelled: Vec<(String, Formula)>,
    /// Bindings of synthetic parameter variables.
    pub auxiliary: Vec<Formula>,
}

/// Ports and states a modifier connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Influence { source: PortId, target: PortId },
    Update { state: StateId, target: PortId },
    Transition { source: StateId, target: StateId },
}

impl Shape {
    pub fn target_port(&self) -> Option<PortId> {
        match self {
            Shape::Influence { target, .. } | Shape::Update { target, .. } => Some(*target),
            Shape::Transition { .. } => None,
        }
    }
}

/// Memoized body analysis of one modifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierFacts {
    pub branching: bool,
    /// Ports whose live value the body depends on.
    pub reads_current: BTreeSet<PortId>,
    /// Ports read through a pre-value spelling.
    pub reads_pre: BTreeSet<PortId>,
    pub params: Vec<String>,
}

impl ModifierFacts {
    pub fn reads(&self) -> impl Iterator<Item = PortId> + '_ {
        self.reads_current.union(&self.reads_pre).copied()
    }
}

#[derive(Debug, Clone)]
pub struct CachedModifier {
    pub name: String,
    pub entity: EntityId,
    pub shape: Shape,
    /// `target == f(...)` for influences and updates.
    pub primary: Option<Formula>,
    /// Guard formula of a transition.
    pub guard: Option<Formula>,
    pub conditions: Option<ConditionSet>,
    pub facts: ModifierFacts,
}

/// Read-only store of translated constraints for one entity tree revision.
#[derive(Debug)]
pub struct ConstraintCache {
    system: SystemId,
    revision: u64,
    scope: Scope,
    dt: Var,
    ports: Vec<PortVars>,
    pre_ports: HashMap<Var, PortId>,
    spellings: Vec<HashMap<String, Spelling>>,
    modifiers: Vec<CachedModifier>,
    writers: Vec<Vec<ModifierId>>,
}

impl ConstraintCache {
    pub fn system(&self) -> SystemId {
        self.system
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn dt(&self) -> Var {
        self.dt
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn port_vars(&self, port: PortId) -> Option<PortVars> {
        self.ports.get(port.index()).copied()
    }

    /// The port whose pre-value `var` is.
    pub fn port_of_pre(&self, var: Var) -> Option<PortId> {
        self.pre_ports.get(&var).copied()
    }

    pub fn spelling(&self, entity: EntityId, name: &str) -> Option<Spelling> {
        self.spellings.get(entity.index())?.get(name).copied()
    }

    pub fn modifier(&self, id: ModifierId) -> Option<&CachedModifier> {
        self.modifiers.get(id.index())
    }

    pub fn modifiers(&self) -> impl Iterator<Item = (ModifierId, &CachedModifier)> + '_ {
        self.modifiers
            .iter()
            .enumerate()
            .map(|(i, m)| (ModifierId(i), m))
    }

    /// Influences and updates targeting `port`, in declaration order. Updates
    /// are listed whether or not their state is active.
    pub fn writers(&self, port: PortId) -> &[ModifierId] {
        self.writers
            .get(port.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

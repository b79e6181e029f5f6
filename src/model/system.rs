//! Entity trees: ports, states and the modifiers connecting them.
//!
//! A [`System`] is an arena holding a root entity and all of its
//! sub-entities. Every declaration receives a stable index handle; the system
//! itself carries a uuid identity and a structural revision that is bumped on
//! every structural change, which is what constraint caches are keyed on.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

use uuid::Uuid;

use super::body::{Expr, Function};
use super::error::ModelError;
use crate::time::Rational;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub const fn index(&self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

handle!(
    /// Handle of an entity inside its [`System`].
    EntityId,
    "e"
);
handle!(
    /// Handle of a port inside its [`System`].
    PortId,
    "p"
);
handle!(
    /// Handle of a state inside its [`System`].
    StateId,
    "s"
);
handle!(
    /// Handle of an influence, update or transition inside its [`System`].
    ModifierId,
    "m"
);

/// Stable identity of an entity tree, used as the constraint-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(Uuid);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub parent: Option<EntityId>,
    pub current: Option<StateId>,
}

#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub entity: EntityId,
}

#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub entity: EntityId,
    pub value: Rational,
}

/// The causal edges of a model.
#[derive(Debug, Clone)]
pub enum ModifierKind {
    /// Continuous dataflow `target := function(source)`.
    Influence {
        source: PortId,
        target: PortId,
        function: Function,
    },
    /// `target := function()` while `state` is its entity's current state.
    Update {
        state: StateId,
        target: PortId,
        function: Function,
    },
    /// Discrete edge between two states of one entity, gated by `guard`.
    Transition {
        source: StateId,
        target: StateId,
        guard: Expr,
    },
}

#[derive(Debug, Clone)]
pub struct Modifier {
    pub name: String,
    /// Entity the modifier is declared in; names in its body resolve from here.
    pub entity: EntityId,
    /// Unique per declared instance, used to keep synthetic symbols apart.
    pub uid: Uuid,
    pub kind: ModifierKind,
}

impl Modifier {
    pub fn is_influence(&self) -> bool {
        matches!(self.kind, ModifierKind::Influence { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self.kind, ModifierKind::Update { .. })
    }

    pub fn is_transition(&self) -> bool {
        matches!(self.kind, ModifierKind::Transition { .. })
    }

    /// Port written by an influence or update.
    pub fn target_port(&self) -> Option<PortId> {
        match &self.kind {
            ModifierKind::Influence { target, .. } | ModifierKind::Update { target, .. } => {
                Some(*target)
            }
            ModifierKind::Transition { .. } => None,
        }
    }

    pub fn function(&self) -> Option<&Function> {
        match &self.kind {
            ModifierKind::Influence { function, .. } | ModifierKind::Update { function, .. } => {
                Some(function)
            }
            ModifierKind::Transition { .. } => None,
        }
    }
}

/// An entity tree with its ports, states and modifiers.
///
/// Cloning forks the model: the copy gets a fresh [`SystemId`], so caches
/// built for one fork are never served to the other.
#[derive(Debug)]
pub struct System {
    id: SystemId,
    revision: u64,
    entities: Vec<Entity>,
    states: Vec<State>,
    ports: Vec<Port>,
    modifiers: Vec<Modifier>,
    alive: Arc<()>,
}

impl Clone for System {
    fn clone(&self) -> Self {
        Self {
            id: SystemId(Uuid::new_v4()),
            revision: self.revision,
            entities: self.entities.clone(),
            states: self.states.clone(),
            ports: self.ports.clone(),
            modifiers: self.modifiers.clone(),
            alive: Arc::new(()),
        }
    }
}

impl System {
    /// Creates a system whose root entity is called `root_name`.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            id: SystemId(Uuid::new_v4()),
            revision: 0,
            entities: vec![Entity {
                name: root_name.into(),
                parent: None,
                current: None,
            }],
            states: Vec::new(),
            ports: Vec::new(),
            modifiers: Vec::new(),
            alive: Arc::new(()),
        }
    }

    pub fn id(&self) -> SystemId {
        self.id
    }

    /// Handle that stops upgrading once this system is dropped.
    pub fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }

    /// Structural revision; unchanged by value or current-state updates.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn root(&self) -> EntityId {
        EntityId(0)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn check_entity(&self, entity: EntityId) -> Result<(), ModelError> {
        if entity.0 < self.entities.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownEntity(entity))
        }
    }

    fn check_port(&self, port: PortId) -> Result<(), ModelError> {
        if port.0 < self.ports.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownPort(port))
        }
    }

    fn check_state_of(&self, state: StateId, entity: EntityId) -> Result<(), ModelError> {
        let decl = self
            .states
            .get(state.0)
            .ok_or(ModelError::UnknownState(state))?;
        if decl.entity == entity {
            Ok(())
        } else {
            Err(ModelError::ForeignState { state, entity })
        }
    }

    fn check_fresh_name(&self, entity: EntityId, name: &str) -> Result<(), ModelError> {
        let taken = self.children(entity).any(|c| self.entities[c.0].name == name)
            || self.ports_of(entity).any(|p| self.ports[p.0].name == name)
            || self.states_of(entity).any(|s| self.states[s.0].name == name)
            || self
                .modifiers
                .iter()
                .any(|m| m.entity == entity && m.name == name);
        if taken {
            Err(ModelError::DuplicateName {
                entity,
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    }

    pub fn add_entity(
        &mut self,
        parent: EntityId,
        name: impl Into<String>,
    ) -> Result<EntityId, ModelError> {
        let name = name.into();
        self.check_entity(parent)?;
        self.check_fresh_name(parent, &name)?;
        self.entities.push(Entity {
            name,
            parent: Some(parent),
            current: None,
        });
        self.touch();
        Ok(EntityId(self.entities.len() - 1))
    }

    pub fn add_port(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        value: impl Into<Rational>,
    ) -> Result<PortId, ModelError> {
        let name = name.into();
        self.check_entity(entity)?;
        self.check_fresh_name(entity, &name)?;
        self.ports.push(Port {
            name,
            entity,
            value: value.into(),
        });
        self.touch();
        Ok(PortId(self.ports.len() - 1))
    }

    /// Declares a state; the first state of an entity becomes its current one.
    pub fn add_state(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
    ) -> Result<StateId, ModelError> {
        let name = name.into();
        self.check_entity(entity)?;
        self.check_fresh_name(entity, &name)?;
        self.states.push(State { name, entity });
        let id = StateId(self.states.len() - 1);
        let decl = &mut self.entities[entity.0];
        if decl.current.is_none() {
            decl.current = Some(id);
        }
        self.touch();
        Ok(id)
    }

    pub fn add_influence(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        source: PortId,
        target: PortId,
        function: Function,
    ) -> Result<ModifierId, ModelError> {
        let name = name.into();
        self.check_entity(entity)?;
        self.check_port(source)?;
        self.check_port(target)?;
        if function.params.len() != 1 {
            return Err(ModelError::InfluenceArity {
                name,
                found: function.params.len(),
            });
        }
        self.push_modifier(
            entity,
            name,
            ModifierKind::Influence {
                source,
                target,
                function,
            },
        )
    }

    pub fn add_update(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        state: StateId,
        target: PortId,
        function: Function,
    ) -> Result<ModifierId, ModelError> {
        self.check_entity(entity)?;
        self.check_state_of(state, entity)?;
        self.check_port(target)?;
        self.push_modifier(
            entity,
            name.into(),
            ModifierKind::Update {
                state,
                target,
                function,
            },
        )
    }

    pub fn add_transition(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        source: StateId,
        target: StateId,
        guard: Expr,
    ) -> Result<ModifierId, ModelError> {
        self.check_entity(entity)?;
        self.check_state_of(source, entity)?;
        self.check_state_of(target, entity)?;
        self.push_modifier(
            entity,
            name.into(),
            ModifierKind::Transition {
                source,
                target,
                guard,
            },
        )
    }

    fn push_modifier(
        &mut self,
        entity: EntityId,
        name: String,
        kind: ModifierKind,
    ) -> Result<ModifierId, ModelError> {
        self.check_fresh_name(entity, &name)?;
        self.modifiers.push(Modifier {
            name,
            entity,
            uid: Uuid::new_v4(),
            kind,
        });
        self.touch();
        Ok(ModifierId(self.modifiers.len() - 1))
    }

    /// Sets a port's observed value. Not a structural change.
    pub fn set_value(
        &mut self,
        port: PortId,
        value: impl Into<Rational>,
    ) -> Result<(), ModelError> {
        self.check_port(port)?;
        self.ports[port.0].value = value.into();
        Ok(())
    }

    /// Switches an entity's current state. Not a structural change.
    pub fn set_current(&mut self, entity: EntityId, state: StateId) -> Result<(), ModelError> {
        self.check_entity(entity)?;
        self.check_state_of(state, entity)?;
        self.entities[entity.0].current = Some(state);
        Ok(())
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id.0)
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0)
    }

    pub fn modifier(&self, id: ModifierId) -> Option<&Modifier> {
        self.modifiers.get(id.0)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
        self.entities.iter().enumerate().map(|(i, e)| (EntityId(i), e))
    }

    pub fn ports(&self) -> impl Iterator<Item = (PortId, &Port)> + '_ {
        self.ports.iter().enumerate().map(|(i, p)| (PortId(i), p))
    }

    pub fn modifiers(&self) -> impl Iterator<Item = (ModifierId, &Modifier)> + '_ {
        self.modifiers
            .iter()
            .enumerate()
            .map(|(i, m)| (ModifierId(i), m))
    }

    pub fn influences(&self) -> impl Iterator<Item = (ModifierId, &Modifier)> + '_ {
        self.modifiers().filter(|(_, m)| m.is_influence())
    }

    pub fn updates(&self) -> impl Iterator<Item = (ModifierId, &Modifier)> + '_ {
        self.modifiers().filter(|(_, m)| m.is_update())
    }

    pub fn transitions(&self) -> impl Iterator<Item = (ModifierId, &Modifier)> + '_ {
        self.modifiers().filter(|(_, m)| m.is_transition())
    }

    pub fn children(&self, entity: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.entities()
            .filter(move |(_, e)| e.parent == Some(entity))
            .map(|(id, _)| id)
    }

    pub fn ports_of(&self, entity: EntityId) -> impl Iterator<Item = PortId> + '_ {
        self.ports()
            .filter(move |(_, p)| p.entity == entity)
            .map(|(id, _)| id)
    }

    pub fn states_of(&self, entity: EntityId) -> impl Iterator<Item = StateId> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.entity == entity)
            .map(|(i, _)| StateId(i))
    }

    /// Ports an author of a body declared in `entity` may name: its own ports,
    /// then the ports of its direct children.
    pub fn ports_visible_from(&self, entity: EntityId) -> Vec<PortId> {
        let mut visible: Vec<PortId> = self.ports_of(entity).collect();
        for child in self.children(entity) {
            visible.extend(self.ports_of(child));
        }
        visible
    }

    /// Finds a port by `entity` and name.
    pub fn find_port(&self, entity: EntityId, name: &str) -> Option<PortId> {
        self.ports_of(entity).find(|p| self.ports[p.0].name == name)
    }

    /// Whether `state` is the current state of its entity.
    pub fn is_active(&self, state: StateId) -> bool {
        self.states
            .get(state.0)
            .and_then(|s| self.entities[s.entity.0].current)
            == Some(state)
    }

    /// Freezes observed port values and active states for one query.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            system: self.id,
            values: self.ports.iter().map(|p| p.value).collect(),
            active: self.entities.iter().filter_map(|e| e.current).collect(),
        }
    }
}

/// Observed values at query start.
///
/// Shared read-only with every solver worker of the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    system: SystemId,
    values: Vec<Rational>,
    active: BTreeSet<StateId>,
}

impl Snapshot {
    pub fn system(&self) -> SystemId {
        self.system
    }

    pub fn value(&self, port: PortId) -> Option<Rational> {
        self.values.get(port.0).copied()
    }

    pub fn is_active(&self, state: StateId) -> bool {
        self.active.contains(&state)
    }
}

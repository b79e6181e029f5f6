use thiserror::Error;

use super::{EntityId, PortId, StateId};

/// Errors raised while declaring a model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    #[error("Unknown port: {0}")]
    UnknownPort(PortId),

    #[error("Unknown state: {0}")]
    UnknownState(StateId),

    #[error("State {state} does not belong to entity {entity}")]
    ForeignState { state: StateId, entity: EntityId },

    #[error("Name '{name}' is already declared in entity {entity}")]
    DuplicateName { entity: EntityId, name: String },

    #[error("Influence '{name}' must take exactly one parameter, found {found}")]
    InfluenceArity { name: String, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_display() {
        let e = ModelError::DuplicateName {
            entity: EntityId(0),
            name: "x".to_string(),
        };
        assert_eq!(e.to_string(), "Name 'x' is already declared in entity e0");
    }

    #[test]
    fn influence_arity_display() {
        let e = ModelError::InfluenceArity {
            name: "heat".to_string(),
            found: 2,
        };
        assert_eq!(
            e.to_string(),
            "Influence 'heat' must take exactly one parameter, found 2"
        );
    }
}

use thiserror::Error;

use crate::model::ModifierId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("Same-instant dependency cycle through modifier {modifier}")]
    Cycle { modifier: ModifierId },

    #[error("Modifier {0} is not in the constraint cache")]
    UnknownModifier(ModifierId),
}

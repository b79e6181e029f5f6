//! The model collaborator: entity trees and the data-form bodies of their
//! modifiers.
//!
//! The calculator only reads a [`System`]; everything here is plain data that
//! a host simulator would build once and mutate between queries.

pub mod analysis;
mod body;
mod error;
mod system;

pub use body::{boolean, dt, if_else, name, num, rat, ArithOp, CmpOp, Expr, Function, LogicOp, Stmt};
pub use error::ModelError;
pub use system::{
    Entity, EntityId, Modifier, ModifierId, ModifierKind, Port, PortId, Snapshot, State, StateId,
    System, SystemId,
};

//! Symbolic layer: solving scopes, polynomials, formulas and the translator
//! from data-form bodies into formulas.
//!
//! Everything here is pure and immutable once built. A [`Formula`] is bound to
//! the [`Scope`] its variables were declared in; using it elsewhere requires a
//! [`Translation`] obtained from [`Scope::fork`].

mod error;
mod formula;
mod poly;
mod scope;
pub mod translate;

pub use error::{ScopeError, TranslateError};
pub use formula::{Atom, Conjunct, Expansion, Formula, Rel};
pub use poly::{Monomial, Poly};
pub use scope::{Scope, ScopeId, Translation, Var, VarDecl};
pub use translate::{translate_assignment, translate_condition, Resolve, Value};

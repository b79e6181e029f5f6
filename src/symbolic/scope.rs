//! Solving scopes: isolated variable namespaces.
//!
//! Every [`Var`] remembers the scope it was declared in. Formulas built in one
//! scope can only be used in another through an explicit [`Translation`],
//! which re-binds every variable reference and rejects anything foreign.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::ScopeError;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a [`Scope`] for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn fresh() -> Self {
        ScopeId(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// A symbolic variable bound to one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var {
    scope: ScopeId,
    index: u32,
}

impl Var {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
}

/// Variable table of one solving scope.
#[derive(Debug, Clone)]
pub struct Scope {
    id: ScopeId,
    vars: Vec<VarDecl>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            id: ScopeId::fresh(),
            vars: Vec::new(),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Declares a new variable. Names are informational and need not be unique.
    pub fn declare(&mut self, name: impl Into<String>) -> Var {
        let index = self.vars.len() as u32;
        self.vars.push(VarDecl { name: name.into() });
        Var {
            scope: self.id,
            index,
        }
    }

    pub fn name_of(&self, var: Var) -> Option<&str> {
        if var.scope != self.id {
            return None;
        }
        self.vars.get(var.index()).map(|d| d.name.as_str())
    }

    /// Whether `var` was declared in this scope.
    pub fn owns(&self, var: Var) -> bool {
        var.scope == self.id && var.index() < self.vars.len()
    }

    pub fn check(&self, var: Var) -> Result<(), ScopeError> {
        if self.owns(var) {
            Ok(())
        } else {
            Err(ScopeError::ForeignVariable {
                var,
                expected: self.id,
            })
        }
    }

    /// Creates an isolated copy of the variable table under a fresh identity,
    /// together with the translation from this scope into it.
    pub fn fork(&self) -> (Scope, Translation) {
        let forked = Scope {
            id: ScopeId::fresh(),
            vars: self.vars.clone(),
        };
        let translation = Translation {
            from: self.id,
            to: forked.id,
            len: self.vars.len(),
        };
        (forked, translation)
    }
}

/// Re-binds variables of one scope into a forked scope with the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    from: ScopeId,
    to: ScopeId,
    len: usize,
}

impl Translation {
    pub fn from(&self) -> ScopeId {
        self.from
    }

    pub fn to(&self) -> ScopeId {
        self.to
    }

    pub fn rebind_var(&self, var: Var) -> Result<Var, ScopeError> {
        if var.scope != self.from || var.index() >= self.len {
            return Err(ScopeError::ForeignVariable {
                var,
                expected: self.from,
            });
        }
        Ok(Var {
            scope: self.to,
            index: var.index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_have_distinct_ids() {
        let a = Scope::new();
        let b = Scope::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn fork_keeps_table_and_changes_identity() {
        let mut base = Scope::new();
        let x = base.declare("x");
        let (forked, tr) = base.fork();
        assert_ne!(forked.id(), base.id());
        assert_eq!(forked.len(), 1);

        let y = tr.rebind_var(x).unwrap();
        assert_eq!(y.index(), x.index());
        assert!(forked.owns(y));
        assert!(!forked.owns(x));
        assert_eq!(forked.name_of(y), Some("x"));
    }

    #[test]
    fn rebinding_foreign_variable_fails() {
        let mut base = Scope::new();
        let mut other = Scope::new();
        base.declare("x");
        let z = other.declare("z");
        let (_, tr) = base.fork();
        assert_eq!(
            tr.rebind_var(z),
            Err(ScopeError::ForeignVariable {
                var: z,
                expected: base.id()
            })
        );
    }

    #[test]
    fn variables_declared_after_fork_are_not_translated() {
        let mut base = Scope::new();
        base.declare("x");
        let (_, tr) = base.fork();
        let late = base.declare("late");
        assert!(tr.rebind_var(late).is_err());
    }
}

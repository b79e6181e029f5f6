//! Pure analyses over data-form bodies.
//!
//! These replace source-level inspection of live functions: whether a body
//! branches, which names it reads, and a let-free normal form in which every
//! condition mentions only parameters, ports and `dt`. Results are memoized per
//! modifier by the constraint cache.

use std::collections::{BTreeSet, HashMap};

use super::body::{Expr, Function, Stmt};

/// Returns true if the body contains an `if` statement or a conditional
/// expression anywhere.
pub fn contains_conditional(function: &Function) -> bool {
    fn in_expr(expr: &Expr) -> bool {
        match expr {
            Expr::IfElse { .. } => true,
            Expr::Num(_) | Expr::Bool(_) | Expr::Name(_) | Expr::Dt => false,
            Expr::Neg(inner) | Expr::Not(inner) => in_expr(inner),
            Expr::Arith(_, lhs, rhs) | Expr::Cmp(_, lhs, rhs) | Expr::Logic(_, lhs, rhs) => {
                in_expr(lhs) || in_expr(rhs)
            }
        }
    }

    fn in_block(stmts: &[Stmt]) -> bool {
        stmts.iter().any(|stmt| match stmt {
            Stmt::If { .. } => true,
            Stmt::Let(_, value) | Stmt::Return(value) => in_expr(value),
        })
    }

    in_block(&function.body)
}

/// Returns true if the expression contains a conditional expression.
pub fn expr_contains_conditional(expr: &Expr) -> bool {
    contains_conditional(&Function::returning(expr.clone()))
}

/// Rewrites the function so that no `Let` remains: every use of a local is
/// replaced by its (already inlined) defining expression.
///
/// Locals shadow parameters and outer locals for the rest of their block.
pub fn inline_locals(function: &Function) -> Function {
    Function {
        params: function.params.clone(),
        body: inline_block(&function.body, HashMap::new()),
    }
}

fn inline_block(stmts: &[Stmt], mut locals: HashMap<String, Expr>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::Let(name, value) => {
                let value = substitute(value, &locals);
                locals.insert(name.clone(), value);
            }
            Stmt::Return(value) => out.push(Stmt::Return(substitute(value, &locals))),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => out.push(Stmt::If {
                cond: substitute(cond, &locals),
                then: inline_block(then, locals.clone()),
                otherwise: inline_block(otherwise, locals.clone()),
            }),
        }
    }
    out
}

fn substitute(expr: &Expr, locals: &HashMap<String, Expr>) -> Expr {
    let sub = |e: &Expr| Box::new(substitute(e, locals));
    match expr {
        Expr::Name(name) => locals.get(name).cloned().unwrap_or_else(|| expr.clone()),
        Expr::Num(_) | Expr::Bool(_) | Expr::Dt => expr.clone(),
        Expr::Neg(inner) => Expr::Neg(sub(inner)),
        Expr::Not(inner) => Expr::Not(sub(inner)),
        Expr::Arith(op, lhs, rhs) => Expr::Arith(*op, sub(lhs), sub(rhs)),
        Expr::Cmp(op, lhs, rhs) => Expr::Cmp(*op, sub(lhs), sub(rhs)),
        Expr::Logic(op, lhs, rhs) => Expr::Logic(*op, sub(lhs), sub(rhs)),
        Expr::IfElse {
            cond,
            then,
            otherwise,
        } => Expr::IfElse {
            cond: sub(cond),
            then: sub(then),
            otherwise: sub(otherwise),
        },
    }
}

/// Conditions of every branching construct, in pre-order.
///
/// Call on an [`inline_locals`] result so the conditions are self-contained.
pub fn conditions(function: &Function) -> Vec<Expr> {
    fn walk_expr(expr: &Expr, out: &mut Vec<Expr>) {
        match expr {
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                out.push((**cond).clone());
                walk_expr(cond, out);
                walk_expr(then, out);
                walk_expr(otherwise, out);
            }
            Expr::Num(_) | Expr::Bool(_) | Expr::Name(_) | Expr::Dt => {}
            Expr::Neg(inner) | Expr::Not(inner) => walk_expr(inner, out),
            Expr::Arith(_, lhs, rhs) | Expr::Cmp(_, lhs, rhs) | Expr::Logic(_, lhs, rhs) => {
                walk_expr(lhs, out);
                walk_expr(rhs, out);
            }
        }
    }

    fn walk_block(stmts: &[Stmt], out: &mut Vec<Expr>) {
        for stmt in stmts {
            match stmt {
                Stmt::Let(_, value) | Stmt::Return(value) => walk_expr(value, out),
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    out.push(cond.clone());
                    walk_expr(cond, out);
                    walk_block(then, out);
                    walk_block(otherwise, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    walk_block(&function.body, &mut out);
    out
}

/// Free names read by the function: everything referenced that is neither a
/// parameter nor a local. `dt` is reported only if spelled as a name.
pub fn referenced_names(function: &Function) -> BTreeSet<String> {
    let inlined = inline_locals(function);
    let mut names = BTreeSet::new();
    for stmt in &inlined.body {
        collect_stmt(stmt, &mut names);
    }
    for param in &function.params {
        names.remove(param);
    }
    names
}

/// Formal parameter names, in declaration order.
pub fn param_names(function: &Function) -> &[String] {
    &function.params
}

/// Names read by a standalone expression such as a guard.
pub fn expr_names(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_expr(expr, &mut names);
    names
}

fn collect_stmt(stmt: &Stmt, names: &mut BTreeSet<String>) {
    match stmt {
        Stmt::Let(_, value) | Stmt::Return(value) => collect_expr(value, names),
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            collect_expr(cond, names);
            for s in then.iter().chain(otherwise) {
                collect_stmt(s, names);
            }
        }
    }
}

fn collect_expr(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Name(name) => {
            names.insert(name.clone());
        }
        Expr::Num(_) | Expr::Bool(_) | Expr::Dt => {}
        Expr::Neg(inner) | Expr::Not(inner) => collect_expr(inner, names),
        Expr::Arith(_, lhs, rhs) | Expr::Cmp(_, lhs, rhs) | Expr::Logic(_, lhs, rhs) => {
            collect_expr(lhs, names);
            collect_expr(rhs, names);
        }
        Expr::IfElse {
            cond,
            then,
            otherwise,
        } => {
            collect_expr(cond, names);
            collect_expr(then, names);
            collect_expr(otherwise, names);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::body::{if_else, name, num};

    fn branching_update() -> Function {
        Function::new(
            Vec::<String>::new(),
            vec![
                Stmt::bind("limit", name("A") * 2),
                Stmt::if_else(
                    name("limit").gt(num(10)),
                    vec![Stmt::ret(num(1))],
                    vec![Stmt::ret(name("B_0"))],
                ),
            ],
        )
    }

    #[test]
    fn detects_if_statements_and_expressions() {
        assert!(contains_conditional(&branching_update()));
        assert!(contains_conditional(&Function::returning(if_else(
            name("x").gt(num(0)),
            num(1),
            num(2)
        ))));
        assert!(!contains_conditional(&Function::unary("v", name("v") + 1)));
    }

    #[test]
    fn inlining_removes_locals_from_conditions() {
        let inlined = inline_locals(&branching_update());
        let conds = conditions(&inlined);
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].to_string(), "(A * 2) > 10");
        assert!(inlined.body.iter().all(|s| !matches!(s, Stmt::Let(..))));
    }

    #[test]
    fn referenced_names_exclude_params_and_locals() {
        let names = referenced_names(&branching_update());
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["A".to_string(), "B_0".to_string()]
        );

        let influence = Function::unary("v", name("v") + name("offset"));
        let names = referenced_names(&influence);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["offset".to_string()]);
    }

    #[test]
    fn let_shadows_outer_binding_only_afterwards() {
        let f = Function::new(
            ["v"],
            vec![
                Stmt::bind("v", name("v") + 1),
                Stmt::ret(name("v") * 2),
            ],
        );
        let inlined = inline_locals(&f);
        assert_eq!(inlined.body, vec![Stmt::ret((name("v") + 1) * 2)]);
    }
}

//! Symbolic evaluation of data-form bodies.
//!
//! Expressions evaluate to *guarded alternatives*: a list of `(guard, value)`
//! pairs whose guards partition the cases a conditional can take. Statements
//! are executed path by path, so an `if` in a body becomes a guarded union of
//! its branches, `(c ∧ then) ∨ (¬c ∧ otherwise)`.

use std::collections::HashMap;

use super::error::TranslateError;
use super::formula::Formula;
use super::poly::Poly;
use crate::model::{ArithOp, CmpOp, Expr, Function, LogicOp, Stmt};

/// Maps free names of a body to polynomials.
pub trait Resolve {
    /// Resolves a port spelling; parameters and locals never reach here.
    fn name(&self, name: &str) -> Option<Poly>;

    /// The value `dt` stands for.
    fn dt(&self) -> Poly;
}

/// Value of an expression under one guard.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(Poly),
    Bool(Formula),
}

type Alts = Vec<(Formula, Value)>;

/// Bindings for formal parameters.
pub type Bindings<'a> = &'a [(String, Poly)];

/// The formula `target == function(bindings)` over every path of the body.
pub fn translate_assignment<R: Resolve>(
    function: &Function,
    bindings: Bindings<'_>,
    target: &Poly,
    resolver: &R,
) -> Result<Formula, TranslateError> {
    let translator = Translator { resolver };
    let returned = translator.run(function, bindings)?;
    let mut cases = Vec::with_capacity(returned.len());
    for (guard, value) in returned {
        let Value::Num(value) = value else {
            return Err(TranslateError::TypeMismatch {
                expected: "numeric",
                context: "return".to_string(),
            });
        };
        let eq = Formula::eq(target, &value)
            .ok_or_else(|| TranslateError::Overflow("return".to_string()))?;
        cases.push(guard.and(eq));
    }
    Ok(Formula::any(cases))
}

/// A boolean expression (guard or branch condition) as a formula.
pub fn translate_condition<R: Resolve>(
    expr: &Expr,
    bindings: Bindings<'_>,
    resolver: &R,
) -> Result<Formula, TranslateError> {
    let translator = Translator { resolver };
    let env = Env::with_bindings(bindings);
    let alts = translator.eval(expr, &env)?;
    translator.collapse(alts, expr)
}

#[derive(Debug, Clone, Default)]
struct Env {
    locals: HashMap<String, Alts>,
}

impl Env {
    fn with_bindings(bindings: Bindings<'_>) -> Self {
        let locals = bindings
            .iter()
            .map(|(name, poly)| (name.clone(), vec![(Formula::True, Value::Num(poly.clone()))]))
            .collect();
        Self { locals }
    }
}

struct Translator<'r, R> {
    resolver: &'r R,
}

impl<R: Resolve> Translator<'_, R> {
    /// Executes a body and returns every `(path guard, returned value)`.
    fn run(&self, function: &Function, bindings: Bindings<'_>) -> Result<Alts, TranslateError> {
        let mut returned = Vec::new();
        let live = self.exec_block(
            &function.body,
            vec![(Formula::True, Env::with_bindings(bindings))],
            &mut returned,
        )?;
        // A path that may fall through is excluded from the assignment; one
        // that certainly does means the body cannot produce a value.
        if live.iter().any(|(guard, _)| guard.is_true()) {
            return Err(TranslateError::MissingReturn);
        }
        Ok(returned)
    }

    fn exec_block(
        &self,
        stmts: &[Stmt],
        mut live: Vec<(Formula, Env)>,
        returned: &mut Alts,
    ) -> Result<Vec<(Formula, Env)>, TranslateError> {
        for stmt in stmts {
            let mut next = Vec::with_capacity(live.len());
            for (path, mut env) in live {
                match stmt {
                    Stmt::Let(name, value) => {
                        let alts = self.eval(value, &env)?;
                        env.locals.insert(name.clone(), alts);
                        next.push((path, env));
                    }
                    Stmt::Return(value) => {
                        for (guard, v) in self.eval(value, &env)? {
                            let guard = path.clone().and(guard);
                            if !guard.is_false() {
                                returned.push((guard, v));
                            }
                        }
                    }
                    Stmt::If {
                        cond,
                        then,
                        otherwise,
                    } => {
                        let c = self.collapse(self.eval(cond, &env)?, cond)?;
                        let then_path = path.clone().and(c.clone());
                        let else_path = path.and(c.not());
                        if !then_path.is_false() {
                            next.extend(self.exec_block(
                                then,
                                vec![(then_path, env.clone())],
                                returned,
                            )?);
                        }
                        if !else_path.is_false() {
                            next.extend(self.exec_block(
                                otherwise,
                                vec![(else_path, env)],
                                returned,
                            )?);
                        }
                    }
                }
            }
            live = next;
        }
        Ok(live)
    }

    /// Folds boolean alternatives into one formula.
    fn collapse(&self, alts: Alts, context: &Expr) -> Result<Formula, TranslateError> {
        let mut cases = Vec::with_capacity(alts.len());
        for (guard, value) in alts {
            match value {
                Value::Bool(f) => cases.push(guard.and(f)),
                Value::Num(_) => return Err(mismatch("boolean", context)),
            }
        }
        Ok(Formula::any(cases))
    }

    fn eval(&self, expr: &Expr, env: &Env) -> Result<Alts, TranslateError> {
        let single = |v: Value| -> Result<Alts, TranslateError> { Ok(vec![(Formula::True, v)]) };
        match expr {
            Expr::Num(value) => single(Value::Num(Poly::constant(*value))),
            Expr::Bool(true) => single(Value::Bool(Formula::True)),
            Expr::Bool(false) => single(Value::Bool(Formula::False)),
            Expr::Dt => single(Value::Num(self.resolver.dt())),
            Expr::Name(name) => match env.locals.get(name) {
                Some(alts) => Ok(alts.clone()),
                None => match self.resolver.name(name) {
                    Some(poly) => single(Value::Num(poly)),
                    None => Err(TranslateError::UnknownName(name.clone())),
                },
            },
            Expr::Neg(inner) => self
                .eval(inner, env)?
                .into_iter()
                .map(|(g, v)| match v {
                    Value::Num(p) => p
                        .checked_neg()
                        .map(|p| (g, Value::Num(p)))
                        .ok_or_else(|| overflow(expr)),
                    Value::Bool(_) => Err(mismatch("numeric", expr)),
                })
                .collect(),
            Expr::Not(inner) => self
                .eval(inner, env)?
                .into_iter()
                .map(|(g, v)| match v {
                    Value::Bool(f) => Ok((g, Value::Bool(f.not()))),
                    Value::Num(_) => Err(mismatch("boolean", expr)),
                })
                .collect(),
            Expr::Arith(op, lhs, rhs) => self.combine(lhs, rhs, env, |a, b| match (a, b) {
                (Value::Num(a), Value::Num(b)) => arith(*op, a, b, expr).map(Value::Num),
                _ => Err(mismatch("numeric", expr)),
            }),
            Expr::Cmp(op, lhs, rhs) => self.combine(lhs, rhs, env, |a, b| {
                compare(*op, a, b, expr).map(Value::Bool)
            }),
            Expr::Logic(op, lhs, rhs) => self.combine(lhs, rhs, env, |a, b| match (a, b) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
                    LogicOp::And => a.clone().and(b.clone()),
                    LogicOp::Or => a.clone().or(b.clone()),
                })),
                _ => Err(mismatch("boolean", expr)),
            }),
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                let c = self.collapse(self.eval(cond, env)?, cond)?;
                let mut out = Vec::new();
                for (branch, guard) in [(then, c.clone()), (otherwise, c.not())] {
                    if guard.is_false() {
                        continue;
                    }
                    for (g, v) in self.eval(branch, env)? {
                        let g = guard.clone().and(g);
                        if !g.is_false() {
                            out.push((g, v));
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// Cross product of two operands' alternatives.
    fn combine<F>(&self, lhs: &Expr, rhs: &Expr, env: &Env, f: F) -> Result<Alts, TranslateError>
    where
        F: Fn(&Value, &Value) -> Result<Value, TranslateError>,
    {
        let left = self.eval(lhs, env)?;
        let right = self.eval(rhs, env)?;
        let mut out = Vec::with_capacity(left.len() * right.len());
        for (gl, vl) in &left {
            for (gr, vr) in &right {
                let guard = gl.clone().and(gr.clone());
                if guard.is_false() {
                    continue;
                }
                out.push((guard, f(vl, vr)?));
            }
        }
        Ok(out)
    }
}

fn arith(op: ArithOp, a: &Poly, b: &Poly, context: &Expr) -> Result<Poly, TranslateError> {
    let out = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => {
            let divisor = b
                .as_constant()
                .ok_or_else(|| TranslateError::NonConstantDivisor(context.to_string()))?;
            if divisor.is_zero() {
                return Err(TranslateError::DivisionByZero(context.to_string()));
            }
            crate::time::Rational::ONE
                .checked_div(&divisor)
                .and_then(|inv| a.checked_scale(inv))
        }
    };
    out.ok_or_else(|| overflow(context))
}

fn compare(op: CmpOp, a: &Value, b: &Value, context: &Expr) -> Result<Formula, TranslateError> {
    match (a, b) {
        (Value::Num(a), Value::Num(b)) => match op {
            CmpOp::Lt => Formula::lt(a, b),
            CmpOp::Le => Formula::le(a, b),
            CmpOp::Gt => Formula::gt(a, b),
            CmpOp::Ge => Formula::ge(a, b),
            CmpOp::Eq => Formula::eq(a, b),
            CmpOp::Ne => Formula::ne(a, b),
        }
        .ok_or_else(|| overflow(context)),
        (Value::Bool(a), Value::Bool(b)) => match op {
            CmpOp::Eq => Ok(Formula::xor(a.clone(), b.clone()).not()),
            CmpOp::Ne => Ok(Formula::xor(a.clone(), b.clone())),
            _ => Err(mismatch("numeric", context)),
        },
        _ => Err(mismatch("numeric", context)),
    }
}

fn mismatch(expected: &'static str, context: &Expr) -> TranslateError {
    TranslateError::TypeMismatch {
        expected,
        context: context.to_string(),
    }
}

fn overflow(context: &Expr) -> TranslateError {
    TranslateError::Overflow(context.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{dt, if_else, name, num};
    use crate::symbolic::{Scope, Var};
    use crate::time::Rational;

    struct Fixture {
        a: Var,
        b: Var,
        t: Var,
    }

    impl Resolve for Fixture {
        fn name(&self, name: &str) -> Option<Poly> {
            match name {
                "A" => Some(Poly::var(self.a)),
                "B" => Some(Poly::var(self.b)),
                _ => None,
            }
        }

        fn dt(&self) -> Poly {
            Poly::var(self.t)
        }
    }

    fn fixture() -> (Scope, Fixture) {
        let mut scope = Scope::new();
        let fx = Fixture {
            a: scope.declare("A"),
            b: scope.declare("B"),
            t: scope.declare("dt"),
        };
        (scope, fx)
    }

    #[test]
    fn linear_assignment() {
        let (_, fx) = fixture();
        let f = Function::returning(name("A") + 2 * dt());
        let formula = translate_assignment(&f, &[], &Poly::var(fx.b), &fx).unwrap();
        let Formula::Atom(atom) = formula else {
            panic!("expected a single atom, got {formula}");
        };
        assert_eq!(atom.poly.linear_coeff(fx.b), Rational::ONE);
        assert_eq!(atom.poly.linear_coeff(fx.a), -Rational::ONE);
        assert_eq!(atom.poly.linear_coeff(fx.t), Rational::from(-2));
    }

    #[test]
    fn if_statement_becomes_guarded_union() {
        let (_, fx) = fixture();
        let f = Function::new(
            Vec::<String>::new(),
            vec![Stmt::if_else(
                name("A").gt(num(0)),
                vec![Stmt::ret(num(1))],
                vec![Stmt::ret(num(-1))],
            )],
        );
        let formula = translate_assignment(&f, &[], &Poly::var(fx.b), &fx).unwrap();
        let Formula::Or(cases) = &formula else {
            panic!("expected a disjunction, got {formula}");
        };
        assert_eq!(cases.len(), 2);
        assert!(cases.iter().all(|c| matches!(c, Formula::And(parts) if parts.len() == 2)));
    }

    #[test]
    fn parameters_shadow_ports() {
        let (_, fx) = fixture();
        let f = Function::unary("A", name("A") * 3);
        let bound = Poly::constant(Rational::from(2));
        let formula =
            translate_assignment(&f, &[("A".to_string(), bound)], &Poly::var(fx.b), &fx).unwrap();
        assert!(!formula.vars().contains(&fx.a));
    }

    #[test]
    fn conditional_expression_in_condition() {
        let (_, fx) = fixture();
        let cond = if_else(name("A").gt(num(0)), name("A"), -name("A")).ge(num(3));
        let formula = translate_condition(&cond, &[], &fx).unwrap();
        let dnf = formula.dnf(16).unwrap();
        assert_eq!(dnf.len(), 2);
    }

    #[test]
    fn errors_are_reported() {
        let (_, fx) = fixture();
        assert_eq!(
            translate_condition(&name("missing").gt(num(0)), &[], &fx),
            Err(TranslateError::UnknownName("missing".into()))
        );
        assert!(matches!(
            translate_condition(&(name("A") / name("B")).gt(num(0)), &[], &fx),
            Err(TranslateError::NonConstantDivisor(_))
        ));
        assert!(matches!(
            translate_condition(&(name("A") + 1), &[], &fx),
            Err(TranslateError::TypeMismatch { .. })
        ));
        let no_return = Function::new(Vec::<String>::new(), vec![Stmt::bind("x", num(1))]);
        assert_eq!(
            translate_assignment(&no_return, &[], &Poly::var(fx.b), &fx),
            Err(TranslateError::MissingReturn)
        );
    }

    #[test]
    fn division_by_constant_scales() {
        let (_, fx) = fixture();
        let f = Function::returning(name("A") / 4);
        let formula = translate_assignment(&f, &[], &Poly::var(fx.b), &fx).unwrap();
        let Formula::Atom(atom) = formula else {
            panic!("expected a single atom");
        };
        assert_eq!(atom.poly.linear_coeff(fx.a), Rational::new(-1, 4));
    }
}

//! Data-form bodies of guards, influence functions and update functions.
//!
//! Bodies are plain trees rather than opaque closures so they can be analysed
//! (which ports they read, whether they branch) and translated into solver
//! formulas.
//!
//! # Example
//!
//! ```rust
//! use hybridtime::model::{dt, name, num, Function, Stmt};
//!
//! // if A > 0 { return 1 } else { return -1 }
//! let f = Function::new(
//!     Vec::<String>::new(),
//!     vec![Stmt::if_else(
//!         name("A").gt(num(0)),
//!         vec![Stmt::ret(num(1))],
//!         vec![Stmt::ret(num(-1))],
//!     )],
//! );
//! assert_eq!(f.body.len(), 1);
//!
//! let ramp = name("A_0") + 2 * dt();
//! assert_eq!(ramp.to_string(), "(A_0 + (2 * dt))");
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Not, Sub};

use crate::time::Rational;

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Boolean connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    And,
    Or,
}

/// Expression node.
///
/// Names are resolved at translation time: function parameters and local
/// bindings first, then `dt`, then port spellings visible from the owning
/// entity (`x`, `sub.x`, `x_0`, `x.pre`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(Rational),
    Bool(bool),
    Name(String),
    Dt,
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Logic(LogicOp, Box<Expr>, Box<Expr>),
    /// Conditional expression `cond ? then : otherwise`.
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// Integer literal.
pub fn num(value: i64) -> Expr {
    Expr::Num(Rational::from(value))
}

/// Rational literal `n / d`.
pub fn rat(n: i128, d: i128) -> Expr {
    Expr::Num(Rational::new(n, d))
}

pub fn boolean(value: bool) -> Expr {
    Expr::Bool(value)
}

/// Reference to a parameter, local or port spelling.
pub fn name(name: impl Into<String>) -> Expr {
    Expr::Name(name.into())
}

/// The elapsed-time variable.
pub fn dt() -> Expr {
    Expr::Dt
}

/// Conditional expression.
pub fn if_else(cond: Expr, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
    Expr::IfElse {
        cond: Box::new(cond),
        then: Box::new(then.into()),
        otherwise: Box::new(otherwise.into()),
    }
}

impl Expr {
    fn cmp_with(self, op: CmpOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Cmp(op, Box::new(self), Box::new(rhs.into()))
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Ge, rhs)
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Eq, rhs)
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Expr {
        self.cmp_with(CmpOp::Ne, rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::Logic(LogicOp::And, Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Logic(LogicOp::Or, Box::new(self), Box::new(rhs))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        num(value)
    }
}

impl From<Rational> for Expr {
    fn from(value: Rational) -> Self {
        Expr::Num(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Bool(value)
    }
}

macro_rules! arith_impl {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Expr>> $trait<T> for Expr {
            type Output = Expr;

            fn $method(self, rhs: T) -> Expr {
                Expr::Arith($op, Box::new(self), Box::new(rhs.into()))
            }
        }

        impl $trait<Expr> for i64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::Arith($op, Box::new(num(self)), Box::new(rhs))
            }
        }
    };
}

arith_impl!(Add, add, ArithOp::Add);
arith_impl!(Sub, sub, ArithOp::Sub);
arith_impl!(Mul, mul, ArithOp::Mul);
arith_impl!(Div, div, ArithOp::Div);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        };
        f.write_str(s)
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(value) => write!(f, "{value}"),
            Expr::Bool(value) => write!(f, "{value}"),
            Expr::Name(name) => f.write_str(name),
            Expr::Dt => f.write_str("dt"),
            Expr::Neg(inner) => write!(f, "-{inner}"),
            Expr::Not(inner) => write!(f, "!{inner}"),
            Expr::Arith(op, lhs, rhs) => write!(f, "({lhs} {op} {rhs})"),
            Expr::Cmp(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
            Expr::Logic(LogicOp::And, lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            Expr::Logic(LogicOp::Or, lhs, rhs) => write!(f, "({lhs} || {rhs})"),
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => write!(f, "({cond} ? {then} : {otherwise})"),
        }
    }
}

/// Statement of a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Binds a local name for the rest of the enclosing block.
    Let(String, Expr),
    Return(Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

impl Stmt {
    pub fn bind(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Let(name.into(), value)
    }

    pub fn ret(value: impl Into<Expr>) -> Self {
        Stmt::Return(value.into())
    }

    pub fn if_else(cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then,
            otherwise,
        }
    }
}

/// An influence or update function: formal parameters plus a body whose
/// returned value becomes the target port's value.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn new<S: Into<String>>(params: impl IntoIterator<Item = S>, body: Vec<Stmt>) -> Self {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            body,
        }
    }

    /// A parameterless function returning `value`.
    pub fn returning(value: impl Into<Expr>) -> Self {
        Self::new(Vec::<String>::new(), vec![Stmt::ret(value)])
    }

    /// A one-parameter function returning `value`, the usual influence shape.
    pub fn unary(param: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self::new([param.into()], vec![Stmt::ret(value)])
    }
}

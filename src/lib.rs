//! hybridtime - symbolic next-behaviour-change time for hybrid state machines
//!
//! Given a tree of entities with ports, states, influences, updates and
//! transitions, computes the smallest time step `dt` after which the system
//! behaves differently: a transition guard becomes true, or a branching
//! influence or update takes another branch. Times are exact rationals with
//! an optional infinitesimal part for open boundaries.
//!
//! The pipeline is:
//!
//! 1. [`cache`]: every body is translated once into formulas over per-port
//!    current and pre-value variables;
//! 2. [`modifier_map`]: per query, the modifiers a seed set of ports depends
//!    on are resolved backwards;
//! 3. [`solver`]: the assembled problem is minimized over `dt`;
//! 4. [`calculator`]: per-modifier problems are fanned out and their
//!    candidates reduced to the earliest one.

pub mod cache;
pub mod calculator;
pub mod model;
pub mod modifier_map;
pub mod solver;
pub mod symbolic;
pub mod time;

pub use calculator::{
    earliest, CalcError, CalculatorConfig, Candidate, Exactness, Isolation, NextChangeCalculator,
    Outcome, Report,
};
pub use time::{Epsilon, Rational, TimeDomain};

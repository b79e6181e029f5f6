//! End-to-end behaviour of the calculator on small hybrid systems.

use hybridtime::calculator::{earliest, Candidate, Exactness, NextChangeCalculator};
use hybridtime::model::{
    dt, name, num, Expr, Function, ModifierId, PortId, StateId, Stmt, System,
};
use hybridtime::solver::Problem;
use hybridtime::symbolic::{Formula, Poly, Scope, ScopeError};
use hybridtime::time::{Epsilon, Rational, TimeDomain};

fn r(n: i64) -> Rational {
    Rational::from(n)
}

/// Root entity with an active `run` state, an inactive `done` state and a
/// port `A` starting at 5.
fn machine() -> (System, StateId, StateId, PortId) {
    let mut sys = System::new("machine");
    let root = sys.root();
    let run = sys.add_state(root, "run").unwrap();
    let done = sys.add_state(root, "done").unwrap();
    let a = sys.add_port(root, "A", 5).unwrap();
    (sys, run, done, a)
}

fn with_ramp(sys: &mut System, run: StateId, a: PortId) {
    let root = sys.root();
    sys.add_update(root, "ramp", run, a, Function::returning(name("A_0") + dt()))
        .unwrap();
}

#[test]
fn no_modifiers_means_no_change() {
    let mut sys = System::new("empty");
    let root = sys.root();
    sys.add_port(root, "A", 1).unwrap();
    let calc = NextChangeCalculator::default();
    assert_eq!(calc.next_behaviour_change(&sys).unwrap(), None);
    assert!(calc.candidates(&sys).unwrap().is_empty());
}

/// Distinct modifier ids; only a system hands them out.
fn modifier_ids(n: usize) -> Vec<ModifierId> {
    let mut sys = System::new("ids");
    let root = sys.root();
    let p = sys.add_port(root, "p", 0).unwrap();
    let s = sys.add_state(root, "s").unwrap();
    (0..n)
        .map(|i| {
            sys.add_update(root, format!("u{i}"), s, p, Function::returning(num(0)))
                .unwrap()
        })
        .collect()
}

#[test]
fn aggregation_ignores_input_order() {
    let ids = modifier_ids(4);
    let make = |time: Epsilon, m: usize| Candidate {
        time,
        modifier: ids[m],
        label: None,
        exactness: Exactness::Optimal,
    };
    let forward = vec![
        make(Epsilon::just_after(r(4)), 0),
        make(Epsilon::just_after(r(2)), 1),
        make(Epsilon::exact(r(2)), 2),
        make(Epsilon::exact(r(3)), 3),
    ];
    let mut backward = forward.clone();
    backward.reverse();
    let mut rotated = forward.clone();
    rotated.rotate_left(2);

    let expected = Some(make(Epsilon::exact(r(2)), 2));
    assert_eq!(earliest(forward), expected);
    assert_eq!(earliest(backward), expected);
    assert_eq!(earliest(rotated), expected);
    assert_eq!(earliest(Vec::new()), None);
}

#[test]
fn cache_is_built_once_per_revision() {
    let (mut sys, run, done, a) = machine();
    with_ramp(&mut sys, run, a);
    let root = sys.root();
    sys.add_transition(root, "stop", run, done, name("A").ge(num(10)))
        .unwrap();

    let calc = NextChangeCalculator::default();
    let first = calc.candidates(&sys).unwrap();
    let second = calc.candidates(&sys).unwrap();
    assert_eq!(first, second);
    assert_eq!(calc.store().builds(), 1);

    // observed values are not structural
    sys.set_value(a, 6).unwrap();
    let moved = calc.next_behaviour_change(&sys).unwrap().unwrap();
    assert_eq!(calc.store().builds(), 1);
    assert_eq!(moved.time, Epsilon::exact(r(4)));

    sys.add_port(root, "B", 0).unwrap();
    calc.candidates(&sys).unwrap();
    assert_eq!(calc.store().builds(), 2);

    assert!(calc.invalidate(&sys));
    calc.candidates(&sys).unwrap();
    assert_eq!(calc.store().builds(), 3);
}

#[test]
fn foreign_scope_variables_are_rejected() {
    let mut home = Scope::new();
    let dt_home = home.declare("dt");
    let mut other = Scope::new();
    let x = other.declare("x");

    let mut problem = Problem::new(&home, dt_home, TimeDomain::Rational).unwrap();
    let foreign = Formula::gt(&Poly::var(x), &Poly::zero()).unwrap();
    assert!(matches!(
        problem.assert(foreign),
        Err(ScopeError::ForeignVariable { .. })
    ));
    assert!(problem.assertions().is_empty());

    assert!(Problem::new(&home, x, TimeDomain::Rational).is_err());

    let (forked, translation) = home.fork();
    let local = Formula::ge(&Poly::var(dt_home), &Poly::zero()).unwrap();
    let rebound = local.rebind(&translation).unwrap();
    let dt_forked = translation.rebind_var(dt_home).unwrap();
    let mut isolated = Problem::new(&forked, dt_forked, TimeDomain::Rational).unwrap();
    assert!(isolated.assert(local).is_err());
    assert!(isolated.assert(rebound).is_ok());
}

#[test]
fn non_branching_influence_changes_nothing() {
    let (mut sys, _, _, a) = machine();
    let root = sys.root();
    let b = sys.add_port(root, "B", 0).unwrap();
    sys.add_influence(root, "drive", a, b, Function::unary("v", name("v") + 2 * dt()))
        .unwrap();
    let calc = NextChangeCalculator::default();
    assert_eq!(calc.next_behaviour_change(&sys).unwrap(), None);
}

#[test]
fn guard_on_pinned_source_is_never_enabled() {
    let (mut sys, run, done, _) = machine();
    let root = sys.root();
    sys.add_transition(root, "stop", run, done, name("A").gt(num(10)))
        .unwrap();
    let calc = NextChangeCalculator::default();
    let report = calc.evaluate(&sys).unwrap();
    assert_eq!(report.never.len(), 1);
    assert!(report.candidates.is_empty());
    assert_eq!(calc.next_behaviour_change(&sys).unwrap(), None);
}

#[test]
fn closed_guard_on_ramp_is_exact() {
    let (mut sys, run, done, a) = machine();
    with_ramp(&mut sys, run, a);
    let root = sys.root();
    let stop = sys
        .add_transition(root, "stop", run, done, name("A").ge(num(10)))
        .unwrap();
    let next = NextChangeCalculator::default()
        .next_behaviour_change(&sys)
        .unwrap()
        .unwrap();
    assert_eq!(next.modifier, stop);
    assert_eq!(next.time, Epsilon::exact(r(5)));
    assert!(next.time.is_exact());
}

#[test]
fn strict_guard_on_ramp_is_just_after() {
    let (mut sys, run, done, a) = machine();
    with_ramp(&mut sys, run, a);
    let root = sys.root();
    sys.add_transition(root, "stop", run, done, name("A").gt(num(10)))
        .unwrap();
    let next = NextChangeCalculator::default()
        .next_behaviour_change(&sys)
        .unwrap()
        .unwrap();
    assert_eq!(next.time, Epsilon::new(r(5), r(1)));
    assert_eq!(next.time.to_string(), "5+ε");
}

#[test]
fn branch_on_pinned_source_never_flips() {
    let (mut sys, run, _, _) = machine();
    let root = sys.root();
    let b = sys.add_port(root, "B", 0).unwrap();
    let body = Function::new(
        Vec::<String>::new(),
        vec![Stmt::if_else(
            name("A").gt(num(0)),
            vec![Stmt::ret(num(1))],
            vec![Stmt::ret(num(-1))],
        )],
    );
    let sign = sys.add_update(root, "sign", run, b, body).unwrap();
    let calc = NextChangeCalculator::default();
    let report = calc.evaluate(&sys).unwrap();
    assert_eq!(report.never, vec![sign]);
    assert_eq!(calc.next_behaviour_change(&sys).unwrap(), None);
}

#[test]
fn qualified_and_pre_spellings_resolve_from_the_parent() {
    let mut sys = System::new("plant");
    let root = sys.root();
    let tank = sys.add_entity(root, "tank").unwrap();
    let fill = sys.add_state(tank, "fill").unwrap();
    let full = sys.add_state(tank, "full").unwrap();
    let level = sys.add_port(tank, "level", 2).unwrap();
    sys.add_update(
        tank,
        "rise",
        fill,
        level,
        Function::returning(name("level.pre") + 2 * dt()),
    )
    .unwrap();
    let run = sys.add_state(root, "run").unwrap();
    let idle = sys.add_state(root, "idle").unwrap();
    sys.add_transition(root, "watch", run, idle, name("tank.level").ge(num(8)))
        .unwrap();
    sys.add_transition(tank, "spill", fill, full, name("level").ge(num(12)))
        .unwrap();

    let candidates = NextChangeCalculator::default().candidates(&sys).unwrap();
    let times: Vec<Epsilon> = candidates.iter().map(|c| c.time).collect();
    assert_eq!(times, vec![Epsilon::exact(r(3)), Epsilon::exact(r(5))]);
}

/// Source `S = 5` driving `A = v + dt` through an influence.
fn influenced(guard: Expr) -> (System, ModifierId) {
    let mut sys = System::new("machine");
    let root = sys.root();
    let run = sys.add_state(root, "run").unwrap();
    let done = sys.add_state(root, "done").unwrap();
    let s = sys.add_port(root, "S", 5).unwrap();
    let a = sys.add_port(root, "A", 0).unwrap();
    sys.add_influence(root, "drive", s, a, Function::unary("v", name("v") + dt()))
        .unwrap();
    let stop = sys.add_transition(root, "stop", run, done, guard).unwrap();
    (sys, stop)
}

#[test]
fn closed_guard_on_influenced_port_is_exact() {
    let (sys, stop) = influenced(name("A").ge(num(10)));
    let next = NextChangeCalculator::default()
        .next_behaviour_change(&sys)
        .unwrap()
        .unwrap();
    assert_eq!(next.modifier, stop);
    assert_eq!(next.time, Epsilon::exact(r(5)));
}

#[test]
fn strict_guard_on_influenced_port_is_just_after() {
    let (sys, stop) = influenced(name("A").gt(num(10)));
    let next = NextChangeCalculator::default()
        .next_behaviour_change(&sys)
        .unwrap()
        .unwrap();
    assert_eq!(next.modifier, stop);
    assert_eq!(next.time, Epsilon::just_after(r(5)));
}

#[test]
fn forked_systems_do_not_share_cached_constraints() {
    let (base, run, done, a) = machine();
    let root = base.root();

    let mut left = base.clone();
    with_ramp(&mut left, run, a);
    left.add_transition(root, "stop", run, done, name("A").ge(num(10)))
        .unwrap();

    let mut right = base.clone();
    right.add_port(root, "B", 1).unwrap();
    right
        .add_transition(root, "stop", run, done, name("B").gt(num(0)))
        .unwrap();
    assert_eq!(left.revision(), right.revision());

    let calc = NextChangeCalculator::default();
    let l = calc.next_behaviour_change(&left).unwrap().map(|c| c.time);
    let r_time = calc.next_behaviour_change(&right).unwrap().map(|c| c.time);
    assert_eq!(l, Some(Epsilon::exact(r(5))));
    assert_eq!(r_time, Some(Epsilon::exact(r(0))));
    assert_eq!(calc.store().builds(), 2);

    drop(left);
    assert_eq!(calc.store().prune(), 1);
}

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use super::{
    CacheError, CachedModifier, ConditionSet, ConstraintCache, ModifierFacts, PortVars, Shape,
    Spelling,
};
use crate::model::{
    analysis, EntityId, Expr, Function, Modifier, ModifierId, ModifierKind, PortId, System,
};
use crate::symbolic::{
    translate_assignment, translate_condition, Formula, Poly, Resolve, Scope, TranslateError, Var,
};

/// Name resolution for one entity at time 0 or at time `dt`.
///
/// At time 0 every port spelling denotes the pre-value and `dt` is zero.
struct AtTime<'a> {
    spellings: &'a HashMap<String, Spelling>,
    ports: &'a [PortVars],
    dt: Var,
    at_zero: bool,
}

impl Resolve for AtTime<'_> {
    fn name(&self, name: &str) -> Option<Poly> {
        match self.spellings.get(name) {
            Some(Spelling::Current(p)) if !self.at_zero => {
                Some(Poly::var(self.ports[p.index()].current))
            }
            Some(Spelling::Current(p)) | Some(Spelling::Pre(p)) => {
                Some(Poly::var(self.ports[p.index()].pre))
            }
            None if name == "dt" => Some(self.dt()),
            None => None,
        }
    }

    fn dt(&self) -> Poly {
        if self.at_zero {
            Poly::zero()
        } else {
            Poly::var(self.dt)
        }
    }
}

/// Spelling table of one entity: its own ports first (bare and qualified),
/// then its direct children's ports (qualified).
fn spelling_table(system: &System, entity: EntityId) -> HashMap<String, Spelling> {
    let mut table = HashMap::new();
    let Some(owner) = system.entity(entity) else {
        return table;
    };
    let mut register = |prefix: Option<&str>, port: PortId, name: &str| {
        let base = match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.to_string(),
        };
        table
            .entry(format!("{base}_0"))
            .or_insert(Spelling::Pre(port));
        table
            .entry(format!("{base}.pre"))
            .or_insert(Spelling::Pre(port));
        table.entry(base).or_insert(Spelling::Current(port));
    };

    for port in system.ports_of(entity) {
        if let Some(decl) = system.port(port) {
            register(None, port, &decl.name);
            register(Some(&owner.name), port, &decl.name);
        }
    }
    for child in system.children(entity) {
        let Some(child_decl) = system.entity(child) else {
            continue;
        };
        for port in system.ports_of(child) {
            if let Some(decl) = system.port(port) {
                register(Some(&child_decl.name), port, &decl.name);
            }
        }
    }
    table
}

fn read_facts(
    names: &BTreeSet<String>,
    spellings: &HashMap<String, Spelling>,
    facts: &mut ModifierFacts,
) {
    for name in names {
        match spellings.get(name) {
            Some(Spelling::Current(p)) => {
                facts.reads_current.insert(*p);
            }
            Some(Spelling::Pre(p)) => {
                facts.reads_pre.insert(*p);
            }
            None => {}
        }
    }
}

impl ConstraintCache {
    /// Declares every variable and translates every modifier of `system`.
    ///
    /// # Errors
    ///
    /// Returns `Translate` for the first body that cannot be translated.
    pub fn build(system: &System) -> Result<Self, CacheError> {
        let mut scope = Scope::new();
        let dt = scope.declare("dt");

        let mut ports = Vec::new();
        let mut pre_ports = HashMap::new();
        for (id, port) in system.ports() {
            let owner = system
                .entity(port.entity)
                .map(|e| e.name.as_str())
                .unwrap_or_default();
            let vars = PortVars {
                current: scope.declare(format!("{owner}.{}", port.name)),
                pre: scope.declare(format!("{owner}.{}_0", port.name)),
            };
            pre_ports.insert(vars.pre, id);
            ports.push(vars);
        }

        let spellings: Vec<HashMap<String, Spelling>> = system
            .entities()
            .map(|(id, _)| spelling_table(system, id))
            .collect();

        let mut writers = vec![Vec::new(); ports.len()];
        let mut modifiers = Vec::new();
        for (id, modifier) in system.modifiers() {
            let cached = translate_modifier(modifier, &mut scope, &ports, &spellings, dt)
                .map_err(|source| CacheError::Translate {
                    modifier: modifier.name.clone(),
                    source,
                })?;
            if let Some(target) = cached.shape.target_port() {
                writers[target.index()].push(id);
            }
            if tracing::enabled!(tracing::Level::DEBUG) {
                log_modifier(id, &cached);
            }
            modifiers.push(cached);
        }

        info!(
            system = %system.id(),
            revision = system.revision(),
            ports = ports.len(),
            modifiers = modifiers.len(),
            vars = scope.len(),
            "built constraint cache"
        );

        Ok(Self {
            system: system.id(),
            revision: system.revision(),
            scope,
            dt,
            ports,
            pre_ports,
            spellings,
            modifiers,
            writers,
        })
    }
}

fn log_modifier(id: ModifierId, cached: &CachedModifier) {
    let primary = cached.primary.as_ref().or(cached.guard.as_ref());
    debug!(
        modifier = %id,
        name = %cached.name,
        branching = cached.facts.branching,
        constraint = %primary.map(ToString::to_string).unwrap_or_default(),
        "translated modifier"
    );
}

fn translate_modifier(
    modifier: &Modifier,
    scope: &mut Scope,
    ports: &[PortVars],
    spellings: &[HashMap<String, Spelling>],
    dt: Var,
) -> Result<CachedModifier, TranslateError> {
    let table = &spellings[modifier.entity.index()];
    let at_dt = AtTime {
        spellings: table,
        ports,
        dt,
        at_zero: false,
    };
    let at_zero = AtTime {
        at_zero: true,
        ..at_dt
    };

    let mut facts = ModifierFacts::default();
    let mut cached = CachedModifier {
        name: modifier.name.clone(),
        entity: modifier.entity,
        shape: shape_of(&modifier.kind),
        primary: None,
        guard: None,
        conditions: None,
        facts: ModifierFacts::default(),
    };

    match &modifier.kind {
        ModifierKind::Influence {
            source,
            target,
            function,
        } => {
            let src = ports[source.index()];
            let param = analysis::param_names(function)
                .first()
                .cloned()
                .unwrap_or_default();
            let live = [(param.clone(), Poly::var(src.current))];
            cached.primary = Some(translate_assignment(
                function,
                &live,
                &Poly::var(ports[target.index()].current),
                &at_dt,
            )?);

            facts.reads_current.insert(*source);
            read_facts(&analysis::referenced_names(function), table, &mut facts);
            facts.branching = analysis::contains_conditional(function);

            if facts.branching {
                let param_var = scope.declare(format!("{param}_{}", modifier.uid.simple()));
                let before = [(param.clone(), Poly::var(src.pre))];
                let after = [(param, Poly::var(param_var))];
                let mut set = condition_set(function, &before, &after, &at_zero, &at_dt)?;
                let binding = Formula::eq(&Poly::var(param_var), &Poly::var(src.current))
                    .ok_or_else(|| TranslateError::Overflow(modifier.name.clone()))?;
                set.auxiliary.push(binding);
                cached.conditions = Some(set);
            }
        }
        ModifierKind::Update {
            target, function, ..
        } => {
            cached.primary = Some(translate_assignment(
                function,
                &[],
                &Poly::var(ports[target.index()].current),
                &at_dt,
            )?);
            read_facts(&analysis::referenced_names(function), table, &mut facts);
            facts.branching = analysis::contains_conditional(function);
            if facts.branching {
                cached.conditions = Some(condition_set(function, &[], &[], &at_zero, &at_dt)?);
            }
        }
        ModifierKind::Transition { guard, .. } => {
            cached.guard = Some(translate_condition(guard, &[], &at_dt)?);
            read_facts(&analysis::expr_names(guard), table, &mut facts);
            facts.branching = analysis::expr_contains_conditional(guard);
        }
    }

    facts.params = modifier
        .function()
        .map(|f| analysis::param_names(f).to_vec())
        .unwrap_or_default();
    cached.facts = facts;
    Ok(cached)
}

fn shape_of(kind: &ModifierKind) -> Shape {
    match kind {
        ModifierKind::Influence { source, target, .. } => Shape::Influence {
            source: *source,
            target: *target,
        },
        ModifierKind::Update { state, target, .. } => Shape::Update {
            state: *state,
            target: *target,
        },
        ModifierKind::Transition { source, target, .. } => Shape::Transition {
            source: *source,
            target: *target,
        },
    }
}

/// `cond@0 xor cond@dt` for every distinct condition of the let-inlined body.
fn condition_set(
    function: &Function,
    before: &[(String, Poly)],
    after: &[(String, Poly)],
    at_zero: &AtTime<'_>,
    at_dt: &AtTime<'_>,
) -> Result<ConditionSet, TranslateError> {
    let inlined = analysis::inline_locals(function);
    let mut labelled: Vec<(String, Formula)> = Vec::new();
    for cond in analysis::conditions(&inlined) {
        let label = cond.to_string();
        if labelled.iter().any(|(l, _)| *l == label) {
            continue;
        }
        let flipped = flip(&cond, before, after, at_zero, at_dt)?;
        labelled.push((label, flipped));
    }
    Ok(ConditionSet {
        labelled,
        auxiliary: Vec::new(),
    })
}

fn flip(
    cond: &Expr,
    before: &[(String, Poly)],
    after: &[(String, Poly)],
    at_zero: &AtTime<'_>,
    at_dt: &AtTime<'_>,
) -> Result<Formula, TranslateError> {
    let c0 = translate_condition(cond, before, at_zero)?;
    let cdt = translate_condition(cond, after, at_dt)?;
    Ok(Formula::xor(c0, cdt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{dt, name, num, Stmt};

    fn plant() -> (System, PortId, PortId) {
        let mut sys = System::new("plant");
        let root = sys.root();
        let a = sys.add_port(root, "A", 5).unwrap();
        let b = sys.add_port(root, "B", 0).unwrap();
        (sys, a, b)
    }

    #[test]
    fn spellings_cover_bare_qualified_and_pre_forms() {
        let (mut sys, a, _) = plant();
        let root = sys.root();
        let tank = sys.add_entity(root, "tank").unwrap();
        let level = sys.add_port(tank, "level", 1).unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();

        for spelling in ["A", "plant.A"] {
            assert_eq!(cache.spelling(root, spelling), Some(Spelling::Current(a)));
        }
        for spelling in ["A_0", "A.pre", "plant.A_0", "plant.A.pre"] {
            assert_eq!(cache.spelling(root, spelling), Some(Spelling::Pre(a)));
        }
        assert_eq!(
            cache.spelling(root, "tank.level"),
            Some(Spelling::Current(level))
        );
        assert_eq!(
            cache.spelling(root, "tank.level.pre"),
            Some(Spelling::Pre(level))
        );
        assert_eq!(cache.spelling(root, "level"), None);
        assert_eq!(cache.spelling(tank, "level"), Some(Spelling::Current(level)));
    }

    #[test]
    fn every_port_has_distinct_current_and_pre() {
        let (sys, a, b) = plant();
        let cache = ConstraintCache::build(&sys).unwrap();
        let va = cache.port_vars(a).unwrap();
        let vb = cache.port_vars(b).unwrap();
        assert_ne!(va.current, va.pre);
        assert_ne!(va.current, vb.current);
        assert_eq!(cache.port_of_pre(vb.pre), Some(b));
        assert_eq!(cache.port_of_pre(vb.current), None);
    }

    #[test]
    fn non_branching_influence_has_no_condition_set() {
        let (mut sys, a, b) = plant();
        let root = sys.root();
        let m = sys
            .add_influence(root, "ramp", a, b, Function::unary("v", name("v") + 2 * dt()))
            .unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();
        let cached = cache.modifier(m).unwrap();
        assert!(cached.primary.is_some());
        assert!(cached.conditions.is_none());
        assert!(!cached.facts.branching);
        assert!(cached.facts.reads_current.contains(&a));
        assert_eq!(cache.writers(b), &[m]);
    }

    #[test]
    fn branching_influence_gets_unique_parameter() {
        let (mut sys, a, b) = plant();
        let root = sys.root();
        let c = sys.add_port(root, "C", 0).unwrap();
        let body = || {
            Function::new(
                ["v"],
                vec![Stmt::if_else(
                    name("v").gt(num(0)),
                    vec![Stmt::ret(num(1))],
                    vec![Stmt::ret(num(0))],
                )],
            )
        };
        let m1 = sys.add_influence(root, "i1", a, b, body()).unwrap();
        let m2 = sys.add_influence(root, "i2", a, c, body()).unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();

        let aux = |m| {
            let set = cache.modifier(m).unwrap().conditions.clone().unwrap();
            assert_eq!(set.labelled.len(), 1);
            assert_eq!(set.labelled[0].0, "v > 0");
            set.auxiliary[0].vars()
        };
        let (p1, p2) = (aux(m1), aux(m2));
        assert_ne!(p1, p2);
        // the synthetic parameter names embed the influence uid
        let names: Vec<String> = p1
            .iter()
            .filter_map(|v| cache.scope().name_of(*v).map(str::to_string))
            .collect();
        assert!(names.iter().any(|n| n.starts_with("v_")));
    }

    #[test]
    fn update_reads_are_split_by_spelling() {
        let (mut sys, a, b) = plant();
        let root = sys.root();
        let s = sys.add_state(root, "run").unwrap();
        let m = sys
            .add_update(root, "u", s, b, Function::returning(name("A") + name("B_0")))
            .unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();
        let facts = &cache.modifier(m).unwrap().facts;
        assert_eq!(facts.reads_current.iter().copied().collect::<Vec<_>>(), vec![a]);
        assert_eq!(facts.reads_pre.iter().copied().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn unknown_name_fails_whole_build() {
        let (mut sys, _, _) = plant();
        let root = sys.root();
        let s = sys.add_state(root, "run").unwrap();
        sys.add_transition(root, "t", s, s, name("speed").gt(num(1)))
            .unwrap();
        assert_eq!(
            ConstraintCache::build(&sys).unwrap_err(),
            CacheError::Translate {
                modifier: "t".into(),
                source: TranslateError::UnknownName("speed".into()),
            }
        );
    }
}

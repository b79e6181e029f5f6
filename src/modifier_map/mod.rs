//! Backward dependency resolution from seed ports.
//!
//! Starting at the seeds, every port is mapped to the influences and active
//! updates writing it; the ports those modifiers read live are visited in
//! turn. A port with no writers is a *source* and is pinned to its observed
//! value for the query.
//!
//! The modifiers found form a dependency graph (writer of a read port before
//! reader). A cycle in it is same-instant feedback and rejected as
//! [`MapError::Cycle`].

mod error;

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::cache::{ConstraintCache, Shape};
use crate::model::{ModifierId, PortId, Snapshot};

pub use error::MapError;

/// Port → ordered writers, for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierMap {
    entries: Vec<(PortId, Vec<ModifierId>)>,
    order: Vec<ModifierId>,
}

impl ModifierMap {
    /// Builds the map reachable backwards from `seeds`.
    ///
    /// # Errors
    ///
    /// Returns `Cycle` if the reachable modifiers depend on each other
    /// circularly, and `UnknownModifier` if the cache does not match the
    /// snapshot's system.
    pub fn build(
        cache: &ConstraintCache,
        snapshot: &Snapshot,
        seeds: impl IntoIterator<Item = PortId>,
    ) -> Result<Self, MapError> {
        let mut visited: HashSet<PortId> = HashSet::new();
        let mut queue: VecDeque<PortId> = VecDeque::new();
        for seed in seeds {
            if visited.insert(seed) {
                queue.push_back(seed);
            }
        }

        let mut entries = Vec::new();
        let mut discovered: Vec<ModifierId> = Vec::new();
        let mut seen: HashSet<ModifierId> = HashSet::new();
        while let Some(port) = queue.pop_front() {
            let mut writers = Vec::new();
            for &w in cache.writers(port) {
                let cached = cache.modifier(w).ok_or(MapError::UnknownModifier(w))?;
                let active = match cached.shape {
                    Shape::Update { state, .. } => snapshot.is_active(state),
                    _ => true,
                };
                if !active {
                    continue;
                }
                writers.push(w);
                if seen.insert(w) {
                    discovered.push(w);
                    for read in &cached.facts.reads_current {
                        if visited.insert(*read) {
                            queue.push_back(*read);
                        }
                    }
                }
            }
            entries.push((port, writers));
        }

        let order = dependency_order(cache, &entries, &discovered)?;
        Ok(Self { entries, order })
    }

    /// Ports in discovery order with their active writers.
    pub fn entries(&self) -> &[(PortId, Vec<ModifierId>)] {
        &self.entries
    }

    /// Every modifier in the map, once, dependencies first. Modifiers at the
    /// same depth keep their discovery order.
    pub fn modifiers(&self) -> &[ModifierId] {
        &self.order
    }

    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.entries.iter().map(|(p, _)| *p)
    }

    /// Ports no active modifier writes.
    pub fn sources(&self) -> impl Iterator<Item = PortId> + '_ {
        self.entries
            .iter()
            .filter(|(_, writers)| writers.is_empty())
            .map(|(p, _)| *p)
    }

    pub fn writers(&self, port: PortId) -> &[ModifierId] {
        self.entries
            .iter()
            .find(|(p, _)| *p == port)
            .map(|(_, w)| w.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, modifier: ModifierId) -> bool {
        self.order.contains(&modifier)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn dependency_order(
    cache: &ConstraintCache,
    entries: &[(PortId, Vec<ModifierId>)],
    discovered: &[ModifierId],
) -> Result<Vec<ModifierId>, MapError> {
    let mut graph: DiGraph<ModifierId, ()> = DiGraph::new();
    let nodes: HashMap<ModifierId, NodeIndex> = discovered
        .iter()
        .map(|m| (*m, graph.add_node(*m)))
        .collect();
    let writers: HashMap<PortId, &[ModifierId]> =
        entries.iter().map(|(p, w)| (*p, w.as_slice())).collect();

    for &m in discovered {
        let cached = cache.modifier(m).ok_or(MapError::UnknownModifier(m))?;
        for read in &cached.facts.reads_current {
            for upstream in writers.get(read).copied().unwrap_or(&[]) {
                graph.add_edge(nodes[upstream], nodes[&m], ());
            }
        }
    }

    let topo = toposort(&graph, None).map_err(|cycle| MapError::Cycle {
        modifier: graph[cycle.node_id()],
    })?;

    let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
    for node in topo {
        let d = graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|n| depth.get(&n).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depth.insert(node, d);
    }

    let mut order = discovered.to_vec();
    // stable: discovery order breaks ties
    order.sort_by_key(|m| depth[&nodes[m]]);
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{dt, name, num, Function, System};

    #[test]
    fn chain_is_resolved_backwards() {
        let mut sys = System::new("plant");
        let root = sys.root();
        let a = sys.add_port(root, "A", 1).unwrap();
        let b = sys.add_port(root, "B", 0).unwrap();
        let c = sys.add_port(root, "C", 0).unwrap();
        let ab = sys
            .add_influence(root, "ab", a, b, Function::unary("v", name("v") + dt()))
            .unwrap();
        let bc = sys
            .add_influence(root, "bc", b, c, Function::unary("v", name("v") * 2))
            .unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();
        let map = ModifierMap::build(&cache, &sys.snapshot(), [c]).unwrap();

        assert_eq!(map.ports().collect::<Vec<_>>(), vec![c, b, a]);
        assert_eq!(map.sources().collect::<Vec<_>>(), vec![a]);
        // discovered bc first, but ab feeds it
        assert_eq!(map.modifiers(), &[ab, bc]);
        assert_eq!(map.writers(c), &[bc]);
    }

    #[test]
    fn inactive_updates_are_not_writers() {
        let mut sys = System::new("lamp");
        let root = sys.root();
        let off = sys.add_state(root, "off").unwrap();
        let on = sys.add_state(root, "on").unwrap();
        let p = sys.add_port(root, "power", 0).unwrap();
        sys.add_update(root, "glow", on, p, Function::returning(num(5)))
            .unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();
        assert!(sys.is_active(off));

        let map = ModifierMap::build(&cache, &sys.snapshot(), [p]).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.sources().collect::<Vec<_>>(), vec![p]);

        sys.set_current(root, on).unwrap();
        let map = ModifierMap::build(&cache, &sys.snapshot(), [p]).unwrap();
        assert_eq!(map.modifiers().len(), 1);
    }

    #[test]
    fn shared_upstream_is_listed_once() {
        let mut sys = System::new("plant");
        let root = sys.root();
        let a = sys.add_port(root, "A", 1).unwrap();
        let b = sys.add_port(root, "B", 0).unwrap();
        let c = sys.add_port(root, "C", 0).unwrap();
        sys.add_influence(root, "ab", a, b, Function::unary("v", name("v")))
            .unwrap();
        sys.add_influence(root, "ac", a, c, Function::unary("v", name("v")))
            .unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();
        let map = ModifierMap::build(&cache, &sys.snapshot(), [b, c, b]).unwrap();
        assert_eq!(map.modifiers().len(), 2);
        assert_eq!(map.ports().filter(|p| *p == a).count(), 1);
    }

    #[test]
    fn pre_value_reads_do_not_extend_the_map() {
        let mut sys = System::new("plant");
        let root = sys.root();
        let s = sys.add_state(root, "run").unwrap();
        let a = sys.add_port(root, "A", 1).unwrap();
        let b = sys.add_port(root, "B", 0).unwrap();
        sys.add_update(root, "u", s, b, Function::returning(name("A_0") + dt()))
            .unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();
        let map = ModifierMap::build(&cache, &sys.snapshot(), [b]).unwrap();
        assert!(!map.ports().any(|p| p == a));
    }

    #[test]
    fn feedback_loop_is_a_cycle() {
        let mut sys = System::new("plant");
        let root = sys.root();
        let a = sys.add_port(root, "A", 1).unwrap();
        let b = sys.add_port(root, "B", 0).unwrap();
        sys.add_influence(root, "ab", a, b, Function::unary("v", name("v")))
            .unwrap();
        sys.add_influence(root, "ba", b, a, Function::unary("v", name("v")))
            .unwrap();
        let cache = ConstraintCache::build(&sys).unwrap();
        assert!(matches!(
            ModifierMap::build(&cache, &sys.snapshot(), [a]),
            Err(MapError::Cycle { .. })
        ));
    }
}

//! Start-after dependencies between workloads.
//!
//! Dependents wait on signals registered per dependency config id; reaching
//! `Started` releases them. Cycle detection runs over names, once per
//! quiesced episode, and reports each cyclic name only once.

use crate::model::{ConfigId, Diagnostic};
use signal_framework::Signal;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, error};

#[derive(Debug, Default)]
pub struct StartAfterGraph {
    pending: HashMap<ConfigId, Vec<Signal>>,
    reported: HashSet<String>,
}

/// Result of one cycle check.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Every name currently on a cycle, reported before or not.
    pub members: BTreeSet<String>,
    /// One diagnostic per name seen on a cycle for the first time.
    pub diagnostics: Vec<Diagnostic>,
}

impl StartAfterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh signal released once `dependency` reports `Started`.
    pub fn register(&mut self, dependency: &ConfigId, description: String) -> Signal {
        let signal = Signal::new(description);
        self.pending
            .entry(dependency.clone())
            .or_default()
            .push(signal.clone());
        signal
    }

    /// Releases every dependent waiting on `config_id`.
    pub fn unblock(&mut self, config_id: &ConfigId) -> usize {
        let Some(waiting) = self.pending.remove(config_id) else {
            return 0;
        };
        debug!(%config_id, dependents = waiting.len(), "Releasing start-after waiters");
        for signal in &waiting {
            signal.succeed();
        }
        waiting.len()
    }

    pub fn waiting_on(&self, config_id: &ConfigId) -> usize {
        self.pending.get(config_id).map(Vec::len).unwrap_or(0)
    }

    /// Checks `edges` (name to the names it starts after) for cycles.
    ///
    /// Unknown targets must already be filtered out. Self-loops count.
    pub fn check_cycles(&mut self, edges: &BTreeMap<String, Vec<String>>) -> CycleReport {
        let mut report = CycleReport::default();
        for root in edges.keys() {
            let mut visited = HashSet::new();
            let mut path = Vec::new();
            walk(root, edges, &mut path, &mut visited, &mut |cycle| {
                report.members.extend(cycle.iter().cloned());
                let fresh: Vec<&String> = cycle
                    .iter()
                    .filter(|name| !self.reported.contains(*name))
                    .collect();
                if fresh.is_empty() {
                    return;
                }
                let rendered: Vec<String> = cycle
                    .iter()
                    .chain(cycle.first())
                    .cloned()
                    .collect();
                error!(cycle = %rendered.join(" -> "), "Start-after cycle detected");
                for name in fresh {
                    report.diagnostics.push(Diagnostic::StartAfterCycle {
                        name: name.clone(),
                        cycle: rendered.clone(),
                    });
                }
                for name in cycle {
                    self.reported.insert(name.clone());
                }
            });
        }
        report
    }
}

fn walk(
    node: &String,
    edges: &BTreeMap<String, Vec<String>>,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
    on_cycle: &mut impl FnMut(&[String]),
) {
    if let Some(start) = path.iter().position(|n| n == node) {
        on_cycle(&path[start..]);
        return;
    }
    if !visited.insert(node.clone()) {
        return;
    }
    path.push(node.clone());
    for next in edges.get(node).into_iter().flatten() {
        walk(next, edges, path, visited, on_cycle);
    }
    path.pop();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(from, to)| {
                (
                    from.to_string(),
                    to.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn three_node_cycle_reports_each_name_once() {
        let mut graph = StartAfterGraph::new();
        let abc = edges(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"])]);

        let first = graph.check_cycles(&abc);
        assert_eq!(first.diagnostics.len(), 3);
        assert_eq!(first.members.len(), 3);
        let mut names: Vec<&str> = first.diagnostics.iter().map(Diagnostic::subject).collect();
        names.sort();
        assert_eq!(names, vec!["A", "B", "C"]);

        let second = graph.check_cycles(&abc);
        assert!(second.diagnostics.is_empty());
        assert_eq!(second.members.len(), 3);
    }

    #[test]
    fn tails_into_a_cycle_are_not_members() {
        let mut graph = StartAfterGraph::new();
        let report = graph.check_cycles(&edges(&[
            ("D", &["A"]),
            ("A", &["B"]),
            ("B", &["A"]),
        ]));
        assert!(!report.members.contains("D"));
        assert_eq!(report.diagnostics.len(), 2);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = StartAfterGraph::new();
        let report = graph.check_cycles(&edges(&[("A", &["A"])]));
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn acyclic_graph_is_quiet() {
        let mut graph = StartAfterGraph::new();
        let report = graph.check_cycles(&edges(&[("A", &["B", "C"]), ("B", &["C"]), ("C", &[])]));
        assert_eq!(report, CycleReport::default());
    }

    #[test]
    fn unblock_releases_registered_waiters() {
        let mut graph = StartAfterGraph::new();
        let dep = ConfigId::from("7");
        let first = graph.register(&dep, "resolves when db has started".into());
        let second = graph.register(&dep, "resolves when db has started".into());
        assert_eq!(graph.waiting_on(&dep), 2);

        assert_eq!(graph.unblock(&dep), 2);
        assert!(first.is_resolved() && second.is_resolved());
        assert_eq!(graph.unblock(&dep), 0);
    }
}

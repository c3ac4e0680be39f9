// src/graph/cycles.rs

//! Dependency cycle detection.

use std::collections::HashMap;

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::task::{Task, TaskId};

/// DFS colour of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not visited yet.
    White,
    /// On the current DFS path.
    Gray,
    /// Fully explored.
    Black,
}

/// Directed "depends on" graph of a task batch.
///
/// Edge direction: task → dependency. Dependencies that are not part of the
/// batch are left out (the orphan check reports those). Node and edge order
/// follow batch order and dependency-list order, which keeps cycle reports
/// deterministic.
#[derive(Debug, Clone)]
pub struct DependencyGraph<'a> {
    graph: DiGraphMap<&'a str, ()>,
}

impl<'a> DependencyGraph<'a> {
    pub fn from_tasks(tasks: &'a [Task]) -> Self {
        let mut graph: DiGraphMap<&'a str, ()> = DiGraphMap::new();

        for task in tasks {
            graph.add_node(task.id.as_str());
        }
        for task in tasks {
            for dep in &task.dependencies {
                if graph.contains_node(dep.as_str()) {
                    graph.add_edge(task.id.as_str(), dep.as_str(), ());
                }
            }
        }

        Self { graph }
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Every cycle closed by a DFS back-edge.
    ///
    /// Each cycle is a path `[v, ..., u, v]` where `u → v` is the back-edge
    /// that closes it. A self-dependency is reported as `[v, v]`. Removing the
    /// closing edge of every reported cycle leaves the graph acyclic.
    pub fn find_cycles(&self) -> Vec<Vec<TaskId>> {
        let mut color: HashMap<&str, Color> =
            self.graph.nodes().map(|n| (n, Color::White)).collect();
        let mut cycles = Vec::new();

        let roots: Vec<&str> = self.graph.nodes().collect();
        for root in roots {
            if color.get(root) != Some(&Color::White) {
                continue;
            }

            // Explicit stack of (node, index of next neighbour to visit).
            let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
            let mut path: Vec<&str> = vec![root];
            color.insert(root, Color::Gray);

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                let neighbour = self.graph.neighbors(node).nth(*next);
                *next += 1;

                match neighbour {
                    Some(dep) => match color.get(dep).copied().unwrap_or(Color::White) {
                        Color::White => {
                            color.insert(dep, Color::Gray);
                            stack.push((dep, 0));
                            path.push(dep);
                        }
                        Color::Gray => {
                            let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                            let mut cycle: Vec<TaskId> =
                                path[start..].iter().map(|s| s.to_string()).collect();
                            cycle.push(dep.to_string());
                            cycles.push(cycle);
                        }
                        Color::Black => {}
                    },
                    None => {
                        color.insert(node, Color::Black);
                        stack.pop();
                        path.pop();
                    }
                }
            }
        }

        cycles
    }

    /// The first cycle found, if any.
    pub fn first_cycle(&self) -> Option<Vec<TaskId>> {
        self.find_cycles().into_iter().next()
    }

    /// Task ids ordered so that every task comes after its dependencies.
    ///
    /// `None` if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<TaskId>> {
        // Edges point at dependencies, so toposort yields dependents first.
        let mut order: Vec<TaskId> = toposort(&self.graph, None)
            .ok()?
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        order.reverse();
        Some(order)
    }
}

/// The edge `(task, dependency)` that closes `cycle`.
pub fn closing_edge(cycle: &[TaskId]) -> Option<(TaskId, TaskId)> {
    match cycle {
        [.., from, to] => Some((from.clone(), to.clone())),
        _ => None,
    }
}

/// `a -> b -> c -> a` rendering using task names where known.
pub fn describe_cycle(cycle: &[TaskId], tasks: &[Task]) -> String {
    let names: HashMap<&str, &str> = tasks
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();
    cycle
        .iter()
        .map(|id| match names.get(id.as_str()) {
            Some(name) => format!("'{name}' ({id})"),
            None => id.clone(),
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

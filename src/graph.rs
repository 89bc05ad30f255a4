//! Dependency graph construction and topological ordering.
//!
//! Every schema key is a node. A key with pending rules gets an edge from each
//! key its rules read. Literal keys have no incoming edges.
//!
//! Ordering uses Kahn's algorithm with ties broken by first-declaration order,
//! so the same schema and overrides always yield the same order.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::CalcfigError;
use crate::parser::ResolvedConfig;
use crate::types::OrderEntry;

/// Keys and the keys they read, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Keys read by `key`'s pending rules. Empty for literal keys and for keys
    /// not in the graph.
    pub fn dependencies(&self, key: &str) -> &[String] {
        self.nodes.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Declaration index of `key`, used to break ordering ties.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.nodes.get_index_of(key)
    }

    /// `(dependency, dependent)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes
            .iter()
            .flat_map(|(key, deps)| deps.iter().map(move |d| (d.as_str(), key.as_str())))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn interned(&self, key: &str) -> Option<&str> {
        self.nodes.get_key_value(key).map(|(k, _)| k.as_str())
    }
}

/// Build the graph from the parser's plan. No rule is invoked.
pub fn build_graph(resolved: &ResolvedConfig) -> DependencyGraph {
    let mut nodes = IndexMap::with_capacity(resolved.types().len());
    for key in resolved.types().keys() {
        let mut deps: Vec<String> = Vec::new();
        if let Some(resolution) = resolved.resolution(key) {
            for function in resolution.functions() {
                for dep in function.dependencies() {
                    if !deps.contains(dep) {
                        deps.push(dep.clone());
                    }
                }
            }
        }
        nodes.insert(key.clone(), deps);
    }
    DependencyGraph { nodes }
}

/// Compute an evaluation order.
///
/// Without `requested`, every key is ordered. With it, each entry in turn
/// contributes its keys plus any transitive dependencies not yet placed.
/// Dependencies listed in `settled` (already evaluated earlier) are not pulled
/// in again; explicitly requested keys always are.
pub fn topological_sort(
    graph: &DependencyGraph,
    requested: Option<&[OrderEntry]>,
    settled: &IndexSet<String>,
) -> Result<Vec<String>, CalcfigError> {
    let entries: Vec<Vec<&str>> = match requested {
        Some(entries) => entries
            .iter()
            .map(|e| e.keys().iter().map(String::as_str).collect())
            .collect(),
        None => vec![graph.keys().collect()],
    };

    let mut placed: IndexSet<&str> = IndexSet::new();
    for entry in entries {
        let mut roots: Vec<&str> = Vec::with_capacity(entry.len());
        for key in entry {
            let key = graph
                .interned(key)
                .ok_or_else(|| CalcfigError::UnknownKey(key.into()))?;
            roots.push(key);
        }

        let subset = closure(graph, &roots, &placed, settled);
        placed.extend(kahn(graph, &subset)?);
    }

    let order: Vec<String> = placed.into_iter().map(String::from).collect();
    debug!(order = ?order, "topological order");
    Ok(order)
}

/// `roots` plus their transitive dependencies, minus what is already placed
/// or settled.
fn closure<'g>(
    graph: &'g DependencyGraph,
    roots: &[&'g str],
    placed: &IndexSet<&str>,
    settled: &IndexSet<String>,
) -> IndexSet<&'g str> {
    let mut subset: IndexSet<&'g str> = IndexSet::new();
    let mut stack: Vec<&'g str> = roots.iter().rev().copied().collect();

    while let Some(key) = stack.pop() {
        if placed.contains(key) || !subset.insert(key) {
            continue;
        }
        for dep in graph.dependencies(key) {
            let dep = dep.as_str();
            if !placed.contains(dep) && !settled.contains(dep) && !subset.contains(dep) {
                stack.push(dep);
            }
        }
    }
    subset
}

/// Kahn's algorithm restricted to `subset`. Edges leaving the subset are
/// already satisfied.
fn kahn<'g>(
    graph: &'g DependencyGraph,
    subset: &IndexSet<&'g str>,
) -> Result<Vec<&'g str>, CalcfigError> {
    let mut in_degree: IndexMap<&str, usize> = subset.iter().map(|k| (*k, 0)).collect();
    let mut dependents: IndexMap<&str, Vec<&'g str>> = IndexMap::new();

    for &key in subset {
        for dep in graph.dependencies(key) {
            if subset.contains(dep.as_str()) {
                if let Some(degree) = in_degree.get_mut(key) {
                    *degree += 1;
                }
                dependents.entry(dep.as_str()).or_default().push(key);
            }
        }
    }

    let rank = |key: &str| graph.position(key).unwrap_or(usize::MAX);
    let mut ready: BTreeSet<(usize, &'g str)> = subset
        .iter()
        .filter(|k| in_degree.get(**k) == Some(&0))
        .map(|k| (rank(k), *k))
        .collect();

    let mut sorted: Vec<&'g str> = Vec::with_capacity(subset.len());
    while let Some((_, key)) = ready.pop_first() {
        sorted.push(key);
        for &dependent in dependents.get(key).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert((rank(dependent), dependent));
                }
            }
        }
    }

    if sorted.len() != subset.len() {
        let blocked: Vec<&str> = graph
            .keys()
            .filter(|k| in_degree.get(*k).is_some_and(|d| *d > 0))
            .collect();
        let path = trace_cycle(graph, &blocked);
        return Err(CalcfigError::DependencyCycle {
            keys: blocked.iter().map(|k| k.to_string()).collect(),
            path,
        });
    }

    Ok(sorted)
}

/// Follow dependency edges inside `blocked` until a key repeats, and return
/// that loop, e.g. `[a, b, a]` for "a reads b, b reads a".
///
/// Every blocked key still has at least one blocked dependency, so the walk
/// always closes a loop.
fn trace_cycle(graph: &DependencyGraph, blocked: &[&str]) -> Vec<String> {
    let Some(&start) = blocked.first() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = vec![start];
    let mut current = start;
    while let Some(next) = graph
        .dependencies(current)
        .iter()
        .map(String::as_str)
        .find(|d| blocked.contains(d))
    {
        if let Some(pos) = path.iter().position(|p| *p == next) {
            path.push(next);
            return path[pos..].iter().map(|k| k.to_string()).collect();
        }
        path.push(next);
        current = next;
    }

    path.iter().map(|k| k.to_string()).collect()
}

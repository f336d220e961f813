//! Dependency scheduling.
//!
//! Orders named units (phases, or app groups inside a phase) so that every
//! unit comes after its dependencies, and partitions them into levels whose
//! members can run concurrently.
//!
//! Ties are broken by declaration order: the position of a unit in the input
//! slice. Repeated calls on the same input always return the same result.

use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A named node with the names it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub depends_on: Vec<String>,
}

impl Unit {
    /// Create a unit.
    pub fn new<S: Into<String>>(name: S, depends_on: Vec<String>) -> Self {
        Self {
            name: name.into(),
            depends_on,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    InProgress,
    Done,
}

/// Index of every unit by name, rejecting duplicates.
fn index_units(units: &[Unit]) -> Result<HashMap<&str, usize>> {
    let mut index = HashMap::with_capacity(units.len());
    for (i, unit) in units.iter().enumerate() {
        if index.insert(unit.name.as_str(), i).is_some() {
            return Err(Error::DuplicateUnit(unit.name.clone()));
        }
    }
    Ok(index)
}

/// Resolve dependency names to indices, deduplicated, in declaration order.
fn resolve_edges(units: &[Unit], index: &HashMap<&str, usize>) -> Result<Vec<Vec<usize>>> {
    let mut edges = Vec::with_capacity(units.len());
    for unit in units {
        let mut deps: Vec<usize> = Vec::with_capacity(unit.depends_on.len());
        for dep in &unit.depends_on {
            let idx = index.get(dep.as_str()).ok_or_else(|| Error::UnknownDependency {
                unit: unit.name.clone(),
                missing: dep.clone(),
            })?;
            if !deps.contains(idx) {
                deps.push(*idx);
            }
        }
        edges.push(deps);
    }
    Ok(edges)
}

/// Depth-first three-color search. Returns the cycle path on a back edge.
///
/// Uses an explicit stack so long dependency chains cannot overflow.
fn find_cycle(units: &[Unit], edges: &[Vec<usize>]) -> Option<Vec<String>> {
    let mut colors = vec![Color::Unvisited; units.len()];
    // Current path: each node with the index of its next edge to follow.
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..units.len() {
        if colors[start] != Color::Unvisited {
            continue;
        }
        colors[start] = Color::InProgress;
        stack.push((start, 0));

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let Some(&dep) = edges[node].get(top.1) else {
                colors[node] = Color::Done;
                stack.pop();
                continue;
            };
            top.1 += 1;

            match colors[dep] {
                Color::InProgress => {
                    let from = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[from..]
                        .iter()
                        .map(|&(n, _)| units[n].name.clone())
                        .collect();
                    cycle.push(units[dep].name.clone());
                    return Some(cycle);
                }
                Color::Unvisited => {
                    colors[dep] = Color::InProgress;
                    stack.push((dep, 0));
                }
                Color::Done => {}
            }
        }
    }
    None
}

/// Validated dependency graph over a unit slice.
struct Graph<'a> {
    units: &'a [Unit],
    edges: Vec<Vec<usize>>,
}

impl<'a> Graph<'a> {
    fn build(units: &'a [Unit]) -> Result<Self> {
        let index = index_units(units)?;
        let edges = resolve_edges(units, &index)?;
        if let Some(cycle) = find_cycle(units, &edges) {
            return Err(Error::CircularDependency { cycle });
        }
        Ok(Self { units, edges })
    }

    /// Kahn's algorithm, always taking the ready unit declared first.
    fn order(&self) -> Vec<usize> {
        let n = self.units.len();
        let mut remaining: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (unit, deps) in self.edges.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(unit);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut result = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            result.push(next);
            for &dependent in &dependents[next] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        result
    }

    /// Longest-path layering: a unit sits one level above its deepest dependency.
    fn levels(&self) -> Vec<Vec<usize>> {
        let mut depth = vec![0usize; self.units.len()];
        for unit in self.order() {
            depth[unit] = self.edges[unit]
                .iter()
                .map(|&dep| depth[dep] + 1)
                .max()
                .unwrap_or(0);
        }

        let mut levels: Vec<Vec<usize>> = Vec::new();
        for (unit, &d) in depth.iter().enumerate() {
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(unit);
        }
        levels
    }

    fn names(&self, indices: impl IntoIterator<Item = usize>) -> Vec<String> {
        indices
            .into_iter()
            .map(|i| self.units[i].name.clone())
            .collect()
    }
}

/// Check references, duplicates and cycles without producing an order.
pub fn validate(units: &[Unit]) -> Result<()> {
    Graph::build(units).map(|_| ())
}

/// A topological order: every unit appears after all of its dependencies.
pub fn order(units: &[Unit]) -> Result<Vec<String>> {
    let graph = Graph::build(units)?;
    Ok(graph.names(graph.order()))
}

/// Partition units into levels.
///
/// Level 0 holds units without dependencies; level k holds units whose
/// dependencies all sit in levels `0..k`. No unit depends on a unit in its own
/// or a later level, so a level's members may run concurrently.
pub fn levels(units: &[Unit]) -> Result<Vec<Vec<String>>> {
    let graph = Graph::build(units)?;
    Ok(graph
        .levels()
        .into_iter()
        .map(|level| graph.names(level))
        .collect())
}

/// `target` plus everything it transitively depends on, in topological order.
pub fn with_dependencies(target: &str, units: &[Unit]) -> Result<Vec<String>> {
    let graph = Graph::build(units)?;
    let start = units
        .iter()
        .position(|u| u.name == target)
        .ok_or_else(|| Error::ConfigValidation(format!("Unknown phase: {}", target)))?;

    let mut needed: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<usize> = VecDeque::from([start]);
    while let Some(unit) = queue.pop_front() {
        if needed.insert(unit) {
            queue.extend(graph.edges[unit].iter().copied());
        }
    }

    Ok(graph.names(graph.order().into_iter().filter(|i| needed.contains(i))))
}

/// Restrict `units` to the given names, keeping declaration order.
pub fn subset(units: &[Unit], names: &[String]) -> Vec<Unit> {
    units
        .iter()
        .filter(|u| names.contains(&u.name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(graph: &[(&str, &[&str])]) -> Vec<Unit> {
        graph
            .iter()
            .map(|(name, deps)| Unit::new(*name, deps.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_order_fan_out() {
        let u = units(&[("p1", &[]), ("p2", &["p1"]), ("p3", &["p1"])]);
        assert_eq!(order(&u).unwrap(), vec!["p1", "p2", "p3"]);
        assert_eq!(
            levels(&u).unwrap(),
            vec![vec!["p1".to_string()], vec!["p2".to_string(), "p3".to_string()]]
        );
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let u = units(&[("c", &[]), ("a", &[]), ("b", &["c"])]);
        assert_eq!(order(&u).unwrap(), vec!["c", "a", "b"]);
        assert_eq!(levels(&u).unwrap()[0], vec!["c", "a"]);
    }

    #[test]
    fn test_two_cycle() {
        let u = units(&[("p1", &["p2"]), ("p2", &["p1"])]);
        match order(&u) {
            Err(Error::CircularDependency { cycle }) => {
                assert_eq!(cycle, vec!["p1", "p2", "p1"]);
            }
            other => panic!("expected circular dependency, got {:?}", other),
        }
        assert!(matches!(levels(&u), Err(Error::CircularDependency { .. })));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let u = units(&[("solo", &["solo"])]);
        match validate(&u) {
            Err(Error::CircularDependency { cycle }) => assert_eq!(cycle, vec!["solo", "solo"]),
            other => panic!("expected circular dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let u = units(&[("app", &["db"])]);
        match order(&u) {
            Err(Error::UnknownDependency { unit, missing }) => {
                assert_eq!(unit, "app");
                assert_eq!(missing, "db");
            }
            other => panic!("expected unknown dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_unit() {
        let u = units(&[("a", &[]), ("a", &[])]);
        assert!(matches!(validate(&u), Err(Error::DuplicateUnit(name)) if name == "a"));
    }

    #[test]
    fn test_with_dependencies() {
        let u = units(&[
            ("infra", &[]),
            ("data", &["infra"]),
            ("apps", &["data"]),
            ("monitoring", &["infra"]),
        ]);
        assert_eq!(with_dependencies("apps", &u).unwrap(), vec!["infra", "data", "apps"]);
        assert_eq!(with_dependencies("infra", &u).unwrap(), vec!["infra"]);
        assert!(matches!(
            with_dependencies("nope", &u),
            Err(Error::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_duplicate_dependency_names_are_ignored() {
        let u = units(&[("a", &[]), ("b", &["a", "a"])]);
        assert_eq!(order(&u).unwrap(), vec!["a", "b"]);
    }

    fn chain(len: usize) -> Vec<Unit> {
        (0..len)
            .map(|i| {
                let deps = if i + 1 < len { vec![format!("u{}", i + 1)] } else { vec![] };
                Unit::new(format!("u{}", i), deps)
            })
            .collect()
    }

    #[test]
    fn test_long_chain() {
        let u = chain(200_000);
        let order = order(&u).unwrap();
        assert_eq!(order.first().map(String::as_str), Some("u199999"));
        assert_eq!(order.last().map(String::as_str), Some("u0"));
    }

    #[test]
    fn test_cycle_closing_a_long_chain() {
        let mut u = chain(200_000);
        u[199_999].depends_on.push("u0".to_string());
        match validate(&u) {
            Err(Error::CircularDependency { cycle }) => {
                assert_eq!(cycle.len(), 200_001);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected circular dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(order(&[]).unwrap().is_empty());
        assert!(levels(&[]).unwrap().is_empty());
    }
}

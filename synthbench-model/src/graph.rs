//! Dependency Graph
//!
//! Tracks which parameters an array's size expression reads, so cycles and
//! out-of-order size dependencies can be reported before any generation runs.

use fxhash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// Errors from graph operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// A cycle was detected in the dependency graph during topological sort.
    #[error("Cycle detected: {0}")]
    CycleDetected(String),
}

/// Dependency graph over parameter names
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Node -> dependencies mapping
    edges: FxHashMap<String, FxHashSet<String>>,
    /// All nodes in insertion order
    nodes: Vec<String>,
}

impl DependencyGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node
    pub fn add_node(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.nodes.contains(&id) {
            self.nodes.push(id);
        }
    }

    /// Add a dependency: `from` depends on `to`
    pub fn add_dependency(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();

        self.add_node(from.clone());
        self.add_node(to.clone());

        self.edges.entry(from).or_default().insert(to);
    }

    /// Perform topological sort
    ///
    /// Returns nodes in dependency order: dependencies come before dependents.
    pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
        let mut result = Vec::new();
        let mut visited = FxHashSet::default();
        let mut temp_visited = FxHashSet::default();

        for node in &self.nodes {
            if !visited.contains(node) {
                self.visit(node, &mut visited, &mut temp_visited, &mut result)?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut FxHashSet<String>,
        temp_visited: &mut FxHashSet<String>,
        result: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if temp_visited.contains(node) {
            return Err(GraphError::CycleDetected(node.to_string()));
        }

        if visited.contains(node) {
            return Ok(());
        }

        temp_visited.insert(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            let mut deps: Vec<&String> = deps.iter().collect();
            deps.sort();
            for dep in deps {
                self.visit(dep, visited, temp_visited, result)?;
            }
        }

        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topological_sort() {
        let mut graph = DependencyGraph::new();

        graph.add_dependency("out", "n");
        graph.add_dependency("out", "src");
        graph.add_node("n");
        graph.add_node("src");

        let sorted = graph.topological_sort().unwrap();

        let n_pos = sorted.iter().position(|x| x == "n").unwrap();
        let src_pos = sorted.iter().position(|x| x == "src").unwrap();
        let out_pos = sorted.iter().position(|x| x == "out").unwrap();

        assert!(n_pos < out_pos);
        assert!(src_pos < out_pos);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = DependencyGraph::new();

        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph.add_dependency("c", "a");

        let result = graph.topological_sort();
        assert!(matches!(result, Err(GraphError::CycleDetected(_))));
    }
}

//! Workflow graph value types.
//!
//! A [`WorkflowGraph`] is the dependency graph of reconstruction tasks built
//! for one job: each node names the stage executable, its arguments, and its
//! resource request; each edge orders a child after the parent whose output
//! artifacts it consumes. Graphs are produced by [`builder`] and serialised
//! to JSON as the plan handed to the grid scheduler.

pub mod builder;

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Validation errors for graph construction and structure checks.
///
/// The builder returns these without mutating anything; a job whose request
/// fails validation is structurally broken and will not be retried.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("unknown topology variant: {0}")]
    UnknownTopology(String),

    #[error("invalid hemisphere token: {0} (expected lh or rh)")]
    InvalidHemisphere(String),

    #[error("invalid input combination: {0}")]
    InvalidInputCombination(String),

    #[error("no input artifacts supplied")]
    MissingInput,

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("edge references unknown node: {0}")]
    UnknownNode(String),

    #[error("graph contains a dependency cycle")]
    Cycle,

    #[error("graph has {0} terminal nodes, expected exactly one")]
    TerminalCount(usize),
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// The fixed set of graph shapes a job may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Initial stage, one whole-volume second stage, final stage.
    Serial,
    /// Initial stage fanning out to both hemispheres, fanning back in.
    Diamond,
    /// All stages in one task.
    Single,
    /// One task over a pre-structured subject directory with caller options.
    Custom,
}

impl Topology {
    pub fn as_str(self) -> &'static str {
        match self {
            Topology::Serial => "serial",
            Topology::Diamond => "diamond",
            Topology::Single => "single",
            Topology::Custom => "custom",
        }
    }
}

impl std::str::FromStr for Topology {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Topology::Serial),
            "diamond" => Ok(Topology::Diamond),
            "single" => Ok(Topology::Single),
            "custom" => Ok(Topology::Custom),
            other => Err(GraphError::UnknownTopology(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// CPU/memory request attached to a task node.
///
/// Absent on nodes built for tool versions that predate resource
/// negotiation; the grid then falls back to site defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cores: u32,
    pub memory_mb: u32,
}

/// One schedulable task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique within one graph.
    pub id: String,
    /// Stage executable, e.g. `autorecon1.sh`.
    pub executable: String,
    /// Positional arguments passed to the executable.
    pub args: Vec<String>,
    pub resources: Option<ResourceRequest>,
    /// Artifact names this task consumes.
    pub inputs: Vec<String>,
    /// Artifact names this task produces.
    pub outputs: Vec<String>,
    /// Command line the backend invokes when this task succeeds.
    pub on_task_done: Option<String>,
}

/// Dependency edge: `child` may not start until `parent`'s declared
/// outputs exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEdge {
    pub parent: String,
    pub child: String,
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// A complete task graph for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub variant: Topology,
    pub subject: String,
    pub nodes: Vec<TaskNode>,
    pub edges: Vec<TaskEdge>,
    /// Command line the backend invokes once when the whole graph succeeds.
    pub on_success: Option<String>,
    /// Command line the backend invokes once when the whole graph fails.
    pub on_failure: Option<String>,
}

impl WorkflowGraph {
    /// Number of schedulable tasks; the expected task total for a run.
    pub fn task_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Ids of the nodes `id` depends on (its parents).
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.child == id)
            .map(|e| e.parent.as_str())
            .collect()
    }

    /// The single node with no outgoing edge, if the graph is well formed.
    pub fn terminal_node(&self) -> Option<&TaskNode> {
        let parents: HashSet<&str> = self.edges.iter().map(|e| e.parent.as_str()).collect();
        let mut terminals = self.nodes.iter().filter(|n| !parents.contains(n.id.as_str()));
        let first = terminals.next();
        match terminals.next() {
            Some(_) => None,
            None => first,
        }
    }

    /// Structural validation: unique node ids, edges over known nodes,
    /// acyclic, and exactly one terminal node.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        for edge in &self.edges {
            for end in [&edge.parent, &edge.child] {
                if !ids.contains(end.as_str()) {
                    return Err(GraphError::UnknownNode(end.clone()));
                }
            }
        }

        // Kahn's algorithm: if topological removal cannot consume every
        // node, the remainder forms a cycle.
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(edge.child.as_str()).or_insert(0) += 1;
        }
        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = ready.pop_front() {
            visited += 1;
            for edge in self.edges.iter().filter(|e| e.parent == id) {
                if let Some(d) = in_degree.get_mut(edge.child.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(&edge.child);
                    }
                }
            }
        }
        if visited != self.nodes.len() {
            return Err(GraphError::Cycle);
        }

        let parents: HashSet<&str> = self.edges.iter().map(|e| e.parent.as_str()).collect();
        let terminals = self
            .nodes
            .iter()
            .filter(|n| !parents.contains(n.id.as_str()))
            .count();
        if terminals != 1 {
            return Err(GraphError::TerminalCount(terminals));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> TaskNode {
        TaskNode {
            id: id.to_string(),
            executable: format!("{id}.sh"),
            args: vec![],
            resources: None,
            inputs: vec![],
            outputs: vec![],
            on_task_done: None,
        }
    }

    fn edge(parent: &str, child: &str) -> TaskEdge {
        TaskEdge {
            parent: parent.to_string(),
            child: child.to_string(),
        }
    }

    fn graph(nodes: Vec<TaskNode>, edges: Vec<TaskEdge>) -> WorkflowGraph {
        WorkflowGraph {
            variant: Topology::Serial,
            subject: "sub".to_string(),
            nodes,
            edges,
            on_success: None,
            on_failure: None,
        }
    }

    #[test]
    fn chain_is_valid() {
        let g = graph(
            vec![node("a"), node("b"), node("c")],
            vec![edge("a", "b"), edge("b", "c")],
        );
        assert!(g.validate().is_ok());
        assert_eq!(g.terminal_node().unwrap().id, "c");
    }

    #[test]
    fn single_node_is_its_own_terminal() {
        let g = graph(vec![node("only")], vec![]);
        assert!(g.validate().is_ok());
        assert_eq!(g.terminal_node().unwrap().id, "only");
    }

    #[test]
    fn cycle_is_rejected() {
        let g = graph(
            vec![node("a"), node("b")],
            vec![edge("a", "b"), edge("b", "a")],
        );
        assert!(matches!(g.validate(), Err(GraphError::Cycle)));
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let g = graph(vec![node("a"), node("a")], vec![]);
        assert!(matches!(g.validate(), Err(GraphError::DuplicateNode(_))));
    }

    #[test]
    fn edge_to_unknown_node_is_rejected() {
        let g = graph(vec![node("a")], vec![edge("a", "ghost")]);
        assert!(matches!(g.validate(), Err(GraphError::UnknownNode(_))));
    }

    #[test]
    fn two_sinks_fail_terminal_check() {
        let g = graph(
            vec![node("a"), node("b"), node("c")],
            vec![edge("a", "b"), edge("a", "c")],
        );
        assert!(matches!(g.validate(), Err(GraphError::TerminalCount(2))));
    }

    #[test]
    fn dependencies_of_collects_parents() {
        let g = graph(
            vec![node("a"), node("b"), node("c")],
            vec![edge("a", "c"), edge("b", "c")],
        );
        let mut deps = g.dependencies_of("c");
        deps.sort();
        assert_eq!(deps, vec!["a", "b"]);
    }

    #[test]
    fn topology_round_trips_through_str() {
        for t in [
            Topology::Serial,
            Topology::Diamond,
            Topology::Single,
            Topology::Custom,
        ] {
            assert_eq!(t.as_str().parse::<Topology>().unwrap(), t);
        }
        assert!("pipeline".parse::<Topology>().is_err());
    }
}

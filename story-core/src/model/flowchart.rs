//! Flowchart graph of narrative beats.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum number of nodes: ids are single uppercase letters.
pub const MAX_NODES: usize = 26;

/// Horizontal position assigned to parsed nodes.
pub const STACK_X: f64 = 250.0;

/// Vertical distance between stacked parsed nodes.
pub const STACK_SPACING: f64 = 100.0;

/// A 2D position in abstract layout units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Position of the `index`-th node in first-seen order.
    pub fn stacked(index: usize) -> Self {
        Self::new(STACK_X, index as f64 * STACK_SPACING)
    }
}

/// A single narrative beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    pub label: String,
    pub position: Position,
}

/// How an edge is drawn by a front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    #[default]
    SmoothStep,
    Straight,
}

/// A causal link between two beats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub kind: EdgeKind,
}

impl FlowEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: edge_id(&source, &target),
            source,
            target,
            kind: EdgeKind::default(),
        }
    }
}

fn edge_id(source: &str, target: &str) -> String {
    format!("e{source}-{target}")
}

/// Directed graph of narrative beats.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Flowchart {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl Flowchart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// First node carrying `label` (case-insensitive, whitespace-trimmed).
    pub fn node_by_label(&self, label: &str) -> Option<&FlowNode> {
        let wanted = label.trim().to_lowercase();
        self.nodes
            .iter()
            .find(|n| n.label.trim().to_lowercase() == wanted)
    }

    /// Node labels in node order.
    pub fn labels(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.label.clone()).collect()
    }

    /// Add a node. An existing id keeps its first label; returns false then.
    pub fn add_node(&mut self, id: impl Into<String>, label: impl Into<String>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        let position = Position::stacked(self.nodes.len());
        self.nodes.push(FlowNode {
            id,
            label: label.into(),
            position,
        });
        true
    }

    /// Add a node under the first unused letter id.
    pub fn add_labeled_node(&mut self, label: impl Into<String>) -> Option<String> {
        let id = self.next_free_id()?;
        self.add_node(id.clone(), label);
        Some(id)
    }

    /// First letter `A..=Z` not yet used as a node id.
    pub fn next_free_id(&self) -> Option<String> {
        ('A'..='Z')
            .map(|c| c.to_string())
            .find(|id| !self.contains(id))
    }

    /// Add an edge between two existing nodes. Duplicates are ignored.
    pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
        if !self.contains(source) || !self.contains(target) {
            return false;
        }
        let id = edge_id(source, target);
        if self.edges.iter().any(|e| e.id == id) {
            return false;
        }
        self.edges.push(FlowEdge::new(source, target));
        true
    }

    pub fn remove_edge(&mut self, source: &str, target: &str) -> bool {
        let before = self.edges.len();
        self.edges
            .retain(|e| !(e.source == source && e.target == target));
        self.edges.len() != before
    }

    /// Rename a node's label.
    pub fn relabel(&mut self, id: &str, label: impl Into<String>) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.label = label.into();
                true
            }
            None => false,
        }
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return false;
        }
        self.edges.retain(|e| e.source != id && e.target != id);
        true
    }

    /// Ids of nodes with an edge into `id`.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| e.source.as_str())
            .collect()
    }

    /// Level of every node: 0 without dependencies, else 1 + max level of its
    /// dependencies. A dependency still being resolved (a cycle) counts as 0.
    pub fn levels(&self) -> HashMap<String, usize> {
        let mut levels = HashMap::new();
        let mut in_progress = Vec::new();
        for node in &self.nodes {
            self.resolve_level(&node.id, &mut levels, &mut in_progress);
        }
        levels
    }

    fn resolve_level(
        &self,
        id: &str,
        levels: &mut HashMap<String, usize>,
        in_progress: &mut Vec<String>,
    ) -> usize {
        if let Some(&level) = levels.get(id) {
            return level;
        }
        if in_progress.iter().any(|p| p == id) {
            return 0;
        }
        in_progress.push(id.to_string());

        let deps: Vec<String> = self
            .dependencies(id)
            .into_iter()
            .map(str::to_string)
            .collect();
        let level = deps
            .iter()
            .map(|dep| {
                if in_progress.iter().any(|p| p == dep) {
                    0
                } else {
                    self.resolve_level(dep, levels, in_progress) + 1
                }
            })
            .max()
            .unwrap_or(0);

        in_progress.pop();
        levels.insert(id.to_string(), level);
        level
    }

    /// Serialize as a `graph TD` mermaid diagram.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for node in &self.nodes {
            out.push_str(&format!("    {}[{}]\n", node.id, sanitize_label(&node.label)));
        }
        for edge in &self.edges {
            out.push_str(&format!("    {} --> {}\n", edge.source, edge.target));
        }
        out
    }
}

/// Brackets would terminate the node token early.
fn sanitize_label(label: &str) -> String {
    label.replace(['[', ']'], "").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Flowchart {
        let mut chart = Flowchart::new();
        chart.add_node("A", "Hero leaves home");
        chart.add_node("B", "Meets the mentor");
        chart.add_node("C", "Faces the dragon");
        chart.add_edge("A", "B");
        chart.add_edge("B", "C");
        chart
    }

    #[test]
    fn test_first_label_wins() {
        let mut chart = Flowchart::new();
        assert!(chart.add_node("A", "first"));
        assert!(!chart.add_node("A", "second"));
        assert_eq!(chart.node("A").unwrap().label, "first");
        assert_eq!(chart.nodes.len(), 1);
    }

    #[test]
    fn test_stacked_positions() {
        let chart = chain();
        assert_eq!(chart.node("A").unwrap().position, Position::new(STACK_X, 0.0));
        assert_eq!(chart.node("C").unwrap().position, Position::new(STACK_X, 200.0));
    }

    #[test]
    fn test_edges_require_known_nodes() {
        let mut chart = chain();
        assert!(!chart.add_edge("A", "Z"));
        assert!(!chart.add_edge("A", "B"));
        assert_eq!(chart.edges.len(), 2);
    }

    #[test]
    fn test_levels_linear_and_diamond() {
        let mut chart = chain();
        chart.add_node("D", "Side quest");
        chart.add_edge("A", "D");
        chart.add_edge("D", "C");

        let levels = chart.levels();
        assert_eq!(levels["A"], 0);
        assert_eq!(levels["B"], 1);
        assert_eq!(levels["D"], 1);
        assert_eq!(levels["C"], 2);
    }

    #[test]
    fn test_levels_terminate_on_cycle() {
        let mut chart = chain();
        chart.add_edge("C", "A");
        let levels = chart.levels();
        assert_eq!(levels.len(), 3);
        assert!(levels.values().all(|&l| l <= 3));
    }

    #[test]
    fn test_remove_node_drops_edges() {
        let mut chart = chain();
        assert!(chart.remove_node("B"));
        assert!(chart.edges.is_empty());
        assert!(!chart.remove_node("B"));
    }

    #[test]
    fn test_next_free_id_and_cap() {
        let mut chart = chain();
        assert_eq!(chart.add_labeled_node("Epilogue").as_deref(), Some("D"));

        let mut full = Flowchart::new();
        for c in 'A'..='Z' {
            full.add_node(c.to_string(), "x");
        }
        assert_eq!(full.nodes.len(), MAX_NODES);
        assert!(full.add_labeled_node("overflow").is_none());
    }

    #[test]
    fn test_mermaid_output() {
        let mut chart = chain();
        chart.relabel("A", "Hero [sic] leaves");
        let text = chart.to_mermaid();
        assert!(text.starts_with("graph TD\n"));
        assert!(text.contains("A[Hero sic leaves]"));
        assert!(text.contains("A --> B"));
    }

    #[test]
    fn test_node_by_label_case_insensitive() {
        let chart = chain();
        assert_eq!(chart.node_by_label(" meets the MENTOR ").unwrap().id, "B");
        assert!(chart.node_by_label("nothing").is_none());
    }
}

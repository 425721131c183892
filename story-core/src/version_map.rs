//! Version map: branch relationships along parent edges, and their layout.
//!
//! Relationships are fetched lazily, once per (parent, child) pair, and kept
//! in memory until an explicit reanalyze.

use crate::ai::{Relationship, RelationshipAnalyzer};
use crate::error::StoryError;
use crate::model::Position;
use crate::versions::{VersionId, VersionStore};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Horizontal distance between nodes sharing a level.
pub const NODE_SPACING: f64 = 180.0;

/// Vertical distance between levels.
pub const LEVEL_SPACING: f64 = 100.0;

/// Gap between neighbouring version columns.
pub const COLUMN_GAP: f64 = 120.0;

/// Cache key: (parent id, child id).
pub type PairKey = (VersionId, VersionId);

/// A version's column in the layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionColumn {
    pub version_id: VersionId,
    pub name: String,
    pub x: f64,
    pub width: f64,
}

/// A flowchart node placed in the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapNode {
    pub version_id: VersionId,
    pub node_id: String,
    pub label: String,
    pub level: usize,
    pub position: Position,
    /// Listed as shared in a relationship involving this version.
    pub shared: bool,
}

/// An edge inside one version's flowchart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapEdge {
    pub version_id: VersionId,
    pub source: String,
    pub target: String,
}

/// Dashed connector drawn at a branch point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchConnector {
    pub parent_id: VersionId,
    pub child_id: VersionId,
    /// Node id in the parent version.
    pub from_node: String,
    /// Node id in the child version.
    pub to_node: String,
    pub description: String,
}

/// Complete map layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MapLayout {
    pub columns: Vec<VersionColumn>,
    pub nodes: Vec<MapNode>,
    pub edges: Vec<MapEdge>,
    pub connectors: Vec<BranchConnector>,
}

impl MapLayout {
    pub fn node(&self, version_id: VersionId, node_id: &str) -> Option<&MapNode> {
        self.nodes
            .iter()
            .find(|n| n.version_id == version_id && n.node_id == node_id)
    }
}

/// Relationship cache keyed by version pair.
#[derive(Debug, Clone, Default)]
pub struct VersionMap {
    cache: HashMap<PairKey, Relationship>,
}

impl VersionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn get(&self, parent: VersionId, child: VersionId) -> Option<&Relationship> {
        self.cache.get(&(parent, child))
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Parent/child pairs without a cached relationship.
    pub fn pending_pairs(&self, store: &VersionStore) -> Vec<PairKey> {
        store
            .parent_edges()
            .into_iter()
            .filter(|key| !self.cache.contains_key(key))
            .collect()
    }

    /// Drop entries for pairs that are no longer parent edges.
    pub fn prune(&mut self, store: &VersionStore) {
        let live: HashSet<PairKey> = store.parent_edges().into_iter().collect();
        self.cache.retain(|key, _| live.contains(key));
    }

    /// Fetch every missing relationship, one request per pair, in order.
    ///
    /// Returns how many pairs were fetched. A failure stops the pass but keeps
    /// the relationships already fetched.
    pub async fn refresh(
        &mut self,
        store: &VersionStore,
        analyzer: &RelationshipAnalyzer,
    ) -> Result<usize, StoryError> {
        self.prune(store);

        let pending = self.pending_pairs(store);
        for &(parent_id, child_id) in &pending {
            let (Some(parent), Some(child)) = (store.get(parent_id), store.get(child_id)) else {
                continue;
            };

            tracing::debug!(parent_id = %parent_id, child_id = %child_id, "fetching relationship");
            let relationship = analyzer
                .analyze(&parent.flowchart, &parent.text, &child.flowchart, &child.text)
                .await
                .inspect_err(|e| tracing::warn!(error = %e, "relationship request failed"))?;
            self.cache.insert((parent_id, child_id), relationship);
        }
        Ok(pending.len())
    }

    /// Clear the cache and fetch every pair again.
    pub async fn reanalyze(
        &mut self,
        store: &VersionStore,
        analyzer: &RelationshipAnalyzer,
    ) -> Result<usize, StoryError> {
        self.clear();
        self.refresh(store, analyzer).await
    }

    /// Lay out every version's flowchart side by side.
    ///
    /// Each version gets a column, in store order. Inside a column nodes are
    /// stacked by level and spread left to right within a level.
    pub fn layout(&self, store: &VersionStore) -> MapLayout {
        let mut layout = MapLayout::default();
        let mut column_x = 0.0;

        for version in store.versions() {
            let chart = &version.flowchart;
            let levels = chart.levels();

            let shared: HashSet<String> = self
                .cache
                .iter()
                .filter(|((p, c), _)| *p == version.id || *c == version.id)
                .flat_map(|(_, rel)| rel.shared_nodes.iter().map(|l| l.trim().to_lowercase()))
                .collect();

            let mut slots: HashMap<usize, usize> = HashMap::new();
            for node in &chart.nodes {
                let level = levels.get(&node.id).copied().unwrap_or(0);
                let slot = slots.entry(level).or_insert(0);
                layout.nodes.push(MapNode {
                    version_id: version.id,
                    node_id: node.id.clone(),
                    label: node.label.clone(),
                    level,
                    position: Position::new(
                        column_x + *slot as f64 * NODE_SPACING,
                        level as f64 * LEVEL_SPACING,
                    ),
                    shared: shared.contains(&node.label.trim().to_lowercase()),
                });
                *slot += 1;
            }

            for edge in &chart.edges {
                layout.edges.push(MapEdge {
                    version_id: version.id,
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                });
            }

            let widest = slots.values().copied().max().unwrap_or(1).max(1);
            let width = widest as f64 * NODE_SPACING;
            layout.columns.push(VersionColumn {
                version_id: version.id,
                name: version.name.clone(),
                x: column_x,
                width,
            });
            column_x += width + COLUMN_GAP;
        }

        for (parent_id, child_id) in store.parent_edges() {
            let Some(branch) = self
                .get(parent_id, child_id)
                .and_then(|rel| rel.branch_point.as_ref())
            else {
                continue;
            };
            let (Some(parent), Some(child)) = (store.get(parent_id), store.get(child_id)) else {
                continue;
            };

            match (
                parent.flowchart.node_by_label(&branch.source),
                child.flowchart.node_by_label(&branch.target),
            ) {
                (Some(from), Some(to)) => layout.connectors.push(BranchConnector {
                    parent_id,
                    child_id,
                    from_node: from.id.clone(),
                    to_node: to.id.clone(),
                    description: branch.description.clone(),
                }),
                _ => tracing::debug!(
                    parent_id = %parent_id,
                    child_id = %child_id,
                    "branch point labels not found in flowcharts"
                ),
            }
        }

        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Analysis;
    use crate::model::Flowchart;
    use crate::testing::ScriptedGenerator;
    use std::sync::Arc;

    fn chart(labels: &[&str]) -> Analysis {
        let mut flowchart = Flowchart::new();
        let mut prev: Option<String> = None;
        for label in labels {
            let id = flowchart.add_labeled_node(*label).unwrap();
            if let Some(p) = prev {
                flowchart.add_edge(&p, &id);
            }
            prev = Some(id);
        }
        Analysis {
            flowchart,
            ..Default::default()
        }
    }

    fn store() -> (VersionStore, VersionId, VersionId) {
        let mut store = VersionStore::new("root", chart(&["Start", "Storm", "Wreck"]), "");
        let root = store.root().id;
        let child = store
            .append(root, "child", chart(&["Start", "Storm", "Rescue"]), "")
            .unwrap();
        (store, root, child)
    }

    const REPLY: &str = r#"{"sharedNodes": ["Start"], "branchPoint": {"source": "Storm", "target": "Rescue", "description": "a ship arrives"}}"#;

    #[tokio::test]
    async fn test_refresh_fetches_each_pair_once() {
        let (mut store, root, child) = store();
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()).repeat_last(REPLY));
        let analyzer = RelationshipAnalyzer::new(generator.clone());
        let mut map = VersionMap::new();

        assert_eq!(map.refresh(&store, &analyzer).await.unwrap(), 1);
        assert_eq!(map.refresh(&store, &analyzer).await.unwrap(), 0);
        assert_eq!(generator.call_count().await, 1);
        assert!(map.get(root, child).is_some());

        store.append(child, "grandchild", chart(&["Start"]), "").unwrap();
        assert_eq!(map.refresh(&store, &analyzer).await.unwrap(), 1);
        assert_eq!(generator.call_count().await, 2);

        assert_eq!(map.reanalyze(&store, &analyzer).await.unwrap(), 2);
        assert_eq!(generator.call_count().await, 4);
    }

    #[tokio::test]
    async fn test_refresh_prunes_deleted_pairs() {
        let (mut store, root, child) = store();
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()).repeat_last(REPLY));
        let analyzer = RelationshipAnalyzer::new(generator);
        let mut map = VersionMap::new();
        map.refresh(&store, &analyzer).await.unwrap();

        store.delete(child).unwrap();
        map.refresh(&store, &analyzer).await.unwrap();
        assert!(map.get(root, child).is_none());
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_earlier_results() {
        let (mut store, _, child) = store();
        store.append(child, "gc", chart(&["Start"]), "").unwrap();
        let generator = Arc::new(ScriptedGenerator::new(vec![REPLY]));
        let analyzer = RelationshipAnalyzer::new(generator);
        let mut map = VersionMap::new();

        assert!(map.refresh(&store, &analyzer).await.is_err());
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_layout_levels_columns_and_connector() {
        let (store, root, child) = store();
        let generator = Arc::new(ScriptedGenerator::new(vec![REPLY]));
        let analyzer = RelationshipAnalyzer::new(generator);
        let mut map = VersionMap::new();
        map.refresh(&store, &analyzer).await.unwrap();

        let layout = map.layout(&store);
        assert_eq!(layout.columns.len(), 2);
        assert_eq!(layout.nodes.len(), 6);
        assert_eq!(layout.edges.len(), 4);

        let wreck = layout.node(root, "C").unwrap();
        assert_eq!(wreck.level, 2);
        assert_eq!(wreck.position.y, 2.0 * LEVEL_SPACING);

        let child_start = layout.node(child, "A").unwrap();
        assert!(child_start.position.x > wreck.position.x);
        assert!(child_start.shared);
        assert!(!layout.node(child, "C").unwrap().shared);

        assert_eq!(
            layout.connectors,
            vec![BranchConnector {
                parent_id: root,
                child_id: child,
                from_node: "B".to_string(),
                to_node: "C".to_string(),
                description: "a ship arrives".to_string(),
            }]
        );
    }

    #[test]
    fn test_layout_spreads_same_level_nodes() {
        let mut flowchart = Flowchart::new();
        flowchart.add_node("A", "Start");
        flowchart.add_node("B", "Left");
        flowchart.add_node("C", "Right");
        flowchart.add_edge("A", "B");
        flowchart.add_edge("A", "C");
        let store = VersionStore::new(
            "t",
            Analysis {
                flowchart,
                ..Default::default()
            },
            "",
        );

        let layout = VersionMap::new().layout(&store);
        let id = store.root().id;
        let b = layout.node(id, "B").unwrap();
        let c = layout.node(id, "C").unwrap();
        assert_eq!(b.level, 1);
        assert_eq!(c.level, 1);
        assert_eq!(c.position.x - b.position.x, NODE_SPACING);
        assert_eq!(layout.columns[0].width, 2.0 * NODE_SPACING);
        assert!(layout.connectors.is_empty());
    }
}

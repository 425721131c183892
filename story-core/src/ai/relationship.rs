//! Branch-relationship inference between two story versions.
//!
//! Asks the model for the node labels two versions share and the single point
//! where they diverge. Replies that are not clean JSON go through one repair
//! pass; anything still unparseable becomes an empty relationship.

use super::generator::TextGenerator;
use super::prompts;
use crate::error::StoryError;
use crate::model::Flowchart;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

lazy_static! {
    static ref SINGLE_QUOTED_KEY: Regex = Regex::new(r"'([A-Za-z_][A-Za-z0-9_]*)'\s*:").unwrap();
    static ref SINGLE_QUOTED_VALUE: Regex =
        Regex::new(r#"([:\[,]\s*)'((?:[^'\\\n]|\\.)*)'"#).unwrap();
    static ref UNQUOTED_KEY: Regex =
        Regex::new(r#"([\{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).unwrap();
    static ref TRAILING_COMMA: Regex = Regex::new(r",\s*([\}\]])").unwrap();
    static ref PY_NONE: Regex = Regex::new(r"\b(?:None|undefined)\b").unwrap();
    static ref PY_TRUE: Regex = Regex::new(r"\bTrue\b").unwrap();
    static ref PY_FALSE: Regex = Regex::new(r"\bFalse\b").unwrap();
}

/// Where two versions diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPoint {
    /// Node label in the first (parent) version.
    pub source: String,
    /// Node label in the second (child) version.
    pub target: String,
    #[serde(default)]
    pub description: String,
}

/// Shared nodes and branch point of a version pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    #[serde(default, alias = "shared_nodes")]
    pub shared_nodes: Vec<String>,
    #[serde(default, alias = "branch_point")]
    pub branch_point: Option<BranchPoint>,
}

impl Relationship {
    pub fn is_empty(&self) -> bool {
        self.shared_nodes.is_empty() && self.branch_point.is_none()
    }
}

/// Asks the model how two versions relate.
#[derive(Clone)]
pub struct RelationshipAnalyzer {
    generator: Arc<dyn TextGenerator>,
}

impl RelationshipAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Compare version A (`chart_a`, `text_a`) with version B.
    ///
    /// Only node labels are sent; ids and positions are dropped.
    pub async fn analyze(
        &self,
        chart_a: &Flowchart,
        text_a: &str,
        chart_b: &Flowchart,
        text_b: &str,
    ) -> Result<Relationship, StoryError> {
        let prompt = prompts::relationship(&chart_a.labels(), text_a, &chart_b.labels(), text_b);
        let reply = self.generator.generate(&prompt).await?;
        Ok(parse_relationship(&reply))
    }
}

/// Parse a relationship reply, repairing loose JSON once before giving up.
pub fn parse_relationship(reply: &str) -> Relationship {
    let json_str = extract_json(reply);

    let parsed = serde_json::from_str::<Relationship>(json_str).or_else(|e| {
        tracing::debug!(error = %e, "relationship reply is not clean JSON, repairing");
        serde_json::from_str::<Relationship>(&repair_json(json_str))
    });

    match parsed {
        Ok(relationship) => normalize(relationship),
        Err(e) => {
            tracing::warn!(error = %e, "relationship reply unparseable, using empty result");
            Relationship::default()
        }
    }
}

fn normalize(mut relationship: Relationship) -> Relationship {
    relationship.shared_nodes = relationship
        .shared_nodes
        .into_iter()
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .collect();

    if let Some(bp) = &relationship.branch_point {
        if bp.source.trim().is_empty() && bp.target.trim().is_empty() {
            relationship.branch_point = None;
        }
    }
    relationship
}

/// Extract JSON from a response that might have markdown code blocks or chatter.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Outermost braces, to drop prose around the object
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }

    text
}

/// Coerce loosely formatted key/value text into JSON.
fn repair_json(text: &str) -> String {
    let text = SINGLE_QUOTED_KEY.replace_all(text, "\"$1\":");
    let text = SINGLE_QUOTED_VALUE.replace_all(&text, "$1\"$2\"");
    let text = UNQUOTED_KEY.replace_all(&text, "$1\"$2\":");
    let text = TRAILING_COMMA.replace_all(&text, "$1");
    let text = PY_NONE.replace_all(&text, "null");
    let text = PY_TRUE.replace_all(&text, "true");
    let text = PY_FALSE.replace_all(&text, "false");
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[test]
    fn test_parse_clean_json() {
        let reply = r#"{"sharedNodes": ["Start", "Storm"], "branchPoint": {"source": "Storm", "target": "Rescue", "description": "She is saved"}}"#;
        let rel = parse_relationship(reply);
        assert_eq!(rel.shared_nodes, vec!["Start", "Storm"]);
        let bp = rel.branch_point.unwrap();
        assert_eq!(bp.source, "Storm");
        assert_eq!(bp.target, "Rescue");
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let reply = "Here you go:\n```json\n{\"sharedNodes\": [\"A\"], \"branchPoint\": null}\n```\nHope that helps.";
        let rel = parse_relationship(reply);
        assert_eq!(rel.shared_nodes, vec!["A"]);
        assert!(rel.branch_point.is_none());
    }

    #[test]
    fn test_parse_snake_case_keys() {
        let reply = r#"{"shared_nodes": ["A"], "branch_point": {"source": "A", "target": "B"}}"#;
        let rel = parse_relationship(reply);
        assert_eq!(rel.shared_nodes, vec!["A"]);
        assert_eq!(rel.branch_point.unwrap().description, "");
    }

    #[test]
    fn test_repair_loose_key_values() {
        let reply = "Result: {sharedNodes: ['Start', 'Storm',], branchPoint: {source: 'Storm', target: 'Calm', description: 'sea calms',},}";
        let rel = parse_relationship(reply);
        assert_eq!(rel.shared_nodes, vec!["Start", "Storm"]);
        assert_eq!(rel.branch_point.unwrap().target, "Calm");
    }

    #[test]
    fn test_repair_python_none() {
        let reply = "{'sharedNodes': ['Start'], 'branchPoint': None}";
        let rel = parse_relationship(reply);
        assert_eq!(rel.shared_nodes, vec!["Start"]);
        assert!(rel.branch_point.is_none());
    }

    #[test]
    fn test_garbage_falls_back_to_empty() {
        let rel = parse_relationship("The versions are quite different, really.");
        assert!(rel.is_empty());
    }

    #[test]
    fn test_blank_branch_point_dropped() {
        let reply = r#"{"sharedNodes": [" A ", ""], "branchPoint": {"source": "", "target": " "}}"#;
        let rel = parse_relationship(reply);
        assert_eq!(rel.shared_nodes, vec!["A"]);
        assert!(rel.branch_point.is_none());
    }

    #[tokio::test]
    async fn test_analyze_sends_labels_only() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"sharedNodes": ["Start"], "branchPoint": null}"#,
        ]));
        let analyzer = RelationshipAnalyzer::new(generator.clone());
        let mut a = Flowchart::new();
        a.add_node("A", "Start");
        let mut b = Flowchart::new();
        b.add_node("A", "Start");
        b.add_node("B", "Detour");

        let rel = analyzer.analyze(&a, "text a", &b, "text b").await.unwrap();
        assert_eq!(rel.shared_nodes, vec!["Start"]);
        let prompt = &generator.prompts().await[0];
        assert!(prompt.contains(r#"["Start","Detour"]"#));
        assert!(!prompt.contains("250"));
    }
}

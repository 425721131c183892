//! Story analysis: text in, flowchart/characters/plot out.

use super::extract::{parse_analysis, Analysis};
use super::generator::TextGenerator;
use super::prompts;
use crate::error::StoryError;
use std::sync::Arc;

/// Sends story text to the model and parses its structured reply.
#[derive(Clone)]
pub struct Analyzer {
    generator: Arc<dyn TextGenerator>,
}

impl Analyzer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Analyze `text` with a single request.
    ///
    /// Network failures propagate. Each section degrades to empty on its own;
    /// a reply with no recognizable section at all is a parse error.
    pub async fn analyze(&self, text: &str) -> Result<Analysis, StoryError> {
        if text.trim().is_empty() {
            return Err(StoryError::TextTooShort { len: 0, min: 1 });
        }

        let reply = self.generator.generate(&prompts::analysis(text)).await?;
        let analysis = parse_analysis(&reply);

        if analysis.is_empty() {
            tracing::warn!(reply_len = reply.len(), "analysis reply had no recognizable sections");
            return Err(StoryError::Parse(
                "reply contained no flowchart, characters or plot".to_string(),
            ));
        }

        tracing::debug!(
            nodes = analysis.flowchart.nodes.len(),
            edges = analysis.flowchart.edges.len(),
            characters = analysis.characters.len(),
            plot = analysis.plot.len(),
            "analysis parsed"
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[tokio::test]
    async fn test_analyze_parses_reply() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "[Flowchart]\n```mermaid\nA[Start] --> B[End]\n```\n[Characters]\n- **Ann**: Lead\n[Plot]\n- It begins\n",
        ]));
        let analyzer = Analyzer::new(generator.clone());

        let analysis = analyzer.analyze("A story about Ann.").await.unwrap();
        assert_eq!(analysis.flowchart.nodes.len(), 2);
        assert_eq!(analysis.characters[0].name, "Ann");
        assert_eq!(analysis.plot, vec!["It begins"]);
        assert_eq!(generator.call_count().await, 1);
        assert!(generator.prompts().await[0].contains("A story about Ann."));
    }

    #[tokio::test]
    async fn test_analyze_rejects_unstructured_reply() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["I cannot help with that."]));
        let analyzer = Analyzer::new(generator);
        let result = analyzer.analyze("Some story text").await;
        assert!(matches!(result, Err(StoryError::Parse(_))));
    }

    #[tokio::test]
    async fn test_analyze_propagates_network_error() {
        let generator = Arc::new(ScriptedGenerator::failing());
        let analyzer = Analyzer::new(generator);
        let result = analyzer.analyze("Some story text").await;
        assert!(matches!(result, Err(StoryError::Api(_))));
    }

    #[tokio::test]
    async fn test_empty_text_never_calls_model() {
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let analyzer = Analyzer::new(generator.clone());
        assert!(analyzer.analyze("   ").await.is_err());
        assert_eq!(generator.call_count().await, 0);
    }
}

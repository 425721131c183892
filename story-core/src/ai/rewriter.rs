//! Story rewrites: continuation, whole-text, character-driven, flowchart-driven.

use super::extract::clean_generated_text;
use super::generator::TextGenerator;
use super::prompts;
use crate::error::StoryError;
use crate::model::{Character, CharacterDiff, Flowchart};
use std::sync::Arc;

/// Text around a selection, as sent for a partial continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage<'a> {
    pub preceding: &'a str,
    pub selected: &'a str,
    pub following: &'a str,
}

/// Sends rewrite instructions and returns cleaned story text.
#[derive(Clone)]
pub struct Rewriter {
    generator: Arc<dyn TextGenerator>,
}

impl Rewriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generate replacement text from the selection to the end of the story.
    pub async fn continue_from(&self, passage: &Passage<'_>) -> Result<String, StoryError> {
        let prompt = prompts::continuation(passage.preceding, passage.selected, passage.following);
        self.run(&prompt, None).await
    }

    /// Regenerate the whole text following `instruction`.
    pub async fn rewrite_all(&self, text: &str, instruction: &str) -> Result<String, StoryError> {
        let prompt = prompts::rewrite_all(text, instruction);
        self.run(&prompt, Some(instruction)).await
    }

    /// Reconcile the story with an edited character list.
    pub async fn rewrite_for_characters(
        &self,
        text: &str,
        before: &[Character],
        after: &[Character],
    ) -> Result<String, StoryError> {
        let diff = CharacterDiff::compute(before, after);
        tracing::debug!(
            added = diff.added.len(),
            modified = diff.changed().count(),
            deleted = diff.deleted.len(),
            "character-driven rewrite"
        );
        let prompt = prompts::rewrite_characters(text, &diff, after);
        self.run(&prompt, None).await
    }

    /// Write a story following the causal order of `flowchart`.
    pub async fn rewrite_for_flowchart(
        &self,
        flowchart: &Flowchart,
        previous_text: Option<&str>,
    ) -> Result<String, StoryError> {
        let prompt = prompts::rewrite_flowchart(&flowchart.to_mermaid(), previous_text);
        self.run(&prompt, None).await
    }

    async fn run(&self, prompt: &str, instruction: Option<&str>) -> Result<String, StoryError> {
        let reply = self.generator.generate(prompt).await?;
        let text = clean_generated_text(&reply, instruction);
        if text.is_empty() {
            tracing::warn!("rewrite reply was empty after cleanup");
            return Err(StoryError::Parse("rewrite produced no text".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[tokio::test]
    async fn test_continuation_strips_boilerplate() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "Continuation: The bridge held.",
        ]));
        let rewriter = Rewriter::new(generator.clone());
        let passage = Passage {
            preceding: "They reached the bridge.",
            selected: "It cracked.",
            following: "They fell.",
        };

        let text = rewriter.continue_from(&passage).await.unwrap();
        assert_eq!(text, "The bridge held.");
        let prompt = &generator.prompts().await[0];
        assert!(prompt.contains("They reached the bridge."));
        assert!(prompt.contains("It cracked."));
    }

    #[tokio::test]
    async fn test_rewrite_all_drops_echoed_instruction() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "Instruction: set it at night\nThe moon rose over the bridge.",
        ]));
        let rewriter = Rewriter::new(generator);
        let text = rewriter
            .rewrite_all("The sun rose over the bridge.", "set it at night")
            .await
            .unwrap();
        assert_eq!(text, "The moon rose over the bridge.");
    }

    #[tokio::test]
    async fn test_character_rewrite_prompt_lists_changes() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["New story."]));
        let rewriter = Rewriter::new(generator.clone());
        let before = vec![Character::new("char-0", "Ann", "A pilot")];
        let after = vec![
            Character::new("char-0", "Ann", "A retired pilot"),
            Character::new("char-1", "Ben", "Her mechanic"),
        ];

        rewriter
            .rewrite_for_characters("Ann flies.", &before, &after)
            .await
            .unwrap();
        let prompt = &generator.prompts().await[0];
        assert!(prompt.contains("Added: Ben"));
        assert!(prompt.contains("Modified: Ann"));
    }

    #[tokio::test]
    async fn test_flowchart_rewrite_serializes_graph() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["Output:\nA new tale."]));
        let rewriter = Rewriter::new(generator.clone());
        let mut chart = Flowchart::new();
        chart.add_node("A", "Storm");
        chart.add_node("B", "Shipwreck");
        chart.add_edge("A", "B");

        let text = rewriter
            .rewrite_for_flowchart(&chart, Some("An old tale."))
            .await
            .unwrap();
        assert_eq!(text, "A new tale.");
        let prompt = &generator.prompts().await[0];
        assert!(prompt.contains("A --> B"));
        assert!(prompt.contains("An old tale."));
    }

    #[tokio::test]
    async fn test_empty_reply_is_parse_error() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["Output:   "]));
        let rewriter = Rewriter::new(generator);
        let result = rewriter.rewrite_all("x", "y").await;
        assert!(matches!(result, Err(StoryError::Parse(_))));
    }
}

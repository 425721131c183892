//! Testing utilities.
//!
//! This module provides tools for tests that must not hit the network:
//! - `ScriptedGenerator` replies with canned text and records every prompt
//! - Reply builders in the analyzer's template format

use crate::ai::{render_template, Analysis, TextGenerator};
use crate::model::{Character, Flowchart};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// A scripted reply: text, or a simulated network failure.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    NetworkError(String),
}

/// A generator that returns scripted replies in order.
///
/// Once the script runs out every call fails with a network error, unless
/// `repeat_last` is set.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
    fallback: Option<String>,
}

impl ScriptedGenerator {
    /// Create a generator with scripted text replies.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| ScriptedReply::Text(r.into()))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
            fallback: None,
        }
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Reply with `text` whenever the script is exhausted.
    pub fn repeat_last(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Add a reply to the end of the script.
    pub async fn push(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(ScriptedReply::Text(text.into()));
    }

    /// Add a simulated network failure to the end of the script.
    pub async fn push_error(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(ScriptedReply::NetworkError(message.into()));
    }

    /// Every prompt received so far.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, gemini::Error> {
        self.prompts.lock().await.push(prompt.to_string());

        match self.replies.lock().await.pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::NetworkError(message)) => Err(gemini::Error::Network(message)),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(gemini::Error::Network("no scripted reply left".to_string())),
            },
        }
    }
}

/// Build an analysis reply for a linear chain of beats.
///
/// Beat `i` becomes node `A + i`; characters get `- **Name**: Description`.
pub fn analysis_reply(beats: &[&str], characters: &[(&str, &str)]) -> String {
    let mut flowchart = Flowchart::new();
    let mut previous: Option<String> = None;
    for beat in beats {
        if let Some(id) = flowchart.add_labeled_node(*beat) {
            if let Some(prev) = &previous {
                flowchart.add_edge(prev, &id);
            }
            previous = Some(id);
        }
    }

    let analysis = Analysis {
        flowchart,
        characters: characters
            .iter()
            .enumerate()
            .map(|(i, (name, desc))| Character::new(Character::synthetic_id(i), *name, *desc))
            .collect(),
        plot: beats.iter().map(|b| b.to_string()).collect(),
    };
    render_template(&analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::parse_analysis;

    #[tokio::test]
    async fn test_scripted_order_and_exhaustion() {
        let generator = ScriptedGenerator::new(vec!["one", "two"]);
        assert_eq!(generator.generate("p1").await.unwrap(), "one");
        generator.push_error("offline").await;
        assert_eq!(generator.generate("p2").await.unwrap(), "two");
        assert!(generator.generate("p3").await.is_err());
        assert!(generator.generate("p4").await.is_err());
        assert_eq!(generator.call_count().await, 4);
    }

    #[tokio::test]
    async fn test_repeat_last() {
        let generator = ScriptedGenerator::new(Vec::<String>::new()).repeat_last("again");
        assert_eq!(generator.generate("a").await.unwrap(), "again");
        assert_eq!(generator.generate("b").await.unwrap(), "again");
    }

    #[test]
    fn test_analysis_reply_parses() {
        let reply = analysis_reply(&["Start", "Middle", "End"], &[("Ann", "Lead")]);
        let analysis = parse_analysis(&reply);
        assert_eq!(analysis.flowchart.nodes.len(), 3);
        assert_eq!(analysis.flowchart.edges.len(), 2);
        assert_eq!(analysis.characters[0].name, "Ann");
        assert_eq!(analysis.plot, vec!["Start", "Middle", "End"]);
    }
}

//! Prompt templates sent to the generative-text service.

use crate::model::{Character, CharacterDiff};

/// Section markers the analyzer asks for and the extractors look for.
pub const FLOWCHART_MARKER: &str = "[Flowchart]";
pub const CHARACTERS_MARKER: &str = "[Characters]";
pub const PLOT_MARKER: &str = "[Plot]";

/// Marker preceding the generated text in rewrite replies.
pub const OUTPUT_MARKER: &str = "Output:";

pub fn analysis(text: &str) -> String {
    format!(
        r#"Read the following story and summarize its structure.

## Story
{text}

## Instructions
Reply with exactly three sections, in this order, and nothing else.

{FLOWCHART_MARKER}
A mermaid flowchart of the main events in causal order. Use single uppercase
letters as node ids and keep labels short:
```mermaid
graph TD
    A[First event] --> B[Second event]
    B --> C[Third event]
```

{CHARACTERS_MARKER}
One line per character:
- **Name**: One-sentence description

{PLOT_MARKER}
One line per plot beat, in order:
- Beat
"#
    )
}

pub fn continuation(preceding: &str, selected: &str, following: &str) -> String {
    format!(
        r#"You are continuing a story. Rewrite it from the marked passage to the end.
Keep the voice, tone, tense and point of view of the preceding text.

## Preceding text
{preceding}

## Passage to rewrite from
{selected}

## Original text after the passage (for reference only)
{following}

## Instructions
Write new text that replaces the passage and everything after it.
Reply with the new text only, after the line "{OUTPUT_MARKER}".
"#
    )
}

pub fn rewrite_all(text: &str, instruction: &str) -> String {
    format!(
        r#"Rewrite the following story according to the instruction.

Instruction: {instruction}

## Story
{text}

## Instructions
Return the complete rewritten story. Reply with the story only, after the line
"{OUTPUT_MARKER}".
"#
    )
}

pub fn rewrite_characters(text: &str, diff: &CharacterDiff, characters: &[Character]) -> String {
    let changes = diff.describe();
    let cast = characters
        .iter()
        .map(|c| format!("- **{}**: {}", c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"The character list of a story has been edited. Rewrite the story so it is
consistent with the new characters.

## Character changes
{changes}

## New character list
{cast}

## Story
{text}

## Instructions
Added characters must appear, deleted characters must disappear, and modified
characters must match their new names, descriptions and relationships. Keep
everything else as close to the original as possible. Reply with the story only,
after the line "{OUTPUT_MARKER}".
"#
    )
}

pub fn rewrite_flowchart(diagram: &str, previous_text: Option<&str>) -> String {
    let style = match previous_text {
        Some(prev) if !prev.trim().is_empty() => format!(
            "\n## Previous story (match its style, reuse what still fits)\n{prev}\n"
        ),
        _ => String::new(),
    };

    format!(
        r#"Write a story whose events follow this flowchart. Each arrow means the
source event causes or precedes the target event.

## Flowchart
```mermaid
{diagram}```
{style}
## Instructions
Cover every node in an order consistent with the arrows. Reply with the story
only, after the line "{OUTPUT_MARKER}".
"#
    )
}

pub fn relationship(
    labels_a: &[String],
    text_a: &str,
    labels_b: &[String],
    text_b: &str,
) -> String {
    let nodes_a = serde_json::to_string(labels_a).unwrap_or_else(|_| "[]".to_string());
    let nodes_b = serde_json::to_string(labels_b).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"Two versions of a story share a beginning and then diverge.

## Version A flowchart nodes
{nodes_a}

## Version A text
{text_a}

## Version B flowchart nodes
{nodes_b}

## Version B text
{text_b}

## Instructions
Find where the versions diverge. Text before the branch point is the same in
both versions. List the node labels the versions share before the branch point;
nodes at or after the branch are not shared. The branch point connects the last
shared node of version A to the first divergent node of version B.

Respond with ONLY a JSON object (no markdown, no explanation outside the JSON):
{{
  "sharedNodes": ["label", "label"],
  "branchPoint": {{"source": "label in A", "target": "label in B", "description": "what changed"}}
}}

Use "branchPoint": null if the versions do not diverge."#
    )
}

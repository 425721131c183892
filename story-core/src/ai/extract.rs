//! Extraction of structure from free-form model replies.
//!
//! Every extractor is lossy: lines that do not match the expected shape are
//! skipped (logged at debug level) and a missing section yields an empty list.

use super::prompts::{CHARACTERS_MARKER, FLOWCHART_MARKER, OUTPUT_MARKER, PLOT_MARKER};
use crate::model::{Character, Flowchart};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap();
    static ref NODE_TOKEN: Regex = Regex::new(r"\b([A-Z])\[([^\]\n]+)\]").unwrap();
    static ref ARROW: Regex = Regex::new(r"-\.->|-->|==>|---").unwrap();
    static ref NODE_ID: Regex = Regex::new(r"\b([A-Z])\b").unwrap();
    static ref CHARACTER_LINE: Regex =
        Regex::new(r"^\s*[-*]\s*\*\*(.+?)\*\*\s*[:：]\s*(.+?)\s*$").unwrap();
    static ref BULLET_LINE: Regex = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").unwrap();
    static ref MARKER_LINE: Regex = Regex::new(r"^[#*\s]*\[[^\]\n]+\][*\s]*$").unwrap();
    static ref OUTPUT_LINE: Regex = Regex::new(r"(?mi)^[ \t]*output[ \t]*:[ \t]*$").unwrap();
    static ref BOILERPLATE_PREFIX: Regex = Regex::new(
        r"(?i)\A\s*(?:output|continuation|rewritten (?:text|story)|new text|story|here(?:'s| is)[^\n]*?)[ \t]*[:：][ \t]*(?:\n|\z)"
    )
    .unwrap();
}

/// Structure derived from a story.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub flowchart: Flowchart,
    pub characters: Vec<Character>,
    pub plot: Vec<String>,
}

impl Analysis {
    pub fn is_empty(&self) -> bool {
        self.flowchart.is_empty() && self.characters.is_empty() && self.plot.is_empty()
    }
}

/// Run all three extractors over an analysis reply.
pub fn parse_analysis(reply: &str) -> Analysis {
    Analysis {
        flowchart: extract_flowchart(reply),
        characters: extract_characters(reply),
        plot: extract_plot(reply),
    }
}

/// Parse the fenced diagram block into a flowchart.
///
/// Nodes come from `X[label]` tokens in first-seen order (first label wins).
/// Each arrow links the first node id on either side of it; an arrow whose
/// sides lack an id or name an undeclared node is skipped.
pub fn extract_flowchart(reply: &str) -> Flowchart {
    let mut chart = Flowchart::new();

    let search_from = section_start(reply, FLOWCHART_MARKER).unwrap_or(0);
    let Some(block) = FENCED_BLOCK
        .captures(&reply[search_from..])
        .or_else(|| FENCED_BLOCK.captures(reply))
        .and_then(|c| c.get(1))
    else {
        tracing::debug!("no fenced diagram block in reply");
        return chart;
    };
    let block = block.as_str();

    for line in block.lines() {
        for cap in NODE_TOKEN.captures_iter(line) {
            let label = cap[2].trim();
            if !label.is_empty() {
                chart.add_node(&cap[1], label);
            }
        }
    }

    for line in block.lines() {
        let arrows: Vec<_> = ARROW.find_iter(line).collect();
        for (i, arrow) in arrows.iter().enumerate() {
            let left_start = if i == 0 { 0 } else { arrows[i - 1].end() };
            let right_end = arrows.get(i + 1).map_or(line.len(), |next| next.start());
            let left = &line[left_start..arrow.start()];
            let right = &line[arrow.end()..right_end];

            let source = NODE_ID.captures(left).map(|c| c[1].to_string());
            let target = NODE_ID.captures(right).map(|c| c[1].to_string());
            match (source, target) {
                (Some(s), Some(t)) => {
                    if !chart.contains(&s) || !chart.contains(&t) {
                        tracing::debug!(line, "edge references an undeclared node, skipped");
                        continue;
                    }
                    chart.add_edge(&s, &t);
                }
                _ => tracing::debug!(line, "malformed edge line, skipped"),
            }
        }
    }

    chart
}

/// Parse `- **Name**: Description` lines into characters `char-0`, `char-1`, ...
pub fn extract_characters(reply: &str) -> Vec<Character> {
    let body = section(reply, CHARACTERS_MARKER).unwrap_or(reply);

    body.lines()
        .filter_map(|line| CHARACTER_LINE.captures(line))
        .enumerate()
        .map(|(i, cap)| Character::new(Character::synthetic_id(i), cap[1].trim(), cap[2].trim()))
        .collect()
}

/// Parse bullet lines of the plot section, in order.
pub fn extract_plot(reply: &str) -> Vec<String> {
    let Some(body) = section(reply, PLOT_MARKER) else {
        tracing::debug!("no plot section in reply");
        return Vec::new();
    };

    body.lines()
        .filter_map(|line| BULLET_LINE.captures(line))
        .map(|cap| cap[1].trim().to_string())
        .filter(|beat| !beat.is_empty())
        .collect()
}

/// Clean a rewrite reply down to the story text.
///
/// Drops a leading `Output:` marker or everything up to an `Output:` line of
/// its own, a surrounding code fence, a first line echoing the instruction, and
/// a first line that is only a boilerplate label ending in a colon.
pub fn clean_generated_text(reply: &str, instruction: Option<&str>) -> String {
    let mut text = reply.trim();

    if let Some(rest) = text.strip_prefix(OUTPUT_MARKER) {
        text = rest;
    } else if let Some(m) = OUTPUT_LINE.find(text) {
        text = &text[m.end()..];
    }
    text = text.trim();

    if let Some(cap) = FENCED_BLOCK.captures(text) {
        let whole = cap.get(0).map_or("", |m| m.as_str());
        if whole.len() == text.len() {
            text = cap.get(1).map_or(text, |m| m.as_str()).trim();
        }
    }

    if let Some(instruction) = instruction.map(str::trim).filter(|i| !i.is_empty()) {
        let first = text.lines().next().unwrap_or("");
        let echoed = first.trim().trim_end_matches(['.', ':']).trim_end();
        if echoed.eq_ignore_ascii_case(instruction) || first.trim_start().starts_with("Instruction:")
        {
            text = text[first.len()..].trim_start();
        }
    }

    BOILERPLATE_PREFIX.replace(text, "").trim().to_string()
}

/// Render an analysis in the reply template the analyzer asks for.
pub fn render_template(analysis: &Analysis) -> String {
    let mut out = format!("{FLOWCHART_MARKER}\n```mermaid\n");
    out.push_str(&analysis.flowchart.to_mermaid());
    out.push_str("```\n\n");

    out.push_str(CHARACTERS_MARKER);
    out.push('\n');
    for c in &analysis.characters {
        out.push_str(&format!("- **{}**: {}\n", c.name, c.description));
    }

    out.push('\n');
    out.push_str(PLOT_MARKER);
    out.push('\n');
    for beat in &analysis.plot {
        out.push_str(&format!("- {beat}\n"));
    }
    out
}

/// Byte offset just past the marker line, if present.
fn section_start(text: &str, marker: &str) -> Option<usize> {
    let wanted = marker.to_lowercase();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_matches(|c: char| c.is_whitespace() || c == '#' || c == '*');
        offset += line.len();
        if trimmed.to_lowercase() == wanted {
            return Some(offset);
        }
    }
    None
}

/// Lines after `marker` up to the next bracketed marker line or end of text.
fn section<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = section_start(text, marker)?;
    let rest = &text[start..];
    let mut end = 0;
    for line in rest.split_inclusive('\n') {
        if MARKER_LINE.is_match(line.trim_end()) {
            break;
        }
        end += line.len();
    }
    Some(&rest[..end])
}

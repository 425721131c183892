//! Generative-text clients for story analysis and rewriting.
//!
//! Each client wraps a shared [`TextGenerator`] and performs exactly one
//! request per operation. None of them retry.

mod analyzer;
pub mod extract;
mod generator;
pub mod prompts;
mod relationship;
mod rewriter;

pub use analyzer::Analyzer;
pub use extract::{parse_analysis, render_template, Analysis};
pub use generator::{GeminiGenerator, TextGenerator};
pub use relationship::{parse_relationship, BranchPoint, Relationship, RelationshipAnalyzer};
pub use rewriter::{Passage, Rewriter};

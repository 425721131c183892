//! Story editor engine with AI-assisted analysis and rewriting.
//!
//! This crate provides:
//! - Story analysis into a causal flowchart, a character list and plot points
//! - Rewrites: continuation, instruction, character-driven, flowchart-driven
//! - A version tree of story snapshots with a relationship map between them
//! - Per-version speech synthesis state
//!
//! # Quick Start
//!
//! ```ignore
//! use story_core::{EditorConfig, StorySession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EditorConfig::from_env()?;
//!     let mut session = StorySession::from_config(config)?;
//!
//!     session
//!         .set_text("Mara found the map in her grandmother's attic and left town at dawn.")
//!         .await?;
//!     session.rewrite_all("Make it a ghost story").await?;
//!
//!     for version in session.state().store()?.versions() {
//!         println!("{}: {}", version.name, version.description);
//!     }
//!     Ok(())
//! }
//! ```

pub mod ai;
pub mod audio;
pub mod config;
pub mod error;
pub mod model;
pub mod session;
pub mod testing;
pub mod version_map;
pub mod versions;

// Primary public API
pub use ai::{Analysis, Relationship, TextGenerator};
pub use audio::{AudioLibrary, PlaybackStatus};
pub use config::{ConfigError, EditorConfig};
pub use error::{StoryError, VersionError};
pub use model::{Character, CharacterDiff, Flowchart};
pub use session::{EditorState, RequestTicket, StoryEngine, StorySession};
pub use testing::ScriptedGenerator;
pub use version_map::{MapLayout, VersionMap};
pub use versions::{StoryVersion, VersionId, VersionStore};

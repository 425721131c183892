//! Headless mode for the story editor.
//!
//! A simple line-oriented protocol, suitable for scripting and automated
//! testing:
//! - Lines starting with `#` are commands (see `#help`)
//! - All other lines are appended to the story text
//! - Output lines are tagged (`[VERSION]`, `[ERROR]`, ...) for easy parsing

use anyhow::{anyhow, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use story_core::model::{Character, Flowchart};
use story_core::{PlaybackStatus, StorySession, StoryVersion, VersionId};

const HELP: &[(&str, &str)] = &[
    ("#open <path>", "Replace the text with a file's contents"),
    ("#text", "Show the current text"),
    ("#analyze", "Analyze the text again"),
    ("#select <snippet>", "Select the first occurrence of a snippet"),
    ("#continue", "Rewrite from the selection to the end"),
    ("#rewrite <instruction>", "Rewrite the whole story"),
    ("#flow", "Show the flowchart (with pending edits)"),
    ("#characters", "List characters (with pending edits)"),
    ("#plot", "List plot points"),
    ("#character <name>: <desc>", "Edit or add a character and rewrite"),
    ("#relabel <id> <label>", "Relabel a flowchart node"),
    ("#link <a> <b>", "Add a flowchart edge"),
    ("#unlink-node <id>", "Remove a node and its edges"),
    ("#reflow", "Rewrite the story from the edited flowchart"),
    ("#versions", "List versions"),
    ("#switch <n>", "Make version n active"),
    ("#rename <n> <name>", "Rename version n"),
    ("#delete <n>", "Delete version n"),
    ("#compare <n|none>", "Select a version to compare against"),
    ("#map", "Fetch relationships and show the version map"),
    ("#reanalyze", "Fetch every relationship again"),
    ("#speakers", "List speech voices"),
    ("#speak", "Synthesize the active version"),
    ("#play", "Play or resume the active version's audio"),
    ("#pause", "Pause playback"),
    ("#save-audio <path>", "Write the active version's audio to a file"),
    ("#help", "Show this help"),
    ("#quit", "Exit"),
];

/// Pending flowchart and character edits on the active version.
///
/// Reset whenever the active version changes.
#[derive(Default)]
struct Drafts {
    version: Option<VersionId>,
    flowchart: Option<Flowchart>,
    characters: Option<Vec<Character>>,
}

struct Editor {
    session: StorySession,
    drafts: Drafts,
}

impl Editor {
    fn sync_drafts(&mut self) {
        let active = self.session.state().active_id();
        if self.drafts.version != active {
            self.drafts = Drafts {
                version: active,
                ..Drafts::default()
            };
        }
    }

    fn flowchart(&self) -> Flowchart {
        self.drafts
            .flowchart
            .clone()
            .unwrap_or_else(|| self.session.state().analysis().flowchart)
    }

    fn characters(&self) -> Vec<Character> {
        self.drafts
            .characters
            .clone()
            .unwrap_or_else(|| self.session.state().analysis().characters)
    }

    fn edit_flowchart(&mut self, edit: impl FnOnce(&mut Flowchart) -> bool) -> Result<()> {
        let mut chart = self.flowchart();
        if !edit(&mut chart) {
            return Err(anyhow!("Flowchart unchanged (unknown node or duplicate edge)"));
        }
        print!("{}", chart.to_mermaid());
        self.drafts.flowchart = Some(chart);
        Ok(())
    }

    /// Run one `#` command. Returns `false` to stop.
    async fn command(&mut self, name: &str, args: &str) -> Result<bool> {
        self.sync_drafts();

        match name {
            "quit" | "exit" => {
                println!("Goodbye!");
                return Ok(false);
            }
            "help" => print_help(),
            "open" => {
                let path = required(args, "#open <path>")?;
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {path}"))?;
                self.set_text(text).await?;
            }
            "text" => {
                println!("[TEXT]");
                println!("{}", self.session.state().text());
            }
            "analyze" => {
                let id = self.session.analyze().await?;
                println!("[ANALYZED] {id}");
                self.print_summary();
            }
            "select" => {
                let snippet = required(args, "#select <snippet>")?;
                let range = self.session.state_mut().select_snippet(snippet)?;
                println!("[SELECTED] bytes {}..{}", range.start, range.end);
            }
            "continue" => {
                self.session.continue_from_selection().await?;
                self.print_new_version();
            }
            "rewrite" => {
                let instruction = required(args, "#rewrite <instruction>")?;
                self.session.rewrite_all(instruction).await?;
                self.print_new_version();
            }
            "flow" => {
                println!("[FLOWCHART]");
                print!("{}", self.flowchart().to_mermaid());
            }
            "characters" => {
                println!("[CHARACTERS]");
                for c in self.characters() {
                    println!("  {}: {}", c.name, c.description);
                }
            }
            "plot" => {
                println!("[PLOT]");
                for (i, beat) in self.session.state().analysis().plot.iter().enumerate() {
                    println!("  {}. {beat}", i + 1);
                }
            }
            "character" => {
                let (name, description) = args
                    .split_once(':')
                    .map(|(n, d)| (n.trim(), d.trim()))
                    .filter(|(n, _)| !n.is_empty())
                    .ok_or_else(|| anyhow!("Usage: #character <name>: <description>"))?;
                let characters = self.edit_character(name, description);
                self.session.rewrite_characters(&characters).await?;
                self.print_new_version();
            }
            "relabel" => {
                let (id, label) = args
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("Usage: #relabel <id> <label>"))?;
                let label = label.trim().to_string();
                self.edit_flowchart(|chart| chart.relabel(id, label))?;
            }
            "link" => {
                let mut parts = args.split_whitespace();
                let (Some(a), Some(b)) = (parts.next(), parts.next()) else {
                    return Err(anyhow!("Usage: #link <a> <b>"));
                };
                self.edit_flowchart(|chart| chart.add_edge(a, b))?;
            }
            "unlink-node" => {
                let id = required(args, "#unlink-node <id>")?;
                self.edit_flowchart(|chart| chart.remove_node(id))?;
            }
            "reflow" => {
                let chart = self.flowchart();
                self.session.rewrite_flowchart(&chart).await?;
                self.print_new_version();
            }
            "versions" => {
                self.print_versions();
                self.print_audio_status();
            }
            "switch" => {
                let index = parse_index(args)?;
                self.session.switch_version(index)?;
                self.print_active();
            }
            "rename" => {
                let (index, name) = args
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("Usage: #rename <n> <name>"))?;
                self.session.rename_version(parse_index(index)?, name.trim())?;
                self.print_versions();
            }
            "delete" => {
                let removed = self.session.delete_version(parse_index(args)?)?;
                println!("[DELETED] {}", removed.name);
                self.print_active();
            }
            "compare" => {
                let index = match args.trim() {
                    "none" | "" => None,
                    n => Some(parse_index(n)?),
                };
                self.session.set_compare(index)?;
                self.print_versions();
            }
            "map" => {
                let fetched = self.session.relationships().await?;
                println!("[MAP] fetched {fetched} relationship(s)");
                self.print_map()?;
            }
            "reanalyze" => {
                let fetched = self.session.reanalyze_relationships().await?;
                println!("[MAP] fetched {fetched} relationship(s)");
                self.print_map()?;
            }
            "speakers" => {
                println!("[SPEAKERS]");
                for speaker in self.session.speakers().await? {
                    let styles: Vec<String> = speaker
                        .styles
                        .iter()
                        .map(|s| format!("{}={}", s.name, s.id))
                        .collect();
                    println!("  {} ({})", speaker.name, styles.join(", "));
                }
            }
            "speak" => match self.session.synthesize_active().await? {
                Some(d) => println!("[AUDIO] {:.1}s", d.as_secs_f64()),
                None => println!("[AUDIO] ready"),
            },
            "play" => match self.session.play() {
                Some(offset) => println!("[PLAYING] from {:.1}s", offset.as_secs_f64()),
                None => println!("[ERROR] No audio for this version. Use #speak first."),
            },
            "pause" => match self.session.pause() {
                Some(at) => println!("[PAUSED] at {:.1}s", at.as_secs_f64()),
                None => println!("[ERROR] Nothing is playing"),
            },
            "save-audio" => {
                let path = required(args, "#save-audio <path>")?;
                let bytes = self
                    .session
                    .active_audio()
                    .ok_or_else(|| anyhow!("No audio for this version. Use #speak first."))?
                    .to_vec();
                tokio::fs::write(path, bytes)
                    .await
                    .with_context(|| format!("writing {path}"))?;
                println!("[SAVED] {path}");
            }
            _ => println!("[ERROR] Unknown command. Type #help for help."),
        }
        Ok(true)
    }

    async fn set_text(&mut self, text: String) -> Result<()> {
        if let Some(id) = self.session.set_text(text).await? {
            println!("[ANALYZED] {id}");
            self.print_summary();
        }
        Ok(())
    }

    async fn append(&mut self, line: &str) -> Result<()> {
        if let Some(id) = self.session.append_line(line).await? {
            println!("[ANALYZED] {id}");
            self.print_summary();
        }
        Ok(())
    }

    /// Apply a character edit to the working list. Matches by name.
    fn edit_character(&mut self, name: &str, description: &str) -> Vec<Character> {
        let mut characters = self.characters();
        match characters
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.description = description.to_string(),
            None => {
                let id = Character::synthetic_id(characters.len());
                characters.push(Character::new(id, name, description));
            }
        }
        self.drafts.characters = Some(characters.clone());
        characters
    }

    fn print_summary(&self) {
        let analysis = self.session.state().analysis();
        println!(
            "  {} node(s), {} character(s), {} plot point(s)",
            analysis.flowchart.nodes.len(),
            analysis.characters.len(),
            analysis.plot.len()
        );
    }

    fn print_new_version(&self) {
        if let Some(version) = self.session.state().active_version() {
            println!("[VERSION] {} - {}", version.name, version.description);
            println!("{}", version.text);
        }
    }

    fn print_active(&self) {
        if let Some(version) = self.session.state().active_version() {
            println!("[ACTIVE] {}", version.name);
            println!("{}", version.text);
        }
    }

    fn print_versions(&self) {
        let Some(store) = self.session.state().versions() else {
            println!("[VERSIONS] none yet");
            return;
        };
        println!("[VERSIONS]");
        for (i, version) in store.versions().iter().enumerate() {
            let marker = if i == store.active_index() {
                '*'
            } else if Some(i) == store.compare_index() {
                '~'
            } else {
                ' '
            };
            println!(
                "{marker} {i}: {} [{}] {}{}",
                version.name,
                version.timestamp.format("%H:%M:%S"),
                version.description,
                parent_note(store.versions(), version),
            );
        }
    }

    fn print_map(&self) -> Result<()> {
        let layout = self.session.version_map_layout()?;
        for column in &layout.columns {
            let nodes: Vec<String> = layout
                .nodes
                .iter()
                .filter(|n| n.version_id == column.version_id)
                .map(|n| {
                    let mark = if n.shared { "=" } else { "" };
                    format!("{}{}[{}]@{}", mark, n.node_id, n.label, n.level)
                })
                .collect();
            println!("  {}: {}", column.name, nodes.join(" "));
        }
        for connector in &layout.connectors {
            println!(
                "  branch {} -> {}: {}",
                connector.from_node, connector.to_node, connector.description
            );
        }
        Ok(())
    }

    fn print_audio_status(&self) {
        if let Some(id) = self.session.state().active_id() {
            let status = match self.session.state().audio().status(id) {
                PlaybackStatus::Empty => "none",
                PlaybackStatus::Ready => "ready",
                PlaybackStatus::Playing => "playing",
            };
            println!("  Audio: {status}");
        }
    }
}

/// Run the editor in headless mode.
pub async fn run_headless(session: StorySession, file: Option<PathBuf>) -> Result<()> {
    let mut editor = Editor {
        session,
        drafts: Drafts::default(),
    };

    println!("=== Story Editor ===");
    println!(
        "Analysis starts once the text reaches {} characters.",
        editor.session.config().min_analysis_chars
    );
    println!("Type lines of story text, or #help for commands.");
    println!();

    if let Some(path) = file {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        if let Err(e) = editor.set_text(text).await {
            println!("[ERROR] {e}");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let result = match trimmed.strip_prefix('#') {
            Some(command) => {
                let (name, args) = command
                    .split_once(char::is_whitespace)
                    .unwrap_or((command, ""));
                match editor.command(name, args.trim()).await {
                    Ok(true) => Ok(()),
                    Ok(false) => break,
                    Err(e) => Err(e),
                }
            }
            None => editor.append(&line).await,
        };

        if let Err(e) = result {
            println!("[ERROR] {e:#}");
        }
        stdout.flush().ok();
    }

    Ok(())
}

fn print_help() {
    println!("[HELP]");
    for (command, description) in HELP {
        println!("  {command:<28} - {description}");
    }
    println!("  (anything else is appended to the story)");
}

fn required<'a>(args: &'a str, usage: &str) -> Result<&'a str> {
    let args = args.trim();
    if args.is_empty() {
        Err(anyhow!("Usage: {usage}"))
    } else {
        Ok(args)
    }
}

fn parse_index(s: &str) -> Result<usize> {
    s.trim()
        .parse()
        .map_err(|_| anyhow!("Expected a version number, got {s:?}"))
}

fn parent_note(versions: &[StoryVersion], version: &StoryVersion) -> String {
    version
        .parent_version_id
        .and_then(|p| versions.iter().find(|v| v.id == p))
        .map(|p| format!(" (from {})", p.name))
        .unwrap_or_default()
}

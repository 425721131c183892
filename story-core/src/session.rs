//! StorySession - the primary public API for story editing.
//!
//! Wraps the generative clients, the version store, the version map and the
//! audio library behind one set of handlers. All mutable editor state lives in
//! [`EditorState`]; the clients live in [`StoryEngine`].
//!
//! Every handler that calls out takes a [`RequestTicket`] before its first
//! await and only applies its result while that ticket is still the latest.

use crate::ai::{
    Analysis, Analyzer, GeminiGenerator, Passage, RelationshipAnalyzer, Rewriter, TextGenerator,
};
use crate::audio::AudioLibrary;
use crate::config::EditorConfig;
use crate::error::StoryError;
use crate::model::{Character, CharacterDiff, Flowchart};
use crate::version_map::{MapLayout, VersionMap};
use crate::versions::{StoryVersion, VersionId, VersionStore};
use gemini::Gemini;
use speech::{Speaker, SpeechClient};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

/// Generation number handed out when a request starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

/// Everything the editor shows and edits.
#[derive(Debug, Clone)]
pub struct EditorState {
    text: String,
    selection: Option<Range<usize>>,
    versions: Option<VersionStore>,
    version_map: VersionMap,
    audio: AudioLibrary,
    generation: u64,
    min_analysis_chars: usize,
}

impl EditorState {
    pub fn new(min_analysis_chars: usize) -> Self {
        Self {
            text: String::new(),
            selection: None,
            versions: None,
            version_map: VersionMap::new(),
            audio: AudioLibrary::new(),
            generation: 0,
            min_analysis_chars,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the text in characters.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn min_analysis_chars(&self) -> usize {
        self.min_analysis_chars
    }

    /// Replace the editor text.
    ///
    /// The active version's audio no longer matches and is dropped; any
    /// selection is cleared and in-flight requests become stale.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.selection = None;
        self.supersede_requests();
        if let Some(id) = self.active_id() {
            self.audio.invalidate(id);
        }
    }

    /// Append a line to the editor text.
    pub fn append_line(&mut self, line: &str) {
        let mut text = std::mem::take(&mut self.text);
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(line);
        self.set_text(text);
    }

    /// Whether the text is long enough to analyze.
    pub fn meets_threshold(&self) -> bool {
        self.char_count() >= self.min_analysis_chars
    }

    /// Text long enough and no version yet: the first analysis is due.
    pub fn needs_analysis(&self) -> bool {
        self.versions.is_none() && self.meets_threshold()
    }

    pub fn selection(&self) -> Option<Range<usize>> {
        self.selection.clone()
    }

    pub fn selected_text(&self) -> Option<&str> {
        self.selection.as_ref().map(|r| &self.text[r.clone()])
    }

    /// Select a byte range of the text.
    pub fn select(&mut self, range: Range<usize>) -> Result<(), StoryError> {
        if range.start >= range.end
            || range.end > self.text.len()
            || !self.text.is_char_boundary(range.start)
            || !self.text.is_char_boundary(range.end)
        {
            return Err(StoryError::InvalidSelection);
        }
        self.selection = Some(range);
        Ok(())
    }

    /// Select the first occurrence of `snippet`.
    pub fn select_snippet(&mut self, snippet: &str) -> Result<Range<usize>, StoryError> {
        if snippet.is_empty() {
            return Err(StoryError::InvalidSelection);
        }
        let start = self
            .text
            .find(snippet)
            .ok_or(StoryError::InvalidSelection)?;
        let range = start..start + snippet.len();
        self.select(range.clone())?;
        Ok(range)
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn versions(&self) -> Option<&VersionStore> {
        self.versions.as_ref()
    }

    /// The version store, or `NoVersions` before the first analysis.
    pub fn store(&self) -> Result<&VersionStore, StoryError> {
        self.versions.as_ref().ok_or(StoryError::NoVersions)
    }

    fn store_mut(&mut self) -> Result<&mut VersionStore, StoryError> {
        self.versions.as_mut().ok_or(StoryError::NoVersions)
    }

    pub fn active_version(&self) -> Option<&StoryVersion> {
        self.versions.as_ref().map(|s| s.active())
    }

    pub fn active_id(&self) -> Option<VersionId> {
        self.active_version().map(|v| v.id)
    }

    /// Structure of the active version, empty before the first analysis.
    pub fn analysis(&self) -> Analysis {
        self.active_version()
            .map(StoryVersion::analysis)
            .unwrap_or_default()
    }

    pub fn version_map(&self) -> &VersionMap {
        &self.version_map
    }

    pub fn audio(&self) -> &AudioLibrary {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioLibrary {
        &mut self.audio
    }

    /// Start a request. Any earlier ticket becomes stale.
    pub fn begin_request(&mut self) -> RequestTicket {
        self.generation += 1;
        RequestTicket(self.generation)
    }

    /// Invalidate every outstanding ticket.
    fn supersede_requests(&mut self) {
        self.generation += 1;
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        ticket.0 == self.generation
    }

    fn check_ticket(&self, ticket: RequestTicket) -> Result<(), StoryError> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            tracing::debug!(
                ticket = ticket.0,
                latest = self.generation,
                "discarding stale response"
            );
            Err(StoryError::Stale)
        }
    }

    /// Store an analysis of `text`.
    ///
    /// The first analysis creates the root version; later ones update the
    /// active version in place.
    pub fn apply_analysis(
        &mut self,
        ticket: RequestTicket,
        text: impl Into<String>,
        analysis: Analysis,
    ) -> Result<VersionId, StoryError> {
        self.check_ticket(ticket)?;

        match &mut self.versions {
            Some(store) => Ok(store.update_active(text, analysis)),
            None => {
                let store = VersionStore::new(text, analysis, "Initial analysis");
                let id = store.root().id;
                tracing::info!(version_id = %id, "created root version");
                self.versions = Some(store);
                Ok(id)
            }
        }
    }

    /// Store a rewrite as a child of the active version and switch to it.
    pub fn apply_rewrite(
        &mut self,
        ticket: RequestTicket,
        text: impl Into<String>,
        analysis: Analysis,
        description: impl Into<String>,
    ) -> Result<VersionId, StoryError> {
        self.check_ticket(ticket)?;

        let text = text.into();
        let store = self.store_mut()?;
        let previous = store.active().id;
        let id = store.append(previous, text.clone(), analysis, description)?;
        store.set_active_id(id)?;

        self.audio.switch_from(previous);
        self.text = text;
        self.selection = None;
        Ok(id)
    }

    /// Make the version at `index` active and load its text.
    ///
    /// Requests started before the switch become stale.
    pub fn switch_version(&mut self, index: usize) -> Result<VersionId, StoryError> {
        let store = self.store_mut()?;
        let previous = store.active().id;
        let version = store.set_active(index)?;
        let (id, text) = (version.id, version.text.clone());

        if previous != id {
            self.audio.switch_from(previous);
        }
        self.text = text;
        self.selection = None;
        self.supersede_requests();
        Ok(id)
    }

    pub fn rename_version(&mut self, index: usize, name: &str) -> Result<(), StoryError> {
        let store = self.store_mut()?;
        let id = store.at(index)?.id;
        store.rename(id, name)?;
        Ok(())
    }

    /// Delete the version at `index`.
    ///
    /// If the active version changes the editor loads the new one. Audio and
    /// cached relationships of vanished versions are released.
    pub fn delete_version(&mut self, index: usize) -> Result<StoryVersion, StoryError> {
        let store = self.store_mut()?;
        let previous_active = store.active().id;
        let id = store.at(index)?.id;
        let removed = store.delete(id)?;

        let live: Vec<VersionId> = store.versions().iter().map(|v| v.id).collect();
        let active = store.active();
        let reload = (active.id != previous_active).then(|| active.text.clone());

        self.audio.retain(&live);
        if let Some(store) = &self.versions {
            self.version_map.prune(store);
        }
        if let Some(text) = reload {
            self.text = text;
            self.selection = None;
        }
        self.supersede_requests();
        Ok(removed)
    }

    pub fn set_compare(&mut self, index: Option<usize>) -> Result<(), StoryError> {
        self.store_mut()?.set_compare(index)?;
        Ok(())
    }

    /// Store synthesized audio for `version`. Returns its duration if known.
    pub fn apply_audio(
        &mut self,
        ticket: RequestTicket,
        version: VersionId,
        bytes: Vec<u8>,
    ) -> Result<Option<Duration>, StoryError> {
        self.check_ticket(ticket)?;
        if self.store()?.get(version).is_none() {
            return Err(crate::error::VersionError::NotFound(version).into());
        }
        Ok(self.audio.store(version, bytes).duration())
    }

    async fn refresh_map(
        &mut self,
        analyzer: &RelationshipAnalyzer,
        from_scratch: bool,
    ) -> Result<usize, StoryError> {
        let store = self.versions.as_ref().ok_or(StoryError::NoVersions)?;
        if from_scratch {
            self.version_map.reanalyze(store, analyzer).await
        } else {
            self.version_map.refresh(store, analyzer).await
        }
    }
}

/// The clients a session calls out to.
#[derive(Clone)]
pub struct StoryEngine {
    analyzer: Analyzer,
    rewriter: Rewriter,
    relations: RelationshipAnalyzer,
    speech: SpeechClient,
}

impl StoryEngine {
    /// Build an engine on any text generator.
    pub fn new(generator: Arc<dyn TextGenerator>, speech: SpeechClient) -> Self {
        Self {
            analyzer: Analyzer::new(generator.clone()),
            rewriter: Rewriter::new(generator.clone()),
            relations: RelationshipAnalyzer::new(generator),
            speech,
        }
    }

    /// Build the real Gemini-backed engine.
    ///
    /// Fails with `NoApiKey` when the config carries no key.
    pub fn from_config(config: &EditorConfig) -> Result<Self, StoryError> {
        let key = config.api_key.clone().ok_or(gemini::Error::NoApiKey)?;
        let mut client = Gemini::new(key)?;
        if let Some(model) = &config.model {
            client = client.with_model(model);
        }
        if let Some(base) = &config.api_base {
            client = client.with_base_url(base);
        }

        let mut generator = GeminiGenerator::new(client);
        if let Some(t) = config.temperature {
            generator = generator.with_temperature(t);
        }

        let speech = SpeechClient::new(&config.speech_base_url)?;
        Ok(Self::new(Arc::new(generator), speech))
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn rewriter(&self) -> &Rewriter {
        &self.rewriter
    }

    pub fn relations(&self) -> &RelationshipAnalyzer {
        &self.relations
    }

    pub fn speech(&self) -> &SpeechClient {
        &self.speech
    }
}

/// A story editing session.
///
/// This is the main entry point for editing. It manages:
/// - The editor text and selection
/// - The version tree and its relationship map
/// - Synthesized audio per version
pub struct StorySession {
    config: EditorConfig,
    engine: StoryEngine,
    state: EditorState,
}

impl StorySession {
    pub fn new(config: EditorConfig, engine: StoryEngine) -> Self {
        let state = EditorState::new(config.min_analysis_chars);
        Self {
            config,
            engine,
            state,
        }
    }

    /// Create a session with the Gemini-backed engine.
    pub fn from_config(config: EditorConfig) -> Result<Self, StoryError> {
        let engine = StoryEngine::from_config(&config)?;
        Ok(Self::new(config, engine))
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn engine(&self) -> &StoryEngine {
        &self.engine
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    /// Direct access to editor state.
    ///
    /// Edits made here do not trigger analysis.
    pub fn state_mut(&mut self) -> &mut EditorState {
        &mut self.state
    }

    /// Replace the text; runs the first analysis once the text is long enough.
    ///
    /// Returns the root version id when an analysis ran.
    pub async fn set_text(
        &mut self,
        text: impl Into<String>,
    ) -> Result<Option<VersionId>, StoryError> {
        self.state.set_text(text);
        self.analyze_if_due().await
    }

    /// Append a line; runs the first analysis once the text is long enough.
    pub async fn append_line(&mut self, line: &str) -> Result<Option<VersionId>, StoryError> {
        self.state.append_line(line);
        self.analyze_if_due().await
    }

    async fn analyze_if_due(&mut self) -> Result<Option<VersionId>, StoryError> {
        if !self.state.needs_analysis() {
            return Ok(None);
        }
        self.analyze().await.map(Some)
    }

    /// Analyze the current text.
    ///
    /// Creates the root version on first use and re-analyzes the active
    /// version in place afterwards.
    pub async fn analyze(&mut self) -> Result<VersionId, StoryError> {
        if !self.state.meets_threshold() {
            return Err(StoryError::TextTooShort {
                len: self.state.char_count(),
                min: self.state.min_analysis_chars(),
            });
        }

        let ticket = self.state.begin_request();
        let text = self.state.text().to_string();
        let analysis = self
            .engine
            .analyzer
            .analyze(&text)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "analysis failed"))?;
        self.state.apply_analysis(ticket, text, analysis)
    }

    /// Regenerate the story from the selected passage to the end.
    ///
    /// Text before the selection is kept; the continuation replaces the rest.
    pub async fn continue_from_selection(&mut self) -> Result<VersionId, StoryError> {
        self.state.store()?;
        let range = self.state.selection().ok_or(StoryError::InvalidSelection)?;

        let ticket = self.state.begin_request();
        let text = self.state.text().to_string();
        let window = self.config.context_window;
        let passage = Passage {
            preceding: tail_chars(&text[..range.start], window),
            selected: &text[range.clone()],
            following: head_chars(&text[range.end..], window),
        };

        let continuation = self
            .engine
            .rewriter
            .continue_from(&passage)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "continuation failed"))?;
        let new_text = splice(&text[..range.start], &continuation);

        self.finish_rewrite(ticket, new_text, "Continued from selection".to_string())
            .await
    }

    /// Rewrite the whole story following `instruction`.
    pub async fn rewrite_all(&mut self, instruction: &str) -> Result<VersionId, StoryError> {
        self.state.store()?;
        let ticket = self.state.begin_request();
        let text = self.state.text().to_string();

        let new_text = self
            .engine
            .rewriter
            .rewrite_all(&text, instruction)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "rewrite failed"))?;

        self.finish_rewrite(ticket, new_text, format!("Rewrite: {}", instruction.trim()))
            .await
    }

    /// Rewrite the story to match an edited character list.
    pub async fn rewrite_characters(
        &mut self,
        characters: &[Character],
    ) -> Result<VersionId, StoryError> {
        let before = self.state.store()?.active().characters.clone();
        let ticket = self.state.begin_request();
        let text = self.state.text().to_string();

        let new_text = self
            .engine
            .rewriter
            .rewrite_for_characters(&text, &before, characters)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "character rewrite failed"))?;

        let description = CharacterDiff::compute(&before, characters).describe();
        self.finish_rewrite(ticket, new_text, description).await
    }

    /// Rewrite the story to follow an edited flowchart.
    pub async fn rewrite_flowchart(
        &mut self,
        flowchart: &Flowchart,
    ) -> Result<VersionId, StoryError> {
        self.state.store()?;
        let ticket = self.state.begin_request();
        let text = self.state.text().to_string();
        let previous = (!text.trim().is_empty()).then_some(text.as_str());

        let new_text = self
            .engine
            .rewriter
            .rewrite_for_flowchart(flowchart, previous)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "flowchart rewrite failed"))?;

        self.finish_rewrite(ticket, new_text, "Rewritten from flowchart".to_string())
            .await
    }

    async fn finish_rewrite(
        &mut self,
        ticket: RequestTicket,
        text: String,
        description: String,
    ) -> Result<VersionId, StoryError> {
        let analysis = self
            .engine
            .analyzer
            .analyze(&text)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "analysis of rewrite failed"))?;
        self.state.apply_rewrite(ticket, text, analysis, description)
    }

    pub fn switch_version(&mut self, index: usize) -> Result<VersionId, StoryError> {
        self.state.switch_version(index)
    }

    pub fn rename_version(&mut self, index: usize, name: &str) -> Result<(), StoryError> {
        self.state.rename_version(index, name)
    }

    pub fn delete_version(&mut self, index: usize) -> Result<StoryVersion, StoryError> {
        self.state.delete_version(index)
    }

    pub fn set_compare(&mut self, index: Option<usize>) -> Result<(), StoryError> {
        self.state.set_compare(index)
    }

    /// Fetch relationships for every parent/child pair not yet cached.
    pub async fn relationships(&mut self) -> Result<usize, StoryError> {
        self.state.refresh_map(&self.engine.relations, false).await
    }

    /// Drop cached relationships and fetch them all again.
    pub async fn reanalyze_relationships(&mut self) -> Result<usize, StoryError> {
        self.state.refresh_map(&self.engine.relations, true).await
    }

    pub fn version_map_layout(&self) -> Result<MapLayout, StoryError> {
        let store = self.state.store()?;
        Ok(self.state.version_map.layout(store))
    }

    /// Voices offered by the speech engine.
    pub async fn speakers(&self) -> Result<Vec<Speaker>, StoryError> {
        Ok(self.engine.speech.speakers().await?)
    }

    /// Synthesize the active version's text. Returns the audio duration if known.
    pub async fn synthesize_active(&mut self) -> Result<Option<Duration>, StoryError> {
        let version = self.state.store()?.active();
        let (id, text) = (version.id, version.text.clone());

        let ticket = self.state.begin_request();
        let bytes = self
            .engine
            .speech
            .speak(&text, self.config.speaker)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "speech synthesis failed"))?;
        self.state.apply_audio(ticket, id, bytes)
    }

    /// Play the active version's audio from where it was paused.
    pub fn play(&mut self) -> Option<Duration> {
        let id = self.state.active_id()?;
        self.state.audio.play(id)
    }

    pub fn pause(&mut self) -> Option<Duration> {
        let id = self.state.active_id()?;
        self.state.audio.pause(id)
    }

    /// Synthesized audio bytes of the active version.
    pub fn active_audio(&self) -> Option<&[u8]> {
        let id = self.state.active_id()?;
        self.state.audio.buffer(id).map(|b| b.bytes())
    }
}

/// The last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

/// The first `n` characters of `s`.
fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Join kept text and a continuation with a single separating space.
fn splice(prefix: &str, continuation: &str) -> String {
    if prefix.is_empty() || prefix.ends_with(char::is_whitespace) {
        format!("{prefix}{continuation}")
    } else {
        format!("{prefix} {continuation}")
    }
}

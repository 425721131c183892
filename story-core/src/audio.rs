//! Per-version audio playback state.
//!
//! Holds at most one decoded buffer and one playback source per version.
//! Switching away from a version stops its source but keeps the buffer and
//! paused offset; a version that leaves the version list loses everything.
//! Actual output to a sound device is the front end's job; this module only
//! tracks what should be playing and from where.

use crate::versions::VersionId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Synthesized audio for one version.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    bytes: Arc<Vec<u8>>,
    duration: Option<Duration>,
}

impl AudioBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        let duration = wav_duration(&bytes);
        Self {
            bytes: Arc::new(bytes),
            duration,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the audio, when the WAV header could be read.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

#[derive(Debug, Clone, Copy)]
struct PlaybackSource {
    started_at: Instant,
    start_offset: Duration,
}

/// What a version's audio is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Nothing synthesized.
    Empty,
    /// Buffer loaded, not playing.
    Ready,
    Playing,
}

#[derive(Debug, Clone, Default)]
struct AudioState {
    buffer: Option<AudioBuffer>,
    source: Option<PlaybackSource>,
    paused_at: Duration,
}

impl AudioState {
    fn position(&self, now: Instant) -> Duration {
        let raw = match self.source {
            Some(src) => src.start_offset + now.saturating_duration_since(src.started_at),
            None => self.paused_at,
        };
        match self.buffer.as_ref().and_then(|b| b.duration) {
            Some(total) => raw.min(total),
            None => raw,
        }
    }
}

/// Audio state of every version that has any.
#[derive(Debug, Clone, Default)]
pub struct AudioLibrary {
    states: HashMap<VersionId, AudioState>,
}

impl AudioLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly synthesized buffer, replacing any previous one.
    pub fn store(&mut self, version: VersionId, bytes: Vec<u8>) -> &AudioBuffer {
        tracing::debug!(version_id = %version, bytes = bytes.len(), "stored audio buffer");
        let state = self.states.entry(version).or_default();
        state.source = None;
        state.paused_at = Duration::ZERO;
        state.buffer.insert(AudioBuffer::new(bytes))
    }

    pub fn buffer(&self, version: VersionId) -> Option<&AudioBuffer> {
        self.states.get(&version).and_then(|s| s.buffer.as_ref())
    }

    pub fn status(&self, version: VersionId) -> PlaybackStatus {
        match self.states.get(&version) {
            Some(state) if state.source.is_some() => PlaybackStatus::Playing,
            Some(state) if state.buffer.is_some() => PlaybackStatus::Ready,
            _ => PlaybackStatus::Empty,
        }
    }

    /// Start or resume playback. Returns the offset playback starts from, or
    /// `None` when there is no buffer.
    pub fn play(&mut self, version: VersionId) -> Option<Duration> {
        self.play_at(version, Instant::now())
    }

    /// Pause playback, remembering the position. Returns that position.
    pub fn pause(&mut self, version: VersionId) -> Option<Duration> {
        self.pause_at(version, Instant::now())
    }

    pub fn position(&self, version: VersionId) -> Option<Duration> {
        self.position_at(version, Instant::now())
    }

    /// Stop playback and rewind.
    pub fn stop(&mut self, version: VersionId) {
        if let Some(state) = self.states.get_mut(&version) {
            state.source = None;
            state.paused_at = Duration::ZERO;
        }
    }

    /// Leaving `previous`: stop its source, keep its buffer and paused offset.
    pub fn switch_from(&mut self, previous: VersionId) {
        if let Some(state) = self.states.get_mut(&previous) {
            if state.source.take().is_some() {
                tracing::debug!(version_id = %previous, "stopped playback on version switch");
            }
        }
    }

    /// Release audio for versions no longer in `live`.
    pub fn retain(&mut self, live: &[VersionId]) {
        self.states.retain(|id, _| live.contains(id));
    }

    /// Text changed: the version's audio no longer matches it.
    pub fn invalidate(&mut self, version: VersionId) {
        if self.states.remove(&version).is_some() {
            tracing::debug!(version_id = %version, "audio invalidated by text edit");
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn play_at(&mut self, version: VersionId, now: Instant) -> Option<Duration> {
        let state = self.states.get_mut(&version)?;
        state.buffer.as_ref()?;

        if state.source.is_some() {
            return Some(state.position(now));
        }

        let mut offset = state.paused_at;
        if let Some(total) = state.buffer.as_ref().and_then(|b| b.duration) {
            if offset >= total {
                offset = Duration::ZERO;
            }
        }
        state.source = Some(PlaybackSource {
            started_at: now,
            start_offset: offset,
        });
        Some(offset)
    }

    fn pause_at(&mut self, version: VersionId, now: Instant) -> Option<Duration> {
        let state = self.states.get_mut(&version)?;
        state.source?;
        let position = state.position(now);
        state.source = None;
        state.paused_at = position;
        Some(position)
    }

    fn position_at(&self, version: VersionId, now: Instant) -> Option<Duration> {
        let state = self.states.get(&version)?;
        state.buffer.as_ref()?;
        Some(state.position(now))
    }
}

/// Duration of a PCM WAV file from its `fmt ` and `data` chunks.
pub fn wav_duration(bytes: &[u8]) -> Option<Duration> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut byte_rate: Option<u32> = None;
    let mut data_len: Option<u32> = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().ok()?);
        let body = pos + 8;

        match id {
            b"fmt " if body + 12 <= bytes.len() => {
                byte_rate = Some(u32::from_le_bytes(bytes[body + 8..body + 12].try_into().ok()?));
            }
            b"data" => data_len = Some(size),
            _ => {}
        }

        if byte_rate.is_some() && data_len.is_some() {
            break;
        }
        // Chunks are padded to even sizes
        pos = body + size as usize + (size as usize & 1);
    }

    match (byte_rate, data_len) {
        (Some(rate), Some(len)) if rate > 0 => {
            Some(Duration::from_secs_f64(len as f64 / rate as f64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Minimal mono 16-bit PCM WAV with `samples` zero samples.
    fn wav(sample_rate: u32, samples: u32) -> Vec<u8> {
        let data_len = samples * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + data_len as usize, 0);
        out
    }

    #[test]
    fn test_wav_duration() {
        assert_eq!(wav_duration(&wav(24000, 48000)), Some(Duration::from_secs(2)));
        assert_eq!(wav_duration(b"not audio"), None);
        assert_eq!(wav_duration(&wav(24000, 0)), Some(Duration::ZERO));
    }

    #[test]
    fn test_play_pause_resume() {
        let id = Uuid::new_v4();
        let mut lib = AudioLibrary::new();
        assert_eq!(lib.status(id), PlaybackStatus::Empty);
        assert_eq!(lib.play(id), None);

        lib.store(id, wav(24000, 24000 * 10));
        assert_eq!(lib.status(id), PlaybackStatus::Ready);

        let t0 = Instant::now();
        assert_eq!(lib.play_at(id, t0), Some(Duration::ZERO));
        assert_eq!(lib.status(id), PlaybackStatus::Playing);

        let paused = lib.pause_at(id, t0 + Duration::from_secs(3)).unwrap();
        assert_eq!(paused, Duration::from_secs(3));
        assert_eq!(lib.status(id), PlaybackStatus::Ready);

        let t1 = t0 + Duration::from_secs(60);
        assert_eq!(lib.play_at(id, t1), Some(Duration::from_secs(3)));
        assert_eq!(
            lib.position_at(id, t1 + Duration::from_secs(2)),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_position_clamped_and_replay_rewinds() {
        let id = Uuid::new_v4();
        let mut lib = AudioLibrary::new();
        lib.store(id, wav(8000, 8000));
        let t0 = Instant::now();
        lib.play_at(id, t0);
        let end = lib.pause_at(id, t0 + Duration::from_secs(30)).unwrap();
        assert_eq!(end, Duration::from_secs(1));
        assert_eq!(lib.play_at(id, t0 + Duration::from_secs(31)), Some(Duration::ZERO));
    }

    #[test]
    fn test_switch_keeps_buffer_and_offset() {
        let a = Uuid::new_v4();
        let mut lib = AudioLibrary::new();
        lib.store(a, wav(8000, 8000 * 10));
        let t0 = Instant::now();
        lib.play_at(a, t0);
        lib.pause_at(a, t0 + Duration::from_secs(4));
        lib.play_at(a, t0 + Duration::from_secs(5));

        lib.switch_from(a);
        assert_eq!(lib.status(a), PlaybackStatus::Ready);
        assert!(lib.buffer(a).is_some());
        assert_eq!(lib.position(a), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_retain_and_invalidate_release_state() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut lib = AudioLibrary::new();
        lib.store(a, wav(8000, 8000));
        lib.store(b, wav(8000, 8000));

        lib.retain(&[a]);
        assert_eq!(lib.status(b), PlaybackStatus::Empty);
        assert_eq!(lib.len(), 1);

        lib.invalidate(a);
        assert!(lib.is_empty());
    }

    #[test]
    fn test_stop_rewinds() {
        let a = Uuid::new_v4();
        let mut lib = AudioLibrary::new();
        lib.store(a, wav(8000, 8000 * 10));
        let t0 = Instant::now();
        lib.play_at(a, t0);
        lib.pause_at(a, t0 + Duration::from_secs(2));
        lib.stop(a);
        assert_eq!(lib.position(a), Some(Duration::ZERO));
    }
}

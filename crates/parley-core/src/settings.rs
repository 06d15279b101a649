//! Pipeline tuning knobs and validation.
//!
//! Every policy constant of the voice pipeline lives here with its reference
//! default, so deployments can tune latency and sensitivity without touching
//! the pipeline code. All sections deserialize with `#[serde(default)]`, so a
//! partial JSON settings file only overrides what it names.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default PCM rate of inbound audio.
pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16_000;

/// Default PCM rate of synthesized audio.
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Default synthesis voice.
pub const DEFAULT_VOICE: &str = "af_sarah";

/// Top-level pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Sample rate of PCM16 mono frames arriving from the client.
    pub input_sample_rate: u32,
    /// Sample rate raw synthesized PCM is chunked and paced at.
    pub output_sample_rate: u32,
    /// Voice identifier passed to the synthesizer.
    pub voice: String,
    /// Channel label passed to the agent runner.
    pub channel: String,
    /// Only send `vad_state` when the classification changes instead of once
    /// per evaluated frame.
    pub coalesce_vad_state: bool,
    pub gate: GateSettings,
    pub vad: VadSettings,
    pub utterance: UtteranceSettings,
    pub segmenter: SegmenterSettings,
    pub playback: PlaybackSettings,
    pub queues: QueueSettings,
    pub keepalive: KeepAliveSettings,
    pub wake: WakeSettings,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            input_sample_rate: DEFAULT_INPUT_SAMPLE_RATE,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            voice: DEFAULT_VOICE.to_owned(),
            channel: "voice".to_owned(),
            coalesce_vad_state: false,
            gate: GateSettings::default(),
            vad: VadSettings::default(),
            utterance: UtteranceSettings::default(),
            segmenter: SegmenterSettings::default(),
            playback: PlaybackSettings::default(),
            queues: QueueSettings::default(),
            keepalive: KeepAliveSettings::default(),
            wake: WakeSettings::default(),
        }
    }
}

/// Noise gate calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Frames treated as ambient noise at connection start.
    pub calibration_frames: u32,
    /// Threshold = `multiplier` x calibrated average RMS ...
    pub multiplier: f32,
    /// ... but never below this absolute RMS (PCM16 scale).
    pub floor_rms: f32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            calibration_frames: 20,
            multiplier: 2.5,
            floor_rms: 200.0,
        }
    }
}

/// Voice activity detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadSettings {
    /// Silero ONNX model. When absent or missing on disk the energy detector
    /// is used.
    pub model_path: Option<PathBuf>,
    /// Speech probability threshold of the model detector.
    pub threshold: f32,
    /// Consecutive failed inferences before the model detector resets its
    /// hidden state.
    pub max_consecutive_failures: u32,
    /// RMS (PCM16 scale) above which the energy detector counts a frame as loud.
    pub energy_threshold: f32,
    /// Consecutive loud frames to enter speech.
    pub speech_frames: u32,
    /// Consecutive quiet frames to leave speech.
    pub silence_frames: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            threshold: 0.5,
            max_consecutive_failures: 50,
            energy_threshold: 500.0,
            speech_frames: 3,
            silence_frames: 30,
        }
    }
}

/// Utterance accumulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtteranceSettings {
    /// Consecutive silent frames that end an utterance (25 x 20 ms = 500 ms).
    pub end_silence_frames: u32,
    /// Silent frames after the last speech frame kept in the utterance.
    pub max_trailing_silence_frames: u32,
    /// Gate-passed frames before speech onset prepended to the utterance.
    pub pre_roll_frames: u32,
    /// Shorter utterances are discarded as noise.
    pub min_utterance_ms: u64,
    /// Longer utterances are cut and transcribed.
    pub max_utterance_ms: u64,
}

impl Default for UtteranceSettings {
    fn default() -> Self {
        Self {
            end_silence_frames: 25,
            max_trailing_silence_frames: 15,
            pre_roll_frames: 3,
            min_utterance_ms: 500,
            max_utterance_ms: 30_000,
        }
    }
}

/// Speakable-unit segmentation of streamed response text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterSettings {
    /// Buffer length above which clause boundaries are honoured.
    pub clause_min_chars: usize,
    /// Flush timer before the first unit of a response.
    pub first_flush_ms: u64,
    /// Flush timer once a unit has been flushed.
    pub next_flush_ms: u64,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            clause_min_chars: 20,
            first_flush_ms: 400,
            next_flush_ms: 800,
        }
    }
}

impl SegmenterSettings {
    pub const fn first_flush(&self) -> Duration {
        Duration::from_millis(self.first_flush_ms)
    }

    pub const fn next_flush(&self) -> Duration {
        Duration::from_millis(self.next_flush_ms)
    }
}

/// Outbound audio pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Duration of one outbound PCM frame.
    pub frame_ms: u32,
    /// Sleep between outbound frames.
    pub pace_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            frame_ms: 20,
            pace_ms: 18,
        }
    }
}

impl PlaybackSettings {
    pub const fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

/// Inter-stage queue capacities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Inbound audio frames (lossy).
    pub inbound_frames: usize,
    /// Outbound audio frames (lossy).
    pub outbound_frames: usize,
    /// Transcripts awaiting the agent (blocking).
    pub transcripts: usize,
    /// Speakable units awaiting synthesis (blocking).
    pub units: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            inbound_frames: 100,
            outbound_frames: 200,
            transcripts: 10,
            units: 20,
        }
    }
}

/// Transport liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveSettings {
    pub ping_interval_ms: u64,
    /// Silence from the peer longer than this is a dead connection.
    pub liveness_timeout_ms: u64,
}

impl Default for KeepAliveSettings {
    fn default() -> Self {
        Self {
            ping_interval_ms: 15_000,
            liveness_timeout_ms: 45_000,
        }
    }
}

impl KeepAliveSettings {
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub const fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }
}

/// Wake-word listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeSettings {
    /// Canonical trigger phrase used for edit-distance matching.
    pub phrase: String,
    /// Accepted variants, matched as prefixes of the normalized transcript.
    pub variants: Vec<String>,
    pub max_edit_distance: usize,
    pub min_speech_ms: u64,
    pub max_speech_ms: u64,
    /// Consecutive silent frames that close a speech run.
    pub end_silence_frames: u32,
}

impl Default for WakeSettings {
    fn default() -> Self {
        Self {
            phrase: "hey parley".to_owned(),
            variants: ["hey parley", "hi parley", "hey parlay", "okay parley", "ok parley"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            max_edit_distance: 3,
            min_speech_ms: 300,
            max_speech_ms: 2_000,
            end_silence_frames: 10,
        }
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Sample rate must be between 8000 and 192000 Hz, got {0}")]
    InvalidSampleRate(u32),

    #[error("Queue capacity for {0} must be at least 1")]
    ZeroQueueCapacity(&'static str),

    #[error("Gate multiplier must be positive, got {0}")]
    InvalidGateMultiplier(f32),

    #[error("VAD threshold must be within (0, 1), got {0}")]
    InvalidVadThreshold(f32),

    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),

    #[error("Wake speech bounds are inverted: min {min} ms > max {max} ms")]
    InvalidWakeBounds { min: u64, max: u64 },

    #[error("Voice cannot be empty")]
    EmptyVoice,
}

/// Validate settings values.
pub fn validate_settings(settings: &VoiceSettings) -> Result<(), SettingsError> {
    for rate in [settings.input_sample_rate, settings.output_sample_rate] {
        if !(8_000..=192_000).contains(&rate) {
            return Err(SettingsError::InvalidSampleRate(rate));
        }
    }

    let queues = &settings.queues;
    for (name, capacity) in [
        ("inbound frames", queues.inbound_frames),
        ("outbound frames", queues.outbound_frames),
        ("transcripts", queues.transcripts),
        ("units", queues.units),
    ] {
        if capacity == 0 {
            return Err(SettingsError::ZeroQueueCapacity(name));
        }
    }

    if settings.gate.multiplier <= 0.0 {
        return Err(SettingsError::InvalidGateMultiplier(settings.gate.multiplier));
    }

    let threshold = settings.vad.threshold;
    if threshold <= 0.0 || threshold >= 1.0 {
        return Err(SettingsError::InvalidVadThreshold(threshold));
    }

    for (name, count) in [
        ("vad.speech_frames", settings.vad.speech_frames),
        ("vad.silence_frames", settings.vad.silence_frames),
        ("utterance.end_silence_frames", settings.utterance.end_silence_frames),
        ("playback.frame_ms", settings.playback.frame_ms),
        ("wake.end_silence_frames", settings.wake.end_silence_frames),
    ] {
        if count == 0 {
            return Err(SettingsError::ZeroCount(name));
        }
    }

    if settings.wake.min_speech_ms > settings.wake.max_speech_ms {
        return Err(SettingsError::InvalidWakeBounds {
            min: settings.wake.min_speech_ms,
            max: settings.wake.max_speech_ms,
        });
    }

    if settings.voice.trim().is_empty() {
        return Err(SettingsError::EmptyVoice);
    }

    Ok(())
}

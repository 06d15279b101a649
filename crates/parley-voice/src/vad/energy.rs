use parley_core::VadSettings;

use super::VoiceActivityDetector;
use crate::pcm;

/// RMS-threshold detector with hysteresis.
///
/// `speech_frames` consecutive loud frames enter speech, `silence_frames`
/// consecutive quiet frames leave it. A single outlier frame never flips the
/// decision.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
    speech_frames: u32,
    silence_frames: u32,
    speech_run: u32,
    silence_run: u32,
    speaking: bool,
}

impl EnergyVad {
    pub const fn new(settings: &VadSettings) -> Self {
        Self {
            threshold: settings.energy_threshold,
            speech_frames: settings.speech_frames,
            silence_frames: settings.silence_frames,
            speech_run: 0,
            silence_run: 0,
            speaking: false,
        }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        if pcm::rms(frame) >= self.threshold {
            self.speech_run = self.speech_run.saturating_add(1);
            self.silence_run = 0;
            if !self.speaking && self.speech_run >= self.speech_frames {
                self.speaking = true;
            }
        } else {
            self.silence_run = self.silence_run.saturating_add(1);
            self.speech_run = 0;
            if self.speaking && self.silence_run >= self.silence_frames {
                self.speaking = false;
            }
        }
        self.speaking
    }

    fn reset(&mut self) {
        self.speech_run = 0;
        self.silence_run = 0;
        self.speaking = false;
    }
}

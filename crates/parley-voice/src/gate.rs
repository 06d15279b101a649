//! Noise gate: suppresses frames quieter than the calibrated ambient floor.
//!
//! The first `calibration_frames` frames of a connection are assumed to be
//! ambient silence. Their average RMS, scaled by a multiplier and clamped to an
//! absolute floor, becomes the gate threshold for the rest of the connection.

use parley_core::GateSettings;

use crate::pcm;

/// Per-connection noise gate. Never shared between connections.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    calibration_frames: u32,
    multiplier: f32,
    floor: f32,
    frames_seen: u32,
    energy_sum: f64,
    threshold: Option<f32>,
}

impl NoiseGate {
    pub const fn new(settings: &GateSettings) -> Self {
        Self {
            calibration_frames: settings.calibration_frames,
            multiplier: settings.multiplier,
            floor: settings.floor_rms,
            frames_seen: 0,
            energy_sum: 0.0,
            threshold: None,
        }
    }

    /// Pass the frame through if it is at or above the threshold.
    ///
    /// Returns `None` unconditionally while calibrating.
    pub fn filter<'a>(&mut self, frame: &'a [i16]) -> Option<&'a [i16]> {
        let energy = pcm::rms(frame);
        match self.threshold {
            Some(threshold) => (energy >= threshold).then_some(frame),
            None => {
                self.calibrate(energy);
                None
            }
        }
    }

    /// Calibrated threshold, `None` while still calibrating.
    pub const fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    pub const fn is_calibrated(&self) -> bool {
        self.threshold.is_some()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calibrate(&mut self, energy: f32) {
        self.frames_seen += 1;
        self.energy_sum += f64::from(energy);
        if self.frames_seen >= self.calibration_frames {
            let average = (self.energy_sum / f64::from(self.frames_seen.max(1))) as f32;
            let threshold = (average * self.multiplier).max(self.floor);
            self.threshold = Some(threshold);
            tracing::debug!(average, threshold, "Noise gate calibrated");
        }
    }
}

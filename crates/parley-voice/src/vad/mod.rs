//! Voice Activity Detection: classifies frames as speech or non-speech.
//!
//! Two detection strategies share one capability:
//!
//! * **Silero** (`silero` feature): recurrent neural classifier over ONNX
//!   Runtime. The loaded session is shared by every connection; the hidden
//!   state is owned per detector.
//!
//!   The fail-soft windowing lives in [`RecurrentVad`], generic over the
//!   model so it can be exercised without ONNX Runtime.
//!
//! * **Energy-based** (fallback): RMS threshold with hysteresis. Always
//!   available.
//!
//! The strategy is chosen once by [`select_vad_provider`]. Pipeline code only
//! ever sees `Box<dyn VoiceActivityDetector>` and never branches on backend.

mod energy;
mod recurrent;
#[cfg(feature = "silero")]
mod silero;

use std::sync::Arc;

use parley_core::VadSettings;

pub use energy::EnergyVad;
pub use recurrent::{RecurrentVad, WindowedModel};
#[cfg(feature = "silero")]
pub use silero::{SileroModel, SileroVad};

/// Per-connection speech classifier.
pub trait VoiceActivityDetector: Send {
    /// Classify one frame of PCM16 mono audio.
    ///
    /// Must not fail: an implementation that cannot classify a frame returns
    /// its previous decision.
    fn is_speech(&mut self, frame: &[i16]) -> bool;

    /// Forget all hysteresis / hidden state.
    fn reset(&mut self);
}

/// Factory producing one detector per connection or listener.
pub trait VadProvider: Send + Sync {
    /// Backend label for logs and health output.
    fn name(&self) -> &'static str;

    fn create(&self) -> Box<dyn VoiceActivityDetector>;
}

/// Provider for the energy fallback.
#[derive(Debug, Clone)]
pub struct EnergyVadProvider {
    settings: VadSettings,
}

impl EnergyVadProvider {
    pub const fn new(settings: VadSettings) -> Self {
        Self { settings }
    }
}

impl VadProvider for EnergyVadProvider {
    fn name(&self) -> &'static str {
        "energy"
    }

    fn create(&self) -> Box<dyn VoiceActivityDetector> {
        Box::new(EnergyVad::new(&self.settings))
    }
}

/// Probe capabilities once and pick the detector backend.
///
/// A configured model file that exists on disk selects Silero (when built
/// with the `silero` feature). Anything else, including a model that fails to
/// load, falls back to the energy detector.
pub fn select_vad_provider(settings: &VadSettings, sample_rate: u32) -> Arc<dyn VadProvider> {
    let Some(path) = settings.model_path.as_deref() else {
        tracing::info!("No VAD model configured, using energy detector");
        return Arc::new(EnergyVadProvider::new(settings.clone()));
    };

    if !path.is_file() {
        tracing::warn!(path = %path.display(), "VAD model not found, using energy detector");
        return Arc::new(EnergyVadProvider::new(settings.clone()));
    }

    #[cfg(feature = "silero")]
    {
        match SileroModel::load(path, settings, sample_rate) {
            Ok(model) => {
                tracing::info!(path = %path.display(), "Using Silero VAD");
                return Arc::new(model);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load Silero VAD, using energy detector");
            }
        }
    }

    #[cfg(not(feature = "silero"))]
    {
        let _ = sample_rate;
        tracing::warn!(
            path = %path.display(),
            "Built without the `silero` feature, using energy detector"
        );
    }

    Arc::new(EnergyVadProvider::new(settings.clone()))
}

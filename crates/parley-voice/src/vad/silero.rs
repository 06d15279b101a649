//! Silero VAD (v5) over ONNX Runtime.
//!
//! The model consumes 512-sample windows at 16 kHz (256 at 8 kHz), each
//! prefixed with the trailing context of the previous window, plus a
//! `[2, 1, 128]` recurrent state. It returns a speech probability and the
//! updated state.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::{Array2, Array3, arr0};
use ort::session::Session;
use ort::value::Tensor;
use parley_core::VadSettings;

use super::recurrent::{RecurrentVad, WindowedModel};
use super::{VadProvider, VoiceActivityDetector};
use crate::error::VoiceError;

const STATE_LEN: usize = 2 * 128;

/// Loaded model session, shared by every detector.
#[derive(Clone)]
pub struct SileroModel {
    session: Arc<Mutex<Session>>,
    sample_rate: u32,
    threshold: f32,
    max_consecutive_failures: u32,
}

impl SileroModel {
    pub fn load(path: &Path, settings: &VadSettings, sample_rate: u32) -> Result<Self, VoiceError> {
        if !path.is_file() {
            return Err(VoiceError::ModelNotFound(path.to_path_buf()));
        }
        if sample_rate != 8_000 && sample_rate != 16_000 {
            return Err(VoiceError::ModelLoadError(format!(
                "Silero VAD supports 8000 or 16000 Hz, got {sample_rate}"
            )));
        }
        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|e| VoiceError::ModelLoadError(e.to_string()))?;
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            sample_rate,
            threshold: settings.threshold,
            max_consecutive_failures: settings.max_consecutive_failures,
        })
    }
}

impl WindowedModel for SileroModel {
    fn window(&self) -> usize {
        if self.sample_rate == 16_000 { 512 } else { 256 }
    }

    fn context(&self) -> usize {
        if self.sample_rate == 16_000 { 64 } else { 32 }
    }

    fn state_len(&self) -> usize {
        STATE_LEN
    }

    fn infer(&self, input: &[f32], state: &[f32]) -> Result<(f32, Vec<f32>), VoiceError> {
        let err = |e: ort::Error| VoiceError::InferenceError(e.to_string());
        let input = Array2::from_shape_vec((1, input.len()), input.to_vec())
            .map_err(|e| VoiceError::InferenceError(e.to_string()))?;
        let state = Array3::from_shape_vec((2, 1, 128), state.to_vec())
            .map_err(|e| VoiceError::InferenceError(e.to_string()))?;
        let sr = arr0(i64::from(self.sample_rate));

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session
            .run(ort::inputs![
                "input" => Tensor::from_array(input).map_err(err)?,
                "state" => Tensor::from_array(state).map_err(err)?,
                "sr" => Tensor::from_array(sr).map_err(err)?,
            ])
            .map_err(err)?;

        let (_, probability) = outputs["output"].try_extract_tensor::<f32>().map_err(err)?;
        let (_, next_state) = outputs["stateN"].try_extract_tensor::<f32>().map_err(err)?;
        let probability = probability
            .first()
            .copied()
            .ok_or_else(|| VoiceError::InferenceError("empty VAD output".into()))?;
        Ok((probability, next_state.to_vec()))
    }
}

impl VadProvider for SileroModel {
    fn name(&self) -> &'static str {
        "silero"
    }

    fn create(&self) -> Box<dyn VoiceActivityDetector> {
        Box::new(SileroVad::new(
            self.clone(),
            self.threshold,
            self.max_consecutive_failures,
        ))
    }
}

/// Per-connection Silero detector.
pub type SileroVad = RecurrentVad<SileroModel>;

//! # dtln-rt
//!
//! Real-time two-stage neural noise suppression in the DTLN (dual-signal
//! transformation) style, with ONNX Runtime inference.
//!
//! The pipeline consumes a continuous stream of 16 kHz mono audio delivered
//! in chunks of any length and produces a denoised stream at the same rate.
//! Per 512-sample analysis frame (128-sample hop) it runs:
//!
//! 1. raised-cosine analysis window and real FFT,
//! 2. **stage A** — a frequency-domain model that maps the magnitude
//!    spectrum (plus its recurrent state) to a per-bin gain mask,
//! 3. mask application on magnitude, phase reattached, inverse FFT,
//! 4. **stage B** — a time-domain model that refines the frame (again
//!    carrying recurrent state),
//! 5. synthesis window and overlap-add reconstruction.
//!
//! Both stages keep recurrent state across frames, so frames must be
//! processed strictly in order; the engine guarantees that even across
//! per-frame failures (see [`DtlnProcessor::process`]).
//!
//! ## Quick start
//!
//! [`DtlnStream`] is the i16 front end — feed it whatever your capture
//! device hands you:
//!
//! ```ignore
//! use dtln_rt::{DtlnConfig, DtlnStream};
//!
//! let config = DtlnConfig::new("models/model_1.onnx", "models/model_2.onnx");
//! let mut stream = DtlnStream::new(config)?;
//!
//! // 16 kHz mono i16, any chunk length
//! let denoised: Vec<i16> = stream.process(&captured)?;
//! let tail = stream.flush()?; // at end of stream
//! ```
//!
//! [`DtlnProcessor`] is the same engine over f32 samples (still in the i16
//! value range), for callers that already work in floats or want to plug in
//! a different inference backend via [`DenoiseModel`].
//!
//! ## Audio requirements
//!
//! - **Sample rate**: 16 kHz (resample before processing if needed)
//! - **Format**: mono; i16 at the [`DtlnStream`] boundary
//!
//! ## Latency
//!
//! Algorithmic latency is one frame minus one hop: 384 samples, 24 ms. The
//! first output samples appear once a full analysis frame has accumulated.
//!
//! ## Thread safety
//!
//! An engine is `Send` but not internally synchronized: one instance, one
//! thread (or external locking). Independent streams need independent
//! engine instances; they share nothing.

use thiserror::Error;

mod model;
mod processor;
mod transform;
mod window;

pub use model::{DenoiseModel, OrtModel};
pub use processor::{DtlnConfig, DtlnProcessor};
pub use transform::SpectralTransform;
pub use window::Windows;

/// Expected input/output sample rate in Hz.
pub const SAMPLE_RATE: usize = 16000;
/// Analysis frame size in samples (32 ms at 16 kHz).
pub const FRAME_SIZE: usize = 512;
/// Hop between consecutive analysis frames (8 ms at 16 kHz).
pub const HOP_SIZE: usize = 128;
/// Number of spectral bins per frame: `FRAME_SIZE / 2 + 1`.
pub const SPECTRUM_SIZE: usize = FRAME_SIZE / 2 + 1;

#[derive(Error, Debug)]
pub enum DtlnError {
    #[error("ONNX runtime error: {0}")]
    Inference(#[from] ort::Error),
    #[error("transform error: {0}")]
    Transform(#[from] realfft::FftError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("model shape mismatch: {0}")]
    Shape(String),
    #[error("chunk of {len} samples exceeds buffer headroom ({free} free)")]
    ChunkTooLarge { len: usize, free: usize },
}

pub type Result<T> = std::result::Result<T, DtlnError>;

/// High-level streaming API over signed 16-bit samples.
///
/// Wraps a [`DtlnProcessor`], converting at the i16 boundary. Output chunks
/// lag input by the engine's startup latency; call [`flush`](Self::flush) at
/// end of stream to drain the remainder.
pub struct DtlnStream {
    processor: DtlnProcessor,
    /// Conversion scratch, reused across calls.
    conv: Vec<f32>,
}

impl DtlnStream {
    /// Create a stream, loading both stage models from the configured paths.
    pub fn new(config: DtlnConfig) -> Result<Self> {
        Ok(Self::wrap(DtlnProcessor::new(config)?))
    }

    /// Create a stream around explicit stage models (any [`DenoiseModel`]
    /// backend).
    pub fn with_models(
        config: DtlnConfig,
        stage_a: Box<dyn DenoiseModel>,
        stage_b: Box<dyn DenoiseModel>,
    ) -> Result<Self> {
        Ok(Self::wrap(DtlnProcessor::with_models(config, stage_a, stage_b)?))
    }

    fn wrap(processor: DtlnProcessor) -> Self {
        Self {
            processor,
            conv: Vec::new(),
        }
    }

    /// Feed a chunk of samples; returns every sample that became final.
    ///
    /// Any chunk length is accepted. The returned vector is empty until
    /// enough input has accumulated for a full analysis frame.
    pub fn process(&mut self, input: &[i16]) -> Result<Vec<i16>> {
        self.conv.clear();
        self.conv.extend(input.iter().map(|&s| s as f32));
        let out = self.processor.process(&self.conv)?;
        Ok(out.iter().map(|&x| x as i16).collect())
    }

    /// Drain buffered input by zero-padding to a frame boundary.
    ///
    /// Returns the denoised rendition of the samples that were still pending;
    /// call once at end of stream.
    pub fn flush(&mut self) -> Result<Vec<i16>> {
        let pending = self.processor.buffered_input();
        if pending == 0 {
            return Ok(Vec::new());
        }
        let frame = self.processor.config().frame_size;
        let mut out = self.processor.process(&vec![0.0f32; frame])?;
        out.truncate(pending);
        self.processor.discard_pending();
        Ok(out.iter().map(|&x| x as i16).collect())
    }

    /// Reset for a new independent stream. Models stay loaded.
    pub fn reset(&mut self) {
        self.processor.reset();
    }

    /// Algorithmic latency in milliseconds (one frame minus one hop).
    pub fn latency_ms(&self) -> f32 {
        let cfg = self.processor.config();
        (cfg.frame_size - cfg.hop_size) as f32 / cfg.sample_rate as f32 * 1000.0
    }

    /// Frames processed since the last reset. Diagnostics only.
    pub fn frames_processed(&self) -> u64 {
        self.processor.frames_processed()
    }

    /// Access the underlying processor for advanced use.
    pub fn processor_mut(&mut self) -> &mut DtlnProcessor {
        &mut self.processor
    }
}

// Compile-time check that engines can be moved between threads.
fn _assert_send<T: Send>() {}
fn _assert_engine_is_send() {
    _assert_send::<DtlnProcessor>();
    _assert_send::<DtlnStream>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::doubles::{ConstMask, PassThrough};

    fn identity_stream() -> DtlnStream {
        DtlnStream::with_models(
            DtlnConfig::new("", ""),
            Box::new(ConstMask(1.0)),
            Box::new(PassThrough),
        )
        .unwrap()
    }

    #[test]
    fn derived_sizes_are_consistent() {
        assert_eq!(FRAME_SIZE / 2 + 1, SPECTRUM_SIZE);
        assert_eq!(FRAME_SIZE % HOP_SIZE, 0);
    }

    #[test]
    fn i16_round_trip_through_identity_models() {
        let mut stream = identity_stream();
        let chunk = vec![1000i16; 128];
        let mut output = Vec::new();
        for _ in 0..20 {
            output.extend(stream.process(&chunk).unwrap());
        }
        let transient = FRAME_SIZE - HOP_SIZE;
        assert!(output.len() > transient);
        for &s in &output[transient..] {
            assert!((s - 1000).abs() <= 2, "expected ~1000, got {}", s);
        }
    }

    #[test]
    fn flush_drains_pending_input() {
        let mut stream = identity_stream();
        // 600 samples: one frame completes (128 finalized), 472 left pending.
        let first = stream.process(&vec![500i16; 600]).unwrap();
        assert_eq!(first.len(), 128);
        let tail = stream.flush().unwrap();
        assert_eq!(tail.len(), 472);
        assert!(stream.flush().unwrap().is_empty());
    }

    #[test]
    fn latency_matches_geometry() {
        let stream = identity_stream();
        assert!((stream.latency_ms() - 24.0).abs() < 1e-3);
    }
}

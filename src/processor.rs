//! The streaming denoise engine: input accumulation, the per-frame two-stage
//! model protocol, and overlap-add reconstruction.
//!
//! # Buffering discipline
//!
//! Caller chunks of any length are appended to a flat input buffer. A sliding
//! start offset walks over it in hop-size steps; every position with a full
//! analysis frame available is windowed, transformed, denoised, and
//! overlap-added into the output buffer at the same offset. Once no further
//! frame fits, everything before the final offset is finalized (clipped to
//! the signed 16-bit range) and both buffers are compacted in one move. The
//! output buffer always keeps `frame_size - hop_size` samples of
//! not-yet-final tail, because later frames still add into that region.
//!
//! # Failure semantics
//!
//! A frame either commits completely (both recurrent states, the overlap-add
//! contribution, the frame counter) or not at all. On a model or transform
//! failure the failed frame's input stays buffered and the sliding offset
//! stays put, so the next `process` call retries that exact frame first —
//! the stateful models can never observe a gap in the audio history.

use std::path::PathBuf;

use crate::model::{DenoiseModel, OrtModel};
use crate::transform::SpectralTransform;
use crate::window::Windows;
use crate::{DtlnError, Result, FRAME_SIZE, HOP_SIZE, SAMPLE_RATE};

/// Engine configuration, fixed after init.
///
/// Changing models or geometry requires constructing a new engine; `reset`
/// reuses everything and only clears stream state.
#[derive(Debug, Clone)]
pub struct DtlnConfig {
    /// Path to the frequency-domain (mask estimation) model.
    pub stage_a_model: PathBuf,
    /// Path to the time-domain (refinement) model.
    pub stage_b_model: PathBuf,
    /// Analysis frame size in samples. Must be even and a multiple of `hop_size`.
    pub frame_size: usize,
    /// Hop between consecutive analysis frames, in samples.
    pub hop_size: usize,
    /// Input/output sample rate in Hz.
    pub sample_rate: usize,
    /// Intra-op thread count for the inference sessions.
    pub intra_threads: usize,
}

impl DtlnConfig {
    /// Configuration with the standard DTLN geometry (512/128 @ 16 kHz,
    /// single-threaded inference) and the given model paths.
    pub fn new(stage_a_model: impl Into<PathBuf>, stage_b_model: impl Into<PathBuf>) -> Self {
        Self {
            stage_a_model: stage_a_model.into(),
            stage_b_model: stage_b_model.into(),
            frame_size: FRAME_SIZE,
            hop_size: HOP_SIZE,
            sample_rate: SAMPLE_RATE,
            intra_threads: 1,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.frame_size == 0 || self.frame_size % 2 != 0 {
            return Err(DtlnError::Config(format!(
                "frame size must be positive and even, got {}",
                self.frame_size
            )));
        }
        if self.hop_size == 0 || self.frame_size % self.hop_size != 0 {
            return Err(DtlnError::Config(format!(
                "hop size {} must be positive and divide frame size {}",
                self.hop_size, self.frame_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(DtlnError::Config("sample rate must be positive".into()));
        }
        Ok(())
    }

    fn validate_model_paths(&self) -> Result<()> {
        if self.stage_a_model.as_os_str().is_empty() || self.stage_b_model.as_os_str().is_empty() {
            return Err(DtlnError::Config("both model paths must be non-empty".into()));
        }
        Ok(())
    }
}

/// Streaming two-stage denoise engine over f32 samples in the i16 range.
///
/// One instance per stream; not internally synchronized. See
/// [`DtlnStream`](crate::DtlnStream) for the i16 front end.
pub struct DtlnProcessor {
    config: DtlnConfig,
    windows: Windows,
    transform: SpectralTransform,
    stage_a: Box<dyn DenoiseModel>,
    stage_b: Box<dyn DenoiseModel>,

    /// Recurrent state fed to the frequency-domain model, frame_size long.
    state_a: Vec<f32>,
    /// Recurrent state fed to the time-domain model, frame_size long.
    state_b: Vec<f32>,

    /// Pending raw input samples; only `in_len` of them are valid.
    in_buf: Vec<f32>,
    in_len: usize,
    /// Overlap-add accumulator, same capacity class as the input buffer.
    out_buf: Vec<f32>,
    /// Start offset of the next frame to process. Nonzero between calls only
    /// after a mid-call failure, where it marks the frame to retry.
    pending_start: usize,
    /// Frames processed since the last reset. Diagnostics only.
    frames_processed: u64,

    // Per-frame scratch, allocated once.
    windowed: Vec<f32>,
    re: Vec<f32>,
    im: Vec<f32>,
    mag: Vec<f32>,
    phase: Vec<f32>,
    mask: Vec<f32>,
    time_frame: Vec<f32>,
    refined: Vec<f32>,
    state_a_next: Vec<f32>,
    state_b_next: Vec<f32>,
}

impl DtlnProcessor {
    /// Create an engine, loading both stage models from the configured paths.
    ///
    /// Fails without producing an engine on invalid configuration or if
    /// either model cannot be loaded; anything allocated up to that point is
    /// released on unwind.
    pub fn new(config: DtlnConfig) -> Result<Self> {
        config.validate()?;
        config.validate_model_paths()?;
        let stage_a = OrtModel::load(&config.stage_a_model, config.intra_threads)?;
        let stage_b = OrtModel::load(&config.stage_b_model, config.intra_threads)?;
        Self::with_models(config, Box::new(stage_a), Box::new(stage_b))
    }

    /// Create an engine around two already-constructed stage models.
    ///
    /// This is the seam for substituting inference backends; model paths in
    /// `config` are ignored here.
    pub fn with_models(
        config: DtlnConfig,
        stage_a: Box<dyn DenoiseModel>,
        stage_b: Box<dyn DenoiseModel>,
    ) -> Result<Self> {
        config.validate()?;

        let frame = config.frame_size;
        let bins = frame / 2 + 1;
        let capacity = config.sample_rate + frame;
        let windows = Windows::new(frame, config.hop_size);
        let transform = SpectralTransform::new(frame);

        log::info!(
            "denoise engine ready: frame {}, hop {}, {} Hz, {} spectral bins",
            frame,
            config.hop_size,
            config.sample_rate,
            bins
        );

        Ok(Self {
            windows,
            transform,
            stage_a,
            stage_b,
            state_a: vec![0.0; frame],
            state_b: vec![0.0; frame],
            in_buf: vec![0.0; capacity],
            in_len: 0,
            out_buf: vec![0.0; capacity],
            pending_start: 0,
            frames_processed: 0,
            windowed: vec![0.0; frame],
            re: vec![0.0; bins],
            im: vec![0.0; bins],
            mag: vec![0.0; bins],
            phase: vec![0.0; bins],
            mask: vec![0.0; bins],
            time_frame: vec![0.0; frame],
            refined: vec![0.0; frame],
            state_a_next: vec![0.0; frame],
            state_b_next: vec![0.0; frame],
            config,
        })
    }

    /// Feed a chunk of raw samples and collect all samples that became final.
    ///
    /// Any chunk length is accepted, including empty (which retries a
    /// previously failed frame, if one is pending). Output samples are
    /// clipped to `[-32768, 32767]`. Until a full analysis frame has
    /// accumulated, the returned vector is empty.
    ///
    /// On error the engine state is exactly what the last successful frame
    /// left behind; calling `process` again (with more input or an empty
    /// chunk) resumes at the failed frame.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let free = self.in_buf.len() - self.in_len;
        if input.len() > free {
            return Err(DtlnError::ChunkTooLarge { len: input.len(), free });
        }
        self.in_buf[self.in_len..self.in_len + input.len()].copy_from_slice(input);
        self.in_len += input.len();

        while self.pending_start + self.config.frame_size <= self.in_len {
            if let Err(e) = self.process_frame(self.pending_start) {
                log::warn!(
                    "frame {} failed, input retained for retry: {}",
                    self.frames_processed,
                    e
                );
                return Err(e);
            }
            self.pending_start += self.config.hop_size;
        }

        let sta = self.pending_start;
        if sta == 0 {
            return Ok(Vec::new());
        }

        let mut finalized = Vec::with_capacity(sta);
        finalized.extend(
            self.out_buf[..sta]
                .iter()
                .map(|&x| x.clamp(i16::MIN as f32, i16::MAX as f32)),
        );

        // Compact both buffers in one move. The output keeps its unfinalized
        // overlap tail; everything behind it is zeroed for future additions.
        let overlap = self.config.frame_size - self.config.hop_size;
        self.out_buf.copy_within(sta..sta + overlap, 0);
        self.out_buf[overlap..].fill(0.0);
        self.in_buf.copy_within(sta..self.in_len, 0);
        self.in_len -= sta;
        self.pending_start = 0;

        Ok(finalized)
    }

    /// Run one analysis frame starting at `sta` through both stages.
    ///
    /// Nothing persistent is touched until every step has succeeded; the
    /// commit at the end is the only place recurrent state, the overlap-add
    /// accumulator, and the frame counter change.
    fn process_frame(&mut self, sta: usize) -> Result<()> {
        let frame = self.config.frame_size;
        let bins = frame / 2 + 1;

        for i in 0..frame {
            self.windowed[i] = self.in_buf[sta + i] * self.windows.analysis[i];
        }

        self.transform.forward(&self.windowed, &mut self.re, &mut self.im)?;

        for k in 0..bins {
            self.mag[k] = (self.re[k] * self.re[k] + self.im[k] * self.im[k]).sqrt();
            self.phase[k] = self.im[k].atan2(self.re[k]);
        }

        // Stage A: spectral gain mask from magnitude + recurrent state.
        self.stage_a
            .invoke(&self.mag, &self.state_a, &mut self.mask, &mut self.state_a_next)?;

        for k in 0..bins {
            let gained = self.mag[k] * self.mask[k];
            self.re[k] = gained * self.phase[k].cos();
            self.im[k] = gained * self.phase[k].sin();
        }

        self.transform.inverse(&self.re, &self.im, &mut self.time_frame)?;

        // Stage B: time-domain refinement of the masked frame.
        self.stage_b.invoke(
            &self.time_frame,
            &self.state_b,
            &mut self.refined,
            &mut self.state_b_next,
        )?;

        self.state_a.copy_from_slice(&self.state_a_next);
        self.state_b.copy_from_slice(&self.state_b_next);
        for i in 0..frame {
            self.out_buf[sta + i] += self.refined[i] * self.windows.synthesis[i];
        }
        self.frames_processed += 1;
        Ok(())
    }

    /// Prepare the engine for a new independent stream.
    ///
    /// Clears both ring buffers and both recurrent states, recomputes the
    /// windows, and zeroes the frame counter. Models stay loaded.
    pub fn reset(&mut self) {
        self.windows = Windows::new(self.config.frame_size, self.config.hop_size);
        self.in_buf.fill(0.0);
        self.out_buf.fill(0.0);
        self.state_a.fill(0.0);
        self.state_b.fill(0.0);
        self.in_len = 0;
        self.pending_start = 0;
        self.frames_processed = 0;
        log::debug!("denoise engine reset");
    }

    /// Drop buffered input and unfinalized output without touching the
    /// recurrent model state. Used when a stream ends mid-frame.
    pub fn discard_pending(&mut self) {
        self.in_buf[..self.in_len].fill(0.0);
        self.out_buf.fill(0.0);
        self.in_len = 0;
        self.pending_start = 0;
    }

    /// Frames processed since the last reset.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Raw input samples buffered but not yet consumed into a frame.
    pub fn buffered_input(&self) -> usize {
        self.in_len - self.pending_start
    }

    pub fn config(&self) -> &DtlnConfig {
        &self.config
    }
}

//! Adapter around the real-FFT primitive.
//!
//! The FFT crate works in packed complex bins; the denoise stages work on
//! explicit real/imaginary arrays. This adapter owns the forward and inverse
//! plans plus their scratch memory, converts between the two layouts, forces
//! the DC and Nyquist bins to be purely real, and undoes the forward
//! transform's implicit scaling (a factor of the frame size) after the
//! inverse. No heap allocation per frame.

use std::sync::Arc;

use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::Result;

/// Forward/inverse real FFT for one fixed frame size.
pub struct SpectralTransform {
    frame_size: usize,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    /// Forward input scratch; the plan consumes its input buffer.
    time_buf: Vec<f32>,
    /// Packed spectrum scratch shared by both directions.
    spectrum: Vec<Complex32>,
    fwd_scratch: Vec<Complex32>,
    inv_scratch: Vec<Complex32>,
}

impl SpectralTransform {
    pub fn new(frame_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(frame_size);
        let fft_inverse = planner.plan_fft_inverse(frame_size);
        let fwd_scratch = fft_forward.make_scratch_vec();
        let inv_scratch = fft_inverse.make_scratch_vec();

        Self {
            frame_size,
            fft_forward,
            fft_inverse,
            time_buf: vec![0.0; frame_size],
            spectrum: vec![Complex32::new(0.0, 0.0); frame_size / 2 + 1],
            fwd_scratch,
            inv_scratch,
        }
    }

    /// Number of spectral bins produced by [`forward`](Self::forward):
    /// `frame_size / 2 + 1`.
    pub fn spectrum_size(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Transform a windowed time-domain frame into explicit real/imaginary
    /// bin arrays.
    ///
    /// `frame` must hold `frame_size` samples; `re` and `im` must each hold
    /// [`spectrum_size`](Self::spectrum_size) bins. The DC and Nyquist bins
    /// are forced to be purely real.
    pub fn forward(&mut self, frame: &[f32], re: &mut [f32], im: &mut [f32]) -> Result<()> {
        debug_assert_eq!(frame.len(), self.frame_size);
        debug_assert_eq!(re.len(), self.spectrum_size());
        debug_assert_eq!(im.len(), self.spectrum_size());

        self.time_buf.copy_from_slice(frame);
        self.fft_forward
            .process_with_scratch(&mut self.time_buf, &mut self.spectrum, &mut self.fwd_scratch)?;

        for (k, c) in self.spectrum.iter().enumerate() {
            re[k] = c.re;
            im[k] = c.im;
        }
        let nyquist = self.spectrum_size() - 1;
        im[0] = 0.0;
        im[nyquist] = 0.0;
        Ok(())
    }

    /// Transform an edited spectrum back to a time-domain frame, scaled by
    /// `1 / frame_size` so a forward/inverse round trip has unit gain.
    pub fn inverse(&mut self, re: &[f32], im: &[f32], frame: &mut [f32]) -> Result<()> {
        debug_assert_eq!(re.len(), self.spectrum_size());
        debug_assert_eq!(im.len(), self.spectrum_size());
        debug_assert_eq!(frame.len(), self.frame_size);

        let nyquist = self.spectrum_size() - 1;
        for (k, c) in self.spectrum.iter_mut().enumerate() {
            *c = Complex32::new(re[k], im[k]);
        }
        // The inverse plan requires purely real DC/Nyquist bins.
        self.spectrum[0].im = 0.0;
        self.spectrum[nyquist].im = 0.0;

        self.fft_inverse
            .process_with_scratch(&mut self.spectrum, frame, &mut self.inv_scratch)?;

        let scale = 1.0 / self.frame_size as f32;
        for x in frame.iter_mut() {
            *x *= scale;
        }
        Ok(())
    }
}

//! Analysis/synthesis window construction with the constant-overlap-add
//! (COLA) unity-gain constraint.
//!
//! The analysis window is a raised cosine. The synthesis window is derived
//! from it: square the analysis window, sum the squares over all hop-shifted
//! blocks that cover a given sample offset, invert that sum, and multiply it
//! back into the analysis window. Overlap-adding frames that went through
//! analysis-window → transform → inverse-transform → synthesis-window then
//! reconstructs every output sample with a net gain of exactly one.

/// Analysis and synthesis windows for one frame-size/hop-size configuration.
///
/// Construction is deterministic: the same `(frame_size, hop_size)` pair
/// always yields identical windows, so recomputing on reset is idempotent.
pub struct Windows {
    /// Raised-cosine analysis window, `frame_size` coefficients.
    pub analysis: Vec<f32>,
    /// Normalized synthesis window, `frame_size` coefficients.
    pub synthesis: Vec<f32>,
}

impl Windows {
    /// Build windows for the given frame and hop size.
    ///
    /// `frame_size` must be a positive multiple of `hop_size`; the caller
    /// (engine init) validates this before construction.
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        debug_assert!(hop_size > 0 && frame_size % hop_size == 0);

        let analysis: Vec<f32> = (0..frame_size)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / (frame_size - 1) as f64;
                (0.54 - 0.46 * phase.cos()) as f32
            })
            .collect();

        // The overlap-add gain at output sample p is the sum of a[i]*s[i]
        // over all window positions i that land on p, and those positions are
        // exactly {off, off+H, off+2H, ...} for off = p mod H. The
        // normalization term is therefore periodic in the hop size: compute
        // it once per offset in 0..H and replicate.
        let blocks = frame_size / hop_size;
        let mut synthesis = vec![0.0f32; frame_size];
        for off in 0..hop_size {
            let denom: f32 = (0..blocks)
                .map(|j| {
                    let a = analysis[off + j * hop_size];
                    a * a
                })
                .sum();
            let norm = 1.0 / denom;
            for j in 0..blocks {
                let i = off + j * hop_size;
                synthesis[i] = norm * analysis[i];
            }
        }

        Self { analysis, synthesis }
    }
}

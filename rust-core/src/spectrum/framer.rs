//! Windowed framing and weighted overlap-add resynthesis
//!
//! Blocks are shaped (batch, channels, time). Every lane is cut into frames of
//! `analysis_size` samples at stride `hop_size`, windowed and transformed.
//! Resynthesis windows each inverse frame again and accumulates. Fully
//! overlapped samples are divided by their summed squared window, so an
//! untouched spectrum comes back unchanged there; samples near the block
//! edges are divided by the steady-state weight and fade out with the window.

use super::fft::FftEngine;
use super::windowing::{generate_window, normalization_weights, WindowType};
use crate::error::CompressorError;
use ndarray::{s, Array3, ArrayView1, ArrayView3};
use num_complex::Complex;

/// Floor applied to the overlap-add normalisation weight
pub const OLA_NORM_FLOOR: f64 = 1e-3;

/// One analysed frame across every (batch, channel) lane
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame number, counting from 0 at the start of the block
    pub index: usize,

    /// Offset of the first sample of the frame
    pub start: usize,

    /// One-sided spectrum, shaped (batch, channels, bins)
    pub spectrum: Array3<Complex<f64>>,
}

/// Splits blocks into windowed spectra and reassembles them
pub struct Framer {
    analysis_size: usize,
    hop_size: usize,
    window: Vec<f64>,
    engine: FftEngine,
    frame_buffer: Vec<f64>,
}

impl Framer {
    /// Create a framer
    ///
    /// `hop_size` must already be validated: non-zero, at most `analysis_size`.
    pub fn new(analysis_size: usize, hop_size: usize, window_type: WindowType) -> Self {
        Self {
            analysis_size,
            hop_size,
            window: generate_window(window_type, analysis_size),
            engine: FftEngine::new(analysis_size),
            frame_buffer: vec![0.0; analysis_size],
        }
    }

    pub fn analysis_size(&self) -> usize {
        self.analysis_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of spectrum bins per frame (N/2 + 1)
    pub fn num_bins(&self) -> usize {
        self.engine.num_bins()
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Trailing zeros needed to make `len` a multiple of the hop
    pub fn padding(&self, len: usize) -> usize {
        (self.hop_size - len % self.hop_size) % self.hop_size
    }

    /// Number of full frames that fit in a block of `len` samples once padded
    pub fn frame_count(&self, len: usize) -> usize {
        let padded = len + self.padding(len);
        if padded < self.analysis_size {
            0
        } else {
            (padded - self.analysis_size) / self.hop_size + 1
        }
    }

    /// Window and transform every frame of a block, in time order
    ///
    /// Samples past the end of the block read as zero (the trailing pad).
    pub fn analyze(&mut self, block: ArrayView3<f64>) -> Result<Vec<Frame>, CompressorError> {
        let (batch, channels, len) = block.dim();
        if len == 0 || batch == 0 || channels == 0 {
            return Ok(Vec::new());
        }

        let count = self.frame_count(len);
        let bins = self.num_bins();
        let mut frames = Vec::with_capacity(count);

        for index in 0..count {
            let start = index * self.hop_size;
            let mut spectrum = Array3::zeros((batch, channels, bins));

            for b in 0..batch {
                for c in 0..channels {
                    let lane = block.slice(s![b, c, ..]);
                    for (n, slot) in self.frame_buffer.iter_mut().enumerate() {
                        let pos = start + n;
                        let sample = if pos < len { lane[pos] } else { 0.0 };
                        *slot = sample * self.window[n];
                    }

                    let transformed = self.engine.forward(&self.frame_buffer)?;
                    spectrum
                        .slice_mut(s![b, c, ..])
                        .assign(&ArrayView1::from(transformed));
                }
            }

            frames.push(Frame {
                index,
                start,
                spectrum,
            });
        }

        Ok(frames)
    }

    /// Inverse-transform, window and overlap-add frames into a block
    ///
    /// # Arguments
    /// * `frames` - Frames as produced by [`Framer::analyze`] (spectra may be modified)
    /// * `shape` - (batch, channels, time) of the block the frames came from
    pub fn synthesize(
        &mut self,
        frames: &[Frame],
        shape: (usize, usize, usize),
    ) -> Result<Array3<f64>, CompressorError> {
        let (batch, channels, len) = shape;
        if len == 0 || batch == 0 || channels == 0 {
            return Ok(Array3::zeros(shape));
        }

        let padded = len + self.padding(len);
        let mut accum = Array3::<f64>::zeros((batch, channels, padded));

        for frame in frames {
            let end = frame.start + self.analysis_size;
            debug_assert!(end <= padded, "frame {} overruns the padded block", frame.index);
            debug_assert_eq!(frame.spectrum.dim(), (batch, channels, self.num_bins()));

            for b in 0..batch {
                for c in 0..channels {
                    let time = self.engine.inverse(frame.spectrum.slice(s![b, c, ..]))?;
                    let mut target = accum.slice_mut(s![b, c, frame.start..end]);
                    for ((out, &x), &w) in target.iter_mut().zip(time).zip(&self.window) {
                        *out += x * w;
                    }
                }
            }
        }

        let weights = normalization_weights(&self.window, self.hop_size, padded);
        for mut lane in accum.lanes_mut(ndarray::Axis(2)) {
            for (sample, &weight) in lane.iter_mut().zip(&weights) {
                *sample /= weight.max(OLA_NORM_FLOOR);
            }
        }

        Ok(accum.slice(s![.., .., ..len]).to_owned())
    }
}

//! FFT engine using realfft for real-valued signals
//!
//! Forward and inverse one-sided transforms with reusable buffers

use crate::error::CompressorError;
use num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Real FFT engine (forward and inverse) for a fixed transform size
pub struct FftEngine {
    /// FFT size (number of samples)
    fft_size: usize,

    /// Forward real-to-complex plan
    r2c: Arc<dyn RealToComplex<f64>>,

    /// Inverse complex-to-real plan
    c2r: Arc<dyn ComplexToReal<f64>>,

    /// Reusable time-domain buffer
    time_buffer: Vec<f64>,

    /// Reusable spectrum buffer (fft_size/2 + 1 bins)
    spectrum_buffer: Vec<Complex<f64>>,

    forward_scratch: Vec<Complex<f64>>,
    inverse_scratch: Vec<Complex<f64>>,
}

impl FftEngine {
    /// Create new FFT engine
    ///
    /// # Arguments
    /// * `fft_size` - FFT size (number of samples)
    pub fn new(fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let c2r = planner.plan_fft_inverse(fft_size);

        let forward_scratch = r2c.make_scratch_vec();
        let inverse_scratch = c2r.make_scratch_vec();

        Self {
            fft_size,
            r2c,
            c2r,
            time_buffer: vec![0.0; fft_size],
            spectrum_buffer: vec![Complex::new(0.0, 0.0); fft_size / 2 + 1],
            forward_scratch,
            inverse_scratch,
        }
    }

    /// Compute the one-sided spectrum of a real signal
    ///
    /// # Arguments
    /// * `signal` - Input signal (zero-padded if shorter than fft_size, truncated if longer)
    ///
    /// # Returns
    /// Complex bins X[k] for k = 0..fft_size/2
    pub fn forward(&mut self, signal: &[f64]) -> Result<&[Complex<f64>], CompressorError> {
        let copy_len = signal.len().min(self.fft_size);
        self.time_buffer[..copy_len].copy_from_slice(&signal[..copy_len]);
        self.time_buffer[copy_len..].fill(0.0);

        self.r2c
            .process_with_scratch(
                &mut self.time_buffer,
                &mut self.spectrum_buffer,
                &mut self.forward_scratch,
            )
            .map_err(|e| CompressorError::Transform(e.to_string()))?;

        Ok(&self.spectrum_buffer)
    }

    /// Inverse transform back to a real signal, scaled by 1/N
    ///
    /// The DC and Nyquist bins of a real signal are purely real; their
    /// imaginary parts are discarded before the transform.
    pub fn inverse<'a, I>(&mut self, bins: I) -> Result<&[f64], CompressorError>
    where
        I: IntoIterator<Item = &'a Complex<f64>>,
    {
        let mut count = 0;
        for (slot, bin) in self.spectrum_buffer.iter_mut().zip(bins) {
            *slot = *bin;
            count += 1;
        }
        if count != self.spectrum_buffer.len() {
            return Err(CompressorError::Transform(format!(
                "expected {} bins, got {}",
                self.spectrum_buffer.len(),
                count
            )));
        }

        let last = self.spectrum_buffer.len() - 1;
        self.spectrum_buffer[0].im = 0.0;
        self.spectrum_buffer[last].im = 0.0;

        self.c2r
            .process_with_scratch(
                &mut self.spectrum_buffer,
                &mut self.time_buffer,
                &mut self.inverse_scratch,
            )
            .map_err(|e| CompressorError::Transform(e.to_string()))?;

        let scale = 1.0 / self.fft_size as f64;
        for sample in self.time_buffer.iter_mut() {
            *sample *= scale;
        }

        Ok(&self.time_buffer)
    }

    /// Get FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Get number of frequency bins (fft_size/2 + 1 for real FFT)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Centre frequency of a bin in Hz
    pub fn bin_frequency_hz(&self, bin: usize, sample_rate: f64) -> f64 {
        bin as f64 * sample_rate / self.fft_size as f64
    }
}

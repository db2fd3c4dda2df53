//! Lightweight summary of published blocks for consumers
//!
//! Reports the RMS level of a block and the strongest frequency in its first
//! 1024 samples, enough for a meter or a text readout.

use crate::error::CompressorError;
use crate::spectrum::FftEngine;
use ndarray::{s, ArrayBase, Data, Ix3};

/// FFT size used for the peak-frequency estimate
pub const MONITOR_FFT_SIZE: usize = 1024;

/// Level summary of one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStats {
    /// RMS over every sample of the block
    pub rms: f64,

    /// Strongest frequency of batch 0 / channel 0, if the block holds at
    /// least [`MONITOR_FFT_SIZE`] samples
    pub peak_hz: Option<f64>,
}

/// Measures blocks as they come off the queue
pub struct BlockMonitor {
    engine: FftEngine,
    sample_rate: f64,
}

impl BlockMonitor {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            engine: FftEngine::new(MONITOR_FFT_SIZE),
            sample_rate,
        }
    }

    pub fn measure<S>(&mut self, block: &ArrayBase<S, Ix3>) -> Result<BlockStats, CompressorError>
    where
        S: Data<Elem = f64>,
    {
        let count = block.len();
        let rms = if count == 0 {
            0.0
        } else {
            (block.iter().map(|x| x * x).sum::<f64>() / count as f64).sqrt()
        };

        let (batch, channels, len) = block.dim();
        if batch == 0 || channels == 0 || len < MONITOR_FFT_SIZE {
            return Ok(BlockStats { rms, peak_hz: None });
        }

        let head: Vec<f64> = block.slice(s![0, 0, ..MONITOR_FFT_SIZE]).to_vec();
        let spectrum = self.engine.forward(&head)?;

        let peak_bin = spectrum
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (bin, value)| {
                let magnitude = value.norm();
                if magnitude > best.1 {
                    (bin, magnitude)
                } else {
                    best
                }
            })
            .0;

        Ok(BlockStats {
            rms,
            peak_hz: Some(self.engine.bin_frequency_hz(peak_bin, self.sample_rate)),
        })
    }
}

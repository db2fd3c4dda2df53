//! Block processors the streaming harness can run
//!
//! Anything that turns a (batch, channels, time) block into another block can
//! be installed in the harness: the compressor itself, a compressor shared
//! with a control thread, or a plain closure.

use crate::dynamics::{db_to_amplitude, BandCompressor};
use crate::error::{CompressorError, ProcessError};
use ndarray::Array3;
use parking_lot::Mutex;
use std::sync::Arc;

/// A compressor that can be tweaked from one thread while another processes
pub type SharedCompressor = Arc<Mutex<BandCompressor>>;

/// Per-block processing callback
pub trait BlockProcessor: Send {
    /// Process one block; the returned block is published as-is
    fn process_block(&mut self, block: Array3<f64>) -> Result<Array3<f64>, ProcessError>;
}

impl BlockProcessor for BandCompressor {
    fn process_block(&mut self, block: Array3<f64>) -> Result<Array3<f64>, ProcessError> {
        Ok(self.process(&block)?)
    }
}

/// Processors behind a mutex are locked for the duration of one block, so a
/// parameter change never lands halfway through a block
impl<P: BlockProcessor> BlockProcessor for Arc<Mutex<P>> {
    fn process_block(&mut self, block: Array3<f64>) -> Result<Array3<f64>, ProcessError> {
        self.lock().process_block(block)
    }
}

/// Adapter turning a closure into a [`BlockProcessor`]
pub struct FnProcessor<F>(F);

impl<F> FnProcessor<F>
where
    F: FnMut(Array3<f64>) -> Result<Array3<f64>, ProcessError> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> BlockProcessor for FnProcessor<F>
where
    F: FnMut(Array3<f64>) -> Result<Array3<f64>, ProcessError> + Send,
{
    fn process_block(&mut self, block: Array3<f64>) -> Result<Array3<f64>, ProcessError> {
        (self.0)(block)
    }
}

/// Shared compressor followed by a fixed output gain
pub struct CompressorProcessor {
    compressor: SharedCompressor,
    output_gain: f64,
}

impl CompressorProcessor {
    /// # Arguments
    /// * `compressor` - Compressor handle; clones of it may keep adjusting bands
    /// * `output_gain_db` - Gain applied to every output sample, in dB
    pub fn new(compressor: SharedCompressor, output_gain_db: f64) -> Result<Self, CompressorError> {
        if !output_gain_db.is_finite() {
            return Err(CompressorError::InvalidParameter {
                name: "output_gain_db",
                value: output_gain_db,
            });
        }

        Ok(Self {
            compressor,
            output_gain: db_to_amplitude(output_gain_db),
        })
    }

    pub fn compressor(&self) -> &SharedCompressor {
        &self.compressor
    }

    /// Output gain as a linear factor
    pub fn output_gain(&self) -> f64 {
        self.output_gain
    }
}

impl BlockProcessor for CompressorProcessor {
    fn process_block(&mut self, block: Array3<f64>) -> Result<Array3<f64>, ProcessError> {
        let mut output = self.compressor.lock().process(&block)?;
        if self.output_gain != 1.0 {
            let gain = self.output_gain;
            output.mapv_inplace(|x| x * gain);
        }
        Ok(output)
    }
}

//! Python bindings for the streaming harness

use super::compressor_bindings::PyBandCompressor;
use crate::stream::{BlockMonitor, CompressorProcessor, HarnessConfig, StreamingHarness};
use numpy::{IntoPyArray, PyArray3};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::sync::Arc;
use std::time::Duration;

fn seconds(value: f64, name: &str) -> PyResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| PyValueError::new_err(format!("{} must be a non-negative number of seconds", name)))
}

/// Real-time harness looping a three-tone test signal
///
/// All processing happens in a Rust thread; Python only reads finished blocks.
#[pyclass(name = "StreamingHarness", unsendable)]
pub struct PyStreamingHarness {
    harness: StreamingHarness,
    monitor: BlockMonitor,
}

#[pymethods]
impl PyStreamingHarness {
    #[new]
    #[pyo3(signature = (sample_rate=44100.0, block_size=4096, queue_capacity=32, stop_timeout=1.0))]
    fn new(sample_rate: f64, block_size: usize, queue_capacity: usize, stop_timeout: f64) -> PyResult<Self> {
        let config = HarnessConfig {
            sample_rate,
            block_size,
            queue_capacity,
            stop_timeout: seconds(stop_timeout, "stop_timeout")?,
        };

        Ok(Self {
            harness: StreamingHarness::with_test_tone(config)?,
            monitor: BlockMonitor::new(sample_rate),
        })
    }

    /// Start streaming
    ///
    /// Returns:
    ///     True if a producer thread was launched, False if already running
    fn start(&mut self) -> PyResult<bool> {
        Ok(self.harness.start()?)
    }

    /// Stop streaming and discard queued blocks
    fn stop(&mut self) -> PyResult<()> {
        Ok(self.harness.stop()?)
    }

    /// Route blocks through a compressor
    ///
    /// The compressor stays shared: band changes made on it from Python apply
    /// from the next block.
    #[pyo3(signature = (compressor, output_gain_db=0.0))]
    fn set_compressor(&self, compressor: PyRef<'_, PyBandCompressor>, output_gain_db: f64) -> PyResult<()> {
        let processor = CompressorProcessor::new(Arc::clone(&compressor.compressor), output_gain_db)?;
        self.harness.set_processor(processor);
        Ok(())
    }

    /// Pass blocks through unchanged
    fn clear_processor(&self) {
        self.harness.clear_processor();
    }

    /// Next (1, channels, block_size) block, or None after `timeout` seconds
    #[pyo3(signature = (timeout=1.0))]
    fn read_next<'py>(&self, py: Python<'py>, timeout: f64) -> PyResult<Option<&'py PyArray3<f64>>> {
        let timeout = seconds(timeout, "timeout")?;
        Ok(self.harness.read_next(timeout).map(|block| block.into_pyarray(py)))
    }

    /// Next block together with its level summary
    ///
    /// Returns:
    ///     Dictionary with keys 'block', 'rms' and 'peak_hz', or None on timeout
    #[pyo3(signature = (timeout=1.0))]
    fn read_stats(&mut self, py: Python<'_>, timeout: f64) -> PyResult<Option<PyObject>> {
        let timeout = seconds(timeout, "timeout")?;
        let Some(block) = self.harness.read_next(timeout) else {
            return Ok(None);
        };

        let stats = self.monitor.measure(&block)?;

        let dict = PyDict::new(py);
        dict.set_item("block", block.into_pyarray(py))?;
        dict.set_item("rms", stats.rms)?;
        dict.set_item("peak_hz", stats.peak_hz)?;

        Ok(Some(dict.into()))
    }

    #[getter]
    fn is_streaming(&self) -> bool {
        self.harness.is_streaming()
    }

    #[getter]
    fn pending_blocks(&self) -> usize {
        self.harness.pending_blocks()
    }

    /// Message of the failure that ended the last run, if any
    #[getter]
    fn last_error(&self) -> Option<String> {
        self.harness.last_error().map(|err| err.to_string())
    }
}

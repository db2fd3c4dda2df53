//! Python bindings for the per-bin compressor

use crate::dynamics::{BandCompressor, BandUpdate, CompressorConfig};
use crate::spectrum::WindowType;
use crate::stream::SharedCompressor;
use numpy::{IntoPyArray, PyArray1, PyArray3, PyReadonlyArray3};
use parking_lot::Mutex;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::sync::Arc;

/// FFT multi-band compressor exposed to Python
///
/// Each of the 2049 bins of a 4096-point FFT is a band with its own
/// threshold, ratio, knee and makeup gain.
#[pyclass(name = "BandCompressor")]
pub struct PyBandCompressor {
    pub(crate) compressor: SharedCompressor,
}

fn band_update(
    threshold_db: Option<f64>,
    ratio: Option<f64>,
    makeup_gain_db: Option<f64>,
    knee_width_db: Option<f64>,
) -> BandUpdate {
    BandUpdate {
        threshold_db,
        ratio,
        makeup_gain_db,
        knee_width_db,
    }
}

#[pymethods]
impl PyBandCompressor {
    /// Create a new compressor
    ///
    /// Args:
    ///     sample_rate: Sample rate in Hz
    ///     hop_size: Samples between frames (must divide 4096)
    ///     threshold_db, ratio, attack_ms, release_ms, makeup_gain_db,
    ///     knee_width_db: Defaults applied to every band
    ///     window: "hann", "hamming", "blackman" or "rectangular"
    #[new]
    #[pyo3(signature = (
        sample_rate=44100.0,
        hop_size=1024,
        threshold_db=-20.0,
        ratio=4.0,
        attack_ms=10.0,
        release_ms=100.0,
        makeup_gain_db=0.0,
        knee_width_db=0.0,
        window="hann"
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        sample_rate: f64,
        hop_size: usize,
        threshold_db: f64,
        ratio: f64,
        attack_ms: f64,
        release_ms: f64,
        makeup_gain_db: f64,
        knee_width_db: f64,
        window: &str,
    ) -> PyResult<Self> {
        let window_type = WindowType::from_name(window)
            .ok_or_else(|| PyValueError::new_err(format!("Unknown window type: {}", window)))?;

        let compressor = BandCompressor::new(CompressorConfig {
            sample_rate,
            hop_size,
            window_type,
            threshold_db,
            ratio,
            attack_ms,
            release_ms,
            makeup_gain_db,
            knee_width_db,
            ..Default::default()
        })?;

        Ok(Self {
            compressor: Arc::new(Mutex::new(compressor)),
        })
    }

    /// Compress a (batch, channels, time) float64 array
    fn process<'py>(&self, py: Python<'py>, audio: PyReadonlyArray3<f64>) -> PyResult<&'py PyArray3<f64>> {
        let output = self.compressor.lock().process(&audio.as_array())?;
        Ok(output.into_pyarray(py))
    }

    /// Compress and return first-frame intermediates for plotting
    ///
    /// Returns:
    ///     Dictionary with keys 'fft_bands', 'gain_curve_db', 'compressed_fft'
    ///     (None if the block is shorter than one frame) and
    ///     'reconstructed_audio'
    fn process_with_intermediates(&self, py: Python<'_>, audio: PyReadonlyArray3<f64>) -> PyResult<PyObject> {
        let report = self
            .compressor
            .lock()
            .process_with_intermediates(&audio.as_array())?;

        let dict = PyDict::new(py);
        match report.first_frame {
            Some(frame) => {
                dict.set_item("fft_bands", frame.magnitude.into_pyarray(py))?;
                dict.set_item("gain_curve_db", frame.gain_reduction_db.into_pyarray(py))?;
                dict.set_item("compressed_fft", frame.compressed_spectrum.into_pyarray(py))?;
            }
            None => {
                dict.set_item("fft_bands", py.None())?;
                dict.set_item("gain_curve_db", py.None())?;
                dict.set_item("compressed_fft", py.None())?;
            }
        }
        dict.set_item("reconstructed_audio", report.output.into_pyarray(py))?;

        Ok(dict.into())
    }

    /// Update one band; omitted parameters keep their value
    #[pyo3(signature = (bin, threshold_db=None, ratio=None, makeup_gain_db=None, knee_width_db=None))]
    fn set_band_parameters(
        &self,
        bin: usize,
        threshold_db: Option<f64>,
        ratio: Option<f64>,
        makeup_gain_db: Option<f64>,
        knee_width_db: Option<f64>,
    ) -> PyResult<()> {
        let update = band_update(threshold_db, ratio, makeup_gain_db, knee_width_db);
        self.compressor.lock().set_band_parameters(bin, update)?;
        Ok(())
    }

    /// Update every band centred in [low_hz, high_hz)
    ///
    /// Returns:
    ///     Number of bands changed
    #[pyo3(signature = (low_hz, high_hz, threshold_db=None, ratio=None, makeup_gain_db=None, knee_width_db=None))]
    #[allow(clippy::too_many_arguments)]
    fn set_range_parameters(
        &self,
        low_hz: f64,
        high_hz: f64,
        threshold_db: Option<f64>,
        ratio: Option<f64>,
        makeup_gain_db: Option<f64>,
        knee_width_db: Option<f64>,
    ) -> PyResult<usize> {
        let update = band_update(threshold_db, ratio, makeup_gain_db, knee_width_db);
        Ok(self.compressor.lock().set_range_parameters(low_hz, high_hz, update)?)
    }

    /// Current settings of one band as a dictionary
    fn get_band_parameters(&self, py: Python<'_>, bin: usize) -> PyResult<PyObject> {
        let band = self.compressor.lock().band(bin)?;

        let dict = PyDict::new(py);
        dict.set_item("threshold_db", band.threshold_db)?;
        dict.set_item("ratio", band.ratio)?;
        dict.set_item("makeup_gain_db", band.makeup_gain_db)?;
        dict.set_item("knee_width_db", band.knee_width_db)?;

        Ok(dict.into())
    }

    /// (low_hz, high_hz) span of a bin
    fn get_frequency_range(&self, bin: usize) -> PyResult<(f64, f64)> {
        Ok(self.compressor.lock().get_frequency_range(bin)?)
    }

    /// Centre frequency of every bin in Hz
    fn bin_frequencies<'py>(&self, py: Python<'py>) -> &'py PyArray1<f64> {
        self.compressor.lock().bin_frequencies().into_pyarray(py)
    }

    /// Forget envelope state
    fn reset(&self) {
        self.compressor.lock().reset();
    }

    #[getter]
    fn num_bands(&self) -> usize {
        self.compressor.lock().num_bins()
    }

    #[getter]
    fn sample_rate(&self) -> f64 {
        self.compressor.lock().sample_rate()
    }
}

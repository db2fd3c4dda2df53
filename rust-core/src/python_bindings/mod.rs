//! PyO3 bindings for Python integration

use crate::error::{CompressorError, StreamError};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

mod compressor_bindings;
mod stream_bindings;

impl From<CompressorError> for PyErr {
    fn from(err: CompressorError) -> Self {
        match err {
            CompressorError::Transform(_) => PyRuntimeError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

impl From<StreamError> for PyErr {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::InvalidConfig(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

/// Python module definition
#[pymodule]
fn spectral_compressor(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<compressor_bindings::PyBandCompressor>()?;
    m.add_class::<stream_bindings::PyStreamingHarness>()?;

    m.add("ANALYSIS_SIZE", crate::ANALYSIS_SIZE)?;

    Ok(())
}

//! Spectral Compressor - FFT Multi-Band Dynamics Core
//!
//! Per-bin compression of (batch, channels, time) blocks through a 4096-point
//! STFT, plus a real-time streaming harness with optional Python bindings.

// Suppress PyO3 non-local impl warnings (harmless macro-generated code)
#![cfg_attr(feature = "python", allow(non_local_definitions))]

pub mod dynamics;
pub mod error;
pub mod spectrum;
pub mod stream;

#[cfg(feature = "python")]
pub mod python_bindings;

pub use dynamics::{BandCompressor, BandSettings, BandUpdate, CompressorConfig, ProcessReport, ANALYSIS_SIZE};
pub use error::{CompressorError, ProcessError, StreamError};
pub use spectrum::WindowType;
pub use stream::{BlockProcessor, HarnessConfig, LoopingSource, StreamState, StreamingHarness};

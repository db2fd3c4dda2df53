//! Per-bin dynamics: static curve, envelope follower, and the compressor

pub mod compressor;
pub mod curve;
pub mod envelope;
pub mod params;

pub use compressor::{BandCompressor, CompressorConfig, FrameSnapshot, ProcessReport, ANALYSIS_SIZE};
pub use curve::{amplitude_to_db, db_to_amplitude, gain_reduction_db};
pub use envelope::{EnvelopeFollower, EnvelopeState};
pub use params::{BandParameters, BandSettings, BandUpdate};

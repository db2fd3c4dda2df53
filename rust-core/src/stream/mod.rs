//! Real-time streaming around the compressor
//!
//! A producer thread pulls blocks from a [`BlockSource`], runs them through a
//! [`BlockProcessor`] and publishes the results to a bounded queue.

pub mod harness;
pub mod monitor;
pub mod processor;
pub mod source;

pub use harness::{HarnessConfig, StreamState, StreamingHarness};
pub use monitor::{BlockMonitor, BlockStats, MONITOR_FFT_SIZE};
pub use processor::{BlockProcessor, CompressorProcessor, FnProcessor, SharedCompressor};
pub use source::{BlockSource, LoopingSource};

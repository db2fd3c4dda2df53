//! Integration tests for the streaming harness with a compressor installed.

use ndarray::Array3;
use parking_lot::Mutex;
use spectral_compressor::stream::{BlockMonitor, CompressorProcessor, FnProcessor, SharedCompressor};
use spectral_compressor::{
    BandCompressor, BandUpdate, CompressorConfig, HarnessConfig, StreamError, StreamState, StreamingHarness,
};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> HarnessConfig {
    HarnessConfig {
        block_size: 4096,
        queue_capacity: 4,
        ..Default::default()
    }
}

fn shared_compressor(config: CompressorConfig) -> SharedCompressor {
    Arc::new(Mutex::new(BandCompressor::new(config).unwrap()))
}

#[test]
fn lifecycle_start_stop() {
    init_tracing();
    let mut harness = StreamingHarness::with_test_tone(fast_config()).unwrap();

    assert!(harness.start().unwrap());
    assert!(!harness.start().unwrap(), "second start must not launch a thread");
    assert_eq!(harness.state(), StreamState::Streaming);

    let block = harness.read_next(Duration::from_secs(1)).unwrap();
    assert_eq!(block.dim(), (1, 1, 4096));

    harness.stop().unwrap();
    assert_eq!(harness.state(), StreamState::Idle);
    assert!(harness.read_next(Duration::from_secs(1)).is_none());
}

#[test]
fn compressor_in_the_loop() {
    init_tracing();
    let mut harness = StreamingHarness::with_test_tone(fast_config()).unwrap();
    let compressor = shared_compressor(CompressorConfig {
        threshold_db: -30.0,
        ratio: 8.0,
        attack_ms: 0.0,
        ..Default::default()
    });
    harness.set_processor(CompressorProcessor::new(Arc::clone(&compressor), 0.0).unwrap());

    harness.start().unwrap();
    let mut monitor = BlockMonitor::new(44100.0);
    let mut measured = Vec::new();
    for _ in 0..4 {
        let block = harness.read_next(Duration::from_secs(2)).unwrap();
        assert_eq!(block.dim(), (1, 1, 4096));
        assert!(block.iter().all(|x| x.is_finite()));
        measured.push(monitor.measure(&block).unwrap());
    }

    // Tweak bands while streaming; the processor sees the shared compressor
    compressor
        .lock()
        .set_range_parameters(0.0, 500.0, BandUpdate::new().ratio(1.0))
        .unwrap();
    assert!(harness.read_next(Duration::from_secs(2)).is_some());

    harness.stop().unwrap();
    assert_eq!(harness.last_error(), None);

    // Uncompressed test tone has an RMS of about 0.43
    let last = measured.last().unwrap();
    assert!(last.rms < 0.43, "rms {} not reduced", last.rms);
    assert!(last.peak_hz.is_some());
}

#[test]
fn failing_processor_surfaces_error() {
    init_tracing();
    let mut harness = StreamingHarness::with_test_tone(fast_config()).unwrap();

    harness.set_processor(FnProcessor::new(|block: Array3<f64>| {
        if !block.is_empty() {
            Err("refusing block".into())
        } else {
            Ok(block)
        }
    }));

    harness.start().unwrap();
    assert!(harness.read_next(Duration::from_millis(300)).is_none());
    assert_eq!(
        harness.last_error(),
        Some(StreamError::Processor("refusing block".into()))
    );
    assert_eq!(harness.state(), StreamState::Idle);
}

//! Producer/consumer harness feeding blocks through a hot-swappable processor
//!
//! A dedicated thread pulls fixed-size blocks from a looping source, runs the
//! installed processor (or passes the block through), and publishes the
//! result to a bounded queue paced at real time. Consumers drain the queue
//! with [`StreamingHarness::read_next`].

use super::processor::BlockProcessor;
use super::source::{BlockSource, LoopingSource};
use crate::error::StreamError;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use ndarray::Array3;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long a full queue blocks the producer before it rechecks the running flag
const PUBLISH_RETRY: Duration = Duration::from_millis(10);

type ProcessorSlot = ArcSwapOption<Mutex<Box<dyn BlockProcessor>>>;

/// Harness configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Sample rate used for pacing, in Hz
    pub sample_rate: f64,

    /// Samples per block
    pub block_size: usize,

    /// Blocks the queue holds before the producer waits
    pub queue_capacity: usize,

    /// Upper bound on how long `stop()` waits for the producer
    pub stop_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_size: 4096,
            queue_capacity: 32,
            stop_timeout: Duration::from_secs(1),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), StreamError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(StreamError::InvalidConfig(format!(
                "sample rate must be positive (got {})",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(StreamError::InvalidConfig("block size must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(StreamError::InvalidConfig("queue capacity must be non-zero".into()));
        }
        if Duration::try_from_secs_f64(self.block_size as f64 / self.sample_rate).is_err() {
            return Err(StreamError::InvalidConfig(format!(
                "block interval of {} samples at {} Hz is out of range",
                self.block_size, self.sample_rate
            )));
        }
        Ok(())
    }

    /// Real-time duration of one block
    pub fn block_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.block_size as f64 / self.sample_rate).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Handle on a running producer thread
struct Producer {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
    done: Receiver<()>,
}

/// Everything the producer thread owns or shares
struct ProducerContext {
    source: Arc<Mutex<Box<dyn BlockSource>>>,
    processor: Arc<ProcessorSlot>,
    sender: Sender<Array3<f64>>,
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<StreamError>>>,
    done: Sender<()>,
    block_size: usize,
    block_interval: Duration,
}

impl ProducerContext {
    fn run(self) {
        while self.running.load(Ordering::Acquire) {
            let block = self.source.lock().next_block(self.block_size);

            let output = match self.processor.load_full() {
                Some(processor) => {
                    let result = catch_unwind(AssertUnwindSafe(|| processor.lock().process_block(block)));
                    match result {
                        Ok(Ok(output)) => output,
                        Ok(Err(err)) => {
                            self.fail(StreamError::Processor(err.to_string()));
                            break;
                        }
                        Err(payload) => {
                            self.fail(StreamError::ProcessorPanicked(panic_message(payload.as_ref())));
                            break;
                        }
                    }
                }
                None => block,
            };

            if !self.publish(output) {
                break;
            }

            thread::sleep(self.block_interval);
        }

        self.running.store(false, Ordering::Release);
        let _ = self.done.send(());
        debug!("producer thread exiting");
    }

    /// Push a block, waiting while the queue is full
    ///
    /// Returns false if streaming was stopped before the block went out.
    fn publish(&self, mut block: Array3<f64>) -> bool {
        loop {
            if !self.running.load(Ordering::Acquire) {
                return false;
            }
            match self.sender.send_timeout(block, PUBLISH_RETRY) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => block = returned,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    fn fail(&self, err: StreamError) {
        error!(error = %err, "processor failed, streaming stopped");
        *self.last_error.lock() = Some(err);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Real-time streaming harness
///
/// Lifecycle is Idle -> Streaming -> Idle and may repeat. A processor that
/// fails or panics ends the run; the failure is kept in
/// [`StreamingHarness::last_error`].
pub struct StreamingHarness {
    config: HarnessConfig,
    source: Arc<Mutex<Box<dyn BlockSource>>>,
    processor: Arc<ProcessorSlot>,
    sender: Sender<Array3<f64>>,
    receiver: Receiver<Array3<f64>>,
    last_error: Arc<Mutex<Option<StreamError>>>,
    producer: Option<Producer>,
}

impl StreamingHarness {
    pub fn new<S>(config: HarnessConfig, source: S) -> Result<Self, StreamError>
    where
        S: BlockSource + 'static,
    {
        config.validate()?;
        let (sender, receiver) = bounded(config.queue_capacity);
        let source: Box<dyn BlockSource> = Box::new(source);

        Ok(Self {
            config,
            source: Arc::new(Mutex::new(source)),
            processor: Arc::new(ArcSwapOption::empty()),
            sender,
            receiver,
            last_error: Arc::new(Mutex::new(None)),
            producer: None,
        })
    }

    /// Harness looping the built-in three-tone test signal
    pub fn with_test_tone(config: HarnessConfig) -> Result<Self, StreamError> {
        let source = LoopingSource::test_tone(config.sample_rate)?;
        Self::new(config, source)
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> StreamState {
        match &self.producer {
            Some(producer) if producer.running.load(Ordering::Acquire) => StreamState::Streaming,
            _ => StreamState::Idle,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// Launch the producer thread
    ///
    /// # Returns
    /// `true` if a thread was launched, `false` if already streaming
    pub fn start(&mut self) -> Result<bool, StreamError> {
        if self.is_streaming() {
            debug!("start requested while already streaming");
            return Ok(false);
        }

        // A run that ended on its own (processor failure) still needs joining
        if let Some(finished) = self.producer.take() {
            if finished.handle.join().is_err() {
                warn!("previous producer thread panicked");
            }
        }

        *self.last_error.lock() = None;

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = bounded(1);
        let context = ProducerContext {
            source: Arc::clone(&self.source),
            processor: Arc::clone(&self.processor),
            sender: self.sender.clone(),
            running: Arc::clone(&running),
            last_error: Arc::clone(&self.last_error),
            done: done_tx,
            block_size: self.config.block_size,
            block_interval: self.config.block_interval(),
        };

        let handle = thread::Builder::new()
            .name("spectral-compressor-producer".into())
            .spawn(move || context.run())
            .map_err(|e| StreamError::Spawn(e.to_string()))?;

        self.producer = Some(Producer {
            handle,
            running,
            done: done_rx,
        });

        info!(
            sample_rate = self.config.sample_rate,
            block_size = self.config.block_size,
            "streaming started"
        );
        Ok(true)
    }

    /// Stop the producer and discard anything still queued
    ///
    /// Waits at most `stop_timeout` for the producer to exit. If it does not,
    /// the thread is detached and [`StreamError::JoinTimeout`] is returned.
    /// Calling this while idle is a no-op.
    pub fn stop(&mut self) -> Result<(), StreamError> {
        let Some(producer) = self.producer.take() else {
            self.drain();
            return Ok(());
        };

        producer.running.store(false, Ordering::Release);

        let timeout = self.config.stop_timeout;
        let result = match producer.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if producer.handle.join().is_err() {
                    warn!("producer thread panicked");
                }
                info!("streaming stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "producer thread did not stop in time, detaching it");
                Err(StreamError::JoinTimeout(timeout))
            }
        };

        self.drain();
        result
    }

    /// Install a processor; it takes effect from the next block
    pub fn set_processor<P>(&self, processor: P)
    where
        P: BlockProcessor + 'static,
    {
        let boxed: Box<dyn BlockProcessor> = Box::new(processor);
        self.processor.store(Some(Arc::new(Mutex::new(boxed))));
        debug!("processor installed");
    }

    /// Remove the processor; blocks pass through unchanged from the next one
    pub fn clear_processor(&self) {
        self.processor.store(None);
        debug!("processor cleared");
    }

    pub fn has_processor(&self) -> bool {
        self.processor.load().is_some()
    }

    /// Pop the oldest published block, waiting up to `timeout`
    pub fn read_next(&self, timeout: Duration) -> Option<Array3<f64>> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Blocks waiting in the queue
    pub fn pending_blocks(&self) -> usize {
        self.receiver.len()
    }

    /// Failure that ended the most recent run, if any
    pub fn last_error(&self) -> Option<StreamError> {
        self.last_error.lock().clone()
    }

    fn drain(&self) {
        let dropped = self.receiver.try_iter().count();
        if dropped > 0 {
            debug!(dropped, "discarded queued blocks");
        }
    }
}

impl Drop for StreamingHarness {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "failed to stop streaming on drop");
        }
    }
}

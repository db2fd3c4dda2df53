//! Block sources for the streaming harness

use crate::error::StreamError;
use ndarray::{s, Array2, Array3};
use std::f64::consts::PI;

/// Supplies fixed-size blocks to the producer thread
pub trait BlockSource: Send {
    /// Next block, shaped (1, channels, block_size)
    fn next_block(&mut self, block_size: usize) -> Array3<f64>;
}

/// Endless source that replays a buffer from the start once it runs out
#[derive(Debug, Clone)]
pub struct LoopingSource {
    /// Samples shaped (channels, time)
    samples: Array2<f64>,
    position: usize,
}

impl LoopingSource {
    /// Loop a (channels, time) buffer
    pub fn new(samples: Array2<f64>) -> Result<Self, StreamError> {
        let (channels, len) = samples.dim();
        if channels == 0 || len == 0 {
            return Err(StreamError::InvalidConfig(format!(
                "looping source needs at least one sample (got {} channels x {} samples)",
                channels, len
            )));
        }

        Ok(Self {
            samples,
            position: 0,
        })
    }

    /// Loop a single-channel buffer
    pub fn mono(samples: Vec<f64>) -> Result<Self, StreamError> {
        let len = samples.len();
        let samples = Array2::from_shape_vec((1, len), samples)
            .map_err(|e| StreamError::InvalidConfig(e.to_string()))?;
        Self::new(samples)
    }

    /// Two seconds of 200 Hz, 2 kHz and 8 kHz tones (amplitudes 0.5, 0.3, 0.2)
    ///
    /// One partial in each of the low, mid and high regions, so per-band
    /// settings have something to act on.
    pub fn test_tone(sample_rate: f64) -> Result<Self, StreamError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(StreamError::InvalidConfig(format!(
                "sample rate must be positive (got {})",
                sample_rate
            )));
        }

        let len = (2.0 * sample_rate) as usize;
        let samples = (0..len)
            .map(|n| {
                let t = n as f64 / sample_rate;
                0.5 * (2.0 * PI * 200.0 * t).sin()
                    + 0.3 * (2.0 * PI * 2000.0 * t).sin()
                    + 0.2 * (2.0 * PI * 8000.0 * t).sin()
            })
            .collect();

        Self::mono(samples)
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Length of one loop in samples
    pub fn len(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read position within the loop
    pub fn position(&self) -> usize {
        self.position
    }
}

impl BlockSource for LoopingSource {
    fn next_block(&mut self, block_size: usize) -> Array3<f64> {
        let (channels, len) = self.samples.dim();
        let mut block = Array3::zeros((1, channels, block_size));

        let mut filled = 0;
        while filled < block_size {
            let take = (len - self.position).min(block_size - filled);
            block
                .slice_mut(s![0, .., filled..filled + take])
                .assign(&self.samples.slice(s![.., self.position..self.position + take]));

            filled += take;
            self.position = (self.position + take) % len;
        }

        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_wraps_around() {
        let mut source = LoopingSource::mono(vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        let first = source.next_block(3);
        assert_eq!(first.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);

        let second = source.next_block(3);
        assert_eq!(second.iter().copied().collect::<Vec<_>>(), vec![4.0, 5.0, 1.0]);
        assert_eq!(source.position(), 1);
    }

    #[test]
    fn test_block_longer_than_loop() {
        let mut source = LoopingSource::mono(vec![1.0, 2.0]).unwrap();
        let block = source.next_block(5);
        assert_eq!(block.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_multichannel() {
        let mut source = LoopingSource::new(arr2(&[[1.0, 2.0, 3.0], [-1.0, -2.0, -3.0]])).unwrap();
        let block = source.next_block(4);

        assert_eq!(block.dim(), (1, 2, 4));
        assert_eq!(block[[0, 0, 3]], 1.0);
        assert_eq!(block[[0, 1, 3]], -1.0);
    }

    #[test]
    fn test_rejects_empty() {
        assert!(LoopingSource::mono(Vec::new()).is_err());
        assert!(LoopingSource::new(Array2::zeros((0, 10))).is_err());
    }

    #[test]
    fn test_tone_source() {
        let source = LoopingSource::test_tone(44100.0).unwrap();
        assert_eq!(source.channels(), 1);
        assert_eq!(source.len(), 88200);
        assert!(LoopingSource::test_tone(0.0).is_err());
    }
}

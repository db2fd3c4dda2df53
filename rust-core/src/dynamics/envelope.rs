//! Attack/release envelope follower with persistent per-bin state
//!
//! The follower runs once per frame. Its state is a linear gain per
//! (batch item, channel, bin) and carries over from block to block.

use super::curve::{amplitude_to_db, db_to_amplitude};
use crate::error::CompressorError;
use ndarray::{Array3, ArrayView3, Zip};
use tracing::debug;

/// Convert a time constant in ms to a one-pole smoothing coefficient
///
/// `coeff = 1 - exp(-1 / samples)` with `samples = time_ms * sample_rate / 1000`.
/// A zero time constant gives 1.0 (jump straight to the target).
pub fn time_constant_to_coeff(time_ms: f64, sample_rate: f64) -> f64 {
    let samples = time_ms * sample_rate / 1000.0;
    if samples > 0.0 {
        1.0 - (-1.0 / samples).exp()
    } else {
        1.0
    }
}

/// One-pole gain smoother with separate attack and release coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
}

impl EnvelopeFollower {
    /// Create a follower from time constants
    ///
    /// # Arguments
    /// * `attack_ms` - Attack time in milliseconds (gain falling)
    /// * `release_ms` - Release time in milliseconds (gain recovering)
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(attack_ms: f64, release_ms: f64, sample_rate: f64) -> Result<Self, CompressorError> {
        for (name, value) in [("attack_ms", attack_ms), ("release_ms", release_ms)] {
            if !value.is_finite() || value < 0.0 {
                return Err(CompressorError::InvalidParameter { name, value });
            }
        }

        Ok(Self {
            attack_coeff: time_constant_to_coeff(attack_ms, sample_rate),
            release_coeff: time_constant_to_coeff(release_ms, sample_rate),
        })
    }

    pub fn attack_coeff(&self) -> f64 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f64 {
        self.release_coeff
    }

    /// Advance the envelope by one frame
    ///
    /// # Arguments
    /// * `target_reduction_db` - Instantaneous gain reduction from the static curve
    /// * `state` - Linear gains, same shape as the target; updated in place
    ///
    /// # Returns
    /// Smoothed gain reduction in dB, derived from the updated state
    pub fn smooth(&self, target_reduction_db: ArrayView3<f64>, state: &mut Array3<f64>) -> Array3<f64> {
        let (attack, release) = (self.attack_coeff, self.release_coeff);
        let mut smoothed = Array3::zeros(state.raw_dim());

        Zip::from(&mut smoothed)
            .and(state)
            .and(target_reduction_db)
            .for_each(|out, gain, &reduction| {
                let target = db_to_amplitude(-reduction);
                // Falling gain means compressing harder
                let coeff = if target < *gain { attack } else { release };
                *gain += coeff * (target - *gain);
                *out = -amplitude_to_db(*gain);
            });

        smoothed
    }
}

/// Envelope memory of a compressor
///
/// Bound to the (batch, channels) shape it was created for; a block of any
/// other shape starts over from unity gain.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EnvelopeState {
    #[default]
    Uninitialized,
    Ready {
        batch: usize,
        channels: usize,
        gains: Array3<f64>,
    },
}

impl EnvelopeState {
    /// True if the state already tracks this shape
    pub fn matches(&self, batch: usize, channels: usize, bins: usize) -> bool {
        match self {
            Self::Ready {
                batch: b,
                channels: c,
                gains,
            } => *b == batch && *c == channels && gains.dim().2 == bins,
            Self::Uninitialized => false,
        }
    }

    /// Gains for the given shape, (re)initialised to unity if the shape changed
    pub fn prepare(&mut self, batch: usize, channels: usize, bins: usize) -> &mut Array3<f64> {
        if !self.matches(batch, channels, bins) {
            *self = Self::Uninitialized;
        }

        match self {
            Self::Ready { gains, .. } => gains,
            Self::Uninitialized => {
                debug!(batch, channels, bins, "envelope state initialised at unity gain");
                *self = Self::Ready {
                    batch,
                    channels,
                    gains: Array3::ones((batch, channels, bins)),
                };
                self.prepare(batch, channels, bins)
            }
        }
    }

    /// Current linear gains, if any frame has been processed
    pub fn gains(&self) -> Option<&Array3<f64>> {
        match self {
            Self::Ready { gains, .. } => Some(gains),
            Self::Uninitialized => None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coefficients() {
        // 10 ms at 1 kHz = 10 samples
        let coeff = time_constant_to_coeff(10.0, 1000.0);
        assert!((coeff - (1.0 - (-0.1_f64).exp())).abs() < 1e-12);

        assert_eq!(time_constant_to_coeff(0.0, 44100.0), 1.0);

        // Longer time constants smooth more
        assert!(time_constant_to_coeff(100.0, 44100.0) < time_constant_to_coeff(10.0, 44100.0));
    }

    #[test]
    fn test_rejects_negative_times() {
        assert!(EnvelopeFollower::new(-1.0, 100.0, 44100.0).is_err());
        assert!(EnvelopeFollower::new(10.0, f64::NAN, 44100.0).is_err());
    }

    #[test]
    fn test_instant_follower_tracks_target() {
        let follower = EnvelopeFollower::new(0.0, 0.0, 44100.0).unwrap();
        let mut state = Array3::ones((1, 1, 2));
        let target = Array3::from_shape_vec((1, 1, 2), vec![6.0, 0.0]).unwrap();

        let smoothed = follower.smooth(target.view(), &mut state);

        assert!((smoothed[[0, 0, 0]] - 6.0).abs() < 1e-9);
        assert!(smoothed[[0, 0, 1]].abs() < 1e-12);
        assert!((state[[0, 0, 0]] - db_to_amplitude(-6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_attack_and_release_are_chosen_by_direction() {
        let follower = EnvelopeFollower::from_coefficients_for_test(0.5, 0.1);
        let mut state = Array3::from_elem((1, 1, 1), 1.0);

        // Gain must drop to 0.5: attack coefficient
        let target = Array3::from_elem((1, 1, 1), -20.0 * 0.5_f64.log10());
        follower.smooth(target.view(), &mut state);
        assert!((state[[0, 0, 0]] - 0.75).abs() < 1e-12);

        // Back to unity: release coefficient
        let target = Array3::zeros((1, 1, 1));
        follower.smooth(target.view(), &mut state);
        assert!((state[[0, 0, 0]] - 0.775).abs() < 1e-12);
    }

    #[test]
    fn test_state_prepare_and_reset() {
        let mut envelope = EnvelopeState::default();
        assert!(envelope.gains().is_none());

        envelope.prepare(1, 2, 5)[[0, 1, 3]] = 0.5;
        assert_eq!(envelope.gains().unwrap()[[0, 1, 3]], 0.5);

        // Same shape keeps memory
        assert_eq!(envelope.prepare(1, 2, 5)[[0, 1, 3]], 0.5);

        // Different batch size starts from unity gain
        let gains = envelope.prepare(2, 2, 5);
        assert_eq!(gains.dim(), (2, 2, 5));
        assert!(gains.iter().all(|&g| g == 1.0));

        // So does a different bin count
        envelope.prepare(2, 2, 5)[[1, 0, 0]] = 0.25;
        assert_eq!(envelope.prepare(2, 2, 9).dim(), (2, 2, 9));
        assert!(envelope.gains().unwrap().iter().all(|&g| g == 1.0));

        envelope.reset();
        assert_eq!(envelope, EnvelopeState::Uninitialized);
    }

    impl EnvelopeFollower {
        fn from_coefficients_for_test(attack_coeff: f64, release_coeff: f64) -> Self {
            Self {
                attack_coeff,
                release_coeff,
            }
        }
    }
}

//! FFT-based multi-band compressor
//!
//! Every bin of a 4096-point real FFT is its own band with its own threshold,
//! ratio, knee and makeup gain. Gain reduction is smoothed per bin by an
//! attack/release follower whose state persists across calls to `process`.

use super::curve::{amplitude_to_db, db_to_amplitude, gain_reduction_db};
use super::envelope::{EnvelopeFollower, EnvelopeState};
use super::params::{BandParameters, BandSettings, BandUpdate};
use crate::error::CompressorError;
use crate::spectrum::framer::OLA_NORM_FLOOR;
use crate::spectrum::windowing::{generate_window, min_steady_overlap};
use crate::spectrum::{Framer, WindowType};
use ndarray::{s, Array1, Array3, ArrayBase, Data, Ix3, Zip};
use num_complex::Complex;
use tracing::debug;

/// The only analysis size the compressor supports
pub const ANALYSIS_SIZE: usize = 4096;

/// Compressor configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CompressorConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,

    /// FFT size, must be [`ANALYSIS_SIZE`]
    pub analysis_size: usize,

    /// Stride between frames; must divide `analysis_size`
    pub hop_size: usize,

    /// Analysis/synthesis window
    pub window_type: WindowType,

    /// Defaults applied to every bin at construction
    pub threshold_db: f64,
    pub ratio: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub makeup_gain_db: f64,
    pub knee_width_db: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            analysis_size: ANALYSIS_SIZE,
            hop_size: 1024,
            window_type: WindowType::Hann,
            threshold_db: -20.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_gain_db: 0.0,
            knee_width_db: 0.0,
        }
    }
}

impl CompressorConfig {
    /// Check the framing parameters and the per-bin defaults
    pub fn validate(&self) -> Result<(), CompressorError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(CompressorError::InvalidSampleRate(self.sample_rate));
        }

        if self.analysis_size != ANALYSIS_SIZE {
            return Err(CompressorError::UnsupportedAnalysisSize {
                size: self.analysis_size,
                supported: ANALYSIS_SIZE,
            });
        }

        if self.hop_size == 0
            || self.hop_size > self.analysis_size
            || self.analysis_size % self.hop_size != 0
        {
            return Err(CompressorError::InvalidHop {
                hop: self.hop_size,
                analysis_size: self.analysis_size,
            });
        }

        // Frames must overlap enough that no interior sample loses all window mass
        let window = generate_window(self.window_type, self.analysis_size);
        if min_steady_overlap(&window, self.hop_size) < OLA_NORM_FLOOR {
            return Err(CompressorError::InvalidHop {
                hop: self.hop_size,
                analysis_size: self.analysis_size,
            });
        }

        self.band_defaults().validate()?;
        EnvelopeFollower::new(self.attack_ms, self.release_ms, self.sample_rate)?;
        Ok(())
    }

    /// Number of bands (N/2 + 1)
    pub fn num_bins(&self) -> usize {
        self.analysis_size / 2 + 1
    }

    pub fn band_defaults(&self) -> BandSettings {
        BandSettings {
            threshold_db: self.threshold_db,
            ratio: self.ratio,
            makeup_gain_db: self.makeup_gain_db,
            knee_width_db: self.knee_width_db,
        }
    }
}

/// Intermediates of the first frame (batch 0, channel 0) of a block
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// Linear magnitude spectrum
    pub magnitude: Array1<f64>,

    /// Smoothed gain reduction in dB
    pub gain_reduction_db: Array1<f64>,

    /// Spectrum after compression and makeup gain
    pub compressed_spectrum: Array1<Complex<f64>>,
}

/// Output of [`BandCompressor::process_with_intermediates`]
#[derive(Debug, Clone)]
pub struct ProcessReport {
    /// Reconstructed block, same shape as the input
    pub output: Array3<f64>,

    /// `None` when the block was too short to hold a single frame
    pub first_frame: Option<FrameSnapshot>,
}

/// Multi-band (per-bin) compressor
pub struct BandCompressor {
    config: CompressorConfig,
    framer: Framer,
    bands: BandParameters,
    follower: EnvelopeFollower,
    envelope: EnvelopeState,
}

impl BandCompressor {
    /// Create a compressor; fails on invalid configuration
    pub fn new(config: CompressorConfig) -> Result<Self, CompressorError> {
        config.validate()?;

        let framer = Framer::new(config.analysis_size, config.hop_size, config.window_type);
        let bands = BandParameters::uniform(config.num_bins(), config.band_defaults())?;
        let follower = EnvelopeFollower::new(config.attack_ms, config.release_ms, config.sample_rate)?;

        debug!(
            sample_rate = config.sample_rate,
            analysis_size = config.analysis_size,
            hop_size = config.hop_size,
            window = config.window_type.name(),
            bins = bands.len(),
            "band compressor created"
        );

        Ok(Self {
            config,
            framer,
            bands,
            follower,
            envelope: EnvelopeState::Uninitialized,
        })
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Number of bands (N/2 + 1)
    pub fn num_bins(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &BandParameters {
        &self.bands
    }

    pub fn follower(&self) -> &EnvelopeFollower {
        &self.follower
    }

    pub fn envelope(&self) -> &EnvelopeState {
        &self.envelope
    }

    /// Settings of one band
    pub fn band(&self, bin: usize) -> Result<BandSettings, CompressorError> {
        self.bands.get(bin)
    }

    /// Change one band's static parameters
    ///
    /// Takes effect from the next processed frame. The update is applied as a
    /// whole or not at all.
    pub fn set_band_parameters(
        &mut self,
        bin: usize,
        update: BandUpdate,
    ) -> Result<BandSettings, CompressorError> {
        self.bands.update(bin, update)
    }

    /// Apply one update to every band whose centre lies in `[low_hz, high_hz)`
    ///
    /// Returns the number of bands changed.
    pub fn set_range_parameters(
        &mut self,
        low_hz: f64,
        high_hz: f64,
        update: BandUpdate,
    ) -> Result<usize, CompressorError> {
        if low_hz.is_nan() {
            return Err(CompressorError::InvalidParameter {
                name: "low_hz",
                value: low_hz,
            });
        }
        if high_hz.is_nan() || high_hz < low_hz {
            return Err(CompressorError::InvalidParameter {
                name: "high_hz",
                value: high_hz,
            });
        }

        let bins: Vec<usize> = (0..self.num_bins())
            .filter(|&bin| {
                let centre = self.bin_frequency(bin);
                centre >= low_hz && centre < high_hz
            })
            .collect();

        self.bands.update_many(bins, update)
    }

    /// Centre frequency of a bin in Hz
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.config.sample_rate / self.config.analysis_size as f64
    }

    /// Centre frequencies of all bins in Hz
    pub fn bin_frequencies(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.num_bins(), |bin| self.bin_frequency(bin))
    }

    /// Approximate frequency span covered by a bin
    ///
    /// Edges sit halfway between neighbouring bin centres; bin 0 starts at
    /// 0 Hz and the last bin ends at Nyquist.
    pub fn get_frequency_range(&self, bin: usize) -> Result<(f64, f64), CompressorError> {
        let bins = self.num_bins();
        if bin >= bins {
            return Err(CompressorError::BinOutOfRange { bin, bins });
        }

        let centre = self.bin_frequency(bin);
        let low = if bin == 0 {
            0.0
        } else {
            (self.bin_frequency(bin - 1) + centre) / 2.0
        };
        let high = if bin == bins - 1 {
            self.config.sample_rate / 2.0
        } else {
            (centre + self.bin_frequency(bin + 1)) / 2.0
        };

        Ok((low, high))
    }

    /// Forget the envelope; the next frame starts from unity gain
    pub fn reset(&mut self) {
        self.envelope.reset();
    }

    /// Compress a (batch, channels, time) block
    ///
    /// The output has the same shape as the input. Frames are processed in
    /// time order, so the envelope carries from each frame to the next and on
    /// into the next call.
    pub fn process<S>(&mut self, block: &ArrayBase<S, Ix3>) -> Result<Array3<f64>, CompressorError>
    where
        S: Data<Elem = f64>,
    {
        Ok(self.run(block, false)?.output)
    }

    /// Same as [`BandCompressor::process`], also returning first-frame intermediates
    pub fn process_with_intermediates<S>(
        &mut self,
        block: &ArrayBase<S, Ix3>,
    ) -> Result<ProcessReport, CompressorError>
    where
        S: Data<Elem = f64>,
    {
        self.run(block, true)
    }

    fn run<S>(&mut self, block: &ArrayBase<S, Ix3>, capture: bool) -> Result<ProcessReport, CompressorError>
    where
        S: Data<Elem = f64>,
    {
        let (batch, channels, len) = block.dim();
        let mut frames = self.framer.analyze(block.view())?;
        let mut first_frame = None;

        if !frames.is_empty() {
            let bins = self.framer.num_bins();
            debug_assert_eq!(bins, self.bands.len());

            let gains = self.envelope.prepare(batch, channels, bins);

            for frame in frames.iter_mut() {
                let magnitude = frame.spectrum.mapv(|bin| bin.norm());
                let phase = frame.spectrum.mapv(|bin| bin.arg());
                let magnitude_db = magnitude.mapv(amplitude_to_db);

                let target = gain_reduction_db(
                    magnitude_db.view(),
                    self.bands.threshold_db(),
                    self.bands.ratio(),
                    self.bands.knee_width_db(),
                );
                let smoothed = self.follower.smooth(target.view(), gains);

                Zip::from(&mut frame.spectrum)
                    .and(&magnitude_db)
                    .and(&smoothed)
                    .and(&phase)
                    .and_broadcast(self.bands.makeup_gain_db())
                    .for_each(|bin, &level, &reduction, &phase, &makeup| {
                        let compressed = db_to_amplitude(level - reduction + makeup);
                        *bin = Complex::from_polar(compressed, phase);
                    });

                if capture && first_frame.is_none() {
                    first_frame = Some(FrameSnapshot {
                        magnitude: magnitude.slice(s![0, 0, ..]).to_owned(),
                        gain_reduction_db: smoothed.slice(s![0, 0, ..]).to_owned(),
                        compressed_spectrum: frame.spectrum.slice(s![0, 0, ..]).to_owned(),
                    });
                }
            }
        }

        let output = self.framer.synthesize(&frames, (batch, channels, len))?;

        Ok(ProcessReport {
            output,
            first_frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_block(batch: usize, channels: usize, len: usize, freq: f64, amp: f64) -> Array3<f64> {
        Array3::from_shape_fn((batch, channels, len), |(_, _, n)| {
            amp * (2.0 * PI * freq * n as f64 / 44100.0).sin()
        })
    }

    #[test]
    fn test_config_validation() {
        assert!(CompressorConfig::default().validate().is_ok());

        let bad_rate = CompressorConfig {
            sample_rate: 0.0,
            ..Default::default()
        };
        assert_eq!(
            bad_rate.validate(),
            Err(CompressorError::InvalidSampleRate(0.0))
        );

        let bad_size = CompressorConfig {
            analysis_size: 2048,
            ..Default::default()
        };
        assert!(matches!(
            BandCompressor::new(bad_size),
            Err(CompressorError::UnsupportedAnalysisSize { size: 2048, .. })
        ));

        for hop in [0, 5000, 1000, 4096] {
            let bad_hop = CompressorConfig {
                hop_size: hop,
                ..Default::default()
            };
            assert!(matches!(
                bad_hop.validate(),
                Err(CompressorError::InvalidHop { .. })
            ));
        }

        // Half overlap still reconstructs with Hann; no overlap only without tapering
        let half = CompressorConfig {
            hop_size: 2048,
            ..Default::default()
        };
        assert!(half.validate().is_ok());
        let rectangular = CompressorConfig {
            hop_size: 4096,
            window_type: WindowType::Rectangular,
            ..Default::default()
        };
        assert!(rectangular.validate().is_ok());

        let bad_ratio = CompressorConfig {
            ratio: 0.0,
            ..Default::default()
        };
        assert!(bad_ratio.validate().is_err());

        let bad_attack = CompressorConfig {
            attack_ms: -5.0,
            ..Default::default()
        };
        assert!(bad_attack.validate().is_err());
    }

    #[test]
    fn test_num_bins() {
        let compressor = BandCompressor::new(CompressorConfig::default()).unwrap();
        assert_eq!(compressor.num_bins(), 2049);
        assert_eq!(compressor.bin_frequencies().len(), 2049);
    }

    #[test]
    fn test_frequency_ranges() {
        let compressor = BandCompressor::new(CompressorConfig::default()).unwrap();
        let spacing = 44100.0 / 4096.0;

        let (low, high) = compressor.get_frequency_range(0).unwrap();
        assert_eq!(low, 0.0);
        assert!((high - spacing / 2.0).abs() < 1e-9);

        let (low, high) = compressor.get_frequency_range(10).unwrap();
        assert!((low - 9.5 * spacing).abs() < 1e-9);
        assert!((high - 10.5 * spacing).abs() < 1e-9);

        let (low, high) = compressor.get_frequency_range(2048).unwrap();
        assert!((low - 2047.5 * spacing).abs() < 1e-9);
        assert_eq!(high, 22050.0);

        assert_eq!(
            compressor.get_frequency_range(2049),
            Err(CompressorError::BinOutOfRange { bin: 2049, bins: 2049 })
        );
    }

    #[test]
    fn test_ranges_tile_the_spectrum() {
        let compressor = BandCompressor::new(CompressorConfig::default()).unwrap();
        let mut previous_high = 0.0;
        for bin in 0..compressor.num_bins() {
            let (low, high) = compressor.get_frequency_range(bin).unwrap();
            assert!((low - previous_high).abs() < 1e-9);
            assert!(high > low);
            previous_high = high;
        }
    }

    #[test]
    fn test_set_band_parameters() {
        let mut compressor = BandCompressor::new(CompressorConfig::default()).unwrap();

        compressor
            .set_band_parameters(
                7,
                BandUpdate::new()
                    .threshold_db(-31.5)
                    .ratio(2.5)
                    .makeup_gain_db(1.5)
                    .knee_width_db(4.0),
            )
            .unwrap();

        let band = compressor.band(7).unwrap();
        assert_eq!(band.threshold_db, -31.5);
        assert_eq!(band.ratio, 2.5);
        assert_eq!(band.makeup_gain_db, 1.5);
        assert_eq!(band.knee_width_db, 4.0);
        assert_eq!(compressor.band(8).unwrap(), compressor.config().band_defaults());

        assert!(matches!(
            compressor.set_band_parameters(4096, BandUpdate::new().ratio(2.0)),
            Err(CompressorError::BinOutOfRange { bin: 4096, bins: 2049 })
        ));
    }

    #[test]
    fn test_set_range_parameters() {
        let mut compressor = BandCompressor::new(CompressorConfig::default()).unwrap();

        let low = compressor
            .set_range_parameters(0.0, 200.0, BandUpdate::new().threshold_db(-15.0).ratio(2.0))
            .unwrap();
        let high = compressor
            .set_range_parameters(2000.0, f64::INFINITY, BandUpdate::new().ratio(6.0))
            .unwrap();

        // Bin spacing is ~10.77 Hz: bins 0..=18 are below 200 Hz
        assert_eq!(low, 19);
        assert_eq!(compressor.band(18).unwrap().ratio, 2.0);
        assert_eq!(compressor.band(19).unwrap().ratio, 4.0);
        assert_eq!(compressor.band(2048).unwrap().ratio, 6.0);
        let mids = compressor
            .bin_frequencies()
            .iter()
            .filter(|&&f| (200.0..2000.0).contains(&f))
            .count();
        assert_eq!(low + mids + high, 2049);

        assert!(compressor
            .set_range_parameters(500.0, 100.0, BandUpdate::new().ratio(2.0))
            .is_err());
    }

    #[test]
    fn test_transparent_when_ratio_is_one() {
        let config = CompressorConfig {
            ratio: 1.0,
            ..Default::default()
        };
        let mut compressor = BandCompressor::new(config).unwrap();
        let block = sine_block(1, 1, 16384, 1000.0, 0.8);

        let output = compressor.process(&block).unwrap();
        for n in 4096..16384 - 4096 {
            assert!((output[[0, 0, n]] - block[[0, 0, n]]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_loud_tone_is_attenuated() {
        // The follower steps once per frame, so a 10 ms attack would take
        // hundreds of frames to settle; use an instant attack here
        let config = CompressorConfig {
            attack_ms: 0.0,
            ..Default::default()
        };
        let mut compressor = BandCompressor::new(config).unwrap();
        let block = sine_block(1, 1, 16384, 1000.0, 0.8);

        let output = compressor.process(&block).unwrap();

        let rms = |x: &Array3<f64>| {
            let interior = x.slice(s![0, 0, 4096..12288]);
            (interior.iter().map(|v| v * v).sum::<f64>() / interior.len() as f64).sqrt()
        };
        assert!(rms(&output) < 0.5 * rms(&block));
        assert!(output.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_compressed_edges_do_not_burst() {
        let config = CompressorConfig {
            threshold_db: -30.0,
            attack_ms: 0.0,
            ..Default::default()
        };
        let peak = |x: ndarray::ArrayView1<f64>| x.iter().fold(0.0_f64, |m, v| m.max(v.abs()));

        let mut compressor = BandCompressor::new(config.clone()).unwrap();
        let output = compressor.process(&sine_block(1, 1, 16384, 1000.0, 0.8)).unwrap();
        let interior = peak(output.slice(s![0, 0, 4096..12288]));
        let head = peak(output.slice(s![0, 0, ..300]));
        let tail = peak(output.slice(s![0, 0, 16384 - 300..]));
        assert!(interior < 0.2, "interior peak {}", interior);
        assert!(head < interior, "head peak {} vs interior {}", head, interior);
        assert!(tail < interior, "tail peak {} vs interior {}", tail, interior);

        // One frame per block: no fully overlapped samples at all
        let mut compressor = BandCompressor::new(config).unwrap();
        let single = compressor.process(&sine_block(1, 1, 4096, 1000.0, 0.8)).unwrap();
        assert!(peak(single.slice(s![0, 0, ..300])) < 0.05);
        assert!(peak(single.slice(s![0, 0, 4096 - 300..])) < 0.05);
    }

    #[test]
    fn test_makeup_gain_scales_output() {
        let config = CompressorConfig {
            ratio: 1.0,
            makeup_gain_db: 6.0,
            ..Default::default()
        };
        let mut compressor = BandCompressor::new(config).unwrap();
        let block = sine_block(1, 1, 16384, 1000.0, 0.5);

        let output = compressor.process(&block).unwrap();

        let gain = db_to_amplitude(6.0);
        assert!((gain - 2.0).abs() < 0.01);
        for n in 4096..16384 - 4096 {
            assert!((output[[0, 0, n]] - gain * block[[0, 0, n]]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_band_update_changes_next_block() {
        let config = CompressorConfig {
            threshold_db: -40.0,
            ratio: 2.0,
            attack_ms: 0.0,
            ..Default::default()
        };
        let mut compressor = BandCompressor::new(config).unwrap();
        let block = sine_block(1, 1, 8192, 93.0 * 44100.0 / 4096.0, 0.5);

        let before = compressor.process_with_intermediates(&block).unwrap();
        compressor
            .set_band_parameters(93, BandUpdate::new().ratio(10.0))
            .unwrap();
        let after = compressor.process_with_intermediates(&block).unwrap();

        let (before, after) = (before.first_frame.unwrap(), after.first_frame.unwrap());
        assert!(
            after.gain_reduction_db[93] > before.gain_reduction_db[93] + 10.0,
            "reduction {} -> {}",
            before.gain_reduction_db[93],
            after.gain_reduction_db[93]
        );
        assert!(after.compressed_spectrum[93].norm() < before.compressed_spectrum[93].norm());

        // Untouched neighbour settles on the same reduction
        assert!((after.gain_reduction_db[94] - before.gain_reduction_db[94]).abs() < 1e-9);
        assert!(after.gain_reduction_db[94] > 0.0);
    }

    #[test]
    fn test_silence_stays_finite() {
        let mut compressor = BandCompressor::new(CompressorConfig::default()).unwrap();
        let block = Array3::<f64>::zeros((1, 2, 9000));

        let output = compressor.process(&block).unwrap();
        assert_eq!(output.dim(), (1, 2, 9000));
        assert!(output.iter().all(|v| v.is_finite() && v.abs() < 1e-6));
    }

    #[test]
    fn test_intermediates() {
        let mut compressor = BandCompressor::new(CompressorConfig::default()).unwrap();
        let block = sine_block(2, 1, 8192, 1000.0, 0.8);

        let report = compressor.process_with_intermediates(&block).unwrap();
        assert_eq!(report.output.dim(), (2, 1, 8192));

        let snapshot = report.first_frame.expect("block holds at least one frame");
        assert_eq!(snapshot.magnitude.len(), 2049);
        assert_eq!(snapshot.gain_reduction_db.len(), 2049);
        assert_eq!(snapshot.compressed_spectrum.len(), 2049);

        // 1 kHz sits near bin 93; it is well above threshold and gets reduced
        let peak = snapshot
            .magnitude
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert!((92..=94).contains(&peak));
        assert!(snapshot.gain_reduction_db[peak] > 0.0);
        assert!(snapshot.compressed_spectrum[peak].norm() < snapshot.magnitude[peak]);
    }

    #[test]
    fn test_intermediates_do_not_change_output() {
        let block = sine_block(1, 1, 12000, 440.0, 0.5);

        let mut plain = BandCompressor::new(CompressorConfig::default()).unwrap();
        let mut inspected = BandCompressor::new(CompressorConfig::default()).unwrap();

        let a = plain.process(&block).unwrap();
        let b = inspected.process_with_intermediates(&block).unwrap().output;
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_block_has_no_snapshot() {
        let mut compressor = BandCompressor::new(CompressorConfig::default()).unwrap();
        let block = sine_block(1, 1, 2000, 440.0, 0.5);

        let report = compressor.process_with_intermediates(&block).unwrap();
        assert!(report.first_frame.is_none());
        assert_eq!(report.output.dim(), (1, 1, 2000));
        assert_eq!(compressor.envelope(), &EnvelopeState::Uninitialized);
    }

    #[test]
    fn test_reset_clears_envelope() {
        let mut compressor = BandCompressor::new(CompressorConfig::default()).unwrap();
        compressor.process(&sine_block(1, 1, 4096, 440.0, 0.5)).unwrap();
        assert!(compressor.envelope().gains().is_some());

        compressor.reset();
        assert!(compressor.envelope().gains().is_none());
    }
}

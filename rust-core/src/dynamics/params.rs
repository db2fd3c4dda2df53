//! Per-bin static compression parameters

use crate::error::CompressorError;
use ndarray::{Array1, ArrayView1};

/// Static parameters of a single band (bin)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSettings {
    /// Threshold in dB (+inf disables compression for the band)
    pub threshold_db: f64,

    /// Compression ratio (1.0 = no compression)
    pub ratio: f64,

    /// Makeup gain in dB, applied after gain reduction
    pub makeup_gain_db: f64,

    /// Soft-knee width in dB (0.0 = hard knee)
    pub knee_width_db: f64,
}

impl Default for BandSettings {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 4.0,
            makeup_gain_db: 0.0,
            knee_width_db: 0.0,
        }
    }
}

impl BandSettings {
    pub fn validate(&self) -> Result<(), CompressorError> {
        validate_threshold(self.threshold_db)?;
        validate_ratio(self.ratio)?;
        validate_makeup(self.makeup_gain_db)?;
        validate_knee(self.knee_width_db)
    }
}

/// Partial update of a band; `None` fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandUpdate {
    pub threshold_db: Option<f64>,
    pub ratio: Option<f64>,
    pub makeup_gain_db: Option<f64>,
    pub knee_width_db: Option<f64>,
}

impl BandUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold_db(mut self, threshold_db: f64) -> Self {
        self.threshold_db = Some(threshold_db);
        self
    }

    pub fn ratio(mut self, ratio: f64) -> Self {
        self.ratio = Some(ratio);
        self
    }

    pub fn makeup_gain_db(mut self, makeup_gain_db: f64) -> Self {
        self.makeup_gain_db = Some(makeup_gain_db);
        self
    }

    pub fn knee_width_db(mut self, knee_width_db: f64) -> Self {
        self.knee_width_db = Some(knee_width_db);
        self
    }

    /// True when the update changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check every field that is set
    pub fn validate(&self) -> Result<(), CompressorError> {
        if let Some(v) = self.threshold_db {
            validate_threshold(v)?;
        }
        if let Some(v) = self.ratio {
            validate_ratio(v)?;
        }
        if let Some(v) = self.makeup_gain_db {
            validate_makeup(v)?;
        }
        if let Some(v) = self.knee_width_db {
            validate_knee(v)?;
        }
        Ok(())
    }

    /// Settings after applying this update
    pub fn apply_to(&self, settings: BandSettings) -> BandSettings {
        BandSettings {
            threshold_db: self.threshold_db.unwrap_or(settings.threshold_db),
            ratio: self.ratio.unwrap_or(settings.ratio),
            makeup_gain_db: self.makeup_gain_db.unwrap_or(settings.makeup_gain_db),
            knee_width_db: self.knee_width_db.unwrap_or(settings.knee_width_db),
        }
    }
}

fn validate_threshold(value: f64) -> Result<(), CompressorError> {
    // +inf is a valid "never compress"; -inf would turn the curve into inf * 0
    if value.is_nan() || value == f64::NEG_INFINITY {
        return Err(CompressorError::InvalidParameter {
            name: "threshold_db",
            value,
        });
    }
    Ok(())
}

fn validate_ratio(value: f64) -> Result<(), CompressorError> {
    if value.is_nan() || value <= 0.0 {
        return Err(CompressorError::InvalidParameter {
            name: "ratio",
            value,
        });
    }
    Ok(())
}

fn validate_makeup(value: f64) -> Result<(), CompressorError> {
    if !value.is_finite() {
        return Err(CompressorError::InvalidParameter {
            name: "makeup_gain_db",
            value,
        });
    }
    Ok(())
}

fn validate_knee(value: f64) -> Result<(), CompressorError> {
    if !value.is_finite() || value < 0.0 {
        return Err(CompressorError::InvalidParameter {
            name: "knee_width_db",
            value,
        });
    }
    Ok(())
}

/// One array per parameter, one entry per bin
///
/// Arrays are never exposed mutably, so their length always equals the bin
/// count they were created with.
#[derive(Debug, Clone, PartialEq)]
pub struct BandParameters {
    threshold_db: Array1<f64>,
    ratio: Array1<f64>,
    makeup_gain_db: Array1<f64>,
    knee_width_db: Array1<f64>,
}

impl BandParameters {
    /// Same settings for every bin
    pub fn uniform(bins: usize, settings: BandSettings) -> Result<Self, CompressorError> {
        settings.validate()?;

        Ok(Self {
            threshold_db: Array1::from_elem(bins, settings.threshold_db),
            ratio: Array1::from_elem(bins, settings.ratio),
            makeup_gain_db: Array1::from_elem(bins, settings.makeup_gain_db),
            knee_width_db: Array1::from_elem(bins, settings.knee_width_db),
        })
    }

    pub fn len(&self) -> usize {
        self.threshold_db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_bin(&self, bin: usize) -> Result<(), CompressorError> {
        if bin >= self.len() {
            return Err(CompressorError::BinOutOfRange {
                bin,
                bins: self.len(),
            });
        }
        Ok(())
    }

    /// Settings of one bin
    pub fn get(&self, bin: usize) -> Result<BandSettings, CompressorError> {
        self.check_bin(bin)?;

        Ok(BandSettings {
            threshold_db: self.threshold_db[bin],
            ratio: self.ratio[bin],
            makeup_gain_db: self.makeup_gain_db[bin],
            knee_width_db: self.knee_width_db[bin],
        })
    }

    /// Apply an update to one bin
    ///
    /// Nothing is written unless the bin exists and every supplied value is
    /// valid. Returns the bin's settings after the update.
    pub fn update(&mut self, bin: usize, update: BandUpdate) -> Result<BandSettings, CompressorError> {
        self.check_bin(bin)?;
        update.validate()?;
        self.write(bin, update);
        self.get(bin)
    }

    /// Apply one update to several bins, all or nothing
    pub(crate) fn update_many<I>(&mut self, bins: I, update: BandUpdate) -> Result<usize, CompressorError>
    where
        I: IntoIterator<Item = usize>,
    {
        update.validate()?;

        let bins: Vec<usize> = bins.into_iter().collect();
        for &bin in &bins {
            self.check_bin(bin)?;
        }
        for &bin in &bins {
            self.write(bin, update);
        }
        Ok(bins.len())
    }

    fn write(&mut self, bin: usize, update: BandUpdate) {
        if let Some(v) = update.threshold_db {
            self.threshold_db[bin] = v;
        }
        if let Some(v) = update.ratio {
            self.ratio[bin] = v;
        }
        if let Some(v) = update.makeup_gain_db {
            self.makeup_gain_db[bin] = v;
        }
        if let Some(v) = update.knee_width_db {
            self.knee_width_db[bin] = v;
        }
    }

    pub fn threshold_db(&self) -> ArrayView1<f64> {
        self.threshold_db.view()
    }

    pub fn ratio(&self) -> ArrayView1<f64> {
        self.ratio.view()
    }

    pub fn makeup_gain_db(&self) -> ArrayView1<f64> {
        self.makeup_gain_db.view()
    }

    pub fn knee_width_db(&self) -> ArrayView1<f64> {
        self.knee_width_db.view()
    }
}

//! Static compression curve and dB helpers
//!
//! The curve maps an input level to the gain reduction it calls for, with no
//! memory. It is evaluated for every (batch, channel, bin) at once.

use ndarray::{Array3, ArrayView1, ArrayView3, Zip};

/// Linear magnitudes are clamped to this before taking a logarithm
pub const MAGNITUDE_FLOOR: f64 = 1e-8;

/// Linear amplitude to dB, floored so silent bins stay finite (-160 dB)
#[inline]
pub fn amplitude_to_db(amplitude: f64) -> f64 {
    20.0 * amplitude.max(MAGNITUDE_FLOOR).log10()
}

/// dB to linear amplitude
#[inline]
pub fn db_to_amplitude(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Gain reduction in dB for a single level
///
/// Hard knee (`knee_db == 0`): no reduction below threshold, otherwise
/// `(level - threshold) * (1 - 1/ratio)`.
///
/// Soft knee (`knee_db > 0`): inside `[threshold - knee/2, threshold + knee/2]`
/// the hard-knee term is scaled by `t²`, `t` being the normalised position
/// within the knee. Outside the knee the hard-knee formula applies.
#[inline]
pub fn static_reduction_db(level_db: f64, threshold_db: f64, ratio: f64, knee_db: f64) -> f64 {
    let slope = 1.0 - 1.0 / ratio;
    let over = level_db - threshold_db;

    if knee_db > 0.0 {
        let knee_start = threshold_db - knee_db / 2.0;
        let knee_end = threshold_db + knee_db / 2.0;
        if level_db >= knee_start && level_db <= knee_end {
            let t = ((level_db - knee_start) / knee_db).clamp(0.0, 1.0);
            return t * t * over * slope;
        }
    }

    if level_db < threshold_db {
        0.0
    } else {
        over * slope
    }
}

/// Instantaneous gain reduction for a whole (batch, channel, bin) level array
///
/// Per-bin parameters are broadcast across the batch and channel axes. Their
/// length must equal the bin axis of `level_db`.
pub fn gain_reduction_db(
    level_db: ArrayView3<f64>,
    threshold_db: ArrayView1<f64>,
    ratio: ArrayView1<f64>,
    knee_db: ArrayView1<f64>,
) -> Array3<f64> {
    let mut reduction = Array3::zeros(level_db.raw_dim());

    Zip::from(&mut reduction)
        .and(level_db)
        .and_broadcast(threshold_db)
        .and_broadcast(ratio)
        .and_broadcast(knee_db)
        .for_each(|out, &level, &threshold, &ratio, &knee| {
            *out = static_reduction_db(level, threshold, ratio, knee);
        });

    reduction
}

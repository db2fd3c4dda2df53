//! Window functions for analysis and synthesis framing
//!
//! All windows are symmetric (denominator M-1), so the same table is applied
//! before the forward transform and after the inverse transform.

use std::f64::consts::PI;

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowType {
    /// Hann window: w[n] = 0.5 - 0.5*cos(2πn/(M-1))
    /// Sidelobe attenuation: ~31 dB, endpoints are exactly zero
    #[default]
    Hann,

    /// Hamming window: w[n] = 0.54 - 0.46*cos(2πn/(M-1))
    Hamming,

    /// Blackman window: w[n] = 0.42 - 0.5*cos(2πn/(M-1)) + 0.08*cos(4πn/(M-1))
    Blackman,

    /// Rectangular window (no tapering)
    Rectangular,
}

impl WindowType {
    /// Short lowercase name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            WindowType::Hann => "hann",
            WindowType::Hamming => "hamming",
            WindowType::Blackman => "blackman",
            WindowType::Rectangular => "rectangular",
        }
    }

    /// Inverse of [`WindowType::name`], case-insensitive
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hann" | "hanning" => Some(WindowType::Hann),
            "hamming" => Some(WindowType::Hamming),
            "blackman" => Some(WindowType::Blackman),
            "rectangular" | "boxcar" => Some(WindowType::Rectangular),
            _ => None,
        }
    }
}

/// Generate window coefficients
///
/// # Arguments
/// * `window_type` - Type of window function
/// * `length` - Number of samples (M)
///
/// # Returns
/// Vector of window coefficients w[n] for n = 0..M-1
pub fn generate_window(window_type: WindowType, length: usize) -> Vec<f64> {
    // A single-point "window" has no taper to speak of
    if length <= 1 {
        return vec![1.0; length];
    }

    let denom = (length - 1) as f64;

    (0..length)
        .map(|n| {
            let angle = 2.0 * PI * n as f64 / denom;
            match window_type {
                WindowType::Hann => 0.5 - 0.5 * angle.cos(),
                WindowType::Hamming => 0.54 - 0.46 * angle.cos(),
                WindowType::Blackman => 0.42 - 0.5 * angle.cos() + 0.08 * (2.0 * angle).cos(),
                WindowType::Rectangular => 1.0,
            }
        })
        .collect()
}

/// Sum of squared window values landing on each sample of a padded buffer
///
/// This is the weight an analysis+synthesis windowed overlap-add leaves on
/// every output sample; dividing by it undoes the double windowing.
pub fn squared_overlap(window: &[f64], hop_size: usize, padded_len: usize) -> Vec<f64> {
    let mut envelope = vec![0.0; padded_len];
    let frame_len = window.len();

    if hop_size == 0 || padded_len < frame_len {
        return envelope;
    }

    let mut start = 0;
    while start + frame_len <= padded_len {
        for (slot, &w) in envelope[start..start + frame_len].iter_mut().zip(window) {
            *slot += w * w;
        }
        start += hop_size;
    }

    envelope
}

/// Divisor applied to each overlap-added sample
///
/// Samples covered by the full `window.len() / hop_size` frames get their
/// summed squared window, which restores unit gain. Samples near the block
/// edges, covered by fewer frames, get the steady-state mean `sum(w²) / hop`
/// instead, so the window taper fades them out.
pub fn normalization_weights(window: &[f64], hop_size: usize, padded_len: usize) -> Vec<f64> {
    let mut weights = squared_overlap(window, hop_size, padded_len);
    let frame_len = window.len();

    if hop_size == 0 || frame_len == 0 || padded_len < frame_len {
        return weights;
    }

    let frames = (padded_len - frame_len) / hop_size + 1;
    let full = (frame_len / hop_size).max(1);
    let steady = window.iter().map(|w| w * w).sum::<f64>() / hop_size as f64;

    for (n, weight) in weights.iter_mut().enumerate() {
        let last = (n / hop_size).min(frames - 1);
        let first = if n >= frame_len {
            (n - frame_len) / hop_size + 1
        } else {
            0
        };
        let covering = (last + 1).saturating_sub(first);

        if covering < full {
            *weight = steady;
        }
    }

    weights
}

/// Smallest summed squared window inside the fully overlapped region
///
/// Zero means some interior sample is not covered by any window mass, so the
/// overlap-add cannot reconstruct it.
pub fn min_steady_overlap(window: &[f64], hop_size: usize) -> f64 {
    let frame_len = window.len();
    if frame_len == 0 || hop_size == 0 || hop_size > frame_len {
        return 0.0;
    }

    let envelope = squared_overlap(window, hop_size, 2 * frame_len);
    envelope[frame_len - hop_size..frame_len]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

//! Spectral framing: windows, real FFT, and overlap-add

pub mod fft;
pub mod framer;
pub mod windowing;

pub use fft::FftEngine;
pub use framer::{Frame, Framer};
pub use windowing::{generate_window, WindowType};

//! Magnitude spectrum primitive
//!
//! The spectral engine only needs magnitudes indexed by frequency bin, so the
//! FFT sits behind [`MagnitudeSpectrum`]. Bin `k` of the output corresponds to
//! `k * sample_rate / size` Hz.

use std::sync::Arc;

use apodize::hanning_iter;
use biosignal_types::WindowFunction;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Computes the one-sided magnitude spectrum of a real window.
pub trait MagnitudeSpectrum: Send {
    /// Window length the transform is planned for.
    fn size(&self) -> usize;

    /// Magnitudes of bins `0..size / 2`.
    ///
    /// A window shorter than `size` is zero-padded; extra samples beyond
    /// `size` are ignored.
    fn magnitudes(&mut self, window: &[f32]) -> Vec<f32>;
}

/// [`MagnitudeSpectrum`] backed by `rustfft`.
pub struct RustFftSpectrum {
    fft: Arc<dyn Fft<f32>>,
    taper: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl RustFftSpectrum {
    pub fn new(size: usize, window_function: WindowFunction) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        let taper = match window_function {
            WindowFunction::Hann => hanning_iter(size).map(|v| v as f32).collect(),
            WindowFunction::Rectangular => vec![1.0; size],
        };
        Self {
            fft,
            taper,
            buffer: Vec::with_capacity(size),
        }
    }
}

impl MagnitudeSpectrum for RustFftSpectrum {
    fn size(&self) -> usize {
        self.taper.len()
    }

    fn magnitudes(&mut self, window: &[f32]) -> Vec<f32> {
        let size = self.size();
        self.buffer.clear();
        self.buffer.extend(
            self.taper
                .iter()
                .enumerate()
                .map(|(i, &w)| Complex::new(window.get(i).copied().unwrap_or(0.0) * w, 0.0)),
        );

        self.fft.process(&mut self.buffer);

        self.buffer.iter().take(size / 2).map(|c| c.norm()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_pure_tone_peaks_at_its_bin() {
        let size = 256;
        let fs = 256.0;
        let window: Vec<f32> = (0..size).map(|i| (2.0 * PI * 16.0 * i as f32 / fs).sin()).collect();

        let mut spectrum = RustFftSpectrum::new(size, WindowFunction::Rectangular);
        let mags = spectrum.magnitudes(&window);
        assert_eq!(mags.len(), size / 2);

        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 16);
        // A bin-centred unit sine has magnitude N/2 with a rectangular window.
        assert!((mags[16] - 128.0).abs() < 1e-2);
    }

    #[test]
    fn test_zero_window_gives_zero_spectrum() {
        let mut spectrum = RustFftSpectrum::new(64, WindowFunction::Hann);
        let mags = spectrum.magnitudes(&[0.0; 64]);
        assert!(mags.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_short_window_is_zero_padded() {
        let mut spectrum = RustFftSpectrum::new(32, WindowFunction::Rectangular);
        let mags = spectrum.magnitudes(&[1.0; 4]);
        assert_eq!(mags.len(), 16);
        assert!((mags[0] - 4.0).abs() < 1e-5);
    }
}

//! Spectral power engine
//!
//! Integrates squared FFT magnitudes over the configured EEG bands, turns
//! them into fractions of the channel's total band power and smooths each
//! fraction with a moving average.

use biosignal_types::{
    Band, BandPowers, BandRange, BandRanges, Channel, ChannelBandPower, SpectralConfig, SpectralUpdate,
    WindowFunction,
};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::spectrum::{MagnitudeSpectrum, RustFftSpectrum};

/// Snapshot of both EEG windows handed to the spectral engine.
#[derive(Debug, Clone)]
pub struct SpectralRequest {
    pub session_id: Uuid,
    pub sample_index: u64,
    pub eeg_a: Vec<f32>,
    pub eeg_b: Vec<f32>,
    pub sample_rate: f32,
    pub fft_size: usize,
}

/// Inclusive bin range `[max(1, floor(low/res)), min(n/2 - 1, floor(high/res))]`.
///
/// Returns `None` when the range is empty.
pub fn band_bins(range: BandRange, resolution: f32, fft_size: usize) -> Option<(usize, usize)> {
    let last = (fft_size / 2).checked_sub(1)?;
    let low = ((range.low_hz / resolution).floor() as usize).max(1);
    let high = ((range.high_hz / resolution).floor() as usize).min(last);
    (low <= high).then_some((low, high))
}

/// Sum of squared magnitudes over a band.
pub fn band_power(magnitudes: &[f32], range: BandRange, resolution: f32, fft_size: usize) -> f32 {
    match band_bins(range, resolution, fft_size) {
        Some((low, high)) => magnitudes
            .get(low..=high.min(magnitudes.len().saturating_sub(1)))
            .map(|bins| bins.iter().map(|m| m * m).sum())
            .unwrap_or(0.0),
        None => 0.0,
    }
}

/// Divide each band by the total; an all-zero input stays all zero.
pub fn relative_fractions(powers: [f32; 5]) -> [f32; 5] {
    let total: f32 = powers.iter().sum();
    if !(total > 0.0) {
        return [0.0; 5];
    }
    powers.map(|p| p / total)
}

/// Moving average over a fixed-size circular history.
///
/// The running sum is updated in O(1): the new value is added and the value
/// it evicts is subtracted.
#[derive(Debug, Clone)]
pub struct BandPowerState {
    history: Vec<f32>,
    next: usize,
    filled: usize,
    sum: f32,
}

impl BandPowerState {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: vec![0.0; capacity.max(1)],
            next: 0,
            filled: 0,
            sum: 0.0,
        }
    }

    /// Push a value and return the average of the retained history.
    pub fn push(&mut self, value: f32) -> f32 {
        if self.filled == self.history.len() {
            self.sum -= self.history[self.next];
        } else {
            self.filled += 1;
        }
        self.history[self.next] = value;
        self.sum += value;
        self.next = (self.next + 1) % self.history.len();
        self.average()
    }

    pub fn average(&self) -> f32 {
        if self.filled == 0 {
            0.0
        } else {
            self.sum / self.filled as f32
        }
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.history.len()
    }
}

struct ChannelSmoother {
    channel: Channel,
    bands: [BandPowerState; 5],
}

/// Owns the FFT plan and the per-channel, per-band smoothing state.
pub struct SpectralEngine {
    spectrum: Box<dyn MagnitudeSpectrum>,
    window_function: WindowFunction,
    bands: BandRanges,
    smoothers: Vec<ChannelSmoother>,
}

impl SpectralEngine {
    pub fn new(config: &SpectralConfig) -> Self {
        let spectrum = Box::new(RustFftSpectrum::new(config.fft_size, config.window_function));
        let smoothers = Channel::EEG
            .iter()
            .map(|&channel| ChannelSmoother {
                channel,
                bands: std::array::from_fn(|_| BandPowerState::new(config.smoothing_len)),
            })
            .collect();
        Self {
            spectrum,
            window_function: config.window_function,
            bands: config.bands.clone(),
            smoothers,
        }
    }

    /// Size the transform is currently planned for.
    pub fn fft_size(&self) -> usize {
        self.spectrum.size()
    }

    /// Replan the transform if a request asks for a different size.
    fn ensure_fft_size(&mut self, fft_size: usize) {
        if fft_size >= 2 && fft_size != self.spectrum.size() {
            debug!(planned = self.spectrum.size(), requested = fft_size, "Replanning FFT");
            self.spectrum = Box::new(RustFftSpectrum::new(fft_size, self.window_function));
        }
    }

    /// Unsmoothed band powers of one window.
    pub fn band_powers(&mut self, window: &[f32], sample_rate: f32) -> [f32; 5] {
        let fft_size = self.spectrum.size();
        let resolution = sample_rate / fft_size as f32;
        let magnitudes = self.spectrum.magnitudes(window);
        Band::ALL.map(|band| band_power(&magnitudes, self.bands.get(band), resolution, fft_size))
    }

    /// Analyse both EEG windows and fold the fractions into the smoothers.
    pub fn process(&mut self, request: &SpectralRequest) -> SpectralUpdate {
        self.ensure_fft_size(request.fft_size);
        let windows = [&request.eeg_a, &request.eeg_b];
        let mut channels = Vec::with_capacity(windows.len());

        for (i, window) in windows.iter().enumerate() {
            let fractions = relative_fractions(self.band_powers(window, request.sample_rate));
            let smoother = &mut self.smoothers[i];
            let mut smoothed = [0.0; 5];
            for (slot, (state, fraction)) in smoothed.iter_mut().zip(smoother.bands.iter_mut().zip(fractions)) {
                *slot = state.push(fraction);
            }
            channels.push(ChannelBandPower {
                channel: smoother.channel,
                relative: BandPowers::from_array(smoothed),
            });
        }

        trace!(sample_index = request.sample_index, "Spectral update computed");
        SpectralUpdate {
            session_id: request.session_id,
            sample_index: request.sample_index,
            channels,
        }
    }
}

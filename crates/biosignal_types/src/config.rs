//! Configuration types for a pipeline session

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::PacketLayout;
use crate::event::Band;

/// Errors reported by [`PipelineConfig::validate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be positive, got {0}")]
    SampleRate(f32),
    #[error("adc_bits must be between 2 and 16, got {0}")]
    AdcBits(u8),
    #[error("fft_size must be a power of two >= 8, got {0}")]
    FftSize(usize),
    #[error("{name} ({value} Hz) must be below Nyquist ({nyquist} Hz)")]
    AboveNyquist { name: &'static str, value: f32, nyquist: f32 },
    #[error("invalid range for {name}: {low} Hz .. {high} Hz")]
    Range { name: String, low: f32, high: f32 },
    #[error("{0} must be at least {1}")]
    TooSmall(&'static str, usize),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Full configuration of a pipeline session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate shared by all channels, in Hz
    pub sample_rate_hz: f32,
    /// Wire layout of incoming records
    pub packet_layout: PacketLayout,
    /// ADC resolution of the raw channel codes
    pub adc_bits: u8,
    pub filter: FilterConfig,
    pub spectral: SpectralConfig,
    pub cardiac: CardiacConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 500.0,
            packet_layout: PacketLayout::Counted,
            adc_bits: 12,
            filter: FilterConfig::default(),
            spectral: SpectralConfig::default(),
            cardiac: CardiacConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Raw code corresponding to zero volts.
    pub fn adc_midpoint(&self) -> f32 {
        (1u32 << (self.adc_bits - 1)) as f32
    }

    /// Number of distinct raw codes.
    pub fn adc_full_scale(&self) -> f32 {
        (1u32 << self.adc_bits) as f32
    }

    pub fn nyquist_hz(&self) -> f32 {
        self.sample_rate_hz * 0.5
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(ConfigError::SampleRate(self.sample_rate_hz));
        }
        if !(2..=16).contains(&self.adc_bits) {
            return Err(ConfigError::AdcBits(self.adc_bits));
        }
        let nyquist = self.nyquist_hz();
        self.filter.validate(nyquist)?;
        self.spectral.validate()?;
        self.cardiac.validate()?;
        Ok(())
    }
}

/// Per-channel IIR filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Mains notch frequency in Hz
    pub notch_hz: f32,
    /// Notch quality factor (higher is narrower)
    pub notch_q: f32,
    /// Lower edge of the EEG band-pass in Hz
    pub eeg_band_low_hz: f32,
    /// Upper edge of the EEG band-pass in Hz
    pub eeg_band_high_hz: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            notch_hz: 50.0,
            notch_q: 30.0,
            eeg_band_low_hz: 0.5,
            eeg_band_high_hz: 45.0,
        }
    }
}

impl FilterConfig {
    fn validate(&self, nyquist: f32) -> Result<(), ConfigError> {
        if !(self.notch_hz > 0.0) || self.notch_hz >= nyquist {
            return Err(ConfigError::AboveNyquist { name: "notch_hz", value: self.notch_hz, nyquist });
        }
        if !(self.notch_q > 0.0) {
            return Err(ConfigError::Invalid("notch_q", self.notch_q.to_string()));
        }
        if !(self.eeg_band_low_hz > 0.0 && self.eeg_band_high_hz > self.eeg_band_low_hz) {
            return Err(ConfigError::Range {
                name: "eeg band-pass".to_string(),
                low: self.eeg_band_low_hz,
                high: self.eeg_band_high_hz,
            });
        }
        if self.eeg_band_high_hz >= nyquist {
            return Err(ConfigError::AboveNyquist {
                name: "eeg_band_high_hz",
                value: self.eeg_band_high_hz,
                nyquist,
            });
        }
        Ok(())
    }
}

/// Taper applied to a window before the FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
}

/// A frequency interval in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl BandRange {
    pub const fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }
}

/// Frequency ranges of the named EEG bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandRanges {
    pub delta: BandRange,
    pub theta: BandRange,
    pub alpha: BandRange,
    pub beta: BandRange,
    pub gamma: BandRange,
}

impl Default for BandRanges {
    fn default() -> Self {
        Self {
            delta: BandRange::new(0.5, 4.0),
            theta: BandRange::new(4.0, 8.0),
            alpha: BandRange::new(8.0, 12.0),
            beta: BandRange::new(12.0, 30.0),
            gamma: BandRange::new(30.0, 45.0),
        }
    }
}

impl BandRanges {
    pub fn get(&self, band: Band) -> BandRange {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }
}

/// Spectral power engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// EEG window length and FFT size (power of two)
    pub fft_size: usize,
    /// Issue a spectral request every this many accepted samples
    pub trigger_every: usize,
    /// Length of the per-band moving average
    pub smoothing_len: usize,
    pub window_function: WindowFunction,
    pub bands: BandRanges,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            trigger_every: 5,
            smoothing_len: 8,
            window_function: WindowFunction::Hann,
            bands: BandRanges::default(),
        }
    }
}

impl SpectralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fft_size < 8 || !self.fft_size.is_power_of_two() {
            return Err(ConfigError::FftSize(self.fft_size));
        }
        if self.trigger_every == 0 {
            return Err(ConfigError::TooSmall("spectral.trigger_every", 1));
        }
        if self.smoothing_len == 0 {
            return Err(ConfigError::TooSmall("spectral.smoothing_len", 1));
        }
        for band in Band::ALL {
            let range = self.bands.get(band);
            if !(range.low_hz >= 0.0 && range.high_hz > range.low_hz) {
                return Err(ConfigError::Range {
                    name: band.name().to_string(),
                    low: range.low_hz,
                    high: range.high_hz,
                });
            }
        }
        Ok(())
    }
}

/// Beat detector and BPM smoothing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardiacConfig {
    /// ECG sliding window length in samples
    pub window_len: usize,
    /// Issue a beat request every this many accepted samples
    pub trigger_every: usize,
    /// Minimum spacing between accepted beats, in seconds
    pub refractory_secs: f32,
    /// Lowest plausible instantaneous BPM
    pub min_bpm: f32,
    /// Highest plausible instantaneous BPM
    pub max_bpm: f32,
    /// Number of recent BPM estimates averaged for display
    pub smoothing_len: usize,
    /// Number of recent inter-beat intervals retained
    pub interval_history_len: usize,
    /// Largest change of the displayed BPM per update
    pub max_step_bpm: f32,
}

impl Default for CardiacConfig {
    fn default() -> Self {
        Self {
            window_len: 2500,
            trigger_every: 500,
            refractory_secs: 0.2,
            min_bpm: 40.0,
            max_bpm: 200.0,
            smoothing_len: 5,
            interval_history_len: 5,
            max_step_bpm: 2.0,
        }
    }
}

impl CardiacConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.window_len < 3 {
            return Err(ConfigError::TooSmall("cardiac.window_len", 3));
        }
        if self.trigger_every == 0 {
            return Err(ConfigError::TooSmall("cardiac.trigger_every", 1));
        }
        if self.smoothing_len == 0 {
            return Err(ConfigError::TooSmall("cardiac.smoothing_len", 1));
        }
        if self.interval_history_len == 0 {
            return Err(ConfigError::TooSmall("cardiac.interval_history_len", 1));
        }
        if !(self.refractory_secs >= 0.0) {
            return Err(ConfigError::Invalid("cardiac.refractory_secs", self.refractory_secs.to_string()));
        }
        if !(self.max_step_bpm > 0.0) {
            return Err(ConfigError::Invalid("cardiac.max_step_bpm", self.max_step_bpm.to_string()));
        }
        if !(self.min_bpm > 0.0 && self.max_bpm > self.min_bpm) {
            return Err(ConfigError::Range {
                name: "cardiac bpm".to_string(),
                low: self.min_bpm,
                high: self.max_bpm,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.adc_midpoint(), 2048.0);
        assert_eq!(config.adc_full_scale(), 4096.0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();
        config.spectral.fft_size = 250; // Not a power of 2
        assert_eq!(config.validate(), Err(ConfigError::FftSize(250)));

        let mut config = PipelineConfig::default();
        config.sample_rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.filter.notch_hz = 260.0;
        assert!(matches!(config.validate(), Err(ConfigError::AboveNyquist { .. })));

        let mut config = PipelineConfig::default();
        config.spectral.bands.alpha = BandRange::new(12.0, 8.0);
        assert!(matches!(config.validate(), Err(ConfigError::Range { .. })));

        let mut config = PipelineConfig::default();
        config.cardiac.window_len = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "sample_rate_hz": 250.0, "spectral": { "fft_size": 128 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sample_rate_hz, 250.0);
        assert_eq!(config.spectral.fft_size, 128);
        assert_eq!(config.spectral.trigger_every, 5);
        assert_eq!(config.cardiac, CardiacConfig::default());
        assert!(config.validate().is_ok());
    }
}

//! Per-channel IIR filter chain
//!
//! Each channel owns one [`ChannelFilter`]: a mains notch on the raw ADC
//! code, normalization to a symmetric range, and for EEG channels a
//! band-pass built from a high-pass/low-pass biquad cascade.
//!
//! Biquad state is order-dependent. A chain must see samples exactly once
//! and in arrival order; everything here takes `&mut self` so a single
//! owner drives it.

use biosignal_types::{Channel, ChannelKind, PipelineConfig, RawSample, CHANNEL_COUNT};
use biquad::{Biquad, Coefficients, DirectForm2Transposed as DF2T, ToHertz, Type, Q_BUTTERWORTH_F32};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Coefficients shared by every channel of a session.
#[derive(Debug, Clone, Copy)]
struct ChainCoefficients {
    notch: Coefficients<f32>,
    high_pass: Coefficients<f32>,
    low_pass: Coefficients<f32>,
}

impl ChainCoefficients {
    fn design(config: &PipelineConfig) -> PipelineResult<Self> {
        let fs = config.sample_rate_hz.hz();
        let filter = &config.filter;

        let notch = Coefficients::<f32>::from_params(Type::Notch, fs, filter.notch_hz.hz(), filter.notch_q)
            .map_err(|e| PipelineError::FilterDesign { filter: "notch", message: format!("{:?}", e) })?;
        let high_pass =
            Coefficients::<f32>::from_params(Type::HighPass, fs, filter.eeg_band_low_hz.hz(), Q_BUTTERWORTH_F32)
                .map_err(|e| PipelineError::FilterDesign { filter: "high_pass", message: format!("{:?}", e) })?;
        let low_pass =
            Coefficients::<f32>::from_params(Type::LowPass, fs, filter.eeg_band_high_hz.hz(), Q_BUTTERWORTH_F32)
                .map_err(|e| PipelineError::FilterDesign { filter: "low_pass", message: format!("{:?}", e) })?;

        Ok(Self { notch, high_pass, low_pass })
    }
}

struct BandPass {
    hp: DF2T<f32>,
    lp: DF2T<f32>,
}

/// Filter state for one channel.
pub struct ChannelFilter {
    channel: Channel,
    notch: DF2T<f32>,
    band_pass: Option<BandPass>,
    midpoint: f32,
    scale: f32,
}

impl ChannelFilter {
    fn new(channel: Channel, coeffs: &ChainCoefficients, midpoint: f32, full_scale: f32) -> Self {
        let band_pass = match channel.kind() {
            ChannelKind::Eeg => Some(BandPass {
                hp: DF2T::<f32>::new(coeffs.high_pass),
                lp: DF2T::<f32>::new(coeffs.low_pass),
            }),
            ChannelKind::Ecg => None,
        };
        Self {
            channel,
            notch: DF2T::<f32>::new(coeffs.notch),
            band_pass,
            midpoint,
            scale: 2.0 / full_scale,
        }
    }

    /// Run one raw code through the chain.
    pub fn run(&mut self, raw: u16) -> f32 {
        let notched = self.notch.run(raw as f32);
        let normalized = (notched - self.midpoint) * self.scale;
        match &mut self.band_pass {
            Some(bp) => bp.lp.run(bp.hp.run(normalized)),
            None => normalized,
        }
    }
}

/// One [`ChannelFilter`] per channel, applied to whole records.
pub struct FilterBank {
    chains: Vec<ChannelFilter>,
}

impl FilterBank {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        let coeffs = ChainCoefficients::design(config)?;
        let midpoint = config.adc_midpoint();
        let full_scale = config.adc_full_scale();
        debug!(
            sample_rate = config.sample_rate_hz,
            notch_hz = config.filter.notch_hz,
            band_low = config.filter.eeg_band_low_hz,
            band_high = config.filter.eeg_band_high_hz,
            "Designed filter bank"
        );
        let chains = Channel::ALL
            .iter()
            .map(|&ch| ChannelFilter::new(ch, &coeffs, midpoint, full_scale))
            .collect();
        Ok(Self { chains })
    }

    /// Filter one record; returns values indexed by [`Channel::index`].
    pub fn apply(&mut self, sample: &RawSample) -> [f32; CHANNEL_COUNT] {
        let mut out = [0.0; CHANNEL_COUNT];
        for (chain, slot) in self.chains.iter_mut().zip(out.iter_mut()) {
            *slot = chain.run(sample.value(chain.channel));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_record(i: usize, freq: f32, fs: f32, amplitude: f32) -> RawSample {
        let v = (2048.0 + amplitude * (2.0 * PI * freq * i as f32 / fs).sin()).round() as u16;
        RawSample { counter: i as u8, values: [v, v, v] }
    }

    fn rms(values: &[f32]) -> f32 {
        (values.iter().map(|v| v * v).sum::<f32>() / values.len() as f32).sqrt()
    }

    #[test]
    fn test_identical_input_is_bit_reproducible() {
        let config = PipelineConfig::default();
        let input: Vec<RawSample> = (0..2000).map(|i| sine_record(i, 11.0, 500.0, 700.0)).collect();

        let mut a = FilterBank::new(&config).unwrap();
        let mut b = FilterBank::new(&config).unwrap();
        for sample in &input {
            let ya = a.apply(sample);
            let yb = b.apply(sample);
            for ch in 0..CHANNEL_COUNT {
                assert_eq!(ya[ch].to_bits(), yb[ch].to_bits());
            }
        }
    }

    #[test]
    fn test_reordered_input_changes_trajectory() {
        let config = PipelineConfig::default();
        let input: Vec<RawSample> = (0..400).map(|i| sine_record(i, 7.0, 500.0, 900.0)).collect();
        let mut swapped = input.clone();
        swapped.swap(100, 101);

        let mut a = FilterBank::new(&config).unwrap();
        let mut b = FilterBank::new(&config).unwrap();
        let out_a: Vec<[f32; 3]> = input.iter().map(|s| a.apply(s)).collect();
        let out_b: Vec<[f32; 3]> = swapped.iter().map(|s| b.apply(s)).collect();

        assert_eq!(out_a[..100], out_b[..100]);
        assert_ne!(out_a[150], out_b[150]);
    }

    #[test]
    fn test_notch_removes_mains() {
        let config = PipelineConfig::default();
        let mut bank = FilterBank::new(&config).unwrap();
        let out: Vec<f32> = (0..1000)
            .map(|i| bank.apply(&sine_record(i, 50.0, 500.0, 400.0))[Channel::Ecg.index()])
            .collect();
        let input_rms = 400.0 * (2.0 / 4096.0) / 2f32.sqrt();
        assert!(rms(&out[750..]) < 0.1 * input_rms);
    }

    #[test]
    fn test_eeg_passband_preserved_and_dc_removed() {
        let config = PipelineConfig::default();
        let mut bank = FilterBank::new(&config).unwrap();
        let out: Vec<[f32; 3]> = (0..3000).map(|i| bank.apply(&sine_record(i, 10.0, 500.0, 400.0))).collect();
        let eeg: Vec<f32> = out[2000..].iter().map(|v| v[Channel::EegA.index()]).collect();
        let expected = 400.0 * (2.0 / 4096.0) / 2f32.sqrt();
        let ratio = rms(&eeg) / expected;
        assert!(ratio > 0.8 && ratio < 1.2, "passband ratio {}", ratio);

        let mean: f32 = eeg.iter().sum::<f32>() / eeg.len() as f32;
        assert!(mean.abs() < 0.01);
    }

    #[test]
    fn test_ecg_is_normalized_without_band_pass() {
        let config = PipelineConfig::default();
        let mut bank = FilterBank::new(&config).unwrap();
        let mut last = [0.0; 3];
        for _ in 0..2000 {
            last = bank.apply(&RawSample { counter: 0, values: [3072, 3072, 3072] });
        }
        // DC survives the notch on the ECG channel: (3072 - 2048) * 2 / 4096
        assert!((last[Channel::Ecg.index()] - 0.5).abs() < 1e-3);
        // The EEG high-pass removes it.
        assert!(last[Channel::EegA.index()].abs() < 0.05);
    }
}

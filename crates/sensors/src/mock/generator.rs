use std::f32::consts::PI;

use biosignal_types::{RawSample, CHANNEL_COUNT};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::types::SensorError;

/// Centre frequencies of the delta, theta, alpha, beta and gamma components.
const BAND_FREQS: [f32; 5] = [2.5, 6.0, 10.0, 20.0, 40.0];

/// Per-channel band weights: [delta, theta, alpha, beta, gamma]
const EEG_WEIGHTS: [[f32; 5]; 2] = [
    [1.5, 1.0, 2.5, 0.7, 0.1], // Parietal - stronger alpha
    [1.2, 0.8, 3.0, 0.5, 0.1], // Occipital - strongest alpha
];

/// ADC codes per unit of band weight
const EEG_SCALE: f32 = 60.0;
const MAINS_HZ: f32 = 50.0;
const NOISE_STD: f32 = 4.0;

/// R wave: offset after the beat start, width and height in ADC codes
const R_OFFSET_SECS: f32 = 0.1;
const R_WIDTH_SECS: f32 = 0.01;
const R_HEIGHT: f32 = 1500.0;
/// T wave, relative to the R wave
const T_DELAY_SECS: f32 = 0.25;
const T_WIDTH_SECS: f32 = 0.04;
const T_HEIGHT: f32 = 250.0;

/// Generates two EEG-like channels and one ECG-like channel as raw ADC codes.
///
/// EEG is a mix of one oscillator per band plus 50 Hz mains pickup and
/// gaussian noise. ECG is a train of narrow R waves followed by a broad T
/// wave at a fixed heart rate.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    sample_rate: f32,
    midpoint: f32,
    max_code: f32,
    band_phases: [[f32; 5]; 2],
    mains_phase: f32,
    mains_amplitude: [f32; 2],
    beat_period: f32,
    since_beat: f32,
    noise: Normal<f32>,
    rng: StdRng,
}

impl SignalGenerator {
    pub fn new(
        sample_rate: f32,
        adc_bits: u8,
        heart_rate_bpm: f32,
        seed: Option<u64>,
    ) -> Result<Self, SensorError> {
        if !(sample_rate > 0.0) {
            return Err(SensorError::Configuration(format!("invalid sample rate {sample_rate}")));
        }
        if !(2..=16).contains(&adc_bits) {
            return Err(SensorError::Configuration(format!("invalid adc_bits {adc_bits}")));
        }
        if !(heart_rate_bpm > 0.0) {
            return Err(SensorError::Configuration(format!("invalid heart rate {heart_rate_bpm}")));
        }
        let noise = Normal::new(0.0, NOISE_STD).map_err(|e| SensorError::Configuration(e.to_string()))?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // Random starting phases so the channels are not in lock-step
        let mut band_phases = [[0.0; 5]; 2];
        for phases in band_phases.iter_mut() {
            for phase in phases.iter_mut() {
                *phase = rng.gen::<f32>() * 2.0 * PI;
            }
        }
        let mains_amplitude = [rng.gen_range(20.0..60.0), rng.gen_range(20.0..60.0)];

        debug!("Initializing signal generator: {} Hz, {} bits, {} BPM", sample_rate, adc_bits, heart_rate_bpm);

        Ok(Self {
            sample_rate,
            midpoint: (1u32 << (adc_bits - 1)) as f32,
            max_code: ((1u32 << adc_bits) - 1) as f32,
            band_phases,
            mains_phase: 0.0,
            mains_amplitude,
            beat_period: 60.0 / heart_rate_bpm * sample_rate,
            since_beat: 0.0,
            noise,
            rng,
        })
    }

    /// Produce the next record, stamped with `counter`.
    pub fn next_record(&mut self, counter: u8) -> RawSample {
        let mut values = [0u16; CHANNEL_COUNT];
        for (ch, value) in values.iter_mut().take(2).enumerate() {
            let offset = self.eeg(ch);
            *value = self.quantize(offset);
        }
        let ecg = self.ecg();
        values[2] = self.quantize(ecg);
        self.advance();
        RawSample { counter, values }
    }

    fn eeg(&mut self, ch: usize) -> f32 {
        let bands: f32 = self.band_phases[ch]
            .iter()
            .zip(EEG_WEIGHTS[ch])
            .map(|(phase, weight)| phase.sin() * weight)
            .sum();
        let mains = self.mains_phase.sin() * self.mains_amplitude[ch];
        bands * EEG_SCALE + mains + self.noise.sample(&mut self.rng)
    }

    fn ecg(&mut self) -> f32 {
        let t = self.since_beat / self.sample_rate;
        let r = gaussian(t - R_OFFSET_SECS, R_WIDTH_SECS) * R_HEIGHT;
        let tw = gaussian(t - R_OFFSET_SECS - T_DELAY_SECS, T_WIDTH_SECS) * T_HEIGHT;
        r + tw + self.noise.sample(&mut self.rng)
    }

    fn advance(&mut self) {
        for phases in self.band_phases.iter_mut() {
            for (phase, freq) in phases.iter_mut().zip(BAND_FREQS) {
                *phase = (*phase + 2.0 * PI * freq / self.sample_rate) % (2.0 * PI);
            }
        }
        self.mains_phase = (self.mains_phase + 2.0 * PI * MAINS_HZ / self.sample_rate) % (2.0 * PI);

        self.since_beat += 1.0;
        if self.since_beat >= self.beat_period {
            self.since_beat -= self.beat_period;
        }
    }

    fn quantize(&self, offset: f32) -> u16 {
        (self.midpoint + offset).round().clamp(0.0, self.max_code) as u16
    }
}

fn gaussian(x: f32, width: f32) -> f32 {
    (-(x * x) / (2.0 * width * width)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising_edges(values: &[u16], level: u16) -> Vec<usize> {
        (1..values.len()).filter(|&i| values[i] > level && values[i - 1] <= level).collect()
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(SignalGenerator::new(0.0, 12, 60.0, None).is_err());
        assert!(SignalGenerator::new(500.0, 1, 60.0, None).is_err());
        assert!(SignalGenerator::new(500.0, 12, 0.0, None).is_err());
    }

    #[test]
    fn test_seeded_generator_is_reproducible() {
        let mut a = SignalGenerator::new(500.0, 12, 60.0, Some(7)).unwrap();
        let mut b = SignalGenerator::new(500.0, 12, 60.0, Some(7)).unwrap();
        for i in 0..100u8 {
            assert_eq!(a.next_record(i), b.next_record(i));
        }
    }

    #[test]
    fn test_codes_stay_in_adc_range() {
        let mut gen = SignalGenerator::new(500.0, 12, 120.0, Some(1)).unwrap();
        for i in 0..5000u32 {
            let record = gen.next_record(i as u8);
            assert_eq!(record.counter, i as u8);
            assert!(record.values.iter().all(|&v| v < 4096));
        }
    }

    #[test]
    fn test_ecg_beats_at_configured_rate() {
        let mut gen = SignalGenerator::new(500.0, 12, 60.0, Some(3)).unwrap();
        let ecg: Vec<u16> = (0..2500).map(|i| gen.next_record(i as u8).values[2]).collect();
        let beats = rising_edges(&ecg, 2048 + 1000);
        assert_eq!(beats.len(), 5);
        for pair in beats.windows(2) {
            assert_eq!(pair[1] - pair[0], 500);
        }
    }

    #[test]
    fn test_eeg_is_centred_on_midpoint() {
        let mut gen = SignalGenerator::new(500.0, 12, 60.0, Some(9)).unwrap();
        let n = 5000;
        let sum: f64 = (0..n).map(|i| gen.next_record(i as u8).values[0] as f64).sum();
        let mean = sum / n as f64;
        assert!((mean - 2048.0).abs() < 20.0, "mean {mean}");
    }
}

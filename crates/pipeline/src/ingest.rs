//! Ordered ingestion path
//!
//! [`Ingestor`] is the only owner of the decoder, the filter bank and the
//! window buffers. It runs synchronously on the caller's task, never waits on
//! the analysis engines, and hands them copied snapshots when their cadence
//! counters fire.

use biosignal_types::{Channel, DecodeStats, FilteredSample, PipelineConfig, SessionStats};
use tracing::debug;
use uuid::Uuid;

use crate::band_power::SpectralRequest;
use crate::cardiac::BeatRequest;
use crate::decoder::PacketDecoder;
use crate::error::PipelineResult;
use crate::filters::FilterBank;
use crate::window::WindowBuffer;

/// Everything produced by one payload.
#[derive(Debug, Default)]
pub struct IngestOutput {
    /// Filtered samples, in arrival order
    pub samples: Vec<FilteredSample>,
    /// Spectral snapshots, oldest first
    pub spectral: Vec<SpectralRequest>,
    /// Beat snapshots, oldest first
    pub beat: Vec<BeatRequest>,
    /// Set when a loss counter moved while handling this payload
    pub loss: Option<DecodeStats>,
}

/// Sample-rate path from raw payload to analysis requests.
pub struct Ingestor {
    session_id: Uuid,
    sample_rate: f32,
    fft_size: usize,
    spectral_every: usize,
    beat_every: usize,
    decoder: PacketDecoder,
    filters: FilterBank,
    eeg_windows: [WindowBuffer; 2],
    ecg_window: WindowBuffer,
    next_index: u64,
    since_spectral: usize,
    since_beat: usize,
    spectral_requests: u64,
    beat_requests: u64,
}

impl Ingestor {
    pub fn new(session_id: Uuid, config: &PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let fft_size = config.spectral.fft_size;
        Ok(Self {
            session_id,
            sample_rate: config.sample_rate_hz,
            fft_size,
            spectral_every: config.spectral.trigger_every,
            beat_every: config.cardiac.trigger_every,
            decoder: PacketDecoder::new(config.packet_layout),
            filters: FilterBank::new(config)?,
            eeg_windows: [WindowBuffer::new(fft_size), WindowBuffer::new(fft_size)],
            ecg_window: WindowBuffer::new(config.cardiac.window_len),
            next_index: 0,
            since_spectral: 0,
            since_beat: 0,
            spectral_requests: 0,
            beat_requests: 0,
        })
    }

    /// Decode, filter and window one payload.
    ///
    /// A misframed payload contributes nothing except a framing-error count.
    pub fn ingest(&mut self, payload: &[u8]) -> IngestOutput {
        let before = self.decoder.stats();
        let mut out = IngestOutput::default();

        match self.decoder.decode(payload) {
            Ok(records) => {
                out.samples.reserve(records.len());
                for record in &records {
                    let values = self.filters.apply(record);
                    let sample = FilteredSample { index: self.next_index, values };
                    self.next_index += 1;
                    self.push_windows(&sample);
                    self.check_cadence(&sample, &mut out);
                    out.samples.push(sample);
                }
            }
            Err(e) => debug!(session = %self.session_id, error = %e, "Payload dropped"),
        }

        let after = self.decoder.stats();
        if after.sequence_losses != before.sequence_losses || after.framing_errors != before.framing_errors {
            out.loss = Some(after);
        }
        out
    }

    fn push_windows(&mut self, sample: &FilteredSample) {
        for (window, channel) in self.eeg_windows.iter_mut().zip(Channel::EEG) {
            window.push(sample.value(channel));
        }
        self.ecg_window.push(sample.value(Channel::Ecg));
    }

    fn check_cadence(&mut self, sample: &FilteredSample, out: &mut IngestOutput) {
        self.since_spectral += 1;
        if self.since_spectral >= self.spectral_every {
            self.since_spectral = 0;
            if self.eeg_windows.iter().all(WindowBuffer::is_full) {
                self.spectral_requests += 1;
                out.spectral.push(SpectralRequest {
                    session_id: self.session_id,
                    sample_index: sample.index,
                    eeg_a: self.eeg_windows[0].snapshot(),
                    eeg_b: self.eeg_windows[1].snapshot(),
                    sample_rate: self.sample_rate,
                    fft_size: self.fft_size,
                });
            }
        }

        self.since_beat += 1;
        if self.since_beat >= self.beat_every {
            self.since_beat = 0;
            if self.ecg_window.len() >= 3 {
                self.beat_requests += 1;
                out.beat.push(BeatRequest {
                    session_id: self.session_id,
                    sample_index: sample.index,
                    ecg: self.ecg_window.snapshot(),
                    sample_rate: self.sample_rate,
                });
            }
        }
    }

    /// Counters owned by the ingestion path; drop counts are filled in by the session.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            decode: self.decoder.stats(),
            samples_filtered: self.next_index,
            spectral_requests: self.spectral_requests,
            beat_requests: self.beat_requests,
            ..SessionStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(counters: impl IntoIterator<Item = u8>, value: u16) -> Vec<u8> {
        counters
            .into_iter()
            .flat_map(|c| {
                let mut rec = vec![c];
                for _ in 0..3 {
                    rec.extend_from_slice(&value.to_le_bytes());
                }
                rec
            })
            .collect()
    }

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.spectral.fft_size = 16;
        config.spectral.trigger_every = 5;
        config.cardiac.window_len = 20;
        config.cardiac.trigger_every = 10;
        config
    }

    #[test]
    fn test_indices_are_monotonic_across_payloads() {
        let mut ingestor = Ingestor::new(Uuid::new_v4(), &small_config()).unwrap();
        let first = ingestor.ingest(&payload(0..4, 2048));
        let second = ingestor.ingest(&payload(4..7, 2048));
        let indices: Vec<u64> = first.samples.iter().chain(&second.samples).map(|s| s.index).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_no_spectral_request_before_window_is_full() {
        let mut ingestor = Ingestor::new(Uuid::new_v4(), &small_config()).unwrap();
        let out = ingestor.ingest(&payload(0..15, 2048));
        assert!(out.spectral.is_empty());

        // Sample 15 fills the 16-sample window but is not on the cadence;
        // sample 19 is the first trigger with a full window.
        let out = ingestor.ingest(&payload(15..20, 2048));
        assert_eq!(out.spectral.len(), 1);
        let request = &out.spectral[0];
        assert_eq!(request.sample_index, 19);
        assert_eq!(request.eeg_a.len(), 16);
        assert_eq!(request.fft_size, 16);
    }

    #[test]
    fn test_beat_cadence() {
        let mut ingestor = Ingestor::new(Uuid::new_v4(), &small_config()).unwrap();
        let out = ingestor.ingest(&payload(0..25, 2048));
        assert_eq!(out.beat.len(), 2);
        assert_eq!(out.beat[0].sample_index, 9);
        assert_eq!(out.beat[0].ecg.len(), 10);
        assert_eq!(out.beat[1].ecg.len(), 20);
        assert_eq!(ingestor.stats().beat_requests, 2);
    }

    #[test]
    fn test_misframed_payload_reports_loss_only() {
        let mut ingestor = Ingestor::new(Uuid::new_v4(), &small_config()).unwrap();
        let mut bad = payload(0..2, 2048);
        bad.pop();
        let out = ingestor.ingest(&bad);
        assert!(out.samples.is_empty());
        assert_eq!(out.loss.map(|s| s.framing_errors), Some(1));
        assert_eq!(ingestor.stats().samples_filtered, 0);
    }

    #[test]
    fn test_sequence_gap_reported_and_samples_kept() {
        let mut ingestor = Ingestor::new(Uuid::new_v4(), &small_config()).unwrap();
        let out = ingestor.ingest(&payload([0, 1, 2, 5, 6], 2048));
        assert_eq!(out.samples.len(), 5);
        assert_eq!(out.loss.map(|s| s.sequence_losses), Some(1));

        let out = ingestor.ingest(&payload([7, 8], 2048));
        assert!(out.loss.is_none());
    }
}

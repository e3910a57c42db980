use std::time::Duration;

use async_trait::async_trait;
use biosignal_types::{PacketLayout, PipelineConfig, RawSample};
use bytes::Bytes;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::generator::SignalGenerator;
use crate::encode::encode_records;
use crate::types::{SensorError, SensorSource};

/// Settings for the synthetic sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Records packed into each payload
    pub records_per_packet: usize,
    /// Rate of the simulated ECG
    pub heart_rate_bpm: f32,
    /// Drop every n-th packet (0 disables loss injection)
    pub drop_every: u64,
    /// Fixed RNG seed for reproducible signals
    pub seed: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            records_per_packet: 10,
            heart_rate_bpm: 72.0,
            drop_every: 0,
            seed: None,
        }
    }
}

/// Sensor source that synthesizes payloads at real-time pace.
pub struct MockSensor {
    generator: SignalGenerator,
    layout: PacketLayout,
    records_per_packet: usize,
    drop_every: u64,
    packet_period: Duration,
    counter: u8,
    packets_built: u64,
    packets_dropped: u64,
}

impl MockSensor {
    /// Build a sensor producing data in the format `pipeline` expects.
    pub fn new(config: &MockConfig, pipeline: &PipelineConfig) -> Result<Self, SensorError> {
        if config.records_per_packet == 0 {
            return Err(SensorError::Configuration("records_per_packet must be at least 1".to_string()));
        }
        if config.drop_every == 1 {
            return Err(SensorError::Configuration("drop_every = 1 would drop every packet".to_string()));
        }

        let generator = SignalGenerator::new(
            pipeline.sample_rate_hz,
            pipeline.adc_bits,
            config.heart_rate_bpm,
            config.seed,
        )?;
        let packet_period =
            Duration::from_nanos((config.records_per_packet as f64 * 1e9 / pipeline.sample_rate_hz as f64).round() as u64);

        info!(
            "MockSensor created: {} Hz, {} records/packet, {} BPM, drop_every {}",
            pipeline.sample_rate_hz, config.records_per_packet, config.heart_rate_bpm, config.drop_every
        );

        Ok(Self {
            generator,
            layout: pipeline.packet_layout,
            records_per_packet: config.records_per_packet,
            drop_every: config.drop_every,
            packet_period,
            counter: 0,
            packets_built: 0,
            packets_dropped: 0,
        })
    }

    /// Time covered by one payload.
    pub fn packet_period(&self) -> Duration {
        self.packet_period
    }

    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }

    /// Build the next payload that survives loss injection.
    ///
    /// A dropped packet still consumes its counters, so the receiver sees a
    /// sequence gap.
    pub fn next_packet(&mut self) -> Bytes {
        loop {
            let records: Vec<RawSample> = (0..self.records_per_packet)
                .map(|_| {
                    let record = self.generator.next_record(self.counter);
                    self.counter = self.counter.wrapping_add(1);
                    record
                })
                .collect();
            self.packets_built += 1;

            if self.drop_every > 0 && self.packets_built % self.drop_every == 0 {
                self.packets_dropped += 1;
                debug!("Dropping packet {}", self.packets_built);
                continue;
            }
            return encode_records(self.layout, &records);
        }
    }
}

#[async_trait]
impl SensorSource for MockSensor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&mut self, tx: flume::Sender<Bytes>, shutdown: CancellationToken) -> Result<(), SensorError> {
        let mut ticker = tokio::time::interval(self.packet_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut sent = 0u64;

        info!("MockSensor streaming every {:?}", self.packet_period);
        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                _ = ticker.tick() => {
                    let payload = self.next_packet();
                    if tx.send_async(payload).await.is_err() {
                        break Err(SensorError::Disconnected);
                    }
                    sent += 1;
                }
            }
        };

        info!("MockSensor stopped after {} packets ({} dropped)", sent, self.packets_dropped);
        result
    }
}

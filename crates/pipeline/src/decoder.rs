//! Sensor payload decoding
//!
//! A payload is a concatenation of fixed-size records. Payloads whose length
//! is not a whole number of records are rejected outright; nothing from them
//! reaches the filter chain.

use biosignal_types::{DecodeStats, PacketLayout, RawSample, CHANNEL_COUNT};
use tracing::{debug, trace};

use crate::error::DecodeError;

/// Decodes sensor payloads and tracks transport-level loss.
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    layout: PacketLayout,
    last_counter: Option<u8>,
    stats: DecodeStats,
}

impl PacketDecoder {
    pub fn new(layout: PacketLayout) -> Self {
        Self {
            layout,
            last_counter: None,
            stats: DecodeStats::default(),
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Decode a payload into records, in wire order.
    ///
    /// Counter discontinuities are counted (one per gap) and do not stop
    /// decoding. The first record seen by a decoder is never a loss.
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<RawSample>, DecodeError> {
        let record_size = self.layout.record_size();
        if payload.len() % record_size != 0 {
            self.stats.framing_errors += 1;
            debug!(len = payload.len(), record_size, "Dropping misframed payload");
            return Err(DecodeError::Framing { len: payload.len(), record_size });
        }

        let mut samples = Vec::with_capacity(payload.len() / record_size);
        for record in payload.chunks_exact(record_size) {
            let (counter, body) = if self.layout.has_counter() {
                (record[0], &record[1..])
            } else {
                (0, record)
            };

            if self.layout.has_counter() {
                self.track_counter(counter);
            }

            let mut values = [0u16; CHANNEL_COUNT];
            for (value, bytes) in values.iter_mut().zip(body.chunks_exact(2)) {
                *value = u16::from_le_bytes([bytes[0], bytes[1]]);
            }
            samples.push(RawSample { counter, values });
        }

        self.stats.payloads_accepted += 1;
        self.stats.records_decoded += samples.len() as u64;
        Ok(samples)
    }

    fn track_counter(&mut self, counter: u8) {
        if let Some(prev) = self.last_counter {
            let expected = prev.wrapping_add(1);
            if counter != expected {
                self.stats.sequence_losses += 1;
                trace!(expected, got = counter, "Sequence discontinuity");
            }
        }
        self.last_counter = Some(counter);
    }
}

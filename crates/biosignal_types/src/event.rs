//! Events published by a pipeline session
//!
//! Every event carries the id of the session that produced it so that
//! consumers can discard results that arrive after a session was stopped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::Channel;

/// Named EEG frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::Delta, Band::Theta, Band::Alpha, Band::Beta, Band::Gamma];

    pub fn index(self) -> usize {
        match self {
            Band::Delta => 0,
            Band::Theta => 1,
            Band::Alpha => 2,
            Band::Beta => 3,
            Band::Gamma => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }
}

/// One value per named band.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandPowers {
    pub delta: f32,
    pub theta: f32,
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl BandPowers {
    pub fn from_array(values: [f32; 5]) -> Self {
        Self {
            delta: values[0],
            theta: values[1],
            alpha: values[2],
            beta: values[3],
            gamma: values[4],
        }
    }

    pub fn to_array(&self) -> [f32; 5] {
        [self.delta, self.theta, self.alpha, self.beta, self.gamma]
    }

    pub fn get(&self, band: Band) -> f32 {
        self.to_array()[band.index()]
    }

    pub fn total(&self) -> f32 {
        self.to_array().iter().sum()
    }

    /// Band with the largest value; ties resolve to the lower band.
    pub fn dominant(&self) -> Band {
        let values = self.to_array();
        let mut best = Band::Delta;
        for band in Band::ALL {
            if values[band.index()] > values[best.index()] {
                best = band;
            }
        }
        best
    }
}

/// Smoothed relative band power of one EEG channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBandPower {
    pub channel: Channel,
    pub relative: BandPowers,
}

/// Output of the spectral power engine for one trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralUpdate {
    pub session_id: Uuid,
    /// Index of the newest sample in the analysed window
    pub sample_index: u64,
    pub channels: Vec<ChannelBandPower>,
}

/// Output of the beat engine for one trigger.
///
/// `bpm`, `high`, `low` and `avg` are `None` when the window did not yield
/// a plausible rate; `peaks` is returned either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateUpdate {
    pub session_id: Uuid,
    pub sample_index: u64,
    pub bpm: Option<u32>,
    pub high: Option<u32>,
    pub low: Option<u32>,
    pub avg: Option<u32>,
    /// Smoothed, rate-limited value intended for display
    pub displayed_bpm: Option<u32>,
    /// Window-relative indices of accepted beats
    pub peaks: Vec<usize>,
    /// Most recent accepted inter-beat intervals, oldest first
    pub recent_intervals_ms: Vec<f32>,
}

/// Transport-level counters maintained by the packet decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodeStats {
    pub payloads_accepted: u64,
    pub records_decoded: u64,
    pub framing_errors: u64,
    pub sequence_losses: u64,
}

/// Counters for a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub decode: DecodeStats,
    pub samples_filtered: u64,
    pub spectral_requests: u64,
    pub spectral_dropped: u64,
    pub beat_requests: u64,
    pub beat_dropped: u64,
}

/// Events emitted by a running session, in the order they were produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    SessionStarted { session_id: Uuid, sample_rate_hz: f32 },
    BandPower(SpectralUpdate),
    HeartRate(HeartRateUpdate),
    PacketLoss { session_id: Uuid, sequence_losses: u64, framing_errors: u64 },
    Stopped { session_id: Uuid, stats: SessionStats },
}

impl PipelineEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            PipelineEvent::SessionStarted { session_id, .. } => *session_id,
            PipelineEvent::BandPower(update) => update.session_id,
            PipelineEvent::HeartRate(update) => update.session_id,
            PipelineEvent::PacketLoss { session_id, .. } => *session_id,
            PipelineEvent::Stopped { session_id, .. } => *session_id,
        }
    }
}

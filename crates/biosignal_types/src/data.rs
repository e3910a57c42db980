use serde::{Deserialize, Serialize};

/// Number of channels carried by every sensor record.
pub const CHANNEL_COUNT: usize = 3;

/// Kind of bio-potential carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    Eeg,
    Ecg,
}

/// A channel of the sensor stream, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    EegA,
    EegB,
    Ecg,
}

impl Channel {
    /// All channels in wire order.
    pub const ALL: [Channel; CHANNEL_COUNT] = [Channel::EegA, Channel::EegB, Channel::Ecg];

    /// The two EEG channels, in wire order.
    pub const EEG: [Channel; 2] = [Channel::EegA, Channel::EegB];

    /// Position of this channel inside a record.
    pub fn index(self) -> usize {
        match self {
            Channel::EegA => 0,
            Channel::EegB => 1,
            Channel::Ecg => 2,
        }
    }

    pub fn kind(self) -> ChannelKind {
        match self {
            Channel::EegA | Channel::EegB => ChannelKind::Eeg,
            Channel::Ecg => ChannelKind::Ecg,
        }
    }
}

/// Record layout of a sensor notification payload.
///
/// `Counted` is the canonical format: one sequence-counter byte followed by
/// one little-endian `u16` per channel (7 bytes). `Uncounted` drops the
/// counter byte (6 bytes); sequence-loss detection is unavailable with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PacketLayout {
    #[default]
    Counted,
    Uncounted,
}

impl PacketLayout {
    /// Size in bytes of one record.
    pub fn record_size(self) -> usize {
        match self {
            PacketLayout::Counted => 1 + 2 * CHANNEL_COUNT,
            PacketLayout::Uncounted => 2 * CHANNEL_COUNT,
        }
    }

    /// True if records carry a leading sequence counter.
    pub fn has_counter(self) -> bool {
        matches!(self, PacketLayout::Counted)
    }
}

/// One decoded sensor record.
///
/// Only lives long enough to be filtered; the counter is used for loss
/// detection and then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    /// Transport sequence counter (wraps at 256). Zero for uncounted layouts.
    pub counter: u8,
    /// Raw ADC codes, indexed by [`Channel::index`].
    pub values: [u16; CHANNEL_COUNT],
}

impl RawSample {
    pub fn value(&self, channel: Channel) -> u16 {
        self.values[channel.index()]
    }
}

/// One filtered sample for every channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilteredSample {
    /// Monotonic index assigned by the pipeline, starting at zero per session.
    pub index: u64,
    /// Filtered values in the normalized range, indexed by [`Channel::index`].
    pub values: [f32; CHANNEL_COUNT],
}

impl FilteredSample {
    pub fn value(&self, channel: Channel) -> f32 {
        self.values[channel.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(PacketLayout::Counted.record_size(), 7);
        assert_eq!(PacketLayout::Uncounted.record_size(), 6);
        assert!(PacketLayout::Counted.has_counter());
        assert!(!PacketLayout::Uncounted.has_counter());
    }

    #[test]
    fn test_channel_order() {
        for (i, ch) in Channel::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
        }
        assert_eq!(Channel::Ecg.kind(), ChannelKind::Ecg);
        assert!(Channel::EEG.iter().all(|c| c.kind() == ChannelKind::Eeg));
    }

    #[test]
    fn test_layout_serde_name() {
        let json = serde_json::to_string(&PacketLayout::Uncounted).unwrap();
        assert_eq!(json, "\"uncounted\"");
    }
}

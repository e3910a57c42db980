//! Wire encoder for sensor records.

use biosignal_types::{PacketLayout, RawSample};
use bytes::{BufMut, Bytes, BytesMut};

/// Pack `records` into one payload: an optional counter byte followed by
/// each channel's code as little-endian u16.
pub fn encode_records(layout: PacketLayout, records: &[RawSample]) -> Bytes {
    let mut buf = BytesMut::with_capacity(records.len() * layout.record_size());
    for record in records {
        if layout.has_counter() {
            buf.put_u8(record.counter);
        }
        for value in record.values {
            buf.put_u16_le(value);
        }
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(counter: u8) -> RawSample {
        RawSample { counter, values: [0x0102, 0x0A0B, 0x0FFF] }
    }

    #[test]
    fn test_counted_layout() {
        let bytes = encode_records(PacketLayout::Counted, &[sample(7), sample(8)]);
        assert_eq!(bytes.len(), 14);
        assert_eq!(&bytes[..7], &[7, 0x02, 0x01, 0x0B, 0x0A, 0xFF, 0x0F]);
        assert_eq!(bytes[7], 8);
    }

    #[test]
    fn test_uncounted_layout_drops_counter() {
        let bytes = encode_records(PacketLayout::Uncounted, &[sample(7)]);
        assert_eq!(&bytes[..], &[0x02, 0x01, 0x0B, 0x0A, 0xFF, 0x0F]);
    }

    #[test]
    fn test_empty() {
        assert!(encode_records(PacketLayout::Counted, &[]).is_empty());
    }
}

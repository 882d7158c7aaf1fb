//! Persisted byte layout for log entries and checkpoints.
//!
//! Each partition of a log is one sorted keyspace of entries:
//!
//! ```text
//! key:   timestamp_micros (8, BE) | disambiguator (8, BE)
//! value: sender_len (4, BE) | sender utf-8 | payload
//! ```
//!
//! Keys sort first by write time and then by a disambiguator, so writes in
//! the same microsecond keep a stable order. A second, small keyspace per
//! log holds checkpoints:
//!
//! ```text
//! key:   identifier utf-8 | 0x00 | partition (4, BE)
//! value: cursor position (opaque bytes)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{LogError, Result};

/// Length of an encoded entry key.
pub const POSITION_LEN: usize = 16;

/// Keyspace holding one partition's entries.
pub(crate) fn partition_keyspace(log_name: &str, partition: u32) -> String {
    format!("{log_name}/p{partition}")
}

/// Keyspace holding a log's identifier checkpoints.
pub(crate) fn checkpoint_keyspace(log_name: &str) -> String {
    format!("{log_name}/checkpoints")
}

/// Microseconds since the epoch, clamped at zero for pre-epoch clocks.
pub(crate) fn timestamp_micros(time: DateTime<Utc>) -> u64 {
    time.timestamp_micros().max(0) as u64
}

pub(crate) fn time_from_micros(micros: u64) -> Result<DateTime<Utc>> {
    i64::try_from(micros)
        .ok()
        .and_then(DateTime::from_timestamp_micros)
        .ok_or_else(|| LogError::Corrupt(format!("timestamp out of range: {micros}")))
}

/// Encode an entry key.
pub(crate) fn encode_position(micros: u64, disambiguator: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(POSITION_LEN);
    key.put_u64(micros);
    key.put_u64(disambiguator);
    key
}

/// Decode an entry key back into `(timestamp_micros, disambiguator)`.
pub(crate) fn decode_position(key: &[u8]) -> Result<(u64, u64)> {
    if key.len() != POSITION_LEN {
        return Err(LogError::Corrupt(format!(
            "position key has {} bytes, expected {POSITION_LEN}",
            key.len()
        )));
    }
    let mut buf = key;
    Ok((buf.get_u64(), buf.get_u64()))
}

/// Cursor starting at the first entry written at or after `time`.
pub(crate) fn position_for_time(time: DateTime<Utc>) -> Vec<u8> {
    encode_position(timestamp_micros(time), 0)
}

/// The smallest key strictly greater than `key` in bytewise order. Used to
/// advance a cursor past a delivered entry; cursors are scan bounds, not
/// entry keys, so the extra byte is harmless.
pub(crate) fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}

/// Encode an entry value.
pub(crate) fn encode_entry(sender: &str, payload: &Bytes) -> Bytes {
    let mut value = BytesMut::with_capacity(4 + sender.len() + payload.len());
    value.put_u32(sender.len() as u32);
    value.put_slice(sender.as_bytes());
    value.put_slice(payload);
    value.freeze()
}

/// Decode an entry value back into `(sender, payload)`.
pub(crate) fn decode_entry(value: &[u8]) -> Result<(String, Bytes)> {
    if value.len() < 4 {
        return Err(LogError::Corrupt(format!(
            "entry value has {} bytes, expected at least 4",
            value.len()
        )));
    }
    let mut buf = value;
    let sender_len = buf.get_u32() as usize;
    if buf.remaining() < sender_len {
        return Err(LogError::Corrupt(format!(
            "entry sender length {sender_len} exceeds remaining {} bytes",
            buf.remaining()
        )));
    }
    let sender = std::str::from_utf8(&buf[..sender_len])
        .map_err(|e| LogError::Corrupt(format!("entry sender is not utf-8: {e}")))?
        .to_string();
    buf.advance(sender_len);
    Ok((sender, Bytes::copy_from_slice(buf)))
}

/// Key for an identifier's checkpoint in one partition.
pub(crate) fn checkpoint_key(identifier: &str, partition: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(identifier.len() + 5);
    key.extend_from_slice(identifier.as_bytes());
    key.push(0);
    key.put_u32(partition);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_roundtrips() {
        let key = encode_position(1_700_000_000_000_000, 42);
        assert_eq!(key.len(), POSITION_LEN);
        assert_eq!(decode_position(&key).unwrap(), (1_700_000_000_000_000, 42));
    }

    #[test]
    fn positions_sort_by_time_then_disambiguator() {
        let a = encode_position(100, 5);
        let b = encode_position(100, 6);
        let c = encode_position(101, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn successor_sorts_after_key_and_before_next_entry() {
        let key = encode_position(100, 5);
        let next = successor(&key);
        assert!(next > key);
        assert!(next < encode_position(100, 6));
    }

    #[test]
    fn short_position_is_rejected() {
        assert!(matches!(
            decode_position(&[1, 2, 3]),
            Err(LogError::Corrupt(_))
        ));
    }

    #[test]
    fn entry_roundtrips() {
        let payload = Bytes::from_static(b"\x01\x02\x03");
        let value = encode_entry("instance-a", &payload);
        let (sender, decoded) = decode_entry(&value).unwrap();
        assert_eq!(sender, "instance-a");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn entry_with_empty_payload_roundtrips() {
        let value = encode_entry("s", &Bytes::new());
        let (sender, payload) = decode_entry(&value).unwrap();
        assert_eq!(sender, "s");
        assert!(payload.is_empty());
    }

    #[test]
    fn truncated_entry_is_rejected() {
        assert!(matches!(decode_entry(&[0, 0]), Err(LogError::Corrupt(_))));

        // Sender length pointing past the end of the value.
        let mut value = Vec::new();
        value.put_u32(100);
        value.put_slice(b"abc");
        assert!(matches!(decode_entry(&value), Err(LogError::Corrupt(_))));
    }

    #[test]
    fn checkpoint_keys_are_distinct_per_partition_and_identifier() {
        let a0 = checkpoint_key("a", 0);
        let a1 = checkpoint_key("a", 1);
        let b0 = checkpoint_key("b", 0);
        assert_ne!(a0, a1);
        assert_ne!(a0, b0);
    }

    #[test]
    fn time_conversion_roundtrips_at_microsecond_precision() {
        let now = Utc::now();
        let micros = timestamp_micros(now);
        let back = time_from_micros(micros).unwrap();
        assert_eq!(timestamp_micros(back), micros);
    }

    #[test]
    fn keyspace_names_separate_partitions_from_checkpoints() {
        assert_eq!(partition_keyspace("events", 2), "events/p2");
        assert_eq!(checkpoint_keyspace("events"), "events/checkpoints");
        assert_ne!(partition_keyspace("events", 0), checkpoint_keyspace("events"));
    }
}

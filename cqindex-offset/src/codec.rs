//! Binary key/value layouts for the offset table.
//!
//! Offset keys embed the topic so that min/max entries of the same topic
//! group together under lexicographic key order:
//!
//! ```text
//! +------------+--------+-------------+--------+-------------+--------+-----------+
//! | topic len  | CTRL   | topic bytes | CTRL   | "max"|"min" | CTRL   | queue id  |
//! | 4 bytes BE | 1 byte | n bytes     | 1 byte | 3 bytes     | 1 byte | 4 bytes BE|
//! +------------+--------+-------------+--------+-------------+--------+-----------+
//! ```
//!
//! Offset values are fixed 16 bytes:
//!
//! ```text
//! +---------------------+---------------------+
//! | physical offset     | logical cq offset   |
//! | 8 bytes BE          | 8 bytes BE          |
//! +---------------------+---------------------+
//! ```
//!
//! The global checkpoint reuses the key layout under a reserved system
//! topic; its value is 8 bytes (physical offset only), which is what keeps
//! it distinguishable from per-queue entries during generic iteration.

use crate::error::OffsetError;
use crate::types::{OffsetKind, PhyAndCqOffset};
use bytes::{BufMut, Bytes, BytesMut};

/// Framing sentinel separating key fields. Not a length field; a mismatch
/// at any sentinel position signals a corrupted frame.
pub const CTRL: u8 = 0x01;

/// Key bytes in excess of the topic: len(4) + CTRL + CTRL + marker(3) + CTRL + queue id(4).
pub const OFFSET_KEY_FIXED_LEN: usize = 4 + 1 + 1 + 3 + 1 + 4;

/// Persisted value size: physical offset(8) + logical offset(8).
pub const OFFSET_VALUE_LEN: usize = 8 + 8;

/// Checkpoint value size: physical offset only.
pub const CHECKPOINT_VALUE_LEN: usize = 8;

/// Reserved synthetic topic carrying the global max physical offset
/// checkpoint. Without it, finding the highest dispatched physical offset
/// at startup would require a full table traversal.
pub const CHECKPOINT_TOPIC: &str = "sys_max_phy_offset_checkpoint";

/// Prefix reserved for internal system topics.
pub const SYSTEM_TOPIC_PREFIX: &str = "sys_";

/// Prefix of the fan-out queue topic class, whose offsets are managed by a
/// dedicated subsystem and must survive the dirty-topic scan.
pub const FANOUT_TOPIC_PREFIX: &str = "%fanout%";

/// Returns true for reserved system topics.
pub fn is_system_topic(topic: &str) -> bool {
    topic.starts_with(SYSTEM_TOPIC_PREFIX)
}

/// Returns true for fan-out-class topics.
pub fn is_fanout_topic(topic: &str) -> bool {
    topic.starts_with(FANOUT_TOPIC_PREFIX)
}

/// Encodes an offset key. The result is exactly
/// `OFFSET_KEY_FIXED_LEN + topic.len()` bytes.
pub fn encode_offset_key(topic: &str, queue_id: i32, kind: OffsetKind) -> Bytes {
    let topic_bytes = topic.as_bytes();
    let mut buf = BytesMut::with_capacity(OFFSET_KEY_FIXED_LEN + topic_bytes.len());
    buf.put_i32(topic_bytes.len() as i32);
    buf.put_u8(CTRL);
    buf.put_slice(topic_bytes);
    buf.put_u8(CTRL);
    buf.put_slice(kind.marker());
    buf.put_u8(CTRL);
    buf.put_i32(queue_id);
    buf.freeze()
}

/// Decodes an offset key, re-validating length and every sentinel position.
pub fn decode_offset_key(key: &[u8]) -> Result<(String, i32, OffsetKind), OffsetError> {
    if key.len() <= OFFSET_KEY_FIXED_LEN {
        return Err(OffsetError::BadFrame {
            reason: format!("offset key too short: {} bytes", key.len()),
        });
    }

    let topic_len = i32::from_be_bytes(key[0..4].try_into().unwrap());
    if topic_len <= 0 || key.len() != OFFSET_KEY_FIXED_LEN + topic_len as usize {
        return Err(OffsetError::BadFrame {
            reason: format!(
                "offset key length mismatch: {} bytes for topic length {}",
                key.len(),
                topic_len
            ),
        });
    }
    let topic_len = topic_len as usize;

    for pos in [4, 5 + topic_len, 9 + topic_len] {
        if key[pos] != CTRL {
            return Err(OffsetError::BadFrame {
                reason: format!("sentinel mismatch at byte {}: {:#04x}", pos, key[pos]),
            });
        }
    }

    let topic = std::str::from_utf8(&key[5..5 + topic_len])
        .map_err(|_| OffsetError::BadFrame {
            reason: "topic is not valid UTF-8".to_string(),
        })?
        .to_string();

    let kind = match &key[6 + topic_len..9 + topic_len] {
        m if m == OffsetKind::Maximum.marker() => OffsetKind::Maximum,
        m if m == OffsetKind::Minimum.marker() => OffsetKind::Minimum,
        m => {
            return Err(OffsetError::BadFrame {
                reason: format!("unknown offset class marker: {:?}", m),
            })
        }
    };

    let queue_id = i32::from_be_bytes(key[10 + topic_len..14 + topic_len].try_into().unwrap());

    Ok((topic, queue_id, kind))
}

/// Encodes a 16-byte offset value.
pub fn encode_offset_value(phy_offset: i64, cq_offset: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(OFFSET_VALUE_LEN);
    buf.put_i64(phy_offset);
    buf.put_i64(cq_offset);
    buf.freeze()
}

/// Decodes a 16-byte offset value.
pub fn decode_offset_value(value: &[u8]) -> Result<PhyAndCqOffset, OffsetError> {
    if value.len() != OFFSET_VALUE_LEN {
        return Err(OffsetError::BadFrame {
            reason: format!("offset value must be {} bytes, got {}", OFFSET_VALUE_LEN, value.len()),
        });
    }
    let phy_offset = i64::from_be_bytes(value[0..8].try_into().unwrap());
    let cq_offset = i64::from_be_bytes(value[8..16].try_into().unwrap());
    Ok(PhyAndCqOffset::new(phy_offset, cq_offset))
}

/// Builds the reserved checkpoint key. Built fresh per call; there is no
/// shared mutable key buffer.
pub fn checkpoint_key() -> Bytes {
    encode_offset_key(CHECKPOINT_TOPIC, 0, OffsetKind::Maximum)
}

/// Encodes the 8-byte checkpoint value.
pub fn encode_checkpoint_value(phy_offset: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(CHECKPOINT_VALUE_LEN);
    buf.put_i64(phy_offset);
    buf.freeze()
}

/// Decodes the 8-byte checkpoint value.
pub fn decode_checkpoint_value(value: &[u8]) -> Result<i64, OffsetError> {
    if value.len() != CHECKPOINT_VALUE_LEN {
        return Err(OffsetError::BadFrame {
            reason: format!(
                "checkpoint value must be {} bytes, got {}",
                CHECKPOINT_VALUE_LEN,
                value.len()
            ),
        });
    }
    Ok(i64::from_be_bytes(value[0..8].try_into().unwrap()))
}

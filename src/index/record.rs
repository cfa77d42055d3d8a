// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Match record layout and snowflake arithmetic.

use serde::{Deserialize, Serialize};

use crate::codec::{ByteBuf, ByteReader};

use super::IndexError;

/// Unix milliseconds of 2019-01-01T00:00:00Z, the snowflake epoch.
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_546_300_800_000;

/// One bucket spans exactly ten days.
const BUCKET_SPAN_MS: u64 = 10 * 86_400_000;

/// A stored user-match record is exactly 9 bytes: 8-byte big-endian match
/// id followed by the state byte.
pub const MATCH_SIZE: usize = 9;

/// Current format version of packed match records.
pub(crate) const MATCH_FORMAT_VERSION: u8 = 1;

pub const STATE_LOSS: u8 = 0;
pub const STATE_WIN: u8 = 1;
/// Draw, or a match with no declared winner.
pub const STATE_DRAW: u8 = 2;

/// One entry of a user's match history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMatch {
    pub id: u64,
    pub state: u8,
}

/// Milliseconds since the unix epoch encoded in a snowflake id.
#[inline]
pub fn snowflake_ts_ms(id: u64) -> u64 {
    (id >> 22) + SNOWFLAKE_EPOCH_MS
}

/// The ten-day bucket an id belongs to, counted from the snowflake epoch.
#[inline]
pub fn bucket_of_id(id: u64) -> u32 {
    ((id >> 22) / BUCKET_SPAN_MS) as u32
}

/// The bucket containing an absolute unix-millisecond deadline. Deadlines
/// before the snowflake epoch saturate to bucket zero.
#[inline]
pub fn bucket_of_deadline_ms(deadline_ms: u64) -> u32 {
    (deadline_ms.saturating_sub(SNOWFLAKE_EPOCH_MS) / BUCKET_SPAN_MS) as u32
}

/// Encodes one match record.
pub fn encode_match(id: u64, state: u8) -> Vec<u8> {
    let mut buf = ByteBuf::fixed(MATCH_SIZE);
    buf.write_u64(id);
    buf.write_u8(state);
    buf.into_vec()
}

/// Reads one record at the cursor.
pub(crate) fn read_match(version: u8, reader: &mut ByteReader<'_>) -> Result<UserMatch, IndexError> {
    if version != MATCH_FORMAT_VERSION {
        return Err(IndexError::UnsupportedVersion { version });
    }
    let id = reader.read_u64();
    let state = reader.read_u8();
    Ok(UserMatch { id, state })
}

/// Decodes a packed value into records.
pub(crate) fn read_matches(version: u8, value: &[u8]) -> Result<Vec<UserMatch>, IndexError> {
    let mut reader = ByteReader::new(value);
    let mut matches = Vec::with_capacity(value.len() / MATCH_SIZE);
    while reader.remaining() >= MATCH_SIZE {
        matches.push(read_match(version, &mut reader)?);
    }
    Ok(matches)
}

pub(crate) fn write_matches(matches: &[UserMatch]) -> Vec<u8> {
    let mut buf = ByteBuf::fixed(matches.len() * MATCH_SIZE);
    for m in matches {
        buf.write_u64(m.id);
        buf.write_u8(m.state);
    }
    buf.into_vec()
}

/// Migrator for the match-record descriptor: decode under the stored
/// version, re-encode under the current one.
pub(crate) fn migrate_matches(old: &[u8], version: u8) -> Result<Vec<u8>, IndexError> {
    let matches = read_matches(version, old)?;
    Ok(write_matches(&matches))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_ts() {
        assert_eq!(snowflake_ts_ms(0), SNOWFLAKE_EPOCH_MS);
        assert_eq!(snowflake_ts_ms(1 << 22), SNOWFLAKE_EPOCH_MS + 1);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(bucket_of_id(1 << 22), 0);
        // First id of the second ten-day window.
        let first_of_bucket_1 = (BUCKET_SPAN_MS << 22) + 1;
        assert_eq!(bucket_of_id(first_of_bucket_1), 1);
        assert_eq!(bucket_of_id(first_of_bucket_1 - (1 << 22)), 0);
    }

    #[test]
    fn test_bucket_of_deadline() {
        assert_eq!(bucket_of_deadline_ms(SNOWFLAKE_EPOCH_MS), 0);
        assert_eq!(bucket_of_deadline_ms(SNOWFLAKE_EPOCH_MS + BUCKET_SPAN_MS), 1);
        // Pre-epoch deadlines saturate instead of wrapping.
        assert_eq!(bucket_of_deadline_ms(0), 0);
    }

    #[test]
    fn test_encode_match_layout() {
        let encoded = encode_match(0x0000_0000_0040_0001, STATE_WIN);
        assert_eq!(encoded, vec![0, 0, 0, 0, 0, 0x40, 0, 1, 1]);
    }

    #[test]
    fn test_read_matches_roundtrip() {
        let matches = vec![
            UserMatch { id: 1 << 22, state: STATE_LOSS },
            UserMatch { id: 2 << 22, state: STATE_WIN },
            UserMatch { id: 3 << 22, state: STATE_DRAW },
        ];
        let packed = write_matches(&matches);
        assert_eq!(packed.len(), 3 * MATCH_SIZE);
        assert_eq!(read_matches(1, &packed).unwrap(), matches);
    }

    #[test]
    fn test_unsupported_version() {
        let packed = write_matches(&[UserMatch { id: 1, state: 0 }]);
        assert!(matches!(
            read_matches(9, &packed),
            Err(IndexError::UnsupportedVersion { version: 9 })
        ));
    }

    #[test]
    fn test_migrate_identity_for_current() {
        let packed = write_matches(&[UserMatch { id: 42 << 22, state: STATE_WIN }]);
        assert_eq!(migrate_matches(&packed, 1).unwrap(), packed);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn record_roundtrip(id in any::<u64>(), state in 0u8..3) {
            let encoded = encode_match(id, state);
            let decoded = read_matches(1, &encoded).unwrap();
            prop_assert_eq!(decoded, vec![UserMatch { id, state }]);
        }

        #[test]
        fn id_order_implies_bucket_order(a in any::<u64>(), b in any::<u64>()) {
            if a <= b {
                prop_assert!(bucket_of_id(a) <= bucket_of_id(b));
            }
        }

        #[test]
        fn ts_stays_in_bucket_window(id in any::<u64>()) {
            let bucket = bucket_of_id(id) as u64;
            let rel = snowflake_ts_ms(id) - SNOWFLAKE_EPOCH_MS;
            prop_assert!(rel >= bucket * BUCKET_SPAN_MS);
            prop_assert!(rel < (bucket + 1) * BUCKET_SPAN_MS);
        }
    }
}

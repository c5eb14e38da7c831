// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CRC32 checksum utilities for frame and cursor integrity.
//!
//! Uses CRC-32 (IEEE polynomial) via crc32fast. A frame carries two
//! checksums: one over the body and one over the header fields (which include
//! the body checksum), so a reader can validate the header before touching
//! the body.

use crc32fast::Hasher;

/// Calculates the CRC32 of a frame body.
#[inline]
pub(crate) fn body_crc(body: &[u8]) -> u32 { crc32fast::hash(body) }

/// Calculates the CRC32 of the header fields preceding the header checksum.
#[inline]
pub(crate) fn header_crc(fields: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(fields);
    hasher.finalize()
}

/// Verifies a body against its stored checksum.
#[inline]
pub(crate) fn verify_body_crc(body: &[u8], expected: u32) -> bool { body_crc(body) == expected }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_crc() {
        let data = b"test message";
        let crc = body_crc(data);

        assert_eq!(crc, body_crc(data));
        assert_ne!(crc, body_crc(b"test messagf"));
    }

    #[test]
    fn test_verify_body_crc() {
        let data = b"message to verify";
        let crc = body_crc(data);

        assert!(verify_body_crc(data, crc));
        assert!(!verify_body_crc(data, crc.wrapping_add(1)));
        assert!(!verify_body_crc(b"wrong", crc));
    }

    #[test]
    fn test_header_crc_matches_one_shot_hash() {
        let fields = [1u8, 2, 3, 4, 5];
        assert_eq!(header_crc(&fields), crc32fast::hash(&fields));
    }
}

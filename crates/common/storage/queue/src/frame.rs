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

//! Frame codec: the on-disk unit of a part.
//!
//! ## On-Disk Frame Format
//!
//! Frames are stored contiguously in part files. All integers are
//! little-endian.
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬─────────────┐
//! │ magic 4B │ type 1B  │ rsvd 3B  │ length 4B│ ordinal  │ body crc │ hdr crc  │ body        │
//! │ EEFEEEEE │ 'S'/'O'  │ zero     │ u32      │ u32      │ u32      │ u32      │ length bytes│
//! └──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴─────────────┘
//! ```
//!
//! - **ordinal**: 0-based index of the frame within its part
//! - **body crc**: CRC-32 over the body
//! - **hdr crc**: CRC-32 over the first 20 header bytes
//!
//! Writers store the body before the header, so a header that passes its
//! checksum marks the commit point of the frame. Zeroed space decodes as a
//! clean end of data, anything half-written decodes as incomplete.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use snafu::ensure;

use crate::{
    Result,
    crc::{body_crc, header_crc, verify_body_crc},
    error::PayloadTooLargeSnafu,
};

/// Marker opening every frame header.
pub const FRAME_MAGIC: u32 = 0xEEFE_EEEE;

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Largest body a frame can describe.
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize - HEADER_SIZE;

/// Offset of the header checksum; everything before it is covered by it.
const HEADER_CRC_OFFSET: usize = 20;

/// Kind of payload carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Opaque bytes.
    String = b'S',
    /// Structured object, e.g. an [`Individual`](crate::individual::Individual).
    Object = b'O',
}

impl MsgType {
    /// Wire tag of this type.
    #[must_use]
    pub const fn tag(self) -> u8 { self as u8 }
}

impl TryFrom<u8> for MsgType {
    type Error = UnknownMsgType;

    fn try_from(tag: u8) -> std::result::Result<Self, Self::Error> {
        match tag {
            b'S' => Ok(Self::String),
            b'O' => Ok(Self::Object),
            other => Err(UnknownMsgType(other)),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("STRING"),
            Self::Object => f.write_str("OBJECT"),
        }
    }
}

/// A header that passed its checksum but names no known message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownMsgType(pub u8);

impl fmt::Display for UnknownMsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown message type tag {:#04x}", self.0)
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MsgType,
    /// Body length in bytes.
    pub length:   u32,
    /// 0-based index of the frame within its part.
    pub ordinal:  u32,
    pub body_crc: u32,
}

impl Header {
    /// Builds the header describing `body`.
    pub fn for_body(msg_type: MsgType, ordinal: u32, body: &[u8]) -> Result<Self> {
        ensure!(
            body.len() <= MAX_PAYLOAD_LEN,
            PayloadTooLargeSnafu {
                len: body.len(),
                max: MAX_PAYLOAD_LEN,
            }
        );

        #[allow(clippy::cast_possible_truncation)]
        let length = body.len() as u32;

        Ok(Self {
            msg_type,
            length,
            ordinal,
            body_crc: body_crc(body),
        })
    }

    /// Total bytes occupied by the frame, header included.
    #[must_use]
    pub const fn frame_len(&self) -> u64 { HEADER_SIZE as u64 + self.length as u64 }

    /// Serializes the header, checksum included.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&FRAME_MAGIC.to_le_bytes());
        buf[4] = self.msg_type.tag();
        buf[8..12].copy_from_slice(&self.length.to_le_bytes());
        buf[12..16].copy_from_slice(&self.ordinal.to_le_bytes());
        buf[16..20].copy_from_slice(&self.body_crc.to_le_bytes());
        let crc = header_crc(&buf[..HEADER_CRC_OFFSET]);
        buf[HEADER_CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        buf
    }
}

/// Outcome of decoding at a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// A complete, checksummed value.
    Ready(T),
    /// Bytes are present but do not (yet) form a complete frame.
    Incomplete,
    /// No frame starts here.
    EndOfData,
}

impl<T> Decoded<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Self::Ready(value) => Decoded::Ready(f(value)),
            Self::Incomplete => Decoded::Incomplete,
            Self::EndOfData => Decoded::EndOfData,
        }
    }
}

/// Encodes a complete frame.
///
/// [`PartWriter::append`](crate::part::PartWriter::append) lays out the same
/// bytes in place but stores the body first; keep the two in step.
pub fn encode(msg_type: MsgType, ordinal: u32, body: &[u8]) -> Result<Bytes> {
    let header = Header::for_body(msg_type, ordinal, body)?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_slice(&header.to_bytes());
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Decodes the header at the start of `buf`.
///
/// `buf` holds every byte currently available from the frame position
/// onwards. `Ready` is only returned when the whole frame fits in `buf`.
pub fn decode_header(buf: &[u8]) -> std::result::Result<Decoded<Header>, UnknownMsgType> {
    let head = &buf[..buf.len().min(HEADER_SIZE)];
    if head.iter().all(|b| *b == 0) {
        return Ok(Decoded::EndOfData);
    }
    if head.len() < HEADER_SIZE {
        return Ok(Decoded::Incomplete);
    }

    let magic = read_u32(head, 0);
    let stored_crc = read_u32(head, HEADER_CRC_OFFSET);
    if magic != FRAME_MAGIC || header_crc(&head[..HEADER_CRC_OFFSET]) != stored_crc {
        return Ok(Decoded::Incomplete);
    }

    let header = Header {
        msg_type: MsgType::try_from(head[4])?,
        length:   read_u32(head, 8),
        ordinal:  read_u32(head, 12),
        body_crc: read_u32(head, 16),
    };

    if (buf.len() as u64) < header.frame_len() {
        return Ok(Decoded::Incomplete);
    }
    Ok(Decoded::Ready(header))
}

/// Extracts and verifies the body described by `header` from `buf`, which
/// starts at the frame position.
#[must_use]
pub fn decode_body<'a>(header: &Header, buf: &'a [u8]) -> Decoded<&'a [u8]> {
    let end = HEADER_SIZE + header.length as usize;
    if buf.len() < end {
        return Decoded::Incomplete;
    }
    let body = &buf[HEADER_SIZE..end];
    if verify_body_crc(body, header.body_crc) {
        Decoded::Ready(body)
    } else {
        Decoded::Incomplete
    }
}

/// Decodes a whole frame from the start of `buf`.
pub fn decode(buf: &[u8]) -> std::result::Result<Decoded<(Header, &[u8])>, UnknownMsgType> {
    Ok(match decode_header(buf)? {
        Decoded::Ready(header) => decode_body(&header, buf).map(|body| (header, body)),
        Decoded::Incomplete => Decoded::Incomplete,
        Decoded::EndOfData => Decoded::EndOfData,
    })
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

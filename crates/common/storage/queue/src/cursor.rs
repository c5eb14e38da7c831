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

//! Durable consumer cursors.
//!
//! Each consumer owns one small cursor file recording the part it reads and
//! the offset of the next unread frame. Updates go to a temporary file which
//! is fsynced and then renamed over the cursor, so a crash leaves either the
//! previous or the new record on disk.
//!
//! ## Binary Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Cursor record (40 bytes, little-endian)                │
//! ├─────────────────────┬──────────────────────────────────┤
//! │ magic: [u8; 4]      │ "VQCR"                           │
//! │ version: u32        │ Format version, currently 1      │
//! │ part: u64           │ Part sequence, 0 = no part yet   │
//! │ offset: u64         │ Offset of the next unread frame  │
//! │ count_popped: u64   │ Frames committed so far          │
//! │ checksum: u32       │ CRC32 of the preceding 32 bytes  │
//! │ reserved: [u8; 4]   │ Reserved for future use          │
//! └─────────────────────┴──────────────────────────────────┘
//! ```

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use snafu::ensure;
use tracing::debug;

use crate::{
    Result,
    error::{CursorCorruptedSnafu, UnsupportedCursorVersionSnafu},
    path::{cursor_path, sync_dir},
};

/// Magic bytes identifying a cursor file: "VQCR"
pub const CURSOR_MAGIC: [u8; 4] = *b"VQCR";

/// Current cursor format version.
pub const CURSOR_VERSION: u32 = 1;

/// Size of a serialized cursor in bytes.
pub const CURSOR_FILE_SIZE: usize = 40;

const CHECKSUM_OFFSET: usize = 32;

/// A consumer's position in its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Sequence of the part being read; 0 before the first part exists.
    pub part:         u64,
    /// Offset of the next unread frame within `part`.
    pub offset:       u64,
    /// Number of frames committed by this consumer.
    pub count_popped: u64,
}

impl Cursor {
    /// Serialize the cursor to its fixed-size record.
    pub fn serialize(&self) -> [u8; CURSOR_FILE_SIZE] {
        let mut buf = [0u8; CURSOR_FILE_SIZE];
        buf[0..4].copy_from_slice(&CURSOR_MAGIC);
        buf[4..8].copy_from_slice(&CURSOR_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.part.to_le_bytes());
        buf[16..24].copy_from_slice(&self.offset.to_le_bytes());
        buf[24..32].copy_from_slice(&self.count_popped.to_le_bytes());
        let checksum = crc32fast::hash(&buf[..CHECKSUM_OFFSET]);
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Deserialize a cursor record.
    ///
    /// Validates length, magic, version, and checksum.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() == CURSOR_FILE_SIZE,
            CursorCorruptedSnafu {
                reason: format!(
                    "unexpected length: {} bytes, expected {CURSOR_FILE_SIZE}",
                    data.len()
                ),
            }
        );

        let magic = &data[0..4];
        ensure!(
            magic == CURSOR_MAGIC,
            CursorCorruptedSnafu {
                reason: format!("invalid magic: {magic:?}"),
            }
        );

        let version = u32::from_le_bytes(le_array(&data[4..8]));
        ensure!(
            version == CURSOR_VERSION,
            UnsupportedCursorVersionSnafu { version }
        );

        let stored = u32::from_le_bytes(le_array(&data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4]));
        let computed = crc32fast::hash(&data[..CHECKSUM_OFFSET]);
        ensure!(
            stored == computed,
            CursorCorruptedSnafu {
                reason: format!("checksum mismatch: stored={stored:#x}, computed={computed:#x}"),
            }
        );

        Ok(Self {
            part:         u64::from_le_bytes(le_array(&data[8..16])),
            offset:       u64::from_le_bytes(le_array(&data[16..24])),
            count_popped: u64::from_le_bytes(le_array(&data[24..32])),
        })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// File-backed storage for one consumer's cursor.
pub struct CursorStore {
    path:     PathBuf,
    tmp_path: PathBuf,
}

impl CursorStore {
    pub fn new<P: AsRef<Path>>(base: P, queue: &str, consumer: &str) -> Self {
        let path = cursor_path(base, queue, consumer);
        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(".tmp");
        Self {
            path,
            tmp_path: tmp_path.into(),
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Reads the stored cursor, `None` if the consumer never stored one.
    pub fn load(&self) -> Result<Option<Cursor>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Cursor::deserialize(&data).map(Some)
    }

    /// Durably replaces the stored cursor.
    pub fn store(&self, cursor: &Cursor) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.tmp_path)?;
        file.write_all(&cursor.serialize())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&self.tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            sync_dir(dir);
        }

        debug!(
            path = ?self.path,
            part = cursor.part,
            offset = cursor.offset,
            count_popped = cursor.count_popped,
            "Cursor stored"
        );
        Ok(())
    }
}

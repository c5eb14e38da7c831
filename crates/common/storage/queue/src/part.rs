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

//! Parts: the unit of rotation.
//!
//! A part is one preallocated, append-only file holding contiguous frames.
//! Exactly one [`PartWriter`] ever exists for a part, the one that created
//! it; once a part with a higher sequence exists the part is closed and its
//! bytes never change again. Any number of [`PartReader`]s can map the same
//! part concurrently.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use bytes::Bytes;
use snafu::ensure;
use tracing::{debug, info};

use crate::{
    QueueError, Result,
    error::PartFullSnafu,
    file::{DataFile, ReadOnlyDataFile},
    frame::{self, Decoded, HEADER_SIZE, Header, MsgType},
    path::{part_file_name, scan_parts, sync_dir},
};

/// Identity of a part within a queue directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    dir:      PathBuf,
    sequence: u64,
}

impl Part {
    pub fn new<P: Into<PathBuf>>(queue_dir: P, sequence: u64) -> Self {
        Self {
            dir: queue_dir.into(),
            sequence,
        }
    }

    pub fn sequence(&self) -> u64 { self.sequence }

    pub fn path(&self) -> PathBuf { self.dir.join(part_file_name(self.sequence)) }

    /// Maps the part for reading. `None` while the writer has not yet
    /// preallocated it.
    pub fn open_for_read(&self) -> Result<Option<PartReader>> {
        Ok(ReadOnlyDataFile::open(self.path())?.map(|file| PartReader {
            file,
            sequence: self.sequence,
        }))
    }

    /// The oldest part created after this one, if any.
    pub fn successor(&self) -> Result<Option<Self>> {
        Ok(scan_parts(&self.dir)?
            .into_iter()
            .find(|s| *s > self.sequence)
            .map(|s| Self::new(self.dir.clone(), s)))
    }

    /// A part is closed once a newer part exists in the same queue.
    pub fn is_closed(&self) -> Result<bool> { Ok(self.successor()?.is_some()) }
}

/// Single writer of a part.
pub struct PartWriter {
    file:             DataFile,
    sequence:         u64,
    /// Byte offset where the next frame goes.
    write_position:   u64,
    /// Everything before this offset has been flushed.
    flushed_position: u64,
    frame_count:      u32,
    created_at:       Instant,
}

impl PartWriter {
    /// Creates the part with the next free sequence in `queue_dir`.
    ///
    /// The sequence is one past the highest part found in the directory. If
    /// another writer claims it first the next one is tried.
    pub fn create_next(queue_dir: &Path, capacity: u64) -> Result<Self> {
        let mut sequence = scan_parts(queue_dir)?.last().map_or(1, |s| s + 1);

        loop {
            let path = queue_dir.join(part_file_name(sequence));
            if let Some(file) = DataFile::create_new(&path, capacity)? {
                sync_dir(queue_dir);
                info!(path = ?path, sequence, capacity, "Part created");
                return Ok(Self {
                    file,
                    sequence,
                    write_position: 0,
                    flushed_position: 0,
                    frame_count: 0,
                    created_at: Instant::now(),
                });
            }

            debug!(sequence, "Part sequence already taken");
            sequence += 1;
        }
    }

    /// Appends one frame and returns the committed length of the part.
    ///
    /// The body is stored before the header so that readers never observe a
    /// valid header in front of a partial body.
    pub fn append(&mut self, msg_type: MsgType, body: &[u8]) -> Result<u64> {
        let header = Header::for_body(msg_type, self.frame_count, body)?;
        let needed = header.frame_len();
        let remaining = self.remaining();

        ensure!(
            needed <= remaining && self.frame_count < u32::MAX,
            PartFullSnafu {
                sequence: self.sequence,
                needed,
                remaining,
            }
        );

        let offset = self.write_position;
        if !body.is_empty() {
            self.file.write_at(offset + HEADER_SIZE as u64, body)?;
        }
        self.file.write_at(offset, &header.to_bytes())?;

        self.write_position += needed;
        self.frame_count += 1;
        Ok(self.write_position)
    }

    /// Whether a body of `len` bytes still fits.
    pub fn fits(&self, len: usize) -> bool { (HEADER_SIZE + len) as u64 <= self.remaining() }

    pub fn remaining(&self) -> u64 { self.file.size() - self.write_position }

    /// Bytes written but not yet flushed.
    pub fn pending_bytes(&self) -> u64 { self.write_position - self.flushed_position }

    /// Flushes the bytes written since the previous flush.
    pub fn flush(&mut self) -> Result<()> {
        let pending = self.pending_bytes();
        if pending > 0 {
            self.file.flush_range(self.flushed_position, pending)?;
            self.flushed_position = self.write_position;
        }
        Ok(())
    }

    /// Whether another writer has started a newer part.
    ///
    /// Writers pick one past the highest sequence they see and step over
    /// taken names, so any newer part implies `sequence + 1` exists.
    pub fn is_superseded(&self) -> bool {
        self.file
            .path()
            .with_file_name(part_file_name(self.sequence + 1))
            .exists()
    }

    pub fn sequence(&self) -> u64 { self.sequence }

    pub fn write_position(&self) -> u64 { self.write_position }

    pub fn frame_count(&self) -> u32 { self.frame_count }

    pub fn elapsed(&self) -> Duration { self.created_at.elapsed() }
}

/// Result of scanning a part forward from an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSummary {
    /// Complete frames found.
    pub frames:     u64,
    /// Offset right after the last complete frame.
    pub end_offset: u64,
    /// The scan stopped at a partially written frame.
    pub torn:       bool,
}

/// Read handle on a part.
pub struct PartReader {
    file:     ReadOnlyDataFile,
    sequence: u64,
}

impl PartReader {
    pub fn sequence(&self) -> u64 { self.sequence }

    pub fn size(&self) -> u64 { self.file.size() }

    /// Decodes the header of the frame at `offset`.
    pub fn read_header(&self, offset: u64) -> Result<Decoded<Header>> {
        frame::decode_header(self.window(offset)?).map_err(|e| self.corrupted(offset, &e))
    }

    /// Decodes the body of the frame at `offset` described by `header`.
    pub fn read_body(&self, offset: u64, header: &Header) -> Result<Decoded<Bytes>> {
        Ok(frame::decode_body(header, self.window(offset)?).map(Bytes::copy_from_slice))
    }

    /// Decodes the whole frame at `offset`.
    pub fn read_frame(&self, offset: u64) -> Result<Decoded<(Header, Bytes)>> {
        let decoded = frame::decode(self.window(offset)?).map_err(|e| self.corrupted(offset, &e))?;
        Ok(decoded.map(|(header, body)| (header, Bytes::copy_from_slice(body))))
    }

    /// Walks complete frames starting at `offset`.
    pub fn scan_from(&self, offset: u64) -> Result<ScanSummary> {
        let mut summary = ScanSummary {
            end_offset: offset,
            ..Default::default()
        };

        loop {
            let window = self.window(summary.end_offset)?;
            match frame::decode(window).map_err(|e| self.corrupted(summary.end_offset, &e))? {
                Decoded::Ready((header, _)) => {
                    summary.frames += 1;
                    summary.end_offset += header.frame_len();
                }
                Decoded::Incomplete => {
                    summary.torn = true;
                    break;
                }
                Decoded::EndOfData => break,
            }
        }

        debug!(
            sequence = self.sequence,
            offset,
            frames = summary.frames,
            end_offset = summary.end_offset,
            torn = summary.torn,
            "Part scan complete"
        );
        Ok(summary)
    }

    /// Every byte from `offset` to the end of the file.
    fn window(&self, offset: u64) -> Result<&[u8]> {
        let size = self.file.size();
        if offset >= size {
            return Ok(&[]);
        }
        self.file.as_slice(offset, size - offset)
    }

    fn corrupted(&self, offset: u64, reason: &impl ToString) -> QueueError {
        QueueError::CorruptedFrame {
            part: self.sequence,
            offset,
            reason: reason.to_string(),
        }
    }
}

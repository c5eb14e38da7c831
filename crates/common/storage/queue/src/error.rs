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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Queue operation errors.
///
/// "No data yet" and "torn write in progress" are not errors; they surface as
/// [`Decoded`](crate::frame::Decoded) states and `false`/`None` results.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// The queue directory cannot be created or accessed.
    #[snafu(display("Queue directory {} is unavailable", path.display()))]
    QueueUnavailable { path: PathBuf, source: io::Error },

    /// The message was rejected before any byte was written.
    #[snafu(display("Payload of {len} bytes exceeds the limit of {max} bytes"))]
    PayloadTooLarge { len: usize, max: usize },

    /// Filesystem I/O failure.
    #[snafu(display("IO error: {source}"), context(false))]
    Io { source: io::Error },

    /// Memory mapping operation failed.
    #[snafu(display("Mmap operation failed: {message}"))]
    MmapFailed { message: String },

    /// The frame does not fit in the remaining capacity of the part.
    #[snafu(display("Part {sequence} is full: {needed} bytes needed, {remaining} remaining"))]
    PartFull {
        sequence:  u64,
        needed:    u64,
        remaining: u64,
    },

    /// Write attempted through a read-only handle.
    #[snafu(display("Queue {name} is opened read-only"))]
    ReadOnly { name: String },

    /// Queue or consumer name that cannot be used as a path component.
    #[snafu(display("Invalid name: {name:?}"))]
    InvalidName { name: String },

    /// A frame passed its header checksum but carries an impossible value.
    #[snafu(display("Corrupted frame in part {part} at offset {offset}: {reason}"))]
    CorruptedFrame {
        part:   u64,
        offset: u64,
        reason: String,
    },

    /// Cursor file failed validation.
    #[snafu(display("Cursor corrupted: {reason}"))]
    CursorCorrupted { reason: String },

    /// Cursor file written by an unknown format version.
    #[snafu(display("Unsupported cursor version: {version}"))]
    UnsupportedCursorVersion { version: u32 },

    /// `pop_body` called without a staged header.
    #[snafu(display("No header is staged, call pop_header first"))]
    NoStagedHeader,

    /// Individual payload does not match the expected graph shape.
    #[snafu(display("Malformed individual payload: {reason}"))]
    MalformedPayload { reason: String },
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

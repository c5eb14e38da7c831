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

//! Queue writer.
//!
//! A [`Queue`] opened for writing always starts a brand-new part, one past
//! the highest part already in the queue directory. No two handles ever
//! append to the same part, so appends need no locking. A process that opens
//! the queue later supersedes the earlier part; the older handle notices on
//! its next push and moves on to a fresh part instead of appending to a
//! closed one.
//!
//! ## Usage
//!
//! ```ignore
//! let mut queue = Queue::open("/var/lib/app", "events", Mode::ReadWrite)?;
//! queue.push(b"hello", MsgType::String)?;
//! assert_eq!(queue.count_pushed(), 1);
//! ```

use std::path::{Path, PathBuf};

use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    FlushMode, Mode, QueueBuilder, QueueConfig, QueueError, Result,
    error::{PayloadTooLargeSnafu, QueueUnavailableSnafu, ReadOnlySnafu},
    frame::MsgType,
    part::{Part, PartWriter},
    path::{queue_dir, scan_parts, validate_name},
};

/// Handle on a named queue.
pub struct Queue {
    config:       QueueConfig,
    /// `base_path/<name>`.
    dir:          PathBuf,
    /// Part owned by this handle; `None` for read-only handles.
    writer:       Option<PartWriter>,
    /// Messages pushed through this handle since it was opened.
    count_pushed: u64,
}

impl Queue {
    /// Open a queue with default settings.
    pub fn open<P: AsRef<Path>>(base_path: P, name: &str, mode: Mode) -> Result<Self> {
        QueueBuilder::new(base_path.as_ref(), name).mode(mode).open()
    }

    pub(crate) fn with_config(config: QueueConfig) -> Result<Self> {
        validate_name(&config.name)?;
        let dir = queue_dir(&config.base_path, &config.name);

        let writer = if config.mode.is_writable() {
            std::fs::create_dir_all(&dir).context(QueueUnavailableSnafu { path: dir.clone() })?;
            let writer = PartWriter::create_next(&dir, config.part_capacity)
                .map_err(|e| unavailable(&dir, e))?;
            Some(writer)
        } else {
            std::fs::read_dir(&dir).context(QueueUnavailableSnafu { path: dir.clone() })?;
            None
        };

        info!(
            path = ?dir,
            mode = ?config.mode,
            part = ?writer.as_ref().map(PartWriter::sequence),
            "Queue opened"
        );

        Ok(Self {
            config,
            dir,
            writer,
            count_pushed: 0,
        })
    }

    /// Append a message and return its 0-based sequence within this handle.
    ///
    /// Oversized bodies are rejected before anything is written. Never blocks
    /// on readers.
    pub fn push(&mut self, body: &[u8], msg_type: MsgType) -> Result<u64> {
        ensure!(
            self.writer.is_some(),
            ReadOnlySnafu {
                name: self.config.name.clone(),
            }
        );

        let limit = self.config.payload_limit();
        ensure!(
            body.len() <= limit,
            PayloadTooLargeSnafu {
                len: body.len(),
                max: limit,
            }
        );

        if self.needs_roll(body.len()) {
            self.roll()?;
        }

        let flush_mode = self.config.flush_mode;
        let writer = self.writer.as_mut().context(ReadOnlySnafu {
            name: self.config.name.clone(),
        })?;
        writer.append(msg_type, body)?;

        match flush_mode {
            FlushMode::Sync => writer.flush()?,
            FlushMode::Batch { bytes } if writer.pending_bytes() >= bytes as u64 => writer.flush()?,
            FlushMode::Batch { .. } | FlushMode::Async => {}
        }

        let sequence = self.count_pushed;
        self.count_pushed += 1;
        Ok(sequence)
    }

    fn needs_roll(&self, len: usize) -> bool {
        self.writer.as_ref().is_some_and(|w| {
            !w.fits(len)
                || self.superseded(w)
                || (w.frame_count() > 0
                    && self.config.roll_strategy.should_roll(
                        w.write_position(),
                        w.elapsed(),
                        u64::from(w.frame_count()),
                    ))
        })
    }

    /// Consumers move past a part as soon as a newer one exists, so nothing
    /// may be appended to it afterwards.
    fn superseded(&self, writer: &PartWriter) -> bool {
        let superseded = writer.is_superseded();
        if superseded {
            debug!(
                queue = %self.config.name,
                part = writer.sequence(),
                "Part superseded by another writer"
            );
        }
        superseded
    }

    /// Closes the current part and starts the next one.
    fn roll(&mut self) -> Result<()> {
        if let Some(old) = self.writer.as_mut() {
            old.flush()?;
        }

        let next = PartWriter::create_next(&self.dir, self.config.part_capacity)?;
        if let Some(old) = self.writer.replace(next) {
            info!(
                queue = %self.config.name,
                closed = old.sequence(),
                frames = old.frame_count(),
                bytes = old.write_position(),
                "Part rolled"
            );
        }
        Ok(())
    }

    /// Flush everything written so far to disk.
    pub fn flush(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Sequence numbers of every part on disk, ascending.
    pub fn parts(&self) -> Result<Vec<u64>> { scan_parts(&self.dir) }

    /// Complete frames across every part on disk.
    pub fn count_messages(&self) -> Result<u64> {
        let mut total = 0;
        for sequence in self.parts()? {
            if let Some(reader) = Part::new(&self.dir, sequence).open_for_read()? {
                total += reader.scan_from(0)?.frames;
            }
        }
        Ok(total)
    }

    /// Part this handle appends to.
    pub fn current_part(&self) -> Option<u64> { self.writer.as_ref().map(PartWriter::sequence) }

    /// Whether the handle can do its job: a writable part is open, or the
    /// queue directory is readable.
    pub fn is_ready(&self) -> bool {
        match self.config.mode {
            Mode::ReadWrite => self.writer.is_some(),
            Mode::Read => self.dir.is_dir(),
        }
    }

    pub fn count_pushed(&self) -> u64 { self.count_pushed }

    pub fn name(&self) -> &str { &self.config.name }

    pub fn mode(&self) -> Mode { self.config.mode }
}

/// Failing to set up the handle's own part means the queue directory is not
/// usable for writing.
fn unavailable(dir: &Path, err: QueueError) -> QueueError {
    match err {
        QueueError::Io { source } => QueueError::QueueUnavailable {
            path: dir.to_path_buf(),
            source,
        },
        other => other,
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!(queue = %self.config.name, error = %e, "Failed to flush part on drop");
            }
        }
    }
}

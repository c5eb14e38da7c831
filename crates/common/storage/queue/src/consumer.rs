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

//! Named consumer with a durable cursor.
//!
//! A [`Consumer`] reads frames in order, one at a time, in three steps:
//! [`pop_header`](Consumer::pop_header) stages the next header,
//! [`pop_body`](Consumer::pop_body) reads its body and
//! [`commit`](Consumer::commit) persists the advance past it. Until a frame
//! is committed, reopening the consumer delivers it again (at-least-once).
//!
//! ```text
//! Idle ──pop_header──▶ HeaderRead ──pop_body──▶ BodyRead ──commit──▶ Idle
//!   ▲                      │
//!   └──── no data ─────────┘
//! ```
//!
//! Consumers with different names never share state; a consumer is a
//! sequential cursor and must not be driven from several threads at once.
//! Two live consumers with the same name race on the same cursor file and
//! the result is undefined.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    ConsumerBuilder, ConsumerConfig, Mode, Result, StartPosition,
    cursor::{Cursor, CursorStore},
    error::{NoStagedHeaderSnafu, QueueUnavailableSnafu},
    frame::{Decoded, Header},
    part::{Part, PartReader},
    path::{cursor_dir, queue_dir, scan_parts, validate_name},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    HeaderRead(Header),
    BodyRead(Header),
}

pub struct Consumer {
    config: ConsumerConfig,
    dir:    PathBuf,
    store:  CursorStore,
    /// Last committed position.
    cursor: Cursor,
    /// Mapping of `cursor.part`, opened lazily.
    reader: Option<PartReader>,
    stage:  Stage,
}

impl Consumer {
    /// Open a read-write consumer with default settings.
    pub fn open<P: AsRef<Path>>(
        base_path: P,
        consumer_name: &str,
        queue_name: &str,
    ) -> Result<Self> {
        Self::open_with_mode(base_path, consumer_name, queue_name, Mode::ReadWrite)
    }

    pub fn open_with_mode<P: AsRef<Path>>(
        base_path: P,
        consumer_name: &str,
        queue_name: &str,
        mode: Mode,
    ) -> Result<Self> {
        ConsumerBuilder::new(base_path.as_ref(), queue_name, consumer_name)
            .mode(mode)
            .open()
    }

    pub(crate) fn with_config(config: ConsumerConfig) -> Result<Self> {
        validate_name(&config.queue_name)?;
        validate_name(&config.consumer_name)?;

        let dir = queue_dir(&config.base_path, &config.queue_name);
        if config.mode.is_writable() {
            let cursors = cursor_dir(&config.base_path, &config.queue_name);
            std::fs::create_dir_all(&cursors).context(QueueUnavailableSnafu { path: cursors })?;
        }

        let store = CursorStore::new(&config.base_path, &config.queue_name, &config.consumer_name);
        let cursor = match store.load()? {
            Some(cursor) => cursor,
            None => {
                let cursor = initial_cursor(&dir, config.start_position)?;
                if config.mode.is_writable() {
                    store.store(&cursor)?;
                }
                cursor
            }
        };

        info!(
            queue = %config.queue_name,
            consumer = %config.consumer_name,
            mode = ?config.mode,
            part = cursor.part,
            offset = cursor.offset,
            "Consumer opened"
        );

        Ok(Self {
            config,
            dir,
            store,
            cursor,
            reader: None,
            stage: Stage::Idle,
        })
    }

    /// Stage the header of the next uncommitted frame.
    ///
    /// Returns `false` when no complete frame is available yet. Never blocks;
    /// the caller polls. Calling it again before [`commit`](Self::commit)
    /// stages the same frame again.
    pub fn pop_header(&mut self) -> Result<bool> {
        self.stage = Stage::Idle;

        loop {
            if let Some(header) = self.header_at_cursor()? {
                self.stage = Stage::HeaderRead(header);
                return Ok(true);
            }

            let Some(next) = Part::new(&self.dir, self.cursor.part).successor()? else {
                return Ok(false);
            };

            // The writer may have appended its last frames between the read
            // above and the rescan; the part is closed now, so look once more.
            let offset = self.cursor.offset;
            let torn = match self.current_reader()? {
                Some(reader) => match reader.read_header(offset)? {
                    Decoded::Ready(header) => {
                        self.stage = Stage::HeaderRead(header);
                        return Ok(true);
                    }
                    Decoded::Incomplete => true,
                    Decoded::EndOfData => false,
                },
                None => false,
            };
            if torn {
                warn!(
                    queue = %self.config.queue_name,
                    consumer = %self.config.consumer_name,
                    part = self.cursor.part,
                    offset,
                    "Skipping torn tail of superseded part"
                );
            }

            self.advance_to(next.sequence())?;
        }
    }

    /// Read the body of the staged frame.
    ///
    /// `None` means the body is not fully written yet; the frame stays staged
    /// and the call can be retried.
    pub fn pop_body(&mut self) -> Result<Option<Bytes>> {
        let header = match self.stage {
            Stage::HeaderRead(header) | Stage::BodyRead(header) => header,
            Stage::Idle => return NoStagedHeaderSnafu.fail(),
        };

        let offset = self.cursor.offset;
        let decoded = match self.current_reader()? {
            Some(reader) => reader.read_body(offset, &header)?,
            None => Decoded::EndOfData,
        };

        match decoded {
            Decoded::Ready(body) => {
                self.stage = Stage::BodyRead(header);
                Ok(Some(body))
            }
            Decoded::Incomplete | Decoded::EndOfData => {
                if let Some(next) = Part::new(&self.dir, self.cursor.part).successor()? {
                    warn!(
                        queue = %self.config.queue_name,
                        consumer = %self.config.consumer_name,
                        part = self.cursor.part,
                        offset,
                        "Skipping torn body at end of superseded part"
                    );
                    self.advance_to(next.sequence())?;
                    self.stage = Stage::Idle;
                }
                Ok(None)
            }
        }
    }

    /// Persist the advance past the frame whose body was read.
    ///
    /// Returns `false` if no body is staged.
    pub fn commit(&mut self) -> Result<bool> {
        let Stage::BodyRead(header) = self.stage else {
            return Ok(false);
        };

        let next = Cursor {
            offset: self.cursor.offset + header.frame_len(),
            count_popped: self.cursor.count_popped + 1,
            ..self.cursor
        };
        self.persist(&next)?;
        self.cursor = next;
        self.stage = Stage::Idle;
        Ok(true)
    }

    /// Header staged by the last successful [`pop_header`](Self::pop_header).
    pub fn header(&self) -> Option<&Header> {
        match &self.stage {
            Stage::HeaderRead(header) | Stage::BodyRead(header) => Some(header),
            Stage::Idle => None,
        }
    }

    /// Complete frames readable from the cursor without leaving the current
    /// part.
    pub fn batch_size(&mut self) -> Result<u64> {
        let offset = self.cursor.offset;
        match self.current_reader()? {
            Some(reader) => Ok(reader.scan_from(offset)?.frames),
            None => Ok(0),
        }
    }

    pub fn count_popped(&self) -> u64 { self.cursor.count_popped }

    /// Committed `(part, offset)`.
    pub fn position(&self) -> (u64, u64) { (self.cursor.part, self.cursor.offset) }

    pub fn name(&self) -> &str { &self.config.consumer_name }

    pub fn queue_name(&self) -> &str { &self.config.queue_name }

    pub fn mode(&self) -> Mode { self.config.mode }

    fn header_at_cursor(&mut self) -> Result<Option<Header>> {
        let offset = self.cursor.offset;
        match self.current_reader()? {
            Some(reader) => match reader.read_header(offset)? {
                Decoded::Ready(header) => Ok(Some(header)),
                Decoded::Incomplete | Decoded::EndOfData => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Mapping of the cursor's part, or `None` if there is nothing to read
    /// there (no part yet, part removed, or not yet preallocated).
    fn current_reader(&mut self) -> Result<Option<&PartReader>> {
        let stale = self
            .reader
            .as_ref()
            .is_none_or(|r| r.sequence() != self.cursor.part);
        if stale {
            self.reader = None;
            if self.cursor.part != 0 {
                let part = Part::new(&self.dir, self.cursor.part);
                if part.path().exists() {
                    self.reader = part.open_for_read()?;
                }
            }
        }
        Ok(self.reader.as_ref())
    }

    fn advance_to(&mut self, sequence: u64) -> Result<()> {
        let next = Cursor {
            part: sequence,
            offset: 0,
            ..self.cursor
        };
        self.persist(&next)?;

        info!(
            queue = %self.config.queue_name,
            consumer = %self.config.consumer_name,
            from = self.cursor.part,
            to = sequence,
            "Consumer advanced to next part"
        );
        self.cursor = next;
        self.reader = None;
        Ok(())
    }

    fn persist(&self, cursor: &Cursor) -> Result<()> {
        if self.config.mode.is_writable() {
            self.store.store(cursor)
        } else {
            Ok(())
        }
    }
}

fn initial_cursor(queue_dir: &Path, start: StartPosition) -> Result<Cursor> {
    let parts = scan_parts(queue_dir)?;
    let part = match start {
        StartPosition::ActivePart => parts.last(),
        StartPosition::Earliest => parts.first(),
    };
    let cursor = Cursor {
        part: part.copied().unwrap_or(0),
        ..Default::default()
    };
    debug!(dir = ?queue_dir, ?start, part = cursor.part, "New cursor");
    Ok(cursor)
}

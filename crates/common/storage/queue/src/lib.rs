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

//! Durable, append-only, multi-process message queue.
//!
//! A queue is a directory of numbered part files. Every writer handle appends
//! to a part of its own; named consumers read the parts in order and keep a
//! durable cursor, so a frame is delivered again until it is committed.
//!
//! ```text
//! base_path/
//! └── events/
//!     ├── 0000000001.part
//!     ├── 0000000002.part
//!     └── cursors/
//!         └── indexer.cursor
//! ```

pub mod builder;
pub mod config;
pub mod consumer;
mod crc;
pub mod cursor;
pub mod error;
pub mod file;
pub mod frame;
pub mod individual;
pub mod part;
pub mod path;
pub mod queue;

pub use builder::{ConsumerBuilder, QueueBuilder};
pub use config::{
    ConsumerConfig, DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_PART_CAPACITY, FlushMode, Mode, QueueConfig,
    RollStrategy, StartPosition,
};
pub use consumer::Consumer;
pub use cursor::{Cursor, CursorStore};
pub use error::{QueueError, Result};
pub use file::{DataFile, ReadOnlyDataFile};
pub use frame::{Decoded, HEADER_SIZE, Header, MsgType};
pub use individual::{Individual, Lang, Resource, convert_to_json};
pub use part::{Part, PartReader, PartWriter, ScanSummary};
pub use queue::Queue;

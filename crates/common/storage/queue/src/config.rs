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

use std::{path::PathBuf, time::Duration};

use crate::frame::HEADER_SIZE;

/// Default preallocated size of a part file.
pub const DEFAULT_PART_CAPACITY: u64 = 64 * 1024 * 1024;

/// Default upper bound on a single message body.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Access mode of a queue or consumer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Never writes: queues only enumerate parts, consumers never persist
    /// their cursor.
    Read,
    #[default]
    ReadWrite,
}

impl Mode {
    #[must_use]
    pub const fn is_writable(self) -> bool { matches!(self, Self::ReadWrite) }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub base_path:       PathBuf,
    pub name:            String,
    pub mode:            Mode,
    /// Preallocated size of every part created by this handle.
    pub part_capacity:   u64,
    pub max_payload_len: usize,
    pub roll_strategy:   RollStrategy,
    pub flush_mode:      FlushMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_path:       PathBuf::from("./queue_data"),
            name:            "queue".to_string(),
            mode:            Mode::ReadWrite,
            part_capacity:   DEFAULT_PART_CAPACITY,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            roll_strategy:   RollStrategy::BySize(DEFAULT_PART_CAPACITY),
            flush_mode:      FlushMode::Async,
        }
    }
}

impl QueueConfig {
    /// Largest body this configuration accepts; bounded by what an empty part
    /// can hold.
    #[must_use]
    pub fn payload_limit(&self) -> usize {
        let part_room = usize::try_from(self.part_capacity.saturating_sub(HEADER_SIZE as u64))
            .unwrap_or(usize::MAX);
        self.max_payload_len.min(part_room)
    }
}

/// When a writer abandons its part for a fresh one, on top of the hard
/// capacity limit.
#[derive(Debug, Clone)]
pub enum RollStrategy {
    BySize(u64),
    ByTime(Duration),
    ByCount(u64),
    Combined(Vec<RollStrategy>),
}

impl RollStrategy {
    pub fn should_roll(&self, current_size: u64, elapsed: Duration, count: u64) -> bool {
        match self {
            Self::BySize(size) => current_size >= *size,
            Self::ByTime(duration) => elapsed >= *duration,
            Self::ByCount(max_count) => count >= *max_count,
            Self::Combined(strategies) => strategies
                .iter()
                .any(|s| s.should_roll(current_size, elapsed, count)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Leave write-back to the OS; flush on roll, explicit flush and drop.
    Async,
    /// Flush the written range after every push.
    Sync,
    /// Flush once this many bytes are pending.
    Batch { bytes: usize },
}

/// Where a consumer without a cursor file starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Start of the newest part.
    #[default]
    ActivePart,
    /// Start of the oldest part still on disk.
    Earliest,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub base_path:      PathBuf,
    pub queue_name:     String,
    pub consumer_name:  String,
    pub mode:           Mode,
    pub start_position: StartPosition,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            base_path:      PathBuf::from("./queue_data"),
            queue_name:     "queue".to_string(),
            consumer_name:  "consumer".to_string(),
            mode:           Mode::ReadWrite,
            start_position: StartPosition::ActivePart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_by_size() {
        let strategy = RollStrategy::BySize(1000);
        assert!(!strategy.should_roll(999, Duration::from_secs(0), 0));
        assert!(strategy.should_roll(1000, Duration::from_secs(0), 0));
    }

    #[test]
    fn test_roll_by_time() {
        let strategy = RollStrategy::ByTime(Duration::from_secs(60));
        assert!(!strategy.should_roll(0, Duration::from_secs(59), 0));
        assert!(strategy.should_roll(0, Duration::from_secs(60), 0));
    }

    #[test]
    fn test_roll_by_count() {
        let strategy = RollStrategy::ByCount(100);
        assert!(!strategy.should_roll(0, Duration::from_secs(0), 99));
        assert!(strategy.should_roll(0, Duration::from_secs(0), 100));
    }

    #[test]
    fn test_roll_combined() {
        let strategy =
            RollStrategy::Combined(vec![RollStrategy::BySize(1000), RollStrategy::ByCount(100)]);

        assert!(!strategy.should_roll(999, Duration::from_secs(0), 99));
        assert!(strategy.should_roll(1000, Duration::from_secs(0), 99));
        assert!(strategy.should_roll(999, Duration::from_secs(0), 100));
    }

    #[test]
    fn test_payload_limit_bounded_by_part() {
        let config = QueueConfig {
            part_capacity: 1024,
            ..Default::default()
        };
        assert_eq!(config.payload_limit(), 1024 - HEADER_SIZE);

        let config = QueueConfig {
            max_payload_len: 100,
            ..Default::default()
        };
        assert_eq!(config.payload_limit(), 100);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Mode::default(), Mode::ReadWrite);
        assert!(!Mode::Read.is_writable());
        assert_eq!(StartPosition::default(), StartPosition::ActivePart);
        assert_eq!(QueueConfig::default().flush_mode, FlushMode::Async);
    }
}

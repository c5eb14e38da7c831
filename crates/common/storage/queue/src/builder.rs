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

use std::path::PathBuf;

use crate::{
    Consumer, ConsumerConfig, FlushMode, Mode, Queue, QueueConfig, Result, RollStrategy,
    StartPosition,
};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(base_path: P, name: S) -> Self {
        Self {
            config: QueueConfig {
                base_path: base_path.into(),
                name: name.into(),
                ..Default::default()
            },
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn part_capacity(mut self, size: u64) -> Self {
        self.config.part_capacity = size;
        self
    }

    pub fn max_payload_len(mut self, len: usize) -> Self {
        self.config.max_payload_len = len;
        self
    }

    pub fn roll_strategy(mut self, strategy: RollStrategy) -> Self {
        self.config.roll_strategy = strategy;
        self
    }

    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    pub fn open(self) -> Result<Queue> { Queue::with_config(self.config) }
}

pub struct ConsumerBuilder {
    config: ConsumerConfig,
}

impl ConsumerBuilder {
    pub fn new<P, Q, C>(base_path: P, queue_name: Q, consumer_name: C) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<String>,
        C: Into<String>,
    {
        Self {
            config: ConsumerConfig {
                base_path: base_path.into(),
                queue_name: queue_name.into(),
                consumer_name: consumer_name.into(),
                ..Default::default()
            },
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn start_position(mut self, position: StartPosition) -> Self {
        self.config.start_position = position;
        self
    }

    pub fn open(self) -> Result<Consumer> { Consumer::with_config(self.config) }
}

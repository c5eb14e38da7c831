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

use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

use tempfile::TempDir;
use vqueue::{
    Consumer, ConsumerBuilder, FlushMode, Individual, Lang, Mode, MsgType, Queue, QueueBuilder,
    QueueError, Resource, StartPosition, convert_to_json,
};
use vqueue_common_telemetry::init_default_ut_logging;

fn push_numbers(queue: &mut Queue, range: std::ops::Range<u32>) {
    for i in range {
        queue.push(i.to_string().as_bytes(), MsgType::String).unwrap();
    }
}

fn next(consumer: &mut Consumer) -> Option<u32> {
    if !consumer.pop_header().unwrap() {
        return None;
    }
    let body = consumer.pop_body().unwrap()?;
    Some(std::str::from_utf8(&body).unwrap().parse().unwrap())
}

fn drain(consumer: &mut Consumer) -> Vec<u32> {
    let mut received = Vec::new();
    while let Some(value) = next(consumer) {
        assert!(consumer.commit().unwrap());
        received.push(value);
    }
    received
}

fn earliest(base: &Path, name: &str) -> Consumer {
    ConsumerBuilder::new(base, "test_queue", name)
        .start_position(StartPosition::Earliest)
        .open()
        .unwrap()
}

#[test]
fn test_queue_consumer_interaction() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    let mut queue = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
    push_numbers(&mut queue, 0..10);
    assert_eq!(queue.count_pushed(), 10);

    let mut consumer = Consumer::open(temp_dir.path(), "consumer1", "test_queue").unwrap();
    assert_eq!(drain(&mut consumer), (0..10).collect::<Vec<_>>());
    assert_eq!(consumer.count_popped(), 10);
}

#[test]
fn test_multiple_consumers() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    let mut queue = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
    push_numbers(&mut queue, 0..20);

    let mut consumers: Vec<Consumer> = (0..3)
        .map(|i| Consumer::open(temp_dir.path(), &format!("consumer{i}"), "test_queue").unwrap())
        .collect();
    let mut received = vec![Vec::new(); consumers.len()];

    // Interleave reads across consumers.
    loop {
        let mut progressed = false;
        for (consumer, out) in consumers.iter_mut().zip(received.iter_mut()) {
            if let Some(value) = next(consumer) {
                assert!(consumer.commit().unwrap());
                out.push(value);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    for out in received {
        assert_eq!(out, (0..20).collect::<Vec<_>>());
    }
}

#[test]
fn test_rotation_preserves_order() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    {
        // Room for a handful of frames per part.
        let mut queue = QueueBuilder::new(temp_dir.path(), "test_queue")
            .part_capacity(160)
            .flush_mode(FlushMode::Sync)
            .open()
            .unwrap();
        push_numbers(&mut queue, 0..30);
        assert!(queue.parts().unwrap().len() > 1);
    }
    {
        let mut queue = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
        push_numbers(&mut queue, 30..40);
    }

    let mut consumer = earliest(temp_dir.path(), "replay");
    assert_eq!(drain(&mut consumer), (0..40).collect::<Vec<_>>());
}

#[test]
fn test_late_consumer_starts_at_active_part() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    {
        let mut queue = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
        push_numbers(&mut queue, 0..5);
    }
    let mut queue = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
    push_numbers(&mut queue, 5..12);

    let mut late = Consumer::open(temp_dir.path(), "late", "test_queue").unwrap();
    assert_eq!(drain(&mut late).len(), 7);

    let mut replay = earliest(temp_dir.path(), "replay");
    assert_eq!(drain(&mut replay).len(), 12);
}

#[test]
fn test_older_writer_keeps_delivering_after_newer_opens() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    let mut q1 = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
    push_numbers(&mut q1, 0..2);
    let mut consumer = Consumer::open(temp_dir.path(), "worker", "test_queue").unwrap();
    assert_eq!(drain(&mut consumer), vec![0, 1]);

    // The consumer moves on to the newer, still empty part.
    let mut q2 = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
    assert_eq!(drain(&mut consumer), Vec::<u32>::new());
    assert_eq!(consumer.position().0, 2);

    push_numbers(&mut q1, 2..4);
    assert_eq!(q1.current_part(), Some(3));
    assert_eq!(drain(&mut consumer), vec![2, 3]);

    push_numbers(&mut q2, 4..5);
    assert_eq!(q2.current_part(), Some(4));
    assert_eq!(drain(&mut consumer), vec![4]);

    let mut replay = earliest(temp_dir.path(), "replay");
    assert_eq!(drain(&mut replay), (0..5).collect::<Vec<_>>());
}

#[test]
fn test_redelivery_after_restart() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    let mut queue = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
    push_numbers(&mut queue, 0..10);

    {
        let mut consumer = Consumer::open(temp_dir.path(), "worker", "test_queue").unwrap();
        for expected in 0..3 {
            assert_eq!(next(&mut consumer), Some(expected));
            assert!(consumer.commit().unwrap());
        }
        // Read but never committed.
        assert_eq!(next(&mut consumer), Some(3));
    }

    let mut consumer = Consumer::open(temp_dir.path(), "worker", "test_queue").unwrap();
    assert_eq!(consumer.count_popped(), 3);
    assert_eq!(drain(&mut consumer), (3..10).collect::<Vec<_>>());
}

#[test]
fn test_peek_consumer_leaves_no_trace() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    let mut queue = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
    push_numbers(&mut queue, 0..4);

    let mut peek =
        Consumer::open_with_mode(temp_dir.path(), "peek", "test_queue", Mode::Read).unwrap();
    assert_eq!(drain(&mut peek), vec![0, 1, 2, 3]);

    let mut peek =
        Consumer::open_with_mode(temp_dir.path(), "peek", "test_queue", Mode::Read).unwrap();
    assert_eq!(drain(&mut peek), vec![0, 1, 2, 3]);

    let mut reader = Queue::open(temp_dir.path(), "test_queue", Mode::Read).unwrap();
    assert!(matches!(
        reader.push(b"nope", MsgType::String),
        Err(QueueError::ReadOnly { .. })
    ));
    assert_eq!(reader.count_messages().unwrap(), 4);
}

#[test]
fn test_object_frames_carry_individuals() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    let individual = Individual::new("d:ivan")
        .with("rdf:type", Resource::uri("v-s:Person"))
        .with("rdfs:label", Resource::string("Ivan", Lang::Ru))
        .with("v-s:age", Resource::Integer(42));

    let mut queue = Queue::open(temp_dir.path(), "test_queue", Mode::ReadWrite).unwrap();
    queue
        .push(&individual.to_msgpack().unwrap(), MsgType::Object)
        .unwrap();
    queue.push(b"not msgpack", MsgType::Object).unwrap();

    let mut consumer = Consumer::open(temp_dir.path(), "indexer", "test_queue").unwrap();

    assert!(consumer.pop_header().unwrap());
    assert_eq!(consumer.header().unwrap().msg_type, MsgType::Object);
    let body = consumer.pop_body().unwrap().unwrap();
    assert_eq!(
        convert_to_json(&body).unwrap(),
        concat!(
            r#"{"@":"d:ivan","rdf:type":[{"data":"v-s:Person","type":"Uri"}],"#,
            r#""rdfs:label":[{"data":"Ivan","lang":"RU","type":"String"}],"#,
            r#""v-s:age":[{"data":42,"type":"Integer"}]}"#,
        )
    );
    assert!(consumer.commit().unwrap());

    assert!(consumer.pop_header().unwrap());
    let body = consumer.pop_body().unwrap().unwrap();
    assert!(matches!(
        convert_to_json(&body),
        Err(QueueError::MalformedPayload { .. })
    ));
}

#[test]
fn test_concurrent_writer_and_consumer() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().to_path_buf();
    const TOTAL: u32 = 2_000;

    let mut queue = QueueBuilder::new(&base, "test_queue")
        .part_capacity(16 * 1024)
        .open()
        .unwrap();
    let mut consumer = earliest(&base, "follower");

    let writer = thread::spawn(move || {
        push_numbers(&mut queue, 0..TOTAL);
        queue.count_pushed()
    });

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut received = Vec::with_capacity(TOTAL as usize);
    while received.len() < TOTAL as usize {
        assert!(Instant::now() < deadline, "consumer stalled at {}", received.len());
        if !consumer.pop_header().unwrap() {
            thread::yield_now();
            continue;
        }
        if let Some(body) = consumer.pop_body().unwrap() {
            received.push(std::str::from_utf8(&body).unwrap().parse::<u32>().unwrap());
            assert!(consumer.commit().unwrap());
        }
    }

    assert_eq!(writer.join().unwrap(), u64::from(TOTAL));
    assert_eq!(received, (0..TOTAL).collect::<Vec<_>>());
}

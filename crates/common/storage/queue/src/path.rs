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

//! Directory layout of a queue.
//!
//! ```text
//! base_path/
//! └── <queue_name>/
//!     ├── 0000000001.part
//!     ├── 0000000002.part
//!     └── cursors/
//!         └── <consumer_name>.cursor
//! ```
//!
//! The directory listing is the only registry of parts: writers pick the
//! next sequence from it and consumers discover newer parts through it.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use snafu::ensure;
use tracing::debug;

use crate::{Result, error::InvalidNameSnafu};

pub const PART_EXTENSION: &str = "part";
pub const CURSOR_DIR: &str = "cursors";
pub const CURSOR_EXTENSION: &str = "cursor";

/// Checks that a queue or consumer name is usable as a single path
/// component.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    ensure!(valid, InvalidNameSnafu { name });
    Ok(())
}

/// Returns the directory holding a queue's parts: `base/<queue>`.
pub fn queue_dir<P: AsRef<Path>>(base: P, queue: &str) -> PathBuf { base.as_ref().join(queue) }

/// Generates a part file name: `NNNNNNNNNN.part`.
pub fn part_file_name(sequence: u64) -> String { format!("{sequence:010}.{PART_EXTENSION}") }

/// Returns full path to a part: `base/<queue>/NNNNNNNNNN.part`.
pub fn part_path<P: AsRef<Path>>(base: P, queue: &str, sequence: u64) -> PathBuf {
    queue_dir(base, queue).join(part_file_name(sequence))
}

/// Extracts the sequence number from a part file path.
pub fn parse_part_sequence(path: &Path) -> Option<u64> {
    if path.extension().and_then(|s| s.to_str()) != Some(PART_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Returns the directory holding a queue's cursors: `base/<queue>/cursors`.
pub fn cursor_dir<P: AsRef<Path>>(base: P, queue: &str) -> PathBuf {
    queue_dir(base, queue).join(CURSOR_DIR)
}

/// Returns full path to a consumer's cursor file.
pub fn cursor_path<P: AsRef<Path>>(base: P, queue: &str, consumer: &str) -> PathBuf {
    cursor_dir(base, queue).join(format!("{consumer}.{CURSOR_EXTENSION}"))
}

/// Lists the sequence numbers of all parts in a queue directory, ascending.
///
/// A missing directory has no parts.
pub fn scan_parts<P: AsRef<Path>>(dir: P) -> Result<Vec<u64>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut sequences = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(sequence) = parse_part_sequence(&entry.path()) {
            sequences.push(sequence);
        }
    }

    sequences.sort_unstable();
    Ok(sequences)
}

/// Flushes directory metadata so a freshly created or renamed entry
/// survives a crash. Not every platform can open a directory; failures
/// are logged and ignored.
pub(crate) fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|f| f.sync_all()) {
        debug!(dir = ?dir, error = %e, "Directory sync skipped");
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_part_file_name() {
        assert_eq!(part_file_name(1), "0000000001.part");
        assert_eq!(part_file_name(42), "0000000042.part");
    }

    #[test]
    fn test_full_paths() {
        assert_eq!(
            part_path("/base", "events", 3),
            PathBuf::from("/base/events/0000000003.part")
        );
        assert_eq!(
            cursor_path("/base", "events", "indexer"),
            PathBuf::from("/base/events/cursors/indexer.cursor")
        );
    }

    #[test_case("0000000007.part", Some(7) ; "part file")]
    #[test_case("0000000007.part.tmp", None ; "temporary file")]
    #[test_case("abc.part", None ; "non numeric stem")]
    #[test_case("0000000007.cursor", None ; "other extension")]
    fn test_parse_part_sequence(name: &str, expected: Option<u64>) {
        assert_eq!(parse_part_sequence(Path::new(name)), expected);
    }

    #[test_case("events", true ; "plain")]
    #[test_case("queue-1_a.b", true ; "punctuation")]
    #[test_case("", false ; "empty")]
    #[test_case(".hidden", false ; "leading dot")]
    #[test_case("..", false ; "parent")]
    #[test_case("a/b", false ; "separator")]
    #[test_case("a b", false ; "space")]
    fn test_validate_name(name: &str, ok: bool) {
        assert_eq!(validate_name(name).is_ok(), ok);
    }

    #[test]
    fn test_scan_parts() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = queue_dir(temp_dir.path(), "events");
        std::fs::create_dir_all(cursor_dir(temp_dir.path(), "events")).unwrap();

        for sequence in [3, 1, 12] {
            std::fs::File::create(dir.join(part_file_name(sequence))).unwrap();
        }
        std::fs::File::create(dir.join("0000000099.part.tmp")).unwrap();

        assert_eq!(scan_parts(&dir).unwrap(), vec![1, 3, 12]);
    }

    #[test]
    fn test_scan_missing_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(scan_parts(temp_dir.path().join("absent")).unwrap().is_empty());
    }
}

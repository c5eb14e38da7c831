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

//! Memory-mapped part files using mmap-io.
//!
//! Part files are preallocated to their full capacity when created, so a
//! mapping taken at any later time covers every byte the writer will ever
//! touch. Writers and readers share the file pages; a reader observes frames
//! as soon as the writer stores them.

use std::{
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
};

use mmap_io::MemoryMappedFile;

use crate::{QueueError, Result};

fn mmap_err(e: impl std::fmt::Display) -> QueueError {
    QueueError::MmapFailed {
        message: e.to_string(),
    }
}

/// Writable, preallocated part file.
pub struct DataFile {
    mmap: MemoryMappedFile,
    path: PathBuf,
    size: u64,
}

impl DataFile {
    /// Create a file that must not exist yet and preallocate `size` bytes.
    ///
    /// Returns `Ok(None)` when the path is already taken, which is how
    /// concurrent writers detect a sequence collision.
    pub fn create_new<P: AsRef<Path>>(path: P, size: u64) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.set_len(size)?;
        drop(file);

        let mmap = MemoryMappedFile::open_rw(&path).map_err(mmap_err)?;

        Ok(Some(Self { mmap, path, size }))
    }

    /// Write data at the specified offset.
    #[inline]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.mmap.update_region(offset, data).map_err(mmap_err)
    }

    /// Get file size.
    pub fn size(&self) -> u64 { self.size }

    /// Get file path.
    pub fn path(&self) -> &Path { &self.path }

    /// Flush every dirty page to disk.
    pub fn flush(&self) -> Result<()> { self.mmap.flush().map_err(mmap_err) }

    /// Flush a specific range to disk.
    pub fn flush_range(&self, offset: u64, len: u64) -> Result<()> {
        self.mmap.flush_range(offset, len).map_err(mmap_err)
    }
}

/// Read-only view of a part file.
pub struct ReadOnlyDataFile {
    mmap: MemoryMappedFile,
    size: u64,
}

impl ReadOnlyDataFile {
    /// Open an existing part in read-only mode.
    ///
    /// Returns `Ok(None)` while the file is still empty, i.e. its writer has
    /// reserved the name but not yet preallocated it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if std::fs::metadata(path)?.len() == 0 {
            return Ok(None);
        }

        let mmap = MemoryMappedFile::open_ro(path).map_err(mmap_err)?;
        let size = mmap.len();

        Ok(Some(Self { mmap, size }))
    }

    /// Get a slice of data at the specified offset.
    ///
    /// This is zero-copy for read-only mappings.
    #[inline]
    pub fn as_slice(&self, offset: u64, len: u64) -> Result<&[u8]> {
        self.mmap.as_slice(offset, len).map_err(mmap_err)
    }

    /// Get file size.
    pub fn size(&self) -> u64 { self.size }
}

//! Raw byte buffer primitive
//!
//! A `Buffer` is a fixed-capacity byte container: it never grows on its own,
//! only through an explicit `resize`. Callers that copy into one are
//! responsible for sizing it first; an oversized copy is refused rather than
//! silently reallocated. Identity is by contents, not by allocation.

use std::ops::{Index, IndexMut};

use crate::error::{Error, Result};

/// Fixed-capacity byte container used wherever raw bytes are queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Create a zero-filled buffer of the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
        }
    }

    /// Current size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Resize to `new_size` bytes, preserving the overlapping prefix
    ///
    /// Growing zero-fills the new tail; shrinking truncates.
    pub fn resize(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
    }

    /// Overwrite from offset 0 with `src`
    ///
    /// Fails if `src` exceeds the current capacity. There is no implicit
    /// growth on copy; callers must `resize` first.
    pub fn copy_from(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.data.len() {
            return Err(Error::BufferOverflow {
                src: src.len(),
                cap: self.data.len(),
            });
        }
        self.data[..src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Zero-fill the buffer without changing its capacity
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Append the contents of `other`, growing this buffer
    ///
    /// Used by queue merging to reassemble messages split across reads.
    pub fn append(&mut self, other: &[u8]) {
        self.data.extend_from_slice(other);
    }

    /// View the contents as a slice
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// View the contents as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl From<&[u8]> for Buffer {
    fn from(src: &[u8]) -> Self {
        Self { data: src.to_vec() }
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Index<usize> for Buffer {
    type Output = u8;

    fn index(&self, idx: usize) -> &u8 {
        &self.data[idx]
    }
}

impl IndexMut<usize> for Buffer {
    fn index_mut(&mut self, idx: usize) -> &mut u8 {
        &mut self.data[idx]
    }
}

//! Media sources
//!
//! Playback is file backed: a `DiskStream` owns one media file and hands
//! out fixed-size pages until end of file.

pub mod disk;

pub use disk::{DiskStream, PageEvent, StreamState};

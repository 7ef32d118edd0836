//! File-backed media streams
//!
//! A `DiskStream` walks through one media file in fixed-size pages. Small
//! files are loaded wholesale when opened; anything over the preload limit
//! is read page by page so a large library does not pin the whole file set
//! in memory.
//!
//! State machine:
//!
//! ```text
//! NoState -> Created -> Open -> Play <-> Pause
//!                         \-> Seek / Preview / Thumbnail / Upload / Multicast
//! Play -> Closed (at end of file)     Closed / Done are terminal
//! ```

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

/// Bytes served per page
pub const PAGE_SIZE: usize = 4096;

/// Files at or under this size are loaded in one read when opened
pub const DEFAULT_PRELOAD_LIMIT: u64 = 1024 * 1024;

/// Lifecycle states of a disk stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NoState,
    Created,
    Open,
    Play,
    Preview,
    Thumbnail,
    Pause,
    Seek,
    Upload,
    Multicast,
    Done,
    Closed,
}

impl StreamState {
    pub fn name(self) -> &'static str {
        match self {
            StreamState::NoState => "nostate",
            StreamState::Created => "created",
            StreamState::Open => "open",
            StreamState::Play => "play",
            StreamState::Preview => "preview",
            StreamState::Thumbnail => "thumbnail",
            StreamState::Pause => "pause",
            StreamState::Seek => "seek",
            StreamState::Upload => "upload",
            StreamState::Multicast => "multicast",
            StreamState::Done => "done",
            StreamState::Closed => "closed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Done | StreamState::Closed)
    }
}

/// What one playback step produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// The next page of media data
    Page(Bytes),
    /// Nothing to do right now
    Idle,
    /// End of file; the stream has moved to Closed
    Eof,
}

/// One open media file being paged out to a client
#[derive(Debug)]
pub struct DiskStream {
    id: u32,
    path: PathBuf,
    state: StreamState,
    file: Option<File>,
    file_size: u64,
    offset: u64,
    preloaded: Option<Bytes>,
    preload_limit: u64,
}

impl DiskStream {
    /// Stream ids start at 1; id 0 is reserved for the control stream
    pub fn new(id: u32) -> Self {
        Self {
            id,
            path: PathBuf::new(),
            state: StreamState::Created,
            file: None,
            file_size: 0,
            offset: 0,
            preloaded: None,
            preload_limit: DEFAULT_PRELOAD_LIMIT,
        }
    }

    pub fn with_preload_limit(mut self, limit: u64) -> Self {
        self.preload_limit = limit;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Open the media file and load it if it fits under the preload limit
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.state != StreamState::Created && self.state != StreamState::Closed {
            return Err(Error::BadStreamState(self.id, self.state.name()));
        }

        let path = path.as_ref();
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        if size <= self.preload_limit {
            let mut data = Vec::with_capacity(size as usize);
            file.read_to_end(&mut data)?;
            self.preloaded = Some(Bytes::from(data));
            self.file = None;
        } else {
            self.preloaded = None;
            self.file = Some(file);
        }

        self.path = path.to_path_buf();
        self.file_size = size;
        self.offset = 0;
        self.state = StreamState::Open;
        tracing::debug!(
            stream = self.id,
            path = %path.display(),
            size = size,
            preloaded = self.preloaded.is_some(),
            "opened disk stream"
        );
        Ok(())
    }

    /// Start or resume playback
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            StreamState::Open | StreamState::Pause | StreamState::Seek => {
                self.state = StreamState::Play;
                Ok(())
            }
            StreamState::Play => Ok(()),
            _ => Err(Error::BadStreamState(self.id, self.state.name())),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            StreamState::Play | StreamState::Pause => {
                self.state = StreamState::Pause;
                Ok(())
            }
            _ => Err(Error::BadStreamState(self.id, self.state.name())),
        }
    }

    /// Reposition playback, clamped to the end of the file
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        match self.state {
            StreamState::Open | StreamState::Play | StreamState::Pause | StreamState::Seek => {
                self.offset = offset.min(self.file_size);
                if self.file.is_some() {
                    use std::io::Seek;
                    if let Some(ref mut file) = self.file {
                        file.seek(std::io::SeekFrom::Start(self.offset))?;
                    }
                }
                Ok(())
            }
            _ => Err(Error::BadStreamState(self.id, self.state.name())),
        }
    }

    /// Serve the next page, or report end of file
    ///
    /// At end of file the stream moves to Closed and `Eof` is returned
    /// exactly once; stepping a closed stream is an error.
    pub fn play_step(&mut self) -> Result<PageEvent> {
        match self.state {
            StreamState::Play => {}
            StreamState::Pause => return Ok(PageEvent::Idle),
            _ => return Err(Error::BadStreamState(self.id, self.state.name())),
        }

        if self.offset >= self.file_size {
            self.close();
            return Ok(PageEvent::Eof);
        }

        let remaining = (self.file_size - self.offset) as usize;
        let want = PAGE_SIZE.min(remaining);

        let page = if let Some(ref data) = self.preloaded {
            let start = self.offset as usize;
            data.slice(start..start + want)
        } else {
            let mut buf = BytesMut::zeroed(want);
            let file = self
                .file
                .as_mut()
                .ok_or(Error::BadStreamState(self.id, "open without file"))?;
            let mut filled = 0;
            while filled < want {
                let n = file.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            buf.freeze()
        };

        if page.is_empty() {
            self.close();
            return Ok(PageEvent::Eof);
        }

        self.offset += page.len() as u64;
        Ok(PageEvent::Page(page))
    }

    /// Release the file and enter the terminal Closed state
    pub fn close(&mut self) {
        self.file = None;
        self.preloaded = None;
        self.state = StreamState::Closed;
    }
}

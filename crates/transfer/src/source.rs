use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::TransferError;

/// A seekable source of upload bytes with a fixed length.
///
/// Reads are blocking; async callers run them on a blocking thread.
pub trait ByteSource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError>;
}

fn check_range(offset: u64, len: u64, size: u64) -> Result<(), TransferError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(TransferError::OutOfRange { offset, len, size }),
    }
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// Reads upload bytes from a file on disk.
///
/// The length is captured when the file is opened; a file that shrinks
/// afterwards produces [`TransferError::ShortRead`].
pub struct FileSource {
    file: Mutex<File>,
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Opens `path` for reading.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            size,
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        check_range(offset, len, self.size)?;

        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; len as usize];
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(TransferError::ShortRead {
                    offset,
                    wanted: len,
                    got: filled as u64,
                });
            }
            filled += n;
        }
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// Serves upload bytes from an owned buffer.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        check_range(offset, len, self.len())?;
        let start = offset as usize;
        Ok(self.data[start..start + len as usize].to_vec())
    }
}

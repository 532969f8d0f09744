//! Random-access byte sources consumed by the signature matcher.

use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};

use crate::diagnostics::{CoreError, CoreResult};

/// Default upper bound for [`FileSource::open`], in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// A source of bytes that supports positional reads.
///
/// The signature matcher reads through this trait only. Implementations
/// report a file name (when one exists) so that extension heuristics can
/// run; the name may be a full path.
pub trait ByteSource {
    /// Total number of bytes in the source.
    fn len(&self) -> u64;

    /// Read up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes copied. Reads at or past the end return `Ok(0)`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// File name (or path) used for extension corroboration.
    fn file_name(&self) -> Option<&str> {
        None
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The complete contents of the source.
    ///
    /// The default implementation assembles the contents from
    /// [`read_at`](Self::read_at); in-memory sources override it to
    /// borrow instead of copying.
    fn contents(&self) -> io::Result<Cow<'_, [u8]>> {
        let len = usize::try_from(self.len())
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "source too large"))?;
        let mut data = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let read = self.read_at(filled as u64, &mut data[filled..])?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "source shorter than its reported length",
                ));
            }
            filled += read;
        }
        Ok(Cow::Owned(data))
    }
}

/// An in-memory byte source, borrowed or owned.
#[derive(Debug, Clone)]
pub struct MemorySource<'a> {
    data: Cow<'a, [u8]>,
    name: Option<String>,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            data: data.into(),
            name: None,
        }
    }

    /// Attach a file name used for extension checks.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSource for MemorySource<'_> {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn file_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn contents(&self) -> io::Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(&self.data))
    }
}

/// Fail unless `path` (following symlinks) is a regular file of at most
/// `max_size` bytes. Returns the file size.
pub(crate) fn check_regular_file(path: &Path, max_size: u64) -> CoreResult<u64> {
    let metadata = std::fs::metadata(path).map_err(|e| CoreError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !metadata.is_file() {
        return Err(CoreError::FileNotRegular {
            path: path.to_path_buf(),
        });
    }
    if metadata.len() > max_size {
        return Err(CoreError::FileTooBig {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: max_size,
        });
    }
    Ok(metadata.len())
}

/// A regular file loaded into memory, keeping its path as the file name.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    memory: MemorySource<'static>,
}

impl FileSource {
    /// Open `path`, refusing non-regular files and files larger than
    /// `max_size` bytes.
    pub fn open(path: impl AsRef<Path>, max_size: u64) -> CoreResult<Self> {
        let path = path.as_ref();
        check_regular_file(path, max_size)?;
        let data = std::fs::read(path).map_err(|e| CoreError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            memory: MemorySource::new(data).with_name(path.to_string_lossy()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.memory.len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.memory.read_at(offset, buf)
    }

    fn file_name(&self) -> Option<&str> {
        self.memory.file_name()
    }

    fn contents(&self) -> io::Result<Cow<'_, [u8]>> {
        self.memory.contents()
    }
}

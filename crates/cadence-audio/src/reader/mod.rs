//! Byte sources that decoders read encoded audio from.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

pub mod buffered;
pub mod file;
pub mod http;
pub mod memory;

use std::io::{self, Read, Seek, SeekFrom};

use cadence_core::{Error, Result};
use tracing::debug;
use url::Url;

pub use buffered::BufferedReader;
pub use file::FileReader;
pub use http::HttpReader;
pub use memory::MemoryReader;

/// Read-ahead window for HTTP sources.
pub const HTTP_READ_AHEAD: usize = 64 * 1024;

/// Random access byte source.
pub trait Reader: Send + Sync {
    /// Location this reader was opened on.
    fn uri(&self) -> &str;

    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Returns fewer bytes only at the end of the content.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn seek_absolute(&mut self, position: u64) -> Result<()>;

    /// Move relative to the current position.
    fn seek_relative(&mut self, offset: i64) -> Result<()> {
        let position = self
            .current_position()
            .checked_add_signed(offset)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "seek by {offset} from {} leaves the stream",
                    self.current_position()
                ))
            })?;
        self.seek_absolute(position)
    }

    fn current_position(&self) -> u64;

    /// Total size in bytes.
    fn content_length(&mut self) -> Result<u64>;

    fn eof(&mut self) -> Result<bool> {
        Ok(self.current_position() >= self.content_length()?)
    }
}

impl<R: Reader + ?Sized> Reader for Box<R> {
    fn uri(&self) -> &str {
        (**self).uri()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn seek_absolute(&mut self, position: u64) -> Result<()> {
        (**self).seek_absolute(position)
    }

    fn seek_relative(&mut self, offset: i64) -> Result<()> {
        (**self).seek_relative(offset)
    }

    fn current_position(&self) -> u64 {
        (**self).current_position()
    }

    fn content_length(&mut self) -> Result<u64> {
        (**self).content_length()
    }

    fn eof(&mut self) -> Result<bool> {
        (**self).eof()
    }
}

/// Open a reader for `uri`.
///
/// `http`/`https` URLs get a buffered range-request reader; `file://` URLs
/// and plain paths a file reader.
pub fn open_reader(uri: &str) -> Result<Box<dyn Reader>> {
    debug!("Opening reader for {uri}");

    match Url::parse(uri) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Box::new(BufferedReader::new(
            HttpReader::new(uri)?,
            HTTP_READ_AHEAD,
        ))),
        Ok(url) if url.scheme() == "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| Error::InvalidArgument(format!("not a local file URL: {uri}")))?;
            Ok(Box::new(FileReader::open(path)?))
        }
        // Windows drive letters parse as one-letter schemes.
        Ok(url) if url.scheme().len() > 1 => Err(Error::InvalidArgument(format!(
            "unsupported URI scheme: {}",
            url.scheme()
        ))),
        _ => Ok(Box::new(FileReader::open(uri)?)),
    }
}

fn to_io_error(error: Error) -> io::Error {
    match error {
        Error::Io(e) => e,
        other => io::Error::other(other.to_string()),
    }
}

/// Adapts a [`Reader`] to `std::io` and symphonia's `MediaSource`.
pub struct ReaderSource {
    reader: Box<dyn Reader>,
    length: Option<u64>,
}

impl ReaderSource {
    pub fn new(mut reader: Box<dyn Reader>) -> Self {
        let length = reader.content_length().ok();
        Self { reader, length }
    }

    pub fn uri(&self) -> &str {
        self.reader.uri()
    }
}

impl Read for ReaderSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).map_err(to_io_error)
    }
}

impl Seek for ReaderSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(position) => Some(position),
            SeekFrom::Current(offset) => self.reader.current_position().checked_add_signed(offset),
            SeekFrom::End(offset) => {
                let length = self.length.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "content length unknown")
                })?;
                length.checked_add_signed(offset)
            }
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;

        self.reader.seek_absolute(target).map_err(to_io_error)?;
        Ok(target)
    }
}

impl symphonia::core::io::MediaSource for ReaderSource {
    fn is_seekable(&self) -> bool {
        self.length.is_some()
    }

    fn byte_len(&self) -> Option<u64> {
        self.length
    }
}

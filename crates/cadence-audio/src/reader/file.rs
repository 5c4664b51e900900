//! Local file reader.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use cadence_core::Result;

use super::Reader;

pub struct FileReader {
    uri: String,
    file: File,
    position: u64,
    length: u64,
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let length = file.metadata()?.len();

        Ok(Self {
            uri: path.display().to_string(),
            file,
            position: 0,
            length,
        })
    }
}

impl Reader for FileReader {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }

    fn seek_absolute(&mut self, position: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    fn current_position(&self) -> u64 {
        self.position
    }

    fn content_length(&mut self) -> Result<u64> {
        Ok(self.length)
    }
}

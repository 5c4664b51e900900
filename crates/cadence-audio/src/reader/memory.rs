//! Reader over bytes already in memory.

use bytes::Bytes;
use cadence_core::Result;

use super::Reader;

/// Serves a shared, immutable buffer.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    uri: String,
    data: Bytes,
    position: u64,
}

impl MemoryReader {
    pub fn new(uri: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            uri: uri.into(),
            data: data.into(),
            position: 0,
        }
    }
}

impl Reader for MemoryReader {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let start = (self.position as usize).min(self.data.len());
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }

    fn seek_absolute(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn current_position(&self) -> u64 {
        self.position
    }

    fn content_length(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

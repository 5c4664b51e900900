//! Fixed-size read-ahead over another reader.

use cadence_core::Result;

use super::Reader;

/// Serves small reads from a read-ahead window.
///
/// A read that does not fit the window refills it starting at the read
/// position. Reads larger than the window go straight to the inner reader.
pub struct BufferedReader<R> {
    inner: R,
    window: Vec<u8>,
    /// Content offset of `window[0]`.
    window_start: u64,
    window_len: usize,
    position: u64,
}

impl<R: Reader> BufferedReader<R> {
    pub fn new(inner: R, capacity: usize) -> Self {
        Self {
            inner,
            window: vec![0; capacity.max(1)],
            window_start: 0,
            window_len: 0,
            position: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.window.len()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn window_contains(&self, start: u64, len: usize) -> bool {
        start >= self.window_start
            && start + len as u64 <= self.window_start + self.window_len as u64
    }

    fn refill(&mut self) -> Result<()> {
        self.window_len = 0;
        self.inner.seek_absolute(self.position)?;
        self.window_start = self.position;
        self.window_len = self.inner.read(&mut self.window)?;
        Ok(())
    }
}

impl<R: Reader> Reader for BufferedReader<R> {
    fn uri(&self) -> &str {
        self.inner.uri()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() > self.window.len() {
            self.window_len = 0;
            self.inner.seek_absolute(self.position)?;
            let read = self.inner.read(buf)?;
            self.position += read as u64;
            return Ok(read);
        }

        if !self.window_contains(self.position, buf.len()) {
            self.refill()?;
        }

        let offset = (self.position - self.window_start) as usize;
        let count = buf.len().min(self.window_len.saturating_sub(offset));
        buf[..count].copy_from_slice(&self.window[offset..offset + count]);
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
        self.inner.content_length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MemoryReader;

    /// Counts reads reaching the inner reader.
    struct Counting {
        inner: MemoryReader,
        reads: usize,
    }

    impl Reader for Counting {
        fn uri(&self) -> &str {
            self.inner.uri()
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.reads += 1;
            self.inner.read(buf)
        }
        fn seek_absolute(&mut self, position: u64) -> Result<()> {
            self.inner.seek_absolute(position)
        }
        fn current_position(&self) -> u64 {
            self.inner.current_position()
        }
        fn content_length(&mut self) -> Result<u64> {
            self.inner.content_length()
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_small_reads_hit_window() {
        let data: Vec<u8> = (0..100).collect();
        let inner = Counting {
            inner: MemoryReader::new("mem://counting", data),
            reads: 0,
        };
        let mut reader = BufferedReader::new(inner, 10);

        let mut buf = [0u8; 2];
        for expected in [0u8, 2, 4, 6, 8] {
            assert_eq!(reader.read(&mut buf).unwrap(), 2);
            assert_eq!(buf, [expected, expected + 1]);
        }
        assert_eq!(reader.into_inner().reads, 1);
    }
}

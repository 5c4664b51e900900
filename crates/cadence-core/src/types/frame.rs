//! Decoded PCM frame.

/// A chunk of decoded PCM plus its presentation timestamp.
///
/// The engine keeps one frame and hands it to the decoder on every
/// iteration, so the allocation is reused across the track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    pts: f64,
}

impl Frame {
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            pts: 0.0,
        }
    }

    pub const fn from_data(data: Vec<u8>, pts: f64) -> Self {
        Self { data, pts }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Presentation timestamp in seconds, relative to the track start.
    pub const fn pts(&self) -> f64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: f64) {
        self.pts = pts;
    }

    /// Replace the payload.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Resize the payload to `size` zeroed bytes, keeping the allocation.
    pub fn allocate(&mut self, size: usize) {
        self.data.clear();
        self.data.resize(size, 0);
    }

    /// Payload buffer for decoders that fill it incrementally.
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Drop the first `offset` bytes. Clears the payload when `offset`
    /// reaches past the end.
    pub fn offset_data(&mut self, offset: usize) {
        if offset >= self.data.len() {
            self.data.clear();
        } else {
            self.data.drain(..offset);
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.pts = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleared_state() {
        let mut frame = Frame::from_data(vec![1, 2, 3], 1.5);
        frame.clear();
        assert!(frame.is_empty());
        assert_eq!(frame.data_size(), 0);
        assert!(frame.pts().abs() < f64::EPSILON);
    }

    #[test]
    fn test_offset_data() {
        let mut frame = Frame::from_data(vec![1, 2, 3, 4], 0.0);
        frame.offset_data(1);
        assert_eq!(frame.data(), &[2, 3, 4]);
        frame.offset_data(3);
        assert!(frame.is_empty());

        let mut frame = Frame::from_data(vec![1, 2], 0.0);
        frame.offset_data(10);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_allocate() {
        let mut frame = Frame::from_data(vec![9; 8], 2.0);
        frame.allocate(4);
        assert_eq!(frame.data(), &[0; 4]);
        assert!((frame.pts() - 2.0).abs() < f64::EPSILON);
    }
}

//! Lock-free ring buffer staging PCM for an audio device.
//!
//! Single producer (the renderer, on the playback thread) and single
//! consumer (the device callback).

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free single-producer, single-consumer ring buffer.
///
/// No allocation after construction, so the consumer side is safe to call
/// from a real-time callback.
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    /// Total number of items ever read.
    read_pos: AtomicUsize,
    /// Total number of items ever written.
    write_pos: AtomicUsize,
    /// Power of two.
    capacity: usize,
    mask: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a ring buffer holding at least `capacity` items.
    ///
    /// The capacity is rounded up to the next power of 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items waiting to be read.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Number of items that can be written without overwriting.
    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Write as many of `items` as fit. Producer side only.
    ///
    /// Returns the number of items written.
    pub fn write(&self, items: &[T]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let space = self.capacity - write_pos.wrapping_sub(read_pos);
        let count = items.len().min(space);

        for (offset, item) in items[..count].iter().enumerate() {
            let slot = &self.slots[write_pos.wrapping_add(offset) & self.mask];
            // SAFETY: slots between write_pos and read_pos + capacity belong to
            // the producer until write_pos is published below.
            #[allow(unsafe_code)]
            unsafe {
                *slot.get() = *item;
            }
        }

        self.write_pos
            .store(write_pos.wrapping_add(count), Ordering::Release);

        count
    }

    /// Read up to `output.len()` items. Consumer side only.
    ///
    /// Returns the number of items read.
    pub fn read(&self, output: &mut [T]) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let count = output.len().min(write_pos.wrapping_sub(read_pos));

        for (offset, out) in output[..count].iter_mut().enumerate() {
            let slot = &self.slots[read_pos.wrapping_add(offset) & self.mask];
            // SAFETY: slots between read_pos and write_pos were published by
            // the producer and are not touched again until read_pos moves.
            #[allow(unsafe_code)]
            unsafe {
                *out = *slot.get();
            }
        }

        self.read_pos
            .store(read_pos.wrapping_add(count), Ordering::Release);

        count
    }

    /// Discard up to `count` items without reading them. Consumer side only.
    pub fn skip(&self, count: usize) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let skipped = count.min(write_pos.wrapping_sub(read_pos));
        self.read_pos
            .store(read_pos.wrapping_add(skipped), Ordering::Release);

        skipped
    }
}

// SAFETY: the producer and consumer only touch disjoint slot ranges, handed
// over through the acquire/release pair on the positions.
#[allow(unsafe_code)]
unsafe impl<T: Send> Send for RingBuffer<T> {}
#[allow(unsafe_code)]
unsafe impl<T: Send> Sync for RingBuffer<T> {}

/// Thread-safe reference to a ring buffer.
pub type SharedRingBuffer<T> = Arc<RingBuffer<T>>;

/// Create a new shared ring buffer.
pub fn shared_ring_buffer<T: Copy + Default>(capacity: usize) -> SharedRingBuffer<T> {
    Arc::new(RingBuffer::new(capacity))
}

/// Fixed-capacity circular byte buffer.
///
/// Not thread-safe on its own; wrap in `parking_lot::Mutex` for cross-thread
/// access (see `BlockingRing`).
///
/// Overflow behavior: writes are truncated to the free space. Nothing already
/// buffered is ever overwritten, so playback order is preserved.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<u8>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
        }
    }

    /// Copy as much of `data` as fits. Returns the number of bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let to_write = data.len().min(self.free());
        if to_write == 0 {
            return 0;
        }

        // At most two contiguous runs: up to the end, then from the start.
        let first = to_write.min(self.capacity - self.write_index);
        self.buffer[self.write_index..self.write_index + first].copy_from_slice(&data[..first]);
        let second = to_write - first;
        self.buffer[..second].copy_from_slice(&data[first..to_write]);

        self.write_index = (self.write_index + to_write) % self.capacity;
        self.available += to_write;
        to_write
    }

    /// Move up to `dest.len()` bytes into `dest`. Returns the number copied.
    ///
    /// Does not allocate, so it is safe on the real-time thread.
    pub fn read_into(&mut self, dest: &mut [u8]) -> usize {
        let to_read = dest.len().min(self.available);
        if to_read == 0 {
            return 0;
        }

        let first = to_read.min(self.capacity - self.read_index);
        dest[..first].copy_from_slice(&self.buffer[self.read_index..self.read_index + first]);
        let second = to_read - first;
        dest[first..to_read].copy_from_slice(&self.buffer[..second]);

        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        to_read
    }

    /// Number of bytes currently available for reading.
    pub fn count(&self) -> usize {
        self.available
    }

    /// Room left for writing.
    pub fn free(&self) -> usize {
        self.capacity - self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Reset the buffer to empty state.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

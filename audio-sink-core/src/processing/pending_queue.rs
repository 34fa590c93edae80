use std::collections::VecDeque;

use crate::models::error::SinkError;

/// A buffer waiting in the pull-mode queue.
///
/// Always owns its bytes: the producer's memory is either copied or moved in
/// at enqueue time, so nothing the real-time thread reads can be freed or
/// recycled underneath it.
#[derive(Debug)]
pub struct PendingBuffer {
    data: Vec<u8>,
    consumed: usize,
}

impl PendingBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, consumed: 0 }
    }

    /// Bytes not yet handed to the device.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.consumed..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn into_storage(self) -> Vec<u8> {
        self.data
    }
}

/// Bounded FIFO of pending buffers shared by the producer and the real-time thread.
///
/// Wrap in `parking_lot::Mutex`. The real-time side only ever calls `fill`,
/// which neither allocates nor frees: consumed buffers are parked in a spare
/// list (pre-sized to the queue capacity) and their allocations are handed
/// back to producers by `take_spare`.
///
/// Pending plus spare buffers never exceed `capacity`. `push` keeps this by
/// evicting a spare allocation for the producer to drop, so parking a
/// consumed buffer always has room.
#[derive(Debug)]
pub struct PendingQueue {
    pending: VecDeque<PendingBuffer>,
    spare: Vec<Vec<u8>>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            spare: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a buffer at the back. Fails without taking it when full.
    ///
    /// On success, returns a spare allocation evicted to make room. Drop it
    /// after releasing the lock.
    pub fn push(
        &mut self,
        buffer: PendingBuffer,
    ) -> Result<Option<Vec<u8>>, (SinkError, PendingBuffer)> {
        if self.pending.len() >= self.capacity {
            return Err((
                SinkError::QueueFull {
                    capacity: self.capacity,
                },
                buffer,
            ));
        }
        let evicted = if self.pending.len() + self.spare.len() >= self.capacity {
            self.spare.pop()
        } else {
            None
        };
        self.pending.push_back(buffer);
        Ok(evicted)
    }

    /// A cleared allocation from a previously consumed buffer, if any.
    pub fn take_spare(&mut self) -> Option<Vec<u8>> {
        self.spare.pop().map(|mut storage| {
            storage.clear();
            storage
        })
    }

    /// Keep a rejected buffer's allocation for reuse when there is room.
    ///
    /// Producer side only. Hands the allocation back when the spare list is
    /// full so the caller can drop it outside the lock.
    pub fn recycle(&mut self, buffer: PendingBuffer) -> Option<Vec<u8>> {
        let storage = buffer.into_storage();
        if self.pending.len() + self.spare.len() < self.capacity {
            self.spare.push(storage);
            None
        } else {
            Some(storage)
        }
    }

    /// Copy bytes from the front buffer into `dest`.
    ///
    /// Only the front buffer is read: a short buffer is popped and the rest of
    /// `dest` is left for the caller to silence, never topped up from the
    /// next buffer. A buffer longer than `dest` keeps its unread tail at the
    /// front for the next call. Returns the number of bytes copied.
    pub fn fill(&mut self, dest: &mut [u8]) -> usize {
        let Some(front) = self.pending.front_mut() else {
            return 0;
        };

        let remaining = &front.data[front.consumed..];
        let copied = remaining.len().min(dest.len());
        dest[..copied].copy_from_slice(&remaining[..copied]);
        front.consumed += copied;

        if front.consumed >= front.data.len() {
            if let Some(done) = self.pending.pop_front() {
                self.park(done.into_storage());
            }
        }
        copied
    }

    /// Drop every pending buffer. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        while let Some(buffer) = self.pending.pop_front() {
            self.park(buffer.into_storage());
        }
        discarded
    }

    /// Number of buffers waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total unconsumed bytes across all pending buffers.
    pub fn pending_bytes(&self) -> usize {
        self.pending.iter().map(|b| b.remaining().len()).sum()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocations parked for reuse.
    pub fn spare_len(&self) -> usize {
        self.spare.len()
    }

    fn park(&mut self, storage: Vec<u8>) {
        // `storage` just left `pending`, so the spare list has a free slot
        // within its reserved capacity and this push never reallocates.
        debug_assert!(self.spare.len() < self.capacity);
        self.spare.push(storage);
    }
}

//! A pool of reusable byte buffers for the ingress read path.
//!
//! Request handlers accumulate part bodies into pooled buffers instead of
//! allocating a fresh multi-megabyte vector per part. The pool keeps at
//! most `max_buffers` around; a buffer returned to a full pool is simply
//! dropped. The bytes handed to the writer pool are copied out at enqueue
//! time, so a buffer can be reclaimed as soon as its guard drops.

use std::ops::{Deref, DerefMut};

/// A bounded pool of reusable `Vec<u8>` buffers.
pub struct BufferPool {
    recycler: flume::Sender<Vec<u8>>,
    receiver: flume::Receiver<Vec<u8>>,
    default_capacity: usize,
}

impl BufferPool {
    /// Create a pool handing out buffers of `default_capacity`, keeping at
    /// most `max_buffers` for reuse.
    pub fn new(default_capacity: usize, max_buffers: usize) -> Self {
        let (recycler, receiver) = flume::bounded(max_buffers);
        Self {
            recycler,
            receiver,
            default_capacity,
        }
    }

    /// Acquire a cleared buffer; recycled if one is available, freshly
    /// allocated otherwise. The buffer returns to the pool on drop.
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = match self.receiver.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                buffer
            }
            Err(_) => Vec::with_capacity(self.default_capacity),
        };
        PooledBuffer {
            buffer,
            recycler: self.recycler.clone(),
        }
    }

    /// The capacity new buffers are allocated with.
    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }
}

/// A buffer checked out of a [`BufferPool`], returned on drop.
pub struct PooledBuffer {
    buffer: Vec<u8>,
    recycler: flume::Sender<Vec<u8>>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        // Pool full means the buffer is dropped, which is fine.
        let _ = self.recycler.try_send(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_recycled_with_capacity() {
        let pool = BufferPool::new(1024, 4);
        let mut buf = pool.acquire();
        buf.extend_from_slice(b"hello");
        drop(buf);

        let recycled = pool.acquire();
        assert!(recycled.is_empty());
        assert!(recycled.capacity() >= 1024);
    }

    #[test]
    fn pool_bound_drops_excess_buffers() {
        let pool = BufferPool::new(16, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        // Only one buffer was retained; the next two acquires must still work.
        let _ = pool.acquire();
        let _ = pool.acquire();
    }

    #[test]
    fn acquired_buffer_is_writable() {
        let pool = BufferPool::new(8, 2);
        let mut buf = pool.acquire();
        buf.extend_from_slice(&[1, 2, 3]);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(pool.default_capacity(), 8);
    }
}

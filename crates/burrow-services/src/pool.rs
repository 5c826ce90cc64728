//! Reusable fixed-size byte buffers for relay copy loops.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

/// Size of one relay copy buffer.
pub const RELAY_BUFFER_SIZE: usize = 20 * 1024;

/// Buffers kept around when idle. Extra buffers are simply dropped.
const DEFAULT_POOL_CAPACITY: usize = 256;

/// Concurrent free list. Cloning shares the same list.
#[derive(Clone)]
pub struct BufferPool {
    free: Arc<ArrayQueue<Box<[u8]>>>,
    buf_size: usize,
}

impl BufferPool {
    pub fn new(capacity: usize, buf_size: usize) -> Self {
        Self {
            free: Arc::new(ArrayQueue::new(capacity.max(1))),
            buf_size,
        }
    }

    /// Take a buffer, allocating when the free list is empty.
    pub fn get(&self) -> PooledBuf {
        let buf = self
            .free
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buf_size].into_boxed_slice());
        PooledBuf {
            buf: Some(buf),
            free: self.free.clone(),
        }
    }

    /// Buffers currently idle.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, RELAY_BUFFER_SIZE)
    }
}

/// A buffer on loan from a `BufferPool`; returned on drop.
pub struct PooledBuf {
    buf: Option<Box<[u8]>>,
    free: Arc<ArrayQueue<Box<[u8]>>>,
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let _ = self.free.push(buf);
        }
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_return_on_drop() {
        let pool = BufferPool::new(4, 16);
        {
            let a = pool.get();
            let b = pool.get();
            assert_eq!(a.len(), 16);
            assert_eq!(b.len(), 16);
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 2);

        let _c = pool.get();
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn overflow_is_dropped_not_queued() {
        let pool = BufferPool::new(1, 8);
        let bufs: Vec<_> = (0..3).map(|_| pool.get()).collect();
        drop(bufs);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn default_uses_relay_size() {
        let pool = BufferPool::default();
        assert_eq!(pool.get().len(), RELAY_BUFFER_SIZE);
    }
}

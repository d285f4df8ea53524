//! Shared pool of fixed-size vertex chunks
//!
//! Vertex accumulators grow by checking out whole chunks instead of reallocating,
//! and hand them back when cleared. Chunk contents are owned exclusively by the
//! accumulator holding the box; only checkout and return go through the pool lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{BYTES_PER_COLOR, SHORTS_PER_VERTEX};

/// Number of vertices stored in one chunk
pub const CHUNK_VERTICES: usize = 90;

/// Default upper bound of idle chunks kept by a pool
const DEFAULT_MAX_POOLED: usize = 4096;

/// A fixed-capacity block of packed vertices and their RGBA colors
pub struct Chunk {
    shorts: [i16; CHUNK_VERTICES * SHORTS_PER_VERTEX],
    colors: [u8; CHUNK_VERTICES * BYTES_PER_COLOR],
    /// Number of vertices written
    used: usize,
}

impl Chunk {
    fn new_boxed() -> Box<Chunk> {
        Box::new(Chunk {
            shorts: [0; CHUNK_VERTICES * SHORTS_PER_VERTEX],
            colors: [0; CHUNK_VERTICES * BYTES_PER_COLOR],
            used: 0,
        })
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.used == CHUNK_VERTICES
    }

    /// Append one vertex; the caller guarantees the chunk is not full
    #[inline]
    pub(crate) fn push(&mut self, vertex: [i16; SHORTS_PER_VERTEX], rgba: [u8; BYTES_PER_COLOR]) {
        debug_assert!(!self.is_full());
        let s = self.used * SHORTS_PER_VERTEX;
        self.shorts[s..s + SHORTS_PER_VERTEX].copy_from_slice(&vertex);
        let c = self.used * BYTES_PER_COLOR;
        self.colors[c..c + BYTES_PER_COLOR].copy_from_slice(&rgba);
        self.used += 1;
    }

    /// Written vertex shorts, `used * 4` values
    #[inline]
    pub fn vertices(&self) -> &[i16] {
        &self.shorts[..self.used * SHORTS_PER_VERTEX]
    }

    /// Written color bytes, `used * 4` values
    #[inline]
    pub fn colors(&self) -> &[u8] {
        &self.colors[..self.used * BYTES_PER_COLOR]
    }

    /// Vertex at `index` with its color
    #[inline]
    pub(crate) fn get(&self, index: usize) -> ([i16; SHORTS_PER_VERTEX], [u8; BYTES_PER_COLOR]) {
        let s = index * SHORTS_PER_VERTEX;
        let c = index * BYTES_PER_COLOR;
        let mut vertex = [0; SHORTS_PER_VERTEX];
        vertex.copy_from_slice(&self.shorts[s..s + SHORTS_PER_VERTEX]);
        let mut rgba = [0; BYTES_PER_COLOR];
        rgba.copy_from_slice(&self.colors[c..c + BYTES_PER_COLOR]);
        (vertex, rgba)
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk").field("used", &self.used).finish()
    }
}

struct PoolInner {
    free: Mutex<Vec<Box<Chunk>>>,
    max_pooled: usize,
    /// Chunks ever created by this pool
    allocated: AtomicUsize,
}

/// Cloneable handle to a shared chunk free list
#[derive(Clone)]
pub struct ChunkPool {
    inner: Arc<PoolInner>,
}

impl Default for ChunkPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED)
    }
}

impl std::fmt::Debug for ChunkPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPool")
            .field("pooled", &self.pooled())
            .field("allocated", &self.allocated())
            .field("max_pooled", &self.inner.max_pooled)
            .finish()
    }
}

impl ChunkPool {
    /// Create a pool keeping at most `max_pooled` idle chunks
    pub fn new(max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                max_pooled,
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    /// Take an empty chunk, reusing an idle one when available
    pub fn checkout(&self) -> Box<Chunk> {
        let reused = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match reused {
            Some(mut chunk) => {
                chunk.used = 0;
                chunk
            }
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                Chunk::new_boxed()
            }
        }
    }

    /// Return chunks to the free list; chunks beyond the pool limit are dropped
    pub fn release_all<I>(&self, chunks: I)
    where
        I: IntoIterator<Item = Box<Chunk>>,
    {
        let mut free = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for mut chunk in chunks {
            if free.len() >= self.inner.max_pooled {
                break;
            }
            chunk.used = 0;
            free.push(chunk);
        }
    }

    pub fn release(&self, chunk: Box<Chunk>) {
        self.release_all(std::iter::once(chunk));
    }

    /// Number of idle chunks
    pub fn pooled(&self) -> usize {
        self.inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of chunks created since the pool was built
    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_reuses_released_chunks() {
        let pool = ChunkPool::new(8);
        let mut chunk = pool.checkout();
        chunk.push([1, 2, 3, 4], [5, 6, 7, 8]);
        assert_eq!(pool.allocated(), 1);

        pool.release(chunk);
        assert_eq!(pool.pooled(), 1);

        let chunk = pool.checkout();
        assert_eq!(chunk.used(), 0, "reused chunk must be empty");
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_pool_limit() {
        let pool = ChunkPool::new(2);
        let chunks: Vec<_> = (0..5).map(|_| pool.checkout()).collect();
        pool.release_all(chunks);
        assert_eq!(pool.pooled(), 2);
        assert_eq!(pool.allocated(), 5);
    }

    #[test]
    fn test_chunk_push_and_get() {
        let pool = ChunkPool::default();
        let mut chunk = pool.checkout();
        for i in 0..CHUNK_VERTICES {
            chunk.push([i as i16, 0, 0, 0], [i as u8, 0, 0, 255]);
        }
        assert!(chunk.is_full());
        assert_eq!(chunk.vertices().len(), CHUNK_VERTICES * 4);
        assert_eq!(chunk.get(7), ([7, 0, 0, 0], [7, 0, 0, 255]));
    }

    #[test]
    fn test_shared_between_threads() {
        let pool = ChunkPool::new(64);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let chunk = pool.checkout();
                        pool.release(chunk);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.allocated() <= 4);
        assert_eq!(pool.pooled(), pool.allocated());
    }
}

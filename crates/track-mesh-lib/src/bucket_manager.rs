//! Worker/painter double buffer of bucket chains
//!
//! The worker chain is mutated only by the compile pass, the painter chain is only
//! read by the render side. A finished worker chain moves to the painter slot as a
//! whole, so the render side never observes a chain that is still being built.

use crate::{BucketChain, ChunkPool, TrackBucket};

/// Holds the chain being built and the chain being drawn
#[derive(Debug)]
pub struct BucketManager {
    pool: ChunkPool,
    worker: Option<BucketChain>,
    painter: Option<BucketChain>,
}

impl BucketManager {
    pub fn new(pool: ChunkPool) -> Self {
        Self {
            pool,
            worker: None,
            painter: None,
        }
    }

    #[inline]
    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    /// Chain of the current compile cycle, created on first use
    pub fn worker(&mut self) -> &mut BucketChain {
        let pool = &self.pool;
        self.worker.get_or_insert_with(|| BucketChain::new(pool.clone()))
    }

    /// Track bucket of the current compile cycle, created on first use
    pub fn worker_bucket(&mut self) -> &mut TrackBucket {
        self.worker().track_bucket_mut()
    }

    /// Take the finished worker chain; the next [`BucketManager::worker`] call starts a new one
    pub fn take_worker(&mut self) -> Option<BucketChain> {
        self.worker.take()
    }

    /// Discard the worker chain, returning its chunks to the pool
    pub fn discard_worker(&mut self) {
        if let Some(mut chain) = self.worker.take() {
            chain.clear();
        }
    }

    /// Chain currently drawn
    #[inline]
    pub fn painter(&self) -> Option<&BucketChain> {
        self.painter.as_ref()
    }

    /// Replace the painter chain; the previous painter is cleared
    pub fn set_painter(&mut self, chain: Option<BucketChain>) {
        if let Some(mut previous) = std::mem::replace(&mut self.painter, chain) {
            previous.clear();
        }
    }

    /// Clear both chains
    pub fn clear(&mut self) {
        self.discard_worker();
        self.set_painter(None);
    }
}

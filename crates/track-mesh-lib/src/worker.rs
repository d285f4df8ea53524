//! Background compile worker
//!
//! A tokio task receives compile requests, throttles them, runs the compile pass on
//! the blocking pool and publishes finished results. The render side never waits:
//! it submits requests and polls for results once per frame.
//!
//! # Cancellation
//!
//! Every submission and every [`CompileWorker::cancel`] bumps a shared epoch. A
//! running pass polls the epoch between phases and abandons itself once it moved
//! on; results carrying an old epoch are dropped by [`CompileWorker::poll`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{
    ChunkPool, CompileOutput, MapPosition, MeshError, Result, TrackCompiler, TrackConfig,
    TrackSource,
};

/// Compile output tagged with the submission it answers
#[derive(Debug)]
pub struct CompileResult {
    pub epoch: u64,
    pub output: CompileOutput,
}

#[derive(Debug)]
enum WorkerMessage {
    Compile { position: MapPosition, epoch: u64 },
    Config(TrackConfig),
}

/// Handle to the background compile task
#[derive(Debug)]
pub struct CompileWorker {
    requests: mpsc::UnboundedSender<WorkerMessage>,
    results: mpsc::UnboundedReceiver<CompileResult>,
    epoch: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl CompileWorker {
    /// Start the worker task on the current tokio runtime
    ///
    /// # Panics
    /// When called outside of a tokio runtime.
    pub fn spawn(source: TrackSource, config: TrackConfig, pool: ChunkPool) -> Self {
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (result_tx, results) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(run(
            source,
            config,
            pool,
            request_rx,
            result_tx,
            epoch.clone(),
        ));

        Self {
            requests,
            results,
            epoch,
            task,
        }
    }

    /// Request a compile for `position`, cancelling any earlier request
    ///
    /// Returns the epoch the result will carry.
    pub fn submit(&self, position: MapPosition) -> Result<u64> {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.requests
            .send(WorkerMessage::Compile { position, epoch })
            .map_err(|_| MeshError::WorkerClosed)?;
        tracing::trace!(epoch, zoom = position.zoom_level, "Compile submitted");
        Ok(epoch)
    }

    /// Abandon the running pass and drop all results not yet polled
    pub fn cancel(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(epoch, "Compile cancelled");
    }

    /// Configuration for passes started after this call
    pub fn set_config(&self, config: TrackConfig) -> Result<()> {
        self.requests
            .send(WorkerMessage::Config(config))
            .map_err(|_| MeshError::WorkerClosed)
    }

    /// Newest result of the current epoch, without blocking
    pub fn poll(&mut self) -> Option<CompileResult> {
        let current = self.epoch.load(Ordering::Acquire);
        let mut latest = None;
        loop {
            match self.results.try_recv() {
                Ok(result) if result.epoch == current => latest = Some(result),
                Ok(stale) => {
                    tracing::trace!(epoch = stale.epoch, current, "Dropping stale compile result");
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        latest
    }

    /// The task stopped, no further results will arrive
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop accepting requests and wait for the task to finish
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            requests,
            task,
            epoch,
            ..
        } = self;
        epoch.fetch_add(1, Ordering::AcqRel);
        drop(requests);
        task.await
            .map_err(|err| MeshError::WorkerPanicked(err.to_string()))
    }
}

/// Worker loop: newest request wins, passes are spaced by the compile interval
async fn run(
    source: TrackSource,
    mut config: TrackConfig,
    pool: ChunkPool,
    mut requests: mpsc::UnboundedReceiver<WorkerMessage>,
    results: mpsc::UnboundedSender<CompileResult>,
    epoch: Arc<AtomicU64>,
) {
    let mut compiler = TrackCompiler::with_pool(config.clone(), pool.clone());
    let mut last_run: Option<Instant> = None;
    let mut pending: Option<(MapPosition, u64)> = None;

    while let Some(message) = requests.recv().await {
        apply(message, &mut compiler, &mut config, &mut pending);
        while let Ok(message) = requests.try_recv() {
            apply(message, &mut compiler, &mut config, &mut pending);
        }

        if pending.is_none() {
            continue;
        }

        if let Some(last) = last_run {
            tokio::time::sleep_until(last + Duration::from_millis(config.compile_interval_ms))
                .await;
            // Requests that arrived while waiting replace the pending one
            while let Ok(message) = requests.try_recv() {
                apply(message, &mut compiler, &mut config, &mut pending);
            }
        }

        let Some((position, request_epoch)) = pending.take() else {
            continue;
        };
        if epoch.load(Ordering::Acquire) != request_epoch {
            tracing::trace!(request_epoch, "Skipping cancelled compile");
            continue;
        }

        last_run = Some(Instant::now());
        let snapshot = source.snapshot();
        let cancel_epoch = epoch.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let cancelled = || cancel_epoch.load(Ordering::Acquire) != request_epoch;
            let output = compiler.compile(&snapshot, &position, &cancelled);
            (compiler, output)
        })
        .await;

        let output = match joined {
            Ok((returned, output)) => {
                compiler = returned;
                output
            }
            Err(err) => {
                tracing::error!(%err, "Compile task failed");
                compiler = TrackCompiler::with_pool(config.clone(), pool.clone());
                None
            }
        };

        let Some(output) = output else {
            continue;
        };
        if epoch.load(Ordering::Acquire) != request_epoch {
            continue;
        }
        let result = CompileResult {
            epoch: request_epoch,
            output,
        };
        if results.send(result).is_err() {
            tracing::debug!("Compile result receiver dropped");
            break;
        }
    }

    tracing::debug!("Compile worker stopped");
}

fn apply(
    message: WorkerMessage,
    compiler: &mut TrackCompiler,
    config: &mut TrackConfig,
    pending: &mut Option<(MapPosition, u64)>,
) {
    match message {
        WorkerMessage::Compile { position, epoch } => *pending = Some((position, epoch)),
        WorkerMessage::Config(new_config) => {
            let change = compiler.set_config(new_config.clone());
            tracing::debug!(?change, "Compile config updated");
            *config = new_config;
        }
    }
}

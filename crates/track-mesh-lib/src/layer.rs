//! Render-side driver of the compile worker
//!
//! [`TrackLayer::update`] is called once per frame. It decides whether the map
//! moved far enough to warrant a new compile, polls the worker without blocking
//! and hands adopted snapshots to the [`UploadSink`].

use std::sync::Arc;

use glam::Mat4;
use smallvec::SmallVec;

use crate::{
    BucketChain, BucketManager, ChunkPool, Color, CompileOutput, CompileStats, CompileWorker,
    GeoPoint, LineDrawParams, MapPosition, RelativeTransform, Result, ShaderMode, StyleChange,
    TrackConfig, TrackSource, UploadSink, Viewport,
};

/// What one [`TrackLayer::update`] call did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerUpdate {
    /// A compile was requested for the current position
    pub submitted: bool,
    /// Statistics of the snapshot adopted during this call
    pub adopted: Option<CompileStats>,
    /// The adopted snapshot was handed to the sink
    pub uploaded: bool,
    /// The sink was told to release its buffers
    pub released: bool,
}

/// Everything a renderer needs to draw the painted snapshot in one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameParams {
    pub mvp: Mat4,
    pub shader: ShaderMode,
    pub passes: SmallVec<[LineDrawParams; 2]>,
}

/// A track on the map: source points, compile worker and painted snapshot
pub struct TrackLayer<S: UploadSink> {
    source: TrackSource,
    config: TrackConfig,
    worker: CompileWorker,
    manager: BucketManager,
    sink: S,
    compile_position: Option<MapPosition>,
    last_tile: Option<(i64, i64, u32)>,
    update_pending: bool,
    enabled: bool,
}

impl<S: UploadSink> std::fmt::Debug for TrackLayer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackLayer")
            .field("compile_position", &self.compile_position)
            .field("last_tile", &self.last_tile)
            .field("update_pending", &self.update_pending)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<S: UploadSink> TrackLayer<S> {
    /// Create the layer and start its worker on the current tokio runtime
    pub fn new(config: TrackConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let source = TrackSource::new();
        let pool = ChunkPool::default();
        let worker = CompileWorker::spawn(source.clone(), config.clone(), pool.clone());

        Ok(Self {
            source,
            config,
            worker,
            manager: BucketManager::new(pool),
            sink,
            compile_position: None,
            last_tile: None,
            update_pending: false,
            enabled: true,
        })
    }

    #[inline]
    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    #[inline]
    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Chain currently drawn
    #[inline]
    pub fn painter(&self) -> Option<&BucketChain> {
        self.manager.painter()
    }

    /// Map position of the painted snapshot
    #[inline]
    pub fn compile_position(&self) -> Option<MapPosition> {
        self.compile_position
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Replace the track; the running compile is cancelled and the next update rebuilds
    pub fn set_points(
        &mut self,
        points: impl Into<Arc<[GeoPoint]>>,
        colors: impl Into<Arc<[Color]>>,
        tour_starts: impl Into<Arc<[u32]>>,
    ) -> Result<u64> {
        let generation = self.source.set_points(points, colors, tour_starts)?;
        self.worker.cancel();
        self.update_pending = true;
        Ok(generation)
    }

    /// Attach per-point time and distance series to the current points
    ///
    /// Like new points, this cancels the running compile and makes the next update
    /// rebuild, so the adopted buffers carry the new series. Returns the number of
    /// series attached; series whose length does not match the points are dropped.
    pub fn set_series(
        &mut self,
        time: Option<Arc<[i64]>>,
        distance: Option<Arc<[f32]>>,
    ) -> usize {
        let attached = self.source.set_series(time, distance);
        self.worker.cancel();
        self.update_pending = true;
        attached
    }

    /// Apply a new style
    ///
    /// Changes to the vertex geometry schedule a rebuild; width, color and outline
    /// changes only affect the draw parameters.
    pub fn set_config(&mut self, config: TrackConfig) -> Result<StyleChange> {
        config.validate()?;
        let change = config.diff(&self.config);
        if change != StyleChange::None {
            self.worker.set_config(config.clone())?;
        }
        if change == StyleChange::Geometry {
            self.update_pending = true;
        }
        tracing::debug!(?change, "Track style changed");
        self.config = config;
        Ok(change)
    }

    /// Per-frame update: submit when needed, adopt a finished snapshot if there is one
    pub fn update(&mut self, viewport: &Viewport) -> Result<LayerUpdate> {
        let mut update = LayerUpdate::default();
        if !self.enabled {
            return Ok(update);
        }

        // Recompile when the map moved by at least one tile or something changed
        let tile = viewport.position.tile_key();
        if self.last_tile != Some(tile) || self.update_pending {
            if self.update_pending {
                self.worker.cancel();
            }
            self.update_pending = false;
            self.worker.submit(viewport.position)?;
            self.last_tile = Some(tile);
            update.submitted = true;
        }

        if let Some(result) = self.worker.poll() {
            self.adopt(result.output, &mut update);
        }
        Ok(update)
    }

    fn adopt(&mut self, output: CompileOutput, update: &mut LayerUpdate) {
        let CompileOutput {
            chain,
            map_position,
            stats,
            time_series,
            distance_series,
        } = output;

        self.compile_position = Some(map_position);
        self.manager.set_painter(Some(chain));
        update.adopted = Some(stats);

        let compiled = self.manager.painter().map(BucketChain::compile);
        match compiled {
            Some(Ok(mut buffers)) if !buffers.is_empty() => {
                buffers.time_series = time_series;
                buffers.distance_series = distance_series;
                if self.sink.upload(&buffers) {
                    update.uploaded = true;
                } else {
                    tracing::warn!(vertices = buffers.num_vertices(), "Track upload failed");
                    self.sink.release();
                    update.released = true;
                }
            }
            Some(Err(err)) => {
                tracing::error!(%err, "Discarding compiled track");
                self.manager.set_painter(None);
                self.sink.release();
                update.released = true;
            }
            _ => {
                self.manager.set_painter(None);
                self.sink.release();
                update.released = true;
            }
        }
    }

    /// Transform and uniforms for drawing the painted snapshot in `viewport`
    pub fn frame_params(&self, viewport: &Viewport) -> Option<FrameParams> {
        let compile_position = self.compile_position?;
        self.manager.painter()?;

        let transform = RelativeTransform::new(&compile_position, &viewport.position);
        let shader = ShaderMode::for_tilt(viewport.position.tilt);
        Some(FrameParams {
            mvp: transform.mvp(&viewport.view_proj),
            shader,
            passes: LineDrawParams::passes(&self.config, &transform, shader),
        })
    }

    /// Stop the worker and release the uploaded buffers
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            worker,
            mut sink,
            mut manager,
            ..
        } = self;
        manager.clear();
        sink.release();
        worker.shutdown().await
    }
}

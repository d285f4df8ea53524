//! Track Mesh Library - Tessellation and asynchronous compilation of geographic tracks
//!
//! This library turns a large, changing sequence of geographic points into a
//! GPU-drawable triangle-strip mesh (a constant-pixel-width, optionally outlined
//! and direction-arrowed polyline) while the map is panned, zoomed and tilted.
//! All heavy work runs off the render thread; the render side only ever adopts
//! fully compiled snapshots.
//!
//! # Architecture
//!
//! - **[`ChunkPool`] / [`VertexData`]**: recyclable fixed-size vertex blocks and the
//!   growable accumulator built from them
//! - **[`LineClipper`]**: Cohen–Sutherland clipping against the square pixel window
//! - **[`LineTessellator`]**: joins, caps and decimation into a packed vertex strip
//! - **[`ArrowGenerator`]**: direction-arrow triangles with barycentric color coordinates
//! - **[`TrackBucket`] / [`BucketChain`] / [`BucketManager`]**: typed render buckets and
//!   the worker/painter double buffer
//! - **[`TrackCompiler`]**: projection, dateline handling and clipping of one compile pass
//! - **[`CompileWorker`]**: the throttled background task publishing compiled snapshots
//! - **[`TrackLayer`]**: render-side update policy driving an [`UploadSink`]
//!
//! # Data Flow
//!
//! ```text
//! TrackSource -> TrackCompiler -> LineTessellator + ArrowGenerator -> VertexData
//!             -> TrackBucket -> BucketManager (worker -> painter) -> UploadSink
//! ```

mod arrows;
mod bucket;
mod bucket_manager;
mod clipper;
mod config;
mod layer;
mod pool;
mod projector;
mod render;
mod source;
mod tessellator;
mod types;
pub mod utils;
mod vertex_data;
mod worker;

// Public API exports
pub use arrows::{ArrowGenerator, ArrowPart, ArrowVertices};
pub use bucket::{BucketChain, BucketKind, TrackBucket, TrackBuffers};
pub use bucket_manager::BucketManager;
pub use clipper::{ClipResult, LineClipper, Outcode};
pub use config::{ArrowDesign, CapStyle, ColorMode, StyleChange, TrackConfig};
pub use layer::{FrameParams, LayerUpdate, TrackLayer};
pub use pool::{CHUNK_VERTICES, Chunk, ChunkPool};
pub use projector::{CompileOutput, CompileStats, TrackCompiler};
pub use render::{CapMode, LineDrawParams, RelativeTransform, ShaderMode, UploadSink};
pub use source::{SourceSnapshot, TrackSource};
pub use tessellator::LineTessellator;
pub use types::{Color, GeoPoint, MapPosition, Viewport};
pub use vertex_data::VertexData;
pub use worker::{CompileResult, CompileWorker};

/// Matrix type of [`Viewport::view_proj`] and [`FrameParams::mvp`]
pub use glam::Mat4;

/// Scale factor applied to pixel positions before packing them into 16-bit integers
pub const COORD_SCALE: f32 = 8.0;

/// Scale factor mapping unit extrusion vectors to 16-bit integers
pub const DIR_SCALE: f32 = 2048.0;

/// Size of one map tile in pixels
pub const TILE_SIZE: f64 = 256.0;

/// Number of 16-bit integers per line vertex (x, y, dx, dy)
pub const SHORTS_PER_VERTEX: usize = 4;

/// Number of bytes per vertex color (RGBA)
pub const BYTES_PER_COLOR: usize = 4;

/// Error types for the track mesh pipeline
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Wrong {kind} buffer size: expected {expected}, written {actual}")]
    BufferSizeMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Point/color count mismatch: {points} points, {colors} colors")]
    ColorCountMismatch { points: usize, colors: usize },

    #[error("Compile worker is closed")]
    WorkerClosed,

    #[error("Compile task panicked: {0}")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, MeshError>;

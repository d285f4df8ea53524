//! Render buckets and their level-sorted chain
//!
//! A [`TrackBucket`] accumulates the strip vertices of one line type together with
//! the direction arrows and the index arrays that map vertices back to source
//! points. A [`BucketChain`] keeps buckets sorted by level and compiles all of them
//! into one set of flat [`TrackBuffers`].

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::Coord;

use crate::arrows::{ARROW_SHORTS_PER_VERTEX, ArrowVertices, COLOR_COORDS_PER_VERTEX};
use crate::{
    BYTES_PER_COLOR, ChunkPool, Color, LineTessellator, MeshError, Result, SHORTS_PER_VERTEX,
    VertexData,
};

/// Level of the track bucket inside its chain
pub const TRACK_LEVEL: u16 = 0;

/// Type of a render bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    /// Anti-aliased line strip
    Line,
    /// Line strip drawn with a stipple texture; same vertex layout as [`BucketKind::Line`]
    TexLine,
}

/// One typed bucket of line geometry
#[derive(Debug)]
pub struct TrackBucket {
    kind: BucketKind,
    level: u16,
    vertices: VertexData,
    /// Vertices accounted by the tessellator, compared against the written count on compile
    num_vertices: usize,
    arrows: ArrowVertices,
    /// Source point index per vertex pair
    visible_indices: Vec<u32>,
    /// Source point indices that passed clipping and the distance filter
    not_clipped_indices: Vec<u32>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackBucket {
    pub fn new(kind: BucketKind, level: u16, pool: ChunkPool) -> Self {
        Self {
            kind,
            level,
            vertices: VertexData::new(pool),
            num_vertices: 0,
            arrows: ArrowVertices::default(),
            visible_indices: Vec::new(),
            not_clipped_indices: Vec::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> BucketKind {
        self.kind
    }

    #[inline]
    pub fn level(&self) -> u16 {
        self.level
    }

    /// Accounted number of strip vertices
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    #[inline]
    pub fn vertex_data(&self) -> &VertexData {
        &self.vertices
    }

    #[inline]
    pub fn arrows(&self) -> &ArrowVertices {
        &self.arrows
    }

    #[inline]
    pub fn arrows_mut(&mut self) -> &mut ArrowVertices {
        &mut self.arrows
    }

    #[inline]
    pub fn visible_indices(&self) -> &[u32] {
        &self.visible_indices
    }

    #[inline]
    pub fn not_clipped_indices(&self) -> &[u32] {
        &self.not_clipped_indices
    }

    pub fn is_empty(&self) -> bool {
        self.num_vertices == 0 && self.arrows.is_empty()
    }

    /// Tessellate one polyline into this bucket; polylines with fewer than 2 points are ignored
    pub fn add_line(
        &mut self,
        tessellator: &LineTessellator,
        points: &[Coord<f32>],
        colors: &[Color],
        closed: bool,
    ) -> usize {
        if points.len() < 2 {
            return 0;
        }
        let accounted = tessellator.tessellate(points, colors, closed, &mut self.vertices);
        self.num_vertices += accounted;
        accounted
    }

    #[inline]
    pub(crate) fn push_visible_index(&mut self, index: u32) {
        self.visible_indices.push(index);
    }

    #[inline]
    pub(crate) fn push_not_clipped_index(&mut self, index: u32) {
        self.not_clipped_indices.push(index);
    }

    /// Make the visible index list hold exactly one entry per vertex pair
    ///
    /// Vertices added by caps, joins and stitching repeat the last index; indices of
    /// points that produced no vertices are dropped from the end.
    ///
    /// Only the length is exact. A skipped short segment removes a pair from the
    /// middle of the strip while the truncation removes the last index, so pairs
    /// after the skipped point map to the index one before their own point. Consumers
    /// of the list tolerate this off-by-one within a flushed polyline.
    pub fn reconcile_visible_indices(&mut self) {
        let target = self.num_vertices / 2;
        match self.visible_indices.last().copied() {
            Some(last) if self.visible_indices.len() < target => {
                self.visible_indices.resize(target, last);
            }
            None if target > 0 => {
                self.visible_indices.resize(target, 0);
            }
            _ => self.visible_indices.truncate(target),
        }
    }

    /// Release all vertex chunks and forget all geometry
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.num_vertices = 0;
        self.arrows.clear();
        self.visible_indices.clear();
        self.not_clipped_indices.clear();
    }
}

/// Position of one bucket inside the flat vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRange {
    pub kind: BucketKind,
    pub level: u16,
    /// First vertex
    pub offset: usize,
    /// Number of vertices
    pub count: usize,
}

/// Flat buffers of a compiled chain, ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackBuffers {
    /// x, y, dx, dy per strip vertex
    pub vertices: Vec<i16>,
    /// RGBA per strip vertex
    pub colors: Vec<u8>,
    pub ranges: Vec<BucketRange>,
    /// x, y, z, part per arrow vertex
    pub arrow_positions: Vec<i16>,
    /// Barycentric color coordinate per arrow vertex
    pub arrow_color_coords: Vec<i16>,
    pub visible_indices: Vec<u32>,
    pub not_clipped_indices: Vec<u32>,
    /// Time per source point, shared with the source
    pub time_series: Option<Arc<[i64]>>,
    /// Distance per source point, shared with the source
    pub distance_series: Option<Arc<[f32]>>,
}

impl TrackBuffers {
    /// Number of strip vertices
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / SHORTS_PER_VERTEX
    }

    /// Number of arrow vertices
    #[inline]
    pub fn num_arrow_vertices(&self) -> usize {
        self.arrow_positions.len() / ARROW_SHORTS_PER_VERTEX
    }

    /// Nothing to draw
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.arrow_positions.is_empty()
    }
}

/// Buckets sorted by level
#[derive(Debug)]
pub struct BucketChain {
    pool: ChunkPool,
    buckets: BTreeMap<u16, TrackBucket>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl BucketChain {
    pub fn new(pool: ChunkPool) -> Self {
        Self {
            pool,
            buckets: BTreeMap::new(),
        }
    }

    /// Bucket at `level`, created with `kind` when missing
    ///
    /// Returns `None` when the level already holds a bucket of another kind.
    pub fn bucket_mut(&mut self, level: u16, kind: BucketKind) -> Option<&mut TrackBucket> {
        let pool = &self.pool;
        let bucket = self
            .buckets
            .entry(level)
            .or_insert_with(|| TrackBucket::new(kind, level, pool.clone()));
        if bucket.kind != kind {
            tracing::error!(
                existing = ?bucket.kind,
                requested = ?kind,
                level,
                "Wrong bucket type on level"
            );
            return None;
        }
        Some(bucket)
    }

    /// The track bucket, created as a line bucket when missing
    pub fn track_bucket_mut(&mut self) -> &mut TrackBucket {
        let pool = &self.pool;
        self.buckets
            .entry(TRACK_LEVEL)
            .or_insert_with(|| TrackBucket::new(BucketKind::Line, TRACK_LEVEL, pool.clone()))
    }

    pub fn track_bucket(&self) -> Option<&TrackBucket> {
        self.buckets.get(&TRACK_LEVEL)
    }

    /// Buckets in ascending level order
    pub fn iter(&self) -> impl Iterator<Item = &TrackBucket> {
        self.buckets.values()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(TrackBucket::is_empty)
    }

    /// Accounted strip vertices over all buckets
    pub fn num_vertices(&self) -> usize {
        self.buckets.values().map(TrackBucket::num_vertices).sum()
    }

    /// Release all buckets
    pub fn clear(&mut self) {
        for bucket in self.buckets.values_mut() {
            bucket.clear();
        }
        self.buckets.clear();
    }

    /// Copy all buckets into flat buffers
    ///
    /// Buffer sizes are computed from the accounted vertex counts first. A buffer whose
    /// written size differs is a tessellation defect; it is logged and reported so it
    /// never reaches the GPU.
    pub fn compile(&self) -> Result<TrackBuffers> {
        #[cfg(feature = "profiling")]
        profiling::scope!("bucket_chain::compile");

        let expected = self.num_vertices();
        let expected_arrows: usize = self.buckets.values().map(|b| b.arrows.len()).sum();

        let mut buffers = TrackBuffers {
            vertices: Vec::with_capacity(expected * SHORTS_PER_VERTEX),
            colors: Vec::with_capacity(expected * BYTES_PER_COLOR),
            arrow_positions: Vec::with_capacity(expected_arrows * ARROW_SHORTS_PER_VERTEX),
            arrow_color_coords: Vec::with_capacity(expected_arrows * COLOR_COORDS_PER_VERTEX),
            ..Default::default()
        };

        for bucket in self.buckets.values() {
            let offset = buffers.num_vertices();
            let written = bucket
                .vertices
                .fill(&mut buffers.vertices, &mut buffers.colors);
            buffers.ranges.push(BucketRange {
                kind: bucket.kind,
                level: bucket.level,
                offset,
                count: written,
            });

            buffers
                .arrow_positions
                .extend_from_slice(&bucket.arrows.positions);
            buffers
                .arrow_color_coords
                .extend_from_slice(&bucket.arrows.color_coords);

            if bucket.level == TRACK_LEVEL {
                buffers
                    .visible_indices
                    .extend_from_slice(&bucket.visible_indices);
                buffers
                    .not_clipped_indices
                    .extend_from_slice(&bucket.not_clipped_indices);
            }
        }

        let actual = buffers.num_vertices();
        if actual != expected {
            tracing::error!(expected, actual, "Wrong vertex buffer size");
            return Err(MeshError::BufferSizeMismatch {
                kind: "vertex",
                expected,
                actual,
            });
        }

        let actual_coords = buffers.arrow_color_coords.len() / COLOR_COORDS_PER_VERTEX;
        if buffers.num_arrow_vertices() != expected_arrows || actual_coords != expected_arrows {
            tracing::error!(
                expected = expected_arrows,
                positions = buffers.num_arrow_vertices(),
                color_coords = actual_coords,
                "Wrong arrow buffer size"
            );
            return Err(MeshError::BufferSizeMismatch {
                kind: "arrow",
                expected: expected_arrows,
                actual: buffers.num_arrow_vertices().min(actual_coords),
            });
        }

        tracing::trace!(
            vertices = actual,
            arrows = expected_arrows,
            buckets = self.buckets.len(),
            "Compiled bucket chain"
        );
        Ok(buffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArrowGenerator, CapStyle};

    fn c(x: f32, y: f32) -> Coord<f32> {
        Coord { x, y }
    }

    fn tessellator() -> LineTessellator {
        LineTessellator::new(CapStyle::Butt, 0.125, 0.5)
    }

    #[test]
    fn test_add_line_accounts_vertices() {
        let mut chain = BucketChain::new(ChunkPool::default());
        let bucket = chain.track_bucket_mut();
        let colors = [Color::WHITE; 3];
        assert_eq!(
            bucket.add_line(
                &tessellator(),
                &[c(0.0, 0.0), c(10.0, 0.0), c(20.0, 5.0)],
                &colors,
                false
            ),
            6
        );
        assert_eq!(bucket.add_line(&tessellator(), &[c(0.0, 0.0)], &colors, false), 0);
        assert_eq!(bucket.num_vertices(), 6);
        assert_eq!(chain.num_vertices(), 6);
    }

    #[test]
    fn test_visible_indices_after_skipped_segment() {
        let mut chain = BucketChain::new(ChunkPool::default());
        let bucket = chain.track_bucket_mut();
        let points = [c(0.0, 0.0), c(10.0, 0.0), c(10.05, 0.0), c(20.0, 0.0)];
        bucket.add_line(&tessellator(), &points, &[Color::WHITE; 4], false);
        for index in 0..4 {
            bucket.push_visible_index(index);
        }
        bucket.reconcile_visible_indices();

        // One pair fewer than points: the length follows the vertices, the tail index is dropped
        assert_eq!(bucket.num_vertices(), 6);
        assert_eq!(bucket.visible_indices(), &[0, 1, 2]);
    }

    #[test]
    fn test_compile_flat_buffers() {
        let mut chain = BucketChain::new(ChunkPool::default());
        let tess = tessellator();
        {
            let bucket = chain.track_bucket_mut();
            bucket.add_line(&tess, &[c(0.0, 0.0), c(10.0, 0.0)], &[Color::WHITE; 2], false);
            bucket.add_line(&tess, &[c(0.0, 5.0), c(10.0, 5.0)], &[Color::BLACK; 2], false);
            ArrowGenerator::default().generate(&[c(0.0, 0.0), c(50.0, 0.0)], bucket.arrows_mut());
        }
        let tex = chain.bucket_mut(2, BucketKind::TexLine).unwrap();
        tex.add_line(&tess, &[c(0.0, 9.0), c(10.0, 9.0)], &[Color::WHITE; 2], false);

        let buffers = chain.compile().unwrap();
        assert_eq!(buffers.num_vertices(), 4 + 6 + 4);
        assert_eq!(buffers.colors.len(), buffers.num_vertices() * 4);
        assert_eq!(buffers.num_arrow_vertices(), 6);
        assert_eq!(buffers.arrow_color_coords.len(), 18);
        assert_eq!(
            buffers.ranges,
            vec![
                BucketRange {
                    kind: BucketKind::Line,
                    level: 0,
                    offset: 0,
                    count: 10
                },
                BucketRange {
                    kind: BucketKind::TexLine,
                    level: 2,
                    offset: 10,
                    count: 4
                },
            ]
        );
    }

    #[test]
    fn test_compile_detects_size_mismatch() {
        let mut chain = BucketChain::new(ChunkPool::default());
        let bucket = chain.track_bucket_mut();
        bucket.add_line(&tessellator(), &[c(0.0, 0.0), c(10.0, 0.0)], &[Color::WHITE; 2], false);
        bucket.num_vertices += 2;

        match chain.compile() {
            Err(MeshError::BufferSizeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 6);
                assert_eq!(actual, 4);
            }
            other => panic!("expected size mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_kind_on_level() {
        let mut chain = BucketChain::new(ChunkPool::default());
        assert!(chain.bucket_mut(1, BucketKind::Line).is_some());
        assert!(chain.bucket_mut(1, BucketKind::TexLine).is_none());
        assert!(chain.bucket_mut(1, BucketKind::Line).is_some());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_levels_are_sorted() {
        let mut chain = BucketChain::new(ChunkPool::default());
        chain.bucket_mut(5, BucketKind::Line);
        chain.bucket_mut(1, BucketKind::TexLine);
        chain.track_bucket_mut();
        let levels: Vec<_> = chain.iter().map(TrackBucket::level).collect();
        assert_eq!(levels, vec![0, 1, 5]);
    }

    #[test]
    fn test_reconcile_visible_indices() {
        let mut chain = BucketChain::new(ChunkPool::default());
        let bucket = chain.track_bucket_mut();
        bucket.push_visible_index(3);
        bucket.push_visible_index(4);
        bucket.num_vertices = 8;
        bucket.reconcile_visible_indices();
        assert_eq!(bucket.visible_indices(), &[3, 4, 4, 4]);

        bucket.num_vertices = 2;
        bucket.reconcile_visible_indices();
        assert_eq!(bucket.visible_indices(), &[3]);
    }

    #[test]
    fn test_clear_returns_chunks() {
        let pool = ChunkPool::new(16);
        let mut chain = BucketChain::new(pool.clone());
        let points: Vec<_> = (0..100).map(|i| c(i as f32, (i % 3) as f32)).collect();
        chain
            .track_bucket_mut()
            .add_line(&tessellator(), &points, &[Color::WHITE], false);
        assert_eq!(pool.pooled(), 0);

        chain.clear();
        assert_eq!(pool.pooled(), 3);
        assert!(chain.is_empty());
    }
}

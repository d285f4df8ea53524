//! Compile pass: projection, dateline handling, clipping and decimation
//!
//! One pass turns the current [`SourceSnapshot`] into a fully built
//! [`BucketChain`] for one map position:
//!
//! 1. Project every point into the normalized plane (cached per source generation)
//! 2. Convert to pixels relative to the map center, folding X into one world width
//! 3. Break polylines at dateline flips and tour starts
//! 4. Clip against the square pixel window, drop points closer than the minimum distance
//! 5. Tessellate each finished polyline and keep the geo index lists in step

use std::sync::Arc;
use std::time::Duration;

use geo::Coord;
use rayon::prelude::*;

use crate::utils::{abs_max_exceeds, world_pixels};
use crate::{
    ArrowGenerator, BucketChain, BucketManager, ChunkPool, ClipResult, Color, LineClipper,
    LineTessellator, MapPosition, SourceSnapshot, StyleChange, TrackBucket,
    TrackConfig,
};

/// Points processed between two cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Counters of one compile pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompileStats {
    pub input_points: usize,
    /// Source points drawn after clipping and the minimum distance filter
    pub accepted_points: usize,
    /// Polylines handed to the tessellator, clip segments included
    pub polylines: usize,
    /// Boundary segments produced by the clipper
    pub intersections: usize,
    pub flips: usize,
    pub tour_breaks: usize,
    /// Points skipped because their pixel position was not finite
    pub dropped_points: usize,
    pub vertices: usize,
    pub arrows: usize,
    pub elapsed: Duration,
}

/// Finished result of one compile pass
#[derive(Debug)]
pub struct CompileOutput {
    pub chain: BucketChain,
    /// Map position the vertices are relative to, scale snapped to the zoom level
    pub map_position: MapPosition,
    pub stats: CompileStats,
    pub time_series: Option<Arc<[i64]>>,
    pub distance_series: Option<Arc<[f32]>>,
}

/// Polyline collected between two flushes
#[derive(Debug, Default)]
struct PendingRun {
    points: Vec<Coord<f32>>,
    colors: Vec<Color>,
    /// Source index of every point
    indices: Vec<u32>,
}

impl PendingRun {
    #[inline]
    fn push(&mut self, point: Coord<f32>, color: Color, index: u32) {
        self.points.push(point);
        self.colors.push(color);
        self.indices.push(index);
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn clear(&mut self) {
        self.points.clear();
        self.colors.clear();
        self.indices.clear();
    }

    /// Tessellate the run into `bucket` and reset it, returning the points drawn
    fn flush(
        &mut self,
        bucket: &mut TrackBucket,
        tessellator: &LineTessellator,
        stats: &mut CompileStats,
    ) -> usize {
        let flushed = if self.points.len() >= 2 {
            bucket.add_line(tessellator, &self.points, &self.colors, false);
            for &index in &self.indices {
                bucket.push_visible_index(index);
            }
            bucket.reconcile_visible_indices();
            stats.polylines += 1;
            tracing::trace!(
                points = self.points.len(),
                vertices = bucket.num_vertices(),
                "Polyline flushed"
            );
            self.points.len()
        } else {
            0
        };
        self.clear();
        flushed
    }
}

/// Runs compile passes and owns everything reused between them
///
/// The projected points, the scratch buffers and the worker side of the bucket
/// double buffer survive from one pass to the next, so steady panning does not
/// allocate.
#[derive(Debug)]
pub struct TrackCompiler {
    config: TrackConfig,
    tessellator: LineTessellator,
    arrows: ArrowGenerator,
    clipper: LineClipper,
    manager: BucketManager,
    projected: Vec<Coord<f64>>,
    projected_generation: Option<u64>,
    run: PendingRun,
    arrow_samples: Vec<Coord<f32>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackCompiler {
    pub fn new(config: TrackConfig) -> Self {
        Self::with_pool(config, ChunkPool::default())
    }

    /// Compiler whose buckets draw their vertex chunks from `pool`
    pub fn with_pool(config: TrackConfig, pool: ChunkPool) -> Self {
        Self {
            tessellator: LineTessellator::from_config(&config),
            arrows: ArrowGenerator::from_config(&config),
            clipper: LineClipper::square(config.clip_extent),
            manager: BucketManager::new(pool),
            projected: Vec::new(),
            projected_generation: None,
            run: PendingRun::default(),
            arrow_samples: Vec::new(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    #[inline]
    pub fn pool(&self) -> &ChunkPool {
        self.manager.pool()
    }

    /// Replace the configuration, returning how much of the geometry it invalidates
    pub fn set_config(&mut self, config: TrackConfig) -> StyleChange {
        let change = config.diff(&self.config);
        if change == StyleChange::Geometry {
            self.tessellator = LineTessellator::from_config(&config);
            self.arrows = ArrowGenerator::from_config(&config);
            self.clipper = LineClipper::square(config.clip_extent);
        }
        self.config = config;
        change
    }

    /// Project the snapshot into the normalized plane unless its generation is cached
    ///
    /// Returns `true` when the points were projected again.
    pub fn project(&mut self, snapshot: &SourceSnapshot) -> bool {
        if self.projected_generation == Some(snapshot.generation)
            && self.projected.len() == snapshot.len()
        {
            return false;
        }

        #[cfg(feature = "profiling")]
        profiling::scope!("projector::project");

        self.projected.clear();
        snapshot
            .points
            .par_iter()
            .map(|point| point.project())
            .collect_into_vec(&mut self.projected);
        self.projected_generation = Some(snapshot.generation);

        tracing::debug!(
            points = self.projected.len(),
            generation = snapshot.generation,
            "Track projected"
        );
        true
    }

    /// Run one compile pass for `position`
    ///
    /// `cancelled` is polled between phases and every few thousand points. A
    /// cancelled pass discards its partial chain and returns `None`.
    pub fn compile(
        &mut self,
        snapshot: &SourceSnapshot,
        position: &MapPosition,
        cancelled: &dyn Fn() -> bool,
    ) -> Option<CompileOutput> {
        #[cfg(feature = "profiling")]
        profiling::scope!("projector::compile");

        let start = instant::Instant::now();
        let position = position.snapped_to_zoom();
        let mut stats = CompileStats {
            input_points: snapshot.len(),
            ..Default::default()
        };

        self.project(snapshot);
        if cancelled() {
            return None;
        }

        let Self {
            config,
            tessellator,
            arrows,
            clipper,
            manager,
            projected,
            run,
            arrow_samples,
            ..
        } = self;

        manager.discard_worker();
        let bucket = manager.worker_bucket();
        run.clear();
        arrow_samples.clear();

        // Flushes the direction arrow samples collected since the last break
        let flush_arrows = |samples: &mut Vec<Coord<f32>>, bucket: &mut TrackBucket| -> usize {
            let count = if config.arrows {
                arrows.generate(samples, bucket.arrows_mut())
            } else {
                0
            };
            samples.clear();
            count
        };

        // The position is snapped, so its scale is exactly the zoom scale
        let world = world_pixels(position.zoom_level);
        let half_world = world / 2.0;
        let to_pixel = |p: Coord<f64>| -> (Coord<f32>, i8) {
            let mut x = (p.x - position.x) * world;
            let y = (p.y - position.y) * world;
            let mut flip = 0;
            if x > half_world {
                x -= world;
                flip = -1;
            } else if x < -half_world {
                x += world;
                flip = 1;
            }
            (
                Coord {
                    x: x as f32,
                    y: y as f32,
                },
                flip,
            )
        };
        let color_at = |index: usize| {
            config.vertex_color(snapshot.colors.get(index).copied().unwrap_or(Color::WHITE))
        };

        let mut tour = 0;
        let mut next_tour_start = snapshot.next_tour_start(tour);
        let mut flip = 0;
        let mut started = false;
        let mut prev = Coord::zero();
        let mut prev_arrow = Coord::zero();
        let mut prev_not_clipped: Option<Coord<f32>> = None;

        for (index, &projected_point) in projected.iter().enumerate() {
            if index % CANCEL_CHECK_INTERVAL == CANCEL_CHECK_INTERVAL - 1 && cancelled() {
                manager.discard_worker();
                return None;
            }

            let (pixel, point_flip) = to_pixel(projected_point);
            if !pixel.x.is_finite() || !pixel.y.is_finite() {
                stats.dropped_points += 1;
                continue;
            }
            let color = color_at(index);
            let source_index = index as u32;

            // First usable point, or a forced break: dateline flip or next tour
            let tour_break = next_tour_start.is_some_and(|start| index >= start);
            if !started || point_flip != flip || tour_break {
                if started {
                    let flushed = run.flush(bucket, tessellator, &mut stats);
                    stats.accepted_points += flushed;
                    stats.arrows += flush_arrows(arrow_samples, bucket);
                    if point_flip != flip {
                        stats.flips += 1;
                    }
                }
                if tour_break && started {
                    while next_tour_start.is_some_and(|start| index >= start) {
                        tour += 1;
                        next_tour_start = snapshot.next_tour_start(tour);
                    }
                    stats.tour_breaks += 1;
                }
                started = true;
                flip = point_flip;

                clipper.clip_start(pixel);
                run.push(pixel, color, source_index);
                prev = pixel;
                if clipper.prev_outcode().is_inside() {
                    bucket.push_not_clipped_index(source_index);
                    prev_not_clipped = Some(pixel);
                    arrow_samples.push(pixel);
                    prev_arrow = pixel;
                }
                continue;
            }

            match clipper.clip_next(pixel) {
                ClipResult::Inside => {}
                result => {
                    let flushed = run.flush(bucket, tessellator, &mut stats);
                    stats.accepted_points += flushed;
                    stats.arrows += flush_arrows(arrow_samples, bucket);

                    if result == ClipResult::Intersection {
                        let [a, b] = clipper.line();
                        let prev_index = index.saturating_sub(1);
                        run.push(a, color_at(prev_index), prev_index as u32);
                        run.push(b, color, source_index);
                        run.flush(bucket, tessellator, &mut stats);
                        stats.intersections += 1;
                        prev = pixel;
                    }

                    // Entering the window starts a new run at the real point
                    if clipper.prev_outcode().is_inside() {
                        run.push(pixel, color, source_index);
                        prev = pixel;
                        bucket.push_not_clipped_index(source_index);
                        prev_not_clipped = Some(pixel);
                        arrow_samples.push(pixel);
                        prev_arrow = pixel;
                    }
                    continue;
                }
            }

            let delta = pixel - prev;
            if run.is_empty() || abs_max_exceeds(delta.x, delta.y, config.min_point_distance) {
                run.push(pixel, color, source_index);
                prev = pixel;
            }

            if prev_not_clipped.is_none_or(|last| {
                let delta = pixel - last;
                abs_max_exceeds(delta.x, delta.y, config.min_point_distance)
            }) {
                bucket.push_not_clipped_index(source_index);
                prev_not_clipped = Some(pixel);
            }

            let delta = pixel - prev_arrow;
            if arrow_samples.is_empty()
                || abs_max_exceeds(delta.x, delta.y, config.arrow_min_distance)
            {
                arrow_samples.push(pixel);
                prev_arrow = pixel;
            }
        }

        let flushed = run.flush(bucket, tessellator, &mut stats);
        stats.accepted_points += flushed;
        if cancelled() {
            manager.discard_worker();
            return None;
        }
        stats.arrows += flush_arrows(arrow_samples, bucket);
        stats.vertices = bucket.num_vertices();

        if stats.dropped_points > 0 {
            tracing::warn!(
                dropped = stats.dropped_points,
                "Dropped points with non-finite pixel positions"
            );
        }

        let chain = manager
            .take_worker()
            .unwrap_or_else(|| BucketChain::new(manager.pool().clone()));
        stats.elapsed = start.elapsed();

        tracing::debug!(
            points = stats.input_points,
            accepted = stats.accepted_points,
            polylines = stats.polylines,
            vertices = stats.vertices,
            arrows = stats.arrows,
            elapsed_ms = stats.elapsed.as_secs_f64() * 1000.0,
            "Track compiled"
        );

        Some(CompileOutput {
            chain,
            map_position: position,
            stats,
            time_series: snapshot.time_series.clone(),
            distance_series: snapshot.distance_series.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::normalized_to_wgs84;
    use crate::{CapStyle, GeoPoint, TrackSource};

    const ZOOM: u8 = 10;

    fn center() -> MapPosition {
        MapPosition {
            zoom_level: ZOOM,
            scale: (1u32 << ZOOM) as f64,
            ..Default::default()
        }
    }

    /// Geographic point that lands on `(x, y)` pixels around the default center
    fn at_pixel(x: f64, y: f64) -> GeoPoint {
        let world = world_pixels(ZOOM);
        let (lat, lon) = normalized_to_wgs84(0.5 + x / world, 0.5 + y / world);
        GeoPoint::from_degrees(lat, lon)
    }

    fn snapshot(points: Vec<GeoPoint>, tour_starts: Vec<u32>) -> SourceSnapshot {
        let source = TrackSource::new();
        let colors = vec![Color::WHITE; points.len()];
        source.set_points(points, colors, tour_starts).unwrap();
        source.snapshot()
    }

    fn butt() -> TrackCompiler {
        TrackCompiler::new(TrackConfig {
            cap: CapStyle::Butt,
            ..Default::default()
        })
    }

    fn compile(compiler: &mut TrackCompiler, snapshot: &SourceSnapshot) -> CompileOutput {
        compiler.compile(snapshot, &center(), &|| false).unwrap()
    }

    fn visible_matches_vertices(output: &CompileOutput) {
        let bucket = output.chain.track_bucket().unwrap();
        assert_eq!(bucket.visible_indices().len() * 2, bucket.num_vertices());
    }

    #[test]
    fn test_straight_track_inside_window() {
        let points = (0..5).map(|i| at_pixel(i as f64 * 10.0, 0.0)).collect();
        let mut compiler = butt();
        let output = compile(&mut compiler, &snapshot(points, vec![0]));

        assert_eq!(output.stats.polylines, 1);
        assert_eq!(output.stats.vertices, 10);
        assert_eq!(output.chain.num_vertices(), 10);
        let bucket = output.chain.track_bucket().unwrap();
        assert_eq!(bucket.visible_indices(), &[0, 1, 2, 3, 4]);
        assert_eq!(bucket.not_clipped_indices(), &[0, 1, 2, 3, 4]);
        assert_eq!(output.stats.accepted_points, 5);
    }

    #[test]
    fn test_dateline_flip_starts_one_new_polyline() {
        let points = [179.95, 179.99, -179.99, -179.95]
            .into_iter()
            .map(|lon| GeoPoint::from_degrees(0.0, lon))
            .collect();
        let position = MapPosition::from_geo(GeoPoint::from_degrees(0.0, 180.0), 12);

        let mut compiler = butt();
        let output = compiler
            .compile(&snapshot(points, vec![0]), &position, &|| false)
            .unwrap();

        assert_eq!(output.stats.flips, 1);
        assert_eq!(output.stats.polylines, 2);
        // Two 2-point runs plus the stitch
        assert_eq!(output.stats.vertices, 4 + 4 + 2);
        visible_matches_vertices(&output);

        // No vertex lies further than the flip points from the dateline
        let bucket = output.chain.track_bucket().unwrap();
        for i in 0..bucket.num_vertices() {
            let (vertex, _) = bucket.vertex_data().get(i).unwrap();
            assert!((vertex[0] as f32).abs() < 150.0 * 8.0);
        }
    }

    #[test]
    fn test_fully_outside_produces_nothing() {
        let points = vec![
            at_pixel(3000.0, 0.0),
            at_pixel(4000.0, 0.0),
            at_pixel(5000.0, 10.0),
        ];
        let mut compiler = butt();
        let output = compile(&mut compiler, &snapshot(points, vec![0]));
        assert_eq!(output.stats.vertices, 0);
        assert_eq!(output.stats.polylines, 0);
        assert!(output.chain.track_bucket().unwrap().visible_indices().is_empty());
    }

    #[test]
    fn test_straddling_segment_adds_clip_polyline() {
        let points = vec![
            at_pixel(0.0, 0.0),
            at_pixel(100.0, 0.0),
            at_pixel(3000.0, 0.0),
        ];
        let mut compiler = butt();
        let output = compile(&mut compiler, &snapshot(points, vec![0]));

        assert_eq!(output.stats.intersections, 1);
        assert_eq!(output.stats.polylines, 2);
        // Inside run (4) + clip segment (4) + stitch (2)
        assert_eq!(output.stats.vertices, 10);
        visible_matches_vertices(&output);

        // The clip segment ends on the window boundary
        let bucket = output.chain.track_bucket().unwrap();
        let (last, _) = bucket.vertex_data().last().unwrap();
        assert_eq!(last[0], (2048.0 * 8.0) as i16);
    }

    #[test]
    fn test_entering_window_restarts_run() {
        let points = vec![
            at_pixel(3000.0, 0.0),
            at_pixel(100.0, 0.0),
            at_pixel(0.0, 0.0),
        ];
        let mut compiler = butt();
        let output = compile(&mut compiler, &snapshot(points, vec![0]));

        assert_eq!(output.stats.intersections, 1);
        // Clip segment, then the run [100, 0]
        assert_eq!(output.stats.polylines, 2);
        let bucket = output.chain.track_bucket().unwrap();
        assert_eq!(bucket.visible_indices()[..2], [0, 1]);
        visible_matches_vertices(&output);
    }

    #[test]
    fn test_min_distance_filter() {
        let points = (0..100).map(|i| at_pixel(i as f64, 0.0)).collect();
        let mut compiler = butt();
        let output = compile(&mut compiler, &snapshot(points, vec![0]));

        let bucket = output.chain.track_bucket().unwrap();
        let n = bucket.num_vertices();
        assert!(n < 100, "expected decimation, got {n} vertices");

        let min = TrackConfig::default().min_point_distance * 8.0;
        let positions: Vec<i16> = (0..n)
            .step_by(2)
            .map(|i| bucket.vertex_data().get(i).unwrap().0[0])
            .collect();
        for pair in positions.windows(2) {
            assert!((pair[1] - pair[0]) as f32 >= min, "{pair:?}");
        }
        assert_eq!(output.stats.accepted_points, n / 2);
    }

    #[test]
    fn test_tour_start_breaks_polyline() {
        let points = (0..6).map(|i| at_pixel(i as f64 * 10.0, 0.0)).collect();
        let mut compiler = butt();
        let output = compile(&mut compiler, &snapshot(points, vec![0, 3]));

        assert_eq!(output.stats.tour_breaks, 1);
        assert_eq!(output.stats.polylines, 2);
        assert_eq!(output.stats.vertices, 6 + 6 + 2);
        visible_matches_vertices(&output);
    }

    #[test]
    fn test_visible_indices_with_joins_and_caps() {
        // Zig-zag with sharp and shallow turns, round caps
        let points = (0..60)
            .map(|i| {
                let y = if i % 3 == 0 { 40.0 } else { (i % 7) as f64 * 3.0 };
                at_pixel(i as f64 * 20.0 - 600.0, y)
            })
            .collect();
        let mut compiler = TrackCompiler::new(TrackConfig::default());
        let output = compile(&mut compiler, &snapshot(points, vec![0]));
        assert!(output.stats.vertices > 0);
        visible_matches_vertices(&output);
    }

    #[test]
    fn test_arrows_follow_samples() {
        let points = (0..11).map(|i| at_pixel(i as f64 * 40.0, 0.0)).collect();
        let mut compiler = TrackCompiler::new(TrackConfig {
            arrows: true,
            ..Default::default()
        });
        let output = compile(&mut compiler, &snapshot(points, vec![0]));
        assert_eq!(output.stats.arrows, 10);
        let bucket = output.chain.track_bucket().unwrap();
        assert_eq!(bucket.arrows().len(), 10 * 6);
    }

    #[test]
    fn test_projection_cached_per_generation() {
        let snapshot = snapshot(vec![at_pixel(0.0, 0.0), at_pixel(10.0, 0.0)], vec![0]);
        let mut compiler = butt();
        assert!(compiler.project(&snapshot));
        assert!(!compiler.project(&snapshot));

        let mut newer = snapshot.clone();
        newer.generation += 1;
        assert!(compiler.project(&newer));
    }

    #[test]
    fn test_cancelled_pass_returns_nothing() {
        let points = (0..10).map(|i| at_pixel(i as f64 * 10.0, 0.0)).collect();
        let mut compiler = butt();
        let pool = compiler.pool().clone();
        assert!(
            compiler
                .compile(&snapshot(points, vec![0]), &center(), &|| true)
                .is_none()
        );
        assert_eq!(pool.allocated(), pool.pooled());
    }

    #[test]
    fn test_empty_source() {
        let mut compiler = butt();
        let output = compile(&mut compiler, &SourceSnapshot::default());
        assert_eq!(output.stats.input_points, 0);
        assert!(output.chain.compile().unwrap().is_empty());
    }

    #[test]
    fn test_set_config_classifies_change() {
        let mut compiler = butt();
        let mut config = compiler.config().clone();
        config.line_width = 8.0;
        assert_eq!(compiler.set_config(config.clone()), StyleChange::DrawOnly);
        config.cap = CapStyle::Square;
        assert_eq!(compiler.set_config(config), StyleChange::Geometry);
    }
}

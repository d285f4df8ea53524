//! Shared source points, swapped by reference

use std::sync::{Arc, Mutex, PoisonError};

use crate::{Color, GeoPoint, MeshError, Result};

/// Immutable view of the source points at one generation
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub points: Arc<[GeoPoint]>,
    /// One color per point
    pub colors: Arc<[Color]>,
    /// Index of the first point of each concatenated tour, ascending
    pub tour_starts: Arc<[u32]>,
    pub time_series: Option<Arc<[i64]>>,
    pub distance_series: Option<Arc<[f32]>>,
    /// Incremented on every replacement
    pub generation: u64,
}

impl Default for SourceSnapshot {
    fn default() -> Self {
        Self {
            points: Arc::from(Vec::new()),
            colors: Arc::from(Vec::new()),
            tour_starts: Arc::from(Vec::new()),
            time_series: None,
            distance_series: None,
            generation: 0,
        }
    }
}

impl SourceSnapshot {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First point index of the tour following `tour`, if any
    #[inline]
    pub fn next_tour_start(&self, tour: usize) -> Option<usize> {
        self.tour_starts.get(tour + 1).map(|&start| start as usize)
    }
}

/// Cloneable handle to the track points read by the compile worker
///
/// The owner replaces the whole point set at once; the worker only ever clones the
/// current [`SourceSnapshot`], so no compile pass sees a half-replaced track.
#[derive(Debug, Clone, Default)]
pub struct TrackSource {
    inner: Arc<Mutex<SourceSnapshot>>,
}

impl TrackSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the points, colors and tour starts
    ///
    /// `colors` must hold one color per point. Returns the new generation. Time and
    /// distance series belong to the replaced points and are removed; attach new ones
    /// with [`TrackSource::set_series`].
    pub fn set_points(
        &self,
        points: impl Into<Arc<[GeoPoint]>>,
        colors: impl Into<Arc<[Color]>>,
        tour_starts: impl Into<Arc<[u32]>>,
    ) -> Result<u64> {
        let points = points.into();
        let colors = colors.into();
        if points.len() != colors.len() {
            return Err(MeshError::ColorCountMismatch {
                points: points.len(),
                colors: colors.len(),
            });
        }

        let tour_starts: Arc<[u32]> = tour_starts.into();
        let mut tour_starts = tour_starts.to_vec();
        tour_starts.retain(|&start| (start as usize) < points.len());
        tour_starts.sort_unstable();
        tour_starts.dedup();
        // The first tour always starts at the first point
        if !points.is_empty() && tour_starts.first() != Some(&0) {
            tour_starts.insert(0, 0);
        }

        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.points = points;
        guard.colors = colors;
        guard.tour_starts = Arc::from(tour_starts);
        let had_series = guard.time_series.is_some() || guard.distance_series.is_some();
        guard.time_series = None;
        guard.distance_series = None;
        guard.generation += 1;

        tracing::debug!(
            points = guard.points.len(),
            tours = guard.tour_starts.len(),
            generation = guard.generation,
            cleared_series = had_series,
            "Track source replaced"
        );
        Ok(guard.generation)
    }

    /// Attach time and distance series; lengths that do not match the points are dropped
    ///
    /// The points stay the same, so the generation and the projection cache are kept.
    /// Returns the number of series attached.
    pub fn set_series(&self, time: Option<Arc<[i64]>>, distance: Option<Arc<[f32]>>) -> usize {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let len = guard.points.len();
        let time = time.filter(|series| {
            let matches = series.len() == len;
            if !matches {
                tracing::warn!(expected = len, actual = series.len(), "Ignoring time series");
            }
            matches
        });
        let distance = distance.filter(|series| {
            let matches = series.len() == len;
            if !matches {
                tracing::warn!(expected = len, actual = series.len(), "Ignoring distance series");
            }
            matches
        });
        let attached = usize::from(time.is_some()) + usize::from(distance.is_some());
        guard.time_series = time;
        guard.distance_series = distance;
        attached
    }

    /// Remove all points
    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = guard.generation + 1;
        *guard = SourceSnapshot {
            generation,
            ..Default::default()
        };
    }

    /// Cheap copy of the current state
    pub fn snapshot(&self) -> SourceSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<GeoPoint> {
        (0..n)
            .map(|i| GeoPoint::from_degrees(47.0, 8.0 + i as f64 * 0.001))
            .collect()
    }

    #[test]
    fn test_set_points_bumps_generation() {
        let source = TrackSource::new();
        assert_eq!(source.generation(), 0);
        let generation = source
            .set_points(points(3), vec![Color::WHITE; 3], vec![0u32])
            .unwrap();
        assert_eq!(generation, 1);

        let snapshot = source.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.generation, 1);
    }

    #[test]
    fn test_color_count_mismatch() {
        let source = TrackSource::new();
        let result = source.set_points(points(3), vec![Color::WHITE; 2], vec![0u32]);
        assert!(matches!(
            result,
            Err(MeshError::ColorCountMismatch {
                points: 3,
                colors: 2
            })
        ));
        assert_eq!(source.generation(), 0);
    }

    #[test]
    fn test_tour_starts_are_normalized() {
        let source = TrackSource::new();
        source
            .set_points(points(10), vec![Color::WHITE; 10], vec![5u32, 0, 5, 42])
            .unwrap();
        let snapshot = source.snapshot();
        assert_eq!(&*snapshot.tour_starts, &[0, 5]);
        assert_eq!(snapshot.next_tour_start(0), Some(5));
        assert_eq!(snapshot.next_tour_start(1), None);

        source
            .set_points(points(10), vec![Color::WHITE; 10], vec![4u32])
            .unwrap();
        assert_eq!(&*source.snapshot().tour_starts, &[0, 4]);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_replacement() {
        let source = TrackSource::new();
        source
            .set_points(points(3), vec![Color::WHITE; 3], vec![0u32])
            .unwrap();
        let old = source.snapshot();
        source
            .set_points(points(7), vec![Color::BLACK; 7], vec![0u32])
            .unwrap();
        assert_eq!(old.len(), 3);
        assert_eq!(source.snapshot().len(), 7);
    }

    #[test]
    fn test_series_length_checked() {
        let source = TrackSource::new();
        source
            .set_points(points(3), vec![Color::WHITE; 3], vec![0u32])
            .unwrap();
        let attached = source.set_series(
            Some(Arc::from(vec![1i64, 2, 3])),
            Some(Arc::from(vec![0.0f32, 1.0])),
        );
        assert_eq!(attached, 1);
        let snapshot = source.snapshot();
        assert!(snapshot.time_series.is_some());
        assert!(snapshot.distance_series.is_none());
        // Same points, projection cache stays valid
        assert_eq!(snapshot.generation, 1);

        // New points drop the old series
        source
            .set_points(points(3), vec![Color::WHITE; 3], vec![0u32])
            .unwrap();
        assert!(source.snapshot().time_series.is_none());

        source.clear();
        assert!(source.snapshot().is_empty());
        assert_eq!(source.generation(), 3);
    }
}

//! Synthetic tours, no file formats involved

use track_mesh_lib::{Color, GeoPoint};

/// Concatenated tours ready for [`track_mesh_lib::TrackSource::set_points`]
#[derive(Debug, Clone, Default)]
pub struct SyntheticTrack {
    pub points: Vec<GeoPoint>,
    pub colors: Vec<Color>,
    pub tour_starts: Vec<u32>,
    /// Milliseconds since the start of the first tour, one per point
    pub times: Vec<i64>,
    /// Meters along the whole track, one per point
    pub distances: Vec<f32>,
}

/// Generate `num_tours` wiggly tours with `num_points` points in total
///
/// Each tour starts a little north of the previous one. Colors run from blue to red
/// along every tour, like a speed gradient.
pub fn generate(num_points: usize, num_tours: usize, base_lat: f64, base_lon: f64) -> SyntheticTrack {
    let num_tours = num_tours.clamp(1, num_points.max(1));
    let per_tour = num_points / num_tours;

    let mut track = SyntheticTrack {
        points: Vec::with_capacity(num_points),
        colors: Vec::with_capacity(num_points),
        tour_starts: Vec::with_capacity(num_tours),
        times: Vec::with_capacity(num_points),
        distances: Vec::with_capacity(num_points),
    };
    let mut distance = 0.0f32;

    for tour in 0..num_tours {
        let len = if tour + 1 == num_tours {
            num_points - per_tour * tour
        } else {
            per_tour
        };
        track.tour_starts.push(track.points.len() as u32);

        let lat0 = base_lat + tour as f64 * 0.02;
        for i in 0..len {
            let t = i as f64 / len.max(1) as f64;
            let lat = lat0 + t * 0.1 + (t * 50.0).sin() * 0.001;
            let lon = base_lon + t * 0.1 + (t * 30.0).cos() * 0.001;
            track.points.push(GeoPoint::from_degrees(lat, lon));
            track.colors.push(gradient(t));
            // One point per second, roughly 5 m apart
            track.times.push(track.times.len() as i64 * 1000);
            track.distances.push(distance);
            distance += 5.0;
        }
    }

    track
}

fn gradient(t: f64) -> Color {
    let t = t.clamp(0.0, 1.0);
    let r = (255.0 * t) as u8;
    let b = (255.0 * (1.0 - t)) as u8;
    Color::from_argb(0xFF, r, 0x40, b)
}

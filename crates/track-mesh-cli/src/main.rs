//! Headless driver: compiles a synthetic track while a scripted map pans and zooms

mod logging;
mod settings;
mod sink;
mod synthetic;

use std::time::Duration;

use track_mesh_lib::utils::world_pixels;
use track_mesh_lib::{GeoPoint, MapPosition, MeshError, TrackLayer, Viewport};

use crate::settings::{MAX_ZOOM, Settings};
use crate::sink::RecordingSink;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error("Failed to start the async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> Result<(), CliError> {
    let settings = Settings::from_cli();
    logging::setup_logging();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(settings))
}

async fn run(settings: Settings) -> Result<(), CliError> {
    let started = instant::Instant::now();
    let track = synthetic::generate(
        settings.points,
        settings.tours,
        settings.latitude,
        settings.longitude,
    );
    tracing::info!(
        points = track.points.len(),
        tours = track.tour_starts.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Synthetic track generated"
    );

    let mut layer = TrackLayer::new(settings.track_config(), RecordingSink::default())?;
    let generation = layer.set_points(track.points, track.colors, track.tour_starts)?;
    let series = layer.set_series(
        Some(track.times.into()),
        Some(track.distances.into()),
    );
    tracing::debug!(generation, series, "Track handed to the layer");

    // Start over the middle of the first tour
    let mut position = MapPosition::from_geo(
        GeoPoint::from_degrees(settings.latitude + 0.05, settings.longitude + 0.05),
        settings.zoom,
    );

    let mut adopted = 0usize;
    for frame in 0..settings.frames {
        if settings.zoom_every > 0 && frame > 0 && frame % settings.zoom_every == 0 {
            position.zoom_level = position.zoom_level.saturating_add(1).min(MAX_ZOOM);
            position.scale = position.zoom_scale() as f64;
            tracing::debug!(frame, zoom = position.zoom_level, "Zoomed in");
        }
        position.x = (position.x + settings.pan_step / world_pixels(position.zoom_level)).rem_euclid(1.0);

        let viewport = Viewport::new(position);
        let update = layer.update(&viewport)?;
        if let Some(stats) = update.adopted {
            adopted += 1;
            tracing::info!(
                frame,
                vertices = stats.vertices,
                arrows = stats.arrows,
                polylines = stats.polylines,
                accepted = stats.accepted_points,
                elapsed_ms = stats.elapsed.as_secs_f64() * 1000.0,
                "Adopted compiled track"
            );
        }

        if let Some(params) = layer.frame_params(&viewport) {
            tracing::trace!(
                frame,
                shader = ?params.shader,
                passes = params.passes.len(),
                "Frame drawn"
            );
        }

        tokio::time::sleep(Duration::from_millis(settings.frame_ms)).await;
    }

    let sink = layer.sink();
    tracing::info!(
        frames = settings.frames,
        adopted,
        uploads = sink.uploads,
        releases = sink.releases,
        resident_bytes = sink.resident_bytes,
        last_vertices = sink.last_vertices,
        last_arrow_vertices = sink.last_arrow_vertices,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Run finished"
    );

    layer.shutdown().await?;
    Ok(())
}

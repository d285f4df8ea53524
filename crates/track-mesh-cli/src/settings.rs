use clap::{ArgAction, Parser, ValueEnum};
use track_mesh_lib::{ArrowDesign, CapStyle, ColorMode, TrackConfig};

/// Deepest zoom level accepted on the command line and reached by the scripted run
pub const MAX_ZOOM: u8 = 22;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapArg {
    Butt,
    Round,
    Square,
}

impl From<CapArg> for CapStyle {
    fn from(cap: CapArg) -> Self {
        match cap {
            CapArg::Butt => CapStyle::Butt,
            CapArg::Round => CapStyle::Round,
            CapArg::Square => CapStyle::Square,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowArg {
    Wings,
    MiddleFin,
    OuterFins,
    WingsMiddleFin,
    WingsOuterFins,
}

impl From<ArrowArg> for ArrowDesign {
    fn from(design: ArrowArg) -> Self {
        match design {
            ArrowArg::Wings => ArrowDesign::Wings,
            ArrowArg::MiddleFin => ArrowDesign::MiddleFin,
            ArrowArg::OuterFins => ArrowDesign::OuterFins,
            ArrowArg::WingsMiddleFin => ArrowDesign::WingsWithMiddleFin,
            ArrowArg::WingsOuterFins => ArrowDesign::WingsWithOuterFins,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Track Mesh CLI - Compiles a synthetic track while a scripted map pans and zooms
pub struct Settings {
    /// Number of track points
    #[clap(short, long, default_value = "100000")]
    pub points: usize,

    /// Number of tours the points are split into
    #[clap(long, default_value = "3")]
    pub tours: usize,

    /// Latitude of the track start in degrees
    #[clap(long, default_value = "47.37", allow_hyphen_values = true)]
    pub latitude: f64,

    /// Longitude of the track start in degrees
    #[clap(long, default_value = "8.54", allow_hyphen_values = true)]
    pub longitude: f64,

    /// Start zoom level
    #[clap(short, long, default_value = "12", value_parser = clap::value_parser!(u8).range(0..=MAX_ZOOM as i64))]
    pub zoom: u8,

    /// Number of simulated frames
    #[clap(short, long, default_value = "240")]
    pub frames: usize,

    /// Simulated frame time in milliseconds
    #[clap(long, default_value = "16")]
    pub frame_ms: u64,

    /// Pan distance per frame in pixels
    #[clap(long, default_value = "24.0")]
    pub pan_step: f64,

    /// Zoom in by one level every this many frames (0 = never)
    #[clap(long, default_value = "60")]
    pub zoom_every: usize,

    /// Track line width in pixels
    #[clap(long, default_value = "4.0")]
    pub line_width: f32,

    /// Show outline/border around the track
    #[clap(long, default_value = "true", action = ArgAction::Set)]
    pub show_outline: bool,

    /// Line cap style
    #[clap(long, value_enum, default_value = "round")]
    pub cap: CapArg,

    /// Draw direction arrows
    #[clap(long, default_value = "false", action = ArgAction::Set)]
    pub arrows: bool,

    /// Direction arrow design
    #[clap(long, value_enum, default_value = "wings")]
    pub arrow_design: ArrowArg,

    /// Use a single line color instead of per-point colors
    #[clap(long, default_value = "false", action = ArgAction::Set)]
    pub solid: bool,

    /// Minimum time between two compile passes in milliseconds
    #[clap(long, default_value = "50")]
    pub compile_interval_ms: u64,
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Track style from the command line, defaults for everything else
    pub fn track_config(&self) -> TrackConfig {
        TrackConfig {
            line_width: self.line_width,
            outline: self.show_outline,
            cap: self.cap.into(),
            color_mode: if self.solid {
                ColorMode::Solid
            } else {
                ColorMode::Gradient
            },
            arrows: self.arrows,
            arrow_design: self.arrow_design.into(),
            compile_interval_ms: self.compile_interval_ms,
            ..Default::default()
        }
    }
}

mod app;
mod autosize;
mod config;
mod cropper;
mod decode;
mod editor;
mod layout;
mod processing;
mod session;
mod state;
mod storage;

use std::path::PathBuf;

use clap::Parser;

use app::{LaunchOptions, ManipulatorApp};
use config::AppConfig;
use state::{CropQuad, ImageUri, Photo};

/// Crop, rotate and flip a photo, then print the chosen picture as JSON.
#[derive(Debug, Parser)]
#[command(name = "manipulator", version)]
struct Cli {
    /// Local path or http(s) URL of the photo to edit.
    photo: String,

    /// Untouched original of a previously edited photo.
    #[arg(long)]
    original: Option<String>,

    /// Previously committed crop corners, as JSON.
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropQuad>,

    /// Lock the preview to a square aspect.
    #[arg(long)]
    square: bool,

    /// Print one JSON line per manipulation.
    #[arg(long)]
    events: bool,

    /// Directory for transform and crop results.
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn parse_crop(raw: &str) -> Result<CropQuad, String> {
    serde_json::from_str(raw).map_err(|err| format!("invalid crop JSON: {err}"))
}

impl Cli {
    fn photo(&self) -> Photo {
        Photo {
            uri: ImageUri::from(self.photo.as_str()),
            original_photo: self.original.as_deref().map(ImageUri::from),
            original_crop: self.crop,
        }
    }
}

fn main() -> eframe::Result {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load();
    if let Some(dir) = cli.work_dir.clone() {
        config.work_dir = Some(dir);
    }

    let width = config.window_width.unwrap_or(1080.0);
    let height = config.window_height.unwrap_or(800.0);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Manipulator")
            .with_app_id("manipulator")
            .with_inner_size([width, height]),
        ..Default::default()
    };

    let launch = LaunchOptions {
        photo: cli.photo(),
        print_events: cli.events,
        square_aspect: cli.square,
    };

    eframe::run_native(
        "manipulator",
        native_options,
        Box::new(|cc| Ok(Box::new(ManipulatorApp::new(cc, config, launch)))),
    )
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
/// A position in view-local pixel space.
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    /// Overlay order: clockwise starting at the top-left.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Four named corners of a free-form crop quadrilateral.
pub struct CropQuad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl CropQuad {
    /// The full `width` x `height` rectangle anchored at the origin.
    pub fn from_size(width: f32, height: f32) -> Self {
        Self {
            top_left: Point::new(0.0, 0.0),
            top_right: Point::new(width, 0.0),
            bottom_left: Point::new(0.0, height),
            bottom_right: Point::new(width, height),
        }
    }

    pub fn get(&self, corner: Corner) -> Point {
        match corner {
            Corner::TopLeft => self.top_left,
            Corner::TopRight => self.top_right,
            Corner::BottomRight => self.bottom_right,
            Corner::BottomLeft => self.bottom_left,
        }
    }

    pub fn map(self, f: impl Fn(Point) -> Point) -> Self {
        Self {
            top_left: f(self.top_left),
            top_right: f(self.top_right),
            bottom_left: f(self.bottom_left),
            bottom_right: f(self.bottom_right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Natural pixel dimensions of an image.
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
/// Reference to an image: a local file path or a remote URL.
pub struct ImageUri(String);

static REMOTE_SCHEMES: &[&str] = &["http", "https", "ftp"];

impl ImageUri {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for `http`, `https` and `ftp` URLs.
    pub fn is_remote(&self) -> bool {
        let Some((scheme, _)) = self.0.split_once("://") else {
            return false;
        };
        REMOTE_SCHEMES
            .iter()
            .any(|known| scheme.eq_ignore_ascii_case(known))
    }

    /// Filesystem path for local references. `file://` prefixes are stripped.
    pub fn local_path(&self) -> Option<&Path> {
        if self.is_remote() {
            return None;
        }
        Some(Path::new(self.0.strip_prefix("file://").unwrap_or(&self.0)))
    }

    /// Last path segment, without query or fragment.
    pub fn file_name(&self) -> &str {
        let trimmed = self.0.split(['?', '#']).next().unwrap_or_default();
        let name = trimmed.rsplit('/').next().unwrap_or_default();
        if name.is_empty() { "image" } else { name }
    }
}

impl From<PathBuf> for ImageUri {
    fn from(path: PathBuf) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<&str> for ImageUri {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl std::fmt::Display for ImageUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Encoding options applied to every transform result.
pub struct SaveOptions {
    /// Quality in `0.0..=1.0`; only lossy formats honour it.
    pub compress: f32,
    pub format: SaveFormat,
    /// Also return the encoded bytes as base64.
    pub base64: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compress: 1.0,
            format: SaveFormat::Png,
            base64: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One step in a transform request. Steps run in order.
pub enum Action {
    /// Scale to `width`, keeping the aspect ratio.
    Resize { width: u32 },
    /// Rotate by a multiple of 90 degrees; negative is counter-clockwise.
    Rotate { degrees: i32 },
    Flip(FlipAxis),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Crop coordinates in natural-image space plus the natural size they refer to.
pub struct CropRequest {
    #[serde(flatten)]
    pub quad: CropQuad,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
/// Component input: the photo to edit, optionally resuming an earlier edit.
pub struct Photo {
    pub uri: ImageUri,
    pub original_photo: Option<ImageUri>,
    pub original_crop: Option<CropQuad>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
/// Final result handed back when the user accepts the edit.
pub struct ChosenPicture {
    pub uri: ImageUri,
    pub initial_uri: Option<ImageUri>,
    pub base64: Option<String>,
    pub crop: Option<CropQuad>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "payload", rename_all = "lowercase")]
/// Per-action notification.
pub enum Manipulation {
    Flip(FlipAxis),
    Rotate,
    Crop(CropRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonLabels {
    pub crop: String,
    pub rotate: String,
    pub done: String,
    pub processing: String,
}

impl Default for ButtonLabels {
    fn default() -> Self {
        Self {
            crop: "Crop".to_string(),
            rotate: "Rotate".to_string(),
            done: "Done".to_string(),
            processing: "Processing".to_string(),
        }
    }
}

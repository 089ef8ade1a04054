use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, ImageReader};

use crate::state::Size;

/// Downscale decoded images to this longest-edge size for on-screen textures.
pub const PREVIEW_MAX: u32 = 1920;

/// Decode by content first, so downloads without a usable extension still
/// open; whatever the `image` crate rejects is handed to the RAW developer.
pub fn open_image(path: &Path) -> anyhow::Result<DynamicImage> {
    let decoded = ImageReader::open(path)?.with_guessed_format()?.decode();
    match decoded {
        Ok(img) => Ok(img),
        Err(err) => develop_raw(path).with_context(|| format!("not a decodable image: {err}")),
    }
}

fn develop_raw(path: &Path) -> anyhow::Result<DynamicImage> {
    let raw = rawler::decode_file(path)?;
    let intermediate = rawler::imgop::develop::RawDevelop::default().develop_intermediate(&raw)?;
    intermediate
        .to_dynamic_image()
        .ok_or_else(|| anyhow::anyhow!("raw develop produced invalid image"))
}

/// Natural dimensions, read from the header when the format is recognised.
pub fn natural_size(path: &Path) -> anyhow::Result<Size> {
    let header = ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions();
    if let Ok((width, height)) = header {
        return Ok(Size::new(width, height));
    }
    let img = open_image(path)?;
    Ok(Size::new(img.width(), img.height()))
}

/// Natural dimensions of an in-memory encoded image.
pub fn natural_size_from_bytes(bytes: &[u8]) -> anyhow::Result<Size> {
    let (width, height) = ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(Size::new(width, height))
}

/// Decode `path` into straight RGBA bytes for a texture, bounded by `PREVIEW_MAX`.
pub fn preview_rgba(path: &Path) -> anyhow::Result<(Vec<u8>, usize, usize)> {
    Ok(to_preview(open_image(path)?))
}

/// Same as [`preview_rgba`] for an encoded image already in memory.
pub fn preview_rgba_from_memory(bytes: &[u8]) -> anyhow::Result<(Vec<u8>, usize, usize)> {
    Ok(to_preview(image::load_from_memory(bytes)?))
}

fn to_preview(img: DynamicImage) -> (Vec<u8>, usize, usize) {
    let preview = if img.width() > PREVIEW_MAX || img.height() > PREVIEW_MAX {
        img.thumbnail(PREVIEW_MAX, PREVIEW_MAX)
    } else {
        img
    };
    let rgba = preview.to_rgba8();
    let w = rgba.width() as usize;
    let h = rgba.height() as usize;
    (rgba.into_raw(), w, h)
}

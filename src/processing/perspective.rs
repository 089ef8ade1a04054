use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};

use crate::state::{CropRequest, ImageUri, Point};

/// Cuts a quadrilateral out of an image and returns it as encoded bytes.
pub trait CropEngine: Send + Sync {
    fn crop(&self, request: &CropRequest, uri: &ImageUri) -> anyhow::Result<Vec<u8>>;
}

/// Rectifies the crop quadrilateral onto an upright rectangle with a
/// projective warp, then re-encodes in the source file's format.
#[derive(Debug, Default)]
pub struct PerspectiveCropper;

impl CropEngine for PerspectiveCropper {
    fn crop(&self, request: &CropRequest, uri: &ImageUri) -> anyhow::Result<Vec<u8>> {
        let path = uri
            .local_path()
            .ok_or_else(|| anyhow::anyhow!("crop source {uri} must be downloaded first"))?;
        let img = crate::decode::open_image(path)?;
        let out = rectify(&img, request)?;

        let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
        let mut bytes = Vec::new();
        let encodable = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(out.to_rgb8()),
            _ => out,
        };
        encodable.write_to(&mut Cursor::new(&mut bytes), format)?;
        Ok(bytes)
    }
}

/// Warp the requested quadrilateral of `img` into a rectangle.
///
/// Coordinates in `request` refer to a `request.width` x `request.height`
/// image; they are rescaled when the decoded image differs in size.
pub fn rectify(img: &DynamicImage, request: &CropRequest) -> anyhow::Result<DynamicImage> {
    let sx = if request.width > 0 {
        img.width() as f32 / request.width as f32
    } else {
        1.0
    };
    let sy = if request.height > 0 {
        img.height() as f32 / request.height as f32
    } else {
        1.0
    };
    let quad = request.quad.map(|p| Point::new(p.x * sx, p.y * sy));

    let out_w = distance(quad.top_left, quad.top_right)
        .max(distance(quad.bottom_left, quad.bottom_right))
        .round() as u32;
    let out_h = distance(quad.top_left, quad.bottom_left)
        .max(distance(quad.top_right, quad.bottom_right))
        .round() as u32;
    if out_w == 0 || out_h == 0 {
        anyhow::bail!("crop region has no area");
    }

    // Source corners: top-left, top-right, bottom-right, bottom-left
    let src: [(f32, f32); 4] = [
        (quad.top_left.x, quad.top_left.y),
        (quad.top_right.x, quad.top_right.y),
        (quad.bottom_right.x, quad.bottom_right.y),
        (quad.bottom_left.x, quad.bottom_left.y),
    ];
    let (w, h) = (out_w as f32, out_h as f32);
    let dst: [(f32, f32); 4] = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

    let Some(projection) = Projection::from_control_points(src, dst) else {
        anyhow::bail!("crop region is degenerate");
    };

    let rgba = img.to_rgba8();
    let mut out = RgbaImage::new(out_w, out_h);
    warp_into(
        &rgba,
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 255]),
        &mut out,
    );
    Ok(DynamicImage::ImageRgba8(out))
}

fn distance(a: Point, b: Point) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

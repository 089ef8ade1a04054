use crate::state::{CropQuad, Point, Size};

/// Height reserved above the image for the toolbar.
pub const TOP_BAR_HEIGHT: f32 = 64.0;
const MIN_EXTENT: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
/// Where the image, and therefore the crop rectangle, sits in the viewport.
pub struct CropLayout {
    pub width: f32,
    pub height: f32,
    pub top: f32,
    pub left: f32,
    /// Viewport height left for the image under the toolbar.
    pub available_height: f32,
}

/// Fit `natural` into a `viewport_w` x `viewport_h` window, contain-style,
/// centred below the toolbar.
pub fn crop_layout(natural: Size, viewport_w: f32, viewport_h: f32) -> CropLayout {
    let available_height = (viewport_h - TOP_BAR_HEIGHT).max(0.0);
    let image_ratio = if natural.width == 0 {
        1.0
    } else {
        natural.height as f32 / natural.width as f32
    };
    let crop_ratio = if viewport_w > 0.0 {
        available_height / viewport_w
    } else {
        0.0
    };

    let (width, height) = if image_ratio < crop_ratio {
        (viewport_w, viewport_w * image_ratio)
    } else if image_ratio > 0.0 {
        (available_height / image_ratio, available_height)
    } else {
        (viewport_w, 0.0)
    };

    CropLayout {
        width,
        height,
        top: (available_height - height) / 2.0,
        left: (viewport_w - width) / 2.0,
        available_height,
    }
}

/// Largest drawable extent for a laid-out image; zero extents fall back to
/// 100 px and a square lock shrinks to the shorter side.
pub fn max_sizes(width: f32, height: f32, square: bool) -> (f32, f32) {
    let mut w = if width > 0.0 { width } else { MIN_EXTENT };
    let mut h = if height > 0.0 { height } else { MIN_EXTENT };
    if square {
        let side = w.min(h);
        w = side;
        h = side;
    }
    (w, h)
}

/// Map a crop drawn on a `display_width` wide image into natural pixels.
/// Only a downscaled display is rescaled; a 1:1 or enlarged display passes through.
pub fn to_natural_space(quad: CropQuad, display_width: f32, natural_width: u32) -> CropQuad {
    if natural_width == 0 {
        return quad;
    }
    let scale = display_width / natural_width as f32;
    if scale >= 1.0 || scale <= 0.0 {
        return quad;
    }
    quad.map(|p| Point::new(p.x / scale, p.y / scale))
}

use std::path::PathBuf;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;

use crate::state::{Action, FlipAxis, ImageUri, SaveFormat, SaveOptions};

#[derive(Debug, Clone, PartialEq)]
/// Result of a transform: the new image plus its size and optional payload.
pub struct Manipulated {
    pub uri: ImageUri,
    pub width: u32,
    pub height: u32,
    pub base64: Option<String>,
}

/// Applies an ordered list of actions to an image and saves the result.
pub trait ImageManipulator: Send + Sync {
    fn manipulate(
        &self,
        uri: &ImageUri,
        actions: &[Action],
        save: &SaveOptions,
    ) -> anyhow::Result<Manipulated>;
}

/// Transforms local files with the `image` crate, writing results into `work_dir`.
pub struct LocalManipulator {
    work_dir: PathBuf,
}

impl LocalManipulator {
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }
}

impl ImageManipulator for LocalManipulator {
    fn manipulate(
        &self,
        uri: &ImageUri,
        actions: &[Action],
        save: &SaveOptions,
    ) -> anyhow::Result<Manipulated> {
        let path = uri
            .local_path()
            .ok_or_else(|| anyhow::anyhow!("cannot transform remote image {uri} in place"))?;
        let img = crate::decode::open_image(path)?;
        let out = apply_actions(img, actions);
        let bytes = encode(&out, save)?;

        std::fs::create_dir_all(&self.work_dir)?;
        let dest = self.work_dir.join(format!(
            "{}.{}",
            uuid::Uuid::new_v4(),
            save.format.extension()
        ));
        std::fs::write(&dest, &bytes)?;
        tracing::debug!(
            source = %uri,
            dest = %dest.display(),
            width = out.width(),
            height = out.height(),
            "image transformed"
        );

        Ok(Manipulated {
            uri: ImageUri::from(dest),
            width: out.width(),
            height: out.height(),
            base64: save.base64.then(|| STANDARD.encode(&bytes)),
        })
    }
}

/// Run `actions` in order.
pub fn apply_actions(img: DynamicImage, actions: &[Action]) -> DynamicImage {
    actions.iter().fold(img, |out, action| match *action {
        Action::Resize { width } => resize_to_width(out, width),
        Action::Rotate { degrees } => match degrees.rem_euclid(360) {
            90 => out.rotate90(),
            180 => out.rotate180(),
            270 => out.rotate270(),
            _ => out,
        },
        Action::Flip(FlipAxis::Horizontal) => out.fliph(),
        Action::Flip(FlipAxis::Vertical) => out.flipv(),
    })
}

fn resize_to_width(img: DynamicImage, width: u32) -> DynamicImage {
    if width == 0 || width == img.width() || img.width() == 0 {
        return img;
    }
    let scale = width as f32 / img.width() as f32;
    let height = ((img.height() as f32 * scale).round() as u32).max(1);
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Encode per `save`. `compress` maps to JPEG quality; PNG and WebP are lossless.
pub fn encode(img: &DynamicImage, save: &SaveOptions) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    match save.format {
        SaveFormat::Jpeg => {
            let quality = (save.compress.clamp(0.0, 1.0) * 100.0).round() as u8;
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        }
        SaveFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buf,
                CompressionType::Default,
                PngFilterType::Adaptive,
            );
            img.write_with_encoder(encoder)?;
        }
        SaveFormat::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut buf);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)?;
        }
    }
    Ok(buf)
}

//! Still-image loading for the filter engine.
//!
//! Runs off the render thread: decode, orientation correction, then a resize to the output
//! size according to the [`ScaleType`]. The result is ready for `GpuImage::set_image`.
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use gpuimg_core::{EngineError, Rotation, ScaleType};
use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbaImage};

#[derive(thiserror::Error, Debug)]
pub enum ImageLoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has no pixels")]
    Empty,

    #[error("rotation of {0} degrees is not a quarter turn")]
    Rotation(i32),
}

impl From<ImageLoadError> for EngineError {
    fn from(e: ImageLoadError) -> Self {
        match e {
            ImageLoadError::Io { path, source } => EngineError::Io { path, source },
            other => EngineError::Other(other.to_string()),
        }
    }
}

/// How a loaded image is fitted before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Target surface size. `None` keeps the image's own size.
    pub output: Option<(u32, u32)>,
    pub scale_type: ScaleType,
    /// Clockwise rotation applied after decoding. `None` uses the file's EXIF orientation.
    pub rotation_degrees: Option<i32>,
    /// Neither side of the result exceeds this.
    pub max_texture_size: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            output: None,
            scale_type: ScaleType::CenterCrop,
            rotation_degrees: None,
            max_texture_size: 2048,
        }
    }
}

impl LoadOptions {
    pub fn for_output(w: u32, h: u32, scale_type: ScaleType) -> Self {
        Self {
            output: Some((w, h)),
            scale_type,
            ..Self::default()
        }
    }
}

/// Size the image is resized to before an optional crop.
///
/// Center-crop keeps both sides at least as large as the output; center-inside keeps both
/// sides at most as large.
pub fn scale_size(image: (u32, u32), output: (u32, u32), scale_type: ScaleType) -> (u32, u32) {
    let (w, h) = (image.0 as f32, image.1 as f32);
    let (out_w, out_h) = (output.0 as f32, output.1 as f32);
    let width_ratio = w / out_w;
    let height_ratio = h / out_h;

    let adjust_width = match scale_type {
        ScaleType::CenterCrop => width_ratio > height_ratio,
        ScaleType::CenterInside => width_ratio < height_ratio,
    };
    let (new_w, new_h) = if adjust_width {
        (out_h / h * w, out_h)
    } else {
        (out_w, out_w / w * h)
    };
    (new_w.round().max(1.0) as u32, new_h.round().max(1.0) as u32)
}

fn clamp_to(size: (u32, u32), max: u32) -> (u32, u32) {
    let longest = size.0.max(size.1);
    if max == 0 || longest <= max {
        return size;
    }
    let scale = max as f32 / longest as f32;
    (
        ((size.0 as f32 * scale).round() as u32).clamp(1, max),
        ((size.1 as f32 * scale).round() as u32).clamp(1, max),
    )
}

fn rotate(image: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Normal => image,
        Rotation::Rotation90 => image.rotate90(),
        Rotation::Rotation180 => image.rotate180(),
        Rotation::Rotation270 => image.rotate270(),
    }
}

/// Rotate, resize and (for center-crop) crop a decoded image.
pub fn prepare(
    image: DynamicImage,
    rotation: Rotation,
    options: &LoadOptions,
) -> Result<RgbaImage, ImageLoadError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ImageLoadError::Empty);
    }
    let rgba = rotate(image, rotation).into_rgba8();
    let Some(output) = options.output.filter(|(w, h)| *w > 0 && *h > 0) else {
        let (w, h) = clamp_to(rgba.dimensions(), options.max_texture_size);
        if (w, h) == rgba.dimensions() {
            return Ok(rgba);
        }
        return Ok(imageops::resize(&rgba, w, h, FilterType::Triangle));
    };

    let (new_w, new_h) = scale_size(rgba.dimensions(), output, options.scale_type);
    let mut scaled = if (new_w, new_h) == rgba.dimensions() {
        rgba
    } else {
        imageops::resize(&rgba, new_w, new_h, FilterType::Triangle)
    };

    if options.scale_type == ScaleType::CenterCrop {
        let crop_w = output.0.min(new_w);
        let crop_h = output.1.min(new_h);
        let x = (new_w - crop_w) / 2;
        let y = (new_h - crop_h) / 2;
        let cropped = imageops::crop_imm(&scaled, x, y, crop_w, crop_h).to_image();
        scaled = cropped;
    }

    let (w, h) = clamp_to(scaled.dimensions(), options.max_texture_size);
    if (w, h) != scaled.dimensions() {
        scaled = imageops::resize(&scaled, w, h, FilterType::Triangle);
    }
    Ok(scaled)
}

fn rotation_from_orientation(orientation: Orientation) -> Rotation {
    match orientation {
        Orientation::Rotate90 => Rotation::Rotation90,
        Orientation::Rotate180 => Rotation::Rotation180,
        Orientation::Rotate270 => Rotation::Rotation270,
        // Mirrored orientations load unrotated.
        _ => Rotation::Normal,
    }
}

/// Decode `path` and fit it per `options`.
pub fn load_resized(path: impl AsRef<Path>, options: &LoadOptions) -> Result<RgbaImage, ImageLoadError> {
    let path = path.as_ref();
    let reader = ImageReader::open(path).map_err(|source| ImageLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = reader.with_guessed_format().map_err(|source| ImageLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = reader.into_decoder()?;

    let rotation = match options.rotation_degrees {
        Some(degrees) => Rotation::from_degrees(degrees).ok_or(ImageLoadError::Rotation(degrees))?,
        None => rotation_from_orientation(decoder.orientation().unwrap_or(Orientation::NoTransforms)),
    };
    let image = DynamicImage::from_decoder(decoder)?;
    tracing::debug!(
        path = %path.display(),
        w = image.width(),
        h = image.height(),
        rotation = rotation.degrees(),
        "image decoded"
    );
    prepare(image, rotation, options)
}

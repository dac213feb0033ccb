//! Image frames.
//!
//! The pipeline always runs in the same order:
//! 1. flatten to 8-bit luma (transparent pixels become white),
//! 2. rotate about the image centre into an enlarged bounding box,
//! 3. resize to exactly the frame size (aspect ratio is not kept),
//! 4. Floyd-Steinberg dither to black and white,
//! 5. pack, black pixels on.

use std::path::Path;

use anyhow::Context;
use image::{
    imageops::{self, BiLevel, FilterType},
    DynamicImage, GrayImage, Luma, RgbImage, RgbaImage,
};
use lily58_oled_core::{Bitmap, Canvas, Error, Geometry, Rotation};
use tracing::debug;

const BACKGROUND: Luma<u8> = Luma([u8::MAX]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Luma8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub const fn channels(self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            PixelFormat::Luma8 => "luma8",
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::Rgba8 => "rgba8",
        }
    }
}

/// Raw samples, row-major without padding.
#[derive(Debug, Clone, Copy)]
pub struct RawImage<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl<'a> RawImage<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    fn to_dynamic(self) -> Result<DynamicImage, Error> {
        check_not_empty(self.width, self.height)?;
        let expected = self.width as usize * self.height as usize * self.format.channels();
        let malformed = || Error::MalformedImage {
            width: self.width,
            height: self.height,
            format: self.format.name(),
            expected,
            actual: self.data.len(),
        };
        if self.data.len() != expected {
            return Err(malformed());
        }
        let data = self.data.to_vec();
        let (w, h) = (self.width, self.height);
        let image = match self.format {
            PixelFormat::Luma8 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            PixelFormat::Rgb8 => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            PixelFormat::Rgba8 => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
        };
        image.ok_or_else(malformed)
    }
}

fn check_not_empty(width: u32, height: u32) -> Result<(), Error> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    Ok(())
}

pub fn encode_image(image: &RawImage<'_>, rotation: Rotation, geometry: Geometry) -> Result<Bitmap, Error> {
    let image = image.to_dynamic()?;
    encode_dynamic_image(&image, rotation, geometry)
}

pub fn encode_dynamic_image(
    image: &DynamicImage,
    rotation: Rotation,
    geometry: Geometry,
) -> Result<Bitmap, Error> {
    if geometry.pixels() == 0 {
        return Err(Error::InvalidGeometry {
            width: geometry.width,
            height: geometry.height,
        });
    }
    check_not_empty(image.width(), image.height())?;
    let gray = flatten(image);
    debug!(width = gray.width(), height = gray.height(), "flattened to luma");

    let rotated = rotate_expand(&gray, rotation);
    debug!(width = rotated.width(), height = rotated.height(), %rotation, "rotated");

    let mut fitted = if rotated.dimensions() == (geometry.width, geometry.height) {
        rotated
    } else {
        imageops::resize(&rotated, geometry.width, geometry.height, FilterType::Triangle)
    };

    imageops::dither(&mut fitted, &BiLevel);
    debug!("dithered");

    let mut canvas = Canvas::new(geometry);
    for (x, y, Luma([luma])) in fitted.enumerate_pixels() {
        canvas.set(x as i32, y as i32, *luma < 0x80);
    }
    Ok(canvas.pack())
}

/// Loads and encodes an image file.
pub fn encode_file(path: impl AsRef<Path>, rotation: Rotation, geometry: Geometry) -> anyhow::Result<Bitmap> {
    let path = path.as_ref();
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    debug!("opened image {}", path.display());
    Ok(encode_dynamic_image(&image, rotation, geometry)?)
}

/// Luma with alpha composited over white.
fn flatten(image: &DynamicImage) -> GrayImage {
    if !image.color().has_alpha() {
        return image.to_luma8();
    }
    let with_alpha = image.to_luma_alpha8();
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [luma, alpha] = with_alpha.get_pixel(x, y).0;
        let (luma, alpha) = (u32::from(luma), u32::from(alpha));
        let blended = (luma * alpha + u32::from(u8::MAX) * (255 - alpha) + 127) / 255;
        Luma([blended as u8])
    })
}

/// Rotates clockwise about the image centre. The result grows to the
/// rotated bounding box and uncovered corners are filled with white.
pub fn rotate_expand(image: &GrayImage, rotation: Rotation) -> GrayImage {
    match rotation {
        Rotation::Deg0 => image.clone(),
        Rotation::Deg90 => imageops::rotate90(image),
        Rotation::Deg180 => imageops::rotate180(image),
        Rotation::Deg270 => imageops::rotate270(image),
        diagonal => {
            let src = image.dimensions();
            let dst = diagonal.bounding_box(src.0, src.1);
            GrayImage::from_fn(dst.0, dst.1, |x, y| {
                let (sx, sy) = diagonal.source_of((x as i32, y as i32), src, dst);
                if sx >= 0 && sy >= 0 && (sx as u32) < src.0 && (sy as u32) < src.1 {
                    *image.get_pixel(sx as u32, sy as u32)
                } else {
                    BACKGROUND
                }
            })
        }
    }
}

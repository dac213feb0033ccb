//! Monochrome canvas and its packed [`Bitmap`] form.
//!
//! # Bit layout
//! Pixels are numbered row-major, `i = y * width + x`, continuously across
//! rows (no per-row padding). Pixel `i` lives in byte `i / 8` at bit
//! `7 - i % 8` (MSB first). A set bit means the pixel is on.

use std::fmt::{self, Display};

use crate::rotation::Rotation;

pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    /// The 128x32 OLED of a Lily58 half.
    pub const DEFAULT: Geometry = Geometry::new(WIDTH, HEIGHT);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length of a packed [`Bitmap`] for this geometry.
    pub const fn bitmap_len(&self) -> usize {
        self.pixels().div_ceil(8)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    geometry: Geometry,
    pixels: Vec<bool>,
}

impl Canvas {
    /// A blank (all off) canvas.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            pixels: vec![false; geometry.pixels()],
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        self.geometry
            .contains(x, y)
            .then(|| y as usize * self.geometry.width as usize + x as usize)
    }

    /// `None` outside the canvas.
    pub fn get(&self, x: i32, y: i32) -> Option<bool> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Points outside the canvas are ignored.
    pub fn set(&mut self, x: i32, y: i32, on: bool) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = on;
        }
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&on| !on)
    }

    pub fn count_on(&self) -> usize {
        self.pixels.iter().filter(|&&on| on).count()
    }

    /// Rotates about the canvas centre, clipping whatever leaves the bounds.
    pub fn rotated(&self, rotation: Rotation) -> Canvas {
        if rotation == Rotation::Deg0 {
            return self.clone();
        }
        rotation.resample(self.geometry, |x, y| self.get(x, y).unwrap_or(false))
    }

    pub fn pack(&self) -> Bitmap {
        let mut bytes = vec![0u8; self.geometry.bitmap_len()];
        for (i, &on) in self.pixels.iter().enumerate() {
            if on {
                bytes[i / 8] |= 1 << (7 - i % 8);
            }
        }
        Bitmap {
            geometry: self.geometry,
            bytes,
        }
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(Geometry::DEFAULT)
    }
}

/// Text preview, `#` for on and `.` for off.
impl Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.pixels.chunks(self.geometry.width.max(1) as usize) {
            for &on in row {
                f.write_str(if on { "#" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(feature = "embedded_graphics")]
mod embedded_graphics_impls {
    use std::convert::Infallible;

    use embedded_graphics_core::{image::GetPixel, pixelcolor::BinaryColor, prelude::*};

    use super::Canvas;

    impl OriginDimensions for Canvas {
        fn size(&self) -> Size {
            Size::new(self.geometry.width, self.geometry.height)
        }
    }

    impl DrawTarget for Canvas {
        type Color = BinaryColor;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            for Pixel(point, color) in pixels {
                self.set(point.x, point.y, color.is_on());
            }
            Ok(())
        }
    }

    impl GetPixel for Canvas {
        type Color = BinaryColor;

        fn pixel(&self, p: Point) -> Option<Self::Color> {
            self.get(p.x, p.y).map(BinaryColor::from)
        }
    }
}

/// Packed 1-bit frame, exactly [`Geometry::bitmap_len`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    geometry: Geometry,
    bytes: Vec<u8>,
}

impl Bitmap {
    /// Wraps already packed bytes, `None` if the length does not match `geometry`.
    pub fn from_bytes(geometry: Geometry, bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() == geometry.bitmap_len()).then_some(Self { geometry, bytes })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn unpack(&self) -> Canvas {
        let pixels = (0..self.geometry.pixels())
            .map(|i| self.bytes[i / 8] & (1 << (7 - i % 8)) != 0)
            .collect();
        Canvas {
            geometry: self.geometry,
            pixels,
        }
    }
}

impl AsRef<[u8]> for Bitmap {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

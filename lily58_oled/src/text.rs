//! Text frames.

use std::{collections::HashSet, convert::Infallible};

use embedded_graphics::{
    mono_font::{MonoFont, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::Rectangle,
    text::{Baseline, Text},
};
use lily58_oled_core::{Bitmap, Geometry, Rotation};
use tracing::debug;

/// Renders `text` with its top-left corner at `(x, y)`, rotates it about the
/// centre of the frame and packs it.
///
/// Nothing is wrapped or truncated before rotation: glyphs are rendered at
/// full size and only clipped by the frame afterwards, so text hanging off
/// one edge can rotate into view.
pub fn encode_text(
    text: &str,
    x: i32,
    y: i32,
    rotation: Rotation,
    font: &MonoFont<'_>,
    geometry: Geometry,
) -> Bitmap {
    let mut layer = GlyphLayer::default();
    let style = MonoTextStyle::new(font, BinaryColor::On);
    // glyphs are laid out at the origin, the offset is applied when sampling
    match Text::with_baseline(text, Point::zero(), style, Baseline::Top).draw(&mut layer) {
        Ok(_) => {}
        Err(never) => match never {},
    }
    debug!(glyph_pixels = layer.on.len(), %rotation, "rendered text");

    rotation
        .resample(geometry, |sx, sy| layer.contains_offset(sx, sy, x, y))
        .pack()
}

/// Glyph pixels before rotation and clipping.
#[derive(Default)]
struct GlyphLayer {
    on: HashSet<(i32, i32)>,
}

impl GlyphLayer {
    /// Reach of the layer in every direction from the origin.
    const EXTENT: i32 = 1 << 15;

    /// Whether frame pixel `(sx, sy)` is covered by the text placed at `(x, y)`.
    fn contains_offset(&self, sx: i32, sy: i32, x: i32, y: i32) -> bool {
        let gx = i32::try_from(i64::from(sx) - i64::from(x));
        let gy = i32::try_from(i64::from(sy) - i64::from(y));
        match (gx, gy) {
            (Ok(gx), Ok(gy)) => self.on.contains(&(gx, gy)),
            _ => false,
        }
    }
}

impl Dimensions for GlyphLayer {
    fn bounding_box(&self) -> Rectangle {
        let side = 2 * Self::EXTENT as u32;
        Rectangle::new(
            Point::new(-Self::EXTENT, -Self::EXTENT),
            Size::new(side, side),
        )
    }
}

impl DrawTarget for GlyphLayer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if color.is_on() {
                self.on.insert((point.x, point.y));
            } else {
                self.on.remove(&(point.x, point.y));
            }
        }
        Ok(())
    }
}

//! Draw text or images for the Lily58 OLEDs and upload them.
//!
//! # Examples
//! ```no_run
//! # use lily58_oled::{FrameEncoder, Rotation, Target};
//! # fn main() -> anyhow::Result<()> {
//! let encoder = FrameEncoder::default();
//! let frame = encoder.encode_text("Lily58", 0, 0, Rotation::try_from(180)?);
//!
//! // Build the reports without sending anything.
//! let upload = encoder.upload(&frame, Target::Left)?;
//! for chunk in upload.iter() {
//!     let report = chunk.to_report()?;
//!     // hand `report` to the transport...
//! #   let _ = report;
//! }
//!
//! // Or deliver over raw HID (feature `hid`):
//! // let mut link = lily58_oled::hid::open_link(Default::default())?;
//! // link.upload(frame.as_bytes(), Target::Left)?;
//! # Ok(())
//! # }
//! ```

pub mod raster;
pub mod text;

#[cfg(feature = "hid")]
pub mod hid;

use std::path::Path;

use embedded_graphics::mono_font::{ascii::FONT_6X10, MonoFont};
pub use lily58_oled_core::{
    Bitmap, Canvas, Chunk, ChunkIndex, Error, Geometry, Link, Reassembler, ReportConfig,
    Rotation, Target, Transport, TransportError, Upload, UploadState,
};
pub use raster::{PixelFormat, RawImage};

#[derive(Clone, Copy)]
pub struct Config {
    pub geometry: Geometry,
    pub font: &'static MonoFont<'static>,
    pub report: ReportConfig,
}

impl Config {
    pub const DEFAULT: Config = Config {
        geometry: Geometry::DEFAULT,
        font: &FONT_6X10,
        report: ReportConfig::DEFAULT,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("geometry", &self.geometry)
            .field("font", &self.font.character_size)
            .field("report", &self.report)
            .finish()
    }
}

/// Encodes frames for one display geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder {
    config: Config,
}

impl FrameEncoder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn encode_text(&self, text: &str, x: i32, y: i32, rotation: Rotation) -> Bitmap {
        text::encode_text(text, x, y, rotation, self.config.font, self.config.geometry)
    }

    pub fn encode_image(&self, image: &RawImage<'_>, rotation: Rotation) -> Result<Bitmap, Error> {
        raster::encode_image(image, rotation, self.config.geometry)
    }

    pub fn encode_file(&self, path: impl AsRef<Path>, rotation: Rotation) -> anyhow::Result<Bitmap> {
        raster::encode_file(path, rotation, self.config.geometry)
    }

    /// The reports carrying `bitmap` to `target`.
    pub fn upload<'a>(&self, bitmap: &'a Bitmap, target: Target) -> Result<Upload<'a>, Error> {
        Upload::new(bitmap.as_bytes(), target, self.config.report)
    }
}

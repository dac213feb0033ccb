//! Frame format and chunked upload protocol for the Lily58 OLEDs.
//!
//! - [`canvas`]: the monochrome [`Canvas`] and its packed [`Bitmap`].
//! - [`rotation`]: the eight 45° [`Rotation`]s.
//! - [`chunk`]: splitting a bitmap into reports ([`Upload`]) and putting it
//!   back together ([`Reassembler`]).
//! - [`link`]: driving an upload over a [`Transport`].

pub mod canvas;
pub mod chunk;
pub mod error;
pub mod link;
pub mod rotation;

pub use canvas::{Bitmap, Canvas, Geometry};
pub use chunk::{Chunk, ChunkIndex, Chunks, Reassembler, ReportConfig, Target, Upload};
pub use error::{Error, TimeOutError, TransportError};
pub use link::{DelayStep, Delivery, Link, Transport, UploadState};
pub use rotation::Rotation;

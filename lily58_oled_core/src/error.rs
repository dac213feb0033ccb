use std::time::Duration;

use crate::chunk::{ChunkIndex, ReportConfig, HEADER_LEN, MAX_DATA_CHUNKS};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid rotation: {0}° is not one of 0°, 45°, 90°, ..., 315°")]
    InvalidRotation(i32),

    #[error("empty image: {width}x{height} has no pixels")]
    EmptyImage { width: u32, height: u32 },

    #[error("invalid frame geometry: {width}x{height} has no pixels")]
    InvalidGeometry { width: u32, height: u32 },

    #[error(
        "malformed image: {width}x{height} {format} needs {expected} bytes, got {actual}"
    )]
    MalformedImage {
        width: u32,
        height: u32,
        format: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(
        "payload too large: a {capacity}-byte report cannot hold the {}-byte header and one payload byte",
        HEADER_LEN
    )]
    PayloadTooLarge { capacity: usize },

    #[error(
        "bitmap too large: {len} bytes need {chunks} chunks, an upload carries at most {}",
        MAX_DATA_CHUNKS
    )]
    BitmapTooLarge { len: usize, chunks: usize },

    #[error("report config mismatch: link sends {link:?}, upload was built for {upload:?}")]
    ReportConfigMismatch {
        link: ReportConfig,
        upload: ReportConfig,
    },

    #[error("invalid target: {0:#04x}, expected 0x01 (left) or 0x02 (right)")]
    InvalidTarget(u8),

    #[error("malformed report: {0}")]
    MalformedReport(&'static str),

    #[error("chunk out of sequence: expected {expected}, got {got}")]
    OutOfSequence { expected: ChunkIndex, got: ChunkIndex },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("device disconnected")]
    Disconnected,

    #[error(transparent)]
    TimeOut(#[from] TimeOutError),

    #[error("transport i/o: {0}")]
    Io(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, thiserror::Error)]
#[error("timeout: {:?}, elapsed: {:?}", self.timeout, self.elapsed)]
pub struct TimeOutError {
    pub timeout: Duration,
    pub elapsed: Duration,
}

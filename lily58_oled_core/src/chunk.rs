//! Chunked upload of a packed bitmap over fixed-size reports.
//!
//! Report layout:
//! - `0`: report selector
//! - `1`: command tag
//! - `2`: target, `0x01` left / `0x02` right
//! - `3`: sequence index, `0x00..=0xFE` for data, `0xFF` for the completion sentinel
//! - `4..`: payload, zero padded up to the report capacity (empty on the sentinel)

use std::{
    fmt::{self, Display},
    iter::FusedIterator,
    slice,
};

use crate::error::Error;

/// Report selector, command, target and index.
pub const HEADER_LEN: usize = 4;

/// Index carried by the completion report.
pub const SENTINEL_INDEX: u8 = 0xFF;

/// Data chunks are numbered `0x00..=0xFE`.
pub const MAX_DATA_CHUNKS: usize = SENTINEL_INDEX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportConfig {
    pub report_id: u8,
    pub command: u8,
    /// Total report size including the header.
    pub capacity: usize,
}

impl ReportConfig {
    /// VIA raw HID: report 0, custom OLED command `0x40`, 32-byte reports.
    pub const DEFAULT: ReportConfig = ReportConfig::new(0x00, 0x40, 32);

    pub const fn new(report_id: u8, command: u8, capacity: usize) -> Self {
        Self {
            report_id,
            command,
            capacity,
        }
    }

    /// Payload bytes per report.
    pub fn payload_capacity(&self) -> Result<usize, Error> {
        if self.capacity <= HEADER_LEN {
            return Err(Error::PayloadTooLarge {
                capacity: self.capacity,
            });
        }
        Ok(self.capacity - HEADER_LEN)
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Left,
    Right,
}

impl Target {
    pub const fn wire_value(self) -> u8 {
        match self {
            Target::Left => 0x01,
            Target::Right => 0x02,
        }
    }
}

impl TryFrom<u8> for Target {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Target::Left),
            0x02 => Ok(Target::Right),
            other => Err(Error::InvalidTarget(other)),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Left => f.write_str("left"),
            Target::Right => f.write_str("right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkIndex {
    Data(u8),
    Sentinel,
}

impl ChunkIndex {
    pub const fn wire_value(self) -> u8 {
        match self {
            ChunkIndex::Data(i) => i,
            ChunkIndex::Sentinel => SENTINEL_INDEX,
        }
    }

    pub const fn from_wire(value: u8) -> Self {
        match value {
            SENTINEL_INDEX => ChunkIndex::Sentinel,
            i => ChunkIndex::Data(i),
        }
    }
}

impl Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkIndex::Data(i) => write!(f, "chunk {i}"),
            ChunkIndex::Sentinel => f.write_str("completion sentinel"),
        }
    }
}

/// One report worth of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub config: ReportConfig,
    pub target: Target,
    pub index: ChunkIndex,
    pub payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn is_sentinel(&self) -> bool {
        self.index == ChunkIndex::Sentinel
    }

    /// Writes the full, zero padded report into `buffer`.
    ///
    /// Returns the number of bytes written, always the report capacity.
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, Error> {
        let capacity = self.config.capacity;
        if self.payload.len() > self.config.payload_capacity()? || buffer.len() < capacity {
            return Err(Error::PayloadTooLarge { capacity });
        }
        let report = &mut buffer[..capacity];
        report[0] = self.config.report_id;
        report[1] = self.config.command;
        report[2] = self.target.wire_value();
        report[3] = self.index.wire_value();
        let (payload, padding) = report[HEADER_LEN..].split_at_mut(self.payload.len());
        payload.copy_from_slice(self.payload);
        padding.fill(0);
        Ok(capacity)
    }

    pub fn to_report(&self) -> Result<Vec<u8>, Error> {
        let mut report = vec![0; self.config.capacity];
        self.encode(&mut report)?;
        Ok(report)
    }

    /// Parses a report. Padding cannot be told apart from payload, so data
    /// chunks carry the whole payload area; the sentinel carries none.
    pub fn decode(report: &'a [u8], config: ReportConfig) -> Result<Self, Error> {
        config.payload_capacity()?;
        if report.len() != config.capacity {
            return Err(Error::MalformedReport("report length does not match capacity"));
        }
        if report[0] != config.report_id {
            return Err(Error::MalformedReport("unexpected report selector"));
        }
        if report[1] != config.command {
            return Err(Error::MalformedReport("not an OLED upload command"));
        }
        let target = Target::try_from(report[2])?;
        let index = ChunkIndex::from_wire(report[3]);
        let payload = match index {
            ChunkIndex::Data(_) => &report[HEADER_LEN..],
            ChunkIndex::Sentinel => &[],
        };
        Ok(Self {
            config,
            target,
            index,
            payload,
        })
    }
}

/// Everything needed to send one bitmap to one display.
///
/// Building an upload validates it and transmits nothing; [`Upload::iter`]
/// can be called any number of times and always yields the same chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upload<'a> {
    bitmap: &'a [u8],
    target: Target,
    config: ReportConfig,
    payload_capacity: usize,
}

impl<'a> Upload<'a> {
    pub fn new(bitmap: &'a [u8], target: Target, config: ReportConfig) -> Result<Self, Error> {
        let payload_capacity = config.payload_capacity()?;
        let chunks = bitmap.len().div_ceil(payload_capacity);
        if chunks > MAX_DATA_CHUNKS {
            return Err(Error::BitmapTooLarge {
                len: bitmap.len(),
                chunks,
            });
        }
        Ok(Self {
            bitmap,
            target,
            config,
            payload_capacity,
        })
    }

    /// Same as [`Upload::new`] with a raw wire target value.
    pub fn with_raw_target(bitmap: &'a [u8], target: u8, config: ReportConfig) -> Result<Self, Error> {
        Self::new(bitmap, Target::try_from(target)?, config)
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn config(&self) -> ReportConfig {
        self.config
    }

    pub fn bitmap(&self) -> &'a [u8] {
        self.bitmap
    }

    pub fn data_chunks(&self) -> usize {
        self.bitmap.len().div_ceil(self.payload_capacity)
    }

    /// Data chunks plus the sentinel.
    pub fn len(&self) -> usize {
        self.data_chunks() + 1
    }

    /// Never true, every upload ends with a sentinel.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> Chunks<'a> {
        Chunks {
            data: self.bitmap.chunks(self.payload_capacity),
            next_index: 0,
            target: self.target,
            config: self.config,
            sentinel_sent: false,
        }
    }
}

impl<'a> IntoIterator for Upload<'a> {
    type Item = Chunk<'a>;
    type IntoIter = Chunks<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &Upload<'a> {
    type Item = Chunk<'a>;
    type IntoIter = Chunks<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    data: slice::Chunks<'a, u8>,
    next_index: u8,
    target: Target,
    config: ReportConfig,
    sentinel_sent: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(payload) = self.data.next() {
            // `Upload::new` bounds the number of data chunks below the sentinel
            let index = ChunkIndex::Data(self.next_index);
            self.next_index += 1;
            return Some(Chunk {
                config: self.config,
                target: self.target,
                index,
                payload,
            });
        }
        if self.sentinel_sent {
            return None;
        }
        self.sentinel_sent = true;
        Some(Chunk {
            config: self.config,
            target: self.target,
            index: ChunkIndex::Sentinel,
            payload: &[],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.data.len() + usize::from(!self.sentinel_sent);
        (len, Some(len))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl FusedIterator for Chunks<'_> {}

/// Receiving end of an upload, rebuilds the bitmap from reports in order.
#[derive(Debug, Clone)]
pub struct Reassembler {
    target: Target,
    config: ReportConfig,
    expected_len: usize,
    buffer: Vec<u8>,
    next_index: u8,
}

impl Reassembler {
    pub fn new(target: Target, expected_len: usize, config: ReportConfig) -> Result<Self, Error> {
        config.payload_capacity()?;
        Ok(Self {
            target,
            config,
            expected_len,
            buffer: Vec::with_capacity(expected_len),
            next_index: 0,
        })
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_index = 0;
    }

    /// Feeds one report.
    ///
    /// Returns `Ok(Some(bitmap))` once the sentinel completes the upload and
    /// `Ok(None)` while more chunks are needed. Any error resets the state,
    /// the sender has to restart from chunk 0.
    pub fn feed(&mut self, report: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let result = self.accept(report);
        if !matches!(result, Ok(None)) {
            self.reset();
        }
        result
    }

    fn accept(&mut self, report: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let chunk = Chunk::decode(report, self.config)?;
        if chunk.target != self.target {
            return Err(Error::MalformedReport("report addressed to the other display"));
        }
        let remaining = self.expected_len - self.buffer.len();
        match chunk.index {
            ChunkIndex::Data(i) if i == self.next_index && remaining > 0 => {
                let take = remaining.min(chunk.payload.len());
                self.buffer.extend_from_slice(&chunk.payload[..take]);
                self.next_index += 1;
                Ok(None)
            }
            ChunkIndex::Sentinel if remaining == 0 => Ok(Some(std::mem::take(&mut self.buffer))),
            got => Err(Error::OutOfSequence {
                expected: if remaining == 0 {
                    ChunkIndex::Sentinel
                } else {
                    ChunkIndex::Data(self.next_index)
                },
                got,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lily58_frame_is_19_chunks_and_sentinel() {
        let bitmap = [0xA5u8; 512];
        let upload = Upload::new(&bitmap, Target::Left, ReportConfig::DEFAULT).unwrap();
        let chunks: Vec<_> = upload.iter().collect();

        assert_eq!(upload.data_chunks(), 19);
        assert_eq!(chunks.len(), 20);
        assert_eq!(upload.iter().len(), 20);
        assert_eq!(chunks[0].index, ChunkIndex::Data(0));
        assert_eq!(chunks[18].index, ChunkIndex::Data(18));
        assert_eq!(chunks[18].payload.len(), 512 - 18 * 28);
        assert_eq!(chunks[19].index.wire_value(), 0xFF);
        assert!(chunks[19].payload.is_empty());
    }

    #[test]
    fn test_report_layout() {
        let bitmap: Vec<u8> = (1..=30).collect();
        let upload = Upload::new(&bitmap, Target::Right, ReportConfig::DEFAULT).unwrap();
        let reports: Vec<_> = upload.iter().map(|c| c.to_report().unwrap()).collect();

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.len() == 32));
        assert_eq!(&reports[0][..4], &[0x00, 0x40, 0x02, 0x00]);
        assert_eq!(&reports[0][4..], &bitmap[..28]);
        assert_eq!(&reports[1][..6], &[0x00, 0x40, 0x02, 0x01, 29, 30]);
        assert!(reports[1][6..].iter().all(|&b| b == 0));
        assert_eq!(&reports[2][..4], &[0x00, 0x40, 0x02, 0xFF]);
        assert!(reports[2][4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_bitmap_is_only_sentinel() {
        let upload = Upload::new(&[], Target::Left, ReportConfig::DEFAULT).unwrap();
        let chunks: Vec<_> = upload.iter().collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_sentinel());
    }

    #[test]
    fn test_iter_restarts() {
        let bitmap = [7u8; 100];
        let upload = Upload::new(&bitmap, Target::Left, ReportConfig::DEFAULT).unwrap();
        let first: Vec<_> = upload.iter().collect();
        let second: Vec<_> = upload.into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_target() {
        for raw in [0x00, 0x03, 0xFF] {
            let result = Upload::with_raw_target(&[1, 2, 3], raw, ReportConfig::DEFAULT);
            assert!(matches!(result, Err(Error::InvalidTarget(t)) if t == raw));
        }
        assert_eq!(Target::try_from(0x01).unwrap(), Target::Left);
        assert_eq!(Target::try_from(0x02).unwrap(), Target::Right);
    }

    #[test]
    fn test_capacity_without_room_for_payload() {
        for capacity in [0, 3, 4] {
            let config = ReportConfig::new(0, 0x40, capacity);
            let result = Upload::new(&[1], Target::Left, config);
            assert!(matches!(result, Err(Error::PayloadTooLarge { capacity: c }) if c == capacity));
        }
        let tiny = ReportConfig::new(0, 0x40, 5);
        assert_eq!(Upload::new(&[1, 2], Target::Left, tiny).unwrap().len(), 3);
    }

    #[test]
    fn test_bitmap_needing_more_than_255_chunks() {
        let fits = vec![0u8; 255 * 28];
        assert!(Upload::new(&fits, Target::Left, ReportConfig::DEFAULT).is_ok());

        let too_large = vec![0u8; 255 * 28 + 1];
        let result = Upload::new(&too_large, Target::Left, ReportConfig::DEFAULT);
        assert!(matches!(result, Err(Error::BitmapTooLarge { chunks: 256, .. })));
    }

    #[test]
    fn test_decode() {
        let mut report = [0u8; 32];
        report[..6].copy_from_slice(&[0x00, 0x40, 0x01, 0x05, 0xAB, 0xCD]);
        let chunk = Chunk::decode(&report, ReportConfig::DEFAULT).unwrap();
        assert_eq!(chunk.target, Target::Left);
        assert_eq!(chunk.index, ChunkIndex::Data(5));
        assert_eq!(chunk.payload.len(), 28);

        report[1] = 0x01;
        assert!(matches!(
            Chunk::decode(&report, ReportConfig::DEFAULT),
            Err(Error::MalformedReport(_))
        ));
        assert!(matches!(
            Chunk::decode(&report[..31], ReportConfig::DEFAULT),
            Err(Error::MalformedReport(_))
        ));
    }

    #[test]
    fn test_reassembler_rejects_skipped_chunk() {
        let bitmap = [1u8; 60];
        let upload = Upload::new(&bitmap, Target::Left, ReportConfig::DEFAULT).unwrap();
        let reports: Vec<_> = upload.iter().map(|c| c.to_report().unwrap()).collect();
        let mut receiver = Reassembler::new(Target::Left, 60, ReportConfig::DEFAULT).unwrap();

        assert_eq!(receiver.feed(&reports[0]).unwrap(), None);
        let err = receiver.feed(&reports[2]).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfSequence {
                expected: ChunkIndex::Data(1),
                got: ChunkIndex::Data(2)
            }
        ));

        // a fresh full upload succeeds after the failure
        for report in &reports[..3] {
            assert_eq!(receiver.feed(report).unwrap(), None);
        }
        assert_eq!(receiver.feed(&reports[3]).unwrap().unwrap(), bitmap);
    }

    #[test]
    fn test_reassembler_rejects_other_target_and_early_sentinel() {
        let bitmap = [9u8; 40];
        let right = Upload::new(&bitmap, Target::Right, ReportConfig::DEFAULT).unwrap();
        let mut receiver = Reassembler::new(Target::Left, 40, ReportConfig::DEFAULT).unwrap();
        let report = right.iter().next().unwrap().to_report().unwrap();
        assert!(matches!(receiver.feed(&report), Err(Error::MalformedReport(_))));

        let left = Upload::new(&bitmap, Target::Left, ReportConfig::DEFAULT).unwrap();
        let sentinel = left.iter().last().unwrap().to_report().unwrap();
        assert!(matches!(
            receiver.feed(&sentinel),
            Err(Error::OutOfSequence {
                got: ChunkIndex::Sentinel,
                ..
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_chunks_concatenate_to_bitmap(
            bitmap in proptest::collection::vec(any::<u8>(), 0..28 * 8),
            right in any::<bool>(),
        ) {
            let target = if right { Target::Right } else { Target::Left };
            let upload = Upload::new(&bitmap, target, ReportConfig::DEFAULT).unwrap();
            let chunks: Vec<_> = upload.iter().collect();
            let (sentinel, data) = chunks.split_last().unwrap();

            prop_assert_eq!(data.len(), bitmap.len().div_ceil(28));
            prop_assert!(sentinel.is_sentinel());
            prop_assert!(sentinel.payload.is_empty());
            prop_assert!(chunks.iter().all(|c| c.target == target));
            for (i, chunk) in data.iter().enumerate() {
                prop_assert_eq!(chunk.index, ChunkIndex::Data(i as u8));
                prop_assert!(!chunk.payload.is_empty());
            }
            let joined: Vec<u8> = data.iter().flat_map(|c| c.payload.iter().copied()).collect();
            prop_assert_eq!(joined, bitmap);
        }

        #[test]
        fn prop_reassembler_recovers_bitmap(
            bitmap in proptest::collection::vec(any::<u8>(), 0..28 * 8),
            capacity in 5usize..64,
        ) {
            let config = ReportConfig::new(0x00, 0x40, capacity);
            let upload = Upload::new(&bitmap, Target::Right, config).unwrap();
            let mut receiver = Reassembler::new(Target::Right, bitmap.len(), config).unwrap();
            let mut rebuilt = None;
            for chunk in upload.iter() {
                prop_assert!(rebuilt.is_none());
                rebuilt = receiver.feed(&chunk.to_report().unwrap()).unwrap();
            }
            prop_assert_eq!(rebuilt, Some(bitmap));
        }
    }
}

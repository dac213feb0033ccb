//! Delivery of uploads over a report transport.
//!
//! A [`Link`] owns the one connection to the keyboard. Both displays share
//! it, and every report goes through `&mut Link`, so two uploads can never
//! interleave at the report level. Threads that update both halves share a
//! `Mutex<Link<..>>`.
//!
//! # Conventions:
//! - Reports are handed over one at a time, [`Transport::send`] blocks until
//!   the report is accepted or fails.
//! - A failed report fails the whole upload, a retry starts again at chunk 0.

use std::fmt::Debug;

use embedded_hal::delay::DelayNs;
use tracing::{debug, info, warn};

use crate::{
    chunk::{ChunkIndex, Chunks, ReportConfig, Target, Upload},
    error::{Error, TransportError},
};

/// Ordered, atomic delivery of one report at a time.
pub trait Transport {
    fn send(&mut self, report: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, report: &[u8]) -> Result<(), TransportError> {
        (**self).send(report)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, report: &[u8]) -> Result<(), TransportError> {
        (**self).send(report)
    }
}

pub struct Link<T, D> {
    transport: T,
    delay: D,
    config: ReportConfig,
    pacing: DelayStep,
}

impl<T, D> Debug for Link<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("config", &self.config)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl<T, D> Link<T, D>
where
    T: Transport,
    D: DelayNs,
{
    /// Pause between two reports, the controller needs a moment to store each chunk.
    pub const DEFAULT_PACING: DelayStep = DelayStep::Ms(10);

    pub fn new(transport: T, delay: D, config: ReportConfig) -> Result<Self, Error> {
        config.payload_capacity()?;
        Ok(Self {
            transport,
            delay,
            config,
            pacing: Self::DEFAULT_PACING,
        })
    }

    pub fn with_pacing(mut self, pacing: DelayStep) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn config(&self) -> ReportConfig {
        self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> (T, D) {
        (self.transport, self.delay)
    }

    pub fn delay(&mut self, delay: DelayStep) {
        match delay {
            DelayStep::Ms(ms) => self.delay.delay_ms(ms),
            DelayStep::Us(us) => self.delay.delay_us(us),
            DelayStep::Ns(ns) => self.delay.delay_ns(ns),
        }
    }

    /// Starts an upload, driven one report at a time by [`Delivery::step`].
    ///
    /// The upload must have been built for this link's [`ReportConfig`].
    pub fn begin<'l, 'b>(&'l mut self, upload: &Upload<'b>) -> Result<Delivery<'l, 'b, T, D>, Error> {
        if upload.config() != self.config {
            return Err(Error::ReportConfigMismatch {
                link: self.config,
                upload: upload.config(),
            });
        }
        Ok(Delivery {
            chunks: upload.iter(),
            target: upload.target(),
            link: self,
            state: UploadState::NotStarted,
        })
    }

    /// Sends a whole bitmap to `target`.
    pub fn upload(&mut self, bitmap: &[u8], target: Target) -> Result<(), Error> {
        let upload = Upload::new(bitmap, target, self.config)?;
        self.begin(&upload)?.run()
    }

    fn send_chunk(&mut self, report: &[u8], first: bool) -> Result<(), TransportError> {
        if !first {
            self.delay(self.pacing);
        }
        self.transport.send(report)
    }
}

/// Where an upload stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    NotStarted,
    /// Data chunk `i` has been delivered.
    Sending(u8),
    /// The completion sentinel is being delivered.
    Completing,
    Done,
    Failed,
}

impl UploadState {
    pub fn is_finished(self) -> bool {
        matches!(self, UploadState::Done | UploadState::Failed)
    }
}

/// One upload in flight on a [`Link`].
///
/// Dropping it before [`UploadState::Done`] abandons the upload between two
/// reports; the display keeps a partial frame until a full upload succeeds.
pub struct Delivery<'l, 'b, T, D> {
    link: &'l mut Link<T, D>,
    chunks: Chunks<'b>,
    target: Target,
    state: UploadState,
}

impl<T, D> Debug for Delivery<'_, '_, T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("target", &self.target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T, D> Delivery<'_, '_, T, D>
where
    T: Transport,
    D: DelayNs,
{
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Reports left to send, sentinel included.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }

    /// Delivers the next report and returns the new state.
    ///
    /// Once finished, the state is returned again and nothing is sent.
    pub fn step(&mut self) -> Result<UploadState, Error> {
        if self.state.is_finished() {
            return Ok(self.state);
        }
        let Some(chunk) = self.chunks.next() else {
            return Ok(self.state);
        };
        let first = self.state == UploadState::NotStarted;
        let next = match chunk.index {
            ChunkIndex::Data(i) => UploadState::Sending(i),
            ChunkIndex::Sentinel => UploadState::Completing,
        };
        self.state = next;

        let report = match chunk.to_report() {
            Ok(report) => report,
            Err(e) => {
                self.state = UploadState::Failed;
                return Err(e);
            }
        };
        debug!(target_display = %self.target, index = %chunk.index, "sending report");
        if let Err(e) = self.link.send_chunk(&report, first) {
            warn!(target_display = %self.target, index = %chunk.index, error = %e, "upload failed");
            self.state = UploadState::Failed;
            return Err(e.into());
        }

        if next == UploadState::Completing {
            info!(target_display = %self.target, "upload complete");
            self.state = UploadState::Done;
        }
        Ok(self.state)
    }

    /// Steps until the sentinel is delivered or a report fails.
    pub fn run(mut self) -> Result<(), Error> {
        while !self.step()?.is_finished() {}
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DelayStep {
    Ns(u32),
    Us(u32),
    Ms(u32),
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    use super::*;
    use crate::chunk::Reassembler;

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[derive(Default)]
    struct Recorder {
        reports: Vec<Vec<u8>>,
        fail_at: Option<usize>,
    }

    impl Transport for Recorder {
        fn send(&mut self, report: &[u8]) -> Result<(), TransportError> {
            if self.fail_at == Some(self.reports.len()) {
                return Err(TransportError::Disconnected);
            }
            self.reports.push(report.to_vec());
            Ok(())
        }
    }

    fn link(recorder: Recorder) -> Link<Recorder, NoDelay> {
        Link::new(recorder, NoDelay, ReportConfig::DEFAULT).unwrap()
    }

    #[test]
    fn test_upload_sends_every_report_in_order() {
        let bitmap: Vec<u8> = (0..=255).cycle().take(512).collect();
        let mut link = link(Recorder::default());
        link.upload(&bitmap, Target::Left).unwrap();

        let reports = &link.transport().reports;
        assert_eq!(reports.len(), 20);
        let indices: Vec<u8> = reports.iter().map(|r| r[3]).collect();
        let mut expected: Vec<u8> = (0..19).collect();
        expected.push(0xFF);
        assert_eq!(indices, expected);

        let mut receiver = Reassembler::new(Target::Left, 512, ReportConfig::DEFAULT).unwrap();
        let rebuilt = reports.iter().find_map(|r| receiver.feed(r).unwrap());
        assert_eq!(rebuilt.unwrap(), bitmap);
    }

    #[test]
    fn test_state_machine() {
        let bitmap = [3u8; 40];
        let upload = Upload::new(&bitmap, Target::Right, ReportConfig::DEFAULT).unwrap();
        let mut link = link(Recorder::default());
        let mut delivery = link.begin(&upload).unwrap();

        assert_eq!(delivery.state(), UploadState::NotStarted);
        assert_eq!(delivery.remaining(), 3);
        assert_eq!(delivery.step().unwrap(), UploadState::Sending(0));
        assert_eq!(delivery.step().unwrap(), UploadState::Sending(1));
        assert_eq!(delivery.step().unwrap(), UploadState::Done);
        assert_eq!(delivery.step().unwrap(), UploadState::Done);
        assert_eq!(link.transport().reports.len(), 3);
    }

    #[test]
    fn test_transport_failure_stops_the_upload() {
        let bitmap = [3u8; 100];
        let upload = Upload::new(&bitmap, Target::Left, ReportConfig::DEFAULT).unwrap();
        let mut link = link(Recorder {
            fail_at: Some(2),
            ..Default::default()
        });
        let mut delivery = link.begin(&upload).unwrap();

        assert_eq!(delivery.step().unwrap(), UploadState::Sending(0));
        assert_eq!(delivery.step().unwrap(), UploadState::Sending(1));
        let err = delivery.step().unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Disconnected)));
        assert_eq!(delivery.state(), UploadState::Failed);
        assert_eq!(delivery.step().unwrap(), UploadState::Failed);
        assert_eq!(link.transport().reports.len(), 2);
    }

    #[test]
    fn test_abandoned_upload_can_be_restarted() {
        let bitmap = [5u8; 90];
        let upload = Upload::new(&bitmap, Target::Left, ReportConfig::DEFAULT).unwrap();
        let mut link = link(Recorder::default());
        {
            let mut delivery = link.begin(&upload).unwrap();
            delivery.step().unwrap();
        }
        link.begin(&upload).unwrap().run().unwrap();

        let indices: Vec<u8> = link.transport().reports.iter().map(|r| r[3]).collect();
        assert_eq!(indices, [0, 0, 1, 2, 3, 0xFF]);
    }

    #[test]
    fn test_upload_built_for_another_config_is_rejected() {
        let bitmap = [1u8; 60];
        let wide = ReportConfig::new(0x00, 0x40, 64);
        let upload = Upload::new(&bitmap, Target::Left, wide).unwrap();
        let mut link = link(Recorder::default());

        let err = link.begin(&upload).unwrap_err();
        assert!(matches!(
            err,
            Error::ReportConfigMismatch { link: l, upload: u } if l == ReportConfig::DEFAULT && u == wide
        ));
        assert!(link.transport().reports.is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let result = Link::new(Recorder::default(), NoDelay, ReportConfig::new(0, 0x40, 4));
        assert!(matches!(result, Err(Error::PayloadTooLarge { capacity: 4 })));
    }

    #[test]
    fn test_shared_link_never_interleaves_targets() {
        let link = Arc::new(Mutex::new(link(Recorder::default())));
        let handles: Vec<_> = [Target::Left, Target::Right]
            .into_iter()
            .map(|target| {
                let link = Arc::clone(&link);
                thread::spawn(move || {
                    let bitmap = vec![target.wire_value(); 512];
                    for _ in 0..5 {
                        link.lock().unwrap().upload(&bitmap, target).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let link = link.lock().unwrap();
        let reports = &link.transport().reports;
        assert_eq!(reports.len(), 10 * 20);
        for upload in reports.chunks(20) {
            let target = upload[0][2];
            assert!(upload.iter().all(|r| r[2] == target));
            assert_eq!(upload[19][3], 0xFF);
        }
    }
}

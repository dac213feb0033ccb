//! Raw HID transport to a Lily58 running VIA firmware.
//!
//! The firmware answers every report, each [`Transport::send`] waits for
//! that answer before the next report may go out.

use std::{
    fmt::Debug,
    time::{Duration, Instant},
};

use hidapi::{HidApi, HidDevice};
use linux_embedded_hal::Delay;
use lily58_oled_core::{Link, ReportConfig, TimeOutError, Transport, TransportError};
use tracing::{debug, info};

pub type HidLink = Link<HidTransport, Delay>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDefinition {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceDefinition {
    pub const DEFAULT: DeviceDefinition = DeviceDefinition::new(0x04D8, 0xEB2D);

    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl Default for DeviceDefinition {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub struct HidTransport {
    device: HidDevice,
    ack_timeout: Duration,
}

impl Debug for HidTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidTransport")
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}

impl HidTransport {
    pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn new(device: HidDevice) -> Self {
        Self {
            device,
            ack_timeout: Self::DEFAULT_ACK_TIMEOUT,
        }
    }

    pub fn open(definition: DeviceDefinition) -> Result<Self, anyhow::Error> {
        let api = HidApi::new()?;
        let device = api.open(definition.vendor_id, definition.product_id)?;
        info!(
            vendor_id = definition.vendor_id,
            product_id = definition.product_id,
            "opened keyboard"
        );
        Ok(Self::new(device))
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }
}

impl Transport for HidTransport {
    fn send(&mut self, report: &[u8]) -> Result<(), TransportError> {
        self.device
            .write(report)
            .map_err(|e| TransportError::Io(Box::new(e)))?;

        let now = Instant::now();
        let mut ack = vec![0; report.len()];
        let timeout_ms = i32::try_from(self.ack_timeout.as_millis()).unwrap_or(i32::MAX);
        let read = self
            .device
            .read_timeout(&mut ack, timeout_ms)
            .map_err(|e| TransportError::Io(Box::new(e)))?;
        if read == 0 {
            return Err(TimeOutError {
                timeout: self.ack_timeout,
                elapsed: now.elapsed(),
            }
            .into());
        }
        debug!(ack = ?&ack[..read], "report acknowledged");
        Ok(())
    }
}

/// Opens the keyboard and wraps it in a [`Link`] with the default report layout.
pub fn open_link(definition: DeviceDefinition) -> Result<HidLink, anyhow::Error> {
    let transport = HidTransport::open(definition)?;
    Ok(Link::new(transport, Delay, ReportConfig::DEFAULT)?)
}

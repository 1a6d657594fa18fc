//! Hardware collaborators.
//!
//! The bridge never touches registers itself. Board support code provides
//! these traits; [`crate::infrastructure::sim`] provides in-process versions.

use crate::domain::config::{Channels, Modulation, ModulationFlags};
use crate::domain::error::HalError;
use crate::infrastructure::deferred::IsrHandle;

/// Radio peripheral.
pub trait Radio: Send {
    /// Bring the radio up for the given base rate.
    fn init(&mut self, modulation: Modulation) -> Result<(), HalError>;
    /// Release the radio. Must succeed when it is not initialized.
    fn uninit(&mut self) -> Result<(), HalError>;
    /// Device radio address (MAC) as a little-endian integer.
    fn address(&self) -> Result<u64, HalError>;
}

/// Parameters for one scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub channels: Channels,
    /// Accepted manufacturer id, [`UNKNOWN_MANUFACTURER_ID`](crate::domain::config::UNKNOWN_MANUFACTURER_ID) accepts all.
    pub manufacturer_id: u16,
    /// Mirrors the enabled modulations. The primary channel is not derived
    /// from it; see [`ScanParams::scans_1m_primary`].
    pub rx_phys: ModulationFlags,
    /// Set when 2M or coded is enabled. Extended advertising announces the
    /// secondary PHY on the 1M primary channel.
    pub extended_scan: bool,
    pub max_adv_length: u8,
}

impl ScanParams {
    /// Whether the scanner must listen on the 1M primary channel.
    pub fn scans_1m_primary(&self) -> bool {
        self.rx_phys.phy_1m || self.extended_scan
    }
}

/// Advertisement scanner built on top of the radio.
pub trait AdvScanner: Send {
    fn init(&mut self, params: &ScanParams) -> Result<(), HalError>;
    /// Must succeed when not initialized.
    fn uninit(&mut self) -> Result<(), HalError>;
    /// Start scanning. Received packets and the end of the scan window are
    /// reported through `events` from interrupt context.
    fn start(&mut self, events: IsrHandle) -> Result<(), HalError>;
    fn stop(&mut self) -> Result<(), HalError>;
}

/// Byte-oriented serial link towards the host.
pub trait SerialSink: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), HalError>;

    fn flush(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}

pub trait Watchdog: Send {
    fn feed(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    InputPullup,
    OutputStandard,
}

pub trait Gpio: Send {
    fn is_init(&self) -> bool;
    fn init(&mut self) -> Result<(), HalError>;
    fn configure(&mut self, pin: u8, mode: PinMode) -> Result<(), HalError>;
    fn write(&mut self, pin: u8, high: bool) -> Result<(), HalError>;
}

/// Source of the communication id reported in DEVICE_ID responses.
pub trait DeviceIdentity: Send {
    fn comm_id(&self) -> Result<u64, HalError>;
}

/// Everything the bridge drives.
pub struct Peripherals {
    pub radio: Box<dyn Radio>,
    pub scanner: Box<dyn AdvScanner>,
    pub serial: Box<dyn SerialSink>,
    pub watchdog: Box<dyn Watchdog>,
    pub identity: Box<dyn DeviceIdentity>,
    /// Present only on boards with an external PA/LNA front end.
    pub gpio: Option<Box<dyn Gpio>>,
}

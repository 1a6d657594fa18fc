//! BLE Scan Controller
//!
//! Owns the radio and the advertisement scanner. Every start tears the
//! previous session down and alternates between a coded-PHY window and a
//! combined 1M/2M window, so consecutive scan timeouts cover every enabled PHY.

use crate::domain::config::{PhyState, ScanConfig, UNKNOWN_MANUFACTURER_ID};
use crate::domain::error::{BridgeResult, FirstError, HalError};
use crate::domain::settings::PaLnaPins;
use crate::infrastructure::deferred::IsrHandle;
use crate::infrastructure::hal::{AdvScanner, Gpio, PinMode, Radio, ScanParams, Watchdog};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Stopped,
    Scanning(PhyState),
}

/// External PA/LNA front end.
pub struct PaLna {
    gpio: Box<dyn Gpio>,
    pins: PaLnaPins,
}

impl PaLna {
    pub fn new(gpio: Box<dyn Gpio>, pins: PaLnaPins) -> Self {
        Self { gpio, pins }
    }

    fn configure(&mut self) -> BridgeResult {
        let mut status = FirstError::new();
        if !self.gpio.is_init() {
            status.record(self.gpio.init().map_err(Into::into));
        }

        // Let a coprocessor force the LNA off for its own TX bursts
        status.record(
            self.gpio
                .configure(self.pins.crx_pin, PinMode::InputPullup)
                .map_err(Into::into),
        );
        status.record(
            self.gpio
                .configure(self.pins.csd_pin, PinMode::OutputStandard)
                .map_err(Into::into),
        );
        status.record(
            self.gpio
                .write(self.pins.csd_pin, self.pins.csd_active)
                .map_err(Into::into),
        );
        status.finish()
    }
}

pub struct ScanController {
    radio: Box<dyn Radio>,
    scanner: Box<dyn AdvScanner>,
    pa_lna: Option<PaLna>,
    state: ScanState,
}

impl ScanController {
    pub fn new(radio: Box<dyn Radio>, scanner: Box<dyn AdvScanner>, pa_lna: Option<PaLna>) -> Self {
        Self {
            radio,
            scanner,
            pa_lna,
            state: ScanState::Stopped,
        }
    }

    /// Start (or restart) scanning with the current configuration.
    ///
    /// With no modulation enabled this is a [`stop`](Self::stop). On failure the
    /// radio and scanner are left uninitialized.
    pub fn start(
        &mut self,
        config: &mut ScanConfig,
        events: &IsrHandle,
        watchdog: &mut dyn Watchdog,
    ) -> BridgeResult {
        if !config.modulation_enabled().any() {
            info!("No modulation enabled, scanning stopped");
            return self.stop();
        }

        match self.restart(config, events) {
            Ok(phy) => {
                debug!("Scanning on {:?} PHY", phy);
                self.state = ScanState::Scanning(phy);
                watchdog.feed();
                Ok(())
            }
            Err(e) => {
                warn!("Scan start failed: {}", e);
                self.release();
                self.state = ScanState::Stopped;
                Err(e)
            }
        }
    }

    fn restart(&mut self, config: &mut ScanConfig, events: &IsrHandle) -> BridgeResult<PhyState> {
        self.scanner.uninit()?;
        self.radio.uninit()?;

        let phy = config.advance_phy();

        if let Some(pa_lna) = self.pa_lna.as_mut() {
            pa_lna.configure()?;
        }

        self.radio.init(phy.base_modulation())?;

        let params = scan_params(config);
        self.scanner.init(&params)?;
        self.scanner.start(events.clone())?;
        Ok(phy)
    }

    /// Best-effort teardown after a failed start.
    fn release(&mut self) {
        if let Err(e) = self.scanner.uninit() {
            warn!("Scanner uninit failed: {}", e);
        }
        if let Err(e) = self.radio.uninit() {
            warn!("Radio uninit failed: {}", e);
        }
    }

    /// Stop the scanner. Calling it while stopped is fine.
    pub fn stop(&mut self) -> BridgeResult {
        self.scanner.stop()?;
        if self.state != ScanState::Stopped {
            info!("Scan stopped");
        }
        self.state = ScanState::Stopped;
        Ok(())
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning(_))
    }

    pub fn radio_address(&self) -> Result<u64, HalError> {
        self.radio.address()
    }
}

fn scan_params(config: &ScanConfig) -> ScanParams {
    let rx_phys = config.modulation_enabled();
    ScanParams {
        channels: config.channels(),
        manufacturer_id: config
            .manufacturer_filter()
            .unwrap_or(UNKNOWN_MANUFACTURER_ID),
        rx_phys,
        extended_scan: rx_phys.phy_2m || rx_phys.coded_125k,
        max_adv_length: config.max_adv_length(),
    }
}

//! Simulated board.
//!
//! In-process stand-ins for the radio, scanner, serial port, watchdog and GPIO.
//! Every call is recorded so the bridge can run on a host machine and so its
//! behaviour can be asserted on.

use crate::domain::config::Modulation;
use crate::domain::error::HalError;
use crate::infrastructure::deferred::IsrHandle;
use crate::infrastructure::hal::{
    AdvScanner, DeviceIdentity, Gpio, Peripherals, PinMode, Radio, ScanParams, SerialSink,
    Watchdog,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// A collaborator call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwCall {
    RadioInit(Modulation),
    RadioUninit,
    ScanInit(ScanParams),
    ScanUninit,
    ScanStart,
    ScanStop,
    GpioInit,
    GpioConfigure(u8, PinMode),
    GpioWrite(u8, bool),
}

#[derive(Default)]
struct SimState {
    calls: Vec<HwCall>,
    sent: Vec<Vec<u8>>,
    flushes: usize,
    feeds: usize,
    radio_up: Option<Modulation>,
    scanner_params: Option<ScanParams>,
    scan_events: Option<IsrHandle>,
    gpio_up: bool,
    fail_radio_init: bool,
    fail_scan_init: bool,
    fail_scan_stop: bool,
    fail_serial: bool,
}

/// Shared handle on the simulated hardware.
#[derive(Clone)]
pub struct SimBoard {
    state: Arc<Mutex<SimState>>,
    radio_address: u64,
    comm_id: u64,
}

impl SimBoard {
    pub fn new(radio_address: u64, comm_id: u64) -> Self {
        Self {
            state: Arc::default(),
            radio_address,
            comm_id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panic while holding the lock only happens in a failing test
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Peripherals backed entirely by this board.
    pub fn peripherals(&self, with_pa_lna: bool) -> Peripherals {
        self.peripherals_with_serial(
            Box::new(SimSerial {
                board: self.clone(),
            }),
            with_pa_lna,
        )
    }

    /// Peripherals with a caller-provided serial link.
    pub fn peripherals_with_serial(
        &self,
        serial: Box<dyn SerialSink>,
        with_pa_lna: bool,
    ) -> Peripherals {
        Peripherals {
            radio: Box::new(SimRadio {
                board: self.clone(),
            }),
            scanner: Box::new(SimScanner {
                board: self.clone(),
            }),
            serial,
            watchdog: Box::new(SimWatchdog {
                board: self.clone(),
            }),
            identity: Box::new(SimIdentity {
                comm_id: self.comm_id,
            }),
            gpio: with_pa_lna.then(|| {
                Box::new(SimGpio {
                    board: self.clone(),
                }) as Box<dyn Gpio>
            }),
        }
    }

    pub fn calls(&self) -> Vec<HwCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn flushes(&self) -> usize {
        self.lock().flushes
    }

    pub fn watchdog_feeds(&self) -> usize {
        self.lock().feeds
    }

    pub fn radio_modulation(&self) -> Option<Modulation> {
        self.lock().radio_up
    }

    pub fn scan_params(&self) -> Option<ScanParams> {
        self.lock().scanner_params
    }

    /// Event handle of the running scan, if any.
    pub fn scan_events(&self) -> Option<IsrHandle> {
        self.lock().scan_events.clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.lock().scan_events.is_some()
    }

    pub fn set_fail_radio_init(&self, fail: bool) {
        self.lock().fail_radio_init = fail;
    }

    pub fn set_fail_scan_init(&self, fail: bool) {
        self.lock().fail_scan_init = fail;
    }

    pub fn set_fail_scan_stop(&self, fail: bool) {
        self.lock().fail_scan_stop = fail;
    }

    pub fn set_fail_serial(&self, fail: bool) {
        self.lock().fail_serial = fail;
    }
}

struct SimRadio {
    board: SimBoard,
}

impl Radio for SimRadio {
    fn init(&mut self, modulation: Modulation) -> Result<(), HalError> {
        let mut state = self.board.lock();
        state.calls.push(HwCall::RadioInit(modulation));
        if state.fail_radio_init {
            return Err(HalError::Internal("radio init failed".to_string()));
        }
        if state.radio_up.is_some() {
            return Err(HalError::InvalidState);
        }
        state.radio_up = Some(modulation);
        Ok(())
    }

    fn uninit(&mut self) -> Result<(), HalError> {
        let mut state = self.board.lock();
        state.calls.push(HwCall::RadioUninit);
        state.radio_up = None;
        Ok(())
    }

    fn address(&self) -> Result<u64, HalError> {
        Ok(self.board.radio_address)
    }
}

struct SimScanner {
    board: SimBoard,
}

impl AdvScanner for SimScanner {
    fn init(&mut self, params: &ScanParams) -> Result<(), HalError> {
        let mut state = self.board.lock();
        state.calls.push(HwCall::ScanInit(*params));
        if state.fail_scan_init {
            return Err(HalError::Internal("scanner init failed".to_string()));
        }
        if state.radio_up.is_none() || state.scanner_params.is_some() {
            return Err(HalError::InvalidState);
        }
        state.scanner_params = Some(*params);
        Ok(())
    }

    fn uninit(&mut self) -> Result<(), HalError> {
        let mut state = self.board.lock();
        state.calls.push(HwCall::ScanUninit);
        state.scanner_params = None;
        state.scan_events = None;
        Ok(())
    }

    fn start(&mut self, events: IsrHandle) -> Result<(), HalError> {
        let mut state = self.board.lock();
        state.calls.push(HwCall::ScanStart);
        if state.scanner_params.is_none() {
            return Err(HalError::InvalidState);
        }
        state.scan_events = Some(events);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HalError> {
        let mut state = self.board.lock();
        state.calls.push(HwCall::ScanStop);
        if state.fail_scan_stop {
            return Err(HalError::Busy);
        }
        state.scan_events = None;
        Ok(())
    }
}

struct SimSerial {
    board: SimBoard,
}

impl SerialSink for SimSerial {
    fn send(&mut self, frame: &[u8]) -> Result<(), HalError> {
        let mut state = self.board.lock();
        if state.fail_serial {
            return Err(HalError::Busy);
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), HalError> {
        self.board.lock().flushes += 1;
        Ok(())
    }
}

struct SimWatchdog {
    board: SimBoard,
}

impl Watchdog for SimWatchdog {
    fn feed(&mut self) {
        self.board.lock().feeds += 1;
    }
}

struct SimIdentity {
    comm_id: u64,
}

impl DeviceIdentity for SimIdentity {
    fn comm_id(&self) -> Result<u64, HalError> {
        Ok(self.comm_id)
    }
}

struct SimGpio {
    board: SimBoard,
}

impl Gpio for SimGpio {
    fn is_init(&self) -> bool {
        self.board.lock().gpio_up
    }

    fn init(&mut self) -> Result<(), HalError> {
        let mut state = self.board.lock();
        state.calls.push(HwCall::GpioInit);
        state.gpio_up = true;
        Ok(())
    }

    fn configure(&mut self, pin: u8, mode: PinMode) -> Result<(), HalError> {
        self.board.lock().calls.push(HwCall::GpioConfigure(pin, mode));
        Ok(())
    }

    fn write(&mut self, pin: u8, high: bool) -> Result<(), HalError> {
        self.board.lock().calls.push(HwCall::GpioWrite(pin, high));
        Ok(())
    }
}

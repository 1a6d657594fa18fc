//! Bridge Service Module
//!
//! Main loop of the bridge. Owns the configuration store, the frame
//! dispatcher, the scan controller and the serial side, and runs deferred
//! tasks one at a time.

use crate::domain::config::ScanConfig;
use crate::domain::error::{BridgeError, BridgeResult, FirstError};
use crate::domain::models::{Advertisement, Frame, Response, Task};
use crate::domain::settings::Settings;
use crate::infrastructure::ble::scanner::{PaLna, ScanController, ScanState};
use crate::infrastructure::deferred::{deferred_queue, task_name, IsrHandle};
use crate::infrastructure::hal::{DeviceIdentity, Peripherals, SerialSink, Watchdog};
use crate::infrastructure::uart::dispatcher::{self, DispatchContext, FrameDispatcher};
use crate::infrastructure::uart::forwarder::{self, ForwardOutcome};
use crate::infrastructure::uart::protocol::{CaUartCodec, WireCodec};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct BridgeService {
    config: ScanConfig,
    dispatcher: FrameDispatcher,
    controller: ScanController,
    codec: Box<dyn WireCodec + Send>,
    serial: Box<dyn SerialSink>,
    watchdog: Box<dyn Watchdog>,
    identity: Box<dyn DeviceIdentity>,
    isr: IsrHandle,
    tasks: mpsc::Receiver<Task>,
    initialized: bool,
}

impl BridgeService {
    /// Create the bridge on top of the board peripherals
    pub fn new(settings: &Settings, peripherals: Peripherals) -> Self {
        let pa_lna = match (peripherals.gpio, settings.board.pa_lna) {
            (Some(gpio), Some(pins)) => Some(PaLna::new(gpio, pins)),
            (None, Some(_)) => {
                warn!("PA/LNA pins configured but the board has no GPIO");
                None
            }
            _ => None,
        };

        let (isr, tasks) = deferred_queue(settings.queue_capacity);

        Self {
            config: ScanConfig::new(&settings.scan_defaults, settings.board.coded_phy_supported),
            dispatcher: FrameDispatcher::new(),
            controller: ScanController::new(peripherals.radio, peripherals.scanner, pa_lna),
            codec: Box::new(CaUartCodec),
            serial: peripherals.serial,
            watchdog: peripherals.watchdog,
            identity: peripherals.identity,
            isr,
            tasks,
            initialized: false,
        }
    }

    /// Replace the wire codec
    pub fn with_codec(mut self, codec: Box<dyn WireCodec + Send>) -> Self {
        self.codec = codec;
        self
    }

    /// Handle for UART and scanner callbacks
    pub fn isr_handle(&self) -> IsrHandle {
        self.isr.clone()
    }

    /// Ask the host for its settings and start the first scan.
    ///
    /// Only allowed once; later calls fail with `InvalidState`.
    pub fn init(&mut self) -> BridgeResult {
        if self.initialized {
            return Err(BridgeError::InvalidState("bridge already initialized"));
        }
        self.initialized = true;
        info!("Bridge initialized");

        let mut status = FirstError::new();
        status.record(self.poll_configuration());
        status.record(self.scan_start());
        status.finish()
    }

    /// Run one deferred task
    pub fn handle(&mut self, task: Task) -> BridgeResult {
        match task {
            Task::UartRx(bytes) => self.on_uart_rx(&bytes),
            Task::Broadcast(adv) => self.send_broadcast(Some(&adv)).map(|_| ()),
            Task::ScanTimeout => self.scan_start(),
            Task::SendAck { command, ok } => self.send_response(&Response::Ack { command, ok }),
            Task::SendDeviceId => self.send_device_id(),
            Task::TxFinished => self.serial.flush().map_err(Into::into),
        }
    }

    /// Run every task already queued. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.tasks.try_recv() {
            self.run_task(task);
            count += 1;
        }
        count
    }

    /// Run tasks as they arrive. Never returns while the service holds its own handle.
    pub async fn run(&mut self) {
        while let Some(task) = self.tasks.recv().await {
            self.run_task(task);
        }
    }

    fn run_task(&mut self, task: Task) {
        let kind = task_name(&task);
        if let Err(e) = self.handle(task) {
            error!("{} failed: {}", kind, e);
        }
    }

    fn on_uart_rx(&mut self, bytes: &[u8]) -> BridgeResult {
        let mut ctx = DispatchContext {
            config: &mut self.config,
            codec: self.codec.as_ref(),
            deferred: &self.isr,
            watchdog: self.watchdog.as_mut(),
        };
        let dispatched = self.dispatcher.on_bytes(bytes, &mut ctx)?;

        // A stopped scan has no timeout left to restart it
        if dispatched > 0
            && !self.controller.is_scanning()
            && self.config.modulation_enabled().any()
        {
            info!("Scan configuration enabled, starting scan");
            self.scan_start()?;
        }
        Ok(())
    }

    /// Apply one host command to the configuration store
    pub fn apply_config(&mut self, frame: &Frame) -> BridgeResult {
        dispatcher::apply_config(frame, &mut self.config)
    }

    /// Forward one captured advertisement to the host
    pub fn send_broadcast(&mut self, adv: Option<&Advertisement>) -> BridgeResult<ForwardOutcome> {
        forwarder::forward(
            adv,
            &self.config,
            self.codec.as_ref(),
            self.serial.as_mut(),
            self.watchdog.as_mut(),
        )
    }

    pub fn scan_start(&mut self) -> BridgeResult {
        self.controller
            .start(&mut self.config, &self.isr, self.watchdog.as_mut())
    }

    pub fn scan_stop(&mut self) -> BridgeResult {
        self.controller.stop()
    }

    /// Request the host's configuration with a GET_ALL frame
    pub fn poll_configuration(&mut self) -> BridgeResult {
        debug!("Polling host configuration");
        self.send_response(&Response::GetAll)
    }

    fn send_device_id(&mut self) -> BridgeResult {
        let radio_addr = self.controller.radio_address()?;
        let comm_id = self.identity.comm_id()?;
        self.send_response(&Response::DeviceId {
            comm_id,
            radio_addr,
        })
    }

    fn send_response(&mut self, response: &Response) -> BridgeResult {
        let frame = self
            .codec
            .encode(response)
            .map_err(BridgeError::InvalidData)?;
        self.serial.send(&frame)?;
        Ok(())
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn scan_state(&self) -> ScanState {
        self.controller.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{Channels, PhyState};
    use crate::domain::error::{DecodeError, EncodeError};
    use crate::domain::models::{Command, ReportPhy, ScanEvent, UartEvent};
    use crate::domain::settings::PaLnaPins;
    use crate::infrastructure::sim::{HwCall, SimBoard};
    use crate::infrastructure::uart::protocol::{build_frame, DELIMITER, ETX, STX};

    const RADIO_ADDR: u64 = 0x0000_C0FF_EE12_3456;
    const COMM_ID: u64 = 0x1122_3344_5566_7788;

    fn service(settings: &Settings) -> (BridgeService, SimBoard) {
        let board = SimBoard::new(RADIO_ADDR, COMM_ID);
        let peripherals = board.peripherals(settings.board.pa_lna.is_some());
        (BridgeService::new(settings, peripherals), board)
    }

    fn frame(command: Command, payload: &[u8]) -> Vec<u8> {
        build_frame(command, payload).unwrap()
    }

    fn ruuvi_adv() -> Advertisement {
        Advertisement {
            addr: [0xFA, 0xEB, 0xDC, 0xCD, 0xBE, 0xAF],
            rssi: -70,
            data: vec![0x02, 0x01, 0x06, 0x05, 0xFF, 0x99, 0x04, 0x05, 0x12],
            is_coded_phy: false,
            primary_phy: ReportPhy::OneMbps,
            secondary_phy: ReportPhy::NotSet,
            ch_index: 38,
            tx_power: i8::MAX,
        }
    }

    struct BrokenCodec;

    impl WireCodec for BrokenCodec {
        fn decode(&self, window: &[u8]) -> Result<(Frame, usize), DecodeError> {
            CaUartCodec.decode(window)
        }

        fn encode(&self, _response: &Response) -> Result<Vec<u8>, EncodeError> {
            Err(EncodeError::Internal)
        }
    }

    #[test]
    fn test_init_polls_configuration() {
        let (mut bridge, board) = service(&Settings::default());

        bridge.init().unwrap();

        assert_eq!(
            board.sent_frames(),
            vec![vec![STX, 0, 25, 0x17, 0x9E, ETX]]
        );
        // Nothing enabled by default, so the first start is a stop
        assert_eq!(bridge.scan_state(), ScanState::Stopped);
    }

    #[test]
    fn test_init_twice_rejected() {
        let (mut bridge, board) = service(&Settings::default());
        bridge.init().unwrap();

        let result = bridge.init();

        assert!(matches!(result, Err(BridgeError::InvalidState(_))));
        assert_eq!(board.sent_frames().len(), 1);
    }

    #[test]
    fn test_poll_configuration_encode_failure() {
        let (bridge, board) = service(&Settings::default());
        let mut bridge = bridge.with_codec(Box::new(BrokenCodec));

        let result = bridge.poll_configuration();

        assert_eq!(result, Err(BridgeError::InvalidData(EncodeError::Internal)));
        assert!(board.sent_frames().is_empty());
    }

    #[test]
    fn test_command_is_acked_and_flushed() {
        let (mut bridge, board) = service(&Settings::default());
        let isr = bridge.isr_handle();

        isr.on_uart_event(UartEvent::Received(frame(Command::SetCh38, &[0, DELIMITER])))
            .unwrap();
        // UartRx, then SendAck and TxFinished queued by the dispatcher
        assert_eq!(bridge.run_pending(), 3);

        assert_eq!(bridge.config().channels(), Channels::new(true, false, true));
        assert_eq!(
            board.sent_frames(),
            vec![frame(Command::Ack, &[Command::SetCh38.code(), DELIMITER, 1, DELIMITER])]
        );
        assert_eq!(board.flushes(), 1);
    }

    #[test]
    fn test_rejected_command_acked_with_failure() {
        let mut settings = Settings::default();
        settings.board.coded_phy_supported = false;
        let (mut bridge, board) = service(&settings);

        bridge
            .handle(Task::UartRx(frame(Command::SetCodedPhy, &[1, DELIMITER])))
            .unwrap();
        bridge.run_pending();

        assert_eq!(
            board.sent_frames(),
            vec![frame(
                Command::Ack,
                &[Command::SetCodedPhy.code(), DELIMITER, 0, DELIMITER]
            )]
        );
    }

    #[test]
    fn test_get_device_id() {
        let (mut bridge, board) = service(&Settings::default());

        bridge
            .handle(Task::UartRx(frame(Command::GetDeviceId, &[])))
            .unwrap();
        bridge.run_pending();

        let mut payload = COMM_ID.to_le_bytes().to_vec();
        payload.push(DELIMITER);
        payload.extend_from_slice(&RADIO_ADDR.to_le_bytes());
        payload.push(DELIMITER);
        assert_eq!(board.sent_frames(), vec![frame(Command::DeviceId, &payload)]);
    }

    #[test]
    fn test_enabling_modulation_starts_scan() {
        let (mut bridge, board) = service(&Settings::default());
        bridge.init().unwrap();
        assert!(!board.is_scanning());

        bridge
            .handle(Task::UartRx(frame(Command::SetScan1MbPhy, &[1, DELIMITER])))
            .unwrap();

        assert_eq!(bridge.scan_state(), ScanState::Scanning(PhyState::Standard));
        assert!(board.is_scanning());
    }

    #[test]
    fn test_scan_timeout_alternates_phy() {
        let (mut bridge, _board) = service(&Settings::default());
        for command in [Command::SetCodedPhy, Command::SetScan2MbPhy] {
            bridge
                .apply_config(&Frame::new(
                    command,
                    crate::domain::models::CommandParams::Bool(true),
                ))
                .unwrap();
        }

        let mut states = Vec::new();
        for _ in 0..3 {
            bridge.handle(Task::ScanTimeout).unwrap();
            states.push(bridge.scan_state());
        }

        assert_eq!(
            states,
            vec![
                ScanState::Scanning(PhyState::Coded),
                ScanState::Scanning(PhyState::Standard),
                ScanState::Scanning(PhyState::Coded),
            ]
        );
    }

    #[test]
    fn test_scanned_advertisement_forwarded() {
        let (mut bridge, board) = service(&Settings::default());
        bridge
            .handle(Task::UartRx(frame(Command::SetScan1MbPhy, &[1, DELIMITER])))
            .unwrap();
        bridge.run_pending();
        let before = board.sent_frames().len();

        let events = board.scan_events().unwrap();
        events.on_scan_event(ScanEvent::Received(ruuvi_adv())).unwrap();
        bridge.run_pending();

        let sent = board.sent_frames();
        assert_eq!(sent.len(), before + 1);
        assert_eq!(sent[before][2], Command::AdvReport.code());
    }

    #[test]
    fn test_send_broadcast_null() {
        let (mut bridge, _board) = service(&Settings::default());
        assert_eq!(bridge.send_broadcast(None), Err(BridgeError::NullInput));
    }

    #[test]
    fn test_scan_stop() {
        let (mut bridge, board) = service(&Settings::default());
        bridge
            .handle(Task::UartRx(frame(Command::SetScan1MbPhy, &[1, DELIMITER])))
            .unwrap();

        bridge.scan_stop().unwrap();

        assert_eq!(bridge.scan_state(), ScanState::Stopped);
        assert!(!board.is_scanning());
    }

    #[test]
    fn test_pa_lna_from_settings() {
        let mut settings = Settings::default();
        settings.board.pa_lna = Some(PaLnaPins {
            crx_pin: 3,
            csd_pin: 4,
            csd_active: false,
        });
        settings.scan_defaults.modulation.phy_1m = true;
        let (mut bridge, board) = service(&settings);

        bridge.scan_start().unwrap();

        assert!(board.calls().contains(&HwCall::GpioWrite(4, false)));
    }

    #[tokio::test]
    async fn test_run_loop_processes_tasks() {
        let (mut bridge, board) = service(&Settings::default());
        let isr = bridge.isr_handle();
        isr.on_uart_event(UartEvent::Received(frame(Command::SetFltrId, &[0x01, 0x01, DELIMITER])))
            .unwrap();

        let _ = tokio::time::timeout(std::time::Duration::from_millis(50), bridge.run()).await;

        assert_eq!(bridge.config().manufacturer_id(), 0x0101);
        assert_eq!(board.sent_frames().len(), 1);
        assert_eq!(board.flushes(), 1);
    }
}

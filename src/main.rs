use anyhow::Result;
use ble_scan_bridge::domain::error::HalError;
use ble_scan_bridge::domain::models::{ScanEvent, UartEvent};
use ble_scan_bridge::domain::settings::SettingsService;
use ble_scan_bridge::infrastructure::deferred::IsrHandle;
use ble_scan_bridge::infrastructure::hal::SerialSink;
use ble_scan_bridge::infrastructure::logging::init_logger;
use ble_scan_bridge::infrastructure::sim::SimBoard;
use ble_scan_bridge::infrastructure::BridgeService;
use std::io::Write;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

const SIM_RADIO_ADDRESS: u64 = 0x0000_D1CE_0B5E_55ED;
const SIM_COMM_ID: u64 = 0x0000_0000_0BAD_C0DE;

/// Serial link on stdout
struct StdoutSerial {
    out: std::io::Stdout,
}

impl SerialSink for StdoutSerial {
    fn send(&mut self, frame: &[u8]) -> Result<(), HalError> {
        self.out
            .write_all(frame)
            .map_err(|e| HalError::Internal(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), HalError> {
        self.out
            .flush()
            .map_err(|e| HalError::Internal(e.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let _log_guard = init_logger(&settings.log_settings)?;

    info!("Starting BLE scan bridge");
    info!("Settings file: {}", settings_service.path().display());

    let board = SimBoard::new(SIM_RADIO_ADDRESS, SIM_COMM_ID);
    let serial = Box::new(StdoutSerial {
        out: std::io::stdout(),
    });
    let peripherals = board.peripherals_with_serial(serial, settings.board.pa_lna.is_some());
    let mut bridge = BridgeService::new(&settings, peripherals);
    let isr = bridge.isr_handle();

    tokio::spawn(scan_windows(
        board.clone(),
        Duration::from_millis(settings.scan_window_ms),
    ));

    if let Err(e) = bridge.init() {
        warn!("Bridge init: {}", e);
    }

    tokio::select! {
        _ = bridge.run() => {}
        result = read_uart(isr) => {
            if let Err(e) = result {
                warn!("UART read failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    let drained = bridge.run_pending();
    info!("Shutting down ({} tasks drained)", drained);
    Ok(())
}

/// Feed stdin to the bridge as UART receive events until EOF.
async fn read_uart(isr: IsrHandle) -> Result<()> {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 64];
    loop {
        let n = stdin.read(&mut buf).await?;
        if n == 0 {
            info!("UART input closed");
            return Ok(());
        }
        if let Err(e) = isr.on_uart_event(UartEvent::Received(buf[..n].to_vec())) {
            warn!("Dropped {} received bytes: {}", n, e);
        }
    }
}

/// End the simulated scan window every `window`.
async fn scan_windows(board: SimBoard, window: Duration) {
    let mut ticker = tokio::time::interval(window);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Some(events) = board.scan_events() {
            if let Err(e) = events.on_scan_event(ScanEvent::Timeout) {
                warn!("Scan timeout not delivered: {}", e);
            }
        }
    }
}

//! Broadcast forwarder: captured advertisements to the host.

use crate::domain::config::ScanConfig;
use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::models::{Advertisement, Response, ADV_DATA_MAX_LEN};
use crate::infrastructure::hal::{SerialSink, Watchdog};
use crate::infrastructure::uart::protocol::WireCodec;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Sent,
    /// Manufacturer id did not match the active filter.
    Filtered,
}

/// Filter, encode and send one advertisement.
///
/// Size is checked before anything else so an oversized capture never
/// reaches the codec or the serial link.
pub fn forward(
    adv: Option<&Advertisement>,
    config: &ScanConfig,
    codec: &dyn WireCodec,
    serial: &mut dyn SerialSink,
    watchdog: &mut dyn Watchdog,
) -> BridgeResult<ForwardOutcome> {
    let adv = adv.ok_or(BridgeError::NullInput)?;

    if adv.data.len() >= ADV_DATA_MAX_LEN {
        return Err(BridgeError::DataTooLarge(adv.data.len()));
    }

    if let Some(allowed) = config.manufacturer_filter() {
        let id = adv.manufacturer_id();
        if id != Some(allowed) {
            trace!("Dropping {:02X?}: manufacturer {:?} filtered", adv.addr, id);
            return Ok(ForwardOutcome::Filtered);
        }
    }

    let frame = codec
        .encode(&Response::AdvReport(adv.clone()))
        .map_err(BridgeError::InvalidData)?;
    serial.send(&frame)?;
    watchdog.feed();

    debug!("Forwarded {:02X?} rssi {} ({} bytes)", adv.addr, adv.rssi, adv.data.len());
    Ok(ForwardOutcome::Sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ScanDefaults;
    use crate::domain::error::{DecodeError, EncodeError};
    use crate::domain::models::{Frame, ReportPhy};
    use crate::infrastructure::sim::SimBoard;
    use crate::infrastructure::uart::protocol::CaUartCodec;

    const MOCK_MAC: [u8; 6] = [0xFA, 0xEB, 0xDC, 0xCD, 0xBE, 0xAF];

    /// Manufacturer specific data for 0x0499 followed by sensor bytes.
    fn ruuvi_data() -> Vec<u8> {
        vec![
            0x02, 0x01, 0x06, 0x12, 0xFF, 0x99, 0x04, 0x05, 0x12, 0xFC, 0x53, 0x94, 0xC3, 0x7C,
            0x00, 0x04, 0xFF, 0xFC, 0x04, 0x0C, 0xAC, 0x36,
        ]
    }

    fn scan(data: Vec<u8>) -> Advertisement {
        Advertisement {
            addr: MOCK_MAC,
            rssi: -50,
            data,
            is_coded_phy: false,
            primary_phy: ReportPhy::OneMbps,
            secondary_phy: ReportPhy::NotSet,
            ch_index: 37,
            tx_power: i8::MAX,
        }
    }

    struct FailingCodec;

    impl WireCodec for FailingCodec {
        fn decode(&self, window: &[u8]) -> Result<(Frame, usize), DecodeError> {
            Err(DecodeError::TooShort(window.len()))
        }

        fn encode(&self, _response: &Response) -> Result<Vec<u8>, EncodeError> {
            Err(EncodeError::Internal)
        }
    }

    fn run(
        adv: Option<&Advertisement>,
        config: &ScanConfig,
        codec: &dyn WireCodec,
    ) -> (BridgeResult<ForwardOutcome>, SimBoard) {
        let board = SimBoard::new(1, 2);
        let mut p = board.peripherals(false);
        let result = forward(adv, config, codec, p.serial.as_mut(), p.watchdog.as_mut());
        (result, board)
    }

    fn default_config() -> ScanConfig {
        ScanConfig::new(&ScanDefaults::default(), true)
    }

    #[test]
    fn test_forward_matching_manufacturer() {
        let adv = scan(ruuvi_data());
        let (result, board) = run(Some(&adv), &default_config(), &CaUartCodec);

        assert_eq!(result, Ok(ForwardOutcome::Sent));
        assert_eq!(board.sent_frames().len(), 1);
        assert_eq!(board.watchdog_feeds(), 1);
    }

    #[test]
    fn test_forward_coded_phy_report() {
        let mut adv = scan(ruuvi_data());
        adv.is_coded_phy = true;
        adv.primary_phy = ReportPhy::Coded;
        adv.secondary_phy = ReportPhy::Coded;
        adv.ch_index = 10;
        adv.tx_power = 8;

        let (result, board) = run(Some(&adv), &default_config(), &CaUartCodec);

        assert_eq!(result, Ok(ForwardOutcome::Sent));
        assert_eq!(board.sent_frames().len(), 1);
    }

    #[test]
    fn test_forward_null() {
        let (result, board) = run(None, &default_config(), &CaUartCodec);

        assert_eq!(result, Err(BridgeError::NullInput));
        assert!(board.sent_frames().is_empty());
    }

    #[test]
    fn test_forward_too_large() {
        let adv = scan(vec![0u8; 255]);
        let (result, board) = run(Some(&adv), &default_config(), &CaUartCodec);

        assert_eq!(result, Err(BridgeError::DataTooLarge(255)));
        assert!(board.sent_frames().is_empty());
        assert_eq!(board.watchdog_feeds(), 0);
    }

    #[test]
    fn test_forward_encoding_error() {
        let adv = scan(ruuvi_data());
        let (result, board) = run(Some(&adv), &default_config(), &FailingCodec);

        assert_eq!(result, Err(BridgeError::InvalidData(EncodeError::Internal)));
        assert!(board.sent_frames().is_empty());
    }

    #[test]
    fn test_forward_filtered_silently() {
        let mut config = default_config();
        config.manufacturer_id_set(0x0101).unwrap();
        let adv = scan(ruuvi_data());

        let (result, board) = run(Some(&adv), &config, &CaUartCodec);

        assert_eq!(result, Ok(ForwardOutcome::Filtered));
        assert!(board.sent_frames().is_empty());
    }

    #[test]
    fn test_forward_filter_disabled_passes_everything() {
        let mut config = default_config();
        config.manufacturer_filter_set(false).unwrap();
        let adv = scan(vec![0x02, 0x01, 0x06]);

        let (result, board) = run(Some(&adv), &config, &CaUartCodec);

        assert_eq!(result, Ok(ForwardOutcome::Sent));
        assert_eq!(board.sent_frames().len(), 1);
    }

    #[test]
    fn test_forward_serial_failure_propagates() {
        let adv = scan(ruuvi_data());
        let board = SimBoard::new(1, 2);
        board.set_fail_serial(true);
        let mut p = board.peripherals(false);

        let result = forward(
            Some(&adv),
            &default_config(),
            &CaUartCodec,
            p.serial.as_mut(),
            p.watchdog.as_mut(),
        );

        assert!(matches!(result, Err(BridgeError::Hal(_))));
        assert_eq!(board.watchdog_feeds(), 0);
    }
}

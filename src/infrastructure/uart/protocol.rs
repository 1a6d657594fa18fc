//! Serial Link Protocol
//!
//! Frame layout shared with the host tooling:
//!
//! ```text
//! [0]      : STX (0x02)
//! [1]      : LEN, number of parameter bytes (delimiters included)
//! [2]      : Command code
//! [3..n]   : Parameters, each field followed by ',' (0x2C)
//! [n..n+2] : CRC-16/CCITT-FALSE over LEN..last parameter, low byte first
//! [n+2]    : ETX (0x03)
//! ```

use crate::domain::error::{DecodeError, EncodeError};
use crate::domain::models::{AllParams, Command, CommandParams, Frame, Response};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const DELIMITER: u8 = 0x2C;

const LEN_INDEX: usize = 1;
const CMD_INDEX: usize = 2;
const PAYLOAD_INDEX: usize = 3;

/// STX + LEN + CMD + CRC + ETX
pub const FRAME_OVERHEAD: usize = 6;

/// Largest parameter block a one-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN + FRAME_OVERHEAD;

/// SET_ALL flag bits
mod all_flags {
    pub const FLTR_TAGS: u8 = 1 << 0;
    pub const CODED_PHY: u8 = 1 << 1;
    pub const PHY_1M: u8 = 1 << 2;
    pub const PHY_2M: u8 = 1 << 3;
    pub const CH_37: u8 = 1 << 4;
    pub const CH_38: u8 = 1 << 5;
    pub const CH_39: u8 = 1 << 6;
}

/// Encode/decode service for the serial link.
pub trait WireCodec {
    /// Decode the frame at the start of `window`.
    ///
    /// Returns the frame and the number of bytes it occupied. Bytes after the
    /// frame are left to the caller.
    fn decode(&self, window: &[u8]) -> Result<(Frame, usize), DecodeError>;

    fn encode(&self, response: &Response) -> Result<Vec<u8>, EncodeError>;
}

/// The codec spoken by the host tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaUartCodec;

impl WireCodec for CaUartCodec {
    fn decode(&self, window: &[u8]) -> Result<(Frame, usize), DecodeError> {
        if window.len() < FRAME_OVERHEAD {
            return Err(DecodeError::TooShort(window.len()));
        }
        if window[0] != STX {
            return Err(DecodeError::StartMarker);
        }

        let payload_len = window[LEN_INDEX] as usize;
        let total = payload_len + FRAME_OVERHEAD;
        if window.len() < total {
            return Err(DecodeError::TooShort(window.len()));
        }
        if window[total - 1] != ETX {
            return Err(DecodeError::EndMarker);
        }

        let crc_index = PAYLOAD_INDEX + payload_len;
        let expected = crc16_ccitt_false(&window[LEN_INDEX..crc_index]);
        let actual = u16::from_le_bytes([window[crc_index], window[crc_index + 1]]);
        if expected != actual {
            return Err(DecodeError::Checksum { expected, actual });
        }

        let code = window[CMD_INDEX];
        let command = Command::try_from(code).map_err(DecodeError::UnknownCommand)?;
        let params = decode_params(command, &window[PAYLOAD_INDEX..crc_index])?;

        Ok((Frame::new(command, params), total))
    }

    fn encode(&self, response: &Response) -> Result<Vec<u8>, EncodeError> {
        let (command, payload) = match response {
            Response::Ack { command, ok } => (
                Command::Ack,
                vec![command.code(), DELIMITER, u8::from(*ok), DELIMITER],
            ),
            Response::DeviceId {
                comm_id,
                radio_addr,
            } => {
                let mut payload = Vec::with_capacity(18);
                payload.extend_from_slice(&comm_id.to_le_bytes());
                payload.push(DELIMITER);
                payload.extend_from_slice(&radio_addr.to_le_bytes());
                payload.push(DELIMITER);
                (Command::DeviceId, payload)
            }
            Response::AdvReport(adv) => {
                let mut payload = Vec::with_capacity(adv.addr.len() + adv.data.len() + 16);
                payload.extend_from_slice(&adv.addr);
                payload.push(DELIMITER);
                payload.extend_from_slice(&adv.data);
                payload.push(DELIMITER);
                for field in [
                    adv.rssi as u8,
                    u8::from(adv.is_coded_phy),
                    adv.primary_phy as u8,
                    adv.secondary_phy as u8,
                    adv.ch_index,
                    adv.tx_power as u8,
                ] {
                    payload.push(field);
                    payload.push(DELIMITER);
                }
                (Command::AdvReport, payload)
            }
            Response::GetAll => (Command::GetAll, Vec::new()),
        };

        build_frame(command, &payload)
    }
}

/// Wrap a parameter block into a complete frame.
pub fn build_frame(command: Command, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::TooLong(payload.len()));
    }

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.push(STX);
    frame.push(payload.len() as u8);
    frame.push(command.code());
    frame.extend_from_slice(payload);
    let crc = crc16_ccitt_false(&frame[LEN_INDEX..]);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.push(ETX);
    Ok(frame)
}

fn decode_params(command: Command, payload: &[u8]) -> Result<CommandParams, DecodeError> {
    let bad = || DecodeError::Params(command.code());

    match command {
        Command::GetDeviceId => Ok(CommandParams::None),
        Command::SetFltrTags
        | Command::SetCodedPhy
        | Command::SetScan1MbPhy
        | Command::SetScan2MbPhy
        | Command::SetCh37
        | Command::SetCh38
        | Command::SetCh39 => match payload {
            [state, DELIMITER] => Ok(CommandParams::Bool(*state != 0)),
            _ => Err(bad()),
        },
        Command::SetFltrId => match payload {
            [lo, hi, DELIMITER] => Ok(CommandParams::FilterId(u16::from_le_bytes([*lo, *hi]))),
            _ => Err(bad()),
        },
        Command::SetAll => match payload {
            [lo, hi, DELIMITER, flags, DELIMITER, max_adv_len, DELIMITER] => {
                let set = |bit: u8| flags & bit != 0;
                Ok(CommandParams::All(AllParams {
                    fltr_id: u16::from_le_bytes([*lo, *hi]),
                    fltr_tags: set(all_flags::FLTR_TAGS),
                    use_coded_phy: set(all_flags::CODED_PHY),
                    use_1m_phy: set(all_flags::PHY_1M),
                    use_2m_phy: set(all_flags::PHY_2M),
                    ch_37: set(all_flags::CH_37),
                    ch_38: set(all_flags::CH_38),
                    ch_39: set(all_flags::CH_39),
                    max_adv_len: *max_adv_len,
                }))
            }
            _ => Err(bad()),
        },
        // Device-to-host codes are never accepted from the host.
        Command::AdvReport | Command::DeviceId | Command::GetAll | Command::Ack => {
            Err(DecodeError::UnknownCommand(command.code()))
        }
    }
}

/// Host-side helper: the parameter block of a SET_ALL frame.
pub fn set_all_payload(params: &AllParams) -> Vec<u8> {
    let mut flags = 0u8;
    for (on, bit) in [
        (params.fltr_tags, all_flags::FLTR_TAGS),
        (params.use_coded_phy, all_flags::CODED_PHY),
        (params.use_1m_phy, all_flags::PHY_1M),
        (params.use_2m_phy, all_flags::PHY_2M),
        (params.ch_37, all_flags::CH_37),
        (params.ch_38, all_flags::CH_38),
        (params.ch_39, all_flags::CH_39),
    ] {
        if on {
            flags |= bit;
        }
    }
    let id = params.fltr_id.to_le_bytes();
    vec![
        id[0],
        id[1],
        DELIMITER,
        flags,
        DELIMITER,
        params.max_adv_len,
        DELIMITER,
    ]
}

pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

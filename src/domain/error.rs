//! Error types shared by the bridge components.
//!
//! Every fallible operation reports one of these as its status. The
//! deferred-task runner logs them and keeps going.

use thiserror::Error;

/// Why a byte window could not be turned into a [`Frame`](super::models::Frame).
///
/// Truncation and corruption look the same from a single window, so callers
/// treat most variants as "retry once more bytes arrive". See
/// [`DecodeError::is_rejected_frame`] for the exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("window too short ({0} bytes)")]
    TooShort(usize),
    #[error("missing start marker")]
    StartMarker,
    #[error("missing end marker")]
    EndMarker,
    #[error("checksum mismatch (expected {expected:#06x}, got {actual:#06x})")]
    Checksum { expected: u16, actual: u16 },
    #[error("unknown command {0:#04x}")]
    UnknownCommand(u8),
    #[error("malformed parameters for command {0:#04x}")]
    Params(u8),
}

impl DecodeError {
    /// Markers, length and checksum were valid but the content was not.
    ///
    /// The window holds a complete frame, so more bytes cannot fix it.
    pub fn is_rejected_frame(&self) -> bool {
        matches!(self, Self::UnknownCommand(_) | Self::Params(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("payload of {0} bytes does not fit a frame")]
    TooLong(usize),
    #[error("codec refused the message")]
    Internal,
}

/// Failures reported by the hardware collaborators (radio, scanner, serial, GPIO).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    #[error("resource already initialized")]
    InvalidState,
    #[error("peripheral busy")]
    Busy,
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("not supported on this board: {0}")]
    NotSupported(&'static str),
    #[error("no input given")]
    NullInput,
    #[error("advertisement of {0} bytes is too large")]
    DataTooLarge(usize),
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("could not encode message: {0}")]
    InvalidData(EncodeError),
    #[error("deferred-execution queue is full")]
    QueueFull,
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("reassembly buffer overflow ({capacity} bytes)")]
    BufferOverflow { capacity: usize },
    #[error("collaborator failure: {0}")]
    Hal(#[from] HalError),
}

pub type BridgeResult<T = ()> = Result<T, BridgeError>;

/// Keeps the first failure of a run of independent sub-operations.
///
/// Later sub-operations still execute; their errors are logged by the caller
/// but only the first one sticks.
#[derive(Debug, Default)]
pub struct FirstError {
    first: Option<BridgeError>,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: BridgeResult) {
        if let Err(e) = result {
            if self.first.is_none() {
                self.first = Some(e);
            } else {
                tracing::debug!("Additional failure suppressed: {}", e);
            }
        }
    }

    pub fn finish(self) -> BridgeResult {
        match self.first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

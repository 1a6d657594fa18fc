//! UART Module
//!
//! Host link of the bridge.
//!
//! ## Architecture
//!
//! ```text
//!  UART bytes                                  captured advertisements
//!      │                                                  │
//!      ▼                                                  ▼
//! ┌─────────────┐    ┌───────────────┐           ┌──────────────┐
//! │ Reassembly  │───▶│  Dispatcher   │           │  Forwarder   │
//! │ (carry-over │    │ (decode, apply│           │ (filter,     │
//! │  buffer)    │    │  config, ack) │           │  encode)     │
//! └─────────────┘    └──────┬────────┘           └──────┬───────┘
//!                           │                           │
//!                           ▼                           ▼
//!                    ┌────────────────────────────────────────┐
//!                    │          Protocol (WireCodec)          │
//!                    │  STX LEN CMD params CRC16 ETX framing  │
//!                    └────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Frame layout, command codes and the codec
//! - [`reassembly`] - Fixed-capacity carry-over buffer
//! - [`dispatcher`] - Frame reassembly and the command dispatch table
//! - [`forwarder`] - Advertisement filtering and reporting

pub mod dispatcher;
pub mod forwarder;
pub mod protocol;
pub mod reassembly;

pub use dispatcher::FrameDispatcher;
pub use protocol::{CaUartCodec, WireCodec};

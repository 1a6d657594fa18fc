//! BLE advertisement scanner bridge.
//!
//! Scans BLE advertisements, filters them by manufacturer id and forwards them
//! to a host over a framed UART protocol. The host configures the scan with
//! the same protocol.

pub mod domain;
pub mod infrastructure;

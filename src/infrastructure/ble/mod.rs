//! BLE scanning.
//!
//! - [`scanner`] - Scan controller: radio/scanner lifecycle and PHY alternation

pub mod scanner;

pub use scanner::{ScanController, ScanState};

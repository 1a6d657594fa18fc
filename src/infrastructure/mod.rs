pub mod ble;
pub mod deferred;
pub mod hal;
pub mod logging;
pub mod service;
pub mod sim;
pub mod uart;

pub use service::BridgeService;

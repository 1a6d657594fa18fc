//! Scan configuration store.
//!
//! A single [`ScanConfig`] lives for the whole device session. The frame
//! dispatcher writes it on host commands and the scan controller reads it on
//! every (re)start; both run on the main loop so no locking is involved.

use crate::domain::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

/// Manufacturer id handed to the scanner when filtering is off.
pub const UNKNOWN_MANUFACTURER_ID: u16 = 0xFFFF;

/// Ruuvi Innovations company identifier.
pub const DEFAULT_MANUFACTURER_ID: u16 = 0x0499;

/// The three primary advertising channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channels {
    pub ch37: bool,
    pub ch38: bool,
    pub ch39: bool,
}

impl Channels {
    pub const ALL: Channels = Channels {
        ch37: true,
        ch38: true,
        ch39: true,
    };

    pub fn new(ch37: bool, ch38: bool, ch39: bool) -> Self {
        Self { ch37, ch38, ch39 }
    }

    pub fn any(&self) -> bool {
        self.ch37 || self.ch38 || self.ch39
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modulation {
    /// Coded PHY, 125 kbps long range
    Coded125k,
    OneMbps,
    TwoMbps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModulationFlags {
    pub coded_125k: bool,
    pub phy_1m: bool,
    pub phy_2m: bool,
}

impl ModulationFlags {
    pub fn any(&self) -> bool {
        self.coded_125k || self.any_standard()
    }

    /// 1M or 2M enabled.
    pub fn any_standard(&self) -> bool {
        self.phy_1m || self.phy_2m
    }
}

/// Which half of the PHY alternation the radio is configured for.
///
/// `Standard` receives 1M and 2M together, `Coded` receives only the long range PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhyState {
    Coded,
    #[default]
    Standard,
}

impl PhyState {
    /// Radio base rate for this state.
    pub fn base_modulation(self) -> Modulation {
        match self {
            PhyState::Coded => Modulation::Coded125k,
            PhyState::Standard => Modulation::OneMbps,
        }
    }
}

/// Boot-time values for the store, normally read from the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDefaults {
    #[serde(default)]
    pub channels: Channels,
    #[serde(default)]
    pub modulation: ModulationFlags,
    #[serde(default = "default_true")]
    pub manufacturer_filter_enabled: bool,
    #[serde(default = "default_manufacturer_id")]
    pub manufacturer_id: u16,
    #[serde(default)]
    pub max_adv_length: u8,
}

impl Default for ScanDefaults {
    fn default() -> Self {
        Self {
            channels: Channels::ALL,
            modulation: ModulationFlags::default(),
            manufacturer_filter_enabled: default_true(),
            manufacturer_id: default_manufacturer_id(),
            max_adv_length: 0,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_manufacturer_id() -> u16 {
    DEFAULT_MANUFACTURER_ID
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    manufacturer_filter_enabled: bool,
    manufacturer_id: u16,
    channels: Channels,
    modulation_enabled: ModulationFlags,
    active_phy_is_coded: bool,
    max_adv_length: u8,
    coded_phy_supported: bool,
}

impl ScanConfig {
    pub fn new(defaults: &ScanDefaults, coded_phy_supported: bool) -> Self {
        let channels = if defaults.channels.any() {
            defaults.channels
        } else {
            tracing::warn!("Default channel set is empty, scanning all primary channels");
            Channels::ALL
        };

        let mut modulation_enabled = defaults.modulation;
        if modulation_enabled.coded_125k && !coded_phy_supported {
            tracing::warn!("Coded PHY enabled in defaults but not supported by this board");
            modulation_enabled.coded_125k = false;
        }

        Self {
            manufacturer_filter_enabled: defaults.manufacturer_filter_enabled,
            manufacturer_id: defaults.manufacturer_id,
            channels,
            modulation_enabled,
            active_phy_is_coded: false,
            max_adv_length: defaults.max_adv_length,
            coded_phy_supported,
        }
    }

    pub fn manufacturer_filter_set(&mut self, enabled: bool) -> BridgeResult {
        self.manufacturer_filter_enabled = enabled;
        Ok(())
    }

    pub fn manufacturer_filter_enabled(&self) -> bool {
        self.manufacturer_filter_enabled
    }

    /// Allowed manufacturer id, or `None` when every advertisement passes.
    pub fn manufacturer_filter(&self) -> Option<u16> {
        self.manufacturer_filter_enabled.then_some(self.manufacturer_id)
    }

    pub fn manufacturer_id_set(&mut self, id: u16) -> BridgeResult {
        self.manufacturer_id = id;
        Ok(())
    }

    pub fn manufacturer_id(&self) -> u16 {
        self.manufacturer_id
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Replace the channel set. An empty set is rejected and the old one kept.
    pub fn channels_set(&mut self, channels: Channels) -> BridgeResult {
        if !channels.any() {
            return Err(BridgeError::InvalidParameter(
                "at least one advertising channel must stay enabled",
            ));
        }
        self.channels = channels;
        Ok(())
    }

    pub fn modulation_enable(&mut self, modulation: Modulation, enable: bool) -> BridgeResult {
        match modulation {
            Modulation::Coded125k => {
                if !self.coded_phy_supported {
                    return Err(BridgeError::NotSupported("coded PHY"));
                }
                self.modulation_enabled.coded_125k = enable;
            }
            Modulation::OneMbps => self.modulation_enabled.phy_1m = enable,
            Modulation::TwoMbps => self.modulation_enabled.phy_2m = enable,
        }
        Ok(())
    }

    pub fn modulation_enabled(&self) -> ModulationFlags {
        self.modulation_enabled
    }

    pub fn max_adv_length_set(&mut self, len: u8) {
        self.max_adv_length = len;
    }

    pub fn max_adv_length(&self) -> u8 {
        self.max_adv_length
    }

    pub fn active_phy_is_coded(&self) -> bool {
        self.active_phy_is_coded
    }

    pub fn phy_state(&self) -> PhyState {
        if self.active_phy_is_coded {
            PhyState::Coded
        } else {
            PhyState::Standard
        }
    }

    pub fn coded_phy_supported(&self) -> bool {
        self.coded_phy_supported
    }

    /// Toggle between the coded and the standard half when the other half has
    /// something enabled, otherwise stay put.
    pub(crate) fn advance_phy(&mut self) -> PhyState {
        let flags = self.modulation_enabled;
        let next = match self.phy_state() {
            PhyState::Coded if flags.any_standard() => PhyState::Standard,
            PhyState::Standard if flags.coded_125k => PhyState::Coded,
            current => current,
        };
        self.active_phy_is_coded = next == PhyState::Coded;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(coded_supported: bool) -> ScanConfig {
        ScanConfig::new(&ScanDefaults::default(), coded_supported)
    }

    #[test]
    fn test_channels_all_off_rejected() {
        let mut cfg = config(true);
        cfg.channels_set(Channels::new(true, false, true)).unwrap();

        let result = cfg.channels_set(Channels::new(false, false, false));

        assert!(matches!(result, Err(BridgeError::InvalidParameter(_))));
        assert_eq!(cfg.channels(), Channels::new(true, false, true));
    }

    #[test]
    fn test_coded_unsupported() {
        let mut cfg = config(false);

        let result = cfg.modulation_enable(Modulation::Coded125k, true);

        assert!(matches!(result, Err(BridgeError::NotSupported(_))));
        assert!(!cfg.modulation_enabled().coded_125k);
    }

    #[test]
    fn test_modulation_flags() {
        let mut cfg = config(true);
        cfg.modulation_enable(Modulation::TwoMbps, true).unwrap();
        cfg.modulation_enable(Modulation::Coded125k, true).unwrap();
        cfg.modulation_enable(Modulation::Coded125k, false).unwrap();

        let flags = cfg.modulation_enabled();
        assert!(!flags.coded_125k);
        assert!(!flags.phy_1m);
        assert!(flags.phy_2m);
        assert!(flags.any());
    }

    #[test]
    fn test_filter_reports_id_only_when_enabled() {
        let mut cfg = config(true);
        cfg.manufacturer_id_set(0x0101).unwrap();
        assert_eq!(cfg.manufacturer_filter(), Some(0x0101));

        cfg.manufacturer_filter_set(false).unwrap();
        assert_eq!(cfg.manufacturer_filter(), None);
    }

    #[test]
    fn test_phy_alternation() {
        let mut cfg = config(true);
        cfg.modulation_enable(Modulation::Coded125k, true).unwrap();
        cfg.modulation_enable(Modulation::OneMbps, true).unwrap();

        assert_eq!(cfg.advance_phy(), PhyState::Coded);
        assert!(cfg.active_phy_is_coded());
        assert_eq!(cfg.advance_phy(), PhyState::Standard);
        assert!(!cfg.active_phy_is_coded());
        assert_eq!(cfg.advance_phy(), PhyState::Coded);
    }

    #[test]
    fn test_phy_stays_without_alternative() {
        let mut cfg = config(true);
        cfg.modulation_enable(Modulation::TwoMbps, true).unwrap();
        assert_eq!(cfg.advance_phy(), PhyState::Standard);
        assert_eq!(cfg.advance_phy(), PhyState::Standard);

        cfg.modulation_enable(Modulation::TwoMbps, false).unwrap();
        cfg.modulation_enable(Modulation::Coded125k, true).unwrap();
        assert_eq!(cfg.advance_phy(), PhyState::Coded);
        assert_eq!(cfg.advance_phy(), PhyState::Coded);
    }

    #[test]
    fn test_empty_default_channels_replaced() {
        let defaults = ScanDefaults {
            channels: Channels::new(false, false, false),
            ..Default::default()
        };
        let cfg = ScanConfig::new(&defaults, true);
        assert_eq!(cfg.channels(), Channels::ALL);
    }
}

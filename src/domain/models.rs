/// Maximum advertisement payload the radio hands over (legacy + extended).
pub const ADV_DATA_MAX_LEN: usize = 255;

/// Length of a BLE device address.
pub const MAC_ADDRESS_LEN: usize = 6;

/// PHY reported for a received packet, as carried in an advertisement report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ReportPhy {
    #[default]
    NotSet = 0,
    OneMbps = 1,
    TwoMbps = 2,
    Coded = 3,
    Auto = 4,
}

/// One radio receive event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub addr: [u8; MAC_ADDRESS_LEN],
    pub rssi: i8,
    pub data: Vec<u8>,
    pub is_coded_phy: bool,
    pub primary_phy: ReportPhy,
    pub secondary_phy: ReportPhy,
    pub ch_index: u8,
    /// `i8::MAX` when the advertiser did not report a TX power.
    pub tx_power: i8,
}

impl Advertisement {
    /// Company identifier of the first Manufacturer Specific Data record.
    ///
    /// The payload is a sequence of `[len, type, data...]` AD structures where
    /// `len` counts the type byte and the data.
    pub fn manufacturer_id(&self) -> Option<u16> {
        const AD_TYPE_MANUFACTURER_SPECIFIC: u8 = 0xFF;

        let mut index = 0;
        while index < self.data.len() {
            let len = self.data[index] as usize;
            if len == 0 {
                break;
            }
            let end = index + 1 + len;
            if end > self.data.len() {
                return None;
            }
            let ad_type = self.data[index + 1];
            if ad_type == AD_TYPE_MANUFACTURER_SPECIFIC && len >= 3 {
                return Some(u16::from_le_bytes([
                    self.data[index + 2],
                    self.data[index + 3],
                ]));
            }
            index = end;
        }
        None
    }
}

/// Host command codes. Values are fixed by the host tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    SetFltrTags = 5,
    SetFltrId = 6,
    SetCodedPhy = 7,
    SetScan1MbPhy = 8,
    SetScan2MbPhy = 9,
    SetCh37 = 10,
    SetCh38 = 11,
    SetCh39 = 12,
    SetAll = 15,
    AdvReport = 16,
    DeviceId = 17,
    GetDeviceId = 24,
    GetAll = 25,
    Ack = 32,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            5 => Self::SetFltrTags,
            6 => Self::SetFltrId,
            7 => Self::SetCodedPhy,
            8 => Self::SetScan1MbPhy,
            9 => Self::SetScan2MbPhy,
            10 => Self::SetCh37,
            11 => Self::SetCh38,
            12 => Self::SetCh39,
            15 => Self::SetAll,
            16 => Self::AdvReport,
            17 => Self::DeviceId,
            24 => Self::GetDeviceId,
            25 => Self::GetAll,
            32 => Self::Ack,
            other => return Err(other),
        })
    }
}

/// Everything a SET_ALL frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllParams {
    pub fltr_id: u16,
    pub fltr_tags: bool,
    pub use_coded_phy: bool,
    pub use_1m_phy: bool,
    pub use_2m_phy: bool,
    pub ch_37: bool,
    pub ch_38: bool,
    pub ch_39: bool,
    pub max_adv_len: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandParams {
    None,
    Bool(bool),
    FilterId(u16),
    All(AllParams),
}

/// One decoded host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub params: CommandParams,
}

impl Frame {
    pub fn new(command: Command, params: CommandParams) -> Self {
        Self { command, params }
    }
}

/// Device-to-host messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack { command: Command, ok: bool },
    DeviceId { comm_id: u64, radio_addr: u64 },
    AdvReport(Advertisement),
    GetAll,
}

/// What the UART driver reports from interrupt context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UartEvent {
    Received(Vec<u8>),
    Sent,
    Timeout,
}

/// What the advertisement scanner reports from interrupt context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Received(Advertisement),
    Timeout,
}

/// Work handed from interrupt context to the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    UartRx(Vec<u8>),
    Broadcast(Advertisement),
    ScanTimeout,
    SendAck { command: Command, ok: bool },
    SendDeviceId,
    TxFinished,
}

use core::fmt;

use binrw::{BinRead, BinWrite};
use modular_bitfield::{bitfield, prelude::*};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Caller assigned identifier of one logical scan filter.
pub type FilterIndex = u8;

/// Handle returned for every command handed to the controller. The matching
/// completion (or drop notice) carries the same ticket.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticket(pub u16);

/// Bluetooth device address, stored most significant byte first.
#[derive(PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub const EMPTY: BdAddr = BdAddr([0u8; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Bytes in over-the-air order (LSB first).
    pub fn to_le_bytes(&self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BdAddr({})", self)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BdAddr {
    fn format(&self, fmt: defmt::Formatter) {
        let b = &self.0;
        defmt::write!(fmt, "{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}", b[0], b[1], b[2], b[3], b[4], b[5]);
    }
}

// Host side address types. The filter command itself only knows
// public / random / any, see `condition::FILTER_ADDR_TYPE_ANY`.
#[derive(TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AddrType {
    Public = 0x00,
    Random = 0x01,
    PublicId = 0x02,
    RandomId = 0x03,
}

#[derive(BinRead, BinWrite, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
#[repr(u8)]
pub enum Action {
    Add = 0x00,
    Delete = 0x01,
    Clear = 0x02,
}

/// First byte of every vendor filter command, echoed back in the reply.
#[derive(BinRead, BinWrite, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
#[repr(u8)]
pub enum Subcode {
    Enable = 0x00,
    FeatureSelection = 0x01,
    Address = 0x02,
    ServiceUuid = 0x03,
    SolicitedUuid = 0x04,
    LocalName = 0x05,
    ManufacturerData = 0x06,
    ServiceDataPattern = 0x07,
    All = 0x08,
}

impl Subcode {
    /// Condition type whose counter a reply to this subcode updates.
    pub fn condition_type(self) -> Option<ConditionType> {
        use Subcode::*;
        match self {
            Address => Some(ConditionType::Address),
            ServiceUuid => Some(ConditionType::ServiceUuid),
            SolicitedUuid => Some(ConditionType::SolicitedUuid),
            LocalName => Some(ConditionType::LocalName),
            ManufacturerData => Some(ConditionType::ManufacturerData),
            ServiceDataPattern => Some(ConditionType::ServiceDataPattern),
            All => Some(ConditionType::All),
            Enable | FeatureSelection => None,
        }
    }
}

/// Index into the per-slot counter array.
#[derive(TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConditionType {
    Address = 0,
    ServiceData = 1,
    ServiceUuid = 2,
    SolicitedUuid = 3,
    LocalName = 4,
    ManufacturerData = 5,
    ServiceDataPattern = 6,
    All = 7,
}

impl ConditionType {
    pub const COUNT: usize = 8;

    /// Types that are never keyed by address in the slot table.
    pub fn is_address_agnostic(self) -> bool {
        matches!(
            self,
            ConditionType::ManufacturerData | ConditionType::LocalName | ConditionType::ServiceDataPattern
        )
    }
}

#[derive(BinRead, BinWrite, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
pub enum Logic {
    #[default]
    Or = 0x00,
    And = 0x01,
}

#[derive(BinRead, BinWrite, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
pub enum DeliveryMode {
    #[default]
    Immediate = 0x00,
    OnFound = 0x01,
    Batched = 0x02,
}

/// Which conditions of a filter index take part in matching.
#[bitfield]
#[derive(BinRead, BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(map = Self::from_bytes)]
#[bw(map = |&x| Self::into_bytes(x))]
pub struct FeatureMask {
    pub address: bool,
    pub service_data: bool,
    pub service_uuid: bool,
    pub solicited_uuid: bool,
    pub local_name: bool,
    pub manufacturer_data: bool,
    pub service_data_pattern: bool,
    #[skip]
    __: B9,
}

impl From<u16> for FeatureMask {
    fn from(value: u16) -> Self {
        Self::from_bytes(value.to_le_bytes())
    }
}

impl From<FeatureMask> for u16 {
    fn from(value: FeatureMask) -> Self {
        u16::from_le_bytes(value.into_bytes())
    }
}

/// Outcome reported to the caller of a filter operation.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApcfStatus {
    Success,
    ErrProcessing,
    ModeUnsupported,
    IllegalValue,
    UnknownAddr,
}

impl ApcfStatus {
    pub fn from_controller(status: u8) -> Self {
        if status == 0 {
            ApcfStatus::Success
        } else {
            ApcfStatus::ErrProcessing
        }
    }
}

//! UUID values used by the service and solicitation UUID conditions.
//!
//! The encoders only need to know how short a UUID can be written and how
//! to render it at 16, 32 or 128 bits, which is what [`FilterUuid`]
//! exposes. [`Uuid`] is the implementation used by the rest of the crate.

use core::fmt;

pub const NUM_BYTES_16: usize = 2;
pub const NUM_BYTES_32: usize = 4;
pub const NUM_BYTES_128: usize = 16;

// 00000000-0000-1000-8000-00805F9B34FB
const BASE_UUID: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb,
];

pub trait FilterUuid {
    /// Length in bytes of the shortest representation of this value.
    fn shortest_len(&self) -> usize;
    fn as_16bit(&self) -> u16;
    fn as_32bit(&self) -> u32;
    fn to_128bit_le(&self) -> [u8; 16];
    fn is_empty(&self) -> bool;
}

/// A 128-bit UUID, stored big-endian.
#[derive(PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uuid([u8; 16]);

impl Uuid {
    pub const EMPTY: Uuid = Uuid([0u8; 16]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn from_u16(uuid: u16) -> Self {
        Self::from_u32(uuid as u32)
    }

    pub const fn from_u32(uuid: u32) -> Self {
        let mut bytes = BASE_UUID;
        let be = uuid.to_be_bytes();
        bytes[0] = be[0];
        bytes[1] = be[1];
        bytes[2] = be[2];
        bytes[3] = be[3];
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    fn is_base_derived(&self) -> bool {
        self.0[4..] == BASE_UUID[4..]
    }
}

impl FilterUuid for Uuid {
    fn shortest_len(&self) -> usize {
        if !self.is_base_derived() {
            NUM_BYTES_128
        } else if self.0[0] == 0 && self.0[1] == 0 {
            NUM_BYTES_16
        } else {
            NUM_BYTES_32
        }
    }

    fn as_16bit(&self) -> u16 {
        u16::from_be_bytes([self.0[2], self.0[3]])
    }

    fn as_32bit(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    fn to_128bit_le(&self) -> [u8; 16] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shortest_len() {
            NUM_BYTES_16 => write!(f, "Uuid({:04x})", self.as_16bit()),
            NUM_BYTES_32 => write!(f, "Uuid({:08x})", self.as_32bit()),
            _ => {
                f.write_str("Uuid(")?;
                for (i, b) in self.0.iter().enumerate() {
                    if matches!(i, 4 | 6 | 8 | 10) {
                        f.write_str("-")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                f.write_str(")")
            }
        }
    }
}

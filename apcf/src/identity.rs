//! Temporary device records backing address filters that carry an IRK.
//!
//! The controller can only resolve private addresses of devices it has a key
//! for, so an address filter with an IRK gets a device record of its own.
//! Those records are removed again when the filter goes away, unless the
//! device bonded in the meantime.

use heapless::FnvIndexMap;

use crate::types::{AddrType, BdAddr, FilterIndex};
use crate::{warn, ApcfError};

pub const IDENTITY_MAP_CAPACITY: usize = 16;

pub type Irk = [u8; 16];

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdentityKey {
    pub irk: Irk,
    pub identity_addr: BdAddr,
    pub identity_addr_type: AddrType,
}

/// Device record and address resolution services of the host stack.
pub trait SecurityManager {
    /// Maps a resolvable private address to its identity, if known.
    fn resolve_identity(&self, address: BdAddr, addr_type: AddrType) -> (BdAddr, AddrType);
    fn find_device(&self, address: &BdAddr) -> bool;
    fn alloc_device(&mut self, address: BdAddr);
    /// Fails while the device is connected.
    fn delete_device(&mut self, address: &BdAddr) -> bool;
    fn is_bonded(&self, address: &BdAddr) -> bool;
    fn add_identity_key(&mut self, address: BdAddr, key: IdentityKey);
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdentityOutcome {
    /// Empty IRK, nothing to do.
    NotRequired,
    /// Some other part of the stack owns a record for this address.
    ExistingRecord,
    Installed,
}

#[derive(Default, Debug)]
pub struct IdentityTracker {
    pending: FnvIndexMap<FilterIndex, BdAddr, IDENTITY_MAP_CAPACITY>,
}

impl IdentityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, filter_index: FilterIndex) -> Option<BdAddr> {
        self.pending.get(&filter_index).copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sets up a temporary record for an address filter about to be added.
    ///
    /// Fails with [`ApcfError::DeviceBusy`] when the record left behind by an
    /// earlier filter on the same index cannot be deleted; the add must not
    /// go ahead in that case.
    pub fn prepare<S: SecurityManager>(
        &mut self,
        security: &mut S,
        filter_index: FilterIndex,
        address: BdAddr,
        addr_type: AddrType,
        irk: &Irk,
    ) -> Result<IdentityOutcome, ApcfError> {
        if irk.iter().all(|b| *b == 0) {
            return Ok(IdentityOutcome::NotRequired);
        }

        if let Some(previous) = self.pending(filter_index) {
            warn!("replacing existing filter index entry with new address");
            // A bonded record stays; only the bookkeeping entry goes.
            if !security.is_bonded(&previous) && !security.delete_device(&previous) {
                warn!("unable to remove device, still connected");
                return Err(ApcfError::DeviceBusy(previous));
            }
            self.pending.remove(&filter_index);
        }

        if security.find_device(&address) {
            warn!("address record already exists for {}", address);
            return Ok(IdentityOutcome::ExistingRecord);
        }

        if self.pending.insert(filter_index, address).is_err() {
            return Err(ApcfError::IdentityMapFull);
        }
        security.alloc_device(address);
        security.add_identity_key(
            address,
            IdentityKey {
                irk: *irk,
                identity_addr: address,
                identity_addr_type: addr_type,
            },
        );
        Ok(IdentityOutcome::Installed)
    }

    /// Drops the record created for `filter_index`, unless it bonded. The
    /// entry is forgotten even when the device could not be deleted.
    pub fn release<S: SecurityManager>(&mut self, security: &mut S, filter_index: FilterIndex) -> Option<BdAddr> {
        let address = self.pending.remove(&filter_index)?;
        if !security.is_bonded(&address) && !security.delete_device(&address) {
            warn!("unable to remove device {}, still connected", address);
        }
        Some(address)
    }
}

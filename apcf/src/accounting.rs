//! Host side ledger of how many conditions of each type the controller holds.
//!
//! Slot 0 is the generic slot used by conditions that are not keyed by
//! address. Slots `1..=max_filter` are bound lazily to device addresses.
//! Counters only move after the controller acknowledged an operation.

use heapless::Vec;

use crate::types::{Action, BdAddr, ConditionType};
use crate::{debug, error};

/// Returned whenever no counter was located and updated.
pub const INVALID_COUNTER: u8 = 0xff;

pub const GENERIC_SLOT: usize = 0;

/// Generic slot plus the largest `max_filter` a controller can report.
pub const MAX_SLOTS: usize = u8::MAX as usize + 1;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressSlot {
    pub address: BdAddr,
    pub in_use: bool,
    pub counters: [u8; ConditionType::COUNT],
}

impl AddressSlot {
    pub fn counter(&self, cond_type: ConditionType) -> u8 {
        self.counters[cond_type as usize]
    }
}

#[derive(Clone, Debug)]
pub struct SlotTable {
    slots: Vec<AddressSlot, MAX_SLOTS>,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SlotTable {
    pub fn new(max_filter: u8) -> Self {
        let mut slots = Vec::new();
        slots
            .resize(max_filter as usize + 1, AddressSlot::default())
            .ok();
        Self { slots }
    }

    pub fn max_filter(&self) -> u8 {
        (self.slots.len() - 1) as u8
    }

    pub fn slot(&self, id: usize) -> Option<&AddressSlot> {
        self.slots.get(id)
    }

    pub fn generic(&self) -> &AddressSlot {
        &self.slots[GENERIC_SLOT]
    }

    /// `None` selects the generic slot.
    pub fn find_slot(&self, address: Option<&BdAddr>) -> Option<usize> {
        let Some(address) = address else {
            return Some(GENERIC_SLOT);
        };

        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.in_use && slot.address == *address)
            .map(|(id, _)| id)
    }

    pub fn allocate_slot(&mut self, address: BdAddr) -> Option<usize> {
        let (id, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| !slot.in_use)?;

        slot.address = address;
        slot.in_use = true;
        Some(id)
    }

    /// Zeroes slots. A `None` address with [`ConditionType::All`] wipes the
    /// generic slot only; any other `None` wipes every per-address slot.
    pub fn deallocate_slot(&mut self, address: Option<&BdAddr>, cond_type: ConditionType) -> bool {
        if cond_type == ConditionType::All && address.is_none() {
            self.slots[GENERIC_SLOT] = AddressSlot::default();
            return true;
        }

        let mut found = false;
        for slot in self.slots.iter_mut().skip(1) {
            if slot.in_use && address.map_or(true, |a| *a == slot.address) {
                *slot = AddressSlot::default();
                found = true;

                if address.is_some() {
                    break;
                }
            }
        }
        found
    }

    /// Applies one acknowledged operation to the ledger and returns the new
    /// counter value, or [`INVALID_COUNTER`] when nothing was counted.
    pub fn update_counter(
        &mut self,
        action: Action,
        cond_type: u8,
        address: Option<&BdAddr>,
        num_available: u8,
    ) -> u8 {
        let Ok(cond_type) = ConditionType::try_from(cond_type) else {
            error!("unknown filter condition type {}", cond_type);
            return INVALID_COUNTER;
        };

        let address = if cond_type.is_address_agnostic() {
            None
        } else {
            address
        };

        let id = match (self.find_slot(address), address) {
            (Some(id), _) => Some(id),
            (None, Some(address)) if action == Action::Add => {
                let id = self.allocate_slot(*address);
                if id.is_none() {
                    error!("no free filter slot for {}", address);
                }
                id
            }
            _ => None,
        };

        let Some(id) = id else {
            error!("no matching filter counter found");
            return INVALID_COUNTER;
        };

        let released = (cond_type == ConditionType::All && action == Action::Clear)
            || (cond_type == ConditionType::Address
                && matches!(action, Action::Delete | Action::Clear));
        if released {
            self.deallocate_slot(address, cond_type);
            return INVALID_COUNTER;
        }

        if cond_type == ConditionType::All {
            return INVALID_COUNTER;
        }

        let max_filter = self.max_filter();
        let counter = &mut self.slots[id].counters[cond_type as usize];
        if num_available > 0 {
            *counter = counter.saturating_add(1);
        }
        debug!(
            "counter = {}, maxfilt = {}, num_avbl = {}",
            *counter, max_filter, num_available
        );
        *counter
    }
}

/// Vendor capability version reported by the controller.
///
/// Tracking-entry counts in the feature selection command are only understood
/// by firmware newer than the L release.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipVersion(pub u16);

impl ChipVersion {
    pub const L_RELEASE: ChipVersion = ChipVersion(55);
    pub const M_RELEASE: ChipVersion = ChipVersion(95);

    pub fn supports_tracking_entries(self) -> bool {
        self > Self::L_RELEASE
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapabilityRecord {
    pub filter_support: bool,
    pub max_filter: u8,
    pub version: ChipVersion,
}

impl CapabilityRecord {
    /// Value used until the controller has been queried.
    pub const UNSUPPORTED: CapabilityRecord = CapabilityRecord {
        filter_support: false,
        max_filter: 0,
        version: ChipVersion(0),
    };

    pub fn is_filtering_supported(&self) -> bool {
        self.filter_support && self.max_filter != 0
    }
}

/// Source of the controller limits, queried once during init.
pub trait VendorCapabilities {
    fn read_vendor_capabilities(&mut self) -> CapabilityRecord;
}

impl VendorCapabilities for CapabilityRecord {
    fn read_vendor_capabilities(&mut self) -> CapabilityRecord {
        *self
    }
}

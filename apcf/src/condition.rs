//! Encoders for the `HCI_BLE_ADV_FILTER` sub-commands.
//!
//! Every sub-command starts with `[subcode][action][filter index]`. A clear
//! only ever sends that header; the condition specific body is left out.
//! Variable length fields are cut to the pattern budget without complaint.

use binrw::BinWrite;
use heapless::Vec;

use crate::capability::ChipVersion;
use crate::hci::{encode, ParamBuffer};
use crate::types::{Action, BdAddr, DeliveryMode, FeatureMask, FilterIndex, Logic, Subcode};
use crate::uuid::{FilterUuid, NUM_BYTES_128, NUM_BYTES_16, NUM_BYTES_32};
use crate::{debug, error, warn, ApcfError, MsgStr, MsgType};
use fixedstr::str_format;

/// Longest name or pattern the controller accepts for one condition.
pub const PF_STR_LEN_MAX: usize = 29;
/// Data fields that share the budget with a 2-byte sub-field.
pub const PF_DATA_LEN_MAX: usize = PF_STR_LEN_MAX - 2;

/// Length of the feature selection body sent on a per-index clear.
pub const FEATURE_SELECTION_LEN: usize = 18;
const FEATURE_CLEAR_PADDING: usize = FEATURE_SELECTION_LEN - 5;

/// The only address type the filter firmware matches resolved identities with.
pub const FILTER_ADDR_TYPE_ANY: u8 = 0x02;

pub type PatternBuffer = Vec<u8, PF_STR_LEN_MAX>;
pub type UuidBuffer = Vec<u8, NUM_BYTES_128>;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UuidKind {
    Service,
    Solicited,
}

impl UuidKind {
    pub fn subcode(self) -> Subcode {
        match self {
            UuidKind::Service => Subcode::ServiceUuid,
            UuidKind::Solicited => Subcode::SolicitedUuid,
        }
    }
}

#[derive(BinWrite, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct ConditionCommand {
    pub subcode: Subcode,
    pub action: Action,
    /// Only left out by the global feature selection clear.
    pub filter_index: Option<FilterIndex>,
    pub body: Option<ConditionBody>,
}

impl ConditionCommand {
    fn header(subcode: Subcode, action: Action, filter_index: FilterIndex) -> Self {
        Self {
            subcode,
            action,
            filter_index: Some(filter_index),
            body: None,
        }
    }

    fn with_body(mut self, body: ConditionBody) -> Self {
        if self.action != Action::Clear {
            self.body = Some(body);
        }
        self
    }

    pub fn encode(&self) -> Result<ParamBuffer, ApcfError> {
        encode(self)
    }
}

#[derive(BinWrite, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub enum ConditionBody {
    Address {
        #[bw(map = |a: &BdAddr| a.to_le_bytes())]
        address: BdAddr,
        addr_type: u8,
    },
    Uuid {
        #[bw(map = |x| x.as_slice())]
        uuid: UuidBuffer,
        #[bw(map = |x| x.as_slice())]
        mask: UuidBuffer,
    },
    LocalName {
        #[bw(map = |x| x.as_slice())]
        name: PatternBuffer,
    },
    ManufacturerData {
        company_id: u16,
        #[bw(map = |x| x.as_slice())]
        data: PatternBuffer,
        company_id_mask: u16,
        #[bw(map = |x| x.as_slice())]
        data_mask: PatternBuffer,
    },
    ServiceData {
        #[bw(map = |x| x.as_slice())]
        data: PatternBuffer,
        #[bw(map = |x| x.as_slice())]
        mask: PatternBuffer,
    },
    FeatureSelection(FeatureSelection),
    FeatureClear {
        feature_mask: u32,
        logic: Logic,
        padding: [u8; FEATURE_CLEAR_PADDING],
    },
}

#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct FeatureSelection {
    pub feature_mask: FeatureMask,
    pub list_logic: u16,
    pub filter_logic: u8,
    pub rssi_high_threshold: i8,
    pub delivery_mode: DeliveryMode,
    pub tracking: Option<Tracking>,
}

#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct Tracking {
    pub found_timeout: u16,
    pub found_timeout_count: u8,
    pub rssi_low_threshold: i8,
    pub lost_timeout: u16,
    pub num_tracking_entries: Option<u16>,
}

/// Per-index filter parameters, as handed in by the scanning layer.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterParams {
    pub feature_mask: FeatureMask,
    pub list_logic: u16,
    pub filter_logic: u8,
    pub rssi_high_threshold: i8,
    pub delivery_mode: DeliveryMode,
    pub found_timeout: u16,
    pub found_timeout_count: u8,
    pub rssi_low_threshold: i8,
    pub lost_timeout: u16,
    pub num_tracking_entries: u16,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            feature_mask: FeatureMask::new(),
            list_logic: 0,
            filter_logic: 0,
            rssi_high_threshold: -128,
            delivery_mode: DeliveryMode::Immediate,
            found_timeout: 0,
            found_timeout_count: 0,
            rssi_low_threshold: -128,
            lost_timeout: 0,
            num_tracking_entries: 0,
        }
    }
}

/// Cuts `bytes` to at most `max` bytes.
fn truncated<const N: usize>(bytes: &[u8], max: usize) -> Vec<u8, N> {
    let len = bytes.len().min(max).min(N);
    Vec::from_slice(&bytes[..len]).unwrap_or_default()
}

/// Mask bytes matching a data field of `len` bytes; missing bytes are zero.
fn mask_for<const N: usize>(mask: &[u8], len: usize) -> Vec<u8, N> {
    let mut out: Vec<u8, N> = truncated(mask, len);
    if out.len() < len {
        warn!("mask({}) shorter than data({}), padding with zeros", mask.len(), len);
        out.resize(len.min(N), 0).ok();
    }
    out
}

fn uuid_bytes<U: FilterUuid>(uuid: &U, len: usize) -> UuidBuffer {
    let bytes = match len {
        NUM_BYTES_16 => Vec::from_slice(&uuid.as_16bit().to_le_bytes()),
        NUM_BYTES_32 => Vec::from_slice(&uuid.as_32bit().to_le_bytes()),
        _ => Vec::from_slice(&uuid.to_128bit_le()),
    };
    bytes.unwrap_or_default()
}

/// `identity` must already be resolved; the wire address type is always "any".
pub fn address(action: Action, filter_index: FilterIndex, identity: BdAddr) -> ConditionCommand {
    ConditionCommand::header(Subcode::Address, action, filter_index).with_body(ConditionBody::Address {
        address: identity,
        addr_type: FILTER_ADDR_TYPE_ANY,
    })
}

pub fn uuid<U: FilterUuid>(
    action: Action,
    filter_index: FilterIndex,
    kind: UuidKind,
    uuid: &U,
    mask: &U,
) -> Result<ConditionCommand, ApcfError> {
    let command = ConditionCommand::header(kind.subcode(), action, filter_index);
    if action == Action::Clear {
        return Ok(command);
    }

    let len = uuid.shortest_len();
    if !matches!(len, NUM_BYTES_16 | NUM_BYTES_32 | NUM_BYTES_128) {
        error!("illegal UUID length: {}", len);
        return Err(ApcfError::IllegalValue(MsgType(str_format!(
            MsgStr,
            "illegal UUID length: {}",
            len
        ))));
    }

    let mask = if mask.is_empty() {
        let mut all = UuidBuffer::new();
        all.resize(len, 0xff).ok();
        all
    } else {
        uuid_bytes(mask, len)
    };

    Ok(command.with_body(ConditionBody::Uuid {
        uuid: uuid_bytes(uuid, len),
        mask,
    }))
}

pub fn local_name(action: Action, filter_index: FilterIndex, name: &[u8]) -> ConditionCommand {
    ConditionCommand::header(Subcode::LocalName, action, filter_index).with_body(ConditionBody::LocalName {
        name: truncated(name, PF_STR_LEN_MAX),
    })
}

/// Data and mask are only sent when both are present; a zero company id
/// mask matches every company.
pub fn manufacturer_data(
    action: Action,
    filter_index: FilterIndex,
    company_id: u16,
    company_id_mask: u16,
    data: &[u8],
    data_mask: &[u8],
) -> ConditionCommand {
    let (data, data_mask) = if !data.is_empty() && !data_mask.is_empty() {
        let data: PatternBuffer = truncated(data, PF_DATA_LEN_MAX);
        let mask = mask_for(data_mask, data.len());
        (data, mask)
    } else {
        (PatternBuffer::new(), PatternBuffer::new())
    };

    let command = ConditionCommand::header(Subcode::ManufacturerData, action, filter_index).with_body(
        ConditionBody::ManufacturerData {
            company_id,
            data,
            company_id_mask: if company_id_mask == 0 { 0xffff } else { company_id_mask },
            data_mask,
        },
    );
    debug!("manuf data command: {:?}", command);
    command
}

/// The mask is only sent alongside non-empty data.
pub fn service_data_pattern(
    action: Action,
    filter_index: FilterIndex,
    data: &[u8],
    mask: &[u8],
) -> ConditionCommand {
    let data: PatternBuffer = truncated(data, PF_DATA_LEN_MAX);
    let mask = if data.is_empty() {
        PatternBuffer::new()
    } else {
        mask_for(mask, data.len())
    };

    ConditionCommand::header(Subcode::ServiceDataPattern, action, filter_index)
        .with_body(ConditionBody::ServiceData { data, mask })
}

/// Feature selection for one filter index. The on-found/on-lost fields are
/// only present in tracking mode, the tracking entry count only on
/// controllers newer than the L release.
pub fn feature_selection(filter_index: FilterIndex, params: &FilterParams, version: ChipVersion) -> ConditionCommand {
    let tracking = (params.delivery_mode == DeliveryMode::OnFound).then(|| Tracking {
        found_timeout: params.found_timeout,
        found_timeout_count: params.found_timeout_count,
        rssi_low_threshold: params.rssi_low_threshold,
        lost_timeout: params.lost_timeout,
        num_tracking_entries: version
            .supports_tracking_entries()
            .then_some(params.num_tracking_entries),
    });

    ConditionCommand::header(Subcode::FeatureSelection, Action::Add, filter_index).with_body(
        ConditionBody::FeatureSelection(FeatureSelection {
            feature_mask: params.feature_mask,
            list_logic: params.list_logic,
            filter_logic: params.filter_logic,
            rssi_high_threshold: params.rssi_high_threshold,
            delivery_mode: params.delivery_mode,
            tracking,
        }),
    )
}

pub fn feature_delete(filter_index: FilterIndex) -> ConditionCommand {
    ConditionCommand::header(Subcode::FeatureSelection, Action::Delete, filter_index)
}

/// Deselects every feature of one index, logic defaulting to OR.
pub fn feature_clear_index(filter_index: FilterIndex) -> ConditionCommand {
    ConditionCommand {
        body: Some(ConditionBody::FeatureClear {
            feature_mask: 0,
            logic: Logic::Or,
            padding: [0u8; FEATURE_CLEAR_PADDING],
        }),
        ..ConditionCommand::header(Subcode::FeatureSelection, Action::Clear, filter_index)
    }
}

/// Clears the feature selection of every index at once.
pub fn feature_clear_all() -> ConditionCommand {
    ConditionCommand {
        subcode: Subcode::FeatureSelection,
        action: Action::Clear,
        filter_index: None,
        body: None,
    }
}

#[binrw::binwrite]
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct EnableCommand {
    #[bw(calc(Subcode::Enable))]
    subcode: Subcode,
    #[bw(map = |x: &bool| *x as u8)]
    pub enable: bool,
}

impl EnableCommand {
    pub fn new(enable: bool) -> Self {
        Self { enable }
    }

    pub fn encode(&self) -> Result<ParamBuffer, ApcfError> {
        encode(self)
    }
}

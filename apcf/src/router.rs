//! Validation of the replies the controller returns for filter commands and
//! their effect on the slot ledger.

use binrw::{io::Cursor, BinRead};

use crate::accounting::{SlotTable, INVALID_COUNTER};
use crate::types::{Action, ApcfStatus, BdAddr, Subcode};
use crate::{debug, error, ApcfError};

pub const FILTER_REPLY_LEN: usize = 4;
pub const ENABLE_REPLY_LEN: usize = 3;

#[derive(BinRead, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(little)]
pub struct FilterReply {
    pub status: u8,
    pub subcode: u8,
    pub action: u8,
    pub num_available: u8,
}

#[derive(BinRead, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(little)]
pub struct EnableReply {
    pub status: u8,
    pub subcode: u8,
    pub action: u8,
}

fn check_len(params: &[u8], expected: usize) -> Result<(), ApcfError> {
    if params.len() != expected {
        error!("bad length: {}", params.len());
        return Err(ApcfError::ResponseLength {
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}

fn check_subcode(expected: Subcode, actual: u8) -> Result<(), ApcfError> {
    if u8::from(expected) != actual {
        error!("incorrect subcode: 0x{:02x}, expected: {:?}", actual, expected);
        return Err(ApcfError::SubcodeMismatch { expected, actual });
    }
    Ok(())
}

impl FilterReply {
    pub fn parse(expected: Subcode, params: &[u8]) -> Result<Self, ApcfError> {
        check_len(params, FILTER_REPLY_LEN)?;
        let reply = <Self as BinRead>::read(&mut Cursor::new(params))
            .map_err(|_| ApcfError::PacketFormatError)?;
        check_subcode(expected, reply.subcode)?;
        Ok(reply)
    }
}

impl EnableReply {
    pub fn parse(params: &[u8]) -> Result<Self, ApcfError> {
        check_len(params, ENABLE_REPLY_LEN)?;
        let reply = <Self as BinRead>::read(&mut Cursor::new(params))
            .map_err(|_| ApcfError::PacketFormatError)?;
        check_subcode(Subcode::Enable, reply.subcode)?;
        Ok(reply)
    }
}

/// What a validated filter reply amounts to.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RoutedReply {
    pub action: Action,
    /// Free entries the controller reported for this condition type.
    pub available: u8,
    /// Ledger value after the update, [`INVALID_COUNTER`] when untouched.
    pub counter: u8,
    pub status: ApcfStatus,
}

/// Validates a reply to a filter sub-command and, when the controller
/// reports success, books it against `target` (or the generic slot).
///
/// Invalid replies leave the ledger untouched.
pub fn route_filter_reply(
    slots: &mut SlotTable,
    expected: Subcode,
    target: Option<&BdAddr>,
    params: &[u8],
) -> Result<RoutedReply, ApcfError> {
    let reply = FilterReply::parse(expected, params)?;
    let action = Action::try_from(reply.action).map_err(|_| {
        error!("unknown echoed action {}", reply.action);
        ApcfError::PacketFormatError
    })?;
    let status = ApcfStatus::from_controller(reply.status);

    debug!(
        "recd: {:?}, {}, {}, {}",
        expected, reply.action, reply.status, reply.num_available
    );

    let counter = match expected.condition_type() {
        Some(cond_type) if status == ApcfStatus::Success => {
            slots.update_counter(action, cond_type.into(), target, reply.num_available)
        }
        _ => INVALID_COUNTER,
    };

    Ok(RoutedReply {
        action,
        available: reply.num_available,
        counter,
        status,
    })
}

pub fn route_enable_reply(params: &[u8]) -> Result<(u8, ApcfStatus), ApcfError> {
    let reply = EnableReply::parse(params)?;
    Ok((reply.action, ApcfStatus::from_controller(reply.status)))
}

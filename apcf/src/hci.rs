use heapless::Vec;
use binrw::{binrw, io::Cursor, meta::WriteEndian, BinRead, BinResult, BinWrite, Endian};
use maybe_async::maybe_async;
use crate::ApcfError;

pub const EVT_PKT_HEADER_SIZE: usize = 2;
pub const EVT_PKT_PAYLOAD_MAX_SIZE: usize = 255;
pub const EVT_PKT_MAX_SIZE: usize = EVT_PKT_HEADER_SIZE + EVT_PKT_PAYLOAD_MAX_SIZE;

pub type EventPayloadBuffer = Vec<u8, EVT_PKT_PAYLOAD_MAX_SIZE>;

pub const EVT_PKT_HEADER_SIZE_COMMAND_COMPLETE: usize = 3;
pub const EVT_PKT_PAYLOAD_MAX_SIZE_COMMAND_COMPLETE: usize = EVT_PKT_PAYLOAD_MAX_SIZE - EVT_PKT_HEADER_SIZE_COMMAND_COMPLETE;
pub type EvtPayloadBufferCommandComplete = Vec<u8, EVT_PKT_PAYLOAD_MAX_SIZE_COMMAND_COMPLETE>;

pub const ACL_PKT_HEADER_SIZE: usize = 4;

pub const CMD_PKT_HEADER_SIZE: usize = 3;
// Largest filter command is manufacturer data: header, company id and mask,
// then data and mask of up to 27 bytes each.
pub const CMD_ADV_FILTER_PARAM_MAX_SIZE: usize = 64;
pub const CMD_PKT_MAX_SIZE: usize = CMD_PKT_HEADER_SIZE + CMD_ADV_FILTER_PARAM_MAX_SIZE;

pub type ParamBuffer = Vec<u8, CMD_ADV_FILTER_PARAM_MAX_SIZE>;

const fn max(a: usize, b: usize) -> usize {
    [a, b][(a < b) as usize]
}

pub const HCI_PKT_MAX_SIZE: usize = 1 + max(EVT_PKT_MAX_SIZE, CMD_PKT_MAX_SIZE);
pub type HCIPacketBuffer = Vec<u8, HCI_PKT_MAX_SIZE>;

pub mod hcicode {
    pub const COMMAND: u8 = 0x01;
    pub const ACL_DATA: u8 = 0x02;
    pub const EVENT: u8 = 0x04;
}

pub mod opcodes {
    /// OGF 0x3f (vendor specific), OCF 0x157.
    pub const LE_ADV_FILTER: u16 = 0xfd57;
}

fn parse_vec<R: binrw::io::Read + binrw::io::Seek, const N: usize>(count: usize, reader: &mut R, endian: Endian) -> BinResult<Vec<u8, N>> {
    let mut ret = Vec::new();
    for _ in 0..count.min(N) {
        let byte = <u8>::read_options(reader, endian, ())?;
        if ret.push(byte).is_err() {
            break;
        }
    }
    Ok(ret)
}

pub fn encode<T: BinWrite + WriteEndian, const SIZE: usize>(data: &T) -> Result<Vec<u8, SIZE>, ApcfError>
    where for<'a> <T as BinWrite>::Args<'a>: Default
{
    let mut buf = [0u8; SIZE];
    let mut writer = Cursor::new(&mut buf[..]);
    data.write(&mut writer).map_err(|_| ApcfError::PacketFormatError)?;
    let len = writer.position() as usize;
    Vec::from_slice(&buf[..len]).map_err(|_| ApcfError::PacketFormatError)
}

#[maybe_async]
async fn read_exact<T: crate::Read>(connector: &mut T, mut buf: &mut [u8]) -> Result<(), ApcfError> {
    while !buf.is_empty() {
        let l = connector.read(buf).await.map_err(|_| ApcfError::IOError)?;
        if l == 0 {
            return Err(ApcfError::IOError);
        }
        buf = &mut core::mem::take(&mut buf)[l..];
    }
    Ok(())
}

#[derive(BinWrite, Debug, PartialEq, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub enum HCIPacket {
    #[bw(magic = 0x01u8)]
    Command(AdvFilterCommand),
    // ACL payloads are skipped by `read`, only the marker is kept.
    #[bw(magic = 0x02u8)]
    ACLData,
    #[bw(magic = 0x04u8)]
    Event(EventPacket),
}

impl HCIPacket {
    pub fn encode(&self) -> Result<HCIPacketBuffer, ApcfError> {
        encode(self)
    }

    #[maybe_async]
    pub async fn read<T: crate::Read>(connector: &mut T) -> Result<Option<Self>, ApcfError> {
        let mut buffer = [0u8; 1];
        let l = connector.read(&mut buffer).await.map_err(|_| ApcfError::IOError)?;
        if l == 0 {
            return Ok(None);
        }

        Ok(Some(match buffer[0] {
            hcicode::EVENT => Self::Event(EventPacket::read(connector).await?),
            hcicode::ACL_DATA => {
                let mut header = [0u8; ACL_PKT_HEADER_SIZE];
                read_exact(connector, &mut header).await?;
                let mut remaining = u16::from_le_bytes([header[2], header[3]]) as usize;
                let mut scratch = [0u8; 32];
                while remaining > 0 {
                    let n = remaining.min(scratch.len());
                    read_exact(connector, &mut scratch[..n]).await?;
                    remaining -= n;
                }
                Self::ACLData
            }
            _ => return Err(ApcfError::PacketFormatError),
        }))
    }
}

#[binrw::parser(reader, endian)]
fn parse_vec_event_command_complete(count: u8) -> BinResult<EvtPayloadBufferCommandComplete> {
    parse_vec(count as usize, reader, endian)
}

#[binrw::parser(reader, endian)]
fn parse_vec_event_payload(count: u8) -> BinResult<EventPayloadBuffer> {
    parse_vec(count as usize, reader, endian)
}

#[binrw]
#[brw(little)]
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventPacket {
    #[brw(magic = 0x0eu8)]
    CommandComplete {
        #[bw(calc((return_parameters.len() + EVT_PKT_HEADER_SIZE_COMMAND_COMPLETE) as u8))]
        #[br(assert((len as usize) >= EVT_PKT_HEADER_SIZE_COMMAND_COMPLETE, "size error, {}", len))]
        len: u8,
        num_hci_command_packets: u8,
        command_opcode: u16,
        #[br(parse_with = parse_vec_event_command_complete, args(len - EVT_PKT_HEADER_SIZE_COMMAND_COMPLETE as u8))]
        #[bw(map = |x| x.as_slice())]
        return_parameters: EvtPayloadBufferCommandComplete,
    },
    // Everything this crate does not route is passed through untouched.
    Other {
        code: u8,
        #[bw(calc(payload.len() as u8))]
        len: u8,
        #[br(parse_with = parse_vec_event_payload, args(len))]
        #[bw(map = |x| x.as_slice())]
        payload: EventPayloadBuffer,
    },
}

impl EventPacket {
    #[maybe_async]
    pub async fn read<T: crate::Read>(connector: &mut T) -> Result<Self, ApcfError> {
        let mut buffer = [0u8; EVT_PKT_MAX_SIZE];
        read_exact(connector, &mut buffer[..EVT_PKT_HEADER_SIZE]).await?;
        let len = buffer[1] as usize;
        let tot_len = len + EVT_PKT_HEADER_SIZE;
        read_exact(connector, &mut buffer[EVT_PKT_HEADER_SIZE..tot_len]).await?;

        <Self as BinRead>::read(&mut Cursor::new(&buffer[..tot_len]))
            .map_err(|_| ApcfError::PacketFormatError)
    }
}

/// `HCI_BLE_ADV_FILTER` vendor command carrying one encoded sub-command.
/// Only ever written; the controller does not send commands.
#[binrw::binwrite]
#[bw(little)]
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvFilterCommand {
    #[bw(calc(opcodes::LE_ADV_FILTER))]
    opcode: u16,

    #[bw(calc(params.len() as u8))]
    len: u8,
    #[bw(map = |x| x.as_slice())]
    pub params: ParamBuffer,
}

impl AdvFilterCommand {
    pub fn new(params: ParamBuffer) -> Self {
        Self { params }
    }
}

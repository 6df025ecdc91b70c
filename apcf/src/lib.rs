#![no_std]

use fixedstr::str64;
use heapless::{Deque, Vec};

#[cfg(not(feature = "defmt"))]
use log::{debug, error, info, trace, warn};
#[cfg(feature = "defmt")]
use defmt::{debug, error, info, trace, warn};

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("log and defmt can't have both!");
#[cfg(not(any(feature = "log", feature = "defmt")))]
compile_error!("choose one of log or defmt");

use maybe_async::maybe_async;
use thiserror_no_std::Error;

use accounting::SlotTable;
use capability::{CapabilityRecord, VendorCapabilities};
use condition::{ConditionCommand, EnableCommand, FilterParams, UuidKind};
use hci::{opcodes, AdvFilterCommand, EventPacket, HCIPacket, ParamBuffer};
use identity::{IdentityOutcome, IdentityTracker, Irk, SecurityManager};
use types::{Action, AddrType, ApcfStatus, BdAddr, ConditionType, FilterIndex, Subcode, Ticket};
use uuid::{FilterUuid, Uuid};

pub mod accounting;
pub mod capability;
pub mod condition;
pub mod hci;
pub mod identity;
pub mod router;
pub mod types;
pub mod uuid;

#[cfg(feature = "sync")]
pub use embedded_io::{Read, Write};
#[cfg(feature = "async")]
pub use embedded_io_async::{Read, Write};

#[cfg(all(feature = "sync", feature = "async"))]
compile_error!("sync and async are conflict!, choose one");

/// Requests waiting behind the one the controller is working on.
pub const REQUEST_QUEUE_DEPTH: usize = 16;

pub type Tickets = Vec<Ticket, { REQUEST_QUEUE_DEPTH + 1 }>;

pub type MsgStr = str64;
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MsgType(pub MsgStr);

#[cfg(feature = "defmt")]
impl defmt::Format for MsgType {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.0.as_str());
    }
}

#[derive(Error, Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApcfError {
    #[error("Filtering Unsupported")]
    Unsupported,
    #[error("Illegal Value")]
    IllegalValue(MsgType),
    #[error("Unknown Address")]
    UnknownAddr,
    #[error("Request Queue Full")]
    QueueFull,
    #[error("Identity Map Full")]
    IdentityMapFull,
    #[error("Device Busy: {}", .0)]
    DeviceBusy(BdAddr),
    #[error("Response Length {} != {}", .actual, .expected)]
    ResponseLength { expected: usize, actual: usize },
    #[error("Subcode Mismatch {:#04x} != {:?}", .actual, .expected)]
    SubcodeMismatch { expected: Subcode, actual: u8 },
    #[error("No Request Pending")]
    NoRequestPending,
    #[error("Packet Format Error")]
    PacketFormatError,
    #[error("IOError")]
    IOError,
    #[error("Unknown Error")]
    Unknown(MsgType),
}

impl ApcfError {
    /// Status a caller of the original callback interface would have seen.
    pub fn status(&self) -> ApcfStatus {
        match self {
            ApcfError::Unsupported => ApcfStatus::ModeUnsupported,
            ApcfError::IllegalValue(_) => ApcfStatus::IllegalValue,
            ApcfError::UnknownAddr => ApcfStatus::UnknownAddr,
            _ => ApcfStatus::ErrProcessing,
        }
    }
}

fn push(tickets: &mut Tickets, ticket: Ticket) -> Result<(), ApcfError> {
    tickets.push(ticket).map_err(|_| ApcfError::QueueFull)
}

/// One condition of a batch handed to [`Apcf::set_filters`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApcfCondition<'a> {
    Address {
        address: BdAddr,
        addr_type: AddrType,
        irk: Irk,
    },
    ServiceData,
    ServiceUuid {
        uuid: Uuid,
        mask: Uuid,
    },
    SolicitedUuid {
        uuid: Uuid,
        mask: Uuid,
    },
    LocalName(&'a [u8]),
    ManufacturerData {
        company_id: u16,
        company_id_mask: u16,
        data: &'a [u8],
        data_mask: &'a [u8],
    },
    ServiceDataPattern {
        data: &'a [u8],
        mask: &'a [u8],
    },
}

impl ApcfCondition<'_> {
    fn data_and_mask(&self) -> Option<(&[u8], &[u8])> {
        match self {
            ApcfCondition::ManufacturerData { data, data_mask, .. } => Some((*data, *data_mask)),
            ApcfCondition::ServiceDataPattern { data, mask } => Some((*data, *mask)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterCompletion {
    pub ticket: Ticket,
    pub subcode: Subcode,
    pub action: Action,
    pub available: u8,
    pub counter: u8,
    pub status: ApcfStatus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EnableCompletion {
    pub ticket: Ticket,
    pub action: u8,
    pub status: ApcfStatus,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollResult {
    Filter(FilterCompletion),
    Enable(EnableCompletion),
    /// The reply for `ticket` failed validation; no completion will follow.
    Dropped { ticket: Ticket, reason: ApcfError },
    /// Any event not answering the request in flight.
    Event(EventPacket),
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum RequestKind {
    // `target` is the address the reply is booked against.
    Filter { subcode: Subcode, target: Option<BdAddr> },
    Enable,
}

#[derive(Debug, Clone, PartialEq)]
struct Request {
    ticket: Ticket,
    kind: RequestKind,
    params: ParamBuffer,
}

/// Owns everything the filter layer keeps between commands.
///
/// Only one command is outstanding at a time; the controller echoes nothing
/// but the subcode, so each reply is matched with the single request in
/// flight. Later commands wait in a queue.
pub struct Apcf<T, S> {
    pub hci: T,
    pub security: S,
    capabilities: CapabilityRecord,
    slots: SlotTable,
    identities: IdentityTracker,
    queue: Deque<Request, REQUEST_QUEUE_DEPTH>,
    in_flight: Option<Request>,
    next_ticket: u16,
}

impl<T, S> Apcf<T, S>
where
    T: Read + Write,
    S: SecurityManager,
{
    pub fn new(hci: T, security: S) -> Self {
        Self {
            hci,
            security,
            capabilities: CapabilityRecord::UNSUPPORTED,
            slots: SlotTable::default(),
            identities: IdentityTracker::new(),
            queue: Deque::new(),
            in_flight: None,
            next_ticket: 0,
        }
    }

    /// Reads the controller limits and resets the ledger. Call once.
    pub fn init<Q: VendorCapabilities>(&mut self, query: &mut Q) {
        self.capabilities = query.read_vendor_capabilities();
        info!(
            "filter support {}, max filter {}",
            self.capabilities.filter_support, self.capabilities.max_filter
        );

        self.slots = if self.capabilities.is_filtering_supported() {
            SlotTable::new(self.capabilities.max_filter)
        } else {
            SlotTable::default()
        };
        self.identities = IdentityTracker::new();
        self.queue.clear();
        self.in_flight = None;
    }

    pub fn capabilities(&self) -> &CapabilityRecord {
        &self.capabilities
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn identities(&self) -> &IdentityTracker {
        &self.identities
    }

    pub fn in_flight(&self) -> Option<Ticket> {
        self.in_flight.as_ref().map(|r| r.ticket)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn check_supported(&self) -> Result<(), ApcfError> {
        if self.capabilities.is_filtering_supported() {
            Ok(())
        } else {
            Err(ApcfError::Unsupported)
        }
    }

    fn take_ticket(&mut self) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket = self.next_ticket.wrapping_add(1);
        ticket
    }

    /// Books a service data presence condition. No command is involved.
    pub fn update_service_data(&mut self, action: Action) -> Result<u8, ApcfError> {
        self.check_supported()?;
        let num_available = if action == Action::Add { 0 } else { 1 };
        Ok(self
            .slots
            .update_counter(action, ConditionType::ServiceData.into(), None, num_available))
    }
}

#[maybe_async]
impl<T, S> Apcf<T, S>
where
    T: Read + Write,
    S: SecurityManager,
{
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ApcfError> {
        self.hci.write_all(bytes).await.map_err(|_| ApcfError::IOError)?;
        self.hci.flush().await.map_err(|_| ApcfError::IOError)
    }

    async fn send(&mut self, request: Request) -> Result<(), Request> {
        let packet = HCIPacket::Command(AdvFilterCommand::new(request.params.clone()));
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(_) => return Err(request),
        };
        trace!("send {:?}: {:?}", request.ticket, bytes.as_slice());

        if self.write_bytes(bytes.as_slice()).await.is_err() {
            return Err(request);
        }
        self.in_flight = Some(request);
        Ok(())
    }

    /// Puts the next queued request on the wire if nothing is outstanding.
    async fn pump(&mut self) -> Result<(), ApcfError> {
        if self.in_flight.is_some() {
            return Ok(());
        }

        if let Some(request) = self.queue.pop_front() {
            if let Err(request) = self.send(request).await {
                error!("unable to send {:?}, keeping it queued", request.ticket);
                // Just popped, there is room.
                let _ = self.queue.push_front(request);
                return Err(ApcfError::IOError);
            }
        }
        Ok(())
    }

    async fn submit(&mut self, kind: RequestKind, params: ParamBuffer) -> Result<Ticket, ApcfError> {
        if self.queue.is_full() {
            return Err(ApcfError::QueueFull);
        }

        let request = Request {
            ticket: Ticket(self.next_ticket),
            kind,
            params,
        };

        if self.in_flight.is_none() && self.queue.is_empty() {
            // A request that never reached the controller is not handed out.
            self.send(request).await.map_err(|_| ApcfError::IOError)?;
            return Ok(self.take_ticket());
        }

        let ticket = self.take_ticket();
        self.queue.push_back(request).map_err(|_| ApcfError::QueueFull)?;
        // Ours is queued behind whatever failed; it goes out on a later pump.
        if let Err(e) = self.pump().await {
            error!("{:?}", e);
        }
        Ok(ticket)
    }

    async fn submit_condition(
        &mut self,
        command: &ConditionCommand,
        target: Option<BdAddr>,
    ) -> Result<Ticket, ApcfError> {
        let params = command.encode()?;
        let kind = RequestKind::Filter {
            subcode: command.subcode,
            target,
        };
        self.submit(kind, params).await
    }

    pub async fn enable_filtering(&mut self, enable: bool) -> Result<Ticket, ApcfError> {
        self.check_supported()?;
        let params = EnableCommand::new(enable).encode()?;
        self.submit(RequestKind::Enable, params).await
    }

    /// The address is translated to its identity address before it is sent
    /// and the reply is booked against that identity.
    pub async fn address_filter(
        &mut self,
        action: Action,
        filter_index: FilterIndex,
        address: BdAddr,
        addr_type: AddrType,
    ) -> Result<Ticket, ApcfError> {
        self.check_supported()?;

        let (identity, target) = if action == Action::Clear {
            (address, None)
        } else {
            let (identity, _) = self.security.resolve_identity(address, addr_type);
            info!("adding scan filter with peer address: {} (was {})", identity, address);
            (identity, Some(identity))
        };

        let command = condition::address(action, filter_index, identity);
        self.submit_condition(&command, target).await
    }

    pub async fn uuid_filter<U: FilterUuid>(
        &mut self,
        action: Action,
        filter_index: FilterIndex,
        kind: UuidKind,
        uuid: &U,
        mask: &U,
    ) -> Result<Ticket, ApcfError> {
        self.check_supported()?;
        let command = condition::uuid(action, filter_index, kind, uuid, mask)?;
        self.submit_condition(&command, None).await
    }

    pub async fn local_name_filter(
        &mut self,
        action: Action,
        filter_index: FilterIndex,
        name: &[u8],
    ) -> Result<Ticket, ApcfError> {
        self.check_supported()?;
        let command = condition::local_name(action, filter_index, name);
        self.submit_condition(&command, None).await
    }

    pub async fn manufacturer_data_filter(
        &mut self,
        action: Action,
        filter_index: FilterIndex,
        company_id: u16,
        company_id_mask: u16,
        data: &[u8],
        data_mask: &[u8],
    ) -> Result<Ticket, ApcfError> {
        self.check_supported()?;
        let command = condition::manufacturer_data(action, filter_index, company_id, company_id_mask, data, data_mask);
        self.submit_condition(&command, None).await
    }

    pub async fn service_data_pattern_filter(
        &mut self,
        action: Action,
        filter_index: FilterIndex,
        data: &[u8],
        mask: &[u8],
    ) -> Result<Ticket, ApcfError> {
        self.check_supported()?;
        let command = condition::service_data_pattern(action, filter_index, data, mask);
        self.submit_condition(&command, None).await
    }

    /// Adds every condition in `conditions` to `filter_index`.
    ///
    /// Conditions whose data and mask differ in length are skipped. An
    /// address condition whose old identity record is still connected stops
    /// the batch with [`ApcfError::DeviceBusy`]; commands queued before it
    /// stay queued. An address whose device record already exists elsewhere
    /// gets its filter, but the conditions after it are not applied.
    pub async fn set_filters(
        &mut self,
        filter_index: FilterIndex,
        conditions: &[ApcfCondition<'_>],
    ) -> Result<Tickets, ApcfError> {
        self.check_supported()?;

        let action = Action::Add;
        let mut tickets = Tickets::new();
        for condition in conditions {
            if let Some((data, mask)) = condition.data_and_mask() {
                if data.len() != mask.len() && !data.is_empty() && !mask.is_empty() {
                    error!("data({}) and mask({}) are of different size", data.len(), mask.len());
                    continue;
                }
            }

            let ticket = match *condition {
                ApcfCondition::Address { address, addr_type, irk } => {
                    let outcome = self.identities.prepare(&mut self.security, filter_index, address, addr_type, &irk)?;
                    let ticket = self.address_filter(action, filter_index, address, addr_type).await?;
                    match outcome {
                        IdentityOutcome::Installed => debug!("identity key installed for {}", address),
                        IdentityOutcome::ExistingRecord => {
                            warn!("record for {} owned elsewhere, skipping remaining conditions", address);
                            push(&mut tickets, ticket)?;
                            return Ok(tickets);
                        }
                        IdentityOutcome::NotRequired => {}
                    }
                    Some(ticket)
                }
                ApcfCondition::ServiceData => {
                    self.update_service_data(action)?;
                    None
                }
                ApcfCondition::ServiceUuid { uuid, mask } => {
                    Some(self.uuid_filter(action, filter_index, UuidKind::Service, &uuid, &mask).await?)
                }
                ApcfCondition::SolicitedUuid { uuid, mask } => {
                    Some(self.uuid_filter(action, filter_index, UuidKind::Solicited, &uuid, &mask).await?)
                }
                ApcfCondition::LocalName(name) => Some(self.local_name_filter(action, filter_index, name).await?),
                ApcfCondition::ManufacturerData { company_id, company_id_mask, data, data_mask } => Some(
                    self.manufacturer_data_filter(action, filter_index, company_id, company_id_mask, data, data_mask)
                        .await?,
                ),
                ApcfCondition::ServiceDataPattern { data, mask } => {
                    Some(self.service_data_pattern_filter(action, filter_index, data, mask).await?)
                }
            };

            if let Some(ticket) = ticket {
                push(&mut tickets, ticket)?;
            }
        }
        Ok(tickets)
    }

    /// Clears every condition of `filter_index` and deselects its features.
    /// The last ticket belongs to the feature selection clear.
    pub async fn clear_filters(&mut self, filter_index: FilterIndex) -> Result<Tickets, ApcfError> {
        self.check_supported()?;

        let clear = Action::Clear;
        let mut tickets = Tickets::new();
        push(&mut tickets, self.manufacturer_data_filter(clear, filter_index, 0, 0, &[], &[]).await?)?;
        push(&mut tickets, self.local_name_filter(clear, filter_index, &[]).await?)?;
        self.update_service_data(clear)?;
        push(
            &mut tickets,
            self.uuid_filter(clear, filter_index, UuidKind::Service, &Uuid::EMPTY, &Uuid::EMPTY).await?,
        )?;
        push(
            &mut tickets,
            self.uuid_filter(clear, filter_index, UuidKind::Solicited, &Uuid::EMPTY, &Uuid::EMPTY).await?,
        )?;
        push(&mut tickets, self.service_data_pattern_filter(clear, filter_index, &[], &[]).await?)?;

        self.identities.release(&mut self.security, filter_index);

        let command = condition::feature_clear_index(filter_index);
        push(&mut tickets, self.submit_condition(&command, None).await?)?;
        Ok(tickets)
    }

    /// Configures, removes or wipes the feature selection of filter indexes.
    /// `params` is only read for [`Action::Add`].
    pub async fn setup_filter_params(
        &mut self,
        action: Action,
        filter_index: FilterIndex,
        params: &FilterParams,
    ) -> Result<Ticket, ApcfError> {
        self.check_supported()?;

        match action {
            Action::Add => {
                if self.slots.find_slot(None).is_none() {
                    error!("BD address not found!");
                    return Err(ApcfError::UnknownAddr);
                }
                debug!("feat mask: {}", u16::from(params.feature_mask));
                let command = condition::feature_selection(filter_index, params, self.capabilities.version);
                self.submit_condition(&command, None).await
            }
            Action::Delete => {
                let command = condition::feature_delete(filter_index);
                let ticket = self.submit_condition(&command, None).await?;
                self.identities.release(&mut self.security, filter_index);
                Ok(ticket)
            }
            Action::Clear => {
                self.slots.deallocate_slot(None, ConditionType::All);
                let command = condition::feature_clear_all();
                self.submit_condition(&command, None).await
            }
        }
    }

    /// Gives up on the request in flight, e.g. after a timeout of the
    /// caller's choosing, and moves on to the next one.
    pub async fn cancel_in_flight(&mut self) -> Option<Ticket> {
        let request = self.in_flight.take()?;
        warn!("cancelling {:?}", request.ticket);
        if let Err(e) = self.pump().await {
            error!("{:?}", e);
        }
        Some(request.ticket)
    }

    /// Routes one received event. Command Complete events for the filter
    /// opcode settle the request in flight; anything else is handed back.
    pub async fn process_event(&mut self, event: EventPacket) -> Result<PollResult, ApcfError> {
        let params = match event {
            EventPacket::CommandComplete { command_opcode, return_parameters, .. }
                if command_opcode == opcodes::LE_ADV_FILTER =>
            {
                return_parameters
            }
            event => return Ok(PollResult::Event(event)),
        };

        let Some(request) = self.in_flight.take() else {
            warn!("filter reply without a request in flight");
            return Err(ApcfError::NoRequestPending);
        };

        let params = params.as_slice();
        let result = match request.kind {
            RequestKind::Filter { subcode, target } => {
                router::route_filter_reply(&mut self.slots, subcode, target.as_ref(), params).map(|reply| {
                    PollResult::Filter(FilterCompletion {
                        ticket: request.ticket,
                        subcode,
                        action: reply.action,
                        available: reply.available,
                        counter: reply.counter,
                        status: reply.status,
                    })
                })
            }
            RequestKind::Enable => router::route_enable_reply(params).map(|(action, status)| {
                PollResult::Enable(EnableCompletion {
                    ticket: request.ticket,
                    action,
                    status,
                })
            }),
        };

        let result = result.unwrap_or_else(|reason| PollResult::Dropped {
            ticket: request.ticket,
            reason,
        });

        if let Err(e) = self.pump().await {
            error!("{:?}", e);
        }
        Ok(result)
    }

    /// Reads one packet from the transport and routes it.
    pub async fn poll(&mut self) -> Result<Option<PollResult>, ApcfError> {
        self.pump().await?;

        match HCIPacket::read(&mut self.hci).await? {
            Some(HCIPacket::Event(event)) => Ok(Some(self.process_event(event).await?)),
            _ => Ok(None),
        }
    }
}

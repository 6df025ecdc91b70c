#[cfg(feature = "sync")]
mod test {

use std::cell::RefCell;
extern crate std;

use apcf::accounting::INVALID_COUNTER;
use apcf::capability::{CapabilityRecord, ChipVersion};
use apcf::condition::{FilterParams, UuidKind};
use apcf::hci::EventPacket;
use apcf::identity::{IdentityKey, SecurityManager};
use apcf::types::{Action, AddrType, ApcfStatus, BdAddr, ConditionType, DeliveryMode, Subcode, Ticket};
use apcf::uuid::Uuid;
use apcf::{
    Apcf, ApcfCondition, ApcfError, EnableCompletion, FilterCompletion, PollResult, Read, Write,
    REQUEST_QUEUE_DEPTH,
};
use embedded_io::{Error, ErrorType};

const ADDR: BdAddr = BdAddr::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
const OTHER: BdAddr = BdAddr::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
const IRK: [u8; 16] = [0x5a; 16];

struct TestConnector {
    to_read: RefCell<[u8; 512]>,
    to_write: RefCell<[u8; 512]>,
    read_idx: RefCell<usize>,
    read_max: RefCell<usize>,
    write_idx: RefCell<usize>,
    failing_writes: RefCell<usize>,
}

impl TestConnector {
    fn provide_data_to_read(&self, data: &[u8]) {
        let len = data.len();
        let from = *(self.read_max.borrow());
        let to = from + len;
        (self.to_read.borrow_mut())[from..to].copy_from_slice(data);
        *(self.read_max.borrow_mut()) += len;
    }

    fn provide_command_complete(&self, opcode: u16, params: &[u8]) {
        let opcode = opcode.to_le_bytes();
        self.provide_data_to_read(&[0x04, 0x0e, params.len() as u8 + 3, 0x01, opcode[0], opcode[1]]);
        self.provide_data_to_read(params);
    }

    fn provide_filter_reply(&self, params: &[u8]) {
        self.provide_command_complete(0xfd57, params);
    }

    fn fail_next_writes(&self, n: usize) {
        *(self.failing_writes.borrow_mut()) = n;
    }

    fn get_write_idx(&self) -> usize {
        *(self.write_idx.borrow())
    }

    fn take_written_data(&self) -> Vec<u8> {
        let data = self.to_write.borrow()[..*(self.write_idx.borrow())].into();
        *(self.write_idx.borrow_mut()) = 0;
        data
    }
}

#[derive(Debug)]
pub enum TestConnectorError {
    Unknown,
}

impl Error for TestConnectorError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl ErrorType for TestConnector {
    type Error = TestConnectorError;
}

impl Read for TestConnector {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let l = buf.len();
        let start = *self.read_idx.borrow();
        let read_max = *self.read_max.borrow();
        let end = core::cmp::min(start + l, read_max);
        let l = end - start;

        buf[..l].copy_from_slice(&self.to_read.borrow()[start..end]);
        *(self.read_idx.borrow_mut()) += l;
        Ok(l)
    }
}

impl Write for TestConnector {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if *self.failing_writes.borrow() > 0 {
            *(self.failing_writes.borrow_mut()) -= 1;
            return Err(TestConnectorError::Unknown);
        }

        let idx = *self.write_idx.borrow();
        let l = buf.len();
        if idx + l > self.to_write.borrow().len() {
            return Err(TestConnectorError::Unknown);
        }

        self.to_write.borrow_mut()[idx..idx + l].copy_from_slice(buf);
        *(self.write_idx.borrow_mut()) += l;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Default for TestConnector {
    fn default() -> Self {
        Self {
            to_read: RefCell::new([0u8; 512]),
            to_write: RefCell::new([0u8; 512]),
            read_idx: RefCell::new(0),
            read_max: RefCell::new(0),
            write_idx: RefCell::new(0),
            failing_writes: RefCell::new(0),
        }
    }
}

#[derive(Default)]
struct TestSecurity {
    devices: Vec<BdAddr>,
    bonded: Vec<BdAddr>,
    connected: Vec<BdAddr>,
    keys: Vec<(BdAddr, IdentityKey)>,
    // random address -> identity address
    identities: Vec<(BdAddr, BdAddr)>,
}

impl SecurityManager for TestSecurity {
    fn resolve_identity(&self, address: BdAddr, addr_type: AddrType) -> (BdAddr, AddrType) {
        match self.identities.iter().find(|(random, _)| *random == address) {
            Some((_, identity)) => (*identity, AddrType::PublicId),
            None => (address, addr_type),
        }
    }

    fn find_device(&self, address: &BdAddr) -> bool {
        self.devices.contains(address)
    }

    fn alloc_device(&mut self, address: BdAddr) {
        self.devices.push(address);
    }

    fn delete_device(&mut self, address: &BdAddr) -> bool {
        if self.connected.contains(address) {
            return false;
        }
        self.devices.retain(|a| a != address);
        true
    }

    fn is_bonded(&self, address: &BdAddr) -> bool {
        self.bonded.contains(address)
    }

    fn add_identity_key(&mut self, address: BdAddr, key: IdentityKey) {
        self.keys.push((address, key));
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn capabilities() -> CapabilityRecord {
    CapabilityRecord {
        filter_support: true,
        max_filter: 4,
        version: ChipVersion(98),
    }
}

fn setup() -> Apcf<TestConnector, TestSecurity> {
    init_logger();
    let mut apcf = Apcf::new(TestConnector::default(), TestSecurity::default());
    apcf.init(&mut capabilities());
    apcf
}

#[test]
fn unsupported_controller_sends_nothing() {
    init_logger();
    let mut apcf = Apcf::new(TestConnector::default(), TestSecurity::default());

    let res = apcf.address_filter(Action::Add, 1, ADDR, AddrType::Public);
    assert_eq!(res, Err(ApcfError::Unsupported));
    assert_eq!(res.unwrap_err().status(), ApcfStatus::ModeUnsupported);
    assert_eq!(apcf.enable_filtering(true), Err(ApcfError::Unsupported));
    assert_eq!(apcf.update_service_data(Action::Add), Err(ApcfError::Unsupported));

    let mut no_filters = CapabilityRecord {
        max_filter: 0,
        ..capabilities()
    };
    apcf.init(&mut no_filters);
    assert!(matches!(apcf.clear_filters(1), Err(ApcfError::Unsupported)));

    assert_eq!(apcf.hci.get_write_idx(), 0);
}

#[test]
fn enable_filtering() {
    let mut apcf = setup();

    let ticket = apcf.enable_filtering(true).unwrap();
    assert_eq!(apcf.hci.take_written_data(), &[0x01, 0x57, 0xfd, 0x02, 0x00, 0x01]);

    apcf.hci.provide_filter_reply(&[0x00, 0x00, 0x01]);
    let res = apcf.poll();
    assert_eq!(
        res,
        Ok(Some(PollResult::Enable(EnableCompletion {
            ticket,
            action: 1,
            status: ApcfStatus::Success,
        })))
    );
    assert_eq!(apcf.in_flight(), None);
}

#[test]
fn address_filter_round_trip() {
    let mut apcf = setup();

    let ticket = apcf.address_filter(Action::Add, 1, ADDR, AddrType::Public).unwrap();
    assert_eq!(
        apcf.hci.take_written_data(),
        &[0x01, 0x57, 0xfd, 0x0a, 0x02, 0x00, 0x01, 0xff, 0xee, 0xdd, 0xcc, 0xbb, 0xaa, 0x02]
    );
    assert_eq!(apcf.in_flight(), Some(ticket));

    apcf.hci.provide_filter_reply(&[0x00, 0x02, 0x00, 0x01]);
    assert_eq!(
        apcf.poll(),
        Ok(Some(PollResult::Filter(FilterCompletion {
            ticket,
            subcode: Subcode::Address,
            action: Action::Add,
            available: 1,
            counter: 1,
            status: ApcfStatus::Success,
        })))
    );

    assert_eq!(apcf.slots().generic().counter(ConditionType::Address), 0);
    let id = apcf.slots().find_slot(Some(&ADDR)).unwrap();
    assert_eq!(apcf.slots().slot(id).unwrap().counter(ConditionType::Address), 1);

    let ticket = apcf.address_filter(Action::Delete, 1, ADDR, AddrType::Public).unwrap();
    apcf.hci.provide_filter_reply(&[0x00, 0x02, 0x01, 0x01]);
    let res = apcf.poll();
    assert!(matches!(
        res,
        Ok(Some(PollResult::Filter(FilterCompletion { ticket: t, counter: INVALID_COUNTER, .. }))) if t == ticket
    ));
    assert_eq!(apcf.slots().find_slot(Some(&ADDR)), None);
}

#[test]
fn address_filter_uses_identity_address() {
    let mut apcf = setup();
    apcf.security.identities.push((OTHER, ADDR));

    apcf.address_filter(Action::Add, 1, OTHER, AddrType::Random).unwrap();
    let written = apcf.hci.take_written_data();
    assert_eq!(&written[7..13], &ADDR.to_le_bytes());

    apcf.hci.provide_filter_reply(&[0x00, 0x02, 0x00, 0x01]);
    apcf.poll().unwrap();
    assert!(apcf.slots().find_slot(Some(&ADDR)).is_some());
    assert_eq!(apcf.slots().find_slot(Some(&OTHER)), None);
}

#[test]
fn mismatched_reply_is_dropped() {
    let mut apcf = setup();

    let ticket = apcf.address_filter(Action::Add, 1, ADDR, AddrType::Public).unwrap();
    apcf.hci.provide_filter_reply(&[0x00, 0x05, 0x00, 0x01]);

    assert_eq!(
        apcf.poll(),
        Ok(Some(PollResult::Dropped {
            ticket,
            reason: ApcfError::SubcodeMismatch {
                expected: Subcode::Address,
                actual: 0x05,
            },
        }))
    );
    assert_eq!(apcf.slots().find_slot(Some(&ADDR)), None);
    assert_eq!(apcf.slots().generic().counters, [0u8; ConditionType::COUNT]);
    assert_eq!(apcf.in_flight(), None);
}

#[test]
fn short_reply_is_dropped() {
    let mut apcf = setup();

    let ticket = apcf.local_name_filter(Action::Add, 2, b"thermo").unwrap();
    apcf.hci.provide_filter_reply(&[0x00, 0x05, 0x00]);

    assert!(matches!(
        apcf.poll(),
        Ok(Some(PollResult::Dropped { ticket: t, reason: ApcfError::ResponseLength { expected: 4, actual: 3 } })) if t == ticket
    ));
    assert_eq!(apcf.slots().generic().counter(ConditionType::LocalName), 0);
}

#[test]
fn reply_without_request() {
    let mut apcf = setup();
    apcf.hci.provide_filter_reply(&[0x00, 0x05, 0x00, 0x01]);
    assert_eq!(apcf.poll(), Err(ApcfError::NoRequestPending));
}

#[test]
fn other_events_are_passed_through() {
    let mut apcf = setup();
    let ticket = apcf.local_name_filter(Action::Add, 2, b"thermo").unwrap();

    apcf.hci.provide_command_complete(0x0c03, &[0x00]);
    let res = apcf.poll();
    assert!(matches!(
        res,
        Ok(Some(PollResult::Event(EventPacket::CommandComplete { command_opcode: 0x0c03, .. })))
    ));
    assert_eq!(apcf.in_flight(), Some(ticket));

    // ACL data is skipped.
    apcf.hci.provide_data_to_read(&[0x02, 0x01, 0x00, 0x02, 0x00, 0xaa, 0xbb]);
    assert_eq!(apcf.poll(), Ok(None));

    assert_eq!(apcf.poll(), Ok(None));
}

#[test]
fn requests_go_out_one_at_a_time() {
    let mut apcf = setup();

    let first = apcf.local_name_filter(Action::Add, 2, b"ab").unwrap();
    let second = apcf.manufacturer_data_filter(Action::Add, 2, 0x004c, 0, &[0x01], &[0xff]).unwrap();
    assert_ne!(first, second);

    assert_eq!(apcf.hci.take_written_data(), &[0x01, 0x57, 0xfd, 0x05, 0x05, 0x00, 0x02, b'a', b'b']);
    assert_eq!(apcf.in_flight(), Some(first));
    assert_eq!(apcf.queued(), 1);

    apcf.hci.provide_filter_reply(&[0x00, 0x05, 0x00, 0x03]);
    let res = apcf.poll();
    assert!(matches!(
        res,
        Ok(Some(PollResult::Filter(FilterCompletion { ticket: t, subcode: Subcode::LocalName, counter: 1, .. }))) if t == first
    ));

    assert_eq!(
        apcf.hci.take_written_data(),
        &[0x01, 0x57, 0xfd, 0x09, 0x06, 0x00, 0x02, 0x4c, 0x00, 0x01, 0xff, 0xff, 0xff]
    );
    assert_eq!(apcf.in_flight(), Some(second));
    assert_eq!(apcf.queued(), 0);

    apcf.hci.provide_filter_reply(&[0x00, 0x06, 0x00, 0x03]);
    let res = apcf.poll();
    assert!(matches!(
        res,
        Ok(Some(PollResult::Filter(FilterCompletion { ticket: t, counter: 1, .. }))) if t == second
    ));
    assert_eq!(apcf.slots().generic().counter(ConditionType::ManufacturerData), 1);
    assert_eq!(apcf.slots().generic().counter(ConditionType::LocalName), 1);
}

#[test]
fn queue_limit() {
    let mut apcf = setup();

    for _ in 0..=REQUEST_QUEUE_DEPTH {
        apcf.local_name_filter(Action::Add, 1, b"n").unwrap();
    }
    assert_eq!(apcf.queued(), REQUEST_QUEUE_DEPTH);
    assert_eq!(apcf.local_name_filter(Action::Add, 1, b"n"), Err(ApcfError::QueueFull));
}

#[test]
fn cancel_moves_on() {
    let mut apcf = setup();

    let first = apcf.local_name_filter(Action::Add, 1, b"a").unwrap();
    let second = apcf.local_name_filter(Action::Add, 1, b"b").unwrap();
    apcf.hci.take_written_data();

    assert_eq!(apcf.cancel_in_flight(), Some(first));
    assert_eq!(apcf.in_flight(), Some(second));
    assert_eq!(apcf.hci.take_written_data(), &[0x01, 0x57, 0xfd, 0x04, 0x05, 0x00, 0x01, b'b']);

    assert_eq!(apcf.cancel_in_flight(), Some(second));
    assert_eq!(apcf.cancel_in_flight(), None);
}

#[test]
fn failed_status_is_reported_without_counting() {
    let mut apcf = setup();

    let ticket = apcf.uuid_filter(Action::Add, 3, UuidKind::Service, &Uuid::from_u16(0x180d), &Uuid::EMPTY).unwrap();
    apcf.hci.provide_filter_reply(&[0x0c, 0x03, 0x00, 0x05]);

    assert_eq!(
        apcf.poll(),
        Ok(Some(PollResult::Filter(FilterCompletion {
            ticket,
            subcode: Subcode::ServiceUuid,
            action: Action::Add,
            available: 5,
            counter: INVALID_COUNTER,
            status: ApcfStatus::ErrProcessing,
        })))
    );
    assert_eq!(apcf.slots().generic().counter(ConditionType::ServiceUuid), 0);
}

#[test]
fn set_filters_installs_identity_key() {
    let mut apcf = setup();

    let tickets = apcf
        .set_filters(
            1,
            &[
                ApcfCondition::Address { address: ADDR, addr_type: AddrType::Public, irk: IRK },
                ApcfCondition::LocalName(b"thermo"),
            ],
        )
        .unwrap();
    assert_eq!(tickets.len(), 2);

    assert_eq!(apcf.identities().pending(1), Some(ADDR));
    assert!(apcf.security.devices.contains(&ADDR));
    assert_eq!(apcf.security.keys.len(), 1);
    assert_eq!(apcf.security.keys[0].1.irk, IRK);
    assert_eq!(apcf.security.keys[0].1.identity_addr, ADDR);
}

#[test]
fn set_filters_skips_mismatched_patterns() {
    let mut apcf = setup();

    let tickets = apcf
        .set_filters(
            1,
            &[
                ApcfCondition::ManufacturerData {
                    company_id: 0x004c,
                    company_id_mask: 0,
                    data: &[0x01, 0x02],
                    data_mask: &[0xff],
                },
                ApcfCondition::ServiceDataPattern { data: &[0x01], mask: &[0xff, 0xff] },
                ApcfCondition::ServiceData,
            ],
        )
        .unwrap();

    assert!(tickets.is_empty());
    assert_eq!(apcf.hci.get_write_idx(), 0);
}

#[test]
fn busy_device_aborts_add() {
    let mut apcf = setup();

    apcf.set_filters(1, &[ApcfCondition::Address { address: ADDR, addr_type: AddrType::Public, irk: IRK }])
        .unwrap();
    apcf.hci.take_written_data();
    apcf.security.connected.push(ADDR);

    let res = apcf.set_filters(1, &[ApcfCondition::Address { address: OTHER, addr_type: AddrType::Public, irk: IRK }]);
    assert_eq!(res, Err(ApcfError::DeviceBusy(ADDR)));

    assert_eq!(apcf.queued(), 0);
    assert_eq!(apcf.hci.get_write_idx(), 0);
    assert_eq!(apcf.identities().pending(1), Some(ADDR));
    assert!(!apcf.security.devices.contains(&OTHER));
}

#[test]
fn existing_record_still_installs_filter() {
    let mut apcf = setup();
    apcf.security.devices.push(ADDR);

    let tickets = apcf
        .set_filters(
            1,
            &[
                ApcfCondition::Address { address: ADDR, addr_type: AddrType::Public, irk: IRK },
                ApcfCondition::LocalName(b"x"),
            ],
        )
        .unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(apcf.in_flight(), Some(tickets[0]));
    assert_eq!(apcf.queued(), 0);
    assert!(apcf.identities().is_empty());
    assert!(apcf.security.keys.is_empty());

    let written = apcf.hci.take_written_data();
    assert_eq!(&written[..7], &[0x01, 0x57, 0xfd, 0x0a, 0x02, 0x00, 0x01]);
    assert_eq!(written.len(), 14);
}

#[test]
fn failed_write_hands_out_no_ticket() {
    let mut apcf = setup();
    apcf.hci.fail_next_writes(1);

    assert_eq!(apcf.local_name_filter(Action::Add, 1, b"ab"), Err(ApcfError::IOError));
    assert_eq!(apcf.queued(), 0);
    assert_eq!(apcf.in_flight(), None);

    assert_eq!(apcf.poll(), Ok(None));
    assert_eq!(apcf.in_flight(), None);
    assert_eq!(apcf.hci.get_write_idx(), 0);

    let ticket = apcf.local_name_filter(Action::Add, 1, b"cd").unwrap();
    assert_eq!(ticket, Ticket(0));
    assert_eq!(apcf.in_flight(), Some(ticket));
    assert_eq!(apcf.hci.take_written_data(), &[0x01, 0x57, 0xfd, 0x05, 0x05, 0x00, 0x01, b'c', b'd']);
}

#[test]
fn queued_request_survives_failed_write() {
    let mut apcf = setup();

    let first = apcf.local_name_filter(Action::Add, 1, b"a").unwrap();
    let second = apcf.local_name_filter(Action::Add, 1, b"b").unwrap();
    apcf.hci.take_written_data();

    // The reply for `first` arrives, but sending `second` fails.
    apcf.hci.fail_next_writes(1);
    apcf.hci.provide_filter_reply(&[0x00, 0x05, 0x00, 0x01]);
    assert!(matches!(
        apcf.poll(),
        Ok(Some(PollResult::Filter(FilterCompletion { ticket: t, .. }))) if t == first
    ));
    assert_eq!(apcf.in_flight(), None);
    assert_eq!(apcf.queued(), 1);

    // A new request keeps its ticket and goes out after `second`.
    let third = apcf.local_name_filter(Action::Add, 1, b"c").unwrap();
    assert_eq!(apcf.in_flight(), Some(second));
    assert_eq!(apcf.queued(), 1);
    assert_eq!(apcf.hci.take_written_data(), &[0x01, 0x57, 0xfd, 0x04, 0x05, 0x00, 0x01, b'b']);

    apcf.hci.provide_filter_reply(&[0x00, 0x05, 0x00, 0x01]);
    apcf.poll().unwrap();
    assert_eq!(apcf.in_flight(), Some(third));
}

#[test]
fn clear_filters_releases_identity() {
    let mut apcf = setup();

    apcf.set_filters(1, &[ApcfCondition::Address { address: ADDR, addr_type: AddrType::Public, irk: IRK }])
        .unwrap();
    apcf.set_filters(2, &[ApcfCondition::Address { address: OTHER, addr_type: AddrType::Public, irk: IRK }])
        .unwrap();
    apcf.security.bonded.push(OTHER);

    let tickets = apcf.clear_filters(1).unwrap();
    assert_eq!(tickets.len(), 6);
    assert_eq!(apcf.identities().pending(1), None);
    assert!(!apcf.security.devices.contains(&ADDR));

    apcf.clear_filters(2).unwrap();
    assert!(apcf.identities().is_empty());
    assert!(apcf.security.devices.contains(&OTHER));
}

#[test]
fn clear_filters_sends_feature_clear_last() {
    let mut apcf = setup();

    let tickets = apcf.clear_filters(7).unwrap();
    let last = *tickets.last().unwrap();

    let replies: [&[u8]; 6] = [
        &[0x00, 0x06, 0x02, 0x01],
        &[0x00, 0x05, 0x02, 0x01],
        &[0x00, 0x03, 0x02, 0x01],
        &[0x00, 0x04, 0x02, 0x01],
        &[0x00, 0x07, 0x02, 0x01],
        &[0x00, 0x01, 0x02, 0x01],
    ];
    for reply in replies {
        apcf.hci.provide_filter_reply(reply);
        let res = apcf.poll();
        assert!(matches!(res, Ok(Some(PollResult::Filter(FilterCompletion { action: Action::Clear, .. })))));
    }

    let written = apcf.hci.take_written_data();
    // Five 3-byte clears, then the padded feature clear.
    assert_eq!(written.len(), 5 * (4 + 3) + 4 + 21);
    assert_eq!(&written[35..39], &[0x01, 0x57, 0xfd, 21]);
    assert_eq!(&written[39..42], &[0x01, 0x02, 0x07]);
    assert_eq!(apcf.in_flight(), None);
    assert_ne!(last, tickets[0]);
}

#[test]
fn service_data_counts_without_command() {
    let mut apcf = setup();

    assert_eq!(apcf.update_service_data(Action::Add), Ok(0));
    assert_eq!(apcf.update_service_data(Action::Clear), Ok(1));
    assert_eq!(apcf.slots().generic().counter(ConditionType::ServiceData), 1);
    assert_eq!(apcf.hci.get_write_idx(), 0);
}

#[test]
fn setup_filter_params() {
    let mut apcf = setup();
    let params = FilterParams {
        delivery_mode: DeliveryMode::OnFound,
        ..FilterParams::default()
    };

    apcf.setup_filter_params(Action::Add, 4, &params).unwrap();
    let written = apcf.hci.take_written_data();
    assert_eq!(&written[..7], &[0x01, 0x57, 0xfd, 18, 0x01, 0x00, 0x04]);
    apcf.hci.provide_filter_reply(&[0x00, 0x01, 0x00, 0x0f]);
    assert!(matches!(
        apcf.poll(),
        Ok(Some(PollResult::Filter(FilterCompletion { counter: INVALID_COUNTER, status: ApcfStatus::Success, .. })))
    ));

    apcf.update_service_data(Action::Clear).unwrap();
    apcf.setup_filter_params(Action::Clear, 0, &params).unwrap();
    assert_eq!(apcf.hci.take_written_data(), &[0x01, 0x57, 0xfd, 0x02, 0x01, 0x02]);
    assert_eq!(apcf.slots().generic().counters, [0u8; ConditionType::COUNT]);
}

#[test]
fn setup_filter_params_delete_releases_identity() {
    let mut apcf = setup();

    apcf.set_filters(3, &[ApcfCondition::Address { address: ADDR, addr_type: AddrType::Public, irk: IRK }])
        .unwrap();
    apcf.setup_filter_params(Action::Delete, 3, &FilterParams::default()).unwrap();

    assert!(apcf.identities().is_empty());
    assert!(!apcf.security.devices.contains(&ADDR));
    assert_eq!(apcf.queued(), 1);
}

#[test]
fn solicited_uuid_filter() {
    let mut apcf = setup();

    let uuid = Uuid::from_u16(0x180d);
    assert_eq!(apcf.uuid_filter(Action::Add, 1, UuidKind::Solicited, &uuid, &Uuid::EMPTY), Ok(Ticket(0)));
    let written = apcf.hci.take_written_data();
    assert_eq!(&written[4..], &[0x04, 0x00, 0x01, 0x0d, 0x18, 0xff, 0xff]);
}

}

//! Mock I2C bus with a channel multiplexer and one simulated reader per channel.
//!
//! The bus answers on two addresses: the multiplexer, whose control register
//! holds the channel select mask, and the shared reader address, which is
//! routed to whichever reader sits behind the single selected channel. Each
//! simulated reader has its own RF field, so a read always reports the tag of
//! the channel that is selected at that instant.

use crate::{
    HardwareError, Result,
    mock::reader::{CMD_IN_LIST_PASSIVE_TARGET, CMD_SAM_CONFIGURATION},
    traits::I2cBus,
};
use holdfast_core::{
    Channel, Tag,
    constants::{DEFAULT_MUX_ADDRESS, DEFAULT_READER_ADDRESS, MAX_CHANNELS},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Kind of bus transaction recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    WriteByte(u8),
    WriteQuick,
    WriteRead(Vec<u8>),
}

/// One recorded bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub address: u8,
    pub op: BusOp,
    /// Multiplexer select mask in effect when the transaction started.
    pub selected: u8,
    pub acked: bool,
}

impl Transaction {
    /// True for a tag poll sent to a reader.
    pub fn is_tag_poll(&self) -> bool {
        matches!(&self.op, BusOp::WriteRead(cmd) if cmd.first() == Some(&CMD_IN_LIST_PASSIVE_TARGET))
    }
}

#[derive(Debug, Default)]
struct ReaderSim {
    detached: bool,
    pending_wake: u32,
    init_rejections: u32,
    configured: bool,
    field: Option<Tag>,
    polls: u32,
}

#[derive(Debug)]
struct BusState {
    mux_address: u8,
    reader_address: u8,
    selected: u8,
    readers: Vec<ReaderSim>,
    failures: HashMap<u8, u32>,
    log: Vec<Transaction>,
}

impl BusState {
    fn take_failure(&mut self, address: u8) -> bool {
        match self.failures.get_mut(&address) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn selected_reader(&mut self) -> Option<&mut ReaderSim> {
        if self.selected.count_ones() != 1 {
            return None;
        }
        let reader = self.readers.get_mut(self.selected.trailing_zeros() as usize)?;
        (!reader.detached).then_some(reader)
    }

    fn record(&mut self, address: u8, op: BusOp, selected: u8, acked: bool) {
        self.log.push(Transaction {
            address,
            op,
            selected,
            acked,
        });
    }

    fn write_byte(&mut self, address: u8, byte: u8) -> Result<()> {
        if self.take_failure(address) || address != self.mux_address {
            return Err(nack(address));
        }
        self.selected = byte;
        Ok(())
    }

    fn write_quick(&mut self, address: u8) -> Result<()> {
        if self.take_failure(address) {
            return Err(nack(address));
        }
        if address == self.mux_address {
            return Ok(());
        }
        if address != self.reader_address {
            return Err(nack(address));
        }

        let reader = self.selected_reader().ok_or_else(|| nack(address))?;
        if reader.pending_wake > 0 {
            reader.pending_wake -= 1;
            return Err(nack(address));
        }
        Ok(())
    }

    fn write_read(&mut self, address: u8, command: &[u8], response: &mut [u8]) -> Result<usize> {
        if self.take_failure(address) || address != self.reader_address {
            return Err(nack(address));
        }

        let reader = self.selected_reader().ok_or_else(|| nack(address))?;
        if reader.pending_wake > 0 {
            return Err(nack(address));
        }

        match command.first() {
            Some(&CMD_SAM_CONFIGURATION) => {
                if reader.init_rejections > 0 {
                    reader.init_rejections -= 1;
                    return Err(HardwareError::communication("SAM configuration rejected"));
                }
                reader.configured = true;
                Ok(0)
            }
            Some(&CMD_IN_LIST_PASSIVE_TARGET) => {
                reader.polls += 1;
                if !reader.configured {
                    return Err(HardwareError::communication("Reader not in initiator mode"));
                }
                let Some(tag) = &reader.field else {
                    let slot = response
                        .first_mut()
                        .ok_or_else(|| HardwareError::invalid_data("Empty response buffer"))?;
                    *slot = 0;
                    return Ok(1);
                };

                let uid = tag.as_bytes();
                let frame_len = 2 + uid.len();
                let frame = response.get_mut(..frame_len).ok_or_else(|| {
                    HardwareError::invalid_data(format!(
                        "Response buffer too small for {}-byte UID",
                        uid.len()
                    ))
                })?;
                frame[0] = 1;
                frame[1] = uid.len() as u8;
                frame[2..].copy_from_slice(uid);
                Ok(frame_len)
            }
            other => Err(HardwareError::invalid_data(format!(
                "Unknown reader command {other:?}"
            ))),
        }
    }
}

fn nack(address: u8) -> HardwareError {
    HardwareError::communication(format!("NACK from 0x{address:02X}"))
}

fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock I2C bus for testing and development.
///
/// # Examples
///
/// ```
/// use holdfast_core::Channel;
/// use holdfast_hardware::mock::MockBus;
/// use holdfast_hardware::traits::I2cBus;
///
/// let (mut bus, handle) = MockBus::new();
/// let channel = Channel::new(1).unwrap();
///
/// // First two probes go unanswered while the reader wakes up.
/// handle.wake_after(channel, 2);
/// bus.write_byte(0x74, channel.select_mask()).unwrap();
/// assert!(bus.write_quick(0x24).is_err());
/// assert!(bus.write_quick(0x24).is_err());
/// assert!(bus.write_quick(0x24).is_ok());
/// ```
#[derive(Debug)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    /// Create a mock bus on the default multiplexer and reader addresses.
    pub fn new() -> (Self, MockBusHandle) {
        Self::with_addresses(DEFAULT_MUX_ADDRESS, DEFAULT_READER_ADDRESS)
    }

    /// Create a mock bus with custom multiplexer and reader addresses.
    pub fn with_addresses(mux_address: u8, reader_address: u8) -> (Self, MockBusHandle) {
        let state = Arc::new(Mutex::new(BusState {
            mux_address,
            reader_address,
            selected: 0,
            readers: (0..MAX_CHANNELS).map(|_| ReaderSim::default()).collect(),
            failures: HashMap::new(),
            log: Vec::new(),
        }));

        let handle = MockBusHandle {
            state: Arc::clone(&state),
        };

        (Self { state }, handle)
    }
}

impl I2cBus for MockBus {
    fn write_byte(&mut self, address: u8, byte: u8) -> Result<()> {
        let mut state = lock(&self.state);
        let selected = state.selected;
        let result = state.write_byte(address, byte);
        state.record(address, BusOp::WriteByte(byte), selected, result.is_ok());
        result
    }

    fn write_quick(&mut self, address: u8) -> Result<()> {
        let mut state = lock(&self.state);
        let selected = state.selected;
        let result = state.write_quick(address);
        state.record(address, BusOp::WriteQuick, selected, result.is_ok());
        result
    }

    fn write_read(&mut self, address: u8, command: &[u8], response: &mut [u8]) -> Result<usize> {
        let mut state = lock(&self.state);
        let selected = state.selected;
        let result = state.write_read(address, command, response);
        state.record(
            address,
            BusOp::WriteRead(command.to_vec()),
            selected,
            result.is_ok(),
        );
        result
    }
}

/// Handle for controlling a mock bus and the readers behind it.
#[derive(Debug, Clone)]
pub struct MockBusHandle {
    state: Arc<Mutex<BusState>>,
}

impl MockBusHandle {
    fn with_reader<T>(&self, channel: Channel, f: impl FnOnce(&mut ReaderSim) -> T) -> T {
        let mut state = lock(&self.state);
        let reader = &mut state.readers[channel.as_u8() as usize];
        f(reader)
    }

    /// Put a tag in the field of the reader on `channel`.
    pub fn place(&self, channel: Channel, tag: Tag) {
        self.with_reader(channel, |reader| reader.field = Some(tag));
    }

    /// Empty the field of the reader on `channel`.
    pub fn remove(&self, channel: Channel) {
        self.with_reader(channel, |reader| reader.field = None);
    }

    /// Tag currently in the field of the reader on `channel`.
    pub fn field(&self, channel: Channel) -> Option<Tag> {
        self.with_reader(channel, |reader| reader.field.clone())
    }

    /// Unplug the reader on `channel`: it stops acknowledging anything.
    pub fn detach(&self, channel: Channel) {
        self.with_reader(channel, |reader| reader.detached = true);
    }

    /// Plug the reader on `channel` back in. It comes back unconfigured.
    pub fn attach(&self, channel: Channel) {
        self.with_reader(channel, |reader| {
            reader.detached = false;
            reader.configured = false;
        });
    }

    /// Brown out the reader on `channel`: it stays on the bus but drops out
    /// of initiator mode until configured again.
    pub fn power_cycle(&self, channel: Channel) {
        self.with_reader(channel, |reader| reader.configured = false);
    }

    /// Make the reader on `channel` ignore its next `probes` presence probes.
    pub fn wake_after(&self, channel: Channel, probes: u32) {
        self.with_reader(channel, |reader| reader.pending_wake = probes);
    }

    /// Make the reader on `channel` reject its next `count` initiator configurations.
    pub fn reject_init(&self, channel: Channel, count: u32) {
        self.with_reader(channel, |reader| reader.init_rejections = count);
    }

    /// Fail the next `count` transactions addressed to `address`.
    pub fn fail_next(&self, address: u8, count: u32) {
        lock(&self.state).failures.insert(address, count);
    }

    /// Number of tag polls the reader on `channel` has received.
    pub fn polls(&self, channel: Channel) -> u32 {
        self.with_reader(channel, |reader| reader.polls)
    }

    /// Whether the reader on `channel` is in initiator mode.
    pub fn is_configured(&self, channel: Channel) -> bool {
        self.with_reader(channel, |reader| reader.configured)
    }

    /// Current multiplexer select mask.
    pub fn selected(&self) -> u8 {
        lock(&self.state).selected
    }

    /// Every transaction seen so far, in order.
    pub fn transactions(&self) -> Vec<Transaction> {
        lock(&self.state).log.clone()
    }

    /// Forget the recorded transactions.
    pub fn clear_transactions(&self) {
        lock(&self.state).log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(n: u8) -> Channel {
        Channel::new(n).unwrap()
    }

    #[test]
    fn test_select_updates_mask() {
        let (mut bus, handle) = MockBus::new();
        bus.write_byte(0x74, channel(5).select_mask()).unwrap();
        assert_eq!(handle.selected(), 0b0010_0000);
    }

    #[test]
    fn test_unknown_address_nacks() {
        let (mut bus, _handle) = MockBus::new();
        assert!(bus.write_byte(0x50, 1).is_err());
        assert!(bus.write_quick(0x50).is_err());
    }

    #[test]
    fn test_probe_without_selection_nacks() {
        let (mut bus, _handle) = MockBus::new();
        assert!(bus.write_quick(0x24).is_err());
    }

    #[test]
    fn test_detached_reader_never_answers() {
        let (mut bus, handle) = MockBus::new();
        handle.detach(channel(0));
        bus.write_byte(0x74, channel(0).select_mask()).unwrap();
        assert!(bus.write_quick(0x24).is_err());
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let (mut bus, handle) = MockBus::new();
        handle.fail_next(0x74, 2);
        assert!(bus.write_byte(0x74, 1).is_err());
        assert!(bus.write_byte(0x74, 1).is_err());
        assert!(bus.write_byte(0x74, 1).is_ok());
    }

    #[test]
    fn test_transactions_record_selected_mask() {
        let (mut bus, handle) = MockBus::new();
        bus.write_byte(0x74, channel(2).select_mask()).unwrap();
        bus.write_quick(0x24).unwrap();

        let log = handle.transactions();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].selected, 0);
        assert_eq!(log[1].selected, 0b0000_0100);
        assert_eq!(log[1].op, BusOp::WriteQuick);
        assert!(log.iter().all(|t| t.acked));
    }

    #[test]
    fn test_poll_requires_configuration() {
        let (mut bus, handle) = MockBus::new();
        bus.write_byte(0x74, channel(0).select_mask()).unwrap();

        let mut response = [0u8; 12];
        assert!(
            bus.write_read(0x24, &[CMD_IN_LIST_PASSIVE_TARGET], &mut response)
                .is_err()
        );
        assert_eq!(handle.polls(channel(0)), 1);
    }

    #[test]
    fn test_poll_returns_field_of_selected_channel() {
        let (mut bus, handle) = MockBus::new();
        handle.place(channel(1), Tag::new(vec![1, 1, 1, 1]).unwrap());
        handle.place(channel(2), Tag::new(vec![2, 2, 2, 2]).unwrap());

        let mut response = [0u8; 12];
        for n in [1, 2] {
            bus.write_byte(0x74, channel(n).select_mask()).unwrap();
            bus.write_read(0x24, &[CMD_SAM_CONFIGURATION], &mut response)
                .unwrap();
        }

        let len = bus
            .write_read(0x24, &[CMD_IN_LIST_PASSIVE_TARGET], &mut response)
            .unwrap();
        assert_eq!(&response[..len], &[1, 4, 2, 2, 2, 2]);
    }

    #[test]
    fn test_power_cycle_drops_configuration() {
        let (mut bus, handle) = MockBus::new();
        bus.write_byte(0x74, channel(3).select_mask()).unwrap();
        let mut response = [0u8; 12];
        bus.write_read(0x24, &[CMD_SAM_CONFIGURATION], &mut response)
            .unwrap();
        assert!(handle.is_configured(channel(3)));

        handle.power_cycle(channel(3));
        assert!(!handle.is_configured(channel(3)));
        assert!(
            bus.write_read(0x24, &[CMD_IN_LIST_PASSIVE_TARGET], &mut response)
                .is_err()
        );
    }

    #[test]
    fn test_attach_brings_reader_back() {
        let (mut bus, handle) = MockBus::new();
        handle.detach(channel(0));
        handle.attach(channel(0));
        bus.write_byte(0x74, channel(0).select_mask()).unwrap();
        assert!(bus.write_quick(0x24).is_ok());
        assert!(!handle.is_configured(channel(0)));
    }
}

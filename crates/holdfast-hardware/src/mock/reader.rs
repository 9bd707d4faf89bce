//! Mock tag reader driver.
//!
//! Speaks a cut-down PN532 command set to whatever device answers on the
//! reader address of the bus it is handed. Paired with [`MockBus`], whose
//! simulated readers understand the same commands.
//!
//! [`MockBus`]: crate::mock::MockBus

use crate::{HardwareError, Result, traits::{I2cBus, TagReader}};
use holdfast_core::{Tag, constants::{DEFAULT_READER_ADDRESS, MAX_TAG_LENGTH}};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Configure the security access module (puts the reader in initiator mode).
pub(crate) const CMD_SAM_CONFIGURATION: u8 = 0x14;

/// Poll for one ISO 14443A passive target.
pub(crate) const CMD_IN_LIST_PASSIVE_TARGET: u8 = 0x4A;

/// Counts overlapping reads across every reader that shares it.
///
/// Readers share one bus, so the peak should never exceed one.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a read as started; the returned guard marks it finished on drop.
    pub fn enter(self: &Arc<Self>) -> ProbeGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(Arc::clone(self))
    }

    /// Highest number of reads seen in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// In-flight marker returned by [`ConcurrencyProbe::enter`].
#[derive(Debug)]
pub struct ProbeGuard(Arc<ConcurrencyProbe>);

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock tag reader for testing and development.
#[derive(Debug, Clone)]
pub struct MockTagReader {
    address: u8,
    probe: Option<Arc<ConcurrencyProbe>>,
}

impl MockTagReader {
    /// Create a reader driver on the default reader address.
    pub fn new() -> Self {
        Self::with_address(DEFAULT_READER_ADDRESS)
    }

    /// Create a reader driver on a custom address.
    pub fn with_address(address: u8) -> Self {
        Self {
            address,
            probe: None,
        }
    }

    /// Report every read to `probe`.
    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn poll<B: I2cBus>(&self, bus: &mut B) -> Result<Option<Tag>> {
        let mut response = [0u8; 2 + MAX_TAG_LENGTH];
        let len = bus.write_read(
            self.address,
            &[CMD_IN_LIST_PASSIVE_TARGET, 0x01, 0x00],
            &mut response,
        )?;

        match response.get(..len) {
            Some([0, ..]) => Ok(None),
            Some([_, uid_len, rest @ ..]) => {
                let uid = rest.get(..*uid_len as usize).ok_or_else(|| {
                    HardwareError::invalid_data(format!("Truncated target frame ({len} bytes)"))
                })?;
                Tag::new(uid.to_vec())
                    .map(Some)
                    .map_err(|e| HardwareError::invalid_data(e.to_string()))
            }
            _ => Err(HardwareError::invalid_data("Empty target frame")),
        }
    }
}

impl Default for MockTagReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TagReader for MockTagReader {
    async fn configure_initiator<B: I2cBus>(&mut self, bus: &mut B) -> Result<()> {
        // Normal mode, 1s virtual card timeout, IRQ enabled.
        let mut ack = [0u8; 1];
        bus.write_read(self.address, &[CMD_SAM_CONFIGURATION, 0x01, 0x14, 0x01], &mut ack)?;
        Ok(())
    }

    async fn read_target<B: I2cBus>(
        &mut self,
        bus: &mut B,
        timeout: Duration,
    ) -> Result<Option<Tag>> {
        let _in_flight = self.probe.as_ref().map(ConcurrencyProbe::enter);

        // Real readers take a few ms to answer; give other tasks a chance to run.
        tokio::task::yield_now().await;

        let tag = self.poll(bus)?;
        if tag.is_some() || timeout.is_zero() {
            return Ok(tag);
        }

        tokio::time::sleep(timeout).await;
        self.poll(bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBus;
    use holdfast_core::Channel;

    async fn configured(channel: Channel) -> (MockBus, crate::mock::MockBusHandle, MockTagReader) {
        let (mut bus, handle) = MockBus::new();
        let mut reader = MockTagReader::new();
        bus.write_byte(0x74, channel.select_mask()).unwrap();
        reader.configure_initiator(&mut bus).await.unwrap();
        (bus, handle, reader)
    }

    #[tokio::test]
    async fn test_empty_field_reads_none() {
        let channel = Channel::new(0).unwrap();
        let (mut bus, _handle, mut reader) = configured(channel).await;

        let tag = reader.read_target(&mut bus, Duration::ZERO).await.unwrap();
        assert!(tag.is_none());
    }

    #[tokio::test]
    async fn test_reads_placed_tag() {
        let channel = Channel::new(3).unwrap();
        let (mut bus, handle, mut reader) = configured(channel).await;
        let tag = Tag::new(vec![0x37, 0xA7, 0x80, 0xF2, 0x11, 0x22, 0x33]).unwrap();
        handle.place(channel, tag.clone());

        let read = reader.read_target(&mut bus, Duration::ZERO).await.unwrap();
        assert_eq!(read, Some(tag));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_waits_for_late_tag() {
        let channel = Channel::new(1).unwrap();
        let (mut bus, handle, mut reader) = configured(channel).await;
        let tag = Tag::new(vec![1, 2, 3, 4]).unwrap();

        let placer = {
            let handle = handle.clone();
            let tag = tag.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                handle.place(channel, tag);
            })
        };

        let read = reader
            .read_target(&mut bus, Duration::from_millis(500))
            .await
            .unwrap();
        placer.await.unwrap();
        assert_eq!(read, Some(tag));
    }

    #[tokio::test]
    async fn test_bus_failure_propagates() {
        let channel = Channel::new(0).unwrap();
        let (mut bus, handle, mut reader) = configured(channel).await;
        handle.fail_next(0x24, 1);

        assert!(reader.read_target(&mut bus, Duration::ZERO).await.is_err());
        assert!(reader.read_target(&mut bus, Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_tracks_peak() {
        let probe = ConcurrencyProbe::new();
        let channel = Channel::new(0).unwrap();
        let (mut bus, _handle, reader) = configured(channel).await;
        let mut reader = reader.with_probe(Arc::clone(&probe));

        reader.read_target(&mut bus, Duration::ZERO).await.unwrap();
        assert_eq!(probe.peak(), 1);
        assert_eq!(probe.in_flight(), 0);
    }
}

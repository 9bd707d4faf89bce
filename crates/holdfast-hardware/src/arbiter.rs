//! Exclusive access to the shared, multiplexed I2C bus.
//!
//! Every reader answers on the same address, so a channel select and the
//! transaction that follows it must never be split by another task. The
//! arbiter owns the bus behind an async mutex; holding a [`BusSession`] is
//! the only way to touch it, and dropping the session releases the bus on
//! every exit path.

use crate::{Result, traits::I2cBus};
use holdfast_core::Channel;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

/// Owner of the shared bus.
///
/// # Examples
///
/// ```
/// use holdfast_core::Channel;
/// use holdfast_hardware::arbiter::BusArbiter;
/// use holdfast_hardware::mock::MockBus;
///
/// # #[tokio::main] async fn main() -> holdfast_hardware::Result<()> {
/// let (bus, handle) = MockBus::new();
/// let arbiter = BusArbiter::new(bus, 0x74);
///
/// {
///     let mut session = arbiter.lock().await;
///     session.select_channel(Channel::new(6).unwrap())?;
/// } // bus released here
///
/// assert_eq!(handle.selected(), 0b0100_0000);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BusArbiter<B> {
    bus: Mutex<B>,
    mux_address: u8,
}

impl<B: I2cBus> BusArbiter<B> {
    pub fn new(bus: B, mux_address: u8) -> Self {
        Self {
            bus: Mutex::new(bus),
            mux_address,
        }
    }

    pub fn mux_address(&self) -> u8 {
        self.mux_address
    }

    /// Wait for the bus and take it.
    pub async fn lock(&self) -> BusSession<'_, B> {
        BusSession {
            bus: self.bus.lock().await,
            mux_address: self.mux_address,
        }
    }

    /// Run `body` with the bus held, releasing it when `body` finishes.
    pub async fn with_exclusive_access<T, F>(&self, body: F) -> T
    where
        F: AsyncFnOnce(&mut BusSession<'_, B>) -> T,
    {
        let mut session = self.lock().await;
        body(&mut session).await
    }

    /// Take the bus back out of the arbiter.
    pub fn into_inner(self) -> B {
        self.bus.into_inner()
    }
}

/// Exclusive hold on the bus. Releases it when dropped.
#[derive(Debug)]
pub struct BusSession<'a, B> {
    bus: MutexGuard<'a, B>,
    mux_address: u8,
}

impl<B: I2cBus> BusSession<'_, B> {
    /// Route the bus to `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplexer does not acknowledge.
    pub fn select_channel(&mut self, channel: Channel) -> Result<()> {
        trace!(channel = %channel, "Selecting channel");
        self.bus.write_byte(self.mux_address, channel.select_mask())
    }

    /// Route the bus to `channel`, retrying the select up to `attempts` times.
    ///
    /// Only the select is retried; no pause is taken between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last select error if every attempt failed.
    pub fn select_channel_retrying(&mut self, channel: Channel, attempts: u32) -> Result<()> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.select_channel(channel) {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    debug!(channel = %channel, attempt, error = %e, "Channel select failed");
                    attempt += 1;
                }
            }
        }
    }

    /// Disconnect every channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplexer does not acknowledge.
    pub fn deselect_all(&mut self) -> Result<()> {
        trace!("Deselecting all channels");
        self.bus.write_byte(self.mux_address, 0)
    }

    /// Raw access to the bus for the transaction that follows a select.
    pub fn bus(&mut self) -> &mut B {
        &mut self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{BusOp, MockBus};
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;

    fn channel(n: u8) -> Channel {
        Channel::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_select_writes_mask_to_mux() {
        let (bus, handle) = MockBus::new();
        let arbiter = BusArbiter::new(bus, 0x74);

        arbiter.lock().await.select_channel(channel(3)).unwrap();

        let log = handle.transactions();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].address, 0x74);
        assert_eq!(log[0].op, BusOp::WriteByte(0b0000_1000));
    }

    #[rstest]
    #[case::first_try(0, true, 1)]
    #[case::recovers(2, true, 3)]
    #[case::gives_up(5, false, 3)]
    #[tokio::test]
    async fn test_select_retrying(
        #[case] failures: u32,
        #[case] selected: bool,
        #[case] writes: usize,
    ) {
        let (bus, handle) = MockBus::new();
        let arbiter = BusArbiter::new(bus, 0x74);
        handle.fail_next(0x74, failures);

        let result = arbiter
            .lock()
            .await
            .select_channel_retrying(channel(1), 3);

        assert_eq!(result.is_ok(), selected);
        assert_eq!(handle.selected(), if selected { 0b0000_0010 } else { 0 });
        assert_eq!(handle.transactions().len(), writes);
    }

    #[tokio::test]
    async fn test_deselect_all_writes_zero() {
        let (bus, handle) = MockBus::new();
        let arbiter = BusArbiter::new(bus, 0x74);

        let mut session = arbiter.lock().await;
        session.select_channel(channel(7)).unwrap();
        session.deselect_all().unwrap();
        drop(session);

        assert_eq!(handle.selected(), 0);
    }

    #[tokio::test]
    async fn test_session_released_after_exclusive_access() {
        let (bus, _handle) = MockBus::new();
        let arbiter = BusArbiter::new(bus, 0x74);

        let selected = arbiter
            .with_exclusive_access(async |session| session.select_channel(channel(2)))
            .await;
        assert!(selected.is_ok());

        // A second lock would hang if the first session leaked.
        let second = tokio::time::timeout(Duration::from_secs(1), arbiter.lock()).await;
        assert!(second.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_are_exclusive() {
        let (bus, _handle) = MockBus::new();
        let arbiter = Arc::new(BusArbiter::new(bus, 0x74));

        let first = arbiter.lock().await;
        let waiter = {
            let arbiter = Arc::clone(&arbiter);
            tokio::spawn(async move {
                let _session = arbiter.lock().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
    }
}

//! Per-channel tag scanner.
//!
//! A scanner owns the reader driver for one multiplexer channel. Bringing
//! a reader up is a two-stage affair, each stage under the same bounded
//! retry budget:
//!
//! 1. **Wake** - select the channel and probe the reader address until the
//!    reader acknowledges. Readers fresh out of reset ignore the first few
//!    probes.
//! 2. **Initiator configuration** - put the reader in initiator mode so it
//!    can poll for passive targets.
//!
//! Once up, [`ChannelScanner::get_tag`] never fails: any bus or reader error
//! is logged and reported as "no tag this cycle".

use crate::{
    HardwareError, Result,
    arbiter::{BusArbiter, BusSession},
    retry::{self, RetryPolicy},
    traits::{I2cBus, TagReader},
};
use holdfast_core::{
    Channel, Tag,
    config::PropConfig,
    constants::STANDALONE_READ_TIMEOUT_MS,
};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Tunables shared by every scanner on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerSettings {
    pub reader_address: u8,
    /// How long a read waits for a target to enter the field.
    pub read_timeout: Duration,
    /// Budget for both wake-up and initiator configuration.
    pub retry: RetryPolicy,
    pub select_attempts: u32,
}

impl ScannerSettings {
    /// Settings for a scanner polled round-robin by the orchestrator.
    pub fn from_config(config: &PropConfig) -> Self {
        Self {
            reader_address: config.bus.reader_address,
            read_timeout: config.timing.read_timeout(),
            retry: config.retry.into(),
            select_attempts: config.retry.select_attempts,
        }
    }

    /// Settings for a scanner that owns its reader and can afford to wait on it.
    pub fn standalone() -> Self {
        Self {
            read_timeout: Duration::from_millis(STANDALONE_READ_TIMEOUT_MS),
            ..Self::default()
        }
    }
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self::from_config(&PropConfig::default())
    }
}

/// Tag scanner bound to one multiplexer channel.
///
/// # Examples
///
/// ```
/// use holdfast_core::{Channel, Tag};
/// use holdfast_hardware::arbiter::BusArbiter;
/// use holdfast_hardware::mock::{MockBus, MockTagReader};
/// use holdfast_hardware::scanner::{ChannelScanner, ScannerSettings};
///
/// # #[tokio::main] async fn main() -> holdfast_hardware::Result<()> {
/// let (bus, handle) = MockBus::new();
/// let arbiter = BusArbiter::new(bus, 0x74);
/// let channel = Channel::new(0).unwrap();
///
/// let mut scanner = ChannelScanner::new(channel, MockTagReader::new(), ScannerSettings::default());
/// scanner.initialize(&arbiter).await?;
///
/// assert_eq!(scanner.get_tag(&arbiter).await, None);
///
/// let tag = Tag::new(vec![0xA7, 0x4B, 0x7E, 0xF2]).unwrap();
/// handle.place(channel, tag.clone());
/// assert_eq!(scanner.get_tag(&arbiter).await, Some(tag));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChannelScanner<R> {
    channel: Channel,
    reader: R,
    settings: ScannerSettings,
    initialized: bool,
}

impl<R: TagReader> ChannelScanner<R> {
    pub fn new(channel: Channel, reader: R, settings: ScannerSettings) -> Self {
        Self {
            channel,
            reader,
            settings,
            initialized: false,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    /// Wake the reader and configure it as an initiator, holding the bus
    /// for the whole sequence.
    ///
    /// # Errors
    ///
    /// - `HardwareError::DeviceUnreachable` if the reader never acknowledged a probe
    /// - `HardwareError::InitializationFailed` if it never accepted the configuration
    pub async fn initialize<B: I2cBus>(&mut self, arbiter: &BusArbiter<B>) -> Result<()> {
        debug!(channel = %self.channel, "Initializing reader");

        arbiter
            .with_exclusive_access(async |session| {
                self.wake(session).await?;
                self.configure(session).await
            })
            .await?;

        self.initialized = true;
        info!(channel = %self.channel, "Reader ready");
        Ok(())
    }

    async fn wake<B: I2cBus>(&self, session: &mut BusSession<'_, B>) -> Result<()> {
        let channel = self.channel;
        let address = self.settings.reader_address;

        retry::bounded(self.settings.retry, async |attempt| {
            session.select_channel(channel)?;
            session.bus().write_quick(address).inspect_err(|e| {
                trace!(channel = %channel, attempt, error = %e, "Reader not awake yet");
            })
        })
        .await
        .map_err(|exhausted| {
            warn!(channel = %channel, attempts = exhausted.attempts, "Reader never woke up");
            HardwareError::unreachable(channel, exhausted.attempts, exhausted.last_error.to_string())
        })
    }

    async fn configure<B: I2cBus>(&mut self, session: &mut BusSession<'_, B>) -> Result<()> {
        let channel = self.channel;
        let reader = &mut self.reader;

        retry::bounded(self.settings.retry, async |attempt| {
            session.select_channel(channel)?;
            reader.configure_initiator(session.bus()).await.inspect_err(|e| {
                trace!(channel = %channel, attempt, error = %e, "Initiator configuration rejected");
            })
        })
        .await
        .map_err(|exhausted| {
            warn!(channel = %channel, attempts = exhausted.attempts, "Reader refused initiator mode");
            HardwareError::initialization_failed(
                channel,
                exhausted.attempts,
                exhausted.last_error.to_string(),
            )
        })
    }

    /// Read whatever tag is in the field right now.
    ///
    /// Returns `None` for an empty field, for any bus or reader error (logged)
    /// and when called before a successful [`initialize`](Self::initialize).
    pub async fn get_tag<B: I2cBus>(&mut self, arbiter: &BusArbiter<B>) -> Option<Tag> {
        if !self.initialized {
            let err = HardwareError::NotInitialized {
                channel: self.channel,
            };
            warn!(error = %err, "Scan skipped");
            return None;
        }

        let mut session = arbiter.lock().await;

        if let Err(e) = session.select_channel_retrying(self.channel, self.settings.select_attempts) {
            warn!(channel = %self.channel, error = %e, "Channel select failed, skipping scan");
            return None;
        }

        match self
            .reader
            .read_target(session.bus(), self.settings.read_timeout)
            .await
        {
            Ok(tag) => {
                trace!(channel = %self.channel, tag = ?tag.as_ref().map(Tag::to_hex), "Scanned");
                tag
            }
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Tag read failed");
                None
            }
        }
    }

    /// Take the reader driver back.
    pub fn into_reader(self) -> R {
        self.reader
    }
}

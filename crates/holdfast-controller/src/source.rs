//! Where a part's scan results come from.

use holdfast_core::{ScanResult, Tag};
use holdfast_hardware::{
    AnyBus, AnyInput, AnyTagReader, BusArbiter, ChannelScanner, HardwareError, ScanFeed,
    traits::DigitalInput,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Sensor behind one part.
#[derive(Debug)]
pub enum TagSource {
    /// Reader scanned inline by the orchestrator's poll loop.
    Scanner(ChannelScanner<AnyTagReader>),

    /// Reader scanned by its own background task.
    Feed(ScanFeed<AnyTagReader>),

    /// Input line raised by a standalone reader board that checks the tag itself.
    Gpio(AnyInput),
}

impl TagSource {
    /// Bring the sensor up.
    ///
    /// Readers go through wake-up and initiator configuration. An input line
    /// is read once to make sure it answers. Feeds are already running; take
    /// them back with [`into_inline`](Self::into_inline) first.
    pub async fn initialize(&mut self, arbiter: &BusArbiter<AnyBus>) -> holdfast_hardware::Result<()> {
        match self {
            TagSource::Scanner(scanner) => scanner.initialize(arbiter).await,
            TagSource::Feed(_) => Ok(()),
            TagSource::Gpio(input) => input.is_high().map(|_| ()),
        }
    }

    /// Read the sensor and classify what it sees against `expected`.
    ///
    /// A sensor error reads as an empty field. A feed yields `None` until it
    /// has published a reading newer than the last one taken.
    pub async fn scan(&mut self, arbiter: &BusArbiter<AnyBus>, expected: &Tag) -> Option<ScanResult> {
        match self {
            TagSource::Scanner(scanner) => {
                let tag = scanner.get_tag(arbiter).await;
                Some(ScanResult::classify(tag.as_ref(), expected))
            }
            TagSource::Feed(feed) => feed
                .fresh()
                .map(|tag| ScanResult::classify(tag.as_ref(), expected)),
            TagSource::Gpio(input) => Some(match input.is_high() {
                Ok(true) => ScanResult::Matching,
                Ok(false) => ScanResult::Absent,
                Err(e) => {
                    warn!(pin = input.pin(), error = %e, "Input read failed");
                    ScanResult::Absent
                }
            }),
        }
    }

    /// Tell a background feed when the next reading is wanted.
    ///
    /// Inline sources are read on demand and ignore this.
    pub fn schedule(&self, at: Instant) {
        if let TagSource::Feed(feed) = self {
            feed.request(at);
        }
    }

    /// Move an inline scanner onto its own task scanning at most every `interval`.
    ///
    /// Other sources are returned unchanged.
    pub fn into_feed(self, arbiter: &Arc<BusArbiter<AnyBus>>, interval: Duration) -> Self {
        match self {
            TagSource::Scanner(scanner) => {
                TagSource::Feed(ScanFeed::spawn(scanner, Arc::clone(arbiter), interval))
            }
            other => other,
        }
    }

    /// Stop a background feed and take its scanner back.
    ///
    /// Other sources are returned unchanged.
    ///
    /// # Errors
    ///
    /// `HardwareError::Disconnected` if the feed's task died and the reader
    /// went with it.
    pub async fn into_inline(self) -> holdfast_hardware::Result<Self> {
        match self {
            TagSource::Feed(feed) => {
                let channel = feed.channel();
                feed.into_scanner()
                    .await
                    .map(TagSource::Scanner)
                    .ok_or_else(|| HardwareError::disconnected(format!("reader on channel {channel}")))
            }
            other => Ok(other),
        }
    }

    /// Stop background scanning, if any.
    pub fn stop(&self) {
        if let TagSource::Feed(feed) = self {
            feed.stop();
        }
    }
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSource::Scanner(scanner) => write!(f, "channel {}", scanner.channel()),
            TagSource::Feed(feed) => write!(f, "channel {} (feed)", feed.channel()),
            TagSource::Gpio(input) => write!(f, "gpio {}", input.pin()),
        }
    }
}

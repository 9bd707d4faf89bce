//! Background scanning of one channel.
//!
//! A [`ScanFeed`] moves an initialized scanner into its own task. The task
//! scans once, publishes the result on a `watch` channel and then waits for
//! the consumer to ask for the next scan with [`ScanFeed::request`], which
//! names the earliest instant the bus may be touched again. A part that only
//! needs re-checking once a second therefore costs one bus transaction a
//! second, not one per tick. The arbiter keeps every select/read pair atomic
//! with respect to the other feeds.

use crate::{arbiter::BusArbiter, scanner::ChannelScanner, traits::{I2cBus, TagReader}};
use holdfast_core::{Channel, Tag};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demand {
    ScanAt(Instant),
    Stop,
}

/// Latest-value view of a channel scanned in the background.
///
/// The scanning task is aborted when the feed is dropped.
///
/// # Examples
///
/// ```
/// use holdfast_core::{Channel, Tag};
/// use holdfast_hardware::arbiter::BusArbiter;
/// use holdfast_hardware::feed::ScanFeed;
/// use holdfast_hardware::mock::{MockBus, MockTagReader};
/// use holdfast_hardware::scanner::{ChannelScanner, ScannerSettings};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// # #[tokio::main] async fn main() -> holdfast_hardware::Result<()> {
/// let (bus, handle) = MockBus::new();
/// let arbiter = Arc::new(BusArbiter::new(bus, 0x74));
/// let channel = Channel::new(1).unwrap();
/// let tag = Tag::new(vec![1, 2, 3, 4]).unwrap();
///
/// let mut scanner = ChannelScanner::new(channel, MockTagReader::new(), ScannerSettings::default());
/// scanner.initialize(&arbiter).await?;
///
/// let mut feed = ScanFeed::spawn(scanner, Arc::clone(&arbiter), Duration::from_millis(10));
/// feed.changed().await;
/// assert_eq!(feed.latest(), None);
///
/// handle.place(channel, tag.clone());
/// feed.request(Instant::now());
/// feed.changed().await;
/// assert_eq!(feed.latest(), Some(tag));
///
/// let scanner = feed.into_scanner().await.expect("feed task finished");
/// assert!(scanner.is_initialized());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ScanFeed<R> {
    channel: Channel,
    readings: watch::Receiver<Option<Tag>>,
    demand: watch::Sender<Demand>,
    task: Option<JoinHandle<ChannelScanner<R>>>,
}

impl<R: TagReader + 'static> ScanFeed<R> {
    /// Start scanning `scanner`'s channel.
    ///
    /// The first scan runs straight away. Later scans run when requested,
    /// never closer together than `interval`.
    pub fn spawn<B>(mut scanner: ChannelScanner<R>, arbiter: Arc<BusArbiter<B>>, interval: Duration) -> Self
    where
        B: I2cBus + 'static,
    {
        let channel = scanner.channel();
        let (readings_tx, readings) = watch::channel(None);
        let (demand, mut demand_rx) = watch::channel(Demand::ScanAt(Instant::now()));

        let task = tokio::spawn(async move {
            debug!(channel = %channel, "Scan feed started");
            loop {
                let tag = scanner.get_tag(&arbiter).await;
                trace!(channel = %channel, present = tag.is_some(), "Feed update");
                if readings_tx.send(tag).is_err() {
                    break;
                }

                let not_before = Instant::now() + interval;
                if !next_demand(&mut demand_rx, not_before).await {
                    break;
                }
            }
            debug!(channel = %channel, "Scan feed stopped");
            scanner
        });

        Self {
            channel,
            readings,
            demand,
            task: Some(task),
        }
    }
}

impl<R> ScanFeed<R> {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Most recent reading, `None` until the first scan completes.
    pub fn latest(&mut self) -> Option<Tag> {
        self.readings.borrow_and_update().clone()
    }

    /// The reading published since the last call to [`latest`](Self::latest)
    /// or `fresh`, if any.
    pub fn fresh(&mut self) -> Option<Option<Tag>> {
        match self.readings.has_changed() {
            Ok(true) => Some(self.latest()),
            _ => None,
        }
    }

    /// Wait until a reading newer than the last one returned is published.
    pub async fn changed(&mut self) {
        // Err only once the task is gone; nothing more will arrive then.
        let _ = self.readings.changed().await;
    }

    /// Ask for another scan, no earlier than `at`.
    ///
    /// A later request replaces one that has not run yet.
    pub fn request(&self, at: Instant) {
        self.demand.send_if_modified(|demand| match demand {
            Demand::Stop => false,
            Demand::ScanAt(_) => {
                *demand = Demand::ScanAt(at);
                true
            }
        });
    }

    /// Stop scanning once the scan in progress, if any, completes.
    pub fn stop(&self) {
        self.demand.send_replace(Demand::Stop);
    }

    /// Stop scanning and take the scanner back.
    ///
    /// Returns `None` if the scanning task did not finish cleanly.
    pub async fn into_scanner(mut self) -> Option<ChannelScanner<R>> {
        self.stop();
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl<R> Drop for ScanFeed<R> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Wait for the next requested scan time, but not before `not_before`.
///
/// Returns false once the feed has been stopped or dropped.
async fn next_demand(demand: &mut watch::Receiver<Demand>, not_before: Instant) -> bool {
    let mut due: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = sleep_until(due) => return true,
            changed = demand.changed() => {
                if changed.is_err() {
                    return false;
                }
                let current = *demand.borrow_and_update();
                match current {
                    Demand::Stop => return false,
                    Demand::ScanAt(at) => due = Some(at.max(not_before)),
                }
            }
        }
    }
}

async fn sleep_until(due: Option<Instant>) {
    match due {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

//! Integration tests for shared-bus exclusivity
//!
//! Several scanners share one multiplexed bus. These tests check that no two
//! reads ever overlap and that every tag poll is issued with its own
//! channel's select still in effect.

use futures::future::join_all;
use holdfast_core::{Channel, Tag};
use holdfast_hardware::mock::{BusOp, ConcurrencyProbe, MockBus, MockBusHandle, MockTagReader};
use holdfast_hardware::{BusArbiter, ChannelScanner, ScanFeed, ScannerSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MUX: u8 = 0x74;

fn tag_for(channel: Channel) -> Tag {
    Tag::new(vec![0xC0 | channel.as_u8(), 0x11, 0x22, 0x33]).unwrap()
}

async fn scanners(
    arbiter: &BusArbiter<MockBus>,
    handle: &MockBusHandle,
    probe: &Arc<ConcurrencyProbe>,
    count: u8,
) -> Vec<ChannelScanner<MockTagReader>> {
    let mut scanners = Vec::new();
    for n in 0..count {
        let channel = Channel::new(n).unwrap();
        handle.place(channel, tag_for(channel));

        let reader = MockTagReader::new().with_probe(Arc::clone(probe));
        let mut scanner = ChannelScanner::new(channel, reader, ScannerSettings::default());
        scanner.initialize(arbiter).await.unwrap();
        scanners.push(scanner);
    }
    handle.clear_transactions();
    scanners
}

/// Every poll must directly follow a select of the mask it ran under.
fn assert_select_read_pairs(handle: &MockBusHandle) {
    let log = handle.transactions();
    let mut polls = 0;

    for (i, transaction) in log.iter().enumerate() {
        if !transaction.is_tag_poll() {
            continue;
        }
        polls += 1;

        let select = &log[i - 1];
        assert_eq!(select.address, MUX, "poll at {i} not preceded by a select");
        assert_eq!(
            select.op,
            BusOp::WriteByte(transaction.selected),
            "poll at {i} ran under someone else's select"
        );
    }

    assert!(polls > 0, "no polls recorded");
}

#[tokio::test]
async fn test_concurrent_get_tag_calls_are_serialized() {
    let (bus, handle) = MockBus::new();
    let arbiter = BusArbiter::new(bus, MUX);
    let probe = ConcurrencyProbe::new();
    let mut scanners = scanners(&arbiter, &handle, &probe, 4).await;

    for _ in 0..10 {
        let reads = join_all(scanners.iter_mut().map(|s| s.get_tag(&arbiter))).await;

        for (scanner, read) in scanners.iter().zip(reads) {
            assert_eq!(read, Some(tag_for(scanner.channel())));
        }
    }

    assert_eq!(probe.peak(), 1);
    assert_select_read_pairs(&handle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_feeds_on_worker_threads_never_interleave() {
    let (bus, handle) = MockBus::new();
    let arbiter = Arc::new(BusArbiter::new(bus, MUX));
    let probe = ConcurrencyProbe::new();
    let scanners = scanners(&arbiter, &handle, &probe, 6).await;

    let mut feeds: Vec<ScanFeed<MockTagReader>> = scanners
        .into_iter()
        .map(|scanner| ScanFeed::spawn(scanner, Arc::clone(&arbiter), Duration::from_millis(1)))
        .collect();

    for _ in 0..50 {
        for feed in &feeds {
            feed.request(Instant::now());
        }
        tokio::time::sleep(Duration::from_millis(4)).await;
    }

    for feed in &mut feeds {
        let channel = feed.channel();
        assert_eq!(feed.latest(), Some(tag_for(channel)));
    }
    drop(feeds);

    assert_eq!(probe.peak(), 1);
    assert_select_read_pairs(&handle);
}

#[tokio::test(start_paused = true)]
async fn test_feed_reflects_removal_and_wrong_tag() {
    let (bus, handle) = MockBus::new();
    let arbiter = Arc::new(BusArbiter::new(bus, MUX));
    let probe = ConcurrencyProbe::new();
    let mut scanners = scanners(&arbiter, &handle, &probe, 1).await;
    let scanner = scanners.remove(0);
    let channel = scanner.channel();

    let mut feed = ScanFeed::spawn(scanner, Arc::clone(&arbiter), Duration::from_millis(50));
    feed.changed().await;
    assert_eq!(feed.latest(), Some(tag_for(channel)));

    let stranger = Tag::from_hex("DEADBEEF").unwrap();
    handle.place(channel, stranger.clone());
    feed.request(Instant::now());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(feed.latest(), Some(stranger));

    handle.remove(channel);
    feed.request(Instant::now());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(feed.latest(), None);
}

#[tokio::test(start_paused = true)]
async fn test_feeds_only_touch_bus_when_asked() {
    let (bus, handle) = MockBus::new();
    let arbiter = Arc::new(BusArbiter::new(bus, MUX));
    let probe = ConcurrencyProbe::new();
    let scanners = scanners(&arbiter, &handle, &probe, 3).await;

    let mut feeds: Vec<ScanFeed<MockTagReader>> = scanners
        .into_iter()
        .map(|scanner| ScanFeed::spawn(scanner, Arc::clone(&arbiter), Duration::from_millis(50)))
        .collect();
    for feed in &mut feeds {
        feed.changed().await;
    }

    // Only channel 0 keeps asking; the others stay at their first scan.
    for _ in 0..10 {
        feeds[0].request(Instant::now());
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let polls: Vec<u32> = (0..3)
        .map(|n| handle.polls(Channel::new(n).unwrap()))
        .collect();
    assert_eq!(polls, vec![11, 1, 1]);
}

//! Integration tests for the receive state machine against mock adapters.
//!
//! These follow the serial handshake end to end: header decode, READY,
//! per-read ACKs, DONE on completion, NACK_TIMEOUT plus a single automatic
//! re-trigger on inactivity.

use crate::mock::{MemStorage, MockLink, RecordingSink};

use camrelay::app::events::AppEvent;
use camrelay::config::SystemConfig;
use camrelay::transfer::receiver::{ReceiveFsm, RxState};

fn setup() -> (ReceiveFsm, MockLink, MemStorage, RecordingSink) {
    (
        ReceiveFsm::new(&SystemConfig::default()),
        MockLink::new(),
        MemStorage::new(),
        RecordingSink::new(),
    )
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ── Scenario: full burst ─────────────────────────────────────

#[test]
fn single_burst_transfer_completes() {
    let (mut fsm, mut link, mut store, mut sink) = setup();
    let data = pattern(2048);

    link.feed_line("img.jpg|2048");
    link.feed(&data);

    fsm.poll(&mut link, &mut store, 0, &mut sink);
    assert_eq!(fsm.state(), RxState::Receiving);
    assert_eq!(link.sent_lines(), vec!["READY"]);

    fsm.poll(&mut link, &mut store, 10, &mut sink);
    assert_eq!(fsm.state(), RxState::Idle);

    let lines = link.sent_lines();
    assert_eq!(lines.first().map(String::as_str), Some("READY"));
    // One ACK per drained read: 2048 bytes at the 256-byte chunk size.
    assert_eq!(lines.iter().filter(|l| *l == "ACK").count(), 8);
    assert_eq!(lines.last().map(String::as_str), Some("DONE"));

    assert_eq!(store.get("0_img.jpg").as_deref(), Some(data.as_slice()));
    assert_eq!(fsm.take_completed().as_deref(), Some("0_img.jpg"));
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::TransferComplete { bytes: 2048, .. })));
}

#[test]
fn chunked_replay_is_byte_identical() {
    let (mut fsm, mut link, mut store, mut sink) = setup();
    let data = pattern(5000);

    link.feed_line("shot.jpg|5000");
    fsm.poll(&mut link, &mut store, 0, &mut sink);

    // Deliver in uneven bursts, polling between each.
    let mut now = 1;
    for burst in data.chunks(300) {
        link.feed(burst);
        fsm.poll(&mut link, &mut store, now, &mut sink);
        now += 1;
    }

    assert_eq!(store.get("0_shot.jpg").as_deref(), Some(data.as_slice()));
    assert_eq!(link.sent_lines().last().map(String::as_str), Some("DONE"));
}

// ── Scenario: inactivity timeout and single retry ────────────

#[test]
fn timeout_retries_once_then_abandons() {
    let cfg = SystemConfig::default();
    let (mut fsm, mut link, mut store, mut sink) = setup();
    let timeout = u64::from(cfg.rx_inactivity_timeout_ms);
    let grace = u64::from(cfg.retry_grace_ms);

    // First attempt: 1000 of 2048 bytes, then silence.
    link.feed_line("img.jpg|2048");
    fsm.poll(&mut link, &mut store, 0, &mut sink);
    link.feed(&pattern(1000));
    fsm.poll(&mut link, &mut store, 10, &mut sink);

    let stall = 10 + timeout + 1;
    fsm.poll(&mut link, &mut store, stall, &mut sink);
    assert_eq!(fsm.state(), RxState::Idle);
    assert_eq!(
        link.sent_lines().last().map(String::as_str),
        Some("NACK_TIMEOUT")
    );
    assert!(sink.events.iter().any(
        |e| matches!(e, AppEvent::TransferTimedOut { will_retry: true, received: 1000, .. })
    ));
    // The partial file is gone.
    assert!(store.names().is_empty());

    // The trigger fires only after the grace period.
    fsm.poll_retry(&mut link, stall + grace - 1, &mut sink);
    assert!(!link.sent_text().contains("foto"));
    fsm.poll_retry(&mut link, stall + grace, &mut sink);
    let triggers = |l: &MockLink| {
        l.sent_lines()
            .iter()
            .filter(|s| s.starts_with("foto"))
            .count()
    };
    assert_eq!(triggers(&link), 1);

    // Retry attempt stalls identically.
    let t0 = stall + grace + 10;
    link.feed_line("img.jpg|2048");
    fsm.poll(&mut link, &mut store, t0, &mut sink);
    link.feed(&pattern(1000));
    fsm.poll(&mut link, &mut store, t0 + 10, &mut sink);
    fsm.poll(&mut link, &mut store, t0 + 10 + timeout + 1, &mut sink);

    assert_eq!(
        link.sent_lines().last().map(String::as_str),
        Some("NACK_TIMEOUT")
    );
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::TransferTimedOut { will_retry: false, .. })));

    // Second timeout is terminal: no further automatic trigger, ever.
    fsm.poll_retry(&mut link, t0 + 10 + timeout + grace + 100, &mut sink);
    assert_eq!(triggers(&link), 1);
}

#[test]
fn completion_clears_armed_retry() {
    let cfg = SystemConfig::default();
    let (mut fsm, mut link, mut store, mut sink) = setup();
    let timeout = u64::from(cfg.rx_inactivity_timeout_ms);

    link.feed_line("img.jpg|100");
    fsm.poll(&mut link, &mut store, 0, &mut sink);
    fsm.poll(&mut link, &mut store, timeout + 1, &mut sink);
    assert!(fsm.retry_armed());

    // The retransmission arrives and completes; its session was the retry.
    link.feed_line("img.jpg|100");
    fsm.poll(&mut link, &mut store, timeout + 2, &mut sink);
    assert!(!fsm.retry_armed());
    link.feed(&pattern(100));
    fsm.poll(&mut link, &mut store, timeout + 3, &mut sink);
    assert_eq!(fsm.take_completed().as_deref(), Some("1_img.jpg"));
}

// ── Malformed input ──────────────────────────────────────────

#[test]
fn malformed_header_drops_to_idle_silently() {
    let (mut fsm, mut link, mut store, mut sink) = setup();

    // The camera host's boot greeting is not a header.
    link.feed_line("ready");
    fsm.poll(&mut link, &mut store, 0, &mut sink);

    assert_eq!(fsm.state(), RxState::Idle);
    assert!(link.sent_lines().is_empty(), "no token for a non-header");
    assert!(sink.events.is_empty());
    assert!(store.names().is_empty());
}

#[test]
fn incomplete_header_line_expires() {
    let cfg = SystemConfig::default();
    let (mut fsm, mut link, mut store, mut sink) = setup();

    link.feed(b"img.jpg|20"); // no terminator, ever
    fsm.poll(&mut link, &mut store, 0, &mut sink);
    assert_eq!(fsm.state(), RxState::AwaitingHeader);

    fsm.poll(
        &mut link,
        &mut store,
        u64::from(cfg.rx_inactivity_timeout_ms) + 1,
        &mut sink,
    );
    assert_eq!(fsm.state(), RxState::Idle);
    assert!(link.sent_lines().is_empty());
}

// ── Storage failures ─────────────────────────────────────────

#[test]
fn open_failure_surfaces_and_recovers() {
    let (mut fsm, mut link, mut store, mut sink) = setup();
    store.fail_create = true;

    link.feed_line("img.jpg|2048");
    fsm.poll(&mut link, &mut store, 0, &mut sink);

    assert_eq!(fsm.state(), RxState::Idle);
    assert!(link.sent_lines().is_empty(), "no READY without an open file");
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::StorageFailed(_))));

    // The machine stays operational for the next header.
    store.fail_create = false;
    link.feed_line("img.jpg|4");
    link.feed(&pattern(4));
    fsm.poll(&mut link, &mut store, 10, &mut sink);
    fsm.poll(&mut link, &mut store, 11, &mut sink);
    assert!(fsm.take_completed().is_some());
}

#[test]
fn write_failure_aborts_session() {
    let (mut fsm, mut link, mut store, mut sink) = setup();
    store.fail_append = true;

    link.feed_line("img.jpg|2048");
    fsm.poll(&mut link, &mut store, 0, &mut sink);
    link.feed(&pattern(256));
    fsm.poll(&mut link, &mut store, 10, &mut sink);

    assert_eq!(fsm.state(), RxState::Idle);
    assert!(sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::StorageFailed(_))));
    // The unusable partial is not left behind.
    assert!(store.names().is_empty());
    assert!(fsm.take_completed().is_none());
}

// ── Stored naming ────────────────────────────────────────────

#[test]
fn stored_names_disambiguate_collisions() {
    let (mut fsm, mut link, mut store, mut sink) = setup();
    store.insert("0_img.jpg", b"previous");

    link.feed_line("img.jpg|4");
    link.feed(&pattern(4));
    fsm.poll(&mut link, &mut store, 0, &mut sink);
    fsm.poll(&mut link, &mut store, 1, &mut sink);

    assert_eq!(fsm.take_completed().as_deref(), Some("0_img_1.jpg"));
    assert_eq!(store.get("0_img.jpg").as_deref(), Some(&b"previous"[..]));
}

#[test]
fn sequential_prefix_advances_per_session() {
    let (mut fsm, mut link, mut store, mut sink) = setup();

    for (i, expected) in ["0_img.jpg", "1_img.jpg"].into_iter().enumerate() {
        let now = i as u64 * 100;
        link.feed_line("img.jpg|4");
        link.feed(&pattern(4));
        fsm.poll(&mut link, &mut store, now, &mut sink);
        fsm.poll(&mut link, &mut store, now + 1, &mut sink);
        assert_eq!(fsm.take_completed().as_deref(), Some(expected));
    }
}

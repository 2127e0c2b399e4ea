//! Send-side chunker — the originating device's half of the handshake.
//!
//! Stop-and-wait: header, then one chunk per ACK, then DONE. Throughput is
//! bounded by the round-trip latency of each ACK. The chunker never
//! self-retries; restart decisions belong to the caller.

use log::{debug, info};

use crate::app::ports::Clock;
use crate::error::ChunkerError;
use crate::transfer::framer::{token, TransferHeader};
use crate::transport::{poll_line, write_all, LineAccumulator, Transport};

/// Send a finished byte buffer under `name` over the link.
///
/// Waits (bounded by `ack_timeout_ms`) for `READY` after the header, one
/// `ACK` per chunk, and `DONE` after the last chunk. Absence of any token,
/// or a `NACK_TIMEOUT` from the receiver, is a hard failure of this attempt.
pub fn send(
    link: &mut impl Transport,
    clock: &impl Clock,
    name: &str,
    data: &[u8],
    chunk_size: usize,
    ack_timeout_ms: u32,
) -> Result<(), ChunkerError> {
    let header = TransferHeader {
        name: name.to_string(),
        total_size: data.len(),
    };
    let mut acc = LineAccumulator::new();

    write_all(link, header.encode().as_bytes()).map_err(|()| ChunkerError::LinkWrite)?;
    debug!("sent header {}|{}", name, data.len());

    match expect_token(link, &mut acc, clock, token::READY, ack_timeout_ms) {
        Handshake::Matched => {}
        Handshake::PeerTimedOut => return Err(ChunkerError::PeerTimedOut),
        Handshake::Silence => return Err(ChunkerError::NoReady),
    }

    let chunk_size = chunk_size.max(1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + chunk_size).min(data.len());
        write_all(link, &data[offset..end]).map_err(|()| ChunkerError::LinkWrite)?;
        match expect_token(link, &mut acc, clock, token::ACK, ack_timeout_ms) {
            Handshake::Matched => {}
            Handshake::PeerTimedOut => return Err(ChunkerError::PeerTimedOut),
            Handshake::Silence => return Err(ChunkerError::NoAck(offset)),
        }
        offset = end;
        debug!("sent {offset}/{} bytes", data.len());
    }

    match expect_token(link, &mut acc, clock, token::DONE, ack_timeout_ms) {
        Handshake::Matched => {
            info!("transfer of '{name}' complete ({} bytes)", data.len());
            Ok(())
        }
        Handshake::PeerTimedOut => Err(ChunkerError::PeerTimedOut),
        Handshake::Silence => Err(ChunkerError::NoDone),
    }
}

enum Handshake {
    /// The expected token arrived.
    Matched,
    /// The receiver reported `NACK_TIMEOUT` instead.
    PeerTimedOut,
    /// Nothing relevant arrived before the deadline.
    Silence,
}

/// Bounded wait for one handshake token. `NACK_TIMEOUT` short-circuits;
/// unrelated lines are dropped.
fn expect_token(
    link: &mut impl Transport,
    acc: &mut LineAccumulator,
    clock: &impl Clock,
    expected: &str,
    timeout_ms: u32,
) -> Handshake {
    let deadline = clock.now_ms() + u64::from(timeout_ms);
    loop {
        if let Some(line) = poll_line(link, acc) {
            if line == expected {
                return Handshake::Matched;
            }
            if line == token::NACK_TIMEOUT {
                return Handshake::PeerTimedOut;
            }
            if !line.is_empty() {
                debug!("ignoring line '{line}' while waiting for '{expected}'");
            }
            continue;
        }
        if clock.now_ms() >= deadline {
            return Handshake::Silence;
        }
        clock.sleep_ms(2);
    }
}

// ── Tests ────────────────────────────────────────────────────

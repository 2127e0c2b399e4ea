//! Receive-side transfer state machine.
//!
//! Drives durable-storage writes from the live byte stream on the camera
//! link, enforces the inactivity timeout, and emits the handshake tokens.
//!
//! ```text
//!  IDLE ──[byte on link]──▶ AWAITING_HEADER
//!    ▲                            │
//!    │            [bad header]    │ [header ok, file open] → "READY"
//!    │◀───────────────────────────┤
//!    │                            ▼
//!    │                        RECEIVING ──[bytes == size]──▶ DONE ──▶ IDLE
//!    │                            │                          "DONE"
//!    │                  [inactivity window]
//!    │                            ▼
//!    └──────────────────────── TIMED_OUT      "NACK_TIMEOUT"
//!                     (first timeout re-issues the capture
//!                      trigger once after a grace period)
//! ```
//!
//! Exactly one session is live at a time. The file handle is opened in one
//! place (entering `Receiving`) and closed in exactly one of two
//! (`Done`, `TimedOut`) — never both. All failures recover locally to
//! `Idle`; none are fatal to the loop.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, FileSink, StoragePort};
use crate::config::SystemConfig;
use crate::error::StorageError;
use crate::transfer::framer::{self, token, TransferHeader};
use crate::transport::{poll_line, write_all, LineAccumulator, Transport};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Receive machine states. `Done` and `TimedOut` are transit states: the
/// machine passes through them and rests in `Idle` within the same poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Idle,
    AwaitingHeader,
    Receiving,
    Done,
    TimedOut,
}

/// Elapsed time since the last byte — pure, so the timeout policy is
/// unit-testable without real clocks.
pub fn idle_time_ms(now_ms: u64, last_byte_ms: u64) -> u64 {
    now_ms.saturating_sub(last_byte_ms)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One in-flight file reception. Created on header parse, destroyed on
/// `Done` or timeout; owned exclusively by [`ReceiveFsm`].
#[derive(Debug, Clone)]
pub struct ReceiveSession {
    /// Stored name on the storage medium.
    pub name: String,
    /// Declared total length from the header.
    pub total_size: usize,
    /// Bytes appended so far.
    pub bytes_received: usize,
    /// Timestamp of the most recent drained byte.
    pub last_byte_ms: u64,
    /// True when this session is the automatic retransmission attempt;
    /// its own timeout is then terminal.
    pub retried: bool,
}

// ---------------------------------------------------------------------------
// Receive machine
// ---------------------------------------------------------------------------

pub struct ReceiveFsm {
    state: RxState,
    session: Option<ReceiveSession>,
    /// Open destination file. Invariant: `Some` exactly while `Receiving`.
    file: Option<Box<dyn FileSink>>,
    line: LineAccumulator,
    /// Read buffer, sized to the configured chunk size.
    buf: Vec<u8>,
    /// When the machine entered `AwaitingHeader`.
    header_started_ms: u64,
    /// Session-scoped disambiguator for stored names.
    seq: u32,
    /// Deadline for re-issuing the capture trigger after a first timeout.
    retry_pending_at: Option<u64>,
    /// The next session to open is the automatic retransmission.
    retrying: bool,
    /// Stored name of the last completed file, taken by the service.
    completed: Option<String>,
    /// Set when a session ends with no further automatic action (second
    /// timeout or storage failure); taken by the service.
    abandoned: bool,

    inactivity_timeout_ms: u32,
    retry_grace_ms: u32,
    trigger: String,
}

impl ReceiveFsm {
    pub fn new(cfg: &SystemConfig) -> Self {
        Self {
            state: RxState::Idle,
            session: None,
            file: None,
            line: LineAccumulator::new(),
            buf: vec![0u8; cfg.chunk_size.max(1)],
            header_started_ms: 0,
            seq: 0,
            retry_pending_at: None,
            retrying: false,
            completed: None,
            abandoned: false,
            inactivity_timeout_ms: cfg.rx_inactivity_timeout_ms,
            retry_grace_ms: cfg.retry_grace_ms,
            trigger: framer::trigger_line(cfg.capture_width, cfg.capture_quality),
        }
    }

    /// Current machine state.
    pub fn state(&self) -> RxState {
        self.state
    }

    /// True while a header or chunk stream is being consumed. While active,
    /// the scheduler loop must not run lower-priority work.
    pub fn is_active(&self) -> bool {
        matches!(self.state, RxState::AwaitingHeader | RxState::Receiving)
    }

    /// `(bytes_received, total_size)` of the live session, or zeros.
    pub fn progress(&self) -> (usize, usize) {
        self.session
            .as_ref()
            .map_or((0, 0), |s| (s.bytes_received, s.total_size))
    }

    /// Take the stored name of the most recently completed file.
    pub fn take_completed(&mut self) -> Option<String> {
        self.completed.take()
    }

    /// Take the abandoned marker: a session ended with no further
    /// automatic action, so session-scoped pending work must be dropped.
    pub fn take_abandoned(&mut self) -> bool {
        core::mem::take(&mut self.abandoned)
    }

    /// Whether an automatic re-trigger is armed (grace period running).
    pub fn retry_armed(&self) -> bool {
        self.retry_pending_at.is_some()
    }

    // ── Per-iteration drive ───────────────────────────────────

    /// Advance the machine by one cooperative iteration. Never blocks
    /// waiting for more bytes than are already available.
    pub fn poll(
        &mut self,
        link: &mut impl Transport,
        storage: &mut dyn StoragePort,
        now_ms: u64,
        events: &mut impl EventSink,
    ) {
        match self.state {
            RxState::Idle => {
                if link.available() {
                    self.state = RxState::AwaitingHeader;
                    self.header_started_ms = now_ms;
                    self.poll_header(link, storage, now_ms, events);
                }
            }
            RxState::AwaitingHeader => self.poll_header(link, storage, now_ms, events),
            RxState::Receiving => self.poll_receiving(link, storage, now_ms, events),
            // Transit states collapse on the next poll if ever observed.
            RxState::Done | RxState::TimedOut => self.state = RxState::Idle,
        }
    }

    /// Fire the armed retransmission trigger once its grace period elapses.
    /// Only fires while idle; a header arriving first supersedes it.
    pub fn poll_retry(
        &mut self,
        link: &mut impl Transport,
        now_ms: u64,
        events: &mut impl EventSink,
    ) {
        if self.state != RxState::Idle {
            return;
        }
        if let Some(at) = self.retry_pending_at {
            if now_ms >= at {
                self.retry_pending_at = None;
                info!("re-issuing capture trigger after timeout");
                if write_all(link, self.trigger.as_bytes()).is_err() {
                    warn!("link write failed while re-issuing trigger");
                }
                events.emit(&AppEvent::CaptureRequested);
            }
        }
    }

    // ── AwaitingHeader ────────────────────────────────────────

    fn poll_header(
        &mut self,
        link: &mut impl Transport,
        storage: &mut dyn StoragePort,
        now_ms: u64,
        events: &mut impl EventSink,
    ) {
        while let Some(line) = poll_line(link, &mut self.line) {
            if line.is_empty() {
                continue;
            }
            match TransferHeader::decode(&line) {
                Ok(header) => {
                    self.open_session(&header, link, storage, now_ms, events);
                    return;
                }
                Err(e) => {
                    // Malformed headers are discarded, never retried.
                    info!("ignoring non-header line '{line}': {e}");
                    self.state = RxState::Idle;
                    return;
                }
            }
        }
        if idle_time_ms(now_ms, self.header_started_ms) > u64::from(self.inactivity_timeout_ms) {
            warn!("header line never completed, dropping to idle");
            let _ = self.line.take_pending();
            self.state = RxState::Idle;
        }
    }

    fn open_session(
        &mut self,
        header: &TransferHeader,
        link: &mut impl Transport,
        storage: &mut dyn StoragePort,
        now_ms: u64,
        events: &mut impl EventSink,
    ) {
        let stored = self.next_stored_name(storage, &header.name);
        match storage.create(&stored) {
            Ok(file) => {
                self.file = Some(file);
                let retried = core::mem::take(&mut self.retrying);
                self.retry_pending_at = None;
                self.session = Some(ReceiveSession {
                    name: stored.clone(),
                    total_size: header.total_size,
                    bytes_received: 0,
                    last_byte_ms: now_ms,
                    retried,
                });
                self.state = RxState::Receiving;
                // READY arms the sender; the timeout clock starts now.
                if write_all(link, format!("{}\n", token::READY).as_bytes()).is_err() {
                    warn!("link write failed while sending READY");
                }
                info!(
                    "receiving '{}' ({} bytes){}",
                    stored,
                    header.total_size,
                    if retried { " [retry]" } else { "" }
                );
                events.emit(&AppEvent::TransferStarted {
                    name: stored,
                    total_size: header.total_size,
                });
            }
            Err(e) => {
                warn!("cannot open '{stored}' for writing: {e}");
                events.emit(&AppEvent::StorageFailed(e));
                self.state = RxState::Idle;
            }
        }
    }

    // ── Receiving ─────────────────────────────────────────────

    fn poll_receiving(
        &mut self,
        link: &mut impl Transport,
        storage: &mut dyn StoragePort,
        now_ms: u64,
        events: &mut impl EventSink,
    ) {
        let mut storage_err: Option<StorageError> = None;
        let (complete, timed_out) = {
            let Some(session) = self.session.as_mut() else {
                self.state = RxState::Idle;
                return;
            };
            let Some(file) = self.file.as_mut() else {
                self.state = RxState::Idle;
                return;
            };

            // Throughput path: drain whatever is available, one ACK per
            // drained read, never blocking for more.
            loop {
                let remaining = session.total_size - session.bytes_received;
                if remaining == 0 {
                    break;
                }
                let want = remaining.min(self.buf.len());
                let n = match link.read(&mut self.buf[..want]) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("link read error: {e:?}");
                        0
                    }
                };
                if n == 0 {
                    break;
                }
                if let Err(e) = file.append(&self.buf[..n]) {
                    storage_err = Some(e);
                    break;
                }
                session.bytes_received += n;
                session.last_byte_ms = now_ms;
                if write_all(link, format!("{}\n", token::ACK).as_bytes()).is_err() {
                    warn!("link write failed while sending ACK");
                }
            }

            (
                session.bytes_received == session.total_size,
                idle_time_ms(now_ms, session.last_byte_ms)
                    > u64::from(self.inactivity_timeout_ms),
            )
        };

        if let Some(e) = storage_err {
            self.abort_on_storage(storage, e, events);
        } else if complete {
            self.finish(link, storage, events);
        } else if timed_out {
            self.handle_timeout(link, storage, now_ms, events);
        }
    }

    // ── Done ──────────────────────────────────────────────────

    fn finish(
        &mut self,
        link: &mut impl Transport,
        storage: &mut dyn StoragePort,
        events: &mut impl EventSink,
    ) {
        self.state = RxState::Done;
        let Some(session) = self.session.take() else {
            self.state = RxState::Idle;
            return;
        };
        let close_result = self.file.take().map_or(Ok(()), |f| f.close());

        match close_result {
            Ok(()) => {
                if write_all(link, format!("{}\n", token::DONE).as_bytes()).is_err() {
                    warn!("link write failed while sending DONE");
                }
                info!(
                    "stored '{}' ({} bytes), eligible for upload",
                    session.name, session.bytes_received
                );
                events.emit(&AppEvent::TransferComplete {
                    name: session.name.clone(),
                    bytes: session.bytes_received,
                });
                self.completed = Some(session.name);
            }
            Err(e) => {
                // A failed flush means the bytes may not all be on the
                // medium; the file is not upload-eligible.
                warn!("close failed for '{}': {e}", session.name);
                let _ = storage.remove(&session.name);
                events.emit(&AppEvent::StorageFailed(e));
            }
        }
        self.state = RxState::Idle;
    }

    // ── TimedOut ──────────────────────────────────────────────

    fn handle_timeout(
        &mut self,
        link: &mut impl Transport,
        storage: &mut dyn StoragePort,
        now_ms: u64,
        events: &mut impl EventSink,
    ) {
        self.state = RxState::TimedOut;
        let Some(session) = self.session.take() else {
            self.state = RxState::Idle;
            return;
        };
        if let Some(file) = self.file.take() {
            let _ = file.close();
        }
        // Partial files are never upload-eligible; drop them.
        let _ = storage.remove(&session.name);

        if write_all(link, format!("{}\n", token::NACK_TIMEOUT).as_bytes()).is_err() {
            warn!("link write failed while sending NACK_TIMEOUT");
        }

        let will_retry = !session.retried;
        if will_retry {
            // Exactly one automatic retransmission per logical file.
            self.retry_pending_at = Some(now_ms + u64::from(self.retry_grace_ms));
            self.retrying = true;
            warn!(
                "timeout at {}/{} bytes for '{}', arming one retransmission",
                session.bytes_received, session.total_size, session.name
            );
        } else {
            self.abandoned = true;
            warn!(
                "second timeout for '{}' at {}/{} bytes, abandoning file",
                session.name, session.bytes_received, session.total_size
            );
        }
        events.emit(&AppEvent::TransferTimedOut {
            name: session.name,
            received: session.bytes_received,
            will_retry,
        });
        self.state = RxState::Idle;
    }

    // ── Resource failure ──────────────────────────────────────

    fn abort_on_storage(
        &mut self,
        storage: &mut dyn StoragePort,
        e: StorageError,
        events: &mut impl EventSink,
    ) {
        if let Some(session) = self.session.take() {
            if let Some(file) = self.file.take() {
                let _ = file.close();
            }
            let _ = storage.remove(&session.name);
            self.abandoned = true;
            warn!("storage failure mid-transfer for '{}': {e}", session.name);
        }
        events.emit(&AppEvent::StorageFailed(e));
        // The sender will observe the silence and give up on its own
        // bounded ACK wait; the machine stays operational for the next
        // header.
        self.state = RxState::Idle;
    }

    // ── Stored naming ─────────────────────────────────────────

    /// `<seq>_<base>.jpg`, disambiguated until unused. The `<seq>` prefix
    /// doubles as the sensor identifier in the upload query.
    fn next_stored_name(&mut self, storage: &dyn StoragePort, header_name: &str) -> String {
        let base = sanitize_base(header_name);
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        let mut candidate = format!("{seq}_{base}.jpg");
        let mut counter = 0u32;
        while storage.exists(&candidate) {
            counter += 1;
            candidate = format!("{seq}_{base}_{counter}.jpg");
        }
        candidate
    }
}

/// Strip any extension and path-traversal characters from a header name.
/// An empty result falls back to `img`.
fn sanitize_base(name: &str) -> String {
    let stem = name.rsplit_once('.').map_or(name, |(base, _)| base);
    let clean: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if clean.is_empty() {
        String::from("img")
    } else {
        clean
    }
}

// ── Tests ────────────────────────────────────────────────────

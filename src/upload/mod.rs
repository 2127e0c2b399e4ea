//! Upload relay — stored file to remote HTTP endpoint over the modem channel.
//!
//! The relay speaks AT commands to a SIM800-class cellular modem:
//!
//! ```text
//!  AT+HTTPTERM          (idempotent teardown, result ignored)
//!  AT+HTTPINIT          → OK
//!  AT+HTTPPARA="CID",1  → OK
//!  AT+HTTPPARA="URL","<base>?id_sensor=<id>&filename=<name>"  → OK
//!  AT+HTTPPARA="CONTENT","image/jpeg"                          → OK
//!  AT+HTTPDATA=<len>,<ms>  → DOWNLOAD   (then raw body bytes)  → OK
//!  AT+HTTPACTION=1      → OK
//!      ... later, asynchronously ...
//!  +HTTPACTION: 1,<status>,<len>        (matched by the loop's reader)
//!  AT+HTTPREAD          → body bytes    (only on 2xx with len > 0)
//!  OK                   → AT+HTTPTERM
//! ```
//!
//! The POST issuance and its reply are deliberately decoupled in time:
//! `begin` returns once the action command is accepted, and the scheduler
//! loop's `poll` is the only place the dangling reply can be observed.
//! There is no correlation identifier — one request slot, at most one
//! upload in flight, late replies with no outstanding request are ignored.
//! Delivery is at-most-once per completed file: no automatic retry.

pub mod session;

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{Clock, EventSink, FileSource, StoragePort};
use crate::config::SystemConfig;
use crate::error::ModemError;
use crate::transport::{poll_line, wait_for_token, write_all, LineAccumulator, Transport};
use session::UploadSession;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Relay states. The single in-flight request slot is the `AwaitingAction`
/// variant; everything after it is interpretation of the asynchronous reply.
enum RelayState {
    Idle,
    /// POST issued; waiting for the asynchronous `+HTTPACTION` line.
    AwaitingAction { issued_ms: u64 },
    /// Read-back command issued; accumulating the response body.
    ReadingBody {
        status: u16,
        expected: usize,
        body: Vec<u8>,
        deadline_ms: u64,
        header_seen: bool,
    },
    /// Body complete (or accepted partial); waiting for the terminal line.
    AwaitingTerminal {
        status: u16,
        body: Vec<u8>,
        deadline_ms: u64,
    },
}

/// Outcome of one AT command round-trip.
enum CmdResult {
    Ok,
    Error,
    Timeout,
}

pub struct UploadRelay {
    state: RelayState,
    line: LineAccumulator,

    uploads_ok: u32,
    uploads_failed: u32,
    last_status: Option<u16>,

    base_url: String,
    content_type: String,
    cmd_timeout_ms: u32,
    prompt_timeout_ms: u32,
    write_chunk: usize,
    write_delay_ms: u32,
    action_timeout_ms: u32,
    body_timeout_ms: u32,
}

impl UploadRelay {
    pub fn new(cfg: &SystemConfig) -> Self {
        Self {
            state: RelayState::Idle,
            line: LineAccumulator::new(),
            uploads_ok: 0,
            uploads_failed: 0,
            last_status: None,
            base_url: cfg.upload_url.clone(),
            content_type: cfg.content_type.clone(),
            cmd_timeout_ms: cfg.modem_cmd_timeout_ms,
            prompt_timeout_ms: cfg.modem_prompt_timeout_ms,
            write_chunk: cfg.modem_write_chunk.max(1),
            write_delay_ms: cfg.modem_write_delay_ms,
            action_timeout_ms: cfg.http_action_timeout_ms,
            body_timeout_ms: cfg.body_read_timeout_ms,
        }
    }

    /// Whether a request slot is occupied (POST issued, reply outstanding).
    pub fn busy(&self) -> bool {
        !matches!(self.state, RelayState::Idle)
    }

    /// `(uploads_ok, uploads_failed, last_http_status)` for telemetry.
    pub fn stats(&self) -> (u32, u32, Option<u16>) {
        (self.uploads_ok, self.uploads_failed, self.last_status)
    }

    // ── Upload initiation ─────────────────────────────────────

    /// Start an upload of a completely stored file.
    ///
    /// Derivation failures abort before any modem traffic. Channel-setup
    /// commands block for their (bounded) deadlines; once the action
    /// command is accepted this returns with the reply still outstanding.
    pub fn begin(
        &mut self,
        stored_name: &str,
        storage: &mut dyn StoragePort,
        modem: &mut impl Transport,
        clock: &impl Clock,
        events: &mut impl EventSink,
    ) {
        if self.busy() {
            warn!("upload already in flight, ignoring request for '{stored_name}'");
            return;
        }

        let upload = match UploadSession::derive(stored_name) {
            Ok(s) => s,
            Err(e) => {
                warn!("refusing upload of '{stored_name}': {e}");
                events.emit(&AppEvent::UploadRejected(e));
                self.uploads_failed += 1;
                return;
            }
        };

        let file = match storage.open(stored_name) {
            Ok(f) => f,
            Err(e) => {
                warn!("cannot open '{stored_name}' for upload: {e}");
                events.emit(&AppEvent::StorageFailed(e));
                self.uploads_failed += 1;
                return;
            }
        };

        info!(
            "uploading '{}' as sensor {} ({} bytes)",
            upload.source_name,
            upload.sensor_id,
            file.len()
        );
        events.emit(&AppEvent::UploadStarted {
            name: upload.source_name.clone(),
            sensor_id: upload.sensor_id.clone(),
        });

        match self.post(&upload, file, modem, clock) {
            Ok(()) => {
                self.state = RelayState::AwaitingAction {
                    issued_ms: clock.now_ms(),
                };
            }
            Err(e) => {
                warn!("upload of '{}' failed: {e}", upload.source_name);
                // Best-effort teardown so the next attempt starts clean.
                let _ = self.command(modem, clock, "AT+HTTPTERM");
                events.emit(&AppEvent::UploadFailed(e));
                self.uploads_failed += 1;
                self.state = RelayState::Idle;
            }
        }
    }

    /// Steps 1–5: session setup, data phase, action command.
    fn post(
        &mut self,
        upload: &UploadSession,
        mut file: Box<dyn FileSource>,
        modem: &mut impl Transport,
        clock: &impl Clock,
    ) -> Result<(), ModemError> {
        // Tear down any previous session; the result is deliberately ignored
        // (the command errors when nothing was open).
        let _ = self.command(modem, clock, "AT+HTTPTERM");

        for cmd in [
            "AT+HTTPINIT".to_string(),
            "AT+HTTPPARA=\"CID\",1".to_string(),
            format!("AT+HTTPPARA=\"URL\",\"{}\"", upload.url(&self.base_url)),
            format!("AT+HTTPPARA=\"CONTENT\",\"{}\"", self.content_type),
        ] {
            match self.command(modem, clock, &cmd) {
                CmdResult::Ok => {}
                CmdResult::Error => return Err(ModemError::InitFailed),
                CmdResult::Timeout => return Err(ModemError::CommandTimeout),
            }
        }

        // Data phase: declare the length, wait for the prompt, then stream
        // the file in fixed-size reads, pacing for the modem's buffer.
        let total = file.len();
        let data_cmd = format!("AT+HTTPDATA={},{}", total, self.body_timeout_ms);
        self.send_line(modem, &data_cmd)?;
        if !wait_for_token(modem, &mut self.line, clock, "DOWNLOAD", self.prompt_timeout_ms) {
            return Err(ModemError::NoPrompt);
        }

        let mut buf = vec![0u8; self.write_chunk];
        loop {
            let n = file.read(&mut buf).map_err(|_| ModemError::ChannelWrite)?;
            if n == 0 {
                break;
            }
            write_all(modem, &buf[..n]).map_err(|()| ModemError::ChannelWrite)?;
            clock.sleep_ms(self.write_delay_ms);
        }
        if !wait_for_token(modem, &mut self.line, clock, "OK", self.cmd_timeout_ms) {
            return Err(ModemError::CommandTimeout);
        }

        // The reply to the action command is NOT read here — it arrives
        // later as an asynchronous line, observed by `poll`.
        match self.command(modem, clock, "AT+HTTPACTION=1") {
            CmdResult::Ok => Ok(()),
            CmdResult::Error => Err(ModemError::InitFailed),
            CmdResult::Timeout => Err(ModemError::CommandTimeout),
        }
    }

    // ── Asynchronous reply interpretation ─────────────────────

    /// Drain and interpret modem lines. Called every scheduler iteration
    /// outside reception; this is the only place the asynchronous action
    /// reply can be matched to the outstanding request.
    pub fn poll(
        &mut self,
        modem: &mut impl Transport,
        clock: &impl Clock,
        events: &mut impl EventSink,
    ) {
        let now_ms = clock.now_ms();
        let state = core::mem::replace(&mut self.state, RelayState::Idle);
        self.state = match state {
            RelayState::Idle => {
                while let Some(line) = poll_line(modem, &mut self.line) {
                    if line.is_empty() {
                        continue;
                    }
                    if parse_action_reply(&line).is_some() {
                        // No outstanding request to match it against.
                        warn!("ignoring late HTTP reply '{line}'");
                    } else {
                        debug!("modem (unsolicited): {line}");
                    }
                }
                RelayState::Idle
            }

            RelayState::AwaitingAction { issued_ms } => {
                let mut next = None;
                while let Some(line) = poll_line(modem, &mut self.line) {
                    if let Some((status, len)) = parse_action_reply(&line) {
                        self.last_status = Some(status);
                        info!("HTTP action reply: status {status}, {len} bytes");
                        if (200..300).contains(&status) && len > 0 {
                            // Exactly one follow-up read-back.
                            if self.send_line(modem, "AT+HTTPREAD").is_ok() {
                                next = Some(RelayState::ReadingBody {
                                    status,
                                    expected: len,
                                    body: Vec::with_capacity(len),
                                    deadline_ms: now_ms + u64::from(self.body_timeout_ms),
                                    header_seen: false,
                                });
                            } else {
                                next = Some(self.conclude(status, Vec::new(), modem, clock, events));
                            }
                        } else {
                            next = Some(self.conclude(status, Vec::new(), modem, clock, events));
                        }
                        break;
                    } else if !line.is_empty() {
                        debug!("modem: {line}");
                    }
                }
                match next {
                    Some(s) => s,
                    None if idle_for(now_ms, issued_ms) > u64::from(self.action_timeout_ms) => {
                        warn!("no HTTP action reply within deadline");
                        let _ = self.command(modem, clock, "AT+HTTPTERM");
                        events.emit(&AppEvent::UploadFailed(ModemError::CommandTimeout));
                        self.uploads_failed += 1;
                        RelayState::Idle
                    }
                    None => RelayState::AwaitingAction { issued_ms },
                }
            }

            RelayState::ReadingBody {
                status,
                expected,
                mut body,
                deadline_ms,
                mut header_seen,
            } => {
                // Skip the "+HTTPREAD: <n>" echo line, then switch to raw
                // byte accumulation.
                if !header_seen {
                    while let Some(line) = poll_line(modem, &mut self.line) {
                        if line.starts_with("+HTTPREAD") {
                            header_seen = true;
                            // Bytes already buffered past the header belong
                            // to the body.
                            let pending = self.line.take_pending();
                            body.extend_from_slice(&pending);
                            break;
                        } else if !line.is_empty() {
                            debug!("modem: {line}");
                        }
                    }
                }
                if header_seen {
                    let mut chunk = [0u8; 64];
                    while body.len() < expected {
                        let want = (expected - body.len()).min(chunk.len());
                        match modem.read(&mut chunk[..want]) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => body.extend_from_slice(&chunk[..n]),
                        }
                    }
                }

                if body.len() >= expected {
                    RelayState::AwaitingTerminal {
                        status,
                        body,
                        deadline_ms: now_ms + u64::from(self.cmd_timeout_ms),
                    }
                } else if now_ms >= deadline_ms {
                    // Partial bodies on timeout are accepted, not discarded.
                    warn!(
                        "body read-back deadline hit at {}/{} bytes",
                        body.len(),
                        expected
                    );
                    self.conclude(status, body, modem, clock, events)
                } else {
                    RelayState::ReadingBody {
                        status,
                        expected,
                        body,
                        deadline_ms,
                        header_seen,
                    }
                }
            }

            RelayState::AwaitingTerminal {
                status,
                body,
                deadline_ms,
            } => {
                let mut terminal = false;
                while let Some(line) = poll_line(modem, &mut self.line) {
                    if line == "OK" || line == "ERROR" {
                        terminal = true;
                        break;
                    }
                    if !line.is_empty() {
                        debug!("modem: {line}");
                    }
                }
                if terminal || now_ms >= deadline_ms {
                    self.conclude(status, body, modem, clock, events)
                } else {
                    RelayState::AwaitingTerminal {
                        status,
                        body,
                        deadline_ms,
                    }
                }
            }
        };
    }

    /// Tear down the HTTP session and report the outcome.
    fn conclude(
        &mut self,
        status: u16,
        body: Vec<u8>,
        modem: &mut impl Transport,
        clock: &impl Clock,
        events: &mut impl EventSink,
    ) -> RelayState {
        let _ = self.command(modem, clock, "AT+HTTPTERM");
        if (200..300).contains(&status) {
            self.uploads_ok += 1;
        } else {
            self.uploads_failed += 1;
        }
        events.emit(&AppEvent::UploadResult {
            status,
            body_len: body.len(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        RelayState::Idle
    }

    // ── Channel primitives ────────────────────────────────────

    fn send_line(&mut self, modem: &mut impl Transport, cmd: &str) -> Result<(), ModemError> {
        debug!("modem <- {cmd}");
        write_all(modem, format!("{cmd}\r\n").as_bytes()).map_err(|()| ModemError::ChannelWrite)
    }

    /// One bounded command round-trip: write, wait for OK/ERROR.
    fn command(&mut self, modem: &mut impl Transport, clock: &impl Clock, cmd: &str) -> CmdResult {
        if self.send_line(modem, cmd).is_err() {
            return CmdResult::Error;
        }
        let deadline = clock.now_ms() + u64::from(self.cmd_timeout_ms);
        loop {
            if let Some(line) = poll_line(modem, &mut self.line) {
                match line.as_str() {
                    "OK" => return CmdResult::Ok,
                    "ERROR" => return CmdResult::Error,
                    "" => {}
                    other => debug!("modem: {other}"),
                }
                continue;
            }
            if clock.now_ms() >= deadline {
                return CmdResult::Timeout;
            }
            clock.sleep_ms(2);
        }
    }
}

fn idle_for(now_ms: u64, since_ms: u64) -> u64 {
    now_ms.saturating_sub(since_ms)
}

/// Parse `+HTTPACTION: <method>,<status>,<len>` into `(status, len)`.
fn parse_action_reply(line: &str) -> Option<(u16, usize)> {
    let rest = line.strip_prefix("+HTTPACTION:")?.trim();
    let mut parts = rest.split(',');
    let _method = parts.next()?;
    let status: u16 = parts.next()?.trim().parse().ok()?;
    let len: usize = parts.next()?.trim().parse().ok()?;
    Some((status, len))
}

// ── Tests ────────────────────────────────────────────────────

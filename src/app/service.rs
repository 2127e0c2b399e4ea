//! Application service — the cooperative priority loop.
//!
//! [`AppService`] owns the receive machine, the upload relay, the interval
//! engine, and the scheduler-level pending-work flags. One `poll` is one
//! loop iteration, with the priority order:
//!
//! 1. If not receiving and link bytes are available, begin header decode.
//! 2. If receiving, fully drive the receive machine and **skip everything
//!    else** — reception is never interrupted by command handling or
//!    periodic work.
//! 3. Otherwise: fire the armed retransmission trigger, start a pending
//!    upload, drain asynchronous modem replies, service one pending
//!    operator command, then run interval-gated periodic tasks.
//!
//! Single-threaded, no preemption; worst-case timeout detection latency is
//! one loop iteration.

use log::{info, warn};

use crate::app::commands::OperatorCommand;
use crate::app::events::{AppEvent, TelemetryData};
use crate::app::ports::{Clock, EventSink, ScheduleFiredKind, SchedulerDelegate, StoragePort};
use crate::config::SystemConfig;
use crate::scheduler::{Schedule, ScheduleKind, Scheduler};
use crate::transfer::framer;
use crate::transfer::receiver::ReceiveFsm;
use crate::transport::{write_all, Transport};
use crate::upload::UploadRelay;

const AUTO_CAPTURE: &str = "auto capture";
const TELEMETRY: &str = "telemetry refresh";

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    rx: ReceiveFsm,
    relay: UploadRelay,
    intervals: Scheduler,
    trigger: String,

    // Scheduler-level pending work. Ephemeral, never persisted, reset at
    // session boundaries.
    send_after_receive: bool,
    pending_upload: Option<String>,
    /// Single slot: one operator command serviced per idle iteration.
    pending_command: Option<OperatorCommand>,

    last_stored: Option<String>,
}

impl AppService {
    pub fn new(cfg: &SystemConfig) -> Self {
        let mut intervals = Scheduler::new();
        if cfg.auto_capture_interval_secs > 0 {
            intervals.add(Schedule {
                label: AUTO_CAPTURE,
                kind: ScheduleKind::Periodic {
                    interval_secs: cfg.auto_capture_interval_secs,
                },
                enabled: true,
            });
        }
        intervals.add(Schedule {
            label: TELEMETRY,
            kind: ScheduleKind::Periodic {
                interval_secs: cfg.telemetry_interval_secs,
            },
            enabled: true,
        });

        info!(
            "service ready: chunk={}B rx_timeout={}ms upload={}",
            cfg.chunk_size, cfg.rx_inactivity_timeout_ms, cfg.upload_url
        );

        Self {
            rx: ReceiveFsm::new(cfg),
            relay: UploadRelay::new(cfg),
            intervals,
            trigger: framer::trigger_line(cfg.capture_width, cfg.capture_quality),
            send_after_receive: false,
            pending_upload: None,
            pending_command: None,
            last_stored: None,
        }
    }

    // ── External surface ──────────────────────────────────────

    /// Queue an operator command. The slot holds one command; further
    /// submissions before it is serviced are dropped with a warning.
    pub fn submit_command(&mut self, cmd: OperatorCommand) {
        if self.pending_command.is_some() {
            warn!("operator command {cmd:?} dropped, slot occupied");
            return;
        }
        self.pending_command = Some(cmd);
    }

    /// Stored name of the last completed file.
    pub fn last_stored(&self) -> Option<&str> {
        self.last_stored.as_deref()
    }

    /// Receive-machine state (for status consumers).
    pub fn rx_state(&self) -> crate::transfer::receiver::RxState {
        self.rx.state()
    }

    /// True while a reception is consuming the link; callers should not
    /// pace the loop in that window.
    pub fn rx_active(&self) -> bool {
        self.rx.is_active()
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// Run one loop iteration. `delta_ms` is the time since the previous
    /// call, used to advance interval-gated work.
    pub fn poll(
        &mut self,
        link: &mut impl Transport,
        modem: &mut impl Transport,
        storage: &mut dyn StoragePort,
        clock: &impl Clock,
        delta_ms: u32,
        events: &mut impl EventSink,
    ) {
        let now_ms = clock.now_ms();

        // (1)/(2) — reception owns the iteration. Checking the link while
        // idle is exclusive with driving an in-progress session.
        if self.rx.is_active() || link.available() {
            self.rx.poll(link, storage, now_ms, events);
            self.note_completion();
            return;
        }

        // (3) — idle path.
        self.rx.poll_retry(link, now_ms, events);

        if !self.relay.busy() {
            if let Some(name) = self.pending_upload.take() {
                self.relay.begin(&name, storage, modem, clock, events);
            }
        }
        self.relay.poll(modem, clock, events);

        if let Some(cmd) = self.pending_command.take() {
            self.handle_command(cmd, link, events);
        }

        let mut fires = FireCollector::default();
        self.intervals.tick(delta_ms, &mut fires);
        if fires.capture {
            self.request_capture(link, events);
        }
        if fires.telemetry {
            self.emit_telemetry(events);
        }
    }

    // ── Command handling ──────────────────────────────────────

    fn handle_command(
        &mut self,
        cmd: OperatorCommand,
        link: &mut impl Transport,
        events: &mut impl EventSink,
    ) {
        match cmd {
            OperatorCommand::UploadLast => match self.last_stored.clone() {
                Some(name) => self.pending_upload = Some(name),
                None => warn!("upload requested but nothing stored yet"),
            },
            OperatorCommand::RequestCapture => self.request_capture(link, events),
            OperatorCommand::SyncClock => {
                // The RTC collaborator owns the actual sync.
                events.emit(&AppEvent::ClockSyncRequested);
            }
            OperatorCommand::CaptureThenUpload => {
                self.send_after_receive = true;
                self.request_capture(link, events);
            }
        }
    }

    fn request_capture(&mut self, link: &mut impl Transport, events: &mut impl EventSink) {
        if write_all(link, self.trigger.as_bytes()).is_err() {
            warn!("link write failed while requesting capture");
            return;
        }
        info!("capture requested");
        events.emit(&AppEvent::CaptureRequested);
    }

    // ── Session boundary bookkeeping ──────────────────────────

    fn note_completion(&mut self) {
        if let Some(name) = self.rx.take_completed() {
            self.last_stored = Some(name.clone());
            if core::mem::take(&mut self.send_after_receive) {
                self.pending_upload = Some(name);
            }
        }
        // Session-scoped pending work dies with an abandoned session.
        if self.rx.take_abandoned() {
            self.send_after_receive = false;
        }
    }

    // ── Telemetry ─────────────────────────────────────────────

    /// Build and emit a telemetry snapshot. Status side channel only;
    /// never affects transfer correctness.
    pub fn emit_telemetry(&self, events: &mut impl EventSink) {
        let (bytes_received, total_size) = self.rx.progress();
        let (uploads_ok, uploads_failed, last_http_status) = self.relay.stats();
        events.emit(&AppEvent::Telemetry(TelemetryData {
            rx_state: self.rx.state(),
            bytes_received,
            total_size,
            last_stored: self.last_stored.clone(),
            uploads_ok,
            uploads_failed,
            last_http_status,
        }));
    }
}

// ── Scheduler delegate ────────────────────────────────────────
//
// Collects fires during one tick; the service maps them to pending work
// after the tick so the engine stays ignorant of transfers and uploads.

#[derive(Default)]
struct FireCollector {
    capture: bool,
    telemetry: bool,
}

impl SchedulerDelegate for FireCollector {
    fn on_schedule_fired(&mut self, label: &str, _kind: ScheduleFiredKind) {
        match label {
            AUTO_CAPTURE => self.capture = true,
            TELEMETRY => self.telemetry = true,
            other => warn!("unmapped schedule fired: '{other}'"),
        }
    }
}

//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (UART channels, SD storage, the system timer, event sinks)
//! implement these traits. The [`AppService`](super::service::AppService)
//! consumes them via generics, so the domain core never touches hardware
//! directly. The byte-channel port lives in [`crate::transport`].

use crate::error::StorageError;

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: system timer → domain)
// ───────────────────────────────────────────────────────────────

/// Monotonic time source plus bounded stalls.
///
/// `now_ms` must be monotonic from boot; wall-clock time is irrelevant to
/// transfer correctness. `sleep_ms` is used only for the short, bounded
/// waits the cooperative loop deliberately accepts (handshake tokens, AT
/// acknowledgements, modem buffer pacing).
pub trait Clock {
    /// Milliseconds since boot (monotonic).
    fn now_ms(&self) -> u64;

    /// Block the cooperative loop for `ms` milliseconds.
    fn sleep_ms(&self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ SD / filesystem)
// ───────────────────────────────────────────────────────────────

/// Durable file storage for received images.
///
/// Implementations own the path layout; the domain only ever handles bare
/// stored names. The receive machine holds at most one open [`FileSink`] at
/// a time — opened on entering `Receiving`, closed on `Done` or `TimedOut`,
/// never both.
pub trait StoragePort {
    /// Create a file for writing, truncating any previous content.
    fn create(&mut self, name: &str) -> Result<Box<dyn FileSink>, StorageError>;

    /// Open a stored file for sequential reading.
    fn open(&mut self, name: &str) -> Result<Box<dyn FileSource>, StorageError>;

    /// Delete a stored file. `Ok(())` even if it didn't exist.
    fn remove(&mut self, name: &str) -> Result<(), StorageError>;

    /// Check whether a stored file exists.
    fn exists(&self, name: &str) -> bool;
}

/// Write side of one stored file.
pub trait FileSink {
    /// Append bytes at the current position.
    fn append(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Flush and close. Consumes the handle — a closed file cannot be
    /// written again through this object.
    fn close(self: Box<Self>) -> Result<(), StorageError>;
}

/// Read side of one stored file.
pub trait FileSource {
    /// Read up to `buf.len()` bytes. Returns 0 at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Total size in bytes.
    fn len(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go (serial log, display
/// status line, diagnostics channel, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from the service)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the scheduler invokes when a schedule fires.
///
/// This decouples the [`Scheduler`](crate::scheduler::Scheduler) from the
/// application service: the main loop implements this by queueing work on
/// the service, but the scheduler itself knows nothing about transfers or
/// uploads.
pub trait SchedulerDelegate {
    /// Called when a schedule fires.
    ///
    /// * `label` — the human-readable label of the schedule that fired.
    /// * `kind`  — whether it was a periodic or one-shot fire.
    fn on_schedule_fired(&mut self, label: &str, kind: ScheduleFiredKind);
}

/// Discriminant passed to [`SchedulerDelegate::on_schedule_fired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleFiredKind {
    /// A recurring periodic schedule fired.
    Periodic,
    /// A one-shot schedule fired (auto-disables after).
    OneShot,
}

//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) and the transfer/upload
//! machines emit these through the [`EventSink`](super::ports::EventSink)
//! port. Adapters on the other side decide what to do with them — log to
//! serial, drive a status display, etc. None of them affect transfer
//! correctness.

use crate::error::{DerivationError, ModemError, StorageError};
use crate::transfer::receiver::RxState;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),

    /// A valid header arrived and a receive session opened.
    TransferStarted { name: String, total_size: usize },

    /// A receive session completed; the stored file is upload-eligible.
    TransferComplete { name: String, bytes: usize },

    /// A receive session hit the inactivity window.
    /// `will_retry` is true only on the first timeout of a logical file.
    TransferTimedOut { name: String, received: usize, will_retry: bool },

    /// The destination file could not be opened or written.
    StorageFailed(StorageError),

    /// An upload attempt began for this stored file.
    UploadStarted { name: String, sensor_id: String },

    /// The stored name had no identifier delimiter; nothing was sent.
    UploadRejected(DerivationError),

    /// The modem channel failed before the POST was issued.
    UploadFailed(ModemError),

    /// The asynchronous HTTP reply was interpreted.
    UploadResult { status: u16, body_len: usize, body: String },

    /// The operator asked for a time-base refresh (RTC collaborator).
    ClockSyncRequested,

    /// A capture trigger was written to the camera link.
    CaptureRequested,
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone)]
pub struct TelemetryData {
    pub rx_state: RxState,
    pub bytes_received: usize,
    pub total_size: usize,
    pub last_stored: Option<String>,
    pub uploads_ok: u32,
    pub uploads_failed: u32,
    pub last_http_status: Option<u16>,
}

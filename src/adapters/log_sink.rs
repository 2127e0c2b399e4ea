//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC in production). A display or diagnostics
//! adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | rx={:?} {}/{}B | last={} | uploads {} ok / {} failed | http={}",
                    t.rx_state,
                    t.bytes_received,
                    t.total_size,
                    t.last_stored.as_deref().unwrap_or("-"),
                    t.uploads_ok,
                    t.uploads_failed,
                    t.last_http_status
                        .map_or_else(|| String::from("-"), |s| s.to_string()),
                );
            }
            AppEvent::TransferStarted { name, total_size } => {
                info!("XFER  | started '{}' ({} bytes)", name, total_size);
            }
            AppEvent::TransferComplete { name, bytes } => {
                info!("XFER  | complete '{}' ({} bytes)", name, bytes);
            }
            AppEvent::TransferTimedOut {
                name,
                received,
                will_retry,
            } => {
                warn!(
                    "XFER  | timeout '{}' at {} bytes{}",
                    name,
                    received,
                    if *will_retry { ", retrying once" } else { ", abandoned" }
                );
            }
            AppEvent::StorageFailed(e) => {
                warn!("STORE | {}", e);
            }
            AppEvent::UploadStarted { name, sensor_id } => {
                info!("POST  | '{}' (sensor {})", name, sensor_id);
            }
            AppEvent::UploadRejected(e) => {
                warn!("POST  | rejected: {}", e);
            }
            AppEvent::UploadFailed(e) => {
                warn!("POST  | failed: {}", e);
            }
            AppEvent::UploadResult {
                status,
                body_len,
                body,
            } => {
                info!("POST  | status {} ({} body bytes) {}", status, body_len, body);
            }
            AppEvent::ClockSyncRequested => {
                info!("CLOCK | sync requested");
            }
            AppEvent::CaptureRequested => {
                info!("CAM   | capture trigger sent");
            }
        }
    }
}

//! System configuration parameters
//!
//! All tunable parameters for the CamRelay system.
//! Values can be overridden via a JSON file on the storage card
//! (`camrelay.json`); absent or corrupt files fall back to defaults.

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Serial transfer ---
    /// Maximum payload bytes per chunk on the camera link.
    pub chunk_size: usize,
    /// Inactivity window while receiving before the session times out (ms).
    pub rx_inactivity_timeout_ms: u32,
    /// Grace period between a first timeout and the automatic re-trigger (ms).
    pub retry_grace_ms: u32,
    /// How long the send-side chunker waits for each handshake token (ms).
    pub ack_timeout_ms: u32,

    // --- Capture trigger ---
    /// Width argument forwarded with the capture trigger (px).
    pub capture_width: u16,
    /// Quality argument forwarded with the capture trigger (1-10 scale).
    pub capture_quality: u8,

    // --- Upload ---
    /// Base address of the ingestion endpoint (query parameters appended).
    pub upload_url: String,
    /// Content type declared for the POST body.
    pub content_type: String,
    /// Deadline for ordinary AT command acknowledgements (ms).
    pub modem_cmd_timeout_ms: u32,
    /// Deadline for the DOWNLOAD prompt before the data phase (ms).
    pub modem_prompt_timeout_ms: u32,
    /// Bytes per read when streaming the file onto the modem channel.
    pub modem_write_chunk: usize,
    /// Pause between data writes so the modem buffer can drain (ms).
    pub modem_write_delay_ms: u32,
    /// How long to wait for the asynchronous HTTP action reply (ms).
    pub http_action_timeout_ms: u32,
    /// Deadline for accumulating the response body after HTTPREAD (ms).
    pub body_read_timeout_ms: u32,

    // --- Timing ---
    /// Cooperative loop pacing (milliseconds per iteration).
    pub loop_interval_ms: u32,
    /// Auto-trigger a new capture this often (seconds; 0 disables).
    pub auto_capture_interval_secs: u32,
    /// Telemetry refresh interval (seconds).
    pub telemetry_interval_secs: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Serial transfer
            chunk_size: 256,
            rx_inactivity_timeout_ms: 20_000,
            retry_grace_ms: 1_000,
            ack_timeout_ms: 10_000,

            // Capture trigger
            capture_width: 1024,
            capture_quality: 5,

            // Upload
            upload_url: String::from("http://ingest.camrelay.net/upload"),
            content_type: String::from("image/jpeg"),
            modem_cmd_timeout_ms: 5_000,
            modem_prompt_timeout_ms: 5_000,
            modem_write_chunk: 512,
            modem_write_delay_ms: 20,
            http_action_timeout_ms: 30_000,
            body_read_timeout_ms: 10_000,

            // Timing
            loop_interval_ms: 20,
            auto_capture_interval_secs: 600, // 10 min
            telemetry_interval_secs: 60,     // 1/min
        }
    }
}

impl SystemConfig {
    /// Parse a config from JSON text (the storage-card override file).
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

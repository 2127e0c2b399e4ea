//! Wire shape of the transfer handshake — pure encode/decode, no I/O.

use crate::error::ProtocolError;

/// Maximum payload bytes per chunk. Fixed, not negotiated; the final chunk
/// of a file may be shorter.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Handshake tokens, each sent as one `\n`-terminated line.
pub mod token {
    /// Receiver → sender: header accepted, destination open, start streaming.
    pub const READY: &str = "READY";
    /// Receiver → sender: one drained read was appended to the file.
    pub const ACK: &str = "ACK";
    /// Receiver → sender: byte count reached the declared total.
    pub const DONE: &str = "DONE";
    /// Receiver → sender: inactivity window elapsed mid-transfer.
    pub const NACK_TIMEOUT: &str = "NACK_TIMEOUT";
    /// Receiver → sender: capture request keyword.
    pub const TRIGGER: &str = "foto";
}

/// Build the capture trigger line with the configured width and quality.
pub fn trigger_line(width: u16, quality: u8) -> String {
    format!("{} {} {}\n", token::TRIGGER, width, quality)
}

/// The initial line declaring filename and total byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub name: String,
    pub total_size: usize,
}

impl TransferHeader {
    /// Encode as `"<name>|<size>\n"`.
    pub fn encode(&self) -> String {
        format!("{}|{}\n", self.name, self.total_size)
    }

    /// Decode a header line (without its terminator).
    ///
    /// Splits on the first `|`; everything before it is the filename.
    /// Returns an explicit invalid-header signal — never panics — when the
    /// separator is absent or the size is unparseable or zero. The caller
    /// must not open a session on failure.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let (name, size) = line.split_once('|').ok_or(ProtocolError::MissingSeparator)?;
        let total_size: usize = size
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidSize)?;
        if total_size == 0 {
            return Err(ProtocolError::InvalidSize);
        }
        Ok(Self {
            name: name.to_string(),
            total_size,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────

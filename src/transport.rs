//! Transport abstraction — any byte-oriented channel.
//!
//! Concrete implementations:
//! - UART serial to the camera host (the chunked transfer link)
//! - UART serial to the SIM800-class modem (the AT command channel)
//!
//! The receive machine, the send-side chunker, and the upload relay are all
//! generic over `Transport`, so swapping a channel requires zero changes to
//! the protocol logic.

use crate::app::ports::Clock;
use crate::error::ProtocolError;

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}

/// A null transport that discards all writes and never reads.
/// Useful as a default when a channel is not wired up.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }
}

/// Write an entire buffer, retrying short writes.
/// Returns `Err(())` if the transport errors or makes no progress.
pub fn write_all<T: Transport>(chan: &mut T, mut data: &[u8]) -> Result<(), ()> {
    while !data.is_empty() {
        match chan.write(data) {
            Ok(0) | Err(_) => return Err(()),
            Ok(n) => data = &data[n..],
        }
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Line accumulator
// ───────────────────────────────────────────────────────────────

/// Capacity of the line buffer. Handshake tokens, transfer headers, and AT
/// replies are all far shorter; anything longer is malformed.
pub const LINE_CAP: usize = 192;

/// Bounded byte-to-line splitter for the handshake and AT channels.
///
/// Bytes are pushed in as they arrive; complete lines (terminated by `\n`,
/// with a trailing `\r` stripped) come out. A line that overflows the buffer
/// is discarded up to the next terminator and reported once.
pub struct LineAccumulator {
    buf: heapless::Vec<u8, LINE_CAP>,
    overflowed: bool,
}

impl LineAccumulator {
    pub fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            overflowed: false,
        }
    }

    /// Push one byte. Returns a complete line when `b` terminates one,
    /// or an error when this byte ends an overflowed (discarded) line.
    pub fn push(&mut self, b: u8) -> Result<Option<String>, ProtocolError> {
        if b == b'\n' {
            let overflowed = core::mem::take(&mut self.overflowed);
            let mut line = core::mem::take(&mut self.buf);
            if overflowed {
                return Err(ProtocolError::LineOverflow);
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
        }
        if self.buf.push(b).is_err() {
            self.overflowed = true;
        }
        Ok(None)
    }

    /// Take any bytes buffered for an incomplete line. Used when the channel
    /// switches from line mode to a raw byte phase (modem body read-back).
    pub fn take_pending(&mut self) -> heapless::Vec<u8, LINE_CAP> {
        self.overflowed = false;
        core::mem::take(&mut self.buf)
    }

    /// Whether a partial line is currently buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

impl Default for LineAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain available bytes and return the next complete line, non-blocking.
/// Overflowed lines are skipped. Returns `None` once the channel runs dry.
pub fn poll_line<T: Transport>(chan: &mut T, acc: &mut LineAccumulator) -> Option<String> {
    let mut byte = [0u8; 1];
    loop {
        match chan.read(&mut byte) {
            Ok(1) => match acc.push(byte[0]) {
                Ok(Some(line)) => return Some(line),
                Ok(None) => {}
                Err(_) => log::warn!("discarded overlong line"),
            },
            _ => return None,
        }
    }
}

/// Block (bounded) until the exact `expected` line appears.
/// Other lines received in the meantime are logged and dropped.
///
/// This is a deliberate short stall: the cooperative loop accepts bounded
/// waits for handshake tokens and AT acknowledgements.
pub fn wait_for_token<T: Transport>(
    chan: &mut T,
    acc: &mut LineAccumulator,
    clock: &impl Clock,
    expected: &str,
    timeout_ms: u32,
) -> bool {
    let deadline = clock.now_ms() + u64::from(timeout_ms);
    loop {
        if let Some(line) = poll_line(chan, acc) {
            if line == expected {
                return true;
            }
            if !line.is_empty() {
                log::debug!("ignoring line '{line}' while waiting for '{expected}'");
            }
            continue;
        }
        if clock.now_ms() >= deadline {
            return false;
        }
        clock.sleep_ms(2);
    }
}

// ── Tests ────────────────────────────────────────────────────

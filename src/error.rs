//! Unified error types for the CamRelay firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every subsystem
//! can convert into, keeping the top-level control loop's error handling
//! uniform. Most variants are `Copy`; the few that carry context strings stay
//! cheap to clone.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The serial transfer protocol was violated or a frame was malformed.
    Protocol(ProtocolError),
    /// The send-side chunker failed mid-handshake.
    Chunker(ChunkerError),
    /// Durable storage could not be opened, written, or removed.
    Storage(StorageError),
    /// The cellular modem channel failed.
    Modem(ModemError),
    /// A stored filename could not be split into identifier and remainder.
    Derivation(DerivationError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Chunker(e) => write!(f, "chunker: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Modem(e) => write!(f, "modem: {e}"),
            Self::Derivation(e) => write!(f, "derivation: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transfer protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header line has no `|` separator.
    MissingSeparator,
    /// Declared size is unparseable or zero.
    InvalidSize,
    /// A line exceeded the accumulator capacity and was discarded.
    LineOverflow,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator => write!(f, "header missing '|' separator"),
            Self::InvalidSize => write!(f, "header size invalid"),
            Self::LineOverflow => write!(f, "line exceeds buffer capacity"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Send-side chunker errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkerError {
    /// No READY acknowledgement after the header.
    NoReady,
    /// No ACK for the chunk starting at this byte offset.
    NoAck(usize),
    /// No DONE after the final chunk.
    NoDone,
    /// The receiver reported an inactivity timeout.
    PeerTimedOut,
    /// The link refused a write.
    LinkWrite,
}

impl fmt::Display for ChunkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoReady => write!(f, "no READY from receiver"),
            Self::NoAck(offset) => write!(f, "no ACK for chunk at offset {offset}"),
            Self::NoDone => write!(f, "no DONE after final chunk"),
            Self::PeerTimedOut => write!(f, "receiver reported timeout"),
            Self::LinkWrite => write!(f, "link write failed"),
        }
    }
}

impl From<ChunkerError> for Error {
    fn from(e: ChunkerError) -> Self {
        Self::Chunker(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested file does not exist.
    NotFound,
    /// Storage medium is full.
    Full,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Modem channel errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    /// `AT+HTTPINIT` or a parameter command was rejected.
    InitFailed,
    /// The `DOWNLOAD` prompt never arrived before the data phase.
    NoPrompt,
    /// A command was not acknowledged within its deadline.
    CommandTimeout,
    /// The channel refused a write.
    ChannelWrite,
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed => write!(f, "HTTP session init failed"),
            Self::NoPrompt => write!(f, "no DOWNLOAD prompt"),
            Self::CommandTimeout => write!(f, "command not acknowledged in time"),
            Self::ChannelWrite => write!(f, "channel write failed"),
        }
    }
}

impl From<ModemError> for Error {
    fn from(e: ModemError) -> Self {
        Self::Modem(e)
    }
}

// ---------------------------------------------------------------------------
// Filename derivation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationError {
    /// The stored name has no `_` delimiter, so no sensor id can be derived.
    MissingDelimiter,
}

impl fmt::Display for DerivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDelimiter => write!(f, "stored name has no identifier delimiter"),
        }
    }
}

impl From<DerivationError> for Error {
    fn from(e: DerivationError) -> Self {
        Self::Derivation(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

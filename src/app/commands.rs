//! Inbound operator commands.
//!
//! These represent actions requested by the outside world (the operator
//! console, the scheduler) that the
//! [`AppService`](super::service::AppService) interprets and acts upon.
//! The console surface is single-character tokens, matching the original
//! field units.

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Upload the last completely stored image now.
    UploadLast,

    /// Ask the camera host for a new capture.
    RequestCapture,

    /// Refresh the time base (handled by the RTC collaborator; the core
    /// only reports the request).
    SyncClock,

    /// Request a capture and upload it as soon as it is stored.
    CaptureThenUpload,
}

impl OperatorCommand {
    /// Parse a single console character. Unknown characters yield `None`
    /// and are ignored by the caller.
    pub fn parse(token: char) -> Option<Self> {
        match token {
            'u' => Some(Self::UploadLast),
            'f' => Some(Self::RequestCapture),
            't' => Some(Self::SyncClock),
            'b' => Some(Self::CaptureThenUpload),
            _ => None,
        }
    }
}

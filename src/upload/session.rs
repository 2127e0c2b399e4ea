//! Upload session derivation from stored filenames.
//!
//! Stored names carry their sensor identifier as a `_`-delimited prefix
//! (`3_1699999999.jpg` → id `3`, remote name `1699999999.jpg`). A name
//! without the delimiter cannot be uploaded: the derivation fails fast,
//! before any modem command, and never falls back to a default identifier.

use crate::error::DerivationError;

/// One outbound upload attempt, derived from a completed stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Stored name on the local medium.
    pub source_name: String,
    /// Identifier prefix sent as `id_sensor`.
    pub sensor_id: String,
    /// Remainder after the delimiter, sent as `filename`.
    pub remote_filename: String,
}

impl UploadSession {
    /// Split `stored_name` on the first `_` into identifier and remainder.
    pub fn derive(stored_name: &str) -> Result<Self, DerivationError> {
        let (id, rest) = stored_name
            .split_once('_')
            .ok_or(DerivationError::MissingDelimiter)?;
        if id.is_empty() || rest.is_empty() {
            // A present-but-empty side would silently ship a blank
            // identifier or filename; treat it the same as no delimiter.
            return Err(DerivationError::MissingDelimiter);
        }
        Ok(Self {
            source_name: stored_name.to_string(),
            sensor_id: id.to_string(),
            remote_filename: rest.to_string(),
        })
    }

    /// Target URL: base address plus identifier and filename query params.
    pub fn url(&self, base: &str) -> String {
        format!(
            "{base}?id_sensor={}&filename={}",
            self.sensor_id, self.remote_filename
        )
    }
}

// ── Tests ────────────────────────────────────────────────────

//! Operator console adapter.
//!
//! Polls single characters from the console UART without blocking the
//! cooperative loop. Tokens map to [`OperatorCommand`]s in the main loop.
//!
//! [`OperatorCommand`]: crate::app::commands::OperatorCommand

/// Non-blocking single-character console source.
pub struct Console;

impl Console {
    pub fn new() -> Self {
        Self
    }

    /// Return the next pending console character, if any.
    #[cfg(target_os = "espidf")]
    pub fn poll_char(&mut self) -> Option<char> {
        // The console UART is configured non-blocking at boot; a negative
        // return means the FIFO is empty.
        let c = unsafe { esp_idf_svc::sys::getchar() };
        if c < 0 {
            None
        } else {
            Some(c as u8 as char)
        }
    }

    /// Host/simulation: no console attached.
    #[cfg(not(target_os = "espidf"))]
    pub fn poll_char(&mut self) -> Option<char> {
        None
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

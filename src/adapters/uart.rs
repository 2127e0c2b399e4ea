//! ESP-IDF UART transport adapter.
//!
//! One [`UartTransport`] instance serves the camera link (UART1) and a
//! second one the SIM800 modem (UART2); both speak the same byte-channel
//! [`Transport`] port, so the protocol code never sees the difference.
//!
//! The whole implementation is device-only; host targets use the mock
//! transports from the test suite instead.

#[cfg(target_os = "espidf")]
mod espidf {
    use esp_idf_hal::delay::NON_BLOCK;
    use esp_idf_hal::uart::UartDriver;

    use crate::transport::Transport;

    /// Byte transport over one ESP32 UART.
    pub struct UartTransport {
        driver: UartDriver<'static>,
    }

    impl UartTransport {
        pub fn new(driver: UartDriver<'static>) -> Self {
            Self { driver }
        }
    }

    impl Transport for UartTransport {
        type Error = esp_idf_hal::sys::EspError;

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            // NON_BLOCK: return whatever is already in the RX FIFO.
            self.driver.read(buf, NON_BLOCK)
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
            self.driver.write(data)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.driver.wait_tx_done(100)
        }

        fn available(&self) -> bool {
            self.driver.remaining_read().is_ok_and(|n| n > 0)
        }
    }
}

#[cfg(target_os = "espidf")]
pub use espidf::UartTransport;

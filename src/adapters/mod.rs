//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter   | Implements        | Connects to                    |
//! |-----------|-------------------|--------------------------------|
//! | `time`    | Clock             | ESP32 system timer             |
//! | `log_sink`| EventSink         | Serial log output              |
//! | `storage` | StoragePort       | SD card (VFS) / host directory |
//! | `uart`    | Transport         | ESP32 UART (camera link, modem)|
//! | `console` | operator input    | Console UART                   |

pub mod console;
pub mod log_sink;
pub mod storage;
pub mod time;
pub mod uart;

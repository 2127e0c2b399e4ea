//! CamRelay Firmware — Main Entry Point
//!
//! Hexagonal architecture around one cooperative loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UartTransport × 2   FsStorage     LogEventSink   Esp32Time    │
//! │  (camera link,       (StoragePort) (EventSink)    (Clock)      │
//! │   SIM800 modem)                                                │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Receive FSM · Upload Relay · Interval Engine          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{anyhow, Result};
use log::{error, info, warn};

use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::prelude::*;
use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};

use camrelay::adapters::console::Console;
use camrelay::adapters::log_sink::LogEventSink;
use camrelay::adapters::storage::{self, FsStorage};
use camrelay::adapters::time::Esp32TimeAdapter;
use camrelay::adapters::uart::UartTransport;
use camrelay::app::commands::OperatorCommand;
use camrelay::app::ports::Clock;
use camrelay::app::service::AppService;

const SDCARD_MOUNT: &str = "/sdcard";
const LINK_BAUD: u32 = 115_200;
const MODEM_BAUD: u32 = 115_200;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  CamRelay v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Storage (SD card behind the FAT VFS) ───────────────
    // A failed mount is not fatal: the loop stays up and surfaces a
    // storage error for each session until the card comes back.
    if let Err(e) = storage::mount_sdcard(SDCARD_MOUNT) {
        error!("SD mount failed ({e}); storage will be unavailable");
    }
    let mut store = FsStorage::new(format!("{SDCARD_MOUNT}/images"))
        .map_err(|e| anyhow!("storage root: {e}"))?;
    let config = store.load_config();

    // ── 3. Serial channels ────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    // UART1 — camera host link.
    let link_uart = UartDriver::new(
        peripherals.uart1,
        pins.gpio17,
        pins.gpio16,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        &UartConfig::new().baudrate(Hertz(LINK_BAUD)),
    )?;
    let mut link = UartTransport::new(link_uart);

    // UART2 — SIM800 modem.
    let modem_uart = UartDriver::new(
        peripherals.uart2,
        pins.gpio25,
        pins.gpio26,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        Option::<esp_idf_hal::gpio::AnyIOPin>::None,
        &UartConfig::new().baudrate(Hertz(MODEM_BAUD)),
    )?;
    let mut modem = UartTransport::new(modem_uart);

    // ── 4. Remaining adapters + service ───────────────────────
    let clock = Esp32TimeAdapter::new();
    let mut sink = LogEventSink::new();
    let mut console = Console::new();
    let mut app = AppService::new(&config);

    info!("system ready, entering loop");

    // ── 5. Cooperative loop ───────────────────────────────────
    loop {
        app.poll(
            &mut link,
            &mut modem,
            &mut store,
            &clock,
            config.loop_interval_ms,
            &mut sink,
        );

        while let Some(c) = console.poll_char() {
            match OperatorCommand::parse(c) {
                Some(cmd) => app.submit_command(cmd),
                None if !c.is_whitespace() => warn!("unknown command '{c}'"),
                None => {}
            }
        }

        // Pace the loop, but barely while bytes are streaming in — the
        // receive path must drain the UART faster than it fills.
        if app.rx_active() {
            clock.sleep_ms(1);
        } else {
            clock.sleep_ms(config.loop_interval_ms);
        }
    }
}

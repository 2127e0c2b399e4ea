//! Filesystem storage adapter.
//!
//! Implements [`StoragePort`] over `std::fs`. On the device the root points
//! at the SD card's VFS mount (see [`mount_sdcard`]); on the host it is any
//! plain directory, which keeps the adapter itself identical across
//! targets.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use log::{info, warn};

use crate::app::ports::{FileSink, FileSource, StoragePort};
use crate::config::SystemConfig;
use crate::error::StorageError;

/// Name of the optional configuration override file at the storage root.
pub const CONFIG_FILE: &str = "camrelay.json";

fn map_io(e: &std::io::Error) -> StorageError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound,
        std::io::ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::IoError,
    }
}

/// Image storage rooted at one directory.
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open (creating if needed) a storage root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| map_io(&e))?;
        info!("storage rooted at {}", root.display());
        Ok(Self { root })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Load the configuration override file, falling back to defaults when
    /// it is absent or corrupt.
    pub fn load_config(&self) -> SystemConfig {
        let path = self.path(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => match SystemConfig::from_json(&text) {
                Ok(cfg) => {
                    info!("config loaded from {}", path.display());
                    cfg
                }
                Err(e) => {
                    warn!("config file unreadable ({e}), using defaults");
                    SystemConfig::default()
                }
            },
            Err(_) => {
                info!("no config file, using defaults");
                SystemConfig::default()
            }
        }
    }
}

impl StoragePort for FsStorage {
    fn create(&mut self, name: &str) -> Result<Box<dyn FileSink>, StorageError> {
        let file = fs::File::create(self.path(name)).map_err(|e| map_io(&e))?;
        Ok(Box::new(FsSink { file }))
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn FileSource>, StorageError> {
        let file = fs::File::open(self.path(name)).map_err(|e| map_io(&e))?;
        let len = file.metadata().map_err(|e| map_io(&e))?.len();
        Ok(Box::new(FsReader { file, len }))
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(&e)),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }
}

struct FsSink {
    file: fs::File,
}

impl FileSink for FsSink {
    fn append(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(data).map_err(|e| map_io(&e))
    }

    fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        // The completeness invariant requires the bytes on the medium, not
        // just in the page cache.
        self.file.flush().map_err(|e| map_io(&e))?;
        self.file.sync_all().map_err(|e| map_io(&e))
    }
}

struct FsReader {
    file: fs::File,
    len: u64,
}

impl FileSource for FsReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.file.read(buf).map_err(|e| map_io(&e))
    }

    fn len(&self) -> u64 {
        self.len
    }
}

// ───────────────────────────────────────────────────────────────
// SD card mount (device only)
// ───────────────────────────────────────────────────────────────

/// Mount the SD card behind the FAT VFS at `mount_point` (e.g. "/sdcard")
/// using the SDMMC peripheral in 1-bit mode.
#[cfg(target_os = "espidf")]
pub fn mount_sdcard(mount_point: &str) -> Result<(), crate::error::Error> {
    use esp_idf_svc::sys;

    let mount_cstr = std::ffi::CString::new(mount_point)
        .map_err(|_| crate::error::Error::Init("bad mount point"))?;

    let mount_config = sys::esp_vfs_fat_sdmmc_mount_config_t {
        format_if_mount_failed: false,
        max_files: 4,
        allocation_unit_size: 16 * 1024,
        disk_status_check_enable: false,
        use_one_fat: false,
    };

    // SAFETY: called once from the main task before any storage access;
    // the config structs live for the duration of the call and the card
    // handle is owned by the VFS afterwards.
    unsafe {
        let mut host: sys::sdmmc_host_t = core::mem::zeroed();
        host.flags = sys::SDMMC_HOST_FLAG_1BIT;
        host.slot = sys::SDMMC_HOST_SLOT_1 as i32;
        host.max_freq_khz = sys::SDMMC_FREQ_DEFAULT as i32;
        host.init = Some(sys::sdmmc_host_init);
        host.set_bus_width = Some(sys::sdmmc_host_set_bus_width);
        host.set_card_clk = Some(sys::sdmmc_host_set_card_clk);
        host.do_transaction = Some(sys::sdmmc_host_do_transaction);
        host.deinit = Some(sys::sdmmc_host_deinit);

        let mut slot: sys::sdmmc_slot_config_t = core::mem::zeroed();
        slot.width = 1;

        let mut card: *mut sys::sdmmc_card_t = core::ptr::null_mut();
        let ret = sys::esp_vfs_fat_sdmmc_mount(
            mount_cstr.as_ptr(),
            &host,
            (&slot as *const sys::sdmmc_slot_config_t).cast(),
            &mount_config,
            &mut card,
        );
        if ret != sys::ESP_OK {
            log::error!("SD mount failed: {ret}");
            return Err(crate::error::Error::Init("SD card mount failed"));
        }
    }
    log::info!("SD card mounted at {mount_point}");
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────

//! Mock adapters for integration tests.
//!
//! Records every byte written to a channel and every stored file so tests
//! can assert on the full history without real UARTs or an SD card.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use camrelay::app::events::AppEvent;
use camrelay::app::ports::{Clock, EventSink, FileSink, FileSource, StoragePort};
use camrelay::error::StorageError;
use camrelay::transport::Transport;

// ── MockLink ──────────────────────────────────────────────────

/// Scripted byte channel: tests feed the receive side and inspect the
/// transmit side.
pub struct MockLink {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
}

#[allow(dead_code)]
impl MockLink {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            tx: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    pub fn feed_line(&mut self, line: &str) {
        self.feed(line.as_bytes());
        self.rx.push_back(b'\n');
    }

    /// Everything written so far, split into `\n`-terminated lines.
    /// Binary chunk payloads never appear on the transmit side of the
    /// receiver, so lossy decoding is safe here.
    pub fn sent_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.tx)
            .split('\n')
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.tx).into_owned()
    }
}

impl Transport for MockLink {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.tx.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.rx.is_empty()
    }
}

// ── TestClock ─────────────────────────────────────────────────

/// Manual clock; `sleep_ms` advances it so bounded waits terminate
/// instantly in tests.
pub struct TestClock {
    now: Cell<u64>,
}

#[allow(dead_code)]
impl TestClock {
    pub fn new() -> Self {
        Self { now: Cell::new(0) }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u32) {
        self.advance(u64::from(ms));
    }
}

// ── MemStorage ────────────────────────────────────────────────

type Files = Rc<RefCell<HashMap<String, Vec<u8>>>>;

/// In-memory storage with injectable failures.
pub struct MemStorage {
    pub files: Files,
    pub fail_create: bool,
    pub fail_append: bool,
}

#[allow(dead_code)]
impl MemStorage {
    pub fn new() -> Self {
        Self {
            files: Rc::new(RefCell::new(HashMap::new())),
            fail_create: false,
            fail_append: false,
        }
    }

    pub fn insert(&self, name: &str, data: &[u8]) {
        self.files
            .borrow_mut()
            .insert(name.to_string(), data.to_vec());
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

impl StoragePort for MemStorage {
    fn create(&mut self, name: &str) -> Result<Box<dyn FileSink>, StorageError> {
        if self.fail_create {
            return Err(StorageError::Full);
        }
        self.files
            .borrow_mut()
            .insert(name.to_string(), Vec::new());
        Ok(Box::new(MemSink {
            name: name.to_string(),
            files: Rc::clone(&self.files),
            fail_append: self.fail_append,
        }))
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn FileSource>, StorageError> {
        let data = self
            .files
            .borrow()
            .get(name)
            .cloned()
            .ok_or(StorageError::NotFound)?;
        Ok(Box::new(MemReader { data, pos: 0 }))
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.files.borrow_mut().remove(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files.borrow().contains_key(name)
    }
}

struct MemSink {
    name: String,
    files: Files,
    fail_append: bool,
}

impl FileSink for MemSink {
    fn append(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_append {
            return Err(StorageError::IoError);
        }
        self.files
            .borrow_mut()
            .get_mut(&self.name)
            .ok_or(StorageError::NotFound)?
            .extend_from_slice(data);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

struct MemReader {
    data: Vec<u8>,
    pos: usize,
}

impl FileSource for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let n = (self.data.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

// ── RecordingSink ─────────────────────────────────────────────

/// Event sink that records every emission for later assertion.
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

//! Chunked image transfer over the camera serial link.
//!
//! ```text
//!  camera host                      controller
//!  ───────────                      ──────────
//!  "<name>|<size>\n"  ───────────▶  header decode, open file
//!                     ◀───────────  "READY"
//!  chunk (≤256 B)     ───────────▶  append to file
//!                     ◀───────────  "ACK"           (one per drained read)
//!  ...                              ...
//!                     ◀───────────  "DONE"          (bytes == size)
//!                     ◀───────────  "NACK_TIMEOUT"  (inactivity window hit)
//! ```
//!
//! Stop-and-wait, one file in flight, no payload checksum — integrity rests
//! entirely on byte-count accounting. [`framer`] is the pure wire shape,
//! [`receiver`] the storage-writing state machine on the controller, and
//! [`chunker`] the sending half used by the originating device.

pub mod chunker;
pub mod framer;
pub mod receiver;

//! Interval engine for periodic and one-shot work.
//!
//! Runs inside the single cooperative loop; nothing here preempts an
//! in-progress reception. The engine notifies a [`SchedulerDelegate`] when
//! schedules fire; the main loop implements the delegate to queue work on
//! the application service.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Trigger Sources                        │
//! │                                                          │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐        │
//! │  │ Auto       │   │ Telemetry  │   │ One-Shot   │        │
//! │  │ Capture    │   │ Refresh    │   │ Timer      │        │
//! │  └─────┬──────┘   └─────┬──────┘   └─────┬──────┘        │
//! │        ▼                ▼                ▼               │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │            SchedulerDelegate                       │  │
//! │  │     (main loop queues work on AppService)          │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use crate::app::ports::{ScheduleFiredKind, SchedulerDelegate};
use log::info;

// ═══════════════════════════════════════════════════════════════
//  Schedule types
// ═══════════════════════════════════════════════════════════════

/// A single schedule entry.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Human-readable label (e.g., "auto capture").
    pub label: &'static str,
    /// Type of schedule.
    pub kind: ScheduleKind,
    /// Whether this schedule is currently enabled.
    pub enabled: bool,
}

/// The type of schedule determines how and when it fires.
#[derive(Debug, Clone)]
pub enum ScheduleKind {
    /// Fire every `interval_secs` seconds.
    Periodic { interval_secs: u32 },
    /// Fire once after `delay_secs`, then auto-disable.
    OneShot { delay_secs: u32 },
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// Maximum number of concurrent schedules (stack-allocated).
const MAX_SCHEDULES: usize = 4;

/// The interval engine.
///
/// Intentionally decoupled from the application service: when a schedule
/// fires, it invokes the [`SchedulerDelegate`] callback rather than acting
/// directly. This makes the engine independently testable and keeps the
/// priority ordering in one place (the service's poll).
pub struct Scheduler {
    /// Active schedules.
    schedules: [Option<ScheduleEntry>; MAX_SCHEDULES],
    /// Global enable flag.
    enabled: bool,
}

/// Internal bookkeeping for a live schedule.
#[derive(Debug, Clone)]
struct ScheduleEntry {
    schedule: Schedule,
    /// Milliseconds accumulated since the last fire.
    elapsed_ms: u64,
    /// Whether the schedule has fired (for OneShot).
    fired: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            schedules: [None, None, None, None],
            enabled: true,
        }
    }

    /// Add a schedule. Returns the slot index, or `None` if full.
    pub fn add(&mut self, schedule: Schedule) -> Option<usize> {
        for (i, slot) in self.schedules.iter_mut().enumerate() {
            if slot.is_none() {
                info!("Scheduler: added '{}' at slot {}", schedule.label, i);
                *slot = Some(ScheduleEntry {
                    schedule,
                    elapsed_ms: 0,
                    fired: false,
                });
                return Some(i);
            }
        }
        None // All slots full.
    }

    /// Remove a schedule by slot index.
    pub fn remove(&mut self, slot: usize) {
        if slot < MAX_SCHEDULES {
            if let Some(entry) = &self.schedules[slot] {
                info!(
                    "Scheduler: removed '{}' from slot {}",
                    entry.schedule.label, slot
                );
            }
            self.schedules[slot] = None;
        }
    }

    /// Enable or disable the entire engine.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Advance all schedules by `delta_ms`. Call once per loop iteration.
    ///
    /// When a schedule fires, `delegate.on_schedule_fired()` is called with
    /// the schedule label and fire kind. The caller decides what to do with
    /// the notification (queue a capture, refresh telemetry, etc.).
    pub fn tick(&mut self, delta_ms: u32, delegate: &mut dyn SchedulerDelegate) {
        if !self.enabled {
            return;
        }

        for slot in self.schedules.iter_mut() {
            let entry = match slot {
                Some(e) if e.schedule.enabled => e,
                _ => continue,
            };

            entry.elapsed_ms += u64::from(delta_ms);

            match &entry.schedule.kind {
                ScheduleKind::Periodic { interval_secs } => {
                    if entry.elapsed_ms >= u64::from(*interval_secs) * 1000 {
                        info!(
                            "Scheduler: '{}' periodic fire (every {}s)",
                            entry.schedule.label, interval_secs
                        );
                        delegate
                            .on_schedule_fired(entry.schedule.label, ScheduleFiredKind::Periodic);
                        entry.elapsed_ms = 0;
                    }
                }

                ScheduleKind::OneShot { delay_secs } => {
                    if !entry.fired && entry.elapsed_ms >= u64::from(*delay_secs) * 1000 {
                        info!(
                            "Scheduler: '{}' one-shot fired (after {}s)",
                            entry.schedule.label, delay_secs
                        );
                        delegate.on_schedule_fired(entry.schedule.label, ScheduleFiredKind::OneShot);
                        entry.fired = true;
                        entry.schedule.enabled = false; // Auto-disable.
                    }
                }
            }
        }
    }

    /// Number of active (enabled) schedules.
    pub fn active_count(&self) -> usize {
        self.schedules
            .iter()
            .filter(|s| s.as_ref().is_some_and(|e| e.schedule.enabled))
            .count()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

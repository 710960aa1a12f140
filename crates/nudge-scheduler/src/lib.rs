//! `nudge-scheduler`: due-date evaluation, de-duplication and the run-loop.
//!
//! # Overview
//!
//! The [`engine::ReminderScheduler`] wakes on a fixed interval, pulls task
//! snapshots from a [`engine::TaskSource`], runs each through the
//! [`policy::NotificationPolicyEngine`] and dispatches whatever it decides
//! to every enabled channel. Sent notifications and per-day counters live
//! in a SQLite [`ledger::NotificationLedger`] so restarts do not repeat a
//! reminder. State changes go back to the owner through a
//! [`engine::MutationSink`], batched once per tick.
//!
//! # Events
//!
//! | Event      | When                                                   |
//! |------------|--------------------------------------------------------|
//! | `reminder` | Due within the lead time and never notified            |
//! | `overdue`  | Past due, repeated per the configured frequency        |
//! | `followup` | Notified earlier and still open after the interval     |

pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod recurrence;

pub use engine::{MutationSink, ReminderScheduler, TaskSource, TickReport};
pub use error::{Result, SchedulerError};
pub use ledger::{LedgerKey, NotificationLedger};
pub use policy::NotificationPolicyEngine;
pub use recurrence::RecurrenceCalculator;

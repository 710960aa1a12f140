//! `nudge-core`: shared types, config and wall-clock helpers for the
//! reminder engine.

pub mod clock;
pub mod config;
pub mod error;
pub mod reminder;
pub mod types;

pub use config::NudgeConfig;
pub use error::{NudgeError, Result};
pub use reminder::{ChannelKind, DmMetadata, DmPurpose, EventKind, GreetingSlot};
pub use types::{
    NotificationState, RecurrenceKind, RecurrencePattern, TaskId, TaskSnapshot, TaskUpdate,
};

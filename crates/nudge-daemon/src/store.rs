//! JSON-file task store.
//!
//! The file holds a JSON array of task snapshots. It is re-read on every
//! tick so edits made by other tools are picked up, and rewritten after
//! each batch of notification updates.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use nudge_core::types::{NotificationState, TaskSnapshot, TaskUpdate};
use nudge_scheduler::RecurrenceCalculator;

pub fn default_tasks_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.nudge/tasks.json", home)
}

pub struct JsonTaskStore {
    path: PathBuf,
    calc: RecurrenceCalculator,
    tasks: Mutex<Vec<TaskSnapshot>>,
}

impl JsonTaskStore {
    /// Open the store at `path`. A missing file starts an empty store.
    pub fn open(path: impl Into<PathBuf>, calc: RecurrenceCalculator) -> anyhow::Result<Self> {
        let path = path.into();
        let tasks = if path.exists() {
            read_tasks(&path)?
        } else {
            info!(path = %path.display(), "task file not found, starting empty");
            Vec::new()
        };
        info!(path = %path.display(), count = tasks.len(), "task store loaded");
        Ok(Self {
            path,
            calc,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh snapshot of every task, with completed recurring tasks rolled
    /// forward to their next occurrence.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<TaskSnapshot> {
        let mut tasks = self.lock();
        if self.path.exists() {
            match read_tasks(&self.path) {
                Ok(fresh) => *tasks = fresh,
                Err(e) => warn!(error = %e, "task file unreadable, using last known tasks"),
            }
        }

        let rolled = roll_forward(&mut tasks, &self.calc, now);
        if rolled > 0 {
            info!(count = rolled, "recurring tasks rolled forward");
            self.persist(&tasks);
        }
        tasks.clone()
    }

    /// Merge notification state from a tick back into the file.
    pub fn apply(&self, updates: Vec<TaskUpdate>) {
        let mut tasks = self.lock();
        let mut applied = 0;
        for update in updates {
            match tasks.iter_mut().find(|t| t.id == update.task_id) {
                Some(task) => {
                    task.notification = Some(update.notification);
                    applied += 1;
                }
                None => debug!(task_id = %update.task_id, "update for unknown task dropped"),
            }
        }
        if applied > 0 {
            self.persist(&tasks);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TaskSnapshot>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, tasks: &[TaskSnapshot]) {
        if let Err(e) = write_tasks(&self.path, tasks) {
            warn!(path = %self.path.display(), error = %e, "failed to save tasks");
        }
    }
}

fn read_tasks(path: &Path) -> anyhow::Result<Vec<TaskSnapshot>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Write through a sibling temp file so a crash never leaves half a file.
fn write_tasks(path: &Path, tasks: &[TaskSnapshot]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(tasks)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Reopen completed recurring tasks at their next occurrence after
/// `max(due, now)` and reset their notification state.
fn roll_forward(tasks: &mut [TaskSnapshot], calc: &RecurrenceCalculator, now: DateTime<Utc>) -> usize {
    let mut rolled = 0;
    for task in tasks.iter_mut().filter(|t| t.completed && !t.archived) {
        let Some(pattern) = task.recurrence.as_ref() else {
            continue;
        };
        let from = task.due.map_or(now, |due| due.max(now));
        let Some(next) = calc.next_occurrence(pattern, from) else {
            warn!(task_id = %task.id, "no further occurrence in range, left completed");
            continue;
        };
        debug!(task_id = %task.id, next = %next, "rolling recurring task forward");
        task.due = Some(next);
        task.completed = false;
        if let Some(state) = task.notification.as_mut() {
            *state = NotificationState {
                enabled: state.enabled,
                notify_before_minutes: state.notify_before_minutes,
                ..NotificationState::default()
            };
        }
        rolled += 1;
    }
    rolled
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use nudge_agent::composer::{Message, MessageComposer};
use nudge_channels::{ChannelDispatcher, ChannelError};
use nudge_core::clock::day_key;
use nudge_core::config::NudgeConfig;
use nudge_core::reminder::{ChannelKind, DmMetadata, DmPurpose, GreetingSlot};
use nudge_core::types::{TaskSnapshot, TaskUpdate};

use crate::error::{Result, SchedulerError};
use crate::ledger::{LedgerKey, NotificationLedger};
use crate::policy::NotificationPolicyEngine;
use crate::recurrence::RecurrenceCalculator;

/// Supplies a fresh snapshot of every task, once per tick.
pub trait TaskSource: Send + Sync {
    fn tasks(&self) -> Vec<TaskSnapshot>;
}

impl<F> TaskSource for F
where
    F: Fn() -> Vec<TaskSnapshot> + Send + Sync,
{
    fn tasks(&self) -> Vec<TaskSnapshot> {
        self()
    }
}

/// Receives the notification-state changes produced by one tick.
pub trait MutationSink: Send + Sync {
    fn apply(&self, updates: Vec<TaskUpdate>);
}

impl<F> MutationSink for F
where
    F: Fn(Vec<TaskUpdate>) + Send + Sync,
{
    fn apply(&self, updates: Vec<TaskUpdate>) {
        self(updates)
    }
}

/// Outcome of one pass over the task list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Top-level tasks run through the policy.
    pub evaluated: usize,
    /// Tasks that produced an event.
    pub notified: usize,
    /// Successful channel sends.
    pub dispatched: usize,
    /// Failed or timed-out channel sends.
    pub failed: usize,
    /// Tasks skipped because the ledger could not be read.
    pub skipped: usize,
}

/// State shared by the run-loop and callers of [`ReminderScheduler::run_tick_now`].
struct Shared {
    ledger: Mutex<NotificationLedger>,
    composer: Arc<MessageComposer>,
    dispatcher: Arc<dyn ChannelDispatcher>,
    ticking: AtomicBool,
    last_prune: Mutex<Option<String>>,
}

/// Everything a tick needs, fixed at `start`.
struct TickContext {
    shared: Arc<Shared>,
    source: Arc<dyn TaskSource>,
    sink: Arc<dyn MutationSink>,
    policy: NotificationPolicyEngine,
    calc: RecurrenceCalculator,
    offset: FixedOffset,
    enabled: bool,
    tick_every: Duration,
    dispatch_timeout: Duration,
    retention_days: u32,
    greetings: Vec<(GreetingSlot, NaiveTime)>,
}

struct Running {
    ctx: Arc<TickContext>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Clears the re-entrancy flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic due-date checker and greeting timer.
///
/// One run-loop task per scheduler. `start` and `stop` are idempotent and
/// ticks never overlap, whether fired by the loop or by
/// [`run_tick_now`](Self::run_tick_now).
pub struct ReminderScheduler {
    shared: Arc<Shared>,
    running: Option<Running>,
}

impl ReminderScheduler {
    pub fn new(
        ledger: NotificationLedger,
        composer: Arc<MessageComposer>,
        dispatcher: Arc<dyn ChannelDispatcher>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                ledger: Mutex::new(ledger),
                composer,
                dispatcher,
                ticking: AtomicBool::new(false),
                last_prune: Mutex::new(None),
            }),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the run-loop. A second call while running is a no-op.
    pub fn start<S, M>(&mut self, source: S, sink: M, config: &NudgeConfig)
    where
        S: TaskSource + 'static,
        M: MutationSink + 'static,
    {
        if self.running.is_some() {
            debug!("scheduler already running");
            return;
        }

        let offset = config.schedule.offset();
        let ctx = Arc::new(TickContext {
            shared: self.shared.clone(),
            source: Arc::new(source),
            sink: Arc::new(sink),
            policy: NotificationPolicyEngine::new(config.policy.clone(), offset),
            calc: RecurrenceCalculator::new(offset),
            offset,
            enabled: config.enabled,
            tick_every: config.schedule.tick_interval(),
            dispatch_timeout: config.channels.dispatch_timeout(),
            retention_days: config.schedule.retention_days(),
            greetings: config.greetings.enabled_slots(),
        });

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(ctx.clone(), rx));
        info!(
            tick_secs = ctx.tick_every.as_secs(),
            greetings = ctx.greetings.len(),
            enabled = ctx.enabled,
            "reminder scheduler started"
        );
        self.running = Some(Running { ctx, shutdown, handle });
    }

    /// Signal the run-loop and wait for it to exit. No-op when stopped.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            error!(error = %e, "scheduler loop ended abnormally");
        }
        info!("reminder scheduler stopped");
    }

    /// Run a tick right away. `Ok(None)` means another tick was in progress.
    pub async fn run_tick_now(&self) -> Result<Option<TickReport>> {
        self.run_tick_at(Utc::now()).await
    }

    /// Run a tick as if the current time were `now`.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> Result<Option<TickReport>> {
        let running = self.running.as_ref().ok_or(SchedulerError::NotRunning)?;
        Ok(running.ctx.tick(now).await)
    }
}

/// One daily greeting slot and the instant it fires next.
#[derive(Debug, Clone, Copy)]
struct GreetingTimer {
    slot: GreetingSlot,
    time: NaiveTime,
    at: DateTime<Utc>,
}

async fn run_loop(ctx: Arc<TickContext>, mut shutdown: watch::Receiver<bool>) {
    let first = Instant::now().checked_add(ctx.tick_every).unwrap_or_else(Instant::now);
    let mut ticker = interval_at(first, ctx.tick_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let now = Utc::now();
    let mut timers: Vec<GreetingTimer> = ctx
        .greetings
        .iter()
        .map(|(slot, time)| GreetingTimer {
            slot: *slot,
            time: *time,
            at: ctx.calc.next_daily_at(*time, now),
        })
        .collect();

    loop {
        let next = timers
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| t.at)
            .map(|(i, t)| (i, t.at));
        let wait = next
            .and_then(|(_, at)| (at - Utc::now()).to_std().ok())
            .unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = ticker.tick() => {
                ctx.tick(Utc::now()).await;
            }
            _ = tokio::time::sleep(wait), if next.is_some() => {
                if let Some((i, _)) = next {
                    ctx.fire_greeting(&mut timers[i], Utc::now()).await;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("scheduler loop exited");
}

impl TickContext {
    async fn tick(&self, now: DateTime<Utc>) -> Option<TickReport> {
        let Some(_guard) = TickGuard::acquire(&self.shared.ticking) else {
            debug!("tick already in progress, skipping");
            return None;
        };
        if !self.enabled {
            debug!("notifications disabled, tick skipped");
            return Some(TickReport::default());
        }

        let day = day_key(now, self.offset);
        self.prune_if_new_day(now, &day).await;

        let channels = self.shared.dispatcher.enabled_channels();
        let tasks = self.source.tasks();
        let mut report = TickReport::default();
        let mut updates = Vec::new();

        for task in tasks.iter().filter(|t| t.is_top_level()) {
            report.evaluated += 1;
            if let Some(update) = self.process_task(task, now, &day, &channels, &mut report).await {
                updates.push(update);
            }
        }

        if !updates.is_empty() {
            self.sink.apply(updates);
        }

        if report.notified > 0 || report.failed > 0 || report.skipped > 0 {
            info!(
                evaluated = report.evaluated,
                notified = report.notified,
                dispatched = report.dispatched,
                failed = report.failed,
                skipped = report.skipped,
                "tick complete"
            );
        } else {
            debug!(evaluated = report.evaluated, "tick complete, nothing due");
        }
        Some(report)
    }

    async fn process_task(
        &self,
        task: &TaskSnapshot,
        now: DateTime<Utc>,
        day: &str,
        channels: &[ChannelKind],
        report: &mut TickReport,
    ) -> Option<TaskUpdate> {
        let decision = {
            let ledger = self.shared.ledger.lock().await;
            self.policy.evaluate(task, now, &ledger)
        };
        let event = match decision {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "ledger read failed, task skipped");
                report.skipped += 1;
                return None;
            }
        };
        let state = task.notification.clone().unwrap_or_default();
        let label = self.policy.ledger_label(event, &state, now);
        report.notified += 1;

        let pending: Vec<ChannelKind> = {
            let ledger = self.shared.ledger.lock().await;
            channels
                .iter()
                .copied()
                .filter(|ch| {
                    let key = LedgerKey::new(&task.id, label.as_str(), *ch, day);
                    match ledger.has_sent(&key) {
                        Ok(sent) => !sent,
                        Err(e) => {
                            warn!(task_id = %task.id, channel = %ch, error = %e, "ledger check failed");
                            false
                        }
                    }
                })
                .collect()
        };

        if pending.is_empty() {
            debug!(task_id = %task.id, event = %event, "no channel left to notify");
        } else {
            let message = self.shared.composer.compose(task, event, now).await;
            let meta = DmMetadata {
                purpose: DmPurpose::Task {
                    task_id: task.id.clone(),
                    event,
                },
                title: message.title.clone(),
                task_title: Some(task.title.clone()),
                due: task.due,
            };

            for channel in pending {
                let key = LedgerKey::new(&task.id, label.as_str(), channel, day);
                let fresh = {
                    let ledger = self.shared.ledger.lock().await;
                    ledger.mark_sent(&key)
                };
                match fresh {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        warn!(task_id = %task.id, channel = %channel, error = %e, "ledger write failed, send skipped");
                        report.failed += 1;
                        continue;
                    }
                }

                match self.deliver(channel, &message, &meta).await {
                    Ok(()) => {
                        report.dispatched += 1;
                        info!(task_id = %task.id, channel = %channel, event = %event, "notification sent");
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(task_id = %task.id, channel = %channel, event = %event, error = %e, "notification failed");
                    }
                }
            }

            let counted = {
                let ledger = self.shared.ledger.lock().await;
                ledger.increment(&task.id, day)
            };
            if let Err(e) = counted {
                warn!(task_id = %task.id, error = %e, "daily counter update failed");
            }
        }

        Some(TaskUpdate {
            task_id: task.id.clone(),
            notification: self.policy.apply_decision(&state, event, now),
        })
    }

    async fn deliver(&self, channel: ChannelKind, message: &Message, meta: &DmMetadata) -> std::result::Result<(), ChannelError> {
        let dispatcher = &self.shared.dispatcher;
        let send = async {
            match channel {
                ChannelKind::DirectMessage => dispatcher.send_direct_message(&message.body, meta).await,
                ChannelKind::Desktop => dispatcher.show_local_notification(&message.title, &message.body).await,
            }
        };
        match tokio::time::timeout(self.dispatch_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                ms: self.dispatch_timeout.as_millis() as u64,
            }),
        }
    }

    /// Send the greeting and re-arm the timer for its next day, whether or
    /// not the send went through.
    async fn fire_greeting(&self, timer: &mut GreetingTimer, now: DateTime<Utc>) {
        self.send_greeting(timer.slot).await;
        timer.at = self.calc.next_daily_at(timer.time, now);
        debug!(slot = %timer.slot, next = %timer.at, "greeting re-armed");
    }

    async fn send_greeting(&self, slot: GreetingSlot) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.shared.dispatcher.enabled_channels().contains(&ChannelKind::DirectMessage) {
            debug!(slot = %slot, "no DM channel, greeting skipped");
            return false;
        }
        let message = self.shared.composer.compose_greeting(slot).await;
        let meta = DmMetadata::greeting(slot, message.title.clone());
        match self.deliver(ChannelKind::DirectMessage, &message, &meta).await {
            Ok(()) => {
                info!(slot = %slot, "greeting sent");
                true
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "greeting failed");
                false
            }
        }
    }

    /// Drop ledger rows older than the retention window, once per day.
    async fn prune_if_new_day(&self, now: DateTime<Utc>, day: &str) {
        let mut last = self.shared.last_prune.lock().await;
        if last.as_deref() == Some(day) {
            return;
        }
        let Some(cutoff) = now
            .checked_sub_signed(ChronoDuration::days(self.retention_days as i64))
            .map(|t| day_key(t, self.offset))
        else {
            debug!(retention_days = self.retention_days, "retention reaches past the calendar, nothing to prune");
            *last = Some(day.to_string());
            return;
        };
        let pruned = {
            let ledger = self.shared.ledger.lock().await;
            ledger.prune_before(&cutoff)
        };
        match pruned {
            Ok(n) => {
                if n > 0 {
                    info!(removed = n, before = %cutoff, "ledger pruned");
                }
                *last = Some(day.to_string());
            }
            Err(e) => warn!(error = %e, "ledger prune failed"),
        }
    }
}

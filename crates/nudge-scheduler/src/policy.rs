//! Decides whether a task is due for a notification right now.
//!
//! Rules are checked in order and the first one that decides wins:
//!
//! 1. closed, archived, muted, undated or sub-tasks never notify
//! 2. weekday filter and quiet hours
//! 3. minimum spacing since the last notification
//! 4. per-task and global daily caps
//! 5. past due: Overdue, subject to the overdue frequency
//! 6. inside the lead window and never notified: Reminder
//! 7. already notified: FollowUp, subject to the follow-up settings
//!
//! A gated rule 5 falls through to rule 7.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Timelike, Utc};

use nudge_core::clock::{day_key, local, time_of_day, weekday_index};
use nudge_core::config::{OverdueFrequency, PolicyConfig};
use nudge_core::reminder::EventKind;
use nudge_core::types::{NotificationState, TaskSnapshot};

use crate::error::Result;
use crate::ledger::NotificationLedger;

/// Ledger label of the first reminder.
pub const REMINDER_LABEL: &str = "reminder";

/// Daily window in which notifications are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// `start > end` spans midnight; `start == end` is an empty window.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start == self.end {
            false
        } else if self.start > self.end {
            t >= self.start || t < self.end
        } else {
            t >= self.start && t < self.end
        }
    }
}

pub struct NotificationPolicyEngine {
    policy: PolicyConfig,
    offset: FixedOffset,
    quiet: Option<QuietHours>,
}

impl NotificationPolicyEngine {
    pub fn new(policy: PolicyConfig, offset: FixedOffset) -> Self {
        let quiet = policy
            .quiet_window()
            .map(|(start, end)| QuietHours { start, end });
        Self {
            policy,
            offset,
            quiet,
        }
    }

    /// Whether `now` falls outside the allowed weekdays or inside quiet hours.
    pub fn is_suppressed_at(&self, now: DateTime<Utc>) -> bool {
        let weekday = weekday_index(now, self.offset);
        if !self.policy.allowed_weekdays.contains(&weekday) {
            return true;
        }
        self.quiet
            .is_some_and(|q| q.contains(time_of_day(now, self.offset)))
    }

    /// Which event, if any, `task` should produce at `now`.
    pub fn evaluate(
        &self,
        task: &TaskSnapshot,
        now: DateTime<Utc>,
        ledger: &NotificationLedger,
    ) -> Result<Option<EventKind>> {
        let Some(state) = task.notification.as_ref().filter(|s| s.enabled) else {
            return Ok(None);
        };
        if task.completed || task.archived || !task.is_top_level() {
            return Ok(None);
        }
        let Some(due) = task.due else {
            return Ok(None);
        };

        if self.is_suppressed_at(now) {
            return Ok(None);
        }

        if let Some(last) = state.notified_at {
            if now - last < minutes(self.policy.min_interval_minutes) {
                return Ok(None);
            }
        }

        let day = day_key(now, self.offset);
        if let Some(cap) = self.policy.same_task_cap() {
            if ledger.count_today(&task.id, &day)? >= cap {
                return Ok(None);
            }
        }
        if self.policy.daily_limit_enabled && ledger.total_today(&day)? >= self.policy.daily_limit_count {
            return Ok(None);
        }

        if due <= now {
            if self.policy.overdue_enabled && self.overdue_ready(state, now) {
                return Ok(Some(EventKind::Overdue));
            }
        } else if due - minutes(self.lead_minutes(state)) <= now
            && state.notified_at.is_none()
            && !ledger.sent_on_any_channel(&task.id, REMINDER_LABEL, &day)?
        {
            return Ok(Some(EventKind::Reminder));
        }

        if let Some(last) = state.notified_at {
            if self.policy.follow_up_enabled
                && state.follow_up_count < self.policy.follow_up_max_count
                && now - last >= minutes(self.policy.follow_up_interval_minutes)
            {
                return Ok(Some(EventKind::FollowUp));
            }
        }

        Ok(None)
    }

    /// Notification state after `event` was sent at `now`.
    pub fn apply_decision(
        &self,
        state: &NotificationState,
        event: EventKind,
        now: DateTime<Utc>,
    ) -> NotificationState {
        let mut next = state.clone();
        next.follow_up_count = match event {
            EventKind::Reminder => 0,
            EventKind::Overdue if state.notified_at.is_none() => 0,
            EventKind::Overdue => state.follow_up_count,
            EventKind::FollowUp => (state.follow_up_count + 1).min(self.policy.follow_up_max_count),
        };
        next.notified_at = Some(match state.notified_at {
            Some(prev) if prev > now => prev,
            _ => now,
        });
        next
    }

    /// Ledger label for `event` given the task's state before sending.
    ///
    /// Follow-ups carry their sequence number and repeating overdue events
    /// carry their window, so each legitimately repeated send gets its own
    /// per-day ledger entry.
    pub fn ledger_label(&self, event: EventKind, state: &NotificationState, now: DateTime<Utc>) -> String {
        match event {
            EventKind::Reminder => REMINDER_LABEL.to_string(),
            EventKind::FollowUp => format!("followup{}", state.follow_up_count + 1),
            EventKind::Overdue => {
                let hour = local(now, self.offset).hour();
                match self.policy.overdue_frequency {
                    OverdueFrequency::Hourly => format!("overdue@{hour:02}"),
                    OverdueFrequency::TwiceDaily if hour < 12 => "overdue@am".to_string(),
                    OverdueFrequency::TwiceDaily => "overdue@pm".to_string(),
                    OverdueFrequency::Daily | OverdueFrequency::Once => "overdue".to_string(),
                }
            }
        }
    }

    fn overdue_ready(&self, state: &NotificationState, now: DateTime<Utc>) -> bool {
        match state.notified_at {
            None => true,
            Some(last) => self
                .policy
                .overdue_frequency
                .interval()
                .is_some_and(|every| now - last >= every),
        }
    }

    fn lead_minutes(&self, state: &NotificationState) -> u32 {
        if state.notify_before_minutes > 0 {
            state.notify_before_minutes
        } else {
            self.policy.reminder_lead_minutes
        }
    }
}

fn minutes(m: u32) -> Duration {
    Duration::minutes(m as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nudge_core::config::SameTaskFrequency;
    use nudge_core::reminder::ChannelKind;
    use nudge_core::types::TaskId;

    use crate::ledger::LedgerKey;

    fn tokyo() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    /// Local +09:00 wall-clock instant. 2026-03-03 is a Tuesday.
    fn at(h: u32, mi: u32) -> DateTime<Utc> {
        tokyo()
            .with_ymd_and_hms(2026, 3, 3, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn task(due: DateTime<Utc>) -> TaskSnapshot {
        TaskSnapshot {
            id: TaskId::from("t1"),
            title: "Submit report".to_string(),
            completed: false,
            archived: false,
            parent_id: None,
            due: Some(due),
            recurrence: None,
            notification: Some(NotificationState::default()),
        }
    }

    fn engine(policy: PolicyConfig) -> NotificationPolicyEngine {
        NotificationPolicyEngine::new(policy, tokyo())
    }

    fn no_follow_ups() -> PolicyConfig {
        PolicyConfig {
            follow_up_enabled: false,
            ..PolicyConfig::default()
        }
    }

    #[test]
    fn quiet_hours_window() {
        let q = QuietHours {
            start: hm(23, 0),
            end: hm(7, 0),
        };
        assert!(q.contains(hm(23, 30)));
        assert!(q.contains(hm(6, 30)));
        assert!(!q.contains(hm(8, 0)));
        assert!(!q.contains(hm(12, 0)));
        assert!(!q.contains(hm(7, 0)));

        let same_day = QuietHours {
            start: hm(12, 0),
            end: hm(13, 0),
        };
        assert!(same_day.contains(hm(12, 30)));
        assert!(!same_day.contains(hm(13, 0)));

        let empty = QuietHours {
            start: hm(9, 0),
            end: hm(9, 0),
        };
        assert!(!empty.contains(hm(9, 0)));
    }

    #[test]
    fn quiet_hours_suppress_evaluation() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig::default());
        let t = task(at(23, 50));
        assert_eq!(e.evaluate(&t, at(23, 30), &ledger).unwrap(), None);

        let t = task(at(12, 30));
        assert_eq!(e.evaluate(&t, at(12, 0), &ledger).unwrap(), Some(EventKind::Reminder));
    }

    #[test]
    fn disallowed_weekday_suppresses() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            allowed_weekdays: vec![0, 6],
            ..PolicyConfig::default()
        });
        assert_eq!(e.evaluate(&task(at(12, 30)), at(12, 0), &ledger).unwrap(), None);
    }

    #[test]
    fn ineligible_tasks_never_notify() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig::default());
        let now = at(12, 0);

        let mut done = task(at(11, 0));
        done.completed = true;
        assert_eq!(e.evaluate(&done, now, &ledger).unwrap(), None);

        let mut archived = task(at(11, 0));
        archived.archived = true;
        assert_eq!(e.evaluate(&archived, now, &ledger).unwrap(), None);

        let mut sub = task(at(11, 0));
        sub.parent_id = Some(TaskId::from("parent"));
        assert_eq!(e.evaluate(&sub, now, &ledger).unwrap(), None);

        let mut muted = task(at(11, 0));
        muted.notification = Some(NotificationState {
            enabled: false,
            ..NotificationState::default()
        });
        assert_eq!(e.evaluate(&muted, now, &ledger).unwrap(), None);

        let mut bare = task(at(11, 0));
        bare.notification = None;
        assert_eq!(e.evaluate(&bare, now, &ledger).unwrap(), None);

        let mut undated = task(at(11, 0));
        undated.due = None;
        assert_eq!(e.evaluate(&undated, now, &ledger).unwrap(), None);
    }

    #[test]
    fn reminder_then_hourly_overdue() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            overdue_frequency: OverdueFrequency::Hourly,
            ..no_follow_ups()
        });
        let start = at(10, 0);
        let mut t = task(start + Duration::minutes(45));

        assert_eq!(e.evaluate(&t, start, &ledger).unwrap(), Some(EventKind::Reminder));
        let state = t.notification.take().unwrap();
        t.notification = Some(e.apply_decision(&state, EventKind::Reminder, start));

        let soon = start + Duration::seconds(30);
        assert_eq!(e.evaluate(&t, soon, &ledger).unwrap(), None);

        // Past due but inside the hourly window.
        let later = start + Duration::minutes(45);
        assert_eq!(e.evaluate(&t, later, &ledger).unwrap(), None);
        assert_eq!(
            e.evaluate(&t, start + Duration::minutes(59), &ledger).unwrap(),
            None
        );
        assert_eq!(
            e.evaluate(&t, start + Duration::minutes(60), &ledger).unwrap(),
            Some(EventKind::Overdue)
        );
    }

    #[test]
    fn reminder_not_repeated_when_ledger_has_it() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig::default());
        let now = at(10, 0);
        let t = task(now + Duration::minutes(30));
        ledger
            .mark_sent(&LedgerKey::new(&t.id, REMINDER_LABEL, ChannelKind::Desktop, day_key(now, tokyo())))
            .unwrap();
        // notified_at is still None (e.g. the store never received the update).
        assert_eq!(e.evaluate(&t, now, &ledger).unwrap(), None);
    }

    #[test]
    fn twice_per_day_cap() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            same_task_frequency: SameTaskFrequency::Twice,
            ..PolicyConfig::default()
        });
        let now = at(10, 0);
        let day = day_key(now, tokyo());
        let t = task(now - Duration::hours(1));
        ledger.increment(&t.id, &day).unwrap();
        ledger.increment(&t.id, &day).unwrap();
        for h in 10..23 {
            assert_eq!(e.evaluate(&t, at(h, 0), &ledger).unwrap(), None);
        }
    }

    #[test]
    fn global_daily_limit() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            daily_limit_enabled: true,
            daily_limit_count: 1,
            ..PolicyConfig::default()
        });
        let now = at(10, 0);
        ledger
            .increment(&TaskId::from("other"), &day_key(now, tokyo()))
            .unwrap();
        assert_eq!(e.evaluate(&task(now - Duration::hours(1)), now, &ledger).unwrap(), None);
    }

    #[test]
    fn min_interval_blocks_everything() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            min_interval_minutes: 90,
            ..PolicyConfig::default()
        });
        let now = at(12, 0);
        let mut t = task(now - Duration::hours(3));
        t.notification = Some(NotificationState {
            notified_at: Some(now - Duration::minutes(60)),
            ..NotificationState::default()
        });
        assert_eq!(e.evaluate(&t, now, &ledger).unwrap(), None);
    }

    #[test]
    fn overdue_once_falls_through_to_follow_up() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            overdue_frequency: OverdueFrequency::Once,
            ..PolicyConfig::default()
        });
        let now = at(12, 0);
        let mut t = task(now - Duration::hours(2));
        t.notification = Some(NotificationState {
            notified_at: Some(now - Duration::minutes(40)),
            ..NotificationState::default()
        });
        assert_eq!(e.evaluate(&t, now, &ledger).unwrap(), Some(EventKind::FollowUp));
    }

    #[test]
    fn follow_ups_stop_at_max() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            overdue_frequency: OverdueFrequency::Once,
            ..PolicyConfig::default()
        });
        let mut now = at(9, 0);
        let mut t = task(now + Duration::minutes(30));
        let mut sent = Vec::new();

        for _ in 0..40 {
            if let Some(event) = e.evaluate(&t, now, &ledger).unwrap() {
                let state = t.notification.take().unwrap();
                let next = e.apply_decision(&state, event, now);
                assert!(next.follow_up_count <= 3);
                t.notification = Some(next);
                sent.push(event);
            }
            now = now + Duration::minutes(10);
        }

        let follow_ups = sent.iter().filter(|e| **e == EventKind::FollowUp).count();
        assert_eq!(follow_ups, 3);
        assert_eq!(sent.first(), Some(&EventKind::Reminder));
        assert_eq!(t.notification.unwrap().follow_up_count, 3);
    }

    #[test]
    fn apply_decision_counts() {
        let e = engine(PolicyConfig::default());
        let now = at(12, 0);
        let fresh = NotificationState::default();

        let after_reminder = e.apply_decision(&fresh, EventKind::Reminder, now);
        assert_eq!(after_reminder.notified_at, Some(now));
        assert_eq!(after_reminder.follow_up_count, 0);

        let followed = e.apply_decision(&after_reminder, EventKind::FollowUp, now);
        assert_eq!(followed.follow_up_count, 1);

        // A repeat overdue keeps the escalation level.
        let overdue = e.apply_decision(&followed, EventKind::Overdue, now + Duration::hours(1));
        assert_eq!(overdue.follow_up_count, 1);

        // First-ever overdue starts from zero.
        let stale = NotificationState {
            follow_up_count: 2,
            ..NotificationState::default()
        };
        assert_eq!(e.apply_decision(&stale, EventKind::Overdue, now).follow_up_count, 0);

        let capped = NotificationState {
            follow_up_count: 3,
            notified_at: Some(now),
            ..NotificationState::default()
        };
        assert_eq!(e.apply_decision(&capped, EventKind::FollowUp, now).follow_up_count, 3);
    }

    #[test]
    fn notified_at_never_moves_backwards() {
        let e = engine(PolicyConfig::default());
        let now = at(12, 0);
        let ahead = NotificationState {
            notified_at: Some(now + Duration::minutes(5)),
            ..NotificationState::default()
        };
        let next = e.apply_decision(&ahead, EventKind::FollowUp, now);
        assert_eq!(next.notified_at, Some(now + Duration::minutes(5)));
    }

    #[test]
    fn ledger_labels() {
        let state = NotificationState {
            follow_up_count: 1,
            ..NotificationState::default()
        };
        let daily = engine(PolicyConfig::default());
        assert_eq!(daily.ledger_label(EventKind::Reminder, &state, at(9, 0)), "reminder");
        assert_eq!(daily.ledger_label(EventKind::FollowUp, &state, at(9, 0)), "followup2");
        assert_eq!(daily.ledger_label(EventKind::Overdue, &state, at(9, 0)), "overdue");

        let hourly = engine(PolicyConfig {
            overdue_frequency: OverdueFrequency::Hourly,
            ..PolicyConfig::default()
        });
        assert_eq!(hourly.ledger_label(EventKind::Overdue, &state, at(9, 15)), "overdue@09");

        let twice = engine(PolicyConfig {
            overdue_frequency: OverdueFrequency::TwiceDaily,
            ..PolicyConfig::default()
        });
        assert_eq!(twice.ledger_label(EventKind::Overdue, &state, at(9, 0)), "overdue@am");
        assert_eq!(twice.ledger_label(EventKind::Overdue, &state, at(21, 0)), "overdue@pm");
    }

    #[test]
    fn zero_lead_uses_policy_default() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            reminder_lead_minutes: 15,
            ..PolicyConfig::default()
        });
        let now = at(12, 0);
        let mut t = task(now + Duration::minutes(30));
        t.notification = Some(NotificationState {
            notify_before_minutes: 0,
            ..NotificationState::default()
        });
        assert_eq!(e.evaluate(&t, now, &ledger).unwrap(), None);
        assert_eq!(
            e.evaluate(&t, now + Duration::minutes(15), &ledger).unwrap(),
            Some(EventKind::Reminder)
        );
    }

    #[test]
    fn overdue_toggle_off() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let e = engine(PolicyConfig {
            overdue_enabled: false,
            ..PolicyConfig::default()
        });
        let now = at(12, 0);
        assert_eq!(e.evaluate(&task(now - Duration::hours(1)), now, &ledger).unwrap(), None);
    }
}

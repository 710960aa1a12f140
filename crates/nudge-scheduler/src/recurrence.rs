use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use nudge_core::types::{RecurrenceKind, RecurrencePattern};

/// Anchor used when a pattern carries no explicit time of day.
pub fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// Computes the next occurrence of a [`RecurrencePattern`].
///
/// All calendar arithmetic is done in one fixed UTC offset so results do
/// not depend on the host's locale or DST rules.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceCalculator {
    offset: FixedOffset,
}

impl RecurrenceCalculator {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Next occurrence strictly after `from`, or `None` when it would fall
    /// outside the representable calendar.
    pub fn next_occurrence(&self, pattern: &RecurrencePattern, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = from.with_timezone(&self.offset).naive_local();
        let date = local.date();
        let anchor = pattern.time_of_day.unwrap_or_else(end_of_day);
        let interval = pattern.effective_interval();

        let next = match pattern.kind {
            RecurrenceKind::Daily => date.checked_add_signed(Duration::days(interval as i64))?.and_time(anchor),

            RecurrenceKind::Weekly => {
                let step = weekly_step(pattern, date, interval);
                date.checked_add_signed(Duration::days(step))?.and_time(anchor)
            }

            RecurrenceKind::Monthly => {
                let day = pattern.day_of_month.map(u32::from).unwrap_or(date.day());
                let first = date.with_day(1)?;
                let mut months = 0u32;
                loop {
                    let start = first.checked_add_months(Months::new(months))?;
                    let candidate = clamped_date(start.year(), start.month(), day)?.and_time(anchor);
                    if candidate > local {
                        break candidate;
                    }
                    months = months.checked_add(interval)?;
                }
            }

            RecurrenceKind::Yearly => {
                let month = pattern
                    .month
                    .map(u32::from)
                    .filter(|m| (1..=12).contains(m))
                    .unwrap_or(date.month());
                let day = pattern.day_of_month.map(u32::from).unwrap_or(date.day());
                let mut year = date.year();
                loop {
                    let candidate = clamped_date(year, month, day)?.and_time(anchor);
                    if candidate > local {
                        break candidate;
                    }
                    year = i32::try_from(interval).ok().and_then(|n| year.checked_add(n))?;
                }
            }
        };

        let result = self.to_utc(next)?;
        if result > from {
            Some(result)
        } else {
            from.checked_add_signed(Duration::days(1))
        }
    }

    /// Next instant strictly after `from` whose local time is `time`.
    pub fn next_daily_at(&self, time: NaiveTime, from: DateTime<Utc>) -> DateTime<Utc> {
        let local = from.with_timezone(&self.offset).naive_local();
        let today = local.date().and_time(time);
        let target = if today > local {
            Some(today)
        } else {
            local.date().succ_opt().map(|d| d.and_time(time))
        };
        target
            .and_then(|t| self.to_utc(t))
            .unwrap_or_else(|| from + Duration::days(1))
    }

    fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        let utc = local.checked_sub_signed(Duration::seconds(self.offset.local_minus_utc() as i64))?;
        Some(DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc))
    }
}

/// Days to add for a weekly pattern, from the sorted weekday set.
fn weekly_step(pattern: &RecurrencePattern, date: NaiveDate, interval: u32) -> i64 {
    let days: Vec<i64> = pattern
        .days_of_week
        .iter()
        .flatten()
        .filter(|d| **d <= 6)
        .map(|d| *d as i64)
        .collect();
    let Some(&first) = days.first() else {
        return interval as i64 * 7;
    };
    let current = date.weekday().num_days_from_sunday() as i64;
    match days.iter().find(|d| **d > current) {
        Some(next) => next - current,
        None => 7 - current + first + (interval as i64 - 1) * 7,
    }
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = match first.checked_add_months(Months::new(1)) {
        Some(next) => next.pred_opt()?,
        // December of the last representable year.
        None => NaiveDate::from_ymd_opt(year, 12, 31)?,
    };
    Some(last.day())
}

/// `day` in the given month, clamped to the month's last day.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, days_in_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nudge_core::types::MAX_INTERVAL;

    fn tokyo() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn calc() -> RecurrenceCalculator {
        RecurrenceCalculator::new(tokyo())
    }

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        tokyo()
            .with_ymd_and_hms(y, m, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn occurrence(p: &RecurrencePattern, from: DateTime<Utc>) -> DateTime<Utc> {
        calc().next_occurrence(p, from).unwrap()
    }

    fn local_date(t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&tokyo()).date_naive()
    }

    #[test]
    fn daily_adds_interval_and_anchors_end_of_day() {
        let from = at(2026, 3, 3, 10, 0);
        let next = occurrence(&RecurrencePattern::new(RecurrenceKind::Daily, 2), from);
        assert_eq!(next, at(2026, 3, 5, 23, 59) + Duration::seconds(59));
    }

    #[test]
    fn weekly_finds_next_day_in_same_week() {
        // 2026-03-03 is a Tuesday.
        let p = RecurrencePattern::weekly_on([1, 3, 5]);
        let next = occurrence(&p, at(2026, 3, 3, 9, 0));
        assert_eq!(local_date(next), NaiveDate::from_ymd_opt(2026, 3, 4).unwrap());
    }

    #[test]
    fn weekly_wraps_to_next_week() {
        // 2026-03-07 is a Saturday.
        let p = RecurrencePattern::weekly_on([1, 3, 5]);
        let next = occurrence(&p, at(2026, 3, 7, 9, 0));
        assert_eq!(local_date(next), NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
    }

    #[test]
    fn weekly_wrap_honours_interval() {
        let mut p = RecurrencePattern::weekly_on([1]);
        p.interval = 2;
        // Tuesday → Monday after next.
        let next = occurrence(&p, at(2026, 3, 3, 9, 0));
        assert_eq!(local_date(next), NaiveDate::from_ymd_opt(2026, 3, 16).unwrap());
    }

    #[test]
    fn weekly_without_days_steps_whole_weeks() {
        let p = RecurrencePattern::new(RecurrenceKind::Weekly, 1);
        let next = occurrence(&p, at(2026, 3, 3, 9, 0));
        assert_eq!(local_date(next), NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
    }

    #[test]
    fn monthly_later_this_month() {
        let next = occurrence(&RecurrencePattern::monthly_on(20), at(2026, 3, 3, 9, 0));
        assert_eq!(local_date(next), NaiveDate::from_ymd_opt(2026, 3, 20).unwrap());
    }

    #[test]
    fn monthly_31_clamps_to_short_months() {
        let p = RecurrencePattern::monthly_on(31);
        let from = at(2026, 3, 31, 23, 59) + Duration::seconds(59);
        let april = occurrence(&p, from);
        assert_eq!(local_date(april), NaiveDate::from_ymd_opt(2026, 4, 30).unwrap());

        // The requested day survives the clamp.
        let may = occurrence(&p, april);
        assert_eq!(local_date(may), NaiveDate::from_ymd_opt(2026, 5, 31).unwrap());
    }

    #[test]
    fn monthly_31_in_february() {
        let p = RecurrencePattern::monthly_on(31);
        let non_leap = occurrence(&p, at(2027, 2, 1, 9, 0));
        assert_eq!(local_date(non_leap), NaiveDate::from_ymd_opt(2027, 2, 28).unwrap());
        let leap = occurrence(&p, at(2028, 2, 1, 9, 0));
        assert_eq!(local_date(leap), NaiveDate::from_ymd_opt(2028, 2, 29).unwrap());
    }

    #[test]
    fn yearly_feb_29_clamps_in_common_years() {
        let p = RecurrencePattern::yearly_on(2, 29);
        let from = at(2028, 2, 29, 23, 59) + Duration::seconds(59);
        let next = occurrence(&p, from);
        assert_eq!(local_date(next), NaiveDate::from_ymd_opt(2029, 2, 28).unwrap());
    }

    #[test]
    fn explicit_time_of_day_is_used() {
        let p = RecurrencePattern::new(RecurrenceKind::Daily, 1).at(NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        let next = occurrence(&p, at(2026, 3, 3, 9, 0));
        assert_eq!(next, at(2026, 3, 4, 7, 30));
    }

    #[test]
    fn day_boundary_follows_reference_offset() {
        // 16:00 UTC on the 3rd is already 01:00 on the 4th in +09:00.
        let from = Utc.with_ymd_and_hms(2026, 3, 3, 16, 0, 0).unwrap();
        let next = occurrence(&RecurrencePattern::new(RecurrenceKind::Daily, 1), from);
        assert_eq!(local_date(next), NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
    }

    #[test]
    fn result_is_always_after_from() {
        let patterns = vec![
            RecurrencePattern::new(RecurrenceKind::Daily, 0),
            RecurrencePattern::new(RecurrenceKind::Weekly, 3),
            RecurrencePattern::weekly_on([0, 6]),
            RecurrencePattern::monthly_on(1),
            RecurrencePattern::monthly_on(31),
            RecurrencePattern::new(RecurrenceKind::Monthly, 1),
            RecurrencePattern::yearly_on(12, 31),
            RecurrencePattern::new(RecurrenceKind::Yearly, 1).at(NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
        ];
        let mut from = at(2026, 1, 1, 0, 0);
        for _ in 0..120 {
            for p in &patterns {
                let next = occurrence(p, from);
                assert!(next > from, "{:?} from {} gave {}", p, from, next);
            }
            from = from + Duration::hours(77);
        }
    }

    #[test]
    fn next_daily_at_rolls_to_tomorrow() {
        let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert_eq!(calc().next_daily_at(eight, at(2026, 3, 3, 7, 0)), at(2026, 3, 3, 8, 0));
        assert_eq!(calc().next_daily_at(eight, at(2026, 3, 3, 8, 0)), at(2026, 3, 4, 8, 0));
    }

    #[test]
    fn huge_intervals_are_capped() {
        let from = at(2026, 3, 3, 9, 0);
        let daily = occurrence(&RecurrencePattern::new(RecurrenceKind::Daily, 200_000_000), from);
        assert_eq!(local_date(daily), NaiveDate::from_ymd_opt(2026, 3, 3).unwrap() + Duration::days(MAX_INTERVAL as i64));

        let mut yearly = RecurrencePattern::yearly_on(3, 1);
        yearly.interval = 300_000;
        assert_eq!(local_date(occurrence(&yearly, from)).year(), 2026 + MAX_INTERVAL as i32);

        let mut monthly = RecurrencePattern::monthly_on(1);
        monthly.interval = u32::MAX;
        assert!(occurrence(&monthly, from) > from);

        let mut weekly = RecurrencePattern::weekly_on([1]);
        weekly.interval = u32::MAX;
        assert!(occurrence(&weekly, from) > from);
    }

    #[test]
    fn end_of_calendar_yields_none() {
        let utc = RecurrenceCalculator::new(FixedOffset::east_opt(0).unwrap());
        let last = DateTime::<Utc>::MAX_UTC - Duration::days(2);
        let mut monthly = RecurrencePattern::monthly_on(1);
        monthly.interval = 2;
        let patterns = [
            RecurrencePattern::new(RecurrenceKind::Daily, 30),
            RecurrencePattern::new(RecurrenceKind::Weekly, 4),
            monthly,
            RecurrencePattern::yearly_on(1, 1),
        ];
        for p in &patterns {
            assert_eq!(utc.next_occurrence(p, last), None, "{p:?}");
        }
    }
}

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use super::models::PeriodType;

/// key: period-calculator -> pure hour/day/subscription-month boundaries
///
/// Every function here is deterministic and side-effect free; `now`
/// defaults to the platform clock only at the call sites that need a
/// live value (the engine), never inside this module.
pub struct PeriodCalculator;

impl PeriodCalculator {
    pub fn current_hour_start(now: DateTime<Utc>) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
            .single()
            .expect("valid hour truncation")
    }

    pub fn next_hour_start(now: DateTime<Utc>) -> DateTime<Utc> {
        Self::current_hour_start(now) + Duration::hours(1)
    }

    pub fn current_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .expect("valid day truncation")
    }

    pub fn next_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
        Self::current_day_start(now) + Duration::days(1)
    }

    /// `subscriptionMonthStart` from spec §4.A: anchors the monthly window
    /// to the caller's billing day, clamping short months via `E(y,m) =
    /// min(D, lastDayOfMonth(y,m))`.
    pub fn subscription_month_start(
        anchor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let (year, month) = (now.year(), now.month());

        let Some(anchor) = anchor else {
            return midnight(year, month, 1);
        };

        let anchor_day = anchor.day();
        let effective_day_value = effective_day(year, month, anchor_day);

        if now.day() >= effective_day_value {
            midnight(year, month, effective_day_value)
        } else {
            let (prev_year, prev_month) = previous_month(year, month);
            let prev_effective = effective_day(prev_year, prev_month, anchor_day);
            midnight(prev_year, prev_month, prev_effective)
        }
    }

    pub fn next_subscription_month_start(
        anchor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let current_start = Self::subscription_month_start(anchor, now);
        let anchor_day = anchor.map(|a| a.day()).unwrap_or(1);
        let (next_year, next_month) = next_month(current_start.year(), current_start.month());
        let next_effective = effective_day(next_year, next_month, anchor_day);
        midnight(next_year, next_month, next_effective)
    }

    /// Dispatches to the period-specific start/end pair; used by history
    /// rendering, which needs the exclusive upper bound alongside the start.
    pub fn period_bounds(
        period: PeriodType,
        anchor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        match period {
            PeriodType::Hourly => (Self::current_hour_start(now), Self::next_hour_start(now)),
            PeriodType::Daily => (Self::current_day_start(now), Self::next_day_start(now)),
            PeriodType::Monthly => (
                Self::subscription_month_start(anchor, now),
                Self::next_subscription_month_start(anchor, now),
            ),
        }
    }

    /// The exclusive end of the period that started at `period_start`,
    /// used to render history entries without re-deriving `now`.
    pub fn period_end_for_start(
        period: PeriodType,
        anchor: Option<DateTime<Utc>>,
        period_start: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match period {
            PeriodType::Hourly => period_start + Duration::hours(1),
            PeriodType::Daily => period_start + Duration::days(1),
            PeriodType::Monthly => {
                let anchor_day = anchor.map(|a| a.day()).unwrap_or(1);
                let (next_year, next_month) =
                    next_month(period_start.year(), period_start.month());
                let next_effective = effective_day(next_year, next_month, anchor_day);
                midnight(next_year, next_month, next_effective)
            }
        }
    }
}

fn midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid clamped day-of-month")
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = next_month(year, month);
    let first_of_next = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("valid month start");
    (first_of_next - Duration::days(1)).day()
}

fn effective_day(year: i32, month: u32, anchor_day: u32) -> u32 {
    anchor_day.min(last_day_of_month(year, month))
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn hour_start_truncates_minutes_seconds() {
        let now = dt(2025, 6, 15, 14, 30, 45);
        let start = PeriodCalculator::current_hour_start(now);
        assert_eq!(start, dt(2025, 6, 15, 14, 0, 0));
    }

    #[test]
    fn hour_rollover_crosses_day_boundary() {
        let now = dt(2025, 6, 15, 23, 59, 59);
        assert_eq!(
            PeriodCalculator::next_hour_start(now),
            dt(2025, 6, 16, 0, 0, 0)
        );
    }

    #[test]
    fn day_rollover_crosses_month_boundary() {
        let now = dt(2025, 6, 30, 23, 0, 0);
        assert_eq!(
            PeriodCalculator::next_day_start(now),
            dt(2025, 7, 1, 0, 0, 0)
        );
    }

    #[test]
    fn month_rollover_crosses_year_boundary() {
        let now = dt(2025, 12, 20, 0, 0, 0);
        let start = PeriodCalculator::subscription_month_start(None, now);
        assert_eq!(start, dt(2025, 12, 1, 0, 0, 0));
        let next = PeriodCalculator::next_subscription_month_start(None, now);
        assert_eq!(next, dt(2026, 1, 1, 0, 0, 0));
    }

    #[test]
    fn anchor_day_31_clamps_in_short_month() {
        let anchor = dt(2025, 1, 31, 0, 0, 0);
        let now = dt(2025, 2, 15, 10, 0, 0);
        // 15 < E(2025, 2) = 28, so the current period started last month.
        assert_eq!(
            PeriodCalculator::subscription_month_start(Some(anchor), now),
            dt(2025, 1, 31, 0, 0, 0)
        );

        let at_boundary = dt(2025, 2, 28, 0, 0, 0);
        assert_eq!(
            PeriodCalculator::subscription_month_start(Some(anchor), at_boundary),
            dt(2025, 2, 28, 0, 0, 0)
        );

        assert_eq!(
            PeriodCalculator::next_subscription_month_start(Some(anchor), dt(2025, 1, 31, 0, 0, 0)),
            dt(2025, 2, 28, 0, 0, 0)
        );
    }

    #[test]
    fn boundary_equality_belongs_to_current_month() {
        let anchor = dt(2025, 3, 5, 0, 0, 0);
        let now = dt(2025, 4, 5, 0, 0, 0);
        assert_eq!(
            PeriodCalculator::subscription_month_start(Some(anchor), now),
            dt(2025, 4, 5, 0, 0, 0)
        );
    }

    #[test]
    fn period_contiguity_hour_day_month() {
        let now = dt(2025, 6, 15, 14, 30, 45);
        assert_eq!(
            PeriodCalculator::next_hour_start(now),
            PeriodCalculator::next_hour_start(PeriodCalculator::current_hour_start(now))
        );
        assert_eq!(
            PeriodCalculator::next_day_start(now),
            PeriodCalculator::next_day_start(PeriodCalculator::current_day_start(now))
        );
        let anchor = Some(dt(2025, 1, 31, 0, 0, 0));
        let month_start = PeriodCalculator::subscription_month_start(anchor, now);
        assert_eq!(
            PeriodCalculator::next_subscription_month_start(anchor, now),
            PeriodCalculator::next_subscription_month_start(anchor, month_start)
        );
    }
}

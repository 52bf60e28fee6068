//! USD budget tracking (§4.3 checks 1, 2, 6-13), grounded in
//! `tower-resilience-ratelimiter`'s `SlidingLogState`/`FixedWindowState` split but storing
//! spend amounts instead of request counts, since a USD cap can be exceeded by a single
//! expensive request rather than one-unit-per-request.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveTime, Utc};
use forward_core::DailyResetMode;

/// One resource's full set of §4.3 USD windows. `total` never resets; the others are
/// independent views over the same spend ledger.
#[derive(Debug, Default)]
pub struct UsdLedger {
    total: f64,
    entries: VecDeque<(DateTime<Utc>, f64)>,
}

/// The outcome of a single USD window check: whether it passed, and if not, the detail
/// needed to build a `RateLimitDetail`.
pub struct UsdCheckOutcome {
    pub current: f64,
    pub limit: f64,
    pub reset_time: Option<DateTime<Utc>>,
    pub passed: bool,
}

impl UsdLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records completed spend. Called after a request finishes (§9: spend is known only
    /// once the upstream response lands), never during the admission checks themselves.
    pub fn record_spend(&mut self, amount: f64, at: DateTime<Utc>) {
        self.total += amount;
        self.entries.push_back((at, amount));
        self.prune(at);
    }

    /// Drops entries older than the longest window we still care about (31 days covers
    /// monthly) so the ledger doesn't grow unbounded.
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::days(31);
        while let Some(&(at, _)) = self.entries.front() {
            if at < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn sum_since(&self, since: DateTime<Utc>) -> f64 {
        self.entries.iter().filter(|(at, _)| *at >= since).map(|(_, amount)| amount).sum()
    }

    /// Check 1/2: the hard, never-resetting total cap.
    pub fn check_total(&self, limit: Option<f64>) -> Option<UsdCheckOutcome> {
        limit.map(|limit| UsdCheckOutcome {
            current: self.total,
            limit,
            reset_time: None,
            passed: self.total < limit,
        })
    }

    /// Checks 6/7: the rolling 5-hour window. Rolling windows report no reset time (§4.3).
    pub fn check_five_hour_rolling(&self, limit: Option<f64>, now: DateTime<Utc>) -> Option<UsdCheckOutcome> {
        limit.map(|limit| {
            let current = self.sum_since(now - chrono::Duration::hours(5));
            UsdCheckOutcome { current, limit, reset_time: None, passed: current < limit }
        })
    }

    /// Checks 8/9: daily, either rolling-24h (no reset time) or fixed-at-time-of-day
    /// (reset time is the next occurrence of that wall-clock time).
    pub fn check_daily(
        &self,
        limit: Option<f64>,
        mode: DailyResetMode,
        time_of_day: Option<NaiveTime>,
        now: DateTime<Utc>,
    ) -> Option<UsdCheckOutcome> {
        limit.map(|limit| match mode {
            DailyResetMode::Rolling24h => {
                let current = self.sum_since(now - chrono::Duration::hours(24));
                UsdCheckOutcome { current, limit, reset_time: None, passed: current < limit }
            }
            DailyResetMode::FixedAtTimeOfDay => {
                let boundary = time_of_day.unwrap_or(NaiveTime::MIN);
                let window_start = last_occurrence_of(boundary, now);
                let current = self.sum_since(window_start);
                let reset = next_occurrence_of(boundary, now);
                UsdCheckOutcome { current, limit, reset_time: Some(reset), passed: current < limit }
            }
        })
    }

    /// Checks 10/11: fixed weekly window, resetting at the start of the ISO week (Monday
    /// 00:00 UTC).
    pub fn check_weekly(&self, limit: Option<f64>, now: DateTime<Utc>) -> Option<UsdCheckOutcome> {
        limit.map(|limit| {
            let window_start = start_of_iso_week(now);
            let current = self.sum_since(window_start);
            let reset = window_start + chrono::Duration::weeks(1);
            UsdCheckOutcome { current, limit, reset_time: Some(reset), passed: current < limit }
        })
    }

    /// Checks 12/13: fixed calendar-month window.
    pub fn check_monthly(&self, limit: Option<f64>, now: DateTime<Utc>) -> Option<UsdCheckOutcome> {
        limit.map(|limit| {
            let window_start = start_of_month(now);
            let current = self.sum_since(window_start);
            let reset = start_of_next_month(now);
            UsdCheckOutcome { current, limit, reset_time: Some(reset), passed: current < limit }
        })
    }
}

fn last_occurrence_of(time: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive().and_time(time).and_utc();
    if today <= now {
        today
    } else {
        (now.date_naive() - chrono::Duration::days(1)).and_time(time).and_utc()
    }
}

fn next_occurrence_of(time: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        (now.date_naive() + chrono::Duration::days(1)).and_time(time).and_utc()
    }
}

fn start_of_iso_week(now: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Datelike;
    let weekday_from_monday = now.date_naive().weekday().num_days_from_monday() as i64;
    (now.date_naive() - chrono::Duration::days(weekday_from_monday))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Datelike;
    now.date_naive()
        .with_day(1)
        .unwrap()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn start_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Datelike;
    let this_month_start = start_of_month(now);
    if now.month() == 12 {
        this_month_start
            .date_naive()
            .with_year(now.year() + 1)
            .unwrap()
            .with_month(1)
            .unwrap()
            .and_time(NaiveTime::MIN)
            .and_utc()
    } else {
        this_month_start
            .date_naive()
            .with_month(now.month() + 1)
            .unwrap()
            .and_time(NaiveTime::MIN)
            .and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_never_resets_regardless_of_age() {
        let mut ledger = UsdLedger::new();
        let old = Utc::now() - chrono::Duration::days(400);
        ledger.record_spend(5.0, old);
        let outcome = ledger.check_total(Some(4.0)).unwrap();
        assert_eq!(outcome.current, 5.0);
        assert!(!outcome.passed);
    }

    #[test]
    fn five_hour_rolling_excludes_old_spend_and_reports_no_reset_time() {
        let mut ledger = UsdLedger::new();
        let now = Utc::now();
        ledger.record_spend(10.0, now - chrono::Duration::hours(6));
        ledger.record_spend(1.0, now - chrono::Duration::minutes(1));
        let outcome = ledger.check_five_hour_rolling(Some(5.0), now).unwrap();
        assert_eq!(outcome.current, 1.0);
        assert!(outcome.passed);
        assert!(outcome.reset_time.is_none());
    }

    #[test]
    fn daily_fixed_at_time_of_day_reports_next_boundary_as_reset() {
        let ledger = UsdLedger::new();
        let now = Utc::now();
        let outcome = ledger
            .check_daily(Some(1.0), DailyResetMode::FixedAtTimeOfDay, Some(NaiveTime::MIN), now)
            .unwrap();
        assert!(outcome.reset_time.unwrap() > now);
    }

    #[test]
    fn no_limit_configured_means_no_check() {
        let ledger = UsdLedger::new();
        assert!(ledger.check_total(None).is_none());
    }
}

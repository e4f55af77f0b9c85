//! Daily bucketing and the check-weighted rolling ratio.

use crate::db::CheckResult;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Length of the uptime window in calendar days, today included.
pub const UPTIME_WINDOW_DAYS: i64 = 90;

/// Wire value for a day without checks.
pub const NO_DATA: f64 = -1.0;

/// Check counts for one UTC calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyUptime {
    pub date: NaiveDate,
    pub total_checks: u64,
    pub successful_checks: u64,
}

impl DailyUptime {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_checks: 0,
            successful_checks: 0,
        }
    }

    /// Percentage of successful checks, or `None` when the day has no checks.
    pub fn uptime_percentage(&self) -> Option<f64> {
        if self.total_checks == 0 {
            return None;
        }
        let pct = self.successful_checks as f64 / self.total_checks as f64 * 100.0;
        Some(pct.clamp(0.0, 100.0))
    }
}

impl Serialize for DailyUptime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pct = self.uptime_percentage().map(round2).unwrap_or(NO_DATA);

        let mut s = serializer.serialize_struct("DailyUptime", 4)?;
        s.serialize_field("date", &self.date)?;
        s.serialize_field("uptime_percentage", &pct)?;
        s.serialize_field("total_checks", &self.total_checks)?;
        s.serialize_field("successful_checks", &self.successful_checks)?;
        s.end()
    }
}

/// The trailing window of calendar days ending with today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeWindow {
    first_day: NaiveDate,
    today: NaiveDate,
}

impl UptimeWindow {
    pub fn ending_on(today: NaiveDate) -> Self {
        Self {
            first_day: today - ChronoDuration::days(UPTIME_WINDOW_DAYS - 1),
            today,
        }
    }

    pub fn ending_at(now: DateTime<Utc>) -> Self {
        Self::ending_on(now.date_naive())
    }

    /// Midnight UTC at the start of the oldest day.
    pub fn start(&self) -> DateTime<Utc> {
        midnight(self.first_day)
    }

    /// Midnight UTC at the end of today (exclusive bound).
    pub fn end(&self) -> DateTime<Utc> {
        midnight(self.today + ChronoDuration::days(1))
    }

    fn day_index(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        let offset = (timestamp.date_naive() - self.first_day).num_days();
        (0..UPTIME_WINDOW_DAYS)
            .contains(&offset)
            .then_some(offset as usize)
    }

    /// One bucket per day, oldest first, ending with today. Days without
    /// checks are present with zero counts.
    pub fn daily_uptimes(&self, results: &[CheckResult]) -> Vec<DailyUptime> {
        let mut days: Vec<DailyUptime> = (0..UPTIME_WINDOW_DAYS)
            .map(|i| DailyUptime::empty(self.first_day + ChronoDuration::days(i)))
            .collect();

        for result in results {
            if let Some(idx) = self.day_index(result.timestamp) {
                let day = &mut days[idx];
                day.total_checks += 1;
                if result.success {
                    day.successful_checks += 1;
                }
            }
        }

        days
    }

    /// Successful checks over all checks in the window, as a percentage.
    /// Weighted by check, so busy days count for more. Zero when there are
    /// no checks at all.
    pub fn uptime_ratio(&self, results: &[CheckResult]) -> f64 {
        let (total, successful) = results
            .iter()
            .filter(|r| self.day_index(r.timestamp).is_some())
            .fold((0u64, 0u64), |(total, ok), r| (total + 1, ok + u64::from(r.success)));

        if total == 0 {
            return 0.0;
        }
        successful as f64 / total as f64 * 100.0
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

/// Round a percentage to two decimals for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn at(date: NaiveDate, hour: u32, success: bool) -> CheckResult {
        CheckResult {
            endpoint_id: 1,
            timestamp: Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap()),
            success,
            response_time_ms: None,
            observed_status: None,
            error_message: None,
        }
    }

    #[test]
    fn test_window_bounds() {
        let window = UptimeWindow::ending_on(today());
        assert_eq!(window.start(), Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap());
        assert_eq!(window.end(), Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_empty_history_is_all_sentinels() {
        let days = UptimeWindow::ending_on(today()).daily_uptimes(&[]);
        assert_eq!(days.len(), 90);
        assert_eq!(days.last().unwrap().date, today());
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 4, 2).unwrap());
        assert!(days.windows(2).all(|w| w[0].date < w[1].date));
        assert!(days.iter().all(|d| d.uptime_percentage().is_none()));
    }

    #[test]
    fn test_only_today_has_data_after_first_check() {
        let results = vec![at(today(), 9, true)];
        let days = UptimeWindow::ending_on(today()).daily_uptimes(&results);

        let (last, rest) = days.split_last().unwrap();
        assert_eq!(last.uptime_percentage(), Some(100.0));
        assert!(rest.iter().all(|d| d.uptime_percentage().is_none()));
    }

    #[test]
    fn test_daily_bucketing() {
        let yesterday = today() - ChronoDuration::days(1);
        let results = vec![
            at(yesterday, 1, true),
            at(yesterday, 2, false),
            at(yesterday, 3, false),
            at(yesterday, 4, false),
            at(today(), 0, false),
            // outside the window on both sides
            at(today() - ChronoDuration::days(90), 12, true),
            at(today() + ChronoDuration::days(1), 0, true),
        ];
        let days = UptimeWindow::ending_on(today()).daily_uptimes(&results);

        let y = &days[88];
        assert_eq!(y.date, yesterday);
        assert_eq!((y.total_checks, y.successful_checks), (4, 1));
        assert_eq!(y.uptime_percentage(), Some(25.0));

        // all checks failed is 0%, not "no data"
        assert_eq!(days[89].uptime_percentage(), Some(0.0));
        assert_eq!(days.iter().map(|d| d.total_checks).sum::<u64>(), 5);
    }

    #[test]
    fn test_uptime_ratio_is_check_weighted() {
        let window = UptimeWindow::ending_on(today());
        let busy = today() - ChronoDuration::days(3);
        let sparse = today() - ChronoDuration::days(2);

        // 9 of 9 on a busy day, 0 of 1 on a sparse day: 90%, not the 50%
        // a per-day average would give
        let mut results: Vec<_> = (0..9).map(|h| at(busy, h, true)).collect();
        results.push(at(sparse, 0, false));
        assert!((window.uptime_ratio(&results) - 90.0).abs() < 1e-9);

        let seven_of_ten: Vec<_> = (0..10).map(|h| at(today(), h, h < 7)).collect();
        assert!((window.uptime_ratio(&seven_of_ten) - 70.0).abs() < 1e-9);

        assert_eq!(window.uptime_ratio(&[]), 0.0);
    }

    #[test]
    fn test_serialized_sentinel_and_rounding() {
        let empty = DailyUptime::empty(today());
        let json = serde_json::to_value(&empty).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "date": "2024-06-30",
                "uptime_percentage": -1.0,
                "total_checks": 0,
                "successful_checks": 0,
            })
        );

        let third = DailyUptime {
            date: today(),
            total_checks: 3,
            successful_checks: 2,
        };
        let json = serde_json::to_value(&third).unwrap();
        assert_eq!(json["uptime_percentage"], 66.67);
    }
}

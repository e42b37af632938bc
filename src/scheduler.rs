// src/scheduler.rs
//! Daily send loop.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local, LocalResult, NaiveTime, TimeZone};

use crate::metrics::Metrics;
use crate::pipeline::{DigestAgent, RunOptions};

/// `HH:MM`, 24-hour clock.
pub fn parse_send_time(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    let Some((h, m)) = s.split_once(':') else {
        bail!("expected HH:MM, got {s:?}");
    };
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        bail!("expected HH:MM, got {s:?}");
    }
    let h: u32 = h.parse().with_context(|| format!("hour in {s:?}"))?;
    let m: u32 = m.parse().with_context(|| format!("minute in {s:?}"))?;
    NaiveTime::from_hms_opt(h, m, 0).with_context(|| format!("{s:?} is not a valid time of day"))
}

/// Next local occurrence of `at` strictly after `now`.
///
/// A wall-clock time skipped by a DST jump resolves to the first valid
/// minute after the gap; a repeated one resolves to its earlier instance.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        if let Some(t) = resolve(&tz, day.and_time(at)) {
            if t > *now {
                return t;
            }
        }
        day = day.succ_opt().unwrap_or(day);
    }
}

fn resolve<Tz: TimeZone>(tz: &Tz, naive: chrono::NaiveDateTime) -> Option<DateTime<Tz>> {
    let mut probe = naive;
    // gaps are at most a few hours
    for _ in 0..(6 * 60) {
        match tz.from_local_datetime(&probe) {
            LocalResult::Single(t) => return Some(t),
            LocalResult::Ambiguous(early, _) => return Some(early),
            LocalResult::None => probe += Duration::minutes(1),
        }
    }
    None
}

/// Runs the agent once a day at `at` (local time). Never returns; run
/// failures are logged and the loop keeps going.
pub async fn run_daily(agent: &mut DigestAgent, at: NaiveTime, metrics: Option<&Metrics>) {
    tracing::info!(target: "scheduler", at = %at.format("%H:%M"), "daily schedule started");
    loop {
        let now = Local::now();
        let next = next_run_after(&now, at);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(
            target: "scheduler",
            next = %next.format("%Y-%m-%d %H:%M %Z"),
            wait_secs = wait.as_secs(),
            "sleeping until next run"
        );
        tokio::time::sleep(wait).await;

        let report = agent.run(RunOptions::default()).await;
        if report.is_success() {
            tracing::info!(target: "scheduler", items = report.total_kept(), "scheduled run delivered");
        } else {
            tracing::warn!(target: "scheduler", outcome = ?report.outcome, "scheduled run failed");
        }
        if let Some(m) = metrics {
            if let Err(e) = m.flush() {
                tracing::warn!(target: "scheduler", error = ?e, "metrics textfile not written");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, Utc};

    #[test]
    fn parses_valid_times() {
        assert_eq!(parse_send_time("08:00").unwrap(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(parse_send_time(" 7:05 ").unwrap(), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
        assert_eq!(parse_send_time("23:59").unwrap(), NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    }

    #[test]
    fn rejects_malformed_times() {
        for bad in ["", "8", "24:00", "12:60", "ab:cd", "12:5", "123:00", "12-30"] {
            assert!(parse_send_time(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn later_today_when_time_not_yet_reached() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 6, 30, 0).unwrap();
        let at = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert_eq!(next_run_after(&now, at), Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap());
    }

    #[test]
    fn tomorrow_when_time_passed_or_equal() {
        let at = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let passed = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let exact = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 3, 11, 8, 0, 0).unwrap();
        assert_eq!(next_run_after(&passed, at), expected);
        assert_eq!(next_run_after(&exact, at), expected);
    }

    #[test]
    fn respects_fixed_offsets_and_month_end() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 1, 31, 23, 0, 0).unwrap();
        let next = next_run_after(&now, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(next.with_timezone(&Utc).format("%H:%M").to_string(), "06:00");
    }
}

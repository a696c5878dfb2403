use crate::configstore::ScheduleConfig;
use crate::domain::report::RunMode;
use crate::pipeline::coordinator::GenerationCoordinator;
use crate::time::cn_market::market_now;
use chrono::{DateTime, FixedOffset, NaiveTime};
use std::time::Duration;
use tokio::sync::watch;

/// Fires generation for "today" at the configured times of day. Missed
/// ticks are never backfilled; a config update recomputes the next wake
/// without restarting the process.
pub struct Scheduler {
    coordinator: GenerationCoordinator,
    config: watch::Receiver<ScheduleConfig>,
}

impl Scheduler {
    pub fn new(coordinator: GenerationCoordinator, config: watch::Receiver<ScheduleConfig>) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub async fn run(mut self) {
        loop {
            let times = self.config.borrow_and_update().schedule_times.clone();
            let now = market_now();

            let Some(next) = next_fire_after(now, &times) else {
                tracing::warn!("no schedule times configured; waiting for a config update");
                if self.config.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next = %next, wait_secs = wait.as_secs(), "scheduler sleeping until next fire");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let date = next.date_naive();
                    let run_mode = RunMode::for_slot(next.time());
                    tracing::info!(%date, %run_mode, at = %next, "scheduled generation fire");
                    // Fire and forget; generation failures are captured in
                    // the job task and must never unwind into this loop.
                    let (handle, started) = self.coordinator.trigger(date, run_mode).await;
                    if !started {
                        tracing::info!(%date, job_id = %handle.id, "generation already in flight at scheduled fire");
                    }
                }
                changed = self.config.changed() => {
                    if changed.is_err() {
                        tracing::warn!("schedule config channel closed; stopping scheduler");
                        return;
                    }
                    tracing::info!("schedule config updated; recomputing next fire");
                }
            }
        }
    }
}

/// First configured time strictly after `now` today, else the earliest time
/// tomorrow. `None` when `times` is empty.
pub fn next_fire_after(
    now: DateTime<FixedOffset>,
    times: &[NaiveTime],
) -> Option<DateTime<FixedOffset>> {
    if times.is_empty() {
        return None;
    }

    let tz = now.timezone();
    let today = now.date_naive();
    for time in times {
        let candidate = today.and_time(*time).and_local_timezone(tz).single()?;
        if candidate > now {
            return Some(candidate);
        }
    }

    let tomorrow = today.succ_opt()?;
    tomorrow.and_time(times[0]).and_local_timezone(tz).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cst() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn times() -> Vec<NaiveTime> {
        vec![t(9, 25), t(12, 30), t(15, 10)]
    }

    #[test]
    fn picks_next_slot_today() {
        let now = cst().with_ymd_and_hms(2026, 1, 8, 10, 0, 0).unwrap();
        let next = next_fire_after(now, &times()).unwrap();
        assert_eq!(next, cst().with_ymd_and_hms(2026, 1, 8, 12, 30, 0).unwrap());
    }

    #[test]
    fn rolls_to_tomorrow_after_last_slot() {
        let now = cst().with_ymd_and_hms(2026, 1, 8, 16, 0, 0).unwrap();
        let next = next_fire_after(now, &times()).unwrap();
        assert_eq!(next, cst().with_ymd_and_hms(2026, 1, 9, 9, 25, 0).unwrap());
    }

    #[test]
    fn exact_slot_time_is_not_refired() {
        let now = cst().with_ymd_and_hms(2026, 1, 8, 12, 30, 0).unwrap();
        let next = next_fire_after(now, &times()).unwrap();
        assert_eq!(next, cst().with_ymd_and_hms(2026, 1, 8, 15, 10, 0).unwrap());
    }

    #[test]
    fn empty_times_yield_none() {
        let now = cst().with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap();
        assert!(next_fire_after(now, &[]).is_none());
    }
}

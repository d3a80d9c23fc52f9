//! Adaptive polling: due checks and update-interval smoothing.
//!
//! A feed that has never been checked is due immediately. Afterwards it is due
//! once `max(min_interval, effective_interval)` has elapsed since its last
//! check, where the effective interval is its smoothed update interval clamped
//! to `[min_interval, update_window * CEILING_WINDOWS]`. A feed with no
//! evidence yet (average of zero) polls at the floor.

use std::time::Duration;

use super::SchedulerConfig;
use crate::storage::Feed;

/// Weight of the newest observed gap in the exponential moving average.
pub const SMOOTHING_FACTOR: f64 = 0.25;

/// Polling ceiling, in multiples of the update window.
pub const CEILING_WINDOWS: u32 = 24;

/// Longest a feed may go between checks.
pub fn interval_ceiling(config: &SchedulerConfig) -> Duration {
    (config.update_window * CEILING_WINDOWS).max(config.min_interval)
}

/// Polling interval derived from a feed's average update interval.
///
/// Zero means no evidence, which the due check treats as "poll at the floor".
pub fn effective_interval(average: Duration, config: &SchedulerConfig) -> Duration {
    if average.is_zero() {
        return Duration::ZERO;
    }
    average.clamp(config.min_interval, interval_ceiling(config))
}

/// Whether `feed` should be fetched at `now_ms` (milliseconds since epoch).
pub fn is_due(feed: &Feed, now_ms: i64, config: &SchedulerConfig) -> bool {
    let Some(last_checked) = feed.last_checked else {
        return true;
    };
    let elapsed = Duration::from_millis(now_ms.saturating_sub(last_checked).max(0) as u64);
    let required = config
        .min_interval
        .max(effective_interval(feed.average_update_interval(), config));
    elapsed >= required
}

/// Fold a newly observed gap between content updates into the average.
///
/// The first observation seeds the average; later ones are blended with
/// weight [`SMOOTHING_FACTOR`] so recent behaviour dominates.
pub fn next_average(previous: Duration, gap: Duration) -> Duration {
    if previous.is_zero() {
        return gap;
    }
    Duration::from_secs_f64(
        SMOOTHING_FACTOR * gap.as_secs_f64() + (1.0 - SMOOTHING_FACTOR) * previous.as_secs_f64(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_interval_ms: u64, update_window_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            update_window: Duration::from_millis(update_window_ms),
            min_interval: Duration::from_millis(min_interval_ms),
            ..SchedulerConfig::default()
        }
    }

    fn feed_checked_at(last_checked: Option<i64>, average_ms: i64) -> Feed {
        let mut feed = Feed::new(1, "https://example.com/rss", "Example");
        feed.last_checked = last_checked;
        feed.last_fetch = last_checked;
        feed.average_update_interval_ms = average_ms;
        feed
    }

    #[test]
    fn test_never_checked_feed_is_due_regardless_of_floor() {
        let config = config(3_600_000, 60_000);
        let feed = feed_checked_at(None, 0);
        assert!(is_due(&feed, 0, &config));
    }

    #[test]
    fn test_min_interval_scenario() {
        let config = config(100, 1_000);
        let start = 1_700_000_000_000;

        let mut feed = feed_checked_at(None, 0);
        assert!(is_due(&feed, start, &config));

        // Not-modified fetch at `start` only advances the check timestamps
        feed.last_fetch = Some(start);
        feed.last_checked = Some(start);

        assert!(!is_due(&feed, start + 50, &config));
        assert!(is_due(&feed, start + 150, &config));
    }

    #[test]
    fn test_slow_feed_waits_for_its_average() {
        let config = config(1_000, 60_000);
        let feed = feed_checked_at(Some(0), 10_000);

        assert!(!is_due(&feed, 5_000, &config));
        assert!(is_due(&feed, 10_000, &config));
    }

    #[test]
    fn test_fast_feed_is_held_at_floor() {
        let config = config(1_000, 60_000);
        let feed = feed_checked_at(Some(0), 10);

        assert!(!is_due(&feed, 999, &config));
        assert!(is_due(&feed, 1_000, &config));
    }

    #[test]
    fn test_stagnant_feed_is_capped_at_ceiling() {
        let config = config(1_000, 60_000);
        let ceiling = interval_ceiling(&config);
        assert_eq!(ceiling, Duration::from_secs(24 * 60));

        let feed = feed_checked_at(Some(0), 365 * 24 * 3_600_000);
        assert!(!is_due(&feed, ceiling.as_millis() as i64 - 1, &config));
        assert!(is_due(&feed, ceiling.as_millis() as i64, &config));
    }

    #[test]
    fn test_clock_skew_never_makes_feed_due() {
        let config = config(1_000, 60_000);
        let feed = feed_checked_at(Some(10_000), 0);
        assert!(!is_due(&feed, 5_000, &config));
    }

    #[test]
    fn test_next_average_seeds_then_smooths() {
        let first = next_average(Duration::ZERO, Duration::from_secs(100));
        assert_eq!(first, Duration::from_secs(100));

        let second = next_average(first, Duration::from_secs(20));
        assert_eq!(second, Duration::from_secs(80));
    }

    #[test]
    fn test_next_average_tracks_recent_behaviour() {
        let mut average = Duration::from_secs(3_600);
        for _ in 0..20 {
            average = next_average(average, Duration::from_secs(60));
        }
        assert!(average < Duration::from_secs(120), "average was {:?}", average);
    }
}

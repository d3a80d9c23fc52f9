//! Feed refresh scheduling.
//!
//! [`FeedScheduler`] owns the refresh loop. A cycle (background tick or
//! [`FeedScheduler::refresh_now`]) works like this:
//!
//! 1. Load every feed from the [`FeedStore`] and keep the due ones
//!    ([`is_due`]). A store failure here aborts only this cycle.
//! 2. Dispatch due feeds one by one. Dispatching claims the feed in the
//!    scheduler-wide in-flight set, waits for one of `max_concurrent` worker
//!    permits, re-reads the feed row and asks the [`DomainRateLimiter`] for a
//!    token. A denied feed is put back in the queue with the limiter's wait
//!    hint, or deferred to the next cycle when the hint runs past the cycle
//!    deadline (`update_window` after the start).
//! 3. Each worker fetches with a timeout, parses, stores new articles and
//!    writes the feed's fetch state back. Failures stay local to the feed.
//! 4. The cycle waits for its workers and returns a [`CycleSummary`].
//!
//! Permits and the in-flight set are shared by all cycles, so overlapping
//! on-demand and background cycles never exceed `max_concurrent` fetches and
//! never fetch the same feed twice at once.

mod adaptive;
mod rate_limiter;

pub use adaptive::{
    effective_interval, interval_ceiling, is_due, next_average, CEILING_WINDOWS, SMOOTHING_FACTOR,
};
pub use rate_limiter::{domain_of, DomainRateLimiter, RateDecision, RateLimitConfig};

use futures::future::{Fuse, FusedFuture};
use futures::FutureExt;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::feed::{FeedFetcher, FeedParser, FetchError, FetchOutcome, ParseError, Validators};
use crate::storage::{DatabaseError, Feed, FeedStore};

// ============================================================================
// Configuration
// ============================================================================

/// Scheduler settings supplied at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Cadence of background cycles; also the deadline of every cycle.
    pub update_window: Duration,
    /// Floor below which a feed is never re-checked.
    pub min_interval: Duration,
    /// Maximum simultaneous fetches across all cycles and domains.
    pub max_concurrent: usize,
    /// Cadence of rate limiter eviction.
    pub cleanup_interval: Duration,
    /// Upper bound on a single fetch; exceeding it is a fetch error.
    pub fetch_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_window: Duration::from_secs(15 * 60),
            min_interval: Duration::from_secs(5 * 60),
            max_concurrent: 8,
            cleanup_interval: Duration::from_secs(10 * 60),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Feed-local failure of a single refresh. Never aborts a cycle.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
    #[error("Refresh task panicked: {0}")]
    Panicked(String),
}

/// Failure of a scheduler call as a whole.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Candidate feeds could not be read; the cycle was aborted
    #[error("Failed to load feeds: {0}")]
    Store(#[from] DatabaseError),
    #[error("Feed {0} not found")]
    FeedNotFound(i64),
    #[error("Feed {0} is already being refreshed")]
    AlreadyInFlight(i64),
    /// The domain's wait hint exceeds what an on-demand refresh may wait
    #[error("Rate limited by {domain}, retry after {retry_after:?}")]
    RateLimited { domain: String, retry_after: Duration },
    #[error("Scheduler is shutting down")]
    ShuttingDown,
    #[error("Background refresh is already running")]
    AlreadyRunning,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// At least one previously unseen article was stored
    Updated,
    /// Not modified, or modified without new articles
    Unchanged,
    Error,
}

/// Outcome of refreshing one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshResult {
    pub feed_id: i64,
    pub outcome: RefreshOutcome,
    pub new_articles: usize,
    pub error: Option<String>,
}

impl RefreshResult {
    fn failed(feed_id: i64, error: &RefreshError) -> Self {
        Self {
            feed_id,
            outcome: RefreshOutcome::Error,
            new_articles: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate of one cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub errored: usize,
    pub new_articles: usize,
    /// Feeds whose adaptive interval had not elapsed
    pub not_due: usize,
    /// Feeds already being fetched by another cycle
    pub skipped_in_flight: usize,
    /// Feeds left for the next cycle (rate limited past the deadline, or shutdown)
    pub deferred: usize,
    pub duration: Duration,
    pub results: Vec<RefreshResult>,
}

impl CycleSummary {
    fn record(&mut self, result: RefreshResult) {
        match result.outcome {
            RefreshOutcome::Updated => self.updated += 1,
            RefreshOutcome::Unchanged => self.unchanged += 1,
            RefreshOutcome::Error => self.errored += 1,
        }
        self.new_articles += result.new_articles;
        self.results.push(result);
    }

    /// Number of feeds actually fetched in this cycle.
    pub fn fetched(&self) -> usize {
        self.updated + self.unchanged + self.errored
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Owns the refresh loop, the worker bound and the in-flight set.
///
/// Construct one per process and hand it to whatever needs to trigger
/// refreshes. Dropping it signals the background loop to stop.
pub struct FeedScheduler {
    inner: Arc<Inner>,
    background: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: SchedulerConfig,
    store: Arc<dyn FeedStore>,
    fetcher: Arc<dyn FeedFetcher>,
    parser: Arc<dyn FeedParser>,
    limiter: Arc<DomainRateLimiter>,
    permits: Arc<Semaphore>,
    in_flight: Mutex<HashSet<i64>>,
    idle: Notify,
    shutdown: watch::Sender<bool>,
}

/// Removes its feed from the in-flight set when dropped.
struct InFlightClaim {
    inner: Arc<Inner>,
    feed_id: i64,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let now_idle = {
            let mut in_flight = lock(&self.inner.in_flight);
            in_flight.remove(&self.feed_id);
            in_flight.is_empty()
        };
        if now_idle {
            self.inner.idle.notify_waiters();
        }
    }
}

struct Pending {
    feed: Feed,
    not_before: Instant,
}

enum DispatchStep {
    Spawned,
    InFlight,
    NotDue,
    Vanished,
    Retry(Pending),
    Deferred,
    Failed(RefreshResult),
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Background,
    OnDemand,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Background => "background",
            Trigger::OnDemand => "on_demand",
        }
    }
}

impl FeedScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn FeedStore>,
        fetcher: Arc<dyn FeedFetcher>,
        parser: Arc<dyn FeedParser>,
        limiter: Arc<DomainRateLimiter>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                fetcher,
                parser,
                limiter,
                permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                in_flight: Mutex::new(HashSet::new()),
                idle: Notify::new(),
                shutdown,
            }),
            background: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.inner.limiter
    }

    /// Number of feeds currently being fetched.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.background)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Begin background cycles every `update_window` (the first one runs
    /// immediately) and limiter eviction every `cleanup_interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut background = lock(&self.background);
        if background.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.inner
            .shutdown
            .send_if_modified(|stop| std::mem::replace(stop, false));

        let inner = Arc::clone(&self.inner);
        *background = Some(tokio::spawn(inner.run_background()));
        tracing::info!(
            update_window_ms = self.inner.config.update_window.as_millis() as u64,
            max_concurrent = self.inner.config.max_concurrent,
            "Feed scheduler started"
        );
        Ok(())
    }

    /// Stop background cycles and wait for every in-flight fetch to finish.
    ///
    /// Cycles that are still dispatching stop handing out work; their
    /// remaining feeds are deferred.
    pub async fn stop(&self) {
        self.inner.shutdown.send_replace(true);

        let handle = lock(&self.background).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background refresh task ended abnormally");
            }
        }

        self.inner.wait_idle().await;
        tracing::info!("Feed scheduler stopped");
    }

    /// Run one full cycle now and wait for it to finish.
    ///
    /// Individual feed failures are reported in the summary; only a failure
    /// to read the candidate feeds fails the call.
    pub async fn refresh_now(&self) -> Result<CycleSummary, SchedulerError> {
        if self.inner.is_shutting_down() {
            return Err(SchedulerError::ShuttingDown);
        }
        self.inner.run_cycle(Trigger::OnDemand).await
    }

    /// Refresh a single feed now, bypassing the due check.
    ///
    /// Waits on the domain's rate limit hints as long as the total wait stays
    /// within `update_window`. The wait holds only the feed's in-flight claim;
    /// a worker permit is taken after the limiter grants.
    pub async fn refresh_one(&self, feed_id: i64) -> Result<RefreshResult, SchedulerError> {
        let inner = &self.inner;
        if inner.is_shutting_down() {
            return Err(SchedulerError::ShuttingDown);
        }

        let _claim = inner
            .try_claim(feed_id)
            .ok_or(SchedulerError::AlreadyInFlight(feed_id))?;
        let feed = inner
            .store
            .get_feed(feed_id)
            .await?
            .ok_or(SchedulerError::FeedNotFound(feed_id))?;

        let mut shutdown = inner.shutdown.subscribe();
        if let Some(domain) = domain_of(&feed.url) {
            let mut waited = Duration::ZERO;
            while let RateDecision::Denied { retry_after } = inner.limiter.acquire(&domain) {
                if waited + retry_after > inner.config.update_window {
                    return Err(SchedulerError::RateLimited {
                        domain,
                        retry_after,
                    });
                }
                tracing::debug!(
                    feed_id = feed_id,
                    domain = %domain,
                    wait_ms = retry_after.as_millis() as u64,
                    "Waiting for domain rate limit"
                );
                tokio::select! {
                    _ = tokio::time::sleep(retry_after) => {}
                    _ = cancelled(&mut shutdown) => return Err(SchedulerError::ShuttingDown),
                }
                waited += retry_after;
            }
        }

        let _permit = tokio::select! {
            permit = Arc::clone(&inner.permits).acquire_owned() => {
                permit.map_err(|_| SchedulerError::ShuttingDown)?
            }
            _ = cancelled(&mut shutdown) => return Err(SchedulerError::ShuttingDown),
        };
        Ok(inner.refresh_feed(feed).await)
    }
}

impl Drop for FeedScheduler {
    fn drop(&mut self) {
        self.inner.shutdown.send_replace(true);
    }
}

impl Inner {
    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn try_claim(self: &Arc<Self>, feed_id: i64) -> Option<InFlightClaim> {
        if !lock(&self.in_flight).insert(feed_id) {
            return None;
        }
        Some(InFlightClaim {
            inner: Arc::clone(self),
            feed_id,
        })
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let idle = lock(&self.in_flight).is_empty();
            if idle {
                return;
            }
            notified.await;
        }
    }

    async fn run_background(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();

        let mut cycle_tick =
            tokio::time::interval(self.config.update_window.max(Duration::from_millis(1)));
        cycle_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cleanup_every = self.config.cleanup_interval.max(Duration::from_millis(1));
        let mut cleanup_tick =
            tokio::time::interval_at(Instant::now() + cleanup_every, cleanup_every);
        cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Cleanup ticks keep firing while a cycle runs
        let cycle = Fuse::terminated();
        tokio::pin!(cycle);

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => {
                    tracing::debug!("Background refresh loop shutting down");
                    if !cycle.is_terminated() {
                        // Sees the shutdown itself: defers its queue, joins its workers
                        let _ = (&mut cycle).await;
                    }
                    break;
                }
                _ = cycle_tick.tick(), if cycle.is_terminated() => {
                    cycle.set(self.run_cycle(Trigger::Background).fuse());
                }
                // A failed cycle is logged by run_cycle; the next tick tries again
                _ = &mut cycle, if !cycle.is_terminated() => {}
                _ = cleanup_tick.tick() => {
                    self.limiter.evict_idle();
                }
            }
        }
    }

    async fn run_cycle(self: &Arc<Self>, trigger: Trigger) -> Result<CycleSummary, SchedulerError> {
        let started = Instant::now();
        let deadline = started + self.config.update_window;

        let feeds = match self.store.get_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::warn!(trigger = trigger.as_str(), error = %e, "Refresh cycle aborted: cannot load feeds");
                return Err(SchedulerError::Store(e));
            }
        };

        let now_ms = now_millis();
        let mut summary = CycleSummary::default();
        let mut queue: VecDeque<Pending> = VecDeque::new();
        for feed in feeds {
            if is_due(&feed, now_ms, &self.config) {
                queue.push_back(Pending {
                    feed,
                    not_before: started,
                });
            } else {
                summary.not_due += 1;
            }
        }

        tracing::info!(
            trigger = trigger.as_str(),
            due = queue.len(),
            not_due = summary.not_due,
            "Refresh cycle started"
        );

        let mut shutdown = self.shutdown.subscribe();
        let mut workers: JoinSet<RefreshResult> = JoinSet::new();

        loop {
            let now = Instant::now();
            if self.is_shutting_down() || now >= deadline {
                summary.deferred += queue.len();
                queue.clear();
                break;
            }

            let Some(pos) = queue.iter().position(|p| p.not_before <= now) else {
                let Some(wake) = queue.iter().map(|p| p.not_before).min() else {
                    break;
                };
                tokio::select! {
                    _ = tokio::time::sleep_until(wake.min(deadline)) => {}
                    _ = cancelled(&mut shutdown) => {}
                }
                continue;
            };
            let Some(pending) = queue.remove(pos) else {
                continue;
            };

            match self
                .dispatch(pending.feed, &mut workers, deadline, &mut shutdown)
                .await
            {
                DispatchStep::Spawned => {}
                DispatchStep::InFlight => summary.skipped_in_flight += 1,
                DispatchStep::NotDue => summary.not_due += 1,
                DispatchStep::Vanished => {}
                DispatchStep::Retry(pending) => queue.push_back(pending),
                DispatchStep::Deferred => summary.deferred += 1,
                DispatchStep::Failed(result) => summary.record(result),
            }
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(result) => summary.record(result),
                Err(e) => tracing::warn!(error = %e, "Refresh worker ended abnormally"),
            }
        }

        summary.duration = started.elapsed();
        tracing::info!(
            trigger = trigger.as_str(),
            updated = summary.updated,
            unchanged = summary.unchanged,
            errored = summary.errored,
            new_articles = summary.new_articles,
            skipped_in_flight = summary.skipped_in_flight,
            deferred = summary.deferred,
            elapsed_ms = summary.duration.as_millis() as u64,
            "Refresh cycle finished"
        );
        Ok(summary)
    }

    async fn dispatch(
        self: &Arc<Self>,
        feed: Feed,
        workers: &mut JoinSet<RefreshResult>,
        deadline: Instant,
        shutdown: &mut watch::Receiver<bool>,
    ) -> DispatchStep {
        let feed_id = feed.id;
        let Some(claim) = self.try_claim(feed_id) else {
            tracing::debug!(feed_id = feed_id, "Feed already in flight, skipping");
            return DispatchStep::InFlight;
        };

        let permit: OwnedSemaphorePermit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return DispatchStep::Deferred,
            },
            _ = tokio::time::sleep_until(deadline) => return DispatchStep::Deferred,
            _ = cancelled(shutdown) => return DispatchStep::Deferred,
        };

        // The cycle's snapshot may be stale if another cycle just refreshed this feed
        let feed = match self.store.get_feed(feed_id).await {
            Ok(Some(feed)) => feed,
            Ok(None) => {
                tracing::debug!(feed_id = feed_id, "Feed deleted before dispatch");
                return DispatchStep::Vanished;
            }
            Err(e) => {
                let error = RefreshError::Store(e);
                tracing::warn!(feed_id = feed_id, error = %error, "Failed to reload feed");
                return DispatchStep::Failed(RefreshResult::failed(feed_id, &error));
            }
        };
        if !is_due(&feed, now_millis(), &self.config) {
            return DispatchStep::NotDue;
        }

        if let Some(domain) = domain_of(&feed.url) {
            if let RateDecision::Denied { retry_after } = self.limiter.acquire(&domain) {
                let not_before = Instant::now() + retry_after;
                if not_before >= deadline {
                    tracing::debug!(
                        feed_id = feed_id,
                        domain = %domain,
                        "Rate limited past cycle deadline, deferring"
                    );
                    return DispatchStep::Deferred;
                }
                tracing::debug!(
                    feed_id = feed_id,
                    domain = %domain,
                    wait_ms = retry_after.as_millis() as u64,
                    "Rate limited, rescheduling within cycle"
                );
                return DispatchStep::Retry(Pending { feed, not_before });
            }
        }

        let inner = Arc::clone(self);
        workers.spawn(async move {
            let _permit = permit;
            let _claim = claim;
            inner.refresh_feed(feed).await
        });
        DispatchStep::Spawned
    }

    /// Fetch, parse and persist one feed. The caller holds its in-flight claim.
    async fn refresh_feed(&self, feed: Feed) -> RefreshResult {
        let feed_id = feed.id;
        let title = Arc::clone(&feed.title);

        let applied = match AssertUnwindSafe(self.fetch_and_apply(feed))
            .catch_unwind()
            .await
        {
            Ok(applied) => applied,
            Err(panic) => Err(RefreshError::Panicked(panic_message(panic.as_ref()))),
        };

        match applied {
            Ok((outcome, new_articles)) => {
                tracing::debug!(
                    feed_id = feed_id,
                    title = %title,
                    outcome = ?outcome,
                    new_articles = new_articles,
                    "Feed refreshed"
                );
                RefreshResult {
                    feed_id,
                    outcome,
                    new_articles,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(feed_id = feed_id, title = %title, error = %e, "Feed refresh failed");
                RefreshResult::failed(feed_id, &e)
            }
        }
    }

    async fn fetch_and_apply(&self, feed: Feed) -> Result<(RefreshOutcome, usize), RefreshError> {
        let now = now_millis();
        let mut next = feed.clone();

        let applied = match self.fetch(&feed).await {
            Ok(FetchOutcome::NotModified) => Ok((RefreshOutcome::Unchanged, 0)),
            Ok(FetchOutcome::Modified { body, validators }) => {
                self.apply_content(&feed, &mut next, &body, validators, now)
                    .await
            }
            Err(e) => Err(e),
        };

        match &applied {
            Ok(_) => next.last_error = None,
            Err(e) => {
                // Only the check timestamps move; adaptive state and validators stay
                next = feed.clone();
                next.last_error = Some(e.to_string());
            }
        }
        next.last_fetch = Some(now);
        next.last_checked = Some(now);

        self.store.update_feed_fetch_state(&next).await?;
        applied
    }

    async fn fetch(&self, feed: &Feed) -> Result<FetchOutcome, RefreshError> {
        if domain_of(&feed.url).is_none() {
            return Err(FetchError::InvalidUrl(feed.url.clone()).into());
        }
        let validators = Validators {
            etag: feed.etag.clone(),
            last_modified: feed.last_modified.clone(),
        };
        match tokio::time::timeout(
            self.config.fetch_timeout,
            self.fetcher.fetch(&feed.url, &validators),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(FetchError::Timeout.into()),
        }
    }

    async fn apply_content(
        &self,
        feed: &Feed,
        next: &mut Feed,
        body: &[u8],
        validators: Validators,
        now: i64,
    ) -> Result<(RefreshOutcome, usize), RefreshError> {
        let articles = self.parser.parse(body)?;
        let inserted = self.store.add_articles(feed.id, &articles).await?;

        if inserted > 0 {
            if let Some(previous) = feed.last_had_new_content {
                let gap = Duration::from_millis(now.saturating_sub(previous).max(0) as u64);
                let average = next_average(feed.average_update_interval(), gap);
                next.average_update_interval_ms =
                    i64::try_from(average.as_millis()).unwrap_or(i64::MAX);
            }
            next.last_had_new_content = Some(now);
        }
        next.etag = validators.etag;
        next.last_modified = validators.last_modified;

        let outcome = if inserted > 0 {
            RefreshOutcome::Updated
        } else {
            RefreshOutcome::Unchanged
        };
        Ok((outcome, inserted))
    }
}

/// Resolves once shutdown has been requested (or the scheduler is gone).
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: RefreshOutcome, new_articles: usize) -> RefreshResult {
        RefreshResult {
            feed_id: 1,
            outcome,
            new_articles,
            error: None,
        }
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = CycleSummary::default();
        summary.record(result(RefreshOutcome::Updated, 3));
        summary.record(result(RefreshOutcome::Updated, 2));
        summary.record(result(RefreshOutcome::Unchanged, 0));
        summary.record(result(RefreshOutcome::Error, 0));

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.new_articles, 5);
        assert_eq!(summary.fetched(), 4);
        assert_eq!(summary.results.len(), 4);
    }

    #[test]
    fn test_failed_result_carries_error_text() {
        let error = RefreshError::Fetch(FetchError::HttpStatus(503));
        let result = RefreshResult::failed(9, &error);
        assert_eq!(result.outcome, RefreshOutcome::Error);
        assert_eq!(result.error.as_deref(), Some("HTTP error: status 503"));
    }

    #[test]
    fn test_summary_serializes_outcome_in_snake_case() {
        let mut summary = CycleSummary::default();
        summary.record(result(RefreshOutcome::Unchanged, 0));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["results"][0]["outcome"], "unchanged");
        assert_eq!(json["unchanged"], 1);
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}

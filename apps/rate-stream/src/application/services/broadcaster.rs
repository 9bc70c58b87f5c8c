//! Broadcast Loop
//!
//! The periodic task at the heart of the service: every tick it obtains
//! a rate update from the source port and fans it out to every
//! subscriber in the registry's current snapshot.
//!
//! # Resilience
//!
//! A tick can never kill the loop. Fetch failures are retried within the
//! tick (bounded backoff) and then converted into a degraded record, so
//! subscribers observe `rate: null` instead of silence. Per-subscriber
//! send failures are reconciled by unregistering the failed sink only;
//! delivery to the remaining subscribers proceeds. Every send is bounded
//! by a timeout so one stalled peer cannot delay the rest indefinitely.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{RateSourceError, RateSourcePort};
use crate::application::services::retry::{RetryConfig, RetryPolicy};
use crate::domain::rate::RateUpdate;
use crate::domain::registry::SubscriberRegistry;

// =============================================================================
// Configuration
// =============================================================================

/// Timing configuration for the broadcast loop.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Interval between fetch ticks.
    pub poll_interval: Duration,
    /// Upper bound on a single fetch attempt.
    pub fetch_timeout: Duration,
    /// Upper bound on delivery to a single subscriber.
    pub send_timeout: Duration,
    /// Within-tick fetch retry policy.
    pub retry: RetryConfig,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(1),
            retry: RetryConfig::default(),
        }
    }
}

// =============================================================================
// Health State
// =============================================================================

/// Observable state of the broadcast loop.
///
/// Shared with the health endpoint so the surrounding service can detect
/// a dead or degraded loop.
#[derive(Debug, Default)]
pub struct BroadcastHealth {
    ticks: AtomicU64,
    consecutive_degraded: AtomicU32,
    last_tick_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_error: parking_lot::RwLock<Option<String>>,
}

impl BroadcastHealth {
    /// Create fresh health state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed tick.
    pub fn record_tick(&self, degraded: bool) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.write() = Some(Utc::now());
        if degraded {
            self.consecutive_degraded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.consecutive_degraded.store(0, Ordering::Relaxed);
            *self.last_error.write() = None;
        }
    }

    /// Record the most recent fetch failure.
    pub fn record_fetch_error(&self, error: String) {
        *self.last_error.write() = Some(error);
    }

    /// Total ticks completed since startup.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Number of consecutive ticks that produced a degraded record.
    #[must_use]
    pub fn consecutive_degraded(&self) -> u32 {
        self.consecutive_degraded.load(Ordering::Relaxed)
    }

    /// Timestamp of the last completed tick.
    #[must_use]
    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        *self.last_tick_at.read()
    }

    /// The most recent fetch failure, if any since the last clean tick.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Whether the loop has completed a tick within `staleness`.
    #[must_use]
    pub fn is_ticking(&self, staleness: Duration) -> bool {
        self.last_tick_at().is_some_and(|t| {
            Utc::now()
                .signed_duration_since(t)
                .to_std()
                .is_ok_and(|age| age <= staleness)
        })
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Periodic fetch-and-fan-out loop.
pub struct Broadcaster {
    source: Arc<dyn RateSourcePort>,
    registry: Arc<SubscriberRegistry>,
    health: Arc<BroadcastHealth>,
    config: BroadcasterConfig,
    shutdown: CancellationToken,
}

impl Broadcaster {
    /// Create a new broadcaster.
    #[must_use]
    pub fn new(
        source: Arc<dyn RateSourcePort>,
        registry: Arc<SubscriberRegistry>,
        health: Arc<BroadcastHealth>,
        config: BroadcasterConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            registry,
            health,
            config,
            shutdown,
        }
    }

    /// Run the broadcast loop until cancelled.
    ///
    /// The first tick fires one full interval after startup, matching
    /// the polling cadence thereafter.
    pub async fn run(self) {
        let start = Instant::now() + self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(start, self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.config.poll_interval.as_millis(),
            currency = self.source.currency(),
            "broadcast loop started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::info!("broadcast loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One fetch-and-deliver cycle. Ticks are strictly sequential, so
    /// per-subscriber updates always arrive in fetch order.
    async fn tick(&self) {
        let fetch_started = Instant::now();
        let update = self.fetch_with_retry().await;
        histogram!("rate_stream_fetch_duration_seconds")
            .record(fetch_started.elapsed().as_secs_f64());

        if update.is_degraded() {
            counter!("rate_stream_degraded_updates_total").increment(1);
        }

        self.deliver(&update).await;

        counter!("rate_stream_ticks_total").increment(1);
        self.health.record_tick(update.is_degraded());
    }

    /// Fetch the current rate, retrying within the tick.
    ///
    /// Exhausted retries yield a degraded record rather than an error:
    /// the loop survives every tick.
    async fn fetch_with_retry(&self) -> RateUpdate {
        let mut policy = RetryPolicy::new(self.config.retry.clone());

        loop {
            let error = match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch())
                .await
            {
                Ok(Ok(update)) => return update,
                Ok(Err(e)) => e,
                Err(_) => RateSourceError::Timeout,
            };

            counter!("rate_stream_fetch_failures_total").increment(1);
            self.health.record_fetch_error(error.to_string());

            match policy.next_delay() {
                Some(delay) => {
                    tracing::warn!(
                        error = %error,
                        attempt = policy.attempt_count(),
                        retry_in_ms = delay.as_millis(),
                        "rate fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::warn!(
                        error = %error,
                        "rate fetch failed, emitting degraded update"
                    );
                    return RateUpdate::degraded(self.source.currency());
                }
            }
        }
    }

    /// Deliver one update to every subscriber in the current snapshot.
    ///
    /// The update is serialized once, so all subscribers receive
    /// byte-identical payloads. A failed or timed-out send unregisters
    /// and closes that subscriber only.
    pub async fn deliver(&self, update: &RateUpdate) {
        let payload = match serde_json::to_string(update) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize rate update");
                return;
            }
        };

        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            tracing::debug!("no subscribers, skipping delivery");
            return;
        }

        let delivery_started = Instant::now();
        let send_timeout = self.config.send_timeout;
        let results = futures::future::join_all(snapshot.iter().map(|(id, sink)| {
            let id = *id;
            let payload = payload.as_str();
            async move {
                match tokio::time::timeout(send_timeout, sink.send(payload)).await {
                    Ok(Ok(())) => (id, None),
                    Ok(Err(e)) => (id, Some(e.to_string())),
                    Err(_) => (id, Some("send timed out".to_string())),
                }
            }
        }))
        .await;

        let mut delivered: u64 = 0;
        for (id, failure) in results {
            if let Some(reason) = failure {
                tracing::warn!(
                    subscriber = id,
                    reason = %reason,
                    "dropping subscriber after failed delivery"
                );
                counter!("rate_stream_send_failures_total").increment(1);
                if let Some(sink) = self.registry.unregister(id) {
                    sink.close().await;
                }
            } else {
                delivered += 1;
            }
        }

        counter!("rate_stream_messages_sent_total").increment(delivered);
        #[allow(clippy::cast_precision_loss)]
        gauge!("rate_stream_subscribers_active").set(self.registry.len() as f64);
        histogram!("rate_stream_delivery_duration_seconds")
            .record(delivery_started.elapsed().as_secs_f64());

        tracing::debug!(
            delivered,
            currency = %update.currency,
            degraded = update.is_degraded(),
            "update delivered"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::str::FromStr;
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::registry::{SinkError, SubscriberSink};

    #[derive(Default)]
    struct RecordingSink {
        payloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SubscriberSink for RecordingSink {
        async fn send(&self, payload: &str) -> Result<(), SinkError> {
            self.payloads.lock().push(payload.to_owned());
            Ok(())
        }

        async fn close(&self) {}
    }

    #[derive(Default)]
    struct FailingSink {
        closed: AtomicBool,
    }

    #[async_trait]
    impl SubscriberSink for FailingSink {
        async fn send(&self, _payload: &str) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct StallingSink;

    #[async_trait]
    impl SubscriberSink for StallingSink {
        async fn send(&self, _payload: &str) -> Result<(), SinkError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn close(&self) {}
    }

    /// Source that fails the first `failures` fetches, then serves the
    /// queued rates (repeating the last one once the queue drains).
    struct ScriptedSource {
        failures: AtomicU32,
        rates: Mutex<VecDeque<Decimal>>,
    }

    impl ScriptedSource {
        fn new(failures: u32, rates: &[&str]) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                rates: Mutex::new(rates.iter().map(|r| Decimal::from_str(r).unwrap()).collect()),
            }
        }
    }

    #[async_trait]
    impl RateSourcePort for ScriptedSource {
        async fn fetch(&self) -> Result<RateUpdate, RateSourceError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(RateSourceError::Network("connection refused".to_string()));
            }
            let mut rates = self.rates.lock();
            let rate = if rates.len() > 1 {
                rates.pop_front().unwrap()
            } else {
                *rates.front().unwrap()
            };
            Ok(RateUpdate::new("BYN", Some(rate)))
        }

        fn currency(&self) -> &str {
            "BYN"
        }
    }

    fn fast_config() -> BroadcasterConfig {
        BroadcasterConfig {
            poll_interval: Duration::from_millis(20),
            fetch_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_millis(50),
            retry: RetryConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts: 1,
            },
        }
    }

    fn broadcaster(
        source: Arc<dyn RateSourcePort>,
        registry: Arc<SubscriberRegistry>,
        config: BroadcasterConfig,
    ) -> (Broadcaster, Arc<BroadcastHealth>) {
        let health = Arc::new(BroadcastHealth::new());
        let b = Broadcaster::new(
            source,
            registry,
            Arc::clone(&health),
            config,
            CancellationToken::new(),
        );
        (b, health)
    }

    #[tokio::test]
    async fn failed_sink_does_not_stop_delivery_to_others() {
        let registry = Arc::new(SubscriberRegistry::new());
        let a = Arc::new(RecordingSink::default());
        let failing = Arc::new(FailingSink::default());
        let c = Arc::new(RecordingSink::default());
        registry.register(1, Arc::clone(&a) as Arc<dyn SubscriberSink>);
        registry.register(2, Arc::clone(&failing) as Arc<dyn SubscriberSink>);
        registry.register(3, Arc::clone(&c) as Arc<dyn SubscriberSink>);

        let source = Arc::new(ScriptedSource::new(0, &["3.27"]));
        let (broadcaster, _health) = broadcaster(source, Arc::clone(&registry), fast_config());

        let update = RateUpdate::new("BYN", Some(Decimal::from_str("3.27").unwrap()));
        broadcaster.deliver(&update).await;

        let sent_a = a.payloads.lock().clone();
        let sent_c = c.payloads.lock().clone();
        assert_eq!(sent_a.len(), 1);
        assert_eq!(sent_c.len(), 1);
        // Every subscriber receives byte-identical payloads
        assert_eq!(sent_a[0], sent_c[0]);

        // The failed subscriber is gone, the rest remain
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(2));
        assert!(failing.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stalled_sink_is_cut_off_by_send_timeout() {
        let registry = Arc::new(SubscriberRegistry::new());
        let healthy = Arc::new(RecordingSink::default());
        registry.register(1, Arc::clone(&healthy) as Arc<dyn SubscriberSink>);
        registry.register(2, Arc::new(StallingSink) as Arc<dyn SubscriberSink>);

        let source = Arc::new(ScriptedSource::new(0, &["3.27"]));
        let (broadcaster, _health) = broadcaster(source, Arc::clone(&registry), fast_config());

        let update = RateUpdate::new("BYN", Some(Decimal::from_str("3.27").unwrap()));
        broadcaster.deliver(&update).await;

        assert_eq!(healthy.payloads.lock().len(), 1);
        assert!(!registry.contains(2));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn fetch_retry_recovers_within_tick() {
        let registry = Arc::new(SubscriberRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        registry.register(1, Arc::clone(&sink) as Arc<dyn SubscriberSink>);

        // One failure, then success; one retry allowed
        let source = Arc::new(ScriptedSource::new(1, &["3.27"]));
        let (broadcaster, health) = broadcaster(source, registry, fast_config());

        broadcaster.tick().await;

        let sent = sink.payloads.lock().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("3.27"));
        assert_eq!(health.consecutive_degraded(), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_without_killing_the_loop() {
        let registry = Arc::new(SubscriberRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        registry.register(1, Arc::clone(&sink) as Arc<dyn SubscriberSink>);

        // Two failures but only one retry: the first tick degrades
        let source = Arc::new(ScriptedSource::new(2, &["3.27"]));
        let (broadcaster, health) = broadcaster(source, registry, fast_config());

        broadcaster.tick().await;
        assert_eq!(health.consecutive_degraded(), 1);
        assert!(health.last_error().is_some());

        // The next tick succeeds and clears the failure streak
        broadcaster.tick().await;
        assert_eq!(health.consecutive_degraded(), 0);
        assert!(health.last_error().is_none());

        let sent = sink.payloads.lock().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("null"));
        assert!(sent[1].contains("3.27"));
    }

    #[tokio::test]
    async fn updates_arrive_in_fetch_order() {
        let registry = Arc::new(SubscriberRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        registry.register(1, Arc::clone(&sink) as Arc<dyn SubscriberSink>);

        let source = Arc::new(ScriptedSource::new(0, &["3.27", "3.28", "3.29"]));
        let (broadcaster, _health) = broadcaster(source, registry, fast_config());

        broadcaster.tick().await;
        broadcaster.tick().await;
        broadcaster.tick().await;

        let sent = sink.payloads.lock().clone();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].contains("3.27"));
        assert!(sent[1].contains("3.28"));
        assert!(sent[2].contains("3.29"));
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let registry = Arc::new(SubscriberRegistry::new());
        let source = Arc::new(ScriptedSource::new(0, &["3.27"]));
        let health = Arc::new(BroadcastHealth::new());
        let shutdown = CancellationToken::new();
        let broadcaster = Broadcaster::new(
            source,
            registry,
            health,
            fast_config(),
            shutdown.clone(),
        );

        let handle = tokio::spawn(broadcaster.run());
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop after cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn health_reports_tick_staleness() {
        let health = BroadcastHealth::new();
        assert!(!health.is_ticking(Duration::from_secs(10)));

        health.record_tick(false);
        assert!(health.is_ticking(Duration::from_secs(10)));
        assert_eq!(health.ticks(), 1);
    }
}

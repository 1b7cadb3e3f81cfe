//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Publish loop state machine and run statistics."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! The publish loop.
//!
//! `Disconnected -> Connecting -> Connected -> (Running <-> Publishing) -> Disconnected`
//!
//! Every tick runs to completion (assemble, publish, streak check) before the
//! shutdown future or the next tick is observed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lumicert_common::{AppConfig, ConfigError};
use lumicert_msg::{DeliveryGuarantee, LinkEvent, MessagingError, Status, Transport};
use lumicert_sim::{Entropy, FleetPayload, FleetSimulator, RngEntropy, StreakWarning};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::scheduling::RateLimiter;

/// Telemetry and status are both published at-least-once and retained.
const DELIVERY: DeliveryGuarantee = DeliveryGuarantee::AtLeastOnce;
const RETAIN: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Disconnected,
    Connecting,
    Connected,
    Running,
    Publishing,
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishStats {
    pub ticks: u64,
    pub published: u64,
    pub failed: u64,
    /// Telemetry payload bytes accepted by the transport.
    pub bytes: u64,
}

/// What happened during one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub payload: FleetPayload,
    pub published: bool,
    pub warnings: Vec<StreakWarning>,
}

pub struct PublishLoop {
    transport: Arc<dyn Transport>,
    simulator: FleetSimulator,
    entropy: Box<dyn Entropy + Send>,
    clock: Box<dyn Clock>,
    topic: String,
    status_topic: String,
    interval: Duration,
    tick_limit: Option<u64>,
    state: LoopState,
    stats: PublishStats,
}

impl PublishLoop {
    /// Validate `config` and build a loop publishing through `transport`.
    ///
    /// Entropy is seeded from `simulation.seed` when present; the clock is the
    /// host wall clock.
    pub fn new(config: &AppConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;
        let simulator = FleetSimulator::new(&config.simulation)?;
        Ok(Self {
            transport,
            simulator,
            entropy: Box::new(RngEntropy::from_seed_option(config.simulation.seed)),
            clock: Box::new(SystemClock),
            topic: config.telemetry.topic.clone(),
            status_topic: config.telemetry.status_topic(),
            interval: config.telemetry.interval,
            tick_limit: None,
            state: LoopState::Disconnected,
            stats: PublishStats::default(),
        })
    }

    pub fn with_entropy<E: Entropy + Send + 'static>(mut self, entropy: E) -> Self {
        self.entropy = Box::new(entropy);
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Stop after `ticks` ticks and run the normal shutdown sequence.
    pub fn with_tick_limit(mut self, ticks: u64) -> Self {
        self.tick_limit = Some(ticks);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    pub fn simulator(&self) -> &FleetSimulator {
        &self.simulator
    }

    pub fn simulator_mut(&mut self) -> &mut FleetSimulator {
        &mut self.simulator
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }

    fn limit_reached(&self) -> bool {
        self.tick_limit
            .is_some_and(|limit| self.stats.ticks >= limit)
    }

    /// Connect, publish until `shutdown` resolves or the tick limit is hit,
    /// then announce offline and disconnect.
    ///
    /// Only a failed connect is an error; publish failures are counted and
    /// logged.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<PublishStats, MessagingError>
    where
        F: Future<Output = ()>,
    {
        self.state = LoopState::Connecting;
        info!(
            transport = self.transport.name(),
            topic = %self.topic,
            interval_ms = self.interval.as_millis() as u64,
            "connecting publish loop"
        );
        if let Err(err) = self.transport.connect().await {
            self.state = LoopState::Disconnected;
            error!(error = %err, "unable to start publish loop");
            return Err(err);
        }
        self.state = LoopState::Connected;
        let mut link = self.transport.link_events();
        self.announce(Status::Online).await;

        let mut limiter = RateLimiter::new(self.interval);
        let mut link_open = true;
        tokio::pin!(shutdown);
        self.state = LoopState::Running;

        loop {
            if self.limit_reached() {
                info!(ticks = self.stats.ticks, "tick limit reached");
                break;
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = link.recv(), if link_open => match event {
                    Ok(LinkEvent::Connected) => {
                        info!("broker session re-established");
                        self.announce(Status::Online).await;
                    }
                    Ok(LinkEvent::Disconnected { reason }) => {
                        warn!(%reason, "broker session lost");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "missed link events");
                    }
                    Err(RecvError::Closed) => {
                        link_open = false;
                    }
                },
                _ = limiter.tick() => {
                    self.tick().await;
                }
            }
        }

        self.shutdown().await;
        Ok(self.stats)
    }

    /// Produce and publish one payload, then report streaks.
    pub async fn tick(&mut self) -> TickReport {
        self.state = LoopState::Publishing;
        self.stats.ticks += 1;
        let tick = self.stats.ticks;

        let now = self.clock.now();
        let payload = self.simulator.assemble(&now, self.entropy.as_mut());
        let published = match payload.to_json() {
            Ok(body) => self.publish_telemetry(body).await,
            Err(err) => {
                let err = MessagingError::from(err);
                error!(tick, error = %err, "unable to encode payload");
                self.stats.failed += 1;
                false
            }
        };
        info!(tick, published, "{}", payload.summary_line());

        let warnings = self.simulator.streak_warnings();
        for warning in &warnings {
            warn!(
                device = warning.device_id,
                kind = warning.kind.as_str(),
                streak = warning.length,
                "consecutive anomaly streak"
            );
        }

        self.state = LoopState::Running;
        TickReport {
            tick,
            payload,
            published,
            warnings,
        }
    }

    async fn publish_telemetry(&mut self, body: Vec<u8>) -> bool {
        match self
            .transport
            .publish(&self.topic, Bytes::from(body), DELIVERY, RETAIN)
            .await
        {
            Ok(ack) => {
                self.stats.published += 1;
                self.stats.bytes += ack.bytes as u64;
                debug!(topic = %ack.topic, bytes = ack.bytes, "telemetry published");
                true
            }
            Err(err) => {
                self.stats.failed += 1;
                warn!(topic = %self.topic, error = %err, "telemetry publish failed");
                false
            }
        }
    }

    async fn announce(&self, status: Status) -> bool {
        match self
            .transport
            .publish(&self.status_topic, status.payload(), DELIVERY, RETAIN)
            .await
        {
            Ok(_) => {
                info!(topic = %self.status_topic, status = status.as_str(), "status announced");
                true
            }
            Err(err) => {
                warn!(topic = %self.status_topic, status = status.as_str(), error = %err, "status publish failed");
                false
            }
        }
    }

    async fn shutdown(&mut self) {
        self.announce(Status::Offline).await;
        if let Err(err) = self.transport.disconnect().await {
            warn!(error = %err, "transport disconnect failed");
        }
        self.state = LoopState::Disconnected;
        info!(
            ticks = self.stats.ticks,
            published = self.stats.published,
            failed = self.stats.failed,
            bytes = self.stats.bytes,
            "publish loop stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumicert_msg::InMemoryTransport;

    fn publish_loop(transport: &InMemoryTransport) -> PublishLoop {
        let mut config = AppConfig::default();
        config.simulation.seed = Some(1);
        PublishLoop::new(&config, Arc::new(transport.clone())).expect("valid config")
    }

    #[test]
    fn starts_disconnected_with_derived_topics() {
        let transport = InMemoryTransport::new();
        let publish_loop = publish_loop(&transport);
        assert_eq!(publish_loop.state(), LoopState::Disconnected);
        assert_eq!(publish_loop.topic(), "lumicert/telemetry");
        assert_eq!(publish_loop.status_topic(), "lumicert/telemetry/status");
        assert_eq!(publish_loop.stats(), PublishStats::default());
    }

    #[test]
    fn invalid_config_fails_before_any_tick() {
        let mut config = AppConfig::default();
        config.simulation.probabilities.theft = 1.5;
        let err = PublishLoop::new(&config, Arc::new(InMemoryTransport::new()))
            .err()
            .expect("probability out of range");
        assert!(matches!(err, ConfigError::Probability { name: "theft", .. }));
    }

    #[tokio::test]
    async fn tick_publishes_retained_at_least_once() {
        let transport = InMemoryTransport::new();
        transport.connect().await.expect("connect");
        let mut publish_loop = publish_loop(&transport);

        let report = publish_loop.tick().await;
        assert!(report.published);
        assert_eq!(report.tick, 1);
        assert_eq!(publish_loop.state(), LoopState::Running);

        let message = transport.recv().expect("telemetry");
        assert_eq!(message.topic, "lumicert/telemetry");
        assert_eq!(message.qos, DeliveryGuarantee::AtLeastOnce);
        assert!(message.retain);
        assert_eq!(publish_loop.stats().bytes, message.payload.len() as u64);
    }

    #[tokio::test]
    async fn publish_failure_is_counted_not_fatal() {
        let transport = InMemoryTransport::new();
        transport.connect().await.expect("connect");
        transport.fail_next_publishes(1);
        let mut publish_loop = publish_loop(&transport);

        assert!(!publish_loop.tick().await.published);
        assert!(publish_loop.tick().await.published);
        let stats = publish_loop.stats();
        assert_eq!((stats.ticks, stats.published, stats.failed), (2, 1, 1));
    }
}

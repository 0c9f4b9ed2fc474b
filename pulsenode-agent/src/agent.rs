//! Agent runtime loop
//!
//! One cooperative iteration: drain the session once, check the publish
//! timer, emit a snapshot when due, sweep stale peers, yield. All mutable
//! runtime state lives in `AgentState`, owned here and passed by borrow to
//! the components; a restart rebuilds it from defaults.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::dispatch::Dispatcher;
use crate::error::CycleError;
use crate::identity::Topics;
use crate::indicator::{self, Indicator};
use crate::link::{LinkSupervisor, NetLink};
use crate::peers::PeerRegistry;
use crate::publish::{self, PublishCycle};
use crate::rate::RateController;
use crate::session::Channel;
use crate::snapshot::{SystemDescriptors, SystemProbe};
use crate::ticks::{MonotonicClock, Tick};

/// End-of-iteration yield; caps CPU usage while keeping the control topic
/// responsive.
pub const LOOP_YIELD: Duration = Duration::from_millis(10);
/// Cooldown before re-entering the cycle after a loop failure.
pub const RESTART_COOLDOWN: Duration = Duration::from_secs(5);
/// Cooldown after a failed connection attempt.
pub const CONNECT_COOLDOWN: Duration = Duration::from_secs(10);

/// Mutable runtime state, rebuilt from defaults on every cycle entry.
#[derive(Debug)]
pub struct AgentState {
    pub rate: RateController,
    pub peers: PeerRegistry,
    pub cycle: PublishCycle,
}

impl AgentState {
    pub fn fresh(default_rate_ms: u32, start: Tick) -> Self {
        Self {
            rate: RateController::new(default_rate_ms),
            peers: PeerRegistry::new(),
            cycle: PublishCycle::new(start),
        }
    }
}

pub struct Agent<C, N: NetLink, P, I> {
    topics: Topics,
    dispatcher: Dispatcher,
    state: AgentState,
    descriptors: SystemDescriptors,
    channel: C,
    link: LinkSupervisor<N>,
    probe: P,
    indicator: I,
    clock: MonotonicClock,
    peer_ttl_ms: Option<u32>,
}

impl<C, N, P, I> Agent<C, N, P, I>
where
    C: Channel,
    N: NetLink,
    P: SystemProbe,
    I: Indicator,
{
    pub fn new(
        topics: Topics,
        channel: C,
        link: LinkSupervisor<N>,
        mut probe: P,
        indicator: I,
        default_rate_ms: u32,
        peer_ttl_ms: Option<u32>,
    ) -> Self {
        let clock = MonotonicClock::start();
        let state = AgentState::fresh(default_rate_ms, clock.now());
        let descriptors = probe.descriptors();

        Self {
            dispatcher: Dispatcher::new(topics.clone()),
            topics,
            state,
            descriptors,
            channel,
            link,
            probe,
            indicator,
            clock,
            peer_ttl_ms,
        }
    }

    /// Drive iterations until an error escapes; the caller handles the
    /// restart.
    pub async fn run(&mut self) -> Result<(), CycleError> {
        info!(
            "agent loop started (rate {}ms, peers {})",
            self.state.rate.current(),
            if self.peer_ttl_ms.is_some() {
                "tracked with ttl"
            } else {
                "tracked until restart"
            }
        );

        loop {
            let now = self.clock.now();
            self.iterate(now).await?;
            sleep(LOOP_YIELD).await;
        }
    }

    /// One cooperative iteration at the given tick.
    pub async fn iterate(&mut self, now: Tick) -> Result<(), CycleError> {
        // 1. Drain whatever the session has pending; one poll, in order.
        for message in self.channel.poll().await? {
            self.dispatcher
                .route(&message.topic, &message.payload, &mut self.state, now);
        }

        // 2. Publish when the interval has elapsed.
        let ip = self
            .link
            .address()
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let maybe = publish::maybe_snapshot(
            &mut self.state,
            now,
            &self.topics.client_id,
            &ip,
            self.link.signal_quality(),
            &self.descriptors,
            &mut self.probe,
        );
        if let Some(snapshot) = maybe {
            let payload = serde_json::to_vec(&snapshot)?;
            self.channel.publish(&self.topics.status, payload).await?;
            indicator::heartbeat_blip(&mut self.indicator).await;
            debug!("published status (uptime {}ms)", snapshot.uptime);
        }

        // 3. Age out peers when a TTL is configured.
        if let Some(ttl_ms) = self.peer_ttl_ms {
            let evicted = self.state.peers.sweep(now, ttl_ms);
            if evicted > 0 {
                info!("evicted {} stale peers", evicted);
            }
        }

        Ok(())
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectError, SessionError};
    use crate::indicator::testing::RecordingIndicator;
    use crate::session::Inbound;
    use crate::snapshot::RuntimeStats;
    use async_trait::async_trait;
    use pulsenode_devkit::payloads;
    use std::collections::VecDeque;

    struct ScriptedChannel {
        inbound: VecDeque<Vec<Inbound>>,
        published: Vec<(String, Vec<u8>)>,
    }

    impl ScriptedChannel {
        fn new() -> Self {
            Self {
                inbound: VecDeque::new(),
                published: Vec::new(),
            }
        }

        fn queue(&mut self, topic: &str, payload: Vec<u8>) {
            self.inbound.push_back(vec![Inbound {
                topic: topic.to_string(),
                payload,
            }]);
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        async fn subscribe(&mut self, _topic: &str) -> Result<(), SessionError> {
            Ok(())
        }

        async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), SessionError> {
            self.published.push((topic.to_string(), payload));
            Ok(())
        }

        async fn poll(&mut self) -> Result<Vec<Inbound>, SessionError> {
            Ok(self.inbound.pop_front().unwrap_or_default())
        }
    }

    struct AlwaysUp;

    impl NetLink for AlwaysUp {
        fn bring_up(&mut self, _static_ip: Option<&str>) -> Result<(), ConnectError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn address(&self) -> Option<String> {
            Some("10.10.1.19".to_string())
        }
        fn signal_quality(&self) -> Option<i64> {
            Some(-54)
        }
    }

    struct FixedProbe;

    impl SystemProbe for FixedProbe {
        fn descriptors(&mut self) -> SystemDescriptors {
            SystemDescriptors {
                sysname: "linux".to_string(),
                release: "6.1.0".to_string(),
                version: "#1 SMP".to_string(),
                machine: "x86_64".to_string(),
                hostname: "bench".to_string(),
                unique_id: "a1b2c3d4e5f6".to_string(),
            }
        }

        fn stats(&mut self) -> RuntimeStats {
            RuntimeStats {
                free_ram: 1_048_576,
                storage_id: "sda".to_string(),
                cpu_freq: 1_800,
            }
        }
    }

    type TestAgent = Agent<ScriptedChannel, AlwaysUp, FixedProbe, RecordingIndicator>;

    fn agent(peer_ttl_ms: Option<u32>) -> TestAgent {
        let topics = Topics::new("pulsenode", "node-0");
        let mut link = LinkSupervisor::new(AlwaysUp);
        link.mark_session();
        Agent::new(
            topics,
            ScriptedChannel::new(),
            link,
            FixedProbe,
            RecordingIndicator::default(),
            crate::rate::DEFAULT_RATE_MS,
            peer_ttl_ms,
        )
    }

    fn t(ms: u32) -> Tick {
        Tick::from_millis(ms)
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_on_the_default_interval() {
        let mut agent = agent(None);

        agent.iterate(t(100)).await.unwrap();
        assert!(agent.channel.published.is_empty());

        agent.iterate(t(2_000)).await.unwrap();
        assert_eq!(agent.channel.published.len(), 1);

        let (topic, payload) = &agent.channel.published[0];
        assert_eq!(topic, "pulsenode/node-0");
        let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(value["client_id"], "node-0");
        assert_eq!(value["rate"], 2_000);
        assert_eq!(value["ip"], "10.10.1.19");
        assert_eq!(value["system"]["uniqueId"], "a1b2c3d4e5f6");
    }

    #[tokio::test(start_paused = true)]
    async fn remote_rate_update_stretches_the_interval() {
        let mut agent = agent(None);

        // First publish on the 2000ms default.
        agent.iterate(t(2_000)).await.unwrap();
        assert_eq!(agent.channel.published.len(), 1);

        // Remote update to 10000ms arrives on the control topic.
        agent
            .channel
            .queue("pulsenode/updateRate", payloads::rate_update(10_000));
        agent.iterate(t(2_100)).await.unwrap();
        assert_eq!(agent.state().rate.current(), 10_000);

        // 2000ms after the last publish: must NOT fire any more.
        agent.iterate(t(4_000)).await.unwrap();
        agent.iterate(t(11_999)).await.unwrap();
        assert_eq!(agent.channel.published.len(), 1);

        // 10000ms after the last publish: fires.
        agent.iterate(t(12_000)).await.unwrap();
        assert_eq!(agent.channel.published.len(), 2);

        let (_, payload) = &agent.channel.published[1];
        let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(value["rate"], 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn peers_are_tracked_and_self_is_not() {
        let mut agent = agent(None);

        agent.channel.queue(
            "pulsenode/node-7",
            payloads::status("node-7", "10.10.1.26", 2_000),
        );
        agent.iterate(t(100)).await.unwrap();

        agent.channel.queue(
            "pulsenode/node-0",
            payloads::status("node-0", "10.10.1.19", 2_000),
        );
        agent.iterate(t(200)).await.unwrap();

        assert_eq!(agent.state().peers.len(), 1);
        assert!(agent.state().peers.get("node-7").is_some());
        assert!(agent.state().peers.get("node-0").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn configured_ttl_evicts_silent_peers() {
        let mut agent = agent(Some(5_000));

        agent.channel.queue(
            "pulsenode/node-7",
            payloads::status("node-7", "10.10.1.26", 2_000),
        );
        agent.iterate(t(100)).await.unwrap();
        assert_eq!(agent.state().peers.len(), 1);

        agent.iterate(t(4_000)).await.unwrap();
        assert_eq!(agent.state().peers.len(), 1);

        agent.iterate(t(5_200)).await.unwrap();
        assert!(agent.state().peers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_blips_on_publish() {
        let mut agent = agent(None);
        agent.iterate(t(2_000)).await.unwrap();
        assert_eq!(agent.indicator.transitions, vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_traffic_never_aborts_the_iteration() {
        let mut agent = agent(None);

        agent.channel.queue("pulsenode/updateRate", b"warp".to_vec());
        agent.iterate(t(100)).await.unwrap();
        agent.channel.queue("pulsenode/node-7", b"{oops".to_vec());
        agent.iterate(t(200)).await.unwrap();

        assert_eq!(agent.state().rate.current(), crate::rate::DEFAULT_RATE_MS);
        assert!(agent.state().peers.is_empty());

        // The loop keeps publishing afterwards.
        agent.iterate(t(2_000)).await.unwrap();
        assert_eq!(agent.channel.published.len(), 1);
    }
}

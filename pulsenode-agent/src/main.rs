//! Pulsenode Agent - device telemetry over MQTT
//!
//! The agent associates to the network, opens an MQTT session, then runs a
//! single-threaded cooperative loop: publish a status snapshot on a
//! remotely adjustable interval, react to control messages, track peer
//! nodes announcing themselves under the namespace. Connectivity failures
//! restart the whole cycle with fresh state after a cooldown; there is no
//! partial-recovery path.

mod agent;
mod config;
mod dispatch;
mod error;
mod identity;
mod indicator;
mod link;
mod peers;
mod publish;
mod rate;
mod session;
mod snapshot;
mod ticks;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use agent::{Agent, CONNECT_COOLDOWN, RESTART_COOLDOWN};
use config::AgentConfig;
use error::CycleError;
use identity::{DeviceIdentity, Topics};
use link::{HostNetwork, LinkSupervisor};
use session::{Channel, MqttChannel};
use snapshot::HostProbe;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("pulsenode agent v{} starting", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load()
        .await
        .context("failed to load configuration")?;
    let identity = DeviceIdentity::derive(&config).context("failed to derive device identity")?;

    loop {
        match cycle(&config, &identity).await {
            Ok(()) => {
                error!("agent loop exited unexpectedly, restarting");
                sleep(RESTART_COOLDOWN).await;
            }
            Err(CycleError::Connect(e)) => {
                error!("connection failed: {}", e);
                sleep(CONNECT_COOLDOWN).await;
            }
            Err(e) => {
                error!("agent cycle failed: {}", e);
                sleep(RESTART_COOLDOWN).await;
            }
        }
        info!("restarting cycle with fresh state");
    }
}

/// One full cycle: blink, associate, open the session, run the loop. Every
/// entry starts from defaults; nothing survives a restart.
async fn cycle(config: &AgentConfig, identity: &DeviceIdentity) -> Result<(), CycleError> {
    let mut indicator = indicator::from_config(&config.telemetry.led);
    indicator::startup_blink(indicator.as_mut()).await;

    let mut link = LinkSupervisor::new(HostNetwork::new());
    link.associate(indicator.as_mut(), identity.static_ip.as_deref())
        .await?;

    let topics = Topics::new(&config.device.namespace, &identity.client_id);
    let channel = match open_session(config, identity, &topics).await {
        Ok(channel) => channel,
        Err(e) => {
            link.mark_failed();
            return Err(error::ConnectError::Session(e).into());
        }
    };
    link.mark_session();
    indicator.set(true);

    let peer_ttl_ms = config
        .telemetry
        .peer_ttl_secs
        .map(|secs| secs.saturating_mul(1_000).min(u32::MAX as u64) as u32);

    let mut agent = Agent::new(
        topics,
        channel,
        link,
        HostProbe::new(&identity.unique_id),
        indicator,
        config.telemetry.default_rate_ms,
        peer_ttl_ms,
    );

    agent.run().await
}

/// Open the MQTT session and subscribe to the routable topics. Failure
/// here after a successful association is fatal for the cycle.
async fn open_session(
    config: &AgentConfig,
    identity: &DeviceIdentity,
    topics: &Topics,
) -> Result<MqttChannel, error::SessionError> {
    let mut channel = MqttChannel::connect(identity, &config.mqtt).await?;
    channel.subscribe(&topics.control).await?;
    if config.telemetry.peer_tracking {
        channel.subscribe(&topics.peer_wildcard).await?;
    }
    Ok(channel)
}

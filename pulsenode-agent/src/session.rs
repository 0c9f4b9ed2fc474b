//! Messaging session
//!
//! Thin seam over the MQTT client. The agent loop never touches rumqttc
//! directly: it drains `poll` once per iteration and publishes through
//! `publish`, so tests can substitute a scripted channel.

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::error::SessionError;
use crate::identity::DeviceIdentity;

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Messaging collaborator. `poll` makes at most one underlying library
/// poll per call and never blocks past its window.
#[async_trait]
pub trait Channel {
    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError>;
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), SessionError>;
    async fn poll(&mut self) -> Result<Vec<Inbound>, SessionError>;
}

/// How long one event-loop poll may wait for traffic before the iteration
/// moves on. Keeps the control topic responsive at any publish rate.
pub const POLL_WINDOW: Duration = Duration::from_millis(10);

const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MqttChannel {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttChannel {
    /// Open the session and wait for the broker's acknowledgment.
    pub async fn connect(
        identity: &DeviceIdentity,
        config: &MqttConfig,
    ) -> Result<Self, SessionError> {
        info!(
            "connecting to broker {}:{} as {}",
            config.broker_host, config.broker_port, identity.client_id
        );

        let mut options = MqttOptions::new(
            &identity.client_id,
            &config.broker_host,
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs as u64));
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, 16);

        let connack = timeout(CONNACK_TIMEOUT, Self::await_connack(&mut eventloop))
            .await
            .map_err(|_| SessionError::ConnAckTimeout)??;

        if connack.code != ConnectReturnCode::Success {
            return Err(SessionError::Refused(connack.code));
        }

        info!("session established");
        Ok(Self { client, eventloop })
    }

    async fn await_connack(eventloop: &mut EventLoop) -> Result<rumqttc::ConnAck, SessionError> {
        loop {
            match eventloop.poll().await? {
                Event::Incoming(Incoming::ConnAck(ack)) => return Ok(ack),
                event => debug!("pre-connack event: {:?}", event),
            }
        }
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        info!("subscribed to {}", topic);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), SessionError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn poll(&mut self) -> Result<Vec<Inbound>, SessionError> {
        match timeout(POLL_WINDOW, self.eventloop.poll()).await {
            // Nothing pending inside the window.
            Err(_) => Ok(Vec::new()),
            Ok(Ok(Event::Incoming(Incoming::Publish(publish)))) => Ok(vec![Inbound {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }]),
            Ok(Ok(_)) => Ok(Vec::new()),
            Ok(Err(e)) => {
                warn!("session poll failed: {}", e);
                Err(e.into())
            }
        }
    }
}

//! Inbound message dispatcher
//!
//! Routes each delivered (topic, payload) pair exactly once, in delivery
//! order. First match wins: the control topic feeds the rate controller,
//! single-level namespace topics from other senders feed the peer registry,
//! everything else is ignored. Handler failures are validation-tier: logged,
//! state untouched, processing continues.

use tracing::{debug, info, warn};

use crate::agent::AgentState;
use crate::identity::Topics;
use crate::ticks::Tick;

#[derive(Debug)]
pub struct Dispatcher {
    topics: Topics,
}

impl Dispatcher {
    pub fn new(topics: Topics) -> Self {
        Self { topics }
    }

    pub fn route(&self, topic: &str, payload: &[u8], state: &mut AgentState, now: Tick) {
        if topic == self.topics.control {
            match state.rate.try_update(payload) {
                Ok(ms) => info!("publish rate updated to {}ms", ms),
                Err(e) => warn!("rejected rate update: {}", e),
            }
            return;
        }

        if let Some(sender) = self.topics.peer_sender(topic) {
            if sender == self.topics.client_id {
                // Own status echoed back through the wildcard subscription.
                debug!("ignoring self-announcement");
                return;
            }
            match state.peers.observe(sender, payload, now) {
                Ok(()) => debug!("peer {} seen ({} tracked)", sender, state.peers.len()),
                Err(e) => warn!("dropped announcement from {}: {}", sender, e),
            }
            return;
        }

        debug!("ignoring message on unrouted topic {}", topic);
    }
}

//! Peer registry
//!
//! Last-known status of the other nodes announcing themselves under the
//! namespace, keyed by sender id. Each announcement fully replaces the
//! previous record. Peer state is advisory only; nothing in the agent acts
//! on it.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::PeerError;
use crate::ticks::Tick;

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub payload: Value,
    pub last_seen: Tick,
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the record for `sender`. A payload that
    /// fails JSON decode leaves the registry unchanged for that sender.
    pub fn observe(&mut self, sender: &str, payload: &[u8], now: Tick) -> Result<(), PeerError> {
        let value: Value = serde_json::from_slice(payload)?;
        self.peers.insert(
            sender.to_string(),
            PeerRecord {
                payload: value,
                last_seen: now,
            },
        );
        Ok(())
    }

    /// Evict peers unseen for longer than `ttl_ms`. Returns the eviction
    /// count. Only called when a TTL is configured; without one the
    /// registry grows until restart.
    pub fn sweep(&mut self, now: Tick, ttl_ms: u32) -> usize {
        let before = self.peers.len();
        self.peers.retain(|sender, record| {
            let stale = now.since(record.last_seen) > ttl_ms;
            if stale {
                debug!("evicting stale peer {}", sender);
            }
            !stale
        });
        before - self.peers.len()
    }

    pub fn get(&self, sender: &str) -> Option<&PeerRecord> {
        self.peers.get(sender)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

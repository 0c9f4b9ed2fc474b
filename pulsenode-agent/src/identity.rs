//! Device identity and topic naming
//!
//! This module handles:
//! - Client id selection (explicit config or index-derived)
//! - Unique hardware id from the primary MAC (Ethernet > WiFi > other)
//! - Static IP derivation from the fleet addressing scheme
//! - The namespace topic layout shared with every peer

use anyhow::{Context, Result};
use if_addrs::{get_if_addrs, IfAddr};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;

/// Immutable per-device identity. Created once at startup, never mutated.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub client_id: String,
    /// Primary MAC with colons stripped; random fallback when no
    /// interface carries one.
    pub unique_id: String,
    pub index: u8,
    /// Address the device should hold when a static profile is configured.
    pub static_ip: Option<String>,
}

impl DeviceIdentity {
    pub fn derive(config: &AgentConfig) -> Result<Self> {
        let index = config.device.index;

        let client_id = config
            .device
            .client_id
            .clone()
            .unwrap_or_else(|| format!("node-{index}"));

        let unique_id = primary_mac_id().unwrap_or_else(|| {
            warn!("no MAC address found, falling back to a random unique id");
            uuid::Uuid::new_v4().simple().to_string()
        });

        let static_ip = config
            .network
            .static_profile
            .as_ref()
            .map(|profile| format!("{}{}", profile.prefix, 19 + index as u16));

        info!(
            "device identity: client_id={} unique_id={} index={}",
            client_id, unique_id, index
        );

        Ok(Self {
            client_id,
            unique_id,
            index,
            static_ip,
        })
    }
}

/// Interface name prefixes in primary-selection order.
const ETHERNET_PREFIXES: &[&str] = &["eth", "en", "ens", "enp", "eno"];
const WIRELESS_PREFIXES: &[&str] = &["wlan", "wlp", "wlo", "wifi"];

fn primary_mac_id() -> Option<String> {
    let if_addrs = get_if_addrs()
        .context("failed to enumerate network interfaces")
        .map_err(|e| warn!("{e:#}"))
        .ok()?;

    let mut ethernet = None;
    let mut wireless = None;
    let mut other = None;

    for iface in if_addrs {
        if iface.is_loopback() {
            continue;
        }
        let Some(mac) = interface_mac(&iface.name) else {
            continue;
        };
        debug!("found interface {} ({})", iface.name, mac);

        let name = iface.name.to_lowercase();
        if ETHERNET_PREFIXES.iter().any(|p| name.starts_with(p))
            && !WIRELESS_PREFIXES.iter().any(|p| name.starts_with(p))
        {
            ethernet.get_or_insert(mac);
        } else if WIRELESS_PREFIXES.iter().any(|p| name.starts_with(p)) {
            wireless.get_or_insert(mac);
        } else {
            other.get_or_insert(mac);
        }
    }

    ethernet.or(wireless).or(other)
}

fn interface_mac(name: &str) -> Option<String> {
    match mac_address::mac_address_by_name(name) {
        Ok(Some(mac)) => {
            let b = mac.bytes();
            Some(format!(
                "{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                b[0], b[1], b[2], b[3], b[4], b[5]
            ))
        }
        Ok(None) => None,
        Err(e) => {
            debug!("error getting MAC for {}: {}", name, e);
            None
        }
    }
}

/// Topic layout under the fleet namespace.
///
/// Status goes to `<namespace>/<client_id>`, rate updates arrive on
/// `<namespace>/updateRate`, and the peer wildcard covers every device
/// status topic under the namespace.
#[derive(Debug, Clone)]
pub struct Topics {
    pub client_id: String,
    pub status: String,
    pub control: String,
    pub peer_wildcard: String,
    namespace: String,
}

impl Topics {
    pub fn new(namespace: &str, client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            status: format!("{namespace}/{client_id}"),
            control: format!("{namespace}/updateRate"),
            peer_wildcard: format!("{namespace}/+"),
            namespace: namespace.to_string(),
        }
    }

    /// Sender id for a peer-announcement topic, i.e. a single level
    /// directly under the namespace. Returns None for anything else.
    pub fn peer_sender<'t>(&self, topic: &'t str) -> Option<&'t str> {
        let rest = topic
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix('/')?;
        if rest.is_empty() || rest.contains('/') {
            return None;
        }
        Some(rest)
    }
}

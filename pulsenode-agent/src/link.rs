//! Connection supervision
//!
//! Brings the network link up with bounded association polling, then hands
//! over to the session layer. Owns the connection state machine:
//! Disconnected -> LinkUp -> SessionEstablished -> Failed -> (restart).

use if_addrs::{get_if_addrs, IfAddr};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::ConnectError;
use crate::indicator::Indicator;

pub const ASSOCIATION_ATTEMPTS: u32 = 15;
pub const ASSOCIATION_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    LinkUp,
    SessionEstablished,
    Failed,
}

/// Network link collaborator.
pub trait NetLink {
    /// Activate the interface, applying the static address profile first
    /// when one is supplied.
    fn bring_up(&mut self, static_ip: Option<&str>) -> Result<(), ConnectError>;
    fn is_connected(&self) -> bool;
    fn address(&self) -> Option<String>;
    /// Signal level in dBm, when the link reports one.
    fn signal_quality(&self) -> Option<i64>;
}

#[derive(Debug)]
pub struct LinkSupervisor<N: NetLink> {
    net: N,
    state: ConnectionState,
}

impl<N: NetLink> LinkSupervisor<N> {
    pub fn new(net: N) -> Self {
        Self {
            net,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Poll for association at one-second intervals up to the attempt
    /// ceiling, toggling the indicator each attempt.
    pub async fn associate<I: Indicator + ?Sized>(
        &mut self,
        indicator: &mut I,
        static_ip: Option<&str>,
    ) -> Result<(), ConnectError> {
        self.state = ConnectionState::Disconnected;
        if let Err(e) = self.net.bring_up(static_ip) {
            self.state = ConnectionState::Failed;
            return Err(e);
        }

        let mut led_on = false;
        for attempt in 1..=ASSOCIATION_ATTEMPTS {
            if self.net.is_connected() {
                self.state = ConnectionState::LinkUp;
                info!(
                    "network link up, address {}",
                    self.net.address().unwrap_or_else(|| "unknown".to_string())
                );
                return Ok(());
            }
            led_on = !led_on;
            indicator.set(led_on);
            debug!(
                "waiting for association (attempt {}/{})",
                attempt, ASSOCIATION_ATTEMPTS
            );
            sleep(ASSOCIATION_POLL).await;
        }

        if self.net.is_connected() {
            self.state = ConnectionState::LinkUp;
            return Ok(());
        }

        self.state = ConnectionState::Failed;
        Err(ConnectError::LinkTimeout {
            attempts: ASSOCIATION_ATTEMPTS,
        })
    }

    /// Record that the messaging session is open and subscribed.
    pub fn mark_session(&mut self) {
        self.state = ConnectionState::SessionEstablished;
    }

    pub fn mark_failed(&mut self) {
        self.state = ConnectionState::Failed;
    }

    pub fn address(&self) -> Option<String> {
        self.net.address()
    }

    pub fn signal_quality(&self) -> Option<i64> {
        self.net.signal_quality()
    }
}

/// Link backed by the host's network stack. The host cannot reconfigure
/// its interfaces from here, so a configured static address pins the
/// advertised address instead; association means an interface holds a
/// routable IPv4 address.
#[derive(Debug, Default)]
pub struct HostNetwork {
    pinned_address: Option<String>,
}

impl HostNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn first_ipv4() -> Option<String> {
        let if_addrs = get_if_addrs().ok()?;
        if_addrs
            .iter()
            .filter(|iface| !iface.is_loopback())
            .find_map(|iface| match &iface.addr {
                IfAddr::V4(v4) => Some(v4.ip.to_string()),
                IfAddr::V6(_) => None,
            })
    }
}

impl NetLink for HostNetwork {
    fn bring_up(&mut self, static_ip: Option<&str>) -> Result<(), ConnectError> {
        get_if_addrs().map_err(|e| ConnectError::Interface(e.to_string()))?;
        if let Some(ip) = static_ip {
            debug!("pinning advertised address to static profile {}", ip);
            self.pinned_address = Some(ip.to_string());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        Self::first_ipv4().is_some()
    }

    fn address(&self) -> Option<String> {
        self.pinned_address.clone().or_else(Self::first_ipv4)
    }

    fn signal_quality(&self) -> Option<i64> {
        if cfg!(target_os = "linux") {
            let content = std::fs::read_to_string("/proc/net/wireless").ok()?;
            parse_wireless_level(&content)
        } else {
            None
        }
    }
}

/// Signal level (dBm) of the first interface in /proc/net/wireless.
fn parse_wireless_level(content: &str) -> Option<i64> {
    let line = content.lines().nth(2)?;
    let fields: Vec<&str> = line.split(':').nth(1)?.split_whitespace().collect();
    let level = fields.get(2)?.trim_end_matches('.');
    match level.parse::<f64>() {
        Ok(v) => Some(v as i64),
        Err(e) => {
            warn!("unparseable wireless level {:?}: {}", level, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::testing::RecordingIndicator;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeLink {
        polls_until_up: Rc<Cell<u32>>,
        fail_bring_up: bool,
    }

    impl NetLink for FakeLink {
        fn bring_up(&mut self, _static_ip: Option<&str>) -> Result<(), ConnectError> {
            if self.fail_bring_up {
                return Err(ConnectError::Interface("no such device".to_string()));
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            if self.polls_until_up.get() == 0 {
                true
            } else {
                self.polls_until_up.set(self.polls_until_up.get() - 1);
                false
            }
        }

        fn address(&self) -> Option<String> {
            Some("10.10.1.19".to_string())
        }

        fn signal_quality(&self) -> Option<i64> {
            Some(-56)
        }
    }

    fn fake(polls_until_up: u32) -> FakeLink {
        FakeLink {
            polls_until_up: Rc::new(Cell::new(polls_until_up)),
            fail_bring_up: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn associates_after_a_few_polls() {
        let mut supervisor = LinkSupervisor::new(fake(3));
        let mut led = RecordingIndicator::default();

        supervisor.associate(&mut led, None).await.unwrap();
        assert_eq!(supervisor.state(), ConnectionState::LinkUp);
        // One toggle per failed poll.
        assert_eq!(led.transitions, vec![true, false, true]);

        supervisor.mark_session();
        assert_eq!(supervisor.state(), ConnectionState::SessionEstablished);
    }

    #[tokio::test(start_paused = true)]
    async fn association_attempts_are_bounded() {
        let mut supervisor = LinkSupervisor::new(fake(u32::MAX));
        let mut led = RecordingIndicator::default();

        let err = supervisor.associate(&mut led, None).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectError::LinkTimeout {
                attempts: ASSOCIATION_ATTEMPTS
            }
        ));
        assert_eq!(supervisor.state(), ConnectionState::Failed);
        assert_eq!(led.transitions.len(), ASSOCIATION_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn bring_up_failure_is_fatal() {
        let mut link = fake(0);
        link.fail_bring_up = true;
        let mut supervisor = LinkSupervisor::new(link);
        let mut led = RecordingIndicator::default();

        let err = supervisor.associate(&mut led, None).await.unwrap_err();
        assert!(matches!(err, ConnectError::Interface(_)));
        assert_eq!(supervisor.state(), ConnectionState::Failed);
    }

    #[test]
    fn parses_proc_net_wireless() {
        let sample = "\
Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
 face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
 wlan0: 0000   60.  -56.  -256        0      0      0      0      0        0
";
        assert_eq!(parse_wireless_level(sample), Some(-56));
    }

    #[test]
    fn missing_wireless_table_yields_none() {
        let sample = "\
Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
 face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
";
        assert_eq!(parse_wireless_level(sample), None);
    }
}

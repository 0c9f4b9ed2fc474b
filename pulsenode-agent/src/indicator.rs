//! Visual indicator
//!
//! A binary signal: steady while the session is up, toggled during
//! association, a brief blip on every publish. Indicator failures are never
//! load-bearing; a device without an LED runs with the null indicator.

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

pub const STARTUP_BLINK_CYCLES: u32 = 5;
pub const STARTUP_BLINK_STEP: Duration = Duration::from_millis(100);
pub const HEARTBEAT_BLIP: Duration = Duration::from_millis(20);

pub trait Indicator {
    fn set(&mut self, on: bool);
}

/// LED exposed through /sys/class/leds. Write failures are logged at debug
/// and otherwise ignored.
pub struct SysfsLed {
    brightness: PathBuf,
}

impl SysfsLed {
    pub fn new(name: &str) -> Self {
        Self {
            brightness: PathBuf::from(format!("/sys/class/leds/{name}/brightness")),
        }
    }
}

impl Indicator for SysfsLed {
    fn set(&mut self, on: bool) {
        if let Err(e) = std::fs::write(&self.brightness, if on { "1" } else { "0" }) {
            debug!("indicator write failed: {}", e);
        }
    }
}

pub struct NullIndicator;

impl Indicator for NullIndicator {
    fn set(&mut self, _on: bool) {}
}

impl Indicator for Box<dyn Indicator + Send> {
    fn set(&mut self, on: bool) {
        (**self).set(on)
    }
}

pub fn from_config(led: &Option<String>) -> Box<dyn Indicator + Send> {
    match led {
        Some(name) => Box::new(SysfsLed::new(name)),
        None => Box::new(NullIndicator),
    }
}

/// Rapid blink self-test before association.
pub async fn startup_blink<I: Indicator + ?Sized>(indicator: &mut I) {
    for _ in 0..STARTUP_BLINK_CYCLES {
        indicator.set(true);
        sleep(STARTUP_BLINK_STEP).await;
        indicator.set(false);
        sleep(STARTUP_BLINK_STEP).await;
    }
}

/// Brief off/on pulse alongside a successful publish. Bounded, then the
/// indicator returns to steady.
pub async fn heartbeat_blip<I: Indicator + ?Sized>(indicator: &mut I) {
    indicator.set(false);
    sleep(HEARTBEAT_BLIP).await;
    indicator.set(true);
}

//! Publish-rate controller
//!
//! Holds the current publish interval. Remote updates arrive as a bare
//! decimal integer in UTF-8 text; anything unparseable or outside the safe
//! bounds is rejected without touching the stored rate.

use crate::error::RateError;

/// Safety limits: 100ms to 1 hour.
pub const RATE_FLOOR_MS: u32 = 100;
pub const RATE_CEIL_MS: u32 = 3_600_000;
pub const DEFAULT_RATE_MS: u32 = 2_000;

#[derive(Debug)]
pub struct RateController {
    rate_ms: u32,
}

impl RateController {
    pub fn new(initial_ms: u32) -> Self {
        Self {
            rate_ms: initial_ms.clamp(RATE_FLOOR_MS, RATE_CEIL_MS),
        }
    }

    pub fn current(&self) -> u32 {
        self.rate_ms
    }

    /// Validate and apply a remote rate update. The prior rate stays
    /// authoritative on any failure.
    pub fn try_update(&mut self, raw: &[u8]) -> Result<u32, RateError> {
        let text = std::str::from_utf8(raw).map_err(|_| RateError::NotANumber)?;
        let value: i64 = text.trim().parse().map_err(|_| RateError::NotANumber)?;

        if value < RATE_FLOOR_MS as i64 || value > RATE_CEIL_MS as i64 {
            return Err(RateError::OutOfBounds(value));
        }

        self.rate_ms = value as u32;
        Ok(self.rate_ms)
    }
}

impl Default for RateController {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_MS)
    }
}

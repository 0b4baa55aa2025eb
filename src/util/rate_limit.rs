//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Create a limiter that admits one request per `period`
pub fn create_interval_limiter(period: Duration) -> Arc<Limiter> {
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max WebSocket messages per second per connection (input + fire + control)
pub const MESSAGE_RATE_LIMIT: u32 = 150;

/// Minimum spacing between accepted fire packets
pub const FIRE_PACKET_INTERVAL: Duration = Duration::from_millis(30);

/// Dropped fire packets per second tolerated before the connection is cut
pub const FIRE_VIOLATION_BUDGET: u32 = 40;

/// Verdict for an incoming fire packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireVerdict {
    Allowed,
    Dropped,
    Abusive,
}

/// Per-connection rate limiter state. Dropped with the connection.
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    message_limiter: Arc<Limiter>,
    fire_limiter: Arc<Limiter>,
    fire_violations: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self {
            message_limiter: create_limiter(MESSAGE_RATE_LIMIT),
            fire_limiter: create_interval_limiter(FIRE_PACKET_INTERVAL),
            fire_violations: create_limiter(FIRE_VIOLATION_BUDGET),
        }
    }

    /// Check if any message is allowed (returns true if allowed)
    pub fn check_message(&self) -> bool {
        self.message_limiter.check().is_ok()
    }

    /// Check a fire packet. Packets inside the interval are dropped; once the
    /// drop budget is also spent the sender is treated as flooding.
    pub fn check_fire(&self) -> FireVerdict {
        if self.fire_limiter.check().is_ok() {
            return FireVerdict::Allowed;
        }
        if self.fire_violations.check().is_ok() {
            FireVerdict::Dropped
        } else {
            FireVerdict::Abusive
        }
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_back_to_back_is_dropped() {
        let limiter = ConnectionRateLimiter::new();
        assert_eq!(limiter.check_fire(), FireVerdict::Allowed);
        assert_eq!(limiter.check_fire(), FireVerdict::Dropped);
    }

    #[test]
    fn test_fire_flood_becomes_abusive() {
        let limiter = ConnectionRateLimiter::new();
        assert_eq!(limiter.check_fire(), FireVerdict::Allowed);

        let mut verdicts = Vec::new();
        for _ in 0..(FIRE_VIOLATION_BUDGET + 5) {
            verdicts.push(limiter.check_fire());
        }
        assert!(verdicts.contains(&FireVerdict::Dropped));
        assert_eq!(verdicts.last(), Some(&FireVerdict::Abusive));
    }

    #[test]
    fn test_fire_allowed_after_interval() {
        let limiter = ConnectionRateLimiter::new();
        assert_eq!(limiter.check_fire(), FireVerdict::Allowed);
        std::thread::sleep(FIRE_PACKET_INTERVAL + Duration::from_millis(10));
        assert_eq!(limiter.check_fire(), FireVerdict::Allowed);
    }

    #[test]
    fn test_message_limit_burst() {
        let limiter = ConnectionRateLimiter::new();
        let allowed = (0..MESSAGE_RATE_LIMIT + 20)
            .filter(|_| limiter.check_message())
            .count();
        assert!(allowed <= MESSAGE_RATE_LIMIT as usize + 1);
        assert!(allowed >= MESSAGE_RATE_LIMIT as usize);
    }
}

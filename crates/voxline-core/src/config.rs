//! Relay configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::application::relay::RoutingPolicy;

/// Port the browser client dials by default.
pub const DEFAULT_PORT: u16 = 9098;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub routing: RoutingPolicy,
    /// Frames queued per audio recipient before the oldest is dropped.
    pub audio_queue_capacity: usize,
    /// Envelopes queued per signaling recipient before new ones are refused.
    pub signal_queue_capacity: usize,
    /// How often the server pings each connection.
    pub heartbeat_interval: Duration,
    /// Silence after which a connection is considered abandoned.
    pub idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            routing: RoutingPolicy::Broadcast,
            audio_queue_capacity: 32,
            signal_queue_capacity: 64,
            heartbeat_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(45),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio_queue_capacity == 0 || self.signal_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeat);
        }
        if self.idle_timeout <= self.heartbeat_interval {
            return Err(ConfigError::IdleTimeoutTooShort {
                idle_timeout: self.idle_timeout,
                heartbeat_interval: self.heartbeat_interval,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("queue capacities must be at least 1")]
    ZeroCapacity,
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeat,
    #[error("idle timeout ({idle_timeout:?}) must exceed the heartbeat interval ({heartbeat_interval:?})")]
    IdleTimeoutTooShort {
        idle_timeout: Duration,
        heartbeat_interval: Duration,
    },
}

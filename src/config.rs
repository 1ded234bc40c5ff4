//! Typed switch configuration

use std::time::Duration;

use crate::control::{PortId, DEFAULT_MAC_AGING_TIMEOUT, DEFAULT_SWEEP_INTERVAL_MS, MAX_MAC_COUNT};
use crate::error::ConfigError;

/// Default depth of the capture queue between a port's capture thread and its engine.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchConfig {
    /// Device bound to port A.
    pub port_a: String,
    /// Device bound to port B.
    pub port_b: String,
    /// Idle time after which a learned mac is evicted.
    pub timeout: Duration,
    /// Period of the aging sweeper.
    pub sweep_interval: Duration,
    pub max_entries: usize,
    pub channel_capacity: usize,
}

impl SwitchConfig {
    /// Build and validate a configuration. `timeout_secs` may be fractional.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use tapswitch::config::SwitchConfig;
    ///
    /// let config = SwitchConfig::new("eth0", "eth1", 2.5, 200).unwrap();
    /// assert_eq!(config.timeout, Duration::from_millis(2500));
    /// assert_eq!(config.sweep_interval, Duration::from_millis(200));
    ///
    /// assert!(SwitchConfig::new("eth0", "eth0", 2.5, 200).is_err());
    /// assert!(SwitchConfig::new("eth0", "eth1", -1.0, 200).is_err());
    /// ```
    pub fn new(
        port_a: impl Into<String>,
        port_b: impl Into<String>,
        timeout_secs: f64,
        sweep_interval_ms: u64,
    ) -> Result<SwitchConfig, ConfigError> {
        let port_a = port_a.into();
        let port_b = port_b.into();

        if port_a.is_empty() {
            return Err(ConfigError::EmptyDevice(PortId::PortA));
        }
        if port_b.is_empty() {
            return Err(ConfigError::EmptyDevice(PortId::PortB));
        }
        if port_a == port_b {
            return Err(ConfigError::SamePort(port_a));
        }

        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            return Err(ConfigError::InvalidTimeout(timeout_secs));
        }
        let timeout = Duration::try_from_secs_f64(timeout_secs)
            .map_err(|_| ConfigError::InvalidTimeout(timeout_secs))?;

        if sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidSweepInterval);
        }

        Ok(SwitchConfig {
            port_a,
            port_b,
            timeout,
            sweep_interval: Duration::from_millis(sweep_interval_ms),
            max_entries: MAX_MAC_COUNT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        })
    }

    /// Configuration with the default aging timeout and sweep interval.
    pub fn with_defaults(port_a: impl Into<String>, port_b: impl Into<String>) -> Result<SwitchConfig, ConfigError> {
        SwitchConfig::new(port_a, port_b, DEFAULT_MAC_AGING_TIMEOUT, DEFAULT_SWEEP_INTERVAL_MS)
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Result<SwitchConfig, ConfigError> {
        if max_entries == 0 {
            return Err(ConfigError::ZeroLimit("max entries"));
        }
        self.max_entries = max_entries;
        Ok(self)
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Result<SwitchConfig, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroLimit("channel capacity"));
        }
        self.channel_capacity = capacity;
        Ok(self)
    }

    pub fn device(&self, port: PortId) -> &str {
        match port {
            PortId::PortA => &self.port_a,
            PortId::PortB => &self.port_b,
        }
    }
}

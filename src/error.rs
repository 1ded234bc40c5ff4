//! Error types of the switch core and its startup collaborators.
//!
//! Frame and sink errors are per-frame: they are logged and the frame is dropped,
//! but they never stop a forwarding loop. Config and interface errors only happen
//! during startup, before any loop runs.

use thiserror::Error;

use crate::control::PortId;

/// Top level error alias used by the binary.
pub type Error = Box<dyn std::error::Error + Sync + Send>;

/// A captured buffer that cannot carry an ethernet header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: {len} bytes, ethernet header needs 14")]
    Malformed { len: usize },
}

/// Transmit failure on an egress port.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The egress queue is full, the frame was not accepted.
    #[error("egress queue is full")]
    Full,

    /// The egress side was closed.
    #[error("egress port is closed")]
    Closed,

    /// The datalink layer refused the write.
    #[error("transmit failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single frame was dropped by a forwarding engine.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Malformed(#[from] FrameError),

    #[error("cannot forward to {egress}: {source}")]
    Transmit {
        egress: PortId,
        #[source]
        source: SinkError,
    },
}

/// Invalid switch configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("aging timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("sweep interval must be at least 1 ms")]
    InvalidSweepInterval,

    #[error("device name for {0} is empty")]
    EmptyDevice(PortId),

    #[error("both ports are bound to the same device '{0}'")]
    SamePort(String),

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Failure to bind a raw network interface.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("no such interface: '{0}'")]
    NotFound(String),

    #[error("unsupported channel type on '{0}'")]
    UnsupportedChannel(String),

    #[error("cannot open datalink channel on '{name}': {source}")]
    Channel {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_names_length() {
        let e = FrameError::Malformed { len: 3 };
        assert_eq!(e.to_string(), "malformed frame: 3 bytes, ethernet header needs 14");
    }

    #[test]
    fn test_config_error_names_port() {
        let e = ConfigError::EmptyDevice(PortId::PortB);
        assert_eq!(e.to_string(), "device name for port B is empty");
    }

    #[test]
    fn test_sink_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let e: SinkError = io.into();
        assert!(matches!(e, SinkError::Io(_)));
    }
}

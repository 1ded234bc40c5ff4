//! Linux raw interface binding to send/receive raw ethernet frames
//!
//! The receive half of a datalink channel blocks, so it runs on its own blocking
//! thread and feeds a bounded channel that the forwarding engine awaits. The read
//! timeout lets that thread notice a dropped receiver and release the device.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use nom::HexDisplay;
use pnet::datalink::{self, Channel, Config, DataLinkSender, NetworkInterface};
use tokio::sync::mpsc;

use crate::control::MAX_FRAME_SIZE;
use crate::error::{InterfaceError, SinkError};
use crate::switch::{PacketSink, PortIo};

/// How long a capture read may block before checking for shutdown.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Transmit half of a raw interface.
pub struct RawSink {
    name: String,
    tx: Box<dyn DataLinkSender>,
}

impl PacketSink for RawSink {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        match self.tx.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(SinkError::Io(e)),
            None => {
                trace!("{}: no transmit buffer for frame\n{}", self.name, frame.to_hex(16));
                Err(SinkError::Full)
            }
        }
    }
}

/// Return all interfaces known to the system.
pub fn interfaces() -> Vec<NetworkInterface> {
    datalink::interfaces()
}

/// Find interface `name`.
pub fn find_interface(name: &str) -> Result<NetworkInterface, InterfaceError> {
    interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| InterfaceError::NotFound(name.to_string()))
}

/// Bind interface `name` in promiscuous mode and return its capture queue and transmit half.
///
/// Must be called inside a tokio runtime: the capture loop runs on a blocking task.
pub fn raw_interface(name: &str, capacity: usize) -> Result<PortIo<RawSink>, InterfaceError> {
    let interface = find_interface(name)?;

    let config = Config {
        read_timeout: Some(READ_TIMEOUT),
        read_buffer_size: MAX_FRAME_SIZE,
        write_buffer_size: MAX_FRAME_SIZE,
        promiscuous: true,
        ..Default::default()
    };

    let (sender, mut receiver) = match datalink::channel(&interface, config) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => return Err(InterfaceError::UnsupportedChannel(name.to_string())),
        Err(source) => {
            return Err(InterfaceError::Channel {
                name: name.to_string(),
                source,
            })
        }
    };

    let (tx, rx) = mpsc::channel::<Bytes>(capacity);
    let capture_name = name.to_string();

    tokio::task::spawn_blocking(move || {
        loop {
            match receiver.next() {
                Ok(packet) => {
                    let data = Bytes::copy_from_slice(packet);
                    if tx.blocking_send(data).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(e) => {
                    error!("{}: capture failed: {}", capture_name, e);
                    break;
                }
            }
        }
        debug!("{}: capture thread exits", capture_name);
    });

    info!("bound raw interface '{}'", name);

    Ok(PortIo::new(
        rx,
        RawSink {
            name: name.to_string(),
            tx: sender,
        },
    ))
}

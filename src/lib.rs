//! # tapswitch
//!
//! `tapswitch` is a two port ethernet learning switch between raw network interfaces.
//!
//! ### Forwarding
//!
//! Every frame captured on a port is parsed just far enough to read its ethernet header.
//! The source mac is learned against the ingress port, then the destination mac is looked up:
//! an unknown destination is flooded to the other port, a destination learned on the other port
//! is unicast there, and a destination learned on the ingress port is filtered, because that
//! station already sees the frame on its own segment. A frame never goes back out its ingress port.
//!
//! ### Aging
//!
//! Learned macs are aged out by a background sweeper once idle for longer than the configured
//! timeout. Staleness is bounded by the sweep interval.
//!
//! ### Concurrency
//!
//! Both port engines and the sweeper run as tokio tasks on a multi threaded runtime and share a
//! single [`control::AddressTable`], which does its own locking.
//!
//! ### Example
//! ```rust,no_run
//! use tapswitch::config::SwitchConfig;
//! use tapswitch::linuxinterface::raw_interface;
//! use tapswitch::report::{format_counters, format_table};
//! use tapswitch::switch;
//! use tokio::runtime::Runtime;
//!
//! Runtime::new().unwrap().block_on(async {
//!     let config = SwitchConfig::with_defaults("eth1", "eth2").unwrap();
//!     let port_a = raw_interface(&config.port_a, config.channel_capacity).unwrap();
//!     let port_b = raw_interface(&config.port_b, config.channel_capacity).unwrap();
//!
//!     let handle = switch::start(&config, port_a, port_b);
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!
//!     print!("{}", format_table(&handle.snapshot()));
//!     let totals = handle.shutdown().await;
//!     print!("{}", format_counters(&totals));
//! });
//! ```

pub mod aging;
pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod linuxinterface;
pub mod report;
pub mod switch;

#[macro_use]
extern crate log;

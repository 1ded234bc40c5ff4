//! Two port learning switch: the per port forwarding engines and their orchestration.
//!
//! Each port has one engine. It reads the frames captured on its port, learns the
//! source mac against that port and sends the frame out the other port unless the
//! destination is known to live on the ingress side.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use nom::HexDisplay;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::aging::AgingSweeper;
use crate::config::SwitchConfig;
use crate::control::{AddressTable, CounterSnapshot, Counters, MacAddress, PortId};
use crate::error::{ForwardError, SinkError};
use crate::frame::Frame;

/// Transmit side of a port.
pub trait PacketSink: Send {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), SinkError>;
}

/// A channel sink never waits: a full queue is a dropped frame.
impl PacketSink for mpsc::Sender<Bytes> {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        self.try_send(Bytes::copy_from_slice(frame)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Destination unknown, send to the only other port.
    Flood(PortId),
    /// Destination learned on the other port.
    Unicast(PortId),
    /// Destination learned on the ingress port, the frame stays on its segment.
    Filter,
}

impl Decision {
    pub fn egress(&self) -> Option<PortId> {
        match self {
            Decision::Flood(port) | Decision::Unicast(port) => Some(*port),
            Decision::Filter => None,
        }
    }
}

/// Decide what to do with a frame that arrived on `ingress`, given where its destination was learned.
///
/// # Example
/// ```
/// use tapswitch::control::PortId;
/// use tapswitch::switch::{decide, Decision};
///
/// assert_eq!(decide(PortId::PortA, None), Decision::Flood(PortId::PortB));
/// assert_eq!(decide(PortId::PortA, Some(PortId::PortB)), Decision::Unicast(PortId::PortB));
/// assert_eq!(decide(PortId::PortA, Some(PortId::PortA)), Decision::Filter);
/// ```
pub fn decide(ingress: PortId, destination: Option<PortId>) -> Decision {
    match destination {
        None => Decision::Flood(ingress.other()),
        Some(port) if port == ingress => Decision::Filter,
        Some(port) => Decision::Unicast(port),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Why an engine loop returned.
pub enum EngineExit {
    Shutdown,
    SourceEnded,
}

/// Forwarding loop bound to one ingress port, sending out the other.
pub struct ForwardingEngine<S> {
    ingress: PortId,
    table: Arc<AddressTable>,
    counters: Arc<Counters>,
    egress: S,
}

impl<S: PacketSink> ForwardingEngine<S> {
    /// `egress` must be the transmit side of `ingress.other()`.
    pub fn new(ingress: PortId, table: Arc<AddressTable>, counters: Arc<Counters>, egress: S) -> Self {
        ForwardingEngine {
            ingress,
            table,
            counters,
            egress,
        }
    }

    pub fn ingress(&self) -> PortId {
        self.ingress
    }

    /// Learn, decide and forward a single captured frame.
    ///
    /// A malformed frame touches neither the table nor the counters. The egress counter
    /// only moves when the sink accepted the frame.
    pub fn handle_frame(&mut self, raw: Bytes, now: Instant) -> Result<Decision, ForwardError> {
        let frame = Frame::parse(raw, self.ingress)?;
        let header = &frame.header;

        self.table.learn(header.src_mac, frame.ingress, now);

        let decision = decide(frame.ingress, self.table.lookup(&header.dst_mac));
        let egress = match decision.egress() {
            Some(egress) => egress,
            None => {
                trace!("{}: filter {} -> {}, destination is local", frame.ingress, header.src_mac, header.dst_mac);
                return Ok(decision);
            }
        };

        self.egress
            .transmit(&frame.raw)
            .map_err(|source| ForwardError::Transmit { egress, source })?;
        self.counters.record(egress);

        trace!("{}: {:?} {} -> {}", frame.ingress, decision, header.src_mac, header.dst_mac);
        Ok(decision)
    }

    /// Consume `source` until it ends or shutdown is signalled.
    ///
    /// Dropped frames are logged and never stop the loop.
    pub async fn run(mut self, mut source: mpsc::Receiver<Bytes>, mut shutdown: watch::Receiver<bool>) -> EngineExit {
        info!("{}: forwarding engine starts", self.ingress);

        if *shutdown.borrow() {
            return EngineExit::Shutdown;
        }

        loop {
            tokio::select! {
                frame = source.recv() => match frame {
                    Some(frame) => {
                        let now = time::Instant::now().into_std();
                        match self.handle_frame(frame.clone(), now) {
                            Ok(_) => {}
                            Err(ForwardError::Malformed(e)) => {
                                debug!("{}: drop frame: {}", self.ingress, e);
                                trace!("[malformed frame]\n{}", frame[..].to_hex(16));
                            }
                            Err(e) => warn!("{}: drop frame: {}", self.ingress, e),
                        }
                    }
                    None => {
                        warn!("{}: capture source ended, engine stops", self.ingress);
                        return EngineExit::SourceEnded;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("{}: forwarding engine stops", self.ingress);
                        return EngineExit::Shutdown;
                    }
                }
            }
        }
    }
}

/// Capture and transmit halves of one port.
pub struct PortIo<S> {
    pub source: mpsc::Receiver<Bytes>,
    pub sink: S,
}

impl<S> PortIo<S> {
    pub fn new(source: mpsc::Receiver<Bytes>, sink: S) -> Self {
        PortIo { source, sink }
    }
}

/// Running switch. Dropping the handle without `shutdown` leaves the loops running
/// until their sources end.
pub struct SwitchHandle {
    table: Arc<AddressTable>,
    counters: Arc<Counters>,
    shutdown: watch::Sender<bool>,
    engines: Vec<(PortId, JoinHandle<EngineExit>)>,
    sweeper: JoinHandle<()>,
}

/// Spawn both forwarding engines and the aging sweeper on the current tokio runtime.
///
/// Port A's frames go out `port_b.sink` and port B's frames go out `port_a.sink`.
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use tokio::runtime::Runtime;
/// use tokio::sync::mpsc;
///
/// use tapswitch::config::SwitchConfig;
/// use tapswitch::switch::{self, PortIo};
///
/// Runtime::new().unwrap().block_on(async {
///     let config = SwitchConfig::new("tap-a", "tap-b", 300.0, 200).unwrap();
///
///     let (wire_a, source_a) = mpsc::channel::<Bytes>(16);
///     let (_wire_b, source_b) = mpsc::channel::<Bytes>(16);
///     let (sink_a, _out_a) = mpsc::channel::<Bytes>(16);
///     let (sink_b, mut out_b) = mpsc::channel::<Bytes>(16);
///
///     let handle = switch::start(&config, PortIo::new(source_a, sink_a), PortIo::new(source_b, sink_b));
///
///     let packet = Bytes::from(hex::decode("ffffffffffff0001aaaaaaff4321c0ff").unwrap());
///     wire_a.send(packet.clone()).await.unwrap();
///     assert_eq!(out_b.recv().await.unwrap(), packet);
///
///     let totals = handle.shutdown().await;
///     assert_eq!(totals.port_b, 1);
/// });
/// ```
pub fn start<SA, SB>(config: &SwitchConfig, port_a: PortIo<SA>, port_b: PortIo<SB>) -> SwitchHandle
where
    SA: PacketSink + 'static,
    SB: PacketSink + 'static,
{
    let table = Arc::new(AddressTable::new(config.max_entries));
    let counters = Arc::new(Counters::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let engine_a = ForwardingEngine::new(PortId::PortA, table.clone(), counters.clone(), port_b.sink);
    let engine_b = ForwardingEngine::new(PortId::PortB, table.clone(), counters.clone(), port_a.sink);

    let engines = vec![
        (PortId::PortA, tokio::spawn(engine_a.run(port_a.source, shutdown_rx.clone()))),
        (PortId::PortB, tokio::spawn(engine_b.run(port_b.source, shutdown_rx.clone()))),
    ];

    let sweeper = AgingSweeper::new(table.clone(), config.sweep_interval, config.timeout);
    let sweeper = tokio::spawn(sweeper.run(shutdown_rx));

    info!("switch starts: {} = '{}', {} = '{}'", PortId::PortA, config.port_a, PortId::PortB, config.port_b);

    SwitchHandle {
        table,
        counters,
        shutdown: shutdown_tx,
        engines,
        sweeper,
    }
}

impl SwitchHandle {
    pub fn table(&self) -> &Arc<AddressTable> {
        &self.table
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Copy of the learned (mac, port) pairs, sorted by port then mac.
    pub fn snapshot(&self) -> Vec<(MacAddress, PortId)> {
        let mut entries = self.table.snapshot();
        entries.sort_by_key(|(mac, port)| (*port, *mac));
        entries
    }

    /// True once both engines have returned.
    pub fn engines_finished(&self) -> bool {
        self.engines.iter().all(|(_, task)| task.is_finished())
    }

    /// Signal every loop to stop, wait for them and return the final counters.
    pub async fn shutdown(self) -> CounterSnapshot {
        info!("switch shutdown requested");
        // receivers observe a dropped sender as shutdown, so a send error is harmless
        let _ = self.shutdown.send(true);

        for (port, task) in self.engines {
            match task.await {
                Ok(exit) => debug!("{}: engine exit: {:?}", port, exit),
                Err(e) => error!("{}: engine task failed: {}", port, e),
            }
        }
        if let Err(e) = self.sweeper.await {
            error!("aging task failed: {}", e);
        }

        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MAX_MAC_COUNT;
    use tokio_test::{assert_err, assert_ok};

    struct FailingSink;

    impl PacketSink for FailingSink {
        fn transmit(&mut self, _frame: &[u8]) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, "link down")))
        }
    }

    fn frame(dst: &str, src: &str) -> Bytes {
        Bytes::from(hex::decode(format!("{}{}0800c0ffee", dst, src)).unwrap())
    }

    fn engine(ingress: PortId) -> (ForwardingEngine<mpsc::Sender<Bytes>>, mpsc::Receiver<Bytes>, Arc<AddressTable>, Arc<Counters>) {
        let table = Arc::new(AddressTable::new(MAX_MAC_COUNT));
        let counters = Arc::new(Counters::new());
        let (tx, rx) = mpsc::channel(64);
        (ForwardingEngine::new(ingress, table.clone(), counters.clone(), tx), rx, table, counters)
    }

    const X: &str = "020000000001";
    const Y: &str = "020000000002";
    const Z: &str = "020000000003";

    #[test]
    fn test_unknown_destination_floods_to_other_port() {
        let (mut engine, mut out, table, counters) = engine(PortId::PortB);
        let decision = engine.handle_frame(frame(X, Y), Instant::now()).unwrap();

        assert_eq!(decision, Decision::Flood(PortId::PortA));
        assert_eq!(out.try_recv().unwrap(), frame(X, Y));
        assert_eq!(table.lookup(&MacAddress::new([2, 0, 0, 0, 0, 2])), Some(PortId::PortB));
        assert_eq!(counters.snapshot(), CounterSnapshot { port_a: 1, port_b: 0 });
    }

    #[test]
    fn test_destination_on_ingress_port_is_never_forwarded() {
        let (mut engine, mut out, _table, counters) = engine(PortId::PortA);
        let now = Instant::now();

        // X talks first, so X is known on port A
        engine.handle_frame(frame(Z, X), now).unwrap();
        out.try_recv().unwrap();

        for _ in 0..5 {
            assert_eq!(engine.handle_frame(frame(X, Y), now).unwrap(), Decision::Filter);
        }
        assert_err!(out.try_recv());
        assert_eq!(counters.forwarded(PortId::PortB), 1);
    }

    #[test]
    fn test_destination_on_other_port_is_unicast() {
        let (mut engine, mut out, table, counters) = engine(PortId::PortA);
        table.learn(MacAddress::new([2, 0, 0, 0, 0, 3]), PortId::PortB, Instant::now());

        assert_eq!(
            engine.handle_frame(frame(Z, X), Instant::now()).unwrap(),
            Decision::Unicast(PortId::PortB)
        );
        assert_eq!(out.try_recv().unwrap(), frame(Z, X));
        assert_eq!(counters.forwarded(PortId::PortB), 1);
    }

    #[test]
    fn test_malformed_frame_changes_nothing() {
        let (mut engine, mut out, table, counters) = engine(PortId::PortA);
        let short = Bytes::from(hex::decode("ffffffffffff0201").unwrap());

        let result = engine.handle_frame(short, Instant::now());

        assert!(matches!(result, Err(ForwardError::Malformed(_))));
        assert!(table.is_empty());
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
        assert_err!(out.try_recv());
    }

    #[test]
    fn test_sink_failure_is_not_counted_but_source_is_learned() {
        let table = Arc::new(AddressTable::new(MAX_MAC_COUNT));
        let counters = Arc::new(Counters::new());
        let mut engine = ForwardingEngine::new(PortId::PortA, table.clone(), counters.clone(), FailingSink);

        let result = engine.handle_frame(frame(Y, X), Instant::now());

        assert!(matches!(result, Err(ForwardError::Transmit { egress: PortId::PortB, .. })));
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
        assert_eq!(table.lookup(&MacAddress::new([2, 0, 0, 0, 0, 1])), Some(PortId::PortA));
    }

    #[test]
    fn test_full_channel_sink_reports_full() {
        let (mut tx, _rx) = mpsc::channel::<Bytes>(1);
        assert_ok!(tx.transmit(&[0u8; 14]));
        assert!(matches!(tx.transmit(&[0u8; 14]), Err(SinkError::Full)));
    }

    #[tokio::test]
    async fn test_engine_survives_bad_frames_and_stops_on_shutdown() {
        let (engine, mut out, _table, counters) = engine(PortId::PortA);
        let (wire, source) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(source, shutdown_rx));

        wire.send(Bytes::from_static(&[0u8; 3])).await.unwrap();
        wire.send(frame(Y, X)).await.unwrap();
        assert_eq!(out.recv().await.unwrap(), frame(Y, X));

        shutdown_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), EngineExit::Shutdown);
        assert_eq!(counters.forwarded(PortId::PortB), 1);
    }

    #[tokio::test]
    async fn test_engine_returns_when_source_ends() {
        let (engine, _out, _table, _counters) = engine(PortId::PortB);
        let (wire, source) = mpsc::channel::<Bytes>(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(source, shutdown_rx));

        drop(wire);
        assert_eq!(task.await.unwrap(), EngineExit::SourceEnded);
    }
}

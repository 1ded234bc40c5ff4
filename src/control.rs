//! Mac learning table and forwarding counters shared by the switch loops
//!
//! The address table maps a learned station mac to the port it was last seen on.
//! Both forwarding engines write to it and the aging sweeper purges it, so the table
//! does its own locking: it is a sharded concurrent map and every operation touches
//! one shard at a time, except `snapshot` and `len`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// The maximum ethernet frame buffer size
pub const MAX_FRAME_SIZE: usize = 1024 * 9;
/// The fixed ethernet header size. Anything shorter is not a frame.
pub const MIN_FRAME_SIZE: usize = 14;

pub const BROADCAST_MAC_ADDRESS: u64 = 0xffff_ffff_ffff;

pub const MAX_MAC_COUNT: usize = 32_000;
pub const DEFAULT_MAC_AGING_TIMEOUT: f64 = 300.0;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A 6 byte ethernet hardware address.
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Return a MacAddress object with the given 6 mac bytes.
    ///
    /// # Example
    /// ```
    /// use tapswitch::control::MacAddress;
    ///
    /// let mac = MacAddress::new([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
    /// assert_eq!(mac.get_value(), 0x000102030405u64);
    /// ```
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Return a MacAddress from the first 6 bytes of `data`, or None if `data` is shorter.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = data.get(..6)?.try_into().ok()?;
        Some(MacAddress(bytes))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Return the mac address packed big-endian into the low 48 bits of a u64.
    pub fn get_value(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
    }

    /// Return true if the mac address is broadcast mac address (all ones).
    ///
    /// # Example
    /// ```
    /// use tapswitch::control::MacAddress;
    /// let mac = MacAddress::new([0xff; 6]);
    /// assert_eq!(mac.is_broadcast(), true);
    /// ```
    pub fn is_broadcast(&self) -> bool {
        self.get_value() == BROADCAST_MAC_ADDRESS
    }

    /// Return true if the group bit is set (multicast, broadcast included).
    ///
    /// # Example
    /// ```
    /// use tapswitch::control::MacAddress;
    /// let mac = MacAddress::new([0x01, 0x00, 0x5e, 0x00, 0x01, 0x01]);
    /// assert_eq!(mac.is_multicast(), true);
    ///
    /// let mac = MacAddress::new([0x33, 0x33, 0x00, 0x00, 0x00, 0x02]);
    /// assert_eq!(mac.is_multicast(), true);
    /// ```
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Return true if the mac address is an individual station address.
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// One of the two switch ports.
pub enum PortId {
    PortA,
    PortB,
}

impl PortId {
    /// Return the opposite port: the only possible egress for a frame arriving here.
    ///
    /// # Example
    /// ```
    /// use tapswitch::control::PortId;
    /// assert_eq!(PortId::PortA.other(), PortId::PortB);
    /// assert_eq!(PortId::PortB.other(), PortId::PortA);
    /// ```
    pub fn other(self) -> PortId {
        match self {
            PortId::PortA => PortId::PortB,
            PortId::PortB => PortId::PortA,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PortId::PortA => "A",
            PortId::PortB => "B",
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}", self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Port and last-seen timestamp of a learned mac.
pub struct TableEntry {
    pub port: PortId,
    pub last_seen: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Outcome of a `learn` call.
pub enum Learned {
    /// A new entry was created.
    New,
    /// An existing entry was refreshed on the same port.
    Refreshed,
    /// An existing entry was refreshed and now points at the other port.
    Moved,
    /// The table is full and the new mac was not stored.
    TableFull,
    /// The source is a group address and is never learned.
    Ignored,
}

#[derive(Debug)]
/// Mac entries and their ports, kept in a sharded concurrent map.
pub struct AddressTable {
    max_entries: usize,
    entries: DashMap<MacAddress, TableEntry>,
}

impl Default for AddressTable {
    fn default() -> Self {
        AddressTable::new(MAX_MAC_COUNT)
    }
}

impl AddressTable {
    /// Return a new, empty table holding at most `max_entries` macs.
    ///
    /// # Example
    /// ```
    /// use tapswitch::control::AddressTable;
    ///
    /// let table = AddressTable::new(1000);
    /// assert_eq!(table.len(), 0);
    /// assert!(table.is_empty());
    /// ```
    pub fn new(max_entries: usize) -> AddressTable {
        AddressTable {
            max_entries: if max_entries == 0 { 1 } else { max_entries },
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Learn that `mac` was seen as a source on `port` at `now`.
    ///
    /// The entry is replaced as a whole, so concurrent learns of the same mac from
    /// both ports resolve to whichever write lands last.
    ///
    /// # Example
    /// ```
    /// use std::time::Instant;
    /// use tapswitch::control::{AddressTable, Learned, MacAddress, PortId};
    ///
    /// let table = AddressTable::new(1000);
    /// let mac = MacAddress::new([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
    ///
    /// assert_eq!(table.learn(mac, PortId::PortA, Instant::now()), Learned::New);
    /// assert_eq!(table.learn(mac, PortId::PortB, Instant::now()), Learned::Moved);
    /// assert_eq!(table.lookup(&mac), Some(PortId::PortB));
    /// ```
    pub fn learn(&self, mac: MacAddress, port: PortId, now: Instant) -> Learned {
        if !mac.is_unicast() {
            return Learned::Ignored;
        }

        if let Some(mut entry) = self.entries.get_mut(&mac) {
            let moved = entry.port != port;
            *entry = TableEntry { port, last_seen: now };
            if moved {
                debug!("mac {} moved to {}", mac, port);
                return Learned::Moved;
            }
            return Learned::Refreshed;
        }

        // len() read-locks every shard, so no shard guard may be held here
        if self.entries.len() >= self.max_entries {
            error!("mac table full ({} entries), not learning {}", self.max_entries, mac);
            return Learned::TableFull;
        }

        trace!("insert a new mac entry: {} {}", mac, port);
        self.entries.insert(mac, TableEntry { port, last_seen: now });
        Learned::New
    }

    /// Return the port `mac` was last seen on, or None if unknown.
    pub fn lookup(&self, mac: &MacAddress) -> Option<PortId> {
        self.entries.get(mac).map(|entry| entry.port)
    }

    /// Return a copy of the entry for `mac`.
    pub fn entry(&self, mac: &MacAddress) -> Option<TableEntry> {
        self.entries.get(mac).map(|entry| *entry)
    }

    /// Remove every entry idle for longer than `timeout` at `now`, returning how many went.
    ///
    /// Shards are locked one after another, never all at once. An entry stamped later
    /// than `now` counts as zero idle time.
    ///
    /// # Example
    /// ```
    /// use std::time::{Duration, Instant};
    /// use tapswitch::control::{AddressTable, MacAddress, PortId};
    ///
    /// let table = AddressTable::new(1000);
    /// let start = Instant::now();
    /// let mac = MacAddress::new([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
    /// table.learn(mac, PortId::PortA, start);
    ///
    /// assert_eq!(table.evict(start + Duration::from_secs(1), Duration::from_secs(1)), 0);
    /// assert_eq!(table.evict(start + Duration::from_secs(2), Duration::from_secs(1)), 1);
    /// assert_eq!(table.lookup(&mac), None);
    /// ```
    pub fn evict(&self, now: Instant, timeout: Duration) -> usize {
        let mut removed = 0;
        self.entries.retain(|mac, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) <= timeout;
            if !keep {
                trace!("mac expired: {} ({})", mac, entry.port);
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Return a copy of all (mac, port) pairs, in no particular order.
    pub fn snapshot(&self) -> Vec<(MacAddress, PortId)> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().port))
            .collect()
    }
}

#[derive(Debug, Default)]
/// Per port counts of frames forwarded out that port.
pub struct Counters {
    port_a: AtomicU64,
    port_b: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub port_a: u64,
    pub port_b: u64,
}

impl CounterSnapshot {
    pub fn get(&self, port: PortId) -> u64 {
        match port {
            PortId::PortA => self.port_a,
            PortId::PortB => self.port_b,
        }
    }
}

impl Counters {
    pub fn new() -> Self {
        Counters::default()
    }

    fn slot(&self, port: PortId) -> &AtomicU64 {
        match port {
            PortId::PortA => &self.port_a,
            PortId::PortB => &self.port_b,
        }
    }

    /// Count one frame sent out `egress`.
    pub fn record(&self, egress: PortId) {
        self.slot(egress).fetch_add(1, Ordering::Relaxed);
    }

    pub fn forwarded(&self, port: PortId) -> u64 {
        self.slot(port).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            port_a: self.forwarded(PortId::PortA),
            port_b: self.forwarded(PortId::PortB),
        }
    }
}

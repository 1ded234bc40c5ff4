//! Background mac aging
//!
//! The sweeper wakes up every sweep interval and evicts entries idle for longer
//! than the aging timeout, so an entry can outlive its timeout by at most one interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::control::AddressTable;

#[derive(Debug)]
pub struct AgingSweeper {
    table: Arc<AddressTable>,
    interval: Duration,
    timeout: Duration,
}

impl AgingSweeper {
    pub fn new(table: Arc<AddressTable>, interval: Duration, timeout: Duration) -> Self {
        AgingSweeper {
            table,
            interval,
            timeout,
        }
    }

    /// Run one eviction pass now, returning the number of evicted macs.
    pub fn sweep(&self) -> usize {
        let removed = self.table.evict(Instant::now().into_std(), self.timeout);
        if removed > 0 {
            debug!("aged out {} mac entries, {} left", removed, self.table.len());
        }
        removed
    }

    /// Sweep on every interval tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "mac aging starts: timeout {:?}, sweep every {:?}",
            self.timeout, self.interval
        );

        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    trace!("remove expired MAC entries");
                    self.sweep();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("mac aging stops");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{MacAddress, PortId, MAX_MAC_COUNT};

    const STATION_X: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    const STATION_Y: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

    fn now() -> std::time::Instant {
        Instant::now().into_std()
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_entry_aged_out_within_one_interval() {
        let table = Arc::new(AddressTable::new(MAX_MAC_COUNT));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = AgingSweeper::new(table.clone(), Duration::from_millis(200), Duration::from_secs(2));
        let task = tokio::spawn(sweeper.run(shutdown_rx));

        table.learn(STATION_X, PortId::PortA, now());
        table.learn(STATION_Y, PortId::PortB, now());

        // keep Y fresh, let X go idle
        for _ in 0..10 {
            time::sleep(Duration::from_millis(250)).await;
            table.learn(STATION_Y, PortId::PortB, now());
        }

        assert_eq!(table.lookup(&STATION_X), None);
        assert_eq!(table.lookup(&STATION_Y), Some(PortId::PortB));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_younger_than_timeout_survives() {
        let table = Arc::new(AddressTable::new(MAX_MAC_COUNT));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = AgingSweeper::new(table.clone(), Duration::from_millis(100), Duration::from_secs(5));
        let task = tokio::spawn(sweeper.run(shutdown_rx));

        table.learn(STATION_X, PortId::PortA, now());
        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(table.lookup(&STATION_X), Some(PortId::PortA));

        time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(table.lookup(&STATION_X), None);

        drop(shutdown_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_idle_removes_nothing() {
        let table = Arc::new(AddressTable::new(MAX_MAC_COUNT));
        table.learn(STATION_X, PortId::PortA, now());
        let sweeper = AgingSweeper::new(table.clone(), Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(sweeper.sweep(), 0);
        assert_eq!(table.len(), 1);
    }
}

//! `Dispatcher` — matches events against watches and raises readiness.
//!
//! Runs synchronously on whichever thread the event source delivers on;
//! the two streams may deliver concurrently. Matching is per kind:
//!
//! - `NextHopDeleted`: ask the resolver; if the entity is confirmed gone,
//!   signal `nexthop`. The configured `nexthop` target is NOT consulted.
//! - `AddressUp`: signal `inetaddr` only when the address equals the
//!   configured `inetaddr` target. Namespace plays no part in the match.
//!
//! Nothing is ever reported back to the source. Malformed events and
//! lookup misses are dropped.

use ktunp_core::event::{Event, NetNsId, NexthopId};
use ktunp_core::source::{EventSink, NexthopResolver, Resolution};
use ktunp_core::watch::{WatchKind, WatchTable};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Entity reference cannot be interpreted (nexthop id 0, address 0.0.0.0).
    Malformed,
    /// Resolver has no record of the next-hop.
    LookupMiss,
}

/// What `dispatch()` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Triggered(WatchKind),
    /// Well-formed, but did not match the watch.
    Ignored,
    Dropped(DropReason),
}

/// Deletion notifications come straight from the network stack, so the
/// notification is itself the confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmedByNotifier;

impl NexthopResolver for ConfirmedByNotifier {
    fn resolve(&self, _netns: NetNsId, _id: NexthopId) -> Resolution {
        Resolution::Gone
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub triggered: u64,
    pub ignored: u64,
    pub dropped: u64,
}

pub struct Dispatcher<T, R = ConfirmedByNotifier>
where
    T: WatchTable,
    R: NexthopResolver,
{
    table: Arc<T>,
    resolver: R,
    triggered: AtomicU64,
    ignored: AtomicU64,
    dropped: AtomicU64,
}

impl<T: WatchTable> Dispatcher<T> {
    pub fn new(table: Arc<T>) -> Self {
        Self::with_resolver(table, ConfirmedByNotifier)
    }
}

impl<T, R> Dispatcher<T, R>
where
    T: WatchTable,
    R: NexthopResolver,
{
    pub fn with_resolver(table: Arc<T>, resolver: R) -> Self {
        Self {
            table,
            resolver,
            triggered: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn table(&self) -> &Arc<T> {
        &self.table
    }

    pub fn dispatch(&self, event: Event) -> Dispatch {
        let outcome = self.matches(event);
        match outcome {
            Dispatch::Triggered(kind) => {
                self.table.notify(kind);
                self.triggered.fetch_add(1, Ordering::Relaxed);
            }
            Dispatch::Ignored => {
                self.ignored.fetch_add(1, Ordering::Relaxed);
            }
            Dispatch::Dropped(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        trace!(%event, ?outcome, "dispatched");
        outcome
    }

    fn matches(&self, event: Event) -> Dispatch {
        match event {
            Event::NextHopDeleted { netns, nexthop_id } => {
                if !nexthop_id.is_valid() {
                    return Dispatch::Dropped(DropReason::Malformed);
                }
                match self.resolver.resolve(netns, nexthop_id) {
                    Resolution::Gone => Dispatch::Triggered(WatchKind::NextHop),
                    Resolution::Miss => Dispatch::Dropped(DropReason::LookupMiss),
                }
            }
            Event::AddressUp { address, .. } => {
                if address.is_unspecified() {
                    return Dispatch::Dropped(DropReason::Malformed);
                }
                if self.table.target(WatchKind::InetAddr) == address {
                    Dispatch::Triggered(WatchKind::InetAddr)
                } else {
                    Dispatch::Ignored
                }
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            triggered: self.triggered.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl<T, R> EventSink for Dispatcher<T, R>
where
    T: WatchTable,
    R: NexthopResolver,
{
    fn deliver(&self, event: Event) {
        self.dispatch(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ktunp_core::addr::NetAddr;
    use ktunp_core::spinlock::SpinLock;

    /// Records notifications instead of signalling channels.
    #[derive(Default)]
    struct RecordingTable {
        inetaddr: SpinLock<NetAddr>,
        nexthop: SpinLock<NetAddr>,
        notified: SpinLock<Vec<WatchKind>>,
    }

    impl WatchTable for RecordingTable {
        fn target(&self, kind: WatchKind) -> NetAddr {
            match kind {
                WatchKind::NextHop => *self.nexthop.lock(),
                WatchKind::InetAddr => *self.inetaddr.lock(),
            }
        }

        fn notify(&self, kind: WatchKind) {
            self.notified.lock().push(kind);
        }
    }

    fn addr_up(octets: [u8; 4]) -> Event {
        Event::AddressUp { netns: NetNsId(7), address: NetAddr::from_octets(octets) }
    }

    fn nh_del(id: u32) -> Event {
        Event::NextHopDeleted { netns: NetNsId(1), nexthop_id: NexthopId(id) }
    }

    #[test]
    fn test_address_up_matches_target_only() {
        let table = Arc::new(RecordingTable::default());
        *table.inetaddr.lock() = NetAddr::from_octets([192, 0, 2, 1]);
        let d = Dispatcher::new(Arc::clone(&table));

        assert_eq!(d.dispatch(addr_up([192, 0, 2, 1])), Dispatch::Triggered(WatchKind::InetAddr));
        assert_eq!(d.dispatch(addr_up([192, 0, 2, 2])), Dispatch::Ignored);
        assert_eq!(*table.notified.lock(), vec![WatchKind::InetAddr]);
    }

    #[test]
    fn test_unset_target_never_matches() {
        let table = Arc::new(RecordingTable::default());
        let d = Dispatcher::new(Arc::clone(&table));

        assert_eq!(d.dispatch(addr_up([10, 0, 0, 1])), Dispatch::Ignored);
        assert_eq!(d.dispatch(addr_up([0, 0, 0, 0])), Dispatch::Dropped(DropReason::Malformed));
        assert!(table.notified.lock().is_empty());
    }

    #[test]
    fn test_nexthop_ignores_configured_target() {
        let table = Arc::new(RecordingTable::default());
        *table.nexthop.lock() = NetAddr::from_octets([10, 0, 0, 5]);
        let d = Dispatcher::new(Arc::clone(&table));

        assert_eq!(d.dispatch(nh_del(42)), Dispatch::Triggered(WatchKind::NextHop));
        assert_eq!(d.dispatch(nh_del(43)), Dispatch::Triggered(WatchKind::NextHop));
        assert_eq!(*table.notified.lock(), vec![WatchKind::NextHop, WatchKind::NextHop]);
    }

    #[test]
    fn test_nexthop_lookup_miss_and_malformed_dropped() {
        let table = Arc::new(RecordingTable::default());
        let d = Dispatcher::with_resolver(Arc::clone(&table), |_ns: NetNsId, id: NexthopId| {
            if id.0 < 100 { Resolution::Gone } else { Resolution::Miss }
        });

        assert_eq!(d.dispatch(nh_del(0)), Dispatch::Dropped(DropReason::Malformed));
        assert_eq!(d.dispatch(nh_del(500)), Dispatch::Dropped(DropReason::LookupMiss));
        assert_eq!(d.dispatch(nh_del(5)), Dispatch::Triggered(WatchKind::NextHop));

        let stats = d.stats();
        assert_eq!(stats, DispatchStats { triggered: 1, ignored: 0, dropped: 2 });
    }

    #[test]
    fn test_concurrent_streams() {
        let table = Arc::new(RecordingTable::default());
        *table.inetaddr.lock() = NetAddr::from_octets([192, 0, 2, 1]);
        let d = Arc::new(Dispatcher::new(Arc::clone(&table)));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let d = Arc::clone(&d);
                std::thread::spawn(move || {
                    for n in 1..=500u32 {
                        if i == 0 {
                            d.deliver(nh_del(n));
                        } else {
                            d.deliver(addr_up([192, 0, 2, 1]));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(d.stats().triggered, 1000);
        let notified = table.notified.lock();
        assert_eq!(notified.iter().filter(|k| **k == WatchKind::NextHop).count(), 500);
        assert_eq!(notified.iter().filter(|k| **k == WatchKind::InetAddr).count(), 500);
    }
}

//! `ManualSource` — in-process event source.
//!
//! For embedders that already have a network-state feed, and for tests.
//! `emit()` delivers synchronously on the calling thread: address events
//! to every address subscriber, next-hop events to the subscribers of the
//! event's namespace only.
//!
//! Dropping a subscription waits for any delivery already running on its
//! sink, and no delivery starts after the drop returns. A sink must
//! therefore not drop its own subscription from inside `deliver`.

use ktunp_core::error::SubscriptionError;
use ktunp_core::event::{Event, NetNsId};
use ktunp_core::source::{AddrEventSource, EventSink, NexthopEventSource, Stream, Subscription};
use ktunp_core::spinlock::SpinLock;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

struct Entry {
    id: u64,
    stream: Stream,
    sink: Arc<dyn EventSink>,
    /// Held for read across each delivery; cleared under write by drop.
    live: Arc<RwLock<bool>>,
}

#[derive(Default)]
struct Shared {
    entries: SpinLock<Vec<Entry>>,
    next_id: AtomicU64,
    fail_addr: AtomicBool,
    fail_nexthop: AtomicBool,
}

#[derive(Clone, Default)]
pub struct ManualSource {
    shared: Arc<Shared>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to matching subscribers. Returns how many got it.
    pub fn emit(&self, event: Event) -> usize {
        let wanted = match event {
            Event::AddressUp { .. } => Stream::Addr,
            Event::NextHopDeleted { netns, .. } => Stream::Nexthop(netns),
        };
        // Snapshot so sinks run without the list lock held.
        let targets: Vec<(Arc<dyn EventSink>, Arc<RwLock<bool>>)> = self
            .shared
            .entries
            .lock()
            .iter()
            .filter(|e| e.stream == wanted)
            .map(|e| (Arc::clone(&e.sink), Arc::clone(&e.live)))
            .collect();

        let mut delivered = 0;
        for (sink, live) in &targets {
            let live = live.read().unwrap_or_else(PoisonError::into_inner);
            // Dropped after the snapshot was taken.
            if !*live {
                continue;
            }
            sink.deliver(event);
            delivered += 1;
        }
        delivered
    }

    /// Make the next address subscription fail.
    pub fn fail_next_addr(&self) {
        self.shared.fail_addr.store(true, Ordering::SeqCst);
    }

    /// Make the next next-hop subscription fail.
    pub fn fail_next_nexthop(&self) {
        self.shared.fail_nexthop.store(true, Ordering::SeqCst);
    }

    /// Live subscriptions on `stream`.
    pub fn subscribers(&self, stream: Stream) -> usize {
        self.shared.entries.lock().iter().filter(|e| e.stream == stream).count()
    }

    fn subscribe(
        &self,
        stream: Stream,
        fail: &AtomicBool,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn Subscription>, SubscriptionError> {
        if fail.swap(false, Ordering::SeqCst) {
            return Err(SubscriptionError::Refused(stream));
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let live = Arc::new(RwLock::new(true));
        self.shared.entries.lock().push(Entry { id, stream, sink, live: Arc::clone(&live) });
        Ok(Box::new(ManualSubscription {
            shared: Arc::downgrade(&self.shared),
            id,
            stream,
            live,
        }))
    }
}

impl AddrEventSource for ManualSource {
    fn subscribe_addr(
        &self,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn Subscription>, SubscriptionError> {
        self.subscribe(Stream::Addr, &self.shared.fail_addr, sink)
    }
}

impl NexthopEventSource for ManualSource {
    fn subscribe_nexthop(
        &self,
        netns: NetNsId,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn Subscription>, SubscriptionError> {
        self.subscribe(Stream::Nexthop(netns), &self.shared.fail_nexthop, sink)
    }
}

struct ManualSubscription {
    shared: Weak<Shared>,
    id: u64,
    stream: Stream,
    live: Arc<RwLock<bool>>,
}

impl Subscription for ManualSubscription {
    fn stream(&self) -> Stream {
        self.stream
    }
}

impl Drop for ManualSubscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.entries.lock().retain(|e| e.id != self.id);
        }
        // Blocks until an in-flight delivery to this sink returns.
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

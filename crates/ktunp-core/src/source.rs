//! Event subscription contracts.
//!
//! Event sources are injected into the pipeline at construction instead of
//! being registered on process-wide notifier lists. Each `subscribe_*` call
//! returns a `Subscription`; dropping it tears the registration down, so
//! teardown order is simply drop order.
//!
//! # Implementors (ktunp-module)
//!
//! - `ManualSource`: in-process injection, used by tests and embedders.
//! - `NetlinkSource` (Linux): rtnetlink multicast groups.

use std::sync::Arc;

use crate::error::SubscriptionError;
use crate::event::{Event, NetNsId, NexthopId};

/// Which event stream a subscription belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Interface address transitions, global scope.
    Addr,
    /// Next-hop deletions, one subscription per namespace.
    Nexthop(NetNsId),
}

impl core::fmt::Display for Stream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Stream::Addr => f.write_str("inetaddr"),
            Stream::Nexthop(ns) => write!(f, "nexthop({})", ns),
        }
    }
}

/// Receives events from a source.
///
/// **Contract:**
/// - May be called concurrently from several source threads.
/// - Must not block and must never report failure back to the source;
///   events that cannot be handled are dropped.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: Event);
}

/// A live registration with an event source.
///
/// Dropping the value unregisters it. After drop returns, the source must
/// not call the sink again.
pub trait Subscription: Send {
    fn stream(&self) -> Stream;

    /// False once the source has stopped delivering on its own, e.g. its
    /// reader hit a fatal error. The value still has to be dropped.
    fn is_live(&self) -> bool {
        true
    }
}

/// Source of interface-address-up events.
pub trait AddrEventSource {
    fn subscribe_addr(
        &self,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn Subscription>, SubscriptionError>;
}

/// Source of next-hop deletion events, scoped per namespace.
pub trait NexthopEventSource {
    fn subscribe_nexthop(
        &self,
        netns: NetNsId,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn Subscription>, SubscriptionError>;
}

/// Outcome of looking up a deleted next-hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The entity is confirmed gone; the deletion applies.
    Gone,
    /// Nothing known about the entity; the event does not apply.
    Miss,
}

/// Network-state lookup consulted before a next-hop deletion is signalled.
pub trait NexthopResolver: Send + Sync {
    fn resolve(&self, netns: NetNsId, id: NexthopId) -> Resolution;
}

impl<F> NexthopResolver for F
where
    F: Fn(NetNsId, NexthopId) -> Resolution + Send + Sync,
{
    fn resolve(&self, netns: NetNsId, id: NexthopId) -> Resolution {
        self(netns, id)
    }
}

impl NexthopResolver for Box<dyn NexthopResolver> {
    fn resolve(&self, netns: NetNsId, id: NexthopId) -> Resolution {
        (**self).resolve(netns, id)
    }
}

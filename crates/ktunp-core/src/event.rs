//! Network-state events delivered by event sources.
//!
//! Events are ephemeral: the dispatcher consumes each one once, on the
//! delivering thread. Nothing queues or retries them.

use core::fmt;

use crate::addr::NetAddr;
use crate::watch::WatchKind;

/// Network namespace identifier, as assigned by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NetNsId(pub u32);

impl NetNsId {
    /// The namespace the process itself lives in.
    pub const CURRENT: NetNsId = NetNsId(0);
}

impl fmt::Display for NetNsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "netns:{}", self.0)
    }
}

/// Namespace-scoped next-hop object identifier. Zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NexthopId(pub u32);

impl NexthopId {
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NexthopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nhid:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A next-hop object was removed.
    NextHopDeleted {
        netns: NetNsId,
        nexthop_id: NexthopId,
    },
    /// An IPv4 interface address transitioned to up.
    AddressUp {
        netns: NetNsId,
        address: NetAddr,
    },
}

impl Event {
    /// The watch this event is matched against.
    pub const fn watch(&self) -> WatchKind {
        match self {
            Event::NextHopDeleted { .. } => WatchKind::NextHop,
            Event::AddressUp { .. } => WatchKind::InetAddr,
        }
    }

    pub const fn netns(&self) -> NetNsId {
        match *self {
            Event::NextHopDeleted { netns, .. } | Event::AddressUp { netns, .. } => netns,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::NextHopDeleted { netns, nexthop_id } => {
                write!(f, "nexthop-del {} {}", netns, nexthop_id)
            }
            Event::AddressUp { netns, address } => write!(f, "addr-up {} {}", netns, address),
        }
    }
}

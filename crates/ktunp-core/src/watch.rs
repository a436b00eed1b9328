//! Watch identity.
//!
//! Exactly two watches exist for the life of the process. They are keyed
//! by name (`"nexthop"`, `"inetaddr"`) and never created or removed at
//! runtime, so a closed enum stands in for a name-keyed table.

use core::fmt;

use crate::addr::NetAddr;

/// Which condition a watch monitors.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    /// Fires on any confirmed next-hop deletion.
    NextHop = 0,
    /// Fires when an interface address equal to the target comes up.
    InetAddr = 1,
}

impl WatchKind {
    pub const COUNT: usize = 2;
    pub const ALL: [WatchKind; Self::COUNT] = [WatchKind::NextHop, WatchKind::InetAddr];

    /// Resource name used by the control interface.
    pub const fn name(self) -> &'static str {
        match self {
            WatchKind::NextHop => "nexthop",
            WatchKind::InetAddr => "inetaddr",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Dense index, usable for fixed-size tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access class carried with each watch.
///
/// Visibility hint only, in the familiar octal permission form. Nothing in
/// the core enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchMode(u16);

impl WatchMode {
    /// Owner read/write, everyone else read.
    pub const DEFAULT: WatchMode = WatchMode(0o644);

    pub const fn new(bits: u16) -> Self {
        WatchMode(bits & 0o777)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn owner_writable(self) -> bool {
        self.0 & 0o200 != 0
    }

    pub const fn world_readable(self) -> bool {
        self.0 & 0o004 != 0
    }
}

impl Default for WatchMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// What the dispatcher needs from the watch store.
///
/// **Contract:**
/// - `target()` is a snapshot of a single atomic 32-bit value.
/// - `notify()` must NEVER block and must not allocate.
pub trait WatchTable: Send + Sync {
    /// Current target of the watch (`UNSPECIFIED` when unset).
    fn target(&self, kind: WatchKind) -> NetAddr;

    /// Raise the watch's readiness signal.
    fn notify(&self, kind: WatchKind);
}

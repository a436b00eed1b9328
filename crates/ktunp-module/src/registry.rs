//! `WatchRegistry` — the fixed set of watches and their open handles.
//!
//! A watch is a target address plus a readiness channel. The target is a
//! single `AtomicU32`, so readers never see a partial write. Opening a
//! watch yields a `WatchHandle`, the analogue of an open file on the
//! watch's resource: pollable through its eventfd, and readable to both
//! fetch the current state and acknowledge the wakeup.

use ktunp_core::addr::{self, NetAddr};
use ktunp_core::error::{ParseError, Result};
use ktunp_core::watch::{WatchKind, WatchMode, WatchTable};

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::channel::{ChannelStats, ReadinessChannel};
use crate::control;
use crate::eventfd::EventFd;

pub struct Watch {
    kind: WatchKind,
    mode: WatchMode,
    target: AtomicU32,
    channel: ReadinessChannel,
}

impl Watch {
    fn new(kind: WatchKind, max_waiters: usize) -> Result<Self> {
        Ok(Self {
            kind,
            mode: WatchMode::DEFAULT,
            target: AtomicU32::new(NetAddr::UNSPECIFIED.raw()),
            channel: ReadinessChannel::new(kind.name(), max_waiters)?,
        })
    }

    pub fn kind(&self) -> WatchKind {
        self.kind
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    pub fn target(&self) -> NetAddr {
        NetAddr::from_raw(self.target.load(Ordering::Acquire))
    }

    pub fn channel(&self) -> &ReadinessChannel {
        &self.channel
    }
}

pub struct WatchRegistry {
    watches: [Watch; WatchKind::COUNT],
}

impl WatchRegistry {
    /// Allocate both watches, each with a waiter table of `max_waiters`.
    pub fn new(max_waiters: usize) -> Result<Self> {
        Ok(Self {
            watches: [
                Watch::new(WatchKind::NextHop, max_waiters)?,
                Watch::new(WatchKind::InetAddr, max_waiters)?,
            ],
        })
    }

    pub fn watch(&self, kind: WatchKind) -> &Watch {
        &self.watches[kind.index()]
    }

    pub fn watches(&self) -> impl Iterator<Item = &Watch> {
        self.watches.iter()
    }

    /// Current `(name, target)`; zero when never set.
    pub fn read(&self, kind: WatchKind) -> (&'static str, NetAddr) {
        (kind.name(), self.watch(kind).target())
    }

    /// Parse `literal` and replace the target.
    ///
    /// A literal that fails to parse, or parses to 0.0.0.0, leaves the
    /// configured target untouched.
    pub fn write(&self, kind: WatchKind, literal: &[u8]) -> std::result::Result<(), ParseError> {
        let addr = addr::parse(literal)?;
        self.watch(kind).target.store(addr.raw(), Ordering::Release);
        debug!(watch = kind.name(), target = %addr, "target updated");
        Ok(())
    }

    /// Open a pollable handle on the watch.
    pub fn open(self: &Arc<Self>, kind: WatchKind) -> Result<WatchHandle> {
        let (slot, efd) = self.watch(kind).channel.register()?;
        Ok(WatchHandle {
            registry: Arc::clone(self),
            kind,
            slot,
            efd,
        })
    }

    pub fn stats(&self, kind: WatchKind) -> ChannelStats {
        self.watch(kind).channel.stats()
    }
}

impl WatchTable for WatchRegistry {
    fn target(&self, kind: WatchKind) -> NetAddr {
        self.watch(kind).target()
    }

    fn notify(&self, kind: WatchKind) {
        self.watch(kind).channel.trigger();
    }
}

/// An open watch: one waiter on the watch's readiness channel.
///
/// Register it with an epoll instance in edge-triggered mode (see
/// `WatchPoller`); on wakeup call `read()`. Dropping the handle
/// deregisters the waiter.
pub struct WatchHandle {
    registry: Arc<WatchRegistry>,
    kind: WatchKind,
    slot: usize,
    efd: Arc<EventFd>,
}

impl WatchHandle {
    pub fn kind(&self) -> WatchKind {
        self.kind
    }

    /// Whether a trigger is waiting to be acknowledged by this handle.
    pub fn is_ready(&self) -> bool {
        self.registry.watch(self.kind).channel.is_waiter_signaled(self.slot)
    }

    /// Acknowledge any pending signal and write the current
    /// `"<name>: a.b.c.d\n"` line into `buf`, truncated to fit.
    ///
    /// Returns the number of bytes written. Readers always get current
    /// state, never a history of triggers.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.registry.watch(self.kind).channel.drain(self.slot)?;
        let (_, target) = self.registry.read(self.kind);
        Ok(control::render_into(self.kind, target, buf))
    }
}

impl AsFd for WatchHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.efd.as_fd()
    }
}

impl AsRawFd for WatchHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.efd.as_raw_fd()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.registry.watch(self.kind).channel.deregister(self.slot);
    }
}

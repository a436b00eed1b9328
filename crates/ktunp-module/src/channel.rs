//! `ReadinessChannel` — per-watch readiness signal.
//!
//! ```text
//!   Idle ──trigger()──▶ Signaled ──every registered waiter drained──▶ Idle
//! ```
//!
//! Each registered waiter owns a slot in a table preallocated at startup.
//! A slot is either caught up or signalled:
//!
//! - `trigger()` signals every caught-up waiter (one eventfd write each)
//!   and leaves already-signalled waiters alone. A burst of triggers
//!   therefore produces one edge per waiter.
//! - A waiter registering while the channel is `Signaled` starts out
//!   signalled with its eventfd already readable, so an edge-triggered
//!   epoll registration fires immediately. With no waiters registered a
//!   trigger stays pending until the first waiter registers and drains.
//! - `drain()` acknowledges one waiter. The channel returns to `Idle` once
//!   no registered waiter is still signalled.
//! - `deregister()` frees a slot without touching the other waiters.
//!
//! All of the above runs under the channel's spinlock, which is what rules
//! out a lost wakeup between "trigger happened" and "waiter registered".

use ktunp_core::error::{KtunpError, Result};
use ktunp_core::spinlock::SpinLock;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::eventfd::EventFd;

#[derive(Default)]
struct Slot {
    efd: Option<Arc<EventFd>>,
    signaled: bool,
}

struct ChannelState {
    /// `Signaled` in the state diagram.
    pending: bool,
    slots: Box<[Slot]>,
    registered: usize,
}

impl ChannelState {
    /// Reset to `Idle` once every registered waiter has caught up.
    fn settle(&mut self) {
        if self.pending && self.registered > 0 && !self.slots.iter().any(|s| s.signaled) {
            self.pending = false;
        }
    }
}

/// Snapshot of a channel's diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Total `trigger()` calls.
    pub triggers: u64,
    /// Triggers that signalled no waiter because all were already signalled.
    pub coalesced: u64,
    /// Waiters currently registered.
    pub waiters: usize,
}

pub struct ReadinessChannel {
    name: &'static str,
    state: SpinLock<ChannelState>,
    triggers: AtomicU64,
    coalesced: AtomicU64,
}

impl ReadinessChannel {
    /// Create a channel with room for `capacity` concurrent waiters.
    ///
    /// The waiter table is the only allocation; the trigger path never
    /// allocates afterwards.
    pub fn new(name: &'static str, capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| KtunpError::ResourceExhausted("waiter table"))?;
        slots.resize_with(capacity, Slot::default);

        Ok(Self {
            name,
            state: SpinLock::new(ChannelState {
                pending: false,
                slots: slots.into_boxed_slice(),
                registered: 0,
            }),
            triggers: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Raise the signal. Never blocks, never allocates.
    pub fn trigger(&self) {
        let mut state = self.state.lock();
        let was_pending = state.pending;
        state.pending = true;

        let mut woken = 0usize;
        for slot in state.slots.iter_mut() {
            let Some(efd) = slot.efd.as_ref() else { continue };
            if slot.signaled {
                continue;
            }
            slot.signaled = true;
            woken += 1;
            if let Err(e) = efd.signal() {
                warn!(watch = self.name, error = %e, "eventfd signal failed");
            }
        }
        drop(state);

        self.triggers.fetch_add(1, Ordering::Relaxed);
        if was_pending && woken == 0 {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Whether the channel is in `Signaled`.
    pub fn is_signaled(&self) -> bool {
        self.state.lock().pending
    }

    pub fn stats(&self) -> ChannelStats {
        let waiters = self.state.lock().registered;
        ChannelStats {
            triggers: self.triggers.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            waiters,
        }
    }

    /// Claim a waiter slot. Returns the slot index and its eventfd.
    pub(crate) fn register(&self) -> Result<(usize, Arc<EventFd>)> {
        let efd = Arc::new(EventFd::create()?);

        let mut state = self.state.lock();
        let index = state
            .slots
            .iter()
            .position(|s| s.efd.is_none())
            .ok_or(KtunpError::WaiterTableFull(self.name))?;

        let signaled = state.pending;
        if signaled {
            efd.signal()?;
        }
        state.slots[index] = Slot { efd: Some(Arc::clone(&efd)), signaled };
        state.registered += 1;

        Ok((index, efd))
    }

    /// Whether the waiter in `index` has an unacknowledged signal.
    pub(crate) fn is_waiter_signaled(&self, index: usize) -> bool {
        self.state.lock().slots.get(index).is_some_and(|s| s.signaled)
    }

    /// Acknowledge the waiter's signal and empty its eventfd.
    ///
    /// Returns whether a signal was pending for this waiter.
    pub(crate) fn drain(&self, index: usize) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(slot) = state.slots.get_mut(index) else {
            return Ok(false);
        };
        let Some(efd) = slot.efd.as_ref() else {
            return Ok(false);
        };
        efd.drain()?;
        let was_signaled = std::mem::replace(&mut slot.signaled, false);
        state.settle();
        Ok(was_signaled)
    }

    /// Release the waiter's slot.
    pub(crate) fn deregister(&self, index: usize) {
        let mut state = self.state.lock();
        let Some(slot) = state.slots.get_mut(index) else { return };
        if slot.efd.take().is_none() {
            return;
        }
        slot.signaled = false;
        state.registered -= 1;
        state.settle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_trigger_without_waiters_stays_pending() {
        let ch = ReadinessChannel::new("inetaddr", 4).unwrap();
        assert!(!ch.is_signaled());
        ch.trigger();
        assert!(ch.is_signaled());

        // Late waiter still sees it, eventfd already readable.
        let (idx, efd) = ch.register().unwrap();
        assert!(ch.is_waiter_signaled(idx));
        assert!(ch.drain(idx).unwrap());
        assert_eq!(efd.drain().unwrap(), 0);
        assert!(!ch.is_signaled());
    }

    #[test]
    fn test_burst_coalesces_to_one_edge() {
        let ch = ReadinessChannel::new("nexthop", 4).unwrap();
        let (idx, efd) = ch.register().unwrap();

        ch.trigger();
        ch.trigger();
        ch.trigger();

        assert_eq!(efd.drain().unwrap(), 1);
        assert!(ch.drain(idx).unwrap());
        assert!(!ch.drain(idx).unwrap());

        let stats = ch.stats();
        assert_eq!(stats.triggers, 3);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(stats.waiters, 1);
    }

    #[test]
    fn test_idle_after_every_waiter_drains() {
        let ch = ReadinessChannel::new("inetaddr", 4).unwrap();
        let (a, _) = ch.register().unwrap();
        let (b, _) = ch.register().unwrap();

        ch.trigger();
        assert!(ch.drain(a).unwrap());
        assert!(ch.is_signaled());

        // Registered after the trigger, before everyone drained: signalled.
        let (c, _) = ch.register().unwrap();
        assert!(ch.is_waiter_signaled(c));

        assert!(ch.drain(b).unwrap());
        assert!(ch.is_signaled());
        assert!(ch.drain(c).unwrap());
        assert!(!ch.is_signaled());
    }

    #[test]
    fn test_retrigger_after_drain_signals_again() {
        let ch = ReadinessChannel::new("nexthop", 2).unwrap();
        let (idx, efd) = ch.register().unwrap();

        ch.trigger();
        assert!(ch.drain(idx).unwrap());
        ch.trigger();
        assert!(ch.is_waiter_signaled(idx));
        assert_eq!(efd.drain().unwrap(), 1);
        assert_eq!(ch.stats().coalesced, 0);
    }

    #[test]
    fn test_deregister_leaves_other_waiters_alone() {
        let ch = ReadinessChannel::new("inetaddr", 4).unwrap();
        let (a, _) = ch.register().unwrap();
        let (b, _) = ch.register().unwrap();

        ch.trigger();
        ch.deregister(b);
        assert!(ch.is_waiter_signaled(a));
        assert!(ch.is_signaled());

        assert!(ch.drain(a).unwrap());
        assert!(!ch.is_signaled());
        assert_eq!(ch.stats().waiters, 1);

        // Double deregister is harmless.
        ch.deregister(b);
        assert_eq!(ch.stats().waiters, 1);
    }

    #[test]
    fn test_waiter_table_full() {
        let ch = ReadinessChannel::new("nexthop", 1).unwrap();
        let (idx, _) = ch.register().unwrap();
        assert!(matches!(ch.register(), Err(KtunpError::WaiterTableFull("nexthop"))));

        ch.deregister(idx);
        assert!(ch.register().is_ok());
    }

    #[test]
    fn test_concurrent_trigger_and_register_never_loses_wakeup() {
        for _ in 0..200 {
            let ch = Arc::new(ReadinessChannel::new("inetaddr", 2).unwrap());
            let barrier = Arc::new(Barrier::new(2));

            let trigger = {
                let ch = Arc::clone(&ch);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ch.trigger();
                })
            };
            let waiter = {
                let ch = Arc::clone(&ch);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ch.register().unwrap()
                })
            };

            trigger.join().unwrap();
            let (idx, efd) = waiter.join().unwrap();

            assert!(ch.is_waiter_signaled(idx));
            assert_eq!(efd.drain().unwrap(), 1);
        }
    }
}

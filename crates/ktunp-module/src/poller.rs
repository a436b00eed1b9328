//! `WatchPoller` — edge-triggered epoll over open watch handles.
//!
//! Each handle is registered `EPOLLIN | EPOLLET` with the watch index as
//! its token. A not-ready → ready transition of a handle produces one
//! event; the handle is not reported again until it is triggered anew,
//! whether or not it was read in between.

use ktunp_core::error::{KtunpError, Result};
use ktunp_core::watch::WatchKind;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use std::time::Duration;

use crate::registry::WatchHandle;

/// Set of watches reported ready by one `wait()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadySet(u8);

impl ReadySet {
    pub fn insert(&mut self, kind: WatchKind) {
        self.0 |= 1 << kind.index();
    }

    pub fn contains(self, kind: WatchKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = WatchKind> {
        WatchKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

pub struct WatchPoller {
    epoll: Epoll,
    events: Box<[EpollEvent]>,
}

fn os(e: Errno) -> KtunpError {
    KtunpError::Os(e as i32)
}

impl WatchPoller {
    /// `max_events` bounds how many readiness events one wait collects.
    pub fn new(max_events: usize) -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(os)?;
        Ok(Self {
            epoll,
            events: vec![EpollEvent::empty(); max_events.max(1)].into_boxed_slice(),
        })
    }

    pub fn register(&self, handle: &WatchHandle) -> Result<()> {
        let flags = EpollFlags::EPOLLIN | EpollFlags::EPOLLET;
        let token = handle.kind().index() as u64;
        self.epoll.add(handle, EpollEvent::new(flags, token)).map_err(os)
    }

    /// Stop watching `handle`. Other registrations and the channel's
    /// state for other waiters are unaffected.
    pub fn deregister(&self, handle: &WatchHandle) -> Result<()> {
        self.epoll.delete(handle).map_err(os)
    }

    /// Block until at least one registered handle becomes ready.
    ///
    /// `None` waits indefinitely. An interrupted wait returns an empty set.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<ReadySet> {
        let timeout = match timeout {
            None => EpollTimeout::NONE,
            Some(d) => EpollTimeout::try_from(d).unwrap_or(EpollTimeout::MAX),
        };

        let n = match self.epoll.wait(&mut self.events, timeout) {
            Ok(n) => n,
            Err(Errno::EINTR) => 0,
            Err(e) => return Err(os(e)),
        };

        let mut ready = ReadySet::default();
        for ev in &self.events[..n] {
            if let Some(kind) = WatchKind::from_index(ev.data() as usize) {
                ready.insert(kind);
            }
        }
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WatchRegistry;
    use ktunp_core::watch::WatchTable;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    const SHORT: Option<Duration> = Some(Duration::from_millis(20));

    fn setup() -> (Arc<WatchRegistry>, WatchHandle, WatchHandle, WatchPoller) {
        let reg = Arc::new(WatchRegistry::new(4).unwrap());
        let nh = reg.open(WatchKind::NextHop).unwrap();
        let ia = reg.open(WatchKind::InetAddr).unwrap();
        let poller = WatchPoller::new(10).unwrap();
        poller.register(&nh).unwrap();
        poller.register(&ia).unwrap();
        (reg, nh, ia, poller)
    }

    #[test]
    fn test_nothing_ready_times_out() {
        let (_reg, _nh, _ia, mut poller) = setup();
        assert!(poller.wait(SHORT).unwrap().is_empty());
    }

    #[test]
    fn test_only_triggered_watch_reported() {
        let (reg, _nh, ia, mut poller) = setup();
        reg.notify(WatchKind::InetAddr);

        let ready = poller.wait(SHORT).unwrap();
        assert!(ready.contains(WatchKind::InetAddr));
        assert!(!ready.contains(WatchKind::NextHop));
        assert_eq!(ready.len(), 1);
        assert!(ia.is_ready());
    }

    #[test]
    fn test_burst_yields_single_edge() {
        let (reg, nh, _ia, mut poller) = setup();
        reg.notify(WatchKind::NextHop);
        reg.notify(WatchKind::NextHop);

        assert_eq!(poller.wait(SHORT).unwrap().iter().collect::<Vec<_>>(), [WatchKind::NextHop]);
        // Edge-triggered: no re-report while unread.
        assert!(poller.wait(SHORT).unwrap().is_empty());

        let mut buf = [0u8; 100];
        nh.read(&mut buf).unwrap();
        assert!(poller.wait(SHORT).unwrap().is_empty());

        reg.notify(WatchKind::NextHop);
        assert!(poller.wait(SHORT).unwrap().contains(WatchKind::NextHop));
    }

    #[test]
    fn test_late_registration_sees_earlier_trigger() {
        let reg = Arc::new(WatchRegistry::new(4).unwrap());
        reg.notify(WatchKind::InetAddr);

        let handle = reg.open(WatchKind::InetAddr).unwrap();
        let mut poller = WatchPoller::new(4).unwrap();
        poller.register(&handle).unwrap();
        assert!(poller.wait(SHORT).unwrap().contains(WatchKind::InetAddr));
    }

    #[test]
    fn test_each_waiter_gets_its_own_edge() {
        let reg = Arc::new(WatchRegistry::new(4).unwrap());
        let a = reg.open(WatchKind::NextHop).unwrap();
        let b = reg.open(WatchKind::NextHop).unwrap();
        let mut pa = WatchPoller::new(4).unwrap();
        let mut pb = WatchPoller::new(4).unwrap();
        pa.register(&a).unwrap();
        pb.register(&b).unwrap();

        reg.notify(WatchKind::NextHop);
        assert!(pa.wait(SHORT).unwrap().contains(WatchKind::NextHop));
        let mut buf = [0u8; 100];
        a.read(&mut buf).unwrap();
        // a's read does not consume b's wakeup.
        assert!(pb.wait(SHORT).unwrap().contains(WatchKind::NextHop));
    }

    #[test]
    fn test_deregistered_handle_not_reported() {
        let (reg, nh, ia, mut poller) = setup();
        poller.deregister(&nh).unwrap();
        reg.notify(WatchKind::NextHop);
        assert!(poller.wait(SHORT).unwrap().is_empty());
        assert!(nh.is_ready());

        reg.notify(WatchKind::InetAddr);
        assert!(poller.wait(SHORT).unwrap().contains(WatchKind::InetAddr));
        drop(ia);
    }

    #[test]
    fn test_blocked_waiter_wakes_on_trigger() {
        let (reg, _nh, ia, mut poller) = setup();
        reg.write(WatchKind::InetAddr, b"192.0.2.1").unwrap();

        let notifier = {
            let reg = Arc::clone(&reg);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                reg.notify(WatchKind::InetAddr);
            })
        };

        let start = Instant::now();
        let ready = poller.wait(Some(Duration::from_secs(5))).unwrap();
        assert!(ready.contains(WatchKind::InetAddr));
        assert!(start.elapsed() < Duration::from_secs(5));
        notifier.join().unwrap();

        let mut buf = [0u8; 100];
        let n = ia.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"inetaddr: 192.0.2.1\n");
    }
}

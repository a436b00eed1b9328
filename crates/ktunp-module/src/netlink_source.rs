//! `NetlinkSource` — rtnetlink event source (Linux).
//!
//! Each subscription opens its own `NETLINK_ROUTE` socket and a reader
//! thread:
//!
//! | Stream  | Group                | Message          | Event            |
//! |---------|----------------------|------------------|------------------|
//! | address | `RTMGRP_IPV4_IFADDR` | `RTM_NEWADDR`    | `AddressUp`      |
//! | nexthop | `RTNLGRP_NEXTHOP`    | `RTM_DELNEXTHOP` | `NextHopDeleted` |
//!
//! A netlink socket sees the namespace the process lives in, so only that
//! namespace is served. The reader polls with a bounded interval so that
//! dropping the subscription joins the thread promptly.

use ktunp_core::addr::NetAddr;
use ktunp_core::error::SubscriptionError;
use ktunp_core::event::{Event, NetNsId, NexthopId};
use ktunp_core::source::{AddrEventSource, EventSink, NexthopEventSource, Stream, Subscription};

use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

// ── rtnetlink items libc does not export (linux/rtnetlink.h, linux/nexthop.h) ──
const NLMSG_HDRLEN: usize = mem::size_of::<libc::nlmsghdr>();
const RTA_HDRLEN: usize = 4;
const NLA_TYPE_MASK: u16 = libc::NLA_TYPE_MASK as u16;

const RTM_DELNEXTHOP: u16 = 105;
const RTNLGRP_NEXTHOP: u32 = 32;

const IFADDRMSG_LEN: usize = 8;

const NHMSG_LEN: usize = 8;
const NHA_ID: u16 = 1;

#[inline]
const fn nl_align(len: usize) -> usize {
    (len + 3) & !3
}

fn ne_u16(b: &[u8]) -> u16 {
    u16::from_ne_bytes([b[0], b[1]])
}

fn ne_u32(b: &[u8]) -> u32 {
    u32::from_ne_bytes([b[0], b[1], b[2], b[3]])
}

/// Iterator over `(type, value)` route attributes.
struct Attrs<'a> {
    buf: &'a [u8],
}

impl<'a> Iterator for Attrs<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < RTA_HDRLEN {
            return None;
        }
        let len = ne_u16(self.buf) as usize;
        let ty = ne_u16(&self.buf[2..]) & NLA_TYPE_MASK;
        if len < RTA_HDRLEN || len > self.buf.len() {
            return None;
        }
        let value = &self.buf[RTA_HDRLEN..len];
        self.buf = &self.buf[nl_align(len).min(self.buf.len())..];
        Some((ty, value))
    }
}

fn find_attr(attrs: &[u8], wanted: u16) -> Option<&[u8]> {
    Attrs { buf: attrs }.find(|(ty, _)| *ty == wanted).map(|(_, v)| v)
}

fn decode_newaddr(payload: &[u8]) -> Option<NetAddr> {
    if payload.len() < IFADDRMSG_LEN || payload[0] != libc::AF_INET as u8 {
        return None;
    }
    let value = find_attr(&payload[IFADDRMSG_LEN..], libc::IFA_ADDRESS)?;
    let octets: [u8; 4] = value.get(..4)?.try_into().ok()?;
    Some(NetAddr::from_octets(octets))
}

fn decode_delnexthop(payload: &[u8]) -> Option<NexthopId> {
    if payload.len() < NHMSG_LEN {
        return None;
    }
    let value = find_attr(&payload[NHMSG_LEN..], NHA_ID)?;
    (value.len() >= 4).then(|| NexthopId(ne_u32(value)))
}

/// Decode every message in a netlink datagram, emitting the events of
/// interest. Unknown message types are skipped; a truncated message ends
/// the walk.
pub fn decode(buf: &[u8], netns: NetNsId, mut emit: impl FnMut(Event)) {
    let mut off = 0usize;
    while off + NLMSG_HDRLEN <= buf.len() {
        let len = ne_u32(&buf[off..]) as usize;
        let ty = ne_u16(&buf[off + 4..]);
        if len < NLMSG_HDRLEN || off + len > buf.len() {
            break;
        }
        let payload = &buf[off + NLMSG_HDRLEN..off + len];
        match ty {
            libc::RTM_NEWADDR => {
                if let Some(address) = decode_newaddr(payload) {
                    emit(Event::AddressUp { netns, address });
                }
            }
            RTM_DELNEXTHOP => {
                if let Some(nexthop_id) = decode_delnexthop(payload) {
                    emit(Event::NextHopDeleted { netns, nexthop_id });
                }
            }
            _ => {}
        }
        off += nl_align(len);
    }
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

struct NlSocket {
    fd: OwnedFd,
}

impl NlSocket {
    /// Open a route socket bound to the legacy `groups` mask, then join
    /// `extra` multicast groups by number.
    fn open(groups: u32, extra: &[u32]) -> Result<Self, i32> {
        let fd = unsafe {
            libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_CLOEXEC, libc::NETLINK_ROUTE)
        };
        if fd < 0 {
            return Err(errno());
        }
        // Safety: fd was just returned by socket() and is owned by nobody else
        let sock = Self { fd: unsafe { OwnedFd::from_raw_fd(fd) } };

        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_groups = groups;
        let rc = unsafe {
            libc::bind(
                sock.fd.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(errno());
        }

        for group in extra {
            let rc = unsafe {
                libc::setsockopt(
                    sock.fd.as_raw_fd(),
                    libc::SOL_NETLINK,
                    libc::NETLINK_ADD_MEMBERSHIP,
                    group as *const u32 as *const libc::c_void,
                    std::mem::size_of::<u32>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                return Err(errno());
            }
        }
        Ok(sock)
    }

    /// Wait up to `timeout_ms` for a datagram. `Ok(None)` when none arrived.
    fn recv(&self, buf: &mut [u8], timeout_ms: i32) -> Result<Option<usize>, i32> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let e = errno();
            return if e == libc::EINTR { Ok(None) } else { Err(e) };
        }
        if rc == 0 {
            return Ok(None);
        }
        let n = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if n < 0 {
            let e = errno();
            return if e == libc::EAGAIN || e == libc::EINTR { Ok(None) } else { Err(e) };
        }
        Ok(Some(n as usize))
    }
}

/// rtnetlink-backed source for both event streams.
#[derive(Debug, Clone)]
pub struct NetlinkSource {
    netns: NetNsId,
    poll_interval: Duration,
    recv_buffer: usize,
}

impl NetlinkSource {
    /// `netns` is the id the process's own namespace is known by.
    pub fn new(netns: NetNsId, poll_interval: Duration, recv_buffer: usize) -> Self {
        Self { netns, poll_interval, recv_buffer }
    }

    fn spawn(
        &self,
        stream: Stream,
        groups: u32,
        extra: &[u32],
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn Subscription>, SubscriptionError> {
        let sock = NlSocket::open(groups, extra)
            .map_err(|errno| SubscriptionError::Os { stream, errno })?;

        let timeout_ms = self.poll_interval.as_millis().clamp(1, i32::MAX as u128) as i32;
        let sub = NetlinkSubscription::start(
            sock,
            stream,
            self.netns,
            sink,
            timeout_ms,
            self.recv_buffer,
        )
        .map_err(|e| SubscriptionError::Os { stream, errno: e.raw_os_error().unwrap_or(0) })?;

        info!(%stream, "netlink subscription started");
        Ok(Box::new(sub))
    }
}

impl AddrEventSource for NetlinkSource {
    fn subscribe_addr(
        &self,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn Subscription>, SubscriptionError> {
        self.spawn(Stream::Addr, libc::RTMGRP_IPV4_IFADDR as u32, &[], sink)
    }
}

impl NexthopEventSource for NetlinkSource {
    fn subscribe_nexthop(
        &self,
        netns: NetNsId,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn Subscription>, SubscriptionError> {
        if netns != self.netns {
            return Err(SubscriptionError::UnsupportedNamespace(netns));
        }
        self.spawn(Stream::Nexthop(netns), 0, &[RTNLGRP_NEXTHOP], sink)
    }
}

struct Reader {
    sock: NlSocket,
    netns: NetNsId,
    sink: Arc<dyn EventSink>,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    timeout_ms: i32,
    buf: Vec<u8>,
    stream: Stream,
}

impl Reader {
    fn run(mut self) {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.sock.recv(&mut self.buf, self.timeout_ms) {
                Ok(None) => {}
                Ok(Some(n)) => {
                    let sink = &self.sink;
                    decode(&self.buf[..n], self.netns, |ev| sink.deliver(ev));
                }
                Err(libc::ENOBUFS) => {
                    // The kernel dropped messages. Their events are gone and
                    // no watch will fire for them.
                    warn!(stream = %self.stream, "netlink receive buffer overrun, events lost");
                }
                Err(errno) => {
                    self.alive.store(false, Ordering::Release);
                    error!(stream = %self.stream, errno, "netlink reader failed, stream is dead");
                    break;
                }
            }
        }
        debug!(stream = %self.stream, "netlink reader exit");
    }
}

struct NetlinkSubscription {
    stream: Stream,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NetlinkSubscription {
    fn start(
        sock: NlSocket,
        stream: Stream,
        netns: NetNsId,
        sink: Arc<dyn EventSink>,
        timeout_ms: i32,
        recv_buffer: usize,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let reader = Reader {
            sock,
            netns,
            sink,
            shutdown: Arc::clone(&shutdown),
            alive: Arc::clone(&alive),
            timeout_ms,
            buf: vec![0u8; recv_buffer.max(NLMSG_HDRLEN)],
            stream,
        };

        let thread = thread::Builder::new()
            .name(format!("ktunp-nl-{}", stream))
            .spawn(move || reader.run())?;

        Ok(Self { stream, shutdown, alive, thread: Some(thread) })
    }
}

impl Subscription for NetlinkSubscription {
    fn stream(&self) -> Stream {
        self.stream
    }

    fn is_live(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for NetlinkSubscription {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        info!(stream = %self.stream, "netlink subscription stopped");
    }
}

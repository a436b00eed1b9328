//! Control/query interface over the named watch resources.
//!
//! Two resources, `nexthop` and `inetaddr`:
//! - show renders `"<name>: a.b.c.d\n"` into a caller buffer.
//! - store parses a literal and updates the target. The return value is a
//!   fixed acknowledgement length whether or not the literal was accepted.

use ktunp_core::addr::NetAddr;
use ktunp_core::watch::WatchKind;

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::debug;

use crate::registry::WatchRegistry;

/// Length returned by every store, accepted or not.
pub const STORE_ACK_LEN: usize = std::mem::size_of::<i32>();

/// Longest possible rendered line (`"inetaddr: 255.255.255.255\n"`).
pub const MAX_LINE_LEN: usize = 26;

/// `fmt::Write` over a fixed buffer that silently truncates.
struct Truncating<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl std::fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let room = self.buf.len() - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Write the watch line into `buf`; returns bytes written.
pub fn render_into(kind: WatchKind, target: NetAddr, buf: &mut [u8]) -> usize {
    let mut w = Truncating { buf, len: 0 };
    let _ = writeln!(w, "{}: {}", kind.name(), target);
    w.len
}

/// Owned rendering of the watch line.
pub fn render(kind: WatchKind, target: NetAddr) -> String {
    format!("{}: {}\n", kind.name(), target)
}

/// Name-addressed front end to the registry.
#[derive(Clone)]
pub struct ControlPlane {
    registry: Arc<WatchRegistry>,
}

impl ControlPlane {
    pub fn new(registry: Arc<WatchRegistry>) -> Self {
        Self { registry }
    }

    /// Resource names, in watch order.
    pub fn resources(&self) -> impl Iterator<Item = &'static str> {
        WatchKind::ALL.into_iter().map(WatchKind::name)
    }

    /// Render resource `name` into `buf`. `None` for an unknown name.
    pub fn show(&self, name: &str, buf: &mut [u8]) -> Option<usize> {
        let kind = WatchKind::from_name(name)?;
        let (_, target) = self.registry.read(kind);
        Some(render_into(kind, target, buf))
    }

    pub fn show_line(&self, name: &str) -> Option<String> {
        let kind = WatchKind::from_name(name)?;
        let (_, target) = self.registry.read(kind);
        Some(render(kind, target))
    }

    /// Store `input` into resource `name`. `None` for an unknown name.
    pub fn store(&self, name: &str, input: &[u8]) -> Option<usize> {
        let kind = WatchKind::from_name(name)?;
        if let Err(e) = self.registry.write(kind, input) {
            debug!(watch = name, error = %e, "store ignored");
        }
        Some(STORE_ACK_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane() -> ControlPlane {
        ControlPlane::new(Arc::new(WatchRegistry::new(2).unwrap()))
    }

    #[test]
    fn test_show_unset() {
        let cp = plane();
        assert_eq!(cp.show_line("nexthop").unwrap(), "nexthop: 0.0.0.0\n");
        assert_eq!(cp.show_line("inetaddr").unwrap(), "inetaddr: 0.0.0.0\n");
        assert!(cp.show_line("route").is_none());
    }

    #[test]
    fn test_store_then_show() {
        let cp = plane();
        assert_eq!(cp.store("nexthop", b"10.0.0.5\n"), Some(STORE_ACK_LEN));
        assert_eq!(cp.show_line("nexthop").unwrap(), "nexthop: 10.0.0.5\n");
    }

    #[test]
    fn test_rejected_store_still_acknowledges() {
        let cp = plane();
        cp.store("inetaddr", b"192.0.2.1");
        assert_eq!(cp.store("inetaddr", b"0.0.0.0"), Some(STORE_ACK_LEN));
        assert_eq!(cp.store("inetaddr", b"bogus"), Some(STORE_ACK_LEN));
        assert_eq!(cp.show_line("inetaddr").unwrap(), "inetaddr: 192.0.2.1\n");
        assert_eq!(cp.store("route", b"1.2.3.4"), None);
    }

    #[test]
    fn test_render_truncates() {
        let addr = NetAddr::from_octets([255, 255, 255, 255]);
        let mut buf = [0u8; MAX_LINE_LEN];
        assert_eq!(render_into(WatchKind::InetAddr, addr, &mut buf), MAX_LINE_LEN);
        assert_eq!(&buf[..], b"inetaddr: 255.255.255.255\n");

        let mut small = [0u8; 8];
        assert_eq!(render_into(WatchKind::InetAddr, addr, &mut small), 8);
        assert_eq!(&small, b"inetaddr");

        let mut buf = [0u8; 64];
        let n = ControlPlane::new(Arc::new(WatchRegistry::new(1).unwrap()))
            .show("nexthop", &mut buf)
            .unwrap();
        assert_eq!(&buf[..n], b"nexthop: 0.0.0.0\n");
    }

    #[test]
    fn test_resources() {
        let names: Vec<_> = plane().resources().collect();
        assert_eq!(names, ["nexthop", "inetaddr"]);
    }
}

//! Pipeline configuration.
//!
//! Library defaults with runtime environment overrides:
//!
//! ```rust,ignore
//! use ktunp_module::config::PipelineConfig;
//!
//! // Defaults with env overrides
//! let config = PipelineConfig::from_env();
//!
//! // Or customize programmatically
//! let config = PipelineConfig::new()
//!     .max_waiters(4)
//!     .namespaces(vec![NetNsId(0), NetNsId(3)])
//!     .inetaddr("192.0.2.1");
//! ```

use ktunp_core::env::{env_get, env_get_list, env_get_opt};
use ktunp_core::event::NetNsId;

use std::time::Duration;

/// Library defaults.
pub mod defaults {
    /// Waiter table capacity per watch.
    pub const MAX_WAITERS: usize = 16;
    /// Namespaces whose next-hop stream is subscribed.
    pub const NAMESPACES: &[u32] = &[0];
    /// Netlink reader poll interval.
    pub const POLL_INTERVAL_MS: u64 = 200;
    /// Netlink receive buffer, bytes.
    pub const RECV_BUFFER: usize = 8192;
    /// Events collected per multiplexer wait.
    pub const MAX_EVENTS: usize = 10;
    /// Bytes read from a handle per wakeup.
    pub const READ_SIZE: usize = 100;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Waiter table capacity per watch
    pub max_waiters: usize,
    /// Namespaces subscribed for next-hop deletions
    pub namespaces: Vec<NetNsId>,
    /// Netlink reader poll interval
    pub poll_interval: Duration,
    /// Netlink receive buffer size
    pub recv_buffer: usize,
    /// Max events per epoll wait
    pub max_events: usize,
    /// Bytes per handle read
    pub read_size: usize,
    /// Initial `nexthop` target literal
    pub nexthop: Option<String>,
    /// Initial `inetaddr` target literal
    pub inetaddr: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `KTUNP_MAX_WAITERS` - Waiter table capacity per watch
    /// - `KTUNP_NAMESPACES` - Comma-separated namespace ids
    /// - `KTUNP_POLL_INTERVAL_MS` - Netlink poll interval in milliseconds
    /// - `KTUNP_RECV_BUFFER` - Netlink receive buffer in bytes
    /// - `KTUNP_MAX_EVENTS` - Events per epoll wait
    /// - `KTUNP_READ_SIZE` - Bytes per handle read
    /// - `KTUNP_NEXTHOP` - Initial nexthop target
    /// - `KTUNP_INETADDR` - Initial inetaddr target
    pub fn from_env() -> Self {
        let namespaces = env_get_list("KTUNP_NAMESPACES", defaults::NAMESPACES.to_vec());
        Self {
            max_waiters: env_get("KTUNP_MAX_WAITERS", defaults::MAX_WAITERS),
            namespaces: namespaces.into_iter().map(NetNsId).collect(),
            poll_interval: Duration::from_millis(env_get(
                "KTUNP_POLL_INTERVAL_MS",
                defaults::POLL_INTERVAL_MS,
            )),
            recv_buffer: env_get("KTUNP_RECV_BUFFER", defaults::RECV_BUFFER),
            max_events: env_get("KTUNP_MAX_EVENTS", defaults::MAX_EVENTS),
            read_size: env_get("KTUNP_READ_SIZE", defaults::READ_SIZE),
            nexthop: env_get_opt("KTUNP_NEXTHOP"),
            inetaddr: env_get_opt("KTUNP_INETADDR"),
        }
    }

    /// Pure defaults, no environment lookups.
    pub fn new() -> Self {
        Self {
            max_waiters: defaults::MAX_WAITERS,
            namespaces: defaults::NAMESPACES.iter().copied().map(NetNsId).collect(),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            recv_buffer: defaults::RECV_BUFFER,
            max_events: defaults::MAX_EVENTS,
            read_size: defaults::READ_SIZE,
            nexthop: None,
            inetaddr: None,
        }
    }

    pub fn max_waiters(mut self, n: usize) -> Self {
        self.max_waiters = n;
        self
    }

    pub fn namespaces(mut self, namespaces: Vec<NetNsId>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn recv_buffer(mut self, bytes: usize) -> Self {
        self.recv_buffer = bytes;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn read_size(mut self, bytes: usize) -> Self {
        self.read_size = bytes;
        self
    }

    pub fn nexthop(mut self, literal: impl Into<String>) -> Self {
        self.nexthop = Some(literal.into());
        self
    }

    pub fn inetaddr(mut self, literal: impl Into<String>) -> Self {
        self.inetaddr = Some(literal.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_env::with_vars;

    const ALL_VARS: [&str; 8] = [
        "KTUNP_MAX_WAITERS",
        "KTUNP_NAMESPACES",
        "KTUNP_POLL_INTERVAL_MS",
        "KTUNP_RECV_BUFFER",
        "KTUNP_MAX_EVENTS",
        "KTUNP_READ_SIZE",
        "KTUNP_NEXTHOP",
        "KTUNP_INETADDR",
    ];

    #[test]
    fn test_new_is_pure_defaults() {
        let cfg = PipelineConfig::new();
        assert_eq!(cfg.max_waiters, 16);
        assert_eq!(cfg.namespaces, vec![NetNsId(0)]);
        assert_eq!(cfg.poll_interval, Duration::from_millis(200));
        assert_eq!(cfg.recv_buffer, 8192);
        assert_eq!(cfg.max_events, 10);
        assert_eq!(cfg.read_size, 100);
        assert!(cfg.nexthop.is_none() && cfg.inetaddr.is_none());
    }

    #[test]
    fn test_from_env_without_overrides() {
        let unset: Vec<(&str, Option<&str>)> = ALL_VARS.iter().map(|k| (*k, None)).collect();
        with_vars(unset, || {
            assert_eq!(PipelineConfig::from_env(), PipelineConfig::new());
        });
    }

    #[test]
    fn test_from_env_overrides() {
        with_vars(
            [
                ("KTUNP_MAX_WAITERS", Some("4")),
                ("KTUNP_NAMESPACES", Some("0,3")),
                ("KTUNP_POLL_INTERVAL_MS", Some("50")),
                ("KTUNP_RECV_BUFFER", Some("junk")),
                ("KTUNP_MAX_EVENTS", None),
                ("KTUNP_READ_SIZE", Some("64")),
                ("KTUNP_NEXTHOP", None),
                ("KTUNP_INETADDR", Some("192.0.2.1")),
            ],
            || {
                let cfg = PipelineConfig::from_env();
                assert_eq!(cfg.max_waiters, 4);
                assert_eq!(cfg.namespaces, vec![NetNsId(0), NetNsId(3)]);
                assert_eq!(cfg.poll_interval, Duration::from_millis(50));
                assert_eq!(cfg.recv_buffer, defaults::RECV_BUFFER);
                assert_eq!(cfg.max_events, defaults::MAX_EVENTS);
                assert_eq!(cfg.read_size, 64);
                assert_eq!(cfg.nexthop, None);
                assert_eq!(cfg.inetaddr.as_deref(), Some("192.0.2.1"));
            },
        );
    }

    #[test]
    fn test_builder_setters() {
        let cfg = PipelineConfig::new()
            .max_waiters(2)
            .namespaces(vec![NetNsId(5)])
            .poll_interval(Duration::from_millis(10))
            .recv_buffer(1024)
            .max_events(4)
            .read_size(32)
            .nexthop("10.0.0.5")
            .inetaddr("192.0.2.1");
        assert_eq!(cfg.max_waiters, 2);
        assert_eq!(cfg.namespaces, vec![NetNsId(5)]);
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
        assert_eq!(cfg.recv_buffer, 1024);
        assert_eq!(cfg.max_events, 4);
        assert_eq!(cfg.read_size, 32);
        assert_eq!(cfg.nexthop.as_deref(), Some("10.0.0.5"));
        assert_eq!(cfg.inetaddr.as_deref(), Some("192.0.2.1"));
    }
}

//! # ktunp-core — Types and trait seams for KTUNP
//!
//! KTUNP (Kernel To User Notification Pipeline) bridges network-state
//! events (next-hop removal, interface address up) to user-space consumers
//! through per-watch readiness channels that an epoll loop can wait on.
//!
//! This crate is platform-agnostic. It defines the data model and the
//! trait boundaries every implementation in `ktunp-module` plugs into:
//!
//! | Seam                 | Role                                           |
//! |----------------------|------------------------------------------------|
//! | `WatchTable`         | target lookup + readiness trigger per watch    |
//! | `EventSink`          | receives typed events from an event source     |
//! | `AddrEventSource`    | interface-address-up subscription              |
//! | `NexthopEventSource` | per-namespace next-hop deletion subscription   |
//! | `Subscription`       | live registration, torn down on drop           |
//! | `NexthopResolver`    | confirms a deleted next-hop during dispatch    |
//!
//! ## Modules
//!
//! - `addr` - dotted-decimal parser and `NetAddr`
//! - `watch` - watch identity, mode and the `WatchTable` seam
//! - `event` - event union and namespace / next-hop identifiers
//! - `source` - subscription contracts
//! - `error` - error taxonomy
//! - `spinlock` - per-watch exclusive-access lock
//! - `env` - environment variable helpers for configuration

pub mod addr;
pub mod watch;
pub mod event;
pub mod source;
pub mod error;
pub mod spinlock;
pub mod env;

// Re-exports for convenience
pub use addr::{in_aton, parse, NetAddr};
pub use watch::{WatchKind, WatchMode, WatchTable};
pub use event::{Event, NetNsId, NexthopId};
pub use source::{
    AddrEventSource, EventSink, NexthopEventSource, NexthopResolver, Resolution, Stream,
    Subscription,
};
pub use error::{KtunpError, ParseError, Result, SubscriptionError};
pub use spinlock::SpinLock;
pub use env::{env_get, env_get_list, env_get_opt};

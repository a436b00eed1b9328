//! # ktunp-module — Default implementations
//!
//! Concrete implementations of every `ktunp-core` seam, plus the pipeline
//! that wires them together.
//!
//! ## Default stack
//!
//! | Seam                 | Default Impl          | Alternative                |
//! |----------------------|-----------------------|----------------------------|
//! | readiness channel    | `ReadinessChannel`    | (eventfd per waiter)       |
//! | `WatchTable`         | `WatchRegistry`       | any impl (tests record)    |
//! | `EventSink`          | `Dispatcher`          |                            |
//! | `NexthopResolver`    | `ConfirmedByNotifier` | closures                   |
//! | `AddrEventSource`    | `NetlinkSource`       | `ManualSource`             |
//! | `NexthopEventSource` | `NetlinkSource`       | `ManualSource`             |
//! | multiplexer          | `WatchPoller` (epoll) | any poll/epoll on the fd   |

pub mod eventfd;
pub mod channel;
pub mod registry;
pub mod control;
pub mod dispatcher;
pub mod poller;
pub mod manual_source;
pub mod config;
pub mod pipeline;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod netlink_source;
        pub use netlink_source::NetlinkSource;
    }
}

pub use channel::{ChannelStats, ReadinessChannel};
pub use config::PipelineConfig;
pub use control::ControlPlane;
pub use dispatcher::{ConfirmedByNotifier, Dispatch, DispatchStats, Dispatcher, DropReason};
pub use manual_source::ManualSource;
pub use pipeline::{Pipeline, PipelineBuilder, PipelineDispatcher};
pub use poller::{ReadySet, WatchPoller};
pub use registry::{WatchHandle, WatchRegistry};

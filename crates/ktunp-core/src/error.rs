//! KTUNP error types.
//!
//! None of these reach a consumer. A rejected control write is a silent
//! no-op, a lookup miss drops the event, and subscription or allocation
//! failures only happen while the pipeline is starting.

use crate::event::NetNsId;
use crate::source::Stream;

pub type Result<T> = std::result::Result<T, KtunpError>;

/// Rejected address literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Dotted literal did not contain exactly three separators.
    #[error("expected 3 dot separators, found {0}")]
    SegmentCount(u32),

    /// Literal packed to 0.0.0.0, which is also the failure sentinel.
    #[error("address literal is unspecified")]
    Unspecified,
}

/// Event-source registration failure. Fatal to startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// OS-level failure while opening or binding the source.
    #[error("{stream} subscription failed: errno {errno}")]
    Os { stream: Stream, errno: i32 },

    /// The source cannot observe the requested namespace.
    #[error("namespace {0} is not served by this source")]
    UnsupportedNamespace(NetNsId),

    /// The source refused the registration.
    #[error("{0} subscription refused")]
    Refused(Stream),
}

#[derive(Debug, thiserror::Error)]
pub enum KtunpError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Startup allocation failed.
    #[error("out of memory allocating {0}")]
    ResourceExhausted(&'static str),

    /// Every waiter slot of the watch is in use.
    #[error("waiter table full for {0}")]
    WaiterTableFull(&'static str),

    /// OS error with errno.
    #[error("OS error: errno {0}")]
    Os(i32),
}

impl KtunpError {
    /// Capture `errno` from the last failed libc call.
    pub fn last_os_error() -> Self {
        KtunpError::Os(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }
}

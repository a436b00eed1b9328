//! `EventFd` — the per-waiter wakeup primitive.
//!
//! Each opened watch handle owns one eventfd. The readiness channel writes
//! to it on trigger; the handle's fd is what a consumer registers with
//! epoll. Coalescing: several `signal()` calls before a `drain()` leave the
//! fd readable once (counter semantics, one read drains).

use ktunp_core::error::{KtunpError, Result};

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

pub struct EventFd {
    fd: OwnedFd,
}

impl EventFd {
    /// Create a new `EFD_NONBLOCK | EFD_CLOEXEC` eventfd. Closed on drop.
    pub fn create() -> Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(KtunpError::last_os_error());
        }
        // Safety: fd was just returned by eventfd() and is owned by nobody else
        Ok(Self { fd: unsafe { OwnedFd::from_raw_fd(fd) } })
    }

    /// Add 1 to the counter. Never blocks.
    pub fn signal(&self) -> Result<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = KtunpError::last_os_error();
            // EAGAIN: counter would overflow, a signal is already pending.
            if matches!(err, KtunpError::Os(libc::EAGAIN)) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Read and reset the counter. Returns 0 if nothing was pending.
    pub fn drain(&self) -> Result<u64> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = KtunpError::last_os_error();
            if matches!(err, KtunpError::Os(libc::EAGAIN)) {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(val)
    }
}

impl AsFd for EventFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empty_is_zero() {
        let efd = EventFd::create().unwrap();
        assert_eq!(efd.drain().unwrap(), 0);
    }

    #[test]
    fn test_signals_accumulate_one_read_drains() {
        let efd = EventFd::create().unwrap();
        efd.signal().unwrap();
        efd.signal().unwrap();
        assert_eq!(efd.drain().unwrap(), 2);
        assert_eq!(efd.drain().unwrap(), 0);
    }
}

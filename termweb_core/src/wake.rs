//! A coalescing cross-thread wakeup (spec §4.4). `notify()` is a one-shot
//! non-blocking write; any number of notifies before a `wait` coalesce into a
//! single wakeup. Used by [`crate::ws::server::WsServer::stop`] to fan
//! shutdown out to every worker thread's blocking poll.

use std::io;
use std::os::unix::io::RawFd;

#[cfg(target_os = "linux")]
pub struct WakeSignal {
    fd: RawFd,
}

#[cfg(target_os = "linux")]
impl WakeSignal {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(WakeSignal { fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Non-blocking one-shot wakeup. Multiple calls before a `wait` coalesce.
    pub fn notify(&self) {
        let one: u64 = 1;
        unsafe {
            libc::write(self.fd, &one as *const u64 as *const _, 8);
        }
    }

    fn drain(&self) {
        let mut buf = [0u8; 8];
        unsafe {
            libc::read(self.fd, buf.as_mut_ptr() as *mut _, 8);
        }
    }

    /// Wait up to `timeout_ns` nanoseconds for a notification. Returns `true`
    /// if woken by `notify`, `false` on timeout.
    pub fn wait_timeout(&self, timeout_ns: u64) -> bool {
        let mut pfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
        let ts = libc::timespec {
            tv_sec: (timeout_ns / 1_000_000_000) as libc::time_t,
            tv_nsec: (timeout_ns % 1_000_000_000) as libc::c_long,
        };
        let ret = unsafe { libc::ppoll(&mut pfd, 1, &ts, std::ptr::null()) };
        if ret > 0 && (pfd.revents & libc::POLLIN) != 0 {
            self.drain();
            true
        } else {
            false
        }
    }
}

#[cfg(target_os = "linux")]
impl Drop for WakeSignal {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(not(target_os = "linux"))]
pub struct WakeSignal {
    read_fd: RawFd,
    write_fd: RawFd,
}

#[cfg(not(target_os = "linux"))]
impl WakeSignal {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0i32; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        for &fd in &fds {
            unsafe {
                let flags = libc::fcntl(fd, libc::F_GETFL, 0);
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
            }
        }
        Ok(WakeSignal { read_fd: fds[0], write_fd: fds[1] })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.read_fd
    }

    pub fn notify(&self) {
        let byte: u8 = 1;
        unsafe {
            libc::write(self.write_fd, &byte as *const u8 as *const _, 1);
        }
    }

    fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }

    /// Millisecond-granularity poll with a large cap; there is no portable
    /// nanosecond-precision poll outside Linux's `ppoll`.
    pub fn wait_timeout(&self, timeout_ns: u64) -> bool {
        let timeout_ms = (timeout_ns / 1_000_000).min(i32::MAX as u64) as i32;
        let mut pfd = libc::pollfd { fd: self.read_fd, events: libc::POLLIN, revents: 0 };
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret > 0 && (pfd.revents & libc::POLLIN) != 0 {
            self.drain();
            true
        } else {
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl Drop for WakeSignal {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

unsafe impl Send for WakeSignal {}
unsafe impl Sync for WakeSignal {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn notify_before_wait_coalesces() {
        let w = WakeSignal::new().unwrap();
        w.notify();
        w.notify();
        w.notify();
        assert!(w.wait_timeout(Duration::from_millis(200).as_nanos() as u64));
        // Coalesced: a second wait with no further notify times out.
        assert!(!w.wait_timeout(Duration::from_millis(20).as_nanos() as u64));
    }

    #[test]
    fn cross_thread_wakeup() {
        let w = Arc::new(WakeSignal::new().unwrap());
        let w2 = w.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            w2.notify();
        });
        assert!(w.wait_timeout(Duration::from_secs(2).as_nanos() as u64));
        t.join().unwrap();
    }
}

//! One WebSocket server per endpoint: accept loop, per-connection worker
//! threads, shutdown fan-out (spec §4.2).

use crate::wake::WakeSignal;
use crate::ws::connection::Connection;
use crate::ws::frame::Opcode;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const WORKER_POLL_TIMEOUT: Duration = Duration::from_secs(1);
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

pub trait WsCallbacks: Send + Sync + 'static {
    fn on_connect(&self, conn: &Arc<Connection>);
    fn on_message(&self, conn: &Arc<Connection>, payload: &[u8], is_binary: bool);
    fn on_disconnect(&self, conn: &Arc<Connection>);
}

pub struct WsServerConfig {
    pub enable_zstd: bool,
    pub write_timeout: Duration,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        WsServerConfig { enable_zstd: false, write_timeout: DEFAULT_WRITE_TIMEOUT }
    }
}

pub struct WsServer {
    listener: TcpListener,
    running: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
    shutdown: Arc<WakeSignal>,
    config: WsServerConfig,
}

impl WsServer {
    pub fn bind(addr: &str, config: WsServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(false)?;
        Ok(WsServer {
            listener,
            running: Arc::new(AtomicBool::new(true)),
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(WakeSignal::new()?),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop on the calling thread until `stop()` is called.
    pub fn serve(&self, callbacks: Arc<dyn WsCallbacks>) {
        while self.running.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let _ = stream.set_nodelay(true);
                    set_keepalive(&stream);
                    let _ = stream.set_read_timeout(Some(Duration::from_millis(100)));

                    let write_timeout = self.config.write_timeout;
                    let enable_zstd = self.config.enable_zstd;
                    let running = self.running.clone();
                    let active = self.active_connections.clone();
                    let shutdown = self.shutdown.clone();
                    let callbacks = callbacks.clone();

                    active.fetch_add(1, Ordering::AcqRel);
                    std::thread::spawn(move || {
                        run_connection(stream, enable_zstd, write_timeout, running, shutdown, callbacks);
                        active.fetch_sub(1, Ordering::AcqRel);
                    });
                }
                Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => continue,
                Err(_) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                }
            }
        }
    }

    /// Idempotent. Wakes every pending worker poll, unblocks the accept
    /// loop, and waits up to 3s for the worker counter to drain.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify();
        if let Ok(addr) = self.listener.local_addr() {
            // Unblock the accept() call; the spawned worker will see a dead
            // socket and exit immediately.
            let _ = TcpStream::connect(addr);
        }

        let deadline = std::time::Instant::now() + STOP_DRAIN_TIMEOUT;
        while self.active_connections.load(Ordering::Acquire) > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn run_connection(
    stream: TcpStream,
    enable_zstd: bool,
    write_timeout: Duration,
    running: Arc<AtomicBool>,
    shutdown: Arc<WakeSignal>,
    callbacks: Arc<dyn WsCallbacks>,
) {
    let conn = match Connection::accept(stream, enable_zstd, write_timeout) {
        Ok(c) => Arc::new(c),
        Err(_) => return,
    };

    callbacks.on_connect(&conn);

    while running.load(Ordering::Acquire) && conn.is_open() {
        match poll_socket_or_shutdown(conn.as_raw_fd(), shutdown.as_raw_fd(), WORKER_POLL_TIMEOUT) {
            PollOutcome::ShutdownSignaled => break,
            PollOutcome::Timeout => continue,
            PollOutcome::SocketReadable => {}
        }
        match conn.read_frame() {
            Ok(frame) => match frame.opcode {
                Opcode::Text => callbacks.on_message(&conn, &frame.payload, false),
                Opcode::Binary => callbacks.on_message(&conn, &frame.payload, true),
                Opcode::Ping => {
                    let _ = conn.send_pong(&frame.payload);
                }
                Opcode::Close => {
                    let _ = conn.send_close();
                    break;
                }
                Opcode::Pong | Opcode::Continuation => {}
            },
            Err(crate::error::Error::WouldBlock) => continue,
            Err(_) => break,
        }
    }

    callbacks.on_disconnect(&conn);
    conn.close();
}

enum PollOutcome {
    SocketReadable,
    ShutdownSignaled,
    Timeout,
}

/// Two-fd poll: socket readability or the shutdown wake signal, with a 1s
/// fallback timeout so the worker periodically re-checks `running` (spec §4.2).
fn poll_socket_or_shutdown(socket_fd: std::os::unix::io::RawFd, shutdown_fd: std::os::unix::io::RawFd, timeout: Duration) -> PollOutcome {
    let mut fds = [
        libc::pollfd { fd: socket_fd, events: libc::POLLIN, revents: 0 },
        libc::pollfd { fd: shutdown_fd, events: libc::POLLIN, revents: 0 },
    ];
    let ret = unsafe { libc::poll(fds.as_mut_ptr(), 2, timeout.as_millis() as i32) };
    if ret <= 0 {
        return PollOutcome::Timeout;
    }
    if fds[1].revents & libc::POLLIN != 0 {
        return PollOutcome::ShutdownSignaled;
    }
    if fds[0].revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
        return PollOutcome::SocketReadable;
    }
    PollOutcome::Timeout
}

fn set_keepalive(stream: &TcpStream) {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = stream.as_raw_fd();
        let on: libc::c_int = 1;
        unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                &on as *const _ as *const libc::c_void,
                std::mem::size_of_val(&on) as libc::socklen_t,
            );
        }
    }
}

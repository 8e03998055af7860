use super::service::InFlight;
use may::coroutine::JoinHandle;
use may_minihttp::{HttpServerWithHeaders, HttpService};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Wrapper around may_minihttp's HTTP server
///
/// Uses 32 max headers to handle proxy traffic.
pub struct HttpServer<T>(pub T);

/// Handle to a running HTTP server
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll the listening address until it accepts connections.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server is not ready within about a second.
    pub fn wait_ready(&self) -> io::Result<()> {
        let probe = if self.addr.ip().is_unspecified() {
            SocketAddr::from(([127, 0, 0, 1], self.addr.port()))
        } else {
            self.addr
        };
        for _ in 0..200 {
            if TcpStream::connect(probe).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Cancel the accept loop and wait for it to finish.
    pub fn stop(self) {
        // SAFETY: cancelling the accept coroutine we own is how may_minihttp servers shut down
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
    }

    /// Stop accepting, then give in-flight requests up to `grace` to finish.
    ///
    /// Returns the number of requests still running when the grace period ran out.
    pub fn stop_gracefully(self, grace: Duration, in_flight: &InFlight) -> usize {
        in_flight.start_draining();
        let addr = self.addr;
        self.stop();

        let deadline = Instant::now() + grace;
        while in_flight.current() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let abandoned = in_flight.current();
        if abandoned > 0 {
            warn!(%addr, abandoned, grace_ms = grace.as_millis() as u64, "Grace period expired");
        } else {
            info!(%addr, "HTTP server stopped");
        }
        abandoned
    }

    /// Block until the server coroutine finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server coroutine panicked.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Start the HTTP server on the given address
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the port cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let handle = HttpServerWithHeaders::<_, 32>(self.0).start(addr)?;
        info!(%addr, "HTTP server listening");
        Ok(ServerHandle { addr, handle })
    }
}

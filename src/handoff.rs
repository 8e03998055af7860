//! # Restart handoff
//!
//! Lets a newly starting instance stop the instance currently serving the
//! same port. Every running server listens on `127.0.0.1:(port + offset)`
//! with a [`StopMonitor`]. A starting server first calls
//! [`send_stop_command`]:
//!
//! 1. connect to the companion port; nothing listening means nothing to stop,
//! 2. send the grace period in milliseconds as one line (`"2000\r\n"`),
//! 3. keep writing short lines every 10 ms until a write fails, which happens
//!    once the old instance has stopped and closed the socket.
//!
//! The monitor of the old instance reads that line, stops its server with
//! the given grace period, closes the socket and halts the process.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Grace period used when the stop command carries none.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(100);

const KEEPALIVE_LINE: &[u8] = b"ping\r\n";
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("handoff port {port} + {offset} does not fit in a TCP port")]
    PortOverflow { port: u16, offset: u16 },

    #[error("cannot bind stop monitor on 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("cannot start stop monitor thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Result of asking a previous instance to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// Nothing was listening on the companion port.
    NotRunning,
    /// The previous instance accepted the command and has gone away.
    Stopped,
}

/// Something the stop monitor can shut down.
pub trait Stoppable: Send + 'static {
    /// Stop serving, allowing in-flight work up to `grace` to finish.
    fn stop(&mut self, grace: Duration);
}

impl<F> Stoppable for F
where
    F: FnMut(Duration) + Send + 'static,
{
    fn stop(&mut self, grace: Duration) {
        self(grace)
    }
}

/// Runs after the server is stopped and the monitor socket is closed.
pub type HaltHook = Box<dyn FnOnce() + Send>;

/// Terminate the process immediately, without running other threads' destructors.
#[must_use]
pub fn halt_process() -> HaltHook {
    Box::new(|| {
        info!("Halting process");
        std::process::exit(0)
    })
}

/// Companion port for `port`.
pub fn handoff_port(port: u16, offset: u16) -> Result<u16, HandoffError> {
    port.checked_add(offset)
        .ok_or(HandoffError::PortOverflow { port, offset })
}

/// Grace period from a stop command line; blank or malformed lines yield [`DEFAULT_STOP_GRACE`].
#[must_use]
pub fn parse_grace(line: &str) -> Duration {
    match line.trim().parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => {
            if !line.trim().is_empty() {
                warn!(line = %line.trim(), "Malformed grace period, using default");
            }
            DEFAULT_STOP_GRACE
        }
    }
}

/// Ask the instance serving `port` to stop, and wait until it has.
pub fn send_stop_command(
    port: u16,
    offset: u16,
    grace: Duration,
) -> Result<HandoffOutcome, HandoffError> {
    let target = SocketAddr::from(([127, 0, 0, 1], handoff_port(port, offset)?));
    let mut stream = match TcpStream::connect(target) {
        Ok(stream) => stream,
        Err(e) => {
            info!(%target, error = %e, "No stop monitor answering, probably not running");
            return Ok(HandoffOutcome::NotRunning);
        }
    };

    info!(%target, grace_ms = grace.as_millis() as u64, "Asking running instance to stop");
    let command = format!("{}\r\n", grace.as_millis());
    if let Err(e) = stream.write_all(command.as_bytes()) {
        debug!(error = %e, "Stop monitor closed before the command was sent");
        return Ok(HandoffOutcome::Stopped);
    }

    loop {
        thread::sleep(KEEPALIVE_INTERVAL);
        if let Err(e) = stream
            .write_all(KEEPALIVE_LINE)
            .and_then(|()| stream.flush())
        {
            debug!(error = %e, "Stop monitor connection closed");
            break;
        }
    }
    info!(%target, "Previous instance stopped");
    Ok(HandoffOutcome::Stopped)
}

/// Listener for one stop command.
#[derive(Debug)]
pub struct StopMonitor {
    listener: TcpListener,
    port: u16,
}

impl StopMonitor {
    /// Bind `127.0.0.1:(port + offset)`.
    pub fn bind(port: u16, offset: u16) -> Result<Self, HandoffError> {
        let port = handoff_port(port, offset)?;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|source| HandoffError::Bind { port, source })?;
        Ok(Self { listener, port })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the stop command on a background thread.
    pub fn spawn<S: Stoppable>(
        self,
        server: S,
        halt: HaltHook,
    ) -> Result<JoinHandle<()>, HandoffError> {
        let port = self.port;
        let handle = thread::Builder::new()
            .name("stop-monitor".to_string())
            .spawn(move || self.run(server, halt))
            .map_err(HandoffError::Spawn)?;
        info!(port, "Stop monitor listening");
        Ok(handle)
    }

    fn run<S: Stoppable>(self, mut server: S, halt: HaltHook) {
        let (stream, peer) = match self.listener.accept() {
            Ok(conn) => conn,
            Err(e) => {
                error!(port = self.port, error = %e, "Stop monitor accept failed");
                return;
            }
        };

        let mut line = String::new();
        let grace = match BufReader::new(&stream).read_line(&mut line) {
            Ok(0) => DEFAULT_STOP_GRACE,
            Ok(_) => parse_grace(&line),
            Err(e) => {
                warn!(error = %e, "Cannot read stop command, using default grace");
                DEFAULT_STOP_GRACE
            }
        };
        info!(%peer, grace_ms = grace.as_millis() as u64, "Stop command received");

        server.stop(grace);

        // release the port before the initiator sees the connection close
        drop(self.listener);
        drop(stream);
        halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grace() {
        assert_eq!(parse_grace("2000\r\n"), Duration::from_millis(2000));
        assert_eq!(parse_grace("  5 "), Duration::from_millis(5));
        assert_eq!(parse_grace(""), DEFAULT_STOP_GRACE);
        assert_eq!(parse_grace("soon\r\n"), DEFAULT_STOP_GRACE);
        assert_eq!(parse_grace("-1"), DEFAULT_STOP_GRACE);
    }

    #[test]
    fn test_port_overflow() {
        assert_eq!(handoff_port(9000, 100).unwrap(), 9100);
        assert!(matches!(
            handoff_port(65500, 100),
            Err(HandoffError::PortOverflow { .. })
        ));
        assert!(send_stop_command(65500, 100, DEFAULT_STOP_GRACE).is_err());
    }

    #[test]
    fn test_closure_is_stoppable() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut stop = move |grace: Duration| {
            let _ = tx.send(grace);
        };
        Stoppable::stop(&mut stop, Duration::from_millis(7));
        assert_eq!(rx.recv().unwrap(), Duration::from_millis(7));
    }
}

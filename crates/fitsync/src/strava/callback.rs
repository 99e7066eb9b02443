//! Local HTTP receiver for the OAuth redirect
//!
//! Serves a single path on a local address until the first callback that
//! settles the flow (an authorization code, a state mismatch, or a denial),
//! hands that result to the waiting token manager over a one-shot channel,
//! then stops accepting connections.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use url::Url;

use super::auth::AuthError;

type CallbackResult = Result<String, AuthError>;

/// Read and write deadline for a single callback connection
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `stop` waits for the serving thread before detaching it
const STOP_GRACE: Duration = Duration::from_secs(3);

/// A bound, not yet running, callback listener
pub struct CallbackListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    path: String,
    expected_state: String,
}

impl CallbackListener {
    /// Bind the listener on `addr` (e.g. `127.0.0.1:8080`)
    pub fn bind(addr: &str, path: &str, expected_state: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("Could not bind OAuth callback listener on {}", addr))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            path: path.to_string(),
            expected_state: expected_state.to_string(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The redirect URL to register with the provider, using the bound port
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.local_addr, self.path)
    }

    /// Start serving on a background thread
    pub fn spawn(self) -> Result<CallbackHandle> {
        let (tx, rx) = mpsc::sync_channel(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let local_addr = self.local_addr;

        log::info!("Listening on {}", self.redirect_uri());

        let thread_shutdown = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("oauth-callback".to_string())
            .spawn(move || self.serve(tx, &thread_shutdown))
            .context("Failed to start OAuth callback listener")?;

        Ok(CallbackHandle {
            rx,
            thread: Some(thread),
            shutdown,
            local_addr,
        })
    }

    fn serve(self, tx: SyncSender<CallbackResult>, shutdown: &AtomicBool) {
        for stream in self.listener.incoming() {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            let mut stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("Failed to accept OAuth callback connection: {}", e);
                    continue;
                }
            };

            // A peer that connects and never sends must not stall the listener
            if let Err(e) = stream
                .set_read_timeout(Some(CONNECTION_TIMEOUT))
                .and_then(|_| stream.set_write_timeout(Some(CONNECTION_TIMEOUT)))
            {
                log::warn!("Failed to set OAuth callback connection timeouts: {}", e);
                continue;
            }

            let (reply, result) = match read_request_target(&stream) {
                Ok(target) => evaluate_callback(&target, &self.path, &self.expected_state),
                Err(e) => {
                    log::warn!("Could not read OAuth callback request: {}", e);
                    (Reply::BAD_REQUEST, None)
                }
            };

            if let Err(e) = write_reply(&mut stream, reply) {
                log::warn!("Failed to respond to OAuth callback: {}", e);
            }

            if let Some(result) = result {
                // Receiver gone means the flow was abandoned; stop either way
                let _ = tx.send(result);
                break;
            }
        }

        log::debug!("OAuth callback listener on {} stopped", self.local_addr);
    }
}

/// Handle on a running listener; the receiving end of the one-shot handoff
///
/// Dropping the handle stops the listener if it is still waiting.
pub struct CallbackHandle {
    rx: Receiver<CallbackResult>,
    thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

impl CallbackHandle {
    /// Block until the listener delivers a result. There is no timeout.
    pub fn wait(self) -> CallbackResult {
        self.rx.recv().map_err(|_| AuthError::ListenerClosed)?
    }

    /// Block until the listener delivers a result or `timeout` elapses
    pub fn wait_timeout(self, timeout: Duration) -> CallbackResult {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(AuthError::CallbackTimeout),
            Err(RecvTimeoutError::Disconnected) => Err(AuthError::ListenerClosed),
        }
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        if !thread.is_finished() {
            self.shutdown.store(true, Ordering::SeqCst);
            // Wake the blocking accept so the thread sees the flag
            let mut wake_addr = self.local_addr;
            if wake_addr.ip().is_unspecified() {
                wake_addr.set_ip(Ipv4Addr::LOCALHOST.into());
            }
            let _ = TcpStream::connect_timeout(&wake_addr, Duration::from_secs(1));
        }

        let deadline = Instant::now() + STOP_GRACE;
        while !thread.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        if thread.is_finished() {
            let _ = thread.join();
        } else {
            log::warn!(
                "OAuth callback listener on {} did not stop in time, detaching it",
                self.local_addr
            );
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Status line and body sent back to the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reply {
    status: &'static str,
    body: &'static str,
}

impl Reply {
    const CONNECTED: Reply = Reply {
        status: "200 OK",
        body: "Connected to Strava! You can close this window.",
    };
    const WAITING: Reply = Reply {
        status: "200 OK",
        body: "Waiting for Strava authorization...",
    };
    const FAILED: Reply = Reply {
        status: "400 Bad Request",
        body: "Strava authorization failed. Check the terminal for details.",
    };
    const BAD_REQUEST: Reply = Reply {
        status: "400 Bad Request",
        body: "Bad request",
    };
    const NOT_FOUND: Reply = Reply {
        status: "404 Not Found",
        body: "Not found",
    };
}

/// Decide how to answer a callback request and whether it settles the flow
///
/// Requests to other paths and requests without a code are acknowledged but
/// deliver nothing.
fn evaluate_callback(
    target: &str,
    path: &str,
    expected_state: &str,
) -> (Reply, Option<CallbackResult>) {
    let Ok(url) = Url::parse("http://localhost/").and_then(|base| base.join(target)) else {
        return (Reply::BAD_REQUEST, None);
    };

    if url.path() != path {
        return (Reply::NOT_FOUND, None);
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return (Reply::FAILED, Some(Err(AuthError::Denied(error))));
    }

    let Some(code) = code.filter(|c| !c.is_empty()) else {
        return (Reply::WAITING, None);
    };

    let state = state.unwrap_or_default();
    if state != expected_state {
        log::error!(
            "invalid OAuth state, got '{}' expected '{}'",
            state,
            expected_state
        );
        return (
            Reply::FAILED,
            Some(Err(AuthError::StateMismatch {
                expected: expected_state.to_string(),
                actual: state,
            })),
        );
    }

    log::info!("received Strava authorization code");
    (Reply::CONNECTED, Some(Ok(code)))
}

/// Read the request line and headers, returning the request target
///
/// Format: GET /strava_oauth?code=AUTH_CODE&state=... HTTP/1.1
fn read_request_target(stream: &TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Drain headers so closing the socket doesn't reset the connection
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    request_line
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "empty request line"))
}

fn write_reply(stream: &mut TcpStream, reply: Reply) -> std::io::Result<()> {
    let body = format!("<html><body><h1>{}</h1></body></html>", reply.body);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()
}

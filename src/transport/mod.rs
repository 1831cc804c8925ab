//! Message-framed duplex channel exposed as a byte stream.
//!
//! One [`WsTransport`] is shared by the editing loop, the keepalive ticker and the PTY bridge.
//! Every frame write (output, ping, pong, close) goes through the single connection lock.

mod keepalive;
mod ws;

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::lock::lock_or_recover;
use crate::prompt::ConsoleInput;

pub use keepalive::spawn_keepalive;

const POLL_SLEEP: Duration = Duration::from_millis(5);
const READ_WAIT: Duration = Duration::from_millis(250);
/// Data frames buffered while nobody is reading (e.g. keystrokes during a long command).
const MAX_QUEUED_FRAMES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// A framed connection. Implementations must not block in `poll_frame`.
pub trait FrameConn: Send {
    /// Next frame if one is ready, `Ok(None)` otherwise.
    fn poll_frame(&mut self) -> io::Result<Option<Frame>>;
    fn send_frame(&mut self, frame: Frame) -> io::Result<()>;
    fn shutdown(&mut self);
}

struct Shared {
    conn: Mutex<Box<dyn FrameConn>>,
    inbound: Mutex<VecDeque<Vec<u8>>>,
    partial: Mutex<Vec<u8>>,
    last_activity: Mutex<Instant>,
    last_pong: Mutex<Instant>,
    closed: AtomicBool,
    idle_timeout: Duration,
}

/// Cloneable handle; all clones share one connection.
#[derive(Clone)]
pub struct WsTransport {
    shared: Arc<Shared>,
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "transport closed")
}

impl WsTransport {
    pub fn new(conn: impl FrameConn + 'static, idle_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(Box::new(conn)),
                inbound: Mutex::new(VecDeque::new()),
                partial: Mutex::new(Vec::new()),
                last_activity: Mutex::new(now),
                last_pong: Mutex::new(now),
                closed: AtomicBool::new(false),
                idle_timeout,
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Close once: send a close frame and shut the connection down.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut conn = lock_or_recover(&self.shared.conn, "transport close");
        let _ = conn.send_frame(Frame::Close);
        conn.shutdown();
        tracing::debug!("transport closed");
    }

    fn touch(&self) {
        *lock_or_recover(&self.shared.last_activity, "transport activity") = Instant::now();
    }

    pub(crate) fn idle_expired(&self) -> bool {
        lock_or_recover(&self.shared.last_activity, "transport activity").elapsed()
            >= self.shared.idle_timeout
    }

    pub(crate) fn since_last_pong(&self) -> Duration {
        lock_or_recover(&self.shared.last_pong, "transport pong").elapsed()
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }
        Ok(())
    }

    fn fail<T>(&self, err: io::Error) -> io::Result<T> {
        tracing::debug!(error = %err, "transport failure");
        self.close();
        Err(err)
    }

    /// Drain ready frames. Control frames are handled here; the first data frame is returned,
    /// or queued when `queue_data` is set.
    ///
    /// Data is only queued under the connection lock, so a reader that checks the queue while
    /// holding it sees every earlier frame before any later one.
    fn poll_frames(&self, queue_data: bool) -> io::Result<Option<Vec<u8>>> {
        let mut conn = lock_or_recover(&self.shared.conn, "transport poll");
        if !queue_data {
            if let Some(queued) = lock_or_recover(&self.shared.inbound, "transport inbound").pop_front() {
                return Ok(Some(queued));
            }
        }
        loop {
            let frame = match conn.poll_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    drop(conn);
                    return self.fail(err);
                }
            };
            match frame {
                None => return Ok(None),
                Some(Frame::Data(data)) if !queue_data => return Ok(Some(data)),
                Some(Frame::Data(data)) => {
                    let mut inbound = lock_or_recover(&self.shared.inbound, "transport inbound");
                    if inbound.len() >= MAX_QUEUED_FRAMES {
                        tracing::warn!("inbound queue full; dropping frame");
                    } else {
                        inbound.push_back(data);
                    }
                }
                Some(Frame::Ping(payload)) => {
                    if let Err(err) = conn.send_frame(Frame::Pong(payload)) {
                        drop(conn);
                        return self.fail(err);
                    }
                }
                Some(Frame::Pong(_)) => {
                    *lock_or_recover(&self.shared.last_pong, "transport pong") = Instant::now();
                }
                Some(Frame::Close) => {
                    drop(conn);
                    tracing::debug!("peer closed transport");
                    self.close();
                    return Err(closed_error());
                }
            }
        }
    }

    /// Process pending control frames without consuming data for a reader.
    pub(crate) fn pump(&self) -> io::Result<()> {
        self.ensure_open()?;
        self.poll_frames(true).map(|_| ())
    }

    /// Wait up to `timeout` for the next inbound payload.
    pub fn read_chunk(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        {
            let mut partial = lock_or_recover(&self.shared.partial, "transport partial");
            if !partial.is_empty() {
                return Ok(Some(std::mem::take(&mut *partial)));
            }
        }
        loop {
            self.ensure_open()?;
            if let Some(chunk) = self.poll_frames(false)? {
                self.touch();
                return Ok(Some(chunk));
            }
            if self.idle_expired() {
                return self.fail(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "transport idle deadline exceeded",
                ));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_SLEEP.min(deadline - now));
        }
    }

    /// Send one data frame.
    pub fn write_frame(&self, data: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        let result = lock_or_recover(&self.shared.conn, "transport write")
            .send_frame(Frame::Data(data.to_vec()));
        match result {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    pub(crate) fn ping(&self) -> io::Result<()> {
        self.ensure_open()?;
        let result = lock_or_recover(&self.shared.conn, "transport ping")
            .send_frame(Frame::Ping(Vec::new()));
        result.or_else(|err| self.fail(err))
    }
}

impl ConsoleInput for WsTransport {
    fn read_chunk(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        WsTransport::read_chunk(self, timeout)
    }
}

impl Read for WsTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(chunk) = self.read_chunk(READ_WAIT)? {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    let mut partial = lock_or_recover(&self.shared.partial, "transport partial");
                    let mut rest = chunk[n..].to_vec();
                    rest.extend_from_slice(&partial);
                    *partial = rest;
                }
                return Ok(n);
            }
        }
    }
}

impl Write for WsTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.write_frame(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

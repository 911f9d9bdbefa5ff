//! Streaming audio output
//!
//! Forwards monitored audio to a downstream consumer (an icecast-style
//! relay, an archiver) as 16-bit little-endian PCM over a pluggable
//! [`Connector`]. The output is deliberately tolerant: audio is
//! prebuffered before the first connect so the far end starts with a
//! cushion, connect and write failures back off exponentially, and a
//! prebuffer that times out with a still-useful minimum proceeds with a
//! warning rather than aborting the session.
//!
//! The streaming path never applies backpressure to acquisition: while
//! disconnected, at most the prebuffer target is retained and older
//! audio is dropped.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

#[cfg(not(test))]
use log::{debug, info, warn};
#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use crate::backoff::{Backoff, BackoffPolicy};

/// Establishes the downstream byte sink
///
/// Production uses [`TcpConnector`]; tests substitute an in-memory
/// implementation.
pub trait Connector {
    type Writer: Write;

    fn connect(&mut self) -> io::Result<Self::Writer>;
}

/// Connects a plain TCP socket
#[derive(Clone, Debug)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new<S: Into<String>>(addr: S) -> Self {
        Self { addr: addr.into() }
    }
}

impl Connector for TcpConnector {
    type Writer = TcpStream;

    fn connect(&mut self) -> io::Result<TcpStream> {
        let addr = self
            .addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved"))?;
        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Connection phase of the streaming output
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum_macros::Display)]
pub enum StreamState {
    /// No connection and no buffered audio
    Disconnected,

    /// Accumulating the prebuffer before the first write
    Prebuffering,

    /// Writing audio downstream
    Connected,

    /// A failure occurred; waiting out the retry delay
    Backoff,
}

/// PCM streaming session over a [`Connector`]
pub struct StreamOutput<C: Connector> {
    connector: C,
    state: StreamState,
    writer: Option<C::Writer>,
    buffer: VecDeque<f32>,
    prebuffer_target: usize,
    prebuffer_min: usize,
    prebuffer_wait: Duration,
    prebuffer_deadline: Option<Instant>,
    backoff: Backoff,
    retry_at: Option<Instant>,
}

impl<C: Connector> StreamOutput<C> {
    /// Create a session with the given retry policy
    ///
    /// Prebuffer defaults: target one second at 11025 Hz, minimum a
    /// quarter of that, five seconds to fill.
    pub fn new(connector: C, policy: BackoffPolicy) -> Self {
        Self {
            connector,
            state: StreamState::Disconnected,
            writer: None,
            buffer: VecDeque::new(),
            prebuffer_target: 11025,
            prebuffer_min: 11025 / 4,
            prebuffer_wait: Duration::from_secs(5),
            prebuffer_deadline: None,
            backoff: Backoff::new(policy),
            retry_at: None,
        }
    }

    /// Set the prebuffer target, minimum, and fill deadline
    pub fn prebuffer(mut self, target: usize, min: usize, wait: Duration) -> Self {
        assert!(min <= target);
        self.prebuffer_target = target.max(1);
        self.prebuffer_min = min;
        self.prebuffer_wait = wait;
        self
    }

    /// Current phase
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Samples currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed audio and drive the connection state machine
    ///
    /// Returns the phase after processing. Never blocks on the
    /// network beyond the connector's own connect timeout.
    pub fn push(&mut self, samples: &[f32]) -> StreamState {
        match self.state {
            StreamState::Disconnected => {
                self.buffer.clear();
                self.buffer.extend(samples);
                self.prebuffer_deadline = Some(Instant::now() + self.prebuffer_wait);
                self.state = StreamState::Prebuffering;
                debug!("stream: prebuffering {} samples", self.prebuffer_target);
                self.check_prebuffer();
            }
            StreamState::Prebuffering => {
                self.buffer.extend(samples);
                self.check_prebuffer();
            }
            StreamState::Connected => {
                if let Err(err) = self.write_samples(samples) {
                    self.enter_backoff("write", err);
                }
            }
            StreamState::Backoff => {
                self.buffer.extend(samples);
                self.trim_buffer();
                if self.retry_at.map_or(true, |at| Instant::now() >= at) {
                    self.try_connect();
                }
            }
        }
        self.state
    }

    /// Drop the connection and all buffered audio
    pub fn shutdown(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
        self.buffer.clear();
        self.prebuffer_deadline = None;
        self.retry_at = None;
        self.state = StreamState::Disconnected;
    }

    fn check_prebuffer(&mut self) {
        if self.buffer.len() >= self.prebuffer_target {
            self.try_connect();
            return;
        }
        let deadline = match self.prebuffer_deadline {
            Some(deadline) => deadline,
            None => return,
        };
        if Instant::now() < deadline {
            return;
        }
        if self.buffer.len() >= self.prebuffer_min {
            warn!(
                "stream: prebuffer timed out with {} of {} samples; proceeding",
                self.buffer.len(),
                self.prebuffer_target
            );
            self.try_connect();
        } else {
            debug!(
                "stream: prebuffer timed out below the {}-sample minimum; restarting",
                self.prebuffer_min
            );
            self.buffer.clear();
            self.state = StreamState::Disconnected;
        }
    }

    fn try_connect(&mut self) {
        match self.connector.connect() {
            Ok(writer) => {
                info!("stream: connected");
                self.writer = Some(writer);
                self.backoff.reset();
                self.retry_at = None;
                self.prebuffer_deadline = None;
                self.state = StreamState::Connected;
                let buffered: Vec<f32> = self.buffer.drain(..).collect();
                if let Err(err) = self.write_samples(&buffered) {
                    self.enter_backoff("flush", err);
                }
            }
            Err(err) => self.enter_backoff("connect", err),
        }
    }

    fn enter_backoff(&mut self, what: &str, err: io::Error) {
        let delay = self.backoff.next_delay();
        warn!("stream: {} failed ({}); retrying in {:?}", what, err, delay);
        self.writer = None;
        self.retry_at = Some(Instant::now() + delay);
        self.trim_buffer();
        self.state = StreamState::Backoff;
    }

    fn write_samples(&mut self, samples: &[f32]) -> io::Result<()> {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return Err(io::Error::from(io::ErrorKind::NotConnected)),
        };
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sa in samples {
            let quantized = (sa.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            bytes.extend_from_slice(&quantized.to_le_bytes());
        }
        writer.write_all(&bytes)
    }

    // While disconnected only the newest prebuffer-target samples are
    // worth keeping.
    fn trim_buffer(&mut self) {
        while self.buffer.len() > self.prebuffer_target {
            self.buffer.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    // shared byte sink; fails the first `fail_connects` connect calls
    #[derive(Clone, Default)]
    struct MemConnector {
        sink: Arc<Mutex<Vec<u8>>>,
        fail_connects: Arc<Mutex<usize>>,
    }

    struct MemWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for MemWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connector for MemConnector {
        type Writer = MemWriter;

        fn connect(&mut self) -> io::Result<MemWriter> {
            let mut failures = self.fail_connects.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
            }
            Ok(MemWriter(Arc::clone(&self.sink)))
        }
    }

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(1),
            multiplier: 2.0,
            cap: Duration::from_millis(8),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_prebuffer_then_connect_flushes_everything() {
        let connector = MemConnector::default();
        let sink = Arc::clone(&connector.sink);
        let mut out = StreamOutput::new(connector, fast_policy()).prebuffer(
            100,
            25,
            Duration::from_secs(5),
        );

        assert_eq!(StreamState::Prebuffering, out.push(&[0.25f32; 60]));
        assert_eq!(60, out.buffered());
        assert_eq!(StreamState::Connected, out.push(&[0.25f32; 60]));

        // every sample written, two bytes each
        assert_eq!(240, sink.lock().unwrap().len());
        assert_eq!(0, out.buffered());

        assert_eq!(StreamState::Connected, out.push(&[0.25f32; 10]));
        assert_eq!(260, sink.lock().unwrap().len());
    }

    #[test]
    fn test_partial_prebuffer_proceeds_after_deadline() {
        let connector = MemConnector::default();
        let sink = Arc::clone(&connector.sink);
        let mut out = StreamOutput::new(connector, fast_policy()).prebuffer(
            1000,
            25,
            Duration::from_millis(10),
        );

        assert_eq!(StreamState::Prebuffering, out.push(&[0.5f32; 50]));
        std::thread::sleep(Duration::from_millis(15));
        // above the minimum: proceed with what we have
        assert_eq!(StreamState::Connected, out.push(&[0.5f32; 10]));
        assert_eq!(120, sink.lock().unwrap().len());
    }

    #[test]
    fn test_starved_prebuffer_restarts() {
        let connector = MemConnector::default();
        let mut out = StreamOutput::new(connector, fast_policy()).prebuffer(
            1000,
            500,
            Duration::from_millis(10),
        );

        assert_eq!(StreamState::Prebuffering, out.push(&[0.5f32; 10]));
        std::thread::sleep(Duration::from_millis(15));
        // below the minimum: abort rather than stream a useless dribble
        assert_eq!(StreamState::Disconnected, out.push(&[0.5f32; 10]));
        assert_eq!(0, out.buffered());
    }

    #[test]
    fn test_connect_failure_backs_off_then_recovers() {
        let connector = MemConnector::default();
        *connector.fail_connects.lock().unwrap() = 2;
        let sink = Arc::clone(&connector.sink);
        let mut out = StreamOutput::new(connector, fast_policy()).prebuffer(
            10,
            5,
            Duration::from_secs(5),
        );

        assert_eq!(StreamState::Backoff, out.push(&[0.5f32; 10]));
        std::thread::sleep(Duration::from_millis(3));
        assert_eq!(StreamState::Backoff, out.push(&[0.5f32; 10]));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(StreamState::Connected, out.push(&[0.5f32; 10]));
        // buffered audio survived the retries, capped at the target
        assert!(sink.lock().unwrap().len() >= 20);
    }

    #[test]
    fn test_backoff_buffer_is_bounded() {
        let connector = MemConnector::default();
        *connector.fail_connects.lock().unwrap() = usize::MAX;
        let mut out = StreamOutput::new(connector, fast_policy()).prebuffer(
            100,
            25,
            Duration::from_secs(5),
        );

        for _ in 0..50 {
            out.push(&[0.0f32; 100]);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(StreamState::Backoff, out.state());
        assert!(out.buffered() <= 100);
    }

    #[test]
    fn test_shutdown_clears_session() {
        let connector = MemConnector::default();
        let mut out = StreamOutput::new(connector, fast_policy()).prebuffer(
            10,
            5,
            Duration::from_secs(5),
        );
        assert_eq!(StreamState::Connected, out.push(&[0.5f32; 10]));
        out.shutdown();
        assert_eq!(StreamState::Disconnected, out.state());
        assert_eq!(0, out.buffered());
    }
}

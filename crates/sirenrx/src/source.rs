//! Audio acquisition
//!
//! An [`AudioSource`] wraps a byte stream from an SDR, a network peer,
//! or a local capture pipe and yields fixed-size [`AudioFrame`]s on
//! demand. Acquisition is purely pull: nothing is read until
//! [`next_frame`](AudioSource::next_frame) asks.
//!
//! Transient read failures are retried inside `next_frame` using the
//! shared [`BackoffPolicy`](crate::BackoffPolicy), bounded by the
//! caller's timeout. A source that keeps timing out is flagged offline
//! for health reporting but keeps retrying; only end-of-stream or a
//! hard I/O error ends it.

use std::fmt;
use std::io::{self, Read};
use std::time::{Duration, Instant};

#[cfg(not(test))]
use log::{debug, warn};
#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as warn;

use num_complex::Complex;
use thiserror::Error;

use crate::backoff::{Backoff, BackoffPolicy};

/// Identifies one configured audio source
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sample payload of one frame
#[derive(Clone, Debug, PartialEq)]
pub enum FrameBody {
    /// Real audio samples, normalized to about ±1.0
    Real(Vec<f32>),

    /// Complex IQ samples, normalized to about ±1.0
    Complex(Vec<Complex<f32>>),
}

impl FrameBody {
    /// Number of samples in the frame
    pub fn len(&self) -> usize {
        match self {
            FrameBody::Real(v) => v.len(),
            FrameBody::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One block of samples from a source
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    /// The samples
    pub body: FrameBody,

    /// Sampling rate (Hz)
    pub rate: u32,

    /// Monotonic time at which the frame was completed
    pub timestamp: Instant,

    /// The source that produced it
    pub source: SourceId,
}

/// Acquisition failure
#[derive(Debug, Error)]
pub enum SourceError {
    /// No complete frame arrived within the caller's timeout
    ///
    /// The source is still alive; partial data is kept and the next
    /// call resumes where this one stopped.
    #[error("no frame within {0:?}")]
    Timeout(Duration),

    /// The stream ended
    #[error("source disconnected")]
    Disconnected,

    /// Unrecoverable read error
    #[error("source read error: {0}")]
    Io(#[from] io::Error),
}

// Wire format of the byte stream.
#[derive(Clone, Copy, Debug, PartialEq)]
enum SampleFormat {
    // interleaved unsigned 8-bit I/Q, zero at 127.5 (rtl-sdr style)
    IqU8,
    // little-endian signed 16-bit mono PCM
    PcmI16,
}

impl SampleFormat {
    fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::IqU8 => 2,
            SampleFormat::PcmI16 => 2,
        }
    }
}

/// A pull-based audio source over a byte stream
pub enum AudioSource {
    /// IQ samples from an SDR front end
    Sdr(Input),

    /// PCM audio from a network peer
    Network(Input),

    /// PCM audio from a local capture device or pipe
    Capture(Input),
}

/// Shared state of every [`AudioSource`] variant
pub struct Input {
    id: SourceId,
    rate: u32,
    format: SampleFormat,
    reader: Box<dyn Read + Send>,
    backoff: Backoff,
    // partially filled frame, resumed across calls
    buf: Vec<u8>,
    filled: usize,
    consecutive_timeouts: u32,
    offline: bool,
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("id", &self.id)
            .field("rate", &self.rate)
            .field("format", &self.format)
            .field("offline", &self.offline)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Sdr(input) => f.debug_tuple("Sdr").field(input).finish(),
            AudioSource::Network(input) => f.debug_tuple("Network").field(input).finish(),
            AudioSource::Capture(input) => f.debug_tuple("Capture").field(input).finish(),
        }
    }
}

impl AudioSource {
    /// Samples per frame
    pub const FRAME_SAMPLES: usize = 1024;

    // consecutive timeouts before the source is flagged offline
    const OFFLINE_AFTER_TIMEOUTS: u32 = 3;

    /// An SDR source delivering interleaved unsigned 8-bit IQ
    pub fn sdr<R>(id: SourceId, rate: u32, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        AudioSource::Sdr(Input::new(id, rate, SampleFormat::IqU8, reader))
    }

    /// A network source delivering little-endian 16-bit mono PCM
    pub fn network<R>(id: SourceId, rate: u32, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        AudioSource::Network(Input::new(id, rate, SampleFormat::PcmI16, reader))
    }

    /// A local capture source delivering little-endian 16-bit mono PCM
    pub fn capture<R>(id: SourceId, rate: u32, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        AudioSource::Capture(Input::new(id, rate, SampleFormat::PcmI16, reader))
    }

    /// Replace the retry policy
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.input_mut().backoff = Backoff::new(policy);
        self
    }

    pub fn id(&self) -> &SourceId {
        &self.input().id
    }

    pub fn rate(&self) -> u32 {
        self.input().rate
    }

    /// True after several consecutive frame timeouts
    pub fn is_offline(&self) -> bool {
        self.input().offline
    }

    /// Pull the next frame, waiting at most `timeout`
    pub fn next_frame(&mut self, timeout: Duration) -> Result<AudioFrame, SourceError> {
        self.input_mut().next_frame(timeout)
    }

    fn input(&self) -> &Input {
        match self {
            AudioSource::Sdr(input)
            | AudioSource::Network(input)
            | AudioSource::Capture(input) => input,
        }
    }

    fn input_mut(&mut self) -> &mut Input {
        match self {
            AudioSource::Sdr(input)
            | AudioSource::Network(input)
            | AudioSource::Capture(input) => input,
        }
    }
}

impl Input {
    fn new<R>(id: SourceId, rate: u32, format: SampleFormat, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let frame_bytes = AudioSource::FRAME_SAMPLES * format.bytes_per_sample();
        Self {
            id,
            rate,
            format,
            reader: Box::new(reader),
            backoff: Backoff::new(BackoffPolicy::default()),
            buf: vec![0u8; frame_bytes],
            filled: 0,
            consecutive_timeouts: 0,
            offline: false,
        }
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<AudioFrame, SourceError> {
        let start = Instant::now();

        while self.filled < self.buf.len() {
            match self.reader.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    debug!("source {}: end of stream", self.id);
                    return Err(SourceError::Disconnected);
                }
                Ok(n) => {
                    self.filled += n;
                    self.backoff.reset();
                }
                Err(err) if is_transient(&err) => {
                    let delay = self.backoff.next_delay();
                    if start.elapsed() + delay > timeout {
                        return Err(self.timed_out(timeout));
                    }
                    std::thread::sleep(delay);
                }
                Err(err) => {
                    warn!("source {}: read failed: {}", self.id, err);
                    return Err(SourceError::Io(err));
                }
            }
        }

        self.filled = 0;
        self.consecutive_timeouts = 0;
        if self.offline {
            debug!("source {}: back online", self.id);
            self.offline = false;
        }

        Ok(AudioFrame {
            body: self.decode_frame(),
            rate: self.rate,
            timestamp: Instant::now(),
            source: self.id.clone(),
        })
    }

    fn timed_out(&mut self, timeout: Duration) -> SourceError {
        self.consecutive_timeouts += 1;
        if !self.offline && self.consecutive_timeouts >= AudioSource::OFFLINE_AFTER_TIMEOUTS {
            warn!(
                "source {}: {} consecutive timeouts, flagging offline",
                self.id, self.consecutive_timeouts
            );
            self.offline = true;
        }
        SourceError::Timeout(timeout)
    }

    fn decode_frame(&self) -> FrameBody {
        match self.format {
            SampleFormat::IqU8 => FrameBody::Complex(
                self.buf
                    .chunks_exact(2)
                    .map(|iq| {
                        Complex::new(
                            (iq[0] as f32 - 127.5) / 127.5,
                            (iq[1] as f32 - 127.5) / 127.5,
                        )
                    })
                    .collect(),
            ),
            SampleFormat::PcmI16 => FrameBody::Real(
                self.buf
                    .chunks_exact(2)
                    .map(|sa| i16::from_le_bytes([sa[0], sa[1]]) as f32 / 32768.0)
                    .collect(),
            ),
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

//! Channel supervision and thread ownership
//!
//! The supervisor is the ownership root of a running station. Each
//! *channel* couples one [`AudioSource`] to its own distributor and
//! [`Monitor`]: a capture thread pulls frames, demodulates complex
//! input, resamples to the decoder rate, and publishes into the
//! channel's ring; a consumer thread drains a cursor into the monitor.
//! Additional consumers (streaming output) subscribe their own cursors
//! and never interfere with decoding.
//!
//! Shutdown is cooperative: a stop flag plus closing every distributor
//! unblocks all threads, which are then joined.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(not(test))]
use log::{debug, info, warn};
#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use crossbeam_channel::Receiver;

use crate::config::{ConfigError, DecoderConfig, ReceiverConfig};
use crate::demod::Demodulator;
use crate::distributor::{Cursor, CursorRead, Distributor};
use crate::header::DecodeResult;
use crate::monitor::{Monitor, MonitorSnapshot};
use crate::resample::{Resampler, DECODER_RATE};
use crate::source::{AudioSource, FrameBody, SourceError, SourceId};
use crate::stream::{Connector, StreamOutput, StreamState};

// how long blocking calls may go without noticing the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Health of one channel
#[derive(Clone, Debug, Default)]
pub struct SourceHealth {
    /// The source delivered a frame recently
    pub connected: bool,

    /// The source is alive but has stopped delivering frames
    pub offline: bool,

    /// The source ended or failed permanently
    pub disconnected: bool,

    /// Frames published into the channel's ring
    pub frames_produced: u64,

    /// (buffered, capacity) of the channel's ring
    pub buffer_occupancy: (usize, usize),

    /// Frames the monitor's cursor lost to eviction
    pub monitor_skipped: u64,

    /// Most recent monitor snapshot
    pub monitor: Option<MonitorSnapshot>,

    /// Connection phase of the streaming output, if one is attached
    pub stream: Option<StreamState>,
}

/// Point-in-time health of every channel
#[derive(Clone, Debug, Default)]
pub struct HealthSnapshot {
    pub channels: HashMap<SourceId, SourceHealth>,
}

#[derive(Debug, Default)]
struct ChannelStats {
    connected: bool,
    offline: bool,
    disconnected: bool,
    frames_produced: u64,
    monitor_skipped: u64,
    monitor: Option<MonitorSnapshot>,
    stream: Option<StreamState>,
}

struct Channel {
    id: SourceId,
    distributor: Distributor<Vec<f32>>,
    stats: Arc<Mutex<ChannelStats>>,
}

/// Owns all sources, distributors, monitors, and stream sessions
pub struct Supervisor {
    channels: Vec<Channel>,
    threads: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    // frames of decoder-rate audio each ring holds
    ring_capacity: usize,
}

impl Supervisor {
    // about two seconds of decoder-rate audio in source-sized frames
    const DEFAULT_RING_FRAMES: usize = 2 * DECODER_RATE as usize / AudioSource::FRAME_SAMPLES + 1;

    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            threads: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            ring_capacity: Self::DEFAULT_RING_FRAMES,
        }
    }

    /// Override the per-channel ring capacity, in frames
    pub fn ring_capacity(mut self, frames: usize) -> Self {
        self.ring_capacity = frames.max(1);
        self
    }

    /// Add a monitored channel
    ///
    /// `receiver` is required for sources that deliver IQ samples and
    /// is validated before any thread is spawned. The returned channel
    /// yields every [`DecodeResult`] the channel's monitor surfaces.
    pub fn add_channel(
        &mut self,
        source: AudioSource,
        receiver: Option<ReceiverConfig>,
        decoder: DecoderConfig,
    ) -> Result<Receiver<DecodeResult>, ConfigError> {
        let demod = receiver.as_ref().map(Demodulator::new).transpose()?;

        let id = source.id().clone();
        let stats = Arc::new(Mutex::new(ChannelStats::default()));
        let (producer, distributor) = Distributor::<Vec<f32>>::new(self.ring_capacity);

        let mut monitor = Monitor::new(decoder);
        let decode_rx = monitor.subscribe();
        let monitor_cursor = distributor.subscribe();

        info!("channel {}: starting capture and monitor threads", id);

        self.threads.push(spawn_capture(
            source,
            demod,
            producer,
            Arc::clone(&stats),
            Arc::clone(&self.stop),
        ));
        self.threads.push(spawn_monitor(
            monitor,
            monitor_cursor,
            Arc::clone(&stats),
            Arc::clone(&self.stop),
        ));

        self.channels.push(Channel {
            id,
            distributor,
            stats,
        });
        Ok(decode_rx)
    }

    /// Attach a streaming output to an existing channel
    ///
    /// The stream gets its own cursor; a stalled stream can never slow
    /// the monitor. Returns false if no channel matches `id`.
    pub fn add_stream<C>(&mut self, id: &SourceId, stream: StreamOutput<C>) -> bool
    where
        C: Connector + Send + 'static,
        C::Writer: Send,
    {
        let channel = match self.channels.iter().find(|ch| &ch.id == id) {
            Some(channel) => channel,
            None => return false,
        };
        let cursor = channel.distributor.subscribe();
        info!("channel {}: starting stream thread", id);
        self.threads.push(spawn_stream(
            stream,
            cursor,
            Arc::clone(&channel.stats),
            Arc::clone(&self.stop),
        ));
        true
    }

    /// Assemble the on-demand health view
    pub fn health(&self) -> HealthSnapshot {
        let mut out = HealthSnapshot::default();
        for channel in &self.channels {
            let stats = channel.stats.lock().unwrap();
            out.channels.insert(
                channel.id.clone(),
                SourceHealth {
                    connected: stats.connected,
                    offline: stats.offline,
                    disconnected: stats.disconnected,
                    frames_produced: stats.frames_produced,
                    buffer_occupancy: channel.distributor.occupancy(),
                    monitor_skipped: stats.monitor_skipped,
                    monitor: stats.monitor.clone(),
                    stream: stats.stream,
                },
            );
        }
        out
    }

    /// Stop every thread and wait for them to finish
    pub fn shutdown(mut self) {
        info!("supervisor: shutting down");
        self.stop.store(true, Ordering::Relaxed);
        for channel in &self.channels {
            channel.distributor.close();
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("supervisor: a worker thread panicked");
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

// Capture thread: source -> (demodulate) -> resample -> ring.
fn spawn_capture(
    mut source: AudioSource,
    mut demod: Option<Demodulator>,
    mut producer: crate::distributor::Producer<Vec<f32>>,
    stats: Arc<Mutex<ChannelStats>>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("capture-{}", source.id()))
        .spawn(move || {
            let mut resampler: Option<Resampler> = None;

            while !stop.load(Ordering::Relaxed) {
                let frame = match source.next_frame(POLL_INTERVAL) {
                    Ok(frame) => frame,
                    Err(SourceError::Timeout(_)) => {
                        stats.lock().unwrap().offline = source.is_offline();
                        continue;
                    }
                    Err(err) => {
                        warn!("capture {}: {}", source.id(), err);
                        let mut st = stats.lock().unwrap();
                        st.connected = false;
                        st.disconnected = true;
                        break;
                    }
                };

                let audio: Vec<f32> = match (&frame.body, demod.as_mut()) {
                    (FrameBody::Real(samples), _) => samples.clone(),
                    (FrameBody::Complex(samples), Some(demod)) => demod.process(samples),
                    (FrameBody::Complex(_), None) => {
                        warn!(
                            "capture {}: complex frames need a receiver config; dropping",
                            source.id()
                        );
                        continue;
                    }
                };

                let rs = resampler
                    .get_or_insert_with(|| Resampler::for_decoder(frame.rate));
                let resampled = rs.process(&audio);
                if !resampled.is_empty() {
                    producer.push(resampled);
                }

                let mut st = stats.lock().unwrap();
                st.connected = true;
                st.offline = false;
                st.frames_produced += 1;
            }
            debug!("capture {}: stopped", source.id());
            // producer drop closes the ring for all consumers
        })
        .expect("spawn capture thread")
}

// Monitor consumer thread: cursor -> monitor, tracking discontinuities.
fn spawn_monitor(
    mut monitor: Monitor,
    mut cursor: Cursor<Vec<f32>>,
    stats: Arc<Mutex<ChannelStats>>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("monitor".to_owned())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match cursor.read(POLL_INTERVAL) {
                    CursorRead::Frame(samples) => {
                        monitor.push(&samples);
                    }
                    CursorRead::Skipped { frame, skipped } => {
                        debug!("monitor consumer: {} frames skipped", skipped);
                        monitor.notify_discontinuity();
                        monitor.push(&frame);
                    }
                    CursorRead::Timeout => {}
                    CursorRead::Closed => break,
                }
                let mut st = stats.lock().unwrap();
                st.monitor = Some(monitor.snapshot());
                st.monitor_skipped = cursor.total_skipped();
            }
            debug!("monitor consumer: stopped");
        })
        .expect("spawn monitor thread")
}

// Streaming consumer thread: cursor -> stream output.
fn spawn_stream<C>(
    mut stream: StreamOutput<C>,
    mut cursor: Cursor<Vec<f32>>,
    stats: Arc<Mutex<ChannelStats>>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    C: Connector + Send + 'static,
    C::Writer: Send,
{
    thread::Builder::new()
        .name("stream".to_owned())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let state = match cursor.read(POLL_INTERVAL) {
                    CursorRead::Frame(samples) => stream.push(&samples),
                    CursorRead::Skipped { frame, .. } => {
                        // downstream hears a glitch; nothing to resync
                        stream.push(&frame)
                    }
                    CursorRead::Timeout => stream.state(),
                    CursorRead::Closed => break,
                };
                stats.lock().unwrap().stream = Some(state);
            }
            stream.shutdown();
            stats.lock().unwrap().stream = Some(stream.state());
            debug!("stream consumer: stopped");
        })
        .expect("spawn stream thread")
}

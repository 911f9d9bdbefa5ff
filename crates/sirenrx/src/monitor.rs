//! Continuous SAME monitoring
//!
//! Wraps the [`SameDecoder`](crate::SameDecoder) in the state machine a
//! long-running monitoring station needs: an externally visible alert
//! flag driven by header and end-of-message decodes, watchdog timers
//! that force the machine back to idle when a capture stalls, and a
//! versioned snapshot cheap enough to poll from a health endpoint.
//!
//! Decodes are also pushed to a single subscriber channel, so the
//! consumer thread that feeds audio does not have to be the thread that
//! reacts to alerts.

#[cfg(not(test))]
use log::{debug, info};
#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;

use crossbeam_channel::{Receiver, Sender};

use crate::config::DecoderConfig;
use crate::decoder::{DecoderEvent, SameDecoder};
use crate::header::{DecodeResult, SameHeader};
use crate::resample::DECODER_RATE;

/// Phase of the monitor state machine
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum_macros::Display)]
pub enum MonitorState {
    /// Watching for a preamble
    Idle,

    /// Preamble found; bit sync held
    SyncDetected,

    /// A message prefix was recognized; characters are arriving
    CapturingHeader,

    /// At least one burst captured; waiting for its repetitions
    AwaitingRepeat,

    /// A decode was just produced
    Validated,
}

/// Observable output of the monitor
#[derive(Clone, Debug, PartialEq)]
pub enum MonitorEvent {
    /// The state machine moved
    StateChanged {
        from: MonitorState,
        to: MonitorState,
    },

    /// A voted decode, header or end-of-message
    Decoded(DecodeResult),

    /// A header decode opened the alert-active flag
    AlertStarted(SameHeader),

    /// An end-of-message closed the alert-active flag
    AlertEnded,
}

/// Point-in-time view of the monitor
///
/// `version` increases on every observable change; pollers can compare
/// versions to detect movement without diffing fields.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorSnapshot {
    pub version: u64,
    pub state: MonitorState,
    pub alert_active: bool,
    pub last_header: Option<SameHeader>,
    pub samples_processed: u64,
}

/// Continuous monitor over audio at the decoder rate
#[derive(Debug)]
pub struct Monitor {
    decoder: SameDecoder,
    config: DecoderConfig,
    state: MonitorState,
    state_entered: u64,
    alert_active: bool,
    last_header: Option<SameHeader>,
    version: u64,
    subscriber: Option<Sender<DecodeResult>>,
}

impl Monitor {
    // slack beyond the voting window before AwaitingRepeat is declared
    // stalled
    const REPEAT_SLACK_SECS: f32 = 1.0;

    /// Create a monitor for audio at the decoder rate
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            decoder: SameDecoder::with_config(DECODER_RATE, &config),
            config,
            state: MonitorState::Idle,
            state_entered: 0,
            alert_active: false,
            last_header: None,
            version: 0,
            subscriber: None,
        }
    }

    /// Attach the subscriber channel, replacing any previous one
    ///
    /// Every surfaced [`DecodeResult`] is sent to the returned
    /// receiver, at least once, in decode order.
    pub fn subscribe(&mut self) -> Receiver<DecodeResult> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscriber = Some(tx);
        rx
    }

    /// Current state
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// True between a decoded header and the next end-of-message
    pub fn alert_active(&self) -> bool {
        self.alert_active
    }

    /// Cheap point-in-time copy of the monitor's observable state
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            version: self.version,
            state: self.state,
            alert_active: self.alert_active,
            last_header: self.last_header.clone(),
            samples_processed: self.decoder.clock(),
        }
    }

    /// The input was discontinuous; resynchronize
    ///
    /// Called when the upstream distributor reports skipped frames.
    /// Everything captured so far is unreliable across the gap and is
    /// discarded.
    pub fn notify_discontinuity(&mut self) {
        debug!("monitor: input discontinuity, resynchronizing");
        self.decoder.reset();
        self.enter(MonitorState::Idle, &mut Vec::new());
    }

    /// Process a block of audio at the decoder rate
    pub fn push(&mut self, input: &[f32]) -> Vec<MonitorEvent> {
        let mut out = Vec::new();

        for event in self.decoder.push(input) {
            match event {
                DecoderEvent::SyncAcquired => {
                    if self.state == MonitorState::Idle {
                        self.enter(MonitorState::SyncDetected, &mut out);
                    }
                }
                DecoderEvent::MessageStarted => {
                    self.enter(MonitorState::CapturingHeader, &mut out);
                }
                DecoderEvent::BurstCaptured { .. } => {
                    self.enter(MonitorState::AwaitingRepeat, &mut out);
                }
                DecoderEvent::SyncLost => {
                    // bursts may still be collecting toward a vote
                    if self.state != MonitorState::AwaitingRepeat {
                        self.enter(MonitorState::Idle, &mut out);
                    }
                }
                DecoderEvent::Decoded(result) => self.deliver(result, &mut out),
            }
        }

        self.watchdog(&mut out);
        out
    }

    // Watchdog: no single decoder state may outlive its window.
    fn watchdog(&mut self, out: &mut Vec<MonitorEvent>) {
        let elapsed_secs =
            (self.decoder.clock() - self.state_entered) as f32 / DECODER_RATE as f32;

        let stalled = match self.state {
            MonitorState::SyncDetected | MonitorState::CapturingHeader => {
                elapsed_secs > self.config.sync_timeout_secs
            }
            MonitorState::AwaitingRepeat => {
                elapsed_secs > self.config.repeat_window_secs + Self::REPEAT_SLACK_SECS
            }
            MonitorState::Idle | MonitorState::Validated => false,
        };

        if stalled {
            info!(
                "monitor: {} stalled after {:.1} s, returning to idle",
                self.state, elapsed_secs
            );
            self.decoder.reset();
            self.enter(MonitorState::Idle, out);
        }
    }

    fn deliver(&mut self, result: DecodeResult, out: &mut Vec<MonitorEvent>) {
        self.enter(MonitorState::Validated, out);

        if let Some(tx) = &self.subscriber {
            // a gone subscriber must not stall monitoring
            let _ = tx.send(result.clone());
        }

        if result.is_eom {
            info!("monitor: end of message");
            if self.alert_active {
                self.alert_active = false;
                self.version += 1;
                out.push(MonitorEvent::AlertEnded);
            }
        } else if let Some(header) = &result.header {
            info!("monitor: decoded \"{}\"", header);
            self.last_header = Some(header.clone());
            if !self.alert_active {
                self.alert_active = true;
                self.version += 1;
                out.push(MonitorEvent::AlertStarted(header.clone()));
            }
        }

        out.push(MonitorEvent::Decoded(result));
        self.enter(MonitorState::Idle, out);
    }

    fn enter(&mut self, state: MonitorState, out: &mut Vec<MonitorEvent>) {
        if state == self.state {
            return;
        }
        let from = self.state;
        self.state = state;
        self.state_entered = self.decoder.clock();
        self.version += 1;
        debug!("monitor: {} -> {}", from, state);
        out.push(MonitorEvent::StateChanged { from, to: state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::encoder::{afsk_modulate, encode_eom_burst, encode_header_burst};
    use crate::header::SameHeader;
    use crate::waveform::{INTERBURST_GAP_SECS, PREAMBLE};

    const TEST_HEADER: &str = "ZCZC-WXR-RWT-039173+0030-3202000-KR8MER-";

    fn gap() -> Vec<f32> {
        vec![0.0f32; (INTERBURST_GAP_SECS * DECODER_RATE as f32) as usize]
    }

    fn repeated(burst: &[f32], times: usize) -> Vec<f32> {
        let mut audio = gap();
        for rep in 0..times {
            if rep > 0 {
                audio.extend(gap());
            }
            audio.extend_from_slice(burst);
        }
        audio.extend(gap());
        audio
    }

    #[test]
    fn test_full_alert_cycle() {
        let hdr = SameHeader::new(TEST_HEADER).unwrap();
        let mut monitor = Monitor::new(DecoderConfig::default());
        let rx = monitor.subscribe();

        let mut events = monitor.push(&repeated(
            &encode_header_burst(&hdr, DECODER_RATE),
            3,
        ));
        assert!(monitor.alert_active());
        assert_eq!(MonitorState::Idle, monitor.state());
        assert!(events
            .iter()
            .any(|ev| matches!(ev, MonitorEvent::AlertStarted(h) if h.as_str() == TEST_HEADER)));

        events.extend(monitor.push(&repeated(&encode_eom_burst(DECODER_RATE), 3)));
        assert!(!monitor.alert_active());
        assert_eq!(
            1,
            events
                .iter()
                .filter(|ev| matches!(ev, MonitorEvent::AlertEnded))
                .count()
        );

        // the subscriber saw both decodes, in order
        let first = rx.try_recv().expect("header decode");
        assert!(!first.is_eom);
        assert_eq!(TEST_HEADER, first.header.expect("header").as_str());
        let second = rx.try_recv().expect("eom decode");
        assert!(second.is_eom);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_state_progression() {
        let hdr = SameHeader::new(TEST_HEADER).unwrap();
        let mut monitor = Monitor::new(DecoderConfig::default());
        let events = monitor.push(&repeated(
            &encode_header_burst(&hdr, DECODER_RATE),
            3,
        ));

        let states: Vec<MonitorState> = events
            .iter()
            .filter_map(|ev| match ev {
                MonitorEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        // first burst walks the whole acquisition path
        assert_eq!(MonitorState::SyncDetected, states[0]);
        assert_eq!(MonitorState::CapturingHeader, states[1]);
        assert_eq!(MonitorState::AwaitingRepeat, states[2]);
        assert!(states.contains(&MonitorState::Validated));
        assert_eq!(MonitorState::Idle, *states.last().unwrap());
    }

    #[test]
    fn test_preamble_only_returns_to_idle() {
        // sync with no message: preamble then silence
        let mut monitor = Monitor::new(DecoderConfig::default());
        let mut audio = afsk_modulate(&[PREAMBLE; 16], DECODER_RATE);
        audio.extend(vec![
            0.0f32;
            (DecoderConfig::default().sync_timeout_secs
                * DECODER_RATE as f32) as usize
                * 2
        ]);

        let events = monitor.push(&audio);
        assert!(events
            .iter()
            .any(|ev| matches!(
                ev,
                MonitorEvent::StateChanged {
                    to: MonitorState::SyncDetected,
                    ..
                }
            )));
        assert_eq!(MonitorState::Idle, monitor.state());
        assert!(!monitor.alert_active());
    }

    #[test]
    fn test_disagreeing_bursts_watchdog_to_idle() {
        let hdr_a = SameHeader::new(TEST_HEADER).unwrap();
        let hdr_b =
            SameHeader::new("ZCZC-CIV-ADR-039173+0030-3202000-KR8MER-").unwrap();
        let mut monitor = Monitor::new(DecoderConfig::default());

        let mut audio = gap();
        audio.extend(encode_header_burst(&hdr_a, DECODER_RATE));
        audio.extend(gap());
        audio.extend(encode_header_burst(&hdr_b, DECODER_RATE));
        // long silence: voting window expires, vote rejected
        audio.extend(vec![0.0f32; DECODER_RATE as usize * 10]);

        let events = monitor.push(&audio);
        assert!(!events
            .iter()
            .any(|ev| matches!(ev, MonitorEvent::Decoded(_))));
        assert_eq!(MonitorState::Idle, monitor.state());
    }

    #[test]
    fn test_snapshot_versioning() {
        let hdr = SameHeader::new(TEST_HEADER).unwrap();
        let mut monitor = Monitor::new(DecoderConfig::default());

        let before = monitor.snapshot();
        assert_eq!(MonitorState::Idle, before.state);
        assert!(!before.alert_active);

        monitor.push(&repeated(&encode_header_burst(&hdr, DECODER_RATE), 3));
        let after = monitor.snapshot();
        assert!(after.version > before.version);
        assert!(after.alert_active);
        assert_eq!(
            TEST_HEADER,
            after.last_header.as_ref().expect("header").as_str()
        );
        assert!(after.samples_processed > 0);
    }

    #[test]
    fn test_discontinuity_resets_capture() {
        let hdr = SameHeader::new(TEST_HEADER).unwrap();
        let mut monitor = Monitor::new(DecoderConfig::default());

        // half a burst, then a reported gap
        let burst = encode_header_burst(&hdr, DECODER_RATE);
        monitor.push(&burst[0..burst.len() / 2]);
        monitor.notify_discontinuity();
        assert_eq!(MonitorState::Idle, monitor.state());

        // a clean transmission afterwards still decodes
        let events = monitor.push(&repeated(&burst, 3));
        assert!(events
            .iter()
            .any(|ev| matches!(ev, MonitorEvent::Decoded(r) if !r.is_eom)));
    }
}

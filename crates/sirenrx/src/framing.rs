//! Byte-level burst framing
//!
//! Sits between bit recovery and voting. Once the decoder is
//! byte-synchronized it feeds every assembled byte here; the framer
//! hunts for a message prefix (`ZCZC` or `NNNN`), tolerating a small
//! number of bit errors, then accumulates message characters until an
//! invalid-byte run marks the end of the burst.

#[cfg(not(test))]
use log::debug;
#[cfg(test)]
use std::println as debug;

use crate::header::{PREFIX_MESSAGE_END, PREFIX_MESSAGE_START};

/// Framer output, per input byte
#[derive(Clone, Debug, PartialEq)]
pub enum FramerEvent {
    /// A message prefix was just recognized
    MessageStarted,

    /// A full burst has been captured
    ///
    /// The string starts with the canonical prefix and holds every
    /// valid character up to the end of carrier.
    BurstComplete(String),
}

#[derive(Clone, Debug, PartialEq)]
enum FramerState {
    /// Searching for a prefix in the rolling four-byte window
    Hunting,
    /// Prefix found, accumulating message characters
    Reading,
}

/// Prefix search and burst accumulation
#[derive(Clone, Debug)]
pub struct SameFramer {
    state: FramerState,
    window: u32,
    buf: String,
    invalid_run: usize,
}

impl SameFramer {
    // bit errors tolerated across the four prefix bytes
    const MAX_PREFIX_BIT_ERRORS: u32 = 2;

    // consecutive invalid bytes that end a burst
    const MAX_INVALID_RUN: usize = 2;

    // longest burst we will accumulate; a maximal SAME header with 31
    // location codes is shorter than this
    const MAX_BURST_CHARS: usize = 268;

    const START_WORD: u32 = u32::from_be_bytes([b'Z', b'C', b'Z', b'C']);
    const END_WORD: u32 = u32::from_be_bytes([b'N', b'N', b'N', b'N']);

    pub fn new() -> Self {
        Self {
            state: FramerState::Hunting,
            window: 0,
            buf: String::new(),
            invalid_run: 0,
        }
    }

    /// True once a prefix has been found and data is accumulating
    pub fn is_reading(&self) -> bool {
        self.state == FramerState::Reading
    }

    /// Consume one assembled byte
    pub fn push(&mut self, byte: u8) -> Option<FramerEvent> {
        match self.state {
            FramerState::Hunting => {
                self.window = (self.window << 8) | byte as u32;
                let prefix = if (self.window ^ Self::START_WORD).count_ones()
                    <= Self::MAX_PREFIX_BIT_ERRORS
                {
                    Some(&PREFIX_MESSAGE_START[0..4])
                } else if (self.window ^ Self::END_WORD).count_ones()
                    <= Self::MAX_PREFIX_BIT_ERRORS
                {
                    Some(PREFIX_MESSAGE_END)
                } else {
                    None
                };

                let prefix = prefix?;
                debug!("framer: message prefix \"{}\"", prefix);
                self.state = FramerState::Reading;
                self.buf.clear();
                self.buf.push_str(prefix);
                self.invalid_run = 0;
                Some(FramerEvent::MessageStarted)
            }
            FramerState::Reading => {
                if is_message_byte(byte) {
                    self.invalid_run = 0;
                    self.buf.push(byte as char);
                    if self.buf.len() >= Self::MAX_BURST_CHARS {
                        return Some(self.complete());
                    }
                    None
                } else {
                    self.invalid_run += 1;
                    if self.invalid_run >= Self::MAX_INVALID_RUN {
                        Some(self.complete())
                    } else {
                        None
                    }
                }
            }
        }
    }

    /// Abandon any burst in progress and restart the prefix hunt
    pub fn reset(&mut self) {
        self.state = FramerState::Hunting;
        self.window = 0;
        self.buf.clear();
        self.invalid_run = 0;
    }

    fn complete(&mut self) -> FramerEvent {
        let burst = std::mem::take(&mut self.buf);
        debug!("framer: burst complete, {} chars", burst.len());
        self.state = FramerState::Hunting;
        self.window = 0;
        self.invalid_run = 0;
        FramerEvent::BurstComplete(burst)
    }
}

impl Default for SameFramer {
    fn default() -> Self {
        Self::new()
    }
}

// Printable ASCII. The SAME character set is narrower, but bursts are
// voted afterwards; rejecting here would discard recoverable bursts.
fn is_message_byte(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_HEADER: &str = "ZCZC-WXR-RWT-039173+0030-3202000-KR8MER-";

    fn push_str(framer: &mut SameFramer, s: &str) -> Vec<FramerEvent> {
        s.bytes().filter_map(|b| framer.push(b)).collect()
    }

    #[test]
    fn test_frames_header_after_preamble() {
        let mut framer = SameFramer::new();

        // preamble bytes never match a prefix
        for _ in 0..16 {
            assert_eq!(None, framer.push(0xab));
        }

        let mut events = push_str(&mut framer, TEST_HEADER);
        assert_eq!(vec![FramerEvent::MessageStarted], events);
        assert!(framer.is_reading());

        // carrier drop: two invalid bytes end the burst
        assert_eq!(None, framer.push(0x00));
        events.extend(framer.push(0x00));
        assert_eq!(
            Some(&FramerEvent::BurstComplete(TEST_HEADER.to_owned())),
            events.last()
        );
        assert!(!framer.is_reading());
    }

    #[test]
    fn test_frames_eom() {
        let mut framer = SameFramer::new();
        let events = push_str(&mut framer, "NNNN");
        assert_eq!(vec![FramerEvent::MessageStarted], events);
        assert_eq!(None, framer.push(0x00));
        assert_eq!(
            Some(FramerEvent::BurstComplete("NNNN".to_owned())),
            framer.push(0x00)
        );
    }

    #[test]
    fn test_prefix_tolerates_bit_errors() {
        let mut framer = SameFramer::new();
        // two bit errors across the prefix still match, and the
        // canonical prefix is emitted
        for &b in &[b'Z' ^ 0x01, b'C', b'Z' ^ 0x80, b'C'] {
            framer.push(b);
        }
        assert!(framer.is_reading());
        framer.push(0x00);
        let out = framer.push(0x00);
        assert_eq!(Some(FramerEvent::BurstComplete("ZCZC".to_owned())), out);
    }

    #[test]
    fn test_three_errors_do_not_match() {
        let mut framer = SameFramer::new();
        for &b in &[b'Z' ^ 0x07, b'C', b'Z', b'C'] {
            framer.push(b);
        }
        assert!(!framer.is_reading());
    }

    #[test]
    fn test_single_invalid_byte_is_bridged() {
        let mut framer = SameFramer::new();
        push_str(&mut framer, "ZCZC-WXR");
        assert_eq!(None, framer.push(0x00));
        let events = push_str(&mut framer, "-RWT");
        assert!(events.is_empty());
        framer.push(0x00);
        let out = framer.push(0x00);
        // the lone invalid byte is dropped, the burst continues
        assert_eq!(
            Some(FramerEvent::BurstComplete("ZCZC-WXR-RWT".to_owned())),
            out
        );
    }

    #[test]
    fn test_reset_abandons_burst() {
        let mut framer = SameFramer::new();
        push_str(&mut framer, "ZCZC-WXR");
        framer.reset();
        assert!(!framer.is_reading());
        // no stale characters leak into the next burst
        let events = push_str(&mut framer, "NNNN");
        assert_eq!(vec![FramerEvent::MessageStarted], events);
    }
}

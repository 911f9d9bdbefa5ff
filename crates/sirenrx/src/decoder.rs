//! Clock-free SAME bit recovery
//!
//! The decoder runs at the fixed [`DECODER_RATE`](crate::DECODER_RATE)
//! and never derives a clock from the signal. Instead, sliding complex
//! matched filters at the mark and space frequencies produce one soft
//! symbol value per input sample; the preamble is located by comparing
//! hard decisions against four repetitions of `0xAB` at every candidate
//! bit phase. Once a phase wins, bits are taken at fractional bit-period
//! steps from that anchor, packed LSB-first into bytes, framed, and
//! voted.
//!
//! The baud rate does not divide the decoder rate evenly; the bit
//! boundary is a fractional accumulator, exactly mirroring the
//! [encoder](crate::encoder).

use std::collections::VecDeque;

#[cfg(not(test))]
use log::debug;
#[cfg(test)]
use std::println as debug;

use num_complex::Complex;

use crate::config::DecoderConfig;
use crate::filter::{FirCoeff, SampleWindow};
use crate::framing::{FramerEvent, SameFramer};
use crate::header::DecodeResult;
use crate::votes::BurstVoter;
use crate::waveform::{self, PREAMBLE};

/// Progress report from the decoder
#[derive(Clone, Debug, PartialEq)]
pub enum DecoderEvent {
    /// Preamble found; bit and byte phase are locked
    SyncAcquired,

    /// A message prefix was recognized and characters are being
    /// captured
    MessageStarted,

    /// One burst repetition was framed
    BurstCaptured {
        /// Length of the framed burst, in characters
        chars: usize,
    },

    /// Bit sync was abandoned without producing a burst
    SyncLost,

    /// Voting finished
    Decoded(DecodeResult),
}

#[derive(Clone, Debug)]
enum SyncState {
    /// Searching every sample for the preamble pattern
    Hunting,
    /// Pattern found; sweeping one symbol for the best bit boundary
    Refining {
        best_quality: f32,
        age_of_best: usize,
        remaining: usize,
    },
    /// Locked; sampling bits at fractional symbol steps
    Synced {
        next_bit: f64,
        bits: u8,
        nbits: u8,
        bytes_read: usize,
    },
}

/// SAME/EAS burst decoder
///
/// Feed mono audio at the decoder rate to [`push`](Self::push); decoded
/// headers come back as [`DecoderEvent::Decoded`].
#[derive(Clone, Debug)]
pub struct SameDecoder {
    sps: f64,
    mark: FirCoeff<Complex<f32>>,
    space: FirCoeff<Complex<f32>>,
    window: SampleWindow<f32>,
    // one soft symbol value per input sample, newest last
    soft: VecDeque<f32>,
    soft_capacity: usize,
    clock: u64,
    state: SyncState,
    framer: SameFramer,
    voter: BurstVoter,
    confidence_floor: f32,
}

impl SameDecoder {
    // bit errors tolerated in the 32-bit preamble comparison
    const MAX_SYNC_ERRORS: u32 = 2;

    // bits in the sync comparison: four preamble bytes
    const SYNC_BITS: usize = 32;

    // bytes after bit sync without a message prefix before sync is
    // declared false
    const MAX_HUNT_BYTES: usize = 24;

    /// Create a decoder with default settings for input at rate `fs`
    pub fn new(fs: u32) -> Self {
        Self::with_config(fs, &DecoderConfig::default())
    }

    /// Create a decoder with explicit settings
    pub fn with_config(fs: u32, config: &DecoderConfig) -> Self {
        let sps = waveform::samples_per_symbol(fs) as f64;
        let (mark, space) = waveform::matched_filter(fs);
        let ntaps = mark.len();
        let soft_capacity =
            ((Self::SYNC_BITS - 1) as f64 * sps).round() as usize + 2;
        let window_samples = (config.repeat_window_secs as f64 * fs as f64) as u64;

        Self {
            sps,
            mark: FirCoeff::from_slice(mark.as_slice()),
            space: FirCoeff::from_slice(space.as_slice()),
            window: SampleWindow::new(ntaps),
            soft: VecDeque::with_capacity(soft_capacity),
            soft_capacity,
            clock: 0,
            state: SyncState::Hunting,
            framer: SameFramer::new(),
            voter: BurstVoter::new(window_samples),
            confidence_floor: config.confidence_floor,
        }
    }

    /// Samples consumed so far
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// True while bit sync is held
    pub fn is_synced(&self) -> bool {
        !matches!(self.state, SyncState::Hunting)
    }

    /// Consume a block of audio at the decoder rate
    pub fn push(&mut self, input: &[f32]) -> Vec<DecoderEvent> {
        let mut events = Vec::new();

        for &sa in input {
            self.clock += 1;

            // matched-filter soft decision for this sample
            self.window.push([sa]);
            let hist = self.window.as_slice();
            let mark_mag: f32 = {
                let out: Complex<f32> = self.mark.filter(hist);
                out.norm()
            };
            let space_mag: f32 = {
                let out: Complex<f32> = self.space.filter(hist);
                out.norm()
            };
            if self.soft.len() == self.soft_capacity {
                self.soft.pop_front();
            }
            self.soft.push_back(mark_mag - space_mag);

            self.advance(&mut events);
        }

        if let Some(result) = self.voter.tick(self.clock) {
            self.deliver(result, &mut events);
        }

        events
    }

    /// Drop sync and discard all partial captures
    pub fn reset(&mut self) {
        self.window.reset();
        self.soft.clear();
        self.state = SyncState::Hunting;
        self.framer.reset();
        self.voter.reset();
    }

    // One step of the sync state machine, after the newest soft value
    // has been pushed. The state is moved out and replaced so that the
    // arms can borrow the rest of the decoder freely.
    fn advance(&mut self, events: &mut Vec<DecoderEvent>) {
        let state = std::mem::replace(&mut self.state, SyncState::Hunting);
        self.state = match state {
            SyncState::Hunting => match self.sync_quality() {
                // sweep the next symbol for the best anchor
                Some(quality) => SyncState::Refining {
                    best_quality: quality,
                    age_of_best: 0,
                    remaining: self.sps.ceil() as usize,
                },
                None => SyncState::Hunting,
            },
            SyncState::Refining {
                mut best_quality,
                mut age_of_best,
                remaining,
            } => {
                age_of_best += 1;
                if let Some(quality) = self.sync_quality() {
                    if quality > best_quality {
                        best_quality = quality;
                        age_of_best = 0;
                    }
                }
                if remaining > 1 {
                    SyncState::Refining {
                        best_quality,
                        age_of_best,
                        remaining: remaining - 1,
                    }
                } else {
                    debug!("bit sync acquired at sample {}", self.clock);
                    self.framer.reset();
                    events.push(DecoderEvent::SyncAcquired);
                    SyncState::Synced {
                        next_bit: self.sps - age_of_best as f64,
                        bits: 0,
                        nbits: 0,
                        bytes_read: 0,
                    }
                }
            }
            SyncState::Synced {
                mut next_bit,
                mut bits,
                mut nbits,
                mut bytes_read,
            } => {
                next_bit -= 1.0;
                if next_bit <= 0.0 {
                    next_bit += self.sps;

                    let bit = *self.soft.back().unwrap_or(&0.0) > 0.0;
                    bits = (bits >> 1) | ((bit as u8) << 7);
                    nbits += 1;
                    if nbits == 8 {
                        let byte = bits;
                        bits = 0;
                        nbits = 0;
                        bytes_read += 1;
                        if let Some(next) = self.consume_byte(byte, bytes_read, events) {
                            self.state = next;
                            return;
                        }
                    }
                }
                SyncState::Synced {
                    next_bit,
                    bits,
                    nbits,
                    bytes_read,
                }
            }
        };
    }

    // Feed one assembled byte through the framer and voter. Returns
    // Some(state) when byte delivery forces a state change.
    fn consume_byte(
        &mut self,
        byte: u8,
        bytes_read: usize,
        events: &mut Vec<DecoderEvent>,
    ) -> Option<SyncState> {
        let hunting_too_long =
            !self.framer.is_reading() && bytes_read > Self::MAX_HUNT_BYTES;

        match self.framer.push(byte) {
            Some(FramerEvent::MessageStarted) => {
                events.push(DecoderEvent::MessageStarted);
                None
            }
            Some(FramerEvent::BurstComplete(burst)) => {
                events.push(DecoderEvent::BurstCaptured {
                    chars: burst.len(),
                });
                for result in self.voter.push_burst(burst, self.clock) {
                    self.deliver(result, events);
                }
                Some(SyncState::Hunting)
            }
            None if hunting_too_long => {
                debug!("no message prefix after sync; dropping");
                self.framer.reset();
                events.push(DecoderEvent::SyncLost);
                Some(SyncState::Hunting)
            }
            None => None,
        }
    }

    // Compare hard decisions at the current phase against the preamble
    // pattern; Some(quality) when the pattern matches.
    fn sync_quality(&self) -> Option<f32> {
        if self.soft.len() < self.soft_capacity {
            return None;
        }
        let newest = self.soft.len() - 1;

        let mut errors = 0u32;
        let mut quality = 0.0f32;
        for k in 0..Self::SYNC_BITS {
            let age = (k as f64 * self.sps).round() as usize;
            let value = self.soft[newest - age];
            // bit transmitted (SYNC_BITS - 1 - k) positions before the
            // newest; the preamble repeats the LSB-first pattern of 0xAB
            let tx_index = Self::SYNC_BITS - 1 - k;
            let expected = (PREAMBLE >> (tx_index % 8)) & 0x01 == 1;
            if (value > 0.0) != expected {
                errors += 1;
                if errors > Self::MAX_SYNC_ERRORS {
                    return None;
                }
            }
            quality += value.abs();
        }
        Some(quality)
    }

    // Apply the confidence floor and queue the result.
    fn deliver(&self, result: DecodeResult, events: &mut Vec<DecoderEvent>) {
        if !result.is_eom && result.confidence < self.confidence_floor {
            debug!(
                "decode below confidence floor ({:.2} < {:.2}), dropped",
                result.confidence, self.confidence_floor
            );
            return;
        }
        events.push(DecoderEvent::Decoded(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    use crate::encoder::{encode_eom_burst, encode_header_burst};
    use crate::header::SameHeader;
    use crate::resample::DECODER_RATE;
    use crate::waveform::INTERBURST_GAP_SECS;

    const TEST_HEADER: &str = "ZCZC-WXR-RWT-039173+0030-3202000-KR8MER-";

    fn gap(fs: u32) -> Vec<f32> {
        vec![0.0f32; (INTERBURST_GAP_SECS * fs as f32) as usize]
    }

    // three header bursts with one-second gaps, leading and trailing
    // silence
    fn three_bursts(fs: u32) -> Vec<f32> {
        let hdr = SameHeader::new(TEST_HEADER).unwrap();
        let burst = encode_header_burst(&hdr, fs);
        let mut audio = gap(fs);
        for rep in 0..3 {
            if rep > 0 {
                audio.extend(gap(fs));
            }
            audio.extend_from_slice(&burst);
        }
        audio.extend(gap(fs));
        audio
    }

    fn decoded(events: &[DecoderEvent]) -> Vec<&DecodeResult> {
        events
            .iter()
            .filter_map(|ev| match ev {
                DecoderEvent::Decoded(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_noiseless_round_trip() {
        let mut dec = SameDecoder::new(DECODER_RATE);
        let events = dec.push(&three_bursts(DECODER_RATE));

        let results = decoded(&events);
        assert_eq!(1, results.len(), "events: {:?}", events);
        let result = results[0];
        assert_eq!(3, result.bursts_agreed);
        assert_approx_eq!(1.0f32, result.confidence);
        assert_eq!(
            TEST_HEADER,
            result.header.as_ref().expect("header").as_str()
        );
    }

    #[test]
    fn test_round_trip_reports_progress() {
        let mut dec = SameDecoder::new(DECODER_RATE);
        let events = dec.push(&three_bursts(DECODER_RATE));

        let syncs = events
            .iter()
            .filter(|ev| matches!(ev, DecoderEvent::SyncAcquired))
            .count();
        let captures = events
            .iter()
            .filter(|ev| matches!(ev, DecoderEvent::BurstCaptured { .. }))
            .count();
        assert_eq!(3, syncs);
        assert_eq!(3, captures);
    }

    #[test]
    fn test_eom_round_trip() {
        let mut dec = SameDecoder::new(DECODER_RATE);
        let eom = encode_eom_burst(DECODER_RATE);
        let mut audio = gap(DECODER_RATE);
        audio.extend_from_slice(&eom);
        audio.extend(gap(DECODER_RATE));

        let events = dec.push(&audio);
        let results = decoded(&events);
        assert_eq!(1, results.len(), "events: {:?}", events);
        assert!(results[0].is_eom);
        assert!(results[0].header.is_none());
    }

    #[test]
    fn test_silence_produces_nothing() {
        let mut dec = SameDecoder::new(DECODER_RATE);
        let events = dec.push(&vec![0.0f32; DECODER_RATE as usize * 3]);
        assert!(events.is_empty(), "events: {:?}", events);
        assert!(!dec.is_synced());
    }

    #[test]
    fn test_noise_produces_no_decode() {
        // deterministic pseudo-noise; must never panic or decode
        let mut dec = SameDecoder::new(DECODER_RATE);
        let mut seed = 0x2545f491u32;
        let noise: Vec<f32> = (0..DECODER_RATE * 2)
            .map(|_| {
                seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
                (seed >> 16) as f32 / 32768.0 - 1.0
            })
            .collect();
        let events = dec.push(&noise);
        assert!(decoded(&events).is_empty());
    }

    #[test]
    fn test_resampled_inputs_decode() {
        use crate::resample::Resampler;

        for fs in [16000u32, 22050, 44100, 48000] {
            let hdr = SameHeader::new(TEST_HEADER).unwrap();
            let burst = encode_header_burst(&hdr, fs);
            let mut audio = gap(fs);
            for rep in 0..3 {
                if rep > 0 {
                    audio.extend(gap(fs));
                }
                audio.extend_from_slice(&burst);
            }
            audio.extend(gap(fs));

            let mut rs = Resampler::for_decoder(fs);
            let mut dec = SameDecoder::new(DECODER_RATE);
            let events = dec.push(&rs.process(&audio));

            let results = decoded(&events);
            assert_eq!(1, results.len(), "fs={}: {:?}", fs, events);
            assert!(
                results[0].confidence >= 0.95,
                "fs={} confidence {}",
                fs,
                results[0].confidence
            );
            assert_eq!(
                TEST_HEADER,
                results[0].header.as_ref().expect("header").as_str(),
                "fs={}",
                fs
            );
        }
    }

    #[test]
    fn test_one_corrupted_burst_two_thirds_confidence() {
        let fs = DECODER_RATE;
        let hdr = SameHeader::new(TEST_HEADER).unwrap();
        let burst = encode_header_burst(&hdr, fs);

        // corrupt the tail of the first repetition: overwrite the last
        // ten characters' worth of audio with silence
        let mut corrupted = burst.clone();
        let cut = 10.0 * 8.0 * waveform::samples_per_symbol(fs) as f64;
        let keep = corrupted.len() - cut as usize;
        corrupted.truncate(keep);

        let mut audio = gap(fs);
        audio.extend_from_slice(&corrupted);
        audio.extend(gap(fs));
        audio.extend(gap(fs));
        audio.extend_from_slice(&burst);
        audio.extend(gap(fs));
        audio.extend_from_slice(&burst);
        audio.extend(gap(fs));

        let mut dec = SameDecoder::new(fs);
        let events = dec.push(&audio);
        let results = decoded(&events);
        assert_eq!(1, results.len(), "events: {:?}", events);
        assert_eq!(2, results[0].bursts_agreed);
        assert_approx_eq!(2.0f32 / 3.0, results[0].confidence);
        assert_eq!(
            TEST_HEADER,
            results[0].header.as_ref().expect("header").as_str()
        );
    }
}

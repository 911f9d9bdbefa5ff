//! Burst voting and confidence scoring
//!
//! SAME transmits every burst three times. Individual bursts are
//! accepted or rejected *as whole strings*: a decode is surfaced only
//! when at least two of three captured repetitions agree exactly, or
//! when every captured repetition agrees in the case that fewer than
//! three arrived before the collection window closed.
//!
//! Confidence is the agreement fraction, scaled down when the winning
//! string fails the header grammar. Voting never repairs a burst
//! character-by-character; a burst that loses the vote contributes
//! nothing to the output.

#[cfg(not(test))]
use log::debug;
#[cfg(test)]
use std::println as debug;

use arrayvec::ArrayVec;

use crate::header::{DecodeResult, SameHeader, PREFIX_MESSAGE_END};
use crate::waveform::BURST_REPEATS;

/// Collects burst repetitions and emits voted [`DecodeResult`]s
#[derive(Clone, Debug)]
pub struct BurstVoter {
    // collection window, in decoder samples, measured from the first
    // captured burst
    window_samples: u64,
    bursts: ArrayVec<String, BURST_REPEATS>,
    deadline: Option<u64>,
    // suppress the repeated end-of-message bursts
    eom_holdoff_until: Option<u64>,
}

impl BurstVoter {
    // confidence multiplier for a winning string that fails the
    // header grammar
    const GRAMMAR_PENALTY: f32 = 0.5;

    /// Create a voter whose collection window is `window_samples` long
    pub fn new(window_samples: u64) -> Self {
        Self {
            window_samples,
            bursts: ArrayVec::new(),
            deadline: None,
            eom_holdoff_until: None,
        }
    }

    /// Add a framed burst captured at decoder time `clock`
    ///
    /// May emit up to two results: an end-of-message burst flushes any
    /// header vote still in progress before reporting itself.
    pub fn push_burst(&mut self, burst: String, clock: u64) -> Vec<DecodeResult> {
        let mut out = Vec::new();

        if burst.starts_with(PREFIX_MESSAGE_END) {
            if let Some(result) = self.flush() {
                out.push(result);
            }
            match self.eom_holdoff_until {
                Some(until) if clock < until => {
                    debug!("vote: duplicate end-of-message suppressed");
                }
                _ => {
                    self.eom_holdoff_until = Some(clock + self.window_samples);
                    out.push(DecodeResult {
                        header: None,
                        confidence: 1.0,
                        bursts_agreed: 1,
                        is_eom: true,
                    });
                }
            }
            return out;
        }

        if self.bursts.is_empty() {
            self.deadline = Some(clock + self.window_samples);
        }
        self.bursts.push(burst);
        if self.bursts.len() == BURST_REPEATS {
            out.extend(self.flush());
        }
        out
    }

    /// Advance the voter's clock, closing an expired collection window
    pub fn tick(&mut self, clock: u64) -> Option<DecodeResult> {
        match self.deadline {
            Some(deadline) if clock >= deadline => {
                debug!(
                    "vote: window closed with {} of {} bursts",
                    self.bursts.len(),
                    BURST_REPEATS
                );
                self.flush()
            }
            _ => None,
        }
    }

    /// Discard all collected state
    pub fn reset(&mut self) {
        self.bursts.clear();
        self.deadline = None;
        self.eom_holdoff_until = None;
    }

    // Run the vote over whatever was captured.
    fn flush(&mut self) -> Option<DecodeResult> {
        self.deadline = None;
        if self.bursts.is_empty() {
            return None;
        }

        let captured = self.bursts.len();
        let (winner, agreed) = {
            let mut best: (&String, usize) = (&self.bursts[0], 0);
            for cand in &self.bursts {
                let count = self.bursts.iter().filter(|b| *b == cand).count();
                if count > best.1 {
                    best = (cand, count);
                }
            }
            (best.0.clone(), best.1)
        };
        self.bursts.clear();

        // three captures need a majority; fewer must be unanimous
        let accepted = if captured >= BURST_REPEATS {
            agreed >= 2
        } else {
            agreed == captured
        };
        if !accepted {
            debug!(
                "vote: rejected, best agreement {} of {} bursts",
                agreed, captured
            );
            return None;
        }

        let agreement = agreed as f32 / captured as f32;
        let (header, confidence) = match SameHeader::new(winner.as_str()) {
            Ok(header) => (Some(header), agreement),
            Err(err) => {
                debug!("vote: winner fails grammar ({}): \"{}\"", err, winner);
                (None, agreement * Self::GRAMMAR_PENALTY)
            }
        };

        Some(DecodeResult {
            header,
            confidence,
            bursts_agreed: agreed as u8,
            is_eom: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    const TEST_HEADER: &str = "ZCZC-WXR-RWT-039173+0030-3202000-KR8MER-";
    const WINDOW: u64 = 77_175; // 7 s at 11025 Hz

    #[test]
    fn test_three_identical_bursts_full_confidence() {
        let mut voter = BurstVoter::new(WINDOW);
        assert!(voter.push_burst(TEST_HEADER.to_owned(), 0).is_empty());
        assert!(voter.push_burst(TEST_HEADER.to_owned(), 20_000).is_empty());
        let out = voter.push_burst(TEST_HEADER.to_owned(), 40_000);

        assert_eq!(1, out.len());
        let result = &out[0];
        assert_eq!(3, result.bursts_agreed);
        assert_approx_eq!(1.0f32, result.confidence);
        assert!(!result.is_eom);
        assert_eq!(
            TEST_HEADER,
            result.header.as_ref().expect("header").as_str()
        );
    }

    #[test]
    fn test_two_of_three_majority() {
        let mut voter = BurstVoter::new(WINDOW);
        voter.push_burst(TEST_HEADER.to_owned(), 0);
        voter.push_burst("ZCZC-WXR-RWT-03917".to_owned(), 20_000);
        let out = voter.push_burst(TEST_HEADER.to_owned(), 40_000);

        assert_eq!(1, out.len());
        assert_eq!(2, out[0].bursts_agreed);
        assert_approx_eq!(2.0f32 / 3.0, out[0].confidence);
        assert!(out[0].header.is_some());
    }

    #[test]
    fn test_all_disagree_rejected() {
        let mut voter = BurstVoter::new(WINDOW);
        voter.push_burst("ZCZC-AAA".to_owned(), 0);
        voter.push_burst("ZCZC-BBB".to_owned(), 1);
        assert!(voter.push_burst("ZCZC-CCC".to_owned(), 2).is_empty());
    }

    #[test]
    fn test_window_expiry_with_two_agreeing() {
        let mut voter = BurstVoter::new(WINDOW);
        voter.push_burst(TEST_HEADER.to_owned(), 0);
        voter.push_burst(TEST_HEADER.to_owned(), 20_000);

        assert!(voter.tick(WINDOW - 1).is_none());
        let result = voter.tick(WINDOW).expect("vote at expiry");
        assert_eq!(2, result.bursts_agreed);
        assert_approx_eq!(1.0f32, result.confidence);

        // the window does not re-fire
        assert!(voter.tick(WINDOW + 1).is_none());
    }

    #[test]
    fn test_window_expiry_two_disagreeing_rejected() {
        let mut voter = BurstVoter::new(WINDOW);
        voter.push_burst(TEST_HEADER.to_owned(), 0);
        voter.push_burst("ZCZC-WXR-TOR-039173+0030-3202000-KR8MER-".to_owned(), 1);
        assert!(voter.tick(WINDOW).is_none());
    }

    #[test]
    fn test_grammar_penalty() {
        let mut voter = BurstVoter::new(WINDOW);
        // agrees perfectly but is not a valid header
        voter.push_burst("ZCZC-GARBAGE".to_owned(), 0);
        voter.push_burst("ZCZC-GARBAGE".to_owned(), 1);
        voter.push_burst("ZCZC-GARBAGE".to_owned(), 2);
        let result = voter.tick(WINDOW).is_none();
        assert!(result); // already emitted on the third burst

        let mut voter = BurstVoter::new(WINDOW);
        voter.push_burst("ZCZC-GARBAGE".to_owned(), 0);
        voter.push_burst("ZCZC-GARBAGE".to_owned(), 1);
        let out = voter.push_burst("ZCZC-GARBAGE".to_owned(), 2);
        assert_eq!(1, out.len());
        assert!(out[0].header.is_none());
        assert_approx_eq!(0.5f32, out[0].confidence);
    }

    #[test]
    fn test_eom_immediate_and_deduplicated() {
        let mut voter = BurstVoter::new(WINDOW);
        let out = voter.push_burst("NNNN".to_owned(), 0);
        assert_eq!(1, out.len());
        assert!(out[0].is_eom);
        assert_approx_eq!(1.0f32, out[0].confidence);

        // repetitions inside the holdoff are suppressed
        assert!(voter.push_burst("NNNN".to_owned(), 20_000).is_empty());
        assert!(voter.push_burst("NNNN".to_owned(), 40_000).is_empty());

        // a later, separate end-of-message reports again
        let out = voter.push_burst("NNNN".to_owned(), 200_000);
        assert_eq!(1, out.len());
    }

    #[test]
    fn test_eom_flushes_pending_header_vote() {
        let mut voter = BurstVoter::new(WINDOW);
        voter.push_burst(TEST_HEADER.to_owned(), 0);
        voter.push_burst(TEST_HEADER.to_owned(), 20_000);
        let out = voter.push_burst("NNNN".to_owned(), 40_000);

        assert_eq!(2, out.len());
        assert!(!out[0].is_eom);
        assert!(out[0].header.is_some());
        assert!(out[1].is_eom);
    }
}

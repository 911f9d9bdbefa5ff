//! Wide-FM stereo multiplex decoding
//!
//! The FM multiplex carries the main (L+R) channel from 0–15 kHz, a
//! 19 kHz pilot tone, the (L−R) difference as DSB-SC around 38 kHz,
//! and optionally RDS data at 57 kHz. This decoder tracks the pilot
//! with a PLL, regenerates the 38 kHz reference coherently at twice
//! the pilot phase, demodulates the difference channel, and matrixes
//! the two into left/right audio with de-emphasis.
//!
//! The capture rate must satisfy Nyquist for every enabled subcarrier;
//! [`ReceiverConfig::validate`](crate::ReceiverConfig::validate)
//! enforces this before a decoder is ever constructed.

use std::f32::consts::PI;

use crate::demod::Deemphasis;
use crate::rds::RdsDecoder;

/// Pilot tone frequency (Hz)
pub const PILOT_HZ: f32 = 19_000.0;

/// Stereo difference subcarrier frequency (Hz)
pub const STEREO_SUBCARRIER_HZ: f32 = 38_000.0;

/// Top edge of the stereo difference band (Hz)
pub const STEREO_BAND_TOP_HZ: f32 = 53_000.0;

/// RDS subcarrier frequency (Hz)
pub const RDS_SUBCARRIER_HZ: f32 = 57_000.0;

/// Main channel audio bandwidth (Hz)
pub const AUDIO_CUTOFF_HZ: f32 = 15_000.0;

/// One block of decoded stereo audio
#[derive(Clone, Debug, Default)]
pub struct StereoFrame {
    /// Left channel
    pub left: Vec<f32>,
    /// Right channel
    pub right: Vec<f32>,
    /// True if the 19 kHz pilot is currently locked
    pub pilot_locked: bool,
    /// Detected pilot level relative to total multiplex power
    pub pilot_level: f32,
}

/// Pilot-PLL stereo decoder
#[derive(Clone, Debug)]
pub struct StereoDecoder {
    fs: f32,
    // PLL state; phase and frequency in cycles (per sample)
    pilot_phase: f32,
    pilot_freq: f32,
    pll_alpha: f32,
    pll_beta: f32,
    pilot_locked: bool,
    pilot_level: f32,
    // audio path state
    lp_mono: OnePole,
    lp_diff: OnePole,
    deemph_l: Deemphasis,
    deemph_r: Deemphasis,
    // optional 57 kHz data decoder
    rds: Option<RdsDecoder>,
    pending: Option<StereoFrame>,
}

impl StereoDecoder {
    // pilot PLL loop bandwidth (Hz)
    const PLL_BW_HZ: f32 = 10.0;

    // pilot level above which we declare lock
    const LOCK_THRESHOLD: f32 = 0.05;

    /// Create a stereo decoder for multiplex input at rate `fs`
    pub fn new(fs: u32, deemphasis_us: f32) -> Self {
        let fsf = fs as f32;
        let bw = Self::PLL_BW_HZ / fsf;
        let alpha = 2.0 * bw;
        Self {
            fs: fsf,
            pilot_phase: 0.0,
            pilot_freq: PILOT_HZ / fsf,
            pll_alpha: alpha,
            pll_beta: alpha * alpha / 4.0,
            pilot_locked: false,
            pilot_level: 0.0,
            lp_mono: OnePole::new(fsf, AUDIO_CUTOFF_HZ),
            lp_diff: OnePole::new(fsf, AUDIO_CUTOFF_HZ),
            deemph_l: Deemphasis::new(fs, deemphasis_us),
            deemph_r: Deemphasis::new(fs, deemphasis_us),
            rds: None,
            pending: None,
        }
    }

    /// Enable the 57 kHz RDS subcarrier decoder
    pub fn enable_rds(&mut self) {
        if self.rds.is_none() {
            self.rds = Some(RdsDecoder::new(self.fs as u32));
        }
    }

    /// The RDS decoder, if enabled
    pub fn rds(&mut self) -> Option<&mut RdsDecoder> {
        self.rds.as_mut()
    }

    /// True if the pilot is currently locked
    pub fn is_stereo(&self) -> bool {
        self.pilot_locked
    }

    /// Decode a block of multiplex samples into left/right audio
    pub fn decode(&mut self, mpx: &[f32]) -> StereoFrame {
        if mpx.is_empty() {
            return StereoFrame::default();
        }

        let n = mpx.len();
        let mut left = Vec::with_capacity(n);
        let mut right = Vec::with_capacity(n);

        // coherent correlation against the NCO; an uncorrelated input
        // averages to zero here no matter how strong it is
        let mut corr_i = 0.0f32;
        let mut corr_q = 0.0f32;
        let mut total_energy = 0.0f32;

        for &sa in mpx {
            // PLL: lock the reference to the 19 kHz pilot
            let theta = 2.0 * PI * self.pilot_phase;
            let error = sa * theta.sin();
            corr_i += sa * theta.cos();
            corr_q += error;
            total_energy += sa * sa;

            self.pilot_freq += self.pll_beta * error;
            self.pilot_phase += self.pilot_freq + self.pll_alpha * error;
            self.pilot_phase = self.pilot_phase.rem_euclid(1.0);

            // main channel and coherently-demodulated difference channel
            let mono = self.lp_mono.filter(sa);
            let carrier38 = (2.0 * theta).cos();
            let diff = self.lp_diff.filter(sa * carrier38 * 2.0);

            // 57 kHz runs at three times the pilot phase
            if let Some(rds) = &mut self.rds {
                rds.push(sa * (3.0 * theta).cos());
            }

            let l = self.deemph_l.filter(0.5 * (mono + diff));
            let r = self.deemph_r.filter(0.5 * (mono - diff));
            left.push(l);
            right.push(r);
        }

        self.pilot_level = if total_energy > 0.0 {
            let rms = (total_energy / n as f32).sqrt();
            let corr = (corr_i * corr_i + corr_q * corr_q).sqrt() / n as f32;
            (2.0 * corr / rms).min(1.0)
        } else {
            0.0
        };
        self.pilot_locked = self.pilot_level > Self::LOCK_THRESHOLD;

        StereoFrame {
            left,
            right,
            pilot_locked: self.pilot_locked,
            pilot_level: self.pilot_level,
        }
    }

    /// Decode and hold the result for a later [`take_frame`](Self::take_frame)
    ///
    /// Used by the [`Demodulator`](crate::Demodulator), whose primary
    /// output is the mono decode path.
    pub fn push_mpx(&mut self, mpx: &[f32]) {
        let frame = self.decode(mpx);
        self.pending = Some(frame);
    }

    /// Take the most recent decoded stereo block, if any
    pub fn take_frame(&mut self) -> Option<StereoFrame> {
        self.pending.take()
    }

    /// Reset all state to zero initial conditions
    pub fn reset(&mut self) {
        self.pilot_phase = 0.0;
        self.pilot_freq = PILOT_HZ / self.fs;
        self.pilot_locked = false;
        self.pilot_level = 0.0;
        self.lp_mono.reset();
        self.lp_diff.reset();
        self.deemph_l.reset();
        self.deemph_r.reset();
        if let Some(rds) = &mut self.rds {
            rds.reset();
        }
        self.pending = None;
    }
}

// Single-pole IIR lowpass.
#[derive(Clone, Debug)]
struct OnePole {
    alpha: f32,
    state: f32,
}

impl OnePole {
    fn new(fs: f32, cutoff_hz: f32) -> Self {
        let x = 2.0 * PI * cutoff_hz / fs;
        Self {
            alpha: x / (1.0 + x),
            state: 0.0,
        }
    }

    #[inline]
    fn filter(&mut self, sa: f32) -> f32 {
        self.state += self.alpha * (sa - self.state);
        self.state
    }

    fn reset(&mut self) {
        self.state = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 240_000;

    #[test]
    fn test_silence_does_not_lock() {
        let mut st = StereoDecoder::new(FS, 75.0);
        let frame = st.decode(&vec![0.0f32; 24_000]);
        assert!(!frame.pilot_locked);
        assert_eq!(0.0, frame.pilot_level);
    }

    #[test]
    fn test_pilot_tone_detected() {
        let mut st = StereoDecoder::new(FS, 75.0);
        let mpx: Vec<f32> = (0..48_000)
            .map(|i| 0.1 * (2.0 * PI * PILOT_HZ * i as f32 / FS as f32).sin())
            .collect();
        let frame = st.decode(&mpx);
        // pure pilot input: nearly all multiplex power is pilot power
        assert!(frame.pilot_level > 0.5, "level {}", frame.pilot_level);
        assert!(frame.pilot_locked);
    }

    #[test]
    fn test_mono_input_gives_equal_channels() {
        let mut st = StereoDecoder::new(FS, 75.0);
        // mono program material, no pilot
        let mpx: Vec<f32> = (0..24_000)
            .map(|i| 0.5 * (2.0 * PI * 1000.0 * i as f32 / FS as f32).sin())
            .collect();
        let frame = st.decode(&mpx);
        assert!(!frame.pilot_locked);

        // without a locked subcarrier the difference channel is noise
        // far below the main channel; L and R track closely
        for (l, r) in frame.left[4000..].iter().zip(frame.right[4000..].iter()) {
            assert!((l - r).abs() < 0.2 * 0.5);
        }
    }

    #[test]
    fn test_take_frame() {
        let mut st = StereoDecoder::new(FS, 75.0);
        assert!(st.take_frame().is_none());
        st.push_mpx(&[0.0f32; 512]);
        let frame = st.take_frame().expect("frame pending");
        assert_eq!(512, frame.left.len());
        assert!(st.take_frame().is_none());
    }
}

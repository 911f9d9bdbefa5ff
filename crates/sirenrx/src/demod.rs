//! Demodulation from raw IQ samples to audio
//!
//! The chain begins with a quadrature FM discriminator: the
//! instantaneous phase difference `angle(s[n] * conj(s[n-1]))` recovers
//! the baseband multiplex signal. Narrowband FM and AM add de-emphasis
//! and envelope detection respectively; wide FM hands the multiplex to
//! the [stereo decoder](crate::stereo) when subcarriers are enabled.

use num_complex::Complex;

use crate::config::{Modulation, ReceiverConfig};
use crate::stereo::StereoDecoder;

/// Quadrature FM discriminator
///
/// Output is scaled so that a full `max_deviation` swing maps to ±1.0.
#[derive(Clone, Debug)]
pub struct FmDiscriminator {
    gain: f32,
    prev: Complex<f32>,
}

impl FmDiscriminator {
    /// Create for the given sampling rate and peak deviation, in Hz
    pub fn new(fs: u32, max_deviation: f32) -> Self {
        Self {
            gain: fs as f32 / (2.0 * std::f32::consts::PI * max_deviation),
            prev: Complex::new(1.0, 0.0),
        }
    }

    /// Demodulate one sample
    #[inline]
    pub fn demod(&mut self, sa: Complex<f32>) -> f32 {
        let product = sa * self.prev.conj();
        self.prev = sa;
        self.gain * product.arg()
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.prev = Complex::new(1.0, 0.0);
    }
}

/// Single-pole de-emphasis filter
///
/// Reverses the transmitter's pre-emphasis boost. Use 75 µs for North
/// American broadcast FM, 50 µs for Europe, and longer constants for
/// narrowband voice.
#[derive(Clone, Debug)]
pub struct Deemphasis {
    alpha: f32,
    state: f32,
}

impl Deemphasis {
    /// Create for a time constant `tau_us` (microseconds) at rate `fs`
    pub fn new(fs: u32, tau_us: f32) -> Self {
        let tau = tau_us * 1.0e-6;
        let dt = 1.0 / fs as f32;
        Self {
            alpha: dt / (tau + dt),
            state: 0.0,
        }
    }

    #[inline]
    pub fn filter(&mut self, sa: f32) -> f32 {
        self.state += self.alpha * (sa - self.state);
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// One-pole DC blocking filter
///
/// `y[n] = x[n] - x[n-1] + r*y[n-1]`. Removes the carrier-strength
/// offset left behind by envelope detection.
#[derive(Clone, Debug)]
pub struct DcBlocker {
    r: f32,
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub fn new() -> Self {
        Self {
            r: 0.995,
            x1: 0.0,
            y1: 0.0,
        }
    }

    #[inline]
    pub fn filter(&mut self, x: f32) -> f32 {
        let y = x - self.x1 + self.r * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new()
    }
}

/// AM envelope demodulator
#[derive(Clone, Debug)]
pub struct AmDemod {
    dc: DcBlocker,
}

impl AmDemod {
    pub fn new() -> Self {
        Self {
            dc: DcBlocker::new(),
        }
    }

    /// Demodulate one sample
    #[inline]
    pub fn demod(&mut self, sa: Complex<f32>) -> f32 {
        self.dc.filter(sa.norm())
    }

    pub fn reset(&mut self) {
        self.dc.reset();
    }
}

impl Default for AmDemod {
    fn default() -> Self {
        Self::new()
    }
}

/// The full raw-samples-to-audio chain for one receiver
///
/// Variants are selected at construction from the
/// [`ReceiverConfig`]; there is no runtime re-dispatch. Construction
/// validates the configuration (including the capture-rate/subcarrier
/// rule) and fails loudly on misconfiguration.
#[derive(Clone, Debug)]
pub enum Demodulator {
    /// Wide FM broadcast, with optional stereo/RDS subcarrier decoding
    Wbfm {
        discriminator: FmDiscriminator,
        stereo: Option<StereoDecoder>,
        deemph: Deemphasis,
    },

    /// Narrowband FM voice
    Nbfm {
        discriminator: FmDiscriminator,
        deemph: Deemphasis,
    },

    /// Amplitude modulation
    Am(AmDemod),
}

impl Demodulator {
    /// Build the chain described by `config`
    ///
    /// Returns a [`ConfigError`](crate::ConfigError) if the
    /// configuration is invalid, including the case of a capture rate
    /// too low for the enabled subcarriers.
    pub fn new(config: &ReceiverConfig) -> Result<Self, crate::ConfigError> {
        config.validate()?;
        let fs = config.capture_rate;

        Ok(match config.modulation {
            Modulation::Wbfm => {
                let stereo = if config.stereo || config.rds {
                    Some(StereoDecoder::new(fs, config.deemphasis_us))
                } else {
                    None
                };
                Demodulator::Wbfm {
                    discriminator: FmDiscriminator::new(fs, Self::WBFM_DEVIATION_HZ),
                    stereo,
                    deemph: Deemphasis::new(fs, config.deemphasis_us),
                }
            }
            Modulation::Nbfm => Demodulator::Nbfm {
                discriminator: FmDiscriminator::new(fs, Self::NBFM_DEVIATION_HZ),
                deemph: Deemphasis::new(fs, Self::NBFM_DEEMPHASIS_US),
            },
            Modulation::Am => Demodulator::Am(AmDemod::new()),
        })
    }

    /// Demodulate a block of IQ samples into mono audio
    ///
    /// The output is at the capture rate; use a
    /// [`Resampler`](crate::Resampler) to reach the decoder or
    /// distribution rate. For stereo-enabled wide FM, the mono output
    /// is the (L+R) main channel; left/right audio is available from
    /// [`stereo()`](Self::stereo).
    pub fn process(&mut self, input: &[Complex<f32>]) -> Vec<f32> {
        match self {
            Demodulator::Wbfm {
                discriminator,
                stereo,
                deemph,
            } => {
                let mpx: Vec<f32> = input.iter().map(|&sa| discriminator.demod(sa)).collect();
                if let Some(st) = stereo {
                    st.push_mpx(&mpx);
                }
                mpx.into_iter().map(|sa| deemph.filter(sa)).collect()
            }
            Demodulator::Nbfm {
                discriminator,
                deemph,
            } => input
                .iter()
                .map(|&sa| deemph.filter(discriminator.demod(sa)))
                .collect(),
            Demodulator::Am(am) => input.iter().map(|&sa| am.demod(sa)).collect(),
        }
    }

    /// The stereo decoder, if this chain has one
    pub fn stereo(&mut self) -> Option<&mut StereoDecoder> {
        match self {
            Demodulator::Wbfm { stereo, .. } => stereo.as_mut(),
            _ => None,
        }
    }

    /// Reset all DSP state to zero initial conditions
    pub fn reset(&mut self) {
        match self {
            Demodulator::Wbfm {
                discriminator,
                stereo,
                deemph,
            } => {
                discriminator.reset();
                if let Some(st) = stereo {
                    st.reset();
                }
                deemph.reset();
            }
            Demodulator::Nbfm {
                discriminator,
                deemph,
            } => {
                discriminator.reset();
                deemph.reset();
            }
            Demodulator::Am(am) => am.reset(),
        }
    }

    // broadcast FM deviation is ±75 kHz; narrowband voice ±5 kHz
    const WBFM_DEVIATION_HZ: f32 = 75_000.0;
    const NBFM_DEVIATION_HZ: f32 = 5_000.0;
    const NBFM_DEEMPHASIS_US: f32 = 750.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    // complex tone at `freq`, unit amplitude
    fn iq_tone(freq: f32, fs: u32, n: usize) -> Vec<Complex<f32>> {
        (0..n)
            .map(|i| {
                let ph = 2.0 * std::f32::consts::PI * freq * i as f32 / fs as f32;
                Complex::new(ph.cos(), ph.sin())
            })
            .collect()
    }

    #[test]
    fn test_discriminator_constant_offset() {
        // a frequency offset of +max_dev demodulates to +1.0
        const FS: u32 = 48000;
        const DEV: f32 = 5000.0;
        let mut fm = FmDiscriminator::new(FS, DEV);

        let input = iq_tone(DEV, FS, 256);
        let out: Vec<f32> = input.iter().map(|&sa| fm.demod(sa)).collect();
        // first sample carries the startup transient
        for &sa in &out[1..] {
            assert_approx_eq!(sa, 1.0f32, 1.0e-3);
        }
    }

    #[test]
    fn test_discriminator_sign() {
        const FS: u32 = 48000;
        let mut fm = FmDiscriminator::new(FS, 5000.0);
        let below: Vec<f32> = iq_tone(-2500.0, FS, 64)
            .iter()
            .map(|&sa| fm.demod(sa))
            .collect();
        assert!(below[10] < -0.4);
    }

    #[test]
    fn test_am_envelope() {
        const FS: u32 = 48000;
        // 60% modulated AM at 1 kHz
        let n = 4800;
        let input: Vec<Complex<f32>> = (0..n)
            .map(|i| {
                let m = 1.0 + 0.6 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / FS as f32).sin();
                Complex::new(m, 0.0)
            })
            .collect();

        let mut am = AmDemod::new();
        let out: Vec<f32> = input.iter().map(|&sa| am.demod(sa)).collect();

        // after the DC blocker settles, the tone comes through at ~0.6 peak
        let peak = out[2400..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.45 && peak < 0.75, "peak {}", peak);
    }

    #[test]
    fn test_dc_blocker_removes_offset() {
        let mut dc = DcBlocker::new();
        let mut last = f32::MAX;
        for _ in 0..4000 {
            last = dc.filter(10.0);
        }
        assert!(last.abs() < 0.01);
    }

    #[test]
    fn test_deemphasis_attenuates_high_frequencies() {
        const FS: u32 = 48000;
        let mut de_lo = Deemphasis::new(FS, 75.0);
        let mut de_hi = Deemphasis::new(FS, 75.0);

        let lo: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f32::consts::PI * 300.0 * i as f32 / FS as f32).sin())
            .map(|sa| de_lo.filter(sa))
            .collect();
        let hi: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f32::consts::PI * 10_000.0 * i as f32 / FS as f32).sin())
            .map(|sa| de_hi.filter(sa))
            .collect();

        let peak = |v: &[f32]| v[2400..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak(&hi) < 0.5 * peak(&lo));
    }
}

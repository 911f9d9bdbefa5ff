//! Polyphase rational resampling
//!
//! Converts between the capture rate, the decoder rate, and the
//! distribution rate. The conversion is exact: the two rates are
//! reduced by their greatest common divisor into an interpolate-by-L /
//! decimate-by-M pair, and a windowed-sinc prototype lowpass is
//! decomposed into L polyphase branches. Naive sample duplication or
//! decimation is not acceptable here; it aliases the SAME tones and
//! perturbs bit timing.

use crate::filter::{FirCoeff, SampleWindow};

/// Fixed input rate of the SAME decoder (Hz)
///
/// The smallest common audio rate that keeps better than a 5x Nyquist
/// margin over the 2083.3 Hz mark tone. Higher decode rates cost CPU
/// without improving reliability.
pub const DECODER_RATE: u32 = 11025;

/// Rational polyphase resampler for mono `f32` audio
#[derive(Clone, Debug)]
pub struct Resampler {
    interp: usize,
    decim: usize,
    branches: Vec<FirCoeff<f32>>,
    window: SampleWindow<f32>,
    decim_phase: usize,
    input_rate: u32,
    output_rate: u32,
}

impl Resampler {
    /// Default prototype filter length per polyphase branch
    const DEFAULT_TAPS_PER_BRANCH: usize = 16;

    /// Create a converter from `input_rate` to `output_rate`
    ///
    /// Both rates are in Hz. The conversion ratio is exact.
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self::with_taps(input_rate, output_rate, Self::DEFAULT_TAPS_PER_BRANCH)
    }

    /// Create a converter to the fixed [`DECODER_RATE`]
    pub fn for_decoder(input_rate: u32) -> Self {
        Self::new(input_rate, DECODER_RATE)
    }

    /// Create with an explicit number of taps per polyphase branch
    pub fn with_taps(input_rate: u32, output_rate: u32, taps_per_branch: usize) -> Self {
        let taps_per_branch = taps_per_branch.max(4);
        let g = gcd(input_rate, output_rate);
        let interp = (output_rate / g) as usize;
        let decim = (input_rate / g) as usize;

        // prototype lowpass at the interpolated rate: pass the narrower
        // of the input and output Nyquist bands
        let total_taps = interp * taps_per_branch;
        let cutoff = 0.5 / interp.max(decim) as f32;
        let prototype = design_lowpass(total_taps, cutoff);

        // decompose into interp branches; the interp gain factor makes
        // up for the zero-stuffing
        let mut branches = Vec::with_capacity(interp);
        for branch in 0..interp {
            let taps: Vec<f32> = prototype
                .iter()
                .skip(branch)
                .step_by(interp)
                .map(|&t| t * interp as f32)
                .collect();
            branches.push(FirCoeff::from_slice(taps));
        }

        Self {
            interp,
            decim,
            branches,
            window: SampleWindow::new(taps_per_branch),
            decim_phase: 0,
            input_rate,
            output_rate,
        }
    }

    /// Input rate (Hz)
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Output rate (Hz)
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Reduced conversion ratio, as (`interpolate`, `decimate`)
    pub fn ratio(&self) -> (usize, usize) {
        (self.interp, self.decim)
    }

    /// Convert a block of samples
    ///
    /// Output length tracks `input.len() * interp / decim` over time;
    /// individual calls may be off by one sample of rounding.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let mut out =
            Vec::with_capacity(input.len() * self.interp / self.decim + 1);

        for &sa in input {
            self.window.push([sa]);
            for phase in 0..self.interp {
                if self.decim_phase == 0 {
                    out.push(self.branches[phase].filter(self.window.as_slice()));
                }
                self.decim_phase = (self.decim_phase + 1) % self.decim;
            }
        }

        out
    }

    /// Reset filter state to zero initial conditions
    pub fn reset(&mut self) {
        self.window.reset();
        self.decim_phase = 0;
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

// Windowed-sinc lowpass prototype. `cutoff` is in cycles per sample at
// the interpolated rate, 0 < cutoff <= 0.5.
fn design_lowpass(ntaps: usize, cutoff: f32) -> Vec<f32> {
    use std::f32::consts::PI;

    let center = (ntaps - 1) as f32 / 2.0;
    (0..ntaps)
        .map(|i| {
            let t = i as f32 - center;
            let sinc = if t.abs() < 1e-6 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * t).sin() / (PI * t)
            };
            // Hamming window
            let w = 0.54 - 0.46 * (2.0 * PI * i as f32 / (ntaps - 1) as f32).cos();
            sinc * w
        })
        .collect()
}

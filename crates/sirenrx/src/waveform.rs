//! SAME waveform constants and matched filters

use nalgebra::DVector;
use num_complex::Complex;

/// Mark tone frequency (Hz), logical one
pub const FSK_MARK_HZ: f32 = 2083.3;

/// Space tone frequency (Hz), logical zero
pub const FSK_SPACE_HZ: f32 = 1562.5;

/// Baud rate (Hz), exactly 520 5/6
pub const BAUD_HZ: f32 = 520.833_3;

/// Preamble byte
///
/// Repeated [`PREAMBLE_LEN`] times before every SAME burst. The bit
/// pattern has many transitions so that bit and byte synchronization
/// are acquired quickly.
pub const PREAMBLE: u8 = 0xab;

/// Number of preamble bytes sent before each burst
pub const PREAMBLE_LEN: usize = 16;

/// Preamble correlation word
///
/// Four repetitions of the preamble byte, used by the decoder to
/// detect byte synchronization.
pub const PREAMBLE_SYNC_WORD: u32 = u32::from_be_bytes([PREAMBLE, PREAMBLE, PREAMBLE, PREAMBLE]);

/// Number of times each header or EOM burst is transmitted
pub const BURST_REPEATS: usize = 3;

/// Silence between burst repetitions (seconds)
pub const INTERBURST_GAP_SECS: f32 = 1.0;

/// EBS attention signal tone pair (Hz)
pub const ATTENTION_EBS_HZ: (f32, f32) = (853.0, 960.0);

/// NWS attention signal single tone (Hz)
pub const ATTENTION_NWS_HZ: f32 = 1050.0;

/// SAME baud rate at the given sampling rate, in fractional samples
///
/// The result is deliberately *not* rounded. Both the encoder and the
/// decoder accumulate the fractional part; truncating it drifts by
/// several samples over a full burst.
pub fn samples_per_symbol(fs: u32) -> f32 {
    fs as f32 / BAUD_HZ
}

/// Generate mark and space matched filter taps
///
/// Returns (`mark_taps`, `space_taps`) for the given input sampling
/// rate `fs`. Each filter is one symbol long.
pub fn matched_filter(fs: u32) -> (DVector<Complex<f32>>, DVector<Complex<f32>>) {
    let ntaps = f32::floor(samples_per_symbol(fs)) as usize;
    let mark = cisoid_matched_filter(ntaps, FSK_MARK_HZ / fs as f32);
    let space = cisoid_matched_filter(ntaps, FSK_SPACE_HZ / fs as f32);
    (mark, space)
}

// Matched filter for a complex exponential at `freq_fs` (fraction of the
// sampling rate): a time-reversed, conjugated cisoid. The complex filter
// makes the detector insensitive to the sender's carrier phase.
fn cisoid_matched_filter(points: usize, freq_fs: f32) -> DVector<Complex<f32>> {
    let mut out = DVector::from_element(points, Complex::new(0.0, 0.0));
    for (iter, o) in out.iter_mut().enumerate() {
        *o = Complex::new(
            0.0,
            2.0 * std::f32::consts::PI * freq_fs * ((points - 1 - iter) as f32),
        );
        *o = 2.0f32 * o.exp().conj() / points as f32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_symbol_is_fractional() {
        // none of the common audio rates divide evenly by the baud rate
        for fs in [11025u32, 16000, 22050, 44100, 48000] {
            let sps = samples_per_symbol(fs);
            assert!((sps - sps.round()).abs() > 1e-3, "fs={}", fs);
        }
    }

    #[test]
    fn test_matched_filter_detects_own_tone() {
        const FS: u32 = 11025;
        let (mark, space) = matched_filter(FS);
        let ntaps = mark.len();

        // one symbol of pure mark tone
        let tone: Vec<f32> = (0..ntaps)
            .map(|i| {
                (2.0 * std::f32::consts::PI * FSK_MARK_HZ * i as f32 / FS as f32).cos()
            })
            .collect();

        let mark_out: Complex<f32> = tone
            .iter()
            .zip(mark.iter())
            .map(|(&x, &h)| h * x)
            .sum();
        let space_out: Complex<f32> = tone
            .iter()
            .zip(space.iter())
            .map(|(&x, &h)| h * x)
            .sum();

        assert!(mark_out.norm() > 2.0 * space_out.norm());
    }
}

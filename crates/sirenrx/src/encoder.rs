//! SAME/EAS burst synthesis
//!
//! Renders SAME transmissions as `f32` PCM audio: a sixteen-byte
//! preamble of `0xAB`, the ASCII header (or the `NNNN` end-of-message),
//! modulated LSB-first as phase-continuous two-tone AFSK, transmitted
//! three times with one second of silence between repetitions.
//!
//! Bit timing uses a fractional-sample accumulator. The SAME baud rate
//! (520 5/6) never divides common audio rates evenly; truncating to an
//! integer samples-per-bit drifts by several samples over one burst,
//! which is enough to desynchronize a conforming decoder.

use crate::header::{SameHeader, PREFIX_MESSAGE_END};
use crate::waveform::{
    self, ATTENTION_EBS_HZ, ATTENTION_NWS_HZ, BURST_REPEATS, INTERBURST_GAP_SECS, PREAMBLE,
    PREAMBLE_LEN,
};

/// Attention signal inserted between the header bursts and the voice
/// message
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AttentionSignal {
    /// The EBS two-tone signal (853 Hz + 960 Hz), `secs` long
    ///
    /// Broadcast stations use eight to twenty five seconds.
    TwoTone {
        /// Duration in seconds
        secs: f32,
    },

    /// The NWR single 1050 Hz tone, `secs` long
    SingleTone {
        /// Duration in seconds
        secs: f32,
    },
}

impl AttentionSignal {
    fn render(&self, fs: u32) -> Vec<f32> {
        match *self {
            AttentionSignal::TwoTone { secs } => {
                let mut out = tone(ATTENTION_EBS_HZ.0, secs, fs);
                for (sa, second) in out.iter_mut().zip(tone(ATTENTION_EBS_HZ.1, secs, fs)) {
                    *sa = 0.5 * (*sa + second);
                }
                out
            }
            AttentionSignal::SingleTone { secs } => tone(ATTENTION_NWS_HZ, secs, fs),
        }
    }
}

/// Render one header burst: preamble plus ASCII header, modulated
///
/// This is a *single* transmission. Conforming senders must transmit
/// the burst three times; see [`encode_alert`].
pub fn encode_header_burst(header: &SameHeader, fs: u32) -> Vec<f32> {
    modulate_burst(header.as_str().as_bytes(), fs)
}

/// Render one end-of-message burst: preamble plus `NNNN`, modulated
pub fn encode_eom_burst(fs: u32) -> Vec<f32> {
    modulate_burst(PREFIX_MESSAGE_END.as_bytes(), fs)
}

/// Render a complete SAME transmission, minus the voice message
///
/// Produces, in order:
///
/// 1. the header burst, three times, with one second of silence
///    between repetitions;
/// 2. the optional attention signal;
/// 3. the end-of-message burst, three times, again gapped.
///
/// The voice (or other audio) payload belongs between the attention
/// signal and the end-of-message; callers splice it in themselves.
pub fn encode_alert(
    header: &SameHeader,
    attention: Option<AttentionSignal>,
    fs: u32,
) -> Vec<f32> {
    let gap_len = (INTERBURST_GAP_SECS * fs as f32) as usize;
    let hdr = encode_header_burst(header, fs);
    let eom = encode_eom_burst(fs);

    let mut out = Vec::with_capacity(
        BURST_REPEATS * (hdr.len() + gap_len) + BURST_REPEATS * (eom.len() + gap_len),
    );
    for rep in 0..BURST_REPEATS {
        if rep > 0 {
            out.extend(std::iter::repeat(0.0f32).take(gap_len));
        }
        out.extend_from_slice(&hdr);
    }
    if let Some(att) = attention {
        out.extend(std::iter::repeat(0.0f32).take(gap_len));
        out.extend(att.render(fs));
    }
    for _ in 0..BURST_REPEATS {
        out.extend(std::iter::repeat(0.0f32).take(gap_len));
        out.extend_from_slice(&eom);
    }
    out
}

// Prefix `data` with the preamble and AFSK-modulate the whole burst.
fn modulate_burst(data: &[u8], fs: u32) -> Vec<f32> {
    let mut bytes = Vec::with_capacity(PREAMBLE_LEN + data.len());
    bytes.extend(std::iter::repeat(PREAMBLE).take(PREAMBLE_LEN));
    bytes.extend_from_slice(data);
    afsk_modulate(&bytes, fs)
}

/// Modulate bytes as SAME AFSK
///
/// Bytes are sent least-significant-bit first with no start or stop
/// bits: a one bit is one bit period of the mark tone, a zero bit one
/// period of the space tone. Phase is continuous across bit boundaries,
/// and bit boundaries are placed by fractional-sample accumulation.
pub fn afsk_modulate(bytes: &[u8], fs: u32) -> Vec<f32> {
    const TWOPI: f64 = 2.0 * std::f64::consts::PI;

    let sps = waveform::samples_per_symbol(fs) as f64;
    let mark_step = TWOPI * waveform::FSK_MARK_HZ as f64 / fs as f64;
    let space_step = TWOPI * waveform::FSK_SPACE_HZ as f64 / fs as f64;

    let total_bits = bytes.len() * 8;
    let mut out = Vec::with_capacity((total_bits as f64 * sps).ceil() as usize);

    let mut phase = 0.0f64;
    let mut emitted = 0usize;
    let mut boundary = 0.0f64;
    for byte in bytes {
        let mut word = *byte;
        for _bit in 0..8 {
            // end of this bit period, in (fractional) samples from the start
            boundary += sps;
            let step = if word & 0x01 == 1 { mark_step } else { space_step };
            while (emitted as f64) < boundary {
                out.push(phase.cos() as f32);
                phase += step;
                if phase > TWOPI {
                    phase -= TWOPI;
                }
                emitted += 1;
            }
            word >>= 1;
        }
    }

    out
}

fn tone(freq: f32, secs: f32, fs: u32) -> Vec<f32> {
    const TWOPI: f64 = 2.0 * std::f64::consts::PI;
    let n = (secs * fs as f32) as usize;
    let step = TWOPI * freq as f64 / fs as f64;
    let mut phase = 0.0f64;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(phase.sin() as f32);
        phase += step;
        if phase > TWOPI {
            phase -= TWOPI;
        }
    }
    out
}

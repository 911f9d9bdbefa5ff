//! Receiver and decoder configuration
//!
//! Configuration is validated once, up front, before any DSP object is
//! built. The load-bearing rule is the capture-rate constraint: every
//! enabled subcarrier must sit below Nyquist at the capture rate, with
//! a healthy margin on top. Catching a bad rate here turns a silent
//! "decodes nothing" failure into a setup-time error.

#[cfg(not(test))]
use log::warn;
#[cfg(test)]
use std::println as warn;

use thiserror::Error;

use crate::stereo::{AUDIO_CUTOFF_HZ, RDS_SUBCARRIER_HZ, STEREO_BAND_TOP_HZ};

/// Modulation mode of a received channel
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Modulation {
    /// Wide FM broadcast (±75 kHz deviation)
    Wbfm,

    /// Narrowband FM voice (±5 kHz deviation), e.g. NOAA Weather Radio
    Nbfm,

    /// Amplitude modulation
    Am,
}

/// Configuration rejected at validation time
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Capture rate below twice the highest enabled subcarrier
    #[error(
        "capture rate {rate} Hz is below the Nyquist minimum of {min} Hz \
         for the enabled subcarriers"
    )]
    CaptureRateTooLow {
        /// Configured capture rate (Hz)
        rate: u32,
        /// Minimum acceptable rate (Hz)
        min: u32,
    },

    /// A rate of zero is never valid
    #[error("capture rate must be nonzero")]
    ZeroCaptureRate,

    /// RDS requires the pilot reference, which requires wide FM
    #[error("stereo and RDS decoding require wbfm modulation")]
    SubcarrierWithoutWbfm,
}

/// Settings for one received channel
#[derive(Clone, Debug, PartialEq)]
pub struct ReceiverConfig {
    /// Tuned center frequency (Hz)
    pub frequency_hz: f64,

    /// Rate of the raw sample stream entering the demodulator (Hz)
    pub capture_rate: u32,

    /// Modulation mode
    pub modulation: Modulation,

    /// Front-end gain (dB), or `None` for hardware AGC
    pub gain_db: Option<f32>,

    /// Decode the 38 kHz stereo difference subcarrier (wbfm only)
    pub stereo: bool,

    /// Decode the 57 kHz RDS subcarrier (wbfm only)
    pub rds: bool,

    /// De-emphasis time constant (µs): 75 in North America, 50 in
    /// Europe
    pub deemphasis_us: f32,

    /// Accept a capture rate below the Nyquist minimum
    ///
    /// The rate is still logged loudly as unusable for the affected
    /// subcarriers. Intended for hardware that cannot reach the proper
    /// rate, where mono audio is still wanted.
    pub allow_marginal_rate: bool,
}

impl ReceiverConfig {
    // margin below which a passing rate still draws a warning
    const RECOMMENDED_MARGIN: f32 = 4.0;

    /// Highest frequency component this configuration must capture (Hz)
    pub fn highest_component_hz(&self) -> f32 {
        if self.rds {
            RDS_SUBCARRIER_HZ
        } else if self.stereo {
            STEREO_BAND_TOP_HZ
        } else {
            AUDIO_CUTOFF_HZ
        }
    }

    /// Validate this configuration
    ///
    /// The capture rate must be at least twice the highest enabled
    /// subcarrier. Rates between 2x and 4x that component pass with a
    /// warning. A failing rate is accepted only under
    /// [`allow_marginal_rate`](Self::allow_marginal_rate), and then
    /// with a loud warning rather than silence.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_rate == 0 {
            return Err(ConfigError::ZeroCaptureRate);
        }
        if (self.stereo || self.rds) && self.modulation != Modulation::Wbfm {
            return Err(ConfigError::SubcarrierWithoutWbfm);
        }

        let highest = self.highest_component_hz();
        let min = (2.0 * highest).ceil() as u32;
        let rate = self.capture_rate;

        if rate < min {
            if self.allow_marginal_rate {
                warn!(
                    "capture rate {} Hz is below the {} Hz minimum; \
                     subcarriers above {} Hz will not decode",
                    rate,
                    min,
                    rate / 2
                );
                return Ok(());
            }
            return Err(ConfigError::CaptureRateTooLow { rate, min });
        }

        if (rate as f32) < Self::RECOMMENDED_MARGIN * highest {
            warn!(
                "capture rate {} Hz passes Nyquist but is below the \
                 recommended {}x margin over {} Hz",
                rate,
                Self::RECOMMENDED_MARGIN,
                highest
            );
        }

        Ok(())
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 162.55e6,
            capture_rate: 240_000,
            modulation: Modulation::Nbfm,
            gain_db: None,
            stereo: false,
            rds: false,
            deemphasis_us: 75.0,
            allow_marginal_rate: false,
        }
    }
}

/// Settings for the SAME decoder and monitor
#[derive(Clone, Debug, PartialEq)]
pub struct DecoderConfig {
    /// Minimum confidence for a [`DecodeResult`](crate::DecodeResult)
    /// to be surfaced
    ///
    /// Results below the floor are logged at debug level and dropped.
    pub confidence_floor: f32,

    /// Seconds of preamble-free audio after sync before the monitor
    /// forces itself back to idle
    pub sync_timeout_secs: f32,

    /// Seconds to wait for burst repetitions after the first capture
    ///
    /// SAME transmits each burst three times with one second of
    /// silence between repetitions; the window must cover at least two
    /// more bursts.
    pub repeat_window_secs: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.5,
            sync_timeout_secs: 5.0,
            repeat_window_secs: 7.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wbfm(rate: u32, stereo: bool, rds: bool) -> ReceiverConfig {
        ReceiverConfig {
            frequency_hz: 99.9e6,
            capture_rate: rate,
            modulation: Modulation::Wbfm,
            stereo,
            rds,
            ..ReceiverConfig::default()
        }
    }

    #[test]
    fn test_good_rates_pass() {
        assert!(wbfm(240_000, true, true).validate().is_ok());
        assert!(wbfm(114_000, false, true).validate().is_ok());
        assert!(wbfm(106_000, true, false).validate().is_ok());
        assert!(ReceiverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_sub_nyquist_rate_rejected() {
        let config = wbfm(96_000, false, true);
        assert_eq!(
            Err(ConfigError::CaptureRateTooLow {
                rate: 96_000,
                min: 114_000
            }),
            config.validate()
        );

        // the same rate is fine once RDS is off
        assert!(wbfm(96_000, false, false).validate().is_ok());
    }

    #[test]
    fn test_marginal_override_accepts() {
        let mut config = wbfm(96_000, false, true);
        config.allow_marginal_rate = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let config = wbfm(0, false, false);
        assert_eq!(Err(ConfigError::ZeroCaptureRate), config.validate());
    }

    #[test]
    fn test_subcarriers_require_wbfm() {
        let config = ReceiverConfig {
            stereo: true,
            ..ReceiverConfig::default()
        };
        assert_eq!(Err(ConfigError::SubcarrierWithoutWbfm), config.validate());
    }

    #[test]
    fn test_modulation_parses() {
        use std::str::FromStr;
        assert_eq!(Modulation::Wbfm, Modulation::from_str("wbfm").unwrap());
        assert_eq!(Modulation::Am, Modulation::from_str("am").unwrap());
        assert!(Modulation::from_str("usb").is_err());
        assert_eq!("nbfm", Modulation::Nbfm.to_string());
    }
}

//! # sirenrx: SAME/EAS scanning receiver and encoder
//!
//! This crate ingests live audio from software-defined radios or network
//! streams, demodulates it, and continuously scans it for
//! [Specific Area Message Encoding](https://en.wikipedia.org/wiki/Specific_Area_Message_Encoding)
//! (SAME) headers. It can also synthesize bit-exact SAME alert bursts for
//! transmission.
//!
//! ## Disclaimer
//!
//! This crate has not been certified as a weather radio receiver or for any
//! other purpose. The author **strongly discourages** its use in any
//! safety-critical applications. Always have at least two methods available
//! for receiving emergency alerts.
//!
//! ## Decoding
//!
//! Feed mono `f32` PCM audio at the decoder's fixed rate to a
//! [`Monitor`]. If your audio is at some other rate, convert it first with
//! a [`Resampler`]:
//!
//! ```
//! use sirenrx::{DecoderConfig, Monitor, MonitorEvent};
//!
//! let mut monitor = Monitor::new(DecoderConfig::default());
//!
//! # let some_audio = std::iter::repeat(0.0f32).take(1000);
//! for sa in some_audio {
//!     for evt in monitor.push(&[sa]) {
//!         if let MonitorEvent::Decoded(result) = evt {
//!             println!("decoded with confidence {}", result.confidence);
//!         }
//!     }
//! }
//! ```
//!
//! A decoded header, as received "off the wire" in ASCII format, looks like
//!
//! ```txt
//! ZCZC-WXR-RWT-039173+0030-3202000-KR8MER-
//! ```
//!
//! and parses into a [`SameHeader`] with originator `WXR`, event `RWT`,
//! one location code, a 30-minute purge time, an issue day/time, and the
//! sending station's callsign.
//!
//! ## Encoding
//!
//! [`encode_header_burst`] and [`encode_alert`] render SAME transmissions
//! as audio: a sixteen-byte preamble of `0xAB`, the ASCII header, three
//! repetitions with one second of silence between them, and an optional
//! attention signal.
//!
//! ## Live pipelines
//!
//! For continuous monitoring of a radio, build a [`Supervisor`]: it owns
//! one capture thread per [`AudioSource`], fans frames out through a
//! [`Distributor`] ring buffer to the monitor and any
//! [streaming output](StreamOutput), and exposes an on-demand
//! [`HealthSnapshot`].

mod backoff;
mod config;
mod decoder;
mod demod;
mod distributor;
mod encoder;
mod filter;
mod framing;
mod header;
mod monitor;
mod rds;
mod resample;
mod samecodes;
mod source;
mod stereo;
mod stream;
mod supervisor;
mod votes;
mod waveform;

pub use backoff::{Backoff, BackoffPolicy};
pub use config::{ConfigError, DecoderConfig, Modulation, ReceiverConfig};
pub use decoder::{DecoderEvent, SameDecoder};
pub use demod::{AmDemod, Demodulator, FmDiscriminator};
pub use distributor::{Cursor, CursorRead, Distributor, Producer};
pub use encoder::{encode_alert, encode_eom_burst, encode_header_burst, AttentionSignal};
pub use header::{DecodeResult, HeaderDecodeErr, Message, SameHeader};
pub use monitor::{Monitor, MonitorEvent, MonitorSnapshot, MonitorState};
pub use rds::RdsDecoder;
pub use resample::{Resampler, DECODER_RATE};
pub use samecodes::{EventCode, Originator, SignificanceLevel, UnknownEventCode};
pub use source::{AudioFrame, AudioSource, FrameBody, SourceError, SourceId};
pub use stereo::{StereoDecoder, StereoFrame};
pub use stream::{Connector, StreamOutput, StreamState, TcpConnector};
pub use supervisor::{HealthSnapshot, SourceHealth, Supervisor};

//! Decoded SAME headers and decoder outputs

use std::convert::TryFrom;
use std::fmt;

#[cfg(feature = "chrono")]
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::samecodes::{EventCode, Originator, UnknownEventCode};

/// Leading prefix of a header burst
pub(crate) const PREFIX_MESSAGE_START: &str = "ZCZC-";

/// Text of an end-of-message burst
pub(crate) const PREFIX_MESSAGE_END: &str = "NNNN";

/// Maximum number of location codes in one header
pub const MAX_LOCATION_CODES: usize = 31;

/// A SAME transmission, either a header or an end-of-message
///
/// In the EAS, the "message" is the analog audio aired to the human
/// listener. The digital data only demarcates it: a `StartOfMessage`
/// summarizes the audio which follows, and an `EndOfMessage` closes it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Message {
    /// A decoded header; audio message follows
    StartOfMessage(SameHeader),

    /// The `NNNN` end-of-message marker
    EndOfMessage,
}

impl Message {
    /// String representation, as sent over the air
    pub fn as_str(&self) -> &str {
        match self {
            Self::StartOfMessage(m) => m.as_str(),
            Self::EndOfMessage => PREFIX_MESSAGE_END,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl TryFrom<String> for Message {
    type Error = HeaderDecodeErr;

    fn try_from(inp: String) -> Result<Self, Self::Error> {
        if inp.starts_with(PREFIX_MESSAGE_START) {
            Ok(Message::StartOfMessage(SameHeader::new(inp)?))
        } else if inp.starts_with(PREFIX_MESSAGE_END) {
            Ok(Message::EndOfMessage)
        } else {
            Err(HeaderDecodeErr::UnrecognizedPrefix)
        }
    }
}

/// Error decoding a [`SameHeader`]
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HeaderDecodeErr {
    /// The starting prefix of the burst was not recognized
    #[error("invalid SAME header: unrecognized prefix")]
    UnrecognizedPrefix,

    /// Header contains non-ASCII characters
    #[error("invalid SAME header: contains non-ASCII characters")]
    NotAscii,

    /// Header is shorter than the minimum length for a valid message
    #[error("invalid SAME header: too short")]
    TooShort,

    /// Header does not match the SAME grammar
    #[error("invalid SAME header: text does not match required pattern")]
    Malformed,

    /// Header contains more location codes than the standard permits
    #[error("invalid SAME header: more than {MAX_LOCATION_CODES} location codes")]
    TooManyLocations,
}

/// An invalid issuance time
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
#[error("message issuance time not valid for its receive time")]
pub struct InvalidDateErr {}

/// Event, area, time, and originator information from one SAME header
///
/// The header is stored in its wire format,
///
/// ```txt
/// ZCZC-ORG-EEE-PSSCCC(-PSSCCC)*+TTTT-JJJHHMM-LLLLLLLL-
/// ```
///
/// and the field accessors slice into it. Construction validates the
/// grammar: a header that fails to parse is rejected rather than
/// partially decoded.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SameHeader {
    // full header text, starting with `ZCZC-`
    message: String,

    // byte offset of the `+` preceding the purge time
    offset_time: usize,
}

impl SameHeader {
    /// Parse a SAME header from its wire string
    ///
    /// The string must begin with `ZCZC-` and match the header grammar.
    /// Trailing garbage after the final `-` is truncated.
    pub fn new<S>(message: S) -> Result<Self, HeaderDecodeErr>
    where
        S: Into<String>,
    {
        let mut message: String = message.into();
        if !message.is_ascii() {
            return Err(HeaderDecodeErr::NotAscii);
        }

        let (offset_time, hdr_length) = check_header(&message)?;
        message.truncate(hdr_length);

        let out = Self {
            message,
            offset_time,
        };
        if out.location_str_iter().count() > MAX_LOCATION_CODES {
            return Err(HeaderDecodeErr::TooManyLocations);
        }
        Ok(out)
    }

    /// Header text, as sent over the air
    pub fn as_str(&self) -> &str {
        &self.message
    }

    /// Originator code, decoded
    pub fn originator(&self) -> Originator {
        Originator::from_code(self.originator_str())
    }

    /// Originator code (three characters)
    ///
    /// Usually one of `PEP`, `CIV`, `WXR`, or `EAS`, but not guaranteed
    /// to be.
    pub fn originator_str(&self) -> &str {
        &self.message[Self::OFFSET_ORG..Self::OFFSET_ORG + 3]
    }

    /// Event code, decoded
    ///
    /// An error here does **not** mean the header is invalid — only that
    /// the three-letter code is not in our table. Unknown codes should
    /// still be treated as valid messages.
    pub fn event(&self) -> Result<EventCode, UnknownEventCode> {
        EventCode::try_from(self.event_str())
    }

    /// Event code (three characters)
    pub fn event_str(&self) -> &str {
        &self.message[Self::OFFSET_EVT..Self::OFFSET_EVT + 3]
    }

    /// Iterator over location codes
    ///
    /// Each location is a six-digit `PSSCCC` string: `P` is the county
    /// subdivision (zero for the whole county), `SS` the FIPS state, and
    /// `CCC` the FIPS county. At most [`MAX_LOCATION_CODES`] are present.
    pub fn location_str_iter(&self) -> std::str::Split<'_, char> {
        self.message[Self::OFFSET_AREA_START..self.offset_time].split('-')
    }

    /// Purge time, as (`hours`, `minutes`)
    ///
    /// The message validity duration, relative to the issue time. This
    /// is the lifetime of the *message*, not of the hazard.
    pub fn purge_duration_fields(&self) -> (u8, u8) {
        let dur = &self.message[self.offset_time + Self::OFFSET_FROMPLUS_VALIDTIME
            ..self.offset_time + Self::OFFSET_FROMPLUS_VALIDTIME + 4];
        (
            dur[0..2].parse().expect(Self::PANIC_MSG),
            dur[2..4].parse().expect(Self::PANIC_MSG),
        )
    }

    /// Issue day and time, as (`day_of_year`, `hour`, `minute`)
    ///
    /// `day_of_year` is ordinal: `001` is 1 January. Times are UTC.
    /// SAME headers do not carry the year.
    pub fn issue_daytime_fields(&self) -> (u16, u8, u8) {
        let issue = &self.message[self.offset_time + Self::OFFSET_FROMPLUS_ISSUETIME
            ..self.offset_time + Self::OFFSET_FROMPLUS_ISSUETIME + 7];
        (
            issue[0..3].parse().expect(Self::PANIC_MSG),
            issue[3..5].parse().expect(Self::PANIC_MSG),
            issue[5..7].parse().expect(Self::PANIC_MSG),
        )
    }

    /// Sending station identifier (up to eight characters)
    pub fn station(&self) -> &str {
        let end = self.message.len();
        &self.message
            [self.offset_time + Self::OFFSET_FROMPLUS_CALLSIGN..end - 1]
    }

    /// Message validity duration
    ///
    /// Requires `chrono`.
    #[cfg(feature = "chrono")]
    pub fn purge_duration(&self) -> Duration {
        let (hrs, mins) = self.purge_duration_fields();
        Duration::hours(hrs as i64) + Duration::minutes(mins as i64)
    }

    /// Estimated issuance datetime (UTC)
    ///
    /// SAME headers omit the year, so the issue time is reconstructed
    /// from the `received` time, which only needs to be within ±90 days
    /// of true UTC.
    ///
    /// Requires `chrono`.
    #[cfg(feature = "chrono")]
    pub fn issue_datetime(
        &self,
        received: &DateTime<Utc>,
    ) -> Result<DateTime<Utc>, InvalidDateErr> {
        calculate_issue_time(
            self.issue_daytime_fields(),
            (received.year(), received.ordinal()),
        )
    }

    /// Is the message expired at `now`?
    ///
    /// Expiration means the message should no longer be relayed; the
    /// underlying hazard may well persist.
    ///
    /// Requires `chrono`.
    #[cfg(feature = "chrono")]
    pub fn is_expired_at(&self, now: &DateTime<Utc>) -> bool {
        match self.issue_datetime(now) {
            Ok(issue_ts) => issue_ts + self.purge_duration() < *now,
            Err(_e) => false,
        }
    }

    /// Obtain the owned header String
    pub fn release(self) -> String {
        self.message
    }

    const OFFSET_ORG: usize = 5;
    const OFFSET_EVT: usize = 9;
    const OFFSET_AREA_START: usize = 13;
    const OFFSET_FROMPLUS_VALIDTIME: usize = 1;
    const OFFSET_FROMPLUS_ISSUETIME: usize = 6;
    const OFFSET_FROMPLUS_CALLSIGN: usize = 14;
    const PANIC_MSG: &'static str = "SameHeader validity check admitted a malformed message";
}

impl fmt::Display for SameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl AsRef<str> for SameHeader {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<String> for SameHeader {
    type Error = HeaderDecodeErr;

    #[inline]
    fn try_from(inp: String) -> Result<Self, Self::Error> {
        Self::new(inp)
    }
}

/// Outcome of one complete decode cycle
///
/// Produced by the transport layer after it has captured and voted on
/// the (up to three) burst repetitions. A `DecodeResult` is only
/// emitted when the confidence floor was met; lower-confidence decodes
/// are discarded at the source.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeResult {
    /// The decoded header, if this cycle produced one
    pub header: Option<SameHeader>,

    /// Agreement-derived confidence in `[0, 1]`
    pub confidence: f32,

    /// How many captured bursts agreed on the winning string
    pub bursts_agreed: u8,

    /// True if this cycle detected the `NNNN` end-of-message
    pub is_eom: bool,
}

// Validate general header format. Returns (offset of the `+` before the
// purge time, total header length). The input may be longer; callers
// truncate to the returned length.
fn check_header(hdr: &str) -> Result<(usize, usize), HeaderDecodeErr> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^ZCZC-[A-Z]{3}-[A-Z]{3}(-[0-9]{6})+(\+[0-9]{4}-[0-9]{7}-[A-Z0-9/ ]{3,8}-)")
                .expect("bad SAME regexp");
    }

    // shortest legal header: one location code and a three-character
    // station field
    if hdr.len() < 37 {
        return Err(HeaderDecodeErr::TooShort);
    }

    let mtc = RE
        .captures(hdr)
        .ok_or(HeaderDecodeErr::Malformed)?
        .get(2)
        .ok_or(HeaderDecodeErr::Malformed)?;

    Ok((mtc.start(), mtc.end()))
}

// Reconstruct the issuance datetime from (day-of-year, hour, minute)
// and the (year, day-of-year) at which we received the message. Headers
// near the UTC new year may belong to the previous or next year.
#[cfg(feature = "chrono")]
fn calculate_issue_time(
    message: (u16, u8, u8),
    received: (i32, u32),
) -> Result<DateTime<Utc>, InvalidDateErr> {
    let (day_of_year, hour, minute) = message;
    let (rx_year, rx_day_of_year) = received;

    let daydiff = rx_day_of_year as i32 - day_of_year as i32;
    let msg_year = if daydiff >= 180 {
        rx_year.saturating_add(1)
    } else if daydiff <= -180 {
        rx_year.saturating_sub(1)
    } else {
        rx_year
    };

    Ok(Utc
        .yo_opt(msg_year, day_of_year as u32)
        .single()
        .ok_or(InvalidDateErr {})?
        .and_hms_opt(hour as u32, minute as u32, 0)
        .ok_or(InvalidDateErr {})?)
}

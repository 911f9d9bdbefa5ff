//! Spawns child process from a decoded SAME header

use std::ffi::OsStr;
use std::io;
use std::process::{Child, Command, Stdio};

use chrono::{DateTime, Utc};
use sirenrx::{SameHeader, UnknownEventCode};

/// Spawn a child process to handle the given message
///
/// The child process will receive information about the
/// SAME message via the environment. Higher-level logic
/// should pipe streaming audio for the message to the
/// child's stdin.
///
/// This method will attempt to start an executable named
/// `cmd` with the given `args`. The `header`, its decode
/// `confidence`, and the input sampling rate are transformed
/// into many different environment variables.
pub fn spawn<C, A, B>(
    cmd: C,
    args: A,
    header: &SameHeader,
    confidence: f32,
    input_rate: u32,
) -> io::Result<Child>
where
    C: AsRef<OsStr>,
    B: AsRef<OsStr>,
    A: IntoIterator<Item = B>,
{
    let (issue_ts, purge_ts) = match header.issue_datetime(&Utc::now()) {
        Ok(issue_ts) => (
            time_to_unix_str(issue_ts),
            time_to_unix_str(issue_ts + header.purge_duration()),
        ),
        Err(_e) => ("".to_owned(), "".to_owned()),
    };

    let locations: Vec<&str> = header.location_str_iter().collect();

    let (event_name, significance) = match header.event() {
        Ok(evt) => (evt.to_string(), evt.to_significance_level().as_str()),
        Err(UnknownEventCode::WithSignificance(sl)) => ("Unrecognized".to_owned(), sl.as_str()),
        Err(UnknownEventCode::Unrecognized) => ("Unrecognized".to_owned(), ""),
    };

    Command::new(cmd)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .args(args)
        .env(childenv::SIRENMON_RATE, input_rate.to_string())
        .env(childenv::SIRENMON_MSG, header.as_str())
        .env(childenv::SIRENMON_ORG, header.originator_str())
        .env(
            childenv::SIRENMON_ORIGINATOR,
            header.originator().as_display_str(),
        )
        .env(childenv::SIRENMON_EVT, header.event_str())
        .env(childenv::SIRENMON_EVENT, event_name)
        .env(childenv::SIRENMON_SIGNIFICANCE, significance)
        .env(
            childenv::SIRENMON_CONFIDENCE,
            format!("{:.2}", confidence),
        )
        .env(childenv::SIRENMON_LOCATIONS, locations.join(" "))
        .env(childenv::SIRENMON_ISSUETIME, issue_ts)
        .env(childenv::SIRENMON_PURGETIME, purge_ts)
        .spawn()
}

mod childenv {
    /// Decoder input rate
    ///
    /// The audio input `--rate` that sirenmon is running at. This is
    /// also the rate at which samples are output to child processes.
    pub const SIRENMON_RATE: &str = "SIRENMON_RATE";

    /// The complete SAME header
    ///
    /// ```txt
    /// ZCZC-WXR-RWT-039173+0030-3202000-KR8MER-
    /// ```
    pub const SIRENMON_MSG: &str = "SIRENMON_MSG";

    /// SAME originator code, like `WXR`
    pub const SIRENMON_ORG: &str = "SIRENMON_ORG";

    /// Human-readable originator, like "`National Weather Service`"
    pub const SIRENMON_ORIGINATOR: &str = "SIRENMON_ORIGINATOR";

    /// Three-character SAME event code, like `RWT`
    pub const SIRENMON_EVT: &str = "SIRENMON_EVT";

    /// Human-readable event, like "`Required Weekly Test`"
    ///
    /// If the event code is unknown, this string will be
    /// "`Unrecognized`".
    pub const SIRENMON_EVENT: &str = "SIRENMON_EVENT";

    /// SAME event significance level
    ///
    /// |       |                 |
    /// |-------|-----------------|
    /// | "`T`" | Test            |
    /// | "`S`" | Statement       |
    /// | "`A`" | Watch           |
    /// | "`W`" | Warning         |
    /// | "``"  | Unknown         |
    pub const SIRENMON_SIGNIFICANCE: &str = "SIRENMON_SIGNIFICANCE";

    /// Decode confidence in `[0, 1]`, two decimals
    ///
    /// The fraction of captured burst repetitions that agreed on the
    /// header, scaled down when the winner barely parses. `1.00` means
    /// a clean three-of-three decode.
    pub const SIRENMON_CONFIDENCE: &str = "SIRENMON_CONFIDENCE";

    /// FIPS code locations
    ///
    /// Area(s) affected by the message, as a space-delimited list
    /// of six-digit numbers. Example
    ///
    /// ```txt
    /// 012057 012081 012101 012103 012115
    /// ```
    pub const SIRENMON_LOCATIONS: &str = "SIRENMON_LOCATIONS";

    /// Message issue time (UTC UNIX timestamp, in seconds)
    ///
    /// The issue time is calculated from the current OS realtime
    /// clock. It will be empty if a complete timestamp cannot be
    /// calculated.
    pub const SIRENMON_ISSUETIME: &str = "SIRENMON_ISSUETIME";

    /// Message purge time (UTC UNIX timestamp, in seconds)
    ///
    /// The purge time is calculated from the current OS realtime
    /// clock. It will be empty if a complete timestamp cannot be
    /// calculated.
    pub const SIRENMON_PURGETIME: &str = "SIRENMON_PURGETIME";
}

// convert DateTime to UTC unix timestamp in seconds, as string
fn time_to_unix_str(tm: DateTime<Utc>) -> String {
    format!("{}", tm.format("%s"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_to_unix_str() {
        let dt: DateTime<Utc> = DateTime::parse_from_rfc2822("Wed, 18 Feb 2015 23:16:09 GMT")
            .unwrap()
            .into();
        assert_eq!(time_to_unix_str(dt), "1424301369");
    }
}

use std::fmt::Display;

use clap::{error::ErrorKind, CommandFactory, Parser};

/// Standard input filename
const STDIN_FILE: &str = "-";

const USAGE_SHORT: &str = r#"
This program accepts raw PCM samples in signed 16-bit (i16) format, at the given sampling --rate, and decodes any SAME headers that are present. Decoded headers are printed in their ASCII representation.

See --help for more details.

ALWAYS TEST YOUR DECODING SETUP!
"#;

const USAGE_LONG: &str = r#"
This program accepts raw PCM samples in signed 16-bit (i16) format, at the given sampling --rate, and decodes any SAME headers that are present. Decoded headers are printed in their ASCII representation.

You can pipe in an audio file with sox

    sox input.wav -t raw -r 22.5k -e signed -b 16 -c 1 - \
        | sirenmon -r 22050

The input is resampled internally; any common sampling rate works.

Arguments which follow "--" will be used to spawn a child process. The child process will have the input audio signal piped to its standard input for as long as the alert is active. You can use this to play or store SAME messages.

    parec --channels 1 --format s16ne \
      --rate 22050 --latency-msec 500 \
        | sirenmon -r 22050 -- pacat \
            --channels 1 --format s16ne \
            --rate 22050 --latency-msec 500

The child process receives the following additional environment variables which describe the message:

  SIRENMON_RATE="22050" (configured sample --rate)
  SIRENMON_MSG="ZCZC-WXR-RWT-039173+0030-3202000-KR8MER-"
  SIRENMON_ORG="WXR" (or CIV,EAS,PEP)
  SIRENMON_ORIGINATOR="National Weather Service"
  SIRENMON_EVT="RWT"
  SIRENMON_EVENT="Required Weekly Test"
  SIRENMON_SIGNIFICANCE="T" (or S,A,W)
  SIRENMON_LOCATIONS="039173"
  SIRENMON_CONFIDENCE="1.00" (burst agreement, 0 to 1)
  SIRENMON_ISSUETIME="1616883240" (UTC UNIX timestamp)
  SIRENMON_PURGETIME="1616886840" (UTC UNIX timestamp)

Child processes MUST read or close standard input.
Child processes MUST exit when their standard input is closed.

ALWAYS TEST YOUR DECODING SETUP!
"#;

const ADVANCED: &str = "Advanced Decoder Options";

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print NOTHING, not even SAME headers
    #[arg(short, long)]
    pub quiet: bool,

    /// Sampling rate (Hz)
    ///
    /// Set to the sampling rate of your audio source. If sampling from
    /// a sound card, use the card's native rate—usually 44100 or 48000.
    #[arg(short, long, default_value_t = 22050)]
    pub rate: u32,

    /// Input file (or "-" for stdin)
    ///
    /// The input must be one-channel (mono), signed 16-bit
    /// native-endian at --rate.
    #[arg(long, default_value_t = STDIN_FILE.to_string())]
    pub file: String,

    /// Issue demo warning (DMO) and exit
    ///
    /// You must still provide an audio file, but you may use /dev/zero.
    /// sirenmon will print a demo warning, invoke the CHILD process with
    /// eight seconds of audio, and then exit.
    #[arg(long)]
    pub demo: bool,

    /// Minimum decode confidence (0.0 ≤ CONF ≤ 1.0)
    ///
    /// Headers whose burst agreement falls below this fraction are
    /// logged and discarded.
    #[arg(long, default_value_t = 0.5)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub confidence_floor: f32,

    /// Seconds to hold bit sync without a message before resetting
    #[arg(long, default_value_t = 5.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub sync_timeout: f32,

    /// Seconds to wait for burst repetitions before voting
    #[arg(long, default_value_t = 7.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub repeat_window: f32,

    /// Spawn child process to handle message audio. Optional.
    ///
    /// Arguments are provided VERBATIM to the child process
    /// without shell interpretation.
    #[arg(last = true)]
    pub child: Vec<String>,
}

impl Args {
    /// Return true if the user requests input from stdin
    pub fn input_is_stdin(&self) -> bool {
        self.file == STDIN_FILE
    }
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors
    /// are printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clap() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}

//! What a command prints.
//!
//! Every command ends with one summary: text on stdout, or with `--json` a
//! single [`Envelope`] holding the same data. Progress lines and warnings are
//! extra text that `--quiet` and `--json` silence. Fatal errors go to stderr,
//! or into a failure envelope on stdout with `--json`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::io::{self, Write};

/// Version of the JSON envelope format
const ENVELOPE_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Quiet,
    Json,
}

/// Output settings derived from the global flags
#[derive(Debug, Clone, Copy)]
pub struct OutputContext {
    mode: Mode,
}

impl OutputContext {
    /// `--json` wins over `--quiet`.
    pub fn new(quiet: bool, json: bool) -> Self {
        let mode = if json {
            Mode::Json
        } else if quiet {
            Mode::Quiet
        } else {
            Mode::Text
        };
        Self { mode }
    }

    pub fn is_json(&self) -> bool {
        self.mode == Mode::Json
    }

    /// Stage progress on stdout; text mode only.
    pub fn progress(&self, msg: impl Display) -> io::Result<()> {
        match self.mode {
            Mode::Text => write_line(io::stdout(), msg),
            Mode::Quiet | Mode::Json => Ok(()),
        }
    }

    /// Warning on stderr; text mode only.
    pub fn warning(&self, msg: impl Display) -> io::Result<()> {
        match self.mode {
            Mode::Text => write_line(io::stderr(), format_args!("Warning: {}", msg)),
            Mode::Quiet | Mode::Json => Ok(()),
        }
    }

    /// The end-of-command summary: `data` as an envelope with `--json`,
    /// otherwise the rendered `text`.
    pub fn summary<T: Serialize>(&self, command: &str, data: &T, text: &str) -> io::Result<()> {
        if self.is_json() {
            write_line(io::stdout(), Envelope::success(data, command).to_json()?)
        } else {
            write_line(io::stdout(), text.trim_end())
        }
    }

    /// A fatal error. `text` is the operator-facing rendering used outside
    /// `--json`.
    pub fn failure(
        &self,
        command: &str,
        code: ExitCode,
        message: &str,
        suggestions: &[String],
        text: &str,
    ) -> io::Result<()> {
        if self.is_json() {
            let envelope = Envelope::failure(code, message, command).with_suggestions(suggestions);
            write_line(io::stdout(), envelope.to_json()?)
        } else {
            write!(io::stderr(), "{}", text)
        }
    }
}

/// Write one line, ending the process quietly when the reader went away
/// (`notion-migrate export ... | head`).
fn write_line(mut stream: impl Write, msg: impl Display) -> io::Result<()> {
    match writeln!(stream, "{}", msg) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => std::process::exit(0),
        other => other,
    }
}

/// JSON document printed by `--json`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    pub metadata: Metadata,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: Metadata::new(command),
        }
    }

    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string_pretty(self).map_err(io::Error::other)
    }
}

impl Envelope<()> {
    pub fn failure(code: ExitCode, message: &str, command: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorDetail {
                code: code.code(),
                kind: code.description().to_string(),
                message: message.to_string(),
                suggestions: Vec::new(),
            }),
            metadata: Metadata::new(command),
        }
    }

    pub fn with_suggestions(mut self, suggestions: &[String]) -> Self {
        if let Some(error) = &mut self.error {
            error.suggestions.extend_from_slice(suggestions);
        }
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: i32,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    /// RFC 3339
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub command: String,
}

impl Metadata {
    fn new(command: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            version: ENVELOPE_VERSION,
            command: command.to_string(),
        }
    }
}

/// Process exit codes
///
/// ```rust
/// use notion_migrate::ExitCode;
///
/// assert_eq!(ExitCode::ConfigError.code(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GenericError = 1,
    /// Missing credential or setting, or a field/table the destination rejects
    ConfigError = 2,
    /// Export directory, source tree or stage file missing
    NotFound = 3,
    /// Remote store unreachable
    ExternalError = 10,
}

impl ExitCode {
    pub const ALL: [ExitCode; 5] = [
        ExitCode::Success,
        ExitCode::GenericError,
        ExitCode::ConfigError,
        ExitCode::NotFound,
        ExitCode::ExternalError,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Command succeeded",
            ExitCode::GenericError => "Generic error occurred",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::NotFound => "Input not found",
            ExitCode::ExternalError => "Remote store unreachable",
        }
    }

    /// Exit code table shown after `--help`.
    pub fn help_table() -> String {
        let mut table = String::from("Exit Codes:");
        for code in Self::ALL {
            table.push_str(&format!("\n  {:<3} {}", code.code(), code.description()));
        }
        table
    }
}

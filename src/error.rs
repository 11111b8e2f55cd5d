//! Error types for the bridge.
//!
//! Only configuration, template and MIDI port errors are fatal. Decode and
//! dispatch errors are logged and counted by the worker that hits them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("templates: {0}")]
    Template(#[from] TemplateLoadError),

    #[error("MIDI port error: {0}")]
    MidiPort(String),

    #[error("MIDI device error: {0}")]
    MidiDevice(String),

    #[error("service discovery: {0}")]
    Discovery(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::MidiDevice(e.to_string())
    }
}

impl From<midir::PortInfoError> for Error {
    fn from(e: midir::PortInfoError) -> Self {
        Error::MidiPort(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::MidiPort(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Malformed or foreign SysEx payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized manufacturer id {prefix:02X?}")]
    UnrecognizedManufacturer { prefix: Vec<u8> },

    #[error("truncated SysEx: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum TemplateLoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid template JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] TemplateValidationError),
}

/// A template entry or lookup table that can never render correctly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{location}: {issue}")]
pub struct TemplateValidationError {
    /// `template #3 'channel fader'` or `table 'mmc_commands'`.
    pub location: String,
    pub issue: ValidationIssue,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{field}' does not exist on {class} events")]
    FieldUnavailable { field: String, class: &'static str },

    #[error("{arg} argument cannot take field '{field}'")]
    TypeMismatch { arg: &'static str, field: String },

    #[error("unknown lookup table '{0}'")]
    UnknownTable(String),

    #[error("lookup tables need an integer key, '{0}' is not one")]
    TableOnNonInteger(String),

    #[error("malformed placeholder in '{0}'")]
    BadPlaceholder(String),

    #[error("OSC address '{0}' must start with '/'")]
    BadAddress(String),

    #[error("predicate on '{field}': {reason}")]
    BadPredicate { field: &'static str, reason: String },

    #[error("argument #{index}: {reason}")]
    BadArgument { index: usize, reason: String },

    #[error("table '{table}': key '{key}' is not an integer")]
    BadTableKey { table: String, key: String },

    #[error("table '{table}': key '{key}' repeats an earlier key")]
    DuplicateTableKey { table: String, key: String },
}

/// Per-target delivery failures. Never propagated past the dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("cannot encode OSC message {addr}: {reason}")]
    Encode { addr: String, reason: String },

    #[error("send to '{target}' failed: {source}")]
    Send {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("send queue for '{target}' is full")]
    QueueFull { target: String },

    #[error("target '{target}' is shut down")]
    Closed { target: String },
}

//! Error types for tracefs operations.
//!
//! Errors fall into a few buckets:
//! - structural misuse (`InvalidOperation`), e.g. destroying the root instance
//! - I/O failures against a control file (`Io`), carrying the OS error as-is
//! - protocol violations (`UnexpectedValue`) when a control file holds content
//!   outside its closed value set
//! - parse failures of the uprobe grammar (`InvalidRule`, `InvalidFetchArg`)

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The operation is not valid for this kind of instance.
    InvalidOperation { op: &'static str, message: String },
    /// The underlying filesystem call failed.
    Io { path: PathBuf, source: io::Error },
    /// A control file held a value outside the expected set.
    UnexpectedValue { path: PathBuf, value: String },
    /// A uprobe rule line could not be parsed.
    InvalidRule { rule: String, message: String },
    /// A fetch argument could not be parsed.
    InvalidFetchArg { arg: String, message: String },
    /// No tracefs mount could be located.
    MountNotFound,
}

impl Error {
    pub(crate) fn invalid_op(op: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            op,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The OS error behind an `Io` failure, if this is one.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Error::InvalidOperation { .. })
    }

    #[must_use]
    pub fn is_unexpected_value(&self) -> bool {
        matches!(self, Error::UnexpectedValue { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidOperation { op, message } => {
                write!(f, "{op}: {message}")
            }
            Error::Io { path, source } => {
                write!(f, "{}: {source}", path.display())
            }
            Error::UnexpectedValue { path, value } => {
                write!(f, "{}: unknown value '{value}'", path.display())
            }
            Error::InvalidRule { rule, message } => {
                write!(f, "invalid uprobe rule '{rule}': {message}")
            }
            Error::InvalidFetchArg { arg, message } => {
                write!(f, "invalid fetch argument '{arg}': {message}")
            }
            Error::MountNotFound => write!(f, "no tracefs mount found"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Source position of an instrumented call site.
///
/// `file` is `None` when the call site is unknown (for example the end-of-run
/// driver); such locations render as `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub file: Option<&'static str>,
}

impl Location {
    pub const UNKNOWN: Location = Location {
        line: 0,
        file: None,
    };

    pub const fn new(line: u32, file: &'static str) -> Self {
        Self {
            line,
            file: Some(file),
        }
    }

    pub fn file_or_dashes(&self) -> &'static str {
        self.file.unwrap_or("--")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_or_dashes(), self.line)
    }
}

#[derive(Debug, Error)]
pub enum MemTrackError {
    #[error("Exceeded memory limit")]
    CeilingExceeded {
        ceiling: u64,
        requested: u64,
        location: Location,
    },

    #[error("invalid call to {operation}; rerun with memory tracking enabled")]
    TrackingDisabled {
        operation: &'static str,
        location: Location,
    },

    #[error("memtrack fault: out of memory {what}")]
    OutOfMemory {
        what: &'static str,
        location: Location,
    },

    #[error("remote read of locale {locale} memory counters failed")]
    RemoteRead { locale: u32, location: Location },

    #[error("failed to open memory log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start comm server for locale {locale}: {source}")]
    Spawn {
        locale: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write memory report: {0}")]
    Write(#[from] std::io::Error),

    #[error("end-of-run memory report was already written")]
    AlreadyShutDown,
}

impl MemTrackError {
    /// Call site the error is attributed to, if any.
    pub fn location(&self) -> Option<Location> {
        match self {
            MemTrackError::CeilingExceeded { location, .. }
            | MemTrackError::TrackingDisabled { location, .. }
            | MemTrackError::OutOfMemory { location, .. }
            | MemTrackError::RemoteRead { location, .. } => Some(*location),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MemTrackError>;

/// Print `err` attributed to its call site and terminate the process.
///
/// The message reads `<file>:<line>: error: <message>` when the call site is
/// known and `error: <message>` otherwise.
pub fn fatal(err: &MemTrackError) -> ! {
    eprintln!("{}", fatal_message(err));
    std::process::exit(1);
}

pub(crate) fn fatal_message(err: &MemTrackError) -> String {
    match err.location() {
        Some(Location {
            line,
            file: Some(file),
        }) => format!("{}:{}: error: {}", file, line, err),
        _ => format!("error: {}", err),
    }
}

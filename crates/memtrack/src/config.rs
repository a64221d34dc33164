//! One-time configuration of the memory tracking layer.
//!
//! A [`Config`] is built once, before any tracked event, and consumed when the
//! tracker is created. Nothing in it can change afterwards.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

/// Output format of the end-of-run report.
///
/// # Variants
///
/// * `Table` - Fixed-width text sections (default)
/// * `Json` - Compact JSON format (single line)
/// * `JsonPretty` - Pretty-printed JSON format with indentation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Table,
    Json,
    JsonPretty,
}

/// Where the primary memory log goes.
pub enum LogDestination {
    /// Standard output.
    Console,
    /// A file created at configuration time. With more than one locale the
    /// locale id is appended as `<path>.<id>`.
    Path(PathBuf),
    /// Any writer supplied by the embedding code.
    Writer(Box<dyn Write + Send>),
}

impl LogDestination {
    /// Resolve a path as given on the command line: empty means console.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.as_os_str().is_empty() {
            LogDestination::Console
        } else {
            LogDestination::Path(path)
        }
    }
}

impl fmt::Debug for LogDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogDestination::Console => write!(f, "Console"),
            LogDestination::Path(path) => f.debug_tuple("Path").field(path).finish(),
            LogDestination::Writer(_) => write!(f, "Writer(..)"),
        }
    }
}

/// Commands echoed at the top of every leak-log run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInfo {
    pub compile_command: String,
    pub execution_command: String,
}

impl RunInfo {
    /// Execution command taken from this process's arguments.
    pub fn current() -> Self {
        Self {
            compile_command: String::new(),
            execution_command: std::env::args().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Tracking configuration.
///
/// # Examples
///
/// ```rust
/// use memtrack::Config;
///
/// let config = Config::new()
///     .stats(true)
///     .leaks(true)
///     .threshold(64)
///     .max(1 << 30);
/// assert!(config.tracking_enabled());
/// ```
#[derive(Debug)]
pub struct Config {
    pub(crate) track: bool,
    pub(crate) stats: bool,
    pub(crate) leaks: bool,
    pub(crate) leaks_table: bool,
    pub(crate) max: u64,
    pub(crate) threshold: u64,
    pub(crate) log: LogDestination,
    pub(crate) leaks_log: Option<PathBuf>,
    pub(crate) verbose: bool,
    pub(crate) format: Format,
    pub(crate) run_info: RunInfo,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            track: false,
            stats: false,
            leaks: false,
            leaks_table: false,
            max: 0,
            threshold: 0,
            log: LogDestination::Console,
            leaks_log: None,
            verbose: false,
            format: Format::Table,
            run_info: RunInfo::current(),
        }
    }

    /// Read the configuration from `MEMTRACK_*` environment variables.
    ///
    /// | Variable | Meaning |
    /// | --- | --- |
    /// | `MEMTRACK_TRACK` | enable the allocation ledger |
    /// | `MEMTRACK_STATS` | print statistics at shutdown |
    /// | `MEMTRACK_LEAKS` | print the leak summary at shutdown |
    /// | `MEMTRACK_LEAKS_TABLE` | print every live entry at shutdown |
    /// | `MEMTRACK_MAX` | live-byte ceiling, 0 = unlimited |
    /// | `MEMTRACK_THRESHOLD` | ignore events of at most this many bytes |
    /// | `MEMTRACK_LOG` | primary log path, empty = console |
    /// | `MEMTRACK_LEAKS_LOG` | leak log appended to at shutdown |
    /// | `MEMTRACK_VERBOSE` | start with verbose event logging |
    /// | `MEMTRACK_JSON` | JSON end-of-run report |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false)
        };
        let number = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };

        let mut config = Config::new()
            .track(flag("MEMTRACK_TRACK"))
            .stats(flag("MEMTRACK_STATS"))
            .leaks(flag("MEMTRACK_LEAKS"))
            .leaks_table(flag("MEMTRACK_LEAKS_TABLE"))
            .max(number("MEMTRACK_MAX"))
            .threshold(number("MEMTRACK_THRESHOLD"))
            .log(LogDestination::from_path(
                lookup("MEMTRACK_LOG").unwrap_or_default(),
            ))
            .verbose(flag("MEMTRACK_VERBOSE"));

        if let Some(path) = lookup("MEMTRACK_LEAKS_LOG") {
            config = config.leaks_log(path);
        }
        if flag("MEMTRACK_JSON") {
            config = config.format(Format::Json);
        }
        config
    }

    pub fn track(mut self, enabled: bool) -> Self {
        self.track = enabled;
        self
    }

    pub fn stats(mut self, enabled: bool) -> Self {
        self.stats = enabled;
        self
    }

    pub fn leaks(mut self, enabled: bool) -> Self {
        self.leaks = enabled;
        self
    }

    pub fn leaks_table(mut self, enabled: bool) -> Self {
        self.leaks_table = enabled;
        self
    }

    /// Maximum live bytes; exceeding it is fatal. 0 means unlimited.
    pub fn max(mut self, bytes: u64) -> Self {
        self.max = bytes;
        self
    }

    /// Events whose byte size is at or below `bytes` are ignored.
    pub fn threshold(mut self, bytes: u64) -> Self {
        self.threshold = bytes;
        self
    }

    pub fn log(mut self, destination: LogDestination) -> Self {
        self.log = destination;
        self
    }

    /// Append statistics and the leak summary to `path` at shutdown.
    /// An empty path disables the leak log.
    pub fn leaks_log(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.leaks_log = (!path.as_os_str().is_empty()).then_some(path);
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn run_info(mut self, run_info: RunInfo) -> Self {
        self.run_info = run_info;
        self
    }

    /// Whether the allocation ledger will be kept.
    ///
    /// Any report, a ceiling, or a leak log forces tracking on.
    pub fn tracking_enabled(&self) -> bool {
        self.track
            || self.stats
            || self.leaks
            || self.leaks_table
            || self.max != 0
            || self.leaks_log.is_some()
    }
}

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::PathBuf;

use crate::config::{Format, LogDestination};
use crate::error::{MemTrackError, Result};
use crate::json::MemReportJson;
use crate::lib_on::report::{LeakSummary, LiveTable, StatisticsReport};

/// Primary memory log of one locale.
pub(crate) enum LogSink {
    Console(Stdout),
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
    Writer(Box<dyn Write + Send>),
    /// Closed by the end-of-run driver; writes are discarded.
    Closed,
}

impl LogSink {
    pub(crate) fn open(
        destination: LogDestination,
        locale_id: u32,
        num_locales: u32,
    ) -> Result<Self> {
        match destination {
            LogDestination::Console => Ok(LogSink::Console(io::stdout())),
            LogDestination::Writer(writer) => Ok(LogSink::Writer(writer)),
            LogDestination::Path(path) => {
                let path = if num_locales > 1 {
                    let mut suffixed = OsString::from(path);
                    suffixed.push(format!(".{}", locale_id));
                    PathBuf::from(suffixed)
                } else {
                    path
                };
                let file = File::create(&path).map_err(|source| MemTrackError::Open {
                    path: path.clone(),
                    source,
                })?;
                Ok(LogSink::File {
                    path,
                    writer: BufWriter::new(file),
                })
            }
        }
    }

    /// Flush and close the sink. The console stays open.
    pub(crate) fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        if !matches!(self, LogSink::Console(_)) {
            *self = LogSink::Closed;
        }
        Ok(())
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::Console(stdout) => stdout.write(buf),
            LogSink::File { writer, .. } => writer.write(buf),
            LogSink::Writer(writer) => writer.write(buf),
            LogSink::Closed => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::Console(stdout) => stdout.flush(),
            LogSink::File { path, writer } => writer.flush().map_err(|e| {
                io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
            }),
            LogSink::Writer(writer) => writer.flush(),
            LogSink::Closed => Ok(()),
        }
    }
}

/// Sections produced by the end-of-run driver for one locale.
///
/// A section is `None` when it was not enabled at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemReport {
    pub locale: u32,
    pub statistics: Option<StatisticsReport>,
    pub leaks: Option<LeakSummary>,
    pub table: Option<LiveTable>,
}

impl MemReport {
    pub fn is_empty(&self) -> bool {
        self.statistics.is_none() && self.leaks.is_none() && self.table.is_none()
    }
}

/// Trait for implementing custom end-of-run report output.
///
/// The driver hands the report to the reporter together with the locale's
/// primary log, and closes the log afterwards.
///
/// # Examples
///
/// ```rust
/// use std::io::Write;
/// use memtrack::{MemReport, Reporter};
///
/// struct OneLine;
///
/// impl Reporter for OneLine {
///     fn report(&self, report: &MemReport, out: &mut dyn Write) -> std::io::Result<()> {
///         if let Some(leaks) = &report.leaks {
///             writeln!(out, "locale {} leaked {} bytes", report.locale, leaks.total_bytes())?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter: Send + Sync {
    fn report(&self, report: &MemReport, out: &mut dyn Write) -> io::Result<()>;
}

pub(crate) fn reporter_for(format: Format) -> Box<dyn Reporter> {
    match format {
        Format::Table => Box::new(TableReporter),
        Format::Json => Box::new(JsonReporter),
        Format::JsonPretty => Box::new(JsonPrettyReporter),
    }
}

/// Fixed-width text sections, each preceded by a blank line.
pub struct TableReporter;

impl Reporter for TableReporter {
    fn report(&self, report: &MemReport, out: &mut dyn Write) -> io::Result<()> {
        if let Some(statistics) = &report.statistics {
            writeln!(out)?;
            statistics.write_table(out)?;
        }
        if let Some(leaks) = &report.leaks {
            writeln!(out)?;
            leaks.write_table(out)?;
        }
        if let Some(table) = &report.table {
            writeln!(out)?;
            table.write_table(out)?;
        }
        Ok(())
    }
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, report: &MemReport, out: &mut dyn Write) -> io::Result<()> {
        if report.is_empty() {
            return Ok(());
        }
        serde_json::to_writer(&mut *out, &MemReportJson::from(report))?;
        writeln!(out)
    }
}

pub struct JsonPrettyReporter;

impl Reporter for JsonPrettyReporter {
    fn report(&self, report: &MemReport, out: &mut dyn Write) -> io::Result<()> {
        if report.is_empty() {
            return Ok(());
        }
        serde_json::to_writer_pretty(&mut *out, &MemReportJson::from(report))?;
        writeln!(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib_on::ledger::MemCounters;
    use crate::lib_on::report::LocaleCounters;

    fn report() -> MemReport {
        MemReport {
            locale: 0,
            statistics: Some(StatisticsReport {
                multi_locale: false,
                rows: vec![LocaleCounters {
                    locale: 0,
                    counters: MemCounters {
                        current: 10,
                        peak: 20,
                        allocated: 30,
                        freed: 20,
                    },
                }],
            }),
            leaks: None,
            table: None,
        }
    }

    #[test]
    fn per_locale_log_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem.log");

        let sink = LogSink::open(LogDestination::Path(path.clone()), 3, 4).unwrap();
        assert!(matches!(sink, LogSink::File { ref path, .. } if path.ends_with("mem.log.3")));

        let sink = LogSink::open(LogDestination::Path(path.clone()), 0, 1).unwrap();
        assert!(matches!(sink, LogSink::File { ref path, .. } if path.ends_with("mem.log")));
    }

    #[test]
    fn unopenable_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("mem.log");
        assert!(matches!(
            LogSink::open(LogDestination::Path(path), 0, 1),
            Err(MemTrackError::Open { .. })
        ));
    }

    #[test]
    fn closed_file_sink_discards_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem.log");
        let mut sink = LogSink::open(LogDestination::Path(path.clone()), 0, 1).unwrap();

        writeln!(sink, "before").unwrap();
        sink.close().unwrap();
        writeln!(sink, "after").unwrap();

        assert!(matches!(sink, LogSink::Closed));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "before\n");
    }

    #[test]
    fn json_reporter_writes_one_line() {
        let mut out = Vec::new();
        JsonReporter.report(&report(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);

        let parsed: MemReportJson = serde_json::from_str(&text).unwrap();
        let stats = parsed.statistics.unwrap();
        assert_eq!(stats[0].counters.peak, 20);
        assert!(parsed.leaks.is_none());
    }

    #[test]
    fn empty_report_prints_nothing() {
        let empty = MemReport {
            locale: 1,
            statistics: None,
            leaks: None,
            table: None,
        };
        for reporter in [Format::Table, Format::Json, Format::JsonPretty].map(reporter_for) {
            let mut out = Vec::new();
            reporter.report(&empty, &mut out).unwrap();
            assert!(out.is_empty());
        }
    }
}

//! Reporting engine: statistics, leak summary, live-table dump and the
//! end-of-run driver.
//!
//! Every report is built in two steps. The ledger is scanned under its lock
//! into an owned value, then the lock is released and the value is written
//! to the log sink. Formatting and file I/O never happen under the ledger
//! lock.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::ledger::MemCounters;
use super::tracker::MemTracker;
use crate::desc::MemDesc;
use crate::error::{Location, MemTrackError, Result};
use crate::output::rule;
use crate::output_on::{reporter_for, MemReport, Reporter};

const NUMBER_WIDTH: usize = 9;
const DESC_WIDTH: usize = 33;
const ADDRESS_WIDTH: usize = 20;
const SECTION_RULE: usize = 62;
const LOCATION_HEADER: &str = "Allocated Memory (Bytes)";

/// Counters of one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleCounters {
    pub locale: u32,
    pub counters: MemCounters,
}

/// Point-in-time statistics, one row per locale.
///
/// With more than one locale the rows are independent snapshots taken one
/// after another, not a consistent cut across the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsReport {
    pub multi_locale: bool,
    pub rows: Vec<LocaleCounters>,
}

impl StatisticsReport {
    pub fn write_table(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", rule(17))?;
        writeln!(out, "Memory Statistics")?;
        writeln!(out, "{}", rule(SECTION_RULE))?;

        if !self.multi_locale {
            if let Some(row) = self.rows.first() {
                let c = &row.counters;
                writeln!(out, "Current Allocated Memory               {}", c.current)?;
                writeln!(out, "Maximum Simultaneous Allocated Memory  {}", c.peak)?;
                writeln!(out, "Total Allocated Memory                 {}", c.allocated)?;
                writeln!(out, "Total Freed Memory                     {}", c.freed)?;
            }
            return writeln!(out, "{}", rule(SECTION_RULE));
        }

        writeln!(out, "Locale")?;
        writeln!(out, "           Current Allocated Memory")?;
        writeln!(out, "                      Maximum Simultaneous Allocated Memory")?;
        writeln!(out, "                                 Total Allocated Memory")?;
        writeln!(out, "                                            Total Freed Memory")?;
        writeln!(out, "{}", rule(SECTION_RULE))?;
        for row in &self.rows {
            let c = &row.counters;
            writeln!(
                out,
                "{:<w$}  {:<w$}  {:<w$}  {:<w$}  {:<w$}",
                row.locale,
                c.current,
                c.peak,
                c.allocated,
                c.freed,
                w = NUMBER_WIDTH
            )?;
        }
        writeln!(out, "{}", rule(SECTION_RULE))
    }
}

/// Live bytes of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakRow {
    pub desc: MemDesc,
    pub label: String,
    pub count: u64,
    pub bytes: u64,
}

/// Categories with live bytes, largest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakSummary {
    pub rows: Vec<LeakRow>,
}

impl LeakSummary {
    pub fn total_bytes(&self) -> u64 {
        self.rows.iter().map(|row| row.bytes).sum()
    }

    pub fn write_table(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", rule(20))?;
        writeln!(out, "Leaked Memory Report")?;
        writeln!(out, "{}", rule(SECTION_RULE))?;
        writeln!(out, "Number of leaked allocations")?;
        writeln!(out, "           Total leaked memory (bytes)")?;
        writeln!(out, "                      Description of allocation")?;
        writeln!(out, "{}", rule(SECTION_RULE))?;
        for row in &self.rows {
            writeln!(
                out,
                "{:<w$}  {:<w$}  {}",
                row.count,
                row.bytes,
                row.label,
                w = NUMBER_WIDTH
            )?;
        }
        writeln!(out, "{}", rule(SECTION_RULE))
    }
}

/// One live entry as shown in the table dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRow {
    pub location: Location,
    pub count: u64,
    pub size: u64,
    pub total: u64,
    pub desc: MemDesc,
    pub label: String,
    pub address: usize,
}

/// Every live entry at or above a byte threshold, sorted by category label,
/// then file, then line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTable {
    /// Width of the location column before the trailing number padding.
    pub filename_width: usize,
    pub rows: Vec<LiveRow>,
}

impl LiveTable {
    pub fn write_table(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let loc_width = self.filename_width + NUMBER_WIDTH;
        let total_width =
            self.filename_width + NUMBER_WIDTH * 4 + DESC_WIDTH + ADDRESS_WIDTH;

        writeln!(out, "{}", rule(total_width))?;
        writeln!(
            out,
            "{:<lw$}{:<nw$}{:<nw$}{:<nw$}{:<dw$}{:<aw$}",
            LOCATION_HEADER,
            "Number",
            "Size",
            "Total",
            "Description",
            "Address",
            lw = loc_width,
            nw = NUMBER_WIDTH,
            dw = DESC_WIDTH,
            aw = ADDRESS_WIDTH
        )?;
        writeln!(out, "{}", rule(total_width))?;

        for row in &self.rows {
            let loc = match row.location.file {
                Some(file) => format!("{}:{}", file, row.location.line),
                None => "--".to_string(),
            };
            writeln!(
                out,
                "{:<lw$}{:<nw$}{:<nw$}{:<nw$}{:<dw$}{:<aw$}",
                loc,
                row.count,
                row.size,
                row.total,
                row.label,
                format!("{:#018x}", row.address),
                lw = loc_width,
                nw = NUMBER_WIDTH,
                dw = DESC_WIDTH,
                aw = ADDRESS_WIDTH
            )?;
        }
        writeln!(out, "{}", rule(total_width))?;
        writeln!(out)
    }
}

impl MemTracker {
    /// Counters of this locale, or of every locale in a multi-locale run.
    pub fn statistics(&self, location: Location) -> Result<StatisticsReport> {
        let ledger = self.ledger("printMemStat()", location)?;

        if self.num_locales() == 1 {
            let counters = ledger.lock().counters();
            return Ok(StatisticsReport {
                multi_locale: false,
                rows: vec![LocaleCounters {
                    locale: self.locale_id(),
                    counters,
                }],
            });
        }

        let rows = (0..self.num_locales())
            .map(|locale| {
                Ok(LocaleCounters {
                    locale,
                    counters: self.comm().get_counters(locale, location)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(StatisticsReport {
            multi_locale: true,
            rows,
        })
    }

    /// Live bytes and entry counts grouped by category.
    ///
    /// Categories with equal totals keep ascending category order. Entries
    /// tagged with a category the descriptor table does not know are
    /// counted under [`MemDesc::UNKNOWN`].
    pub fn leak_summary(&self) -> Result<LeakSummary> {
        let ledger = self.ledger("printLeakSummary()", Location::UNKNOWN)?;
        let descs = self.descriptors();
        let categories = descs.len().max(1);

        let mut totals = vec![(0u64, 0u64); categories];
        {
            let ledger = ledger.lock();
            for entry in ledger.iter() {
                let slot = match entry.desc.index() {
                    i if i < categories => i,
                    _ => MemDesc::UNKNOWN.index(),
                };
                totals[slot].0 = totals[slot].0.saturating_add(entry.chunk());
                totals[slot].1 += 1;
            }
        }

        let mut rows: Vec<LeakRow> = totals
            .into_iter()
            .enumerate()
            .filter(|(_, (bytes, _))| *bytes > 0)
            .map(|(i, (bytes, count))| {
                let desc = MemDesc(i as u32);
                LeakRow {
                    desc,
                    label: descs.label(desc).to_string(),
                    count,
                    bytes,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.bytes.cmp(&a.bytes));

        Ok(LeakSummary { rows })
    }

    /// Every live entry of at least `threshold` bytes.
    pub fn live_table(&self, threshold: u64, location: Location) -> Result<LiveTable> {
        let ledger = self.ledger("printMemTable()", location)?;

        let (filename_width, mut entries) = {
            let ledger = ledger.lock();

            let mut matched = 0;
            let mut filename_width = LOCATION_HEADER.len();
            for entry in ledger.iter().filter(|e| e.chunk() >= threshold) {
                matched += 1;
                if let Some(file) = entry.location.file {
                    filename_width = filename_width.max(file.chars().count());
                }
            }

            let mut entries = Vec::new();
            entries
                .try_reserve_exact(matched)
                .map_err(|_| MemTrackError::OutOfMemory {
                    what: "printing memory table",
                    location,
                })?;
            entries.extend(ledger.iter().filter(|e| e.chunk() >= threshold).cloned());
            (filename_width, entries)
        };

        let descs = self.descriptors();
        entries.sort_by(|a, b| {
            descs
                .label(a.desc)
                .cmp(descs.label(b.desc))
                .then_with(|| a.location.file.cmp(&b.location.file))
                .then_with(|| a.location.line.cmp(&b.location.line))
        });

        let rows = entries
            .into_iter()
            .map(|entry| LiveRow {
                location: entry.location,
                count: entry.count,
                size: entry.size,
                total: entry.chunk(),
                desc: entry.desc,
                label: descs.label(entry.desc).to_string(),
                address: entry.address,
            })
            .collect();

        Ok(LiveTable {
            filename_width,
            rows,
        })
    }

    /// Write the statistics report to the log.
    pub fn print_mem_stat(&self, location: Location) -> Result<()> {
        let report = self.statistics(location)?;
        report.write_table(&mut *self.sink().lock())?;
        Ok(())
    }

    /// Write the leak summary to the log.
    pub fn print_leak_summary(&self) -> Result<()> {
        let report = self.leak_summary()?;
        report.write_table(&mut *self.sink().lock())?;
        Ok(())
    }

    /// Write every live entry of at least `threshold` bytes to the log.
    pub fn print_mem_table(&self, threshold: u64, location: Location) -> Result<()> {
        let report = self.live_table(threshold, location)?;
        report.write_table(&mut *self.sink().lock())?;
        Ok(())
    }

    /// End-of-run driver using the reporter for the configured format.
    pub fn report_at_shutdown(&self) -> Result<()> {
        self.report_at_shutdown_with(reporter_for(self.format()).as_ref())
    }

    /// End-of-run driver.
    ///
    /// Writes the enabled sections (statistics, leak summary, live table) to
    /// the primary log through `reporter` and closes it. If a leak log is
    /// configured, statistics and the leak summary are then appended to it
    /// under a header naming the compile and execution commands.
    ///
    /// Runs once; later calls return [`MemTrackError::AlreadyShutDown`].
    pub fn report_at_shutdown_with(&self, reporter: &dyn Reporter) -> Result<()> {
        if !self.begin_shutdown() {
            tracing::warn!(
                locale = self.locale_id(),
                "end-of-run memory report requested twice"
            );
            return Err(MemTrackError::AlreadyShutDown);
        }

        let (stats, leaks, leaks_table) = self.report_flags();
        let report = MemReport {
            locale: self.locale_id(),
            statistics: stats
                .then(|| self.statistics(Location::UNKNOWN))
                .transpose()?,
            leaks: leaks.then(|| self.leak_summary()).transpose()?,
            table: leaks_table
                .then(|| self.live_table(0, Location::UNKNOWN))
                .transpose()?,
        };

        {
            let mut sink = self.sink().lock();
            reporter.report(&report, &mut *sink)?;
            sink.close()?;
        }

        if let Some(path) = self.leaks_log() {
            if let Err(e) = self.append_leaks_log(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to write leak log");
                return Err(e);
            }
        }

        let (live_entries, buckets) = self
            .ledger("reportAtShutdown()", Location::UNKNOWN)
            .map(|ledger| {
                let ledger = ledger.lock();
                (ledger.len(), ledger.bucket_count())
            })
            .unwrap_or_default();
        tracing::info!(
            locale = self.locale_id(),
            live_entries,
            buckets,
            "end-of-run memory report written"
        );
        Ok(())
    }

    fn append_leaks_log(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| MemTrackError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let mut out = BufWriter::new(file);

        let run = self.run_info();
        write!(out, "\nCompiler Command : {}\n", run.compile_command)?;
        write!(out, "Execution Command: {}\n\n", run.execution_command)?;
        self.statistics(Location::UNKNOWN)?.write_table(&mut out)?;
        writeln!(out)?;
        self.leak_summary()?.write_table(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LogDestination, RunInfo};
    use crate::desc::RuntimeDescriptors;
    use crate::lib_on::comm::LocaleCluster;
    use crate::output::CaptureBuffer;
    use std::sync::Arc;

    fn tracker(config: Config) -> (MemTracker, CaptureBuffer) {
        let log = CaptureBuffer::new();
        let tracker =
            MemTracker::new(config.log(LogDestination::Writer(Box::new(log.clone())))).unwrap();
        (tracker, log)
    }

    fn at(line: u32, file: &'static str) -> Location {
        Location::new(line, file)
    }

    #[test]
    fn leak_summary_orders_by_total_bytes() {
        let (tracker, log) = tracker(Config::new().leaks(true));
        tracker
            .track_alloc(0x10, 100, 100, 1, MemDesc::ARRAY_ELEMENTS, at(1, "a.chpl"))
            .unwrap();
        tracker
            .track_alloc(0x20, 50, 50, 1, MemDesc::ARRAY_ELEMENTS, at(2, "a.chpl"))
            .unwrap();
        tracker
            .track_alloc(0x30, 30, 30, 1, MemDesc::TASK_STACK, at(3, "a.chpl"))
            .unwrap();

        let summary = tracker.leak_summary().unwrap();
        let rows: Vec<(&str, u64, u64)> = summary
            .rows
            .iter()
            .map(|r| (r.label.as_str(), r.count, r.bytes))
            .collect();
        assert_eq!(rows, [("array elements", 2, 150), ("task stack", 1, 30)]);
        assert_eq!(summary.total_bytes(), 180);

        tracker.print_leak_summary().unwrap();
        let rule = "=".repeat(62);
        let expected = format!(
            "====================\n\
             Leaked Memory Report\n\
             {rule}\n\
             Number of leaked allocations\n\
             \x20          Total leaked memory (bytes)\n\
             \x20                     Description of allocation\n\
             {rule}\n\
             2          150        array elements\n\
             1          30         task stack\n\
             {rule}\n"
        );
        assert_eq!(log.contents(), expected);
    }

    #[test]
    fn leak_summary_ties_keep_category_order() {
        let (tracker, _) = tracker(Config::new().track(true));
        tracker
            .track_alloc(0x10, 64, 64, 1, MemDesc::IO_BUFFER, Location::UNKNOWN)
            .unwrap();
        tracker
            .track_alloc(0x20, 64, 64, 1, MemDesc::RUNTIME_DATA, Location::UNKNOWN)
            .unwrap();
        tracker
            .track_alloc(0x30, 64, 64, 1, MemDesc(999), Location::UNKNOWN)
            .unwrap();

        let descs: Vec<MemDesc> = tracker
            .leak_summary()
            .unwrap()
            .rows
            .iter()
            .map(|r| r.desc)
            .collect();
        assert_eq!(
            descs,
            [MemDesc::UNKNOWN, MemDesc::RUNTIME_DATA, MemDesc::IO_BUFFER]
        );
    }

    #[test]
    fn live_table_sorts_by_label_file_and_line() {
        let mut descs = RuntimeDescriptors::new();
        let x = descs.register("X");
        let y = descs.register("Y");
        let tracker = MemTracker::with_collaborators(
            Config::new().track(true).log(LogDestination::Writer(Box::new(CaptureBuffer::new()))),
            Arc::new(crate::lib_on::comm::SingleLocale),
            Arc::new(descs),
        )
        .unwrap();

        tracker.track_alloc(0x1, 8, 1, 8, y, at(1, "a.c")).unwrap();
        tracker.track_alloc(0x2, 8, 1, 8, x, at(10, "a.c")).unwrap();
        tracker.track_alloc(0x3, 8, 1, 8, x, at(5, "a.c")).unwrap();

        let table = tracker.live_table(0, Location::UNKNOWN).unwrap();
        let order: Vec<(&str, u32)> = table
            .rows
            .iter()
            .map(|r| (r.label.as_str(), r.location.line))
            .collect();
        assert_eq!(order, [("X", 5), ("X", 10), ("Y", 1)]);
    }

    #[test]
    fn live_table_threshold_is_inclusive() {
        let (tracker, _) = tracker(Config::new().track(true));
        tracker
            .track_alloc(0x1, 16, 2, 8, MemDesc::UNKNOWN, Location::UNKNOWN)
            .unwrap();
        tracker
            .track_alloc(0x2, 32, 4, 8, MemDesc::UNKNOWN, Location::UNKNOWN)
            .unwrap();

        assert_eq!(tracker.live_table(16, Location::UNKNOWN).unwrap().rows.len(), 2);
        assert_eq!(tracker.live_table(17, Location::UNKNOWN).unwrap().rows.len(), 1);
    }

    #[test]
    fn live_table_layout() {
        let (tracker, log) = tracker(Config::new().track(true));
        tracker
            .track_alloc(0x1f40, 64, 8, 8, MemDesc::TASK_STACK, at(12, "tasks.chpl"))
            .unwrap();
        tracker
            .track_alloc(0x2000, 24, 3, 8, MemDesc::IO_BUFFER, Location::UNKNOWN)
            .unwrap();

        tracker.print_mem_table(0, Location::UNKNOWN).unwrap();

        let rule = "=".repeat(24 + 36 + 33 + 20);
        let header = format!(
            "{:<33}{:<9}{:<9}{:<9}{:<33}{:<20}",
            "Allocated Memory (Bytes)", "Number", "Size", "Total", "Description", "Address"
        );
        let io = format!(
            "{:<33}{:<9}{:<9}{:<9}{:<33}{:<20}",
            "--", 3, 8, 24, "io buffer", "0x0000000000002000"
        );
        let stack = format!(
            "{:<33}{:<9}{:<9}{:<9}{:<33}{:<20}",
            "tasks.chpl:12", 8, 8, 64, "task stack", "0x0000000000001f40"
        );
        assert_eq!(
            log.contents(),
            format!("{rule}\n{header}\n{rule}\n{io}\n{stack}\n{rule}\n\n")
        );
    }

    #[test]
    fn long_filenames_widen_the_location_column() {
        let (tracker, _) = tracker(Config::new().track(true));
        let file = "a/rather/long/path/to/some/module/file.chpl";
        tracker
            .track_alloc(0x1, 8, 1, 8, MemDesc::UNKNOWN, at(3, file))
            .unwrap();
        assert_eq!(
            tracker.live_table(0, Location::UNKNOWN).unwrap().filename_width,
            file.len()
        );
    }

    #[test]
    fn non_ascii_filenames_keep_columns_aligned() {
        let (tracker, log) = tracker(Config::new().track(true));
        let file = "modèles/données/épreuve_de_compilation.chpl";
        tracker
            .track_alloc(0x1, 8, 1, 8, MemDesc::UNKNOWN, at(3, file))
            .unwrap();

        let table = tracker.live_table(0, Location::UNKNOWN).unwrap();
        assert_eq!(table.filename_width, file.chars().count());
        assert!(table.filename_width < file.len());

        tracker.print_mem_table(0, Location::UNKNOWN).unwrap();
        let text = log.contents();
        let lines: Vec<&str> = text.lines().collect();
        let header_number = lines[1].chars().position(|c| c == 'N').unwrap();
        let row_number = lines[3].chars().position(|c| c == ' ').unwrap();
        assert_eq!(row_number, file.chars().count() + ":3".len());
        assert_eq!(
            lines[3].chars().nth(header_number),
            Some('1'),
            "columns misaligned:\n{text}"
        );
        assert_eq!(lines[0].chars().count(), lines[3].chars().count());
    }

    #[test]
    fn single_locale_statistics() {
        let (tracker, log) = tracker(Config::new().stats(true));
        tracker
            .track_alloc(0x1, 400, 50, 8, MemDesc::UNKNOWN, Location::UNKNOWN)
            .unwrap();
        tracker
            .track_alloc(0x2, 100, 100, 1, MemDesc::UNKNOWN, Location::UNKNOWN)
            .unwrap();
        tracker.track_free(0x1, Location::UNKNOWN).unwrap();

        tracker.print_mem_stat(Location::UNKNOWN).unwrap();
        let rule = "=".repeat(62);
        assert_eq!(
            log.contents(),
            format!(
                "=================\n\
                 Memory Statistics\n\
                 {rule}\n\
                 Current Allocated Memory               100\n\
                 Maximum Simultaneous Allocated Memory  500\n\
                 Total Allocated Memory                 500\n\
                 Total Freed Memory                     400\n\
                 {rule}\n"
            )
        );
    }

    #[test]
    fn multi_locale_statistics_reads_every_locale() {
        let logs: Vec<CaptureBuffer> = (0..2).map(|_| CaptureBuffer::new()).collect();
        let cluster = LocaleCluster::new(2, Arc::new(RuntimeDescriptors::new()), |id| {
            Config::new()
                .stats(true)
                .log(LogDestination::Writer(Box::new(logs[id as usize].clone())))
        })
        .unwrap();
        cluster
            .locale(0)
            .track_alloc(0x10, 1000, 1000, 1, MemDesc::UNKNOWN, Location::UNKNOWN)
            .unwrap();
        cluster
            .locale(1)
            .track_alloc(0x10, 2000, 1000, 2, MemDesc::UNKNOWN, Location::UNKNOWN)
            .unwrap();

        let before: Vec<_> = cluster.locales().iter().map(|t| t.snapshot().unwrap()).collect();
        let report = cluster.locale(0).statistics(Location::UNKNOWN).unwrap();
        assert!(report.multi_locale);
        let current: Vec<(u32, u64)> = report
            .rows
            .iter()
            .map(|r| (r.locale, r.counters.current))
            .collect();
        assert_eq!(current, [(0, 1000), (1, 2000)]);

        let after: Vec<_> = cluster.locales().iter().map(|t| t.snapshot().unwrap()).collect();
        assert_eq!(before, after);

        cluster.locale(1).print_mem_stat(Location::UNKNOWN).unwrap();
        let text = logs[1].contents();
        assert!(text.contains("\n0          1000       1000       1000       0        \n"));
        assert!(text.contains("\n1          2000       2000       2000       0        \n"));
    }

    #[test]
    fn reports_require_tracking() {
        let (tracker, _) = tracker(Config::new());
        assert!(matches!(
            tracker.print_mem_stat(at(4, "main.chpl")),
            Err(MemTrackError::TrackingDisabled {
                operation: "printMemStat()",
                ..
            })
        ));
        assert!(matches!(
            tracker.print_mem_table(0, at(5, "main.chpl")),
            Err(MemTrackError::TrackingDisabled {
                operation: "printMemTable()",
                ..
            })
        ));
    }

    #[test]
    fn shutdown_writes_enabled_sections_in_order() {
        let (tracker, log) = tracker(Config::new().stats(true).leaks(true).leaks_table(true));
        tracker
            .track_alloc(0x40, 96, 12, 8, MemDesc::LOCALE_DATA, at(9, "m.chpl"))
            .unwrap();

        tracker.report_at_shutdown().unwrap();
        let text = log.contents();
        let stats = text.find("Memory Statistics").unwrap();
        let leaks = text.find("Leaked Memory Report").unwrap();
        let table = text.find("Allocated Memory (Bytes)").unwrap();
        assert!(stats < leaks && leaks < table);
        assert!(text.starts_with("\n=================\n"));

        assert!(matches!(
            tracker.report_at_shutdown(),
            Err(MemTrackError::AlreadyShutDown)
        ));
        assert_eq!(log.contents(), text);
    }

    #[test]
    fn shutdown_without_reports_writes_nothing() {
        let (tracker, log) = tracker(Config::new().track(true));
        tracker
            .track_alloc(0x40, 96, 12, 8, MemDesc::LOCALE_DATA, Location::UNKNOWN)
            .unwrap();
        tracker.report_at_shutdown().unwrap();
        assert_eq!(log.contents(), "");
    }

    #[test]
    fn shutdown_appends_leak_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaks.log");
        let run_info = RunInfo {
            compile_command: "chpl hello.chpl".to_string(),
            execution_command: "./hello --memLeaks".to_string(),
        };

        for _ in 0..2 {
            let (tracker, _) = tracker(
                Config::new()
                    .leaks_log(&path)
                    .run_info(run_info.clone()),
            );
            tracker
                .track_alloc(0x40, 96, 12, 8, MemDesc::LOCALE_DATA, Location::UNKNOWN)
                .unwrap();
            tracker.report_at_shutdown().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Compiler Command : chpl hello.chpl\n").count(), 2);
        assert_eq!(
            text.matches("Execution Command: ./hello --memLeaks\n\n").count(),
            2
        );
        assert!(text.starts_with("\nCompiler Command"));
        assert_eq!(text.matches("1          96         locale data\n").count(), 2);
    }
}

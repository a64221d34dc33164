use parking_lot::Mutex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::comm::{Comm, SingleLocale};
use super::ledger::{Entry, Ledger, MemCounters};
use crate::config::{Config, Format, RunInfo};
use crate::desc::{DescriptorTable, MemDesc, RuntimeDescriptors};
use crate::error::{Location, MemTrackError, Result};
use crate::output_on::LogSink;

/// An address in a verbose line, `(nil)` when null.
struct Pointer(usize);

impl std::fmt::Display for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            0 => f.write_str("(nil)"),
            address => write!(f, "{:#x}", address),
        }
    }
}

/// Memory tracking context for one locale.
///
/// Owns the allocation ledger, the aggregate counters and the log sink. All
/// ledger and counter mutation goes through one mutex; reports take it only
/// while scanning and release it before formatting.
///
/// # Examples
///
/// ```rust
/// use memtrack::{Config, Location, MemDesc, MemTracker};
///
/// let tracker = MemTracker::new(Config::new().track(true)).unwrap();
/// let here = Location::new(line!(), file!());
///
/// tracker.track_alloc(0x1000, 256, 32, 8, MemDesc::ARRAY_ELEMENTS, here).unwrap();
/// assert_eq!(tracker.current_bytes_used(here).unwrap(), 256);
///
/// tracker.track_free(0x1000, here).unwrap();
/// assert_eq!(tracker.current_bytes_used(here).unwrap(), 0);
/// ```
pub struct MemTracker {
    ledger: Option<Mutex<Ledger>>,
    stats: bool,
    leaks: bool,
    leaks_table: bool,
    threshold: u64,
    verbose: AtomicBool,
    sink: Mutex<LogSink>,
    leaks_log: Option<PathBuf>,
    format: Format,
    run_info: RunInfo,
    comm: Arc<dyn Comm>,
    descs: Arc<dyn DescriptorTable>,
    shut_down: AtomicBool,
}

impl MemTracker {
    /// Configure a single-locale tracker with the built-in categories.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_collaborators(
            config,
            Arc::new(SingleLocale),
            Arc::new(RuntimeDescriptors::new()),
        )
    }

    /// Configure a tracker that reports through `comm` and labels categories
    /// through `descs`.
    pub fn with_collaborators(
        config: Config,
        comm: Arc<dyn Comm>,
        descs: Arc<dyn DescriptorTable>,
    ) -> Result<Self> {
        let tracking = config.tracking_enabled();
        let ledger = if tracking {
            Some(Mutex::new(Ledger::new(config.max)?))
        } else {
            None
        };
        let sink = LogSink::open(config.log, comm.locale_id(), comm.num_locales())?;

        tracing::info!(
            locale = comm.locale_id(),
            tracking,
            stats = config.stats,
            leaks = config.leaks,
            leaks_table = config.leaks_table,
            max = config.max,
            threshold = config.threshold,
            "memory tracking configured"
        );

        Ok(Self {
            ledger,
            stats: config.stats,
            leaks: config.leaks,
            leaks_table: config.leaks_table,
            threshold: config.threshold,
            verbose: AtomicBool::new(config.verbose),
            sink: Mutex::new(sink),
            leaks_log: config.leaks_log,
            format: config.format,
            run_info: config.run_info,
            comm,
            descs,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn tracking_enabled(&self) -> bool {
        self.ledger.is_some()
    }

    pub fn locale_id(&self) -> u32 {
        self.comm.locale_id()
    }

    pub fn num_locales(&self) -> u32 {
        self.comm.num_locales()
    }

    pub fn descriptors(&self) -> &dyn DescriptorTable {
        self.descs.as_ref()
    }

    /// Record an allocation of `count` elements of `size` bytes at `address`.
    ///
    /// Events of at most the configured threshold (`chunk`) are ignored.
    pub fn track_alloc(
        &self,
        address: usize,
        chunk: u64,
        count: u64,
        size: u64,
        desc: MemDesc,
        location: Location,
    ) -> Result<()> {
        if chunk <= self.threshold {
            return Ok(());
        }
        if let Some(ledger) = &self.ledger {
            ledger.lock().insert(Entry {
                address,
                count,
                size,
                desc,
                location,
            })?;
        }
        if self.is_verbose() {
            self.log_line(format_args!(
                "{}: {}: allocate {}B of {} at {}",
                self.locale_id(),
                location,
                count.saturating_mul(size),
                self.descs.label(desc),
                Pointer(address)
            ));
        }
        Ok(())
    }

    /// Retract the allocation at `address`.
    ///
    /// Freeing an address that is not in the ledger is not an error.
    pub fn track_free(&self, address: usize, location: Location) -> Result<()> {
        match &self.ledger {
            Some(ledger) => {
                let removed = ledger.lock().remove(address, location)?;
                if let Some(entry) = removed {
                    if self.is_verbose() {
                        self.log_line(format_args!(
                            "{}: {}: free {}B of {} at {}",
                            self.locale_id(),
                            location,
                            entry.chunk(),
                            self.descs.label(entry.desc),
                            Pointer(address)
                        ));
                    }
                }
            }
            None => {
                if self.is_verbose() {
                    self.log_line(format_args!(
                        "{}: {}: free at {}",
                        self.locale_id(),
                        location,
                        Pointer(address)
                    ));
                }
            }
        }
        Ok(())
    }

    /// First half of a reallocation: retract the old entry for `address`.
    ///
    /// The threshold is checked against the new requested size; an old entry
    /// below the threshold was never recorded in the first place.
    pub fn track_realloc_pre(
        &self,
        address: usize,
        count: u64,
        size: u64,
        _desc: MemDesc,
        location: Location,
    ) -> Result<()> {
        if address == 0 || count.saturating_mul(size) <= self.threshold {
            return Ok(());
        }
        if let Some(ledger) = &self.ledger {
            ledger.lock().remove(address, location)?;
        }
        Ok(())
    }

    /// Second half of a reallocation: record the allocation at `new_address`.
    #[allow(clippy::too_many_arguments)]
    pub fn track_realloc_post(
        &self,
        new_address: usize,
        new_chunk: u64,
        old_address: usize,
        count: u64,
        size: u64,
        desc: MemDesc,
        location: Location,
    ) -> Result<()> {
        if new_chunk <= self.threshold {
            return Ok(());
        }
        if let Some(ledger) = &self.ledger {
            ledger.lock().insert(Entry {
                address: new_address,
                count,
                size,
                desc,
                location,
            })?;
        }
        if self.is_verbose() {
            self.log_line(format_args!(
                "{}: {}: reallocate {}B of {} at {} -> {}",
                self.locale_id(),
                location,
                count.saturating_mul(size),
                self.descs.label(desc),
                Pointer(old_address),
                Pointer(new_address)
            ));
        }
        Ok(())
    }

    /// Bytes currently live on this locale.
    pub fn current_bytes_used(&self, location: Location) -> Result<u64> {
        Ok(self.snapshot_at("memoryUsed()", location)?.current)
    }

    /// Copy of this locale's counters.
    pub fn snapshot(&self) -> Result<MemCounters> {
        self.snapshot_at("snapshot()", Location::UNKNOWN)
    }

    pub(crate) fn snapshot_at(
        &self,
        operation: &'static str,
        location: Location,
    ) -> Result<MemCounters> {
        Ok(self.ledger(operation, location)?.lock().counters())
    }

    /// Counters as seen by a peer; all zero when tracking is off.
    pub(crate) fn counters_or_zero(&self) -> MemCounters {
        self.ledger
            .as_ref()
            .map(|ledger| ledger.lock().counters())
            .unwrap_or_default()
    }

    /// Copy of every live entry, in table order.
    pub fn live_entries(&self) -> Result<Vec<Entry>> {
        let ledger = self.ledger("live_entries()", Location::UNKNOWN)?;
        let guard = ledger.lock();
        Ok(guard.iter().cloned().collect())
    }

    pub(crate) fn ledger(
        &self,
        operation: &'static str,
        location: Location,
    ) -> Result<&Mutex<Ledger>> {
        self.ledger
            .as_ref()
            .ok_or(MemTrackError::TrackingDisabled {
                operation,
                location,
            })
    }

    /// Turn verbose event logging on for every locale.
    pub fn start_verbose_mem(&self) {
        self.start_verbose_mem_here();
        self.comm.broadcast_verbose(true);
    }

    /// Turn verbose event logging off for every locale.
    pub fn stop_verbose_mem(&self) {
        self.stop_verbose_mem_here();
        self.comm.broadcast_verbose(false);
    }

    /// Turn verbose event logging on for this locale only.
    pub fn start_verbose_mem_here(&self) {
        self.set_verbose_here(true);
    }

    /// Turn verbose event logging off for this locale only.
    pub fn stop_verbose_mem_here(&self) {
        self.set_verbose_here(false);
    }

    pub(crate) fn set_verbose_here(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    fn log_line(&self, args: std::fmt::Arguments<'_>) {
        let mut sink = self.sink.lock();
        if let Err(e) = writeln!(sink, "{}", args) {
            tracing::warn!(error = %e, "failed to write verbose memory log line");
        }
    }

    pub(crate) fn sink(&self) -> &Mutex<LogSink> {
        &self.sink
    }

    pub(crate) fn comm(&self) -> &dyn Comm {
        self.comm.as_ref()
    }

    pub(crate) fn report_flags(&self) -> (bool, bool, bool) {
        (self.stats, self.leaks, self.leaks_table)
    }

    pub(crate) fn format(&self) -> Format {
        self.format
    }

    pub(crate) fn leaks_log(&self) -> Option<&PathBuf> {
        self.leaks_log.as_ref()
    }

    pub(crate) fn run_info(&self) -> &RunInfo {
        &self.run_info
    }

    /// Mark the end-of-run report as written; false if it already was.
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shut_down.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogDestination;
    use crate::output::CaptureBuffer;

    fn here() -> Location {
        Location::new(7, "tracker.chpl")
    }

    fn tracker(config: Config) -> (MemTracker, CaptureBuffer) {
        let log = CaptureBuffer::new();
        let tracker = MemTracker::new(config.log(LogDestination::Writer(Box::new(log.clone()))))
            .unwrap();
        (tracker, log)
    }

    #[test]
    fn threshold_is_exclusive() {
        let (tracker, _) = tracker(Config::new().track(true).threshold(64));

        tracker
            .track_alloc(0x100, 64, 8, 8, MemDesc::IO_BUFFER, here())
            .unwrap();
        assert_eq!(tracker.snapshot().unwrap(), MemCounters::default());

        tracker
            .track_alloc(0x200, 65, 65, 1, MemDesc::IO_BUFFER, here())
            .unwrap();
        assert_eq!(tracker.snapshot().unwrap().current, 65);
        assert_eq!(tracker.live_entries().unwrap().len(), 1);
    }

    #[test]
    fn disabled_tracking_rejects_queries() {
        let (tracker, _) = tracker(Config::new());
        assert!(!tracker.tracking_enabled());

        tracker
            .track_alloc(0x100, 16, 2, 8, MemDesc::UNKNOWN, here())
            .unwrap();
        let err = tracker.current_bytes_used(here()).unwrap_err();
        assert!(matches!(
            err,
            MemTrackError::TrackingDisabled {
                operation: "memoryUsed()",
                ..
            }
        ));
        assert_eq!(tracker.counters_or_zero(), MemCounters::default());
    }

    #[test]
    fn realloc_moves_the_entry() {
        let (tracker, _) = tracker(Config::new().track(true));

        tracker
            .track_alloc(0x1000, 80, 10, 8, MemDesc::ARRAY_ELEMENTS, here())
            .unwrap();
        tracker
            .track_realloc_pre(0x1000, 20, 8, MemDesc::ARRAY_ELEMENTS, here())
            .unwrap();
        tracker
            .track_realloc_post(0x2000, 160, 0x1000, 20, 8, MemDesc::ARRAY_ELEMENTS, here())
            .unwrap();

        let entries = tracker.live_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, 0x2000);
        assert_eq!(entries[0].chunk(), 160);

        let counters = tracker.snapshot().unwrap();
        assert_eq!(counters.current, 160);
        assert_eq!(counters.allocated, 240);
        assert_eq!(counters.freed, 80);
    }

    #[test]
    fn realloc_pre_checks_the_new_size() {
        let (tracker, _) = tracker(Config::new().track(true).threshold(100));

        tracker
            .track_alloc(0x1000, 200, 25, 8, MemDesc::ARRAY_ELEMENTS, here())
            .unwrap();
        // Shrinking below the threshold leaves the old entry alone.
        tracker
            .track_realloc_pre(0x1000, 10, 8, MemDesc::ARRAY_ELEMENTS, here())
            .unwrap();
        assert_eq!(tracker.snapshot().unwrap().current, 200);

        tracker
            .track_realloc_pre(0, 50, 8, MemDesc::ARRAY_ELEMENTS, here())
            .unwrap();
        assert_eq!(tracker.snapshot().unwrap().current, 200);
    }

    #[test]
    fn verbose_lines() {
        let (tracker, log) = tracker(Config::new().track(true));
        tracker.start_verbose_mem_here();

        tracker
            .track_alloc(0x1f40, 64, 8, 8, MemDesc::TASK_STACK, here())
            .unwrap();
        tracker
            .track_realloc_post(0x2f40, 128, 0x1f40, 16, 8, MemDesc::TASK_STACK, here())
            .unwrap();
        tracker.track_free(0x2f40, here()).unwrap();
        tracker.track_free(0xdead, here()).unwrap();

        let text = log.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "0: tracker.chpl:7: allocate 64B of task stack at 0x1f40",
                "0: tracker.chpl:7: reallocate 128B of task stack at 0x1f40 -> 0x2f40",
                "0: tracker.chpl:7: free 128B of task stack at 0x2f40",
            ]
        );
    }

    #[test]
    fn verbose_null_old_address_is_nil() {
        let (tracker, log) = tracker(Config::new().track(true).verbose(true));

        tracker
            .track_realloc_pre(0, 4, 8, MemDesc::ARRAY_ELEMENTS, here())
            .unwrap();
        tracker
            .track_realloc_post(0x3000, 32, 0, 4, 8, MemDesc::ARRAY_ELEMENTS, here())
            .unwrap();

        assert_eq!(
            log.contents(),
            "0: tracker.chpl:7: reallocate 32B of array elements at (nil) -> 0x3000\n"
        );
        assert_eq!(tracker.snapshot().unwrap().current, 32);
    }

    #[test]
    fn verbose_without_tracking_logs_bare_frees() {
        let (tracker, log) = tracker(Config::new().verbose(true));

        tracker
            .track_alloc(0x10, 32, 4, 8, MemDesc::IO_BUFFER, Location::UNKNOWN)
            .unwrap();
        tracker.track_free(0x10, Location::UNKNOWN).unwrap();
        tracker.stop_verbose_mem_here();
        tracker.track_free(0x20, Location::UNKNOWN).unwrap();

        assert_eq!(
            log.contents(),
            "0: --:0: allocate 32B of io buffer at 0x10\n0: --:0: free at 0x10\n"
        );
    }

    #[test]
    fn ceiling_failure_leaves_state_untouched() {
        let (tracker, log) = tracker(Config::new().max(100).verbose(true));

        tracker
            .track_alloc(0x10, 100, 100, 1, MemDesc::UNKNOWN, here())
            .unwrap();
        let err = tracker
            .track_alloc(0x20, 1, 1, 1, MemDesc::UNKNOWN, here())
            .unwrap_err();
        assert!(matches!(err, MemTrackError::CeilingExceeded { .. }));
        assert_eq!(err.location(), Some(here()));
        assert_eq!(tracker.snapshot().unwrap().current, 100);
        assert_eq!(log.contents().lines().count(), 1);
    }
}

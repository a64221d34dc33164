pub(crate) mod comm;
pub(crate) mod ledger;
pub(crate) mod report;
pub(crate) mod tracker;

pub use comm::{ClusterComm, Comm, LocaleCluster, SingleLocale};
pub use ledger::{Entry, MemCounters};
pub use report::{LeakRow, LeakSummary, LiveRow, LiveTable, LocaleCounters, StatisticsReport};
pub use tracker::MemTracker;

use arc_swap::ArcSwapOption;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::config::Config;
use crate::desc::{DescriptorTable, MemDesc};
use crate::error::{fatal, fatal_message, Location, MemTrackError, Result};
use crate::output_on::{reporter_for, Reporter};

pub(crate) static MEMTRACK_STATE: OnceLock<ArcSwapOption<MemTracker>> = OnceLock::new();

/// Anything that identifies an allocation by address.
///
/// The address is only used as a key; it is never dereferenced.
pub trait Address {
    fn as_address(self) -> usize;
}

impl Address for usize {
    fn as_address(self) -> usize {
        self
    }
}

impl<T: ?Sized> Address for *const T {
    fn as_address(self) -> usize {
        self.cast::<()>() as usize
    }
}

impl<T: ?Sized> Address for *mut T {
    fn as_address(self) -> usize {
        self.cast::<()>() as usize
    }
}

impl<T: ?Sized> Address for NonNull<T> {
    fn as_address(self) -> usize {
        self.as_ptr().as_address()
    }
}

/// Builder for the process-wide memory tracker.
///
/// The tracker is installed when the guard is built and the end-of-run report
/// is written when the guard is dropped. Events reported through the
/// `track_*!` macros while no guard is alive are ignored.
///
/// # Examples
///
/// ```rust
/// # #[cfg(not(feature = "memtrack-off"))]
/// # {
/// use memtrack::{Config, GuardBuilder, MemDesc};
///
/// let _guard = GuardBuilder::new(Config::new().stats(true).leaks(true)).build();
///
/// let buffer = vec![0u8; 4096];
/// memtrack::track_alloc!(buffer.as_ptr(), 4096, 4096, 1, MemDesc::IO_BUFFER);
/// assert_eq!(memtrack::memory_used!(), 4096);
/// memtrack::track_free!(buffer.as_ptr());
/// # }
/// ```
///
/// # Limitations
///
/// Only one guard can be alive at a time. Building a second one panics.
pub struct GuardBuilder {
    config: Config,
    comm: Option<Arc<dyn Comm>>,
    descs: Option<Arc<dyn DescriptorTable>>,
    reporter: Option<Box<dyn Reporter>>,
}

impl GuardBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            comm: None,
            descs: None,
            reporter: None,
        }
    }

    /// Configuration from `MEMTRACK_*` environment variables, see
    /// [`Config::from_env`].
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    /// Communication layer to the other locales. Defaults to [`SingleLocale`].
    pub fn comm(mut self, comm: Arc<dyn Comm>) -> Self {
        self.comm = Some(comm);
        self
    }

    /// Category labels. Defaults to the built-in set.
    pub fn descriptors(mut self, descs: Arc<dyn DescriptorTable>) -> Self {
        self.descs = Some(descs);
        self
    }

    /// Custom end-of-run reporter, replacing the one picked by
    /// [`Config::format`].
    pub fn reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Install the tracker. A configuration error, such as a log file that
    /// cannot be created, terminates the process.
    pub fn build(self) -> MemTrackGuard {
        match self.try_build() {
            Ok(guard) => guard,
            Err(e) => fatal(&e),
        }
    }

    pub fn try_build(self) -> Result<MemTrackGuard> {
        let state = MEMTRACK_STATE.get_or_init(|| ArcSwapOption::from(None));
        if state.load().is_some() {
            panic!("More than one memtrack guard cannot be alive at the same time.");
        }

        let reporter = self
            .reporter
            .unwrap_or_else(|| reporter_for(self.config.format));
        let comm = self.comm.unwrap_or_else(|| Arc::new(SingleLocale));
        let descs = self
            .descs
            .unwrap_or_else(|| Arc::new(crate::desc::RuntimeDescriptors::new()));

        let tracker = Arc::new(MemTracker::with_collaborators(self.config, comm, descs)?);
        state.store(Some(Arc::clone(&tracker)));

        Ok(MemTrackGuard { tracker, reporter })
    }
}

/// Keeps the process-wide tracker installed; writes the end-of-run report on
/// drop.
pub struct MemTrackGuard {
    tracker: Arc<MemTracker>,
    reporter: Box<dyn Reporter>,
}

impl MemTrackGuard {
    pub fn tracker(&self) -> &Arc<MemTracker> {
        &self.tracker
    }
}

impl Drop for MemTrackGuard {
    fn drop(&mut self) {
        if let Err(e) = self
            .tracker
            .report_at_shutdown_with(self.reporter.as_ref())
        {
            eprintln!("Failed to report memory usage: {}", fatal_message(&e));
        }

        if let Some(state) = MEMTRACK_STATE.get() {
            state.store(None);
        }
    }
}

/// The installed tracker, if a guard is alive.
pub fn tracker() -> Option<Arc<MemTracker>> {
    MEMTRACK_STATE.get()?.load_full()
}

#[inline]
fn with_tracker<R>(f: impl FnOnce(&MemTracker) -> R) -> Option<R> {
    let state = MEMTRACK_STATE.get()?;
    let tracker = state.load();
    tracker.as_deref().map(f)
}

fn or_fatal<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => fatal(&e),
    }
}

fn required<T>(
    operation: &'static str,
    location: Location,
    f: impl FnOnce(&MemTracker) -> Result<T>,
) -> T {
    or_fatal(with_tracker(f).unwrap_or(Err(MemTrackError::TrackingDisabled {
        operation,
        location,
    })))
}

#[doc(hidden)]
pub fn __track_alloc(
    address: impl Address,
    chunk: u64,
    count: u64,
    size: u64,
    desc: MemDesc,
    location: Location,
) {
    let address = address.as_address();
    if let Some(result) =
        with_tracker(|t| t.track_alloc(address, chunk, count, size, desc, location))
    {
        or_fatal(result);
    }
}

#[doc(hidden)]
pub fn __track_free(address: impl Address, location: Location) {
    let address = address.as_address();
    if let Some(result) = with_tracker(|t| t.track_free(address, location)) {
        or_fatal(result);
    }
}

#[doc(hidden)]
pub fn __track_realloc_pre(
    address: impl Address,
    count: u64,
    size: u64,
    desc: MemDesc,
    location: Location,
) {
    let address = address.as_address();
    if let Some(result) =
        with_tracker(|t| t.track_realloc_pre(address, count, size, desc, location))
    {
        or_fatal(result);
    }
}

#[doc(hidden)]
pub fn __track_realloc_post(
    new_address: impl Address,
    new_chunk: u64,
    old_address: impl Address,
    count: u64,
    size: u64,
    desc: MemDesc,
    location: Location,
) {
    let (new_address, old_address) = (new_address.as_address(), old_address.as_address());
    if let Some(result) = with_tracker(|t| {
        t.track_realloc_post(new_address, new_chunk, old_address, count, size, desc, location)
    }) {
        or_fatal(result);
    }
}

#[doc(hidden)]
pub fn __memory_used(location: Location) -> u64 {
    required("memoryUsed()", location, |t| t.current_bytes_used(location))
}

#[doc(hidden)]
pub fn __print_mem_stat(location: Location) {
    required("printMemStat()", location, |t| t.print_mem_stat(location))
}

#[doc(hidden)]
pub fn __print_mem_table(threshold: u64, location: Location) {
    required("printMemTable()", location, |t| {
        t.print_mem_table(threshold, location)
    })
}

/// Write the leak summary of the installed tracker to its log.
pub fn print_leak_summary() {
    required("printLeakSummary()", Location::UNKNOWN, |t| {
        t.print_leak_summary()
    })
}

/// Turn verbose event logging on for every locale.
pub fn start_verbose_mem() {
    with_tracker(|t| t.start_verbose_mem());
}

/// Turn verbose event logging off for every locale.
pub fn stop_verbose_mem() {
    with_tracker(|t| t.stop_verbose_mem());
}

/// Turn verbose event logging on for this locale only.
pub fn start_verbose_mem_here() {
    with_tracker(|t| t.start_verbose_mem_here());
}

/// Turn verbose event logging off for this locale only.
pub fn stop_verbose_mem_here() {
    with_tracker(|t| t.stop_verbose_mem_here());
}

/// Record an allocation with the installed tracker.
///
/// `track_alloc!(address, chunk, count, size, desc)`; the call site's line
/// and file are captured. Exceeding the configured ceiling terminates the
/// process with a message naming the call site.
#[macro_export]
macro_rules! track_alloc {
    ($address:expr, $chunk:expr, $count:expr, $size:expr, $desc:expr) => {
        $crate::__track_alloc(
            $address,
            $chunk as u64,
            $count as u64,
            $size as u64,
            $desc,
            $crate::Location::new(line!(), file!()),
        )
    };
}

/// Retract an allocation from the installed tracker.
#[macro_export]
macro_rules! track_free {
    ($address:expr) => {
        $crate::__track_free($address, $crate::Location::new(line!(), file!()))
    };
}

/// First half of a reallocation: `track_realloc_pre!(address, count, size, desc)`.
#[macro_export]
macro_rules! track_realloc_pre {
    ($address:expr, $count:expr, $size:expr, $desc:expr) => {
        $crate::__track_realloc_pre(
            $address,
            $count as u64,
            $size as u64,
            $desc,
            $crate::Location::new(line!(), file!()),
        )
    };
}

/// Second half of a reallocation:
/// `track_realloc_post!(new_address, new_chunk, old_address, count, size, desc)`.
#[macro_export]
macro_rules! track_realloc_post {
    ($new_address:expr, $new_chunk:expr, $old_address:expr, $count:expr, $size:expr, $desc:expr) => {
        $crate::__track_realloc_post(
            $new_address,
            $new_chunk as u64,
            $old_address,
            $count as u64,
            $size as u64,
            $desc,
            $crate::Location::new(line!(), file!()),
        )
    };
}

/// Bytes currently live. Terminates the process if tracking is off.
#[macro_export]
macro_rules! memory_used {
    () => {
        $crate::__memory_used($crate::Location::new(line!(), file!()))
    };
}

/// Write the statistics report to the log.
#[macro_export]
macro_rules! print_mem_stat {
    () => {
        $crate::__print_mem_stat($crate::Location::new(line!(), file!()))
    };
}

/// Write every live entry of at least `threshold` bytes to the log.
#[macro_export]
macro_rules! print_mem_table {
    () => {
        $crate::print_mem_table!(0)
    };
    ($threshold:expr) => {
        $crate::__print_mem_table($threshold as u64, $crate::Location::new(line!(), file!()))
    };
}

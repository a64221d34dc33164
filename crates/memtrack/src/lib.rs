//! Allocation tracking for a distributed parallel runtime.
//!
//! Instrumented call sites report allocations, reallocations and frees to a
//! per-locale [`MemTracker`]. It keeps a ledger of live allocations keyed by
//! address together with running totals, enforces an optional ceiling on live
//! bytes, and writes statistics, a leak summary and a dump of the live table
//! on request or at the end of the run.
//!
//! Build the `memtrack-off` feature to compile every macro and guard in the
//! facade to a no-op.

pub mod config;
pub mod desc;
pub mod error;

pub use config::{Config, Format, LogDestination, RunInfo};
pub use desc::{DescriptorTable, MemDesc, RuntimeDescriptors, BUILTIN_LABELS};
pub use error::{fatal, Location, MemTrackError, Result};

pub(crate) mod output;
pub use output::{format_bytes, rule, CaptureBuffer};

cfg_if::cfg_if! {
    if #[cfg(feature = "memtrack-off")] {
        // All facade entry points compile to no-ops
        #[doc(inline)]
        pub use lib_off::*;
        mod lib_off;
    } else {
        #[doc(inline)]
        pub use lib_on::*;
        mod lib_on;

        pub mod json;
        pub(crate) mod output_on;
        pub use output_on::{JsonPrettyReporter, JsonReporter, MemReport, Reporter, TableReporter};
    }
}

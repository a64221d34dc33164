//! Allocation categories ("descriptors").
//!
//! Every tracked allocation carries a small integer tag describing what the
//! memory is for. The runtime ships a fixed set of built-in categories and
//! embedding code may register more on top of them; labels are only looked up
//! when a report or a verbose line is rendered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Small integer tag identifying the purpose of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemDesc(pub u32);

impl MemDesc {
    pub const UNKNOWN: MemDesc = MemDesc(0);
    pub const RUNTIME_DATA: MemDesc = MemDesc(1);
    pub const PROGRAM_DATA: MemDesc = MemDesc(2);
    pub const COMM_FORK_SEND: MemDesc = MemDesc(3);
    pub const COMM_FORK_SEND_LARGE: MemDesc = MemDesc(4);
    pub const COMM_FORK_RECV_INFO: MemDesc = MemDesc(5);
    pub const COMM_XFER_BUFFER: MemDesc = MemDesc(6);
    pub const TASK_DESCRIPTOR: MemDesc = MemDesc(7);
    pub const TASK_STACK: MemDesc = MemDesc(8);
    pub const TASK_LIST_ENTRY: MemDesc = MemDesc(9);
    pub const SYNC_AUX: MemDesc = MemDesc(10);
    pub const ARRAY_ELEMENTS: MemDesc = MemDesc(11);
    pub const LOCALE_DATA: MemDesc = MemDesc(12);
    pub const BROADCAST_BUFFER: MemDesc = MemDesc(13);
    pub const CONFIG_ARG: MemDesc = MemDesc(14);
    pub const IO_BUFFER: MemDesc = MemDesc(15);

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MemDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Labels of the built-in categories, indexed by [`MemDesc`] value.
pub const BUILTIN_LABELS: [&str; 16] = [
    "unknown",
    "chapel runtime code data",
    "chapel code data",
    "comm layer sent remote fork",
    "comm layer sent remote fork large",
    "comm layer received remote fork info",
    "comm layer transfer buffer",
    "task descriptor",
    "task stack",
    "task list entry",
    "sync variable auxiliary data",
    "array elements",
    "locale data",
    "private broadcast buffer",
    "config arg copy",
    "io buffer",
];

/// Category-to-label lookup owned by the embedding runtime.
///
/// `len()` is the number of known categories (built-in plus extensions);
/// valid tags are `0..len()`. Out-of-range tags render as the label of
/// [`MemDesc::UNKNOWN`].
pub trait DescriptorTable: Send + Sync {
    fn len(&self) -> usize;

    fn label(&self, desc: MemDesc) -> &str;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Built-in categories plus any labels registered by the embedding runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeDescriptors {
    extensions: Vec<String>,
}

impl RuntimeDescriptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension category and return its tag.
    ///
    /// Registering a label that is already known returns the existing tag.
    pub fn register(&mut self, label: impl Into<String>) -> MemDesc {
        let label = label.into();
        if let Some(desc) = self.lookup(&label) {
            return desc;
        }
        self.extensions.push(label);
        MemDesc((BUILTIN_LABELS.len() + self.extensions.len() - 1) as u32)
    }

    /// Find the tag whose label is exactly `label`.
    pub fn lookup(&self, label: &str) -> Option<MemDesc> {
        BUILTIN_LABELS
            .iter()
            .copied()
            .chain(self.extensions.iter().map(String::as_str))
            .position(|known| known == label)
            .map(|i| MemDesc(i as u32))
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

impl DescriptorTable for RuntimeDescriptors {
    fn len(&self) -> usize {
        BUILTIN_LABELS.len() + self.extensions.len()
    }

    fn label(&self, desc: MemDesc) -> &str {
        let i = desc.index();
        if i < BUILTIN_LABELS.len() {
            BUILTIN_LABELS[i]
        } else {
            self.extensions
                .get(i - BUILTIN_LABELS.len())
                .map(String::as_str)
                .unwrap_or(BUILTIN_LABELS[MemDesc::UNKNOWN.index()])
        }
    }
}

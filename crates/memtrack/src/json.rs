//! JSON form of the end-of-run memory report.
//!
//! Emitted by the JSON reporters and read back by the `memtrack` CLI and by
//! tests that parse a run's output.

use serde::{Deserialize, Serialize};

use crate::desc::MemDesc;
use crate::lib_on::ledger::MemCounters;
use crate::output_on::MemReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemReportJson {
    pub locale: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Vec<LocaleCountersJson>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaks: Option<Vec<LeakRowJson>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Vec<LiveRowJson>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleCountersJson {
    pub locale: u32,
    #[serde(flatten)]
    pub counters: MemCounters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakRowJson {
    pub desc: MemDesc,
    pub label: String,
    pub count: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRowJson {
    pub file: Option<String>,
    pub line: u32,
    pub count: u64,
    pub size: u64,
    pub total: u64,
    pub label: String,
    /// Hexadecimal, `0x` prefixed.
    pub address: String,
}

impl From<&MemReport> for MemReportJson {
    fn from(report: &MemReport) -> Self {
        Self {
            locale: report.locale,
            statistics: report.statistics.as_ref().map(|stats| {
                stats
                    .rows
                    .iter()
                    .map(|row| LocaleCountersJson {
                        locale: row.locale,
                        counters: row.counters,
                    })
                    .collect()
            }),
            leaks: report.leaks.as_ref().map(|leaks| {
                leaks
                    .rows
                    .iter()
                    .map(|row| LeakRowJson {
                        desc: row.desc,
                        label: row.label.clone(),
                        count: row.count,
                        bytes: row.bytes,
                    })
                    .collect()
            }),
            table: report.table.as_ref().map(|table| {
                table
                    .rows
                    .iter()
                    .map(|row| LiveRowJson {
                        file: row.location.file.map(str::to_string),
                        line: row.location.line,
                        count: row.count,
                        size: row.size,
                        total: row.total,
                        label: row.label.clone(),
                        address: format!("{:#x}", row.address),
                    })
                    .collect()
            }),
        }
    }
}

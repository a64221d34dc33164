use clap::Parser;
use colored::Colorize;
use eyre::{bail, Result, WrapErr};
use memtrack::{
    fatal, format_bytes, Config, Format, LocaleCluster, Location, LogDestination, MemDesc,
    RunInfo, RuntimeDescriptors,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
pub struct ReplayArgs {
    #[arg(help = "JSON-lines trace, one event per line")]
    pub trace: PathBuf,

    #[arg(long, default_value_t = 1, help = "Number of simulated locales")]
    pub locales: u32,

    #[arg(long, help = "Track allocations in the ledger")]
    pub mem_track: bool,

    #[arg(long, help = "Print memory statistics at the end of the run")]
    pub mem_stats: bool,

    #[arg(long, help = "Print the leak summary at the end of the run")]
    pub mem_leaks: bool,

    #[arg(long, help = "Print every live allocation at the end of the run")]
    pub mem_leaks_table: bool,

    #[arg(long, default_value_t = 0, help = "Maximum live bytes per locale, 0 for no limit")]
    pub mem_max: u64,

    #[arg(long, default_value_t = 0, help = "Ignore events of at most this many bytes")]
    pub mem_threshold: u64,

    #[arg(long, default_value = "", help = "Memory log file, suffixed with the locale id on multi-locale runs")]
    pub mem_log: String,

    #[arg(long, default_value = "", help = "File the statistics and leak summary are appended to")]
    pub mem_leaks_log: String,

    #[arg(long, help = "Log every event")]
    pub verbose_mem: bool,

    #[arg(long, help = "Print the end-of-run report as JSON")]
    pub json: bool,
}

/// One line of a trace.
#[derive(Debug, Deserialize, PartialEq)]
struct TraceEvent {
    #[serde(default)]
    locale: u32,
    #[serde(flatten)]
    op: TraceOp,
    #[serde(default)]
    line: u32,
    #[serde(default)]
    file: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
enum TraceOp {
    Alloc {
        addr: usize,
        count: u64,
        size: u64,
        #[serde(default)]
        desc: DescRef,
    },
    Free {
        addr: usize,
    },
    Realloc {
        old_addr: usize,
        addr: usize,
        count: u64,
        size: u64,
        #[serde(default)]
        desc: DescRef,
    },
}

/// Category given either by tag or by label.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum DescRef {
    Tag(u32),
    Label(String),
}

impl Default for DescRef {
    fn default() -> Self {
        DescRef::Tag(MemDesc::UNKNOWN.0)
    }
}

impl ReplayArgs {
    pub fn run(&self) -> Result<()> {
        let text = fs::read_to_string(&self.trace)
            .wrap_err_with(|| format!("failed to read trace {}", self.trace.display()))?;
        let events = parse_trace(&text)?;

        if self.locales == 0 {
            bail!("--locales must be at least 1");
        }
        if let Some((n, event)) = events
            .iter()
            .enumerate()
            .find(|(_, e)| e.locale >= self.locales)
        {
            bail!(
                "trace line {} targets locale {} but only {} locales are simulated",
                n + 1,
                event.locale,
                self.locales
            );
        }

        let mut descs = RuntimeDescriptors::new();
        let desc_tags = resolve_descs(&events, &mut descs);

        let cluster = LocaleCluster::new(self.locales, Arc::new(descs), |_| self.config())
            .wrap_err("failed to configure memory tracking")?;

        let mut files: HashMap<String, &'static str> = HashMap::new();
        for (event, desc) in events.iter().zip(desc_tags) {
            let location = match &event.file {
                Some(file) => Location::new(event.line, intern(&mut files, file)),
                None => Location {
                    line: event.line,
                    file: None,
                },
            };
            let tracker = cluster.locale(event.locale);

            let result = match event.op {
                TraceOp::Alloc {
                    addr, count, size, ..
                } => tracker.track_alloc(addr, count.saturating_mul(size), count, size, desc, location),
                TraceOp::Free { addr } => tracker.track_free(addr, location),
                TraceOp::Realloc {
                    old_addr,
                    addr,
                    count,
                    size,
                    ..
                } => tracker
                    .track_realloc_pre(old_addr, count, size, desc, location)
                    .and_then(|_| {
                        tracker.track_realloc_post(
                            addr,
                            count.saturating_mul(size),
                            old_addr,
                            count,
                            size,
                            desc,
                            location,
                        )
                    }),
            };
            if let Err(e) = result {
                fatal(&e);
            }
        }

        let mut live = 0;
        for tracker in cluster.locales() {
            live += tracker.snapshot().map(|c| c.current).unwrap_or(0);
            tracker
                .report_at_shutdown()
                .wrap_err_with(|| format!("end-of-run report of locale {} failed", tracker.locale_id()))?;
        }

        eprintln!(
            "{} replayed {} events across {} locale(s), {} live",
            "[memtrack]".blue().bold(),
            events.len(),
            self.locales,
            format_bytes(live).yellow().bold()
        );
        Ok(())
    }

    fn config(&self) -> Config {
        let mut config = Config::new()
            .track(self.mem_track)
            .stats(self.mem_stats)
            .leaks(self.mem_leaks)
            .leaks_table(self.mem_leaks_table)
            .max(self.mem_max)
            .threshold(self.mem_threshold)
            .log(LogDestination::from_path(&self.mem_log))
            .leaks_log(&self.mem_leaks_log)
            .verbose(self.verbose_mem)
            .run_info(RunInfo {
                compile_command: String::new(),
                execution_command: format!("memtrack replay {}", self.trace.display()),
            });
        if self.json {
            config = config.format(Format::Json);
        }
        config
    }
}

fn parse_trace(text: &str) -> Result<Vec<TraceEvent>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|(n, line)| {
            serde_json::from_str(line).wrap_err_with(|| format!("invalid trace line {}", n + 1))
        })
        .collect()
}

/// Category tag of every event, registering labels the runtime does not know.
fn resolve_descs(events: &[TraceEvent], descs: &mut RuntimeDescriptors) -> Vec<MemDesc> {
    events
        .iter()
        .map(|event| match &event.op {
            TraceOp::Alloc { desc, .. } | TraceOp::Realloc { desc, .. } => match desc {
                DescRef::Tag(tag) => MemDesc(*tag),
                DescRef::Label(label) => descs.register(label.as_str()),
            },
            TraceOp::Free { .. } => MemDesc::UNKNOWN,
        })
        .collect()
}

fn intern(files: &mut HashMap<String, &'static str>, file: &str) -> &'static str {
    if let Some(&interned) = files.get(file) {
        return interned;
    }
    let interned: &'static str = Box::leak(file.to_string().into_boxed_str());
    files.insert(file.to_string(), interned);
    interned
}

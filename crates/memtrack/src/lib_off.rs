use crate::config::Config;

pub struct GuardBuilder;

impl GuardBuilder {
    pub fn new(_config: Config) -> Self {
        Self
    }

    pub fn from_env() -> Self {
        Self
    }

    pub fn build(self) -> MemTrackGuard {
        MemTrackGuard
    }
}

pub struct MemTrackGuard;

impl Drop for MemTrackGuard {
    fn drop(&mut self) {}
}

pub fn print_leak_summary() {}

pub fn start_verbose_mem() {}

pub fn stop_verbose_mem() {}

pub fn start_verbose_mem_here() {}

pub fn stop_verbose_mem_here() {}

#[macro_export]
macro_rules! track_alloc {
    ($address:expr, $chunk:expr, $count:expr, $size:expr, $desc:expr) => {{
        let _ = (&$address, &$chunk, &$count, &$size, &$desc);
    }};
}

#[macro_export]
macro_rules! track_free {
    ($address:expr) => {{
        let _ = &$address;
    }};
}

#[macro_export]
macro_rules! track_realloc_pre {
    ($address:expr, $count:expr, $size:expr, $desc:expr) => {{
        let _ = (&$address, &$count, &$size, &$desc);
    }};
}

#[macro_export]
macro_rules! track_realloc_post {
    ($new_address:expr, $new_chunk:expr, $old_address:expr, $count:expr, $size:expr, $desc:expr) => {{
        let _ = (&$new_address, &$new_chunk, &$old_address, &$count, &$size, &$desc);
    }};
}

#[macro_export]
macro_rules! memory_used {
    () => {
        0u64
    };
}

#[macro_export]
macro_rules! print_mem_stat {
    () => {
        ()
    };
}

#[macro_export]
macro_rules! print_mem_table {
    () => {
        ()
    };
    ($threshold:expr) => {{
        let _ = &$threshold;
    }};
}

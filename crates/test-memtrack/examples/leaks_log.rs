use memtrack::{Config, GuardBuilder, MemDesc, RunInfo};

fn main() {
    let path = std::env::args().nth(1).expect("usage: leaks_log <path>");

    let config = Config::new().leaks_log(path).run_info(RunInfo {
        compile_command: "chpl --memtrack leaks_log.chpl".to_string(),
        execution_command: "./leaks_log --memLeaksLog".to_string(),
    });
    let _memtrack = GuardBuilder::new(config).build();

    memtrack::track_alloc!(0x100usize, 512, 64, 8, MemDesc::SYNC_AUX);
    memtrack::track_alloc!(0x200usize, 48, 6, 8, MemDesc::SYNC_AUX);
}

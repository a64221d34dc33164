use memtrack::{Config, Format, GuardBuilder, MemDesc};

fn main() {
    let config = Config::new()
        .stats(true)
        .leaks(true)
        .leaks_table(true)
        .format(Format::Json);
    let _memtrack = GuardBuilder::new(config).build();

    memtrack::track_alloc!(0xa000usize, 640, 80, 8, MemDesc::COMM_XFER_BUFFER);
    memtrack::track_alloc!(0xb000usize, 96, 12, 8, MemDesc::TASK_LIST_ENTRY);
    memtrack::track_free!(0xb000usize);
}

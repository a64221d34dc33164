use memtrack::{Config, GuardBuilder, MemDesc};

fn main() {
    let _memtrack = GuardBuilder::new(Config::new().track(true)).build();

    memtrack::track_alloc!(0x10usize, 4096, 512, 8, MemDesc::ARRAY_ELEMENTS);
    memtrack::track_alloc!(0x20usize, 256, 32, 8, MemDesc::TASK_DESCRIPTOR);
    memtrack::track_alloc!(0x30usize, 64, 64, 1, MemDesc::CONFIG_ARG);

    println!("memory used: {}", memtrack::memory_used!());
    memtrack::print_mem_table!(100);
    memtrack::print_mem_stat!();
}

use memtrack::{Config, GuardBuilder, MemDesc};

fn main() {
    let _memtrack = GuardBuilder::new(Config::new()).build();

    let buffer = vec![0u8; 512];
    memtrack::track_alloc!(buffer.as_ptr(), 512, 512, 1, MemDesc::IO_BUFFER);
    println!("querying memory use");

    let used = memtrack::memory_used!();
    println!("memory used: {}", used);
}

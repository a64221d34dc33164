use memtrack::{Config, GuardBuilder, MemDesc};

fn main() {
    let _memtrack = GuardBuilder::new(Config::new().max(10_000)).build();

    let mut buffers = Vec::new();
    for i in 0..4 {
        let buffer = vec![0u8; 4096];
        println!("allocating buffer {}", i);
        memtrack::track_alloc!(buffer.as_ptr(), 4096, 4096, 1, MemDesc::IO_BUFFER);
        buffers.push(buffer);
    }

    println!("all buffers allocated");
}

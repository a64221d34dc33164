use memtrack::{GuardBuilder, MemDesc};
use std::thread;

// Reads MEMTRACK_* from the environment so tests can choose the reports.
fn main() {
    let _memtrack = GuardBuilder::from_env().build();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let stack = vec![0u8; 8192];
                memtrack::track_alloc!(stack.as_ptr(), 8192, 8192, 1, MemDesc::TASK_STACK);

                let elements = vec![0u64; 128];
                memtrack::track_alloc!(elements.as_ptr(), 1024, 128, 8, MemDesc::ARRAY_ELEMENTS);
                memtrack::track_free!(elements.as_ptr());

                if i == 0 {
                    // Worker 0 never releases its stack.
                    std::mem::forget(stack);
                } else {
                    memtrack::track_free!(stack.as_ptr());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let leaked = Box::leak(vec![0u8; 300].into_boxed_slice());
    memtrack::track_alloc!(leaked.as_ptr(), 300, 3, 100, MemDesc::LOCALE_DATA);

    println!("leaks example done");
}

use memtrack::{Config, GuardBuilder, MemDesc};

fn main() {
    let _memtrack = GuardBuilder::new(Config::new().track(true).threshold(16)).build();

    memtrack::start_verbose_mem();

    memtrack::track_alloc!(0x1000usize, 64, 8, 8, MemDesc::ARRAY_ELEMENTS);
    // At or below the threshold: silent.
    memtrack::track_alloc!(0x2000usize, 16, 2, 8, MemDesc::ARRAY_ELEMENTS);
    memtrack::track_realloc_pre!(0x1000usize, 16, 8, MemDesc::ARRAY_ELEMENTS);
    memtrack::track_realloc_post!(0x3000usize, 128, 0x1000usize, 16, 8, MemDesc::ARRAY_ELEMENTS);
    memtrack::track_free!(0x3000usize);

    memtrack::stop_verbose_mem();
    memtrack::track_alloc!(0x4000usize, 64, 8, 8, MemDesc::ARRAY_ELEMENTS);
    memtrack::track_free!(0x4000usize);
}

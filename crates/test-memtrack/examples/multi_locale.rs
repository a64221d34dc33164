#[cfg(not(feature = "memtrack-off"))]
fn main() {
    use memtrack::{Config, LocaleCluster, Location, MemDesc, RuntimeDescriptors};
    use std::sync::Arc;
    use std::thread;

    let cluster = LocaleCluster::new(3, Arc::new(RuntimeDescriptors::new()), |_| {
        Config::new().stats(true).leaks(true)
    })
    .unwrap();

    // Locale n allocates n + 1 blocks of 1000 * (n + 1) bytes and keeps one.
    thread::scope(|s| {
        for tracker in cluster.locales() {
            s.spawn(move || {
                let locale = u64::from(tracker.locale_id());
                let here = Location::new(line!(), file!());
                let bytes = 1000 * (locale + 1);
                for i in 0..=locale as usize {
                    tracker
                        .track_alloc(0x1000 * (i + 1), bytes, bytes, 1, MemDesc::LOCALE_DATA, here)
                        .unwrap();
                }
                for i in 1..=locale as usize {
                    tracker.track_free(0x1000 * (i + 1), here).unwrap();
                }
            });
        }
    });

    for tracker in cluster.locales() {
        tracker.report_at_shutdown().unwrap();
    }
}

#[cfg(feature = "memtrack-off")]
fn main() {}

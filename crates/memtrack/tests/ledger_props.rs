use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

use memtrack::{CaptureBuffer, Config, Entry, LogDestination, Location, MemDesc, MemTracker};

fn tracker() -> MemTracker {
    let config = Config::new()
        .track(true)
        .log(LogDestination::Writer(Box::new(CaptureBuffer::new())));
    MemTracker::new(config).expect("tracker configures")
}

fn entry_set(entries: Vec<Entry>) -> HashSet<Entry> {
    entries.into_iter().collect()
}

#[derive(Debug, Clone)]
enum Op {
    Alloc { slot: usize, count: u64, size: u64 },
    Free { slot: usize },
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            (0usize..64, 1u64..64, 1u64..64)
                .prop_map(|(slot, count, size)| Op::Alloc { slot, count, size }),
            (0usize..64).prop_map(|slot| Op::Free { slot }),
        ],
        0..256,
    )
}

proptest! {
    #[test]
    fn counters_match_running_sums(ops in ops()) {
        let tracker = tracker();
        let mut live: BTreeMap<usize, u64> = BTreeMap::new();
        let (mut allocated, mut freed, mut peak) = (0u64, 0u64, 0u64);

        for op in ops {
            match op {
                Op::Alloc { slot, count, size } => {
                    let address = 0x1000 + slot * 0x40;
                    if live.contains_key(&address) {
                        continue;
                    }
                    tracker
                        .track_alloc(address, count * size, count, size, MemDesc::ARRAY_ELEMENTS, Location::UNKNOWN)
                        .unwrap();
                    live.insert(address, count * size);
                    allocated += count * size;
                }
                Op::Free { slot } => {
                    let address = 0x1000 + slot * 0x40;
                    tracker.track_free(address, Location::UNKNOWN).unwrap();
                    if let Some(chunk) = live.remove(&address) {
                        freed += chunk;
                    }
                }
            }
            peak = peak.max(live.values().sum());
        }

        let counters = tracker.snapshot().unwrap();
        prop_assert_eq!(counters.current, live.values().sum::<u64>());
        prop_assert_eq!(counters.allocated, allocated);
        prop_assert_eq!(counters.freed, freed);
        prop_assert_eq!(counters.peak, peak);
        prop_assert_eq!(tracker.live_entries().unwrap().len(), live.len());
    }

    #[test]
    fn resizes_preserve_live_entries(
        total in 700usize..900,
        keep_every in 2usize..12,
    ) {
        let tracker = tracker();
        let mut expected = HashSet::new();

        for i in 0..total {
            let location = Location::new(i as u32, "props.chpl");
            let entry = Entry {
                address: 0x10_0000 + i * 0x100,
                count: (i % 7) as u64 + 1,
                size: 8,
                desc: MemDesc((i % 16) as u32),
                location,
            };
            tracker
                .track_alloc(entry.address, entry.chunk(), entry.count, entry.size, entry.desc, location)
                .unwrap();
            expected.insert(entry);
        }
        prop_assert_eq!(entry_set(tracker.live_entries().unwrap()), expected.clone());

        // Drop below the shrink boundary and check again.
        for i in (0..total).filter(|i| i % keep_every != 0) {
            let address = 0x10_0000 + i * 0x100;
            tracker.track_free(address, Location::UNKNOWN).unwrap();
            expected.retain(|entry| entry.address != address);
        }
        prop_assert_eq!(entry_set(tracker.live_entries().unwrap()), expected.clone());

        let current: u64 = expected.iter().map(Entry::chunk).sum();
        prop_assert_eq!(tracker.snapshot().unwrap().current, current);
    }

    #[test]
    fn second_free_is_a_no_op(chunks in proptest::collection::vec(1u64..10_000, 1..32)) {
        let tracker = tracker();
        for (i, chunk) in chunks.iter().enumerate() {
            tracker
                .track_alloc(0x40 * (i + 1), *chunk, *chunk, 1, MemDesc::UNKNOWN, Location::UNKNOWN)
                .unwrap();
        }

        tracker.track_free(0x40, Location::UNKNOWN).unwrap();
        let after_first = tracker.snapshot().unwrap();
        tracker.track_free(0x40, Location::UNKNOWN).unwrap();
        prop_assert_eq!(tracker.snapshot().unwrap(), after_first);
        prop_assert_eq!(after_first.freed, chunks[0]);
    }

    #[test]
    fn threshold_boundary(threshold in 0u64..4096) {
        let config = Config::new()
            .track(true)
            .threshold(threshold)
            .log(LogDestination::Writer(Box::new(CaptureBuffer::new())));
        let tracker = MemTracker::new(config).unwrap();

        tracker
            .track_alloc(0x10, threshold, threshold, 1, MemDesc::UNKNOWN, Location::UNKNOWN)
            .unwrap();
        prop_assert_eq!(tracker.snapshot().unwrap().allocated, 0);

        tracker
            .track_alloc(0x20, threshold + 1, threshold + 1, 1, MemDesc::UNKNOWN, Location::UNKNOWN)
            .unwrap();
        prop_assert_eq!(tracker.snapshot().unwrap().allocated, threshold + 1);
    }
}

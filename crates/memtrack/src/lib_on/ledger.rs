//! Allocation ledger: a chaining hash table keyed by raw addresses.
//!
//! Entries live in an arena (`slots`) and are linked into buckets by index, so
//! a resize only rebuilds the bucket heads and relinks entries in place. The
//! bucket count always comes from [`HASH_SIZES`]; the table grows before an
//! insert that would push the load factor above 1/2 and shrinks after a
//! removal that drops it below 1/8.

use serde::{Deserialize, Serialize};

use crate::desc::MemDesc;
use crate::error::{Location, MemTrackError, Result};

pub(crate) const HASH_SIZES: [usize; 20] = [
    1543, 3079, 6151, 12289, 24593, 49157, 98317, 196613, 393241, 786433, 1572869, 3145739,
    6291469, 12582917, 25165843, 50331653, 100663319, 201326611, 402653189, 805306457,
];

/// Running totals for one locale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemCounters {
    /// Bytes currently allocated.
    pub current: u64,
    /// Highest value `current` has reached.
    pub peak: u64,
    /// Bytes ever allocated.
    pub allocated: u64,
    /// Bytes ever freed.
    pub freed: u64,
}

impl MemCounters {
    #[inline]
    fn increase(&mut self, chunk: u64) {
        self.current = self.current.saturating_add(chunk);
        self.allocated = self.allocated.saturating_add(chunk);
        if self.current > self.peak {
            self.peak = self.current;
        }
    }

    #[inline]
    fn decrease(&mut self, chunk: u64) {
        self.current = self.current.saturating_sub(chunk);
        self.freed = self.freed.saturating_add(chunk);
    }
}

/// Metadata about one live tracked allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Identity of the allocation; never dereferenced.
    pub address: usize,
    pub count: u64,
    pub size: u64,
    pub desc: MemDesc,
    pub location: Location,
}

impl Entry {
    #[inline]
    pub fn chunk(&self) -> u64 {
        self.count.saturating_mul(self.size)
    }
}

struct Slot {
    entry: Entry,
    next: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resize {
    Grow,
    Shrink,
}

/// Byte-wise polynomial hash (multiplier 31) over the address's native bytes.
#[inline]
pub(crate) fn hash(address: usize, table_len: usize) -> usize {
    let mut value: u32 = 0;
    for byte in address.to_ne_bytes() {
        value = u32::from(byte).wrapping_add(value.wrapping_mul(31));
    }
    value as usize % table_len
}

fn bucket_array(len: usize, location: Location) -> Result<Vec<Option<usize>>> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(len)
        .map_err(|_| MemTrackError::OutOfMemory {
            what: "allocating memtrack table",
            location,
        })?;
    buckets.resize(len, None);
    Ok(buckets)
}

pub(crate) struct Ledger {
    buckets: Vec<Option<usize>>,
    slots: Vec<Option<Slot>>,
    vacant: Vec<usize>,
    size_index: usize,
    len: usize,
    ceiling: u64,
    counters: MemCounters,
}

impl Ledger {
    pub fn new(ceiling: u64) -> Result<Self> {
        Ok(Self {
            buckets: bucket_array(HASH_SIZES[0], Location::UNKNOWN)?,
            slots: Vec::new(),
            vacant: Vec::new(),
            size_index: 0,
            len: 0,
            ceiling,
            counters: MemCounters::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn counters(&self) -> MemCounters {
        self.counters
    }

    /// Record a new live allocation.
    ///
    /// Fails without touching the table when the entry would push live bytes
    /// past a non-zero ceiling.
    pub fn insert(&mut self, entry: Entry) -> Result<()> {
        let chunk = entry.chunk();
        let location = entry.location;

        if self.ceiling != 0 && self.counters.current.saturating_add(chunk) > self.ceiling {
            return Err(MemTrackError::CeilingExceeded {
                ceiling: self.ceiling,
                requested: chunk,
                location,
            });
        }

        if (self.len + 1) * 2 > self.buckets.len() && self.size_index < HASH_SIZES.len() - 1 {
            self.resize(Resize::Grow, location)?;
        }

        let bucket = hash(entry.address, self.buckets.len());
        let slot = Slot {
            entry,
            next: self.buckets[bucket],
        };
        let index = match self.vacant.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots
                    .try_reserve(1)
                    .map_err(|_| MemTrackError::OutOfMemory {
                        what: "allocating memtrack table",
                        location,
                    })?;
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.buckets[bucket] = Some(index);

        self.counters.increase(chunk);
        self.len += 1;
        Ok(())
    }

    /// Retract the live entry for `address`, if there is one.
    pub fn remove(&mut self, address: usize, location: Location) -> Result<Option<Entry>> {
        let bucket = hash(address, self.buckets.len());

        let mut prev: Option<usize> = None;
        let mut cursor = self.buckets[bucket];
        while let Some(index) = cursor {
            let Some(slot) = self.slots[index].as_ref() else {
                break;
            };
            if slot.entry.address == address {
                break;
            }
            prev = Some(index);
            cursor = slot.next;
        }

        let Some(index) = cursor else {
            return Ok(None);
        };
        let Some(slot) = self.slots[index].take() else {
            return Ok(None);
        };

        match prev {
            None => self.buckets[bucket] = slot.next,
            Some(prev) => {
                if let Some(prev_slot) = self.slots[prev].as_mut() {
                    prev_slot.next = slot.next;
                }
            }
        }
        self.vacant.push(index);

        self.counters.decrease(slot.entry.chunk());
        self.len -= 1;

        if self.len * 8 < self.buckets.len() && self.size_index > 0 {
            self.resize(Resize::Shrink, location)?;
        }
        Ok(Some(slot.entry))
    }

    fn resize(&mut self, direction: Resize, location: Location) -> Result<()> {
        let new_index = match direction {
            Resize::Grow => self.size_index + 1,
            Resize::Shrink => self.size_index - 1,
        };
        let new_len = HASH_SIZES[new_index];
        let mut new_buckets = bucket_array(new_len, location)?;

        for head in std::mem::take(&mut self.buckets) {
            let mut cursor = head;
            while let Some(index) = cursor {
                let Some(slot) = self.slots[index].as_mut() else {
                    break;
                };
                cursor = slot.next;
                let bucket = hash(slot.entry.address, new_len);
                slot.next = new_buckets[bucket];
                new_buckets[bucket] = Some(index);
            }
        }

        tracing::debug!(
            from = HASH_SIZES[self.size_index],
            to = new_len,
            entries = self.len,
            "resized memtrack table"
        );

        self.buckets = new_buckets;
        self.size_index = new_index;

        if direction == Resize::Shrink && self.vacant.len() > self.len {
            self.compact();
        }
        Ok(())
    }

    /// Drop trailing vacant slots so the arena does not keep its high-water size.
    fn compact(&mut self) {
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        let live = self.slots.len();
        self.vacant.retain(|&index| index < live);
    }

    /// Every live entry, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.buckets.iter().flat_map(move |head| {
            let mut cursor = *head;
            std::iter::from_fn(move || {
                let index = cursor?;
                let slot = self.slots[index].as_ref()?;
                cursor = slot.next;
                Some(&slot.entry)
            })
        })
    }
}

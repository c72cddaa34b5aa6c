//! Sharded concurrent k-mer frequency table
//! ========================================
//!
//! A key→count map partitioned into independently locked open-addressing
//! shards. Threads routing to different shards never contend, which gives
//! near-linear insertion scaling for the counting pass. Keys are always
//! stored in canonical form, so a k-mer and its reverse complement share
//! one entry.
//!
//! Values are stored as `i64`: legitimate counts occupy `0..=u32::MAX`
//! (saturating), while the reserved negative [`BAN_MARKER`] flags k-mers
//! excluded from traversal without removing their keys.

use parking_lot::Mutex;

use crate::core::kmer::canonical;
use crate::error::PipelineError;

/// Reserved value marking a k-mer as banned; never a legitimate count.
pub const BAN_MARKER: i64 = -1;

/// Slot sentinel. Canonical k-mers for k <= 31 occupy the low 62 bits, so
/// `u64::MAX` can never collide with a stored key.
const EMPTY_KEY: u64 = u64::MAX;

/// Bytes per entry: 8-byte key + 8-byte value.
const ENTRY_BYTES: u64 = 16;

/// Smallest shard table we bother allocating.
const MIN_SHARD_CAPACITY: usize = 1 << 10;

/// Hard ceiling per shard; a shard that would double past this refuses to
/// grow and the insert fails with `CapacityExhausted`.
const MAX_SHARD_CAPACITY: usize = 1 << 32;

/// Saturation point for counts.
const COUNT_MAX: i64 = u32::MAX as i64;

/// 64-bit avalanche mix (xorshift-multiply finalizer). The same function
/// routes a key at insertion and lookup.
#[inline]
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

struct Shard {
    keys: Vec<u64>,
    values: Vec<i64>,
    len: usize,
}

enum Slot {
    Occupied(usize),
    Vacant(usize),
}

impl Shard {
    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            keys: vec![EMPTY_KEY; capacity],
            values: vec![0; capacity],
            len: 0,
        }
    }

    /// Linear probe from the hash-derived start slot.
    #[inline]
    fn locate(&self, key: u64, hash: u64, slot_shift: u32) -> Slot {
        let mask = self.keys.len() - 1;
        let mut i = (hash >> slot_shift) as usize & mask;
        loop {
            let stored = self.keys[i];
            if stored == EMPTY_KEY {
                return Slot::Vacant(i);
            }
            if stored == key {
                return Slot::Occupied(i);
            }
            i = (i + 1) & mask;
        }
    }

    /// Doubles capacity and rehashes every occupied slot.
    fn grow(&mut self, shard_index: usize, slot_shift: u32) -> Result<(), PipelineError> {
        let new_capacity = self.keys.len() * 2;
        if new_capacity > MAX_SHARD_CAPACITY {
            return Err(PipelineError::CapacityExhausted {
                shard: shard_index,
                max_entries: MAX_SHARD_CAPACITY,
            });
        }
        let old_keys = std::mem::replace(&mut self.keys, vec![EMPTY_KEY; new_capacity]);
        let old_values = std::mem::replace(&mut self.values, vec![0; new_capacity]);
        let mask = new_capacity - 1;
        for (key, value) in old_keys.into_iter().zip(old_values) {
            if key == EMPTY_KEY {
                continue;
            }
            let mut i = (mix64(key) >> slot_shift) as usize & mask;
            while self.keys[i] != EMPTY_KEY {
                i = (i + 1) & mask;
            }
            self.keys[i] = key;
            self.values[i] = value;
        }
        Ok(())
    }

    /// Grow when the next insert would push occupancy to 3/4.
    #[inline]
    fn wants_growth(&self) -> bool {
        (self.len + 1) * 4 >= self.keys.len() * 3
    }
}

/// Concurrent canonical-k-mer frequency table, sharded by hash.
///
/// All operations canonicalize their key argument, so callers may pass
/// either orientation of a k-mer.
pub struct ShardedKmerMap {
    shards: Vec<Mutex<Shard>>,
    /// `log2(shard count)`; the low hash bits route to a shard and the
    /// remaining bits pick the slot inside it.
    shard_bits: u32,
    k: usize,
}

impl ShardedKmerMap {
    /// Builds a table sized from a memory budget.
    ///
    /// Shard count is the next power of two at or above `workers * 4`;
    /// initial capacities are chosen so the table starts well under half
    /// occupancy and `sum(capacity) * 16 bytes` stays within the budget
    /// (subject to a small per-shard floor).
    pub fn new(k: usize, memory_budget_bytes: u64, workers: usize) -> Self {
        let shard_count = (workers.max(1) * 4).next_power_of_two();
        let budget_entries = (memory_budget_bytes / ENTRY_BYTES).max(1) as usize;
        let per_shard = (budget_entries / shard_count).max(MIN_SHARD_CAPACITY);
        // round down to a power of two so probing stays mask-based
        let capacity = if per_shard.is_power_of_two() {
            per_shard
        } else {
            1 << (usize::BITS - 1 - per_shard.leading_zeros())
        };
        let shards = (0..shard_count)
            .map(|_| Mutex::new(Shard::with_capacity(capacity)))
            .collect();
        Self {
            shards,
            shard_bits: shard_count.trailing_zeros(),
            k,
        }
    }

    /// K-mer length the table canonicalizes against.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    fn route(&self, kmer: u64) -> (usize, u64) {
        let key = canonical(kmer, self.k);
        let hash = mix64(key);
        let shard = hash as usize & (self.shards.len() - 1);
        (shard, key)
    }

    /// Adds `delta` to the entry for `canonical(kmer)`, inserting with
    /// value `delta` if absent. Counts saturate at `u32::MAX`.
    pub fn add(&self, kmer: u64, delta: u32) -> Result<(), PipelineError> {
        let (shard_index, key) = self.route(kmer);
        let hash = mix64(key);
        let mut shard = self.shards[shard_index].lock();
        match shard.locate(key, hash, self.shard_bits) {
            Slot::Occupied(i) => {
                shard.values[i] = (shard.values[i] + delta as i64).min(COUNT_MAX);
            }
            Slot::Vacant(mut i) => {
                if shard.wants_growth() {
                    shard.grow(shard_index, self.shard_bits)?;
                    i = match shard.locate(key, hash, self.shard_bits) {
                        Slot::Vacant(i) => i,
                        Slot::Occupied(_) => unreachable!("key appeared during grow"),
                    };
                }
                shard.keys[i] = key;
                shard.values[i] = delta as i64;
                shard.len += 1;
            }
        }
        Ok(())
    }

    /// Convenience single-occurrence insert.
    #[inline]
    pub fn increment(&self, kmer: u64) -> Result<(), PipelineError> {
        self.add(kmer, 1)
    }

    /// Adds `delta` only when the canonical key is already present.
    /// Returns whether the entry existed.
    pub fn add_if_present(&self, kmer: u64, delta: u32) -> bool {
        let (shard_index, key) = self.route(kmer);
        let hash = mix64(key);
        let mut shard = self.shards[shard_index].lock();
        match shard.locate(key, hash, self.shard_bits) {
            Slot::Occupied(i) => {
                shard.values[i] = (shard.values[i] + delta as i64).min(COUNT_MAX);
                true
            }
            Slot::Vacant(_) => false,
        }
    }

    /// Value for `canonical(kmer)`; 0 when absent. Banned entries report
    /// their negative marker so threshold comparisons treat them as gone.
    pub fn get(&self, kmer: u64) -> i64 {
        let (shard_index, key) = self.route(kmer);
        let hash = mix64(key);
        let shard = self.shards[shard_index].lock();
        match shard.locate(key, hash, self.shard_bits) {
            Slot::Occupied(i) => shard.values[i],
            Slot::Vacant(_) => 0,
        }
    }

    /// Overwrites the value for `canonical(kmer)`, inserting if absent.
    pub fn set(&self, kmer: u64, value: i64) -> Result<(), PipelineError> {
        let (shard_index, key) = self.route(kmer);
        let hash = mix64(key);
        let mut shard = self.shards[shard_index].lock();
        match shard.locate(key, hash, self.shard_bits) {
            Slot::Occupied(i) => shard.values[i] = value,
            Slot::Vacant(mut i) => {
                if shard.wants_growth() {
                    shard.grow(shard_index, self.shard_bits)?;
                    i = match shard.locate(key, hash, self.shard_bits) {
                        Slot::Vacant(i) => i,
                        Slot::Occupied(_) => unreachable!("key appeared during grow"),
                    };
                }
                shard.keys[i] = key;
                shard.values[i] = value;
                shard.len += 1;
            }
        }
        Ok(())
    }

    /// Zeroes every entry's value in place, preserving keys. Callers must
    /// ensure no other operation is in flight.
    pub fn reset_values(&self) {
        for shard in &self.shards {
            let mut shard = shard.lock();
            for i in 0..shard.keys.len() {
                if shard.keys[i] != EMPTY_KEY {
                    shard.values[i] = 0;
                }
            }
        }
    }

    /// Number of stored entries across all shards.
    pub fn size(&self) -> u64 {
        self.shards.iter().map(|s| s.lock().len as u64).sum()
    }

    /// Number of shards; shard indices are `0..shard_count()`.
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Snapshot of one shard's `(key, value)` entries. Used by passes that
    /// partition work by shard; taking a snapshot keeps neighbor probes
    /// from holding two shard locks at once.
    pub fn shard_entries(&self, shard_index: usize) -> Vec<(u64, i64)> {
        let shard = self.shards[shard_index].lock();
        let mut out = Vec::with_capacity(shard.len);
        for (i, &key) in shard.keys.iter().enumerate() {
            if key != EMPTY_KEY {
                out.push((key, shard.values[i]));
            }
        }
        out
    }

    /// Lazy iterator over all `(key, value)` entries, shard by shard.
    /// Stable under no concurrent mutation.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            map: self,
            shard: 0,
            buffer: Vec::new(),
            pos: 0,
        }
    }

    /// Total bytes currently committed to slot storage.
    pub fn capacity_bytes(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.lock().keys.len() as u64 * ENTRY_BYTES)
            .sum()
    }
}

/// See [`ShardedKmerMap::entries`].
pub struct Entries<'a> {
    map: &'a ShardedKmerMap,
    shard: usize,
    buffer: Vec<(u64, i64)>,
    pos: usize,
}

impl Iterator for Entries<'_> {
    type Item = (u64, i64);

    fn next(&mut self) -> Option<(u64, i64)> {
        loop {
            if self.pos < self.buffer.len() {
                let entry = self.buffer[self.pos];
                self.pos += 1;
                return Some(entry);
            }
            if self.shard >= self.map.shard_count() {
                return None;
            }
            self.buffer = self.map.shard_entries(self.shard);
            self.shard += 1;
            self.pos = 0;
        }
    }
}

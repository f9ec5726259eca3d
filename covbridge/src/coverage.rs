//! Software coverage tables in the layout the sanitizer coverage ABI expects.
//!
//! The native driver discovers coverage through two parallel arrays:
//! 1.  an inline 8-bit counter region, registered with
//!     `__sanitizer_cov_8bit_counters_init(start, stop)`;
//! 2.  a PC table with one `PCTableEntry` per counter, registered with
//!     `__sanitizer_cov_pcs_init(start, end)`.
//!
//! After every input the driver scans the counters to decide whether new
//! coverage was found. Host code is not compiled with instrumentation, so the
//! bridge owns these arrays and fills the counters itself from branch events.

use std::sync::atomic::{AtomicU8, Ordering};

/// One entry of the sanitizer coverage PC table.
///
/// Must match libFuzzer's `PCTableEntry { uintptr_t PC, PCFlags; }`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PcTableEntry {
    pub pc: usize,
    pub flags: usize,
}

/// A fixed-capacity table of 8-bit hit counters and its PC table.
///
/// Both arrays are heap allocated once and never resized, so the address
/// ranges handed to the native driver stay valid for as long as the map lives.
/// Counters are atomics with the same in-memory representation as `u8`; the
/// driver reads them as plain bytes.
pub struct CoverageMap {
    counters: Box<[AtomicU8]>,
    pcs: Box<[PcTableEntry]>,
}

impl CoverageMap {
    /// Allocates a zeroed map with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Configurations are validated before a
    /// map is built, see [`crate::config::BridgeConfig::validate`].
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "coverage map capacity must be non-zero");
        let counters = (0..capacity).map(|_| AtomicU8::new(0)).collect();
        // PCs only need to be distinct and non-zero; nothing symbolizes them.
        let pcs = (0..capacity)
            .map(|slot| PcTableEntry {
                pc: slot + 1,
                flags: 0,
            })
            .collect();
        Self { counters, pcs }
    }

    pub fn capacity(&self) -> usize {
        self.counters.len()
    }

    /// Bumps the counter for `index`, wrapping the index into the table and
    /// the counter value on overflow.
    #[inline]
    pub fn hit(&self, index: usize) {
        self.counters[index % self.counters.len()].fetch_add(1, Ordering::Relaxed);
    }

    /// Reads the counter for `index`, wrapping the index like [`Self::hit`].
    pub fn get(&self, index: usize) -> u8 {
        self.counters[index % self.counters.len()].load(Ordering::Relaxed)
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> Vec<u8> {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// Zeroes every counter.
    pub fn clear(&self) {
        for c in self.counters.iter() {
            c.store(0, Ordering::Relaxed);
        }
    }

    /// The `[start, stop)` byte range of the counter region.
    pub fn counters_range(&self) -> (*mut u8, *mut u8) {
        let start = self.counters.as_ptr() as *mut u8;
        // `AtomicU8` is guaranteed to have the size of `u8`.
        (start, start.wrapping_add(self.counters.len()))
    }

    /// The `[start, end)` range of the PC table, as `uintptr_t` pointers.
    pub fn pcs_range(&self) -> (*const usize, *const usize) {
        let range = self.pcs.as_ptr_range();
        (range.start as *const usize, range.end as *const usize)
    }

    pub fn pcs(&self) -> &[PcTableEntry] {
        &self.pcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn pc_table_entry_matches_native_layout() {
        assert_eq!(mem::size_of::<PcTableEntry>(), 2 * mem::size_of::<usize>());
        assert_eq!(mem::align_of::<PcTableEntry>(), mem::align_of::<usize>());
        assert_eq!(mem::size_of::<AtomicU8>(), mem::size_of::<u8>());
    }

    #[test]
    fn ranges_cover_exactly_one_entry_per_slot() {
        let map = CoverageMap::new(64);

        let (start, stop) = map.counters_range();
        assert_eq!(stop as usize - start as usize, 64);

        let (pcs_start, pcs_end) = map.pcs_range();
        assert_eq!(
            pcs_end as usize - pcs_start as usize,
            64 * mem::size_of::<PcTableEntry>()
        );
    }

    #[test]
    fn pcs_are_distinct_and_non_zero() {
        let map = CoverageMap::new(16);
        let mut pcs: Vec<usize> = map.pcs().iter().map(|e| e.pc).collect();
        assert!(pcs.iter().all(|&pc| pc != 0));
        pcs.dedup();
        assert_eq!(pcs.len(), 16);
    }

    #[test]
    fn hits_are_visible_through_the_published_range() {
        let map = CoverageMap::new(8);
        map.hit(3);
        map.hit(3);

        let (start, _) = map.counters_range();
        let raw = unsafe { *start.add(3) };
        assert_eq!(raw, 2);
        assert_eq!(map.get(3), 2);
    }

    #[test]
    fn index_wraps_around_capacity() {
        let map = CoverageMap::new(8);
        map.hit(8 + 5);
        assert_eq!(map.get(5), 1);
        assert_eq!(map.snapshot().iter().map(|&c| c as usize).sum::<usize>(), 1);
    }

    #[test]
    fn counter_wraps_instead_of_saturating() {
        let map = CoverageMap::new(1);
        for _ in 0..256 {
            map.hit(0);
        }
        assert_eq!(map.get(0), 0);
        map.hit(0);
        assert_eq!(map.get(0), 1);
    }

    #[test]
    fn clear_zeroes_all_counters() {
        let map = CoverageMap::new(4);
        (0..4).for_each(|i| map.hit(i));
        map.clear();
        assert_eq!(map.snapshot(), vec![0; 4]);
    }
}

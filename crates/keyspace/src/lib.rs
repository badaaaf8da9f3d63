//! Slot-range tracker (component C) and ASM state machine (component D),
//! plus the key-space version query tracker (component E).
//!
//! Slot occupancy is tracked with a fixed 16384-bit set per ownership state
//! rather than an interval list: canonical form (sorted, non-overlapping,
//! merged-adjacent) then falls out of the representation for free whenever
//! ranges are read back out, instead of needing its own merge pass.

use std::collections::HashMap;
use std::sync::Mutex;

pub const MAX_SLOT: u16 = 16383;
const WORDS: usize = (MAX_SLOT as usize + 1) / 64;

/// A set of logical key-space slots, stored as a 16384-bit occupancy vector.
#[derive(Clone, PartialEq, Eq)]
pub struct SlotSet([u64; WORDS]);

impl std::fmt::Debug for SlotSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.to_ranges()).finish()
    }
}

impl Default for SlotSet {
    fn default() -> Self {
        SlotSet::empty()
    }
}

impl SlotSet {
    pub fn empty() -> Self {
        SlotSet([0u64; WORDS])
    }

    pub fn from_ranges(ranges: &[(u16, u16)]) -> Self {
        let mut s = SlotSet::empty();
        for &(start, end) in ranges {
            s.set_range(start, end);
        }
        s
    }

    pub fn set_range(&mut self, start: u16, end: u16) {
        assert!(start <= end && end <= MAX_SLOT, "invalid slot range");
        for slot in start..=end {
            self.0[slot as usize / 64] |= 1 << (slot % 64);
        }
    }

    pub fn clear_range(&mut self, start: u16, end: u16) {
        assert!(start <= end && end <= MAX_SLOT, "invalid slot range");
        for slot in start..=end {
            self.0[slot as usize / 64] &= !(1 << (slot % 64));
        }
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot <= MAX_SLOT && (self.0[slot as usize / 64] >> (slot % 64)) & 1 == 1
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    pub fn union(&self, other: &SlotSet) -> SlotSet {
        let mut out = [0u64; WORDS];
        for i in 0..WORDS {
            out[i] = self.0[i] | other.0[i];
        }
        SlotSet(out)
    }

    pub fn merge_from(&mut self, other: &SlotSet) {
        for i in 0..WORDS {
            self.0[i] |= other.0[i];
        }
    }

    pub fn remove(&mut self, other: &SlotSet) {
        for i in 0..WORDS {
            self.0[i] &= !other.0[i];
        }
    }

    pub fn is_subset_of(&self, other: &SlotSet) -> bool {
        (0..WORDS).all(|i| self.0[i] & !other.0[i] == 0)
    }

    pub fn intersects(&self, other: &SlotSet) -> bool {
        (0..WORDS).any(|i| self.0[i] & other.0[i] != 0)
    }

    /// Canonical (sorted, non-overlapping, merged-adjacent) ranges.
    pub fn to_ranges(&self) -> Vec<(u16, u16)> {
        let mut ranges = Vec::new();
        let mut start: Option<u16> = None;
        for slot in 0..=MAX_SLOT {
            if self.contains(slot) {
                if start.is_none() {
                    start = Some(slot);
                }
            } else if let Some(s) = start.take() {
                ranges.push((s, slot - 1));
            }
        }
        if let Some(s) = start {
            ranges.push((s, MAX_SLOT));
        }
        ranges
    }

    /// `[num_ranges:u32][(start:u16,end:u16) x num_ranges]` little-endian,
    /// the wire shape of the `SLOTS` injected argument marker.
    pub fn to_bytes(&self) -> Vec<u8> {
        let ranges = self.to_ranges();
        let mut out = Vec::with_capacity(4 + ranges.len() * 4);
        out.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
        for (start, end) in ranges {
            out.extend_from_slice(&start.to_le_bytes());
            out.extend_from_slice(&end.to_le_bytes());
        }
        out
    }
}

/// Tracks which slot ranges this node considers local, mid-migration, and
/// safe-but-unowned, plus the monotonic `key_space_version` counter.
#[derive(Debug, Clone)]
pub struct KeySpaceTracker {
    local: SlotSet,
    partial: SlotSet,
    fully_available: SlotSet,
    key_space_version: u32,
}

impl Default for KeySpaceTracker {
    fn default() -> Self {
        KeySpaceTracker {
            local: SlotSet::empty(),
            partial: SlotSet::empty(),
            fully_available: SlotSet::empty(),
            key_space_version: 0,
        }
    }
}

impl KeySpaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_space_version(&self) -> u32 {
        self.key_space_version
    }

    pub fn local(&self) -> &SlotSet {
        &self.local
    }

    pub fn partial(&self) -> &SlotSet {
        &self.partial
    }

    pub fn fully_available(&self) -> &SlotSet {
        &self.fully_available
    }

    /// Bootstraps the set of slots owned outright. Increments the version
    /// once, as the initial topology assignment.
    pub fn set_local(&mut self, ranges: &SlotSet) {
        self.local.merge_from(ranges);
        self.key_space_version += 1;
    }

    /// `outside -> partial`. Overlapping an already-local range is a caller
    /// bug (undefined behavior upstream); debug builds assert on it.
    pub fn start_import(&mut self, ranges: &SlotSet) {
        debug_assert!(
            !ranges.intersects(&self.local),
            "start_import overlaps an already-local range"
        );
        self.partial.merge_from(ranges);
        self.key_space_version += 1;
    }

    /// `partial -> local`. Adjacent local ranges merge automatically because
    /// both sets are bit-per-slot.
    pub fn complete_import(&mut self, ranges: &SlotSet) {
        self.partial.remove(ranges);
        self.local.merge_from(ranges);
        self.key_space_version += 1;
    }

    /// `local -> fully_available`. Does not change which queries may be
    /// served, so the version is untouched.
    pub fn complete_migration(&mut self, ranges: &SlotSet) {
        self.local.remove(ranges);
        self.fully_available.merge_from(ranges);
    }

    /// `fully_available -> partial`.
    pub fn start_trim(&mut self, ranges: &SlotSet) {
        self.fully_available.remove(ranges);
        self.partial.merge_from(ranges);
        self.key_space_version += 1;
    }

    /// `partial -> outside`. Does not change which queries may be served.
    pub fn complete_trim(&mut self, ranges: &SlotSet) {
        self.partial.remove(ranges);
    }

    /// Whether `slot` is safe to read from (owned, or safe-but-unowned).
    pub fn can_access_slot(&self, slot: u16) -> bool {
        self.local.contains(slot) || self.fully_available.contains(slot)
    }

    /// `Some(version)` this query is pinned to, or `None` if it cannot be
    /// served at all. `Some(0)` is the "unstable, must filter by slot"
    /// sentinel — 0 means "do not pin to a version".
    pub fn check_availability(&self, query: &SlotSet) -> Option<u32> {
        if query.is_subset_of(&self.local) && !query.intersects(&self.partial) {
            return Some(self.key_space_version);
        }
        let servable_ceiling = self.local.union(&self.fully_available);
        if query.is_subset_of(&servable_ceiling)
            && (query.intersects(&self.partial) || query.intersects(&self.fully_available))
        {
            return Some(0);
        }
        None
    }
}

/// Component E: ref-counts in-flight queries per key-space version so trim
/// can wait until the outgoing version has no readers left.
#[derive(Debug, Default)]
pub struct KeySpaceVersionTracker {
    counts: Mutex<HashMap<u32, u32>>,
}

impl KeySpaceVersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A newly issued query increments the count for its pinned version.
    pub fn increase(&self, version: u32) {
        *self.counts.lock().unwrap().entry(version).or_insert(0) += 1;
    }

    /// A completing query decrements the same version it incremented,
    /// regardless of what the current version is by then. `current_version`
    /// drives the stale-version cleanup below.
    pub fn decrease(&self, version: u32, current_version: u32) {
        let mut counts = self.counts.lock().unwrap();
        match counts.get_mut(&version) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    Self::cleanup_locked(&mut counts, current_version);
                }
            }
            _ => debug_assert!(false, "decrease on a version with no tracked count"),
        }
    }

    pub fn count(&self, version: u32) -> u32 {
        *self.counts.lock().unwrap().get(&version).unwrap_or(&0)
    }

    /// Removes every zero-count entry strictly older than `current_version`.
    /// Called implicitly whenever a decrease drops a count to zero, and can
    /// be invoked explicitly after a topology change is fully acknowledged.
    pub fn cleanup(&self, current_version: u32) {
        let mut counts = self.counts.lock().unwrap();
        Self::cleanup_locked(&mut counts, current_version);
    }

    fn cleanup_locked(counts: &mut HashMap<u32, u32>, current_version: u32) {
        counts.retain(|&version, &mut count| !(count == 0 && version < current_version));
    }

    pub fn can_start_trimming(&self, current_version: u32) -> bool {
        self.count(current_version) == 0
    }

    pub fn tracked_versions_count(&self) -> usize {
        self.counts.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_ranges_merge_adjacent() {
        let mut local = SlotSet::from_ranges(&[(5, 99)]);
        local.merge_from(&SlotSet::from_ranges(&[(100, 199)]));
        assert_eq!(local.to_ranges(), vec![(5, 199)]);
    }

    #[test]
    fn complete_import_merges_into_local() {
        let mut tracker = KeySpaceTracker::new();
        tracker.set_local(&SlotSet::from_ranges(&[(5, 99)]));
        tracker.start_import(&SlotSet::from_ranges(&[(100, 199)]));
        assert_eq!(tracker.partial().to_ranges(), vec![(100, 199)]);
        tracker.complete_import(&SlotSet::from_ranges(&[(100, 199)]));
        assert_eq!(tracker.local().to_ranges(), vec![(5, 199)]);
        assert!(tracker.partial().is_empty());
    }

    #[test]
    fn complete_migration_and_trim_do_not_bump_version() {
        let mut tracker = KeySpaceTracker::new();
        tracker.set_local(&SlotSet::from_ranges(&[(0, 999)]));
        let v = tracker.key_space_version();

        tracker.complete_migration(&SlotSet::from_ranges(&[(0, 999)]));
        assert_eq!(tracker.key_space_version(), v);

        tracker.start_trim(&SlotSet::from_ranges(&[(0, 999)]));
        assert_eq!(tracker.key_space_version(), v + 1);

        let v2 = tracker.key_space_version();
        tracker.complete_trim(&SlotSet::from_ranges(&[(0, 999)]));
        assert_eq!(tracker.key_space_version(), v2);
    }

    #[test]
    fn check_availability_stable_local() {
        let mut tracker = KeySpaceTracker::new();
        tracker.set_local(&SlotSet::from_ranges(&[(0, 999)]));
        let q = SlotSet::from_ranges(&[(0, 500)]);
        assert_eq!(tracker.check_availability(&q), Some(tracker.key_space_version()));
    }

    #[test]
    fn check_availability_unstable_when_overlapping_partial() {
        let mut tracker = KeySpaceTracker::new();
        tracker.set_local(&SlotSet::from_ranges(&[(0, 999)]));
        tracker.start_trim(&SlotSet::from_ranges(&[(500, 600)]));
        let q = SlotSet::from_ranges(&[(0, 999)]);
        // q is not a subset of local alone any more in a servable sense,
        // but is covered by local ∪ fully_available and overlaps partial.
        assert_eq!(tracker.check_availability(&q), Some(0));
    }

    #[test]
    fn check_availability_none_outside_servable_set() {
        let tracker = KeySpaceTracker::new();
        let q = SlotSet::from_ranges(&[(0, 10)]);
        assert_eq!(tracker.check_availability(&q), None);
    }

    /// End-to-end scenario 5: slot trim gated on in-flight query.
    #[test]
    fn scenario_trim_gated_on_in_flight_query() {
        let mut tracker = KeySpaceTracker::new();
        tracker.set_local(&SlotSet::from_ranges(&[(0, 999)]));
        let versions = KeySpaceVersionTracker::new();

        let v = tracker.key_space_version();
        versions.increase(v);

        tracker.start_trim(&SlotSet::from_ranges(&[(0, 999)]));
        assert_eq!(tracker.key_space_version(), v + 1);
        assert!(!versions.can_start_trimming(tracker.key_space_version()));

        versions.decrease(v, tracker.key_space_version());
        assert!(versions.can_start_trimming(tracker.key_space_version()));

        let v_before_trim = tracker.key_space_version();
        tracker.complete_trim(&SlotSet::from_ranges(&[(0, 999)]));
        assert_eq!(tracker.key_space_version(), v_before_trim);
    }

    #[test]
    fn old_versions_cleaned_up_once_drained() {
        let versions = KeySpaceVersionTracker::new();
        versions.increase(1);
        versions.increase(2);
        versions.decrease(1, 2);
        assert_eq!(versions.tracked_versions_count(), 1);
        assert_eq!(versions.count(1), 0);
    }
}

//! Long-lived iterator handles with idle TTL eviction, per-index quotas, and
//! throttled GC sweeps. Grounded on the host's `cursor.c`: a hash lookup by
//! id, a vector of idle cursors with swap-remove for O(1) eviction, and a
//! per-index `{used, capacity}` quota map.

use std::collections::HashMap;
use thiserror::Error;

use rand::RngCore;

/// Every `SWEEP_INTERVAL` cursor operations, a GC sweep is attempted.
pub const SWEEP_INTERVAL_OPS: u64 = 1000;
/// A GC sweep is skipped unless this much time has passed since the last
/// one, unless explicitly forced.
pub const SWEEP_THROTTLE_NS: u64 = 500_000_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("Index `{0}` does not have cursors enabled")]
    NoSuchIndex(String),
    #[error("Too many cursors allocated for index")]
    QuotaExceeded,
}

#[derive(Debug, Clone)]
pub struct Cursor {
    pub id: u64,
    pub index_name: String,
    pub timeout_interval_ms: u64,
    next_timeout_ns: u64,
    /// `-1` means actively executing; otherwise the cursor's index in the
    /// idle vector.
    pos: i32,
}

impl Cursor {
    pub fn is_idle(&self) -> bool {
        self.pos != -1
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct IndexQuota {
    used: u32,
    capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorStats {
    pub global_idle: u32,
    pub global_total: u32,
    pub index_capacity: u32,
    pub index_total: u32,
}

pub struct CursorRegistry {
    lookup: HashMap<u64, Cursor>,
    /// Ids of idle cursors; `Cursor::pos` indexes back into this vector.
    idle: Vec<u64>,
    specs: HashMap<String, IndexQuota>,
    op_counter: u64,
    last_collect_ns: u64,
    next_idle_timeout_ns: u64,
}

impl Default for CursorRegistry {
    fn default() -> Self {
        CursorRegistry {
            lookup: HashMap::new(),
            idle: Vec::new(),
            specs: HashMap::new(),
            op_counter: 0,
            last_collect_ns: 0,
            next_idle_timeout_ns: u64::MAX,
        }
    }
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_index(&mut self, index_name: impl Into<String>, capacity: u32) {
        self.specs
            .entry(index_name.into())
            .or_insert(IndexQuota { used: 0, capacity })
            .capacity = capacity;
    }

    pub fn unregister_index(&mut self, index_name: &str) {
        self.specs.remove(index_name);
    }

    fn next_id(&self) -> u64 {
        loop {
            // `lrand48() + 1`-equivalent: a random nonzero id, 0 reserved
            // for "invalid / end-of-stream".
            let candidate = (rand::thread_rng().next_u64() & 0xffff_ffff) + 1;
            if !self.lookup.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Reserves a new cursor for `index_name`. On quota exhaustion, forces
    /// one GC sweep and retries once before failing.
    pub fn reserve(
        &mut self,
        index_name: &str,
        timeout_interval_ms: u64,
        now_ns: u64,
    ) -> Result<u64, CursorError> {
        self.maybe_gc(now_ns);

        if !self.try_reserve_quota(index_name) {
            self.gc(now_ns, true);
            if !self.try_reserve_quota(index_name) {
                return Err(CursorError::QuotaExceeded);
            }
        }

        let id = self.next_id();
        let cursor = Cursor {
            id,
            index_name: index_name.to_string(),
            timeout_interval_ms,
            next_timeout_ns: 0,
            pos: -1,
        };
        self.lookup.insert(id, cursor);
        Ok(id)
    }

    fn try_reserve_quota(&mut self, index_name: &str) -> bool {
        match self.specs.get_mut(index_name) {
            None => false,
            Some(quota) if quota.used < quota.capacity => {
                quota.used += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Looks up registration: returns `Err(NoSuchIndex)` up front if the
    /// index was never registered for cursors, prior to attempting a
    /// reservation — matches the source's two distinct error paths.
    pub fn reserve_checked(
        &mut self,
        index_name: &str,
        timeout_interval_ms: u64,
        now_ns: u64,
    ) -> Result<u64, CursorError> {
        if !self.specs.contains_key(index_name) {
            return Err(CursorError::NoSuchIndex(index_name.to_string()));
        }
        self.reserve(index_name, timeout_interval_ms, now_ns)
    }

    /// Marks a cursor idle: schedules its next timeout and pushes it onto
    /// the idle vector. O(1).
    pub fn pause(&mut self, id: u64, now_ns: u64) {
        let Some(cursor) = self.lookup.get_mut(&id) else {
            return;
        };
        let next_timeout_ns = now_ns + cursor.timeout_interval_ms * 1_000_000;
        cursor.next_timeout_ns = next_timeout_ns;
        cursor.pos = self.idle.len() as i32;
        self.idle.push(id);
        self.next_idle_timeout_ns = self.next_idle_timeout_ns.min(next_timeout_ns);
    }

    /// Takes a cursor for execution. Only succeeds if the cursor is
    /// currently idle; an already-executing cursor returns `None`.
    pub fn take(&mut self, id: u64) -> Option<Cursor> {
        let is_idle = self.lookup.get(&id).map(Cursor::is_idle).unwrap_or(false);
        if !is_idle {
            return None;
        }
        self.remove_from_idle(id);
        let mut cursor = self.lookup.get(&id).cloned()?;
        cursor.pos = -1;
        self.lookup.insert(id, cursor.clone());
        Some(cursor)
    }

    /// Swap-remove of `id` from the idle vector, fixing up the swapped
    /// cursor's recorded position.
    fn remove_from_idle(&mut self, id: u64) {
        let Some(cursor) = self.lookup.get(&id) else {
            return;
        };
        let pos = cursor.pos;
        if pos < 0 {
            return;
        }
        let pos = pos as usize;
        let was_soonest = self
            .lookup
            .get(&id)
            .map(|c| c.next_timeout_ns == self.next_idle_timeout_ns)
            .unwrap_or(false);

        self.idle.swap_remove(pos);
        if pos < self.idle.len() {
            let moved_id = self.idle[pos];
            if let Some(moved) = self.lookup.get_mut(&moved_id) {
                moved.pos = pos as i32;
            }
        }
        if was_soonest {
            // The soonest-timeout cursor was just removed; the real next
            // deadline will be recomputed by the next GC sweep.
            self.next_idle_timeout_ns = 0;
        }
    }

    pub fn purge(&mut self, id: u64) {
        if let Some(cursor) = self.lookup.get(&id).cloned() {
            if cursor.is_idle() {
                self.remove_from_idle(id);
            }
            if let Some(quota) = self.specs.get_mut(&cursor.index_name) {
                quota.used = quota.used.saturating_sub(1);
            }
            self.lookup.remove(&id);
        }
    }

    pub fn purge_by_name(&mut self, index_name: &str) {
        let ids: Vec<u64> = self
            .lookup
            .values()
            .filter(|c| c.index_name == index_name)
            .map(|c| c.id)
            .collect();
        for id in ids {
            self.purge(id);
        }
    }

    fn maybe_gc(&mut self, now_ns: u64) {
        self.op_counter += 1;
        if self.op_counter % SWEEP_INTERVAL_OPS == 0 {
            self.gc(now_ns, false);
        }
    }

    /// Sweeps expired idle cursors. Skipped unless a cursor is actually
    /// known to have expired, or unless `force` is set and the throttle
    /// window has elapsed.
    pub fn gc(&mut self, now_ns: u64, force: bool) {
        if now_ns < self.next_idle_timeout_ns {
            return;
        }
        if !force && now_ns.saturating_sub(self.last_collect_ns) < SWEEP_THROTTLE_NS {
            return;
        }
        self.last_collect_ns = now_ns;

        let expired: Vec<u64> = self
            .idle
            .iter()
            .filter_map(|&id| {
                self.lookup
                    .get(&id)
                    .filter(|c| c.next_timeout_ns <= now_ns)
                    .map(|_| id)
            })
            .collect();

        for id in expired.iter() {
            tracing::debug!(cursor.id = id, "evicting idle cursor past timeout");
            self.purge(*id);
        }
        metrics_bridge::record_cursor_sweep(expired.len() as u64);
        metrics_bridge::record_active_cursors(self.lookup.len() as u64);

        self.next_idle_timeout_ns = self
            .idle
            .iter()
            .filter_map(|id| self.lookup.get(id).map(|c| c.next_timeout_ns))
            .min()
            .unwrap_or(u64::MAX);
    }

    pub fn stats(&self, index_name: &str) -> CursorStats {
        let quota = self.specs.get(index_name).copied().unwrap_or_default();
        CursorStats {
            global_idle: self.idle.len() as u32,
            global_total: self.lookup.len() as u32,
            index_capacity: quota.capacity,
            index_total: quota.used,
        }
    }
}

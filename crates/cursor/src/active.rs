//! Per-thread registry of live queries and cursor reads, for crash-safe
//! introspection. The source models this as a doubly-linked list threaded
//! through thread-local storage; Rust ownership makes raw intrusive
//! pointers impractical, so this is a slab with a free list instead, wrapped
//! in one `thread_local!` so it never crosses threads while a query is
//! alive (see the re-architecture note on pseudo-TLS in the design notes).

use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq)]
pub enum ActiveEntry {
    Query {
        created_at_ns: u64,
        index_name: String,
    },
    Cursor {
        created_at_ns: u64,
        index_name: String,
        cursor_id: u64,
        count: u64,
    },
}

#[derive(Default)]
pub struct ActiveRegistry {
    slots: Vec<Option<ActiveEntry>>,
    free: Vec<usize>,
}

impl ActiveRegistry {
    fn insert(&mut self, entry: ActiveEntry) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(entry);
            idx
        } else {
            self.slots.push(Some(entry));
            self.slots.len() - 1
        }
    }

    fn remove(&mut self, idx: usize) {
        if idx < self.slots.len() {
            self.slots[idx] = None;
            self.free.push(idx);
        }
    }

    pub fn snapshot(&self) -> Vec<ActiveEntry> {
        self.slots.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

thread_local! {
    static REGISTRY: RefCell<ActiveRegistry> = RefCell::new(ActiveRegistry::default());
}

/// Registration handle: removes its entry from the thread-local registry
/// when dropped, mirroring the source's node-unlink-on-completion pattern.
pub struct ActiveRegistryHandle {
    idx: usize,
    // Not Send: a handle must be dropped on the thread that created it,
    // since it references thread-local state by index.
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ActiveRegistryHandle {
    pub fn register(entry: ActiveEntry) -> Self {
        let idx = REGISTRY.with(|r| r.borrow_mut().insert(entry));
        ActiveRegistryHandle {
            idx,
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for ActiveRegistryHandle {
    fn drop(&mut self) {
        REGISTRY.with(|r| r.borrow_mut().remove(self.idx));
    }
}

/// Snapshot of all entries live on the calling thread right now.
pub fn snapshot() -> Vec<ActiveEntry> {
    REGISTRY.with(|r| r.borrow().snapshot())
}

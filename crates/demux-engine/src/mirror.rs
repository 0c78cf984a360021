// crates/demux-engine/src/mirror.rs
//
// §9 Design Notes: the teacher pattern keeps three shadow copies of demuxer
// state (producer-owned, lock-protected, consumer-owned) to let the consumer
// read metadata without taking the main lock on every access. Here there is
// one authoritative Cache plus a single published snapshot: fields fixed
// after init, and a small mutable-metadata bundle, both behind their own
// short-lived lock that the worker swaps wholesale on a MirrorEvents change.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use demux_core::{MirrorEvents, StreamKind};

/// Fields that never change once the producer has finished opening.
#[derive(Debug, Clone)]
pub struct InitInfo {
    pub stream_kinds: Vec<StreamKind>,
    pub seekable: bool,
    pub base_filename: Option<String>,
    pub size: Option<u64>,
}

/// Fields that can be revised while the cache is running (tags discovered
/// mid-stream, a duration estimate that improves as more of the file is
/// read).
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub tags: HashMap<String, String>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub init: InitInfo,
    pub metadata: Metadata,
}

/// Holds the currently published snapshot. The worker calls `publish` under
/// its own lock (never the main Cache mutex) after building a new snapshot;
/// readers call `current` without touching the main mutex at all.
pub struct StateMirror {
    current: Mutex<Arc<CacheSnapshot>>,
}

impl StateMirror {
    pub fn new(init: InitInfo) -> Self {
        StateMirror {
            current: Mutex::new(Arc::new(CacheSnapshot {
                init,
                metadata: Metadata::default(),
            })),
        }
    }

    pub fn current(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.current.lock().unwrap())
    }

    /// Replace the published snapshot. `events` documents what changed, for
    /// callers that want to avoid redundant work on an unrelated field
    /// change, but the swap itself is always atomic and whole.
    pub fn publish(&self, snapshot: CacheSnapshot, events: MirrorEvents) {
        let _ = events;
        *self.current.lock().unwrap() = Arc::new(snapshot);
    }

    pub fn update_metadata(&self, f: impl FnOnce(&mut Metadata)) {
        let mut guard = self.current.lock().unwrap();
        let mut snapshot = (**guard).clone();
        f(&mut snapshot.metadata);
        *guard = Arc::new(snapshot);
    }
}

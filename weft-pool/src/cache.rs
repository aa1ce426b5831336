//! Per-buffer decode result cache
//!
//! Keyed by buffer identity plus the canonical task-config serialization.
//! At most one decode ever starts per (buffer, config) pair: concurrent
//! callers share the same result cell, pending or completed.
//!
//! Entries are intentionally never evicted - conflict detection needs the
//! entry of a completed decode to outlive it, and the registry's lifetime
//! is the pool's. This is the deterministic substitute for a weak-keyed
//! map: identity is an explicit id, not a garbage-collected reference.

use std::sync::Arc;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use tokio::sync::OnceCell;
use weft_codec::DecodedGeometry;

use crate::{PoolError, task::EncodedBuffer};

/// Shared result slot for one (buffer, config) pair. The first caller
/// initializes it by running the decode; everyone else awaits it.
pub(crate) type ResultCell = OnceCell<Result<Arc<DecodedGeometry>, PoolError>>;

struct CacheEntry {
    config_key: String,
    cell: Arc<ResultCell>,
}

pub(crate) enum CacheOutcome {
    /// Same buffer, same config: share the existing result cell.
    Reused(Arc<ResultCell>),
    /// No usable entry existed; a fresh cell was stored.
    Fresh(Arc<ResultCell>),
    /// Different config after the buffer's bytes were already moved to a
    /// worker. Fatal: the payload no longer exists to re-decode.
    Conflict,
}

pub(crate) struct TaskCache {
    entries: HashMap<u64, CacheEntry>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look the buffer up, storing a fresh cell when permitted.
    ///
    /// A different config while the bytes are still present replaces the
    /// entry (the payload can simply be decoded again); after transfer it
    /// is a conflict.
    pub fn check(&mut self, buffer: &EncodedBuffer, config_key: &str) -> CacheOutcome {
        match self.entries.entry(buffer.id()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().config_key == config_key {
                    return CacheOutcome::Reused(occupied.get().cell.clone());
                }
                if buffer.is_transferred() {
                    return CacheOutcome::Conflict;
                }
                let cell = Arc::new(ResultCell::new());
                occupied.insert(CacheEntry {
                    config_key: config_key.to_owned(),
                    cell: cell.clone(),
                });
                CacheOutcome::Fresh(cell)
            }
            Entry::Vacant(vacant) => {
                let cell = Arc::new(ResultCell::new());
                vacant.insert(CacheEntry {
                    config_key: config_key.to_owned(),
                    cell: cell.clone(),
                });
                CacheOutcome::Fresh(cell)
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

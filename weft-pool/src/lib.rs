//! Weft-Pool: asynchronous compressed-mesh decoding worker pool
//!
//! Decouples CPU-intensive mesh decoding from the submitting context.
//! A bounded set of worker threads each owns one private decoder instance;
//! tasks are placed on the least-loaded worker (weighted by encoded byte
//! length) and results are memoized per submitted buffer.
//!
//! # Architecture
//!
//! ```text
//! Caller (async)               Pool manager                 Decode worker
//!     │                             │                             │
//! [submit]──(cache check)──►[acquire: least-loaded]              │
//!     │                     [record cost + callback]──(chan)──►[decode]
//!     │                             │                             │
//!   await ◄────(oneshot)────[release cost]◄─────────(chan)─────[respond]
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use weft_codec::WeftLoader;
//! use weft_pool::{DecodePool, EncodedBuffer, PoolConfig, TaskConfig};
//!
//! # async fn demo(encoded: Vec<u8>) {
//! let pool = DecodePool::new(PoolConfig::default(), Arc::new(WeftLoader::new()));
//! let buffer = EncodedBuffer::new(encoded);
//! let geometry = pool
//!     .submit(&buffer, TaskConfig::with_default_attributes())
//!     .await
//!     .unwrap();
//! let buffers = weft_pool::assemble(&geometry);
//! # let _ = buffers;
//! # }
//! ```
//!
//! # Guarantees and gaps
//!
//! - At most one decode ever starts per (buffer identity, config) pair;
//!   concurrent duplicate submissions share one pending result.
//! - Tasks dispatched to the same worker complete in submission order;
//!   no ordering is guaranteed across workers, and there is no priority
//!   mechanism beyond load-based placement.
//! - No per-task cancellation or timeout. A submitted task completes,
//!   fails, or is rejected when the pool shuts down.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod cache;
mod pool;
mod task;
mod worker;

pub mod assembly;


pub use assembly::{AttributeView, GeometryBuffers, IndexView, assemble};
pub use pool::DecodePool;
pub use task::{AttributeRequest, EncodedBuffer, TaskConfig};

// Re-export the codec boundary so embedders only need one crate.
pub use weft_codec::{
    AttributeArray, CodecError, DecodedAttribute, DecodedGeometry, DecoderInstance, DecoderModule,
    ModuleLoader, PayloadKind, ScalarType, Semantic,
};

/// Default number of decode workers.
pub const DEFAULT_WORKER_LIMIT: usize = 4;

/// Pool configuration, embeddable in application config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of decode worker threads. Values below 1 are
    /// treated as 1.
    pub worker_limit: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_limit: DEFAULT_WORKER_LIMIT,
        }
    }
}

/// Errors surfaced to the submitting caller.
///
/// Every error reaches exactly the callers waiting on the affected task;
/// nothing is swallowed internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The decoder module failed to load or a worker failed to create its
    /// decoder instance. Not retried automatically.
    #[error("decoder module initialization failed: {0}")]
    Init(#[source] CodecError),

    /// The decoder reported a failure for this payload. The worker stays
    /// usable for subsequent tasks.
    #[error("decode failed: {0}")]
    Decode(#[source] CodecError),

    /// A buffer already transferred to a worker was resubmitted under a
    /// different configuration. Fatal and non-retryable.
    #[error("cannot decode the same buffer twice with different settings")]
    ConfigConflict,

    /// The buffer's bytes were already moved to a worker and no cached
    /// result is available to share.
    #[error("encoded buffer was already transferred to a worker")]
    BufferTransferred,

    /// The pool was shut down before the task completed.
    #[error("decode pool was shut down before the task completed")]
    Shutdown,

    /// The assigned worker thread terminated without answering.
    #[error("decode worker terminated unexpectedly")]
    WorkerLost,
}

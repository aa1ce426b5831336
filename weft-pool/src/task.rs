//! Task configuration and buffer identity
//!
//! An [`EncodedBuffer`] gives a byte buffer a stable identity for the task
//! cache and models the transfer semantics of submission: the first dispatch
//! moves the bytes out of the handle, after which it has zero remaining
//! length and can never be dispatched again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use weft_codec::{ScalarType, Semantic};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// An encoded mesh or point-cloud payload with a unique identity.
pub struct EncodedBuffer {
    id: u64,
    len: usize,
    bytes: Mutex<Option<Vec<u8>>>,
}

impl EncodedBuffer {
    pub fn new(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            len: bytes.len(),
            bytes: Mutex::new(Some(bytes)),
        })
    }

    /// Identity of this buffer; never reused within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Original encoded length in bytes (the task's scheduling cost).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the bytes were already moved to a worker.
    pub fn is_transferred(&self) -> bool {
        self.bytes.lock().unwrap().is_none()
    }

    /// Move the bytes out. Returns `None` if already transferred.
    pub(crate) fn take(&self) -> Option<Vec<u8>> {
        self.bytes.lock().unwrap().take()
    }
}

/// One attribute the caller wants extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRequest {
    /// Output name in the decoded geometry (e.g. "position").
    pub name: String,
    /// Default semantic slot to look the attribute up by.
    pub semantic: Semantic,
    /// File-assigned unique id, used instead of the semantic slot when
    /// [`TaskConfig::use_unique_ids`] is set.
    pub unique_id: Option<u32>,
    /// Element type to extract into.
    pub scalar: ScalarType,
}

impl AttributeRequest {
    pub fn position() -> Self {
        Self {
            name: "position".into(),
            semantic: Semantic::Position,
            unique_id: None,
            scalar: ScalarType::F32,
        }
    }

    pub fn normal() -> Self {
        Self {
            name: "normal".into(),
            semantic: Semantic::Normal,
            unique_id: None,
            scalar: ScalarType::F32,
        }
    }

    pub fn color() -> Self {
        Self {
            name: "color".into(),
            semantic: Semantic::Color,
            unique_id: None,
            scalar: ScalarType::F32,
        }
    }

    pub fn tex_coord() -> Self {
        Self {
            name: "uv".into(),
            semantic: Semantic::TexCoord,
            unique_id: None,
            scalar: ScalarType::F32,
        }
    }
}

/// Immutable description of one decode task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Attributes to extract, in output order.
    pub attributes: Vec<AttributeRequest>,
    /// Address attributes by unique id instead of semantic slot. With
    /// unique ids, a missing attribute is a caller error; with semantic
    /// slots it is silently skipped.
    pub use_unique_ids: bool,
}

impl TaskConfig {
    /// The standard attribute set: position, normal, color, uv.
    pub fn with_default_attributes() -> Self {
        Self {
            attributes: vec![
                AttributeRequest::position(),
                AttributeRequest::normal(),
                AttributeRequest::color(),
                AttributeRequest::tex_coord(),
            ],
            use_unique_ids: false,
        }
    }

    /// Canonical serialization used as the task-cache key. Two configs
    /// cache independently unless they serialize identically.
    pub(crate) fn cache_key(&self) -> String {
        serde_json::to_string(self).expect("task config serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_transfer_semantics() {
        let buffer = EncodedBuffer::new(vec![1, 2, 3, 4]);
        assert_eq!(buffer.len(), 4);
        assert!(!buffer.is_transferred());

        let bytes = buffer.take().unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert!(buffer.is_transferred());
        assert!(buffer.take().is_none());
        // The scheduling cost survives the transfer.
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_buffer_ids_unique() {
        let a = EncodedBuffer::new(vec![0]);
        let b = EncodedBuffer::new(vec![0]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_cache_key_distinguishes_configs() {
        let base = TaskConfig::with_default_attributes();
        let mut unique = base.clone();
        unique.use_unique_ids = true;

        assert_eq!(base.cache_key(), base.clone().cache_key());
        assert_ne!(base.cache_key(), unique.cache_key());
    }
}

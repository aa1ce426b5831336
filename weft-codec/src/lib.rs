//! Weft-Codec: mesh interchange codec and decoder capability boundary
//!
//! This crate defines two things:
//!
//! 1. The **decoder capability boundary** used by `weft-pool`: the
//!    [`ModuleLoader`] / [`DecoderModule`] / [`DecoderInstance`] traits plus
//!    the geometry data model ([`DecodedGeometry`], [`AttributeArray`],
//!    [`Semantic`], [`ScalarType`]). The pool's scheduling, caching, and
//!    worker logic only ever sees these traits, so any compressed-mesh
//!    decoder can sit behind them.
//! 2. A complete **reference codec** for the Weft interchange format
//!    (encoder in [`encode`], decoder in [`decode`]). The format is an
//!    uncompressed POD layout - it stands in for a native decoder module,
//!    it is not a compression scheme.
//!
//! # Weft payload layout
//!
//! ```text
//! Header (12 bytes):
//!   0x00: kind (u8)            0 = point cloud, 1 = triangle mesh
//!   0x01: attribute_count (u8)
//!   0x02: padding (2 bytes)
//!   0x04: point_count (u32 LE)
//!   0x08: face_count (u32 LE)  0 for point clouds
//!
//! Attribute directory (8 bytes per attribute):
//!   0x00: semantic (u8)
//!   0x01: scalar (u8)
//!   0x02: components (u8)
//!   0x03: padding (1 byte)
//!   0x04: unique_id (u32 LE)
//!
//! Payload, in directory order:
//!   point_count * components * scalar_size bytes per attribute (LE)
//!
//! Index data (triangle mesh only):
//!   face_count * 3 * u32 LE
//! ```
//!
//! # Usage
//!
//! ```
//! use weft_codec::{
//!     AttributeArray, AttributeSpec, DecoderModule, PayloadKind, ScalarType, Semantic,
//!     WeftModule, encode_mesh,
//! };
//!
//! let spec = AttributeSpec {
//!     semantic: Semantic::Position,
//!     unique_id: 0,
//!     components: 3,
//!     array: AttributeArray::F32(vec![0.0; 9]),
//! };
//! let buffer = encode_mesh(3, &[spec], &[0, 1, 2]).unwrap();
//!
//! let module = WeftModule::new();
//! let mut instance = module.instantiate().unwrap();
//! assert_eq!(instance.parse(&buffer).unwrap(), PayloadKind::TriangleMesh);
//! assert_eq!(instance.point_count(), 3);
//! instance.reset();
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod decode;
mod encode;
mod format;
mod geometry;

pub use decode::{WeftInstance, WeftLoader, WeftModule};
pub use encode::{AttributeSpec, encode_mesh, encode_point_cloud};
pub use format::{
    WEFT_DIR_ENTRY_SIZE, WEFT_HEADER_SIZE, WEFT_KIND_POINT_CLOUD, WEFT_KIND_TRIANGLE_MESH,
    WeftDirEntry, WeftHeader,
};
pub use geometry::{DecodedAttribute, DecodedGeometry};

use std::sync::Arc;

// =============================================================================
// Attribute tags
// =============================================================================

/// Default semantic slots for per-vertex attributes.
///
/// These are the "default ID" addressing scheme: a payload carries at most
/// one attribute per semantic, and consumers look attributes up by slot.
/// The alternative scheme addresses attributes by their file-assigned
/// unique id instead (see [`DecoderInstance::attribute_by_unique_id`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Semantic {
    Position,
    Normal,
    Color,
    TexCoord,
}

impl Semantic {
    pub fn to_u8(self) -> u8 {
        match self {
            Semantic::Position => 0,
            Semantic::Normal => 1,
            Semantic::Color => 2,
            Semantic::TexCoord => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(Semantic::Position),
            1 => Ok(Semantic::Normal),
            2 => Ok(Semantic::Color),
            3 => Ok(Semantic::TexCoord),
            other => Err(CodecError::InvalidSemantic(other)),
        }
    }
}

/// Numeric element types an attribute can be stored as or extracted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl ScalarType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ScalarType::I8 => 0,
            ScalarType::U8 => 1,
            ScalarType::I16 => 2,
            ScalarType::U16 => 3,
            ScalarType::I32 => 4,
            ScalarType::U32 => 5,
            ScalarType::F32 => 6,
        }
    }

    pub fn from_u8(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(ScalarType::I8),
            1 => Ok(ScalarType::U8),
            2 => Ok(ScalarType::I16),
            3 => Ok(ScalarType::U16),
            4 => Ok(ScalarType::I32),
            5 => Ok(ScalarType::U32),
            6 => Ok(ScalarType::F32),
            other => Err(CodecError::InvalidScalar(other)),
        }
    }
}

// =============================================================================
// Attribute arrays
// =============================================================================

/// A flat, typed attribute array (`point_count * components` elements).
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeArray {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl AttributeArray {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            AttributeArray::I8(_) => ScalarType::I8,
            AttributeArray::U8(_) => ScalarType::U8,
            AttributeArray::I16(_) => ScalarType::I16,
            AttributeArray::U16(_) => ScalarType::U16,
            AttributeArray::I32(_) => ScalarType::I32,
            AttributeArray::U32(_) => ScalarType::U32,
            AttributeArray::F32(_) => ScalarType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AttributeArray::I8(v) => v.len(),
            AttributeArray::U8(v) => v.len(),
            AttributeArray::I16(v) => v.len(),
            AttributeArray::U16(v) => v.len(),
            AttributeArray::I32(v) => v.len(),
            AttributeArray::U32(v) => v.len(),
            AttributeArray::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as `f32` elements, if that is the stored type.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            AttributeArray::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Append the elements to `out` as little-endian bytes.
    pub fn write_le(&self, out: &mut Vec<u8>) {
        match self {
            AttributeArray::I8(v) => out.extend(v.iter().map(|e| *e as u8)),
            AttributeArray::U8(v) => out.extend_from_slice(v),
            AttributeArray::I16(v) => {
                for e in v {
                    out.extend_from_slice(&e.to_le_bytes());
                }
            }
            AttributeArray::U16(v) => {
                for e in v {
                    out.extend_from_slice(&e.to_le_bytes());
                }
            }
            AttributeArray::I32(v) => {
                for e in v {
                    out.extend_from_slice(&e.to_le_bytes());
                }
            }
            AttributeArray::U32(v) => {
                for e in v {
                    out.extend_from_slice(&e.to_le_bytes());
                }
            }
            AttributeArray::F32(v) => {
                for e in v {
                    out.extend_from_slice(&e.to_le_bytes());
                }
            }
        }
    }

    /// Convert into `target` elements, numerically casting each value.
    ///
    /// Same-type conversion is a move. Cross-type conversion goes through
    /// `f64`, matching extract-into-requested-type decoder behavior.
    pub fn convert(self, target: ScalarType) -> AttributeArray {
        if self.scalar_type() == target {
            return self;
        }
        let values = self.into_f64_vec();
        match target {
            ScalarType::I8 => AttributeArray::I8(values.iter().map(|v| *v as i8).collect()),
            ScalarType::U8 => AttributeArray::U8(values.iter().map(|v| *v as u8).collect()),
            ScalarType::I16 => AttributeArray::I16(values.iter().map(|v| *v as i16).collect()),
            ScalarType::U16 => AttributeArray::U16(values.iter().map(|v| *v as u16).collect()),
            ScalarType::I32 => AttributeArray::I32(values.iter().map(|v| *v as i32).collect()),
            ScalarType::U32 => AttributeArray::U32(values.iter().map(|v| *v as u32).collect()),
            ScalarType::F32 => AttributeArray::F32(values.iter().map(|v| *v as f32).collect()),
        }
    }

    fn into_f64_vec(self) -> Vec<f64> {
        match self {
            AttributeArray::I8(v) => v.into_iter().map(f64::from).collect(),
            AttributeArray::U8(v) => v.into_iter().map(f64::from).collect(),
            AttributeArray::I16(v) => v.into_iter().map(f64::from).collect(),
            AttributeArray::U16(v) => v.into_iter().map(f64::from).collect(),
            AttributeArray::I32(v) => v.into_iter().map(f64::from).collect(),
            AttributeArray::U32(v) => v.into_iter().map(f64::from).collect(),
            AttributeArray::F32(v) => v.into_iter().map(f64::from).collect(),
        }
    }
}

// =============================================================================
// Error type
// =============================================================================

/// Errors produced by the codec boundary.
///
/// `Clone` because decode results are memoized and fanned out to every
/// caller waiting on the same buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too small for weft header")]
    BufferTooSmall,
    #[error("payload truncated (needed {needed} bytes, had {available})")]
    Truncated { needed: usize, available: usize },
    #[error("invalid payload kind {0}")]
    InvalidKind(u8),
    #[error("invalid scalar tag {0}")]
    InvalidScalar(u8),
    #[error("invalid semantic tag {0}")]
    InvalidSemantic(u8),
    #[error("invalid component count {0} (must be 1-4)")]
    InvalidComponents(u8),
    #[error("attribute array length mismatch (expected {expected}, found {found})")]
    LengthMismatch { expected: usize, found: usize },
    #[error("index count {0} is not a multiple of 3")]
    InvalidIndexCount(usize),
    #[error("no parsed payload (parse was not called or already reset)")]
    NoPayload,
    #[error("payload has no index data")]
    NoIndexData,
    #[error("attribute id {0} out of range for parsed payload")]
    InvalidAttribute(u32),
    #[error("unknown attribute unique id {0}")]
    UnknownUniqueId(u32),
    #[error("attribute '{0}' requested by unique id but none was provided")]
    MissingUniqueId(String),
    #[error("decoded geometry is empty")]
    EmptyGeometry,
    #[error("decoder module failed to load: {0}")]
    ModuleLoad(String),
}

// =============================================================================
// Decoder capability boundary
// =============================================================================

/// What an encoded payload contains. A property of the data, not the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    PointCloud,
    TriangleMesh,
}

/// Index of an attribute inside a parsed payload's directory.
pub type AttributeId = u32;

/// One-time loader for a decoder module.
///
/// Loading may be expensive (a native/WASM build behind a real decoder);
/// the pool memoizes the result process-wide, including failures.
pub trait ModuleLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn DecoderModule>, CodecError>;
}

/// A loaded decoder module. Shared by every worker; each worker creates
/// its own private instance so decodes run in parallel without locking.
pub trait DecoderModule: Send + Sync {
    fn instantiate(&self) -> Result<Box<dyn DecoderInstance>, CodecError>;
}

/// One decoder execution state, owned by exactly one worker.
///
/// A decode is `parse` followed by lookups/reads, terminated by `reset`.
/// Every scratch allocation made between `parse` and `reset` belongs to
/// that decode and must be released by `reset` - callers are expected to
/// guarantee `reset` runs on every exit path, including failures.
pub trait DecoderInstance: Send {
    /// Parse the payload header and attribute directory, allocating
    /// per-decode scratch. Returns what the payload contains.
    fn parse(&mut self, data: &[u8]) -> Result<PayloadKind, CodecError>;

    /// Number of points (vertices) in the parsed payload.
    fn point_count(&self) -> usize;

    /// Number of triangle faces in the parsed payload (0 for point clouds).
    fn face_count(&self) -> usize;

    /// Look an attribute up by its default semantic slot.
    fn attribute_by_semantic(&self, semantic: Semantic) -> Option<AttributeId>;

    /// Look an attribute up by its file-assigned unique id.
    fn attribute_by_unique_id(&self, unique_id: u32) -> Option<AttributeId>;

    /// Components per element (itemSize) of a directory attribute.
    fn components(&self, attr: AttributeId) -> usize;

    /// Extract an attribute into a newly allocated array of
    /// `point_count * components` elements of the requested type.
    fn read_attribute(&mut self, attr: AttributeId, scalar: ScalarType)
    -> Result<AttributeArray, CodecError>;

    /// Read the triangle list as `face_count * 3` flat `u32`s.
    fn read_indices(&mut self) -> Result<Vec<u32>, CodecError>;

    /// Release all scratch held from the last `parse`. Idempotent.
    fn reset(&mut self);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn position_spec(values: Vec<f32>) -> AttributeSpec {
        AttributeSpec {
            semantic: Semantic::Position,
            unique_id: 0,
            components: 3,
            array: AttributeArray::F32(values),
        }
    }

    #[test]
    fn test_roundtrip_triangle_mesh() {
        let positions = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let buffer = encode_mesh(3, &[position_spec(positions.clone())], &[0, 1, 2]).unwrap();

        let module = WeftModule::new();
        let mut instance = module.instantiate().unwrap();
        assert_eq!(instance.parse(&buffer).unwrap(), PayloadKind::TriangleMesh);
        assert_eq!(instance.point_count(), 3);
        assert_eq!(instance.face_count(), 1);

        let attr = instance.attribute_by_semantic(Semantic::Position).unwrap();
        assert_eq!(instance.components(attr), 3);
        let array = instance.read_attribute(attr, ScalarType::F32).unwrap();
        assert_eq!(array.as_f32().unwrap(), positions.as_slice());

        assert_eq!(instance.read_indices().unwrap(), vec![0, 1, 2]);
        instance.reset();
        assert_eq!(module.outstanding_allocations(), 0);
    }

    #[test]
    fn test_roundtrip_point_cloud() {
        let positions: Vec<f32> = (0..15).map(|i| i as f32).collect();
        let buffer = encode_point_cloud(5, &[position_spec(positions.clone())]).unwrap();

        let module = WeftModule::new();
        let mut instance = module.instantiate().unwrap();
        assert_eq!(instance.parse(&buffer).unwrap(), PayloadKind::PointCloud);
        assert_eq!(instance.point_count(), 5);
        assert_eq!(instance.face_count(), 0);
        assert_eq!(instance.read_indices(), Err(CodecError::NoIndexData));
        instance.reset();
    }

    #[test]
    fn test_unique_id_lookup() {
        let normal = AttributeSpec {
            semantic: Semantic::Normal,
            unique_id: 7,
            components: 3,
            array: AttributeArray::F32(vec![0.0, 1.0, 0.0]),
        };
        let buffer = encode_point_cloud(1, &[normal]).unwrap();

        let module = WeftModule::new();
        let mut instance = module.instantiate().unwrap();
        instance.parse(&buffer).unwrap();
        assert!(instance.attribute_by_unique_id(7).is_some());
        assert!(instance.attribute_by_unique_id(8).is_none());
        assert!(instance.attribute_by_semantic(Semantic::Position).is_none());
        instance.reset();
    }

    #[test]
    fn test_scalar_conversion() {
        let colors = AttributeSpec {
            semantic: Semantic::Color,
            unique_id: 1,
            components: 3,
            array: AttributeArray::U8(vec![0, 128, 255]),
        };
        let buffer = encode_point_cloud(1, &[colors]).unwrap();

        let module = WeftModule::new();
        let mut instance = module.instantiate().unwrap();
        instance.parse(&buffer).unwrap();
        let attr = instance.attribute_by_semantic(Semantic::Color).unwrap();
        let array = instance.read_attribute(attr, ScalarType::F32).unwrap();
        assert_eq!(array.as_f32().unwrap(), &[0.0, 128.0, 255.0]);
        instance.reset();
    }

    #[test]
    fn test_truncated_payload_fails_at_read() {
        let positions = vec![0.0f32; 9];
        let mut buffer = encode_mesh(3, &[position_spec(positions)], &[0, 1, 2]).unwrap();
        // Keep the header and directory, cut into the attribute payload.
        buffer.truncate(WEFT_HEADER_SIZE + WEFT_DIR_ENTRY_SIZE + 4);

        let module = WeftModule::new();
        let mut instance = module.instantiate().unwrap();
        instance.parse(&buffer).unwrap();
        let attr = instance.attribute_by_semantic(Semantic::Position).unwrap();
        let err = instance.read_attribute(attr, ScalarType::F32).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));

        instance.reset();
        assert_eq!(module.outstanding_allocations(), 0);
    }

    #[test]
    fn test_header_too_small() {
        let module = WeftModule::new();
        let mut instance = module.instantiate().unwrap();
        assert_eq!(instance.parse(&[1, 2, 3]), Err(CodecError::BufferTooSmall));
        assert_eq!(module.outstanding_allocations(), 0);
    }

    #[test]
    fn test_encode_rejects_length_mismatch() {
        let bad = AttributeSpec {
            semantic: Semantic::Position,
            unique_id: 0,
            components: 3,
            array: AttributeArray::F32(vec![0.0; 8]), // needs 9 for 3 points
        };
        let err = encode_point_cloud(3, &[bad]).unwrap_err();
        assert_eq!(err, CodecError::LengthMismatch { expected: 9, found: 8 });
    }

    #[test]
    fn test_parse_releases_previous_scratch() {
        let buffer = encode_point_cloud(1, &[position_spec(vec![0.0; 3])]).unwrap();
        let module = WeftModule::new();
        let mut instance = module.instantiate().unwrap();

        instance.parse(&buffer).unwrap();
        instance.parse(&buffer).unwrap(); // re-parse without reset
        assert_eq!(module.outstanding_allocations(), 1);
        instance.reset();
        instance.reset(); // idempotent
        assert_eq!(module.outstanding_allocations(), 0);
    }
}

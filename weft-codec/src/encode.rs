//! Weft encoder implementation
//!
//! Builds Weft payloads from point or mesh data. Used by tests and by asset
//! pipelines that want to feed the decode pool without a native encoder.

use crate::format::{WEFT_KIND_POINT_CLOUD, WEFT_KIND_TRIANGLE_MESH, WeftDirEntry, WeftHeader};
use crate::{AttributeArray, CodecError, Semantic};

/// Source data for one attribute being encoded.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub semantic: Semantic,
    pub unique_id: u32,
    pub components: u8,
    /// Flat array of `point_count * components` elements.
    pub array: AttributeArray,
}

/// Encode a point cloud payload (no index data).
pub fn encode_point_cloud(
    point_count: u32,
    attributes: &[AttributeSpec],
) -> Result<Vec<u8>, CodecError> {
    encode(WEFT_KIND_POINT_CLOUD, point_count, attributes, &[])
}

/// Encode a triangle mesh payload. `indices` is the flat triangle list.
pub fn encode_mesh(
    point_count: u32,
    attributes: &[AttributeSpec],
    indices: &[u32],
) -> Result<Vec<u8>, CodecError> {
    if indices.len() % 3 != 0 {
        return Err(CodecError::InvalidIndexCount(indices.len()));
    }
    encode(WEFT_KIND_TRIANGLE_MESH, point_count, attributes, indices)
}

fn encode(
    kind: u8,
    point_count: u32,
    attributes: &[AttributeSpec],
    indices: &[u32],
) -> Result<Vec<u8>, CodecError> {
    for spec in attributes {
        if spec.components == 0 || spec.components > 4 {
            return Err(CodecError::InvalidComponents(spec.components));
        }
        let expected = point_count as usize * spec.components as usize;
        if spec.array.len() != expected {
            return Err(CodecError::LengthMismatch {
                expected,
                found: spec.array.len(),
            });
        }
    }

    let header = WeftHeader {
        kind,
        attribute_count: attributes.len() as u8,
        point_count,
        face_count: (indices.len() / 3) as u32,
    };

    let payload_size: usize = attributes
        .iter()
        .map(|s| s.array.len() * s.array.scalar_type().size())
        .sum();
    let mut out = Vec::with_capacity(
        WeftHeader::SIZE + attributes.len() * WeftDirEntry::SIZE + payload_size + indices.len() * 4,
    );

    out.extend_from_slice(&header.to_bytes());
    for spec in attributes {
        let entry = WeftDirEntry {
            semantic: spec.semantic.to_u8(),
            scalar: spec.array.scalar_type().to_u8(),
            components: spec.components,
            unique_id: spec.unique_id,
        };
        out.extend_from_slice(&entry.to_bytes());
    }
    for spec in attributes {
        spec.array.write_le(&mut out);
    }
    for index in indices {
        out.extend_from_slice(&index.to_le_bytes());
    }
    Ok(out)
}

//! Geometry assembly
//!
//! Flattens a [`DecodedGeometry`] into contiguous byte buffers ready for
//! upload: one vertex buffer per attribute, plus an optional index buffer.
//! Interleaving is left to the embedder; attributes keep the order the
//! decode produced them in.

use weft_codec::{AttributeArray, DecodedGeometry, ScalarType};

/// One attribute flattened to upload-ready bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeView {
    pub name: String,
    /// Components per vertex (3 for positions, 2 for uvs, ...).
    pub item_size: usize,
    pub scalar: ScalarType,
    /// Vertex count: element count divided by `item_size`.
    pub count: usize,
    pub data: Vec<u8>,
}

/// Index buffer flattened to bytes. Indices are always `u32`, one per
/// element, so `item_size` is 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexView {
    pub item_size: usize,
    pub count: usize,
    pub data: Vec<u8>,
}

/// Upload-ready view of one decoded geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryBuffers {
    /// `None` for point clouds.
    pub index: Option<IndexView>,
    pub attributes: Vec<AttributeView>,
}

impl GeometryBuffers {
    pub fn attribute(&self, name: &str) -> Option<&AttributeView> {
        self.attributes.iter().find(|view| view.name == name)
    }
}

/// Flatten decoded geometry into byte buffers.
pub fn assemble(geometry: &DecodedGeometry) -> GeometryBuffers {
    let attributes = geometry
        .attributes
        .iter()
        .map(|attribute| AttributeView {
            name: attribute.name.clone(),
            item_size: attribute.item_size,
            scalar: attribute.array.scalar_type(),
            count: attribute.array.len() / attribute.item_size.max(1),
            data: attribute_bytes(&attribute.array),
        })
        .collect();

    let index = geometry.index.as_ref().map(|indices| IndexView {
        item_size: 1,
        count: indices.len(),
        data: bytemuck::cast_slice(indices).to_vec(),
    });

    GeometryBuffers { index, attributes }
}

fn attribute_bytes(array: &AttributeArray) -> Vec<u8> {
    match array {
        AttributeArray::U8(values) => values.clone(),
        AttributeArray::I8(values) => bytemuck::cast_slice(values).to_vec(),
        AttributeArray::I16(values) => bytemuck::cast_slice(values).to_vec(),
        AttributeArray::U16(values) => bytemuck::cast_slice(values).to_vec(),
        AttributeArray::I32(values) => bytemuck::cast_slice(values).to_vec(),
        AttributeArray::U32(values) => bytemuck::cast_slice(values).to_vec(),
        AttributeArray::F32(values) => bytemuck::cast_slice(values).to_vec(),
    }
}

//! Decoded geometry payloads
//!
//! The result of one decode: an optional triangle index plus the extracted
//! attribute arrays, in extraction order. Attribute order is not
//! semantically significant.

use crate::AttributeArray;

/// One extracted per-vertex attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAttribute {
    /// Output name the consumer requested (e.g. "position").
    pub name: String,
    /// Components per element.
    pub item_size: usize,
    /// Flat array of `point_count * item_size` elements.
    pub array: AttributeArray,
}

/// The result payload of one decode task.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGeometry {
    /// Flat triangle indices (`face_count * 3`), absent for point clouds.
    pub index: Option<Vec<u32>>,
    /// Extracted attributes, in extraction order.
    pub attributes: Vec<DecodedAttribute>,
}

impl DecodedGeometry {
    /// Find an attribute by its output name.
    pub fn attribute(&self, name: &str) -> Option<&DecodedAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

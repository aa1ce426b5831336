//! Weft payload header and attribute directory layout
//!
//! POD structures with explicit little-endian byte plumbing. No magic bytes -
//! the format is determined by context (the caller knows it submitted a Weft
//! payload).

use crate::CodecError;

/// Header size in bytes.
pub const WEFT_HEADER_SIZE: usize = 12;

/// Attribute directory entry size in bytes.
pub const WEFT_DIR_ENTRY_SIZE: usize = 8;

/// Payload kind tag: point cloud (no index data).
pub const WEFT_KIND_POINT_CLOUD: u8 = 0;

/// Payload kind tag: triangle mesh (index data follows the payload).
pub const WEFT_KIND_TRIANGLE_MESH: u8 = 1;

/// Weft payload header (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeftHeader {
    pub kind: u8,
    pub attribute_count: u8,
    pub point_count: u32,
    pub face_count: u32,
}

impl WeftHeader {
    pub const SIZE: usize = WEFT_HEADER_SIZE;

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.kind;
        bytes[1] = self.attribute_count;
        // padding bytes 2-3 stay 0
        bytes[4..8].copy_from_slice(&self.point_count.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.face_count.to_le_bytes());
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < Self::SIZE {
            return Err(CodecError::BufferTooSmall);
        }
        let kind = bytes[0];
        if kind != WEFT_KIND_POINT_CLOUD && kind != WEFT_KIND_TRIANGLE_MESH {
            return Err(CodecError::InvalidKind(kind));
        }
        Ok(Self {
            kind,
            attribute_count: bytes[1],
            point_count: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            face_count: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Attribute directory entry (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeftDirEntry {
    pub semantic: u8,
    pub scalar: u8,
    pub components: u8,
    pub unique_id: u32,
}

impl WeftDirEntry {
    pub const SIZE: usize = WEFT_DIR_ENTRY_SIZE;

    /// Write entry to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.semantic;
        bytes[1] = self.scalar;
        bytes[2] = self.components;
        // padding byte 3 stays 0
        bytes[4..8].copy_from_slice(&self.unique_id.to_le_bytes());
        bytes
    }

    /// Read entry from bytes, validating the tags.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < Self::SIZE {
            return Err(CodecError::BufferTooSmall);
        }
        let entry = Self {
            semantic: bytes[0],
            scalar: bytes[1],
            components: bytes[2],
            unique_id: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        };
        crate::Semantic::from_u8(entry.semantic)?;
        crate::ScalarType::from_u8(entry.scalar)?;
        if entry.components == 0 || entry.components > 4 {
            return Err(CodecError::InvalidComponents(entry.components));
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = WeftHeader {
            kind: WEFT_KIND_TRIANGLE_MESH,
            attribute_count: 2,
            point_count: 1234,
            face_count: 567,
        };
        let decoded = WeftHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(decoded.kind, header.kind);
        assert_eq!(decoded.attribute_count, header.attribute_count);
        assert_eq!(decoded.point_count, header.point_count);
        assert_eq!(decoded.face_count, header.face_count);
    }

    #[test]
    fn test_dir_entry_roundtrip() {
        let entry = WeftDirEntry {
            semantic: 1,
            scalar: 6,
            components: 3,
            unique_id: 42,
        };
        let decoded = WeftDirEntry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(decoded.semantic, entry.semantic);
        assert_eq!(decoded.scalar, entry.scalar);
        assert_eq!(decoded.components, entry.components);
        assert_eq!(decoded.unique_id, entry.unique_id);
    }

    #[test]
    fn test_invalid_kind_rejected() {
        let mut bytes = [0u8; WEFT_HEADER_SIZE];
        bytes[0] = 9;
        assert_eq!(WeftHeader::from_bytes(&bytes), Err(CodecError::InvalidKind(9)));
    }
}

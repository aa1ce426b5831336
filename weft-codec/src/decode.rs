//! Weft decoder implementation
//!
//! [`WeftModule`] plays the role of a loaded native decoder module; each
//! [`WeftInstance`] is one decoder execution state, private to its owning
//! worker. Scratch held between `parse` and `reset` is tracked by a shared
//! allocation counter so tests can assert release-on-all-exit-paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::format::{WEFT_DIR_ENTRY_SIZE, WEFT_HEADER_SIZE, WEFT_KIND_TRIANGLE_MESH, WeftDirEntry, WeftHeader};
use crate::{
    AttributeArray, AttributeId, CodecError, DecoderInstance, DecoderModule, ModuleLoader,
    PayloadKind, ScalarType, Semantic,
};

/// One live scratch allocation; freeing is dropping.
struct AllocGuard(Arc<AtomicUsize>);

impl AllocGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for AllocGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-decode scratch: the parsed directory plus the payload bytes.
///
/// Payload bounds are deliberately not validated here - attribute and index
/// reads check their own ranges, so truncation surfaces mid-extraction the
/// way a streaming native decoder would report it.
struct ParsedPayload {
    kind: PayloadKind,
    point_count: usize,
    face_count: usize,
    directory: Vec<WeftDirEntry>,
    /// Byte offset of each attribute's payload, in directory order.
    offsets: Vec<usize>,
    /// Byte offset of the index data (meshes only).
    index_offset: usize,
    data: Vec<u8>,
    _scratch: AllocGuard,
}

/// A loaded Weft decoder module.
///
/// Cheap to construct; a real native module would compile/link here, which
/// is why the pool memoizes the load process-wide.
pub struct WeftModule {
    allocations: Arc<AtomicUsize>,
}

impl WeftModule {
    pub fn new() -> Self {
        Self {
            allocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Scratch allocations currently held across all instances of this
    /// module. Zero whenever no decode is mid-flight.
    pub fn outstanding_allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }
}

impl Default for WeftModule {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderModule for WeftModule {
    fn instantiate(&self) -> Result<Box<dyn DecoderInstance>, CodecError> {
        Ok(Box::new(WeftInstance {
            allocations: self.allocations.clone(),
            scratch: None,
        }))
    }
}

/// Loader handing out a shared [`WeftModule`].
///
/// Keeps its own handle to the module so embedders (and tests) can observe
/// allocation counts on the same module the pool uses.
pub struct WeftLoader {
    module: Arc<WeftModule>,
}

impl WeftLoader {
    pub fn new() -> Self {
        Self {
            module: Arc::new(WeftModule::new()),
        }
    }

    pub fn module(&self) -> Arc<WeftModule> {
        self.module.clone()
    }
}

impl Default for WeftLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for WeftLoader {
    fn load(&self) -> Result<Arc<dyn DecoderModule>, CodecError> {
        Ok(self.module.clone())
    }
}

/// One Weft decoder execution state.
pub struct WeftInstance {
    allocations: Arc<AtomicUsize>,
    scratch: Option<ParsedPayload>,
}

impl WeftInstance {
    fn payload(&self) -> Result<&ParsedPayload, CodecError> {
        self.scratch.as_ref().ok_or(CodecError::NoPayload)
    }

    fn entry(&self, attr: AttributeId) -> Result<(&ParsedPayload, &WeftDirEntry), CodecError> {
        let payload = self.payload()?;
        let entry = payload
            .directory
            .get(attr as usize)
            .ok_or(CodecError::InvalidAttribute(attr))?;
        Ok((payload, entry))
    }
}

impl DecoderInstance for WeftInstance {
    fn parse(&mut self, data: &[u8]) -> Result<PayloadKind, CodecError> {
        // A decode left unfinished by a failure would otherwise pin its
        // scratch until the next reset.
        self.scratch = None;

        let header = WeftHeader::from_bytes(data)?;
        let attribute_count = header.attribute_count as usize;
        let dir_end = WEFT_HEADER_SIZE + attribute_count * WEFT_DIR_ENTRY_SIZE;
        if data.len() < dir_end {
            return Err(CodecError::Truncated {
                needed: dir_end,
                available: data.len(),
            });
        }

        let mut directory = Vec::with_capacity(attribute_count);
        let mut offsets = Vec::with_capacity(attribute_count);
        let mut offset = dir_end;
        for i in 0..attribute_count {
            let start = WEFT_HEADER_SIZE + i * WEFT_DIR_ENTRY_SIZE;
            let entry = WeftDirEntry::from_bytes(&data[start..start + WEFT_DIR_ENTRY_SIZE])?;
            let scalar = ScalarType::from_u8(entry.scalar)?;
            offsets.push(offset);
            offset += header.point_count as usize * entry.components as usize * scalar.size();
            directory.push(entry);
        }

        let kind = if header.kind == WEFT_KIND_TRIANGLE_MESH {
            PayloadKind::TriangleMesh
        } else {
            PayloadKind::PointCloud
        };

        self.scratch = Some(ParsedPayload {
            kind,
            point_count: header.point_count as usize,
            face_count: header.face_count as usize,
            directory,
            offsets,
            index_offset: offset,
            data: data.to_vec(),
            _scratch: AllocGuard::new(&self.allocations),
        });
        Ok(kind)
    }

    fn point_count(&self) -> usize {
        self.scratch.as_ref().map_or(0, |p| p.point_count)
    }

    fn face_count(&self) -> usize {
        self.scratch.as_ref().map_or(0, |p| p.face_count)
    }

    fn attribute_by_semantic(&self, semantic: Semantic) -> Option<AttributeId> {
        let payload = self.scratch.as_ref()?;
        payload
            .directory
            .iter()
            .position(|e| e.semantic == semantic.to_u8())
            .map(|i| i as AttributeId)
    }

    fn attribute_by_unique_id(&self, unique_id: u32) -> Option<AttributeId> {
        let payload = self.scratch.as_ref()?;
        payload
            .directory
            .iter()
            .position(|e| e.unique_id == unique_id)
            .map(|i| i as AttributeId)
    }

    fn components(&self, attr: AttributeId) -> usize {
        self.entry(attr).map_or(0, |(_, e)| e.components as usize)
    }

    fn read_attribute(
        &mut self,
        attr: AttributeId,
        scalar: ScalarType,
    ) -> Result<AttributeArray, CodecError> {
        let (payload, entry) = self.entry(attr)?;
        let stored = ScalarType::from_u8(entry.scalar)?;
        let count = payload.point_count * entry.components as usize;
        let start = payload.offsets[attr as usize];
        let needed = start + count * stored.size();

        // Per-attribute staging buffer, released on success and failure.
        let _staging = AllocGuard::new(&self.allocations);
        if payload.data.len() < needed {
            return Err(CodecError::Truncated {
                needed,
                available: payload.data.len(),
            });
        }
        let staging = read_array(&payload.data[start..needed], stored, count);
        Ok(staging.convert(scalar))
    }

    fn read_indices(&mut self) -> Result<Vec<u32>, CodecError> {
        let payload = self.payload()?;
        if payload.kind != PayloadKind::TriangleMesh {
            return Err(CodecError::NoIndexData);
        }
        let count = payload.face_count * 3;
        let needed = payload.index_offset + count * 4;

        let _staging = AllocGuard::new(&self.allocations);
        if payload.data.len() < needed {
            return Err(CodecError::Truncated {
                needed,
                available: payload.data.len(),
            });
        }
        let mut indices = Vec::with_capacity(count);
        let mut offset = payload.index_offset;
        for _ in 0..count {
            indices.push(u32::from_le_bytes([
                payload.data[offset],
                payload.data[offset + 1],
                payload.data[offset + 2],
                payload.data[offset + 3],
            ]));
            offset += 4;
        }
        Ok(indices)
    }

    fn reset(&mut self) {
        self.scratch = None;
    }
}

/// Read `count` elements of `stored` type from little-endian bytes.
fn read_array(bytes: &[u8], stored: ScalarType, count: usize) -> AttributeArray {
    match stored {
        ScalarType::I8 => {
            AttributeArray::I8(bytes.iter().take(count).map(|b| *b as i8).collect())
        }
        ScalarType::U8 => AttributeArray::U8(bytes[..count].to_vec()),
        ScalarType::I16 => AttributeArray::I16(
            bytes
                .chunks_exact(2)
                .take(count)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        ScalarType::U16 => AttributeArray::U16(
            bytes
                .chunks_exact(2)
                .take(count)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        ScalarType::I32 => AttributeArray::I32(
            bytes
                .chunks_exact(4)
                .take(count)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ScalarType::U32 => AttributeArray::U32(
            bytes
                .chunks_exact(4)
                .take(count)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ScalarType::F32 => AttributeArray::F32(
            bytes
                .chunks_exact(4)
                .take(count)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
    }
}

//! Decoder worker runtime
//!
//! One OS thread per worker, owning one private decoder instance. Requests
//! arrive on an mpsc queue and are served to completion in order, so a
//! single worker never interleaves decoder work; parallelism comes from
//! running several workers.
//!
//! The channel protocol is two tagged enums: [`WorkerRequest`] from the
//! pool manager, [`WorkerResponse`] back to it. `Init` is the first message
//! every worker receives; a worker whose decoder instance failed to build
//! answers every later decode with that initialization error instead of
//! tearing the pool down.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};
use weft_codec::{
    CodecError, DecodedAttribute, DecodedGeometry, DecoderInstance, DecoderModule, PayloadKind,
};

use crate::{PoolError, task::TaskConfig};

/// Pool manager to worker.
pub(crate) enum WorkerRequest {
    /// Hand the worker the shared decoder module; sent once at creation.
    Init { module: Arc<dyn DecoderModule> },
    /// Decode one payload. Buffer ownership moves with the message.
    Decode {
        id: u64,
        config: TaskConfig,
        buffer: Vec<u8>,
    },
}

/// Worker to pool manager.
pub(crate) enum WorkerResponse {
    Decoded { id: u64, geometry: DecodedGeometry },
    Failed { id: u64, error: PoolError },
}

/// Spawn a decode worker thread.
///
/// Dropping the request sender is the shutdown signal; the thread exits
/// when its queue disconnects, which in turn closes the response channel.
pub(crate) fn spawn_worker(
    index: usize,
    responses: tokio::sync::mpsc::UnboundedSender<WorkerResponse>,
) -> (Sender<WorkerRequest>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = thread::Builder::new()
        .name(format!("weft-decode-{index}"))
        .spawn(move || run(index, rx, responses))
        .expect("failed to spawn decode worker thread");
    (tx, handle)
}

fn run(
    index: usize,
    rx: Receiver<WorkerRequest>,
    responses: tokio::sync::mpsc::UnboundedSender<WorkerResponse>,
) {
    debug!("decode worker {index} started");

    let mut instance: Option<Result<Box<dyn DecoderInstance>, CodecError>> = None;

    while let Ok(request) = rx.recv() {
        match request {
            WorkerRequest::Init { module } => {
                instance = Some(module.instantiate());
                if let Some(Err(error)) = &instance {
                    warn!("decode worker {index} failed to create its decoder instance: {error}");
                }
            }
            WorkerRequest::Decode { id, config, buffer } => {
                let response = match instance.as_mut() {
                    Some(Ok(decoder)) => match decode_task(decoder.as_mut(), &buffer, &config) {
                        Ok(geometry) => WorkerResponse::Decoded { id, geometry },
                        Err(error) => {
                            trace!("decode worker {index} task {id} failed: {error}");
                            WorkerResponse::Failed { id, error }
                        }
                    },
                    Some(Err(error)) => WorkerResponse::Failed {
                        id,
                        error: PoolError::Init(error.clone()),
                    },
                    None => WorkerResponse::Failed {
                        id,
                        error: PoolError::Init(CodecError::ModuleLoad(
                            "decode request received before worker init".into(),
                        )),
                    },
                };
                if responses.send(response).is_err() {
                    // The pool is gone; no one is listening.
                    break;
                }
            }
        }
    }

    debug!("decode worker {index} exiting (channel disconnected)");
}

/// Decoder scratch scope: guarantees the instance's per-decode scratch is
/// released on every exit path of `decode_task`, including failures.
struct Scratch<'a> {
    instance: &'a mut dyn DecoderInstance,
}

impl<'a> Deref for Scratch<'a> {
    type Target = dyn DecoderInstance + 'a;

    fn deref(&self) -> &Self::Target {
        self.instance
    }
}

impl DerefMut for Scratch<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.instance
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        self.instance.reset();
    }
}

/// Run one decode on the worker's decoder instance.
///
/// Whether the payload is a mesh or a point cloud is a property of the
/// encoded data. Zero decoded points is a hard failure, not an empty
/// result. Attribute lookup follows the task config: by default semantic
/// slot (absent attributes are skipped) or by explicit unique id (absent
/// attributes are a caller error).
fn decode_task(
    instance: &mut dyn DecoderInstance,
    buffer: &[u8],
    config: &TaskConfig,
) -> Result<DecodedGeometry, PoolError> {
    let mut scratch = Scratch { instance };

    let kind = scratch.parse(buffer).map_err(PoolError::Decode)?;
    if scratch.point_count() == 0 {
        return Err(PoolError::Decode(CodecError::EmptyGeometry));
    }

    let mut attributes = Vec::with_capacity(config.attributes.len());
    for request in &config.attributes {
        let attr = if config.use_unique_ids {
            let unique_id = request.unique_id.ok_or_else(|| {
                PoolError::Decode(CodecError::MissingUniqueId(request.name.clone()))
            })?;
            scratch
                .attribute_by_unique_id(unique_id)
                .ok_or(PoolError::Decode(CodecError::UnknownUniqueId(unique_id)))?
        } else {
            match scratch.attribute_by_semantic(request.semantic) {
                Some(attr) => attr,
                None => {
                    trace!("attribute '{}' not in payload, skipping", request.name);
                    continue;
                }
            }
        };

        let item_size = scratch.components(attr);
        let array = scratch
            .read_attribute(attr, request.scalar)
            .map_err(PoolError::Decode)?;
        attributes.push(DecodedAttribute {
            name: request.name.clone(),
            item_size,
            array,
        });
    }

    let index = match kind {
        PayloadKind::TriangleMesh => Some(scratch.read_indices().map_err(PoolError::Decode)?),
        PayloadKind::PointCloud => None,
    };

    Ok(DecodedGeometry { index, attributes })
}

//! # GPU Collaborators
//!
//! The terrain core never talks to a graphics API directly. It goes through
//! three seams:
//!
//! * [`UploadContext`] - owned by the generation worker, turns CPU meshes into
//!   GPU buffers and hands back a completion token
//! * [`CompletionToken`] - polled by the main thread without blocking
//! * [`DrawTarget`] - receives one draw per visible chunk mesh
//!
//! [`HeadlessUploader`] and [`DrawRecorder`] implement these on the CPU for
//! tools and tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cgmath::Matrix4;

use crate::error::UploadError;
use crate::rendering::meshing::{MeshData, MeshRanges};
use crate::rendering::vertex::Vertex;

/// A non-blocking handle on an asynchronous upload.
pub trait CompletionToken {
    /// Returns `true` once the upload has finished. Never blocks.
    fn is_complete(&self) -> bool;
}

/// A private upload context owned by the background generation thread.
pub trait UploadContext: Send + 'static {
    /// GPU-resident buffers of one mesh.
    type Buffers: Send + Sync + 'static;
    /// Completion token of one upload.
    type Fence: CompletionToken + Send + Sync + 'static;

    /// Issues the upload of `mesh`. The returned buffers may only be drawn
    /// once the fence reports completion.
    fn upload(&mut self, mesh: &MeshData) -> Result<(Self::Buffers, Self::Fence), UploadError>;
}

/// Receives draw calls for chunk meshes.
pub trait DrawTarget<B> {
    /// Draws both index ranges of `buffers` with the given model transform.
    fn draw(&mut self, buffers: &B, ranges: &MeshRanges, transform: &Matrix4<f32>);
}

/// CPU copies of an uploaded mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessBuffers {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Fence of a [`HeadlessUploader`]. Completes when its gate is open.
#[derive(Debug, Clone)]
pub struct HeadlessFence {
    gate: Arc<AtomicBool>,
}

impl CompletionToken for HeadlessFence {
    fn is_complete(&self) -> bool {
        self.gate.load(Ordering::Acquire)
    }
}

/// Controls when the fences of a held [`HeadlessUploader`] complete.
#[derive(Debug, Clone)]
pub struct FenceGate {
    gate: Arc<AtomicBool>,
}

impl FenceGate {
    /// Completes every fence issued so far and every later one.
    pub fn open(&self) {
        self.gate.store(true, Ordering::Release);
    }
}

/// Upload context that keeps meshes in CPU memory.
#[derive(Debug)]
pub struct HeadlessUploader {
    gate: Arc<AtomicBool>,
    uploads: Arc<AtomicUsize>,
    fail: bool,
}

impl Default for HeadlessUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessUploader {
    /// An uploader whose fences complete immediately.
    pub fn new() -> Self {
        HeadlessUploader {
            gate: Arc::new(AtomicBool::new(true)),
            uploads: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    /// An uploader whose fences stay pending until the returned gate opens.
    pub fn held() -> (Self, FenceGate) {
        let gate = Arc::new(AtomicBool::new(false));
        let uploader = HeadlessUploader {
            gate: gate.clone(),
            uploads: Arc::new(AtomicUsize::new(0)),
            fail: false,
        };
        (uploader, FenceGate { gate })
    }

    /// An uploader whose every upload fails, as a lost device would.
    pub fn failing() -> Self {
        HeadlessUploader {
            fail: true,
            ..Self::new()
        }
    }

    /// Shared counter of successful uploads.
    pub fn upload_counter(&self) -> Arc<AtomicUsize> {
        self.uploads.clone()
    }
}

impl UploadContext for HeadlessUploader {
    type Buffers = HeadlessBuffers;
    type Fence = HeadlessFence;

    fn upload(&mut self, mesh: &MeshData) -> Result<(HeadlessBuffers, HeadlessFence), UploadError> {
        if self.fail {
            return Err(UploadError::Context("headless upload context lost".to_string()));
        }

        self.uploads.fetch_add(1, Ordering::Relaxed);
        let buffers = HeadlessBuffers {
            vertices: mesh.vertices.clone(),
            indices: mesh.combined_indices(),
        };
        let fence = HeadlessFence {
            gate: self.gate.clone(),
        };
        Ok((buffers, fence))
    }
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub transform: Matrix4<f32>,
    pub ranges: MeshRanges,
    pub vertex_count: usize,
}

/// Draw target that records every draw it receives.
#[derive(Debug, Default)]
pub struct DrawRecorder {
    pub draws: Vec<RecordedDraw>,
}

impl DrawRecorder {
    pub fn clear(&mut self) {
        self.draws.clear();
    }

    /// Total number of indices drawn.
    pub fn index_count(&self) -> u32 {
        self.draws.iter().map(|draw| draw.ranges.index_count()).sum()
    }
}

impl DrawTarget<HeadlessBuffers> for DrawRecorder {
    fn draw(&mut self, buffers: &HeadlessBuffers, ranges: &MeshRanges, transform: &Matrix4<f32>) {
        self.draws.push(RecordedDraw {
            transform: *transform,
            ranges: ranges.clone(),
            vertex_count: buffers.vertices.len(),
        });
    }
}

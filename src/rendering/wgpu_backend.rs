//! # wgpu Backend
//!
//! GPU implementations of the upload and draw seams.
//!
//! The worker thread owns a [`WgpuUploader`] holding clones of the device and
//! queue. Each upload creates an immutable vertex buffer and a combined index
//! buffer, then registers a work-done callback on the queue. The resulting
//! [`WgpuFence`] polls the device without waiting and reports completion once
//! the callback has fired.
//!
//! Drawing is recorded into a [`WgpuDrawList`] while walking the terrain and
//! replayed into a render pass whose pipeline takes the model transform as a
//! vertex-stage push constant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cgmath::Matrix4;
use log::{trace, warn};
use wgpu::util::DeviceExt;

use crate::error::UploadError;
use crate::rendering::gpu::{CompletionToken, DrawTarget, UploadContext};
use crate::rendering::meshing::{MeshData, MeshRanges};

/// Vertex and index buffers of one chunk mesh.
#[derive(Debug)]
pub struct WgpuBuffers {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
}

/// Completion token backed by `Queue::on_submitted_work_done`.
#[derive(Debug)]
pub struct WgpuFence {
    device: wgpu::Device,
    done: Arc<AtomicBool>,
}

impl CompletionToken for WgpuFence {
    fn is_complete(&self) -> bool {
        if self.done.load(Ordering::Acquire) {
            return true;
        }
        // Fires pending callbacks without waiting. A failed poll leaves the fence pending.
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            warn!("Device poll failed while waiting on an upload: {err}");
        }
        self.done.load(Ordering::Acquire)
    }
}

/// Upload context creating buffers on a shared device.
#[derive(Debug, Clone)]
pub struct WgpuUploader {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuUploader {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuUploader { device, queue }
    }

    fn create_buffer(
        &self,
        kind: &'static str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> Result<wgpu::Buffer, UploadError> {
        let max_size = self.device.limits().max_buffer_size;
        if contents.len() as u64 > max_size {
            return Err(UploadError::Buffer {
                kind,
                bytes: contents.len() as u64,
                reason: format!("exceeds the device limit of {max_size} bytes"),
            });
        }

        Ok(self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(kind),
                contents,
                usage,
            }))
    }
}

impl UploadContext for WgpuUploader {
    type Buffers = WgpuBuffers;
    type Fence = WgpuFence;

    fn upload(&mut self, mesh: &MeshData) -> Result<(WgpuBuffers, WgpuFence), UploadError> {
        let vertex_buffer = self.create_buffer(
            "Chunk Vertex Buffer",
            bytemuck::cast_slice(&mesh.vertices),
            wgpu::BufferUsages::VERTEX,
        )?;
        let index_buffer = self.create_buffer(
            "Chunk Index Buffer",
            bytemuck::cast_slice(&mesh.combined_indices()),
            wgpu::BufferUsages::INDEX,
        )?;

        let done = Arc::new(AtomicBool::new(false));
        let signal = done.clone();
        self.queue.submit([]);
        self.queue.on_submitted_work_done(move || {
            signal.store(true, Ordering::Release);
        });

        trace!(
            "Uploaded chunk mesh: {} vertices, {} quads",
            mesh.vertices.len(),
            mesh.quad_count()
        );

        Ok((
            WgpuBuffers {
                vertex_buffer,
                index_buffer,
            },
            WgpuFence {
                device: self.device.clone(),
                done,
            },
        ))
    }
}

struct DrawCommand {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    ranges: MeshRanges,
    transform: [[f32; 4]; 4],
}

/// Draw calls collected for one frame.
///
/// Opaque ranges are replayed before transparent ones so blended geometry is
/// composited over every solid chunk.
#[derive(Default)]
pub struct WgpuDrawList {
    commands: Vec<DrawCommand>,
}

impl WgpuDrawList {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    fn replay_ranges<F>(&self, render_pass: &mut wgpu::RenderPass<'_>, range_of: F)
    where
        F: Fn(&MeshRanges) -> std::ops::Range<u32>,
    {
        for command in &self.commands {
            let range = range_of(&command.ranges);
            if range.is_empty() {
                continue;
            }
            render_pass.set_push_constants(
                wgpu::ShaderStages::VERTEX,
                0,
                bytemuck::cast_slice(&command.transform),
            );
            render_pass.set_vertex_buffer(0, command.vertex_buffer.slice(..));
            render_pass.set_index_buffer(command.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(range, 0, 0..1);
        }
    }

    /// Issues every recorded draw into `render_pass`, whose pipeline must be
    /// bound already.
    pub fn replay(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.replay_ranges(render_pass, |ranges| ranges.opaque.clone());
        self.replay_ranges(render_pass, |ranges| ranges.transparent.clone());
    }
}

impl DrawTarget<WgpuBuffers> for WgpuDrawList {
    fn draw(&mut self, buffers: &WgpuBuffers, ranges: &MeshRanges, transform: &Matrix4<f32>) {
        self.commands.push(DrawCommand {
            vertex_buffer: buffers.vertex_buffer.clone(),
            index_buffer: buffers.index_buffer.clone(),
            ranges: ranges.clone(),
            transform: (*transform).into(),
        });
    }
}

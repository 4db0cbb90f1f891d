//! # Chunk Nodes
//!
//! The terrain is an octree of chunks. Every chunk covers a cube of
//! `chunk_size³` cells; each level down halves the voxel size, so the eight
//! children of a chunk cover its cube at twice the resolution.
//!
//! A chunk is split in two halves:
//! - [`ChunkShared`]: the part the generation worker sees. Position, size and
//!   level, the atomic state and score, the deletion flags and the slot the
//!   finished upload is handed back through.
//! - [`ChunkNode`]: the tree node owned by the main thread. Children, the
//!   GPU-resident mesh and the visibility of the last update.
//!
//! ## Lifecycle
//! `Queued → Generating → AwaitingUpload → Generated`, or `Failed` when the
//! generation callback panics. A node is queued by its constructor. Only the
//! worker moves it to `Generating` and `AwaitingUpload`. Only the main thread
//! moves it to `Generated`, after the upload's completion token reports done.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use cgmath::{InnerSpace, Matrix4, Point3, Vector3};
use log::{debug, trace};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use web_time::Instant;

use crate::camera::Camera;
use crate::config::TerrainSettings;
use crate::core::MtResource;
use crate::error::UploadError;
use crate::rendering::gpu::{CompletionToken, DrawTarget, UploadContext};
use crate::rendering::meshing::MeshRanges;
use crate::voxels::{Matrix, Palette};

use super::background::BackgroundGenerator;
use super::generation::TerrainGenerator;

/// Generation state of a chunk.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum ChunkState {
    /// Waiting in the generator's pending set.
    Queued = 0,
    /// Claimed by the worker, voxels and mesh are being built.
    Generating = 1,
    /// The upload was issued and its completion token has not been seen done.
    AwaitingUpload = 2,
    /// Mesh resident on the GPU. Eligible for drawing and subdivision.
    Generated = 3,
    /// The generation callback panicked. Never drawn, never subdivided.
    Failed = 4,
}

/// A finished upload waiting for its completion token.
///
/// Empty meshes are not uploaded and carry no buffers.
pub struct PendingUpload<U: UploadContext> {
    pub upload: Option<(U::Buffers, U::Fence)>,
    pub ranges: MeshRanges,
}

impl<U: UploadContext> PendingUpload<U> {
    fn is_complete(&self) -> bool {
        self.upload
            .as_ref()
            .map_or(true, |(_, fence)| fence.is_complete())
    }
}

/// A mesh ready to be drawn.
pub struct ChunkMesh<B> {
    pub buffers: B,
    pub ranges: MeshRanges,
}

/// Outcome of one generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Uploaded,
    Failed,
}

/// The part of a chunk shared with the generation worker.
pub struct ChunkShared<U: UploadContext> {
    pub id: u64,
    pub center: Point3<f64>,
    /// Edge length of one cell.
    pub voxel_size: f64,
    /// Cells per edge.
    pub chunk_size: u32,
    /// Depth level; `0` chunks never subdivide.
    pub level: u32,
    state: AtomicU8,
    score: AtomicU64,
    pending_delete: AtomicBool,
    retired: AtomicBool,
    upload: MtResource<Option<PendingUpload<U>>>,
}

impl<U: UploadContext> ChunkShared<U> {
    pub fn new(id: u64, center: Point3<f64>, voxel_size: f64, chunk_size: u32, level: u32) -> Self {
        ChunkShared {
            id,
            center,
            voxel_size,
            chunk_size,
            level,
            state: AtomicU8::new(ChunkState::Queued as u8),
            score: AtomicU64::new(0f64.to_bits()),
            pending_delete: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            upload: MtResource::new(None),
        }
    }

    /// World edge length of the chunk's cube.
    pub fn extent(&self) -> f64 {
        self.voxel_size * self.chunk_size as f64
    }

    pub fn state(&self) -> ChunkState {
        ChunkState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(ChunkState::Failed)
    }

    pub(crate) fn set_state(&self, state: ChunkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Priority of the chunk; lower generates sooner.
    pub fn score(&self) -> f64 {
        f64::from_bits(self.score.load(Ordering::Relaxed))
    }

    pub(crate) fn set_score(&self, score: f64) {
        self.score.store(score.to_bits(), Ordering::Relaxed);
    }

    pub fn is_pending_delete(&self) -> bool {
        self.pending_delete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_pending_delete(&self) {
        self.pending_delete.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Releases the chunk's generated data. Returns `true` only for the
    /// first call.
    pub(crate) fn retire(&self) -> bool {
        if self.retired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.upload.take();
        true
    }

    /// World position of the minimum corner of cell `(x, y, z)`.
    pub fn cell_position(&self, x: u32, y: u32, z: u32) -> Point3<f64> {
        let extent = self.extent();
        let n = self.chunk_size as f64;
        let offset = |i: u32| (i as f64 / n - 0.5) * extent;
        self.center + Vector3::new(offset(x), offset(y), offset(z))
    }

    /// Fills the chunk's voxels through `generator` and meshes them.
    ///
    /// Runs on the worker thread. A panicking callback marks the chunk
    /// `Failed`; an upload error is returned and leaves the chunk `Failed`.
    pub(crate) fn generate<G: TerrainGenerator + ?Sized>(
        &self,
        generator: &G,
        uploader: &mut U,
        settings: &TerrainSettings,
    ) -> Result<GenerationOutcome, UploadError> {
        self.set_state(ChunkState::Generating);
        let start = Instant::now();

        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut palette = Palette::default();
            generator.generate_palette(self.center, self.level, &mut palette);

            let n = self.chunk_size;
            let matrix = Matrix::from_fn(Vector3::new(n, n, n), palette, |x, y, z| {
                generator.generate_material(self.cell_position(x, y, z), self.level)
            });
            settings.mesher.mesh(
                &matrix,
                self.voxel_size as f32,
                settings.detail_limit,
                settings.generate_borders,
            )
        }));

        let mesh = match built {
            Ok(mesh) => mesh,
            Err(_) => {
                self.set_state(ChunkState::Failed);
                return Ok(GenerationOutcome::Failed);
            }
        };

        let upload = if mesh.is_empty() {
            None
        } else {
            match uploader.upload(&mesh) {
                Ok(upload) => Some(upload),
                Err(err) => {
                    self.set_state(ChunkState::Failed);
                    return Err(err);
                }
            }
        };

        self.upload.replace(PendingUpload {
            upload,
            ranges: mesh.ranges(),
        });
        self.set_state(ChunkState::AwaitingUpload);

        trace!(
            "Generated chunk {} (level {}, {} quads) in {:?}",
            self.id,
            self.level,
            mesh.quad_count(),
            start.elapsed()
        );
        Ok(GenerationOutcome::Uploaded)
    }

    /// Moves a completed upload out of the slot. Never blocks on the GPU.
    fn poll_upload(&self) -> Option<PendingUpload<U>> {
        let complete = self.upload.get().as_ref().is_some_and(PendingUpload::is_complete);
        if complete {
            self.upload.take()
        } else {
            None
        }
    }
}

/// Per-update inputs threaded through the tree.
pub(crate) struct UpdateContext<'a, U: UploadContext, C: Camera + ?Sized> {
    pub camera: &'a C,
    pub settings: &'a TerrainSettings,
    pub generator: &'a BackgroundGenerator<U>,
}

/// A node of the chunk octree, owned by the main thread.
pub struct ChunkNode<U: UploadContext> {
    shared: Arc<ChunkShared<U>>,
    children: Option<Box<[ChunkNode<U>; 8]>>,
    mesh: Option<ChunkMesh<U::Buffers>>,
    visible: bool,
}

impl<U: UploadContext> ChunkNode<U> {
    /// Creates a node and queues it for generation.
    pub(crate) fn new(shared: ChunkShared<U>, score: f64, generator: &BackgroundGenerator<U>) -> Self {
        let shared = Arc::new(shared);
        shared.set_score(score);
        generator.load(shared.clone());
        ChunkNode {
            shared,
            children: None,
            mesh: None,
            visible: false,
        }
    }

    pub fn shared(&self) -> &Arc<ChunkShared<U>> {
        &self.shared
    }

    pub fn state(&self) -> ChunkState {
        self.shared.state()
    }

    pub fn score(&self) -> f64 {
        self.shared.score()
    }

    pub fn level(&self) -> u32 {
        self.shared.level
    }

    pub fn center(&self) -> Point3<f64> {
        self.shared.center
    }

    pub fn children(&self) -> Option<&[ChunkNode<U>; 8]> {
        self.children.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn has_mesh(&self) -> bool {
        self.mesh.is_some()
    }

    /// Number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .flat_map(|children| children.iter())
            .map(ChunkNode::node_count)
            .sum::<usize>()
    }

    /// Priority of an unsubdivided node at `distance` from the camera.
    fn leaf_score(&self, distance: f64, settings: &TerrainSettings) -> f64 {
        distance * distance - self.shared.level as f64 * settings.score_level_bias
    }

    fn should_divide(&self, distance: f64, settings: &TerrainSettings) -> bool {
        self.shared.level > 0 && distance < self.shared.extent() * settings.lod_distance
    }

    /// Advances the node by one frame and returns its score.
    ///
    /// Ungenerated nodes only refresh their score. Generated nodes subdivide
    /// or collapse, resolve their visibility and recurse into children that
    /// existed before this frame.
    pub(crate) fn update<C: Camera + ?Sized>(
        &mut self,
        cx: &UpdateContext<'_, U, C>,
        parent_visible: bool,
    ) -> f64 {
        if self.shared.state() == ChunkState::AwaitingUpload {
            if let Some(pending) = self.shared.poll_upload() {
                self.mesh = pending.upload.map(|(buffers, _)| ChunkMesh {
                    buffers,
                    ranges: pending.ranges,
                });
                self.shared.set_state(ChunkState::Generated);
                debug!("Chunk {} generated at level {}", self.shared.id, self.shared.level);
            }
        }

        let distance = (cx.camera.position() - self.shared.center).magnitude();
        match self.shared.state() {
            ChunkState::Generated => {}
            ChunkState::Failed => {
                self.visible = false;
                self.shared.set_score(f64::INFINITY);
                return f64::INFINITY;
            }
            _ => {
                self.visible = false;
                let score = self.leaf_score(distance, cx.settings);
                self.shared.set_score(score);
                return score;
            }
        }

        let divide = self.should_divide(distance, cx.settings);
        let mut fresh = false;
        if divide && self.children.is_none() {
            self.subdivide(cx);
            fresh = true;
        } else if !divide && self.children.is_some() {
            self.collapse(cx.generator);
        }

        let half_extent = self.shared.extent() / 2.0;
        let visible = parent_visible && cx.camera.intersects_frustum(self.shared.center, half_extent);
        self.visible = visible;

        // Children created this frame keep their construction score and are
        // first polled on the next update.
        let leaf_score = self.leaf_score(distance, cx.settings);
        let score = match self.children.as_deref_mut() {
            Some(children) if fresh => children.iter().map(ChunkNode::score).fold(f64::INFINITY, f64::min),
            Some(children) => children
                .iter_mut()
                .map(|child| child.update(cx, visible))
                .fold(f64::INFINITY, f64::min),
            None => leaf_score,
        };
        self.shared.set_score(score);
        score
    }

    fn subdivide<C: Camera + ?Sized>(&mut self, cx: &UpdateContext<'_, U, C>) {
        let quarter = self.shared.extent() / 4.0;
        let voxel_size = self.shared.voxel_size / 2.0;
        let level = self.shared.level - 1;
        let camera = cx.camera.position();

        let children = std::array::from_fn(|octant| {
            let sign = |bit: usize| if (octant >> (2 - bit)) & 1 == 1 { 1.0 } else { -1.0 };
            let center = self.shared.center + Vector3::new(sign(0), sign(1), sign(2)) * quarter;
            let shared = ChunkShared::new(
                cx.generator.next_id(),
                center,
                voxel_size,
                self.shared.chunk_size,
                level,
            );
            let distance = (camera - center).magnitude();
            let score = distance * distance - level as f64 * cx.settings.score_level_bias;
            ChunkNode::new(shared, score, cx.generator)
        });
        self.children = Some(Box::new(children));
        debug!("Subdivided chunk {} (level {})", self.shared.id, self.shared.level);
    }

    fn collapse(&mut self, generator: &BackgroundGenerator<U>) {
        if let Some(children) = self.children.take() {
            for child in *children {
                child.destroy(generator);
            }
            debug!("Collapsed chunk {} (level {})", self.shared.id, self.shared.level);
        }
    }

    /// Removes the whole subtree from the generator and frees its meshes.
    pub(crate) fn destroy(mut self, generator: &BackgroundGenerator<U>) {
        self.collapse(generator);
        generator.unload(&self.shared);
    }

    /// Draws the visible part of the subtree and returns the number of
    /// draw calls issued.
    ///
    /// A node draws its own mesh until all of its children are generated,
    /// then hands drawing over to them.
    pub(crate) fn draw<T>(&self, camera_position: Point3<f64>, target: &mut T) -> usize
    where
        T: DrawTarget<U::Buffers> + ?Sized,
    {
        if !self.visible {
            return 0;
        }

        if let Some(children) = self.children.as_deref() {
            if children.iter().all(|child| child.state() == ChunkState::Generated) {
                return children
                    .iter()
                    .map(|child| child.draw(camera_position, target))
                    .sum();
            }
        }

        match &self.mesh {
            Some(mesh) if !mesh.ranges.is_empty() => {
                target.draw(&mesh.buffers, &mesh.ranges, &self.transform(camera_position));
                1
            }
            _ => 0,
        }
    }

    /// Model transform relative to the camera.
    fn transform(&self, camera_position: Point3<f64>) -> Matrix4<f32> {
        let half = self.shared.extent() / 2.0;
        let origin = self.shared.center - Vector3::new(half, half, half) - camera_position;
        Matrix4::from_translation(Vector3::new(origin.x as f32, origin.y as f32, origin.z as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::gpu::HeadlessUploader;
    use crate::terrain::generation::{LayeredGenerator, STONE};
    use crate::voxels::MaterialIndex;

    fn chunk(chunk_size: u32) -> ChunkShared<HeadlessUploader> {
        ChunkShared::new(7, Point3::new(10.0, 0.0, -10.0), 0.5, chunk_size, 3)
    }

    #[test]
    fn cell_positions_span_the_chunk() {
        let shared = chunk(8);
        assert_eq!(shared.extent(), 4.0);
        assert_eq!(shared.cell_position(0, 0, 0), Point3::new(8.0, -2.0, -12.0));
        assert_eq!(shared.cell_position(4, 4, 4), Point3::new(10.0, 0.0, -10.0));
        assert_eq!(shared.cell_position(7, 7, 7), Point3::new(11.5, 1.5, -8.5));
    }

    #[test]
    fn generate_hands_back_a_pending_upload() {
        let shared = chunk(8);
        let mut uploader = HeadlessUploader::new();
        let outcome = shared
            .generate(&LayeredGenerator::new(0.0, 2.0), &mut uploader, &TerrainSettings::default())
            .unwrap();

        assert_eq!(outcome, GenerationOutcome::Uploaded);
        assert_eq!(shared.state(), ChunkState::AwaitingUpload);
        let pending = shared.poll_upload().unwrap();
        assert!(pending.upload.is_some());
        assert!(!pending.ranges.opaque.is_empty());
    }

    #[test]
    fn empty_chunks_skip_the_upload() {
        let shared = chunk(4);
        let mut uploader = HeadlessUploader::new();
        let counter = uploader.upload_counter();
        shared
            .generate(&LayeredGenerator::new(-100.0, 2.0), &mut uploader, &TerrainSettings::default())
            .unwrap();

        assert_eq!(counter.load(Ordering::Relaxed), 0);
        let pending = shared.poll_upload().unwrap();
        assert!(pending.upload.is_none());
        assert!(pending.ranges.is_empty());
    }

    struct Exploding;

    impl TerrainGenerator for Exploding {
        fn generate_material(&self, _: Point3<f64>, _: u32) -> MaterialIndex {
            panic!("no terrain here");
        }

        fn generate_palette(&self, _: Point3<f64>, _: u32, _: &mut Palette) {}
    }

    #[test]
    fn panicking_generator_fails_the_chunk() {
        let shared = chunk(4);
        let outcome = shared
            .generate(&Exploding, &mut HeadlessUploader::new(), &TerrainSettings::default())
            .unwrap();
        assert_eq!(outcome, GenerationOutcome::Failed);
        assert_eq!(shared.state(), ChunkState::Failed);
        assert!(!shared.upload.is_some());
    }

    #[test]
    fn upload_errors_are_returned() {
        let shared = chunk(4);
        let generator = LayeredGenerator::new(100.0, 2.0);
        assert_eq!(generator.generate_material(shared.center, 0), STONE);
        let result = shared.generate(
            &generator,
            &mut HeadlessUploader::failing(),
            &TerrainSettings::default(),
        );
        assert!(matches!(result, Err(UploadError::Context(_))));
        assert_eq!(shared.state(), ChunkState::Failed);
    }

    #[test]
    fn held_fence_keeps_the_upload_pending() {
        let shared = chunk(4);
        let (mut uploader, gate) = HeadlessUploader::held();
        shared
            .generate(&LayeredGenerator::new(100.0, 2.0), &mut uploader, &TerrainSettings::default())
            .unwrap();

        assert!(shared.poll_upload().is_none());
        gate.open();
        assert!(shared.poll_upload().is_some());
    }

    #[test]
    fn retire_happens_once() {
        let shared = chunk(4);
        assert!(shared.retire());
        assert!(!shared.retire());
        assert!(shared.is_retired());
    }
}

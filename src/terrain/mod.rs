//! # Terrain
//!
//! Level-of-detail voxel terrain streamed around a camera.
//!
//! The terrain is an octree of [`ChunkNode`]s rooted at one coarse chunk.
//! Every frame `update` walks the tree from the main thread: finished uploads
//! are picked up, chunks near the camera subdivide, distant subtrees
//! collapse and scores are refreshed so the [`BackgroundGenerator`] builds the
//! most urgent chunk next. `draw` then emits one draw call per visible chunk
//! mesh.
//!
//! ## Key Components
//! - `Terrain`: owns the chunk tree and the generation worker
//! - `ChunkNode`: main-thread tree node with children and GPU mesh
//! - `BackgroundGenerator`: worker thread with a score-ordered pending set
//! - `TerrainGenerator`: the voxel callbacks, with noise and layered strategies

pub mod background;
pub mod chunk;
pub mod generation;

use std::sync::Arc;

use cgmath::Point3;
use log::{debug, info};

use crate::camera::{Camera, FrameContext};
use crate::config::TerrainSettings;
use crate::error::TerrainError;
use crate::rendering::gpu::{DrawTarget, UploadContext};

pub use background::{BackgroundGenerator, GeneratorStats};
pub use chunk::{ChunkNode, ChunkShared, ChunkState};
pub use generation::{LayeredGenerator, NoiseGenerator, TerrainGenerator};

use chunk::UpdateContext;

/// An octree terrain generated in the background and drawn by level of
/// detail.
pub struct Terrain<U: UploadContext> {
    settings: TerrainSettings,
    generator: BackgroundGenerator<U>,
    root: Option<ChunkNode<U>>,
}

impl<U: UploadContext> Terrain<U> {
    /// Creates the terrain and queues its root chunk.
    ///
    /// # Arguments
    /// * `settings` - Root placement, chunk dimensions and LOD parameters
    /// * `generator` - Voxel callbacks, called from the worker thread only
    /// * `uploader` - Upload context moved onto the worker thread
    ///
    /// # Returns
    /// The terrain, or [`TerrainError::WorkerSpawn`] if the worker thread
    /// could not be started.
    pub fn new<G: TerrainGenerator>(
        settings: TerrainSettings,
        generator: G,
        uploader: U,
    ) -> Result<Self, TerrainError> {
        let background = BackgroundGenerator::spawn(Arc::new(generator), uploader, settings.clone())?;

        let [x, y, z] = settings.root_center;
        let root = ChunkShared::new(
            background.next_id(),
            Point3::new(x, y, z),
            settings.voxel_size,
            settings.chunk_size,
            settings.max_level,
        );
        let score = -(settings.max_level as f64) * settings.score_level_bias;
        let root = ChunkNode::new(root, score, &background);

        info!(
            "Created terrain: root extent {}, {} levels, {:?} mesher",
            settings.root_extent(),
            settings.max_level + 1,
            settings.mesher
        );

        Ok(Terrain {
            settings,
            generator: background,
            root: Some(root),
        })
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn root(&self) -> Option<&ChunkNode<U>> {
        self.root.as_ref()
    }

    /// Advances the chunk tree by one frame.
    ///
    /// Never waits on the worker. Fails once the worker has stopped because
    /// an upload failed or the thread died.
    pub fn update<C: Camera + ?Sized>(&mut self, frame: &FrameContext<'_, C>) -> Result<(), TerrainError> {
        self.generator.check_health()?;

        let cx = UpdateContext {
            camera: frame.camera,
            settings: &self.settings,
            generator: &self.generator,
        };
        if let Some(root) = self.root.as_mut() {
            root.update(&cx, true);
        }
        Ok(())
    }

    /// Draws every visible chunk mesh and returns the number of draw calls.
    pub fn draw<C, T>(&self, frame: &FrameContext<'_, C>, target: &mut T) -> usize
    where
        C: Camera + ?Sized,
        T: DrawTarget<U::Buffers> + ?Sized,
    {
        let draws = self
            .root
            .as_ref()
            .map_or(0, |root| root.draw(frame.camera.position(), target));
        if frame.flags.debug {
            debug!("Terrain drew {draws} chunks, {} nodes", self.node_count());
        }
        draws
    }

    /// Number of chunk nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.root.as_ref().map_or(0, ChunkNode::node_count)
    }

    pub fn stats(&self) -> GeneratorStats {
        self.generator.stats()
    }

    /// Blocks until the worker has drained its pending set.
    pub fn wait_idle(&self) {
        self.generator.wait_idle();
    }
}

impl<U: UploadContext> Drop for Terrain<U> {
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            root.destroy(&self.generator);
        }
        self.generator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PointCamera;
    use crate::rendering::gpu::{DrawRecorder, HeadlessUploader};
    use crate::voxels::{Material, MaterialIndex, Palette};
    use cgmath::{InnerSpace, Matrix4};
    use std::collections::HashSet;

    /// Alternating solid and empty cells, so every chunk has a mesh.
    struct Checkered;

    impl TerrainGenerator for Checkered {
        fn generate_material(&self, position: Point3<f64>, level: u32) -> MaterialIndex {
            let cell = position.x.floor() + position.y.floor() + position.z.floor();
            if (cell as i64 + level as i64).rem_euclid(2) == 0 {
                1
            } else {
                0
            }
        }

        fn generate_palette(&self, _: Point3<f64>, _: u32, palette: &mut Palette) {
            palette.set(1, Material::rgb(200, 180, 40));
        }
    }

    /// Panics for every chunk except the root.
    struct RootOnly;

    impl TerrainGenerator for RootOnly {
        fn generate_material(&self, _: Point3<f64>, level: u32) -> MaterialIndex {
            assert_eq!(level, 2, "only the root generates");
            1
        }

        fn generate_palette(&self, _: Point3<f64>, _: u32, palette: &mut Palette) {
            palette.set(1, Material::rgb(10, 10, 10));
        }
    }

    fn settings() -> TerrainSettings {
        TerrainSettings {
            lod_distance: 100.0,
            voxel_size: 1.0,
            chunk_size: 8,
            max_level: 2,
            ..TerrainSettings::default()
        }
    }

    fn origin_camera() -> PointCamera {
        PointCamera::new(Point3::new(0.0, 0.0, 0.0))
    }

    /// Sees only the half space `x > 0`.
    struct EastOnly;

    impl Camera for EastOnly {
        fn position(&self) -> Point3<f64> {
            Point3::new(0.0, 0.0, 0.0)
        }

        fn intersects_frustum(&self, center: Point3<f64>, half_extent: f64) -> bool {
            center.x + half_extent > 0.0
        }
    }

    #[test]
    fn root_subdivides_and_hands_drawing_to_its_children() {
        let camera = origin_camera();
        let frame = FrameContext::new(&camera);
        let mut terrain = Terrain::new(settings(), Checkered, HeadlessUploader::new()).unwrap();

        terrain.wait_idle();
        terrain.update(&frame).unwrap();

        let root = terrain.root().unwrap();
        assert_eq!(root.state(), ChunkState::Generated);
        let children = root.children().unwrap();
        assert_eq!(children.len(), 8);
        assert!(children.iter().all(|child| child.state() != ChunkState::Generated));
        assert!(children.iter().all(|child| child.level() == 1));

        let mut recorder = DrawRecorder::default();
        assert_eq!(terrain.draw(&frame, &mut recorder), 1);
        assert_eq!(recorder.draws[0].transform, Matrix4::from_translation([-4.0, -4.0, -4.0].into()));

        terrain.wait_idle();
        terrain.update(&frame).unwrap();
        let root = terrain.root().unwrap();
        assert!(root
            .children()
            .unwrap()
            .iter()
            .all(|child| child.state() == ChunkState::Generated));

        recorder.clear();
        assert_eq!(terrain.draw(&frame, &mut recorder), 8);
        let origins: HashSet<[i32; 3]> = recorder
            .draws
            .iter()
            .map(|draw| {
                let t = draw.transform.w;
                [t.x as i32, t.y as i32, t.z as i32]
            })
            .collect();
        assert_eq!(origins.len(), 8);
        assert!(origins.iter().all(|o| o.iter().all(|&c| c == -4 || c == 0)));
    }

    #[test]
    fn children_are_not_polled_in_the_frame_that_creates_them() {
        let camera = origin_camera();
        let frame = FrameContext::new(&camera);
        let settings = TerrainSettings {
            chunk_size: 2,
            ..settings()
        };

        for _ in 0..50 {
            let mut terrain = Terrain::new(settings.clone(), Checkered, HeadlessUploader::new()).unwrap();
            terrain.wait_idle();
            terrain.update(&frame).unwrap();

            let root = terrain.root().unwrap();
            let children = root.children().unwrap();
            assert!(children.iter().all(|child| child.state() != ChunkState::Generated));
            assert!(children.iter().all(|child| !child.is_visible()));
            let minimum = children.iter().map(ChunkNode::score).fold(f64::INFINITY, f64::min);
            assert_eq!(root.score(), minimum);

            terrain.wait_idle();
            let root = terrain.root().unwrap();
            assert!(root
                .children()
                .unwrap()
                .iter()
                .all(|child| child.state() == ChunkState::AwaitingUpload));

            terrain.update(&frame).unwrap();
            let root = terrain.root().unwrap();
            assert!(root
                .children()
                .unwrap()
                .iter()
                .all(|child| child.state() == ChunkState::Generated));
        }
    }

    #[test]
    fn chunks_outside_the_frustum_are_not_drawn() {
        let camera = EastOnly;
        let frame = FrameContext::new(&camera);
        let mut terrain = Terrain::new(settings(), Checkered, HeadlessUploader::new()).unwrap();

        terrain.wait_idle();
        terrain.update(&frame).unwrap();
        terrain.wait_idle();
        terrain.update(&frame).unwrap();

        let root = terrain.root().unwrap();
        assert!(root.is_visible());
        let children = root.children().unwrap();
        assert!(children.iter().all(|child| child.state() == ChunkState::Generated));
        for child in children.iter() {
            assert_eq!(child.is_visible(), child.center().x > 0.0);
        }

        let mut recorder = DrawRecorder::default();
        assert_eq!(terrain.draw(&frame, &mut recorder), 4);
        assert!(recorder.draws.iter().all(|draw| draw.transform.w.x == 0.0));
    }

    #[test]
    fn held_uploads_are_never_drawn() {
        let camera = origin_camera();
        let frame = FrameContext::new(&camera);
        let (uploader, gate) = HeadlessUploader::held();
        let mut terrain = Terrain::new(settings(), Checkered, uploader).unwrap();

        terrain.wait_idle();
        for _ in 0..3 {
            terrain.update(&frame).unwrap();
        }
        let root = terrain.root().unwrap();
        assert_eq!(root.state(), ChunkState::AwaitingUpload);
        assert!(root.children().is_none());
        assert!(!root.has_mesh());

        let mut recorder = DrawRecorder::default();
        assert_eq!(terrain.draw(&frame, &mut recorder), 0);

        gate.open();
        terrain.update(&frame).unwrap();
        assert_eq!(terrain.root().unwrap().state(), ChunkState::Generated);
        assert_eq!(terrain.draw(&frame, &mut recorder), 1);
    }

    #[test]
    fn parent_score_is_the_minimum_of_its_children() {
        let camera = PointCamera::new(Point3::new(3.0, 1.0, -2.0));
        let frame = FrameContext::new(&camera);
        let settings = settings();
        let mut terrain = Terrain::new(settings.clone(), Checkered, HeadlessUploader::new()).unwrap();

        terrain.wait_idle();
        terrain.update(&frame).unwrap();
        terrain.update(&frame).unwrap();

        let root = terrain.root().unwrap();
        let children = root.children().unwrap();
        for child in children.iter().filter(|child| child.children().is_none()) {
            let distance = (camera.position - child.center()).magnitude();
            let expected = distance * distance - settings.score_level_bias;
            assert!((child.score() - expected).abs() < 1e-9);
        }
        let minimum = children.iter().map(ChunkNode::score).fold(f64::INFINITY, f64::min);
        assert_eq!(root.score(), minimum);
    }

    #[test]
    fn collapsing_deletes_every_chunk_exactly_once() {
        let near = origin_camera();
        let far = PointCamera::new(Point3::new(1.0e6, 0.0, 0.0));
        let mut terrain = Terrain::new(settings(), Checkered, HeadlessUploader::new()).unwrap();

        terrain.wait_idle();
        terrain.update(&FrameContext::new(&near)).unwrap();
        terrain.update(&FrameContext::new(&far)).unwrap();
        terrain.wait_idle();

        assert!(terrain.root().unwrap().children().is_none());
        assert_eq!(terrain.node_count(), 1);
        let stats = terrain.stats();
        assert_eq!(stats.queued, 9);
        assert_eq!(stats.deleted_by_main + stats.deleted_by_worker, 8);
        assert!(stats.cancelled <= 8);
    }

    #[test]
    fn failed_children_keep_the_parent_drawing() {
        let camera = origin_camera();
        let frame = FrameContext::new(&camera);
        let mut terrain = Terrain::new(settings(), RootOnly, HeadlessUploader::new()).unwrap();

        terrain.wait_idle();
        terrain.update(&frame).unwrap();
        terrain.wait_idle();
        terrain.update(&frame).unwrap();

        let root = terrain.root().unwrap();
        let children = root.children().unwrap();
        assert!(children.iter().all(|child| child.state() == ChunkState::Failed));
        assert!(children.iter().all(|child| child.score() == f64::INFINITY));
        assert_eq!(terrain.stats().failed, 8);

        let mut recorder = DrawRecorder::default();
        assert_eq!(terrain.draw(&frame, &mut recorder), 1);
        assert_eq!(recorder.draws[0].transform, Matrix4::from_translation([-4.0, -4.0, -4.0].into()));
    }

    #[test]
    fn upload_failure_surfaces_from_update() {
        let camera = origin_camera();
        let frame = FrameContext::new(&camera);
        let mut terrain = Terrain::new(settings(), Checkered, HeadlessUploader::failing()).unwrap();

        terrain.wait_idle();
        assert!(matches!(terrain.update(&frame), Err(TerrainError::Upload(_))));
    }
}

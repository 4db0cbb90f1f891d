#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Terrain
//!
//! An unbounded level-of-detail voxel terrain: an octree of chunks that
//! subdivides around the camera, a background worker that fills, meshes and
//! uploads chunks off the render thread, and greedy meshers for dense grids
//! and sparse octrees.
//!
//! ## Key Modules
//!
//! * `terrain` - Chunk octree, background generator and generation strategies
//! * `voxels` - Materials, palettes, dense grids, sparse octrees and `.qb` files
//! * `rendering` - Vertex layout, meshers and the GPU upload and draw seams
//! * `camera` - The camera queries the terrain consumes and a fly camera
//! * `config` - Key/value configuration and typed terrain settings
//! * `core` - Cross-thread resource slots
//!
//! ## Usage
//!
//! ```rust
//! use cgmath::Point3;
//! use voxel_terrain::camera::{FrameContext, PointCamera};
//! use voxel_terrain::config::TerrainSettings;
//! use voxel_terrain::rendering::{DrawRecorder, HeadlessUploader};
//! use voxel_terrain::terrain::{LayeredGenerator, Terrain};
//!
//! let settings = TerrainSettings { max_level: 2, chunk_size: 8, ..Default::default() };
//! let mut terrain = Terrain::new(settings, LayeredGenerator::default(), HeadlessUploader::new())?;
//!
//! let camera = PointCamera::new(Point3::new(0.0, 2.0, 0.0));
//! let frame = FrameContext::new(&camera);
//! let mut recorder = DrawRecorder::default();
//!
//! terrain.update(&frame)?;
//! terrain.draw(&frame, &mut recorder);
//! # Ok::<(), voxel_terrain::error::TerrainError>(())
//! ```

use std::thread;
use std::time::Duration;

use cgmath::{Deg, Point3};
use log::info;
use web_time::Instant;

pub mod camera;
pub mod config;
pub mod core;
pub mod error;
pub mod rendering;
pub mod terrain;
pub mod voxels;

use camera::{FlyCamera, FrameContext, Projection, RenderFlags};
use config::{Config, TerrainSettings};
use error::TerrainError;
use rendering::{DrawRecorder, HeadlessUploader};
use terrain::{NoiseGenerator, Terrain};

/// Frames flown by the headless demo.
const DEMO_FRAMES: u32 = 240;
const DEMO_FRAME_TIME: Duration = Duration::from_millis(16);
/// Distance flown per frame.
const DEMO_SPEED: f64 = 2.0;

/// Headless terrain demo.
///
/// Reads the configuration from the command line (`-c PATH` and `key=value`
/// overrides), then flies a camera across noise terrain with a CPU upload
/// context, logging what the terrain generates and draws.
#[cfg(not(target_family = "wasm"))]
pub fn run() -> Result<(), TerrainError> {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");

    let config = Config::from_args(std::env::args().skip(1))?;
    let settings = TerrainSettings::from_config(&config);
    let seed = config
        .get_integer("terrain.seed")
        .and_then(|seed| u32::try_from(seed).ok())
        .unwrap_or(0);

    let [x, y, z] = settings.root_center;
    let mut camera = FlyCamera::new(
        Point3::new(x, y + 32.0, z),
        Deg(0.0),
        Deg(-20.0),
        Projection::new(1280, 720, Deg(70.0), 0.1, 10_000.0),
    );
    let flags = RenderFlags {
        wireframe: false,
        debug: config.get_bool("debug").unwrap_or(false),
    };

    let mut terrain = Terrain::new(settings, NoiseGenerator::new(seed), HeadlessUploader::new())?;
    let mut recorder = DrawRecorder::default();
    let start = Instant::now();

    for frame_index in 0..DEMO_FRAMES {
        camera.fly(DEMO_SPEED, 0.0, 0.0);
        let frame = FrameContext::with_flags(&camera, flags);

        terrain.update(&frame)?;
        recorder.clear();
        let draws = terrain.draw(&frame, &mut recorder);

        if frame_index % 60 == 0 {
            info!(
                "Frame {frame_index}: {} nodes, {draws} draws, {} indices, {:?}",
                terrain.node_count(),
                recorder.index_count(),
                terrain.stats()
            );
        }
        thread::sleep(DEMO_FRAME_TIME);
    }

    info!(
        "Flew {} frames in {:?}: {:?}",
        DEMO_FRAMES,
        start.elapsed(),
        terrain.stats()
    );
    Ok(())
}

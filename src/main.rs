//! # Voxel Terrain Demo Entry Point
//!
//! Runs the library's headless `run()` demo.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release -- -c terrain.cfg terrain.mesher=octree
//! ```

#[cfg(not(target_family = "wasm"))]
fn main() {
    if let Err(err) = voxel_terrain::run() {
        eprintln!("voxel-terrain: {err}");
        std::process::exit(1);
    }
}

#[cfg(target_family = "wasm")]
fn main() {}

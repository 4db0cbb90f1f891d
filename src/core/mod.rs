//! # Core Module
//!
//! Concurrency primitives shared by the terrain's main and worker threads.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted slot with read-write locking
//!
//! ## Usage
//! ```rust
//! use voxel_terrain::core::MtResource;
//!
//! let counter = MtResource::new(0);
//! *counter.get_mut() += 1;
//! assert_eq!(*counter.get(), 1);
//! ```

pub mod mt_resource;

pub use mt_resource::MtResource;

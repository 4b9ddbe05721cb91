//! Lidarmap - LiDAR survey tiles to georeferenced rasters
//!
//! This library downloads remotely hosted LAS point-cloud tiles, renders each
//! tile into one GeoTIFF per configured output rule and archives the raw tile
//! as LAZ for later reuse.
//!
//! # Architecture
//!
//! ```text
//!   manifest ──► enumerator ──► download backlog ──► download workers
//!                    │                                     │
//!                    └──────► processing backlog ◄─────────┘
//!                                     │
//!                                     ▼
//!                            processing workers
//!                  (guard → decode → rasterize → archive)
//! ```
//!
//! - [`pipeline`]: backlogs, the continuation guard and both worker pools
//! - [`raster`]: the colour, binary-mask and linear-scale generators
//! - [`archive`]: LAS ⇄ LAZ archival
//! - [`download`]: tile fetching and the download registry
//! - [`config`]: INI configuration
//!
//! Completed work is never tracked in a job ledger: a raster that exists on
//! disk is done, and everything else is recomputed from filesystem state.

pub mod archive;
pub mod config;
pub mod download;
pub mod logging;
pub mod pipeline;
pub mod pointcloud;
pub mod raster;
pub mod tile;

/// Library version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

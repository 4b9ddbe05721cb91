//! Integration tests for the tile pipeline.
//!
//! These tests drive complete runs against a temporary data directory with a
//! scripted fetcher standing in for the network:
//! - fresh tiles are downloaded, rasterized, archived and cleaned up
//! - a second run over the same manifest does no work
//! - corrupt downloads, raw tiles and archives are discarded and fetched again
//! - the per-run download limit stops endless re-fetching
//!
//! Run with: `cargo test --test pipeline_integration`

use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use las::point::Classification;
use las::{Builder, Point, Writer};
use tiff::decoder::{Decoder, DecodingResult};

use lidarmap::archive::{compress_file, decompress_file, ArchiveManager};
use lidarmap::config::{ColorMap, GeneratorConfig, PipelineConfig};
use lidarmap::download::{FetchError, FetchResult, TileFetcher};
use lidarmap::pipeline::Pipeline;
use lidarmap::pointcloud::Attribute;
use lidarmap::tile::manifest::FileManifest;
use lidarmap::tile::StorageLayout;

// ============================================================================
// Helper Functions
// ============================================================================

const TILE_URL: &str = "https://tiles.example/lgia-opendata/las/4311/4311-34-13.las";

/// (x, y, z, class) for a small tile spanning 3×4 coordinate units.
const POINTS: &[(f64, f64, f64, u8)] = &[
    (506000.0, 312000.0, 80.0, 2),
    (506002.0, 312000.0, 85.0, 6),
    (506001.0, 312003.0, 95.0, 6),
];

/// Encode `POINTS` as an uncompressed LAS file and return its bytes.
fn las_bytes(dir: &Path) -> Vec<u8> {
    let path = dir.join("fixture.las");
    let header = Builder::from((1, 2)).into_header().unwrap();
    let mut writer = Writer::from_path(&path, header).unwrap();
    for &(x, y, z, class) in POINTS {
        writer
            .write_point(Point {
                x,
                y,
                z,
                classification: Classification::new(class).unwrap(),
                ..Default::default()
            })
            .unwrap();
    }
    writer.close().unwrap();
    fs::read(&path).unwrap()
}

#[derive(Clone)]
enum Reply {
    Body(Vec<u8>),
    Fail,
}

/// Answers fetches from a script, repeating the last reply once it runs out.
struct ScriptedFetcher {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TileFetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> FetchResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap_or(Reply::Fail)
            }
        };

        match reply {
            Reply::Body(bytes) => {
                fs::create_dir_all(dest.parent().unwrap()).unwrap();
                fs::write(dest, &bytes).unwrap();
                Ok(bytes.len() as u64)
            }
            Reply::Fail => Err(FetchError::DownloadFailed {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            }),
        }
    }
}

struct Workspace {
    dir: tempfile::TempDir,
    manifest: PathBuf,
}

impl Workspace {
    fn new(urls: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.txt");
        fs::write(&manifest, urls.join("\n")).unwrap();
        Self { dir, manifest }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.root())
            .with_workers(2, 2)
            .with_retry_backoff(Duration::ZERO)
            .with_output(GeneratorConfig::binary(
                "buildings",
                self.root().join("out/buildings"),
                6,
            ))
    }

    fn raw(&self) -> PathBuf {
        self.root().join("las/4311/4311-34-13.las")
    }

    fn archive(&self) -> PathBuf {
        self.root().join("laz/4311/4311-34-13.laz")
    }

    fn raster(&self, output: &str) -> PathBuf {
        self.root()
            .join("out")
            .join(output)
            .join("4311/4311-34-13.tif")
    }

    fn run(&self, config: PipelineConfig, fetcher: Arc<ScriptedFetcher>) -> lidarmap::pipeline::RunSummary {
        Pipeline::new(config, fetcher)
            .run(&FileManifest::new(&self.manifest))
            .unwrap()
    }
}

fn read_gray(path: &Path) -> ((u32, u32), Vec<u8>) {
    let mut decoder = Decoder::new(File::open(path).unwrap()).unwrap();
    let dims = decoder.dimensions().unwrap();
    match decoder.read_image().unwrap() {
        DecodingResult::U8(data) => (dims, data),
        _ => panic!("expected 8-bit samples"),
    }
}

// ============================================================================
// Fresh and repeated runs
// ============================================================================

#[test]
fn test_fresh_tile_is_downloaded_rasterized_and_archived() {
    let ws = Workspace::new(&[TILE_URL]);
    let fetcher = ScriptedFetcher::new(vec![Reply::Body(las_bytes(ws.root()))]);

    let summary = ws.run(ws.config(), Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.tiles_listed, 1);
    assert_eq!(summary.downloads_completed, 1);
    assert_eq!(summary.rasters_written, 1);
    assert_eq!(summary.tiles_archived, 1);
    assert!(!summary.has_failures());
    assert!(!summary.interrupted);

    assert!(ws.archive().is_file());
    assert!(!ws.raw().exists(), "raw tile removed after archival");

    // Rows grow northward: row 0 is y = 312000.
    let ((width, height), data) = read_gray(&ws.raster("buildings"));
    assert_eq!((width, height), (3, 4));
    assert_eq!(&data[0..3], &[0, 0, 255]);
    assert_eq!(&data[9..12], &[0, 255, 0]);
}

#[test]
fn test_second_run_does_no_work() {
    let ws = Workspace::new(&[TILE_URL]);
    let fetcher = ScriptedFetcher::new(vec![Reply::Body(las_bytes(ws.root()))]);
    ws.run(ws.config(), Arc::clone(&fetcher));
    let written = fs::metadata(ws.raster("buildings")).unwrap().modified().unwrap();

    let summary = ws.run(ws.config(), Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.tiles_skipped, 1);
    assert_eq!(summary.rasters_written, 0);
    assert_eq!(
        fs::metadata(ws.raster("buildings")).unwrap().modified().unwrap(),
        written
    );
}

#[test]
fn test_new_output_reuses_archive_without_download() {
    let ws = Workspace::new(&[TILE_URL]);
    let fetcher = ScriptedFetcher::new(vec![Reply::Body(las_bytes(ws.root()))]);
    ws.run(ws.config(), Arc::clone(&fetcher));

    let config = ws.config().with_output(GeneratorConfig::linear(
        "height",
        ws.root().join("out/height"),
        Attribute::Z,
        80.0,
        100.0,
    ));
    let summary = ws.run(config, Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 1, "tile restored from archive, not fetched");
    assert_eq!(summary.rasters_written, 1);
    assert!(ws.raster("height").is_file());
    assert!(!ws.raw().exists());
}

#[test]
fn test_local_raw_tile_is_processed_without_download() {
    let ws = Workspace::new(&[TILE_URL]);
    let bytes = las_bytes(ws.root());
    fs::create_dir_all(ws.raw().parent().unwrap()).unwrap();
    fs::write(ws.raw(), bytes).unwrap();
    let fetcher = ScriptedFetcher::new(vec![Reply::Fail]);

    let config = ws.config().with_archival(false).with_cleanup(false);
    let summary = ws.run(config, Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 0);
    assert_eq!(summary.rasters_written, 1);
    assert!(ws.raw().is_file());
    assert!(!ws.archive().exists());
}

#[test]
fn test_color_and_binary_outputs_from_one_download() {
    let ws = Workspace::new(&[TILE_URL]);
    let fetcher = ScriptedFetcher::new(vec![Reply::Body(las_bytes(ws.root()))]);
    let config = ws.config().with_output(GeneratorConfig::color(
        "classes",
        ws.root().join("out/classes"),
        ColorMap::new().with(2, [120, 80, 40]).with(6, [255, 0, 0]),
    ));

    let summary = ws.run(config, Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.rasters_written, 2);
    assert!(ws.raster("classes").is_file());
    assert!(ws.raster("buildings").is_file());
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn test_corrupt_download_is_fetched_again() {
    let ws = Workspace::new(&[TILE_URL]);
    let fetcher = ScriptedFetcher::new(vec![
        Reply::Body(b"LASF truncated".to_vec()),
        Reply::Body(las_bytes(ws.root())),
    ]);

    let summary = ws.run(ws.config(), Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(summary.corrupt_tiles, 1);
    assert_eq!(summary.downloads_completed, 2);
    assert_eq!(summary.rasters_written, 1);
    assert!(ws.raster("buildings").is_file());
}

#[test]
fn test_persistently_corrupt_tile_stops_at_attempt_limit() {
    let ws = Workspace::new(&[TILE_URL]);
    let fetcher = ScriptedFetcher::new(vec![Reply::Body(b"not a point cloud".to_vec())]);
    let config = ws.config().with_max_download_attempts(3);

    let summary = ws.run(config, Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 3);
    assert_eq!(summary.corrupt_tiles, 3);
    assert_eq!(summary.downloads_abandoned, 1);
    assert_eq!(summary.rasters_written, 0);
    assert!(!ws.raw().exists());
    assert!(!ws.raster("buildings").exists());
}

#[test]
fn test_corrupt_archive_is_replaced_by_download() {
    let ws = Workspace::new(&[TILE_URL]);
    fs::create_dir_all(ws.archive().parent().unwrap()).unwrap();
    fs::write(ws.archive(), b"garbage").unwrap();
    let fetcher = ScriptedFetcher::new(vec![Reply::Body(las_bytes(ws.root()))]);

    let summary = ws.run(ws.config(), Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.rasters_written, 1);
    assert_eq!(summary.tiles_archived, 1);
    let layout = StorageLayout::new(ws.root().join("las"), ws.root().join("laz"), "/las/");
    let restored = ws.root().join("check.las");
    let points = ArchiveManager::new(layout)
        .decompress(&ws.archive(), &restored)
        .unwrap();
    assert_eq!(points, POINTS.len() as u64);
}

#[test]
fn test_corrupt_raw_tile_discards_archive_and_fetches_once() {
    let ws = Workspace::new(&[TILE_URL]);
    fs::create_dir_all(ws.raw().parent().unwrap()).unwrap();
    fs::write(ws.raw(), b"LASF truncated").unwrap();

    let stale = ws.root().join("stale.las");
    let header = Builder::from((1, 2)).into_header().unwrap();
    let mut writer = Writer::from_path(&stale, header).unwrap();
    writer
        .write_point(Point {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            ..Default::default()
        })
        .unwrap();
    writer.close().unwrap();
    compress_file(&stale, &ws.archive()).unwrap();

    let fetcher = ScriptedFetcher::new(vec![Reply::Body(las_bytes(ws.root()))]);
    let summary = ws.run(ws.config(), Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.corrupt_tiles, 1);
    assert_eq!(summary.downloads_completed, 1);
    assert_eq!(summary.rasters_written, 1);
    assert_eq!(summary.tiles_archived, 1);
    assert!(ws.raster("buildings").is_file());
    assert!(!ws.raw().exists());

    let restored = ws.root().join("check.las");
    let points = decompress_file(&ws.archive(), &restored).unwrap();
    assert_eq!(points, POINTS.len() as u64);
}

#[test]
fn test_failed_download_is_not_retried() {
    let ws = Workspace::new(&[TILE_URL]);
    let fetcher = ScriptedFetcher::new(vec![Reply::Fail]);

    let summary = ws.run(ws.config(), Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.downloads_failed, 1);
    assert!(summary.has_failures());
    assert!(!ws.raw().exists());
}

// ============================================================================
// Manifest handling
// ============================================================================

#[test]
fn test_bad_urls_are_skipped() {
    let ws = Workspace::new(&[
        "https://tiles.example/elsewhere/a.las",
        TILE_URL,
        TILE_URL,
        "https://tiles.example/las/readme.txt",
    ]);
    let fetcher = ScriptedFetcher::new(vec![Reply::Body(las_bytes(ws.root()))]);

    let summary = ws.run(ws.config(), Arc::clone(&fetcher));

    assert_eq!(summary.tiles_listed, 3);
    assert_eq!(summary.tiles_rejected, 2);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(summary.rasters_written, 1);
}

#[test]
fn test_many_tiles_with_small_backlogs() {
    let urls: Vec<String> = (0..12)
        .map(|i| format!("https://tiles.example/las/{}/tile-{}.las", i % 3, i))
        .collect();
    let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let ws = Workspace::new(&refs);
    let fetcher = ScriptedFetcher::new(vec![Reply::Body(las_bytes(ws.root()))]);
    let config = ws.config().with_queue_capacity(1).with_workers(3, 2);

    let summary = ws.run(config, Arc::clone(&fetcher));

    assert_eq!(fetcher.calls(), 12);
    assert_eq!(summary.rasters_written, 12);
    assert_eq!(summary.tiles_archived, 12);
    for i in 0..12 {
        let raster = ws
            .root()
            .join(format!("out/buildings/{}/tile-{}.tif", i % 3, i));
        assert!(raster.is_file(), "missing {}", raster.display());
    }
}

#[test]
fn test_missing_manifest_aborts_run() {
    let ws = Workspace::new(&[]);
    let fetcher = ScriptedFetcher::new(vec![Reply::Fail]);
    let result = Pipeline::new(ws.config(), fetcher).run(&FileManifest::new(ws.root().join("nope.txt")));
    assert!(result.is_err());
}

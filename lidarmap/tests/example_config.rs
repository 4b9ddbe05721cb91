//! The example configuration shipped at the workspace root must stay loadable.

use std::path::PathBuf;

use lidarmap::config::{GeneratorKind, PipelineConfig};

#[test]
fn test_example_config_loads() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../lidarmap.example.ini");
    let config = PipelineConfig::load(&path).unwrap();

    assert_eq!(config.processing.processing_workers, 4);
    assert_eq!(config.processing.download_workers, 2);
    assert_eq!(config.processing.epsg, 3059);
    assert_eq!(config.logging.file, Some(PathBuf::from("logs/lidarmap.log")));

    let kinds: Vec<_> = config.outputs.iter().map(|o| (o.name.as_str(), o.kind())).collect();
    assert_eq!(
        kinds,
        vec![
            ("classes", GeneratorKind::Color),
            ("buildings", GeneratorKind::Binary),
            ("height", GeneratorKind::Linear),
        ]
    );

    let enabled: Vec<_> = config.enabled_outputs().map(|o| o.name.as_str()).collect();
    assert_eq!(enabled, vec!["classes", "buildings"]);
}

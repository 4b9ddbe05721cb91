//! INI loading for [`PipelineConfig`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::output::{ColorMap, GeneratorConfig, GeneratorKind, GeneratorParams};
use super::{
    ConfigError, ConfigResult, LoggingConfig, ManifestConfig, PipelineConfig, ProcessingConfig,
};
use crate::pointcloud::Attribute;

const OUTPUT_SECTION_PREFIX: &str = "output.";

impl PipelineConfig {
    /// Load configuration from an INI file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(text: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(text)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = PipelineConfig::default();

        if let Some(props) = ini.section(Some("manifest")) {
            config.manifest = parse_manifest(props);
        }
        if let Some(props) = ini.section(Some("processing")) {
            config.processing = parse_processing(props)?;
        }
        if let Some(props) = ini.section(Some("logging")) {
            config.logging = parse_logging(props);
        }

        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            if let Some(name) = section.strip_prefix(OUTPUT_SECTION_PREFIX) {
                config.outputs.push(parse_output(section, name, props)?);
            }
        }

        Ok(config)
    }
}

fn parse_manifest(props: &Properties) -> ManifestConfig {
    let defaults = ManifestConfig::default();
    ManifestConfig {
        url: props.get("url").map(str::to_string).unwrap_or(defaults.url),
        path_marker: props
            .get("path_marker")
            .map(str::to_string)
            .unwrap_or(defaults.path_marker),
    }
}

fn parse_processing(props: &Properties) -> ConfigResult<ProcessingConfig> {
    const SECTION: &str = "processing";
    let defaults = ProcessingConfig::default();

    let processing_workers: usize =
        optional(props, SECTION, "processing_processes")?.unwrap_or(defaults.processing_workers);
    let download_workers: usize =
        optional(props, SECTION, "download_processes")?.unwrap_or(defaults.download_workers);
    let queue_capacity: usize =
        optional(props, SECTION, "queue_capacity")?.unwrap_or(defaults.queue_capacity);
    let max_download_attempts: u32 = optional(props, SECTION, "max_download_attempts")?
        .unwrap_or(defaults.max_download_attempts);

    for (key, value) in [
        ("processing_processes", processing_workers),
        ("download_processes", download_workers),
        ("queue_capacity", queue_capacity),
        ("max_download_attempts", max_download_attempts as usize),
    ] {
        if value == 0 {
            return Err(invalid(SECTION, key, "0", "must be at least 1"));
        }
    }

    Ok(ProcessingConfig {
        las_path: props
            .get("las_path")
            .map(PathBuf::from)
            .unwrap_or(defaults.las_path),
        laz_path: props
            .get("laz_path")
            .map(PathBuf::from)
            .unwrap_or(defaults.laz_path),
        compress_to_laz: optional_bool(props, SECTION, "compress_to_laz")?
            .unwrap_or(defaults.compress_to_laz),
        delete_las_after_processing: optional_bool(props, SECTION, "delete_las_after_processing")?
            .unwrap_or(defaults.delete_las_after_processing),
        processing_workers,
        download_workers,
        queue_capacity,
        max_download_attempts,
        retry_backoff: optional(props, SECTION, "retry_backoff_secs")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry_backoff),
        download_timeout: optional(props, SECTION, "download_timeout")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.download_timeout),
        epsg: optional(props, SECTION, "epsg")?.unwrap_or(defaults.epsg),
    })
}

fn parse_logging(props: &Properties) -> LoggingConfig {
    let defaults = LoggingConfig::default();
    LoggingConfig {
        file: props.get("file").map(PathBuf::from),
        level: props
            .get("level")
            .map(str::to_string)
            .unwrap_or(defaults.level),
    }
}

fn parse_output(section: &str, name: &str, props: &Properties) -> ConfigResult<GeneratorConfig> {
    let kind_value = required(props, section, "type")?;
    let kind =
        GeneratorKind::from_str(kind_value).map_err(|value| ConfigError::UnknownOutputType {
            section: section.to_string(),
            value,
        })?;

    let params = match kind {
        GeneratorKind::Color => {
            let color_map = match props.get("color_map") {
                Some(raw) => raw
                    .parse::<ColorMap>()
                    .map_err(|reason| invalid(section, "color_map", raw, &reason))?,
                None => ColorMap::new(),
            };
            let resolution: u32 = optional(props, section, "resolution")?.unwrap_or(1);
            if resolution == 0 {
                return Err(invalid(section, "resolution", "0", "must be at least 1"));
            }
            GeneratorParams::Color {
                color_map,
                resolution,
            }
        }
        GeneratorKind::Binary => GeneratorParams::Binary {
            point_class: parse_required(props, section, "point_class")?,
        },
        GeneratorKind::Linear => {
            let raw = required(props, section, "value_name")?;
            let attribute = raw
                .parse::<Attribute>()
                .map_err(|reason| invalid(section, "value_name", raw, &reason))?;
            let min_value: f64 = parse_required(props, section, "min_value")?;
            let max_value: f64 = parse_required(props, section, "max_value")?;
            if min_value.is_nan() || max_value.is_nan() || min_value >= max_value {
                return Err(invalid(
                    section,
                    "max_value",
                    &max_value.to_string(),
                    "must be greater than min_value",
                ));
            }
            GeneratorParams::Linear {
                attribute,
                min_value,
                max_value,
            }
        }
    };

    Ok(GeneratorConfig {
        name: name.to_string(),
        enabled: optional_bool(props, section, "enabled")?.unwrap_or(true),
        output_dir: PathBuf::from(required(props, section, "path")?),
        params,
    })
}

fn required<'a>(props: &'a Properties, section: &str, key: &str) -> ConfigResult<&'a str> {
    props.get(key).ok_or_else(|| ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn parse_required<T: FromStr>(props: &Properties, section: &str, key: &str) -> ConfigResult<T> {
    let raw = required(props, section, key)?;
    raw.trim()
        .parse()
        .map_err(|_| invalid(section, key, raw, "not a valid number"))
}

fn optional<T: FromStr>(props: &Properties, section: &str, key: &str) -> ConfigResult<Option<T>> {
    props
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| invalid(section, key, raw, "not a valid number"))
        })
        .transpose()
}

fn optional_bool(props: &Properties, section: &str, key: &str) -> ConfigResult<Option<bool>> {
    props
        .get(key)
        .map(|raw| match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(invalid(section, key, raw, "expected true or false")),
        })
        .transpose()
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

//! Output rule definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::pointcloud::Attribute;

/// An RGB triple.
pub type Rgb = [u8; 3];

/// Colour used for classifications missing from a colour map.
const UNMAPPED_COLOR: Rgb = [255, 255, 255];

/// The three supported raster kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    /// RGBA raster coloured by point classification.
    Color,
    /// Single-band mask of one classification.
    Binary,
    /// Single-band rescaled point attribute.
    Linear,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorKind::Color => "color",
            GeneratorKind::Binary => "binary",
            GeneratorKind::Linear => "linear",
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "color" | "colour" => Ok(GeneratorKind::Color),
            "binary" => Ok(GeneratorKind::Binary),
            "linear" => Ok(GeneratorKind::Linear),
            other => Err(other.to_string()),
        }
    }
}

/// Kind-specific generator parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorParams {
    Color {
        color_map: ColorMap,
        /// Pixels per coordinate unit along each axis.
        resolution: u32,
    },
    Binary {
        point_class: u8,
    },
    Linear {
        attribute: Attribute,
        min_value: f64,
        max_value: f64,
    },
}

/// One configured output rule.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Section name the rule was loaded from, used in logs.
    pub name: String,

    pub enabled: bool,

    /// Directory receiving this rule's rasters.
    pub output_dir: PathBuf,

    pub params: GeneratorParams,
}

impl GeneratorConfig {
    /// Colour-classification rule at one pixel per unit.
    pub fn color(name: impl Into<String>, output_dir: impl Into<PathBuf>, color_map: ColorMap) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            output_dir: output_dir.into(),
            params: GeneratorParams::Color {
                color_map,
                resolution: 1,
            },
        }
    }

    /// Binary-mask rule for one classification code.
    pub fn binary(name: impl Into<String>, output_dir: impl Into<PathBuf>, point_class: u8) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            output_dir: output_dir.into(),
            params: GeneratorParams::Binary { point_class },
        }
    }

    /// Linear-scale rule for one attribute.
    pub fn linear(
        name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        attribute: Attribute,
        min_value: f64,
        max_value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            output_dir: output_dir.into(),
            params: GeneratorParams::Linear {
                attribute,
                min_value,
                max_value,
            },
        }
    }

    /// Return the rule switched off.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set the colour resolution factor. No effect on other kinds.
    pub fn with_resolution(mut self, factor: u32) -> Self {
        if let GeneratorParams::Color { resolution, .. } = &mut self.params {
            *resolution = factor.max(1);
        }
        self
    }

    pub fn kind(&self) -> GeneratorKind {
        match self.params {
            GeneratorParams::Color { .. } => GeneratorKind::Color,
            GeneratorParams::Binary { .. } => GeneratorKind::Binary,
            GeneratorParams::Linear { .. } => GeneratorKind::Linear,
        }
    }
}

/// Classification code to colour lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorMap {
    entries: HashMap<u8, Rgb>,
}

impl ColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class: u8, color: Rgb) -> Self {
        self.entries.insert(class, color);
        self
    }

    /// Colour for `class`, white when unmapped.
    pub fn color_for(&self, class: u8) -> Rgb {
        self.entries.get(&class).copied().unwrap_or(UNMAPPED_COLOR)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for ColorMap {
    type Err = String;

    /// Parse `class:r,g,b` entries separated by whitespace or `;`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut map = ColorMap::new();
        for entry in s
            .split(|c: char| c == ';' || c.is_whitespace())
            .filter(|e| !e.is_empty())
        {
            let (class, rgb) = entry
                .split_once(':')
                .ok_or_else(|| format!("entry '{}' is not of the form class:r,g,b", entry))?;
            let class: u8 = class
                .trim()
                .parse()
                .map_err(|_| format!("'{}' is not a classification code", class.trim()))?;

            let channels = rgb
                .split(',')
                .map(|c| c.trim().parse::<u8>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| format!("'{}' is not an r,g,b triple", rgb.trim()))?;
            let color: Rgb = channels
                .try_into()
                .map_err(|_| format!("'{}' is not an r,g,b triple", rgb.trim()))?;

            map.entries.insert(class, color);
        }
        Ok(map)
    }
}

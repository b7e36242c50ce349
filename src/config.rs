use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use crate::swatch::Color;

/// Errors that can occur while loading or overriding the render configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file '{0}' not found")]
    NotFound(PathBuf),

    #[error("could not read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame must be a number, got '{0}'")]
    InvalidFrame(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Engine {
    Cycles,
    Eevee,
}

impl Engine {
    /// The engine identifier the renderer expects in its scene settings.
    pub fn renderer_id(&self) -> &'static str {
        match self {
            Engine::Cycles => "CYCLES",
            Engine::Eevee => "BLENDER_EEVEE_NEXT",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Cycles => write!(f, "CYCLES"),
            Engine::Eevee => write!(f, "EEVEE"),
        }
    }
}

/// A camera to render from, and the frame to render it at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub camera: String,
    pub frame: i64,
}

// Presets are stored as `["Camera.001", 180]` pairs in config.json.
impl From<(String, i64)> for Preset {
    fn from((camera, frame): (String, i64)) -> Self {
        Preset { camera, frame }
    }
}

fn default_output_size() -> u32 {
    480
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub blend_file: PathBuf,
    pub samples: u32,
    pub engine: Engine,
    pub resolution_scale: u32,
    #[serde(default = "default_output_size")]
    pub output_width: u32,
    #[serde(default = "default_output_size")]
    pub output_height: u32,
    /// Overrides the color extracted from each pattern when set.
    #[serde(default, with = "color_option")]
    pub threads_color: Option<Color>,
    #[serde(default, with = "preset_pairs")]
    pub presets: Vec<Preset>,
    /// Cameras to render when no presets are given. Empty means all of them.
    #[serde(default)]
    pub cameras: Vec<String>,
    pub output_dir: PathBuf,
}

/// Command line values that replace the ones from the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub samples: Option<u32>,
    pub engine: Option<Engine>,
    pub resolution_scale: Option<u32>,
    pub output_width: Option<u32>,
    pub output_height: Option<u32>,
    pub threads_color: Option<Color>,
    pub presets: Option<Vec<Preset>>,
    pub cameras: Option<Vec<String>>,
    pub output_dir: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(samples) = overrides.samples {
            self.samples = samples;
        }
        if let Some(engine) = overrides.engine {
            self.engine = engine;
        }
        if let Some(scale) = overrides.resolution_scale {
            self.resolution_scale = scale;
        }
        if let Some(width) = overrides.output_width {
            self.output_width = width;
        }
        if let Some(height) = overrides.output_height {
            self.output_height = height;
        }
        if let Some(color) = overrides.threads_color {
            self.threads_color = Some(color);
        }
        if let Some(presets) = overrides.presets {
            self.presets = presets;
        }
        if let Some(cameras) = overrides.cameras {
            self.cameras = cameras;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = output_dir;
        }
    }
}

/// Parses a flat `camera frame camera frame ...` argument list into presets.
///
/// A trailing camera without a frame is dropped.
pub fn parse_preset_pairs<S: AsRef<str>>(args: &[S]) -> Result<Vec<Preset>, ConfigError> {
    args.chunks_exact(2)
        .map(|pair| {
            let frame = pair[1].as_ref();
            let frame = frame
                .trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidFrame(frame.to_string()))?;
            Ok(Preset { camera: pair[0].as_ref().to_string(), frame })
        })
        .collect()
}

mod color_option {
    use crate::swatch::Color;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(color: &Option<Color>, serializer: S) -> Result<S::Ok, S::Error> {
        match color {
            Some(color) => serializer.serialize_some(&color.to_hex()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Color>, D::Error> {
        // An empty string is what older configs use for "no color".
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => s.trim().parse().map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}

mod preset_pairs {
    use super::Preset;
    use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(presets: &[Preset], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(presets.len()))?;
        for preset in presets {
            seq.serialize_element(&(&preset.camera, preset.frame))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Preset>, D::Error> {
        let pairs = Vec::<(String, i64)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().map(Preset::from).collect())
    }
}

//! # Configuration
//!
//! Two layers:
//!
//! * [`Config`] - flat `key = value` variables from a configuration file and
//!   command-line overrides
//! * [`TerrainSettings`] - typed terrain parameters, read from `terrain.*`
//!   variables or deserialized from JSON
//!
//! ## File Format
//! ```text
//! ; comments start with a semicolon
//! terrain.lod_distance = 2.5
//! terrain.mesher = octree   ; trailing comments are allowed too
//! ```
//!
//! Command-line arguments are either `-c PATH` (selects the file) or
//! `key=value` overrides, which take precedence over the file. Malformed file
//! lines are logged and skipped.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rendering::meshing::MesherKind;

/// Configuration file read when no `-c` argument is given.
pub const DEFAULT_CONFIG_PATH: &str = "./terrain.cfg";

static MESHER_KINDS: phf::Map<&'static str, MesherKind> = phf_map! {
    "dense" => MesherKind::Dense,
    "octree" => MesherKind::Octree,
};

/// Looks up a mesher by its configuration name.
pub fn mesher_kind(name: &str) -> Option<MesherKind> {
    MESHER_KINDS.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Flat string variables with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    variables: HashMap<String, String>,
    path: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from command-line arguments (without the
    /// program name) and the configuration file they select.
    ///
    /// A missing configuration file is logged and leaves only the
    /// command-line variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for a dangling `-c`, an argument that is not a
    /// `key=value` pair, or a file that exists but cannot be read.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::new();
        let mut path = PathBuf::from(DEFAULT_CONFIG_PATH);

        let mut args = args.into_iter();
        while let Some(argument) = args.next() {
            if argument == "-c" {
                path = args.next().map(PathBuf::from).ok_or(ConfigError::MissingConfigPath)?;
                continue;
            }

            let (key, value) = argument
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedArgument(argument.clone()))?;
            config.set(key.trim(), value.trim());
        }

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                config.parse_str(&text);
                config.path = Some(path);
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                warn!("Configuration file {} not found, using defaults", path.display());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        }

        Ok(config)
    }

    /// Reads `key = value` lines. Keys that are already set keep their value,
    /// so earlier command-line overrides win.
    pub fn parse_str(&mut self, text: &str) {
        for (number, line) in text.lines().enumerate() {
            let line = match line.split_once(';') {
                Some((content, _comment)) => content,
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!("Skipping configuration line {}: expected 'key=value', found \"{line}\"", number + 1);
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                warn!("Skipping configuration line {}: empty key in \"{line}\"", number + 1);
                continue;
            }

            self.variables
                .entry(key.to_string())
                .or_insert_with(|| value.trim().to_string());
        }
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.variables.insert(key.to_string(), value.to_string());
    }

    /// Path of the configuration file that was read, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Integer value of `key`. Unparsable values are logged and treated as
    /// missing.
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.parsed(key, |value| value.parse().ok())
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.parsed(key, |value| value.parse().ok())
    }

    /// Accepts `true`/`false`, `yes`/`no`, `on`/`off` and `1`/`0`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.parsed(key, |value| match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        })
    }

    fn parsed<T, F>(&self, key: &str, parse: F) -> Option<T>
    where
        F: FnOnce(&str) -> Option<T>,
    {
        let value = self.get_str(key)?;
        let parsed = parse(value);
        if parsed.is_none() {
            warn!("Ignoring configuration variable {key}: cannot parse \"{value}\"");
        }
        parsed
    }
}

/// Parameters of the level-of-detail terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Subdivide a chunk while the camera is closer than this many chunk
    /// widths.
    pub lod_distance: f64,
    /// Voxel edge length of the root chunk. Each level down halves it.
    pub voxel_size: f64,
    /// Cells per chunk edge.
    pub chunk_size: u32,
    /// Depth level of the root chunk; level 0 chunks never subdivide.
    pub max_level: u32,
    /// Score bonus per level, so coarse chunks generate first.
    pub score_level_bias: f64,
    pub mesher: MesherKind,
    /// Octree depth limit used by the octree mesher.
    pub detail_limit: u32,
    pub generate_borders: bool,
    pub root_center: [f64; 3],
}

impl Default for TerrainSettings {
    fn default() -> Self {
        TerrainSettings {
            lod_distance: 2.0,
            voxel_size: 1.0,
            chunk_size: 16,
            max_level: 6,
            score_level_bias: 64.0,
            mesher: MesherKind::Dense,
            detail_limit: 8,
            generate_borders: true,
            root_center: [0.0; 3],
        }
    }
}

impl TerrainSettings {
    /// Reads `terrain.*` variables over the defaults. Invalid values are
    /// logged and the default is kept.
    pub fn from_config(config: &Config) -> Self {
        let mut settings = TerrainSettings::default();

        if let Some(value) = config.get_double("terrain.lod_distance") {
            settings.lod_distance = value;
        }
        if let Some(value) = config.get_double("terrain.voxel_size") {
            if value > 0.0 {
                settings.voxel_size = value;
            } else {
                warn!("Ignoring terrain.voxel_size {value}: must be positive");
            }
        }
        if let Some(value) = config.get_integer("terrain.chunk_size") {
            match u32::try_from(value) {
                Ok(size) if size > 0 => settings.chunk_size = size,
                _ => warn!("Ignoring terrain.chunk_size {value}: must be a positive integer"),
            }
        }
        if let Some(value) = config.get_integer("terrain.max_level") {
            match u32::try_from(value) {
                Ok(level) => settings.max_level = level,
                Err(_) => warn!("Ignoring terrain.max_level {value}: must not be negative"),
            }
        }
        if let Some(value) = config.get_double("terrain.score_level_bias") {
            settings.score_level_bias = value;
        }
        if let Some(name) = config.get_str("terrain.mesher") {
            match mesher_kind(name) {
                Some(kind) => settings.mesher = kind,
                None => warn!("Ignoring terrain.mesher \"{name}\": expected dense or octree"),
            }
        }
        if let Some(value) = config.get_integer("terrain.detail_limit") {
            match u32::try_from(value) {
                Ok(limit) => settings.detail_limit = limit,
                Err(_) => warn!("Ignoring terrain.detail_limit {value}: must not be negative"),
            }
        }
        if let Some(value) = config.get_bool("terrain.generate_borders") {
            settings.generate_borders = value;
        }
        for (axis, key) in ["terrain.center_x", "terrain.center_y", "terrain.center_z"]
            .iter()
            .enumerate()
        {
            if let Some(value) = config.get_double(key) {
                settings.root_center[axis] = value;
            }
        }

        debug!("Terrain settings: {settings:?}");
        settings
    }

    /// Deserializes settings from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// World edge length of the root chunk.
    pub fn root_extent(&self) -> f64 {
        self.voxel_size * self.chunk_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_comments_whitespace_and_skips_malformed_lines() {
        let mut config = Config::new();
        config.parse_str(
            "; header comment\n\
             \n\
             window.width = 1280 ; trailing\n\
             \tcamera.fov=70.5\n\
             not a pair\n\
             = orphan value\n\
             data.folder = ./data = assets\n",
        );

        assert_eq!(config.len(), 3);
        assert_eq!(config.get_integer("window.width"), Some(1280));
        assert_eq!(config.get_double("camera.fov"), Some(70.5));
        assert_eq!(config.get_str("data.folder"), Some("./data = assets"));
    }

    #[test]
    fn command_line_overrides_file_values() {
        let mut config = Config::from_args(args(&[
            "terrain.mesher=octree",
            "-c",
            "/nonexistent/terrain.cfg",
        ]))
        .unwrap();
        config.parse_str("terrain.mesher = dense\nterrain.chunk_size = 8\n");

        assert_eq!(config.get_str("terrain.mesher"), Some("octree"));
        assert_eq!(config.get_integer("terrain.chunk_size"), Some(8));
        assert!(config.path().is_none());
    }

    #[test]
    fn malformed_arguments_are_errors() {
        assert!(matches!(
            Config::from_args(args(&["-c"])),
            Err(ConfigError::MissingConfigPath)
        ));
        assert!(matches!(
            Config::from_args(args(&["-c", "/nonexistent/terrain.cfg", "verbose"])),
            Err(ConfigError::MalformedArgument(argument)) if argument == "verbose"
        ));
    }

    #[test]
    fn typed_getters_reject_garbage() {
        let mut config = Config::new();
        config.set("a", "twelve");
        config.set("b", "Yes");
        config.set("c", "maybe");
        assert_eq!(config.get_integer("a"), None);
        assert_eq!(config.get_bool("b"), Some(true));
        assert_eq!(config.get_bool("c"), None);
        assert_eq!(config.get_double("missing"), None);
    }

    #[test]
    fn terrain_settings_from_config() {
        let mut config = Config::new();
        config.parse_str(
            "terrain.lod_distance = 3.5\n\
             terrain.chunk_size = 32\n\
             terrain.mesher = Octree\n\
             terrain.max_level = -2\n\
             terrain.generate_borders = off\n\
             terrain.center_y = -64\n",
        );
        let settings = TerrainSettings::from_config(&config);

        assert_eq!(settings.lod_distance, 3.5);
        assert_eq!(settings.chunk_size, 32);
        assert_eq!(settings.mesher, MesherKind::Octree);
        assert_eq!(settings.max_level, TerrainSettings::default().max_level);
        assert!(!settings.generate_borders);
        assert_eq!(settings.root_center, [0.0, -64.0, 0.0]);
        assert_eq!(settings.root_extent(), 32.0);
    }

    #[test]
    fn terrain_settings_from_partial_json() {
        let settings = TerrainSettings::from_json(r#"{ "voxel_size": 0.5, "mesher": "octree" }"#).unwrap();
        assert_eq!(settings.voxel_size, 0.5);
        assert_eq!(settings.mesher, MesherKind::Octree);
        assert_eq!(settings.chunk_size, 16);

        let json = settings.to_json().unwrap();
        assert_eq!(TerrainSettings::from_json(&json).unwrap(), settings);
        assert!(TerrainSettings::from_json("{ \"chunk_size\": -1 }").is_err());
    }
}

//! YAML loading for mapper configuration files
//!
//! Two custom tags are understood:
//! - `!include path` - replaced by the content of another YAML file,
//!   resolved relative to the including file
//! - `!env_var VAR` or `!env_var VAR default` - environment substitution

use crate::error::{ConfigError, ConfigResult};
use crate::mapping::{MappingConfig, MappingEntry};
use dm_core::{Attributes, EntityId};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// An initial entity state to seed an in-process registry with
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedState {
    pub state: String,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Parsed content of a mapper configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapperConfig {
    #[serde(default, rename = "domain_mapper")]
    pub entries: Vec<MappingEntry>,

    #[serde(default)]
    pub states: IndexMap<EntityId, SeedState>,
}

impl MapperConfig {
    /// Resolve every entry, rejecting invalid ones and duplicate entry ids
    pub fn mappings(&self) -> ConfigResult<Vec<MappingConfig>> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|entry| {
                if !seen.insert(entry.entry_id.as_str()) {
                    return Err(ConfigError::DuplicateEntry {
                        entry_id: entry.entry_id.clone(),
                    });
                }
                entry.resolve()
            })
            .collect()
    }
}

/// YAML loader with `!include` and `!env_var` support
pub struct YamlLoader {
    config_dir: PathBuf,
    /// Files currently being loaded, to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    result.insert(k, self.process_value(v, source_path)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.process_value(v, source_path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}'", tag);

        match tag.as_str() {
            "!include" => {
                let include = self.include_path(&tagged.value, source_path)?;
                self.load_file(include)
            }
            "!env_var" => env_var(&tagged.value),
            other => Err(ConfigError::InvalidValue {
                key: other.to_string(),
                reason: "unknown YAML tag".to_string(),
            }),
        }
    }

    fn include_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let Value::String(path) = value else {
            return Err(ConfigError::InvalidValue {
                key: "!include".to_string(),
                reason: "include path must be a string".to_string(),
            });
        };

        let base_dir = source_path.parent().unwrap_or(&self.config_dir);
        Ok(base_dir.join(path))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}

/// `!env_var NAME` or `!env_var NAME default`
fn env_var(value: &Value) -> ConfigResult<Value> {
    let Value::String(arg) = value else {
        return Err(ConfigError::InvalidValue {
            key: "!env_var".to_string(),
            reason: "environment variable name must be a string".to_string(),
        });
    };

    let (name, default) = match arg.split_once(char::is_whitespace) {
        Some((name, default)) => (name, Some(default.trim())),
        None => (arg.as_str(), None),
    };

    match (std::env::var(name), default) {
        (Ok(found), _) => Ok(Value::String(found)),
        (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
        (Err(_), None) => Err(ConfigError::EnvVarNotFound {
            var: name.to_string(),
        }),
    }
}

/// Load a mapper configuration file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<MapperConfig> {
    let path = path.as_ref();
    let config_dir = path.parent().unwrap_or(Path::new("."));
    let value = YamlLoader::new(config_dir).load_file(path)?;
    from_value(value, path)
}

/// Load a mapper configuration from a string
pub fn load_config_str(content: &str, source_name: &str) -> ConfigResult<MapperConfig> {
    let source = Path::new(source_name);
    let value = YamlLoader::new(".").load_string(content, source)?;
    from_value(value, source)
}

fn from_value(value: Value, source: &Path) -> ConfigResult<MapperConfig> {
    if value.is_null() {
        return Ok(MapperConfig::default());
    }
    let config: MapperConfig =
        serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
            path: source.to_path_buf(),
            source: e,
        })?;
    debug!(
        entries = config.entries.len(),
        seeded = config.states.len(),
        "Loaded mapper configuration"
    );
    Ok(config)
}

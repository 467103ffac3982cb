use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use super::error::{ConfigError, ConfigResult};
use super::interpolate::{self, EnvLookup};
use super::merge::deep_merge;

const EXTENDS_KEY: &str = "extends";
const MERGE_KEY: &str = "merge";

/// Loads declarative documents, resolving `extends`, `merge` and `${...}`
/// placeholders.
///
/// Raw documents are cached by path for the lifetime of the loader. Every
/// read hands out its own copy, so callers are free to mutate what they get.
pub struct ConfigLoader {
    base_path: PathBuf,
    cache: HashMap<PathBuf, Value>,
    env: EnvLookup,
    in_progress: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new(base_path: PathBuf) -> Self {
        Self::with_env(base_path, interpolate::process_env())
    }

    pub fn with_env(base_path: PathBuf, env: EnvLookup) -> Self {
        Self {
            base_path,
            cache: HashMap::new(),
            env,
            in_progress: Vec::new(),
        }
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.absolute(path.as_ref());
        if self.in_progress.contains(&path) {
            return Err(ConfigError::ExtendsCycle(path));
        }
        self.in_progress.push(path.clone());
        let result = self.load_resolved(&path);
        self.in_progress.pop();
        result
    }

    fn load_resolved(&mut self, path: &Path) -> ConfigResult<Value> {
        let current_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut document = self.read_raw(path)?;

        if let Some(extends) = document.shift_remove(EXTENDS_KEY) {
            let parent = extends
                .as_str()
                .ok_or_else(|| ConfigError::malformed(path, "'extends' must be a string path"))?;
            let parent_path = resolve_relative(parent, &current_dir);
            log::debug!("{:?} extends {:?}", path, parent_path);
            let base = self.load(&parent_path)?;
            document = match deep_merge(base, Value::Mapping(document)) {
                Value::Mapping(merged) => merged,
                _ => return Err(ConfigError::malformed(path, "'extends' target is not a mapping")),
            };
        }

        if let Some(merge) = document.shift_remove(MERGE_KEY) {
            for entry in merge_entries(path, &merge)? {
                let source_path = resolve_relative(&entry.source, &current_dir);
                let namespace = match entry.alias {
                    Some(alias) => alias,
                    None => file_stem(&source_path).ok_or_else(|| {
                        ConfigError::malformed(path, format!("cannot derive namespace for {:?}", entry.source))
                    })?,
                };
                log::debug!("merging {:?} into '{}'", source_path, namespace);
                let merged = self.load(&source_path)?;
                document.insert(Value::String(namespace), merged);
            }
        }

        let resolved = Value::Mapping(document);
        let context = resolved.clone();
        Ok(interpolate::expand(resolved, &context, self.env.as_ref()))
    }

    /// Parsed contents of `path` without any directive processing.
    fn read_raw(&mut self, path: &Path) -> ConfigResult<Mapping> {
        if let Some(cached) = self.cache.get(path) {
            log::debug!("document cache hit for {:?}", path);
            return as_mapping(path, cached.clone());
        }
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let value = match value {
            Value::Null => Value::Mapping(Mapping::new()),
            other => other,
        };
        self.cache.insert(path.to_path_buf(), value.clone());
        as_mapping(path, value)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        };
        fs::canonicalize(&joined).unwrap_or(joined)
    }
}

struct MergeEntry {
    source: String,
    alias: Option<String>,
}

fn merge_entries(path: &Path, merge: &Value) -> ConfigResult<Vec<MergeEntry>> {
    let items = merge
        .as_sequence()
        .ok_or_else(|| ConfigError::malformed(path, "'merge' must be a sequence"))?;
    items
        .iter()
        .map(|item| {
            let source = item
                .get("source")
                .and_then(Value::as_str)
                .ok_or_else(|| ConfigError::malformed(path, "'merge' entry is missing 'source'"))?;
            let alias = match item.get("as") {
                None | Some(Value::Null) => None,
                Some(Value::String(alias)) => Some(alias.clone()),
                Some(_) => {
                    return Err(ConfigError::malformed(path, "'merge' entry 'as' must be a string"));
                }
            };
            Ok(MergeEntry {
                source: source.to_string(),
                alias,
            })
        })
        .collect()
}

fn as_mapping(path: &Path, value: Value) -> ConfigResult<Mapping> {
    match value {
        Value::Mapping(map) => Ok(map),
        _ => Err(ConfigError::malformed(path, "top-level document must be a mapping")),
    }
}

fn resolve_relative(target: &str, current_dir: &Path) -> PathBuf {
    let target = Path::new(target);
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        current_dir.join(target)
    };
    fs::canonicalize(&joined).unwrap_or(joined)
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

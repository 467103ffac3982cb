use std::collections::BTreeMap;
use std::path::PathBuf;

use super::LifecycleError;
use crate::runtime::load_env_file;

/// Read env files in order; later files override earlier keys.
pub fn load_env_files(files: &[PathBuf]) -> Result<BTreeMap<String, String>, LifecycleError> {
    let mut env = BTreeMap::new();
    for file in files {
        let values = load_env_file(file).map_err(|source| LifecycleError::EnvFile {
            path: file.clone(),
            source,
        })?;
        log::debug!("loaded {} variables from {:?}", values.len(), file);
        env.extend(values);
    }
    Ok(env)
}

/// Layer environments lowest precedence first.
pub fn layered(layers: &[&BTreeMap<String, String>]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for layer in layers {
        env.extend(layer.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    env
}

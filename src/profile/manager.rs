use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use glob::glob;
use serde_yaml::Value;

use super::model::{Profile, ProfileInfo};
use crate::document::{ConfigError, ConfigLoader, ConfigResult};

const PROFILE_EXTENSIONS: [&str; 2] = ["yaml", "yml"];
const ABSTRACT_PREFIX: char = '_';

pub struct ProfileManager {
    root: PathBuf,
    loader: ConfigLoader,
}

impl ProfileManager {
    pub fn new(root: PathBuf) -> Self {
        let loader = ConfigLoader::new(root.clone());
        Self { root, loader }
    }

    #[cfg(test)]
    pub fn with_loader(root: PathBuf, loader: ConfigLoader) -> Self {
        Self { root, loader }
    }

    /// Names of loadable profiles; files whose stem starts with `_` are
    /// base documents meant only to be extended.
    pub fn list_profiles(&self) -> Result<Vec<String>> {
        let mut profiles = BTreeSet::new();
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        for extension in PROFILE_EXTENSIONS {
            let pattern = self.root.join(format!("*.{}", extension));
            for entry in glob(pattern.to_string_lossy().as_ref())
                .with_context(|| format!("invalid profile pattern {:?}", pattern))?
            {
                let path = entry?;
                if !path.is_file() {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                    && !stem.starts_with(ABSTRACT_PREFIX)
                {
                    profiles.insert(stem.to_string());
                }
            }
        }
        Ok(profiles.into_iter().collect())
    }

    /// Fully resolved document for `name`, probing `.yaml` then `.yml`.
    pub fn load_profile(&mut self, name: &str) -> ConfigResult<Value> {
        let path = self.path_for(name)?;
        log::debug!("loading profile '{}' from {:?}", name, path);
        self.loader.load(path)
    }

    pub fn resolve(&mut self, name: &str) -> Result<Profile> {
        let document = self.load_profile(name)?;
        Ok(Profile::from_document(name, &document)?)
    }

    pub fn get_profile_info(&mut self, name: &str) -> ConfigResult<ProfileInfo> {
        let document = self.load_profile(name)?;
        Ok(ProfileInfo::from_document(name, &document))
    }

    fn path_for(&self, name: &str) -> ConfigResult<PathBuf> {
        PROFILE_EXTENSIONS
            .iter()
            .map(|extension| self.root.join(format!("{}.{}", name, extension)))
            .find(|path| path.is_file())
            .ok_or_else(|| ConfigError::NotFound(self.root.join(format!("{}.yaml", name))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ProfileManager {
        let root = dir.path().to_path_buf();
        ProfileManager::with_loader(root.clone(), ConfigLoader::with_env(root, Box::new(|_: &str| None::<String>)))
    }

    #[test]
    fn lists_sorted_profiles_without_base_files() {
        let dir = TempDir::new().unwrap();
        for name in ["zeta.yaml", "alpha.yml", "_base.yaml", "_common.yml", "notes.txt"] {
            fs::write(dir.path().join(name), "name: x\n").unwrap();
        }
        fs::create_dir(dir.path().join("nested.yaml")).unwrap();
        let profiles = manager(&dir).list_profiles().unwrap();
        assert_eq!(profiles, vec!["alpha", "zeta"]);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let manager = ProfileManager::new(dir.path().join("absent"));
        assert!(manager.list_profiles().unwrap().is_empty());
    }

    #[test]
    fn prefers_yaml_over_yml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("arm.yaml"), "description: from yaml\n").unwrap();
        fs::write(dir.path().join("arm.yml"), "description: from yml\n").unwrap();
        let doc = manager(&dir).load_profile("arm").unwrap();
        assert_eq!(doc["description"], Value::String("from yaml".into()));
    }

    #[test]
    fn falls_back_to_yml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("arm.yml"), "description: from yml\n").unwrap();
        let doc = manager(&dir).load_profile("arm").unwrap();
        assert_eq!(doc["description"], Value::String("from yml".into()));
    }

    #[test]
    fn unknown_profile_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = manager(&dir).load_profile("ghost").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn base_files_can_still_be_extended() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_base.yaml"), "description: shared\nskills: [driver]\n").unwrap();
        fs::write(dir.path().join("arm.yaml"), "extends: _base.yaml\nname: arm\n").unwrap();
        let mut manager = manager(&dir);
        let info = manager.get_profile_info("arm").unwrap();
        assert_eq!(info.name, "arm");
        assert_eq!(info.description, "shared");
        assert_eq!(info.skills, vec!["driver"]);
        let profile = manager.resolve("arm").unwrap();
        assert_eq!(profile.services[0].name, "driver");
    }
}
